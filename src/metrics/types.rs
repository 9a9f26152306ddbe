use serde::Serialize;

use crate::model::Score;

/// Review counts bucketed by status. `open` includes drafts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewCounts {
    pub open: u64,
    pub merged: u64,
    pub abandoned: u64,
    pub draft: u64,
}

/// Payload of `GET /dashboard`, computed over the whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_number_of_projects: u64,
    pub number_of_reviews: ReviewCounts,
    /// Mean hours from creation to last update of merged reviews.
    pub average_review_interval: i64,
}

/// One row of a commit leaderboard (projects or committers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitTally {
    pub name: String,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReviewCount {
    pub project_name: String,
    pub review_count: u64,
}

/// Histogram over the Code-Review score domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreHistogram {
    #[serde(rename = "-2")]
    pub minus_two: u64,
    #[serde(rename = "-1")]
    pub minus_one: u64,
    #[serde(rename = "0")]
    pub zero: u64,
    #[serde(rename = "1")]
    pub plus_one: u64,
    #[serde(rename = "2")]
    pub plus_two: u64,
}

impl ScoreHistogram {
    pub fn record(&mut self, score: Score) {
        let slot = match score {
            Score::MinusTwo => &mut self.minus_two,
            Score::MinusOne => &mut self.minus_one,
            Score::Zero => &mut self.zero,
            Score::PlusOne => &mut self.plus_one,
            Score::PlusTwo => &mut self.plus_two,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.minus_two + self.minus_one + self.zero + self.plus_one + self.plus_two
    }
}

/// A reviewer's activity inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerProfile {
    pub name: String,
    pub reviews: u64,
    pub project_reviews: Vec<ProjectReviewCount>,
    pub scores: ScoreHistogram,
}

/// Average business minutes from first patch set to merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectMergeDuration {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "AvgMergeDuration")]
    pub avg_merge_duration: f64,
}

/// Average business minutes from first patch set to the first review action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFirstReviewDuration {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "AvgFirstReviewDuration")]
    pub avg_first_review_duration: f64,
}

/// Payload of `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResult {
    pub number_of_commits: u64,
    pub most_committed_projects: Vec<CommitTally>,
    pub top_committers: Vec<CommitTally>,
    pub top_reviewers: Vec<ReviewerProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_merge_time: Option<Vec<ProjectMergeDuration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_first_review_time: Option<Vec<ProjectFirstReviewDuration>>,
}
