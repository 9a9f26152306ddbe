//! Raw review records as fetched from either data source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a review (a Gerrit change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Open,
    Merged,
    Abandoned,
    Draft,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Open,
        ReviewStatus::Merged,
        ReviewStatus::Abandoned,
        ReviewStatus::Draft,
    ];

    /// Query value understood by Gerrit's `status:` search operator.
    pub fn as_query(&self) -> &'static str {
        match self {
            ReviewStatus::Open => "open",
            ReviewStatus::Merged => "merged",
            ReviewStatus::Abandoned => "abandoned",
            ReviewStatus::Draft => "draft",
        }
    }

    /// Map the `status` field of Gerrit's ChangeInfo (`NEW`, `MERGED`, ...).
    pub fn from_api(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(ReviewStatus::Open),
            "MERGED" => Some(ReviewStatus::Merged),
            "ABANDONED" => Some(ReviewStatus::Abandoned),
            "DRAFT" => Some(ReviewStatus::Draft),
            _ => None,
        }
    }

    /// Map the single-character status code of the review database.
    /// Anything that is not merged, abandoned or draft is a new (open) change.
    pub fn from_db_code(code: &str) -> Self {
        match code {
            "M" => ReviewStatus::Merged,
            "A" => ReviewStatus::Abandoned,
            "d" => ReviewStatus::Draft,
            _ => ReviewStatus::Open,
        }
    }
}

/// A Gerrit account, referenced by id where the source knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Option<i64>,
    pub name: String,
}

impl Account {
    /// Same person, by account id when both sides have one, else by name.
    pub fn is_same(&self, other: &Account) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.name == other.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: String,
    pub project: String,
    pub owner: Account,
    pub status: ReviewStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A Code-Review vote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Score {
    MinusTwo,
    MinusOne,
    Zero,
    PlusOne,
    PlusTwo,
}

impl Score {
    pub fn value(&self) -> i64 {
        match self {
            Score::MinusTwo => -2,
            Score::MinusOne => -1,
            Score::Zero => 0,
            Score::PlusOne => 1,
            Score::PlusTwo => 2,
        }
    }

    /// Parse the label value as Gerrit renders it (`-2`, `-1`, ` 0`, `+1`, `+2`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('+').unwrap_or(s);
        s.parse::<i64>().ok().and_then(|v| Score::try_from(v).ok())
    }
}

impl TryFrom<i64> for Score {
    type Error = i64;

    fn try_from(v: i64) -> std::result::Result<Self, i64> {
        match v {
            -2 => Ok(Score::MinusTwo),
            -1 => Ok(Score::MinusOne),
            0 => Ok(Score::Zero),
            1 => Ok(Score::PlusOne),
            2 => Ok(Score::PlusTwo),
            other => Err(other),
        }
    }
}

/// One reviewer vote on one review.
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub reviewer: String,
    pub project: String,
    pub score: Score,
}

/// An entry of a review's reviewer list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewerVote {
    pub account: Account,
    /// Code-Review vote, `None` when the reviewer has not voted.
    pub score: Option<Score>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewMessage {
    pub author_id: Option<i64>,
    pub written: DateTime<Utc>,
}

/// Everything the business-duration averages need about one review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTimeline {
    pub review_id: String,
    pub project: String,
    pub status: ReviewStatus,
    pub uploader_id: i64,
    /// Creation time of the first patch set.
    pub created: DateTime<Utc>,
    /// Last update of the change; the merge time for merged changes.
    pub updated: DateTime<Utc>,
    pub messages: Vec<ReviewMessage>,
}
