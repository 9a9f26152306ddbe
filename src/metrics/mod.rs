pub mod types;

pub use types::*;

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, NaiveDate, Utc};

use crate::date_util::business_duration;
use crate::model::{Approval, Review, ReviewStatus, ReviewTimeline};

/// Keep reviews created on or after `boundary` (calendar-day comparison).
pub fn filter_by_window(reviews: Vec<Review>, boundary: NaiveDate) -> Vec<Review> {
    reviews
        .into_iter()
        .filter(|r| r.created.date_naive() >= boundary)
        .collect()
}

/// Group items by key and count them, most frequent first.
///
/// Ties keep the order in which their keys were first seen.
pub fn rank_by_frequency<I, K, F>(items: I, key: F) -> Vec<(K, u64)>
where
    I: IntoIterator,
    K: Eq + Hash + Clone,
    F: Fn(&I::Item) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut ranked: Vec<(K, u64)> = Vec::new();

    for item in items {
        let k = key(&item);
        let slot = *index.entry(k.clone()).or_insert_with(|| {
            ranked.push((k, 0));
            ranked.len() - 1
        });
        ranked[slot].1 += 1;
    }

    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

fn commit_tallies<F>(reviews: &[Review], key: F) -> Vec<CommitTally>
where
    F: Fn(&&Review) -> String,
{
    rank_by_frequency(reviews.iter(), key)
        .into_iter()
        .map(|(name, commits)| CommitTally { name, commits })
        .collect()
}

pub fn most_committed_projects(reviews: &[Review]) -> Vec<CommitTally> {
    commit_tallies(reviews, |r| r.project.clone())
}

pub fn top_committers(reviews: &[Review]) -> Vec<CommitTally> {
    commit_tallies(reviews, |r| r.owner.name.clone())
}

/// Mean of the whole hours elapsed in each `(start, end)` pair, rounded up.
/// `None` when there are no pairs.
pub fn average_interval_hours<I>(pairs: I) -> Option<i64>
where
    I: IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>,
{
    let (total, count) = pairs
        .into_iter()
        .fold((0i64, 0i64), |(total, count), (start, end)| {
            (total + (end - start).num_hours(), count + 1)
        });
    if count == 0 {
        return None;
    }
    Some((total as f64 / count as f64).ceil() as i64)
}

/// Build one profile per reviewer from raw votes, busiest reviewer first.
pub fn rank_approvals_to_reviewer_profiles(approvals: &[Approval]) -> Vec<ReviewerProfile> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut profiles: Vec<ReviewerProfile> = Vec::new();

    for approval in approvals {
        let slot = *index.entry(approval.reviewer.as_str()).or_insert_with(|| {
            profiles.push(ReviewerProfile {
                name: approval.reviewer.clone(),
                reviews: 0,
                project_reviews: Vec::new(),
                scores: ScoreHistogram::default(),
            });
            profiles.len() - 1
        });

        let profile = &mut profiles[slot];
        profile.reviews += 1;
        profile.scores.record(approval.score);
        match profile
            .project_reviews
            .iter_mut()
            .find(|p| p.project_name == approval.project)
        {
            Some(p) => p.review_count += 1,
            None => profile.project_reviews.push(ProjectReviewCount {
                project_name: approval.project.clone(),
                review_count: 1,
            }),
        }
    }

    profiles.sort_by(|a, b| b.reviews.cmp(&a.reviews));
    profiles
}

/// Projects and accounts left out of the business-duration averages.
#[derive(Debug, Clone, Default)]
pub struct DurationFilters {
    /// A project is skipped when its name contains any of these.
    pub excluded_projects: Vec<String>,
    /// Messages by these accounts (bots, CI) never count as review activity.
    pub excluded_account_ids: Vec<i64>,
}

impl DurationFilters {
    fn skips_project(&self, project: &str) -> bool {
        self.excluded_projects
            .iter()
            .any(|pattern| project.contains(pattern.as_str()))
    }

    fn counts_author(&self, author_id: Option<i64>) -> bool {
        author_id.is_some_and(|id| !self.excluded_account_ids.contains(&id))
    }
}

/// Average business minutes per project between each timeline's first patch
/// set and the terminal event picked by `end_of`. Timelines without a
/// terminal event are ignored. Sorted by project name.
pub fn average_business_duration_by_project<F>(
    timelines: &[ReviewTimeline],
    filters: &DurationFilters,
    end_of: F,
) -> Vec<(String, f64)>
where
    F: Fn(&ReviewTimeline, &DurationFilters) -> Option<DateTime<Utc>>,
{
    let mut per_project: BTreeMap<&str, (f64, u64)> = BTreeMap::new();

    for timeline in timelines {
        if filters.skips_project(&timeline.project) {
            continue;
        }
        let Some(end) = end_of(timeline, filters) else {
            continue;
        };
        let minutes = business_duration(timeline.created, end).num_seconds() as f64 / 60.0;
        let entry = per_project.entry(timeline.project.as_str()).or_default();
        entry.0 += minutes;
        entry.1 += 1;
    }

    per_project
        .into_iter()
        .map(|(project, (sum, n))| (project.to_string(), sum / n as f64))
        .collect()
}

/// Merge time of a merged change that saw at least one counted message.
fn merge_time(t: &ReviewTimeline, filters: &DurationFilters) -> Option<DateTime<Utc>> {
    let reviewed = t.messages.iter().any(|m| filters.counts_author(m.author_id));
    (t.status == ReviewStatus::Merged && reviewed).then_some(t.updated)
}

/// Earliest message written by someone other than the uploader.
fn first_review_time(t: &ReviewTimeline, filters: &DurationFilters) -> Option<DateTime<Utc>> {
    t.messages
        .iter()
        .filter(|m| filters.counts_author(m.author_id) && m.author_id != Some(t.uploader_id))
        .map(|m| m.written)
        .min()
}

pub fn average_merge_duration_by_project(
    timelines: &[ReviewTimeline],
    filters: &DurationFilters,
) -> Vec<ProjectMergeDuration> {
    average_business_duration_by_project(timelines, filters, merge_time)
        .into_iter()
        .map(|(project, avg_merge_duration)| ProjectMergeDuration {
            project,
            avg_merge_duration,
        })
        .collect()
}

pub fn average_first_review_duration_by_project(
    timelines: &[ReviewTimeline],
    filters: &DurationFilters,
) -> Vec<ProjectFirstReviewDuration> {
    average_business_duration_by_project(timelines, filters, first_review_time)
        .into_iter()
        .map(|(project, avg_first_review_duration)| ProjectFirstReviewDuration {
            project,
            avg_first_review_duration,
        })
        .collect()
}

/// Drop reviewers whose name is on the denylist.
pub fn exclude_reviewers(profiles: Vec<ReviewerProfile>, names: &[String]) -> Vec<ReviewerProfile> {
    profiles
        .into_iter()
        .filter(|p| !names.iter().any(|n| n == &p.name))
        .collect()
}

/// Keep at most `limit` leading entries.
pub fn truncate<T>(mut list: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(n) = limit {
        list.truncate(n);
    }
    list
}
