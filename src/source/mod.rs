//! Raw review data providers.
//!
//! A [`DataSource`] hands out unaggregated records. Two providers exist: the
//! Gerrit REST API ([`RestSource`]) and a SQLite copy of the review database
//! ([`SqlSource`]). One is chosen at startup by [`open_source`] and shared
//! behind an `Arc<dyn DataSource>`.

pub mod rest;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{stream, StreamExt, TryStreamExt};

use crate::config::{Config, SourceKind};
use crate::error::{Error, Result};
use crate::model::{Approval, Project, Review, ReviewStatus, ReviewTimeline, ReviewerVote, Score};
use crate::storage::Database;

pub use rest::RestSource;
pub use sql::SqlSource;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short provider name for log lines.
    fn name(&self) -> &'static str;

    async fn fetch_projects(&self) -> Result<Vec<Project>>;

    async fn count_projects(&self) -> Result<u64> {
        Ok(self.fetch_projects().await?.len() as u64)
    }

    /// Reviews in `status`. `Open` also yields drafts where the provider
    /// cannot tell them apart.
    async fn fetch_reviews(&self, status: ReviewStatus) -> Result<Vec<Review>>;

    async fn count_reviews(&self, status: ReviewStatus) -> Result<u64> {
        Ok(self.fetch_reviews(status).await?.len() as u64)
    }

    /// Reviewer list of one review with each reviewer's Code-Review vote.
    async fn fetch_reviewers(&self, review_id: &str) -> Result<Vec<ReviewerVote>>;

    /// Code-Review votes cast inside the window starting at `since`, one per
    /// (review, reviewer), never by the review's owner. `None` when the
    /// provider only lists reviewers one review at a time; callers then use
    /// [`approvals_from_reviewers`] over the reviews they already hold.
    async fn fetch_approvals(&self, _since: NaiveDate) -> Result<Option<Vec<Approval>>> {
        Ok(None)
    }

    /// Upper bound on in-flight `fetch_reviewers` calls during a fan-out.
    fn max_concurrent_requests(&self) -> usize {
        1
    }

    /// Per-review timelines for business-duration averages. `None` when the
    /// provider has no access to patch sets and messages.
    async fn fetch_timelines(&self, _since: NaiveDate) -> Result<Option<Vec<ReviewTimeline>>> {
        Ok(None)
    }
}

/// Fetch the reviewers of every review in `reviews`, at most `max_in_flight`
/// at a time, and turn each vote not cast by the review's owner into an
/// [`Approval`]. A reviewer without a Code-Review vote scores zero. Results
/// keep the order of `reviews`; the first failed fetch fails the whole call.
pub async fn approvals_from_reviewers(
    source: &dyn DataSource,
    reviews: &[Review],
    max_in_flight: usize,
) -> Result<Vec<Approval>> {
    log::debug!(
        "Fetching reviewers of {} reviews from {}, {} at a time",
        reviews.len(),
        source.name(),
        max_in_flight
    );

    let per_review: Vec<Vec<Approval>> = stream::iter(reviews.iter().cloned())
        .map(move |review| async move {
            let votes = source.fetch_reviewers(&review.id).await?;
            Ok::<_, Error>(
                votes
                    .into_iter()
                    .filter(|v| !v.account.is_same(&review.owner))
                    .map(|v| Approval {
                        reviewer: v.account.name,
                        project: review.project.clone(),
                        score: v.score.unwrap_or(Score::Zero),
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .buffered(max_in_flight.max(1))
        .try_collect()
        .await?;
    Ok(per_review.into_iter().flatten().collect())
}

/// Build the provider selected by `config.source`.
pub async fn open_source(config: &Config) -> Result<Arc<dyn DataSource>> {
    let source: Arc<dyn DataSource> = match config.source {
        SourceKind::Api => Arc::new(RestSource::new(&config.gerrit)?),
        SourceKind::Database => {
            let path = config.database.resolved_path()?;
            Arc::new(SqlSource::new(Database::open_at(path).await?))
        }
    };
    log::info!("Using {} data source", source.name());
    Ok(source)
}
