//! Provider backed by a SQLite copy of the Gerrit review database.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::DataSource;
use crate::error::Result;
use crate::model::{Approval, Project, Review, ReviewStatus, ReviewTimeline, ReviewerVote};
use crate::storage::{repository, Database};

pub struct SqlSource {
    db: Database,
}

impl SqlSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DataSource for SqlSource {
    fn name(&self) -> &'static str {
        "review-db"
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>> {
        let projects = self
            .db
            .reader()
            .call(|conn| repository::list_projects(conn))
            .await?;
        Ok(projects)
    }

    async fn count_projects(&self) -> Result<u64> {
        let n = self
            .db
            .reader()
            .call(|conn| repository::count_projects(conn))
            .await?;
        Ok(n)
    }

    async fn fetch_reviews(&self, status: ReviewStatus) -> Result<Vec<Review>> {
        let reviews = self
            .db
            .reader()
            .call(move |conn| repository::list_changes(conn, status))
            .await?;
        Ok(reviews)
    }

    async fn count_reviews(&self, status: ReviewStatus) -> Result<u64> {
        let n = self
            .db
            .reader()
            .call(move |conn| repository::count_changes(conn, status))
            .await?;
        Ok(n)
    }

    async fn fetch_reviewers(&self, review_id: &str) -> Result<Vec<ReviewerVote>> {
        let review_id = review_id.to_string();
        let votes = self
            .db
            .reader()
            .call(move |conn| repository::list_change_reviewers(conn, &review_id))
            .await?;
        Ok(votes)
    }

    async fn fetch_approvals(&self, since: NaiveDate) -> Result<Option<Vec<Approval>>> {
        let approvals = self
            .db
            .reader()
            .call(move |conn| repository::list_code_review_approvals(conn, since))
            .await?;
        Ok(Some(approvals))
    }

    async fn fetch_timelines(&self, since: NaiveDate) -> Result<Option<Vec<ReviewTimeline>>> {
        let timelines = self
            .db
            .reader()
            .call(move |conn| repository::list_timelines(conn, since))
            .await?;
        Ok(Some(timelines))
    }
}
