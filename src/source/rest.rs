//! Gerrit REST API provider.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::DataSource;
use crate::config::GerritConfig;
use crate::date_util::parse_timestamp;
use crate::error::{Error, Result};
use crate::model::{Account, Project, Review, ReviewStatus, ReviewerVote, Score};

/// Gerrit prepends `)]}'` and a newline to every JSON body.
pub const XSSI_PREFIX_LEN: usize = 5;

const CODE_REVIEW: &str = "Code-Review";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(rename = "_account_id")]
    account_id: Option<i64>,
    name: Option<String>,
    username: Option<String>,
}

impl AccountInfo {
    fn into_account(self) -> Account {
        Account {
            id: self.account_id,
            name: self.name.or(self.username).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangeInfo {
    id: String,
    project: String,
    owner: AccountInfo,
    status: String,
    created: String,
    updated: String,
    /// Set on the last entry when the server cut the result list short.
    #[serde(default, rename = "_more_changes")]
    more_changes: bool,
}

#[derive(Debug, Deserialize)]
struct ReviewerInfo {
    #[serde(flatten)]
    account: AccountInfo,
    #[serde(default)]
    approvals: HashMap<String, String>,
}

/// Strip the anti-XSSI prefix and decode. Short or malformed bodies decode
/// to `None`.
fn decode_body<T: DeserializeOwned>(body: &str, path: &str) -> Option<T> {
    let Some(json) = body.get(XSSI_PREFIX_LEN..) else {
        log::warn!("Response from {path} is too short to hold JSON");
        return None;
    };
    match serde_json::from_str(json) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Malformed response from {path}: {e}");
            None
        }
    }
}

// ── Source ─────────────────────────────────────────────────────────

pub struct RestSource {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
    max_concurrent_requests: usize,
}

impl RestSource {
    pub fn new(config: &GerritConfig) -> Result<Self> {
        let raw = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("gerrit.url is not set".into()))?;
        let mut base =
            Url::parse(raw).map_err(|e| Error::Config(format!("invalid gerrit.url {raw:?}: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            max_concurrent_requests: config.max_concurrent_requests.max(1),
        })
    }

    /// Authenticated GET under `<base>/a/`. Transport failures and
    /// non-success statuses are errors; an undecodable body is `None`.
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<T>> {
        let mut url = self
            .base
            .join(&format!("a/{path}"))
            .map_err(|e| Error::Other(format!("bad request path {path:?}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut request = self.client.get(url);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }
        let body = response.text().await?;
        Ok(decode_body(&body, path))
    }

    fn to_review(change: ChangeInfo, requested: ReviewStatus) -> Option<Review> {
        let (Some(created), Some(updated)) =
            (parse_timestamp(&change.created), parse_timestamp(&change.updated))
        else {
            log::warn!("Skipping change {}: unparseable timestamp", change.id);
            return None;
        };
        Some(Review {
            status: ReviewStatus::from_api(&change.status).unwrap_or(requested),
            id: change.id,
            project: change.project,
            owner: change.owner.into_account(),
            created,
            updated,
        })
    }
}

/// Whether the server truncated a change query.
fn more_changes(changes: &[ChangeInfo]) -> bool {
    changes.last().is_some_and(|c| c.more_changes)
}

#[async_trait]
impl DataSource for RestSource {
    fn name(&self) -> &'static str {
        "gerrit-api"
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>> {
        let projects: Option<BTreeMap<String, serde_json::Value>> = self.get("projects/", &[]).await?;
        Ok(projects
            .unwrap_or_default()
            .into_keys()
            .map(|name| Project { name })
            .collect())
    }

    async fn fetch_reviews(&self, status: ReviewStatus) -> Result<Vec<Review>> {
        let q = format!("status:{}", status.as_query());
        let changes: Option<Vec<ChangeInfo>> = self
            .get("changes/", &[("q", q.as_str()), ("o", "DETAILED_ACCOUNTS")])
            .await?;
        let changes = changes.unwrap_or_default();
        if more_changes(&changes) {
            log::warn!(
                "Gerrit returned only the first {} {} changes; statistics will be incomplete",
                changes.len(),
                status.as_query()
            );
        }
        let reviews: Vec<Review> = changes
            .into_iter()
            .filter_map(|c| Self::to_review(c, status))
            .collect();
        log::debug!("Fetched {} {} reviews", reviews.len(), status.as_query());
        Ok(reviews)
    }

    async fn fetch_reviewers(&self, review_id: &str) -> Result<Vec<ReviewerVote>> {
        let reviewers: Option<Vec<ReviewerInfo>> = self
            .get(&format!("changes/{review_id}/reviewers/"), &[])
            .await?;
        Ok(reviewers
            .unwrap_or_default()
            .into_iter()
            .map(|r| ReviewerVote {
                score: r.approvals.get(CODE_REVIEW).and_then(|v| Score::parse(v)),
                account: r.account.into_account(),
            })
            .collect())
    }

    fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }
}
