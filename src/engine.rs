//! Cache-or-compute orchestration of the dashboard and stats payloads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::OnceCell;

use crate::cache::Cache;
use crate::config::{CacheConfig, Config};
use crate::error::{Error, Result};
use crate::metrics::{
    self, DashboardSummary, DurationFilters, ReviewCounts, StatsResult,
};
use crate::model::{Review, ReviewStatus, ReviewTimeline};
use crate::source::{approvals_from_reviewers, DataSource};
use crate::window::FilterWindow;

/// A cached unit of work. The name doubles as the cache key suffix and the
/// `cache.ttl_secs` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    TotalNumberOfProjects,
    NumberOfReviews,
    AverageReviewInterval,
    NumberOfCommits,
    MostCommittedProjects,
    TopCommitters,
    TopReviewers,
    AvgMergeTime,
    AvgFirstReviewTime,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalNumberOfProjects => "totalNumberOfProjects",
            Metric::NumberOfReviews => "numberOfReviews",
            Metric::AverageReviewInterval => "averageReviewInterval",
            Metric::NumberOfCommits => "numberOfCommits",
            Metric::MostCommittedProjects => "mostCommittedProjects",
            Metric::TopCommitters => "topCommitters",
            Metric::TopReviewers => "topReviewers",
            Metric::AvgMergeTime => "avgMergeTime",
            Metric::AvgFirstReviewTime => "avgFirstReviewTime",
        }
    }

    /// Dashboard metrics span the whole history; the rest are per window.
    pub fn cache_key(&self, window: Option<FilterWindow>) -> String {
        match window {
            Some(window) => format!("{window}:{}", self.name()),
            None => self.name().to_string(),
        }
    }
}

pub struct StatsEngine {
    source: Arc<dyn DataSource>,
    cache: Arc<Cache>,
    ttl: CacheConfig,
    excluded_usernames: Vec<String>,
    duration_filters: DurationFilters,
    default_window: FilterWindow,
    default_limit: Option<usize>,
    fan_out_timeout: Duration,
}

impl StatsEngine {
    pub fn new(source: Arc<dyn DataSource>, cache: Arc<Cache>, config: &Config) -> Self {
        Self {
            source,
            cache,
            ttl: config.cache.clone(),
            excluded_usernames: config.filters.excluded_usernames.clone(),
            duration_filters: DurationFilters {
                excluded_projects: config.filters.excluded_projects.clone(),
                excluded_account_ids: config.filters.excluded_account_ids.clone(),
            },
            default_window: config.filters.default_filter,
            default_limit: config.filters.default_limit,
            fan_out_timeout: config.fan_out_timeout(),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn default_window(&self) -> FilterWindow {
        self.default_window
    }

    pub fn default_limit(&self) -> Option<usize> {
        self.default_limit
    }

    // ── Dashboard ──────────────────────────────────────────────────

    /// Whole-history summary. Each part is cached on its own.
    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        let (total_number_of_projects, number_of_reviews, interval) = self
            .with_deadline("dashboard", async {
                tokio::try_join!(
                    self.total_projects(),
                    self.review_counts(),
                    self.average_review_interval(),
                )
            })
            .await?;

        Ok(DashboardSummary {
            total_number_of_projects,
            number_of_reviews,
            average_review_interval: interval.unwrap_or(0),
        })
    }

    async fn total_projects(&self) -> Result<u64> {
        self.cached(Metric::TotalNumberOfProjects, None, || {
            self.source.count_projects()
        })
        .await
    }

    async fn review_counts(&self) -> Result<ReviewCounts> {
        self.cached(Metric::NumberOfReviews, None, || async {
            let (open, merged, abandoned, draft) = tokio::try_join!(
                self.source.count_reviews(ReviewStatus::Open),
                self.source.count_reviews(ReviewStatus::Merged),
                self.source.count_reviews(ReviewStatus::Abandoned),
                self.source.count_reviews(ReviewStatus::Draft),
            )?;
            Ok::<_, Error>(ReviewCounts { open, merged, abandoned, draft })
        })
        .await
    }

    async fn average_review_interval(&self) -> Result<Option<i64>> {
        self.cached(Metric::AverageReviewInterval, None, || async {
            let merged = self.source.fetch_reviews(ReviewStatus::Merged).await?;
            Ok::<_, Error>(metrics::average_interval_hours(
                merged.iter().map(|r| (r.created, r.updated)),
            ))
        })
        .await
    }

    // ── Stats ──────────────────────────────────────────────────────

    /// Leaderboards and averages for `window`, each list cut to `limit`.
    pub async fn stats(&self, window: FilterWindow, limit: Option<usize>) -> Result<StatsResult> {
        let since = window.boundary();
        log::debug!("Computing stats for {window} (since {since})");

        // Raw inputs shared by the metrics that miss the cache.
        let commits: OnceCell<Vec<Review>> = OnceCell::new();
        let load_commits = || commits.get_or_try_init(|| self.window_commits(since));
        let timelines: OnceCell<Option<Vec<ReviewTimeline>>> = OnceCell::new();
        let load_timelines = || timelines.get_or_try_init(|| self.source.fetch_timelines(since));
        let w = Some(window);

        let (number_of_commits, projects, committers, reviewers, merge, first_review) = self
            .with_deadline("stats", async {
                tokio::try_join!(
                    self.cached(Metric::NumberOfCommits, w, || async {
                        Ok::<_, Error>(load_commits().await?.len() as u64)
                    }),
                    self.cached(Metric::MostCommittedProjects, w, || async {
                        Ok::<_, Error>(metrics::most_committed_projects(load_commits().await?))
                    }),
                    self.cached(Metric::TopCommitters, w, || async {
                        Ok::<_, Error>(metrics::top_committers(load_commits().await?))
                    }),
                    self.cached(Metric::TopReviewers, w, || async {
                        let approvals = match self.source.fetch_approvals(since).await? {
                            Some(approvals) => approvals,
                            None => {
                                approvals_from_reviewers(
                                    self.source.as_ref(),
                                    load_commits().await?,
                                    self.source.max_concurrent_requests(),
                                )
                                .await?
                            }
                        };
                        Ok::<_, Error>(metrics::rank_approvals_to_reviewer_profiles(&approvals))
                    }),
                    self.cached(Metric::AvgMergeTime, w, || async {
                        Ok::<_, Error>(load_timelines().await?.as_deref().map(|t| {
                            metrics::average_merge_duration_by_project(t, &self.duration_filters)
                        }))
                    }),
                    self.cached(Metric::AvgFirstReviewTime, w, || async {
                        Ok::<_, Error>(load_timelines().await?.as_deref().map(|t| {
                            metrics::average_first_review_duration_by_project(
                                t,
                                &self.duration_filters,
                            )
                        }))
                    }),
                )
            })
            .await?;

        let reviewers = metrics::exclude_reviewers(reviewers, &self.excluded_usernames);
        Ok(StatsResult {
            number_of_commits,
            most_committed_projects: metrics::truncate(projects, limit),
            top_committers: metrics::truncate(committers, limit),
            top_reviewers: metrics::truncate(reviewers, limit),
            avg_merge_time: merge.map(|list| metrics::truncate(list, limit)),
            avg_first_review_time: first_review.map(|list| metrics::truncate(list, limit)),
        })
    }

    /// Open and merged non-draft reviews created inside the window.
    async fn window_commits(&self, since: NaiveDate) -> Result<Vec<Review>> {
        let (open, merged) = tokio::try_join!(
            self.source.fetch_reviews(ReviewStatus::Open),
            self.source.fetch_reviews(ReviewStatus::Merged),
        )?;
        let reviews: Vec<Review> = open
            .into_iter()
            .chain(merged)
            .filter(|r| r.status != ReviewStatus::Draft)
            .collect();
        Ok(metrics::filter_by_window(reviews, since))
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Serve `metric` from the cache, or compute and store it. Failed
    /// computations are not stored.
    async fn cached<T, F, Fut>(&self, metric: Metric, window: Option<FilterWindow>, compute: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = metric.cache_key(window);
        if let Some(value) = self.cache.get::<T>(&key) {
            log::debug!("Cache hit: {key}");
            return Ok(value);
        }
        log::debug!("Cache miss: {key}");

        let value = compute().await?;
        self.cache.set(&key, value.clone(), self.ttl.ttl_for(metric.name()));
        Ok(value)
    }

    async fn with_deadline<T>(
        &self,
        group: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.fan_out_timeout, work)
            .await
            .map_err(|_| Error::Timeout(self.fan_out_timeout, group))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as TimeDelta, Utc};

    use crate::model::{Account, Approval, Project, ReviewMessage, ReviewerVote, Score};

    #[derive(Default)]
    struct FakeSource {
        reviews: Vec<Review>,
        /// `None` makes the engine ask for reviewers review by review.
        approvals: Option<Vec<Approval>>,
        votes: Vec<ReviewerVote>,
        timelines: Option<Vec<ReviewTimeline>>,
        fail_projects: bool,
        delay: Option<std::time::Duration>,
        calls: AtomicUsize,
        review_list_calls: AtomicUsize,
        reviewer_calls: AtomicUsize,
    }

    impl FakeSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl DataSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_projects(&self) -> Result<Vec<Project>> {
            self.hit().await;
            if self.fail_projects {
                return Err(Error::Other("projects unavailable".into()));
            }
            Ok(vec![Project { name: "core".into() }, Project { name: "web".into() }])
        }

        async fn fetch_reviews(&self, status: ReviewStatus) -> Result<Vec<Review>> {
            self.hit().await;
            self.review_list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .reviews
                .iter()
                .filter(|r| {
                    r.status == status
                        || (status == ReviewStatus::Open && r.status == ReviewStatus::Draft)
                })
                .cloned()
                .collect())
        }

        async fn fetch_reviewers(&self, _review_id: &str) -> Result<Vec<ReviewerVote>> {
            self.reviewer_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.votes.clone())
        }

        async fn fetch_approvals(&self, _since: NaiveDate) -> Result<Option<Vec<Approval>>> {
            self.hit().await;
            Ok(self.approvals.clone())
        }

        fn max_concurrent_requests(&self) -> usize {
            4
        }

        async fn fetch_timelines(&self, _since: NaiveDate) -> Result<Option<Vec<ReviewTimeline>>> {
            self.hit().await;
            Ok(self.timelines.clone())
        }
    }

    fn review(project: &str, owner: &str, status: ReviewStatus, created: DateTime<Utc>) -> Review {
        Review {
            id: format!("{project}-{owner}-{created}"),
            project: project.into(),
            owner: Account { id: None, name: owner.into() },
            status,
            created,
            updated: created + TimeDelta::hours(6),
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn approval(reviewer: &str, project: &str, score: Score) -> Approval {
        Approval { reviewer: reviewer.into(), project: project.into(), score }
    }

    fn populated() -> FakeSource {
        let now = Utc::now();
        let long_ago = now - TimeDelta::days(400);
        FakeSource {
            reviews: vec![
                review("core", "ann", ReviewStatus::Open, now),
                review("core", "bob", ReviewStatus::Merged, now),
                review("web", "ann", ReviewStatus::Merged, now),
                review("api", "cid", ReviewStatus::Open, now),
                review("web", "dee", ReviewStatus::Draft, now),
                review("web", "eve", ReviewStatus::Abandoned, now),
                review("core", "old", ReviewStatus::Merged, long_ago),
            ],
            approvals: Some(vec![
                approval("jenkins", "core", Score::PlusOne),
                approval("jenkins", "core", Score::PlusOne),
                approval("jenkins", "web", Score::PlusOne),
                approval("bob", "core", Score::PlusTwo),
                approval("bob", "web", Score::MinusOne),
                approval("ann", "core", Score::Zero),
            ]),
            // same-day review, so business time equals real time
            timelines: Some(vec![ReviewTimeline {
                review_id: "1".into(),
                project: "core".into(),
                status: ReviewStatus::Merged,
                uploader_id: 1,
                created: at("2024-01-03T09:00:00Z"),
                updated: at("2024-01-03T11:00:00Z"),
                messages: vec![ReviewMessage {
                    author_id: Some(2),
                    written: at("2024-01-03T10:00:00Z"),
                }],
            }]),
            ..FakeSource::default()
        }
    }

    fn engine_with(source: Arc<FakeSource>, config: &Config) -> StatsEngine {
        StatsEngine::new(source, Arc::new(Cache::new()), config)
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.filters.excluded_usernames = vec!["jenkins".into()];
        config
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(
            Metric::TopReviewers.cache_key(Some(FilterWindow::Last30Days)),
            "LAST_30_DAYS:topReviewers"
        );
        assert_eq!(Metric::NumberOfReviews.cache_key(None), "numberOfReviews");
    }

    #[tokio::test]
    async fn test_dashboard() {
        let source = Arc::new(populated());
        let engine = engine_with(source.clone(), &config());

        let summary = engine.dashboard().await.unwrap();
        assert_eq!(summary.total_number_of_projects, 2);
        assert_eq!(
            summary.number_of_reviews,
            ReviewCounts { open: 3, merged: 3, abandoned: 1, draft: 1 }
        );
        assert_eq!(summary.average_review_interval, 6);
    }

    #[tokio::test]
    async fn test_dashboard_interval_scenario() {
        let start = at("2024-01-01T00:00:00Z");
        let mut first = review("a", "x", ReviewStatus::Merged, start);
        first.updated = start + TimeDelta::hours(24);
        let mut second = review("a", "y", ReviewStatus::Merged, start);
        second.updated = start + TimeDelta::hours(12);

        let source = Arc::new(FakeSource { reviews: vec![first, second], ..FakeSource::default() });
        let engine = engine_with(source, &config());
        assert_eq!(engine.dashboard().await.unwrap().average_review_interval, 18);
    }

    #[tokio::test]
    async fn test_dashboard_without_merged_reviews() {
        let engine = engine_with(Arc::new(FakeSource::default()), &config());
        let summary = engine.dashboard().await.unwrap();
        assert_eq!(summary.average_review_interval, 0);
        assert_eq!(summary.number_of_reviews, ReviewCounts::default());
    }

    #[tokio::test]
    async fn test_dashboard_is_idempotent_within_ttl() {
        let source = Arc::new(populated());
        let engine = engine_with(source.clone(), &config());

        let first = engine.dashboard().await.unwrap();
        let calls = source.calls();
        let second = engine.dashboard().await.unwrap();

        assert_eq!(source.calls(), calls);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_stats_contents() {
        let source = Arc::new(populated());
        let engine = engine_with(source, &config());

        let stats = engine.stats(FilterWindow::ThisMonth, None).await.unwrap();
        // open + merged in window, no drafts, no abandoned, nothing old
        assert_eq!(stats.number_of_commits, 4);
        assert_eq!(stats.most_committed_projects[0].name, "core");
        assert_eq!(stats.most_committed_projects[0].commits, 2);
        assert_eq!(stats.top_committers[0].name, "ann");

        let names: Vec<&str> = stats.top_reviewers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "ann"]);

        let merge = stats.avg_merge_time.unwrap();
        assert_eq!(merge.len(), 1);
        assert_eq!(merge[0].avg_merge_duration, 120.0);
        let first = stats.avg_first_review_time.unwrap();
        assert_eq!(first[0].avg_first_review_duration, 60.0);
    }

    #[tokio::test]
    async fn test_stats_respects_limit() {
        let source = Arc::new(populated());
        let engine = engine_with(source, &config());

        for n in 0..4 {
            let stats = engine.stats(FilterWindow::Last30Days, Some(n)).await.unwrap();
            assert!(stats.most_committed_projects.len() <= n);
            assert!(stats.top_committers.len() <= n);
            assert!(stats.top_reviewers.len() <= n);
            assert!(stats.avg_merge_time.unwrap().len() <= n);
            assert!(stats.avg_first_review_time.unwrap().len() <= n);
        }
    }

    #[tokio::test]
    async fn test_denylist_applies_before_truncation() {
        let source = Arc::new(populated());
        let engine = engine_with(source, &config());
        let stats = engine.stats(FilterWindow::Today, Some(1)).await.unwrap();
        assert_eq!(stats.top_reviewers.len(), 1);
        assert_eq!(stats.top_reviewers[0].name, "bob");
    }

    #[tokio::test]
    async fn test_stats_cached_per_window() {
        let source = Arc::new(populated());
        let engine = engine_with(source.clone(), &config());

        let first = engine.stats(FilterWindow::ThisWeek, Some(1)).await.unwrap();
        let calls = source.calls();
        // open + merged reviews, approvals and timelines, each fetched once
        assert_eq!(calls, 4);

        // a larger limit is served from the untruncated cached values
        let wider = engine.stats(FilterWindow::ThisWeek, None).await.unwrap();
        assert_eq!(source.calls(), calls);
        assert_eq!(wider.top_committers[0], first.top_committers[0]);
        assert!(wider.top_committers.len() > first.top_committers.len());

        engine.stats(FilterWindow::Last6Months, None).await.unwrap();
        assert_eq!(source.calls(), calls * 2);
    }

    #[tokio::test]
    async fn test_durations_absent_without_timelines() {
        let source = Arc::new(FakeSource { timelines: None, ..populated() });
        let engine = engine_with(source, &config());

        let stats = engine.stats(FilterWindow::ThisMonth, None).await.unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("avgMergeTime").is_none());
        assert!(json.get("avgFirstReviewTime").is_none());
        assert!(json.get("topReviewers").is_some());
    }

    #[tokio::test]
    async fn test_failure_propagates_and_is_not_cached() {
        let source = Arc::new(FakeSource { fail_projects: true, ..populated() });
        let cache = Arc::new(Cache::new());
        let engine = StatsEngine::new(source, cache.clone(), &config());

        let err = engine.dashboard().await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
        assert!(!cache.has(&Metric::TotalNumberOfProjects.cache_key(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_deadline() {
        let source = Arc::new(FakeSource {
            delay: Some(std::time::Duration::from_secs(30)),
            ..populated()
        });
        let mut config = config();
        config.fan_out_timeout_secs = 5;
        let engine = engine_with(source, &config);

        let err = engine.dashboard().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_, "dashboard")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_deadline() {
        let source = Arc::new(FakeSource {
            delay: Some(std::time::Duration::from_secs(30)),
            ..populated()
        });
        let mut config = config();
        config.fan_out_timeout_secs = 5;
        let cache = Arc::new(Cache::new());
        let engine = StatsEngine::new(source, cache.clone(), &config);

        let err = engine.stats(FilterWindow::ThisMonth, None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_, "stats")));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_reviewer_fan_out_reuses_commit_fetch() {
        let source = Arc::new(FakeSource {
            approvals: None,
            votes: vec![
                ReviewerVote {
                    account: Account { id: None, name: "zed".into() },
                    score: Some(Score::PlusOne),
                },
                // owner of every review below except one
                ReviewerVote {
                    account: Account { id: None, name: "ann".into() },
                    score: Some(Score::PlusTwo),
                },
            ],
            ..populated()
        });
        let engine = engine_with(source.clone(), &config());

        let stats = engine.stats(FilterWindow::ThisMonth, None).await.unwrap();
        // open + merged fetched once and shared with the reviewer fan-out
        assert_eq!(source.review_list_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.reviewer_calls.load(Ordering::SeqCst), 4);

        let reviewers: Vec<(&str, u64)> = stats
            .top_reviewers
            .iter()
            .map(|p| (p.name.as_str(), p.reviews))
            .collect();
        // four commits in window: ann owns two, bob and cid one each
        assert_eq!(reviewers, vec![("zed", 4), ("ann", 2)]);
    }
}
