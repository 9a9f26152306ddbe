//! Review and commit statistics for a Gerrit code-review server.
//!
//! Raw records come from a [`source::DataSource`] (the Gerrit REST API or a
//! SQLite copy of the review database), are reduced by [`metrics`], cached
//! per metric and time window in a [`Cache`], and served by [`server`].

pub mod cache;
pub mod config;
pub mod date_util;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod server;
pub mod source;
pub mod storage;
pub mod window;

pub use cache::Cache;
pub use config::{Config, SourceKind};
pub use engine::{Metric, StatsEngine};
pub use error::{Error, Result};
pub use metrics::{DashboardSummary, StatsResult};
pub use source::{DataSource, RestSource, SqlSource};
pub use storage::Database;
pub use window::FilterWindow;
