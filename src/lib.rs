//! Escalation and intent analytics over chatbot conversation inference exports.
//!
//! The pipeline is load → filter → aggregate → detect → format:
//!
//! ```no_run
//! use chat_analytics::{report, DashboardConfig, RecordFilter, SessionContext};
//!
//! let mut session = SessionContext::new(DashboardConfig::default()).expect("config");
//! session.load(&["sessions.csv"]).expect("input");
//! let dashboard = session.dashboard(&RecordFilter::default());
//! println!("{}", report::build_report(&dashboard).expect("report"));
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod models;
pub mod report;
pub mod session;
pub mod spike;

pub use config::{ColumnMapping, DashboardConfig};
pub use error::{AnalyticsError, ConfigError};
pub use filter::RecordFilter;
pub use models::{
    AggregateBucket, ConversationRecord, Granularity, Grouping, Overview, Source, SpikeAlert,
    TimeBucket,
};
pub use session::{Dashboard, SessionContext};
pub use spike::SpikeConfig;
