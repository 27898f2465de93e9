pub mod alerting;
pub mod commands;
pub mod config;
pub mod detection;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod output;
pub mod persistence;

// Re-export commonly used types
pub use models::{AuditRecord, Decision, DenyReason, LoginAttempt, LoginVerdict};
pub use detection::{AuthorizationEngine, DriftPolicy, ExactMatch, Fence, SubnetMatch};
pub use geolocation::{GeoResolver, HttpGeoResolver, MaxMindResolver};
pub use persistence::{OriginTracker, WhitelistStore};
pub use commands::AdminCommand;
pub use alerting::{AlertDispatcher, AlertQueue};
pub use config::Config;
