pub mod event;

pub use event::{
    normalize_username, AuditRecord, Decision, DenyReason, LoginAttempt, LoginVerdict,
};
