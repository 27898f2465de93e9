use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalize a username the way every store and lookup expects it.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A single inbound login handed over by the proxy
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub origin: String,
}

impl LoginAttempt {
    pub fn new(username: &str, origin: &str) -> Self {
        LoginAttempt {
            username: normalize_username(username),
            origin: origin.trim().to_string(),
        }
    }
}

/// Why a login was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotWhitelisted,
    OriginDrift,
    LookupFailure,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DenyReason::NotWhitelisted => "not_whitelisted",
            DenyReason::OriginDrift => "origin_drift",
            DenyReason::LookupFailure => "lookup_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }
}

/// Outcome of one login evaluation
#[derive(Debug, Clone)]
pub struct LoginVerdict {
    pub decision: Decision,
    /// Text shown to the player when denied
    pub message: Option<String>,
    /// Descriptor observed for this attempt, if one was resolved
    pub current_origin: Option<String>,
    /// Descriptor trusted before this attempt
    pub trusted_origin: Option<String>,
}

impl LoginVerdict {
    pub fn allow(current_origin: Option<String>, trusted_origin: Option<String>) -> Self {
        LoginVerdict {
            decision: Decision::Allow,
            message: None,
            current_origin,
            trusted_origin,
        }
    }

    pub fn deny(reason: DenyReason, message: impl Into<String>) -> Self {
        LoginVerdict {
            decision: Decision::Deny(reason),
            message: Some(message.into()),
            current_origin: None,
            trusted_origin: None,
        }
    }

    pub fn with_origins(mut self, current: Option<String>, trusted: Option<String>) -> Self {
        self.current_origin = current;
        self.trusted_origin = trusted;
        self
    }
}

/// Audit trail entry for a login decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub origin: String,
    pub allowed: bool,
    pub reason: Option<DenyReason>,
    pub current_origin: Option<String>,
    pub trusted_origin: Option<String>,
    pub message: Option<String>,
}

impl AuditRecord {
    pub fn from_verdict(attempt: &LoginAttempt, verdict: &LoginVerdict) -> Self {
        AuditRecord {
            timestamp: Utc::now(),
            username: attempt.username.clone(),
            origin: attempt.origin.clone(),
            allowed: verdict.decision.is_allowed(),
            reason: verdict.decision.reason(),
            current_origin: verdict.current_origin.clone(),
            trusted_origin: verdict.trusted_origin.clone(),
            message: verdict.message.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self.reason {
            None => format!("User '{}' allowed from {}.", self.username, self.origin),
            Some(DenyReason::NotWhitelisted) => {
                format!("User '{}' is not whitelisted (origin {}).", self.username, self.origin)
            }
            Some(DenyReason::OriginDrift) => format!(
                "User '{}' drifted from trusted origin {} to {}.",
                self.username,
                self.trusted_origin.as_deref().unwrap_or("?"),
                self.current_origin.as_deref().unwrap_or(&self.origin)
            ),
            Some(DenyReason::LookupFailure) => format!(
                "Origin lookup failed for user '{}' connecting from {}.",
                self.username, self.origin
            ),
        }
    }
}
