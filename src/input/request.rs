//! Bridge request grammar
//!
//! One request per line:
//!
//! ```text
//! login <username> <origin>
//! /whitelist add <username>
//! /resetIP <username>
//! ```

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::commands::{AdminCommand, CommandError};
use crate::models::{DenyReason, LoginAttempt, LoginVerdict};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Empty request")]
    Empty,

    #[error("Usage: login <username> <origin>")]
    LoginUsage,

    #[error("{0}")]
    Command(#[from] CommandError),
}

#[derive(Debug, Clone)]
pub enum Request {
    Login(LoginAttempt),
    Command(AdminCommand),
}

fn login_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i:login)\s+(?P<user>\S+)\s+(?P<origin>\S+)$").expect("login pattern is valid")
    })
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RequestError::Empty);
        }

        if let Some(caps) = login_pattern().captures(line) {
            return Ok(Request::Login(LoginAttempt::new(&caps["user"], &caps["origin"])));
        }
        let is_login = line
            .split_whitespace()
            .next()
            .is_some_and(|word| word.eq_ignore_ascii_case("login"));
        if is_login {
            return Err(RequestError::LoginUsage);
        }

        Ok(Request::Command(AdminCommand::parse_line(line)?))
    }
}

/// One line of bridge output
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Decision {
        username: String,
        allowed: bool,
        reason: Option<DenyReason>,
        message: Option<String>,
    },
    Command {
        reply: String,
    },
    Error {
        error: String,
    },
}

impl Response {
    pub fn decision(attempt: &LoginAttempt, verdict: &LoginVerdict) -> Self {
        Response::Decision {
            username: attempt.username.clone(),
            allowed: verdict.decision.is_allowed(),
            reason: verdict.decision.reason(),
            message: verdict.message.clone(),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"type\":\"error\",\"error\":\"serialization failed: {}\"}}", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::WHITELIST_USAGE;
    use crate::models::Decision;

    #[test]
    fn test_parse_login() {
        match Request::parse("LOGIN Steve 10.0.0.5").unwrap() {
            Request::Login(attempt) => {
                assert_eq!(attempt.username, "steve");
                assert_eq!(attempt.origin, "10.0.0.5");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_login_wrong_arity() {
        assert!(matches!(Request::parse("login steve"), Err(RequestError::LoginUsage)));
        assert!(matches!(Request::parse("login a b c"), Err(RequestError::LoginUsage)));
    }

    #[test]
    fn test_parse_command() {
        assert!(matches!(
            Request::parse("/whitelist add steve"),
            Ok(Request::Command(AdminCommand::WhitelistAdd(_)))
        ));
        assert_eq!(
            Request::parse("whitelist add").unwrap_err().to_string(),
            WHITELIST_USAGE
        );
        assert!(matches!(Request::parse("   "), Err(RequestError::Empty)));
    }

    #[test]
    fn test_decision_response_json() {
        let attempt = LoginAttempt::new("steve", "10.0.0.5");
        let verdict = LoginVerdict::deny(DenyReason::NotWhitelisted, "go away");
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::NotWhitelisted));

        let line = Response::decision(&attempt, &verdict).to_line();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "decision");
        assert_eq!(value["allowed"], false);
        assert_eq!(value["reason"], "not_whitelisted");
        assert_eq!(value["message"], "go away");
    }
}
