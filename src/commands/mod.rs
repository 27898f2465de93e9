//! Operator commands
//!
//! `/whitelist <add|remove> <username>` and `/resetIP <username>`. Misuse
//! always answers with the fixed usage string and changes nothing.

use thiserror::Error;

use crate::detection::AuthorizationEngine;

pub const WHITELIST_USAGE: &str = "Usage: /whitelist <add|remove> <username>";
pub const RESET_ORIGIN_USAGE: &str = "Usage: /resetIP <username>";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    WhitelistAdd(String),
    WhitelistRemove(String),
    ResetOrigin(String),
}

impl AdminCommand {
    /// Parse a command name and its arguments
    pub fn parse(name: &str, args: &[&str]) -> Result<Self, CommandError> {
        match name.trim_start_matches('/').to_lowercase().as_str() {
            "whitelist" => match args {
                [action, username] => match action.to_lowercase().as_str() {
                    "add" => Ok(AdminCommand::WhitelistAdd(username.to_lowercase())),
                    "remove" => Ok(AdminCommand::WhitelistRemove(username.to_lowercase())),
                    _ => Err(CommandError::Usage(WHITELIST_USAGE)),
                },
                _ => Err(CommandError::Usage(WHITELIST_USAGE)),
            },
            "resetip" => match args {
                [username] => Ok(AdminCommand::ResetOrigin(username.to_lowercase())),
                _ => Err(CommandError::Usage(RESET_ORIGIN_USAGE)),
            },
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Parse a whole line such as `/whitelist add Steve`
    pub fn parse_line(line: &str) -> Result<Self, CommandError> {
        let mut words = line.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| CommandError::Unknown(String::new()))?;
        let args: Vec<&str> = words.collect();
        Self::parse(name, &args)
    }

    /// Apply the command and return the reply for the operator
    pub fn execute(&self, engine: &AuthorizationEngine) -> String {
        let result = match self {
            AdminCommand::WhitelistAdd(user) => engine
                .whitelist_add(user)
                .map(|_| format!("Added {} to the whitelist.", user)),
            AdminCommand::WhitelistRemove(user) => engine
                .whitelist_remove(user)
                .map(|_| format!("Removed {} from the whitelist.", user)),
            AdminCommand::ResetOrigin(user) => engine
                .reset_origin(user)
                .map(|_| format!("IP address for {} has been removed.", user)),
        };
        result.unwrap_or_else(|e| e.to_string())
    }
}

/// Parse and run a command, answering misuse with its usage string
pub fn run_command(engine: &AuthorizationEngine, name: &str, args: &[&str]) -> String {
    match AdminCommand::parse(name, args) {
        Ok(command) => command.execute(engine),
        Err(e) => e.to_string(),
    }
}
