use std::path::{Path, PathBuf};
use structopt::StructOpt;

use loginfence::commands::run_command;
use loginfence::config::Config;
use loginfence::detection::AuthorizationEngine;
use loginfence::models::LoginAttempt;

/// Login fence administration CLI
#[derive(StructOpt, Debug)]
#[structopt(name = "fence", about = "Username whitelist and origin fence administration")]
pub struct Cli {
    /// Path to configuration file
    #[structopt(short, long, default_value = "fence.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "fence.toml")]
        output: PathBuf,
    },
    /// Add or remove a whitelisted player
    Whitelist {
        /// "add" or "remove"
        action: String,
        username: String,
    },
    /// Forget a player's trusted origin
    ResetOrigin { username: String },
    /// Show whitelisted players and their trusted origins
    List,
    /// Evaluate a login the way the proxy would (records the origin when allowed)
    Check { username: String, origin: String },
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        log::warn!("Config file {:?} not found, using defaults", path);
        Ok(Config::default())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::from_args();

    if let Command::Config { output } = &cli.command {
        Config::default().to_file(output)?;
        println!("Default configuration written to: {:?}", output);
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let engine = AuthorizationEngine::from_config(&config)?;

    match cli.command {
        Command::Config { .. } => {}
        Command::Whitelist { action, username } => {
            println!("{}", run_command(&engine, "whitelist", &[action.as_str(), username.as_str()]));
        }
        Command::ResetOrigin { username } => {
            println!("{}", run_command(&engine, "resetip", &[username.as_str()]));
        }
        Command::List => {
            let players = engine.whitelist_entries();
            let origins = engine.tracked_origins();
            println!("{} whitelisted player(s):", players.len());
            for player in &players {
                let origin = origins
                    .iter()
                    .find(|(user, _)| user == player)
                    .map(|(_, origin)| origin.as_str())
                    .unwrap_or("-");
                println!("  {:<16} {}", player, origin);
            }
            let stale = origins.iter().filter(|(user, _)| !players.contains(user)).count();
            if stale > 0 {
                println!("{} tracked origin(s) belong to players no longer whitelisted", stale);
            }
        }
        Command::Check { username, origin } => {
            let verdict = engine.evaluate_login(&LoginAttempt::new(&username, &origin));
            match verdict.decision.reason() {
                None => println!(
                    "ALLOW {} (origin {})",
                    username,
                    verdict.current_origin.as_deref().unwrap_or("not tracked")
                ),
                Some(reason) => println!(
                    "DENY {} ({}): {}",
                    username,
                    reason,
                    verdict.message.as_deref().unwrap_or("")
                ),
            }
        }
    }

    Ok(())
}
