use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loginfence::alerting::{AlertDispatcher, AlertQueue};
use loginfence::commands::CommandError;
use loginfence::config::Config;
use loginfence::detection::AuthorizationEngine;
use loginfence::input::{InputClosed, Request, RequestError, Response, StdinListener};
use loginfence::models::AuditRecord;
use loginfence::output::{OutputFormat, OutputHandler};

/// Login gate bridge: requests on stdin, one JSON reply per line on stdout
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting login fence daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fence.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file {:?} not found, using defaults", config_path);
        Config::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let engine = AuthorizationEngine::from_config(&config)?;

    let mut output_handler = OutputHandler::new(
        OutputFormat::parse(&config.output.format),
        config.output.file_path.clone(),
    )?;

    // Alerts are the only async work, so they get their own small runtime
    let mut alert_runtime = None;
    let mut alert_queue = None;
    if config.alerting.enabled {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let (tx, rx) = AlertDispatcher::create_channel();
        runtime.spawn(AlertDispatcher::new(config.alerting.clone()).run(rx));
        alert_queue = Some(AlertQueue::new(tx));
        alert_runtime = Some(runtime);
        log::info!("Alert dispatcher enabled");
    }

    let listener = StdinListener::spawn();
    log::info!("Daemon running. Reading requests from stdin, press Ctrl+C to stop.");

    while running.load(Ordering::SeqCst) {
        let line = match listener.read_line(Duration::from_millis(100)) {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(InputClosed) => {
                log::info!("Request input closed");
                break;
            }
        };

        if let Some(response) = handle_line(&engine, &line, &mut output_handler, alert_queue.as_ref()) {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", response.to_line())?;
            stdout.flush()?;
        }
    }

    output_handler.flush()?;
    drop(alert_queue);
    if let Some(runtime) = alert_runtime {
        runtime.shutdown_timeout(Duration::from_secs(2));
    }
    log::info!("Login fence daemon stopped");
    Ok(())
}

/// Run one request line through the engine
fn handle_line(
    engine: &AuthorizationEngine,
    line: &str,
    output_handler: &mut OutputHandler,
    alerts: Option<&AlertQueue>,
) -> Option<Response> {
    let response = match Request::parse(line) {
        Ok(Request::Login(attempt)) => {
            let verdict = engine.evaluate_login(&attempt);
            let record = AuditRecord::from_verdict(&attempt, &verdict);
            if let Err(e) = output_handler.write_record(&record) {
                log::error!("Failed to write audit record: {}", e);
            }
            if let Some(queue) = alerts {
                if !verdict.decision.is_allowed() {
                    queue.queue_alert(record);
                }
            }
            Response::decision(&attempt, &verdict)
        }
        Ok(Request::Command(command)) => Response::Command {
            reply: command.execute(engine),
        },
        Err(RequestError::Empty) => return None,
        Err(RequestError::Command(CommandError::Usage(usage))) => Response::Command {
            reply: usage.to_string(),
        },
        Err(e) => Response::Error {
            error: e.to_string(),
        },
    };
    Some(response)
}
