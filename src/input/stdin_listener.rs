use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Reads request lines on a background thread
///
/// Polling with a timeout keeps the caller responsive to shutdown even
/// while no input arrives.
pub struct StdinListener {
    rx: Receiver<String>,
}

impl StdinListener {
    /// Listen on the process's standard input
    pub fn spawn() -> Self {
        Self::from_reader(std::io::stdin())
    }

    /// Listen on any reader (used by tests and embedders)
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(reader).lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Error reading requests: {}", e);
                        break;
                    }
                }
            }
            log::debug!("Request input closed");
        });
        StdinListener { rx }
    }

    /// Wait up to `timeout` for the next line
    ///
    /// Returns `Ok(None)` on timeout and [`InputClosed`] once input has ended.
    pub fn read_line(&self, timeout: Duration) -> Result<Option<String>, InputClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(InputClosed),
        }
    }
}

/// The input stream reached end of file
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("request input closed")]
pub struct InputClosed;
