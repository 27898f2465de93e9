use crate::models::AuditRecord;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Output handler for login audit records
pub struct OutputHandler {
    format: OutputFormat,
    writer: Option<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl, // Default
        }
    }
}

impl OutputHandler {
    /// Create a new output handler
    ///
    /// Records go to `file_path` (appending) unless the format is console
    /// or no path is given, in which case they go to stderr so stdout
    /// stays reserved for bridge replies.
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        let writer: Option<Box<dyn Write + Send>> = match (&format, file_path) {
            (OutputFormat::Console, _) => None,
            (_, Some(path)) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Box::new(BufWriter::new(file)))
            }
            (_, None) => None,
        };

        Ok(OutputHandler {
            format,
            writer,
        })
    }

    /// Write an audit record
    pub fn write_record(&mut self, record: &AuditRecord) -> Result<(), Box<dyn std::error::Error>> {
        match &self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(record)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Jsonl => {
                let json = serde_json::to_string(record)?;
                self.write_output(&format!("{}\n", json))?;
            }
            OutputFormat::Console => {
                let verdict = match record.reason {
                    None => "ALLOW".to_string(),
                    Some(reason) => format!("DENY {}", reason),
                };
                let output = format!(
                    "[{}] {} {} - {}\n",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    verdict,
                    record.username,
                    record.describe()
                );
                self.write_output(&output)?;
            }
        }
        Ok(())
    }

    fn write_output(&mut self, data: &str) -> io::Result<()> {
        match &mut self.writer {
            Some(writer) => {
                writer.write_all(data.as_bytes())?;
                writer.flush()
            }
            None => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(data.as_bytes())?;
                stderr.flush()
            }
        }
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}
