//! Per-deployment log files.
//!
//! Every deployment gets its own directory under the log root with one file
//! per [`LogType`]. The event pump appends lifecycle lines while a task runs
//! and the API reads them back for the log viewer, which polls with the last
//! line number it has seen.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Which of a deployment's log files to read or write.
///
/// The wire names match the `log_type` query parameter. Unknown names are
/// rejected by the API instead of being treated as file paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    /// Task and step lifecycle lines.
    #[default]
    Deployment,
    /// Step progress detail reported by the provider clients.
    Provider,
}

impl LogType {
    /// Wire name used in the `log_type` query parameter and as the response
    /// root key.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Deployment => "deployment_log",
            LogType::Provider => "provider_log",
        }
    }

    /// Parse a wire name, returning `None` for anything unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deployment_log" => Some(LogType::Deployment),
            "provider_log" => Some(LogType::Provider),
            _ => None,
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            LogType::Deployment => "deployment.log",
            LogType::Provider => "provider.log",
        }
    }
}

/// A single log line with its 1-based position in the file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogEntry {
    pub line_number: u64,
    pub text: String,
}

/// The readable contents of one log file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LogFile {
    pub entries: Vec<LogEntry>,
}

/// Appends and reads per-deployment log files under a fixed root directory.
#[derive(Debug, Clone)]
pub struct LogManager {
    root: PathBuf,
}

impl LogManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, deployment_id: Uuid, log_type: LogType) -> PathBuf {
        self.root
            .join(deployment_id.to_string())
            .join(log_type.file_name())
    }

    /// Append one timestamped line, creating the deployment's log directory
    /// and file on first use.
    pub async fn append(
        &self,
        deployment_id: Uuid,
        log_type: LogType,
        line: &str,
    ) -> std::io::Result<()> {
        let path = self.path(deployment_id, log_type);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let stamped = format!("{} {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), line);
        file.write_all(stamped.as_bytes()).await
    }

    /// Read a whole log file. `None` means the file was never written, which
    /// the API renders as a JSON `null`.
    pub async fn read_full(
        &self,
        deployment_id: Uuid,
        log_type: LogType,
    ) -> std::io::Result<Option<LogFile>> {
        self.read_after(deployment_id, log_type, 0).await
    }

    /// Read only the entries past the given 1-based line number.
    pub async fn read_after(
        &self,
        deployment_id: Uuid,
        log_type: LogType,
        line_number_gt: u64,
    ) -> std::io::Result<Option<LogFile>> {
        let path = self.path(deployment_id, log_type);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        let entries = content
            .lines()
            .enumerate()
            .map(|(index, text)| LogEntry {
                line_number: index as u64 + 1,
                text: text.to_string(),
            })
            .filter(|entry| entry.line_number > line_number_gt)
            .collect();
        Ok(Some(LogFile { entries }))
    }
}
