//! Report persistence
//!
//! The report is a JSON array of [`EnrichedAlert`]s. Each append reads the
//! current array, pushes one alert and rewrites the whole file through a
//! temp file and a rename, so readers never see a half-written array and a
//! crash keeps every alert appended before it.
//!
//! During a run a single [`ReportActor`] owns the file; producers hand it
//! completed alerts through a [`ReportHandle`].

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::types::EnrichedAlert;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Report {path} is not a JSON array of alerts: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Report writer stopped before the alert was written")]
    WriterClosed,
}

// ============================================================================
// Report File
// ============================================================================

/// Owner of one report file on disk
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    /// Open the report at `path`, creating parent directories.
    ///
    /// With `reset` (or when no report exists yet) the file is initialised
    /// to an empty array. Otherwise the existing file must already be a
    /// valid report and new alerts are appended after its contents.
    pub fn create(path: impl Into<PathBuf>, reset: bool) -> Result<Self, ReportError> {
        let writer = Self { path: path.into() };
        if let Some(parent) = writer.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| writer.io_error(source))?;
        }

        if reset || !writer.path.exists() {
            writer.write_all(&[])?;
            info!(path = %writer.path.display(), "Initialised empty report");
        } else {
            let existing = writer.read_alerts()?;
            info!(
                path = %writer.path.display(),
                alerts = existing.len(),
                "Appending to existing report"
            );
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every alert currently in the report.
    pub fn read_alerts(&self) -> Result<Vec<EnrichedAlert>, ReportError> {
        let data = std::fs::read(&self.path).map_err(|source| self.io_error(source))?;
        serde_json::from_slice(&data).map_err(|source| ReportError::Serialization {
            path: self.path.clone(),
            source,
        })
    }

    /// Append one alert (read, push, atomic rewrite). Returns the new length.
    pub fn append(&self, alert: &EnrichedAlert) -> Result<usize, ReportError> {
        let mut alerts = self.read_alerts()?;
        alerts.push(alert.clone());
        self.write_all(&alerts)?;
        Ok(alerts.len())
    }

    fn write_all(&self, alerts: &[EnrichedAlert]) -> Result<(), ReportError> {
        let json = serde_json::to_vec_pretty(alerts).map_err(|source| ReportError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp_name = self.path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, &json).map_err(|source| self.io_error(source))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> ReportError {
        ReportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

// ============================================================================
// Single-Writer Actor
// ============================================================================

enum ReportCommand {
    Append {
        alert: Box<EnrichedAlert>,
        ack: oneshot::Sender<Result<usize, ReportError>>,
    },
}

/// Handle used by producers to queue alerts for the writer
#[derive(Clone)]
pub struct ReportHandle {
    tx: mpsc::Sender<ReportCommand>,
}

impl ReportHandle {
    /// Queue `alert` and wait until it is on disk.
    pub async fn append(&self, alert: EnrichedAlert) -> Result<usize, ReportError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(ReportCommand::Append {
                alert: Box::new(alert),
                ack,
            })
            .await
            .map_err(|_| ReportError::WriterClosed)?;
        done.await.map_err(|_| ReportError::WriterClosed)?
    }
}

/// Task owning the report file for the duration of a run
pub struct ReportActor {
    writer: ReportWriter,
    rx: mpsc::Receiver<ReportCommand>,
    written: usize,
}

impl ReportActor {
    /// Create the actor and its handle; run it with [`ReportActor::run`].
    pub fn new(writer: ReportWriter, capacity: usize) -> (Self, ReportHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                writer,
                rx,
                written: 0,
            },
            ReportHandle { tx },
        )
    }

    /// Write queued alerts until every handle is dropped. Returns the number
    /// of alerts written during this run.
    pub async fn run(mut self) -> usize {
        while let Some(command) = self.rx.recv().await {
            match command {
                ReportCommand::Append { alert, ack } => {
                    let result = self.writer.append(&alert);
                    match &result {
                        Ok(len) => {
                            self.written += 1;
                            debug!(report_len = len, "Alert appended to report");
                        }
                        Err(e) => warn!(error = %e, "Failed to append alert to report"),
                    }
                    // Producer may have been cancelled; the write stands either way.
                    let _ = ack.send(result);
                }
            }
        }
        info!(
            written = self.written,
            path = %self.writer.path().display(),
            "Report writer finished"
        );
        self.written
    }
}
