//! Build event types for JSON output.
//!
//! With `--message-format json` every event is written to stdout as a single
//! JSON object per line. Human mode prints Cargo-style status lines to stderr
//! instead.
//!
//! # Event Types
//!
//! - `build-started`: the run began
//! - `stage-started` / `stage-finished`: a pipeline stage began or ended
//! - `bundle-artifact`: a bundle task (or the postbuild pass) wrote files
//! - `build-finished`: the run ended (success or failure)

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// How progress is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Human,
    Json,
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(MessageFormat::Human),
            "json" => Ok(MessageFormat::Json),
            _ => Err(format!(
                "invalid message format '{}'; expected 'human' or 'json'",
                s
            )),
        }
    }
}

/// A build event emitted during the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    BuildStarted {
        project: String,
        /// Profile of the packaged binary module
        profile: String,
        /// Stage names in execution order
        stages: Vec<String>,
    },

    #[serde(rename = "stage-started")]
    StageStarted { stage: String },

    #[serde(rename = "stage-finished")]
    StageFinished {
        stage: String,
        success: bool,
        duration_ms: u64,
    },

    /// Files written by one bundle target.
    #[serde(rename = "bundle-artifact")]
    BundleArtifact {
        target: String,
        strategy: String,
        filenames: Vec<PathBuf>,
    },

    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        host_triple: Option<String>,
    },
}

impl BuildEvent {
    /// Serialize the event to a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"reason":"diagnostic","level":"error","message":"serialization failed: {}"}}"#,
                e
            )
        })
    }
}

/// Destination for build events and status lines.
///
/// Cloning shares the destination; events from concurrent bundle tasks are
/// written whole, one line each.
#[derive(Debug, Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

#[derive(Debug)]
enum SinkInner {
    Human { quiet: bool },
    Json,
    Capture(Mutex<Vec<BuildEvent>>),
}

impl EventSink {
    pub fn new(format: MessageFormat) -> Self {
        let inner = match format {
            MessageFormat::Human => SinkInner::Human { quiet: false },
            MessageFormat::Json => SinkInner::Json,
        };
        EventSink {
            inner: Arc::new(inner),
        }
    }

    /// Human mode without status lines.
    pub fn quiet() -> Self {
        EventSink {
            inner: Arc::new(SinkInner::Human { quiet: true }),
        }
    }

    /// Record events in memory instead of printing them.
    pub fn capture() -> Self {
        EventSink {
            inner: Arc::new(SinkInner::Capture(Mutex::new(Vec::new()))),
        }
    }

    /// Whether human status lines and progress bars should be shown.
    pub fn is_interactive(&self) -> bool {
        matches!(*self.inner, SinkInner::Human { quiet: false })
    }

    pub fn emit(&self, event: BuildEvent) {
        match &*self.inner {
            SinkInner::Json => {
                let line = event.to_json();
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                let _ = writeln!(lock, "{}", line);
            }
            SinkInner::Capture(events) => {
                if let Ok(mut events) = events.lock() {
                    events.push(event);
                }
            }
            SinkInner::Human { .. } => {}
        }
    }

    /// Print a right-aligned status line in human mode.
    pub fn status(&self, verb: &str, message: impl std::fmt::Display) {
        if self.is_interactive() {
            eprintln!("{:>12} {}", verb, message);
        }
    }

    /// Events recorded by a capturing sink.
    pub fn captured(&self) -> Vec<BuildEvent> {
        match &*self.inner {
            SinkInner::Capture(events) => events.lock().map(|e| e.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        EventSink::new(MessageFormat::Human)
    }
}
