//! Experiment tracking
//!
//! Training code talks to a [TrackingClient], a cloneable handle over one [Tracker] sink. The
//! client enforces the run lifecycle: `init` once, then metrics and artifacts, then `close`.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

/// Tracking sink that writes to a run directory
pub mod file;

/// Forward learner metrics to the log and the tracking sink
pub mod renderer;

pub use file::FileTracker;
pub use renderer::TrackingRenderer;

/// Tracking Error
#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    /// The sink could not write an event or copy an artifact
    #[error("tracking i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// An event or the run configuration could not be serialized
    #[error("unable to serialize tracking event: {0}")]
    Json(#[from] serde_json::Error),

    /// Metrics or artifacts were logged before `init`
    #[error("the tracking run has not been initialized")]
    NotStarted,

    /// `init` was called twice
    #[error("the tracking run is already initialized")]
    AlreadyStarted,

    /// The run was used after `close`
    #[error("the tracking run is closed")]
    Closed,
}

/// The kind of a logged artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Source code used to produce the run
    Code,

    /// Trained model weights and configuration
    Model,
}

/// Something that happened during a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// The run started
    Init {
        /// Run name
        name: String,

        /// Group of related runs, usually the dataset
        group: String,

        /// The full run configuration
        config: serde_json::Value,
    },

    /// Scalar metrics at a global training step
    Metrics {
        /// Global step (optimizer updates since the start of training)
        step: usize,

        /// Metric values keyed by `<split>/<metric>`
        values: BTreeMap<String, f64>,
    },

    /// A file or directory worth keeping with the run
    Artifact {
        /// Artifact name
        name: String,

        /// Artifact kind
        kind: ArtifactKind,

        /// Where the artifact lives
        path: PathBuf,
    },

    /// The run finished
    Close,
}

/// A destination for tracking events
pub trait Tracker: Send {
    /// Record one event
    fn record(&mut self, event: &Event) -> Result<(), TrackingError>;

    /// Push buffered events to their destination
    fn flush(&mut self) -> Result<(), TrackingError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Closed,
}

struct Session {
    tracker: Box<dyn Tracker>,
    lifecycle: Lifecycle,
}

/// A shared handle to the tracking sink of the current run
#[derive(Clone)]
pub struct TrackingClient {
    session: Arc<Mutex<Session>>,
}

impl TrackingClient {
    /// Wrap a sink. Nothing is recorded until [TrackingClient::init].
    pub fn new(tracker: impl Tracker + 'static) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session {
                tracker: Box::new(tracker),
                lifecycle: Lifecycle::Created,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn running(&self) -> Result<MutexGuard<'_, Session>, TrackingError> {
        let session = self.lock();

        match session.lifecycle {
            Lifecycle::Created => Err(TrackingError::NotStarted),
            Lifecycle::Running => Ok(session),
            Lifecycle::Closed => Err(TrackingError::Closed),
        }
    }

    /// Start the run, recording its configuration
    pub fn init(
        &self,
        name: &str,
        group: &str,
        config: &impl Serialize,
    ) -> Result<(), TrackingError> {
        let mut session = self.lock();

        match session.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(TrackingError::AlreadyStarted),
            Lifecycle::Closed => return Err(TrackingError::Closed),
        }

        session.tracker.record(&Event::Init {
            name: name.to_string(),
            group: group.to_string(),
            config: serde_json::to_value(config)?,
        })?;
        session.lifecycle = Lifecycle::Running;

        Ok(())
    }

    /// Record scalar metrics at a global step
    pub fn log_metrics<K: Into<String>>(
        &self,
        step: usize,
        values: impl IntoIterator<Item = (K, f64)>,
    ) -> Result<(), TrackingError> {
        let values: BTreeMap<String, f64> =
            values.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if values.is_empty() {
            return Ok(());
        }

        self.running()?
            .tracker
            .record(&Event::Metrics { step, values })
    }

    /// Record an artifact
    pub fn log_artifact(
        &self,
        name: &str,
        kind: ArtifactKind,
        path: impl AsRef<Path>,
    ) -> Result<(), TrackingError> {
        self.running()?.tracker.record(&Event::Artifact {
            name: name.to_string(),
            kind,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Push buffered events to the sink's destination
    pub fn flush(&self) -> Result<(), TrackingError> {
        self.lock().tracker.flush()
    }

    /// Finish the run. Closing a run twice is a no-op.
    pub fn close(&self) -> Result<(), TrackingError> {
        let mut session = self.lock();

        match session.lifecycle {
            Lifecycle::Closed => return Ok(()),
            Lifecycle::Created => {}
            Lifecycle::Running => session.tracker.record(&Event::Close)?,
        }

        session.lifecycle = Lifecycle::Closed;
        session.tracker.flush()
    }
}
