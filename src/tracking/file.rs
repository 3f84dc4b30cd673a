use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;

use crate::utils::files::copy_all;

use super::{Event, Tracker, TrackingError};

#[derive(Serialize)]
struct Line<'a> {
    timestamp: f64,

    #[serde(flatten)]
    event: &'a Event,
}

/// Appends events to `<dir>/events.jsonl` and keeps copies of artifacts under `<dir>/artifacts`
pub struct FileTracker {
    dir: PathBuf,
    events: BufWriter<File>,
}

impl FileTracker {
    /// Open (or continue) a run directory
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, TrackingError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("events.jsonl"))?;

        Ok(Self {
            dir,
            events: BufWriter::new(file),
        })
    }

    /// The run directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn store_artifact(&self, name: &str, path: &Path) -> Result<(), TrackingError> {
        let file_name = path.file_name().unwrap_or(path.as_os_str());
        let target = self.dir.join("artifacts").join(name).join(file_name);

        let copied = copy_all(path, &target)?;
        log::debug!("Stored artifact {} ({} files)", name, copied);

        Ok(())
    }
}

impl Tracker for FileTracker {
    fn record(&mut self, event: &Event) -> Result<(), TrackingError> {
        if let Event::Artifact { name, path, .. } = event {
            self.store_artifact(name, path)?;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();

        serde_json::to_writer(&mut self.events, &Line { timestamp, event })?;
        self.events.write_all(b"\n")?;

        Ok(())
    }

    fn flush(&mut self) -> Result<(), TrackingError> {
        self.events.flush()?;

        Ok(())
    }
}
