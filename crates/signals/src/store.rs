//! Selection Persistence
//!
//! The selection lives in a small JSON file under the user's home directory.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader only ever sees the previous file or the new one.
//!
//! [`SelectionStore`] owns the authoritative in-memory copy. Readers get an
//! `Arc<Selection>` that never changes; an update swaps in a new one.

use crate::catalog::SignalCatalog;
use crate::error::PersistenceError;
use crate::selection::{Selection, SignalState};
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Directory created under the user's home directory
pub const APP_DIR_NAME: &str = "obd_dashboard";

/// Selection file name inside [`APP_DIR_NAME`]
pub const SELECTION_FILE_NAME: &str = "config.json";

/// Default location of the selection file
pub fn default_selection_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(SELECTION_FILE_NAME)
}

/// Read the selection file strictly
pub fn read_selection(path: &Path, catalog: &SignalCatalog) -> Result<Selection, PersistenceError> {
    let content = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&content)?;
    Ok(Selection::from_states(
        catalog,
        raw.into_iter()
            .map(|(key, value)| {
                let state = SignalState::coerce(&value);
                (key, state)
            }),
    ))
}

/// Load the selection, falling back to all-enabled when the file is missing
/// or unreadable.
pub fn load_selection(path: &Path, catalog: &SignalCatalog) -> Selection {
    match read_selection(path, catalog) {
        Ok(selection) => {
            info!(path = %path.display(), "Loaded signal selection");
            selection
        }
        Err(PersistenceError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No saved signal selection, enabling all signals");
            Selection::all_enabled(catalog)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Unreadable signal selection, enabling all signals");
            Selection::all_enabled(catalog)
        }
    }
}

/// Write the selection atomically (temp file, fsync, rename)
pub fn save_selection(path: &Path, selection: &Selection) -> Result<(), PersistenceError> {
    let content = serde_json::to_string_pretty(selection)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| PersistenceError::io(&dir, e))?;

    let base = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(SELECTION_FILE_NAME);

    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                let written = tmp
                    .write_all(content.as_bytes())
                    .and_then(|_| tmp.write_all(b"\n"))
                    .and_then(|_| tmp.sync_all());
                if let Err(e) = written {
                    let _ = fs::remove_file(&candidate);
                    return Err(PersistenceError::io(&candidate, e));
                }
                break candidate;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
            }
            Err(e) => return Err(PersistenceError::io(&candidate, e)),
        }
    };

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(PersistenceError::io(path, e));
    }
    if let Ok(dir_file) = File::open(&dir) {
        let _ = dir_file.sync_all();
    }
    debug!(path = %path.display(), "Saved signal selection");
    Ok(())
}

/// Authoritative selection for the running process
pub struct SelectionStore {
    path: PathBuf,
    catalog: Arc<SignalCatalog>,
    current: watch::Sender<Arc<Selection>>,
    /// Serializes update + save so file and memory agree on the last writer
    write_lock: Mutex<()>,
}

impl SelectionStore {
    /// Load the selection from `path` (or the default) and hold it
    pub fn open(path: PathBuf, catalog: Arc<SignalCatalog>) -> Self {
        let selection = load_selection(&path, &catalog);
        let (current, _) = watch::channel(Arc::new(selection));
        Self {
            path,
            catalog,
            current,
            write_lock: Mutex::new(()),
        }
    }

    /// Current selection
    pub fn current(&self) -> Arc<Selection> {
        self.current.borrow().clone()
    }

    /// Receiver that always observes the latest committed selection
    pub fn subscribe(&self) -> watch::Receiver<Arc<Selection>> {
        self.current.subscribe()
    }

    pub fn catalog(&self) -> &Arc<SignalCatalog> {
        &self.catalog
    }

    /// Apply a setup form submission (full replace) and persist it
    pub fn update(&self, form: &HashMap<String, String>) -> Arc<Selection> {
        self.replace(Selection::from_form(&self.catalog, form))
    }

    /// Swap in a new selection and persist it. A failed save is logged; the
    /// new selection stays in effect for this run either way.
    pub fn replace(&self, selection: Selection) -> Arc<Selection> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let selection = Arc::new(selection);
        self.current.send_replace(selection.clone());

        match save_selection(&self.path, &selection) {
            Ok(()) => {
                counter!("obd_selection_saves_total", "result" => "ok").increment(1);
                info!(
                    path = %self.path.display(),
                    enabled = selection.enabled(&self.catalog).count(),
                    "Signal selection updated"
                );
            }
            Err(err) => {
                counter!("obd_selection_saves_total", "result" => "error").increment(1);
                error!(path = %self.path.display(), error = %err, "Failed to persist signal selection");
            }
        }
        selection
    }
}
