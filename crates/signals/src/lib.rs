//! Signal Catalog and Selection
//!
//! The catalog names every signal the dashboard can poll; the selection says
//! which of them are enabled. The selection is persisted to a JSON file and
//! shared with the polling loop as an atomically swapped immutable value.

mod catalog;
mod error;
mod selection;
mod store;

pub use catalog::{SignalCatalog, SignalDescriptor};
pub use error::{CatalogError, PersistenceError};
pub use selection::{Selection, SignalState};
pub use store::{
    default_selection_path, load_selection, read_selection, save_selection, SelectionStore,
    APP_DIR_NAME, SELECTION_FILE_NAME,
};
