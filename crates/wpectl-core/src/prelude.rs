pub use crate::catalog::{CatalogEntry, DirectorySet, ScanOutcome};
pub use crate::command::{LastSelection, Selection, synthesize};
pub use crate::config::ConfigStore;
pub use crate::engine::{EngineLister, EngineProcess, ListingOutcome, PropertyLister};
pub use crate::error::{EngineError, Result};
pub use crate::properties::{PropertyRecord, parse_listing};
pub use crate::screens::Screen;
pub use crate::service::{EngineService, PropertyLoad, ScanSummary};
pub use crate::store::{PropertyStore, StoredProperty, normalize_value};
pub use crate::watcher::{LibraryEvent, LibraryWatcher};
