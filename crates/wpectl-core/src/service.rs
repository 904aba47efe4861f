use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task;
use tracing::{debug, info, warn};

use crate::catalog::{self, CatalogEntry};
use crate::command::{self, Selection};
use crate::config::ConfigStore;
use crate::discovery;
use crate::engine::{locate_engine, EngineLister, EngineProcess, PropertyLister};
use crate::error::{EngineError, Result};
use crate::properties::{self, PropertyRecord};
use crate::screens;
use crate::store::PropertyStore;
use crate::watcher::{LibraryEvent, LibraryWatcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub added: usize,
    pub is_append: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyLoad {
    pub count: usize,
    pub timed_out: bool,
    pub exit_code: Option<i32>,
}

/// The consolidation point of the engine: owns the catalog, the property
/// store, the configuration document, the watcher and the external-process
/// handles. At most one scan and one listing run at a time; background work
/// hands its result back here before any shared state changes.
///
/// Must be created inside a tokio runtime (the watcher spawns its debounce
/// task on construction).
pub struct EngineService {
    config: Mutex<ConfigStore>,
    store: Mutex<PropertyStore>,
    catalog: RwLock<Vec<CatalogEntry>>,
    watcher: Mutex<LibraryWatcher>,
    lister: Arc<dyn PropertyLister>,
    process: EngineProcess,
    scan_gate: tokio::sync::Mutex<()>,
    listing_gate: tokio::sync::Mutex<()>,
}

impl EngineService {
    pub fn new(config: ConfigStore) -> Self {
        Self::with_parts(config, Arc::new(EngineLister::new()), EngineProcess::new())
    }

    pub fn with_parts(
        config: ConfigStore,
        lister: Arc<dyn PropertyLister>,
        process: EngineProcess,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            store: Mutex::new(PropertyStore::new()),
            catalog: RwLock::new(Vec::new()),
            watcher: Mutex::new(LibraryWatcher::new()),
            lister,
            process,
            scan_gate: tokio::sync::Mutex::new(()),
            listing_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Debounced "library changed" signals from the watcher.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<LibraryEvent> {
        self.watcher.lock().subscribe()
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.catalog.read().clone()
    }

    /// Full rescan: discovery plus catalog walk, replacing the displayed
    /// catalog and re-arming the watcher on the roots actually used.
    pub async fn rescan(&self) -> Result<ScanSummary> {
        self.scan_with(None).await
    }

    /// Additive scan of one extra directory, merged into the catalog.
    pub async fn scan_extra(&self, dir: PathBuf) -> Result<ScanSummary> {
        self.scan_with(Some(dir)).await
    }

    async fn scan_with(&self, extra: Option<PathBuf>) -> Result<ScanSummary> {
        let _gate = self
            .scan_gate
            .try_lock()
            .map_err(|_| EngineError::ScanInProgress)?;

        let roots = task::spawn_blocking(discovery::discover)
            .await
            .map_err(|err| EngineError::Task(err.to_string()))?;
        let outcome = catalog::scan_task(roots, extra).await?;

        self.watcher.lock().update_watches(&outcome.roots);

        let mut catalog = self.catalog.write();
        let added;
        if outcome.is_append {
            let existing: HashSet<String> =
                catalog.iter().map(|entry| entry.id.clone()).collect();
            let fresh: Vec<CatalogEntry> = outcome
                .entries
                .into_iter()
                .filter(|entry| !existing.contains(&entry.id))
                .collect();
            added = fresh.len();
            catalog.extend(fresh);
            catalog.sort_by_key(|entry| entry.title.to_lowercase());
        } else {
            added = outcome.entries.len();
            *catalog = outcome.entries;
        }
        info!(total = catalog.len(), added, append = outcome.is_append, "scan finished");
        Ok(ScanSummary {
            total: catalog.len(),
            added,
            is_append: outcome.is_append,
        })
    }

    /// Runs the external listing for `background_id`, parses whatever came
    /// back (even on timeout or a non-zero exit) and installs the merge of
    /// parsed defaults and persisted overrides into the store.
    pub async fn load_properties(&self, background_id: &str) -> Result<PropertyLoad> {
        let _gate = self
            .listing_gate
            .try_lock()
            .map_err(|_| EngineError::ListingInProgress)?;

        let outcome = self.lister.list_properties(background_id).await?;
        let parsed = properties::parse_listing(&outcome.output);
        debug!(
            background_id,
            parsed = parsed.len(),
            timed_out = outcome.timed_out,
            "property listing finished"
        );

        let overrides = self
            .config
            .lock()
            .data
            .properties_by_wallpaper
            .get(background_id)
            .cloned();
        let count = self
            .store
            .lock()
            .merge_defaults(background_id, parsed, overrides.as_ref());
        Ok(PropertyLoad {
            count,
            timed_out: outcome.timed_out,
            exit_code: outcome.exit_code,
        })
    }

    /// Populates the store for an item from its persisted mapping alone,
    /// without touching the external binary.
    pub fn recall_properties(&self, background_id: &str) -> usize {
        let persisted = self
            .config
            .lock()
            .data
            .properties_by_wallpaper
            .get(background_id)
            .cloned()
            .unwrap_or_default();
        let count = persisted.len();
        self.store.lock().restore(background_id, &persisted);
        count
    }

    pub fn set_property(&self, background_id: &str, name: &str, value: &str) -> bool {
        self.store.lock().set_value(background_id, name, value)
    }

    pub fn properties(&self, background_id: &str) -> BTreeMap<String, PropertyRecord> {
        self.store
            .lock()
            .records(background_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Synthesizes the command for `selection`, restarts the engine with it
    /// and persists the selection plus the item's property mapping. The
    /// binary is resolved before the running wallpaper is touched, so a
    /// missing install never kills the current wallpaper.
    pub async fn apply(&self, selection: &Selection) -> Result<Vec<String>> {
        if locate_engine(self.process.binary()).is_none() {
            return Err(EngineError::EngineNotFound(self.process.binary().to_owned()));
        }

        let screens = screens::detect_screens().await;
        let records = self.properties(&selection.background_id);
        let args = command::synthesize(selection, &screens, &records);

        if let Err(err) = self.process.stop().await {
            warn!(%err, "stopping previous wallpaper failed");
        }
        self.process.start(&args).await?;
        self.persist(selection);
        Ok(args)
    }

    pub async fn stop(&self) -> Result<()> {
        self.process.stop().await
    }

    /// Replays the persisted last selection, if any.
    pub async fn restore_last(&self) -> Result<Option<Vec<String>>> {
        let last = self.config.lock().data.last_wallpaper.clone();
        let Some(last) = last else {
            return Ok(None);
        };
        let selection = Selection::from_last(&last);
        self.recall_properties(&selection.background_id);
        self.apply(&selection).await.map(Some)
    }

    pub fn stop_watching(&self) {
        self.watcher.lock().stop();
    }

    fn persist(&self, selection: &Selection) {
        let persisted = self.store.lock().persisted(&selection.background_id);
        let mut config = self.config.lock();
        config.data.last_wallpaper = Some(selection.to_last());
        if !selection.background_id.is_empty() {
            config
                .data
                .properties_by_wallpaper
                .insert(selection.background_id.clone(), persisted);
        }
        if let Err(err) = config.save() {
            warn!(%err, "could not save configuration, continuing in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ListingOutcome;
    use async_trait::async_trait;
    use mockall::mock;
    use std::fs;
    use tempfile::tempdir;

    mock! {
        pub Lister {}

        #[async_trait]
        impl PropertyLister for Lister {
            async fn list_properties(&self, background_id: &str) -> Result<ListingOutcome>;
        }
    }

    fn outcome(output: &str) -> ListingOutcome {
        ListingOutcome {
            output: output.to_owned(),
            stderr: String::new(),
            exit_code: Some(0),
            timed_out: false,
        }
    }

    fn service_with(lister: MockLister, config: ConfigStore) -> EngineService {
        EngineService::with_parts(
            config,
            Arc::new(lister),
            EngineProcess::with_binary("wpectl-test-nonexistent-engine"),
        )
    }

    #[tokio::test]
    async fn load_properties_merges_persisted_overrides() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"properties_by_wallpaper":{"123":{"fps":{"value":"60","sep":"=","type":""}}}}"#,
        )
        .expect("write config");

        let mut lister = MockLister::new();
        lister
            .expect_list_properties()
            .returning(|_| Ok(outcome(r#"{"fps":"30","tint":"1,0,0"}"#)));

        let service = service_with(lister, ConfigStore::open(&path));
        let load = service.load_properties("123").await.expect("load");
        assert_eq!(load.count, 2);
        assert!(!load.timed_out);

        let records = service.properties("123");
        assert_eq!(records.get("fps").expect("fps").value, "60");
        assert_eq!(records.get("tint").expect("tint").value, "1,0,0");
    }

    #[tokio::test]
    async fn timed_out_listing_still_parses_partial_output() {
        let dir = tempdir().expect("tempdir");
        let mut lister = MockLister::new();
        lister.expect_list_properties().returning(|_| {
            Ok(ListingOutcome {
                output: "fps=30".to_owned(),
                stderr: String::new(),
                exit_code: None,
                timed_out: true,
            })
        });

        let service = service_with(lister, ConfigStore::open(dir.path().join("c.json")));
        let load = service.load_properties("123").await.expect("load");
        assert!(load.timed_out);
        assert_eq!(load.count, 1);
        assert_eq!(service.properties("123").get("fps").expect("fps").value, "30");
    }

    #[tokio::test]
    async fn recall_and_set_property_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"properties_by_wallpaper":{"w":{"tint":{"value":"0,0,0","sep":"=","type":"color"}}}}"#,
        )
        .expect("write config");

        let service = service_with(MockLister::new(), ConfigStore::open(&path));
        assert_eq!(service.recall_properties("w"), 1);
        assert!(service.set_property("w", "tint", "1 , 2 , 3"));
        assert_eq!(service.properties("w").get("tint").expect("tint").value, "1,2,3");
        assert!(!service.set_property("w", "missing", "x"));
    }

    #[tokio::test]
    async fn apply_with_missing_binary_fails_without_persisting() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let service = service_with(MockLister::new(), ConfigStore::open(&path));

        let selection = Selection {
            background_id: "123".to_owned(),
            screen: "eDP-1".to_owned(),
            ..Selection::default()
        };
        let err = service.apply(&selection).await.expect_err("should fail");
        assert!(matches!(err, EngineError::EngineNotFound(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn restore_last_without_history_is_a_no_op() {
        let dir = tempdir().expect("tempdir");
        let service = service_with(MockLister::new(), ConfigStore::open(dir.path().join("c.json")));
        assert_eq!(service.restore_last().await.expect("restore"), None);
    }

    #[tokio::test]
    async fn stored_properties_are_persisted_wholesale() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"properties_by_wallpaper":{"w":{"old":{"value":"1","sep":"=","type":""}}}}"#,
        )
        .expect("write config");

        let service = service_with(MockLister::new(), ConfigStore::open(&path));
        {
            let mut store = service.store.lock();
            store.merge_defaults("w", vec![PropertyRecord::new("fresh", "2")], None);
        }
        let selection = Selection {
            background_id: "w".to_owned(),
            ..Selection::default()
        };
        service.persist(&selection);

        let reloaded = ConfigStore::open(&path);
        let map = reloaded
            .data
            .properties_by_wallpaper
            .get("w")
            .expect("mapping");
        assert!(map.contains_key("fresh"));
        assert!(!map.contains_key("old"), "prior mapping replaced wholesale");
        assert_eq!(map.get("fresh").expect("fresh").value, "2");
        assert_eq!(
            reloaded.data.last_wallpaper.expect("last").background_id,
            "w"
        );
    }
}
