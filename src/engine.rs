//! Engine wiring: published state, the loading and filtering tasks, and the
//! registries external code talks to.
//!
//! Two restartable tasks share one `EngineShared`:
//! - "Item Loading" rebuilds the catalog and, after publishing it, restarts
//!   filtering.
//! - "Item Filtering" runs the query pipeline over whatever catalog is
//!   currently published and publishes a new visible list.
//!
//! Readers call `catalog()` / `visible()` at any time without locking; both
//! values are swapped in whole.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::catalog::{
    Catalog, CatalogEntry, CatalogLoader, CatalogSources, ItemId, LoadOutcome,
};
use crate::config::Settings;
use crate::logic::{FilterProvider, FilterRegistry, ProviderId, run_pipeline};
use crate::task::{RestartableTask, TaskContext, WorkerPool};
use crate::util::LogOnce;

/// Name of the catalog rebuild task.
pub const LOADING_TASK: &str = "Item Loading";
/// Name of the query pipeline task.
pub const FILTERING_TASK: &str = "Item Filtering";

/// Result of one pipeline run, replaced whole on every publish.
#[derive(Debug, Clone, Default)]
pub struct VisibleList {
    entries: Vec<Arc<CatalogEntry>>,
    query: String,
    generation: u64,
}

impl VisibleList {
    /// Entries in display order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<CatalogEntry>] {
        &self.entries
    }

    /// Raw query text the list was computed for.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Generation of the catalog the list was computed from; zero before the
    /// first load.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.display_name()).collect()
    }
}

/// Listener invoked after every successful catalog publish.
pub trait LoadCallback: Send + Sync {
    /// Called on the loading worker, in registration order.
    fn items_loaded(&self, catalog: &Catalog);
}

impl<F> LoadCallback for F
where
    F: Fn(&Catalog) + Send + Sync,
{
    fn items_loaded(&self, catalog: &Catalog) {
        self(catalog);
    }
}

/// Receiver of every published visible list.
pub trait VisibleListSink: Send + Sync {
    /// Called on the filtering worker; marshal to another thread if needed.
    fn publish(&self, list: &Arc<VisibleList>);
}

impl<F> VisibleListSink for F
where
    F: Fn(&Arc<VisibleList>) + Send + Sync,
{
    fn publish(&self, list: &Arc<VisibleList>) {
        self(list);
    }
}

/// State shared by both task bodies and the engine handle.
struct EngineShared {
    catalog: ArcSwap<Catalog>,
    visible: ArcSwap<VisibleList>,
    query: RwLock<String>,
    settings: RwLock<Settings>,
    filters: FilterRegistry,
    callbacks: RwLock<Vec<Arc<dyn LoadCallback>>>,
    sink: RwLock<Option<Arc<dyn VisibleListSink>>>,
    loader: CatalogLoader,
    load_finished: AtomicBool,
    generation: AtomicU64,
    logged: LogOnce,
}

impl EngineShared {
    fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish_visible(&self, list: VisibleList) {
        let list = Arc::new(list);
        self.visible.store(Arc::clone(&list));
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.publish(&list);
        }
    }
}

/// What: Background catalog loader plus restartable search over its result.
///
/// Inputs:
/// - Collaborators (`CatalogSources`), initial `Settings` and a worker pool.
///
/// Output:
/// - Lock-free `catalog()` and `visible()` snapshots for the UI thread.
///
/// Details:
/// - Nothing runs until `reload()` is called.
/// - Dropping the engine stops both tasks.
pub struct CatalogEngine {
    shared: Arc<EngineShared>,
    loading: RestartableTask,
    filtering: RestartableTask,
}

impl fmt::Debug for CatalogEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEngine")
            .field("loading", &self.loading)
            .field("filtering", &self.filtering)
            .field("generation", &self.shared.generation.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl CatalogEngine {
    /// What: Wire an engine whose tasks run on `handle`.
    ///
    /// Inputs:
    /// - `sources`: Collaborators the loader reads.
    /// - `settings`: Initial settings; replaceable with `update_settings`.
    /// - `handle`: Runtime handle of a `WorkerPool`.
    #[must_use]
    pub fn new(sources: CatalogSources, settings: Settings, handle: Handle) -> Self {
        let shared = Arc::new(EngineShared {
            catalog: ArcSwap::from_pointee(Catalog::default()),
            visible: ArcSwap::from_pointee(VisibleList::default()),
            query: RwLock::new(String::new()),
            settings: RwLock::new(settings),
            filters: FilterRegistry::new(),
            callbacks: RwLock::new(Vec::new()),
            sink: RwLock::new(None),
            loader: CatalogLoader::new(sources),
            load_finished: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            logged: LogOnce::new(),
        });

        let filter_state = Arc::clone(&shared);
        let filtering = RestartableTask::new(FILTERING_TASK, handle.clone(), move |ctx| {
            run_filter(&filter_state, ctx);
        });

        let load_state = Arc::clone(&shared);
        let after_load = filtering.clone();
        let loading = RestartableTask::new(LOADING_TASK, handle, move |ctx| {
            run_load(&load_state, &after_load, ctx);
        });

        Self {
            shared,
            loading,
            filtering,
        }
    }

    /// Engine on the process-wide pool, sized from `settings.worker_threads`.
    ///
    /// # Errors
    /// - Worker runtime construction failure.
    pub fn with_shared_pool(sources: CatalogSources, settings: Settings) -> io::Result<Self> {
        let pool = WorkerPool::shared(settings.worker_threads)?;
        Ok(Self::new(sources, settings, pool.handle()))
    }

    /// Rebuild the catalog (cancelling a rebuild already in progress).
    pub fn reload(&self) {
        info!("[Engine] catalog reload requested");
        self.loading.restart();
    }

    /// Replace the query text and re-run the pipeline.
    pub fn set_query(&self, query: impl Into<String>) {
        *self
            .shared
            .query
            .write()
            .unwrap_or_else(PoisonError::into_inner) = query.into();
        self.filtering.restart();
    }

    /// Current query text.
    #[must_use]
    pub fn query(&self) -> String {
        self.shared
            .query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-run the pipeline, e.g. after the filter providers changed.
    pub fn refilter(&self) {
        self.filtering.restart();
    }

    /// Register a filter provider and re-run the pipeline.
    pub fn add_filter(&self, provider: impl FilterProvider + 'static) -> ProviderId {
        let id = self.shared.filters.register(provider);
        self.refilter();
        id
    }

    /// Unregister a filter provider and re-run the pipeline if it was present.
    pub fn remove_filter(&self, id: ProviderId) -> bool {
        let removed = self.shared.filters.unregister(id);
        if removed {
            self.refilter();
        }
        removed
    }

    /// Provider registry; call `refilter()` after changing it directly.
    #[must_use]
    pub fn filters(&self) -> &FilterRegistry {
        &self.shared.filters
    }

    /// Append a load-completion listener.
    pub fn on_loaded(&self, callback: impl LoadCallback + 'static) {
        self.shared
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Install the receiver of published visible lists.
    pub fn set_sink(&self, sink: impl VisibleListSink + 'static) {
        let sink: Arc<dyn VisibleListSink> = Arc::new(sink);
        *self
            .shared
            .sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Replace settings; they apply from the next run of each task.
    pub fn update_settings(&self, settings: Settings) {
        *self
            .shared
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    /// Currently published catalog and index.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        self.shared.catalog.load_full()
    }

    /// Currently published visible list.
    #[must_use]
    pub fn visible(&self) -> Arc<VisibleList> {
        self.shared.visible.load_full()
    }

    /// `true` when the latest load published its catalog; `false` before the
    /// first load, while a rebuild runs, and after one was cut short.
    #[must_use]
    pub fn load_finished(&self) -> bool {
        self.shared.load_finished.load(Ordering::Acquire)
    }

    /// Identities excluded after a collaborator fault.
    #[must_use]
    pub fn errored_items(&self) -> Vec<ItemId> {
        self.shared.loader.errored_items()
    }

    /// Catalog rebuild task.
    #[must_use]
    pub const fn loading_task(&self) -> &RestartableTask {
        &self.loading
    }

    /// Query pipeline task.
    #[must_use]
    pub const fn filtering_task(&self) -> &RestartableTask {
        &self.filtering
    }

    /// What: Block until both tasks are idle.
    ///
    /// Output:
    /// - `true` when loading and the filtering run it triggers both finished
    ///   within `timeout`.
    #[must_use]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        if !self.loading.wait_idle(timeout) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        self.filtering.wait_idle(left)
    }

    /// Cancel both tasks without restarting them.
    pub fn stop(&self) {
        self.loading.stop();
        self.filtering.stop();
    }
}

impl Drop for CatalogEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_load(shared: &EngineShared, filtering: &RestartableTask, ctx: &TaskContext<'_>) {
    shared.load_finished.store(false, Ordering::Release);
    let settings = shared.settings().load_settings();
    let entries = match shared.loader.load(ctx, &settings) {
        LoadOutcome::Loaded(entries) => entries,
        LoadOutcome::Interrupted => {
            debug!(task = ctx.name(), "[Engine] load interrupted; keeping previous catalog");
            return;
        }
        LoadOutcome::TimedOut(t) => {
            warn!(task = ctx.name(), error = %t, "[Engine] load timed out; keeping previous catalog");
            return;
        }
    };

    let generation = shared.generation.load(Ordering::Acquire) + 1;
    let catalog = Arc::new(Catalog::build(entries, generation));
    if ctx.interrupted() {
        debug!(task = ctx.name(), "[Engine] load interrupted after indexing");
        return;
    }
    shared.generation.store(generation, Ordering::Release);
    shared.catalog.store(Arc::clone(&catalog));
    info!(
        generation,
        entries = catalog.snapshot().len(),
        items = catalog.snapshot().item_count(),
        "[Engine] catalog published"
    );

    let callbacks: Vec<Arc<dyn LoadCallback>> = shared
        .callbacks
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for callback in callbacks {
        callback.items_loaded(&catalog);
    }
    filtering.restart();
    shared.load_finished.store(true, Ordering::Release);
}

fn run_filter(shared: &EngineShared, ctx: &TaskContext<'_>) {
    let catalog = shared.catalog.load_full();
    let query = shared
        .query
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let sort = shared.settings().sort_mode;
    let filter = shared.filters.chain();
    let generation = catalog.snapshot().generation();

    match run_pipeline(ctx, &catalog, &query, sort, &filter) {
        Ok(Some(entries)) => shared.publish_visible(VisibleList {
            entries,
            query,
            generation,
        }),
        Ok(None) => debug!(task = ctx.name(), "[Engine] filter run interrupted"),
        Err(e) => {
            let message = e.to_string();
            if shared.logged.first(&message) {
                error!(task = ctx.name(), error = %message, "[Engine] exception while filtering");
            }
            shared.publish_visible(VisibleList {
                entries: Vec::new(),
                query,
                generation,
            });
            ctx.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ItemRegistry, ManifestSource, OverrideTable, SourceError, Variant};
    use crate::task::TaskState;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    const MANIFEST: &str = r#"{
        "mods": { "basic": "Basic Tools" },
        "items": [
            { "id": 1, "mod_id": "basic", "name": "Iron Pickaxe", "variants": [ { "damage": 0 } ] },
            { "id": 2, "mod_id": "basic", "name": "Iron Sword", "variants": [ { "damage": 0 } ] },
            { "id": 3, "mod_id": "basic", "name": "Gold Pickaxe", "variants": [ { "damage": 0 } ] }
        ]
    }"#;

    fn engine() -> (CatalogEngine, Arc<OverrideTable>) {
        let (sources, overrides) = ManifestSource::from_json(MANIFEST)
            .expect("manifest")
            .into_sources();
        let pool = WorkerPool::shared(None).expect("pool");
        (
            CatalogEngine::new(sources, Settings::default(), pool.handle()),
            overrides,
        )
    }

    #[test]
    /// What: Reload publishes a catalog and a full visible list
    fn reload_publishes_catalog_and_list() {
        let (engine, _) = engine();
        assert!(!engine.load_finished());
        engine.reload();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert!(engine.load_finished());
        assert_eq!(engine.catalog().snapshot().len(), 3);
        assert_eq!(engine.catalog().snapshot().generation(), 1);
        let visible = engine.visible();
        assert_eq!(visible.len(), 3);
        assert_eq!(visible.generation(), 1);
    }

    #[test]
    /// What: A malformed query publishes an empty list and stops filtering
    fn pipeline_fault_publishes_empty_and_stops() {
        let (engine, _) = engine();
        engine.reload();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        engine.set_query("\"iron");
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert!(engine.visible().is_empty());
        assert_eq!(engine.visible().query(), "\"iron");
        assert_eq!(engine.filtering_task().state(), TaskState::Cancelled);
    }

    #[test]
    /// What: Overrides registered after the first load apply on reload
    fn reload_picks_up_new_overrides() {
        let (engine, overrides) = engine();
        engine.reload();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        overrides.hide(crate::catalog::Variant::new(ItemId(2), 0));
        engine.reload();
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert_eq!(engine.visible().names(), vec!["Iron Pickaxe", "Gold Pickaxe"]);
        assert_eq!(engine.catalog().snapshot().generation(), 2);
    }

    fn spin_until(cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < WAIT {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    /// Registry whose sub-item expansion blocks while `hold` is set.
    struct Held {
        inner: Arc<ManifestSource>,
        hold: AtomicBool,
        entered: AtomicUsize,
    }

    impl ItemRegistry for Held {
        fn identities(&self) -> Vec<ItemId> {
            self.inner.identities()
        }

        fn mod_id(&self, item: ItemId) -> Result<String, SourceError> {
            self.inner.mod_id(item)
        }

        fn sub_items(&self, item: ItemId) -> Result<Vec<Variant>, SourceError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let start = Instant::now();
            while self.hold.load(Ordering::SeqCst) && start.elapsed() < WAIT {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.inner.sub_items(item)
        }

        fn icon_hash(&self, variant: &Variant) -> Result<Option<u64>, SourceError> {
            self.inner.icon_hash(variant)
        }
    }

    /// Engine over `Held`, already loaded once.
    fn held_engine() -> (CatalogEngine, Arc<Held>) {
        let held = Arc::new(Held {
            inner: Arc::new(ManifestSource::from_json(MANIFEST).expect("manifest")),
            hold: AtomicBool::new(false),
            entered: AtomicUsize::new(0),
        });
        let (template, _) = ManifestSource::from_json(MANIFEST)
            .expect("manifest")
            .into_sources();
        let sources = CatalogSources {
            registry: held.clone(),
            ..template
        };
        let settings = Settings {
            item_timeout: Duration::ZERO,
            ..Settings::default()
        };
        let pool = WorkerPool::shared(None).expect("pool");
        let engine = CatalogEngine::new(sources, settings, pool.handle());
        engine.reload();
        assert!(engine.wait_idle(WAIT));
        assert_eq!(engine.catalog().snapshot().generation(), 1);
        (engine, held)
    }

    /// Start a reload and return once it is blocked inside the registry.
    fn start_held_reload(engine: &CatalogEngine, held: &Held) {
        held.hold.store(true, Ordering::SeqCst);
        let before = held.entered.load(Ordering::SeqCst);
        engine.reload();
        assert!(spin_until(|| held.entered.load(Ordering::SeqCst) > before));
    }

    fn assert_first_catalog_still_published(engine: &CatalogEngine) {
        assert_eq!(engine.catalog().snapshot().generation(), 1);
        assert_eq!(engine.catalog().snapshot().len(), 3);
        let visible = engine.visible();
        assert_eq!(visible.generation(), 1);
        assert_eq!(visible.len(), 3);
    }

    #[test]
    /// What: A restarted reload keeps the previous catalog until a run publishes
    ///
    /// - Input: Reload blocked in the registry, then restarted, then released
    /// - Output: Generation 1 and the full list throughout; generation 2 after,
    ///   with `load_finished` false only while the rebuild runs
    fn restart_mid_load_keeps_previous_catalog() {
        let (engine, held) = held_engine();
        assert!(engine.load_finished());

        start_held_reload(&engine, &held);
        assert!(engine.loading_task().is_running());
        assert!(!engine.load_finished());
        assert_first_catalog_still_published(&engine);

        engine.reload();
        assert_first_catalog_still_published(&engine);

        held.hold.store(false, Ordering::SeqCst);
        assert!(engine.wait_idle(WAIT));
        assert!(engine.load_finished());
        assert_eq!(engine.loading_task().run_count(), 3);
        assert_eq!(engine.catalog().snapshot().generation(), 2);
        assert_eq!(engine.visible().generation(), 2);
        assert_eq!(engine.visible().len(), 3);
    }

    #[test]
    /// What: A stopped reload publishes nothing
    ///
    /// - Input: Reload blocked in the registry, loading task stopped, released
    /// - Output: Generation 1 remains; `load_finished` stays false
    fn stop_mid_load_publishes_nothing() {
        let (engine, held) = held_engine();
        start_held_reload(&engine, &held);
        engine.loading_task().stop();
        held.hold.store(false, Ordering::SeqCst);
        assert!(engine.wait_idle(WAIT));
        assert_eq!(engine.loading_task().state(), TaskState::Cancelled);
        assert!(!engine.load_finished());
        assert_first_catalog_still_published(&engine);
    }

    #[test]
    /// What: A restart requested during a faulting filter run still runs
    ///
    /// - Input: Malformed query; the sink restarts filtering on the first publish
    /// - Output: Two filter runs and two empty publishes; task ends Cancelled
    fn restart_during_faulting_filter_run_is_kept() {
        let (engine, _) = engine();
        engine.reload();
        assert!(engine.wait_idle(WAIT));

        let publishes = Arc::new(AtomicUsize::new(0));
        let sink_count = Arc::clone(&publishes);
        let filtering = engine.filtering_task().clone();
        engine.set_sink(move |_: &Arc<VisibleList>| {
            if sink_count.fetch_add(1, Ordering::SeqCst) == 0 {
                filtering.restart();
            }
        });
        let before = engine.filtering_task().run_count();
        engine.set_query("\"iron");
        assert!(engine.wait_idle(WAIT));

        assert_eq!(engine.filtering_task().run_count() - before, 2);
        assert_eq!(publishes.load(Ordering::SeqCst), 2);
        assert!(engine.visible().is_empty());
        assert_eq!(engine.filtering_task().state(), TaskState::Cancelled);
        engine.set_sink(|_: &Arc<VisibleList>| {});
    }
}
