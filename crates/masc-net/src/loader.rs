//! Resource Loader
//!
//! Loads scripts and stylesheets into the host document, once per URL.
//!
//! Concurrent loads of the same URL share one fetch through the
//! [`LoadTracker`]. Successful loads are remembered for the lifetime of the
//! loader; failures are not, so a failed URL is fetched again next time.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use masc_content::{HtmlFragment, rewrite_stylesheet, split_css_rules, split_html_scripts};
use masc_events::{EventBus, EventEmitter};
use tracing::{debug, info, warn};

use crate::NetError;
use crate::fetch::{FetchRequest, HttpFetcher};
use crate::host::Host;
use crate::tracker::{Callbacks, LoadOutcome, LoadTracker, Reservation};
use crate::transport::{HttpTransport, Transport};
use crate::url::resolve_url;

/// Fired after a script loads
pub const SCRIPT_LOAD_EVENT: &str = "scriptload";
/// Fired after a stylesheet loads
pub const STYLESHEET_LOAD_EVENT: &str = "stylesheetload";
/// Fired after any load fails
pub const LOAD_ERROR_EVENT: &str = "loaderror";

/// Loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Share one fetch between concurrent loads of the same URL
    pub coordinate_loads: bool,
    /// Queue images and fonts referenced by stylesheets for prefetching
    pub prefetch_assets: bool,
    /// User agent for the default HTTP transport
    pub user_agent: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            coordinate_loads: true,
            prefetch_assets: true,
            user_agent: format!("Masc/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::new()
    }
}

/// Loader configuration builder
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
}

impl LoaderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
        }
    }

    pub fn coordinate_loads(mut self, enabled: bool) -> Self {
        self.config.coordinate_loads = enabled;
        self
    }

    pub fn prefetch_assets(mut self, enabled: bool) -> Self {
        self.config.prefetch_assets = enabled;
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

impl Default for LoaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Script,
    Stylesheet,
}

/// Where a URL stands for one loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
}

/// Counters since the loader was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Fetches actually sent for scripts and stylesheets
    pub fetches_started: usize,
    /// Loads that waited on someone else's fetch
    pub deduplicated: usize,
    /// Loads answered from the loaded sets without fetching
    pub cache_hits: usize,
    pub failures: usize,
}

/// Payload of the loader's lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub struct LoadEvent {
    pub kind: ResourceKind,
    pub url: String,
    pub error: Option<NetError>,
}

/// One script or stylesheet to load
#[derive(Default)]
pub struct LoadRequest {
    pub url: String,
    /// Fetch even if already loaded, bypassing deduplication
    pub force: bool,
    pub busy_indicator: Option<String>,
    on_load: Option<Box<dyn FnOnce()>>,
    on_error: Option<Box<dyn FnOnce(&NetError)>>,
}

impl LoadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_busy_indicator(mut self, label: &str) -> Self {
        self.busy_indicator = Some(label.to_string());
        self
    }

    pub fn on_load(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }

    /// Without one, errors go to [`Host::display_message`]
    pub fn on_error(mut self, f: impl FnOnce(&NetError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("url", &self.url)
            .field("force", &self.force)
            .field("busy_indicator", &self.busy_indicator)
            .finish_non_exhaustive()
    }
}

/// Several resources loaded one after another
#[derive(Default)]
pub struct LoadListRequest {
    pub urls: Vec<String>,
    pub force: bool,
    pub busy_indicator: Option<String>,
    on_load: Option<Box<dyn FnOnce()>>,
    on_error: Option<Rc<dyn Fn(&NetError)>>,
}

impl LoadListRequest {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_busy_indicator(mut self, label: &str) -> Self {
        self.busy_indicator = Some(label.to_string());
        self
    }

    /// Fires once, after the last item, whether or not items failed
    pub fn on_load(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_load = Some(Box::new(f));
        self
    }

    /// Fires once per failed item
    pub fn on_error(mut self, f: impl Fn(&NetError) + 'static) -> Self {
        self.on_error = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for LoadListRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadListRequest")
            .field("urls", &self.urls)
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

/// Everything one loader remembers
#[derive(Debug)]
pub struct LoaderState {
    scripts: RefCell<HashSet<String>>,
    stylesheets: RefCell<HashSet<String>>,
    script_tracker: LoadTracker,
    stylesheet_tracker: LoadTracker,
    /// Stylesheets waiting on their own `@import`s
    resolving: RefCell<HashSet<String>>,
    assets: RefCell<VecDeque<String>>,
    prefetched: RefCell<HashSet<String>>,
    stats: Cell<LoaderStats>,
}

impl LoaderState {
    fn new(coordinate: bool) -> Self {
        Self {
            scripts: RefCell::default(),
            stylesheets: RefCell::default(),
            script_tracker: LoadTracker::new(coordinate),
            stylesheet_tracker: LoadTracker::new(coordinate),
            resolving: RefCell::default(),
            assets: RefCell::default(),
            prefetched: RefCell::default(),
            stats: Cell::default(),
        }
    }

    fn loaded(&self, kind: ResourceKind) -> &RefCell<HashSet<String>> {
        match kind {
            ResourceKind::Script => &self.scripts,
            ResourceKind::Stylesheet => &self.stylesheets,
        }
    }

    fn tracker(&self, kind: ResourceKind) -> &LoadTracker {
        match kind {
            ResourceKind::Script => &self.script_tracker,
            ResourceKind::Stylesheet => &self.stylesheet_tracker,
        }
    }

    fn record(&self, update: impl FnOnce(&mut LoaderStats)) {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

/// Marks a stylesheet as resolving its imports until dropped.
///
/// An import of a sheet still in the set would wait on its own importer,
/// so such imports are skipped.
struct ImportScope<'a> {
    resolving: &'a RefCell<HashSet<String>>,
    url: String,
}

impl<'a> ImportScope<'a> {
    fn enter(resolving: &'a RefCell<HashSet<String>>, url: &str) -> Self {
        resolving.borrow_mut().insert(url.to_string());
        Self {
            resolving,
            url: url.to_string(),
        }
    }

    fn contains(&self, url: &str) -> bool {
        self.resolving.borrow().contains(url)
    }
}

impl Drop for ImportScope<'_> {
    fn drop(&mut self) {
        self.resolving.borrow_mut().remove(&self.url);
    }
}

/// Loads scripts and stylesheets into a [`Host`]
pub struct ResourceLoader<T = HttpTransport> {
    fetcher: HttpFetcher<T>,
    host: Rc<dyn Host>,
    config: LoaderConfig,
    state: LoaderState,
    events: EventBus<LoadEvent>,
}

impl ResourceLoader<HttpTransport> {
    /// Loader over the reqwest transport
    pub fn http(config: LoaderConfig, host: Rc<dyn Host>) -> Result<Self, NetError> {
        let transport = HttpTransport::new(&config.user_agent)?;
        Ok(Self::new(transport, host, config))
    }
}

impl<T: Transport> ResourceLoader<T> {
    pub fn new(transport: T, host: Rc<dyn Host>, config: LoaderConfig) -> Self {
        Self {
            fetcher: HttpFetcher::new(transport, Rc::clone(&host)),
            host,
            state: LoaderState::new(config.coordinate_loads),
            config,
            events: EventBus::new(),
        }
    }

    pub fn fetcher(&self) -> &HttpFetcher<T> {
        &self.fetcher
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn stats(&self) -> LoaderStats {
        self.state.stats.get()
    }

    /// Resolve `url` against the host's current document
    pub fn resolve(&self, url: &str) -> String {
        resolve_url(url, None, &self.host.current_document_url())
    }

    pub fn state_of(&self, kind: ResourceKind, url: &str) -> LoadState {
        let url = self.resolve(url);
        if self.state.loaded(kind).borrow().contains(&url) {
            LoadState::Loaded
        } else if self.state.tracker(kind).is_loading(&url) {
            LoadState::Loading
        } else {
            LoadState::Idle
        }
    }

    pub fn is_script_loaded(&self, url: &str) -> bool {
        self.state_of(ResourceKind::Script, url) == LoadState::Loaded
    }

    pub fn is_stylesheet_loaded(&self, url: &str) -> bool {
        self.state_of(ResourceKind::Stylesheet, url) == LoadState::Loaded
    }

    /// Load and evaluate a script, once.
    ///
    /// Resolves after the request's callback has fired. The script counts
    /// as loaded if the host already has a `<script>` tag for the URL.
    pub async fn load_script(&self, request: LoadRequest) -> Result<(), NetError> {
        self.load(ResourceKind::Script, request).await
    }

    /// Load a stylesheet, its imports, and insert its rules, once.
    ///
    /// `url(...)` references are made absolute against the stylesheet's URL
    /// and `@import`s load first, in order.
    pub async fn load_stylesheet(&self, request: LoadRequest) -> Result<(), NetError> {
        self.load(ResourceKind::Stylesheet, request).await
    }

    /// Load scripts strictly one after another. Returns the errors, in order.
    pub async fn load_script_list(&self, request: LoadListRequest) -> Vec<NetError> {
        self.load_list(ResourceKind::Script, request).await
    }

    /// Load stylesheets strictly one after another. Returns the errors, in order.
    pub async fn load_stylesheet_list(&self, request: LoadListRequest) -> Vec<NetError> {
        self.load_list(ResourceKind::Stylesheet, request).await
    }

    /// Fetch markup and run the scripts it carries.
    ///
    /// External scripts go through [`load_script`](Self::load_script),
    /// inline ones are evaluated directly, all in document order. The
    /// returned fragment holds the script-free markup for the host to insert.
    pub async fn load_html(&self, request: LoadRequest) -> Result<HtmlFragment, NetError> {
        let LoadRequest {
            url,
            busy_indicator,
            on_load,
            on_error,
            ..
        } = request;
        if url.is_empty() {
            warn!("load_html called without a URL");
            return Err(NetError::Configuration("load_html called without a URL".into()));
        }

        let url = self.resolve(&url);
        let callbacks = self.callbacks(on_load, on_error);
        let outcome = self.render_html(&url, busy_indicator).await;
        callbacks.run(&outcome.as_ref().map(|_| ()).map_err(NetError::clone));
        outcome
    }

    /// Fetch every queued stylesheet asset once. Returns how many succeeded.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn prefetch_assets(&self) -> usize {
        let mut fetched = 0;
        loop {
            let next = self.state.assets.borrow_mut().pop_front();
            let Some(url) = next else {
                break;
            };
            if !self.state.prefetched.borrow_mut().insert(url.clone()) {
                continue;
            }
            match self.fetcher.send(FetchRequest::get(&url)).await {
                Ok(_) => {
                    debug!(%url, "asset prefetched");
                    fetched += 1;
                }
                Err(err) => warn!(%url, error = %err, "asset prefetch failed"),
            }
        }
        fetched
    }

    /// Assets waiting for [`prefetch_assets`](Self::prefetch_assets)
    pub fn pending_assets(&self) -> Vec<String> {
        self.state.assets.borrow().iter().cloned().collect()
    }

    async fn load(&self, kind: ResourceKind, request: LoadRequest) -> Result<(), NetError> {
        let LoadRequest {
            url: raw_url,
            force,
            busy_indicator,
            on_load,
            on_error,
        } = request;
        if raw_url.is_empty() {
            warn!(?kind, "load called without a URL");
            return Err(NetError::Configuration(format!(
                "{} load called without a URL",
                kind.label()
            )));
        }

        let url = self.resolve(&raw_url);
        let callbacks = self.callbacks(on_load, on_error);

        if !force && self.already_loaded(kind, &raw_url, &url) {
            debug!(%url, ?kind, "already loaded");
            self.state.record(|stats| stats.cache_hits += 1);
            callbacks.run(&Ok(()));
            return Ok(());
        }

        match self.state.tracker(kind).reserve(&url, callbacks, force) {
            Reservation::AlreadyLoading(waiter) => {
                debug!(%url, ?kind, "waiting on in-flight load");
                self.state.record(|stats| stats.deduplicated += 1);
                waiter.wait().await
            }
            Reservation::Owner(ticket) => {
                self.state.record(|stats| stats.fetches_started += 1);
                info!(%url, ?kind, "loading");

                let outcome = match kind {
                    ResourceKind::Script => self.fetch_script(&url, busy_indicator).await,
                    ResourceKind::Stylesheet => self.fetch_stylesheet(&url, busy_indicator).await,
                };

                match &outcome {
                    Ok(()) => {
                        self.state.loaded(kind).borrow_mut().insert(url.clone());
                    }
                    Err(err) => {
                        warn!(%url, ?kind, error = %err, "load failed");
                        self.state.record(|stats| stats.failures += 1);
                    }
                }

                ticket.complete(outcome.clone());
                self.announce(kind, &url, &outcome);
                outcome
            }
        }
    }

    fn already_loaded(&self, kind: ResourceKind, raw_url: &str, url: &str) -> bool {
        let tagged = kind == ResourceKind::Script
            && (self.host.has_script_tag(raw_url) || self.host.has_script_tag(url));
        tagged || self.state.loaded(kind).borrow().contains(url)
    }

    async fn fetch_script(&self, url: &str, busy_indicator: Option<String>) -> LoadOutcome {
        let response = self.fetcher.send(self.request(url, busy_indicator)).await?;
        self.host
            .evaluate_script(url, &response.text)
            .map_err(|message| NetError::Script {
                url: url.to_string(),
                message,
            })
    }

    async fn fetch_stylesheet(&self, url: &str, busy_indicator: Option<String>) -> LoadOutcome {
        let response = self.fetcher.send(self.request(url, busy_indicator)).await?;

        let document_url = self.host.current_document_url();
        let rewrite = rewrite_stylesheet(&response.text, |reference| {
            resolve_url(reference, Some(url), &document_url)
        });
        self.queue_assets(rewrite.assets);

        let scope = ImportScope::enter(&self.state.resolving, url);
        let imports: Vec<String> = rewrite
            .imports
            .into_iter()
            .filter(|import| {
                let circular = scope.contains(import);
                if circular {
                    warn!(url, %import, "skipping circular @import");
                }
                !circular
            })
            .collect();
        if !imports.is_empty() {
            debug!(url, imports = imports.len(), "loading imports");
            Box::pin(self.load_stylesheet_list(LoadListRequest::new(imports))).await;
        }
        drop(scope);

        for rule in split_css_rules(&rewrite.css) {
            self.host.insert_style_rule(&rule.selector, &rule.declarations);
        }
        Ok(())
    }

    async fn render_html(
        &self,
        url: &str,
        busy_indicator: Option<String>,
    ) -> Result<HtmlFragment, NetError> {
        let response = self.fetcher.send(self.request(url, busy_indicator)).await?;
        let fragment = split_html_scripts(&response.text);
        let document_url = self.host.current_document_url();

        for script in &fragment.scripts {
            match &script.src {
                Some(src) => {
                    let src = resolve_url(src, Some(url), &document_url);
                    Box::pin(self.load_script(LoadRequest::new(src).on_error(|_| {}))).await?;
                }
                None => {
                    self.host
                        .evaluate_script(url, &script.body)
                        .map_err(|message| NetError::Script {
                            url: url.to_string(),
                            message,
                        })?;
                }
            }
        }

        Ok(fragment)
    }

    async fn load_list(&self, kind: ResourceKind, request: LoadListRequest) -> Vec<NetError> {
        let LoadListRequest {
            urls,
            force,
            busy_indicator,
            on_load,
            on_error,
        } = request;

        let mut errors = Vec::new();
        for url in urls {
            let mut item = LoadRequest::new(url).force(force);
            item.busy_indicator = busy_indicator.clone();
            if let Some(on_error) = &on_error {
                let on_error = Rc::clone(on_error);
                item = item.on_error(move |err| on_error(err));
            }

            let result = match kind {
                ResourceKind::Script => self.load_script(item).await,
                ResourceKind::Stylesheet => Box::pin(self.load_stylesheet(item)).await,
            };
            if let Err(err) = result {
                errors.push(err);
            }
        }

        if let Some(on_load) = on_load {
            on_load();
        }
        errors
    }

    fn request(&self, url: &str, busy_indicator: Option<String>) -> FetchRequest {
        let mut request = FetchRequest::get(url);
        request.busy_indicator = busy_indicator;
        request
    }

    /// Per-call callbacks, with unhandled errors sent to the host
    fn callbacks(
        &self,
        on_load: Option<Box<dyn FnOnce()>>,
        on_error: Option<Box<dyn FnOnce(&NetError)>>,
    ) -> Callbacks {
        let mut callbacks = Callbacks::new();
        if let Some(on_load) = on_load {
            callbacks = callbacks.on_load(on_load);
        }
        callbacks = match on_error {
            Some(on_error) => callbacks.on_error(on_error),
            None => {
                let host = Rc::clone(&self.host);
                callbacks.on_error(move |err| host.display_message(&err.to_string()))
            }
        };
        callbacks
    }

    fn queue_assets(&self, assets: Vec<String>) {
        if !self.config.prefetch_assets {
            return;
        }
        let prefetched = self.state.prefetched.borrow();
        let mut queue = self.state.assets.borrow_mut();
        for asset in assets {
            if !prefetched.contains(&asset) && !queue.contains(&asset) {
                queue.push_back(asset);
            }
        }
    }

    fn announce(&self, kind: ResourceKind, url: &str, outcome: &LoadOutcome) {
        let name = match (outcome, kind) {
            (Err(_), _) => LOAD_ERROR_EVENT,
            (Ok(()), ResourceKind::Script) => SCRIPT_LOAD_EVENT,
            (Ok(()), ResourceKind::Stylesheet) => STYLESHEET_LOAD_EVENT,
        };
        let event = LoadEvent {
            kind,
            url: url.to_string(),
            error: outcome.as_ref().err().cloned(),
        };
        self.emit(name, &event);
    }
}

impl<T: Transport> EventEmitter<LoadEvent> for ResourceLoader<T> {
    fn events(&self) -> &EventBus<LoadEvent> {
        &self.events
    }
}

impl<T> fmt::Debug for ResourceLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ResourceKind {
    fn label(self) -> &'static str {
        match self {
            ResourceKind::Script => "script",
            ResourceKind::Stylesheet => "stylesheet",
        }
    }
}
