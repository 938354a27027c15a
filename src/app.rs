//! App state and orchestration
//!
//! Coordinates the resolvers, the playback engine, the resume tracker and
//! the stored server preference for one episode view. Every resolution
//! result is committed through a [`Ticket`]; results whose ticket is no
//! longer current are discarded.
//!
//! [`App`] methods hold `&mut self` across their awaits, so an embedder
//! cancels an in-flight resolution by dropping its future. The next
//! `open_episode` supersedes whatever the dropped call had started.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{ProxyList, UpstreamClient};
use crate::config::{Config, FailoverPolicy};
use crate::error::{ErrorAction, Result, StreamError};
use crate::models::*;
use crate::resume::ResumeTracker;
use crate::store::{ServerPreference, Store};
use crate::stream::hls::{PipelineFactory, RecoveryPolicy};
use crate::stream::player::{EngineOutcome, PlaybackEngine};
use crate::stream::servers::ServerResolver;
use crate::stream::sources::SourceResolver;

// =============================================================================
// Loading State
// =============================================================================

/// Loading state for async operations
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadingState {
    /// Idle - no loading in progress
    #[default]
    Idle,
    /// Loading with optional message
    Loading(Option<String>),
    /// Error with message
    Error(String),
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LoadingState::Error(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            LoadingState::Loading(Some(msg)) => Some(msg),
            LoadingState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

// =============================================================================
// Episode View
// =============================================================================

/// Identifies the request a resolution result belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    pub episode: EpisodeRef,
    pub selection: Option<ServerSelection>,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of committing a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// A newer request superseded this one; nothing changed
    Stale,
}

/// Desired episode and selection plus what has been resolved for them
#[derive(Debug, Default)]
pub struct EpisodeView {
    generation: u64,
    episode: Option<EpisodeRef>,
    catalog: Option<ServerCatalog>,
    selection: Option<ServerSelection>,
    manifest: Option<StreamManifestRef>,
    tried: HashSet<ServerSelection>,
    pub loading: LoadingState,
}

impl EpisodeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn episode(&self) -> Option<&EpisodeRef> {
        self.episode.as_ref()
    }

    pub fn catalog(&self) -> Option<&ServerCatalog> {
        self.catalog.as_ref()
    }

    pub fn selection(&self) -> Option<&ServerSelection> {
        self.selection.as_ref()
    }

    pub fn manifest(&self) -> Option<&StreamManifestRef> {
        self.manifest.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start resolving a new episode; drops everything resolved before
    pub fn begin_episode(&mut self, episode: EpisodeRef) -> Ticket {
        self.generation += 1;
        self.episode = Some(episode.clone());
        self.catalog = None;
        self.selection = None;
        self.manifest = None;
        self.tried.clear();
        self.loading = LoadingState::Loading(Some("Loading servers...".into()));
        Ticket {
            generation: self.generation,
            episode,
            selection: None,
        }
    }

    /// Start resolving sources for `selection` on the current episode
    ///
    /// Returns `None` when no episode is open.
    pub fn begin_selection(&mut self, selection: ServerSelection) -> Option<Ticket> {
        let episode = self.episode.clone()?;
        self.generation += 1;
        self.tried.insert(selection.clone());
        self.selection = Some(selection.clone());
        self.manifest = None;
        self.loading = LoadingState::Loading(Some(format!("Loading {}...", selection)));
        Some(Ticket {
            generation: self.generation,
            episode,
            selection: Some(selection),
        })
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && self.episode.as_ref() == Some(&ticket.episode)
    }

    pub fn apply_servers(
        &mut self,
        ticket: &Ticket,
        catalog: ServerCatalog,
        selection: ServerSelection,
    ) -> Commit {
        if !self.is_current(ticket) {
            return Commit::Stale;
        }
        self.catalog = Some(catalog);
        self.selection = Some(selection);
        Commit::Applied
    }

    pub fn apply_sources(&mut self, ticket: &Ticket, manifest: StreamManifestRef) -> Commit {
        if !self.is_current(ticket) || ticket.selection.as_ref() != Some(&manifest.selection) {
            return Commit::Stale;
        }
        self.manifest = Some(manifest);
        self.loading = LoadingState::Idle;
        Commit::Applied
    }

    pub fn apply_error(&mut self, ticket: &Ticket, err: &StreamError) -> Commit {
        if !self.is_current(ticket) {
            return Commit::Stale;
        }
        self.loading = LoadingState::Error(err.user_message());
        Commit::Applied
    }

    /// Record a playback failure of the active selection
    pub fn fail_playback(&mut self, err: &StreamError) {
        if let Some(sel) = self.selection.clone() {
            self.tried.insert(sel);
        }
        self.manifest = None;
        self.loading = LoadingState::Error(err.user_message());
    }

    pub fn was_tried(&self, selection: &ServerSelection) -> bool {
        self.tried.contains(selection)
    }

    /// Next untried selection, same category first
    pub fn next_untried(&self) -> Option<ServerSelection> {
        let catalog = self.catalog.as_ref()?;
        let current = self.selection.as_ref().map(|s| s.category);
        let mut candidates: Vec<ServerSelection> = catalog
            .selections()
            .into_iter()
            .filter(|s| !self.tried.contains(s))
            .collect();
        candidates.sort_by_key(|s| Some(s.category) != current);
        candidates.into_iter().next()
    }
}

// =============================================================================
// App
// =============================================================================

/// Display data of the open title, used for resume records
#[derive(Debug, Clone)]
pub struct TitleContext {
    pub title_id: String,
    pub title_label: String,
    pub poster_url: String,
    pub episodes: EpisodeList,
}

pub struct App {
    config: Config,
    client: Arc<UpstreamClient>,
    servers: ServerResolver,
    sources: SourceResolver,
    engine: PlaybackEngine,
    tracker: ResumeTracker,
    store: Arc<dyn Store>,
    title: Option<TitleContext>,
    pub view: EpisodeView,
}

impl App {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        factory: Box<dyn PipelineFactory>,
    ) -> Result<Self> {
        let client = Arc::new(UpstreamClient::new(&config)?);
        Self::with_client(config, client, store, factory)
    }

    /// Build around an existing upstream client (for testing)
    pub fn with_client(
        config: Config,
        client: Arc<UpstreamClient>,
        store: Arc<dyn Store>,
        factory: Box<dyn PipelineFactory>,
    ) -> Result<Self> {
        let stream_proxies = ProxyList::parse(&config.stream_proxies)?;
        let policy = RecoveryPolicy {
            max_rebuilds: config.max_rebuilds,
            rebuild_delay: config.rebuild_delay(),
        };
        Ok(Self {
            servers: ServerResolver::new(client.clone()),
            sources: SourceResolver::new(
                client.clone(),
                stream_proxies,
                config.fallback_referer.clone(),
            ),
            engine: PlaybackEngine::new(factory, policy),
            tracker: ResumeTracker::with_capacity(store.clone(), config.resume_capacity),
            store,
            client,
            config,
            title: None,
            view: EpisodeView::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Catalog calls (home, search, category, genre, info)
    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// Transport controls and subtitle selection
    pub fn engine_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.engine
    }

    pub fn tracker(&self) -> &ResumeTracker {
        &self.tracker
    }

    pub fn title(&self) -> Option<&TitleContext> {
        self.title.as_ref()
    }

    pub fn preferred_server(&self) -> Option<String> {
        ServerPreference::new(self.store.as_ref()).get()
    }

    /// Load the episode list of a title
    pub async fn open_title(
        &mut self,
        title_id: &str,
        title_label: &str,
        poster_url: &str,
    ) -> Result<&EpisodeList> {
        let episodes = self.client.fetch_episode_list(title_id).await?;
        info!(title_id, episodes = episodes.episodes.len(), "opened title");
        let title = self.title.insert(TitleContext {
            title_id: title_id.to_string(),
            title_label: title_label.to_string(),
            poster_url: poster_url.to_string(),
            episodes,
        });
        Ok(&title.episodes)
    }

    /// Resolve servers and sources for `episode` and start playback
    pub async fn open_episode(&mut self, episode: EpisodeRef) -> Result<()> {
        let ticket = self.view.begin_episode(episode.clone());
        let preferred = self
            .preferred_server()
            .unwrap_or_else(|| self.config.default_server.clone());

        let (catalog, selection) = match self
            .servers
            .resolve_with_default(&episode, Some(preferred.as_str()))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                self.view.apply_error(&ticket, &e);
                return Err(e);
            }
        };
        if self.view.apply_servers(&ticket, catalog, selection.clone()) == Commit::Stale {
            return Ok(());
        }

        match self.load_selection(selection).await {
            Err(e) if self.should_failover(&e) => self.failover(e).await,
            other => other.map(|_| ()),
        }
    }

    /// User-chosen server; remembered for later episodes
    ///
    /// Returns false, saving nothing, when no episode is open.
    pub async fn select_server(&mut self, selection: ServerSelection) -> Result<bool> {
        if self.view.episode().is_none() {
            return Ok(false);
        }
        if let Err(e) = ServerPreference::new(self.store.as_ref()).set(&selection.server) {
            warn!("failed to save server preference: {:#}", e);
        }
        self.load_selection(selection).await
    }

    /// Re-run the failed stage of the current episode
    ///
    /// Returns false when no episode is open.
    pub async fn retry(&mut self) -> Result<bool> {
        let Some(episode) = self.view.episode().cloned() else {
            return Ok(false);
        };
        match self.view.selection().cloned() {
            Some(selection) if self.view.catalog().is_some() => {
                self.load_selection(selection).await
            }
            _ => self.open_episode(episode).await.map(|_| true),
        }
    }

    /// Open the episode after the current one; false at the end of the list
    pub async fn next_episode(&mut self) -> Result<bool> {
        let next = self.neighbour(|list, ep| list.next_after(ep).map(|e| e.episode_id.clone()));
        match next {
            Some(ep) => self.open_episode(ep).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Open the episode before the current one; false at the start
    pub async fn previous_episode(&mut self) -> Result<bool> {
        let prev =
            self.neighbour(|list, ep| list.previous_before(ep).map(|e| e.episode_id.clone()));
        match prev {
            Some(ep) => self.open_episode(ep).await.map(|_| true),
            None => Ok(false),
        }
    }

    /// Apply queued player events; handles auto-advance and failover
    pub async fn pump_player(&mut self) -> Result<EngineOutcome> {
        let outcome = self.engine.pump().await;
        match &outcome {
            EngineOutcome::Ended { auto_advance: true } => {
                self.next_episode().await?;
            }
            EngineOutcome::Failed(err) => {
                self.view.fail_playback(err);
                if self.config.failover == FailoverPolicy::Automatic {
                    match self.failover(err.clone()).await {
                        Ok(()) => return Ok(EngineOutcome::Running),
                        Err(e) => return Ok(EngineOutcome::Failed(e)),
                    }
                }
            }
            _ => {}
        }
        Ok(outcome)
    }

    fn neighbour<F>(&self, pick: F) -> Option<EpisodeRef>
    where
        F: Fn(&EpisodeList, &EpisodeRef) -> Option<EpisodeRef>,
    {
        let title = self.title.as_ref()?;
        let current = self.view.episode()?;
        pick(&title.episodes, current)
    }

    fn should_failover(&self, err: &StreamError) -> bool {
        self.config.failover == FailoverPolicy::Automatic
            && err.action() == ErrorAction::SwitchServer
    }

    /// Walk untried selections until one resolves
    async fn failover(&mut self, mut err: StreamError) -> Result<()> {
        while let Some(next) = self.view.next_untried() {
            warn!(selection = %next, error = %err, "failing over");
            match self.load_selection(next).await {
                Ok(_) => return Ok(()),
                Err(e) => err = e,
            }
        }
        warn!("all servers tried");
        Err(err)
    }

    /// False when nothing was attached
    async fn load_selection(&mut self, selection: ServerSelection) -> Result<bool> {
        let Some(ticket) = self.view.begin_selection(selection.clone()) else {
            return Ok(false);
        };

        let manifest = match self.sources.resolve(&ticket.episode, &selection).await {
            Ok(m) => m,
            Err(e) => {
                self.view.apply_error(&ticket, &e);
                return Err(e);
            }
        };
        if self.view.apply_sources(&ticket, manifest.clone()) == Commit::Stale {
            return Ok(false);
        }

        let has_next = self
            .title
            .as_ref()
            .and_then(|t| t.episodes.next_after(&ticket.episode))
            .is_some();
        self.engine.set_has_next(has_next);
        self.engine.attach(manifest);
        self.record_resume(&ticket.episode);
        Ok(true)
    }

    fn record_resume(&self, episode: &EpisodeRef) {
        let title_id = episode.title_id();
        let open_title = self.title.as_ref().filter(|t| t.title_id == title_id);
        let (label, title_label, poster) = match open_title {
            Some(t) => (
                t.episodes
                    .episodes
                    .iter()
                    .find(|e| &e.episode_id == episode)
                    .map(|e| e.label())
                    .unwrap_or_else(|| episode.to_string()),
                t.title_label.clone(),
                t.poster_url.clone(),
            ),
            // Episode of another title: keep whatever that title last recorded
            None => match self.tracker.get(title_id) {
                Some(r) => (episode.to_string(), r.title_label, r.poster_url),
                None => (episode.to_string(), String::new(), String::new()),
            },
        };
        if let Err(e) =
            self.tracker
                .record(title_id, episode, &label, &poster, &title_label)
        {
            warn!("failed to record resume point: {}", e);
        }
    }
}
