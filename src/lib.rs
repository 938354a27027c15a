//! animestream - HLS stream resolution and adaptive playback
//!
//! Resolves an episode to a playable HLS manifest through an unreliable
//! upstream API and a set of CORS/referer proxies, then drives playback with
//! automatic recovery from streaming errors.
//!
//! # Modules
//!
//! - `models` - Catalog, server, manifest, playback and resume types
//! - `api` - Proxy router and typed upstream client
//! - `stream` - Server/source resolvers and the playback engine
//! - `resume` - "Continue watching" tracker
//! - `store` - Client-local persistence port
//! - `app` - Episode view and orchestration
//! - `config` - Configuration file and env overrides
//! - `error` - Error taxonomy
//! - `logging` - Tracing subscriber setup

pub mod models;
pub mod error;
pub mod config;
pub mod logging;
pub mod api;
pub mod stream;
pub mod store;
pub mod resume;
pub mod app;

// Re-export commonly used types
pub use models::{
    Category, EpisodeRef, EpisodeList, Episode,
    ServerCatalog, ServerDescriptor, ServerSelection,
    StreamManifestRef, SubtitleTrack, SkipRange,
    PlaybackState, PlaybackSession, ResumeRecord,
};

pub use api::{ProxyList, ProxyRouter, UpstreamClient};
pub use app::{App, Commit, EpisodeView, LoadingState, Ticket};
pub use config::{Config, FailoverPolicy};
pub use error::{ErrorAction, Result, StreamError};
pub use resume::ResumeTracker;
pub use store::{FileStore, MemoryStore, Store};
pub use stream::{EngineOutcome, PlaybackEngine, PlayerEvent};
