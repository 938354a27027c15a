//! Data structures shared across the pipeline
//!
//! Organized by domain:
//! - **Catalog**: display data handed to the external catalog views
//! - **Servers**: episode server catalog and selection
//! - **Sources**: resolved manifest, headers and subtitle tracks
//! - **Playback**: engine state and session
//! - **Resume**: "continue watching" records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Catalog Models
// =============================================================================

/// Opaque identifier of a single episode within a title
///
/// Upstream ids look like `"some-title-123?ep=4567"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeRef(String);

impl EpisodeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent title id (everything before `?ep=`)
    pub fn title_id(&self) -> &str {
        match self.0.find("?ep=") {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EpisodeRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Sub/dub episode counts advertised for a title
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCount {
    #[serde(default)]
    pub sub: Option<u32>,
    #[serde(default)]
    pub dub: Option<u32>,
}

/// Title card as listed on home, search and category pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub poster: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub episodes: Option<EpisodeCount>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub jname: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub other_info: Vec<String>,
}

impl fmt::Display for AnimeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_deref() {
            Some(kind) => write!(f, "{} [{}]", self.name, kind),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Daily/weekly/monthly top ten
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopTen {
    #[serde(default)]
    pub today: Vec<AnimeItem>,
    #[serde(default)]
    pub week: Vec<AnimeItem>,
    #[serde(default)]
    pub month: Vec<AnimeItem>,
}

/// Home page payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeData {
    #[serde(default)]
    pub genres: Vec<String>,
    pub spotlight_animes: Vec<AnimeItem>,
    pub trending_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub latest_episode_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub top_airing_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub top_upcoming_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub most_popular_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub most_favorite_animes: Vec<AnimeItem>,
    #[serde(default)]
    pub latest_completed_animes: Vec<AnimeItem>,
    #[serde(default, rename = "top10Animes")]
    pub top10_animes: TopTen,
}

/// One paged listing (search, category, genre)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimePage {
    pub animes: Vec<AnimeItem>,
    #[serde(default = "default_page")]
    pub total_pages: u32,
    #[serde(default = "default_page")]
    pub current_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
}

fn default_page() -> u32 {
    1
}

/// Title detail used to label resume records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeInfo {
    pub id: String,
    pub name: String,
    pub poster: String,
    pub description: String,
    pub kind: Option<String>,
    pub episodes: EpisodeCount,
}

/// Episode entry in a title's episode list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    pub episode_id: EpisodeRef,
    #[serde(default)]
    pub is_filler: bool,
}

impl Episode {
    /// Label shown in "continue watching"
    pub fn label(&self) -> String {
        format!("EP {}", self.number)
    }
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "Episode {}", self.number)
        } else {
            write!(f, "Episode {} - {}", self.number, self.title)
        }
    }
}

/// Ordered episode list of one title
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeList {
    #[serde(default)]
    pub total_episodes: u32,
    pub episodes: Vec<Episode>,
}

impl EpisodeList {
    pub fn position(&self, episode: &EpisodeRef) -> Option<usize> {
        self.episodes.iter().position(|e| &e.episode_id == episode)
    }

    pub fn next_after(&self, episode: &EpisodeRef) -> Option<&Episode> {
        self.position(episode).and_then(|i| self.episodes.get(i + 1))
    }

    pub fn previous_before(&self, episode: &EpisodeRef) -> Option<&Episode> {
        match self.position(episode) {
            Some(i) if i > 0 => self.episodes.get(i - 1),
            _ => None,
        }
    }
}

// =============================================================================
// Server Models
// =============================================================================

/// Audio/subtitle class of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sub,
    Dub,
    Raw,
}

impl Category {
    /// Fixed preference order for default selection
    pub const PREFERENCE: [Category; 3] = [Category::Sub, Category::Dub, Category::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sub => "sub",
            Category::Dub => "dub",
            Category::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sub" => Some(Category::Sub),
            "dub" => Some(Category::Dub),
            "raw" => Some(Category::Raw),
            _ => None,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Sub
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named upstream mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub numeric_id: u32,
}

/// Available servers of one episode, per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCatalog {
    pub episode: EpisodeRef,
    pub sub: Vec<ServerDescriptor>,
    pub dub: Vec<ServerDescriptor>,
    pub raw: Vec<ServerDescriptor>,
}

impl ServerCatalog {
    pub fn servers(&self, category: Category) -> &[ServerDescriptor] {
        match category {
            Category::Sub => &self.sub,
            Category::Dub => &self.dub,
            Category::Raw => &self.raw,
        }
    }

    /// True when no category offers a server
    pub fn is_empty(&self) -> bool {
        self.sub.is_empty() && self.dub.is_empty() && self.raw.is_empty()
    }

    /// First non-empty category in preference order
    pub fn first_available(&self) -> Option<Category> {
        Category::PREFERENCE
            .into_iter()
            .find(|c| !self.servers(*c).is_empty())
    }

    pub fn offers(&self, selection: &ServerSelection) -> bool {
        self.servers(selection.category)
            .iter()
            .any(|s| s.name == selection.server)
    }

    /// Every (category, server) pair, preference order
    pub fn selections(&self) -> Vec<ServerSelection> {
        Category::PREFERENCE
            .into_iter()
            .flat_map(|c| {
                self.servers(c)
                    .iter()
                    .map(move |s| ServerSelection::new(c, s.name.clone()))
            })
            .collect()
    }
}

/// Chosen (category, server) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerSelection {
    pub category: Category,
    pub server: String,
}

impl ServerSelection {
    pub fn new(category: Category, server: impl Into<String>) -> Self {
        Self {
            category,
            server: server.into(),
        }
    }
}

impl fmt::Display for ServerSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.category)
    }
}

// =============================================================================
// Source Models
// =============================================================================

/// Subtitle track attached to a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Label as reported upstream, e.g. "English"
    pub language: String,
    /// Original subtitle URL
    pub url: String,
    /// Two-letter lowercase language tag
    pub src_lang: String,
    /// URL routed through a stream proxy
    pub playback_url: String,
}

impl SubtitleTrack {
    /// Lowercase two-letter prefix of a language label
    pub fn src_lang_for(language: &str) -> String {
        language.chars().take(2).collect::<String>().to_lowercase()
    }
}

/// Intro/outro range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkipRange {
    pub start: f64,
    pub end: f64,
}

impl SkipRange {
    pub fn contains(&self, position: f64) -> bool {
        self.end > self.start && position >= self.start && position < self.end
    }
}

/// Resolved stream for one (episode, selection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamManifestRef {
    pub episode: EpisodeRef,
    pub selection: ServerSelection,
    /// Upstream manifest URL, never empty
    pub manifest_url: String,
    /// Manifest URL wrapped by a stream proxy with headers embedded
    pub playback_url: String,
    pub required_headers: HashMap<String, String>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub intro: Option<SkipRange>,
    pub outro: Option<SkipRange>,
}

// =============================================================================
// Playback Models
// =============================================================================

/// Playback engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Failed,
}

impl PlaybackState {
    /// Buffering is only meaningful while playing or paused
    pub fn can_buffer(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Loading => write!(f, "Loading..."),
            PlaybackState::Ready => write!(f, "Ready"),
            PlaybackState::Playing => write!(f, "▶ Playing"),
            PlaybackState::Paused => write!(f, "⏸ Paused"),
            PlaybackState::Ended => write!(f, "Ended"),
            PlaybackState::Failed => write!(f, "Failed"),
        }
    }
}

/// Runtime state bound to one manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub position: f64,
    pub duration: f64,
    pub playing: bool,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub buffering: bool,
    pub fullscreen: bool,
    pub active_subtitle: Option<String>,
    /// Consecutive fatal errors handled by full rebuilds
    pub fatal_retries: u32,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            position: 0.0,
            duration: 0.0,
            playing: false,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            buffering: false,
            fullscreen: false,
            active_subtitle: None,
            fatal_retries: 0,
        }
    }

    /// Progress as a fraction (0.0-1.0)
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            0.0
        } else {
            (self.position / self.duration).clamp(0.0, 1.0)
        }
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} ({}%)",
            format_time(self.position),
            format_time(self.duration),
            if self.muted { 0 } else { (self.volume * 100.0) as u8 }
        )
    }
}

/// Format seconds as `m:ss` or `h:mm:ss`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

// =============================================================================
// Resume Models
// =============================================================================

/// "Continue watching" entry, one per title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub title_id: String,
    pub episode_ref: EpisodeRef,
    pub episode_label: String,
    pub poster_url: String,
    pub title_label: String,
    pub last_touched: DateTime<Utc>,
}

impl fmt::Display for ResumeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title_label, self.episode_label)
    }
}
