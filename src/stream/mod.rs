//! Resolution and playback
//!
//! - Servers: server catalog and default (category, server) choice
//! - Sources: manifest resolution with referer propagation
//! - Hls: media pipeline seam and error recovery policy
//! - Player: playback state machine and transport controls
//! - Subtitles: exclusive subtitle track selection

pub mod hls;
pub mod player;
pub mod servers;
pub mod sources;
pub mod subtitles;

pub use hls::{HlsCommand, HlsErrorKind, MediaPipeline, PipelineFactory, RecoveryPolicy};
pub use player::{EngineOutcome, PlaybackEngine, PlayerEvent};
pub use servers::ServerResolver;
pub use sources::SourceResolver;
pub use subtitles::{SubtitleSet, TrackMode};
