//! HLS media pipeline seam and error recovery policy
//!
//! The platform's HLS client plus media element sit behind
//! [`MediaPipeline`]. Recovery from streaming errors is a pure function of
//! the error class and the current rebuild count.

use std::collections::HashMap;
use std::time::Duration;

/// Class of an HLS error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HlsErrorKind {
    /// Manifest/segment/key loading failed
    Network,
    /// Decode or buffer append failed
    Media,
    /// Anything else (mux, key system, internal)
    Other,
}

impl HlsErrorKind {
    /// Map an hls.js-style error type string
    pub fn from_type(s: &str) -> Self {
        match s {
            "networkError" | "network" => HlsErrorKind::Network,
            "mediaError" | "media" => HlsErrorKind::Media,
            _ => HlsErrorKind::Other,
        }
    }
}

/// Action the engine applies to the pipeline after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HlsCommand {
    /// Restart the load loop of the current pipeline
    StartLoad,
    /// Re-initialize the decode path in place
    RecoverMedia,
    /// Tear down and rebuild against the same URL after `delay`
    Rebuild { delay: Duration },
    /// Abandon this manifest
    GiveUp,
}

/// Limits for full rebuilds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub max_rebuilds: u32,
    pub rebuild_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_rebuilds: 3,
            rebuild_delay: Duration::from_secs(1),
        }
    }
}

/// Next command and rebuild count for a fatal error
///
/// Network and media errors are recovered in place and never consume the
/// rebuild budget. Other errors rebuild until `max_rebuilds` is spent.
pub fn recovery_action(
    kind: HlsErrorKind,
    rebuilds: u32,
    policy: &RecoveryPolicy,
) -> (HlsCommand, u32) {
    match kind {
        HlsErrorKind::Network => (HlsCommand::StartLoad, rebuilds),
        HlsErrorKind::Media => (HlsCommand::RecoverMedia, rebuilds),
        HlsErrorKind::Other if rebuilds < policy.max_rebuilds => (
            HlsCommand::Rebuild {
                delay: policy.rebuild_delay,
            },
            rebuilds + 1,
        ),
        HlsErrorKind::Other => (HlsCommand::GiveUp, rebuilds),
    }
}

/// One HLS client bound to a media element
///
/// Media callbacks are reported back as
/// [`PlayerEvent`](super::player::PlayerEvent)s on the engine's channel.
pub trait MediaPipeline: Send {
    /// Point the client at a manifest, with headers for each request
    ///
    /// The referer is never among them; it is carried inside the proxied URL.
    fn load_source(&mut self, url: &str, headers: &HashMap<String, String>);
    fn attach_media(&mut self);
    fn start_load(&mut self);
    fn recover_media_error(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_playback_rate(&mut self, rate: f64);
    /// Ask the platform to enter or leave fullscreen
    fn request_fullscreen(&mut self, on: bool);
    /// Release the decoder and all buffers
    fn destroy(&mut self);
}

/// Creates fresh pipelines
pub trait PipelineFactory: Send {
    fn create(&mut self) -> Box<dyn MediaPipeline>;
}

impl<F> PipelineFactory for F
where
    F: FnMut() -> Box<dyn MediaPipeline> + Send,
{
    fn create(&mut self) -> Box<dyn MediaPipeline> {
        self()
    }
}
