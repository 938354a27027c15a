//! Playback engine
//!
//! Owns one [`MediaPipeline`] at a time and drives it through
//! `Idle → Loading → Ready ⇄ Playing ⇄ Paused → Ended`, with `Failed` as the
//! terminal error state. Every media callback arrives as a [`PlayerEvent`]
//! on a single channel and is applied in order by [`PlaybackEngine::pump`].

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use super::hls::{
    recovery_action, HlsCommand, HlsErrorKind, MediaPipeline, PipelineFactory, RecoveryPolicy,
};
use super::subtitles::SubtitleSet;
use crate::error::StreamError;
use crate::models::{PlaybackSession, PlaybackState, StreamManifestRef};

/// Seconds before the end at which a time update counts as finished
pub const END_THRESHOLD_SECS: f64 = 0.5;

// =============================================================================
// Events
// =============================================================================

/// Callback from the media element or the HLS client
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ManifestParsed,
    Playing,
    Paused,
    /// Media stalled waiting for data
    Waiting,
    CanPlay,
    TimeUpdate { position: f64 },
    DurationChange { duration: f64 },
    Ended,
    HlsError {
        kind: HlsErrorKind,
        fatal: bool,
        details: String,
    },
    FullscreenChanged(bool),
}

/// Result of applying events
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// Nothing for the caller to act on
    Running,
    /// Playback reached the end; `auto_advance` is set when a next episode
    /// exists
    Ended { auto_advance: bool },
    /// Recovery budget exhausted
    Failed(StreamError),
}

// =============================================================================
// Engine
// =============================================================================

pub struct PlaybackEngine {
    factory: Box<dyn PipelineFactory>,
    pipeline: Option<Box<dyn MediaPipeline>>,
    manifest: Option<StreamManifestRef>,
    session: PlaybackSession,
    state: PlaybackState,
    policy: RecoveryPolicy,
    subtitles: SubtitleSet,
    has_next: bool,
    tx: UnboundedSender<PlayerEvent>,
    rx: UnboundedReceiver<PlayerEvent>,
}

impl PlaybackEngine {
    pub fn new(factory: Box<dyn PipelineFactory>, policy: RecoveryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            factory,
            pipeline: None,
            manifest: None,
            session: PlaybackSession::new(),
            state: PlaybackState::Idle,
            policy,
            subtitles: SubtitleSet::default(),
            has_next: false,
            tx,
            rx,
        }
    }

    /// Sender for media callbacks
    pub fn events(&self) -> UnboundedSender<PlayerEvent> {
        self.tx.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn manifest(&self) -> Option<&StreamManifestRef> {
        self.manifest.as_ref()
    }

    pub fn subtitles(&self) -> &SubtitleSet {
        &self.subtitles
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Whether an ended episode should advance automatically
    pub fn set_has_next(&mut self, has_next: bool) {
        self.has_next = has_next;
    }

    /// Bind a new manifest
    ///
    /// The previous pipeline is destroyed before the new one is created.
    /// Events still queued for the old pipeline are discarded.
    pub fn attach(&mut self, manifest: StreamManifestRef) {
        self.destroy_pipeline();
        while self.rx.try_recv().is_ok() {}

        info!(
            episode = %manifest.episode,
            selection = %manifest.selection,
            "attaching stream"
        );

        self.session = PlaybackSession::new();
        self.subtitles = SubtitleSet::new(&manifest.subtitle_tracks);
        self.session.active_subtitle = self.subtitles.active().map(str::to_string);
        self.manifest = Some(manifest);
        self.spawn_pipeline();
        self.state = PlaybackState::Loading;
    }

    /// Destroy the pipeline and return to `Idle`
    pub fn stop(&mut self) {
        self.destroy_pipeline();
        self.manifest = None;
        self.subtitles = SubtitleSet::default();
        self.session = PlaybackSession::new();
        self.state = PlaybackState::Idle;
    }

    /// Apply every queued event
    ///
    /// Stops at the first terminal outcome; later events stay queued.
    /// A rebuild drops whatever the torn-down pipeline still had queued.
    pub async fn pump(&mut self) -> EngineOutcome {
        while let Ok(event) = self.rx.try_recv() {
            let outcome = self.handle(event).await;
            if outcome != EngineOutcome::Running {
                return outcome;
            }
        }
        EngineOutcome::Running
    }

    /// Wait for events until one produces a terminal outcome
    pub async fn run(&mut self) -> EngineOutcome {
        while let Some(event) = self.rx.recv().await {
            let outcome = self.handle(event).await;
            if outcome != EngineOutcome::Running {
                return outcome;
            }
        }
        EngineOutcome::Running
    }

    /// Single transition function for all events
    pub async fn handle(&mut self, event: PlayerEvent) -> EngineOutcome {
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Failed) {
            debug!(?event, state = %self.state, "ignoring event");
            return EngineOutcome::Running;
        }

        match event {
            PlayerEvent::ManifestParsed => {
                if self.state == PlaybackState::Loading {
                    self.state = PlaybackState::Ready;
                    self.session.playing = true;
                    self.with_pipeline(|p| p.play());
                }
            }
            PlayerEvent::Playing => {
                self.state = PlaybackState::Playing;
                self.session.playing = true;
                self.session.buffering = false;
            }
            PlayerEvent::Paused => {
                if self.state == PlaybackState::Playing {
                    self.state = PlaybackState::Paused;
                }
                self.session.playing = false;
            }
            PlayerEvent::Waiting => {
                if self.state.can_buffer() {
                    self.session.buffering = true;
                }
            }
            PlayerEvent::CanPlay => self.session.buffering = false,
            PlayerEvent::DurationChange { duration } => {
                if duration.is_finite() && duration > 0.0 {
                    self.session.duration = duration;
                }
            }
            PlayerEvent::TimeUpdate { position } => {
                self.session.position = position;
                let duration = self.session.duration;
                if self.state == PlaybackState::Playing
                    && duration > 0.0
                    && position >= duration - END_THRESHOLD_SECS
                {
                    return self.finish();
                }
            }
            PlayerEvent::Ended => {
                if self.state != PlaybackState::Ended {
                    return self.finish();
                }
            }
            PlayerEvent::FullscreenChanged(on) => self.session.fullscreen = on,
            PlayerEvent::HlsError {
                kind,
                fatal,
                details,
            } => {
                if !fatal {
                    warn!(?kind, %details, "non-fatal hls error");
                    return EngineOutcome::Running;
                }
                return self.recover(kind, details).await;
            }
        }
        EngineOutcome::Running
    }

    fn finish(&mut self) -> EngineOutcome {
        self.state = PlaybackState::Ended;
        self.session.playing = false;
        self.session.buffering = false;
        info!(auto_advance = self.has_next, "playback ended");
        EngineOutcome::Ended {
            auto_advance: self.has_next,
        }
    }

    async fn recover(&mut self, kind: HlsErrorKind, details: String) -> EngineOutcome {
        let (command, retries) = recovery_action(kind, self.session.fatal_retries, &self.policy);
        warn!(?kind, %details, ?command, retries, "fatal hls error");

        match command {
            HlsCommand::StartLoad => {
                self.with_pipeline(|p| p.start_load());
                self.state = PlaybackState::Loading;
            }
            HlsCommand::RecoverMedia => {
                self.with_pipeline(|p| p.recover_media_error());
                self.state = PlaybackState::Loading;
            }
            HlsCommand::Rebuild { delay } => {
                self.session.fatal_retries = retries;
                self.session.buffering = false;
                self.state = PlaybackState::Loading;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                self.destroy_pipeline();
                while self.rx.try_recv().is_ok() {}
                self.spawn_pipeline();
            }
            HlsCommand::GiveUp => {
                self.destroy_pipeline();
                self.state = PlaybackState::Failed;
                self.session.playing = false;
                self.session.buffering = false;
                let attempts = retries + 1;
                error!(attempts, %details, "playback failed");
                return EngineOutcome::Failed(StreamError::PlaybackFatal { attempts, details });
            }
        }
        EngineOutcome::Running
    }

    // =========================================================================
    // Transport controls
    // =========================================================================

    pub fn play(&mut self) {
        self.session.playing = true;
        self.with_pipeline(|p| p.play());
    }

    pub fn pause(&mut self) {
        self.session.playing = false;
        self.with_pipeline(|p| p.pause());
    }

    pub fn toggle_play(&mut self) {
        if self.session.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seek, clamped to the known duration
    pub fn seek(&mut self, position: f64) {
        let mut position = position.max(0.0);
        if self.session.duration > 0.0 {
            position = position.min(self.session.duration);
        }
        self.session.position = position;
        self.with_pipeline(|p| p.seek(position));
    }

    /// Set volume in 0.0-1.0; zero mutes
    pub fn set_volume(&mut self, volume: f64) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            self.session.volume
        };
        let muted = volume == 0.0;
        self.session.volume = volume;
        self.session.muted = muted;
        self.with_pipeline(|p| {
            p.set_volume(volume);
            p.set_muted(muted);
        });
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.session.muted;
        self.session.muted = muted;
        self.with_pipeline(|p| p.set_muted(muted));
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        let rate = rate.clamp(0.25, 4.0);
        self.session.playback_rate = rate;
        self.with_pipeline(|p| p.set_playback_rate(rate));
    }

    /// Ask for fullscreen; the session flag follows `FullscreenChanged`
    pub fn request_fullscreen(&mut self, on: bool) {
        self.with_pipeline(|p| p.request_fullscreen(on));
    }

    /// Show one subtitle track by label, or none
    pub fn select_subtitle(&mut self, language: Option<&str>) -> bool {
        if !self.subtitles.select(language) {
            return false;
        }
        self.session.active_subtitle = self.subtitles.active().map(str::to_string);
        true
    }

    /// Seek past the intro when one is reported
    pub fn skip_intro(&mut self) -> bool {
        match self.manifest.as_ref().and_then(|m| m.intro) {
            Some(range) => {
                self.seek(range.end);
                true
            }
            None => false,
        }
    }

    /// Seek past the outro when one is reported
    pub fn skip_outro(&mut self) -> bool {
        match self.manifest.as_ref().and_then(|m| m.outro) {
            Some(range) => {
                self.seek(range.end);
                true
            }
            None => false,
        }
    }

    fn with_pipeline(&mut self, f: impl FnOnce(&mut dyn MediaPipeline)) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            f(pipeline.as_mut());
        }
    }

    fn spawn_pipeline(&mut self) {
        let Some(manifest) = self.manifest.as_ref() else {
            return;
        };
        // The referer already rides in the proxied URL
        let headers: HashMap<String, String> = manifest
            .required_headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("referer"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut pipeline = self.factory.create();
        pipeline.load_source(&manifest.playback_url, &headers);
        pipeline.attach_media();
        self.pipeline = Some(pipeline);
    }

    fn destroy_pipeline(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.destroy();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.destroy_pipeline();
    }
}
