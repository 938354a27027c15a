//! Error taxonomy for the resolution and playback pipeline
//!
//! Every failure is converted into a [`StreamError`] at component
//! boundaries so the presentation layer only deals with explicit values.

use thiserror::Error;

use crate::models::{Category, EpisodeRef};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, StreamError>;

/// Pipeline error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Network, DNS or HTTP failure on the direct and/or proxied attempt
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Upstream answered but the payload is missing the expected shape
    #[error("Unexpected upstream response: {0}")]
    Schema(String),

    /// Upstream reachable but offers nothing playable
    #[error("No streaming sources for {episode} on {server} ({category})")]
    EmptySource {
        episode: EpisodeRef,
        server: String,
        category: Category,
    },

    /// All three server categories are empty
    #[error("No servers available for {0}")]
    NoServersAvailable(EpisodeRef),

    /// HLS fatal errors exhausted the rebuild budget
    #[error("Playback failed after {attempts} fatal error(s): {details}")]
    PlaybackFatal { attempts: u32, details: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// What the presentation layer should offer the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Re-invoke the same resolver call
    Retry,
    /// Pick another server or category
    SwitchServer,
    /// Nothing the user can do from the player
    None,
}

impl StreamError {
    pub(crate) fn transport(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StreamError::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Transient failures that a blind retry may fix
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::Transport { .. } | StreamError::Schema(_))
    }

    pub fn action(&self) -> ErrorAction {
        match self {
            StreamError::Transport { .. } | StreamError::Schema(_) => ErrorAction::Retry,
            StreamError::EmptySource { .. }
            | StreamError::NoServersAvailable(_)
            | StreamError::PlaybackFatal { .. } => ErrorAction::SwitchServer,
            StreamError::Config(_) | StreamError::Storage(_) => ErrorAction::None,
        }
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            StreamError::Transport { .. } => {
                "Failed to reach the streaming service. Please try again.".to_string()
            }
            StreamError::Schema(_) => {
                "The streaming service returned an unexpected response. Please try again."
                    .to_string()
            }
            StreamError::EmptySource { .. } => {
                "No video stream on this server. Please try another server or category."
                    .to_string()
            }
            StreamError::NoServersAvailable(_) => {
                "This episode has no streaming servers. Please try another episode.".to_string()
            }
            StreamError::PlaybackFatal { .. } => {
                "Playback failed. Please switch to another server.".to_string()
            }
            StreamError::Config(msg) => format!("Configuration problem: {}", msg),
            StreamError::Storage(msg) => format!("Could not access local storage: {}", msg),
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        StreamError::Transport {
            url,
            reason: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for StreamError {
    fn from(err: anyhow::Error) -> Self {
        StreamError::Storage(format!("{:#}", err))
    }
}
