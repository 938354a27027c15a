//! Subtitle tracks of the active manifest
//!
//! At most one track is showing; selecting a track hides every other one.

use crate::models::SubtitleTrack;

/// Display mode of a text track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Showing,
    Hidden,
}

/// Track plus its current mode
#[derive(Debug, Clone, PartialEq)]
pub struct TextTrack {
    pub track: SubtitleTrack,
    pub mode: TrackMode,
}

/// Set of tracks attached with one manifest
#[derive(Debug, Clone, Default)]
pub struct SubtitleSet {
    tracks: Vec<TextTrack>,
}

impl SubtitleSet {
    /// Attach tracks; the first one is shown by default
    pub fn new(tracks: &[SubtitleTrack]) -> Self {
        let tracks = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| TextTrack {
                track: t.clone(),
                mode: if i == 0 {
                    TrackMode::Showing
                } else {
                    TrackMode::Hidden
                },
            })
            .collect();
        Self { tracks }
    }

    pub fn tracks(&self) -> &[TextTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Language label of the showing track
    pub fn active(&self) -> Option<&str> {
        self.tracks
            .iter()
            .find(|t| t.mode == TrackMode::Showing)
            .map(|t| t.track.language.as_str())
    }

    /// Show the track labelled `language`, or hide all with `None`
    ///
    /// Returns false (and changes nothing) for an unknown label.
    pub fn select(&mut self, language: Option<&str>) -> bool {
        let target = match language {
            Some(lang) => match self.tracks.iter().position(|t| t.track.language == lang) {
                Some(idx) => Some(idx),
                None => return false,
            },
            None => None,
        };

        for (i, t) in self.tracks.iter_mut().enumerate() {
            t.mode = if Some(i) == target {
                TrackMode::Showing
            } else {
                TrackMode::Hidden
            };
        }
        true
    }

    pub fn count(&self, mode: TrackMode) -> usize {
        self.tracks.iter().filter(|t| t.mode == mode).count()
    }
}
