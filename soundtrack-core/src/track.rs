//! Tracks returned by the external music service, and mood-based ranking
//!
//! The catalog owns these records; the pipeline keeps them only as references
//! attached to the media item they were recommended for.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mood::{AudioTarget, MoodLabel};

/// Audio features reported by the catalog. Every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFeatures {
    #[serde(default, alias = "tempo", skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<u8>,
    /// 0 = minor, 1 = major
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub danceability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acousticness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumentalness: Option<f64>,
}

impl AudioFeatures {
    /// Euclidean distance to `target` on the energy/valence plane.
    ///
    /// `None` unless both axes are known.
    pub fn distance_to(&self, target: AudioTarget) -> Option<f64> {
        let energy = self.energy?;
        let valence = self.valence?;
        Some(((energy - target.energy).powi(2) + (valence - target.valence).powi(2)).sqrt())
    }
}

/// A catalog track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_art_url: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<AudioFeatures>,
}

impl SpotifyTrack {
    /// Embeddable player URL
    pub fn embed_url(&self) -> String {
        format!("https://open.spotify.com/embed/track/{}", self.id)
    }

    fn mood_distance(&self, label: MoodLabel) -> Option<f64> {
        self.audio_features
            .as_ref()
            .and_then(|f| f.distance_to(label.audio_target()))
    }
}

/// A track chosen for a specific media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub media_id: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub track: SpotifyTrack,
}

/// Order candidate tracks by closeness to the mood's audio target.
///
/// Tracks without energy and valence sort last. Ties break on id so the
/// ranking is stable across calls.
pub fn rank_tracks(label: MoodLabel, tracks: &[SpotifyTrack]) -> Vec<&SpotifyTrack> {
    let mut ranked: Vec<(&SpotifyTrack, Option<f64>)> = tracks
        .iter()
        .map(|track| (track, track.mood_distance(label)))
        .collect();

    ranked.sort_by(|(a, da), (b, db)| {
        let by_distance = match (da, db) {
            (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_distance.then_with(|| a.id.cmp(&b.id))
    });

    ranked.into_iter().map(|(track, _)| track).collect()
}
