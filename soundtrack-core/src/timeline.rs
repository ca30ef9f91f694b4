//! Timeline and playlist projections
//!
//! Nothing here is persisted. Every view is recomputed from media items, mood
//! events and recommendations whenever it is asked for.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::mood::{mood_at, MoodEvent, MoodLabel};
use crate::track::{Recommendation, SpotifyTrack};
use crate::types::MediaItem;

/// What a timeline entry shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    Media,
    Song,
}

/// One entry of the timeline view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub kind: TimelineKind,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<SpotifyTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<MoodLabel>,
}

/// Merge media, moods and recommendations into one time-ordered list.
///
/// Each entry carries the label of the latest mood event at or before its
/// timestamp. When a media item and a song share a timestamp the media item
/// comes first.
pub fn build_timeline(
    media: &[MediaItem],
    moods: &[MoodEvent],
    recommendations: &[Recommendation],
) -> Vec<TimelineItem> {
    let label_at = |ts| mood_at(moods, ts).map(MoodEvent::label);

    let media_items = media.iter().map(|item| TimelineItem {
        kind: TimelineKind::Media,
        timestamp: item.timestamp,
        media_id: Some(item.id.clone()),
        thumb_url: item
            .thumb_url
            .clone()
            .or_else(|| Some(item.storage_url.clone())),
        summary: item.summary.clone(),
        elements: item.elements.clone(),
        track: None,
        mood: label_at(item.timestamp),
    });

    let song_items = recommendations.iter().map(|rec| TimelineItem {
        kind: TimelineKind::Song,
        timestamp: rec.timestamp,
        media_id: Some(rec.media_id.clone()),
        thumb_url: None,
        summary: None,
        elements: Vec::new(),
        track: Some(rec.track.clone()),
        mood: label_at(rec.timestamp),
    });

    let mut timeline: Vec<TimelineItem> = media_items.chain(song_items).collect();
    // stable: media before songs at equal timestamps
    timeline.sort_by_key(|item| item.timestamp);
    timeline
}

/// The timeline restricted to one UTC day
pub fn daily_timeline(
    date: NaiveDate,
    media: &[MediaItem],
    moods: &[MoodEvent],
    recommendations: &[Recommendation],
) -> Vec<TimelineItem> {
    build_timeline(media, moods, recommendations)
        .into_iter()
        .filter(|item| item.timestamp.date_naive() == date)
        .collect()
}

/// Tracks in timeline order, each track id once
pub fn playlist(items: &[TimelineItem]) -> Vec<SpotifyTrack> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| item.track.as_ref())
        .filter(|track| seen.insert(track.id.clone()))
        .cloned()
        .collect()
}
