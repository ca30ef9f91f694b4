//! Core domain types for the media side of the pipeline
//!
//! These types mirror the `media/{mediaId}` documents written by the analysis
//! stage and read back by the dispatcher.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **MediaItem** | One captured artifact (photo or clip) with its analysis results |
//! | **Snapshot** | The document fields as observed by a single create notification |
//! | **Stage** | One external processing step (analysis or recommendation) |
//! | **Gating predicate** | Read-only check deciding whether a stage's prerequisite holds |
//!
//! ### Completion marker
//!
//! The stored document signals analysis completion only through the presence
//! of `processed_at`. In memory that field becomes [`AnalysisState`], so the
//! predicate [`is_analysis_complete`] is total over an explicit value instead of
//! probing for a key.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// ============================================
// Media Type
// ============================================

/// Kind of captured artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Clip,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Clip => "clip",
        }
    }

    /// Media type for an upload's MIME type: `image/*` or `video/*`
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            Some(MediaType::Image)
        } else if content_type.starts_with("video/") {
            Some(MediaType::Clip)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "clip" => Ok(MediaType::Clip),
            _ => Err(format!("unknown media type: {}", s)),
        }
    }
}

// ============================================
// Analysis State
// ============================================

/// Whether the analysis stage has written its results.
///
/// Stored as the optional `processed_at` timestamp; `null` or absent is
/// [`AnalysisState::NotStarted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisState {
    #[default]
    NotStarted,
    Completed { processed_at: DateTime<Utc> },
}

impl AnalysisState {
    pub fn is_not_started(&self) -> bool {
        matches!(self, AnalysisState::NotStarted)
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AnalysisState::NotStarted => None,
            AnalysisState::Completed { processed_at } => Some(*processed_at),
        }
    }
}

impl Serialize for AnalysisState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AnalysisState::NotStarted => serializer.serialize_none(),
            AnalysisState::Completed { processed_at } => {
                serializer.serialize_some(&processed_at.to_rfc3339())
            }
        }
    }
}

impl<'de> Deserialize<'de> for AnalysisState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        match value {
            None | Some(serde_json::Value::Null) => Ok(AnalysisState::NotStarted),
            Some(v) => parse_timestamp(&v)
                .map(|processed_at| AnalysisState::Completed { processed_at })
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Anything carrying an [`AnalysisState`]
pub trait Analyzed {
    fn analysis(&self) -> &AnalysisState;
}

/// Gating predicate for the recommendation stage.
///
/// Pure: depends only on the analysis state of the value passed in.
pub fn is_analysis_complete(item: &impl Analyzed) -> bool {
    matches!(item.analysis(), AnalysisState::Completed { .. })
}

// ============================================
// Timestamps
// ============================================

/// Parse a document timestamp.
///
/// Accepts an RFC 3339 string, or a seconds/nanos object in either the
/// `{ "seconds", "nanos" }` or the `{ "_seconds", "_nanoseconds" }` spelling.
pub fn parse_timestamp(value: &serde_json::Value) -> std::result::Result<DateTime<Utc>, String> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid RFC 3339 timestamp {:?}: {}", s, e)),
        serde_json::Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(|v| v.as_i64())
                .ok_or_else(|| "timestamp object without integer seconds".to_string())?;
            let nanos = map
                .get("nanos")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let nanos = u32::try_from(nanos)
                .map_err(|_| format!("timestamp nanos out of range: {}", nanos))?;
            Utc.timestamp_opt(seconds, nanos)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {}s {}ns", seconds, nanos))
        }
        other => Err(format!("unsupported timestamp value: {}", other)),
    }
}

/// Presentation field that may hold anything: a value of the wrong shape
/// becomes `None` instead of failing the whole document.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                tracing::debug!(value = %v, error = %e, "Ignoring malformed document field");
                Ok(None)
            }
        },
    }
}

fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match parse_timestamp(&v) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed document timestamp");
                Ok(None)
            }
        },
    }
}

// ============================================
// Media Snapshot
// ============================================

/// Document fields as delivered by a `document-created` notification.
///
/// Only the completion marker is parsed strictly. Everything else is optional
/// and lenient: the document is created before the analysis fields exist, and
/// a presentation field of an unexpected shape (an unknown `type`, `elements`
/// written as objects) reads as `None` rather than dropping the notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaSnapshot {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub storage_url: Option<String>,

    #[serde(default, rename = "type", deserialize_with = "lenient")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    #[serde(default, rename = "ts", deserialize_with = "lenient_timestamp")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(
        default,
        rename = "processed_at",
        skip_serializing_if = "AnalysisState::is_not_started"
    )]
    pub analysis: AnalysisState,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl MediaSnapshot {
    /// Parse the raw `fields` map of a document notification
    pub fn from_fields(fields: &serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(fields.clone())?)
    }

    /// Non-empty summary, if analysis produced one
    pub fn summary_text(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl Analyzed for MediaSnapshot {
    fn analysis(&self) -> &AnalysisState {
        &self.analysis
    }
}

// ============================================
// Media Item
// ============================================

/// One captured artifact and its analysis results.
///
/// `id`, `timestamp` and `storage_url` never change after creation. The
/// analysis fields are written once by the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub storage_url: String,
    /// Clip-only presentation metadata
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Detected entities, in the order analysis reported them
    #[serde(default)]
    pub elements: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-text mood reported by the analysis stage
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, rename = "processed_at")]
    pub analysis: AnalysisState,
}

impl MediaItem {
    /// A freshly uploaded item: identity and raw fields only
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        media_type: MediaType,
        storage_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            session_id: None,
            timestamp,
            media_type,
            storage_url: storage_url.into(),
            thumb_url: None,
            duration_sec: None,
            summary: None,
            elements: Vec::new(),
            tags: Vec::new(),
            mood: None,
            analysis: AnalysisState::NotStarted,
        }
    }

    /// Check the model invariants.
    ///
    /// A completed item must carry a non-empty summary, and the clip-only
    /// fields must be absent on images.
    pub fn check_invariants(&self) -> Result<()> {
        let invalid = |message: &str| Error::InvalidMedia {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if is_analysis_complete(self)
            && self.summary.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err(invalid("processed_at is set but summary is empty"));
        }
        if self.media_type == MediaType::Image
            && (self.thumb_url.is_some() || self.duration_sec.is_some())
        {
            return Err(invalid("clip-only fields set on an image"));
        }
        Ok(())
    }
}

impl Analyzed for MediaItem {
    fn analysis(&self) -> &AnalysisState {
        &self.analysis
    }
}
