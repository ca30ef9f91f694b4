//! Mood events derived from biosignal windows
//!
//! The classifier that turns features into a label lives outside this crate.
//! A [`MoodEvent`] records its output together with the exact feature snapshot
//! it was computed from, so the label and confidence can be reproduced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The fixed set of mood labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoodLabel {
    Calm,
    Focused,
    Energetic,
    Melancholic,
    Happy,
    Anxious,
    Neutral,
}

impl MoodLabel {
    pub const ALL: [MoodLabel; 7] = [
        MoodLabel::Calm,
        MoodLabel::Focused,
        MoodLabel::Energetic,
        MoodLabel::Melancholic,
        MoodLabel::Happy,
        MoodLabel::Anxious,
        MoodLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::Calm => "Calm",
            MoodLabel::Focused => "Focused",
            MoodLabel::Energetic => "Energetic",
            MoodLabel::Melancholic => "Melancholic",
            MoodLabel::Happy => "Happy",
            MoodLabel::Anxious => "Anxious",
            MoodLabel::Neutral => "Neutral",
        }
    }

    /// Where on the energy/valence plane a matching track should sit.
    pub fn audio_target(&self) -> AudioTarget {
        let (energy, valence) = match self {
            MoodLabel::Calm => (0.25, 0.60),
            MoodLabel::Focused => (0.45, 0.50),
            MoodLabel::Energetic => (0.90, 0.70),
            MoodLabel::Melancholic => (0.30, 0.20),
            MoodLabel::Happy => (0.70, 0.90),
            MoodLabel::Anxious => (0.75, 0.25),
            MoodLabel::Neutral => (0.50, 0.50),
        };
        AudioTarget { energy, valence }
    }
}

impl std::fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MoodLabel {
    type Err = String;

    /// Case-insensitive, so free-text moods from analysis ("calm") map too
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim();
        MoodLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown mood label: {}", s))
    }
}

/// Target point for track matching
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioTarget {
    pub energy: f64,
    pub valence: f64,
}

// ============================================
// Features
// ============================================

/// EEG band powers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EegBands {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

/// ECG-derived heart metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcgMetrics {
    /// Heart rate in beats per minute
    pub hr: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmssd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdnn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lf_hf: Option<f64>,
}

/// Motion activity from the IMU
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuMetrics {
    pub activity: f64,
}

/// Feature snapshot for one biosignal window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodFeatures {
    pub eeg: EegBands,
    /// Named band ratios such as `alpha/beta`
    #[serde(default)]
    pub eeg_ratios: BTreeMap<String, f64>,
    pub ecg: EcgMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu: Option<ImuMetrics>,
}

impl MoodFeatures {
    fn all_finite(&self) -> bool {
        let eeg = [
            self.eeg.delta,
            self.eeg.theta,
            self.eeg.alpha,
            self.eeg.beta,
            self.eeg.gamma,
        ];
        let ecg = [self.ecg.rmssd, self.ecg.sdnn, self.ecg.lf_hf];

        eeg.iter().all(|v| v.is_finite())
            && self.eeg_ratios.values().all(|v| v.is_finite())
            && self.ecg.hr.is_finite()
            && ecg.iter().flatten().all(|v| v.is_finite())
            && self.imu.map_or(true, |imu| imu.activity.is_finite())
    }
}

// ============================================
// Mood Event
// ============================================

/// A mood derived from one biosignal window. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MoodEventRecord")]
pub struct MoodEvent {
    #[serde(rename = "ts")]
    timestamp: DateTime<Utc>,
    label: MoodLabel,
    confidence: f64,
    features: MoodFeatures,
}

impl MoodEvent {
    /// Build an event, rejecting a confidence outside `[0, 1]` or any
    /// non-finite feature value.
    pub fn new(
        timestamp: DateTime<Utc>,
        label: MoodLabel,
        confidence: f64,
        features: MoodFeatures,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidMood(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        if !features.all_finite() {
            return Err(Error::InvalidMood(
                "feature snapshot contains non-finite values".to_string(),
            ));
        }
        Ok(Self {
            timestamp,
            label,
            confidence,
            features,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn label(&self) -> MoodLabel {
        self.label
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn features(&self) -> &MoodFeatures {
        &self.features
    }
}

/// Unvalidated wire form of [`MoodEvent`]
#[derive(Deserialize)]
struct MoodEventRecord {
    ts: DateTime<Utc>,
    label: MoodLabel,
    confidence: f64,
    features: MoodFeatures,
}

impl TryFrom<MoodEventRecord> for MoodEvent {
    type Error = Error;

    fn try_from(record: MoodEventRecord) -> Result<Self> {
        MoodEvent::new(record.ts, record.label, record.confidence, record.features)
    }
}

/// Latest mood at or before `at`, given events in any order
pub fn mood_at(moods: &[MoodEvent], at: DateTime<Utc>) -> Option<&MoodEvent> {
    moods
        .iter()
        .filter(|m| m.timestamp <= at)
        .max_by_key(|m| m.timestamp)
}
