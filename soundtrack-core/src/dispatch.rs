//! Idempotent dispatcher
//!
//! Decides, for one normalized event, whether a stage should be invoked.
//!
//! There is no deduplication store. Both gates are pure predicates over the
//! event itself (content-type allow-list, analysis completion), so a redelivered
//! event re-evaluates to the same decision. A repeated recommendation call for
//! the same media id must be a no-op on the recommendation service's side.

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::events::PipelineEvent;
use crate::types::{is_analysis_complete, MediaType};

/// External processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Recommendation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analysis => "analysis",
            Stage::Recommendation => "recommendation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stage invocation the dispatcher asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Analyze {
        storage_url: String,
        media_type: MediaType,
    },
    Recommend {
        media_id: String,
    },
}

impl Action {
    pub fn stage(&self) -> Stage {
        match self {
            Action::Analyze { .. } => Stage::Analysis,
            Action::Recommend { .. } => Stage::Recommendation,
        }
    }

    /// Storage URL or media id
    pub fn key(&self) -> &str {
        match self {
            Action::Analyze { storage_url, .. } => storage_url,
            Action::Recommend { media_id } => media_id,
        }
    }
}

/// Why an event needs no stage call. Expected, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Upload is not a content type the analysis stage handles
    UnsupportedContentType { content_type: String },
    /// Document exists but analysis has not written `processed_at` yet
    AnalysisPending,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnsupportedContentType { content_type } if content_type.is_empty() => {
                write!(f, "not relevant: no content type")
            }
            SkipReason::UnsupportedContentType { content_type } => {
                write!(f, "not relevant: content type {}", content_type)
            }
            SkipReason::AnalysisPending => write!(f, "analysis not yet complete"),
        }
    }
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Act(Action),
    Skip(SkipReason),
}

/// Stateless gatekeeper in front of the executor
#[derive(Debug, Clone)]
pub struct Dispatcher {
    allowed_content_types: Vec<String>,
}

impl Dispatcher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|p| p.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether an upload of `content_type` goes to analysis
    pub fn accepts_content_type(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        !content_type.is_empty()
            && self
                .allowed_content_types
                .iter()
                .any(|prefix| content_type.starts_with(prefix.as_str()))
    }

    /// Decide what to do with one event. Pure; no I/O.
    pub fn dispatch(&self, event: &PipelineEvent) -> Decision {
        match event {
            PipelineEvent::MediaUploaded {
                storage_url,
                content_type,
            } => {
                let media_type = MediaType::from_content_type(content_type)
                    .filter(|_| self.accepts_content_type(content_type));
                match media_type {
                    Some(media_type) => Decision::Act(Action::Analyze {
                        storage_url: storage_url.clone(),
                        media_type,
                    }),
                    None => Decision::Skip(SkipReason::UnsupportedContentType {
                        content_type: content_type.clone(),
                    }),
                }
            }
            PipelineEvent::MediaDocumentCreated { media_id, snapshot } => {
                if is_analysis_complete(snapshot) {
                    Decision::Act(Action::Recommend {
                        media_id: media_id.clone(),
                    })
                } else {
                    Decision::Skip(SkipReason::AnalysisPending)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisState, MediaSnapshot};
    use chrono::{TimeZone, Utc};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&PipelineConfig::default())
    }

    fn upload(content_type: &str) -> PipelineEvent {
        PipelineEvent::MediaUploaded {
            storage_url: "https://storage.googleapis.com/b/p.png".to_string(),
            content_type: content_type.to_string(),
        }
    }

    fn created(analysis: AnalysisState) -> PipelineEvent {
        PipelineEvent::MediaDocumentCreated {
            media_id: "abc123".to_string(),
            snapshot: MediaSnapshot {
                analysis,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_images_go_to_analysis() {
        for ct in ["image/png", "image/jpeg", "IMAGE/HEIC", " image/webp "] {
            match dispatcher().dispatch(&upload(ct)) {
                Decision::Act(action) => {
                    assert_eq!(action.stage(), Stage::Analysis);
                    assert_eq!(action.key(), "https://storage.googleapis.com/b/p.png");
                }
                other => panic!("{} should be analyzed, got {:?}", ct, other),
            }
        }
    }

    #[test]
    fn test_non_images_are_skipped() {
        for ct in ["video/mp4", "application/json", "text/plain", "", "imagery/x"] {
            assert_eq!(
                dispatcher().dispatch(&upload(ct)),
                Decision::Skip(SkipReason::UnsupportedContentType {
                    content_type: ct.to_string()
                }),
                "content type {:?}",
                ct
            );
        }
    }

    #[test]
    fn test_allow_list_is_configurable() {
        let config = PipelineConfig {
            allowed_content_types: vec!["image/".into(), "video/".into()],
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&config);
        assert!(dispatcher.accepts_content_type("video/mp4"));
        assert!(!dispatcher.accepts_content_type("audio/mpeg"));
    }

    #[test]
    fn test_analysis_payload_type_follows_content_type() {
        let config = PipelineConfig {
            allowed_content_types: vec!["image/".into(), "video/".into()],
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&config);

        let media_type = |ct: &str| match dispatcher.dispatch(&upload(ct)) {
            Decision::Act(Action::Analyze { media_type, .. }) => Some(media_type),
            _ => None,
        };
        assert_eq!(media_type("image/png"), Some(MediaType::Image));
        assert_eq!(media_type("video/mp4"), Some(MediaType::Clip));
    }

    #[test]
    fn test_allowed_prefix_without_media_type_is_skipped() {
        // never sent to analysis under a made-up type, even if configured
        let config = PipelineConfig {
            allowed_content_types: vec!["audio/".into()],
            ..Default::default()
        };
        assert_eq!(
            Dispatcher::new(&config).dispatch(&upload("audio/mpeg")),
            Decision::Skip(SkipReason::UnsupportedContentType {
                content_type: "audio/mpeg".to_string()
            })
        );
    }

    #[test]
    fn test_document_gating() {
        assert_eq!(
            dispatcher().dispatch(&created(AnalysisState::NotStarted)),
            Decision::Skip(SkipReason::AnalysisPending)
        );

        let done = created(AnalysisState::Completed {
            processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(
            dispatcher().dispatch(&done),
            Decision::Act(Action::Recommend {
                media_id: "abc123".to_string()
            })
        );
    }

    #[test]
    fn test_redelivery_yields_same_decision() {
        let dispatcher = dispatcher();
        let event = created(AnalysisState::Completed {
            processed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        });
        let first = dispatcher.dispatch(&event);
        assert_eq!(dispatcher.dispatch(&event), first);
        assert_eq!(
            dispatcher.dispatch(&upload("video/mp4")),
            dispatcher.dispatch(&upload("video/mp4"))
        );
    }

    #[test]
    fn test_skip_reasons_are_distinct() {
        let unsupported = SkipReason::UnsupportedContentType {
            content_type: "video/mp4".into(),
        };
        assert_eq!(unsupported.to_string(), "not relevant: content type video/mp4");
        assert_eq!(
            SkipReason::AnalysisPending.to_string(),
            "analysis not yet complete"
        );
    }
}
