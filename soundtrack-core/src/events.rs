//! Event source adapter
//!
//! Turns notifications from the two event origins into one [`PipelineEvent`]:
//!
//! ```text
//! object storage  ── object-finalized ──┐
//!                                       ├──▶ PipelineEvent ──▶ Dispatcher
//! document store  ── document-created ──┘
//! ```
//!
//! Only shape normalization happens here. A notification that cannot be
//! normalized is dropped with a [`DropReason`]; the origins cannot act on a
//! pipeline error, so nothing is propagated back to them.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::DropReason;
use crate::types::{is_analysis_complete, MediaSnapshot};

/// Collection holding media documents
pub const MEDIA_COLLECTION: &str = "media";

/// Normalized pipeline event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A blob finished uploading
    MediaUploaded {
        storage_url: String,
        content_type: String,
    },
    /// A media document appeared in the document store
    MediaDocumentCreated {
        media_id: String,
        snapshot: MediaSnapshot,
    },
}

impl PipelineEvent {
    /// Identifying key used in logs: storage URL or media id
    pub fn key(&self) -> &str {
        match self {
            PipelineEvent::MediaUploaded { storage_url, .. } => storage_url,
            PipelineEvent::MediaDocumentCreated { media_id, .. } => media_id,
        }
    }
}

/// A raw notification from one event origin.
///
/// Each origin implements this once; the pipeline is generic over it.
pub trait Notification {
    /// Origin name for logs
    fn origin(&self) -> &'static str;

    /// Best available identity before normalization, for drop logs
    fn describe(&self) -> String;

    /// Shape-normalize into a pipeline event
    fn normalize(self, config: &PipelineConfig) -> Result<PipelineEvent, DropReason>;
}

// ============================================
// Object storage
// ============================================

/// `object-finalized` from object storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectFinalized {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

impl ObjectFinalized {
    pub fn new(bucket: &str, name: &str, content_type: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            content_type: Some(content_type.to_string()),
            bucket: Some(bucket.to_string()),
        }
    }
}

impl Notification for ObjectFinalized {
    fn origin(&self) -> &'static str {
        "object_storage"
    }

    fn describe(&self) -> String {
        format!(
            "{}/{}",
            self.bucket.as_deref().unwrap_or("?"),
            self.name.as_deref().unwrap_or("?")
        )
    }

    fn normalize(self, config: &PipelineConfig) -> Result<PipelineEvent, DropReason> {
        let bucket = non_empty(self.bucket).ok_or(DropReason::MissingField("bucket"))?;
        let name = non_empty(self.name).ok_or(DropReason::MissingField("name"))?;

        Ok(PipelineEvent::MediaUploaded {
            storage_url: config.storage_url(&bucket, &name),
            // no content type is treated like any other non-image type downstream
            content_type: self.content_type.unwrap_or_default(),
        })
    }
}

// ============================================
// Document store
// ============================================

/// `document-created` from the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCreated {
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(alias = "documentId")]
    pub document_id: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl DocumentCreated {
    pub fn media(document_id: &str, fields: serde_json::Value) -> Self {
        Self {
            collection: Some(MEDIA_COLLECTION.to_string()),
            document_id: document_id.to_string(),
            fields,
        }
    }

    /// Split `media/abc123` style ids into collection and id
    fn resolve_path(&self) -> (Option<&str>, &str) {
        match self.document_id.rsplit_once('/') {
            Some((collection, id)) => (Some(collection.trim_matches('/')), id),
            None => (self.collection.as_deref(), self.document_id.as_str()),
        }
    }
}

impl Notification for DocumentCreated {
    fn origin(&self) -> &'static str {
        "document_store"
    }

    fn describe(&self) -> String {
        match self.resolve_path() {
            (Some(collection), id) => format!("{}/{}", collection, id),
            (None, id) => id.to_string(),
        }
    }

    fn normalize(self, _config: &PipelineConfig) -> Result<PipelineEvent, DropReason> {
        let (collection, id) = self.resolve_path();

        match collection {
            Some(MEDIA_COLLECTION) => {}
            Some(other) => return Err(DropReason::UnexpectedCollection(other.to_string())),
            None => return Err(DropReason::MissingField("collection")),
        }
        if id.trim().is_empty() {
            return Err(DropReason::MissingField("documentId"));
        }
        let media_id = id.trim().to_string();

        let fields = if self.fields.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.fields
        };
        if !fields.is_object() {
            return Err(DropReason::MalformedField {
                field: "fields",
                message: "expected an object".to_string(),
            });
        }

        let snapshot = MediaSnapshot::from_fields(&fields).map_err(|e| {
            DropReason::MalformedField {
                field: "fields",
                message: e.to_string(),
            }
        })?;

        if is_analysis_complete(&snapshot) && snapshot.summary_text().is_none() {
            tracing::warn!(
                media_id = %media_id,
                "processed_at is set but summary is empty"
            );
        }

        Ok(PipelineEvent::MediaDocumentCreated { media_id, snapshot })
    }
}

// ============================================
// Tagged JSON form
// ============================================

/// Either notification, as delivered to the host binding as JSON.
///
/// ```json
/// {"kind": "object_finalized", "name": "p.png", "contentType": "image/png", "bucket": "b"}
/// {"kind": "document_created", "collection": "media", "documentId": "abc123", "fields": {}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawNotification {
    ObjectFinalized(ObjectFinalized),
    DocumentCreated(DocumentCreated),
}

impl RawNotification {
    /// Parse one JSON notification; anything unrecognized is a drop
    pub fn from_json(input: &str) -> Result<Self, DropReason> {
        serde_json::from_str(input).map_err(|e| DropReason::Unrecognized(e.to_string()))
    }
}

impl Notification for RawNotification {
    fn origin(&self) -> &'static str {
        match self {
            RawNotification::ObjectFinalized(n) => n.origin(),
            RawNotification::DocumentCreated(n) => n.origin(),
        }
    }

    fn describe(&self) -> String {
        match self {
            RawNotification::ObjectFinalized(n) => n.describe(),
            RawNotification::DocumentCreated(n) => n.describe(),
        }
    }

    fn normalize(self, config: &PipelineConfig) -> Result<PipelineEvent, DropReason> {
        match self {
            RawNotification::ObjectFinalized(n) => n.normalize(config),
            RawNotification::DocumentCreated(n) => n.normalize(config),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisState;
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn test_object_finalized_builds_storage_url() {
        let event = ObjectFinalized::new("b", "p.png", "image/png")
            .normalize(&config())
            .unwrap();
        assert_eq!(
            event,
            PipelineEvent::MediaUploaded {
                storage_url: "https://storage.googleapis.com/b/p.png".to_string(),
                content_type: "image/png".to_string(),
            }
        );
        assert_eq!(event.key(), "https://storage.googleapis.com/b/p.png");
    }

    #[test]
    fn test_object_finalized_missing_fields() {
        let n = ObjectFinalized {
            name: Some("p.png".into()),
            ..Default::default()
        };
        assert_eq!(
            n.normalize(&config()),
            Err(DropReason::MissingField("bucket"))
        );

        let n = ObjectFinalized {
            bucket: Some("b".into()),
            name: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(n.normalize(&config()), Err(DropReason::MissingField("name")));
    }

    #[test]
    fn test_object_finalized_without_content_type() {
        let n = ObjectFinalized {
            bucket: Some("b".into()),
            name: Some("blob".into()),
            content_type: None,
        };
        match n.normalize(&config()).unwrap() {
            PipelineEvent::MediaUploaded { content_type, .. } => assert!(content_type.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_document_created_normalizes_snapshot() {
        let n = DocumentCreated::media(
            "abc123",
            json!({"storage_url": "https://x/b/p.png", "type": "image"}),
        );
        match n.normalize(&config()).unwrap() {
            PipelineEvent::MediaDocumentCreated { media_id, snapshot } => {
                assert_eq!(media_id, "abc123");
                assert_eq!(snapshot.analysis, AnalysisState::NotStarted);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_document_created_accepts_full_path() {
        let n = DocumentCreated {
            collection: None,
            document_id: "media/abc123".to_string(),
            fields: json!({"processed_at": "2024-01-01T00:00:00Z", "summary": "s"}),
        };
        assert_eq!(n.describe(), "media/abc123");
        let event = n.normalize(&config()).unwrap();
        assert_eq!(event.key(), "abc123");
    }

    #[test]
    fn test_completed_document_survives_odd_fields() {
        for fields in [
            json!({"processed_at": "2024-01-01T00:00:00Z", "summary": "s",
                   "elements": [{"name": "tree"}]}),
            json!({"processed_at": "2024-01-01T00:00:00Z", "summary": "s", "type": "video"}),
            json!({"processed_at": "2024-01-01T00:00:00Z", "summary": "s",
                   "ts": "2024-01-01 09:00:00"}),
        ] {
            let n = DocumentCreated::media("abc123", fields.clone());
            match n.normalize(&config()) {
                Ok(PipelineEvent::MediaDocumentCreated { snapshot, .. }) => {
                    assert!(is_analysis_complete(&snapshot), "{}", fields)
                }
                other => panic!("{} should normalize, got {:?}", fields, other),
            }
        }
    }

    #[test]
    fn test_document_created_drops() {
        let n = DocumentCreated {
            collection: Some("biometrics".into()),
            document_id: "x".into(),
            fields: json!({}),
        };
        assert_eq!(
            n.normalize(&config()),
            Err(DropReason::UnexpectedCollection("biometrics".into()))
        );

        let n = DocumentCreated::media("", json!({}));
        assert_eq!(
            n.normalize(&config()),
            Err(DropReason::MissingField("documentId"))
        );

        let n = DocumentCreated::media("abc", json!(["not", "an", "object"]));
        assert!(matches!(
            n.normalize(&config()),
            Err(DropReason::MalformedField { field: "fields", .. })
        ));

        let n = DocumentCreated::media("abc", json!({"processed_at": 42}));
        assert!(matches!(
            n.normalize(&config()),
            Err(DropReason::MalformedField { .. })
        ));
    }

    #[test]
    fn test_raw_notification_json() {
        let raw = RawNotification::from_json(
            r#"{"kind":"object_finalized","name":"p.png","contentType":"image/png","bucket":"b"}"#,
        )
        .unwrap();
        assert_eq!(raw.origin(), "object_storage");
        assert_eq!(raw.describe(), "b/p.png");

        let raw = RawNotification::from_json(
            r#"{"kind":"document_created","collection":"media","documentId":"abc123","fields":{"type":"image"}}"#,
        )
        .unwrap();
        assert_eq!(raw.origin(), "document_store");

        assert!(matches!(
            RawNotification::from_json(r#"{"kind":"bucket_deleted"}"#),
            Err(DropReason::Unrecognized(_))
        ));
        assert!(RawNotification::from_json("not json").is_err());
    }
}
