//! Outbound call executor
//!
//! Performs exactly one HTTP call per dispatched [`Action`]. There is no retry
//! and no queue: the event origins already redeliver with their own backoff,
//! so retrying here would multiply side effects on the stage endpoints.
//!
//! Each call has a hard time bound. It is set on the request itself and also
//! enforced around the whole exchange, so a stage that accepts the connection
//! and then stalls still yields [`CallError::Timeout`] on time.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::PipelineConfig;
use crate::dispatch::{Action, Stage};
use crate::error::{CallError, Error, Result};
use crate::types::MediaType;

/// Upstream bodies are cut to this many bytes before logging
const MAX_BODY_BYTES: usize = 2048;

/// Request body for POST `<analysis-endpoint>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzeRequest {
    pub storage_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

/// What goes in the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Analyze(AnalyzeRequest),
    Empty,
}

/// A fully resolved stage call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCall {
    pub stage: Stage,
    /// Storage URL or media id
    pub key: String,
    pub url: String,
    pub payload: Payload,
    pub timeout: Duration,
}

impl StageCall {
    /// Resolve endpoint, payload and time bound for an action
    pub fn for_action(action: &Action, config: &PipelineConfig) -> Self {
        match action {
            Action::Analyze {
                storage_url,
                media_type,
            } => StageCall {
                stage: Stage::Analysis,
                key: storage_url.clone(),
                url: config.analysis_endpoint(),
                payload: Payload::Analyze(AnalyzeRequest {
                    storage_url: storage_url.clone(),
                    media_type: *media_type,
                }),
                timeout: config.analysis_timeout(),
            },
            Action::Recommend { media_id } => StageCall {
                stage: Stage::Recommendation,
                key: media_id.clone(),
                url: format!(
                    "{}?media_id={}",
                    config.recommendation_endpoint(),
                    urlencoding::encode(media_id)
                ),
                payload: Payload::Empty,
                timeout: config.recommendation_timeout(),
            },
        }
    }

    /// Deterministic key for this cause.
    ///
    /// Redeliveries of the same event produce the same key, which is what an
    /// operator greps for when checking for duplicate side effects.
    pub fn invocation_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stage.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(self.key.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

/// A 2xx answer from a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client for the analysis and recommendation stages
#[derive(Debug, Clone)]
pub struct StageExecutor {
    http_client: reqwest::Client,
}

impl StageExecutor {
    /// Build the shared HTTP client
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("soundtrack-core/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Perform one call. Never retries.
    pub async fn invoke(&self, call: &StageCall) -> std::result::Result<StageResponse, CallError> {
        let started = Instant::now();

        tracing::debug!(
            stage = %call.stage,
            key = %call.key,
            url = %call.url,
            timeout_ms = call.timeout.as_millis() as u64,
            "Calling stage"
        );

        match tokio::time::timeout(call.timeout, self.exchange(call, started)).await {
            Ok(result) => result,
            Err(_) => Err(timed_out(started)),
        }
    }

    async fn exchange(
        &self,
        call: &StageCall,
        started: Instant,
    ) -> std::result::Result<StageResponse, CallError> {
        let request = self.http_client.post(&call.url).timeout(call.timeout);
        let request = match &call.payload {
            Payload::Analyze(body) => request.json(body),
            Payload::Empty => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                timed_out(started)
            } else {
                CallError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = match response.text().await {
            Ok(text) => truncate_body(text),
            Err(e) if e.is_timeout() => return Err(timed_out(started)),
            Err(e) => format!("<unreadable body: {}>", e),
        };

        if status.is_success() {
            Ok(StageResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(CallError::UpstreamRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn timed_out(started: Instant) -> CallError {
    CallError::Timeout {
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_BODY_BYTES {
        let mut cut = MAX_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    /// Serve `router` on an ephemeral port, returning its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn analyze_call(base_url: &str, timeout: Duration) -> StageCall {
        let config = PipelineConfig {
            analysis_timeout_ms: timeout.as_millis() as u64,
            ..PipelineConfig::with_base_url(base_url)
        };
        StageCall::for_action(
            &Action::Analyze {
                storage_url: "https://storage.googleapis.com/b/p.png".to_string(),
                media_type: MediaType::Image,
            },
            &config,
        )
    }

    #[test]
    fn test_recommend_call_shape() {
        let config = PipelineConfig::with_base_url("http://backend:8000/");
        let call = StageCall::for_action(
            &Action::Recommend {
                media_id: "abc 123".to_string(),
            },
            &config,
        );
        assert_eq!(call.stage, Stage::Recommendation);
        assert_eq!(
            call.url,
            "http://backend:8000/api/media/recommend-song?media_id=abc%20123"
        );
        assert_eq!(call.payload, Payload::Empty);
        assert_eq!(call.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_analyze_call_shape() {
        let call = analyze_call("http://backend:8000", Duration::from_secs(60));
        assert_eq!(call.url, "http://backend:8000/api/media/analyze-new");
        match &call.payload {
            Payload::Analyze(body) => {
                assert_eq!(
                    serde_json::to_value(body).unwrap(),
                    serde_json::json!({
                        "storage_url": "https://storage.googleapis.com/b/p.png",
                        "type": "image"
                    })
                );
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_invocation_key_is_deterministic() {
        let a = analyze_call("http://a", Duration::from_secs(1));
        let b = analyze_call("http://b", Duration::from_secs(2));
        assert_eq!(a.invocation_key(), b.invocation_key());
        assert_eq!(a.invocation_key().len(), 16);

        let mut other = a.clone();
        other.key = "https://storage.googleapis.com/b/q.png".to_string();
        assert_ne!(a.invocation_key(), other.invocation_key());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short".to_string()), "short");
        let long = "é".repeat(MAX_BODY_BYTES);
        let cut = truncate_body(long);
        assert!(cut.len() <= MAX_BODY_BYTES + 3);
        assert!(cut.ends_with("..."));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/media/analyze-new",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, "{\"message\":\"ok\"}")
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let executor = StageExecutor::new().unwrap();
        let response = executor
            .invoke(&analyze_call(&base, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.contains("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_upstream_rejected_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/api/media/analyze-new",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "gemini exploded")
                }),
            )
            .with_state(hits.clone());
        let base = serve(router).await;

        let executor = StageExecutor::new().unwrap();
        let err = executor
            .invoke(&analyze_call(&base, Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CallError::UpstreamRejected {
                status: 500,
                body: "gemini exploded".to_string()
            }
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_times_out_on_stalling_stage() {
        let router = Router::new().route(
            "/api/media/analyze-new",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                StatusCode::OK
            }),
        );
        let base = serve(router).await;

        let executor = StageExecutor::new().unwrap();
        let started = Instant::now();
        let err = executor
            .invoke(&analyze_call(&base, Duration::from_millis(200)))
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Timeout { .. }), "got {:?}", err);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_invoke_transport_error() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let executor = StageExecutor::new().unwrap();
        let err = executor
            .invoke(&analyze_call(
                &format!("http://{}", addr),
                Duration::from_secs(5),
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, CallError::Transport(_)), "got {:?}", err);
    }
}
