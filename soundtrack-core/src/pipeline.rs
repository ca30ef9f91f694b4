//! The analysis-and-recommendation pipeline
//!
//! [`Pipeline::handle`] is the single entry point a host binding calls, once
//! per notification:
//!
//! ```text
//! Notification ─normalize─▶ PipelineEvent ─dispatch─▶ Action ─invoke─▶ stage
//!      │                          │                     │
//!      └─ Dropped                 └─ Skipped            └─ Invoked | Failed
//! ```
//!
//! Every path ends in an [`Outcome`]. Nothing is raised back to the host:
//! raising would make the origin redeliver, and a failure such as a corrupt
//! image or a persistent outage would then repeat its side effects. Retrying
//! is left to an operator or to a queue in front of the stage endpoints.
//!
//! A `Pipeline` holds only immutable configuration and a cloneable HTTP client,
//! so any number of `handle` futures may run concurrently.

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dispatch::{Action, Decision, Dispatcher, SkipReason, Stage};
use crate::error::{CallError, DropReason, Result};
use crate::events::{Notification, PipelineEvent};
use crate::executor::{StageCall, StageExecutor};

/// How one notification was handled
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The notification could not be normalized
    Dropped {
        origin: &'static str,
        notification: String,
        reason: DropReason,
    },
    /// Not relevant, or not ready yet
    Skipped { key: String, reason: SkipReason },
    /// The stage answered 2xx
    Invoked {
        stage: Stage,
        key: String,
        invocation_key: String,
        status: u16,
    },
    /// The stage call failed; logged and not retried
    Failed {
        stage: Stage,
        key: String,
        invocation_key: String,
        error: CallError,
    },
}

impl Outcome {
    /// Stage that was called, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Outcome::Invoked { stage, .. } | Outcome::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// Adapter, dispatcher and executor wired together
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    dispatcher: Dispatcher,
    executor: StageExecutor,
}

impl Pipeline {
    /// Build a pipeline from explicit configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::new(&config);
        let executor = StageExecutor::new()?;

        Ok(Self {
            config,
            dispatcher,
            executor,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle one raw notification from any origin
    pub async fn handle<N: Notification>(&self, notification: N) -> Outcome {
        let origin = notification.origin();
        let described = notification.describe();

        match notification.normalize(&self.config) {
            Ok(event) => self.handle_event(event).await,
            Err(reason) => {
                tracing::warn!(
                    origin,
                    notification = %described,
                    reason = %reason,
                    "Dropping notification"
                );
                Outcome::Dropped {
                    origin,
                    notification: described,
                    reason,
                }
            }
        }
    }

    /// Handle an already normalized event
    pub async fn handle_event(&self, event: PipelineEvent) -> Outcome {
        match self.dispatcher.dispatch(&event) {
            Decision::Act(action) => {
                if let PipelineEvent::MediaDocumentCreated { media_id, snapshot } = &event {
                    tracing::info!(
                        media_id = %media_id,
                        mood = %snapshot.mood.as_deref().unwrap_or("-"),
                        summary = %snapshot.summary_text().unwrap_or("-"),
                        "New media created with analysis"
                    );
                }
                self.execute(&action).await
            }
            Decision::Skip(reason) => {
                tracing::info!(key = %event.key(), reason = %reason, "Skipping event");
                Outcome::Skipped {
                    key: event.key().to_string(),
                    reason,
                }
            }
        }
    }

    async fn execute(&self, action: &Action) -> Outcome {
        let call = StageCall::for_action(action, &self.config);
        let invocation_key = call.invocation_key();
        let span = tracing::info_span!(
            "invocation",
            id = %Uuid::new_v4(),
            stage = %call.stage,
            invocation_key = %invocation_key,
        );

        async {
            match self.executor.invoke(&call).await {
                Ok(response) => {
                    tracing::info!(
                        key = %call.key,
                        status = response.status,
                        body = %response.body,
                        "Stage triggered"
                    );
                    Outcome::Invoked {
                        stage: call.stage,
                        key: call.key.clone(),
                        invocation_key: invocation_key.clone(),
                        status: response.status,
                    }
                }
                Err(error) => {
                    tracing::error!(
                        key = %call.key,
                        url = %call.url,
                        status = ?error.status(),
                        kind = error.kind(),
                        error = %error,
                        "Stage call failed, not retrying"
                    );
                    Outcome::Failed {
                        stage: call.stage,
                        key: call.key.clone(),
                        invocation_key: invocation_key.clone(),
                        error,
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
