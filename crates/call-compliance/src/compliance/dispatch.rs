use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{Action, CallSignals, OrganizationId, RuleId};
use super::evaluator::TriggeredAction;

/// Payload handed to a notification channel for one triggered action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionNotification {
    pub organization_id: OrganizationId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub action: Action,
    pub signals: CallSignals,
}

/// Delivery failure reported by a sink.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification target rejected: {0}")]
    Rejected(String),
}

/// Outbound channel (email, chat, SMS, webhook adapters) receiving triggered actions.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &ActionNotification) -> Result<(), DispatchError>;
}

impl<N> NotificationSink for Arc<N>
where
    N: NotificationSink + ?Sized,
{
    fn deliver(&self, notification: &ActionNotification) -> Result<(), DispatchError> {
        (**self).deliver(notification)
    }
}

/// Stub sink that records each action in the service log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn deliver(&self, notification: &ActionNotification) -> Result<(), DispatchError> {
        info!(
            organization_id = %notification.organization_id,
            rule_id = %notification.rule_id,
            action = notification.action.action_type.label(),
            target = %notification.action.target,
            "compliance action triggered"
        );
        Ok(())
    }
}

/// Triggered actions for one evaluated call, ready to be handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchBatch {
    pub organization_id: OrganizationId,
    pub signals: CallSignals,
    pub actions: Vec<TriggeredAction>,
}

impl DispatchBatch {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Tally of one batch's deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Handle to a dispatch running off the scoring path.
#[derive(Debug)]
pub struct DispatchHandle {
    task: Option<JoinHandle<DispatchReport>>,
    completed: DispatchReport,
}

impl DispatchHandle {
    pub fn idle() -> Self {
        Self::completed(DispatchReport::default())
    }

    /// Handle for a batch that was already delivered on the calling thread.
    pub fn completed(report: DispatchReport) -> Self {
        Self {
            task: None,
            completed: report,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.task.is_none()
    }

    /// Waits for the dispatch to finish. A cancelled or crashed task reports no deliveries.
    pub async fn finished(self) -> DispatchReport {
        match self.task {
            Some(task) => task.await.unwrap_or_else(|error| {
                warn!(error = %error, "dispatch task did not complete");
                DispatchReport::default()
            }),
            None => self.completed,
        }
    }
}

/// Delivers triggered actions through a sink, isolating every failure per action.
#[derive(Debug)]
pub struct ActionDispatcher<N> {
    sink: Arc<N>,
}

impl<N> Clone for ActionDispatcher<N> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<N> ActionDispatcher<N>
where
    N: NotificationSink + 'static,
{
    pub fn new(sink: Arc<N>) -> Self {
        Self { sink }
    }

    /// Delivers one action. Errors and panics are logged and reported as `false`.
    pub fn dispatch(
        &self,
        organization_id: &OrganizationId,
        triggered: &TriggeredAction,
        signals: &CallSignals,
    ) -> bool {
        let notification = ActionNotification {
            organization_id: organization_id.clone(),
            rule_id: triggered.rule_id.clone(),
            rule_name: triggered.rule_name.clone(),
            action: triggered.action.clone(),
            signals: signals.clone(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.sink.deliver(&notification)));
        match outcome {
            Ok(Ok(())) => {
                debug!(
                    rule_id = %triggered.rule_id,
                    action = triggered.action.action_type.label(),
                    target = %triggered.action.target,
                    "action delivered"
                );
                true
            }
            Ok(Err(error)) => {
                warn!(
                    rule_id = %triggered.rule_id,
                    action = triggered.action.action_type.label(),
                    target = %triggered.action.target,
                    error = %error,
                    "action dispatch failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    rule_id = %triggered.rule_id,
                    action = triggered.action.action_type.label(),
                    target = %triggered.action.target,
                    "notification sink panicked during dispatch"
                );
                false
            }
        }
    }

    /// Delivers a whole batch in order; one failed action never blocks the rest.
    pub fn dispatch_all(&self, batch: &DispatchBatch) -> DispatchReport {
        let mut report = DispatchReport::default();
        for triggered in &batch.actions {
            if self.dispatch(&batch.organization_id, triggered, &batch.signals) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Runs the batch on the current tokio runtime's blocking pool without blocking the
    /// caller. Outside a runtime the batch is delivered inline before returning.
    pub fn spawn(&self, batch: DispatchBatch) -> DispatchHandle {
        if batch.is_empty() {
            return DispatchHandle::idle();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                organization_id = %batch.organization_id,
                actions = batch.actions.len(),
                "no tokio runtime available; dispatching inline"
            );
            return DispatchHandle::completed(self.dispatch_all(&batch));
        };

        let dispatcher = self.clone();
        let task = runtime.spawn_blocking(move || dispatcher.dispatch_all(&batch));
        DispatchHandle {
            task: Some(task),
            completed: DispatchReport::default(),
        }
    }
}
