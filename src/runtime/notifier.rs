/// Best-effort notification fan-out
///
/// Runs after a transition has been committed. Every (event, notifier) pair
/// becomes its own tokio task with a bounded timeout; a failed or slow
/// delivery is logged and counted, never retried, and never reported back
/// to the workflow.

use crate::workflow::events::WorkflowEvent;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A delivery channel for workflow events
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, event: &WorkflowEvent) -> Result<()>;
}

/// Writes every event to the tracing log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &WorkflowEvent) -> Result<()> {
        tracing::info!(
            "📨 {:?} for request {} -> {} (status: {})",
            event.kind,
            event.request_id,
            event.recipient.email,
            event.status
        );
        Ok(())
    }
}

/// POSTs each event as JSON to a configured URL
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, event: &WorkflowEvent) -> Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!("Webhook {} responded with {}", self.url, status));
        }
        Ok(())
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field(
                "notifiers",
                &self.notifiers.iter().map(|n| n.name()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            notifiers: Vec::new(),
            timeout,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    /// Spawn one delivery task per (event, notifier) and return immediately
    ///
    /// The handles are only useful to callers that want to wait for delivery
    /// (tests, graceful shutdown); the workflow engine drops them.
    pub fn dispatch(&self, events: Vec<WorkflowEvent>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(events.len() * self.notifiers.len());

        for event in events {
            let event = Arc::new(event);
            for notifier in &self.notifiers {
                let notifier = Arc::clone(notifier);
                let event = Arc::clone(&event);
                let stats = Arc::clone(&self.stats);
                let timeout = self.timeout;

                handles.push(tokio::spawn(async move {
                    match tokio::time::timeout(timeout, notifier.send(&event)).await {
                        Ok(Ok(())) => {
                            stats.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                "⚠️ Notifier '{}' failed for request {} ({:?}): {}",
                                notifier.name(),
                                event.request_id,
                                event.kind,
                                e
                            );
                        }
                        Err(_) => {
                            stats.timed_out.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                "⏱️ Notifier '{}' timed out after {:?} for request {} ({:?})",
                                notifier.name(),
                                timeout,
                                event.request_id,
                                event.kind
                            );
                        }
                    }
                }));
            }
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::types::OrgNode;
    use crate::workflow::events::EventKind;
    use crate::workflow::types::RequestStatus;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, event: &WorkflowEvent) -> Result<()> {
            self.0.lock().await.push(event.recipient.email.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _event: &WorkflowEvent) -> Result<()> {
            Err(anyhow::anyhow!("smtp unavailable"))
        }
    }

    struct Slow;

    #[async_trait]
    impl Notifier for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn send(&self, _event: &WorkflowEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn event(email: &str) -> WorkflowEvent {
        WorkflowEvent {
            kind: EventKind::StepAssigned,
            request_id: "req-1".to_string(),
            category: "leave".to_string(),
            recipient: OrgNode {
                name: email.to_string(),
                email: email.to_string(),
                title: String::new(),
                department: None,
                reports_to_email: None,
            },
            status: RequestStatus::Approved,
            level: Some(1),
            actor: None,
            reason: None,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_and_counted() {
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let dispatcher = NotificationDispatcher::new(Duration::from_millis(50))
            .with_notifier(Arc::new(Failing))
            .with_notifier(Arc::new(Slow))
            .with_notifier(recording.clone());

        let handles = dispatcher.dispatch(vec![event("a@corp.example"), event("b@corp.example")]);
        assert_eq!(handles.len(), 6);
        for handle in handles {
            handle.await.unwrap();
        }

        let mut delivered = recording.0.lock().await.clone();
        delivered.sort();
        assert_eq!(delivered, vec!["a@corp.example", "b@corp.example"]);
        assert_eq!(
            dispatcher.stats(),
            DispatchCounts {
                delivered: 2,
                failed: 2,
                timed_out: 2
            }
        );
    }

    #[tokio::test]
    async fn no_notifiers_means_no_tasks() {
        let dispatcher = NotificationDispatcher::new(Duration::from_millis(50));
        assert!(dispatcher.dispatch(vec![event("a@corp.example")]).is_empty());
    }
}
