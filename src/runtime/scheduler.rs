/// Background escalation scheduler
///
/// Registers a single cron job with tokio-cron-scheduler that sweeps open
/// requests and escalates pending steps nobody has acted on within the
/// configured window.

use crate::runtime::engine::WorkflowEngine;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct EscalationScheduler {
    scheduler: RwLock<JobScheduler>,
    job_id: RwLock<Option<Uuid>>,
    engine: Arc<WorkflowEngine>,
    schedule: String,
    after: chrono::Duration,
}

impl EscalationScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, schedule: &str, after_hours: i64) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: RwLock::new(scheduler),
            job_id: RwLock::new(None),
            engine,
            schedule: schedule.to_string(),
            after: chrono::Duration::hours(after_hours),
        })
    }

    /// Register the sweep job and start the scheduler
    pub async fn start(&self) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let after = self.after;

        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let engine = Arc::clone(&engine);

            Box::pin(async move {
                tracing::debug!("🔔 Stale-step sweep triggered");
                match engine.escalate_stale(after, chrono::Utc::now()).await {
                    Ok(ids) if ids.is_empty() => {
                        tracing::debug!("No stale requests found");
                    }
                    Ok(ids) => {
                        tracing::info!("⏫ Auto-escalated {} stale requests: {:?}", ids.len(), ids);
                    }
                    Err(e) => {
                        tracing::error!("❌ Stale-step sweep failed: {}", e);
                    }
                }
            })
        })?;

        let scheduler = self.scheduler.read().await;
        let uuid = scheduler.add(job).await?;
        *self.job_id.write().await = Some(uuid);
        scheduler.start().await?;

        tracing::info!(
            "⏰ Escalation scheduler started ({}, after {} hours)",
            self.schedule,
            self.after.num_hours()
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(uuid) = self.job_id.write().await.take() {
            let scheduler = self.scheduler.read().await;
            if let Err(e) = scheduler.remove(&uuid).await {
                tracing::warn!("⚠️ Failed to remove escalation job {}: {}", uuid, e);
            }
        }

        let mut scheduler = self.scheduler.write().await;
        scheduler.shutdown().await?;
        tracing::info!("⏹️ Escalation scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryRegistry;
    use crate::runtime::notifier::NotificationDispatcher;
    use crate::storage::InMemoryStore;
    use crate::workflow::policy::AuthorizationPolicy;
    use std::time::Duration;

    fn engine() -> Arc<WorkflowEngine> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/org.json");
        Arc::new(WorkflowEngine::new(
            Arc::new(DirectoryRegistry::from_file(path).unwrap()),
            Arc::new(InMemoryStore::new()),
            NotificationDispatcher::new(Duration::from_millis(100)),
            AuthorizationPolicy::default(),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_then_stop_removes_the_job() {
        let scheduler = EscalationScheduler::new(engine(), "0 0 * * * *", 72).await.unwrap();

        scheduler.start().await.unwrap();
        assert!(scheduler.job_id.read().await.is_some());

        scheduler.stop().await.unwrap();
        assert!(scheduler.job_id.read().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_schedule_fails_to_start() {
        let scheduler = EscalationScheduler::new(engine(), "every hour", 72).await.unwrap();
        assert!(scheduler.start().await.is_err());
    }
}
