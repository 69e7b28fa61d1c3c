use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;
use std::sync::Arc;
use crate::context::I18nContext;

/// Initialize and start the scheduler running cache and telemetry maintenance
/// on `schedule` (six-field cron, seconds first).
pub async fn start_scheduler(context: Arc<I18nContext>, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    info!("Scheduling maintenance (cron: {})", schedule);
    let context_clone = Arc::clone(&context);

    let job = Job::new_async(schedule, move |_uuid, _l| {
        let context = Arc::clone(&context_clone);

        Box::pin(async move {
            info!("⏰ Maintenance job triggered");
            let report = context.run_maintenance();
            info!(
                "✓ Maintenance completed: {} cache entries, {} samples removed",
                report.cache_entries_removed, report.samples_removed
            );
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}
