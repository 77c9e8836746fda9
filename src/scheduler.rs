use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::error::Result;
use crate::managers::SharedRenewalNotifier;

/// Start the renewal reminder job on `cron_expr` (six fields, seconds first).
///
/// The returned scheduler must be kept alive for the job to keep firing.
pub async fn start_reminders(
    notifier: SharedRenewalNotifier,
    cron_expr: &str,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;

    let job = Job::new_async(cron_expr, move |_uuid, _lock| {
        let notifier = notifier.clone();
        Box::pin(async move {
            let start = std::time::Instant::now();
            info!(job_name = "renewal_reminders", "Starting renewal sweep");

            match notifier.sweep_from(Utc::now()).await {
                Ok(reminded) => info!(
                    job_name = "renewal_reminders",
                    reminded,
                    duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Renewal sweep finished"
                ),
                Err(e) => error!(job_name = "renewal_reminders", error = %e, "Renewal sweep failed"),
            }
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;
    info!("Renewal reminders scheduled with cron '{}'", cron_expr);

    Ok(sched)
}
