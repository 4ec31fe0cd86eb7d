//! Periodic maintenance jobs

use anyhow::Result;
use auth::blacklist::BlacklistStore;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info};

use crate::rate_limiter::RateLimiter;

/// Every minute, at second zero
pub const RATE_LIMIT_CLEANUP_SCHEDULE: &str = "0 * * * * *";
/// Daily at 03:00 UTC
pub const BLACKLIST_CLEANUP_SCHEDULE: &str = "0 0 3 * * *";

/// Start the scheduler that drops expired rate limit windows and, when an
/// age limit is configured, purges old blacklist entries
pub async fn start_cleanup_jobs(
    rate_limiter: RateLimiter,
    blacklist: BlacklistStore,
    blacklist_max_age_days: Option<i64>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(RATE_LIMIT_CLEANUP_SCHEDULE, move |_, _| {
        let rate_limiter = rate_limiter.clone();
        Box::pin(async move {
            rate_limiter.cleanup().await;
            debug!("{} rate limit windows tracked", rate_limiter.tracked().await);
        })
    })?;
    scheduler.add(job).await?;

    if let Some(days) = blacklist_max_age_days {
        let job = Job::new_async(BLACKLIST_CLEANUP_SCHEDULE, move |_, _| {
            let blacklist = blacklist.clone();
            Box::pin(async move {
                blacklist.clean_older_than(days).await;
            })
        })?;
        scheduler.add(job).await?;
        info!("Blacklist entries older than {} days are purged daily", days);
    }

    scheduler.start().await?;
    info!("Started cleanup scheduler");
    Ok(scheduler)
}
