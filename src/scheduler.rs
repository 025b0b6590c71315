use chrono::{Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigHandle, ConfigSnapshot, parse_daily_time, parse_weekday};
use crate::models::AlertEvent;
use crate::monitor::{Monitor, PassReport};
use crate::reports::Reporter;
use crate::utils::error::{AppError, Result};

/// Hours covered by the daily failure summary.
pub const DAILY_SUMMARY_HOURS: u32 = 24;

/// Cron expression (seconds first) firing once a day at `hour:minute`.
pub fn daily_cron(hour: u32, minute: u32) -> String {
    format!("0 {} {} * * *", minute, hour)
}

pub fn weekly_cron(day: Weekday, hour: u32, minute: u32) -> String {
    format!("0 {} {} * * {}", minute, hour, day)
}

/// Shared state behind every scheduled job.
///
/// Only one monitoring pass runs at a time. A trigger that fires while a pass
/// holds the guard is skipped rather than queued.
#[derive(Clone)]
pub struct PassRunner {
    monitor: Arc<Monitor>,
    config: Arc<ConfigHandle>,
    pass_guard: Arc<Mutex<()>>,
}

impl PassRunner {
    pub fn new(monitor: Arc<Monitor>, config: Arc<ConfigHandle>) -> Self {
        Self {
            monitor,
            config,
            pass_guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Run a pass against the current snapshot. `None` when another pass is
    /// still in progress.
    pub async fn run_pass(&self) -> Result<Option<PassReport>> {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            warn!("Previous monitoring pass still running, skipping this trigger");
            metrics::counter!("price_sentinel_passes_skipped_total").increment(1);
            return Ok(None);
        };

        let snapshot = self.config.current().await;
        self.monitor.run_pass(&snapshot).await.map(Some)
    }

    /// Send the failure digest for the last day. Returns whether anything was
    /// sent.
    pub async fn send_daily_failure_summary(&self) -> Result<bool> {
        let snapshot = self.config.current().await;
        let reporter = Reporter::new(Arc::clone(self.monitor.store()));

        let Some(digest) = reporter
            .daily_failure_summary(&snapshot.config.items, DAILY_SUMMARY_HOURS, Utc::now())
            .await?
        else {
            debug!("No failures in the last {} hours, daily summary not sent", DAILY_SUMMARY_HOURS);
            return Ok(false);
        };

        info!(
            "Sending daily failure summary: {} failure(s) across {} item(s)",
            digest.total_failures(),
            digest.items.len()
        );
        self.deliver(AlertEvent::FailureDigest(digest), &snapshot.config.notifications.recipients)
            .await
    }

    pub async fn send_weekly_summary(&self) -> Result<bool> {
        let snapshot = self.config.current().await;
        let config = &snapshot.config;
        let reporter = Reporter::new(Arc::clone(self.monitor.store()))
            .with_persistent_window(config.failure_alerts.persistent_window_days);

        let items: Vec<_> = config.enabled_items().cloned().collect();
        let summary = reporter.weekly_summary(&items, Utc::now()).await?;
        info!(
            "Sending weekly summary: {} item(s), {} changed",
            summary.items.len(),
            summary.changed_items()
        );

        let recipients = config
            .weekly_summary
            .recipients
            .as_deref()
            .unwrap_or(&config.notifications.recipients);
        self.deliver(AlertEvent::WeeklySummary(summary), recipients).await
    }

    async fn deliver(&self, event: AlertEvent, recipients: &[String]) -> Result<bool> {
        let notifier = self.monitor.notifier();
        let result = notifier.notify(&event, recipients).await?;
        if !result.success {
            let reason = result.error.unwrap_or_else(|| "unknown".to_string());
            return Err(AppError::Notification {
                notifier: notifier.name().to_string(),
                message: reason,
            });
        }
        Ok(true)
    }
}

pub struct MonitorScheduler {
    scheduler: JobScheduler,
    runner: PassRunner,
    job_ids: Mutex<Vec<Uuid>>,
}

impl MonitorScheduler {
    pub async fn new(runner: PassRunner) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner,
            job_ids: Mutex::new(Vec::new()),
        })
    }

    pub fn runner(&self) -> &PassRunner {
        &self.runner
    }

    pub async fn start(&self) -> Result<()> {
        let snapshot = self.runner.config().current().await;
        self.register_jobs(&snapshot).await?;
        self.scheduler.start().await?;
        info!("Monitor scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        info!("Monitor scheduler shutdown");
        Ok(())
    }

    /// Drop every job and register them again from the current snapshot.
    pub async fn reschedule(&self) -> Result<()> {
        {
            let mut job_ids = self.job_ids.lock().await;
            for id in job_ids.drain(..) {
                self.scheduler.remove(&id).await?;
            }
        }

        let snapshot = self.runner.config().current().await;
        self.register_jobs(&snapshot).await
    }

    async fn register_jobs(&self, snapshot: &ConfigSnapshot) -> Result<()> {
        let config = &snapshot.config;
        let tz = schedule_tz(&config.schedule.timezone)?;
        let mut job_ids = self.job_ids.lock().await;

        for time in &config.schedule.times {
            let (hour, minute) = parse_time(time)?;
            let runner = self.runner.clone();
            let job = Job::new_async_tz(daily_cron(hour, minute).as_str(), tz, move |_uuid, _l| {
                let runner = runner.clone();
                Box::pin(async move {
                    match runner.run_pass().await {
                        Ok(Some(report)) => debug!("Scheduled pass checked {} item(s)", report.items.len()),
                        Ok(None) => {}
                        Err(e) => error!("Scheduled pass failed: {}", e),
                    }
                })
            })?;
            job_ids.push(self.scheduler.add(job).await?);
            info!("Scheduled monitoring pass daily at {} {}", time, tz);
        }

        if config.failure_alerts.daily_summary {
            let (hour, minute) = parse_time(&config.failure_alerts.daily_summary_time)?;
            let runner = self.runner.clone();
            let job = Job::new_async_tz(daily_cron(hour, minute).as_str(), tz, move |_uuid, _l| {
                let runner = runner.clone();
                Box::pin(async move {
                    if let Err(e) = runner.send_daily_failure_summary().await {
                        error!("Daily failure summary failed: {}", e);
                    }
                })
            })?;
            job_ids.push(self.scheduler.add(job).await?);
            info!(
                "Scheduled daily failure summary at {} {}",
                config.failure_alerts.daily_summary_time, tz
            );
        }

        if config.weekly_summary.enabled {
            let day = parse_weekday(&config.weekly_summary.day_of_week).ok_or_else(|| {
                AppError::Validation(format!("Invalid weekday '{}'", config.weekly_summary.day_of_week))
            })?;
            let (hour, minute) = parse_time(&config.weekly_summary.time)?;
            let runner = self.runner.clone();
            let job = Job::new_async_tz(weekly_cron(day, hour, minute).as_str(), tz, move |_uuid, _l| {
                let runner = runner.clone();
                Box::pin(async move {
                    if let Err(e) = runner.send_weekly_summary().await {
                        error!("Weekly summary failed: {}", e);
                    }
                })
            })?;
            job_ids.push(self.scheduler.add(job).await?);
            info!("Scheduled weekly summary on {} at {} {}", day, config.weekly_summary.time, tz);
        }

        Ok(())
    }
}

fn schedule_tz(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| AppError::Validation(format!("Invalid schedule timezone '{}'", name)))
}

fn parse_time(value: &str) -> Result<(u32, u32)> {
    parse_daily_time(value).ok_or_else(|| AppError::Validation(format!("Invalid time '{}', expected HH:MM", value)))
}
