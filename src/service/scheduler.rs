//! Cron-style runner for the payout jobs.
//!
//! Jobs run one at a time on the calling task. A job that overruns simply
//! delays the others; anything already due fires as soon as the previous
//! job returns.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use std::future::Future;
use tracing::{info, warn};

use crate::core::config::ScheduleConfig;
use crate::service::manager::{JobReport, PayoutManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every minute whose value is a multiple of `n` (cron `*/n`).
    EveryMinutes(u32),
    /// Once a day at `hour:00` UTC.
    DailyAt { hour: u32 },
}

impl Schedule {
    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let minute_start = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        match *self {
            Schedule::EveryMinutes(n) => {
                let n = n.clamp(1, 60);
                let mut next = minute_start + ChronoDuration::minutes(1);
                while next.minute() % n != 0 {
                    next += ChronoDuration::minutes(1);
                }
                next
            }
            Schedule::DailyAt { hour } => {
                let today = now
                    .date_naive()
                    .and_hms_opt(hour.min(23), 0, 0)
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .unwrap_or(minute_start);
                if today > now {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    PullPayouts,
    SendPayout,
    AssociateAll,
    ConfirmPayouts,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::PullPayouts => "pull_payouts",
            Job::SendPayout => "send_payout",
            Job::AssociateAll => "associate_all_payouts",
            Job::ConfirmPayouts => "confirm_payouts",
        }
    }
}

pub struct Scheduler {
    manager: PayoutManager,
    jobs: Vec<(Job, Schedule)>,
}

impl Scheduler {
    pub fn new(manager: PayoutManager, config: &ScheduleConfig) -> Self {
        let jobs = vec![
            (Job::PullPayouts, Schedule::EveryMinutes(config.pull_interval_minutes)),
            (Job::SendPayout, Schedule::DailyAt { hour: config.payout_hour }),
            (Job::AssociateAll, Schedule::DailyAt { hour: config.associate_hour }),
            (Job::ConfirmPayouts, Schedule::DailyAt { hour: config.confirm_hour }),
        ];
        Self { manager, jobs }
    }

    pub fn jobs(&self) -> &[(Job, Schedule)] {
        &self.jobs
    }

    pub async fn run_job(&self, job: Job) -> JobReport {
        info!(job = job.name(), "Running scheduled job");
        let report = match job {
            Job::PullPayouts => self.manager.pull_payouts().await,
            Job::SendPayout => self.manager.send_payout().await,
            Job::AssociateAll => self.manager.associate_all_payouts().await,
            Job::ConfirmPayouts => self.manager.confirm_payouts().await,
        };
        if !report.all_ok() {
            warn!(job = job.name(), failed = ?report.failed, "Scheduled job failed for some currencies");
        }
        report
    }

    /// Run jobs until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let start = Utc::now();
        let mut next: Vec<DateTime<Utc>> = self.jobs.iter().map(|(_, s)| s.next_after(start)).collect();
        info!(jobs = self.jobs.len(), "Scheduler starting up");

        loop {
            let Some((index, due)) = next.iter().copied().enumerate().min_by_key(|(_, at)| *at) else {
                return;
            };
            let wait = (due - Utc::now()).to_std().unwrap_or_default();

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let (job, schedule) = self.jobs[index];
            self.run_job(job).await;
            next[index] = schedule.next_after(Utc::now().max(due));
        }
    }
}
