use std::sync::Arc;

use anyhow::Context as _;
use prometheus_client::encoding::EncodeLabelValue;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info, warn, Instrument};

use crate::api::{prometheus::PrometheusClient, LeaderboardApi, Notify};
use crate::store::{MemberStore, ReportStore};

pub mod deletions;
pub mod poll;
pub mod report;

/// Everything a job needs, built once at startup.
#[derive(Clone)]
pub struct Context {
    pub leaderboard: Arc<dyn LeaderboardApi>,
    pub members: Arc<dyn MemberStore>,
    pub reports: Arc<dyn ReportStore>,
    pub slack: Arc<dyn Notify>,
    pub prometheus: Arc<PrometheusClient>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    EncodeLabelValue,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Job {
    Poll,
    Deletions,
    BuildReport,
    SendReport,
}

impl Job {
    pub async fn run(self, context: &Context) -> anyhow::Result<()> {
        match self {
            Job::Poll => poll::run(context).await.map(|_| ()),
            Job::Deletions => deletions::run(context).await.map(|_| ()),
            Job::BuildReport => report::build(context).await.map(|_| ()),
            Job::SendReport => report::send(context).await.map(|_| ()),
        }
    }
}

/// Cron expressions for each job, seconds first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub poll: String,
    pub deletions: String,
    pub build_report: String,
    pub send_report: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            poll: "0 */15 * * * *".to_string(),
            deletions: "0 5 */2 * * *".to_string(),
            build_report: "0 10 */2 * * *".to_string(),
            send_report: "0 0 12 * * *".to_string(),
        }
    }
}

impl Schedule {
    fn entries(&self) -> [(Job, &str); 4] {
        [
            (Job::Poll, self.poll.as_str()),
            (Job::Deletions, self.deletions.as_str()),
            (Job::BuildReport, self.build_report.as_str()),
            (Job::SendReport, self.send_report.as_str()),
        ]
    }
}

/// Runs `job` unless its previous run is still going, and records the outcome.
pub async fn run_guarded(
    job: Job,
    context: &Context,
    guard: &Mutex<()>,
) -> Option<anyhow::Result<()>> {
    let Ok(_running) = guard.try_lock() else {
        warn!("Previous {job} run is still in progress, skipping this trigger");
        return None;
    };

    let started = chrono::Utc::now();
    let span = tracing::info_span!("job", %job);
    let result = job.run(context).instrument(span).await;

    context.prometheus.record_job(job, result.is_ok(), started);
    match &result {
        Ok(()) => info!("Finished {job}"),
        Err(e) => error!("Failed to run {job}: {e:#}"),
    }
    Some(result)
}

pub async fn scheduler(context: Context, schedule: &Schedule) -> anyhow::Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for (job, cron) in schedule.entries() {
        let context = context.clone();
        let guard = Arc::new(Mutex::new(()));
        let cron_job = CronJob::new_async(cron, move |_uuid, _lock| {
            let context = context.clone();
            let guard = guard.clone();
            Box::pin(async move {
                run_guarded(job, &context, &guard).await;
            })
        })
        .with_context(|| format!("creating {job} job for cron {cron}"))?;
        sched
            .add(cron_job)
            .await
            .with_context(|| format!("adding {job} job"))?;
        info!("Scheduled {job} at {cron}");
    }
    Ok(sched)
}
