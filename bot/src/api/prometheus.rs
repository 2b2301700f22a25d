use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

use crate::jobs::Job;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct JobRecord {
    pub job: Job,
    pub success: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct JobLabel {
    pub job: Job,
}

pub struct PrometheusClient {
    registry: Registry,
    job_runs: Family<JobRecord, Counter>,
    job_duration: Family<JobLabel, Histogram>,
    new_members: Counter,
    new_stars: Counter,
    failed_members: Counter,
    // Only the deletion flagger sees the whole roster, so it owns this gauge
    active_members: Gauge,
}

impl Default for PrometheusClient {
    fn default() -> Self {
        let mut registry = Registry::default();
        let job_runs = Family::default();
        let job_duration: Family<JobLabel, Histogram> = Family::new_with_constructor(|| {
            Histogram::new([0.5, 1., 2.5, 5., 10., 30., 60., 120., f64::INFINITY].into_iter())
        });
        let new_members = Counter::default();
        let new_stars = Counter::default();
        let failed_members = Counter::default();
        let active_members = Gauge::default();

        registry.register(
            "advent_job_runs",
            "Finished job runs by job and outcome",
            job_runs.clone(),
        );
        registry.register(
            "advent_job_duration_seconds",
            "Wall time of job runs",
            job_duration.clone(),
        );
        registry.register(
            "advent_members_new",
            "Members seen for the first time",
            new_members.clone(),
        );
        registry.register(
            "advent_stars_new",
            "Stars announced to the channel",
            new_stars.clone(),
        );
        registry.register(
            "advent_members_failed",
            "Members whose reconciliation failed",
            failed_members.clone(),
        );
        registry.register(
            "advent_members_active",
            "Members present in the latest roster",
            active_members.clone(),
        );

        Self {
            registry,
            job_runs,
            job_duration,
            new_members,
            new_stars,
            failed_members,
            active_members,
        }
    }
}

impl PrometheusClient {
    pub fn record_job(&self, job: Job, success: bool, started: chrono::DateTime<chrono::Utc>) {
        self.job_runs
            .get_or_create(&JobRecord {
                job,
                success: success as u32,
            })
            .inc();

        let time = chrono::Utc::now() - started;
        self.job_duration
            .get_or_create(&JobLabel { job })
            .observe(time.num_milliseconds() as f64 / 1000.0);
    }

    pub fn add_new_members(&self, amount: usize) {
        self.new_members.inc_by(amount as u64);
    }

    pub fn add_new_stars(&self, amount: u32) {
        self.new_stars.inc_by(amount as u64);
    }

    pub fn add_failed_members(&self, amount: usize) {
        self.failed_members.inc_by(amount as u64);
    }

    pub fn set_active_members(&self, amount: usize) {
        self.active_members.set(amount as i64);
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_job_runs() {
        let prometheus = PrometheusClient::default();
        prometheus.record_job(Job::Poll, true, chrono::Utc::now());
        prometheus.add_new_members(2);
        prometheus.set_active_members(7);

        let body = prometheus.encode().unwrap();

        assert!(body.contains(r#"advent_job_runs_total{job="Poll",success="1"} 1"#));
        assert!(body.contains("advent_members_new_total 2"));
        assert!(body.contains("advent_members_active 7"));
    }
}
