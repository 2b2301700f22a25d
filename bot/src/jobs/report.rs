use shared::ReportSnapshot;
use tracing::{info, instrument, warn};

use super::Context;
use crate::messages;
use crate::store::{MemberStore, ReportStore};

/// Snapshots the active members and appends the result. Ranking happens when
/// the report is rendered, not here.
pub async fn build_report(
    members: &dyn MemberStore,
    reports: &dyn ReportStore,
    time: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<ReportSnapshot> {
    let stored = members.list_members().await?;
    let report = ReportSnapshot::of_active(time, &stored);
    reports.append_report(&report).await?;
    Ok(report)
}

#[instrument(skip(context))]
pub async fn build(context: &Context) -> anyhow::Result<ReportSnapshot> {
    let report = build_report(
        context.members.as_ref(),
        context.reports.as_ref(),
        chrono::Utc::now(),
    )
    .await?;
    info!("Stored report with {} active members", report.members.len());
    Ok(report)
}

/// Renders the newest report and posts it. Returns `None` if nothing was stored yet.
#[instrument(skip(context))]
pub async fn send(context: &Context) -> anyhow::Result<Option<ReportSnapshot>> {
    let Some(report) = context.reports.latest_reports(1).await?.into_iter().next() else {
        warn!("No report has been built yet, nothing to send");
        return Ok(None);
    };

    info!(
        "Sending ranking from {} with {} members",
        report.time,
        report.members.len()
    );
    context
        .slack
        .send(&messages::ranking_message(&report))
        .await?;
    Ok(Some(report))
}
