use anyhow::{anyhow, Context as _};
use futures::future::join_all;
use itertools::Itertools;
use shared::{LeaderboardResponse, MemberState, RawMember};
use tracing::{debug, error, info, instrument};

use super::Context;
use crate::messages;
use crate::store::{MemberPatch, MemberStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedMember {
    pub name: String,
    pub new_stars: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Created(MemberState),
    Updated(UpdatedMember),
    Unchanged,
}

#[derive(Debug, Default)]
pub struct PollOutcome {
    pub new_members: Vec<MemberState>,
    pub updated_members: Vec<UpdatedMember>,
    /// Roster key of the member and the reason its reconciliation failed.
    pub failed: Vec<(String, anyhow::Error)>,
}

/// Read, compare and write one member.
pub async fn reconcile_member(
    store: &dyn MemberStore,
    raw: &RawMember,
) -> anyhow::Result<Reconciled> {
    let snapshot = raw.normalize()?;

    let Some(stored) = store.get_member(snapshot.id).await? else {
        store.create_member(&snapshot).await?;
        let created = store
            .get_member(snapshot.id)
            .await?
            .ok_or_else(|| anyhow!("Member {} is missing right after creation", snapshot.id))?;
        return Ok(Reconciled::Created(created));
    };

    if snapshot.stars <= stored.stars {
        return Ok(Reconciled::Unchanged);
    }

    if !store.apply_patch(&MemberPatch::from_snapshot(&snapshot)).await? {
        debug!("Member {} was updated by another run in the meantime", snapshot.id);
        return Ok(Reconciled::Unchanged);
    }

    Ok(Reconciled::Updated(UpdatedMember {
        name: snapshot.name,
        new_stars: snapshot.stars - stored.stars,
    }))
}

/// Reconciles every fetched member concurrently and waits for all of them.
/// Results are partitioned by ascending member id, with unreadable ids first.
/// A failing member never hides the others.
pub async fn reconcile(store: &dyn MemberStore, leaderboard: &LeaderboardResponse) -> PollOutcome {
    let tasks = leaderboard
        .members
        .iter()
        .sorted_by_key(|(key, raw)| (raw.id.parse(), *key))
        .map(|(key, raw)| async move { (key, reconcile_member(store, raw).await) });
    let results = join_all(tasks).await;

    let mut outcome = PollOutcome::default();
    for (key, result) in results {
        match result {
            Ok(Reconciled::Created(member)) => outcome.new_members.push(member),
            Ok(Reconciled::Updated(member)) => outcome.updated_members.push(member),
            Ok(Reconciled::Unchanged) => {}
            Err(e) => outcome.failed.push((key.clone(), e)),
        }
    }
    outcome
}

/// Sends the welcome message and one message per member with new stars.
pub async fn notify(context: &Context, outcome: &PollOutcome) -> anyhow::Result<()> {
    let names: Vec<&str> = outcome
        .new_members
        .iter()
        .map(|member| member.name.as_str())
        .collect();
    if let Some(message) = messages::welcome_message(&names) {
        info!("Sending welcome for {} new members", names.len());
        context.slack.send(&message).await?;
    } else {
        debug!("No new members");
    }

    if outcome.updated_members.is_empty() {
        debug!("No updated members");
    }
    for member in &outcome.updated_members {
        if let Some(message) = messages::star_message(&member.name, member.new_stars) {
            info!("Sending star notification for {}", member.name);
            context.slack.send(&message).await?;
            context.prometheus.add_new_stars(member.new_stars);
        }
    }
    Ok(())
}

#[instrument(skip(context))]
pub async fn run(context: &Context) -> anyhow::Result<PollOutcome> {
    info!("Checking leaderboard");
    let leaderboard = context
        .leaderboard
        .fetch()
        .await
        .context("Failed to fetch the leaderboard")?;

    let outcome = reconcile(context.members.as_ref(), &leaderboard).await;
    info!(
        "Reconciled {} members: {} new, {} updated, {} failed",
        leaderboard.members.len(),
        outcome.new_members.len(),
        outcome.updated_members.len(),
        outcome.failed.len()
    );
    for (key, e) in &outcome.failed {
        error!("Failed to reconcile member {key}: {e:#}");
    }
    context
        .prometheus
        .add_new_members(outcome.new_members.len());
    context.prometheus.add_failed_members(outcome.failed.len());

    notify(context, &outcome).await?;
    Ok(outcome)
}
