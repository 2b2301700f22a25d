use std::collections::BTreeSet;

use anyhow::Context as _;
use shared::MemberId;
use tracing::{info, instrument};

use super::Context;
use crate::store::MemberStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSummary {
    pub flagged: usize,
    pub active: usize,
}

/// Marks every stored member that is missing from `roster` as deleted and
/// every present one as active. The flag is written even when unchanged.
pub async fn flag_deletions(
    store: &dyn MemberStore,
    roster: &BTreeSet<MemberId>,
) -> anyhow::Result<DeletionSummary> {
    let mut summary = DeletionSummary::default();
    for member in store.list_members().await? {
        let deleted = !roster.contains(&member.id);
        store
            .set_deleted(member.id, deleted)
            .await
            .with_context(|| format!("Failed to flag member {}", member.id))?;

        if deleted {
            summary.flagged += 1;
        } else {
            summary.active += 1;
        }
    }
    Ok(summary)
}

#[instrument(skip(context))]
pub async fn run(context: &Context) -> anyhow::Result<DeletionSummary> {
    let leaderboard = context
        .leaderboard
        .fetch()
        .await
        .context("Failed to fetch the leaderboard")?;
    let roster = leaderboard.roster();

    let summary = flag_deletions(context.members.as_ref(), &roster).await?;
    info!(
        "Roster has {} members; {} stored members active, {} flagged as deleted",
        roster.len(),
        summary.active,
        summary.flagged
    );
    context.prometheus.set_active_members(summary.active);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{self, MemoryStore};

    fn store_with(members: &[(MemberId, bool)]) -> MemoryStore {
        let store = MemoryStore::default();
        for (id, deleted) in members {
            let mut member = testing::member(*id, &format!("member {id}"), 1);
            member.deleted = *deleted;
            store.insert(member);
        }
        store
    }

    fn deleted_flags(store: &MemoryStore) -> Vec<(MemberId, bool)> {
        store
            .members()
            .into_iter()
            .map(|member| (member.id, member.deleted))
            .collect()
    }

    #[tokio::test]
    async fn deleted_is_the_complement_of_the_roster() {
        let store = store_with(&[(1, false), (2, true), (3, false), (4, true)]);
        let roster = BTreeSet::from([2, 3, 99]);

        let summary = flag_deletions(&store, &roster).await.unwrap();

        assert_eq!(
            deleted_flags(&store),
            vec![(1, true), (2, false), (3, false), (4, true)]
        );
        assert_eq!(
            summary,
            DeletionSummary {
                flagged: 2,
                active: 2,
            }
        );
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let store = store_with(&[(1, false), (2, true), (3, false)]);
        let roster = BTreeSet::from([1, 2]);

        flag_deletions(&store, &roster).await.unwrap();
        let after_first = deleted_flags(&store);
        flag_deletions(&store, &roster).await.unwrap();

        assert_eq!(deleted_flags(&store), after_first);
    }

    #[tokio::test]
    async fn run_uses_the_fetched_roster() {
        let store = Arc::new(store_with(&[(1, false), (2, false)]));
        let context = testing::context(
            store.clone(),
            testing::FixedLeaderboard::new(testing::response(vec![testing::raw_member(
                2, "Bob", 1,
            )])),
            Arc::new(testing::RecordingNotifier::default()),
        );

        run(&context).await.unwrap();

        assert_eq!(deleted_flags(&store), vec![(1, true), (2, false)]);
    }

    #[tokio::test]
    async fn failed_fetch_writes_nothing() {
        let store = Arc::new(store_with(&[(1, false)]));
        let context = testing::context(
            store.clone(),
            testing::FixedLeaderboard::failing(),
            Arc::new(testing::RecordingNotifier::default()),
        );

        assert!(run(&context).await.is_err());
        assert_eq!(deleted_flags(&store), vec![(1, false)]);
    }
}
