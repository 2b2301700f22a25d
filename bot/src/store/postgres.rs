use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{Completion, MemberId, MemberState, ReportEntry, ReportSnapshot};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use tracing::{debug, instrument};

use super::{MemberPatch, MemberStore, ReportStore};

#[derive(Clone, Debug)]
pub struct DB(PgPool);

#[derive(Debug, Clone, sqlx::FromRow)]
struct MemberRecord {
    id: i64,
    name: String,
    stars: i32,
    local_score: i32,
    global_score: i32,
    last_star: DateTime<Utc>,
    completion: Json<Completion>,
    deleted: bool,
}

impl TryFrom<MemberRecord> for MemberState {
    type Error = anyhow::Error;

    fn try_from(record: MemberRecord) -> anyhow::Result<Self> {
        let id = record.id;
        let out_of_range = |column: &str| format!("Member {id} has {column} out of range");
        Ok(Self {
            name: record.name,
            id: MemberId::try_from(id).with_context(|| out_of_range("id"))?,
            stars: u32::try_from(record.stars)
                .with_context(|| out_of_range("stars"))?,
            local_score: u32::try_from(record.local_score)
                .with_context(|| out_of_range("local_score"))?,
            global_score: u32::try_from(record.global_score)
                .with_context(|| out_of_range("global_score"))?,
            last_star: record.last_star,
            completion: record.completion.0,
            deleted: record.deleted,
        })
    }
}

impl TryFrom<&MemberState> for MemberRecord {
    type Error = anyhow::Error;

    fn try_from(member: &MemberState) -> anyhow::Result<Self> {
        let id = member.id;
        let too_large = |column: &str| format!("Member {id} has {column} too large to store");
        Ok(Self {
            id: i64::try_from(id).with_context(|| too_large("id"))?,
            name: member.name.clone(),
            stars: i32::try_from(member.stars)
                .with_context(|| too_large("stars"))?,
            local_score: i32::try_from(member.local_score)
                .with_context(|| too_large("local_score"))?,
            global_score: i32::try_from(member.global_score)
                .with_context(|| too_large("global_score"))?,
            last_star: member.last_star,
            completion: Json(member.completion.clone()),
            deleted: member.deleted,
        })
    }
}

fn stored_id(id: MemberId) -> anyhow::Result<i64> {
    i64::try_from(id)
        .with_context(|| format!("Member id {id} is too large to store"))
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReportRecord {
    time: DateTime<Utc>,
    members: Json<Vec<ReportEntry>>,
}

impl From<ReportRecord> for ReportSnapshot {
    fn from(record: ReportRecord) -> Self {
        Self {
            time: record.time,
            members: record.members.0,
        }
    }
}

const MEMBER_COLUMNS: &str =
    "id, name, stars, local_score, global_score, last_star, completion, deleted";

impl DB {
    /// Opens the pool and brings the schema up to date. Called once at startup.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self(pool))
    }
}

#[async_trait]
impl MemberStore for DB {
    #[instrument(skip(self))]
    async fn get_member(&self, id: MemberId) -> anyhow::Result<Option<MemberState>> {
        let record = sqlx::query_as::<_, MemberRecord>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1"
        ))
        .bind(stored_id(id)?)
        .fetch_optional(&self.0)
        .await?;
        record.map(MemberState::try_from).transpose()
    }

    #[instrument(skip(self, member), fields(id = member.id))]
    async fn create_member(&self, member: &MemberState) -> anyhow::Result<()> {
        let record = MemberRecord::try_from(member)?;
        sqlx::query(
            r#"
            INSERT INTO members
                (id, name, stars, local_score, global_score, last_star, completion, deleted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.name)
        .bind(record.stars)
        .bind(record.local_score)
        .bind(record.global_score)
        .bind(record.last_star)
        .bind(record.completion)
        .bind(record.deleted)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(id = patch.id))]
    async fn apply_patch(&self, patch: &MemberPatch) -> anyhow::Result<bool> {
        let mut tx = self.0.begin().await?;

        // Row lock keeps a concurrent poll from interleaving with this write
        let record = sqlx::query_as::<_, MemberRecord>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE id = $1 FOR UPDATE"
        ))
        .bind(stored_id(patch.id)?)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some(record) = record else {
            anyhow::bail!("Member {} does not exist", patch.id);
        };
        let mut member = MemberState::try_from(record)?;
        if patch.stars().is_some_and(|stars| member.stars >= stars) {
            debug!(
                "Skipping patch: stored {} stars, patch has {:?}",
                member.stars,
                patch.stars()
            );
            return Ok(false);
        }

        patch.apply(&mut member)?;
        let record = MemberRecord::try_from(&member)?;
        sqlx::query(
            r#"
            UPDATE members
            SET name = $2, stars = $3, local_score = $4, global_score = $5,
                last_star = $6, completion = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.name)
        .bind(record.stars)
        .bind(record.local_score)
        .bind(record.global_score)
        .bind(record.last_star)
        .bind(record.completion)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_members(&self) -> anyhow::Result<Vec<MemberState>> {
        let records = sqlx::query_as::<_, MemberRecord>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY created_seq"
        ))
        .fetch_all(&self.0)
        .await?;
        records.into_iter().map(MemberState::try_from).collect()
    }

    async fn set_deleted(&self, id: MemberId, deleted: bool) -> anyhow::Result<()> {
        sqlx::query("UPDATE members SET deleted = $2 WHERE id = $1")
            .bind(stored_id(id)?)
            .bind(deleted)
            .execute(&self.0)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for DB {
    #[instrument(skip(self, report), fields(time = %report.time, members = report.members.len()))]
    async fn append_report(&self, report: &ReportSnapshot) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO reports (time, members) VALUES ($1, $2)")
            .bind(report.time)
            .bind(Json(&report.members))
            .execute(&self.0)
            .await?;
        Ok(())
    }

    async fn latest_reports(&self, limit: u32) -> anyhow::Result<Vec<ReportSnapshot>> {
        let records = sqlx::query_as::<_, ReportRecord>(
            "SELECT time, members FROM reports ORDER BY time DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.0)
        .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}
