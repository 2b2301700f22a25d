use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{MemberId, MemberState, ReportSnapshot};

mod postgres;

pub use postgres::DB;

/// A single field of a stored member that a patch may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    Name,
    Stars,
    LocalScore,
    GlobalScore,
    LastStar,
    Completion { day: u32, star: u8 },
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Name => write!(f, "name"),
            FieldPath::Stars => write!(f, "stars"),
            FieldPath::LocalScore => write!(f, "local_score"),
            FieldPath::GlobalScore => write!(f, "global_score"),
            FieldPath::LastStar => write!(f, "last_star"),
            FieldPath::Completion { day, star } => write!(f, "completion.{day}.{star}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchValue {
    Text(String),
    Count(u32),
    Time(DateTime<Utc>),
}

/// Field-level update of one member, applied atomically by the store.
///
/// Fields not listed (`deleted`, creation order, completion entries that are
/// not mentioned) keep their stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPatch {
    pub id: MemberId,
    pub fields: Vec<(FieldPath, PatchValue)>,
}

impl MemberPatch {
    /// Overwrites every mutable field with the fetched values.
    pub fn from_snapshot(snapshot: &MemberState) -> Self {
        let mut fields = vec![
            (FieldPath::Name, PatchValue::Text(snapshot.name.clone())),
            (FieldPath::Stars, PatchValue::Count(snapshot.stars)),
            (FieldPath::LocalScore, PatchValue::Count(snapshot.local_score)),
            (FieldPath::GlobalScore, PatchValue::Count(snapshot.global_score)),
            (FieldPath::LastStar, PatchValue::Time(snapshot.last_star)),
        ];
        for (day, stars) in &snapshot.completion {
            for (star, earned_at) in stars {
                fields.push((
                    FieldPath::Completion {
                        day: *day,
                        star: *star,
                    },
                    PatchValue::Time(*earned_at),
                ));
            }
        }

        Self {
            id: snapshot.id,
            fields,
        }
    }

    /// Star count the patch writes. Stores only apply the patch while the
    /// stored count is strictly lower.
    pub fn stars(&self) -> Option<u32> {
        self.fields
            .iter()
            .find_map(|(path, value)| match (path, value) {
                (FieldPath::Stars, PatchValue::Count(stars)) => Some(*stars),
                _ => None,
            })
    }

    pub fn apply(&self, member: &mut MemberState) -> anyhow::Result<()> {
        for (path, value) in &self.fields {
            match (path, value) {
                (FieldPath::Name, PatchValue::Text(name)) => member.name = name.clone(),
                (FieldPath::Stars, PatchValue::Count(count)) => member.stars = *count,
                (FieldPath::LocalScore, PatchValue::Count(count)) => member.local_score = *count,
                (FieldPath::GlobalScore, PatchValue::Count(count)) => member.global_score = *count,
                (FieldPath::LastStar, PatchValue::Time(time)) => member.last_star = *time,
                (FieldPath::Completion { day, star }, PatchValue::Time(time)) => {
                    member
                        .completion
                        .entry(*day)
                        .or_default()
                        .insert(*star, *time);
                }
                (path, value) => anyhow::bail!("Can't set {path} to {value:?}"),
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get_member(&self, id: MemberId) -> anyhow::Result<Option<MemberState>>;

    /// Creates the member unless a record with the same id already exists.
    async fn create_member(&self, member: &MemberState) -> anyhow::Result<()>;

    /// Returns `false` when the patch was skipped because the stored star
    /// count is already at or above the patched one.
    async fn apply_patch(&self, patch: &MemberPatch) -> anyhow::Result<bool>;

    /// Every stored member in creation order, deleted ones included.
    async fn list_members(&self) -> anyhow::Result<Vec<MemberState>>;

    async fn set_deleted(&self, id: MemberId, deleted: bool) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn append_report(&self, report: &ReportSnapshot) -> anyhow::Result<()>;

    /// Up to `limit` reports, newest first.
    async fn latest_reports(&self, limit: u32) -> anyhow::Result<Vec<ReportSnapshot>>;
}
