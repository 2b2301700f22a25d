use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod leaderboard;
mod timestamp;

#[cfg(feature = "client")]
pub mod advent;

#[cfg(feature = "client")]
pub mod slack;

pub use leaderboard::*;
pub use timestamp::*;

pub type MemberId = u64;

/// Day of the event -> star index (1 or 2) -> time the star was earned.
pub type Completion = BTreeMap<u32, BTreeMap<u8, DateTime<Utc>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberState {
    pub name: String,
    pub id: MemberId,
    pub stars: u32,
    pub local_score: u32,
    pub global_score: u32,
    pub last_star: DateTime<Utc>,
    pub completion: Completion,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub id: MemberId,
    pub stars: u32,
    pub local_score: u32,
}

impl From<&MemberState> for ReportEntry {
    fn from(member: &MemberState) -> Self {
        Self {
            name: member.name.clone(),
            id: member.id,
            stars: member.stars,
            local_score: member.local_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub time: DateTime<Utc>,
    pub members: Vec<ReportEntry>,
}

impl ReportSnapshot {
    /// Projects every member that is not soft-deleted, keeping the given order.
    pub fn of_active(time: DateTime<Utc>, members: &[MemberState]) -> Self {
        Self {
            time,
            members: members
                .iter()
                .filter(|member| !member.deleted)
                .map(ReportEntry::from)
                .collect(),
        }
    }
}
