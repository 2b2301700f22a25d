use std::collections::{BTreeMap, BTreeSet};

use anyhow::bail;
use serde::Deserialize;
use tracing::warn;

use crate::{epoch_zero, Completion, MemberId, MemberState, RawTimestamp};

/// Body of `/{year}/leaderboard/private/view/{team}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardResponse {
    pub members: BTreeMap<String, RawMember>,
    pub owner_id: RawId,
    pub event: String,
}

impl LeaderboardResponse {
    /// Ids of every member in this fetch. Members with unreadable ids are left out.
    pub fn roster(&self) -> BTreeSet<MemberId> {
        self.members
            .values()
            .filter_map(|member| member.id.parse())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    pub fn parse(&self) -> Option<MemberId> {
        match self {
            Self::Number(id) => Some(*id),
            Self::Text(id) => id.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMember {
    pub name: Option<String>,
    pub id: RawId,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub local_score: u32,
    #[serde(default)]
    pub global_score: u32,
    #[serde(default)]
    pub last_star_ts: RawTimestamp,
    #[serde(default)]
    pub completion_day_level: BTreeMap<String, BTreeMap<String, RawStar>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStar {
    pub get_star_ts: RawTimestamp,
}

impl RawMember {
    /// Converts the API record into the stored shape with `deleted = false`.
    ///
    /// Only an unreadable id is an error. Unreadable timestamps fall back to
    /// epoch zero and unreadable day or star keys are dropped, both with a warning.
    pub fn normalize(&self) -> anyhow::Result<MemberState> {
        let Some(id) = self.id.parse() else {
            bail!("Member id {:?} is not a number", self.id.to_string());
        };

        let last_star = self.last_star_ts.to_datetime().unwrap_or_else(|| {
            warn!(
                "Member {id} has unreadable last_star_ts {:?}",
                self.last_star_ts
            );
            epoch_zero()
        });

        let mut completion = Completion::new();
        for (day, stars) in &self.completion_day_level {
            let Ok(day_number) = day.trim().parse::<u32>() else {
                warn!("Member {id} has unreadable completion day {day:?}");
                continue;
            };
            let day_entry = completion.entry(day_number).or_default();
            for (star, earned) in stars {
                let Ok(star_index) = star.trim().parse::<u8>() else {
                    warn!("Member {id} has unreadable star {star:?} on day {day}");
                    continue;
                };
                let earned_at = earned.get_star_ts.to_datetime().unwrap_or_else(|| {
                    warn!(
                        "Member {id} has unreadable get_star_ts {:?} for day {day} star {star}",
                        earned.get_star_ts
                    );
                    epoch_zero()
                });
                day_entry.insert(star_index, earned_at);
            }
        }

        Ok(MemberState {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("(anonymous user #{id})")),
            id,
            stars: self.stars,
            local_score: self.local_score,
            global_score: self.global_score,
            last_star,
            completion,
            deleted: false,
        })
    }
}
