use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use shared::slack::SlackMessage;
use shared::{epoch_zero, Completion, LeaderboardResponse, MemberId, MemberState, ReportSnapshot};

use crate::api::{prometheus::PrometheusClient, LeaderboardApi, Notify};
use crate::jobs::Context;
use crate::store::{MemberPatch, MemberStore, ReportStore};

pub fn context(
    store: Arc<MemoryStore>,
    leaderboard: FixedLeaderboard,
    notifier: Arc<RecordingNotifier>,
) -> Context {
    Context {
        leaderboard: Arc::new(leaderboard),
        members: store.clone(),
        reports: store,
        slack: notifier,
        prometheus: Arc::new(PrometheusClient::default()),
    }
}

pub fn member(id: MemberId, name: &str, stars: u32) -> MemberState {
    MemberState {
        name: name.to_string(),
        id,
        stars,
        local_score: stars * 10,
        global_score: 0,
        last_star: epoch_zero(),
        completion: Completion::new(),
        deleted: false,
    }
}

/// Leaderboard record in the shape the API returns it.
pub fn raw_member(id: MemberId, name: &str, stars: u32) -> serde_json::Value {
    let mut days = serde_json::Map::new();
    for star in 0..stars {
        let day = (star / 2 + 1).to_string();
        let entry = days.entry(day).or_insert_with(|| json!({}));
        entry[((star % 2) + 1).to_string()] =
            json!({ "get_star_ts": (1_606_800_000 + star as u64 * 3600).to_string() });
    }

    let last_star_ts = match stars {
        0 => json!(0),
        n => json!((1_606_800_000 + (n as u64 - 1) * 3600).to_string()),
    };

    json!({
        "name": name,
        "id": id.to_string(),
        "stars": stars,
        "local_score": stars * 10,
        "global_score": 0,
        "last_star_ts": last_star_ts,
        "completion_day_level": days,
    })
}

pub fn response(members: Vec<serde_json::Value>) -> LeaderboardResponse {
    let members: serde_json::Map<String, serde_json::Value> = members
        .into_iter()
        .map(|member| {
            let key = match &member["id"] {
                serde_json::Value::String(id) => id.clone(),
                other => other.to_string(),
            };
            (key, member)
        })
        .collect();

    serde_json::from_value(json!({
        "owner_id": "1",
        "event": "2020",
        "members": members,
    }))
    .unwrap()
}

pub struct FixedLeaderboard(Option<LeaderboardResponse>);

impl FixedLeaderboard {
    pub fn new(response: LeaderboardResponse) -> Self {
        Self(Some(response))
    }

    pub fn failing() -> Self {
        Self(None)
    }
}

#[async_trait]
impl LeaderboardApi for FixedLeaderboard {
    async fn fetch(&self) -> anyhow::Result<LeaderboardResponse> {
        self.0
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Leaderboard API answered with HTTP 500"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SlackMessage>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<SlackMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|message| message.text)
            .collect()
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn send(&self, message: &SlackMessage) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("Slack webhook answered with HTTP 500");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// In-memory stand-in for the Postgres store with the same write semantics.
#[derive(Default)]
pub struct MemoryStore {
    members: Mutex<Vec<MemberState>>,
    reports: Mutex<Vec<ReportSnapshot>>,
    failing: Mutex<HashSet<MemberId>>,
    patches: Mutex<usize>,
}

impl MemoryStore {
    pub fn insert(&self, member: MemberState) {
        self.members.lock().unwrap().push(member);
    }

    pub fn member(&self, id: MemberId) -> Option<MemberState> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|member| member.id == id)
            .cloned()
    }

    pub fn members(&self) -> Vec<MemberState> {
        self.members.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<ReportSnapshot> {
        self.reports.lock().unwrap().clone()
    }

    /// Number of patches that were actually written.
    pub fn patches(&self) -> usize {
        *self.patches.lock().unwrap()
    }

    /// Every read or write of this member fails from now on.
    pub fn fail_on(&self, id: MemberId) {
        self.failing.lock().unwrap().insert(id);
    }

    fn check(&self, id: MemberId) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&id) {
            anyhow::bail!("Store is unavailable for member {id}");
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn get_member(&self, id: MemberId) -> anyhow::Result<Option<MemberState>> {
        self.check(id)?;
        Ok(self.member(id))
    }

    async fn create_member(&self, member: &MemberState) -> anyhow::Result<()> {
        self.check(member.id)?;
        let mut members = self.members.lock().unwrap();
        if !members.iter().any(|stored| stored.id == member.id) {
            members.push(member.clone());
        }
        Ok(())
    }

    async fn apply_patch(&self, patch: &MemberPatch) -> anyhow::Result<bool> {
        self.check(patch.id)?;
        let mut members = self.members.lock().unwrap();
        let Some(member) = members.iter_mut().find(|member| member.id == patch.id) else {
            anyhow::bail!("Member {} does not exist", patch.id);
        };
        if patch.stars().is_some_and(|stars| member.stars >= stars) {
            return Ok(false);
        }
        patch.apply(member)?;
        *self.patches.lock().unwrap() += 1;
        Ok(true)
    }

    async fn list_members(&self) -> anyhow::Result<Vec<MemberState>> {
        Ok(self.members())
    }

    async fn set_deleted(&self, id: MemberId, deleted: bool) -> anyhow::Result<()> {
        self.check(id)?;
        if let Some(member) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|member| member.id == id)
        {
            member.deleted = deleted;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn append_report(&self, report: &ReportSnapshot) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn latest_reports(&self, limit: u32) -> anyhow::Result<Vec<ReportSnapshot>> {
        let mut reports = self.reports();
        reports.sort_by(|a, b| b.time.cmp(&a.time));
        reports.truncate(limit as usize);
        Ok(reports)
    }
}
