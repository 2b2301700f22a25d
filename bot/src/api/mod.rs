use async_trait::async_trait;
use shared::slack::{SlackMessage, SlackWebhook};
use shared::{advent::LeaderboardClient, LeaderboardResponse};

pub mod prometheus;

#[async_trait]
pub trait LeaderboardApi: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<LeaderboardResponse>;
}

#[async_trait]
impl LeaderboardApi for LeaderboardClient {
    async fn fetch(&self) -> anyhow::Result<LeaderboardResponse> {
        self.get_leaderboard().await
    }
}

/// Delivers a message to the members' channel. No retries.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, message: &SlackMessage) -> anyhow::Result<()>;
}

#[async_trait]
impl Notify for SlackWebhook {
    async fn send(&self, message: &SlackMessage) -> anyhow::Result<()> {
        self.post(message).await
    }
}
