use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::{header, Client};
use tracing::{error, instrument};

use crate::LeaderboardResponse;

#[derive(Clone, Debug)]
pub struct LeaderboardClient {
    client: Client,
    url: String,
    cookie: String,
}

pub fn leaderboard_url(year: u32, team: &str) -> String {
    format!("https://adventofcode.com/{year}/leaderboard/private/view/{team}.json")
}

/// Accepts either the bare session token or a full `session=...` cookie.
fn session_cookie(cookie: &str) -> String {
    if cookie.contains('=') {
        cookie.to_string()
    } else {
        format!("session={cookie}")
    }
}

impl LeaderboardClient {
    pub fn new(year: u32, team: &str, cookie: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: leaderboard_url(year, team),
            cookie: session_cookie(cookie),
        })
    }

    #[instrument(skip(self), fields(url = self.url))]
    pub async fn get_leaderboard(&self) -> anyhow::Result<LeaderboardResponse> {
        let response = self
            .client
            .get(&self.url)
            .header(header::COOKIE, &self.cookie)
            .send()
            .await
            .context("Failed to call the leaderboard API")?;

        let status = response.status();
        if !status.is_success() {
            error!("Leaderboard API answered with HTTP {status}");
            bail!("Leaderboard API answered with HTTP {status}");
        }

        response
            .json::<LeaderboardResponse>()
            .await
            .context("Failed to parse the leaderboard response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_built_from_year_and_team() {
        assert_eq!(
            leaderboard_url(2020, "123456"),
            "https://adventofcode.com/2020/leaderboard/private/view/123456.json"
        );
    }

    #[test]
    fn bare_token_becomes_session_cookie() {
        assert_eq!(session_cookie("abc"), "session=abc");
        assert_eq!(session_cookie("session=abc"), "session=abc");
    }
}
