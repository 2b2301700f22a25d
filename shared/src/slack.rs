use std::fmt;

use anyhow::{bail, Context};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};

/// Payload for a Slack incoming webhook. `text` doubles as the notification
/// fallback when `blocks` are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Section { text: TextObject },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String, emoji: bool },
    #[serde(rename = "mrkdwn")]
    Markdown { text: String },
}

impl SlackMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: vec![],
        }
    }

    /// A header block followed by a single markdown section.
    pub fn with_header(header: impl Into<String>, body: impl Into<String>) -> Self {
        let header = header.into();
        Self {
            blocks: vec![
                Block::Header {
                    text: TextObject::Plain {
                        text: header.clone(),
                        emoji: true,
                    },
                },
                Block::Section {
                    text: TextObject::Markdown { text: body.into() },
                },
            ],
            text: header,
        }
    }
}

/// Escapes the characters Slack treats as control sequences in message text.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Clone, Debug)]
pub struct SlackWebhook {
    client: Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub async fn post(&self, message: &SlackMessage) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("Failed to call the Slack webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Slack webhook answered with HTTP {status}: {body}");
        }
        Ok(())
    }
}

/// Forwards warnings and errors to an operators' webhook.
///
/// Messages are queued and delivered by a background task so logging never
/// waits on the network.
#[derive(Clone)]
pub struct SlackAlertLayer {
    sender: mpsc::UnboundedSender<(String, Level)>,
}

async fn sender_task(mut reader: mpsc::UnboundedReceiver<(String, Level)>, webhook: SlackWebhook) {
    while let Some((message, level)) = reader.recv().await {
        let alert = SlackMessage::text(format!("*{}*: `{}`", level.as_str(), escape(&message)));
        // Reporting through tracing here would loop back into this layer
        if let Err(e) = webhook.post(&alert).await {
            eprintln!("Failed to send alert: {e:#}");
        }
    }
}

impl SlackAlertLayer {
    pub fn new(url: String) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(sender_task(receiver, SlackWebhook::new(url)));
        Self { sender }
    }

    pub fn alert(&self, message: &str, level: Level) {
        let _ = self.sender.send((message.to_string(), level));
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for SlackAlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if level > &Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.alert(&visitor.to_string(), *level);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl fmt::Display for MessageVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_message_has_no_blocks() {
        let value = serde_json::to_value(SlackMessage::text("hello")).unwrap();
        assert_eq!(value, json!({ "text": "hello" }));
    }

    #[test]
    fn header_message_renders_slack_blocks() {
        let value =
            serde_json::to_value(SlackMessage::with_header("Ranking", "*1.* Alice")).unwrap();
        assert_eq!(
            value,
            json!({
                "text": "Ranking",
                "blocks": [
                    {
                        "type": "header",
                        "text": { "type": "plain_text", "text": "Ranking", "emoji": true }
                    },
                    {
                        "type": "section",
                        "text": { "type": "mrkdwn", "text": "*1.* Alice" }
                    }
                ]
            })
        );
    }

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape("<b> & co"), "&lt;b&gt; &amp; co");
    }
}
