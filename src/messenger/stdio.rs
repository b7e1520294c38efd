//! JSON-lines transport
//!
//! One JSON object per line in each direction. Inbound:
//!
//! ```text
//! {"sender":"42","username":"alice","text":"/start"}
//! {"sender":"42","contact":{"user_id":"42","phone_number":"+1 555 0100"}}
//! {"sender":"42","button":"accept:deal_20240601120000_7"}
//! ```
//!
//! Outbound: `{"recipient":"42","text":"…","buttons":[{"label":"…","token":"…"}]}`.
//! Malformed inbound lines are logged and skipped.

use super::traits::*;
use crate::engine::model::{Affordance, ProfileHints, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct InboundLine {
    sender: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    contact: Option<ContactLine>,
    #[serde(default)]
    button: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactLine {
    #[serde(default)]
    user_id: Option<String>,
    phone_number: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    recipient: &'a UserId,
    text: &'a str,
    buttons: &'a [Affordance],
}

/// Parse one inbound line
pub fn parse_line(line: &str) -> MessengerResult<Update> {
    let inbound: InboundLine =
        serde_json::from_str(line).map_err(|e| MessengerError::InvalidPayload(e.to_string()))?;

    let payload = if let Some(contact) = inbound.contact {
        RawPayload::Contact {
            owner_id: contact.user_id.map(UserId),
            phone: contact.phone_number,
            first_name: contact.first_name,
            last_name: contact.last_name,
        }
    } else if let Some(token) = inbound.button {
        RawPayload::Button(token)
    } else if let Some(text) = inbound.text {
        RawPayload::Text(text)
    } else {
        return Err(MessengerError::InvalidPayload(
            "expected one of text, contact or button".to_string(),
        ));
    };

    Ok(Update {
        sender: UserId(inbound.sender),
        profile: ProfileHints {
            username: inbound.username,
            first_name: inbound.first_name,
            last_name: inbound.last_name,
        },
        payload,
    })
}

/// Messenger over any line reader and writer (stdin/stdout in production)
pub struct StdioMessenger<R, W> {
    lines: Mutex<Lines<R>>,
    writer: Mutex<W>,
}

impl StdioMessenger<BufReader<Stdin>, Stdout> {
    /// Messenger over the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> StdioMessenger<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: Mutex::new(reader.lines()),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<R, W> Messenger for StdioMessenger<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(
        &self,
        recipient: &UserId,
        text: &str,
        affordances: &[Affordance],
    ) -> MessengerResult<()> {
        let line = OutboundLine {
            recipient,
            text,
            buttons: affordances,
        };
        let mut bytes =
            serde_json::to_vec(&line).map_err(|e| MessengerError::InvalidPayload(e.to_string()))?;
        bytes.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| MessengerError::Network(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| MessengerError::Network(e.to_string()))
    }

    async fn receive(&self) -> MessengerResult<Option<Update>> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| MessengerError::Network(e.to_string()))?;
            let Some(line) = line else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Ok(update) => return Ok(Some(update)),
                Err(e) => warn!(error = %e, "skipping malformed inbound line"),
            }
        }
    }
}
