//! Push-mode subscriptions.
//!
//! After `SUBSCRIBE` the server stops answering requests and instead pushes
//! three-element frames on the connection:
//!
//! ```text
//! *3\r\n$7\r\nmessage\r\n$<n>\r\n<channel>\r\n$<m>\r\n<payload>\r\n
//! ```
//!
//! A [`Subscription`] owns that connection exclusively for its whole life.

use crate::connection::{Connection, ConnectionError};
use crate::error::{Error, Result};
use crate::protocol::RespValue;
use tracing::{debug, trace, warn};

/// One message delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    pub channel: String,
    pub payload: String,
}

impl PubSubMessage {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Decodes a pushed frame. Returns `None` for anything that is not a
    /// `message` frame (confirmations, pongs).
    pub fn from_frame(frame: RespValue) -> Option<Self> {
        let mut items = frame.into_array()?.into_iter();
        let kind = items.next()?.into_string()?;
        if !kind.eq_ignore_ascii_case("message") {
            return None;
        }
        let channel = items.next()?.into_string()?;
        let payload = items.next()?.into_string()?;
        Some(Self { channel, payload })
    }
}

/// A connection in push mode.
pub struct Subscription {
    conn: Connection,
    channels: Vec<String>,
    ended: bool,
}

impl Subscription {
    /// Sends `SUBSCRIBE` on `conn` and waits for one confirmation per channel.
    pub(crate) async fn open(mut conn: Connection, channels: &[String]) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one channel is required".to_string(),
            ));
        }

        let command = RespValue::command(
            std::iter::once("SUBSCRIBE").chain(channels.iter().map(String::as_str)),
        );
        let mut reply = conn.request(&command).await?;

        for (index, channel) in channels.iter().enumerate() {
            if index > 0 {
                reply = conn.read_reply().await?;
            }
            match &reply {
                RespValue::Error(message) => return Err(Error::Server(message.clone())),
                RespValue::Array(items)
                    if items.len() == 3
                        && items[0]
                            .as_str()
                            .is_some_and(|k| k.eq_ignore_ascii_case("subscribe")) =>
                {
                    trace!(channel = %channel, "Subscription confirmed");
                }
                other => {
                    return Err(Error::UnexpectedReply {
                        command: "SUBSCRIBE",
                        reply: other.to_string(),
                    })
                }
            }
        }

        Ok(Self {
            conn,
            channels: channels.to_vec(),
            ended: false,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the connection is lost; the subscription does not
    /// reconnect, and every later call also returns `None`.
    pub async fn next_message(&mut self) -> Option<PubSubMessage> {
        while !self.ended {
            match self.conn.read_frame().await {
                Ok(frame) => match PubSubMessage::from_frame(frame) {
                    Some(message) => return Some(message),
                    None => trace!("Ignoring non-message frame"),
                },
                Err(ConnectionError::ServerClosed) => {
                    debug!(server = %self.conn.addr(), "Subscription closed by server");
                    self.ended = true;
                }
                Err(e) => {
                    warn!(server = %self.conn.addr(), error = %e, "Subscription connection failed");
                    self.ended = true;
                }
            }
        }
        None
    }
}
