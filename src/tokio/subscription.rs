//! Pub/Sub subscriber mode (SPEC_FULL.md §4.9). A connection that has issued `SUBSCRIBE` or
//! `PSUBSCRIBE` only ever receives subscription confirmations and published messages until it
//! unsubscribes from everything; this type models that restricted dispatch loop instead of
//! letting callers run arbitrary commands against a subscribed connection.

use crate::commands;
use crate::error::{Error, Result};
use crate::value::{FromValue, Value};

use super::conn::Conn;

/// One frame read from a subscribed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Subscribed { channel: String, count: i64 },
    PSubscribed { pattern: String, count: i64 },
    Unsubscribed { channel: String, count: i64 },
    PUnsubscribed { pattern: String, count: i64 },
    Message { channel: String, payload: Vec<u8> },
    PMessage { pattern: String, channel: String, payload: Vec<u8> },
}

/// A connection in subscriber mode.
pub struct Subscription {
    conn: Conn,
}

impl Subscription {
    pub(crate) fn new(conn: Conn) -> Self {
        Self { conn }
    }

    /// Reads and classifies the next frame.
    pub async fn next_event(&mut self) -> Result<SubscriptionEvent> {
        let value = self.conn.read_reply().await?;
        parse_event(value)
    }

    pub async fn subscribe(&mut self, channels: &[&str]) -> Result<()> {
        let mut buf = Vec::new();
        crate::protocol::resp::encode(commands::subscribe(channels).args(), &mut buf);
        self.conn.write_encoded(&buf).await
    }

    pub async fn psubscribe(&mut self, patterns: &[&str]) -> Result<()> {
        let mut buf = Vec::new();
        crate::protocol::resp::encode(commands::psubscribe(patterns).args(), &mut buf);
        self.conn.write_encoded(&buf).await
    }

    pub async fn unsubscribe(&mut self, channels: &[&str]) -> Result<()> {
        let mut buf = Vec::new();
        crate::protocol::resp::encode(commands::unsubscribe(channels).args(), &mut buf);
        self.conn.write_encoded(&buf).await
    }

    pub async fn punsubscribe(&mut self, patterns: &[&str]) -> Result<()> {
        let mut buf = Vec::new();
        crate::protocol::resp::encode(commands::punsubscribe(patterns).args(), &mut buf);
        self.conn.write_encoded(&buf).await
    }

    /// Runs the dispatch loop, invoking the matching callback for each frame, until `should_stop`
    /// returns `true` or the connection reports it has unsubscribed from everything (count 0).
    pub async fn run(&mut self, mut handlers: SubscriptionHandlers<'_>) -> Result<()> {
        loop {
            let event = self.next_event().await?;
            let remaining = match &event {
                SubscriptionEvent::Subscribed { channel, count } => {
                    if let Some(cb) = handlers.on_subscribe.as_mut() {
                        cb(channel, *count);
                    }
                    *count
                }
                SubscriptionEvent::PSubscribed { pattern, count } => {
                    if let Some(cb) = handlers.on_psubscribe.as_mut() {
                        cb(pattern, *count);
                    }
                    *count
                }
                SubscriptionEvent::Unsubscribed { channel, count } => {
                    if let Some(cb) = handlers.on_unsubscribe.as_mut() {
                        cb(channel, *count);
                    }
                    *count
                }
                SubscriptionEvent::PUnsubscribed { pattern, count } => {
                    if let Some(cb) = handlers.on_punsubscribe.as_mut() {
                        cb(pattern, *count);
                    }
                    *count
                }
                SubscriptionEvent::Message { channel, payload } => {
                    if let Some(cb) = handlers.on_message.as_mut() {
                        cb(channel, payload);
                    }
                    1
                }
                SubscriptionEvent::PMessage {
                    pattern,
                    channel,
                    payload,
                } => {
                    if let Some(cb) = handlers.on_pmessage.as_mut() {
                        cb(pattern, channel, payload);
                    }
                    1
                }
            };
            if remaining == 0 {
                return Ok(());
            }
        }
    }
}

/// Callbacks for [`Subscription::run`]'s dispatch loop. Any handler left `None` silently drops
/// that event kind.
#[derive(Default)]
pub struct SubscriptionHandlers<'a> {
    pub on_subscribe: Option<Box<dyn FnMut(&str, i64) + Send + 'a>>,
    pub on_psubscribe: Option<Box<dyn FnMut(&str, i64) + Send + 'a>>,
    pub on_unsubscribe: Option<Box<dyn FnMut(&str, i64) + Send + 'a>>,
    pub on_punsubscribe: Option<Box<dyn FnMut(&str, i64) + Send + 'a>>,
    pub on_message: Option<Box<dyn FnMut(&str, &[u8]) + Send + 'a>>,
    pub on_pmessage: Option<Box<dyn FnMut(&str, &str, &[u8]) + Send + 'a>>,
}

fn parse_event(value: Value) -> Result<SubscriptionEvent> {
    let Value::Array(items) = value.strip_attribute() else {
        return Err(Error::Protocol(format!(
            "expected an array frame in subscriber mode, got {value:?}"
        )));
    };
    let mut it = items.into_iter();
    let kind = String::from_value(it.next().ok_or_else(missing)?)?;
    match kind.as_str() {
        "subscribe" => Ok(SubscriptionEvent::Subscribed {
            channel: String::from_value(it.next().ok_or_else(missing)?)?,
            count: i64::from_value(it.next().ok_or_else(missing)?)?,
        }),
        "psubscribe" => Ok(SubscriptionEvent::PSubscribed {
            pattern: String::from_value(it.next().ok_or_else(missing)?)?,
            count: i64::from_value(it.next().ok_or_else(missing)?)?,
        }),
        "unsubscribe" => Ok(SubscriptionEvent::Unsubscribed {
            channel: String::from_value(it.next().ok_or_else(missing)?)?,
            count: i64::from_value(it.next().ok_or_else(missing)?)?,
        }),
        "punsubscribe" => Ok(SubscriptionEvent::PUnsubscribed {
            pattern: String::from_value(it.next().ok_or_else(missing)?)?,
            count: i64::from_value(it.next().ok_or_else(missing)?)?,
        }),
        "message" => Ok(SubscriptionEvent::Message {
            channel: String::from_value(it.next().ok_or_else(missing)?)?,
            payload: Vec::from_value(it.next().ok_or_else(missing)?)?,
        }),
        "pmessage" => Ok(SubscriptionEvent::PMessage {
            pattern: String::from_value(it.next().ok_or_else(missing)?)?,
            channel: String::from_value(it.next().ok_or_else(missing)?)?,
            payload: Vec::from_value(it.next().ok_or_else(missing)?)?,
        }),
        other => Err(Error::Protocol(format!("unknown subscriber frame kind {other:?}"))),
    }
}

fn missing() -> Error {
    Error::Protocol("truncated subscriber frame".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt as _};

    #[tokio::test]
    async fn dispatches_subscribe_ack_then_message_then_zero_count_unsubscribe() {
        let (client_side, mut server_side) = duplex(4096);
        let opts = crate::Opts {
            host: "test".to_string(),
            ..Default::default()
        };
        let conn = super::super::test_support::conn_over(client_side, opts);
        let mut sub = Subscription::new(conn);

        server_side
            .write_all(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nchan\r\n:1\r\n")
            .await
            .unwrap();
        server_side
            .write_all(b"*3\r\n$7\r\nmessage\r\n$4\r\nchan\r\n$5\r\nhello\r\n")
            .await
            .unwrap();
        server_side
            .write_all(b"*3\r\n$11\r\nunsubscribe\r\n$4\r\nchan\r\n:0\r\n")
            .await
            .unwrap();

        let mut messages = Vec::new();
        let mut subscribed = 0;
        sub.run(SubscriptionHandlers {
            on_subscribe: Some(Box::new(|_channel, count| subscribed = count)),
            on_message: Some(Box::new(|channel, payload| {
                messages.push((channel.to_string(), payload.to_vec()));
            })),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(subscribed, 1);
        assert_eq!(messages, vec![("chan".to_string(), b"hello".to_vec())]);
    }
}
