//! Command pipelining (SPEC_FULL.md §4.3): queue commands on a connection, write them all at
//! once, then resolve a [`PipelineFuture`] per command in send order. Grounded on the
//! single-assignment future pattern in valkey-glide's `multiplexed_connection.rs` pipeline
//! path, adapted here to one connection instead of a multiplexed pool of in-flight requests.

use std::sync::{Arc, Mutex};

use crate::commands::Command;
use crate::error::{Error, Result};
use crate::protocol::resp;
use crate::value::{FromValue, Value};

use super::conn::Conn;

type Slot = Arc<Mutex<Option<Result<Value>>>>;

/// A queued pipeline entry. Assigned exactly once, by [`Pipeline::execute`]; reading it before
/// that returns [`Error::FutureNotResolved`].
pub struct PipelineFuture {
    slot: Slot,
}

impl PipelineFuture {
    /// Consumes the future, narrowing its resolved reply to `T`.
    pub fn get<T: FromValue>(self) -> Result<T> {
        let resolved = {
            let mut guard = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.take()
        };
        let value = resolved.ok_or(Error::FutureNotResolved)??;
        T::from_value(value)
    }
}

/// A batch of commands queued against one connection. Nothing is written until
/// [`Pipeline::execute`] runs.
pub struct Pipeline<'a> {
    conn: &'a mut Conn,
    commands: Vec<Command>,
    slots: Vec<Slot>,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(conn: &'a mut Conn) -> Self {
        Self {
            conn,
            commands: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Queues `command` and returns a handle that resolves once [`execute`](Self::execute) runs.
    pub fn queue(&mut self, command: Command) -> PipelineFuture {
        let slot: Slot = Arc::new(Mutex::new(None));
        self.commands.push(command);
        self.slots.push(slot.clone());
        PipelineFuture { slot }
    }

    /// Writes every queued command in one batch, then reads replies back in send order,
    /// resolving each future as it arrives. If decoding fails partway through, the error is
    /// reported as [`Error::PipelineResolution`] with the failing index; futures at and after
    /// that index are left unresolved.
    pub async fn execute(self) -> Result<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for command in &self.commands {
            resp::encode(command.args(), &mut buf);
        }
        self.conn.write_encoded(&buf).await?;

        for (index, slot) in self.slots.into_iter().enumerate() {
            let reply = self
                .conn
                .read_reply()
                .await
                .map_err(|source| Error::PipelineResolution {
                    index,
                    source: Box::new(source),
                })?;
            let result = match reply {
                Value::Error(e) => Err(e.into()),
                other => Ok(other),
            };
            *slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use tokio::io::{duplex, AsyncWriteExt as _};

    #[tokio::test]
    async fn futures_resolve_in_send_order_after_execute() {
        let (client_side, mut server_side) = duplex(4096);
        let opts = crate::Opts {
            host: "test".to_string(),
            ..Default::default()
        };
        let mut conn = super::super::test_support::conn_over(client_side, opts);

        server_side.write_all(b"+OK\r\n").await.unwrap();
        server_side.write_all(b":2\r\n").await.unwrap();
        server_side.write_all(b":1\r\n").await.unwrap();

        let mut pipe = conn.pipeline();
        let f1 = pipe.queue(commands::set("a", b"1"));
        let f2 = pipe.queue(commands::incr("counter"));
        let f3 = pipe.queue(commands::decr("counter"));
        pipe.execute().await.unwrap();

        assert_eq!(f1.get::<String>().unwrap(), "OK");
        assert_eq!(f2.get::<i64>().unwrap(), 2);
        assert_eq!(f3.get::<i64>().unwrap(), 1);
    }

    #[tokio::test]
    async fn unresolved_future_reports_not_resolved() {
        let (client_side, _server_side) = duplex(4096);
        let opts = crate::Opts {
            host: "test".to_string(),
            ..Default::default()
        };
        let mut conn = super::super::test_support::conn_over(client_side, opts);
        let mut pipe = conn.pipeline();
        let f1 = pipe.queue(commands::get("a"));
        // Never executed.
        assert!(matches!(f1.get::<String>(), Err(Error::FutureNotResolved)));
    }
}
