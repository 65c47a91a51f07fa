//! The `MULTI`/`EXEC`/`DISCARD` state machine (SPEC_FULL.md §4.4). Grounded on fred's
//! `transaction.rs`, which drives the same three-state flow (queuing, committed, discarded)
//! but keeps `discard()` an explicit method rather than relying on `Drop` or an exception to
//! unwind a half-built transaction.

use crate::commands::{self, Command};
use crate::error::{Error, Result};
use crate::value::Value;

use super::conn::Conn;

/// A transaction in progress. Every [`queue`](Self::queue) call round-trips a `QUEUED` reply
/// before the caller moves on, so a malformed command surfaces immediately instead of only
/// being noticed when [`commit`](Self::commit) runs.
pub struct Transaction<'a> {
    conn: &'a mut Conn,
    queued: usize,
}

impl<'a> Transaction<'a> {
    pub(crate) async fn begin(conn: &'a mut Conn) -> Result<Self> {
        conn.exchange(&commands::multi()).await?;
        Ok(Self { conn, queued: 0 })
    }

    /// Queues `command`. Returns `Err` without affecting `self`'s state if the server rejects
    /// it outright (e.g. wrong arity) — the transaction is still open and can still be
    /// committed or discarded.
    pub async fn queue(&mut self, command: Command) -> Result<()> {
        match self.conn.exchange(&command).await? {
            Value::SimpleString(s) if s == "QUEUED" => {
                self.queued += 1;
                Ok(())
            }
            other => Err(Error::Protocol(format!(
                "expected +QUEUED after a queued command, got {other:?}"
            ))),
        }
    }

    /// How many commands have been successfully queued so far.
    pub fn queued_len(&self) -> usize {
        self.queued
    }

    /// Abandons the transaction. Non-exception control flow, per SPEC_FULL.md §9: the caller
    /// decides to discard and says so explicitly, instead of the core detecting a partial
    /// failure and unwinding on its own.
    pub async fn discard(self) -> Result<()> {
        self.conn.exchange(&commands::discard()).await?;
        Ok(())
    }

    /// Commits the transaction, returning one result per queued command in send order.
    ///
    /// A `Value::Error` for an individual command (e.g. `WRONGTYPE` on one queued command in
    /// an otherwise-successful batch) is reported as `Err` at that command's position, not as
    /// a failure of the whole commit.
    pub async fn commit(self) -> Result<Vec<Result<Value>>> {
        match self.conn.exchange(&commands::exec()).await? {
            Value::Array(items) => Ok(items
                .into_iter()
                .map(|item| match item {
                    Value::Error(e) => Err(e.into()),
                    other => Ok(other),
                })
                .collect()),
            Value::Null => Err(Error::Protocol(
                "EXEC returned nil: transaction aborted server-side".to_string(),
            )),
            other => Err(Error::TypeMismatch(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt as _};

    #[tokio::test]
    async fn commit_reports_per_command_results_including_a_mid_block_error() {
        let (client_side, mut server_side) = duplex(4096);
        let opts = crate::Opts {
            host: "test".to_string(),
            ..Default::default()
        };
        let mut conn = super::super::test_support::conn_over(client_side, opts);

        server_side.write_all(b"+OK\r\n").await.unwrap(); // MULTI
        server_side.write_all(b"+QUEUED\r\n").await.unwrap(); // SET
        server_side.write_all(b"+QUEUED\r\n").await.unwrap(); // LPUSH on a string key
        server_side
            .write_all(b"*2\r\n+OK\r\n-WRONGTYPE Operation against a wrong kind\r\n")
            .await
            .unwrap(); // EXEC

        let mut txn = conn.transaction().await.unwrap();
        txn.queue(commands::set("a", b"1")).await.unwrap();
        txn.queue(commands::lpush("a", &[b"x".as_slice()])).await.unwrap();
        let results = txn.commit().await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Server(_))));
    }

    #[tokio::test]
    async fn discard_sends_discard_and_returns_ok() {
        let (client_side, mut server_side) = duplex(4096);
        let opts = crate::Opts {
            host: "test".to_string(),
            ..Default::default()
        };
        let mut conn = super::super::test_support::conn_over(client_side, opts);

        server_side.write_all(b"+OK\r\n").await.unwrap(); // MULTI
        server_side.write_all(b"+QUEUED\r\n").await.unwrap(); // SET
        server_side.write_all(b"+OK\r\n").await.unwrap(); // DISCARD

        let mut txn = conn.transaction().await.unwrap();
        txn.queue(commands::set("a", b"1")).await.unwrap();
        txn.discard().await.unwrap();
    }
}
