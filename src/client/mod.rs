//! The pool-fronted client (SPEC_FULL.md §4.6): the ordinary front door for talking to a
//! single non-cluster, non-replicated deployment. Checks a connection out of a [`Pool`] for
//! each call and returns it when done; `pipeline`/`transaction`/`subscribe` forward straight to
//! the checked-out [`Conn`] since [`PooledConn`] derefs to it.

use crate::commands::Command;
use crate::error::Result;
use crate::tokio::{Pool, PooledConn};
use crate::value::{FromValue, Value};
use crate::Opts;
use std::sync::Arc;

pub struct Client {
    pool: Arc<Pool>,
}

impl Client {
    pub async fn connect(opts: Opts) -> Result<Self> {
        Ok(Self {
            pool: Pool::connect(opts).await?,
        })
    }

    /// Checks a connection out of the pool. Callers drive `pipeline()`/`transaction()`/
    /// `subscribe()` on it directly; it returns to the pool when dropped.
    pub async fn checkout(&self) -> Result<PooledConn> {
        self.pool.get().await
    }

    /// Runs one command against a pooled connection and narrows its reply to `T`.
    pub async fn run<T: FromValue>(&self, command: &Command) -> Result<T> {
        let mut conn = self.checkout().await?;
        T::from_value(conn.run(command).await?)
    }

    /// Iterates a `SCAN` cursor to completion, holding one connection for the iterator's
    /// lifetime (SPEC_FULL.md §4.6). `pattern`/`count` are passed through to each `SCAN` call.
    pub async fn scan_each(&self, pattern: Option<&str>, count: Option<usize>) -> Result<ScanEach> {
        Ok(ScanEach {
            conn: self.checkout().await?,
            pattern: pattern.map(ToString::to_string),
            count,
            cursor: 0,
            done: false,
        })
    }
}

/// A `SCAN` cursor walk over one pooled connection. Call [`next_batch`](Self::next_batch)
/// until it returns `None`.
pub struct ScanEach {
    conn: PooledConn,
    pattern: Option<String>,
    count: Option<usize>,
    cursor: u64,
    done: bool,
}

impl ScanEach {
    /// The next batch of keys, or `None` once the server reports cursor `0`.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let command = crate::commands::scan(self.cursor, self.pattern.as_deref(), self.count);
        let reply = self.conn.run(&command).await?;
        let (next_cursor, keys): (u64, Vec<String>) = parse_scan_reply(reply)?;
        self.cursor = next_cursor;
        if next_cursor == 0 {
            self.done = true;
        }
        Ok(Some(keys))
    }
}

fn parse_scan_reply(value: Value) -> Result<(u64, Vec<String>)> {
    let mut items = match value.strip_attribute() {
        Value::Array(items) => items,
        other => return Err(crate::error::Error::TypeMismatch(other)),
    };
    let keys = items.pop().map(Vec::from_value).transpose()?.unwrap_or_default();
    let cursor_str = items.pop().map(String::from_value).transpose()?.unwrap_or_default();
    let cursor = cursor_str.parse().unwrap_or(0);
    Ok((cursor, keys))
}
