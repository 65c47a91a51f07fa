//! A single RESP connection (SPEC_FULL.md §4.2): owns one TCP/TLS socket, drives the
//! handshake, and exposes `run`/`pipeline`/`transaction`/`subscribe` as the four ways to talk
//! to the server over it.

use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::commands::{self, Command};
use crate::error::{Error, Result};
use crate::protocol::resp;
use crate::tokio::pipeline::Pipeline;
use crate::tokio::stream::Stream;
use crate::tokio::subscription::Subscription;
use crate::tokio::transaction::Transaction;
use crate::value::Value;
use crate::Opts;

/// A connected, handshaken RESP connection.
pub struct Conn {
    stream: Stream,
    opts: Opts,
}

impl Conn {
    /// Connects to `opts.host:opts.port` and runs the handshake (HELLO/AUTH/SELECT/SETNAME).
    #[instrument(skip_all, fields(host = %opts.host, port = opts.port))]
    pub async fn new(opts: Opts) -> Result<Self> {
        let stream = Stream::connect(&opts).await?;
        let mut conn = Self { stream, opts };
        conn.handshake().await?;
        Ok(conn)
    }

    async fn handshake(&mut self) -> Result<()> {
        // Try RESP3 first. Servers that don't understand HELLO reply with an error, which we
        // swallow and fall back to the RESP2 AUTH/SELECT sequence.
        let hello_result = match (&self.opts.username, &self.opts.password) {
            (username, Some(password)) => {
                let user = username.clone().unwrap_or_else(|| "default".to_string());
                self.exchange(&commands::hello(3).arg("AUTH").arg(user).arg(password.clone()))
                    .await
            }
            (_, None) => self.exchange(&commands::hello(3)).await,
        };

        if hello_result.is_err() {
            if let Some(password) = self.opts.password.clone() {
                self.exchange(&commands::auth(self.opts.username.as_deref(), &password))
                    .await?;
            }
        }

        if self.opts.db != 0 {
            self.exchange(&commands::select(self.opts.db)).await?;
        }
        if let Some(name) = self.opts.client_name.clone() {
            self.exchange(&commands::client_setname(&name)).await?;
        }
        Ok(())
    }

    /// Encodes and writes `args`, then flushes. Used directly by [`Pipeline`] to batch several
    /// commands into one write.
    pub(crate) async fn write_encoded(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.writer.write_all(buf).await?;
        self.stream.writer.flush().await?;
        Ok(())
    }

    /// Reads and decodes the next reply frame. A top-level `Error` reply is returned as-is
    /// (not converted to `Err`) since pipeline/transaction callers need to see it in place.
    pub(crate) async fn read_reply(&mut self) -> Result<Value> {
        resp::decode(&mut self.stream.reader).await
    }

    /// Sends one command and reads its reply, converting a top-level error reply into `Err`.
    pub(crate) async fn exchange(&mut self, command: &Command) -> Result<Value> {
        let mut buf = Vec::new();
        resp::encode(command.args(), &mut buf);
        self.write_encoded(&buf).await?;
        match self.read_reply().await? {
            Value::Error(e) => Err(Error::Server(e)),
            other => Ok(other),
        }
    }

    /// Runs a single command, reconnecting once and retrying if the first attempt fails with a
    /// transport or protocol error (SPEC_FULL.md §4.2's reconnection policy).
    pub async fn run(&mut self, command: &Command) -> Result<Value> {
        match self.exchange(command).await {
            Err(Error::Io(_) | Error::Protocol(_)) => {
                self.reconnect().await?;
                self.exchange(command).await
            }
            other => other,
        }
    }

    /// Builds a `Conn` directly from an already-open `Stream`, skipping the handshake.
    /// Used by unit tests that drive a mock server over a duplex pipe and write canned replies
    /// by hand rather than speaking real HELLO/AUTH.
    #[cfg(test)]
    pub(crate) fn from_stream_for_test(stream: Stream, opts: Opts) -> Self {
        Self { stream, opts }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.stream = Stream::connect(&self.opts).await?;
        self.handshake().await
    }

    /// Starts a pipeline batch. Commands queued on it are written together and resolved in
    /// send order once [`Pipeline::execute`] drains the batch (SPEC_FULL.md §4.3).
    pub fn pipeline(&mut self) -> Pipeline<'_> {
        Pipeline::new(self)
    }

    /// Starts a `MULTI` transaction (SPEC_FULL.md §4.4).
    pub async fn transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::begin(self).await
    }

    /// Switches the connection into subscriber mode (SPEC_FULL.md §4.9). Consumes `self`
    /// because a subscribed connection can no longer run ordinary commands.
    pub async fn subscribe(mut self, channels: &[&str]) -> Result<Subscription> {
        let buf = {
            let mut buf = Vec::new();
            resp::encode(commands::subscribe(channels).args(), &mut buf);
            buf
        };
        self.write_encoded(&buf).await?;
        Ok(Subscription::new(self))
    }

    /// Switches the connection into subscriber mode via pattern subscriptions.
    pub async fn psubscribe(mut self, patterns: &[&str]) -> Result<Subscription> {
        let buf = {
            let mut buf = Vec::new();
            resp::encode(commands::psubscribe(patterns).args(), &mut buf);
            buf
        };
        self.write_encoded(&buf).await?;
        Ok(Subscription::new(self))
    }
}
