mod conn;
mod pipeline;
mod pool;
mod stream;
mod subscription;
mod transaction;

pub use conn::Conn;
pub use pipeline::{Pipeline, PipelineFuture};
pub use pool::{Pool, PooledConn};
pub use stream::Stream;
pub use subscription::{Subscription, SubscriptionEvent, SubscriptionHandlers};
pub use transaction::Transaction;

#[cfg(test)]
pub(crate) mod test_support {
    use super::conn::Conn;
    use super::stream::Stream;
    use crate::Opts;

    /// Builds a `Conn` over an in-process duplex half, skipping the network handshake, so
    /// connection/pipeline/transaction/subscription tests can drive a hand-written mock server.
    pub(crate) fn conn_over(half: tokio::io::DuplexStream, opts: Opts) -> Conn {
        Conn::from_stream_for_test(Stream::test_duplex(half), opts)
    }
}
