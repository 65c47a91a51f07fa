//! Shared mock-server harness for the integration suite. Binds a loopback `TcpListener`,
//! accepts exactly one connection, answers the handshake's `HELLO` with `+OK\r\n`, then writes
//! each entry of `replies` back to back. A separate task drains and discards whatever the
//! client writes, so pushed frames (pub/sub messages, unsubscribe acks) that have no
//! corresponding request still flow without the writer blocking on a read that will never
//! happen. Nothing here talks to a real Redis/Valkey server — SPEC_FULL.md §10.4 calls for a
//! suite that's confident and runnable without a network dependency, so this stands in for one.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use zero_redis::Opts;

/// Spawns a mock server that answers the handshake, then writes each of `replies` in order.
/// Returns `Opts` already pointed at the listener.
pub async fn mock_server(replies: Vec<&'static [u8]>) -> Opts {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock listener local addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept mock connection");
        let (mut read_half, mut write_half) = tokio::io::split(stream);

        tokio::spawn(async move {
            let mut sink = [0u8; 4096];
            while read_half.read(&mut sink).await.unwrap_or(0) > 0 {}
        });

        write_half.write_all(b"+OK\r\n").await.expect("write HELLO reply"); // HELLO
        write_half.flush().await.expect("flush HELLO reply");

        for reply in replies {
            write_half.write_all(reply).await.expect("write scripted reply");
            write_half.flush().await.expect("flush scripted reply");
        }
    });

    Opts {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..Default::default()
    }
}
