//! Transaction end-to-end tests (SPEC_FULL.md §4.4, §10.4): commit with a mid-block error,
//! and an explicit discard.

mod common;

use zero_redis::error::Error;
use zero_redis::tokio::Conn;
use zero_redis::{commands, Value};

#[tokio::test]
async fn commit_reports_a_mid_block_error_without_failing_the_whole_commit() {
    let opts = common::mock_server(vec![
        b"+OK\r\n",                                          // MULTI
        b"+QUEUED\r\n",                                      // queue SET
        b"+QUEUED\r\n",                                      // queue INCR (wrong type on the server)
        b"*2\r\n+OK\r\n-WRONGTYPE Operation against a wrong kind\r\n", // EXEC
    ])
    .await;

    let mut conn = Conn::new(opts).await.expect("connect");
    let mut tx = conn.transaction().await.expect("MULTI");
    tx.queue(commands::set("a", b"1")).await.expect("queue SET");
    tx.queue(commands::incr("a")).await.expect("queue INCR");
    let results = tx.commit().await.expect("EXEC");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap(), &Value::SimpleString("OK".to_string()));
    assert!(matches!(results[1], Err(Error::Server(_))));
}

#[tokio::test]
async fn discard_sends_discard_and_leaves_the_connection_usable() {
    let opts = common::mock_server(vec![
        b"+OK\r\n",      // MULTI
        b"+QUEUED\r\n",  // queue SET
        b"+OK\r\n",      // DISCARD
        b"$3\r\nbar\r\n", // GET, after the transaction is gone
    ])
    .await;

    let mut conn = Conn::new(opts).await.expect("connect");
    let mut tx = conn.transaction().await.expect("MULTI");
    tx.queue(commands::set("a", b"1")).await.expect("queue SET");
    tx.discard().await.expect("DISCARD");

    let reply = conn.run(&commands::get("foo")).await.expect("GET after discard");
    assert_eq!(reply, Value::BulkString(b"bar".to_vec()));
}
