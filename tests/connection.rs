//! End-to-end connection tests against an in-process mock server (SPEC_FULL.md §10.4).

mod common;

use zero_redis::tokio::Conn;
use zero_redis::value::FromValue;
use zero_redis::{commands, Value};

#[tokio::test]
async fn set_get_del_round_trip() {
    let opts = common::mock_server(vec![
        b"+OK\r\n",
        b"$3\r\nbar\r\n",
        b":1\r\n",
    ])
    .await;

    let mut conn = Conn::new(opts).await.expect("connect");

    let set_reply = conn.run(&commands::set("foo", b"bar")).await.expect("SET");
    assert_eq!(set_reply, Value::SimpleString("OK".to_string()));

    let value = conn.run(&commands::get("foo")).await.expect("GET");
    let get_reply = String::from_value(value).expect("narrow to String");
    assert_eq!(get_reply, "bar");

    let del_reply = conn.run(&commands::del(&["foo"])).await.expect("DEL");
    assert_eq!(del_reply, Value::Integer(1));
}

#[tokio::test]
async fn a_server_error_reply_surfaces_as_err() {
    let opts = common::mock_server(vec![b"-WRONGTYPE Operation against a wrong kind\r\n"]).await;
    let mut conn = Conn::new(opts).await.expect("connect");

    let err = conn.run(&commands::get("foo")).await.unwrap_err();
    assert!(matches!(err, zero_redis::error::Error::Server(_)));
}
