//! The command builder (SPEC_FULL.md §3, §4.6) and a set of typed constructors for the
//! commands exercised elsewhere in this crate and in its tests. `Command` is deliberately
//! generic: it just accumulates the byte-string argument vector the codec encodes, the same
//! shape `redis-rs`'s `Cmd` and `fred`'s command layer both converge on.

use crate::value::ToArgs;

/// An ordered byte-string argument vector, ready for [`crate::protocol::resp::encode`].
/// Built with `.arg()` chaining; the first argument is the command name.
#[derive(Debug, Clone, Default)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            args: vec![name.as_bytes().to_vec()],
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl ToArgs) -> Self {
        arg.write_args(&mut self.args);
        self
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// The command name, lowercased, e.g. `"get"`. Used for read-only routing decisions.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).to_ascii_lowercase()
    }

    /// The first non-name argument, treated as the routable key by cluster/replication
    /// routing (SPEC_FULL.md §4.7, §4.8). `None` for commands with no key argument.
    pub fn key(&self) -> Option<&[u8]> {
        self.args.get(1).map(Vec::as_slice)
    }
}

/// Starts building a [`Command`] with the given name.
pub fn cmd(name: &str) -> Command {
    Command::new(name)
}

// -- connection / handshake -------------------------------------------------

pub fn ping() -> Command {
    cmd("PING")
}

pub fn hello(protover: i64) -> Command {
    cmd("HELLO").arg(protover)
}

pub fn auth(username: Option<&str>, password: &str) -> Command {
    match username {
        Some(user) => cmd("AUTH").arg(user).arg(password),
        None => cmd("AUTH").arg(password),
    }
}

pub fn select(db: u64) -> Command {
    cmd("SELECT").arg(db)
}

pub fn client_setname(name: &str) -> Command {
    cmd("CLIENT").arg("SETNAME").arg(name)
}

pub fn client_id() -> Command {
    cmd("CLIENT").arg("ID")
}

// -- generic / strings -------------------------------------------------------

pub fn get(key: &str) -> Command {
    cmd("GET").arg(key)
}

pub fn set(key: &str, value: &[u8]) -> Command {
    cmd("SET").arg(key).arg(value)
}

pub fn del(keys: &[&str]) -> Command {
    cmd("DEL").arg(keys)
}

pub fn exists(keys: &[&str]) -> Command {
    cmd("EXISTS").arg(keys)
}

pub fn expire(key: &str, seconds: i64) -> Command {
    cmd("EXPIRE").arg(key).arg(seconds)
}

pub fn ttl(key: &str) -> Command {
    cmd("TTL").arg(key)
}

pub fn incr(key: &str) -> Command {
    cmd("INCR").arg(key)
}

pub fn decr(key: &str) -> Command {
    cmd("DECR").arg(key)
}

pub fn keys(pattern: &str) -> Command {
    cmd("KEYS").arg(pattern)
}

pub fn scan(cursor: u64, pattern: Option<&str>, count: Option<usize>) -> Command {
    let mut c = cmd("SCAN").arg(cursor);
    if let Some(pattern) = pattern {
        c = c.arg("MATCH").arg(pattern);
    }
    if let Some(count) = count {
        c = c.arg("COUNT").arg(count);
    }
    c
}

pub fn flushdb() -> Command {
    cmd("FLUSHDB")
}

// -- lists --------------------------------------------------------------------

pub fn lpush(key: &str, values: &[&[u8]]) -> Command {
    cmd("LPUSH").arg(key).arg(values)
}

pub fn rpush(key: &str, values: &[&[u8]]) -> Command {
    cmd("RPUSH").arg(key).arg(values)
}

pub fn lrange(key: &str, start: i64, stop: i64) -> Command {
    cmd("LRANGE").arg(key).arg(start).arg(stop)
}

pub fn brpop(keys: &[&str], timeout_secs: f64) -> Command {
    cmd("BRPOP").arg(keys).arg(timeout_secs)
}

// -- hashes ---------------------------------------------------------------------

pub fn hset(key: &str, field: &str, value: &[u8]) -> Command {
    cmd("HSET").arg(key).arg(field).arg(value)
}

pub fn hget(key: &str, field: &str) -> Command {
    cmd("HGET").arg(key).arg(field)
}

// -- sets -----------------------------------------------------------------------

pub fn sadd(key: &str, members: &[&[u8]]) -> Command {
    cmd("SADD").arg(key).arg(members)
}

// -- streams --------------------------------------------------------------------

/// `XADD key ID field value [field value ...]`. `id` is usually `"*"` for auto-generation.
pub fn xadd(key: &str, id: &str, fields: &[(&str, &[u8])]) -> Command {
    let mut c = cmd("XADD").arg(key).arg(id);
    for (field, value) in fields {
        c = c.arg(*field).arg(*value);
    }
    c
}

// -- transactions -----------------------------------------------------------------

pub fn multi() -> Command {
    cmd("MULTI")
}

pub fn exec() -> Command {
    cmd("EXEC")
}

pub fn discard() -> Command {
    cmd("DISCARD")
}

// -- pub/sub ------------------------------------------------------------------------

pub fn subscribe(channels: &[&str]) -> Command {
    cmd("SUBSCRIBE").arg(channels)
}

pub fn psubscribe(patterns: &[&str]) -> Command {
    cmd("PSUBSCRIBE").arg(patterns)
}

pub fn unsubscribe(channels: &[&str]) -> Command {
    cmd("UNSUBSCRIBE").arg(channels)
}

pub fn punsubscribe(patterns: &[&str]) -> Command {
    cmd("PUNSUBSCRIBE").arg(patterns)
}

// -- server / cluster / replication introspection --------------------------------------

pub fn info(section: Option<&str>) -> Command {
    match section {
        Some(section) => cmd("INFO").arg(section),
        None => cmd("INFO"),
    }
}

pub fn cluster_nodes() -> Command {
    cmd("CLUSTER").arg("NODES")
}
