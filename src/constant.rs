//! Process-wide constants: cluster node flags, slot-space size, and the
//! read-only command registry (SPEC_FULL.md §3, §9).

use std::collections::HashSet;
use std::sync::OnceLock;

/// Total number of hash slots in a cluster (0..=16383).
pub const TOTAL_SLOTS: u16 = 16384;

/// Default RESP port.
pub const DEFAULT_PORT: u16 = 6379;

bitflags::bitflags! {
    /// Flags reported for a node in a `CLUSTER NODES` line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u16 {
        const MASTER     = 0x0001;
        const REPLICA    = 0x0002;
        const PFAIL      = 0x0004;
        const FAIL       = 0x0008;
        const HANDSHAKE  = 0x0010;
        const NOADDR     = 0x0020;
        const NOFAILOVER = 0x0040;
        const MYSELF     = 0x0080;
    }
}

impl NodeFlags {
    /// Parse the comma-separated flag list from a `CLUSTER NODES` line, e.g. `"myself,master"`.
    pub fn parse(field: &str) -> Self {
        let mut flags = Self::empty();
        for token in field.split(',') {
            match token {
                "master" => flags |= Self::MASTER,
                "slave" | "replica" => flags |= Self::REPLICA,
                "fail?" => flags |= Self::PFAIL,
                "fail" => flags |= Self::FAIL,
                "handshake" => flags |= Self::HANDSHAKE,
                "noaddr" => flags |= Self::NOADDR,
                "nofailover" => flags |= Self::NOFAILOVER,
                "myself" => flags |= Self::MYSELF,
                _ => {}
            }
        }
        flags
    }
}

/// The process-wide registry of lowercased command tokens known safe to dispatch to
/// replicas. Frozen after startup; module façades may extend it at load time via
/// [`register_read_only`] before the first client is constructed.
static READ_ONLY_COMMANDS: OnceLock<std::sync::Mutex<HashSet<String>>> = OnceLock::new();

fn registry() -> &'static std::sync::Mutex<HashSet<String>> {
    READ_ONLY_COMMANDS.get_or_init(|| {
        std::sync::Mutex::new(
            DEFAULT_READ_ONLY_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        )
    })
}

const DEFAULT_READ_ONLY_COMMANDS: &[&str] = &[
    "get", "mget", "strlen", "getrange", "exists", "ttl", "pttl", "type", "keys", "scan",
    "randomkey", "dump", "touch", "lrange", "llen", "lindex", "lpos", "hget", "hmget", "hgetall",
    "hkeys", "hvals", "hlen", "hexists", "hstrlen", "hrandfield", "hscan", "smembers",
    "sismember", "smismember", "scard", "srandmember", "sinter", "sunion", "sdiff",
    "sintercard", "sscan", "zrange", "zrangebyscore", "zrangebylex", "zrevrange",
    "zrevrangebyscore", "zscore", "zmscore", "zcard", "zcount", "zrank", "zrevrank", "zscan",
    "xrange", "xrevrange", "xlen", "xread", "pfcount", "geopos", "geodist", "geohash",
    "georadius_ro", "georadiusbymember_ro", "bitcount", "bitpos", "getbit", "object", "memory",
    "ping", "echo", "dbsize", "info", "lastsave", "time", "lolwut",
];

/// Is `command` (already lowercased) safe to route to a replica?
pub fn is_read_only(command: &str) -> bool {
    registry()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .contains(command)
}

/// Register an additional read-only command token. Intended to be called once at startup by
/// a module façade before any client begins routing commands.
pub fn register_read_only(command: impl Into<String>) {
    registry()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(command.into().to_ascii_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_get_but_not_set() {
        assert!(is_read_only("get"));
        assert!(!is_read_only("set"));
    }

    #[test]
    fn register_read_only_extends_registry() {
        register_read_only("JSON.GET");
        assert!(is_read_only("json.get"));
    }

    #[test]
    fn node_flags_parse() {
        let flags = NodeFlags::parse("myself,master");
        assert!(flags.contains(NodeFlags::MYSELF));
        assert!(flags.contains(NodeFlags::MASTER));
        assert!(!flags.contains(NodeFlags::REPLICA));
    }
}
