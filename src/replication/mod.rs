//! Primary/replica routing (SPEC_FULL.md §4.7): parses `INFO REPLICATION`, builds a pool for
//! the primary plus one per connected replica, and routes each command to a replica (if it's
//! in the read-only registry) or the primary, refreshing topology on a background task and
//! swapping it in atomically via `arc-swap` — the same pattern valkey-glide's multiplexed
//! connection uses to swap in a new cluster slot map without blocking in-flight callers.

#[cfg(feature = "tokio")]
use std::sync::Arc;

#[cfg(feature = "tokio")]
use arc_swap::ArcSwap;
#[cfg(feature = "tokio")]
use tracing::warn;

#[cfg(feature = "tokio")]
use crate::commands::Command;
#[cfg(feature = "tokio")]
use crate::constant::is_read_only;
#[cfg(feature = "tokio")]
use crate::error::{Error, Result};
#[cfg(feature = "tokio")]
use crate::tokio::Pool;
#[cfg(feature = "tokio")]
use crate::value::FromValue;
#[cfg(feature = "tokio")]
use crate::Opts;

/// A deployment's replication role, as reported by `INFO REPLICATION`'s `role:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Master,
    Slave,
}

/// One `slaveN:...` line under a master's `INFO REPLICATION`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplicaInfo {
    pub ip: String,
    pub port: u16,
    pub state: String,
    pub offset: u64,
    pub lag: u64,
}

/// The parsed contents of an `INFO REPLICATION` reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplicationInfo {
    pub role: Role,
    pub connected_slaves: Vec<ReplicaInfo>,
    pub master_host: Option<String>,
    pub master_port: Option<u16>,
    pub master_link_status: Option<String>,
    pub master_last_io_seconds_ago: Option<u64>,
    pub master_sync_in_progress: bool,
}

/// Parses the text body of an `INFO REPLICATION` (or full `INFO`) reply. Unknown lines and
/// sections are ignored; this only looks at the handful of `replication` keys it needs.
pub fn parse_info_replication(text: &str) -> ReplicationInfo {
    let mut info = ReplicationInfo::default();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "role" => {
                info.role = match value {
                    "master" => Role::Master,
                    _ => Role::Slave,
                };
            }
            "master_host" => info.master_host = Some(value.to_string()),
            "master_port" => info.master_port = value.parse().ok(),
            "master_link_status" => info.master_link_status = Some(value.to_string()),
            "master_last_io_seconds_ago" => info.master_last_io_seconds_ago = value.parse().ok(),
            "master_sync_in_progress" => info.master_sync_in_progress = value != "0",
            _ if key.starts_with("slave") && key[5..].chars().all(|c| c.is_ascii_digit()) => {
                info.connected_slaves.push(parse_slave_line(value));
            }
            _ => {}
        }
    }
    info
}

/// Parses a `slaveN` value like `ip=127.0.0.1,port=6380,state=online,offset=421,lag=0`.
fn parse_slave_line(value: &str) -> ReplicaInfo {
    let mut replica = ReplicaInfo::default();
    for field in value.split(',') {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "ip" => replica.ip = value.to_string(),
            "port" => replica.port = value.parse().unwrap_or(0),
            "state" => replica.state = value.to_string(),
            "offset" => replica.offset = value.parse().unwrap_or(0),
            "lag" => replica.lag = value.parse().unwrap_or(0),
            _ => {}
        }
    }
    replica
}

#[cfg(feature = "tokio")]
struct Topology {
    primary: Arc<Pool>,
    replicas: Vec<Arc<Pool>>,
}

#[cfg(feature = "tokio")]
pub struct ReplicationClient {
    opts: Opts,
    topology: Arc<ArcSwap<Topology>>,
    next_replica: std::sync::atomic::AtomicUsize,
    refresh_task: Option<tokio::task::JoinHandle<()>>,
}

#[cfg(feature = "tokio")]
impl ReplicationClient {
    /// Connects to `opts`'s host, reads `INFO REPLICATION`, and follows it to the primary if
    /// the entrypoint turns out to be a replica (SPEC_FULL.md §4.7).
    pub async fn connect(opts: Opts) -> Result<Self> {
        let topology = Arc::new(ArcSwap::from_pointee(discover(&opts).await?));
        let refresh_task = spawn_refresh_task(opts.clone(), Arc::clone(&topology));
        Ok(Self {
            opts,
            topology,
            next_replica: std::sync::atomic::AtomicUsize::new(0),
            refresh_task,
        })
    }

    /// Runs `command` on a replica if it's registered read-only and at least one replica is
    /// known, otherwise on the primary.
    pub async fn run<T: FromValue>(&self, command: &Command) -> Result<T> {
        let topology = self.topology.load();
        let pool = if is_read_only(&command.name()) && !topology.replicas.is_empty() {
            let index = self
                .next_replica
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                % topology.replicas.len();
            &topology.replicas[index]
        } else {
            &topology.primary
        };
        let mut conn = pool.get().await?;
        T::from_value(conn.run(command).await?)
    }

    /// Forces `command` to the primary regardless of the read-only registry.
    pub async fn on_primary<T: FromValue>(&self, command: &Command) -> Result<T> {
        let topology = self.topology.load();
        let mut conn = topology.primary.get().await?;
        T::from_value(conn.run(command).await?)
    }

    /// Forces `command` to a replica, failing if none are known.
    pub async fn on_replica<T: FromValue>(&self, command: &Command) -> Result<T> {
        let topology = self.topology.load();
        if topology.replicas.is_empty() {
            return Err(Error::UnsupportedTopology(
                "no replicas are currently known".to_string(),
            ));
        }
        let index = self
            .next_replica
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            % topology.replicas.len();
        let mut conn = topology.replicas[index].get().await?;
        T::from_value(conn.run(command).await?)
    }
}

#[cfg(feature = "tokio")]
impl Drop for ReplicationClient {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

/// Connects to `opts`'s host and follows `master_host`/`master_port` until it lands on a node
/// reporting `role:master`, then builds the primary pool and one pool per connected replica.
/// A loop rather than recursion since `INFO REPLICATION` only ever points one hop up.
#[cfg(feature = "tokio")]
async fn discover(opts: &Opts) -> Result<Topology> {
    let mut current_opts = opts.clone();
    const MAX_HOPS: usize = 8;

    for _ in 0..MAX_HOPS {
        let primary_entry = Pool::connect(current_opts.clone()).await?;
        let info = fetch_info(&primary_entry).await?;

        if info.role != Role::Slave {
            let replicas = build_replica_pools(opts, &info).await;
            return Ok(Topology {
                primary: primary_entry,
                replicas,
            });
        }

        current_opts.host = info
            .master_host
            .ok_or_else(|| Error::UnsupportedTopology("replica has no master_host".to_string()))?;
        current_opts.port = info
            .master_port
            .ok_or_else(|| Error::UnsupportedTopology("replica has no master_port".to_string()))?;
    }

    Err(Error::UnsupportedTopology(
        "replication chain did not resolve to a master within the hop limit".to_string(),
    ))
}

#[cfg(feature = "tokio")]
async fn build_replica_pools(opts: &Opts, info: &ReplicationInfo) -> Vec<Arc<Pool>> {
    let mut replicas = Vec::with_capacity(info.connected_slaves.len());
    for slave in &info.connected_slaves {
        let mut replica_opts = opts.clone();
        replica_opts.host = slave.ip.clone();
        replica_opts.port = slave.port;
        match Pool::connect(replica_opts).await {
            Ok(pool) => replicas.push(pool),
            Err(err) => warn!(ip = %slave.ip, port = slave.port, %err, "skipping unreachable replica"),
        }
    }
    replicas
}

#[cfg(feature = "tokio")]
async fn fetch_info(pool: &Arc<Pool>) -> Result<ReplicationInfo> {
    let mut conn = pool.get().await?;
    let reply = conn.run(&crate::commands::info(Some("replication"))).await?;
    let text = String::from_value(reply)?;
    Ok(parse_info_replication(&text))
}

#[cfg(feature = "tokio")]
fn spawn_refresh_task(
    opts: Opts,
    topology: Arc<ArcSwap<Topology>>,
) -> Option<tokio::task::JoinHandle<()>> {
    if opts.topology_refresh_interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(opts.topology_refresh_interval);
        interval.tick().await; // the first tick fires immediately; the initial discover() already ran
        loop {
            interval.tick().await;
            match discover(&opts).await {
                Ok(fresh) => topology.store(Arc::new(fresh)),
                Err(err) => warn!(%err, "replication topology refresh failed, keeping old topology"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_master_info_with_two_replicas() {
        let text = "# Replication\r\nrole:master\r\nconnected_slaves:2\r\n\
            slave0:ip=10.0.0.2,port=6380,state=online,offset=421,lag=0\r\n\
            slave1:ip=10.0.0.3,port=6380,state=online,offset=421,lag=1\r\n\
            master_failover_state:no-failover\r\n";
        let info = parse_info_replication(text);
        assert_eq!(info.role, Role::Master);
        assert_eq!(info.connected_slaves.len(), 2);
        assert_eq!(info.connected_slaves[0].ip, "10.0.0.2");
        assert_eq!(info.connected_slaves[0].port, 6380);
        assert_eq!(info.connected_slaves[1].offset, 421);
        assert_eq!(info.connected_slaves[1].lag, 1);
    }

    #[test]
    fn parses_replica_info_pointing_at_its_master() {
        let text = "# Replication\r\nrole:slave\r\nmaster_host:10.0.0.1\r\n\
            master_port:6379\r\nmaster_link_status:up\r\n\
            master_last_io_seconds_ago:1\r\nmaster_sync_in_progress:0\r\n";
        let info = parse_info_replication(text);
        assert_eq!(info.role, Role::Slave);
        assert_eq!(info.master_host.as_deref(), Some("10.0.0.1"));
        assert_eq!(info.master_port, Some(6379));
        assert_eq!(info.master_link_status.as_deref(), Some("up"));
        assert_eq!(info.master_last_io_seconds_ago, Some(1));
        assert!(!info.master_sync_in_progress);
    }

    #[test]
    fn parses_the_master_block_replica_tuple_and_the_replica_blocks_sync_flag() {
        let master_text = "# Replication\r\nrole:master\r\nconnected_slaves:2\r\n\
            slave0:ip=10.76.3.39,port=6379,state=stable_sync,offset=421,lag=0\r\n\
            slave1:ip=10.76.3.40,port=6379,state=stable_sync,offset=421,lag=0\r\n";
        let master = parse_info_replication(master_text);
        assert_eq!(master.role, Role::Master);
        assert_eq!(master.connected_slaves.len(), 2);
        let replica = &master.connected_slaves[0];
        assert_eq!(replica.ip, "10.76.3.39");
        assert_eq!(replica.port, 6379);
        assert_eq!(replica.state, "stable_sync");
        assert_eq!(replica.lag, 0);

        let replica_text = "# Replication\r\nrole:slave\r\nmaster_host:10.76.2.33\r\n\
            master_port:9999\r\nmaster_link_status:up\r\n\
            master_sync_in_progress:0\r\n";
        let replica_info = parse_info_replication(replica_text);
        assert_eq!(replica_info.master_host.as_deref(), Some("10.76.2.33"));
        assert_eq!(replica_info.master_port, Some(9999));
        assert_eq!(replica_info.master_link_status.as_deref(), Some("up"));
        assert!(!replica_info.master_sync_in_progress);
    }
}
