//! Cluster routing (SPEC_FULL.md §4.8): parses `CLUSTER NODES`, builds one pool per shard
//! master (plus its replicas), and routes each command by hashing its key to a slot. A
//! `MOVED`/`ASK`/`CROSSSLOT` reply is surfaced to the caller as-is rather than auto-followed —
//! see the open question recorded in SPEC_FULL.md §9 and DESIGN.md.

pub mod slot;

#[cfg(feature = "tokio")]
use std::sync::Arc;

#[cfg(feature = "tokio")]
use arc_swap::ArcSwap;
#[cfg(feature = "tokio")]
use tracing::warn;

#[cfg(feature = "tokio")]
use crate::commands::Command;
#[cfg(feature = "tokio")]
use crate::constant::{is_read_only, NodeFlags, TOTAL_SLOTS};
#[cfg(feature = "tokio")]
use crate::error::{Error, Result};
#[cfg(feature = "tokio")]
use crate::tokio::Pool;
#[cfg(feature = "tokio")]
use crate::value::FromValue;
#[cfg(feature = "tokio")]
use crate::Opts;

#[cfg(not(feature = "tokio"))]
use crate::constant::NodeFlags;

/// One line of a `CLUSTER NODES` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub id: String,
    pub ip: String,
    pub port: u16,
    pub flags: NodeFlags,
    /// `None` for a master; the master's id for a replica.
    pub master_id: Option<String>,
    /// Inclusive slot ranges owned by this node. Empty for replicas.
    pub slots: Vec<(u16, u16)>,
}

/// Parses a `CLUSTER NODES` reply body into one [`ClusterNode`] per line. Lines this crate
/// can't make sense of (malformed address, missing fields) are skipped rather than failing the
/// whole parse, since a handshaking or failed node can show up with `noaddr`/`?` surrounded
/// fields.
pub fn parse_cluster_nodes(text: &str) -> Vec<ClusterNode> {
    text.lines().filter_map(parse_node_line).collect()
}

fn parse_node_line(line: &str) -> Option<ClusterNode> {
    let mut fields = line.split_whitespace();
    let id = fields.next()?.to_string();
    let addr = fields.next()?;
    let (hostport, _cluster_bus_port) = addr.split_once('@').unwrap_or((addr, ""));
    let (ip, port_str) = hostport.rsplit_once(':')?;
    let port = port_str.parse().ok()?;
    let flags = NodeFlags::parse(fields.next()?);
    let master_id = match fields.next()? {
        "-" => None,
        other => Some(other.to_string()),
    };
    let _ping_sent = fields.next()?;
    let _pong_recv = fields.next()?;
    let _config_epoch = fields.next()?;
    let _link_state = fields.next()?;
    let slots = fields.filter(|t| !t.starts_with('[')).filter_map(parse_slot_range).collect();

    Some(ClusterNode {
        id,
        ip: ip.to_string(),
        port,
        flags,
        master_id,
        slots,
    })
}

fn parse_slot_range(token: &str) -> Option<(u16, u16)> {
    match token.split_once('-') {
        Some((start, end)) => Some((start.parse().ok()?, end.parse().ok()?)),
        None => {
            let single = token.parse().ok()?;
            Some((single, single))
        }
    }
}

#[cfg(feature = "tokio")]
struct Shard {
    master: Arc<Pool>,
    replicas: Vec<Arc<Pool>>,
}

#[cfg(feature = "tokio")]
struct ClusterTopology {
    shards: Vec<Shard>,
    /// Index into `shards`, one entry per hash slot; `None` for an unassigned slot.
    slot_to_shard: Vec<Option<usize>>,
}

#[cfg(feature = "tokio")]
pub struct ClusterClient {
    opts: Opts,
    topology: Arc<ArcSwap<ClusterTopology>>,
    next_replica: std::sync::atomic::AtomicUsize,
    refresh_task: Option<tokio::task::JoinHandle<()>>,
}

#[cfg(feature = "tokio")]
impl ClusterClient {
    /// Connects to `opts`'s host, runs `CLUSTER NODES`, and builds one pool per shard.
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

    /// Routes `command` by hashing its key to a slot. Read-only commands may land on a
    /// replica of the owning shard; everything else goes to the shard's master.
    ///
    /// A multi-key command whose keys span more than one shard isn't split or validated here
    /// (SPEC_FULL.md §9's open question): it is sent whole to the first key's shard and the
    /// server's own `CROSSSLOT` error, if any, is surfaced unchanged.
    pub async fn run<T: FromValue>(&self, command: &Command) -> Result<T> {
        let key = command.key().ok_or(Error::MissingKey)?;
        let slot = slot::slot(key);
        let topology = self.topology.load();
        let shard_index = topology
            .slot_to_shard
            .get(slot as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Error::UnsupportedTopology(format!("slot {slot} is not assigned to any shard")))?;
        let shard = &topology.shards[shard_index];

        let pool = if is_read_only(&command.name()) && !shard.replicas.is_empty() {
            let index = self
                .next_replica
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                % shard.replicas.len();
            &shard.replicas[index]
        } else {
            &shard.master
        };

        let mut conn = pool.get().await?;
        T::from_value(conn.run(command).await?)
    }

    /// Runs `KEYS pattern` against every shard's master and concatenates the results.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let topology = self.topology.load();
        let mut all = Vec::new();
        for shard in &topology.shards {
            let mut conn = shard.master.get().await?;
            let reply = conn.run(&crate::commands::keys(pattern)).await?;
            all.extend(Vec::<String>::from_value(reply)?);
        }
        Ok(all)
    }

    /// Runs `FLUSHDB` against every shard's master.
    pub async fn flushdb(&self) -> Result<()> {
        let topology = self.topology.load();
        for shard in &topology.shards {
            let mut conn = shard.master.get().await?;
            conn.run(&crate::commands::flushdb()).await?;
        }
        Ok(())
    }
}

#[cfg(feature = "tokio")]
impl Drop for ClusterClient {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

#[cfg(feature = "tokio")]
async fn discover(opts: &Opts) -> Result<ClusterTopology> {
    let entry_pool = Pool::connect(opts.clone()).await?;
    let mut conn = entry_pool.get().await?;
    let reply = conn.run(&crate::commands::cluster_nodes()).await?;
    drop(conn);
    let text = String::from_value(reply)?;
    let nodes = parse_cluster_nodes(&text);

    let masters: Vec<&ClusterNode> = nodes.iter().filter(|n| n.flags.contains(NodeFlags::MASTER)).collect();
    let mut shards = Vec::with_capacity(masters.len());
    let mut slot_to_shard = vec![None; TOTAL_SLOTS as usize];

    for (shard_index, master) in masters.iter().enumerate() {
        let mut node_opts = opts.clone();
        node_opts.host = master.ip.clone();
        node_opts.port = master.port;
        let master_pool = Pool::connect(node_opts).await?;

        let mut replicas = Vec::new();
        for node in &nodes {
            if node.master_id.as_deref() != Some(master.id.as_str()) {
                continue;
            }
            let mut replica_opts = opts.clone();
            replica_opts.host = node.ip.clone();
            replica_opts.port = node.port;
            match Pool::connect(replica_opts).await {
                Ok(pool) => replicas.push(pool),
                Err(err) => warn!(ip = %node.ip, port = node.port, %err, "skipping unreachable cluster replica"),
            }
        }

        for (start, end) in &master.slots {
            for slot in *start..=*end {
                slot_to_shard[slot as usize] = Some(shard_index);
            }
        }

        shards.push(Shard {
            master: master_pool,
            replicas,
        });
    }

    Ok(ClusterTopology {
        shards,
        slot_to_shard,
    })
}

#[cfg(feature = "tokio")]
fn spawn_refresh_task(
    opts: Opts,
    topology: Arc<ArcSwap<ClusterTopology>>,
) -> Option<tokio::task::JoinHandle<()>> {
    if opts.topology_refresh_interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(opts.topology_refresh_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            match discover(&opts).await {
                Ok(fresh) => topology.store(Arc::new(fresh)),
                Err(err) => warn!(%err, "cluster topology refresh failed, keeping old topology"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn parses_three_masters_and_a_replica() {
        let nodes = parse_cluster_nodes(SAMPLE);
        assert_eq!(nodes.len(), 4);
        let masters: Vec<_> = nodes.iter().filter(|n| n.flags.contains(NodeFlags::MASTER)).collect();
        assert_eq!(masters.len(), 3);
        let replica = nodes.iter().find(|n| n.flags.contains(NodeFlags::REPLICA)).unwrap();
        assert_eq!(replica.master_id.as_deref(), Some("e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca"));
    }

    #[test]
    fn parses_slot_ranges() {
        let nodes = parse_cluster_nodes(SAMPLE);
        let first_master = nodes.iter().find(|n| n.id == "e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca").unwrap();
        assert_eq!(first_master.slots, vec![(0, 5460)]);
    }
}
