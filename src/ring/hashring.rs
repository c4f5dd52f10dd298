//! Consistent hash ring.
//!
//! Each server owns `replica_points` points on a 32-bit circle; a key is
//! owned by the server holding the first point at or after the key's hash.

use std::collections::{BTreeMap, BTreeSet};

use crc::{Crc, CRC_32_ISO_HDLC};

pub const DEFAULT_REPLICA_POINTS: usize = 100;

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn hash(data: &str) -> u32 {
    CRC32.checksum(data.as_bytes())
}

#[derive(Debug, Clone)]
pub struct HashRing {
    replica_points: usize,
    points: BTreeMap<u32, String>,
    servers: BTreeSet<String>,
}

impl HashRing {
    pub fn new(replica_points: usize) -> Self {
        Self {
            replica_points: replica_points.max(1),
            points: BTreeMap::new(),
            servers: BTreeSet::new(),
        }
    }

    pub fn with_servers<I, S>(replica_points: usize, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new(replica_points);
        ring.servers.extend(servers.into_iter().map(Into::into));
        ring.rebuild();
        ring
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Servers in sorted order.
    pub fn servers(&self) -> Vec<String> {
        self.servers.iter().cloned().collect()
    }

    pub fn replica_points(&self) -> usize {
        self.replica_points
    }

    /// Owner of `key`, or `None` on an empty ring.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        let h = hash(key);
        self.points
            .range(h..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, server)| server.as_str())
    }

    /// Fingerprint of the membership, independent of insertion order.
    pub fn checksum(&self) -> u32 {
        let joined = self.servers.iter().map(String::as_str).collect::<Vec<_>>().join(";");
        hash(&joined)
    }

    // Servers are visited in sorted order and existing points are kept, so a
    // hash collision always goes to the smaller server name.
    fn rebuild(&mut self) {
        self.points.clear();
        for server in &self.servers {
            for i in 0..self.replica_points {
                self.points
                    .entry(hash(&format!("{}{}", server, i)))
                    .or_insert_with(|| server.clone());
            }
        }
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICA_POINTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        (0..500).map(|i| format!("203.0.113.{}:{}", i % 250, i)).collect()
    }

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = HashRing::default();
        assert_eq!(ring.lookup("anything"), None);
        assert_eq!(ring.server_count(), 0);
    }

    #[test]
    fn single_server_owns_everything() {
        let ring = HashRing::with_servers(10, ["127.0.0.1:5000"]);
        for key in keys() {
            assert_eq!(ring.lookup(&key), Some("127.0.0.1:5000"));
        }
    }

    #[test]
    fn keys_spread_over_servers() {
        let ring = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1", "b:1", "c:1"]);
        let owners: BTreeSet<&str> = keys().iter().filter_map(|k| ring.lookup(k)).collect();
        assert_eq!(owners.len(), 3);
    }

    #[test]
    fn removing_a_server_only_moves_its_keys() {
        let full = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1", "b:1", "c:1"]);
        let reduced = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1", "b:1"]);

        for key in keys() {
            let before = full.lookup(&key).unwrap();
            let after = reduced.lookup(&key).unwrap();
            if before != "c:1" {
                assert_eq!(before, after, "key {} moved", key);
            }
        }
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let one = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1", "b:1", "c:1"]);
        let two = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["c:1", "a:1", "b:1", "a:1"]);
        assert_eq!(two.server_count(), 3);

        assert_eq!(one.checksum(), two.checksum());
        for key in keys() {
            assert_eq!(one.lookup(&key), two.lookup(&key));
        }
    }

    #[test]
    fn checksum_tracks_membership() {
        let before = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1"]);
        let after = HashRing::with_servers(DEFAULT_REPLICA_POINTS, ["a:1", "b:1"]);
        assert_ne!(before.checksum(), after.checksum());
        assert_eq!(after.servers(), vec!["a:1", "b:1"]);
    }
}
