//! Consistent Hashing Module
//!
//! Maps keys onto a ring of peers using virtual replica nodes.

use std::collections::HashMap;

/// Hash function placing identifiers on the 2^32 ring.
pub type HashFn = fn(&[u8]) -> u32;

// == Hash Ring ==
/// A consistent-hash ring.
///
/// Each peer is hashed into `replicas` positions (`"{i}{peer}"` for
/// `i in 0..replicas`). A key belongs to the first position clockwise from
/// its own hash, wrapping past the largest position back to the smallest.
/// Assignment depends only on the hash function, the replica count and the
/// peer set, never on the order peers were added.
#[derive(Debug, Clone)]
pub struct HashRing {
    hash: HashFn,
    /// Virtual nodes per real peer
    replicas: usize,
    /// Sorted virtual node positions
    ring: Vec<u32>,
    /// Virtual node position -> real peer
    owners: HashMap<u32, String>,
}

impl HashRing {
    // == Constructor ==
    /// Creates an empty ring hashing with CRC-32 (IEEE).
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32fast::hash)
    }

    /// Creates an empty ring with a custom hash function.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            ring: Vec::new(),
            owners: HashMap::new(),
        }
    }

    // == Add ==
    /// Places every peer on the ring.
    ///
    /// Adding a peer twice duplicates its positions without changing any
    /// assignment.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{peer}").as_bytes());
                self.ring.push(position);
                self.owners.insert(position, peer.to_string());
            }
        }
        self.ring.sort_unstable();
    }

    // == Get ==
    /// Returns the peer owning `key`, or None if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = self.ring.partition_point(|&position| position < hash);
        let position = self.ring[idx % self.ring.len()];
        self.owners.get(&position).map(String::as_str)
    }

    /// Number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    /// Interprets the input as a decimal number so positions are predictable.
    fn decimal_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn test_empty_ring() {
        let ring = HashRing::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn test_hashing() {
        let mut ring = HashRing::with_hasher(3, decimal_hash);

        // Positions: 2, 4, 6, 12, 14, 16, 22, 24, 26
        ring.add(["6", "4", "2"]);
        assert_eq!(ring.len(), 9);

        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")];
        for (key, peer) in cases {
            assert_eq!(ring.get(key), Some(peer), "asking for {key}");
        }

        // Adds 8, 18, 28
        ring.add(["8"]);

        // 27 should now map to 8
        let cases = [("2", "2"), ("11", "2"), ("23", "4"), ("27", "8")];
        for (key, peer) in cases {
            assert_eq!(ring.get(key), Some(peer), "asking for {key}");
        }
    }

    #[test]
    fn test_ring_is_sorted_after_add() {
        let mut ring = HashRing::new(10);
        ring.add(["peer-b", "peer-a"]);
        ring.add(["peer-c"]);

        assert!(ring.ring.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut first = HashRing::new(50);
        first.add(["alpha", "beta", "gamma"]);

        let mut second = HashRing::new(50);
        second.add(["gamma"]);
        second.add(["beta", "alpha"]);

        for i in 0..1000 {
            let key = format!("key-{i}");
            assert_eq!(first.get(&key), second.get(&key));
        }
    }

    #[test]
    fn test_readding_peer_keeps_assignment() {
        let mut ring = HashRing::new(20);
        ring.add(["a", "b"]);
        let before: Vec<_> = (0..200)
            .map(|i| ring.get(&i.to_string()).map(str::to_string))
            .collect();

        ring.add(["a"]);
        let after: Vec<_> = (0..200)
            .map(|i| ring.get(&i.to_string()).map(str::to_string))
            .collect();

        assert_eq!(before, after);
        assert_eq!(ring.len(), 60);
    }

    #[test]
    fn test_replicas_spread_load() {
        let mut ring = HashRing::new(100);
        ring.add(["a", "b", "c"]);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for i in 0..3000 {
            let peer = ring.get(&format!("key{i}")).unwrap();
            *counts.entry(peer).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n > 300), "skewed: {counts:?}");
    }
}
