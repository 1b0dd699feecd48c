//! Consistent-hash ring for distributing string keys across nodes.
//!
//! Each registered node contributes a fixed number of virtual replica points
//! hashed onto a sorted ring; a lookup walks to the ring successor of the
//! key's hash, wrapping to the first point. Adding or removing a node only
//! remaps the keys adjacent to its replica points.
//!
//! Independent of the timing wheel.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Hash function mapping a byte string onto the ring's key space.
pub type HashFn = fn(&[u8]) -> u64;

/// Lookup on a ring with no registered keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("hash ring is empty: add a key first")]
pub struct EmptyRingError;

struct RingState {
    /// Virtual replica point hashes, sorted ascending.
    points: Vec<u64>,
    /// Point hash to owning key.
    owners: HashMap<u64, String>,
}

/// A consistent-hash ring with virtual replicas.
///
/// Interior locking (read-mostly) makes the whole API `&self`, so one ring
/// can serve concurrent lookups while membership changes.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    state: RwLock<RingState>,
}

impl HashRing {
    /// Create a ring where every key contributes `replicas` virtual points,
    /// hashed with the default FNV-1a function.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, fnv1a)
    }

    /// Create a ring with a caller-supplied hash function. The function must
    /// be deterministic; distribution quality is the caller's responsibility.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            replicas,
            hash,
            state: RwLock::new(RingState {
                points: Vec::new(),
                owners: HashMap::new(),
            }),
        }
    }

    /// Register keys on the ring. Each key lands at `replicas` points hashed
    /// from the key plus a replica suffix.
    pub fn add<I>(&self, keys: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut state = self.state.write();
        for key in keys {
            let key = key.into();
            for replica in 0..self.replicas {
                let point = (self.hash)(format!("{key}{replica}").as_bytes());
                match state.points.binary_search(&point) {
                    // Point collision: last writer takes it over, matching
                    // the owner-map overwrite below.
                    Ok(_) => {}
                    Err(pos) => state.points.insert(pos, point),
                }
                state.owners.insert(point, key.clone());
            }
        }
    }

    /// Resolve `key` to the registered key owning its ring successor.
    pub fn get(&self, key: &str) -> Result<String, EmptyRingError> {
        let state = self.state.read();
        if state.points.is_empty() {
            return Err(EmptyRingError);
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = state.points.partition_point(|&p| p < hash);
        let point = if idx == state.points.len() {
            state.points[0]
        } else {
            state.points[idx]
        };
        Ok(state.owners[&point].clone())
    }

    /// Remove a key and all of its virtual points. Unknown keys are a no-op.
    pub fn remove(&self, key: &str) {
        let mut state = self.state.write();
        for replica in 0..self.replicas {
            let point = (self.hash)(format!("{key}{replica}").as_bytes());
            // A collided point may have been taken over by a later add; it
            // then belongs to that key and stays.
            if state.owners.get(&point).map(String::as_str) != Some(key) {
                continue;
            }
            state.owners.remove(&point);
            if let Ok(pos) = state.points.binary_search(&point) {
                state.points.remove(pos);
            }
        }
    }

    /// Number of virtual points currently on the ring.
    pub fn len(&self) -> usize {
        self.state.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().points.is_empty()
    }
}

/// FNV-1a, 64-bit. Stable across platforms and processes, which is all the
/// ring contract asks of its default hash.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
