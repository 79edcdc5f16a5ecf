use super::tree::NodeId;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::Hasher;

/// Bucket counts a table steps through as it grows.
pub const GROWTH_SEQUENCE: [usize; 10] = [
    3, 31, 127, 509, 2039, 8191, 32749, 131071, 524287, 2097143,
];

#[derive(Debug, Clone)]
struct Entry {
    hash: u64,
    label: Box<[u8]>,
    node: NodeId,
}

type Chain = SmallVec<[Entry; 1]>;

/// Case-insensitive map from a label to a child node.
#[derive(Debug, Clone)]
pub struct LabelTable {
    buckets: Vec<Chain>,
    step: usize,
    len: usize,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelTable {
    pub fn new() -> Self {
        Self {
            buckets: vec![Chain::new(); GROWTH_SEQUENCE[0]],
            step: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn get(&self, label: &[u8]) -> Option<NodeId> {
        let hash = label_hash(label);
        self.buckets[self.bucket(hash)]
            .iter()
            .find(|e| e.hash == hash && e.label.eq_ignore_ascii_case(label))
            .map(|e| e.node)
    }

    /// Adds `label`. The caller has checked it is absent.
    pub fn insert(&mut self, label: &[u8], node: NodeId) {
        let hash = label_hash(label);
        let bucket = self.bucket(hash);
        self.buckets[bucket].push(Entry {
            hash,
            label: label.into(),
            node,
        });
        self.len += 1;
        if self.len > self.buckets.len() {
            self.grow();
        }
    }

    pub fn remove(&mut self, label: &[u8]) -> Option<NodeId> {
        let hash = label_hash(label);
        let bucket = self.bucket(hash);
        let chain = &mut self.buckets[bucket];
        let pos = chain
            .iter()
            .position(|e| e.hash == hash && e.label.eq_ignore_ascii_case(label))?;
        self.len -= 1;
        Some(chain.remove(pos).node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.buckets.iter().flat_map(|chain| chain.iter().map(|e| e.node))
    }

    fn bucket(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn grow(&mut self) {
        let Some(&size) = GROWTH_SEQUENCE.get(self.step + 1) else {
            return;
        };
        self.step += 1;
        let old = std::mem::replace(&mut self.buckets, vec![Chain::new(); size]);
        for entry in old.into_iter().flatten() {
            let bucket = self.bucket(entry.hash);
            self.buckets[bucket].push(entry);
        }
    }
}

fn label_hash(label: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    for byte in label {
        hasher.write_u8(byte.to_ascii_lowercase());
    }
    hasher.finish()
}
