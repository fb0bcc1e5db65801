use std::collections::HashMap;

use super::Storage;
use super::list::{NodeIndex, RecencyList};

/// Size-bounded LRU store.
///
/// Every entry costs `key.len() + value.len()` bytes against `max_size`.
/// Reads and writes that reference an existing key move it to the tail of
/// the recency order before any eviction is considered, so an operation can
/// never evict its own entry. Not safe for concurrent use; the server
/// serializes access through one lock per public operation.
#[derive(Debug)]
pub struct LruStore {
    max_size: usize,
    curr_size: usize,
    list: RecencyList,
    index: HashMap<Vec<u8>, NodeIndex>,
}

impl LruStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            curr_size: 0,
            list: RecencyList::new(),
            index: HashMap::new(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn curr_size(&self) -> usize {
        self.curr_size
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Evicts from the head until an entry of cost `incoming` fits.
    ///
    /// Callers on the update path have already subtracted the old cost of the
    /// entry being updated and moved it to the tail, so the head can only be
    /// that entry once the list holds nothing else, at which point
    /// `curr_size` is zero and the loop has terminated.
    fn evict_until_fits(&mut self, incoming: usize) {
        while self.curr_size + incoming > self.max_size {
            let head = match self.list.front() {
                Some(idx) => idx,
                None => break,
            };
            let (key, value) = self.list.unlink(head);
            self.index.remove(&key);
            self.curr_size -= key.len() + value.len();
        }
    }

    fn insert_new(&mut self, key: &[u8], value: &[u8], cost: usize) {
        self.evict_until_fits(cost);
        let idx = self.list.push_back(key.to_vec(), value.to_vec());
        self.index.insert(key.to_vec(), idx);
        self.curr_size += cost;
    }

    /// Updates the value of an entry that is already indexed, without ever
    /// removing it. The size delta is settled before the stored value
    /// changes: subtract the old cost, evict others, add the new cost.
    fn update_in_place(&mut self, idx: NodeIndex, key: &[u8], value: &[u8], cost: usize) {
        self.list.move_to_back(idx);
        let old_cost = key.len() + self.list.value(idx).len();
        self.curr_size -= old_cost;
        self.evict_until_fits(cost);
        self.list.set_value(idx, value.to_vec());
        self.curr_size += cost;
    }
}

impl Storage for LruStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        let cost = key.len() + value.len();
        if cost > self.max_size {
            return false;
        }
        match self.index.get(key).copied() {
            Some(idx) => self.update_in_place(idx, key, value, cost),
            None => self.insert_new(key, value, cost),
        }
        true
    }

    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        let cost = key.len() + value.len();
        if cost > self.max_size {
            return false;
        }
        self.insert_new(key, value, cost);
        true
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> bool {
        let cost = key.len() + value.len();
        if cost > self.max_size {
            return false;
        }
        match self.index.get(key).copied() {
            Some(idx) => {
                self.update_in_place(idx, key, value, cost);
                true
            }
            None => false,
        }
    }

    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let idx = self.index.get(key).copied()?;
        self.list.move_to_back(idx);
        Some(self.list.value(idx).to_vec())
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(idx) => {
                let (removed_key, removed_value) = self.list.unlink(idx);
                self.curr_size -= removed_key.len() + removed_value.len();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl LruStore {
    /// Keys from head (LRU) to tail (MRU).
    pub(crate) fn keys_in_order(&self) -> Vec<Vec<u8>> {
        self.list
            .traverse()
            .into_iter()
            .map(|idx| self.list.key(idx).to_vec())
            .collect()
    }

    pub(crate) fn tail_key(&self) -> Option<Vec<u8>> {
        self.list.back().map(|idx| self.list.key(idx).to_vec())
    }

    /// Asserts the structural invariants: the chain is well formed, the index
    /// holds exactly the chained keys, the byte accounting matches the chain,
    /// and the budget is respected.
    pub(crate) fn check_invariants(&self) {
        let order = self.list.traverse();
        let mut total = 0usize;
        let mut seen = std::collections::HashSet::new();
        for &idx in &order {
            let key = self.list.key(idx);
            let value = self.list.value(idx);
            total += key.len() + value.len();
            assert!(seen.insert(key.to_vec()), "duplicate key in chain");
            assert_eq!(
                self.index.get(key).copied(),
                Some(idx),
                "index entry missing or stale"
            );
        }
        assert_eq!(self.index.len(), order.len(), "index holds extra keys");
        assert_eq!(self.curr_size, total, "size accounting drifted");
        assert!(self.curr_size <= self.max_size, "budget exceeded");
    }

    fn snapshot(&self) -> (Vec<(Vec<u8>, Vec<u8>)>, usize) {
        let entries = self
            .list
            .traverse()
            .into_iter()
            .map(|idx| (self.list.key(idx).to_vec(), self.list.value(idx).to_vec()))
            .collect();
        (entries, self.curr_size)
    }
}
