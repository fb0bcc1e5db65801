/// Index of a node slot inside the arena. Stable for the lifetime of the
/// entry; slots of removed entries are recycled through a free list.
pub(super) type NodeIndex = usize;

#[derive(Debug)]
struct Node {
    key: Vec<u8>,
    value: Vec<u8>,
    prev: Option<NodeIndex>,
    next: Option<NodeIndex>,
}

/// Doubly-linked recency order stored in a slot arena.
///
/// Head is the least recently used entry, tail the most recently used.
/// Links are indices rather than owning pointers, so relinking a node only
/// ever rewrites symmetric edges.
#[derive(Debug, Default)]
pub(super) struct RecencyList {
    slots: Vec<Option<Node>>,
    free: Vec<NodeIndex>,
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
    len: usize,
}

impl RecencyList {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the least recently used entry.
    pub(super) fn front(&self) -> Option<NodeIndex> {
        self.head
    }

    pub(super) fn back(&self) -> Option<NodeIndex> {
        self.tail
    }

    pub(super) fn key(&self, idx: NodeIndex) -> &[u8] {
        &self.node(idx).key
    }

    pub(super) fn value(&self, idx: NodeIndex) -> &[u8] {
        &self.node(idx).value
    }

    pub(super) fn set_value(&mut self, idx: NodeIndex, value: Vec<u8>) {
        self.node_mut(idx).value = value;
    }

    /// Appends a new entry at the tail and returns its slot index.
    pub(super) fn push_back(&mut self, key: Vec<u8>, value: Vec<u8>) -> NodeIndex {
        let node = Node {
            key,
            value,
            prev: self.tail,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        idx
    }

    /// Removes the entry at `idx` and recycles its slot. Returns the key and
    /// value so the caller can settle the index and size accounting.
    pub(super) fn unlink(&mut self, idx: NodeIndex) -> (Vec<u8>, Vec<u8>) {
        let node = self.slots[idx].take().expect("unlink of vacant slot");
        self.detach(idx, node.prev, node.next);
        self.free.push(idx);
        self.len -= 1;
        (node.key, node.value)
    }

    /// Relocates the entry at `idx` to the tail (most recently used).
    pub(super) fn move_to_back(&mut self, idx: NodeIndex) {
        if self.tail == Some(idx) {
            return;
        }
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        self.detach(idx, prev, next);
        let old_tail = self.tail;
        let node = self.node_mut(idx);
        node.prev = old_tail;
        node.next = None;
        if let Some(tail) = self.tail {
            self.node_mut(tail).next = Some(idx);
        } else {
            self.head = Some(idx);
        }
        self.tail = Some(idx);
    }

    fn detach(&mut self, idx: NodeIndex, prev: Option<NodeIndex>, next: Option<NodeIndex>) {
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        debug_assert_ne!(self.head, Some(idx));
        debug_assert_ne!(self.tail, Some(idx));
    }

    fn node(&self, idx: NodeIndex) -> &Node {
        self.slots[idx].as_ref().expect("access to vacant slot")
    }

    fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        self.slots[idx].as_mut().expect("access to vacant slot")
    }

    /// Walks head to tail following `next` edges, verifying the back edges
    /// along the way. Test support for invariant checks.
    #[cfg(test)]
    pub(super) fn traverse(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.len);
        let mut prev = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            assert_eq!(node.prev, prev, "back edge mismatch at slot {idx}");
            order.push(idx);
            prev = Some(idx);
            cursor = node.next;
        }
        assert_eq!(self.tail, prev, "tail does not terminate the chain");
        assert_eq!(order.len(), self.len, "len out of sync with chain");
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList) -> Vec<Vec<u8>> {
        list.traverse()
            .into_iter()
            .map(|idx| list.key(idx).to_vec())
            .collect()
    }

    #[test]
    fn push_back_appends_in_order() {
        let mut list = RecencyList::new();
        list.push_back(b"a".to_vec(), b"1".to_vec());
        list.push_back(b"b".to_vec(), b"2".to_vec());
        list.push_back(b"c".to_vec(), b"3".to_vec());
        assert_eq!(keys(&list), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn move_to_back_relinks_middle_node() {
        let mut list = RecencyList::new();
        list.push_back(b"a".to_vec(), b"1".to_vec());
        let b = list.push_back(b"b".to_vec(), b"2".to_vec());
        list.push_back(b"c".to_vec(), b"3".to_vec());
        list.move_to_back(b);
        assert_eq!(keys(&list), vec![b"a".to_vec(), b"c".to_vec(), b"b".to_vec()]);
        assert_eq!(list.back(), Some(b));
    }

    #[test]
    fn move_to_back_of_head_and_tail() {
        let mut list = RecencyList::new();
        let a = list.push_back(b"a".to_vec(), b"1".to_vec());
        let b = list.push_back(b"b".to_vec(), b"2".to_vec());
        list.move_to_back(a);
        assert_eq!(keys(&list), vec![b"b".to_vec(), b"a".to_vec()]);
        // Moving the tail is a no-op.
        list.move_to_back(a);
        assert_eq!(keys(&list), vec![b"b".to_vec(), b"a".to_vec()]);
        list.move_to_back(b);
        assert_eq!(keys(&list), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn unlink_returns_entry_and_recycles_slot() {
        let mut list = RecencyList::new();
        let a = list.push_back(b"a".to_vec(), b"1".to_vec());
        list.push_back(b"b".to_vec(), b"2".to_vec());
        let (key, value) = list.unlink(a);
        assert_eq!(key, b"a");
        assert_eq!(value, b"1");
        assert_eq!(list.len(), 1);

        let c = list.push_back(b"c".to_vec(), b"3".to_vec());
        assert_eq!(c, a, "freed slot should be reused");
        assert_eq!(keys(&list), vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn unlink_sole_entry_empties_list() {
        let mut list = RecencyList::new();
        let a = list.push_back(b"a".to_vec(), b"1".to_vec());
        list.unlink(a);
        assert!(list.is_empty());
        assert_eq!(list.front(), None);
        assert_eq!(list.back(), None);
    }
}
