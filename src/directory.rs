//------------ Directory (Nibble Trie) ---------------------------------------------------

use log::debug;

use crate::node_id::NodeId;
use crate::subscriber::{Reachable, Subscriber, SubscriberId};

/// Opaque arena index for a trie node. See the design notes on the
/// arena-of-nodes representation used to avoid a cyclic ownership graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrieNodeId(u32);

/// A single slot of a 16-way trie node.
#[derive(Debug, Clone, Copy)]
enum TrieSlot {
    Empty,
    Leaf(SubscriberId),
    Child(TrieNodeId),
}

struct TrieNode {
    slots: [TrieSlot; 16],
}

impl TrieNode {
    fn empty() -> Self {
        TrieNode {
            slots: [TrieSlot::Empty; 16],
        }
    }
}

/// Outcome of a directory lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(SubscriberId),
    /// No subscriber exists under this prefix at all.
    NotFound,
    /// More than one subscriber shares this prefix and it cannot be
    /// resolved from the given bytes alone.
    Ambiguous,
}

impl Lookup {
    pub fn subscriber(self) -> Option<SubscriberId> {
        match self {
            Lookup::Found(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirectoryStats {
    pub subscriber_count: usize,
    pub node_count: usize,
    pub max_depth: usize,
}

/// The 16-way radix trie over node-id nibbles, plus the subscriber arena
/// it indexes into.
///
/// Subscribers are inserted but never removed: the directory is
/// monotonic for the lifetime of the process.
pub struct Directory {
    nodes: Vec<TrieNode>,
    subscribers: Vec<Subscriber>,
    root: TrieNodeId,
    my_subscriber: SubscriberId,
}

fn nibble_at(bytes: &[u8], p: usize) -> u8 {
    let byte = bytes[p / 2];
    if p % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0F
    }
}

impl Directory {
    /// Creates a directory seeded with `my_sid` as `my_subscriber`,
    /// reachable as `SELF`.
    pub fn new(my_sid: NodeId) -> Self {
        let mut dir = Directory {
            nodes: vec![TrieNode::empty()],
            subscribers: Vec::new(),
            root: TrieNodeId(0),
            my_subscriber: SubscriberId(0),
        };
        let my_id = match dir.find_or_insert(&my_sid, 32, true) {
            Lookup::Found(id) => id,
            _ => unreachable!("inserting a full id into an empty directory always succeeds"),
        };
        dir.subscribers[my_id.0 as usize].reachable = Reachable::SELF_;
        dir.my_subscriber = my_id;
        dir
    }

    pub fn my_subscriber(&self) -> SubscriberId {
        self.my_subscriber
    }

    pub fn get(&self, id: SubscriberId) -> &Subscriber {
        &self.subscribers[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SubscriberId) -> &mut Subscriber {
        &mut self.subscribers[id.0 as usize]
    }

    /// Descends the trie nibble by nibble, looking up (and, if `create`
    /// and `id` carries the full 32 bytes, inserting) the subscriber
    /// identified by the first `len_bytes` bytes of `id`.
    ///
    /// Insertion of a value shorter than the full id is never performed:
    /// per the design, a lookup with `len_bytes < 32` behaves as though
    /// `create` were `false`, regardless of the argument.
    pub fn find_or_insert(&mut self, id: &NodeId, len_bytes: usize, create: bool) -> Lookup {
        let effective_create = create && len_bytes == 32;
        self.descend(self.root, id.as_bytes(), len_bytes, effective_create, 0)
    }

    fn descend(
        &mut self,
        node: TrieNodeId,
        id: &[u8],
        len_bytes: usize,
        create: bool,
        depth: usize,
    ) -> Lookup {
        let nibble_limit = len_bytes * 2;
        if depth >= nibble_limit {
            // The caller's prefix is exhausted but the trie still
            // branches below this point: more than one subscriber
            // shares the whole prefix.
            return Lookup::Ambiguous;
        }
        let slot_idx = nibble_at(id, depth) as usize;
        let slot = self.nodes[node.0 as usize].slots[slot_idx];
        match slot {
            TrieSlot::Child(child) => self.descend(child, id, len_bytes, create, depth + 1),
            TrieSlot::Empty => {
                if !create {
                    return Lookup::NotFound;
                }
                let mut full = [0u8; 32];
                full.copy_from_slice(id);
                let sid = NodeId::new(full);
                let new_id = SubscriberId(self.subscribers.len() as u32);
                self.subscribers.push(Subscriber::new(sid, (depth + 1) as u8));
                self.nodes[node.0 as usize].slots[slot_idx] = TrieSlot::Leaf(new_id);
                Lookup::Found(new_id)
            }
            TrieSlot::Leaf(existing) => {
                let existing_sid = self.subscribers[existing.0 as usize].sid;
                if existing_sid.prefix_eq(id, len_bytes) {
                    return Lookup::Found(existing);
                }
                if !create {
                    return Lookup::Ambiguous;
                }
                // Split: move the existing leaf one level deeper and
                // continue the descent for the new id.
                let new_node_idx = self.nodes.len() as u32;
                self.nodes.push(TrieNode::empty());
                let existing_nibble = existing_sid.nibble(depth + 1) as usize;
                self.nodes[new_node_idx as usize].slots[existing_nibble] = TrieSlot::Leaf(existing);
                self.subscribers[existing.0 as usize].abbreviate_len = (depth + 2) as u8;
                debug!(
                    "directory: split at depth {depth} for existing subscriber {existing_sid:?}, new abbreviate_len={}",
                    depth + 2
                );
                self.nodes[node.0 as usize].slots[slot_idx] = TrieSlot::Child(TrieNodeId(new_node_idx));
                self.descend(TrieNodeId(new_node_idx), id, len_bytes, create, depth + 1)
            }
        }
    }

    /// In-order depth-first traversal of subscriber leaves, optionally
    /// bounded below by `start` and above by `end` (both given as
    /// node-id prefixes). `start` constrains only the left edge of the
    /// walk: once a branch other than the one immediately following the
    /// `start` prefix is taken, the remainder of that subtree is walked
    /// unconstrained. The callback's `true` return aborts the walk.
    pub fn enumerate<F>(&self, start: Option<&[u8]>, end: Option<&[u8]>, mut callback: F)
    where
        F: FnMut(SubscriberId, &Subscriber) -> bool,
    {
        self.walk(self.root, 0, start, end, &mut callback);
    }

    fn walk<F>(
        &self,
        node: TrieNodeId,
        depth: usize,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        callback: &mut F,
    ) -> bool
    where
        F: FnMut(SubscriberId, &Subscriber) -> bool,
    {
        let lo = match start {
            Some(s) if depth < s.len() * 2 => nibble_at(s, depth) as usize,
            _ => 0,
        };
        let hi = match end {
            Some(e) if depth < e.len() * 2 => nibble_at(e, depth) as usize,
            _ => 15,
        };
        for slot_idx in lo..=hi {
            let slot = self.nodes[node.0 as usize].slots[slot_idx];
            let next_start = if slot_idx == lo { start } else { None };
            let next_end = if slot_idx == hi { end } else { None };
            match slot {
                TrieSlot::Empty => continue,
                TrieSlot::Leaf(sid) => {
                    let sub = &self.subscribers[sid.0 as usize];
                    if callback(sid, sub) {
                        return true;
                    }
                }
                TrieSlot::Child(child) => {
                    if self.walk(child, depth + 1, next_start, next_end, callback) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn stats(&self) -> DirectoryStats {
        let mut max_depth = 0;
        self.enumerate(None, None, |sid, _| {
            let len = self.get(sid).abbreviate_len as usize;
            if len > max_depth {
                max_depth = len;
            }
            false
        });
        DirectoryStats {
            subscriber_count: self.subscribers.len(),
            node_count: self.nodes.len(),
            max_depth,
        }
    }

    /// The directory-service registration hook fired by the
    /// reachability resolver when the configured directory-service node
    /// transitions to a reachable state. This in-memory core has no
    /// persistent directory service to register with; it is a log-only
    /// placeholder for the upper layer to override.
    pub fn register_self(&self) {
        debug!(
            "directory: register_self called for {:?}",
            self.get(self.my_subscriber).sid
        );
    }
}
