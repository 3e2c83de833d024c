//! LRU Store Module
//!
//! Implements a byte-bounded Least Recently Used store.

use std::collections::HashMap;
use std::fmt;

use crate::cache::ByteSize;

/// Callback invoked with every entry removed by eviction.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

// == Node ==
/// A slot in the recency list. Links are slot indices.
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Cache ==
/// A byte-bounded LRU store. Not safe for concurrent access.
///
/// Entries live in a slab of slots threaded into a doubly linked list:
/// - `head` = Most recently used
/// - `tail` = Least recently used
///
/// The `index` maps keys to slots so lookup, promotion and eviction are all
/// O(1). Each entry costs `key.len() + value.byte_size()` bytes. A
/// `max_bytes` of zero means the store is unbounded.
pub struct LruCache<V> {
    /// Byte budget, zero for unbounded
    max_bytes: usize,
    /// Bytes currently charged
    used_bytes: usize,
    slots: Vec<Option<Node<V>>>,
    /// Vacated slot indices ready for reuse
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: HashMap<String, usize>,
    on_evicted: Option<EvictionCallback<V>>,
}

impl<V: ByteSize> LruCache<V> {
    // == Constructor ==
    /// Creates an empty store with the given byte budget.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            index: HashMap::new(),
            on_evicted: None,
        }
    }

    /// Creates an empty store that reports evicted entries to `callback`.
    ///
    /// The callback runs after the entry has left the store, so it must not
    /// call back into the store.
    pub fn with_eviction_callback<F>(max_bytes: usize, callback: F) -> Self
    where
        F: FnMut(&str, &V) + Send + 'static,
    {
        let mut store = Self::new(max_bytes);
        store.on_evicted = Some(Box::new(callback));
        store
    }

    // == Add ==
    /// Inserts or replaces `key`, marking it most recently used.
    ///
    /// Evicts from the LRU end until the store is back within budget and
    /// returns how many entries were evicted.
    pub fn add(&mut self, key: impl Into<String>, value: V) -> usize {
        let key = key.into();

        if let Some(&id) = self.index.get(&key) {
            self.move_to_front(id);
            if let Some(node) = self.slots[id].as_mut() {
                self.used_bytes = self.used_bytes - node.value.byte_size() + value.byte_size();
                node.value = value;
            }
        } else {
            self.used_bytes += key.len() + value.byte_size();
            let id = self.allocate(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.push_front(id);
            self.index.insert(key, id);
        }

        let mut evicted = 0;
        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            if self.remove_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    // == Get ==
    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let id = *self.index.get(key)?;
        self.move_to_front(id);
        self.slots[id].as_ref().map(|node| &node.value)
    }

    // == Remove Oldest ==
    /// Removes the least recently used entry and returns it.
    ///
    /// Returns None if the store is empty.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let id = self.tail?;
        self.unlink(id);
        let node = self.slots[id].take()?;
        self.free.push(id);
        self.index.remove(&node.key);
        self.used_bytes -= node.key.len() + node.value.byte_size();

        if let Some(callback) = self.on_evicted.as_mut() {
            callback(&node.key, &node.value);
        }
        Some((node.key, node.value))
    }
}

impl<V> LruCache<V> {
    // == Length ==
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently charged against the budget.
    pub fn bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Checks for `key` without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Keys<'_, V> {
        Keys {
            store: self,
            current: self.head,
        }
    }

    fn allocate(&mut self, node: Node<V>) -> usize {
        if let Some(id) = self.free.pop() {
            self.slots[id] = Some(node);
            id
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn unlink(&mut self, id: usize) {
        let (prev, next) = match self.slots[id].as_mut() {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, id: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[id].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => {
                if let Some(node) = self.slots[h].as_mut() {
                    node.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
    }

    fn move_to_front(&mut self, id: usize) {
        if self.head == Some(id) {
            return;
        }
        self.unlink(id);
        self.push_front(id);
    }
}

impl<V> fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("len", &self.len())
            .finish()
    }
}

// == Keys Iterator ==
/// Iterator over keys in recency order, see [`LruCache::keys`].
pub struct Keys<'a, V> {
    store: &'a LruCache<V>,
    current: Option<usize>,
}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.store.slots[self.current?].as_ref()?;
        self.current = node.next;
        Some(node.key.as_str())
    }
}
