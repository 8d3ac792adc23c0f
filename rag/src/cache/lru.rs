//! Doubly-linked recency list stored in an arena.
//!
//! Nodes live in a `Vec` and link to each other by slot index, so promotion and eviction are
//! O(1) without shared mutable pointers. Freed slots are recycled.

/// Handle to a node in an [`LruList`].
pub(crate) type Handle = usize;

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<Handle>,
    next: Option<Handle>,
}

/// Recency-ordered list. The front is the most recently used value, the back the least.
#[derive(Debug)]
pub(crate) struct LruList<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
    len: usize,
}

impl<T> Default for LruList<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl<T> LruList<T> {
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Inserts `value` at the front and returns its handle.
    pub(crate) fn push_front(&mut self, value: T) -> Handle {
        let node = Node {
            value,
            prev: None,
            next: self.head,
        };
        let handle = if let Some(handle) = self.free.pop() {
            self.slots[handle] = Some(node);
            handle
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        };

        if let Some(old_head) = self.head {
            if let Some(node) = self.slots[old_head].as_mut() {
                node.prev = Some(handle);
            }
        }
        self.head = Some(handle);
        if self.tail.is_none() {
            self.tail = Some(handle);
        }
        self.len += 1;
        handle
    }

    /// Moves the node at `handle` to the front.
    pub(crate) fn move_to_front(&mut self, handle: Handle) {
        if self.head == Some(handle) || self.slots.get(handle).is_none_or(Option::is_none) {
            return;
        }
        self.unlink(handle);
        if let Some(node) = self.slots[handle].as_mut() {
            node.prev = None;
            node.next = self.head;
        }
        if let Some(old_head) = self.head {
            if let Some(node) = self.slots[old_head].as_mut() {
                node.prev = Some(handle);
            }
        }
        self.head = Some(handle);
        if self.tail.is_none() {
            self.tail = Some(handle);
        }
    }

    /// Removes and returns the value at `handle`.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<T> {
        self.slots.get(handle)?.as_ref()?;
        self.unlink(handle);
        let node = self.slots[handle].take()?;
        self.free.push(handle);
        self.len -= 1;
        Some(node.value)
    }

    /// Returns the handle of the least recently used value.
    pub(crate) const fn back(&self) -> Option<Handle> {
        self.tail
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&T> {
        self.slots.get(handle)?.as_ref().map(|node| &node.value)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle)?
            .as_mut()
            .map(|node| &mut node.value)
    }

    /// Iterates from most to least recently used.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Detaches a node from its neighbours, fixing head and tail. The node stays in its slot.
    fn unlink(&mut self, handle: Handle) {
        let Some((prev, next)) = self.slots[handle]
            .as_ref()
            .map(|node| (node.prev, node.next))
        else {
            return;
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.slots[prev].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(node) = self.slots[next].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }
}

/// Front-to-back iterator over an [`LruList`].
pub(crate) struct Iter<'a, T> {
    list: &'a LruList<T>,
    cursor: Option<Handle>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.slots.get(self.cursor?)?.as_ref()?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
