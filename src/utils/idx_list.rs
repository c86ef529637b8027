//! Doubly-linked list whose links are slot indices into an arena.
//!
//! A [`NodeIdx`] carries the generation of the slot it was issued for, so a
//! stale index fails the liveness check instead of reaching a reused slot.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx {
    slot: usize,
    gen: u32,
}

struct Node<T> {
    value: Option<T>,
    gen: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct IdxList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> IdxList<T> {
    fn check_rep(&self) {
        assert_eq!(self.len + self.free.len(), self.nodes.len());
        assert_eq!(self.head.is_none(), self.len == 0);
        assert_eq!(self.tail.is_none(), self.len == 0);
    }

    #[must_use]
    pub fn new() -> Self {
        let this = IdxList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        };
        this.check_rep();
        this
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, value: T) -> NodeIdx {
        let slot = match self.free.pop() {
            Some(slot) => {
                let node = &mut self.nodes[slot];
                node.value = Some(value);
                node.prev = self.tail;
                node.next = None;
                slot
            }
            None => {
                self.nodes.push(Node {
                    value: Some(value),
                    gen: 0,
                    prev: self.tail,
                    next: None,
                });
                self.nodes.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        self.check_rep();
        NodeIdx {
            slot,
            gen: self.nodes[slot].gen,
        }
    }

    #[must_use]
    pub fn get(&self, idx: NodeIdx) -> Option<&T> {
        let node = self.nodes.get(idx.slot)?;
        if node.gen != idx.gen {
            return None;
        }
        node.value.as_ref()
    }

    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|slot| self.nodes[slot].value.as_ref())
    }

    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|slot| self.nodes[slot].value.as_ref())
    }

    #[must_use]
    pub fn front_idx(&self) -> Option<NodeIdx> {
        self.head.map(|slot| NodeIdx {
            slot,
            gen: self.nodes[slot].gen,
        })
    }

    /// Unlinks the node; `None` if `idx` is stale or out of range.
    pub fn remove(&mut self, idx: NodeIdx) -> Option<T> {
        let node = self.nodes.get_mut(idx.slot)?;
        if node.gen != idx.gen {
            return None;
        }
        let value = node.value.take()?;
        let (prev, next) = (node.prev.take(), node.next.take());
        node.gen = node.gen.wrapping_add(1);

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(idx.slot);
        self.len -= 1;
        self.check_rep();
        Some(value)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let idx = self.front_idx()?;
        self.remove(idx)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

impl<T> Default for IdxList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    list: &'a IdxList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = &self.list.nodes[slot];
        self.cursor = node.next;
        node.value.as_ref()
    }
}
