const NONE: usize = usize::MAX;

struct Node<T> {
    value: T,
    generation: u32,
    prev: usize,
    next: usize,
}

enum Entry<T> {
    Vacant { next_free: usize, generation: u32 },
    Occupied(Node<T>),
}

/// Ordered collection backing one wheel slot.
///
/// Slab storage with an intrusive doubly-linked list threading the occupied
/// entries in insertion order. `push_back` and `remove` are O(1); `sweep`
/// visits elements front-to-back, which is what gives the wheel its
/// insertion-order firing guarantee within a slot.
///
/// Keys are generation-tagged: removing an entry bumps the generation stored
/// in the vacated slot, so a stale `(key, generation)` pair held by a caller
/// can never remove an unrelated value that happens to reuse the key.
pub(crate) struct SlotList<T> {
    entries: Vec<Entry<T>>,
    free_head: usize,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> SlotList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: NONE,
            head: NONE,
            tail: NONE,
            len: 0,
        }
    }

    /// Append a value at the back. Returns its `(key, generation)` pair.
    pub(crate) fn push_back(&mut self, value: T) -> (usize, u32) {
        let prev_tail = self.tail;
        let (key, generation) = if self.free_head != NONE {
            let key = self.free_head;
            let generation = match self.entries[key] {
                Entry::Vacant {
                    next_free,
                    generation,
                } => {
                    self.free_head = next_free;
                    generation
                }
                Entry::Occupied(_) => unreachable!("free list points at an occupied entry"),
            };
            self.entries[key] = Entry::Occupied(Node {
                value,
                generation,
                prev: prev_tail,
                next: NONE,
            });
            (key, generation)
        } else {
            let key = self.entries.len();
            self.entries.push(Entry::Occupied(Node {
                value,
                generation: 0,
                prev: prev_tail,
                next: NONE,
            }));
            (key, 0)
        };

        if prev_tail == NONE {
            self.head = key;
        } else if let Entry::Occupied(tail) = &mut self.entries[prev_tail] {
            tail.next = key;
        }
        self.tail = key;
        self.len += 1;
        (key, generation)
    }

    /// Remove the entry at `key` if it is still occupied by the same
    /// generation. Returns `None` for a vacant key or a stale generation,
    /// which makes removal through a kept handle idempotent.
    pub(crate) fn remove(&mut self, key: usize, generation: u32) -> Option<T> {
        match self.entries.get(key) {
            Some(Entry::Occupied(node)) if node.generation == generation => {}
            _ => return None,
        }
        Some(self.take(key))
    }

    /// Walk the list front-to-back. Entries for which `keep` returns `false`
    /// are unlinked and returned, preserving scan order.
    pub(crate) fn sweep<F>(&mut self, mut keep: F) -> Vec<T>
    where
        F: FnMut(&mut T) -> bool,
    {
        let mut removed = Vec::new();
        let mut cur = self.head;
        while cur != NONE {
            let (next, retain) = match &mut self.entries[cur] {
                Entry::Occupied(node) => (node.next, keep(&mut node.value)),
                Entry::Vacant { .. } => unreachable!("order list points at a vacant entry"),
            };
            if !retain {
                removed.push(self.take(cur));
            }
            cur = next;
        }
        removed
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unlink and vacate an occupied entry, bumping its generation.
    fn take(&mut self, key: usize) -> T {
        let next_generation = match &self.entries[key] {
            Entry::Occupied(node) => node.generation.wrapping_add(1),
            Entry::Vacant { .. } => unreachable!("take on a vacant entry"),
        };
        let entry = std::mem::replace(
            &mut self.entries[key],
            Entry::Vacant {
                next_free: self.free_head,
                generation: next_generation,
            },
        );
        self.free_head = key;

        let node = match entry {
            Entry::Occupied(node) => node,
            Entry::Vacant { .. } => unreachable!(),
        };

        if node.prev == NONE {
            self.head = node.next;
        } else if let Entry::Occupied(prev) = &mut self.entries[node.prev] {
            prev.next = node.next;
        }
        if node.next == NONE {
            self.tail = node.prev;
        } else if let Entry::Occupied(next) = &mut self.entries[node.next] {
            next.prev = node.prev;
        }

        self.len -= 1;
        node.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn drain<T>(list: &mut SlotList<T>) -> Vec<T> {
        list.sweep(|_| false)
    }

    // ==================== Basic Operations ====================

    #[test]
    fn test_new_empty() {
        let list: SlotList<u32> = SlotList::new();

        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_push_single() {
        let mut list = SlotList::new();

        let (key, generation) = list.push_back(42u32);

        assert_eq!(key, 0);
        assert_eq!(generation, 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_push_keys_sequential_on_fresh_list() {
        let mut list = SlotList::new();

        assert_eq!(list.push_back(10u32).0, 0);
        assert_eq!(list.push_back(20).0, 1);
        assert_eq!(list.push_back(30).0, 2);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_remove_single() {
        let mut list = SlotList::new();

        let (key, generation) = list.push_back(42u32);

        assert_eq!(list.remove(key, generation), Some(42));
        assert!(list.is_empty());
    }

    #[test]
    fn test_remove_middle_preserves_order() {
        let mut list = SlotList::new();

        list.push_back(10u32);
        let (k1, g1) = list.push_back(20);
        list.push_back(30);

        assert_eq!(list.remove(k1, g1), Some(20));
        assert_eq!(drain(&mut list), vec![10, 30]);
    }

    #[test]
    fn test_remove_head_and_tail() {
        let mut list = SlotList::new();

        let (k0, g0) = list.push_back(10u32);
        list.push_back(20);
        let (k2, g2) = list.push_back(30);

        assert_eq!(list.remove(k0, g0), Some(10));
        assert_eq!(list.remove(k2, g2), Some(30));
        assert_eq!(drain(&mut list), vec![20]);
    }

    // ==================== Idempotent Removal ====================

    #[test]
    fn test_remove_twice_is_noop() {
        let mut list = SlotList::new();

        let (key, generation) = list.push_back(42u32);

        assert_eq!(list.remove(key, generation), Some(42));
        assert_eq!(list.remove(key, generation), None);
    }

    #[test]
    fn test_remove_out_of_bounds_key() {
        let mut list: SlotList<u32> = SlotList::new();
        list.push_back(1);

        assert_eq!(list.remove(99, 0), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_stale_generation_never_removes_reused_key() {
        let mut list = SlotList::new();

        let (k0, g0) = list.push_back(10u32);
        assert_eq!(list.remove(k0, g0), Some(10));

        // Key 0 is reused with a bumped generation.
        let (k1, g1) = list.push_back(20);
        assert_eq!(k1, k0);
        assert_ne!(g1, g0);

        // The stale pair must not touch the new occupant.
        assert_eq!(list.remove(k0, g0), None);
        assert_eq!(list.len(), 1);
        assert_eq!(list.remove(k1, g1), Some(20));
    }

    #[test]
    fn test_generation_advances_across_reuse_cycles() {
        let mut list = SlotList::new();
        let mut seen = Vec::new();

        for i in 0..5u32 {
            let (key, generation) = list.push_back(i);
            assert_eq!(key, 0);
            seen.push(generation);
            list.remove(key, generation);
        }

        seen.dedup();
        assert_eq!(seen.len(), 5, "each reuse must carry a fresh generation");
    }

    // ==================== Sweep ====================

    #[test]
    fn test_sweep_empty() {
        let mut list: SlotList<u32> = SlotList::new();

        assert!(list.sweep(|_| false).is_empty());
    }

    #[test]
    fn test_sweep_removes_in_insertion_order() {
        let mut list = SlotList::new();

        list.push_back(10u32);
        list.push_back(20);
        list.push_back(30);

        assert_eq!(list.sweep(|_| false), vec![10, 20, 30]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_sweep_retains_and_mutates() {
        let mut list = SlotList::new();

        list.push_back(3u32);
        list.push_back(0);
        list.push_back(1);

        // Decrement-and-retain positives, remove zeros: the tick scan shape.
        let removed = list.sweep(|v| {
            if *v > 0 {
                *v -= 1;
                true
            } else {
                false
            }
        });

        assert_eq!(removed, vec![0]);
        assert_eq!(drain(&mut list), vec![2, 0]);
    }

    #[test]
    fn test_sweep_order_survives_interior_removal() {
        let mut list = SlotList::new();

        list.push_back(1u32);
        let (k, g) = list.push_back(2);
        list.push_back(3);
        list.push_back(4);

        list.remove(k, g);
        let (k3, g3) = list.push_back(5);
        assert_eq!(k3, k, "freed key is reused");
        assert_ne!(g3, g);

        // Reused key joins at the back, not at its old position.
        assert_eq!(drain(&mut list), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_sweep_partial_then_push() {
        let mut list = SlotList::new();

        list.push_back(0u32);
        list.push_back(7);
        list.sweep(|v| *v != 0);

        list.push_back(9);
        assert_eq!(drain(&mut list), vec![7, 9]);
    }

    // ==================== Free List Behavior ====================

    #[test]
    fn test_free_list_lifo_reuse() {
        let mut list = SlotList::new();

        let keys: Vec<_> = (0..3u32).map(|i| list.push_back(i)).collect();
        for (key, generation) in &keys {
            list.remove(*key, *generation);
        }

        // Free list is LIFO: last freed comes back first.
        assert_eq!(list.push_back(100).0, keys[2].0);
        assert_eq!(list.push_back(200).0, keys[1].0);
        assert_eq!(list.push_back(300).0, keys[0].0);
    }

    #[test]
    fn test_repeated_fill_drain() {
        let mut list = SlotList::new();

        for round in 0..50u32 {
            for i in 0..8 {
                list.push_back(round * 8 + i);
            }
            let drained = drain(&mut list);
            assert_eq!(drained.len(), 8);
            assert!(list.is_empty());
        }

        // Storage stabilized at the high-water mark.
        assert_eq!(list.entries.len(), 8);
    }

    // ==================== Drop Behavior ====================

    #[test]
    fn test_drop_with_occupied() {
        let drop_count = Rc::new(Cell::new(0));

        struct DropCounter(Rc<Cell<usize>>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        {
            let mut list = SlotList::new();
            list.push_back(DropCounter(Rc::clone(&drop_count)));
            list.push_back(DropCounter(Rc::clone(&drop_count)));
            assert_eq!(drop_count.get(), 0);
        }

        assert_eq!(drop_count.get(), 2);
    }

    #[test]
    fn test_removed_value_dropped_once() {
        let drop_count = Rc::new(Cell::new(0));

        struct DropCounter(Rc<Cell<usize>>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut list = SlotList::new();
        let (key, generation) = list.push_back(DropCounter(Rc::clone(&drop_count)));

        drop(list.remove(key, generation));
        assert_eq!(drop_count.get(), 1);

        drop(list);
        assert_eq!(drop_count.get(), 1);
    }
}
