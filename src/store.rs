//! # Element Store
//!
//! The untyped backing memory of every stack: an ordered buffer of byte
//! slices, a parallel buffer of optional keys, and a head index that turns
//! FIFO removal into a pointer bump instead of an O(n) shift.
//!
//! ## Layout rules
//! - `elems` and `keys` always have the same length.
//! - Slots below `head` are logically dead and reclaimed by compaction.
//! - A `None` element at or above `head` is a tombstone: the former slot of
//!   a removed keyed value, kept in place so coexisting positional cursors
//!   do not see their offsets shift. Tombstones are invisible to every
//!   accessor here; `len` counts live elements only.
//!
//! ## Compaction
//! FIFO removal advances `head`. When the dead prefix exceeds both
//! [`COMPACT_FLOOR`] and half the buffer, the prefix is dropped in one move.
//! Compaction changes absolute slot numbers; callers holding slot-addressed
//! state (the hash index) apply the returned shift.

/// Head slack below which FIFO compaction is skipped. Small queues churn
/// through their buffer without ever paying the memmove.
pub(crate) const COMPACT_FLOOR: usize = 32;

/// Ordered element + key buffers with an amortised-FIFO head index.
#[derive(Debug, Default)]
pub(crate) struct ElementStore {
    elems: Vec<Option<Vec<u8>>>,
    keys: Vec<Option<Vec<u8>>>,
    head: usize,
    /// Tombstone count within `[head, elems.len())`.
    tombstones: usize,
}

impl ElementStore {
    pub(crate) fn new() -> Self {
        ElementStore::default()
    }

    /// Number of live elements.
    pub(crate) fn len(&self) -> usize {
        self.elems.len() - self.head - self.tombstones
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First valid slot index. Slots below this are dead.
    pub(crate) fn head(&self) -> usize {
        self.head
    }

    /// Append an element with an optional key. Returns the slot index.
    pub(crate) fn push(&mut self, bytes: Vec<u8>, key: Option<Vec<u8>>) -> usize {
        self.elems.push(Some(bytes));
        self.keys.push(key);
        self.elems.len() - 1
    }

    /// Element bytes at an absolute slot. `None` for dead or tombstoned slots.
    pub(crate) fn get(&self, slot: usize) -> Option<&[u8]> {
        if slot < self.head {
            return None;
        }
        self.elems.get(slot)?.as_deref()
    }

    /// Key bytes at an absolute slot, if the slot is live and keyed.
    pub(crate) fn key_at(&self, slot: usize) -> Option<&[u8]> {
        if slot < self.head || self.elems.get(slot)?.is_none() {
            return None;
        }
        self.keys.get(slot)?.as_deref()
    }

    /// Replace the bytes of a live slot in place.
    pub(crate) fn set(&mut self, slot: usize, bytes: Vec<u8>) {
        debug_assert!(slot >= self.head && self.elems[slot].is_some());
        self.elems[slot] = Some(bytes);
    }

    /// Assign a key to a live slot (perspective switches synthesise keys
    /// for elements that lack one).
    pub(crate) fn set_key(&mut self, slot: usize, key: Vec<u8>) {
        debug_assert!(slot >= self.head && self.elems[slot].is_some());
        self.keys[slot] = Some(key);
    }

    /// Map a logical offset from the head (0 = oldest live element) to an
    /// absolute slot. O(1) while no tombstones exist.
    pub(crate) fn slot_of(&self, offset: usize) -> Option<usize> {
        if offset >= self.len() {
            return None;
        }
        if self.tombstones == 0 {
            return Some(self.head + offset);
        }
        self.live_slots().nth(offset)
    }

    /// Absolute slot of the newest live element.
    pub(crate) fn last_slot(&self) -> Option<usize> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            self.slot_of(len - 1)
        }
    }

    /// Live slot indices in buffer order.
    pub(crate) fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (self.head..self.elems.len()).filter(|&i| self.elems[i].is_some())
    }

    /// Remove and return the newest live element.
    pub(crate) fn pop_back(&mut self) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        // Trailing tombstones can be reclaimed for free.
        while self.elems.len() > self.head && matches!(self.elems.last(), Some(None)) {
            self.elems.pop();
            self.keys.pop();
            self.tombstones -= 1;
        }
        if self.elems.len() == self.head {
            return None;
        }
        let bytes = self.elems.pop().flatten();
        let key = self.keys.pop().flatten();
        bytes.map(|b| (b, key))
    }

    /// Remove and return the oldest live element by advancing the head.
    /// Does not compact; callers decide when via [`Self::compact_if_slack`].
    pub(crate) fn pop_front(&mut self) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        // Step over tombstones; once the head passes them they are dead.
        while self.head < self.elems.len() && self.elems[self.head].is_none() {
            self.head += 1;
            self.tombstones -= 1;
        }
        if self.head == self.elems.len() {
            return None;
        }
        let bytes = self.elems[self.head].take()?;
        let key = self.keys[self.head].take();
        self.head += 1;
        Some((bytes, key))
    }

    /// Remove the element at an absolute slot, shifting later slots down.
    /// Callers holding slot-addressed state adjust for the shift themselves.
    pub(crate) fn remove_at(&mut self, slot: usize) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        if slot < self.head || slot >= self.elems.len() || self.elems[slot].is_none() {
            return None;
        }
        let bytes = self.elems.remove(slot);
        let key = self.keys.remove(slot);
        bytes.map(|b| (b, key))
    }

    /// Replace a live slot with a tombstone, returning its contents.
    pub(crate) fn tombstone_at(&mut self, slot: usize) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
        if slot < self.head || slot >= self.elems.len() {
            return None;
        }
        let bytes = self.elems[slot].take()?;
        let key = self.keys[slot].take();
        self.tombstones += 1;
        Some((bytes, key))
    }

    /// Drop the dead prefix when it has grown past the floor and half the
    /// buffer. Returns the shift applied to surviving slot numbers.
    pub(crate) fn compact_if_slack(&mut self) -> usize {
        if self.head > COMPACT_FLOOR && self.head > self.elems.len() / 2 {
            self.compact()
        } else {
            0
        }
    }

    /// Unconditionally drop the dead prefix. Returns the shift applied to
    /// surviving slot numbers.
    pub(crate) fn compact(&mut self) -> usize {
        let shift = self.head;
        if shift > 0 {
            self.elems.drain(..shift);
            self.keys.drain(..shift);
            self.head = 0;
        }
        shift
    }
}
