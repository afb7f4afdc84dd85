// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slot container for per-peer endpoints.
//!
//! Destroying an entry empties its slot right away but leaves the slot in
//! place, so the indices of every other entry, and any cursor positioned
//! on them, stay valid. Empty slots are squeezed out only by an explicit
//! [`compact`](EndpointContainer::compact), which the owner runs once no
//! iteration is in progress.
//!
//! # Iteration while destroying
//!
//! ```
//! use peerbus::endpoint::container::{ContainerEntry, EndpointContainer};
//!
//! struct Peer(u32);
//! impl ContainerEntry for Peer {
//!     fn drop_connection(&mut self) {}
//! }
//!
//! let mut peers = EndpointContainer::with_limits(8, 1);
//! for n in 0..4 {
//!     peers.allocate(|| Ok::<_, std::io::Error>(Peer(n))).expect("room left");
//! }
//! let mut cur = peers.begin();
//! while let Some(index) = cur.index() {
//!     if peers.get(index).is_some_and(|p| p.0 % 2 == 0) {
//!         peers.destroy(index);
//!     }
//!     cur = peers.next(cur);
//! }
//! peers.compact();
//! assert_eq!(peers.get_full_container_size(), 2);
//! ```

use crate::config::{DEFAULT_ENDPOINT_HEADROOM, DEFAULT_MAX_ENDPOINTS};
use std::fmt;

/// Entries are told to close their link before they are dropped.
pub trait ContainerEntry {
    fn drop_connection(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// No room below the ceiling minus headroom.
    Full { ceiling: usize, headroom: usize },
    /// Index out of range or slot empty.
    NotFound { index: usize },
    /// The entry constructor failed; nothing was inserted.
    Allocator { reason: String },
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::Full { ceiling, headroom } => write!(
                f,
                "endpoint container full (ceiling {}, headroom {})",
                ceiling, headroom
            ),
            ContainerError::NotFound { index } => write!(f, "no endpoint at index {}", index),
            ContainerError::Allocator { reason } => {
                write!(f, "endpoint construction failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for ContainerError {}

/// Position in an [`EndpointContainer`] that does not borrow it.
///
/// There is exactly one end value, equal to `EndpointCursor::default()`; a
/// cursor is either on an occupied slot or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointCursor {
    index: Option<usize>,
}

impl EndpointCursor {
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_end(&self) -> bool {
        self.index.is_none()
    }
}

pub struct EndpointContainer<T: ContainerEntry> {
    slots: Vec<Option<Box<T>>>,
    needs_compact: bool,
    ceiling: usize,
    headroom: usize,
}

impl<T: ContainerEntry> EndpointContainer<T> {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ENDPOINTS, DEFAULT_ENDPOINT_HEADROOM)
    }

    pub fn with_limits(ceiling: usize, headroom: usize) -> Self {
        Self {
            slots: Vec::new(),
            needs_compact: false,
            ceiling,
            headroom,
        }
    }

    /// Construct an entry in a new slot at the end.
    ///
    /// Fails with `Full` (allocator not called) once [`full`](Self::full)
    /// holds, and with `Allocator` if the constructor fails.
    pub fn allocate<F, E>(&mut self, make: F) -> Result<usize, ContainerError>
    where
        F: FnOnce() -> Result<T, E>,
        E: fmt::Display,
    {
        if self.full() {
            return Err(ContainerError::Full {
                ceiling: self.ceiling,
                headroom: self.headroom,
            });
        }
        let entry = make().map_err(|e| ContainerError::Allocator {
            reason: e.to_string(),
        })?;
        self.slots.push(Some(Box::new(entry)));
        Ok(self.slots.len() - 1)
    }

    pub fn is_valid(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|s| s.as_deref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(|s| s.as_deref_mut())
    }

    pub fn try_get_mut(&mut self, index: usize) -> Result<&mut T, ContainerError> {
        self.get_mut(index).ok_or(ContainerError::NotFound { index })
    }

    /// Close and drop the entry at `index`. `false` if there was none.
    pub fn destroy(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        let Some(mut entry) = slot.take() else {
            return false;
        };
        entry.drop_connection();
        drop(entry);
        self.needs_compact = true;
        true
    }

    /// Destroy the entry living at `ptr`, found by identity.
    pub fn destroy_ptr(&mut self, ptr: *const T) -> bool {
        let found = self
            .slots
            .iter()
            .position(|s| s.as_deref().is_some_and(|e| std::ptr::eq(e, ptr)));
        match found {
            Some(index) => self.destroy(index),
            None => false,
        }
    }

    /// Squeeze out empty slots, keeping order. No-op unless something was
    /// destroyed since the last compaction.
    pub fn compact(&mut self) {
        if !self.needs_compact {
            return;
        }
        self.slots.retain(Option::is_some);
        self.needs_compact = false;
    }

    pub fn needs_compact(&self) -> bool {
        self.needs_compact
    }

    /// True once the slot count reaches `ceiling - headroom`.
    pub fn full(&self) -> bool {
        self.slots.len() >= self.ceiling.saturating_sub(self.headroom)
    }

    /// Slot count, empty slots included.
    pub fn get_full_container_size(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and drop every entry.
    pub fn clear(&mut self) {
        for mut entry in self.slots.drain(..).flatten() {
            entry.drop_connection();
        }
        self.needs_compact = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref().map(|e| (i, e)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_deref_mut().map(|e| (i, e)))
    }

    // === Cursor ===

    fn first_from(&self, start: usize) -> EndpointCursor {
        EndpointCursor {
            index: (start..self.slots.len()).find(|&i| self.is_valid(i)),
        }
    }

    /// Cursor on the first occupied slot, or the end cursor.
    pub fn begin(&self) -> EndpointCursor {
        self.first_from(0)
    }

    pub fn end(&self) -> EndpointCursor {
        EndpointCursor::default()
    }

    /// Cursor on the next occupied slot after `cursor`.
    pub fn next(&self, cursor: EndpointCursor) -> EndpointCursor {
        match cursor.index {
            Some(i) => self.first_from(i + 1),
            None => cursor,
        }
    }

    /// Entry under `cursor`, if it is still there.
    pub fn at(&self, cursor: EndpointCursor) -> Option<&T> {
        cursor.index.and_then(|i| self.get(i))
    }

    pub fn at_mut(&mut self, cursor: EndpointCursor) -> Option<&mut T> {
        cursor.index.and_then(|i| self.get_mut(i))
    }
}

impl<T: ContainerEntry> Default for EndpointContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ContainerEntry> Drop for EndpointContainer<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Entry {
        id: u32,
        closed: Rc<RefCell<Vec<u32>>>,
    }

    impl ContainerEntry for Entry {
        fn drop_connection(&mut self) {
            self.closed.borrow_mut().push(self.id);
        }
    }

    fn filled(n: u32) -> (EndpointContainer<Entry>, Rc<RefCell<Vec<u32>>>) {
        let closed = Rc::new(RefCell::new(Vec::new()));
        let mut c = EndpointContainer::with_limits(16, 1);
        for id in 0..n {
            let closed = Rc::clone(&closed);
            c.allocate(|| Ok::<_, String>(Entry { id, closed }))
                .expect("allocate should succeed");
        }
        (c, closed)
    }

    #[test]
    fn test_destroy_keeps_other_indices() {
        let (mut c, closed) = filled(4);
        assert!(c.destroy(1));
        assert!(!c.destroy(1));
        assert!(!c.destroy(99));
        assert_eq!(*closed.borrow(), vec![1]);
        assert!(!c.is_valid(1));
        assert_eq!(c.get(2).map(|p| p.id), Some(2));
        assert_eq!(c.get_full_container_size(), 4);
        assert_eq!(c.len(), 3);
        assert!(c.needs_compact());
    }

    #[test]
    fn test_compact_preserves_order() {
        let (mut c, _) = filled(5);
        c.destroy(0);
        c.destroy(3);
        let before: Vec<u32> = c.iter().map(|(_, p)| p.id).collect();
        c.compact();
        let after: Vec<u32> = c.iter().map(|(_, p)| p.id).collect();
        assert_eq!(before, after);
        assert_eq!(after, vec![1, 2, 4]);
        assert_eq!(c.get_full_container_size(), 3);
        assert!(!c.needs_compact());
    }

    #[test]
    fn test_full_trips_before_ceiling() {
        let closed = Rc::new(RefCell::new(Vec::new()));
        let mut c = EndpointContainer::with_limits(4, 1);
        for id in 0..3 {
            assert!(!c.full());
            let closed = Rc::clone(&closed);
            c.allocate(|| Ok::<_, String>(Entry { id, closed }))
                .expect("allocate should succeed");
        }
        assert!(c.full());
        let called = std::cell::Cell::new(false);
        let err = c
            .allocate(|| {
                called.set(true);
                Err::<Entry, _>("unreachable")
            })
            .unwrap_err();
        assert_eq!(
            err,
            ContainerError::Full {
                ceiling: 4,
                headroom: 1
            }
        );
        assert!(!called.get());
        assert_eq!(c.iter().map(|(_, p)| p.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_allocator_failure_inserts_nothing() {
        let mut c: EndpointContainer<Entry> = EndpointContainer::with_limits(4, 0);
        let err = c.allocate(|| Err::<Entry, _>("refused")).unwrap_err();
        assert_eq!(
            err,
            ContainerError::Allocator {
                reason: "refused".into()
            }
        );
        assert_eq!(c.get_full_container_size(), 0);
    }

    #[test]
    fn test_destroy_ptr_by_identity() {
        let (mut c, closed) = filled(3);
        let ptr: *const Entry = c.get(2).expect("entry 2 exists");
        assert!(c.destroy_ptr(ptr));
        assert!(!c.destroy_ptr(ptr));
        assert_eq!(*closed.borrow(), vec![2]);
    }

    #[test]
    fn test_cursor_skips_empty_and_ends_at_default() {
        let (mut c, _) = filled(4);
        c.destroy(0);
        c.destroy(2);
        let mut seen = Vec::new();
        let mut cur = c.begin();
        while !cur.is_end() {
            seen.push(c.at(cur).map(|p| p.id));
            cur = c.next(cur);
        }
        assert_eq!(seen, vec![Some(1), Some(3)]);
        assert_eq!(cur, c.end());
        assert_eq!(c.next(cur), EndpointCursor::default());
    }

    #[test]
    fn test_destroy_current_during_cursor_walk() {
        let (mut c, closed) = filled(4);
        let mut cur = c.begin();
        while let Some(i) = cur.index() {
            c.destroy(i);
            assert!(c.at(cur).is_none());
            cur = c.next(cur);
        }
        assert!(c.is_empty());
        assert_eq!(*closed.borrow(), vec![0, 1, 2, 3]);
        c.compact();
        assert_eq!(c.begin(), c.end());
    }

    #[test]
    fn test_clear_drops_connections() {
        let (mut c, closed) = filled(3);
        c.destroy(1);
        c.clear();
        assert_eq!(*closed.borrow(), vec![1, 0, 2]);
        assert_eq!(c.get_full_container_size(), 0);
    }
}
