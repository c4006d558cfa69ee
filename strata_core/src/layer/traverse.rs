// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::{INVALID, LayerId};
use super::store::LayerStore;

/// An iterator over the direct children of a layer.
///
/// Created by [`LayerStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a LayerStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a LayerStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(self.store.id_at(idx))
    }
}

/// Depth-first pre-order walk over a subtree, including attached mask and
/// replica layers (visited right after their owner).
///
/// Created by [`LayerStore::descendants`].
#[derive(Debug)]
pub struct Descendants<'a> {
    store: &'a LayerStore,
    stack: alloc::vec::Vec<u32>,
}

impl<'a> Descendants<'a> {
    pub(crate) fn new(store: &'a LayerStore, root: u32) -> Self {
        Self {
            store,
            stack: alloc::vec![root],
        }
    }
}

impl Iterator for Descendants<'_> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        let idx = self.stack.pop()?;
        let store = self.store;

        // Push in reverse so the first child is visited first.
        let mut children = alloc::vec::Vec::new();
        let mut child = store.first_child[idx as usize];
        while child != INVALID {
            children.push(child);
            child = store.next_sibling[child as usize];
        }
        self.stack.extend(children.into_iter().rev());
        if store.replica[idx as usize] != INVALID {
            self.stack.push(store.replica[idx as usize]);
        }
        if store.mask[idx as usize] != INVALID {
            self.stack.push(store.mask[idx as usize]);
        }
        Some(store.id_at(idx))
    }
}
