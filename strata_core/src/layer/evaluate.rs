// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Evaluation and change tracking for the pending tree.
//!
//! Evaluation follows a drain-recompute pattern for each dirty channel:
//!
//! 1. **TRANSFORM**: drain dirty indices and recompute `world_transform` as
//!    `basis * local_matrix`, where the basis is the parent's world transform
//!    translated by the parent's negated scroll offset (or the owner's world
//!    transform for mask and replica layers). `effective_hidden` is
//!    recomputed against the same basis layer.
//! 2. **OPACITY**: drain and recompute `effective_opacity`.
//! 3. **CLIP**: drain with propagation, so re-clipping a layer reports its
//!    whole subtree.
//! 4. **CONTENT** / **EFFECTS**: drain local-only changes.
//! 5. **TOPOLOGY**: drain and discard (the traversal order was already
//!    rebuilt at the start of evaluation if needed).
//!
//! [`LayerChanges`] uses raw slot indices (`u32`) rather than
//! [`LayerId`](super::LayerId) handles. Consumers resolve them against the
//! store's current slots with [`LayerStore::layer_id_at`] and check
//! liveness, since a slot freed after evaluation may have been reused.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use super::id::INVALID;
use super::local_matrix;
use super::store::LayerStore;
use crate::dirty;
use crate::transform::Transform3d;

/// The set of changes produced by a single [`LayerStore::evaluate`] call.
#[derive(Clone, Debug, Default)]
pub struct LayerChanges {
    /// Layers whose world transform was recomputed.
    pub transforms: Vec<u32>,
    /// Layers whose effective opacity was recomputed.
    pub opacities: Vec<u32>,
    /// Layers whose clip (own or inherited) changed.
    pub clips: Vec<u32>,
    /// Layers whose content description changed.
    pub content: Vec<u32>,
    /// Layers whose filter, mask, or replica changed.
    pub effects: Vec<u32>,
    /// Layers that transitioned from visible to effectively hidden.
    pub hidden: Vec<u32>,
    /// Layers that transitioned from effectively hidden to visible.
    pub unhidden: Vec<u32>,
    /// Layers added since the last evaluate.
    pub added: Vec<u32>,
    /// Layers removed since the last evaluate.
    pub removed: Vec<u32>,
    /// Whether the tree topology changed (traversal order was rebuilt).
    pub topology_changed: bool,
}

impl LayerChanges {
    /// Clears all change lists.
    pub fn clear(&mut self) {
        self.transforms.clear();
        self.opacities.clear();
        self.clips.clear();
        self.content.clear();
        self.effects.clear();
        self.hidden.clear();
        self.unhidden.clear();
        self.added.clear();
        self.removed.clear();
        self.topology_changed = false;
    }

    /// Appends the changes in `other`, so one set can span several
    /// evaluations.
    pub fn merge(&mut self, other: &Self) {
        self.transforms.extend_from_slice(&other.transforms);
        self.opacities.extend_from_slice(&other.opacities);
        self.clips.extend_from_slice(&other.clips);
        self.content.extend_from_slice(&other.content);
        self.effects.extend_from_slice(&other.effects);
        self.hidden.extend_from_slice(&other.hidden);
        self.unhidden.extend_from_slice(&other.unhidden);
        self.added.extend_from_slice(&other.added);
        self.removed.extend_from_slice(&other.removed);
        self.topology_changed |= other.topology_changed;
    }

    /// Returns every live slot with at least one property change.
    #[must_use]
    pub fn touched(&self) -> BTreeSet<u32> {
        let removed: BTreeSet<u32> = self.removed.iter().copied().collect();
        self.transforms
            .iter()
            .chain(&self.opacities)
            .chain(&self.clips)
            .chain(&self.content)
            .chain(&self.effects)
            .chain(&self.hidden)
            .chain(&self.unhidden)
            .chain(&self.added)
            .copied()
            .filter(|idx| !removed.contains(idx))
            .collect()
    }

    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.topology_changed
            && self.transforms.is_empty()
            && self.opacities.is_empty()
            && self.clips.is_empty()
            && self.content.is_empty()
            && self.effects.is_empty()
            && self.hidden.is_empty()
            && self.unhidden.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }
}

impl LayerStore {
    /// Evaluates the layer tree, recomputing dirty properties and returning
    /// the set of changes.
    pub fn evaluate(&mut self) -> LayerChanges {
        let mut changes = LayerChanges::default();
        self.evaluate_into(&mut changes);
        changes
    }

    /// Like [`evaluate`](Self::evaluate), but reuses a caller-provided buffer
    /// to avoid allocation.
    pub fn evaluate_into(&mut self, changes: &mut LayerChanges) {
        changes.clear();

        if self.traversal_dirty {
            self.rebuild_traversal_order();
            changes.topology_changed = true;
            self.traversal_dirty = false;
        }

        let dirty_transforms: Vec<u32> = self
            .dirty
            .drain(dirty::TRANSFORM)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_transforms {
            let i = idx as usize;
            let p = self.parent[i];
            let owner = self.attached_to[i];
            let (basis, inherited_hidden) = if p != INVALID {
                let scroll = Transform3d::from_offset(-self.scroll_offset[p as usize]);
                (
                    self.world_transform[p as usize] * scroll,
                    self.effective_hidden[p as usize],
                )
            } else if owner != INVALID {
                (
                    self.world_transform[owner as usize],
                    self.effective_hidden[owner as usize],
                )
            } else {
                (Transform3d::IDENTITY, false)
            };
            self.world_transform[i] = basis
                * local_matrix(
                    self.position[i],
                    self.anchor_point[i],
                    self.bounds[i],
                    &self.local_transform[i],
                );

            let new_hidden = inherited_hidden || self.flags[i].hidden;
            if new_hidden != self.effective_hidden[i] {
                if new_hidden {
                    changes.hidden.push(idx);
                } else {
                    changes.unhidden.push(idx);
                }
                self.effective_hidden[i] = new_hidden;
            }
        }
        changes.transforms = dirty_transforms;

        let dirty_opacities: Vec<u32> = self
            .dirty
            .drain(dirty::OPACITY)
            .affected()
            .deterministic()
            .run()
            .collect();
        for &idx in &dirty_opacities {
            let basis = self.inherit_from(idx);
            let inherited = if basis != INVALID {
                self.effective_opacity[basis as usize]
            } else {
                1.0
            };
            self.effective_opacity[idx as usize] = inherited * self.local_opacity[idx as usize];
        }
        changes.opacities = dirty_opacities;

        changes.clips = self
            .dirty
            .drain(dirty::CLIP)
            .affected()
            .deterministic()
            .run()
            .collect();

        changes.content = self
            .dirty
            .drain(dirty::CONTENT)
            .deterministic()
            .run()
            .collect();

        changes.effects = self
            .dirty
            .drain(dirty::EFFECTS)
            .deterministic()
            .run()
            .collect();

        let _: Vec<u32> = self
            .dirty
            .drain(dirty::TOPOLOGY)
            .deterministic()
            .run()
            .collect();

        core::mem::swap(&mut self.pending_added, &mut changes.added);
        core::mem::swap(&mut self.pending_removed, &mut changes.removed);
    }

    /// Returns the current traversal order (depth-first pre-order, with mask
    /// and replica layers right after their owner).
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called at least
    /// once.
    #[must_use]
    pub fn traversal_order(&self) -> &[u32] {
        &self.traversal_order
    }

    fn rebuild_traversal_order(&mut self) {
        self.traversal_order.clear();
        let mut stack = Vec::new();
        for root in (0..self.len).rev() {
            if self.is_root_slot(root) {
                stack.push(root);
            }
        }
        while let Some(idx) = stack.pop() {
            self.traversal_order.push(idx);
            let i = idx as usize;
            let first = stack.len();
            if self.mask[i] != INVALID {
                stack.push(self.mask[i]);
            }
            if self.replica[i] != INVALID {
                stack.push(self.replica[i]);
            }
            let mut child = self.first_child[i];
            while child != INVALID {
                stack.push(child);
                child = self.next_sibling[child as usize];
            }
            stack[first..].reverse();
        }
    }
}
