// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays layer storage with allocation, topology, and property management.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};
use understory_dirty::{CycleHandling, DirtyTracker, EagerPolicy};

use crate::animation::Animation;
use crate::dirty;
use crate::geometry;
use crate::transform::Transform3d;

use super::content::{FilterOp, LayerContent};
use super::id::{INVALID, LayerId};
use super::traverse::{Children, Descendants};

/// Per-layer boolean flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerFlags {
    /// Whether the layer (and its subtree) is hidden. Hidden subtrees are
    /// synchronized but never drawn.
    pub hidden: bool,
    /// Whether descendants are clipped to this layer's bounds.
    pub masks_to_bounds: bool,
    /// Whether the layer promises to fill its bounds with opaque pixels.
    pub contents_opaque: bool,
    /// Whether the compositor may scroll this layer.
    pub scrollable: bool,
}

/// Snapshot of every property the synchronizer pushes to the impl tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerProperties {
    /// Top-left corner of the untransformed layer in its parent's sublayer
    /// space.
    pub position: Point,
    /// Transform origin as a fraction of bounds.
    pub anchor_point: Point,
    /// Layer size.
    pub bounds: Size,
    /// Local transform, applied about the anchor point.
    pub transform: Transform3d,
    /// Local opacity.
    pub opacity: f32,
    /// What the layer draws.
    pub content: LayerContent,
    /// Boolean flags.
    pub flags: LayerFlags,
    /// Optional filter applied through a render surface.
    pub filter: Option<FilterOp>,
    /// Client scroll offset, applied to children.
    pub scroll_offset: Vec2,
    /// Largest allowed scroll offset.
    pub max_scroll_offset: Vec2,
}

/// Struct-of-arrays storage for the client-side (pending) layer tree.
///
/// Layers are addressed by [`LayerId`] handles. Internally, each layer occupies
/// a slot in parallel arrays. Destroyed layers are recycled via a free list,
/// and generation counters prevent stale handle access.
///
/// Mask and replica layers are attached to an owner rather than parented:
/// they never appear in a child list, and a layer can be attached to at most
/// one owner at a time.
#[derive(Debug)]
pub struct LayerStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,
    pub(crate) mask: Vec<u32>,
    pub(crate) replica: Vec<u32>,
    pub(crate) attached_to: Vec<u32>,

    // -- Local properties (set by callers) --
    pub(crate) position: Vec<Point>,
    pub(crate) anchor_point: Vec<Point>,
    pub(crate) bounds: Vec<Size>,
    pub(crate) local_transform: Vec<Transform3d>,
    pub(crate) local_opacity: Vec<f32>,
    pub(crate) content: Vec<LayerContent>,
    pub(crate) flags: Vec<LayerFlags>,
    pub(crate) filter: Vec<Option<FilterOp>>,
    pub(crate) scroll_offset: Vec<Vec2>,
    pub(crate) max_scroll_offset: Vec<Vec2>,
    pub(crate) update_rect: Vec<Rect>,

    // -- Computed properties (written by evaluate) --
    pub(crate) world_transform: Vec<Transform3d>,
    pub(crate) effective_opacity: Vec<f32>,
    pub(crate) effective_hidden: Vec<bool>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Dirty tracking --
    pub(crate) dirty: DirtyTracker<u32>,

    // -- Traversal cache --
    pub(crate) traversal_order: Vec<u32>,
    pub(crate) traversal_dirty: bool,

    // -- Lifecycle tracking --
    pub(crate) pending_added: Vec<u32>,
    pub(crate) pending_removed: Vec<u32>,
    pub(crate) pending_animations: Vec<(LayerId, Animation)>,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Default anchor point: the center of the layer.
const DEFAULT_ANCHOR: Point = Point::new(0.5, 0.5);

impl LayerStore {
    /// Creates an empty layer store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            mask: Vec::new(),
            replica: Vec::new(),
            attached_to: Vec::new(),
            position: Vec::new(),
            anchor_point: Vec::new(),
            bounds: Vec::new(),
            local_transform: Vec::new(),
            local_opacity: Vec::new(),
            content: Vec::new(),
            flags: Vec::new(),
            filter: Vec::new(),
            scroll_offset: Vec::new(),
            max_scroll_offset: Vec::new(),
            update_rect: Vec::new(),
            world_transform: Vec::new(),
            effective_opacity: Vec::new(),
            effective_hidden: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            traversal_order: Vec::new(),
            traversal_dirty: true,
            pending_added: Vec::new(),
            pending_removed: Vec::new(),
            pending_animations: Vec::new(),
        }
    }

    // -- Allocation API --

    /// Creates a new layer and returns its handle.
    ///
    /// The layer starts at the origin with zero bounds, a centered anchor
    /// point, an identity transform, full opacity, no content, and no parent.
    pub fn create_layer(&mut self) -> LayerId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.generation[i] += 1;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.mask[i] = INVALID;
            self.replica[i] = INVALID;
            self.attached_to[i] = INVALID;
            self.position[i] = Point::ORIGIN;
            self.anchor_point[i] = DEFAULT_ANCHOR;
            self.bounds[i] = Size::ZERO;
            self.local_transform[i] = Transform3d::IDENTITY;
            self.local_opacity[i] = 1.0;
            self.content[i] = LayerContent::Empty;
            self.flags[i] = LayerFlags::default();
            self.filter[i] = None;
            self.scroll_offset[i] = Vec2::ZERO;
            self.max_scroll_offset[i] = Vec2::ZERO;
            self.update_rect[i] = Rect::ZERO;
            self.world_transform[i] = Transform3d::IDENTITY;
            self.effective_opacity[i] = 1.0;
            self.effective_hidden[i] = false;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.mask.push(INVALID);
            self.replica.push(INVALID);
            self.attached_to.push(INVALID);
            self.position.push(Point::ORIGIN);
            self.anchor_point.push(DEFAULT_ANCHOR);
            self.bounds.push(Size::ZERO);
            self.local_transform.push(Transform3d::IDENTITY);
            self.local_opacity.push(1.0);
            self.content.push(LayerContent::Empty);
            self.flags.push(LayerFlags::default());
            self.filter.push(None);
            self.scroll_offset.push(Vec2::ZERO);
            self.max_scroll_offset.push(Vec2::ZERO);
            self.update_rect.push(Rect::ZERO);
            self.world_transform.push(Transform3d::IDENTITY);
            self.effective_opacity.push(1.0);
            self.effective_hidden.push(false);
            self.generation.push(0);
            idx
        };

        self.traversal_dirty = true;
        self.pending_added.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);

        self.id_at(idx)
    }

    /// Destroys a layer, freeing its slot for reuse.
    ///
    /// A layer attached as a mask or replica is detached from its owner
    /// first.
    ///
    /// # Panics
    ///
    /// Panics if the layer has children or an attached mask or replica
    /// (remove them first), or if the handle is stale.
    pub fn destroy_layer(&mut self, id: LayerId) {
        self.validate(id);
        let idx = id.idx;
        let i = idx as usize;
        assert!(
            self.first_child[i] == INVALID,
            "cannot destroy layer with children"
        );
        assert!(
            self.mask[i] == INVALID && self.replica[i] == INVALID,
            "cannot destroy layer with an attached mask or replica"
        );

        if self.parent[i] != INVALID {
            self.unlink_from_parent(idx);
        }
        if self.attached_to[i] != INVALID {
            self.detach_from_owner(idx);
        }

        self.dirty.remove_key(idx);
        self.pending_animations.retain(|(owner, _)| *owner != id);

        // Bump generation so old handles immediately fail validation.
        self.generation[i] += 1;

        self.free_list.push(idx);
        self.traversal_dirty = true;
        self.pending_removed.push(idx);
        self.dirty.mark(idx, dirty::TOPOLOGY);
    }

    /// Returns whether the given handle refers to a live layer.
    #[must_use]
    pub fn is_alive(&self, id: LayerId) -> bool {
        (id.idx < self.len)
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    /// Returns the number of live layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.len as usize - self.free_list.len()
    }

    // -- Topology API --

    /// Adds `child` as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, if `child` already has a parent or is
    /// attached as a mask or replica, or if `child` is an ancestor of
    /// `parent`.
    pub fn add_child(&mut self, parent: LayerId, child: LayerId) {
        self.validate(parent);
        self.validate(child);
        let c = child.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );
        assert!(
            self.attached_to[c as usize] == INVALID,
            "child is attached as a mask or replica"
        );
        self.assert_acyclic(parent.idx, c);
        self.link_last_child(parent.idx, c);
    }

    /// Removes `child` from its current parent.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the layer has no parent.
    pub fn remove_from_parent(&mut self, child: LayerId) {
        self.validate(child);
        let c = child.idx;
        assert!(self.parent[c as usize] != INVALID, "layer has no parent");

        let p = self.parent[c as usize];
        self.unlink_from_parent(c);
        self.remove_inherited_dependencies(c, p);

        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Moves `child` to be the last child of `new_parent`.
    ///
    /// If `child` already has a parent, it is removed first.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, if `child` is attached as a mask or
    /// replica, or if `child` is an ancestor of `new_parent`.
    pub fn reparent(&mut self, child: LayerId, new_parent: LayerId) {
        self.validate(child);
        self.validate(new_parent);
        let c = child.idx;
        assert!(
            self.attached_to[c as usize] == INVALID,
            "child is attached as a mask or replica"
        );
        self.assert_acyclic(new_parent.idx, c);

        if self.parent[c as usize] != INVALID {
            let old_p = self.parent[c as usize];
            self.unlink_from_parent(c);
            self.remove_inherited_dependencies(c, old_p);
            self.dirty.mark(old_p, dirty::TOPOLOGY);
        }

        self.link_last_child(new_parent.idx, c);
    }

    /// Inserts `child` before `sibling` in the sibling list.
    ///
    /// # Panics
    ///
    /// Panics if handles are stale, `child` already has a parent, `sibling`
    /// has no parent, or the insertion would create a cycle.
    pub fn insert_before(&mut self, child: LayerId, sibling: LayerId) {
        self.validate(child);
        self.validate(sibling);
        let c = child.idx;
        let s = sibling.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );
        assert!(
            self.attached_to[c as usize] == INVALID,
            "child is attached as a mask or replica"
        );
        let p = self.parent[s as usize];
        assert!(p != INVALID, "sibling has no parent");
        self.assert_acyclic(p, c);

        self.parent[c as usize] = p;
        self.next_sibling[c as usize] = s;
        self.prev_sibling[c as usize] = self.prev_sibling[s as usize];

        if self.prev_sibling[s as usize] != INVALID {
            self.next_sibling[self.prev_sibling[s as usize] as usize] = c;
        } else {
            self.first_child[p as usize] = c;
        }
        self.prev_sibling[s as usize] = c;

        self.add_inherited_dependencies(c, p);
        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    /// Attaches `mask` as the mask layer of `owner`, replacing any previous
    /// mask, or detaches the current mask when `None`.
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, if `mask` is parented or attached
    /// elsewhere, or if `mask` is an ancestor of `owner`.
    pub fn set_mask(&mut self, owner: LayerId, mask: Option<LayerId>) {
        self.validate(owner);
        let current = self.mask[owner.idx as usize];
        if current != INVALID {
            self.detach_from_owner(current);
        }
        if let Some(mask) = mask {
            self.attach(owner, mask);
            self.mask[owner.idx as usize] = mask.idx;
        }
        self.dirty.mark(owner.idx, dirty::EFFECTS);
    }

    /// Attaches `replica` as the replica layer of `owner`, replacing any
    /// previous replica, or detaches the current replica when `None`.
    ///
    /// The replica's geometry positions a transformed copy of the owner's
    /// subtree; a replica may carry its own mask.
    ///
    /// # Panics
    ///
    /// Same as [`set_mask`](Self::set_mask).
    pub fn set_replica(&mut self, owner: LayerId, replica: Option<LayerId>) {
        self.validate(owner);
        let current = self.replica[owner.idx as usize];
        if current != INVALID {
            self.detach_from_owner(current);
        }
        if let Some(replica) = replica {
            self.attach(owner, replica);
            self.replica[owner.idx as usize] = replica.idx;
        }
        self.dirty.mark(owner.idx, dirty::EFFECTS);
    }

    /// Returns the parent of a layer, if any.
    #[must_use]
    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        self.opt_id(self.parent[id.idx as usize])
    }

    /// Returns the layer this one is attached to as a mask or replica.
    #[must_use]
    pub fn attached_to(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        self.opt_id(self.attached_to[id.idx as usize])
    }

    /// Returns the mask layer of `id`.
    #[must_use]
    pub fn mask(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        self.opt_id(self.mask[id.idx as usize])
    }

    /// Returns the replica layer of `id`.
    #[must_use]
    pub fn replica(&self, id: LayerId) -> Option<LayerId> {
        self.validate(id);
        self.opt_id(self.replica[id.idx as usize])
    }

    /// Returns an iterator over the direct children of a layer.
    #[must_use]
    pub fn children(&self, id: LayerId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns a pre-order iterator over `id` and everything below it,
    /// including attached mask and replica layers.
    #[must_use]
    pub fn descendants(&self, id: LayerId) -> Descendants<'_> {
        self.validate(id);
        Descendants::new(self, id.idx)
    }

    /// Returns the root layers (no parent, not attached to an owner).
    #[must_use]
    pub fn roots(&self) -> Vec<LayerId> {
        (0..self.len)
            .filter(|&idx| self.is_root_slot(idx))
            .map(|idx| self.id_at(idx))
            .collect()
    }

    // -- Property getters (read-only, no dirty marking) --

    /// Returns every pushable property of a layer.
    #[must_use]
    pub fn properties(&self, id: LayerId) -> LayerProperties {
        self.validate(id);
        let i = id.idx as usize;
        LayerProperties {
            position: self.position[i],
            anchor_point: self.anchor_point[i],
            bounds: self.bounds[i],
            transform: self.local_transform[i],
            opacity: self.local_opacity[i],
            content: self.content[i],
            flags: self.flags[i],
            filter: self.filter[i],
            scroll_offset: self.scroll_offset[i],
            max_scroll_offset: self.max_scroll_offset[i],
        }
    }

    /// Returns the position of a layer.
    #[must_use]
    pub fn position(&self, id: LayerId) -> Point {
        self.validate(id);
        self.position[id.idx as usize]
    }

    /// Returns the bounds of a layer.
    #[must_use]
    pub fn bounds(&self, id: LayerId) -> Size {
        self.validate(id);
        self.bounds[id.idx as usize]
    }

    /// Returns the local transform of a layer.
    #[must_use]
    pub fn local_transform(&self, id: LayerId) -> Transform3d {
        self.validate(id);
        self.local_transform[id.idx as usize]
    }

    /// Returns the local opacity of a layer.
    #[must_use]
    pub fn local_opacity(&self, id: LayerId) -> f32 {
        self.validate(id);
        self.local_opacity[id.idx as usize]
    }

    /// Returns the content description of a layer.
    #[must_use]
    pub fn content(&self, id: LayerId) -> LayerContent {
        self.validate(id);
        self.content[id.idx as usize]
    }

    /// Returns the flags of a layer.
    #[must_use]
    pub fn flags(&self, id: LayerId) -> LayerFlags {
        self.validate(id);
        self.flags[id.idx as usize]
    }

    /// Returns the filter of a layer.
    #[must_use]
    pub fn filter(&self, id: LayerId) -> Option<FilterOp> {
        self.validate(id);
        self.filter[id.idx as usize]
    }

    /// Returns the scroll offset of a layer.
    #[must_use]
    pub fn scroll_offset(&self, id: LayerId) -> Vec2 {
        self.validate(id);
        self.scroll_offset[id.idx as usize]
    }

    /// Returns the accumulated, not yet committed, repaint rect.
    #[must_use]
    pub fn update_rect(&self, id: LayerId) -> Rect {
        self.validate(id);
        self.update_rect[id.idx as usize]
    }

    /// Returns the computed world transform of a layer.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn world_transform(&self, id: LayerId) -> Transform3d {
        self.validate(id);
        self.world_transform[id.idx as usize]
    }

    /// Returns the computed effective opacity of a layer.
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn effective_opacity(&self, id: LayerId) -> f32 {
        self.validate(id);
        self.effective_opacity[id.idx as usize]
    }

    /// Returns whether the layer is effectively hidden (including by an
    /// ancestor's hidden flag).
    ///
    /// Only valid after [`evaluate`](Self::evaluate) has been called.
    #[must_use]
    pub fn effective_hidden(&self, id: LayerId) -> bool {
        self.validate(id);
        self.effective_hidden[id.idx as usize]
    }

    // -- Mutation API (auto-marks dirty) --

    /// Sets the position (top-left corner in the parent's sublayer space).
    pub fn set_position(&mut self, id: LayerId, position: Point) {
        self.validate(id);
        self.position[id.idx as usize] = position;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the anchor point (transform origin as a fraction of bounds).
    pub fn set_anchor_point(&mut self, id: LayerId, anchor: Point) {
        self.validate(id);
        self.anchor_point[id.idx as usize] = anchor;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the bounds of a layer.
    pub fn set_bounds(&mut self, id: LayerId, bounds: Size) {
        self.validate(id);
        self.bounds[id.idx as usize] = bounds;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the local transform of a layer.
    ///
    /// Marks the TRANSFORM channel dirty with eager propagation to descendants.
    pub fn set_transform(&mut self, id: LayerId, transform: Transform3d) {
        self.validate(id);
        self.local_transform[id.idx as usize] = transform;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the local opacity of a layer.
    ///
    /// Marks the OPACITY channel dirty with eager propagation to descendants.
    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) {
        self.validate(id);
        self.local_opacity[id.idx as usize] = opacity;
        self.dirty.mark_with(id.idx, dirty::OPACITY, &EagerPolicy);
    }

    /// Sets the content description of a layer.
    ///
    /// Changing content also requests a full repaint of the layer.
    pub fn set_content(&mut self, id: LayerId, content: LayerContent) {
        self.validate(id);
        let i = id.idx as usize;
        self.content[i] = content;
        self.update_rect[i] = Rect::from_origin_size(Point::ORIGIN, self.bounds[i]);
        self.dirty.mark(id.idx, dirty::CONTENT);
    }

    /// Sets the flags of a layer, marking only the channels whose flags
    /// actually changed.
    pub fn set_flags(&mut self, id: LayerId, flags: LayerFlags) {
        self.validate(id);
        let old = self.flags[id.idx as usize];
        self.flags[id.idx as usize] = flags;
        if old.hidden != flags.hidden || old.scrollable != flags.scrollable {
            self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
        }
        if old.masks_to_bounds != flags.masks_to_bounds {
            self.dirty.mark_with(id.idx, dirty::CLIP, &EagerPolicy);
        }
        if old.contents_opaque != flags.contents_opaque {
            self.dirty.mark(id.idx, dirty::CONTENT);
        }
    }

    /// Sets or clears the layer's filter.
    pub fn set_filter(&mut self, id: LayerId, filter: Option<FilterOp>) {
        self.validate(id);
        self.filter[id.idx as usize] = filter;
        self.dirty.mark(id.idx, dirty::EFFECTS);
    }

    /// Sets the scroll offset, which translates the layer's children.
    pub fn set_scroll_offset(&mut self, id: LayerId, offset: Vec2) {
        self.validate(id);
        self.scroll_offset[id.idx as usize] = offset;
        self.dirty.mark_with(id.idx, dirty::TRANSFORM, &EagerPolicy);
    }

    /// Sets the largest allowed scroll offset.
    pub fn set_max_scroll_offset(&mut self, id: LayerId, max: Vec2) {
        self.validate(id);
        self.max_scroll_offset[id.idx as usize] = max;
    }

    /// Requests a repaint of the whole layer.
    pub fn set_needs_display(&mut self, id: LayerId) {
        self.validate(id);
        let full = Rect::from_origin_size(Point::ORIGIN, self.bounds[id.idx as usize]);
        self.set_needs_display_rect(id, full);
    }

    /// Requests a repaint of `rect` (layer space).
    pub fn set_needs_display_rect(&mut self, id: LayerId, rect: Rect) {
        self.validate(id);
        let i = id.idx as usize;
        self.update_rect[i] = geometry::union(self.update_rect[i], rect);
    }

    /// Queues an animation to be handed to the compositor at the next commit.
    pub fn add_animation(&mut self, id: LayerId, animation: Animation) {
        self.validate(id);
        self.pending_animations.push((id, animation));
    }

    /// Takes and clears the accumulated repaint rect of a layer.
    pub fn take_update_rect(&mut self, id: LayerId) -> Rect {
        self.validate(id);
        core::mem::replace(&mut self.update_rect[id.idx as usize], Rect::ZERO)
    }

    /// Takes every animation queued since the last call.
    pub fn take_pending_animations(&mut self) -> Vec<(LayerId, Animation)> {
        core::mem::take(&mut self.pending_animations)
    }

    // -- Raw-index accessors --

    /// Returns the handle currently occupying raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn layer_id_at(&self, idx: u32) -> LayerId {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        self.id_at(idx)
    }

    /// Returns the computed world transform at raw slot `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= self.len`.
    #[must_use]
    pub fn world_transform_at(&self, idx: u32) -> Transform3d {
        assert!(
            idx < self.len,
            "slot index {idx} out of range (len {})",
            self.len
        );
        self.world_transform[idx as usize]
    }

    // -- Internal helpers --

    #[inline]
    pub(crate) fn id_at(&self, idx: u32) -> LayerId {
        LayerId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    fn opt_id(&self, idx: u32) -> Option<LayerId> {
        (idx != INVALID).then(|| self.id_at(idx))
    }

    pub(crate) fn is_root_slot(&self, idx: u32) -> bool {
        self.parent[idx as usize] == INVALID
            && self.attached_to[idx as usize] == INVALID
            && !self.free_list.contains(&idx)
    }

    /// Returns the slot a layer inherits geometry and opacity from: its
    /// parent, or its owner when attached as a mask or replica.
    pub(crate) fn inherit_from(&self, idx: u32) -> u32 {
        let p = self.parent[idx as usize];
        if p != INVALID {
            p
        } else {
            self.attached_to[idx as usize]
        }
    }

    /// Panics if the handle is stale.
    fn validate(&self, id: LayerId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale LayerId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    /// Panics if `node` is `ancestor` or one of its ancestors.
    fn assert_acyclic(&self, ancestor: u32, node: u32) {
        let mut cur = ancestor;
        while cur != INVALID {
            assert!(cur != node, "adding child would create a cycle");
            cur = self.inherit_from(cur);
        }
    }

    fn link_last_child(&mut self, p: u32, c: u32) {
        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        self.add_inherited_dependencies(c, p);
        self.mark_subtree_inherited_dirty(c);
        self.traversal_dirty = true;
        self.dirty.mark(p, dirty::TOPOLOGY);
    }

    fn attach(&mut self, owner: LayerId, layer: LayerId) {
        self.validate(layer);
        let l = layer.idx;
        assert!(
            self.parent[l as usize] == INVALID,
            "mask or replica layer already has a parent"
        );
        assert!(
            self.attached_to[l as usize] == INVALID,
            "mask or replica layer is already attached"
        );
        self.assert_acyclic(owner.idx, l);

        self.attached_to[l as usize] = owner.idx;
        self.add_inherited_dependencies(l, owner.idx);
        self.mark_subtree_inherited_dirty(l);
        self.traversal_dirty = true;
        self.dirty.mark(owner.idx, dirty::TOPOLOGY);
    }

    fn detach_from_owner(&mut self, idx: u32) {
        let owner = self.attached_to[idx as usize];
        if self.mask[owner as usize] == idx {
            self.mask[owner as usize] = INVALID;
        }
        if self.replica[owner as usize] == idx {
            self.replica[owner as usize] = INVALID;
        }
        self.attached_to[idx as usize] = INVALID;
        self.remove_inherited_dependencies(idx, owner);
        self.mark_subtree_inherited_dirty(idx);
        self.traversal_dirty = true;
        self.dirty.mark(owner, dirty::EFFECTS);
        self.dirty.mark(owner, dirty::TOPOLOGY);
    }

    /// Removes `idx` from its parent's child list without touching dirty state.
    fn unlink_from_parent(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            self.first_child[p as usize] = next;
        }

        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }

        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;
    }

    fn add_inherited_dependencies(&mut self, c: u32, p: u32) {
        let _ = self.dirty.add_dependency(c, p, dirty::TRANSFORM);
        let _ = self.dirty.add_dependency(c, p, dirty::OPACITY);
        let _ = self.dirty.add_dependency(c, p, dirty::CLIP);
    }

    fn remove_inherited_dependencies(&mut self, c: u32, p: u32) {
        self.dirty.remove_dependency(c, p, dirty::TRANSFORM);
        self.dirty.remove_dependency(c, p, dirty::OPACITY);
        self.dirty.remove_dependency(c, p, dirty::CLIP);
    }

    /// Marks the subtree rooted at `idx` dirty for inherited channels.
    fn mark_subtree_inherited_dirty(&mut self, idx: u32) {
        self.dirty.mark_with(idx, dirty::TRANSFORM, &EagerPolicy);
        self.dirty.mark_with(idx, dirty::OPACITY, &EagerPolicy);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn create_and_destroy() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        assert!(store.is_alive(id));
        assert_eq!(store.layer_count(), 1);
        store.destroy_layer(id);
        assert!(!store.is_alive(id));
        assert_eq!(store.layer_count(), 0);
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut store = LayerStore::new();
        let id1 = store.create_layer();
        store.destroy_layer(id1);
        let id2 = store.create_layer();
        assert!(!store.is_alive(id1));
        assert!(store.is_alive(id2));
        assert_eq!(id1.idx, id2.idx);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    fn add_child_and_query() {
        let mut store = LayerStore::new();
        let parent = store.create_layer();
        let child1 = store.create_layer();
        let child2 = store.create_layer();

        store.add_child(parent, child1);
        store.add_child(parent, child2);

        assert_eq!(store.parent(child1), Some(parent));
        let kids: Vec<_> = store.children(parent).collect();
        assert_eq!(kids, vec![child1, child2]);
    }

    #[test]
    fn insert_before_works() {
        let mut store = LayerStore::new();
        let parent = store.create_layer();
        let a = store.create_layer();
        let b = store.create_layer();
        let c = store.create_layer();

        store.add_child(parent, a);
        store.add_child(parent, c);
        store.insert_before(b, c);

        let kids: Vec<_> = store.children(parent).collect();
        assert_eq!(kids, vec![a, b, c]);
    }

    #[test]
    fn reparent_works() {
        let mut store = LayerStore::new();
        let p1 = store.create_layer();
        let p2 = store.create_layer();
        let child = store.create_layer();

        store.add_child(p1, child);
        store.reparent(child, p2);
        assert_eq!(store.parent(child), Some(p2));
        assert!(store.children(p1).next().is_none());
    }

    #[test]
    fn mask_and_replica_are_not_roots_or_children() {
        let mut store = LayerStore::new();
        let owner = store.create_layer();
        let mask = store.create_layer();
        let replica = store.create_layer();
        store.set_mask(owner, Some(mask));
        store.set_replica(owner, Some(replica));

        assert_eq!(store.roots(), vec![owner]);
        assert!(store.children(owner).next().is_none());
        assert_eq!(store.mask(owner), Some(mask));
        assert_eq!(store.attached_to(replica), Some(owner));

        let walk: Vec<_> = store.descendants(owner).collect();
        assert_eq!(walk, vec![owner, mask, replica]);

        store.set_mask(owner, None);
        assert_eq!(store.mask(owner), None);
        assert_eq!(store.attached_to(mask), None);
        assert!(store.roots().contains(&mask));
    }

    #[test]
    fn destroying_attached_mask_detaches_it() {
        let mut store = LayerStore::new();
        let owner = store.create_layer();
        let mask = store.create_layer();
        store.set_mask(owner, Some(mask));
        store.destroy_layer(mask);
        assert_eq!(store.mask(owner), None);
    }

    #[test]
    fn needs_display_accumulates_until_taken() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.set_bounds(id, Size::new(100.0, 100.0));
        store.set_needs_display_rect(id, Rect::new(0.0, 0.0, 10.0, 10.0));
        store.set_needs_display_rect(id, Rect::new(20.0, 20.0, 30.0, 30.0));
        assert_eq!(store.update_rect(id), Rect::new(0.0, 0.0, 30.0, 30.0));
        assert_eq!(store.take_update_rect(id), Rect::new(0.0, 0.0, 30.0, 30.0));
        assert_eq!(store.update_rect(id), Rect::ZERO);
    }

    #[test]
    #[should_panic(expected = "cannot destroy layer with children")]
    fn destroy_with_children_panics() {
        let mut store = LayerStore::new();
        let parent = store.create_layer();
        let child = store.create_layer();
        store.add_child(parent, child);
        store.destroy_layer(parent);
    }

    #[test]
    #[should_panic(expected = "adding child would create a cycle")]
    fn cycle_panics() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        store.add_child(a, b);
        store.reparent(a, b);
    }

    #[test]
    #[should_panic(expected = "child already has a parent")]
    fn double_parent_panics() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        let c = store.create_layer();
        store.add_child(a, c);
        store.add_child(b, c);
    }

    #[test]
    #[should_panic(expected = "mask or replica layer is already attached")]
    fn mask_attached_twice_panics() {
        let mut store = LayerStore::new();
        let a = store.create_layer();
        let b = store.create_layer();
        let mask = store.create_layer();
        store.set_mask(a, Some(mask));
        store.set_replica(b, Some(mask));
    }

    #[test]
    #[should_panic(expected = "stale LayerId")]
    fn destroyed_handle_panics_on_set_transform() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        store.destroy_layer(id);
        store.set_transform(id, Transform3d::IDENTITY);
    }

    #[test]
    fn set_opacity_marks_dirty() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        let _ = store.evaluate();

        store.set_opacity(id, 0.5);
        let changes = store.evaluate();
        assert!(
            changes.opacities.contains(&id.idx),
            "opacity channel should contain the layer"
        );
    }

    #[test]
    fn set_flags_marks_only_changed_channels() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        let _ = store.evaluate();

        store.set_flags(
            id,
            LayerFlags {
                contents_opaque: true,
                ..LayerFlags::default()
            },
        );
        let changes = store.evaluate();
        assert!(changes.content.contains(&id.idx));
        assert!(!changes.transforms.contains(&id.idx));
        assert!(!changes.clips.contains(&id.idx));
    }

    #[test]
    fn set_filter_marks_effects() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        let _ = store.evaluate();
        store.set_filter(id, Some(FilterOp::Blur { radius: 1.0 }));
        let changes = store.evaluate();
        assert!(changes.effects.contains(&id.idx));
    }
}
