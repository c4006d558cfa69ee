// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compositor-side (impl) layer tree.
//!
//! Impl layers are keyed by the [`LayerId`] of their pending counterpart and
//! live in a `HashMap` arena. They are created and destroyed only by
//! [`synchronize_trees`](crate::sync::synchronize_trees); render surfaces are
//! created and destroyed only by the draw-property pass.

use std::collections::HashMap;

use strata_core::animation::AnimationController;
use strata_core::kurbo::{Point, Rect, Size, Vec2};
use strata_core::layer::{FilterOp, LayerContent, LayerFlags, LayerId};
use strata_core::transform::Transform3d;
use strata_render::{DamageTracker, ResourceKey, TextureId};

/// Per-frame values computed by the draw-property pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawProperties {
    /// Maps content space to the render target.
    pub draw_transform: Transform3d,
    /// Maps content space to the screen.
    pub screen_space_transform: Transform3d,
    /// Opacity accumulated up to the render target.
    pub draw_opacity: f32,
    /// Whether the layer or an ancestor up to the target animates opacity.
    pub opacity_animating: bool,
    /// Whether a transform between the layer and its target animates.
    pub draw_transform_animating: bool,
    /// Whether a transform between the layer and the screen animates.
    pub screen_space_transform_animating: bool,
    /// Owner of the surface this layer draws into.
    pub render_target: Option<LayerId>,
    /// Clip in target space, if an ancestor masks to bounds.
    pub clip_rect: Option<Rect>,
    /// Target-space bounds of the drawn content, clipped.
    pub drawable_content_rect: Rect,
    /// Part of the content rect visible in the target, in content space.
    pub visible_content_rect: Rect,
}

impl Default for DrawProperties {
    fn default() -> Self {
        Self {
            draw_transform: Transform3d::IDENTITY,
            screen_space_transform: Transform3d::IDENTITY,
            draw_opacity: 1.0,
            opacity_animating: false,
            draw_transform_animating: false,
            screen_space_transform_animating: false,
            render_target: None,
            clip_rect: None,
            drawable_content_rect: Rect::ZERO,
            visible_content_rect: Rect::ZERO,
        }
    }
}

/// An offscreen target owned by a layer.
#[derive(Clone, Debug)]
pub struct RenderSurface {
    /// Layer owning the surface.
    pub owner: LayerId,
    /// Owner of the surface this one draws into; `None` for the root.
    pub target: Option<LayerId>,
    /// Content rect in surface space.
    pub content_rect: Rect,
    /// Clip applied when drawing into the target, in target space.
    pub clip_rect: Option<Rect>,
    /// Maps surface space to the target.
    pub draw_transform: Transform3d,
    /// Maps surface space to the screen.
    pub screen_space_transform: Transform3d,
    /// Maps surface space to the target for the replica.
    pub replica_draw_transform: Option<Transform3d>,
    /// Maps surface space to the screen for the replica.
    pub replica_screen_space_transform: Option<Transform3d>,
    /// Opacity applied when drawing into the target.
    pub draw_opacity: f32,
    /// Whether that opacity animates.
    pub opacity_animating: bool,
    /// Whether [`draw_transform`](Self::draw_transform) animates.
    pub draw_transform_animating: bool,
    /// Whether [`screen_space_transform`](Self::screen_space_transform)
    /// animates.
    pub screen_space_transform_animating: bool,
    /// Target-space bounds of the surface and its replica, clipped.
    pub drawable_content_rect: Rect,
    /// Back-to-front list of layers drawing into this surface. Child
    /// surfaces appear through their owner.
    pub layer_list: Vec<LayerId>,
    /// Nearest surface at or above this one whose drawing moves pixels.
    pub nearest_ancestor_that_moves_pixels: Option<LayerId>,
    /// Whether the owner changed in a way that moves the whole surface.
    pub property_changed: bool,
    /// Accumulated damage.
    pub damage: DamageTracker,
}

impl RenderSurface {
    /// Creates a surface whose first damage update covers everything.
    #[must_use]
    pub fn new(owner: LayerId) -> Self {
        Self {
            owner,
            target: None,
            content_rect: Rect::ZERO,
            clip_rect: None,
            draw_transform: Transform3d::IDENTITY,
            screen_space_transform: Transform3d::IDENTITY,
            replica_draw_transform: None,
            replica_screen_space_transform: None,
            draw_opacity: 1.0,
            opacity_animating: false,
            draw_transform_animating: false,
            screen_space_transform_animating: false,
            drawable_content_rect: Rect::ZERO,
            layer_list: Vec::new(),
            nearest_ancestor_that_moves_pixels: None,
            property_changed: false,
            damage: DamageTracker::new(),
        }
    }
}

/// A compositor-side layer.
#[derive(Clone, Debug)]
pub struct LayerImpl {
    /// Identity shared with the pending layer.
    pub id: LayerId,

    // -- Topology --
    /// Parent layer.
    pub parent: Option<LayerId>,
    /// Children in paint order.
    pub children: Vec<LayerId>,
    /// Mask layer.
    pub mask: Option<LayerId>,
    /// Replica layer.
    pub replica: Option<LayerId>,

    // -- Pushed properties --
    /// Top-left corner in the parent's sublayer space.
    pub position: Point,
    /// Transform origin as a fraction of bounds.
    pub anchor_point: Point,
    /// Layer size.
    pub bounds: Size,
    /// Local transform (owned by a running transform animation).
    pub transform: Transform3d,
    /// Local opacity (owned by a running opacity animation).
    pub opacity: f32,
    /// What the layer draws.
    pub content: LayerContent,
    /// Boolean flags.
    pub flags: LayerFlags,
    /// Filter applied through a render surface.
    pub filter: Option<FilterOp>,
    /// Scroll offset as last committed by the client.
    pub scroll_position: Vec2,
    /// Largest allowed scroll offset.
    pub max_scroll_offset: Vec2,
    /// Content texture request, if the layer has one.
    pub texture: Option<TextureId>,

    // -- Impl-only state --
    /// Scroll applied on the compositor since the last commit.
    pub scroll_delta: Vec2,
    /// Part of `scroll_delta` already reported to the client.
    pub sent_scroll_delta: Vec2,
    /// Repainted region (layer space) since the last draw.
    pub update_rect: Rect,
    /// Whether anything affecting the layer's pixels changed since the last
    /// draw.
    pub property_changed: bool,
    /// Backing bound at the last commit.
    pub resource: Option<ResourceKey>,
    /// Running animations.
    pub animations: AnimationController,
    /// Computed draw properties.
    pub draw: DrawProperties,
    /// Render surface, when the layer needs one.
    pub render_surface: Option<RenderSurface>,
}

impl LayerImpl {
    /// Creates a layer with default properties.
    #[must_use]
    pub fn new(id: LayerId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            mask: None,
            replica: None,
            position: Point::ORIGIN,
            anchor_point: Point::new(0.5, 0.5),
            bounds: Size::ZERO,
            transform: Transform3d::IDENTITY,
            opacity: 1.0,
            content: LayerContent::Empty,
            flags: LayerFlags::default(),
            filter: None,
            scroll_position: Vec2::ZERO,
            max_scroll_offset: Vec2::ZERO,
            texture: None,
            scroll_delta: Vec2::ZERO,
            sent_scroll_delta: Vec2::ZERO,
            update_rect: Rect::ZERO,
            property_changed: true,
            resource: None,
            animations: AnimationController::new(),
            draw: DrawProperties::default(),
            render_surface: None,
        }
    }

    /// `(0, 0) .. bounds`.
    #[inline]
    #[must_use]
    pub fn content_rect(&self) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.bounds)
    }

    /// Committed scroll offset plus the compositor-side delta.
    #[inline]
    #[must_use]
    pub fn scroll_offset(&self) -> Vec2 {
        self.scroll_position + self.scroll_delta
    }

    /// Fully opaque part of the content, in content space.
    #[must_use]
    pub fn opaque_rect(&self) -> Option<Rect> {
        self.content
            .visible_opaque_rect(self.bounds, self.flags.contents_opaque)
    }

    /// Whether the layer draws anything itself.
    #[inline]
    #[must_use]
    pub fn draws_content(&self) -> bool {
        self.content.draws_content() && self.bounds.width > 0.0 && self.bounds.height > 0.0
    }
}

/// The active tree drawn by the compositor.
#[derive(Debug, Default)]
pub struct LayerTreeImpl {
    layers: HashMap<LayerId, LayerImpl>,
    root: Option<LayerId>,
    render_surface_list: Vec<LayerId>,
    source_frame_number: u64,
}

impl LayerTreeImpl {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The root layer.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<LayerId> {
        self.root
    }

    /// Number of impl layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns whether the tree has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Looks up a layer.
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&LayerImpl> {
        self.layers.get(&id)
    }

    /// Looks up a layer mutably.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut LayerImpl> {
        self.layers.get_mut(&id)
    }

    /// Iterates over every layer in unspecified order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerImpl> {
        self.layers.values()
    }

    /// Iterates mutably over every layer in unspecified order.
    pub fn layers_mut(&mut self) -> impl Iterator<Item = &mut LayerImpl> {
        self.layers.values_mut()
    }

    /// Every layer id, sorted.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self.layers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Owners of the render surfaces drawn this frame, parents before
    /// children; the root surface comes first.
    #[must_use]
    pub fn render_surface_list(&self) -> &[LayerId] {
        &self.render_surface_list
    }

    /// The render surface owned by `owner`.
    #[must_use]
    pub fn surface(&self, owner: LayerId) -> Option<&RenderSurface> {
        self.layers.get(&owner)?.render_surface.as_ref()
    }

    /// The render surface owned by `owner`, mutably.
    pub fn surface_mut(&mut self, owner: LayerId) -> Option<&mut RenderSurface> {
        self.layers.get_mut(&owner)?.render_surface.as_mut()
    }

    /// Client frame number of the last commit.
    #[must_use]
    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    /// Marks `id` and everything drawn beneath it as changed.
    pub fn note_subtree_property_changed(&mut self, id: LayerId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(layer) = self.layers.get_mut(&id) else {
                continue;
            };
            layer.property_changed = true;
            stack.extend(layer.children.iter().copied());
            stack.extend(layer.mask);
            stack.extend(layer.replica);
        }
    }

    /// Marks every descendant of `id`, but not `id` itself, as changed.
    pub fn note_descendants_property_changed(&mut self, id: LayerId) {
        let children = match self.layers.get(&id) {
            Some(layer) => layer.children.clone(),
            None => return,
        };
        for child in children {
            self.note_subtree_property_changed(child);
        }
    }

    /// Clears per-frame change state after the frame was drawn.
    pub fn did_draw_all_layers(&mut self) {
        for layer in self.layers.values_mut() {
            layer.property_changed = false;
            layer.update_rect = Rect::ZERO;
            if let Some(surface) = &mut layer.render_surface {
                surface.property_changed = false;
                surface.damage.did_draw_damaged_area();
            }
        }
    }

    /// Drops every render surface (and its damage history), so the next
    /// frame is damaged in full.
    pub fn clear_render_surfaces(&mut self) {
        for layer in self.layers.values_mut() {
            layer.render_surface = None;
        }
        self.render_surface_list.clear();
    }

    /// Removes every layer.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.root = None;
        self.render_surface_list.clear();
    }

    // -- Crate-internal mutation --

    pub(crate) fn set_root(&mut self, root: Option<LayerId>) {
        self.root = root;
    }

    pub(crate) fn set_source_frame_number(&mut self, frame: u64) {
        self.source_frame_number = frame;
    }

    pub(crate) fn insert(&mut self, layer: LayerImpl) {
        self.layers.insert(layer.id, layer);
    }

    pub(crate) fn take_layers(&mut self) -> HashMap<LayerId, LayerImpl> {
        core::mem::take(&mut self.layers)
    }

    pub(crate) fn render_surface_list_mut(&mut self) -> &mut Vec<LayerId> {
        &mut self.render_surface_list
    }
}
