// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The draw-property pass.
//!
//! [`calculate_draw_properties`] walks the impl tree once per frame and:
//!
//! - decides which layers own a render surface, creating and dropping
//!   surfaces (each keeps its damage history across frames while its owner
//!   keeps needing one);
//! - computes every layer's draw and screen-space transforms, accumulated
//!   opacity, clip, and drawable rect in its render target;
//! - builds each surface's back-to-front layer list and the render surface
//!   list, parents before children;
//! - derives the visible content rect of every drawing layer.
//!
//! A surface is needed by the root, and by any layer with a filter, a mask,
//! or a replica, or with opacity below one (or animating) over descendants
//! that draw. Hidden subtrees are skipped entirely.

use std::collections::HashMap;

use strata_core::geometry;
use strata_core::kurbo::{Point, Rect, Size, Vec2};
use strata_core::layer::{FilterOp, LayerFlags, LayerId, local_matrix};
use strata_core::transform::Transform3d;
use strata_render::DamageTracker;

use crate::tree::{DrawProperties, LayerTreeImpl, RenderSurface};

/// What the walk inherits from the parent layer.
#[derive(Clone, Copy, Debug)]
struct ParentState {
    /// Maps the parent's sublayer space to the current target.
    sublayer_to_target: Transform3d,
    /// Maps the parent's sublayer space to the screen.
    sublayer_to_screen: Transform3d,
    target: LayerId,
    draw_opacity: f32,
    opacity_animating: bool,
    to_target_animating: bool,
    to_screen_animating: bool,
    clip_in_target: Option<Rect>,
    moves_pixels: Option<LayerId>,
}

/// The per-layer inputs, copied out so the tree can be mutated while
/// walking.
#[derive(Clone, Debug)]
struct LayerInputs {
    local: Transform3d,
    scroll: Vec2,
    opacity: f32,
    bounds: Size,
    flags: LayerFlags,
    filter: Option<FilterOp>,
    mask: Option<LayerId>,
    replica: Option<LayerId>,
    children: Vec<LayerId>,
    draws_content: bool,
    transform_animating: bool,
    opacity_animating: bool,
    property_changed: bool,
}

impl LayerInputs {
    fn content_rect(&self) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.bounds)
    }
}

struct Walk<'a> {
    tree: &'a mut LayerTreeImpl,
    old_damage: HashMap<LayerId, DamageTracker>,
    surfaces: Vec<LayerId>,
}

/// Computes draw properties, render surfaces, and layer lists for `tree`.
///
/// `viewport` becomes the root surface's content rect; `page_scale` scales
/// the root's children (the root layer itself is drawn unscaled).
pub fn calculate_draw_properties(tree: &mut LayerTreeImpl, viewport: Size, page_scale: f64) {
    let mut old_damage = HashMap::new();
    for layer in tree.layers_mut() {
        layer.draw = DrawProperties::default();
        if let Some(surface) = layer.render_surface.take() {
            old_damage.insert(layer.id, surface.damage);
        }
    }
    tree.render_surface_list_mut().clear();

    let Some(root) = tree.root() else {
        return;
    };
    let mut walk = Walk {
        tree: &mut *tree,
        old_damage,
        surfaces: Vec::new(),
    };
    walk.root(root, viewport, page_scale);
    let surfaces = walk.surfaces;

    for owner in &surfaces {
        compute_visible_rects(tree, *owner);
    }
    *tree.render_surface_list_mut() = surfaces;
}

impl Walk<'_> {
    fn inputs(&self, id: LayerId) -> Option<LayerInputs> {
        let layer = self.tree.layer(id)?;
        Some(LayerInputs {
            local: local_matrix(
                layer.position,
                layer.anchor_point,
                layer.bounds,
                &layer.transform,
            ),
            scroll: layer.scroll_offset(),
            opacity: layer.opacity,
            bounds: layer.bounds,
            flags: layer.flags,
            filter: layer.filter,
            mask: layer.mask,
            replica: layer.replica,
            children: layer.children.clone(),
            draws_content: layer.draws_content(),
            transform_animating: layer.animations.has_running_transform(),
            opacity_animating: layer.animations.has_running_opacity(),
            property_changed: layer.property_changed,
        })
    }

    fn new_surface(&mut self, owner: LayerId, property_changed: bool) -> RenderSurface {
        let mut surface = RenderSurface::new(owner);
        if let Some(damage) = self.old_damage.remove(&owner) {
            surface.damage = damage;
        }
        surface.property_changed = property_changed;
        surface
    }

    fn append_to_layer_list(&mut self, target: LayerId, id: LayerId) {
        if let Some(surface) = self.tree.surface_mut(target) {
            surface.layer_list.push(id);
        }
    }

    fn root(&mut self, root: LayerId, viewport: Size, page_scale: f64) {
        let Some(input) = self.inputs(root) else {
            return;
        };
        let viewport_rect = Rect::from_origin_size(Point::ORIGIN, viewport);

        let mut surface = self.new_surface(root, input.property_changed);
        surface.content_rect = viewport_rect;
        surface.drawable_content_rect = viewport_rect;
        self.surfaces.push(root);
        let Some(layer) = self.tree.layer_mut(root) else {
            return;
        };
        layer.render_surface = Some(surface);
        if input.flags.hidden {
            return;
        }

        let anim = input.transform_animating;
        let drawable = if input.draws_content {
            geometry::intersect(input.local.map_clipped_rect(input.content_rect()), viewport_rect)
        } else {
            Rect::ZERO
        };
        layer.draw = DrawProperties {
            draw_transform: input.local,
            screen_space_transform: input.local,
            draw_opacity: input.opacity,
            opacity_animating: input.opacity_animating,
            draw_transform_animating: anim,
            screen_space_transform_animating: anim,
            render_target: Some(root),
            clip_rect: Some(viewport_rect),
            drawable_content_rect: drawable,
            visible_content_rect: Rect::ZERO,
        };
        if input.draws_content {
            self.append_to_layer_list(root, root);
        }

        let clip = if input.flags.masks_to_bounds {
            geometry::intersect(input.local.map_clipped_rect(input.content_rect()), viewport_rect)
        } else {
            viewport_rect
        };
        let sublayer = input.local
            * Transform3d::from_scale(page_scale, page_scale, 1.0)
            * Transform3d::from_offset(-input.scroll);
        let state = ParentState {
            sublayer_to_target: sublayer,
            sublayer_to_screen: sublayer,
            target: root,
            draw_opacity: input.opacity,
            opacity_animating: input.opacity_animating,
            to_target_animating: anim,
            to_screen_animating: anim,
            clip_in_target: Some(clip),
            moves_pixels: None,
        };
        for child in &input.children {
            self.layer(*child, &state);
        }
    }

    /// Visits `id` and its subtree; returns its drawable rect in the
    /// parent's target.
    fn layer(&mut self, id: LayerId, parent: &ParentState) -> Rect {
        let Some(input) = self.inputs(id) else {
            return Rect::ZERO;
        };
        if input.flags.hidden {
            return Rect::ZERO;
        }
        let needs_surface = input.filter.is_some()
            || input.mask.is_some()
            || input.replica.is_some()
            || ((input.opacity < 1.0 || input.opacity_animating)
                && self.children_draw(&input.children));
        if needs_surface {
            self.surface_layer(id, &input, parent)
        } else {
            self.plain_layer(id, &input, parent)
        }
    }

    fn children_draw(&self, children: &[LayerId]) -> bool {
        let mut stack = children.to_vec();
        while let Some(id) = stack.pop() {
            let Some(layer) = self.tree.layer(id) else {
                continue;
            };
            if layer.flags.hidden {
                continue;
            }
            if layer.draws_content() {
                return true;
            }
            stack.extend(layer.children.iter().copied());
        }
        false
    }

    fn plain_layer(&mut self, id: LayerId, input: &LayerInputs, parent: &ParentState) -> Rect {
        let draw_transform = parent.sublayer_to_target * input.local;
        let screen_space_transform = parent.sublayer_to_screen * input.local;
        let draw_opacity = parent.draw_opacity * input.opacity;
        let opacity_animating = parent.opacity_animating || input.opacity_animating;
        let to_target_animating = parent.to_target_animating || input.transform_animating;
        let to_screen_animating = parent.to_screen_animating || input.transform_animating;

        let mapped_bounds = draw_transform.map_clipped_rect(input.content_rect());
        let drawable = if input.draws_content {
            clip_to(mapped_bounds, parent.clip_in_target)
        } else {
            Rect::ZERO
        };

        if let Some(layer) = self.tree.layer_mut(id) {
            layer.draw = DrawProperties {
                draw_transform,
                screen_space_transform,
                draw_opacity,
                opacity_animating,
                draw_transform_animating: to_target_animating,
                screen_space_transform_animating: to_screen_animating,
                render_target: Some(parent.target),
                clip_rect: parent.clip_in_target,
                drawable_content_rect: drawable,
                visible_content_rect: Rect::ZERO,
            };
        }
        if input.draws_content {
            self.append_to_layer_list(parent.target, id);
        }

        let clip_in_target = if input.flags.masks_to_bounds {
            Some(clip_to(mapped_bounds, parent.clip_in_target))
        } else {
            parent.clip_in_target
        };
        let sublayer = Transform3d::from_offset(-input.scroll);
        let state = ParentState {
            sublayer_to_target: draw_transform * sublayer,
            sublayer_to_screen: screen_space_transform * sublayer,
            target: parent.target,
            draw_opacity,
            opacity_animating,
            to_target_animating,
            to_screen_animating,
            clip_in_target,
            moves_pixels: parent.moves_pixels,
        };
        let mut rect = drawable;
        for child in &input.children {
            rect = geometry::union(rect, self.layer(*child, &state));
        }
        rect
    }

    fn surface_layer(&mut self, id: LayerId, input: &LayerInputs, parent: &ParentState) -> Rect {
        let content_bounds = input.content_rect();
        let mut surface = self.new_surface(id, input.property_changed);
        surface.target = Some(parent.target);
        surface.clip_rect = parent.clip_in_target;
        surface.draw_transform = parent.sublayer_to_target * input.local;
        surface.screen_space_transform = parent.sublayer_to_screen * input.local;
        surface.draw_opacity = parent.draw_opacity * input.opacity;
        surface.opacity_animating = parent.opacity_animating || input.opacity_animating;
        surface.draw_transform_animating = parent.to_target_animating || input.transform_animating;
        surface.screen_space_transform_animating =
            parent.to_screen_animating || input.transform_animating;

        let behind_camera = surface.screen_space_transform.map_quad(content_bounds).1;
        let moves_pixels = if input.filter.is_some_and(|f| f.moves_pixels()) || behind_camera {
            Some(id)
        } else {
            parent.moves_pixels
        };
        surface.nearest_ancestor_that_moves_pixels = moves_pixels;

        if let Some(replica) = input.replica.and_then(|r| self.tree.layer(r)) {
            let replica_local = local_matrix(
                replica.position,
                replica.anchor_point,
                input.bounds,
                &replica.transform,
            );
            surface.replica_draw_transform = Some(surface.draw_transform * replica_local);
            surface.replica_screen_space_transform =
                Some(surface.screen_space_transform * replica_local);
            // A moved or restyled reflection invalidates the whole surface.
            let replica_mask_changed = replica
                .mask
                .and_then(|m| self.tree.layer(m))
                .is_some_and(|m| m.property_changed);
            surface.property_changed |= replica.property_changed || replica_mask_changed;
        }

        let screen_space_transform = surface.screen_space_transform;
        let screen_animating = surface.screen_space_transform_animating;
        let drawable = if input.draws_content {
            content_bounds
        } else {
            Rect::ZERO
        };
        // The surface sits at the owner's position in the parent's list.
        self.append_to_layer_list(parent.target, id);
        self.surfaces.push(id);
        if let Some(layer) = self.tree.layer_mut(id) {
            layer.render_surface = Some(surface);
            layer.draw = DrawProperties {
                draw_transform: Transform3d::IDENTITY,
                screen_space_transform,
                draw_opacity: 1.0,
                opacity_animating: false,
                draw_transform_animating: false,
                screen_space_transform_animating: screen_animating,
                render_target: Some(id),
                clip_rect: None,
                drawable_content_rect: drawable,
                visible_content_rect: Rect::ZERO,
            };
        }
        if input.draws_content {
            self.append_to_layer_list(id, id);
        }

        let clip_in_target = input.flags.masks_to_bounds.then_some(content_bounds);
        let sublayer = Transform3d::from_offset(-input.scroll);
        let state = ParentState {
            sublayer_to_target: sublayer,
            sublayer_to_screen: screen_space_transform * sublayer,
            target: id,
            draw_opacity: 1.0,
            opacity_animating: false,
            to_target_animating: false,
            to_screen_animating: screen_animating,
            clip_in_target,
            moves_pixels,
        };
        let mut content_rect = drawable;
        for child in &input.children {
            content_rect = geometry::union(content_rect, self.layer(*child, &state));
        }
        content_rect = clip_to(content_rect, clip_in_target);

        if geometry::is_empty(content_rect) {
            self.drop_surface(id, parent.target);
            return Rect::ZERO;
        }

        let Some(layer) = self.tree.layer_mut(id) else {
            return Rect::ZERO;
        };
        let Some(surface) = layer.render_surface.as_mut() else {
            return Rect::ZERO;
        };
        surface.content_rect = content_rect;
        let mut drawable_in_target = surface.draw_transform.map_clipped_rect(content_rect);
        if let Some(replica) = surface.replica_draw_transform {
            drawable_in_target =
                geometry::union(drawable_in_target, replica.map_clipped_rect(content_rect));
        }
        let drawable_in_target = clip_to(drawable_in_target, surface.clip_rect);
        surface.drawable_content_rect = drawable_in_target;

        let owner_draw = surface.screen_space_transform;
        let replica_draw = surface.replica_draw_transform;
        let replica_screen = surface.replica_screen_space_transform;
        let target = parent.target;
        if let Some(mask) = input.mask {
            self.attached_layer(mask, Transform3d::IDENTITY, owner_draw, id, content_rect);
        }
        if let Some(replica) = input.replica {
            if let (Some(draw), Some(screen)) = (replica_draw, replica_screen) {
                self.attached_layer(replica, draw, screen, target, drawable_in_target);
                let replica_mask = self.tree.layer(replica).and_then(|r| r.mask);
                if let Some(mask) = replica_mask {
                    self.attached_layer(mask, draw, screen, target, drawable_in_target);
                }
            }
        }
        drawable_in_target
    }

    /// Gives a mask or replica layer draw properties matching its owner's
    /// surface. Attached layers never appear in a layer list.
    fn attached_layer(
        &mut self,
        id: LayerId,
        draw_transform: Transform3d,
        screen_space_transform: Transform3d,
        target: LayerId,
        drawable: Rect,
    ) {
        if let Some(layer) = self.tree.layer_mut(id) {
            let content_rect = layer.content_rect();
            layer.draw = DrawProperties {
                draw_transform,
                screen_space_transform,
                render_target: Some(target),
                drawable_content_rect: drawable,
                visible_content_rect: content_rect,
                ..DrawProperties::default()
            };
        }
    }

    /// Drops an empty surface and everything that was listed in it.
    fn drop_surface(&mut self, id: LayerId, target: LayerId) {
        self.surfaces.retain(|s| *s != id);
        if let Some(surface) = self.tree.surface_mut(target) {
            surface.layer_list.retain(|l| *l != id);
        }
        if let Some(layer) = self.tree.layer_mut(id) {
            if let Some(surface) = layer.render_surface.take() {
                self.old_damage.insert(id, surface.damage);
            }
            layer.draw = DrawProperties::default();
        }
    }
}

fn clip_to(rect: Rect, clip: Option<Rect>) -> Rect {
    match clip {
        Some(clip) => geometry::intersect(rect, clip),
        None => rect,
    }
}

/// Fills in the visible content rect of every layer drawing into `owner`'s
/// surface.
fn compute_visible_rects(tree: &mut LayerTreeImpl, owner: LayerId) {
    let Some(surface) = tree.surface(owner) else {
        return;
    };
    let target_rect = surface.content_rect;
    let layers = surface.layer_list.clone();
    for id in layers {
        let Some(layer) = tree.layer_mut(id) else {
            continue;
        };
        if layer.render_surface.is_some() && id != owner {
            // Contributing surface; its own layers are handled separately.
            continue;
        }
        let content_rect = layer.content_rect();
        let drawable = geometry::intersect(layer.draw.drawable_content_rect, target_rect);
        layer.draw.visible_content_rect = if geometry::is_empty(drawable) {
            Rect::ZERO
        } else {
            layer
                .draw
                .draw_transform
                .inverse()
                .and_then(|inverse| inverse.project_clipped_rect(drawable))
                .map_or(content_rect, |r| geometry::intersect(r, content_rect))
        };
    }
}

#[cfg(test)]
mod tests {
    use strata_core::layer::{LayerContent, LayerStore};

    use super::*;
    use crate::sync::synchronize_trees;

    const VIEWPORT: Size = Size::new(500.0, 500.0);

    struct Fixture {
        store: LayerStore,
        root: LayerId,
        tree: LayerTreeImpl,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = LayerStore::new();
            let root = store.create_layer();
            store.set_anchor_point(root, Point::ZERO);
            store.set_bounds(root, VIEWPORT);
            Self {
                store,
                root,
                tree: LayerTreeImpl::new(),
            }
        }

        fn child(&mut self, parent: LayerId, rect: Rect, content: LayerContent) -> LayerId {
            let id = self.store.create_layer();
            self.store.add_child(parent, id);
            self.store.set_position(id, rect.origin());
            self.store.set_bounds(id, rect.size());
            self.store.set_content(id, content);
            id
        }

        fn run(&mut self) {
            self.run_scaled(1.0);
        }

        fn run_scaled(&mut self, page_scale: f64) {
            let changes = self.store.evaluate();
            let _ = synchronize_trees(
                &mut self.store,
                Some(self.root),
                &changes,
                &HashMap::new(),
                &mut self.tree,
            );
            calculate_draw_properties(&mut self.tree, VIEWPORT, page_scale);
        }

        fn draw(&self, id: LayerId) -> DrawProperties {
            self.tree.layer(id).unwrap().draw
        }
    }

    fn solid() -> LayerContent {
        LayerContent::Solid { rgba: [1.0; 4] }
    }

    #[test]
    fn root_surface_covers_viewport() {
        let mut f = Fixture::new();
        let child = f.child(f.root, Rect::new(100.0, 100.0, 130.0, 130.0), solid());
        f.run();

        assert_eq!(f.tree.render_surface_list(), &[f.root]);
        let surface = f.tree.surface(f.root).unwrap();
        assert_eq!(surface.content_rect, Rect::new(0.0, 0.0, 500.0, 500.0));
        assert_eq!(surface.layer_list, vec![child]);
        let draw = f.draw(child);
        assert_eq!(draw.render_target, Some(f.root));
        assert_eq!(draw.drawable_content_rect, Rect::new(100.0, 100.0, 130.0, 130.0));
        assert_eq!(draw.visible_content_rect, Rect::new(0.0, 0.0, 30.0, 30.0));
    }

    #[test]
    fn translucent_layer_over_drawing_children_gets_surface() {
        let mut f = Fixture::new();
        let group = f.child(f.root, Rect::new(10.0, 20.0, 110.0, 120.0), LayerContent::Empty);
        f.store.set_opacity(group, 0.5);
        let leaf = f.child(group, Rect::new(5.0, 5.0, 25.0, 25.0), solid());
        f.run();

        assert_eq!(f.tree.render_surface_list(), &[f.root, group]);
        let surface = f.tree.surface(group).unwrap();
        assert_eq!(surface.target, Some(f.root));
        assert_eq!(surface.draw_opacity, 0.5);
        assert_eq!(surface.content_rect, Rect::new(5.0, 5.0, 25.0, 25.0));
        assert_eq!(surface.drawable_content_rect, Rect::new(15.0, 25.0, 35.0, 45.0));
        assert_eq!(surface.layer_list, vec![leaf]);
        assert_eq!(f.tree.surface(f.root).unwrap().layer_list, vec![group]);

        let draw = f.draw(leaf);
        assert_eq!(draw.render_target, Some(group));
        assert_eq!(draw.draw_opacity, 1.0, "opacity applies at the surface");
        assert_eq!(draw.drawable_content_rect, Rect::new(5.0, 5.0, 25.0, 25.0));
        assert_eq!(
            draw.screen_space_transform,
            Transform3d::from_translation(15.0, 25.0, 0.0)
        );
    }

    #[test]
    fn translucent_leaf_has_no_surface() {
        let mut f = Fixture::new();
        let leaf = f.child(f.root, Rect::new(0.0, 0.0, 10.0, 10.0), solid());
        f.store.set_opacity(leaf, 0.5);
        f.run();

        assert_eq!(f.tree.render_surface_list(), &[f.root]);
        assert_eq!(f.draw(leaf).draw_opacity, 0.5);
    }

    #[test]
    fn empty_surface_is_dropped() {
        let mut f = Fixture::new();
        let group = f.child(f.root, Rect::new(0.0, 0.0, 10.0, 10.0), LayerContent::Empty);
        f.store.set_filter(group, Some(FilterOp::Grayscale(1.0)));
        f.run();

        assert_eq!(f.tree.render_surface_list(), &[f.root]);
        assert!(f.tree.surface(group).is_none(), "surface dropped");
        assert!(
            f.tree.surface(f.root).unwrap().layer_list.is_empty(),
            "dropped surface leaves the parent list"
        );
    }

    #[test]
    fn masks_to_bounds_clips_descendants() {
        let mut f = Fixture::new();
        let clip = f.child(f.root, Rect::new(0.0, 0.0, 50.0, 50.0), LayerContent::Empty);
        f.store.set_flags(
            clip,
            LayerFlags {
                masks_to_bounds: true,
                ..LayerFlags::default()
            },
        );
        let leaf = f.child(clip, Rect::new(40.0, 40.0, 80.0, 80.0), solid());
        f.run();

        let draw = f.draw(leaf);
        assert_eq!(draw.clip_rect, Some(Rect::new(0.0, 0.0, 50.0, 50.0)));
        assert_eq!(draw.drawable_content_rect, Rect::new(40.0, 40.0, 50.0, 50.0));
        assert_eq!(draw.visible_content_rect, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn scroll_offset_and_page_scale_move_children() {
        let mut f = Fixture::new();
        let scroller = f.child(f.root, Rect::new(0.0, 0.0, 100.0, 100.0), LayerContent::Empty);
        f.store.set_max_scroll_offset(scroller, Vec2::new(100.0, 100.0));
        f.store.set_scroll_offset(scroller, Vec2::new(0.0, 20.0));
        let leaf = f.child(scroller, Rect::new(0.0, 50.0, 10.0, 60.0), solid());
        f.run_scaled(2.0);

        let draw = f.draw(leaf);
        assert_eq!(draw.drawable_content_rect, Rect::new(0.0, 60.0, 20.0, 80.0));
        assert_eq!(
            f.draw(f.root).draw_transform,
            Transform3d::IDENTITY,
            "root itself is not scaled"
        );
    }

    #[test]
    fn hidden_subtree_is_skipped() {
        let mut f = Fixture::new();
        let group = f.child(f.root, Rect::new(0.0, 0.0, 10.0, 10.0), solid());
        let leaf = f.child(group, Rect::new(0.0, 0.0, 10.0, 10.0), solid());
        f.store.set_flags(
            group,
            LayerFlags {
                hidden: true,
                ..LayerFlags::default()
            },
        );
        f.run();

        assert!(f.tree.surface(f.root).unwrap().layer_list.is_empty());
        assert_eq!(f.draw(leaf).render_target, None);
    }

    #[test]
    fn replica_gets_reflected_transform() {
        let mut f = Fixture::new();
        let owner = f.child(f.root, Rect::new(10.0, 0.0, 30.0, 20.0), solid());
        let replica = f.store.create_layer();
        f.store.set_anchor_point(replica, Point::ZERO);
        f.store.set_position(replica, Point::new(0.0, 20.0));
        f.store.set_replica(owner, Some(replica));
        f.run();

        let surface = f.tree.surface(owner).unwrap();
        assert_eq!(
            surface.replica_draw_transform,
            Some(Transform3d::from_translation(10.0, 20.0, 0.0))
        );
        assert_eq!(surface.drawable_content_rect, Rect::new(10.0, 0.0, 30.0, 40.0));
        assert_eq!(f.draw(replica).render_target, Some(f.root));
    }

    #[test]
    fn moving_the_replica_marks_the_owner_surface_changed() {
        let mut f = Fixture::new();
        let owner = f.child(f.root, Rect::new(10.0, 0.0, 30.0, 20.0), solid());
        let replica = f.store.create_layer();
        f.store.set_anchor_point(replica, Point::ZERO);
        f.store.set_position(replica, Point::new(0.0, 20.0));
        f.store.set_replica(owner, Some(replica));
        f.run();
        f.tree.did_draw_all_layers();
        f.run();
        assert!(
            !f.tree.surface(owner).unwrap().property_changed,
            "an untouched surface stays clean"
        );

        f.store.set_position(replica, Point::new(0.0, 30.0));
        f.run();
        assert!(
            !f.tree.layer(owner).unwrap().property_changed,
            "the owner itself did not change"
        );
        assert!(
            f.tree.surface(owner).unwrap().property_changed,
            "a moved reflection repaints the whole surface"
        );
    }

    #[test]
    fn surface_damage_history_survives_frames() {
        let mut f = Fixture::new();
        let group = f.child(f.root, Rect::new(0.0, 0.0, 10.0, 10.0), solid());
        f.store.set_filter(group, Some(FilterOp::Grayscale(1.0)));
        f.run();
        f.tree
            .surface_mut(group)
            .unwrap()
            .damage
            .did_draw_damaged_area();
        f.run();
        assert!(
            f.tree.surface(group).is_some(),
            "surface kept while still needed"
        );
    }
}
