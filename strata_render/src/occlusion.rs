// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Occlusion tracking.
//!
//! The [`OcclusionTracker`] is driven by a front-to-back walk over the render
//! surface list and accumulates, for the surface currently being visited, the
//! region covered by opaque content nearer the viewer. It keeps a stack of
//! frames, one per target surface being built, each holding the occlusion
//! both in screen space and in the target surface's own space.
//!
//! The walk visits three kinds of positions, and the tracker must see them in
//! this order for every surface `S`:
//!
//! 1. every layer drawing into `S`, frontmost first
//!    ([`enter_layer`](OcclusionTracker::enter_layer) /
//!    [`leave_layer`](OcclusionTracker::leave_layer)), with child surfaces of
//!    `S` fully walked at their contributing position;
//! 2. `S` itself as a target ([`enter_target_surface`](OcclusionTracker::enter_target_surface));
//! 3. `S` as a contribution to its parent target
//!    ([`leave_contributing_surface`](OcclusionTracker::leave_contributing_surface)),
//!    except for the root.
//!
//! Only opaque content at draw opacity 1 whose transform is known and maps to
//! an unclipped rectilinear quad contributes. Every contribution and every
//! query is bounded by the relevant clip rect. All occlusion rects are
//! integer aligned: contributions are rounded inwards, queries outwards.

use alloc::vec::Vec;

use strata_core::geometry::{self, Region};
use strata_core::kurbo::{Rect, Size};
use strata_core::layer::{FilterOp, LayerId};
use strata_core::transform::Transform3d;

/// What occlusion needs to know about a render surface.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceOcclusion {
    /// Layer owning the surface.
    pub owner: LayerId,
    /// Surface content rect, in surface space.
    pub content_rect: Rect,
    /// Clip applied when the surface is drawn into its parent target, in the
    /// parent target's space.
    pub clip_rect: Rect,
    /// Maps surface space to the parent target.
    pub draw_transform: Transform3d,
    /// Maps surface space to the screen.
    pub screen_space_transform: Transform3d,
    /// Maps surface space to the parent target for the replica, if any.
    pub replica_draw_transform: Option<Transform3d>,
    /// Maps surface space to the screen for the replica, if any.
    pub replica_screen_space_transform: Option<Transform3d>,
    /// Whether the replica has its own mask.
    pub replica_has_mask: bool,
    /// Whether the surface has a mask.
    pub has_mask: bool,
    /// Opacity applied when the surface is drawn.
    pub draw_opacity: f32,
    /// Whether the surface opacity is being animated.
    pub opacity_animating: bool,
    /// Filter applied to the surface.
    pub filter: Option<FilterOp>,
    /// Whether a transform between the surface and its target (or screen) is
    /// being animated.
    pub transforms_animating: bool,
    /// Nearest ancestor surface (including this one) whose drawing moves
    /// pixels (a pixel-moving filter, or a transform partially behind the
    /// camera).
    pub nearest_ancestor_that_moves_pixels: Option<LayerId>,
}

impl SurfaceOcclusion {
    fn clears_occlusion(&self) -> bool {
        self.has_mask
            || self.opacity_animating
            || self.draw_opacity < 1.0
            || self.filter.is_some_and(|f| f.affects_opacity())
    }
}

/// What occlusion needs to know about a layer.
#[derive(Clone, Copy, Debug)]
pub struct LayerOcclusion {
    /// The layer.
    pub id: LayerId,
    /// Maps content space to the target surface.
    pub draw_transform: Transform3d,
    /// Maps content space to the screen.
    pub screen_space_transform: Transform3d,
    /// Opacity the layer draws with, including ancestors up to its target.
    pub draw_opacity: f32,
    /// Whether the opacity is being animated.
    pub opacity_animating: bool,
    /// Part of the content rect that is visible, in content space.
    pub visible_content_rect: Rect,
    /// Fully opaque part of the visible content, in content space.
    pub opaque_rect: Option<Rect>,
    /// Clip in the target surface; the target content rect when unclipped.
    pub clip_rect_in_target: Rect,
    /// Whether a transform between the layer and its target is animating.
    pub transforms_animating: bool,
}

#[derive(Clone, Debug)]
struct StackFrame {
    target: LayerId,
    moves_pixels_ancestor: Option<LayerId>,
    occlusion_in_screen: Region,
    occlusion_in_target: Region,
}

/// Front-to-back occlusion accumulator.
#[derive(Clone, Debug)]
pub struct OcclusionTracker {
    root_target_rect: Rect,
    minimum_tracking_size: Size,
    stack: Vec<StackFrame>,
}

impl OcclusionTracker {
    /// Creates a tracker bounded by the screen scissor `root_target_rect`.
    /// Opaque rects smaller than `minimum_tracking_size` in both dimensions
    /// are not tracked.
    #[must_use]
    pub fn new(root_target_rect: Rect, minimum_tracking_size: Size) -> Self {
        Self {
            root_target_rect,
            minimum_tracking_size,
            stack: Vec::new(),
        }
    }

    /// Occlusion gathered so far in screen space, for the current target.
    #[must_use]
    pub fn occlusion_in_screen_space(&self) -> Region {
        self.stack
            .last()
            .map(|f| f.occlusion_in_screen.clone())
            .unwrap_or_default()
    }

    /// Occlusion gathered so far in the current target surface's space.
    #[must_use]
    pub fn occlusion_in_target_surface(&self) -> Region {
        self.stack
            .last()
            .map(|f| f.occlusion_in_target.clone())
            .unwrap_or_default()
    }

    // -- Walk --

    /// Called before visiting a layer drawing into `target`.
    pub fn enter_layer(&mut self, target: &SurfaceOcclusion) {
        self.enter_render_target(target);
    }

    /// Called after visiting a layer; records its opaque coverage.
    pub fn leave_layer(&mut self, layer: &LayerOcclusion, target: &SurfaceOcclusion) {
        self.mark_occluded_behind_layer(layer, target);
    }

    /// Called when every layer of `surface` has been visited.
    pub fn enter_target_surface(&mut self, surface: &SurfaceOcclusion) {
        // An empty surface may not have been entered yet.
        self.enter_render_target(surface);
        if surface.clears_occlusion() {
            if let Some(top) = self.stack.last_mut() {
                top.occlusion_in_screen.clear();
                top.occlusion_in_target.clear();
            }
        }
    }

    /// Called after `surface` was drawn into `new_target`; merges its
    /// occlusion into the parent target.
    pub fn leave_contributing_surface(
        &mut self,
        surface: &SurfaceOcclusion,
        new_target: &SurfaceOcclusion,
    ) {
        let Some(top) = self.stack.last() else {
            return;
        };
        assert!(
            top.target == surface.owner,
            "contributing surface left while not the current target"
        );
        let mut in_new_target = if surface.transforms_animating {
            Region::new()
        } else {
            transform_surface_opaque_region(surface, &top.occlusion_in_target, &surface.draw_transform)
        };
        if let Some(replica) = surface.replica_draw_transform {
            if !surface.replica_has_mask && !surface.transforms_animating {
                in_new_target.union(&transform_surface_opaque_region(
                    surface,
                    &top.occlusion_in_target,
                    &replica,
                ));
            }
        }

        let len = self.stack.len();
        let parent_is_below = len > 1 && self.stack[len - 2].target == new_target.owner;
        if parent_is_below {
            let Some(top) = self.stack.pop() else {
                return;
            };
            let parent = &mut self.stack[len - 2];
            parent.occlusion_in_screen.union(&top.occlusion_in_screen);
            parent.occlusion_in_target.union(&in_new_target);
        } else if let Some(top) = self.stack.last_mut() {
            // The parent has nothing drawn in front of this surface yet.
            top.target = new_target.owner;
            top.moves_pixels_ancestor = new_target.nearest_ancestor_that_moves_pixels;
            top.occlusion_in_target = in_new_target;
        }
    }

    // -- Queries --

    /// Returns whether `content_rect` of `layer` is hidden by occlusion.
    ///
    /// An empty rect, or one that maps to nothing, is occluded. Otherwise the
    /// mapped rect, rounded outwards, must lie inside the clip and be covered
    /// by occlusion, either in the target or in screen space.
    #[must_use]
    pub fn occluded(&self, layer: &LayerOcclusion, content_rect: Rect) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        if geometry::is_empty(content_rect) {
            return true;
        }
        if !layer.transforms_animating
            && rect_occluded(
                content_rect,
                &layer.draw_transform,
                layer.clip_rect_in_target,
                &top.occlusion_in_target,
            )
        {
            return true;
        }
        !layer.transforms_animating
            && rect_occluded(
                content_rect,
                &layer.screen_space_transform,
                self.root_target_rect,
                &top.occlusion_in_screen,
            )
    }

    /// The part of `content_rect` of `layer` that may still be visible,
    /// clamped to `content_rect`.
    #[must_use]
    pub fn unoccluded_content_rect(&self, layer: &LayerOcclusion, content_rect: Rect) -> Rect {
        let Some(top) = self.stack.last() else {
            return content_rect;
        };
        if geometry::is_empty(content_rect) || layer.transforms_animating {
            return content_rect;
        }
        let in_screen = unoccluded_rect(
            content_rect,
            &layer.screen_space_transform,
            self.root_target_rect,
            &top.occlusion_in_screen,
        );
        if geometry::is_empty(in_screen) {
            return Rect::ZERO;
        }
        let in_target = unoccluded_rect(
            content_rect,
            &layer.draw_transform,
            layer.clip_rect_in_target,
            &top.occlusion_in_target,
        );
        geometry::intersect(in_screen, in_target)
    }

    /// Returns whether the contributing `surface` (or its replica) is hidden
    /// by occlusion from outside the surface.
    #[must_use]
    pub fn surface_occluded(
        &self,
        surface: &SurfaceOcclusion,
        for_replica: bool,
        content_rect: Rect,
    ) -> bool {
        if geometry::is_empty(content_rect) {
            return true;
        }
        if surface.transforms_animating {
            return false;
        }
        let Some((to_target, to_screen)) = surface_transforms(surface, for_replica) else {
            return false;
        };
        let Some((in_screen, in_target)) = self.outside_occlusion(surface) else {
            return false;
        };
        rect_occluded(content_rect, &to_target, surface.clip_rect, in_target)
            || rect_occluded(content_rect, &to_screen, self.root_target_rect, in_screen)
    }

    /// The part of `content_rect` of the contributing `surface` (or its
    /// replica) that may still be visible.
    #[must_use]
    pub fn surface_unoccluded_content_rect(
        &self,
        surface: &SurfaceOcclusion,
        for_replica: bool,
        content_rect: Rect,
    ) -> Rect {
        if geometry::is_empty(content_rect) || surface.transforms_animating {
            return content_rect;
        }
        let Some((to_target, to_screen)) = surface_transforms(surface, for_replica) else {
            return content_rect;
        };
        let empty = Region::new();
        let (in_screen, in_target) = self.outside_occlusion(surface).unwrap_or((&empty, &empty));
        let screen = unoccluded_rect(content_rect, &to_screen, self.root_target_rect, in_screen);
        if geometry::is_empty(screen) {
            return Rect::ZERO;
        }
        let target = unoccluded_rect(content_rect, &to_target, surface.clip_rect, in_target);
        geometry::intersect(screen, target)
    }

    // -- Internals --

    /// Occlusion from outside `surface`: the frame just below it, which
    /// must be its parent target for the target-space part to apply.
    fn outside_occlusion(&self, surface: &SurfaceOcclusion) -> Option<(&Region, &Region)> {
        let len = self.stack.len();
        if len < 2 || self.stack[len - 1].target != surface.owner {
            return None;
        }
        let below = &self.stack[len - 2];
        Some((&below.occlusion_in_screen, &below.occlusion_in_target))
    }

    fn enter_render_target(&mut self, new_target: &SurfaceOcclusion) {
        if self.stack.last().is_some_and(|f| f.target == new_target.owner) {
            return;
        }
        let old_moves_pixels = self.stack.last().and_then(|f| f.moves_pixels_ancestor);
        let new_moves_pixels = new_target.nearest_ancestor_that_moves_pixels;
        let entering_pixel_moving_subtree =
            new_moves_pixels.is_some() && new_moves_pixels != old_moves_pixels;

        // Screen occlusion carries into the subtree; target occlusion never
        // does, since the subtree draws into a new target.
        let occlusion_in_screen = match self.stack.last() {
            Some(f) if !entering_pixel_moving_subtree => f.occlusion_in_screen.clone(),
            _ => Region::new(),
        };
        self.stack.push(StackFrame {
            target: new_target.owner,
            moves_pixels_ancestor: new_moves_pixels,
            occlusion_in_screen,
            occlusion_in_target: Region::new(),
        });
    }

    fn mark_occluded_behind_layer(&mut self, layer: &LayerOcclusion, target: &SurfaceOcclusion) {
        let min = self.minimum_tracking_size;
        let root_target_rect = self.root_target_rect;
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        assert!(
            top.target == target.owner,
            "layer left outside its target surface"
        );
        if layer.opacity_animating || layer.draw_opacity < 1.0 || layer.transforms_animating {
            return;
        }
        let Some(opaque) = layer
            .opaque_rect
            .map(|r| geometry::intersect(r, layer.visible_content_rect))
            .filter(|r| !geometry::is_empty(*r))
        else {
            return;
        };

        add_occlusion_behind_layer(
            &mut top.occlusion_in_target,
            layer.visible_content_rect,
            &layer.draw_transform,
            opaque,
            layer.clip_rect_in_target,
            min,
        );

        // The clip must stay a rect in screen space too.
        if target.transforms_animating {
            return;
        }
        let (clip_quad, clipped) = target
            .screen_space_transform
            .map_quad(layer.clip_rect_in_target);
        if clipped || !clip_quad.is_rectilinear() {
            return;
        }
        let clip_in_screen =
            geometry::intersect(root_target_rect, geometry::enclosed(clip_quad.bounding_box()));
        add_occlusion_behind_layer(
            &mut top.occlusion_in_screen,
            layer.visible_content_rect,
            &layer.screen_space_transform,
            opaque,
            clip_in_screen,
            min,
        );
    }
}

fn surface_transforms(
    surface: &SurfaceOcclusion,
    for_replica: bool,
) -> Option<(Transform3d, Transform3d)> {
    if for_replica {
        Some((
            surface.replica_draw_transform?,
            surface.replica_screen_space_transform?,
        ))
    } else {
        Some((surface.draw_transform, surface.screen_space_transform))
    }
}

fn add_occlusion_behind_layer(
    region: &mut Region,
    visible_content_rect: Rect,
    transform: &Transform3d,
    opaque: Rect,
    clip: Rect,
    minimum_tracking_size: Size,
) {
    let (quad, clipped) = transform.map_quad(visible_content_rect);
    if clipped || !quad.is_rectilinear() {
        return;
    }
    let rect = geometry::intersect(
        geometry::enclosed(transform.map_clipped_rect(opaque)),
        clip,
    );
    if rect.width() >= minimum_tracking_size.width || rect.height() >= minimum_tracking_size.height
    {
        region.union_rect(rect);
    }
}

/// Maps `region` out of `surface` through `transform`, keeping it only if
/// its bounds stay a rect.
fn transform_surface_opaque_region(
    surface: &SurfaceOcclusion,
    region: &Region,
    transform: &Transform3d,
) -> Region {
    let mut out = Region::new();
    if region.is_empty() {
        return out;
    }
    let (quad, clipped) = transform.map_quad(region.bounds());
    if clipped || !quad.is_rectilinear() {
        return out;
    }
    for r in region.rects() {
        let mapped = geometry::enclosed(transform.map_clipped_rect(*r));
        out.union_rect(geometry::intersect(mapped, surface.clip_rect));
    }
    out
}

fn rect_occluded(content_rect: Rect, transform: &Transform3d, clip: Rect, occlusion: &Region) -> bool {
    let target_rect = geometry::enclosing(transform.map_clipped_rect(content_rect));
    if geometry::is_empty(target_rect) {
        return true;
    }
    geometry::contains(clip, target_rect) && occlusion.contains_rect(target_rect)
}

fn unoccluded_rect(content_rect: Rect, transform: &Transform3d, clip: Rect, occlusion: &Region) -> Rect {
    let Some(inverse) = transform.inverse() else {
        return content_rect;
    };
    let mut visible = Region::from_rect(geometry::intersect(
        geometry::enclosing(transform.map_clipped_rect(content_rect)),
        clip,
    ));
    visible.subtract(occlusion);
    let shrunk = visible.bounds();
    if geometry::is_empty(shrunk) {
        return Rect::ZERO;
    }
    match inverse.project_clipped_rect(shrunk) {
        Some(r) => geometry::intersect(geometry::enclosing(r), content_rect),
        None => content_rect,
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::FRAC_PI_2;
    use core::f64::consts::FRAC_PI_4;

    use strata_core::layer::LayerStore;

    use super::*;

    const SCREEN: Rect = Rect::new(0.0, 0.0, 1000.0, 1000.0);

    fn ids(n: usize) -> Vec<LayerId> {
        let mut store = LayerStore::new();
        (0..n).map(|_| store.create_layer()).collect()
    }

    fn root_surface(owner: LayerId) -> SurfaceOcclusion {
        SurfaceOcclusion {
            owner,
            content_rect: SCREEN,
            clip_rect: SCREEN,
            draw_transform: Transform3d::IDENTITY,
            screen_space_transform: Transform3d::IDENTITY,
            replica_draw_transform: None,
            replica_screen_space_transform: None,
            replica_has_mask: false,
            has_mask: false,
            draw_opacity: 1.0,
            opacity_animating: false,
            filter: None,
            transforms_animating: false,
            nearest_ancestor_that_moves_pixels: None,
        }
    }

    fn opaque_layer(id: LayerId, transform: Transform3d, size: f64) -> LayerOcclusion {
        let rect = Rect::new(0.0, 0.0, size, size);
        LayerOcclusion {
            id,
            draw_transform: transform,
            screen_space_transform: transform,
            draw_opacity: 1.0,
            opacity_animating: false,
            visible_content_rect: rect,
            opaque_rect: Some(rect),
            clip_rect_in_target: SCREEN,
            transforms_animating: false,
        }
    }

    fn tracker() -> OcclusionTracker {
        OcclusionTracker::new(SCREEN, Size::ZERO)
    }

    fn visit(t: &mut OcclusionTracker, layer: &LayerOcclusion, target: &SurfaceOcclusion) {
        t.enter_layer(target);
        t.leave_layer(layer, target);
    }

    #[test]
    fn axis_aligned_occluder_hides_layers_behind() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut t = tracker();
        visit(
            &mut t,
            &opaque_layer(id[1], Transform3d::from_translation(30.0, 30.0, 0.0), 100.0),
            &root,
        );
        assert_eq!(
            t.occlusion_in_target_surface().bounds(),
            Rect::new(30.0, 30.0, 130.0, 130.0)
        );
        assert_eq!(
            t.occlusion_in_screen_space().bounds(),
            Rect::new(30.0, 30.0, 130.0, 130.0)
        );

        t.enter_layer(&root);
        let behind = opaque_layer(id[2], Transform3d::from_translation(30.0, 30.0, 0.0), 70.0);
        assert!(t.occluded(&behind, Rect::new(0.0, 0.0, 70.0, 70.0)), "fully covered");
        assert!(!t.occluded(&behind, Rect::new(0.0, 0.0, 101.0, 70.0)), "sticks out");

        let beside = opaque_layer(id[2], Transform3d::from_translation(100.0, 30.0, 0.0), 100.0);
        assert_eq!(
            t.unoccluded_content_rect(&beside, Rect::new(0.0, 0.0, 100.0, 100.0)),
            Rect::new(30.0, 0.0, 100.0, 100.0)
        );
    }

    #[test]
    fn translucent_layers_do_not_occlude() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut t = tracker();
        let mut layer = opaque_layer(id[1], Transform3d::IDENTITY, 100.0);
        layer.draw_opacity = 0.5;
        visit(&mut t, &layer, &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "opacity < 1");

        layer.draw_opacity = 1.0;
        layer.transforms_animating = true;
        visit(&mut t, &layer, &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "animating transform");

        layer.transforms_animating = false;
        layer.opaque_rect = None;
        visit(&mut t, &layer, &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "no opaque content");
    }

    #[test]
    fn rotated_by_right_angle_occludes() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut t = tracker();
        let rotated = Transform3d::from_translation(250.0, 250.0, 0.0)
            * Transform3d::from_rotation_z(FRAC_PI_2)
            * Transform3d::from_translation(-50.0, -50.0, 0.0);
        visit(&mut t, &opaque_layer(id[1], rotated, 100.0), &root);

        t.enter_layer(&root);
        let behind = opaque_layer(id[2], Transform3d::IDENTITY, 1000.0);
        assert!(
            t.occluded(&behind, Rect::new(210.0, 210.0, 290.0, 290.0)),
            "rect inside the rotated occluder"
        );
        assert!(!t.occluded(&behind, Rect::new(150.0, 150.0, 290.0, 290.0)), "partly outside");
    }

    #[test]
    fn off_axis_rotation_contributes_nothing() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut t = tracker();
        let rotated = Transform3d::from_translation(250.0, 250.0, 0.0)
            * Transform3d::from_rotation_z(FRAC_PI_4)
            * Transform3d::from_translation(-50.0, -50.0, 0.0);
        visit(&mut t, &opaque_layer(id[1], rotated, 100.0), &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "quad is not rectilinear");

        t.enter_layer(&root);
        let behind = opaque_layer(id[2], Transform3d::IDENTITY, 1000.0);
        assert!(!t.occluded(&behind, Rect::new(245.0, 245.0, 255.0, 255.0)), "center is visible");
    }

    #[test]
    fn layer_behind_camera_contributes_nothing() {
        let id = ids(2);
        let root = root_surface(id[0]);
        let mut t = tracker();
        let behind_camera =
            Transform3d::from_perspective(100.0) * Transform3d::from_translation(0.0, 0.0, 150.0);
        visit(&mut t, &opaque_layer(id[1], behind_camera, 100.0), &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "target occlusion");
        assert!(t.occlusion_in_screen_space().is_empty(), "screen occlusion");
    }

    #[test]
    fn clip_bounds_contributions() {
        let id = ids(2);
        let root = root_surface(id[0]);
        let mut t = tracker();
        let mut layer = opaque_layer(id[1], Transform3d::IDENTITY, 200.0);
        layer.clip_rect_in_target = Rect::new(0.0, 0.0, 50.0, 50.0);
        visit(&mut t, &layer, &root);
        assert_eq!(
            t.occlusion_in_target_surface().bounds(),
            Rect::new(0.0, 0.0, 50.0, 50.0)
        );
    }

    #[test]
    fn minimum_tracking_size_filters_small_rects() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut t = OcclusionTracker::new(SCREEN, Size::new(160.0, 160.0));
        visit(&mut t, &opaque_layer(id[1], Transform3d::IDENTITY, 100.0), &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "too small");
        visit(&mut t, &opaque_layer(id[2], Transform3d::IDENTITY, 200.0), &root);
        assert!(!t.occlusion_in_target_surface().is_empty(), "large enough");
    }

    #[test]
    fn surface_occlusion_merges_into_parent() {
        let id = ids(4);
        let root = root_surface(id[0]);
        let mut child = root_surface(id[1]);
        child.content_rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        child.draw_transform = Transform3d::from_translation(200.0, 0.0, 0.0);
        child.screen_space_transform = child.draw_transform;
        child.replica_draw_transform = Some(Transform3d::from_translation(200.0, 100.0, 0.0));
        child.replica_screen_space_transform = child.replica_draw_transform;

        let mut t = tracker();
        let mut inside = opaque_layer(id[2], Transform3d::IDENTITY, 100.0);
        inside.screen_space_transform = child.screen_space_transform;
        visit(&mut t, &inside, &child);
        t.enter_target_surface(&child);
        t.leave_contributing_surface(&child, &root);
        let region = t.occlusion_in_target_surface();
        assert_eq!(region.bounds(), Rect::new(200.0, 0.0, 300.0, 200.0));
        assert_eq!(region.area(), 20_000.0);

        t.enter_layer(&root);
        let behind = opaque_layer(id[3], Transform3d::from_translation(200.0, 150.0, 0.0), 40.0);
        assert!(t.occluded(&behind, Rect::new(0.0, 0.0, 40.0, 40.0)), "covered by the replica");
    }

    #[test]
    fn masked_or_translucent_surface_contributes_nothing() {
        let id = ids(3);
        let root = root_surface(id[0]);
        let mut child = root_surface(id[1]);
        child.draw_opacity = 0.5;

        let mut t = tracker();
        visit(&mut t, &opaque_layer(id[2], Transform3d::IDENTITY, 100.0), &child);
        t.enter_target_surface(&child);
        t.leave_contributing_surface(&child, &root);
        assert!(t.occlusion_in_target_surface().is_empty(), "translucent surface");
        assert!(t.occlusion_in_screen_space().is_empty(), "screen occlusion cleared too");
    }

    #[test]
    fn pixel_moving_subtree_discards_screen_occlusion() {
        let id = ids(4);
        let root = root_surface(id[0]);
        let mut blurred = root_surface(id[1]);
        blurred.filter = Some(FilterOp::Blur { radius: 4.0 });
        blurred.nearest_ancestor_that_moves_pixels = Some(id[1]);

        let mut t = tracker();
        visit(&mut t, &opaque_layer(id[2], Transform3d::IDENTITY, 100.0), &root);
        t.enter_layer(&blurred);
        let inside = opaque_layer(id[3], Transform3d::IDENTITY, 50.0);
        assert!(!t.occluded(&inside, Rect::new(0.0, 0.0, 50.0, 50.0)), "occlusion discarded");
    }

    #[test]
    fn contributing_surface_sees_only_outside_occlusion() {
        let id = ids(4);
        let root = root_surface(id[0]);
        let mut child = root_surface(id[1]);
        child.content_rect = Rect::new(0.0, 0.0, 100.0, 100.0);

        let mut t = tracker();
        // In front of the surface, in the root target.
        visit(&mut t, &opaque_layer(id[2], Transform3d::IDENTITY, 60.0), &root);
        // Inside the surface.
        visit(&mut t, &opaque_layer(id[3], Transform3d::IDENTITY, 100.0), &child);
        t.enter_target_surface(&child);

        assert_eq!(
            t.surface_unoccluded_content_rect(&child, false, Rect::new(0.0, 0.0, 100.0, 100.0)),
            Rect::new(0.0, 0.0, 100.0, 100.0),
            "L-shaped remainder has full bounds"
        );
        assert!(
            t.surface_occluded(&child, false, Rect::new(0.0, 0.0, 60.0, 60.0)),
            "covered from outside"
        );
        assert!(
            !t.surface_occluded(&child, true, Rect::new(0.0, 0.0, 60.0, 60.0)),
            "no replica transform"
        );
        assert_eq!(
            t.surface_unoccluded_content_rect(&child, false, Rect::new(0.0, 0.0, 100.0, 60.0)),
            Rect::new(60.0, 0.0, 100.0, 60.0)
        );
    }
}
