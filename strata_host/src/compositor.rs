// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compositor-side host.
//!
//! [`CompositorHost`] owns the active layer tree. Between commits it ticks
//! animations and applies scroll and pinch input; at a commit it merges the
//! pending tree and binds texture backings; at draw time it runs the
//! draw-property pass, updates damage children first, culls quads against
//! occlusion front to back, and hands render passes to a [`Renderer`].

use std::collections::HashMap;

use log::{debug, warn};
use strata_core::geometry;
use strata_core::kurbo::{Point, Rect, Size, Vec2};
use strata_core::layer::{LayerContent, LayerId};
use strata_core::time::HostTime;
use strata_core::trace::{
    BeginFrameEvent, CommitEvent, ContextLostEvent, DrawEvent, FrameSummaryBuilder,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, StaleFrameEvent, TextureMemoryEvent, TraceSink,
    Tracer,
};
use strata_render::{
    BackingAllocator, DamageContributor, DrawQuad, DrawStats, LayerDamage, LayerOcclusion,
    MaskDamage, OcclusionTracker, QuadMaterial, RenderPass, RenderPassId, RenderPassList,
    ReplicaDamage, SurfaceDamage, SurfaceOcclusion, TargetSurfaceDamage,
};

use crate::draw_properties::calculate_draw_properties;
use crate::host::PendingTree;
use crate::iterator::{IteratorPosition, front_to_back};
use crate::renderer::Renderer;
use crate::settings::Settings;
use crate::sync::{SyncStats, clamp_scroll_delta, synchronize_trees};
use crate::time;
use crate::tree::{LayerImpl, LayerTreeImpl};

/// Scroll applied to one layer on the compositor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerScroll {
    /// The scrolled layer.
    pub layer: LayerId,
    /// Offset added since the client last saw the layer.
    pub delta: Vec2,
}

/// Compositor-side input reported to the client at a begin-frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrollAndScaleSet {
    /// Scrolled layers, sorted by id.
    pub scrolls: Vec<LayerScroll>,
    /// Factor to multiply the page scale by.
    pub page_scale_delta: f64,
}

impl Default for ScrollAndScaleSet {
    fn default() -> Self {
        Self {
            scrolls: Vec::new(),
            page_scale_delta: 1.0,
        }
    }
}

impl ScrollAndScaleSet {
    /// Returns whether the set carries no input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scrolls.is_empty() && self.page_scale_delta == 1.0
    }
}

/// Everything needed to draw one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameData {
    /// Passes in draw order, the root last.
    pub render_passes: RenderPassList,
    /// Counters gathered while building the passes.
    pub stats: DrawStats,
    /// Root damage, in screen space.
    pub root_damage: Rect,
    /// Whether nothing changed and drawing can be skipped.
    pub has_no_damage: bool,
    /// Whether a layer with a missing texture is moving under an animation.
    pub contains_incomplete_animating: bool,
}

/// Result of [`CompositorHost::draw_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The frame was drawn and swapped.
    Drawn,
    /// Nothing needed drawing.
    Skipped,
    /// The frame was not drawn because animated content was incomplete.
    Dropped,
    /// The graphics context was lost.
    ContextLost,
}

impl DrawOutcome {
    /// Whether the scheduler should treat the draw as done.
    #[must_use]
    pub fn succeeded(self) -> bool {
        matches!(self, Self::Drawn | Self::Skipped)
    }
}

/// Owns the active tree and produces frames from it.
pub struct CompositorHost {
    settings: Settings,
    tree: LayerTreeImpl,

    // -- Viewport --
    viewport_size: Size,
    viewport_changed: bool,
    page_scale_factor: f64,
    min_page_scale: f64,
    max_page_scale: f64,
    page_scale_delta: f64,
    sent_page_scale_delta: f64,

    // -- Frame state --
    frame_index: u64,
    needs_backing_reset: bool,
    sink: Option<Box<dyn TraceSink + Send>>,
}

impl core::fmt::Debug for CompositorHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompositorHost")
            .field("settings", &self.settings)
            .field("tree", &self.tree)
            .field("viewport_size", &self.viewport_size)
            .field("viewport_changed", &self.viewport_changed)
            .field("page_scale_factor", &self.page_scale_factor)
            .field("min_page_scale", &self.min_page_scale)
            .field("max_page_scale", &self.max_page_scale)
            .field("page_scale_delta", &self.page_scale_delta)
            .field("sent_page_scale_delta", &self.sent_page_scale_delta)
            .field("frame_index", &self.frame_index)
            .field("needs_backing_reset", &self.needs_backing_reset)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl CompositorHost {
    /// Creates a host with an empty tree.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            tree: LayerTreeImpl::new(),
            viewport_size: Size::ZERO,
            viewport_changed: false,
            page_scale_factor: 1.0,
            min_page_scale: 1.0,
            max_page_scale: 1.0,
            page_scale_delta: 1.0,
            sent_page_scale_delta: 1.0,
            frame_index: 0,
            needs_backing_reset: false,
            sink: None,
        }
    }

    // -- Accessors --

    /// The active tree.
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &LayerTreeImpl {
        &self.tree
    }

    /// The committed viewport size.
    #[inline]
    #[must_use]
    pub fn viewport_size(&self) -> Size {
        self.viewport_size
    }

    /// Page scale including compositor-side pinch.
    #[must_use]
    pub fn total_page_scale_factor(&self) -> f64 {
        self.page_scale_factor * self.page_scale_delta
    }

    /// Frames prepared so far.
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Returns whether there is something to draw into.
    #[must_use]
    pub fn can_draw(&self) -> bool {
        self.tree.root().is_some()
            && self.viewport_size.width > 0.0
            && self.viewport_size.height > 0.0
    }

    /// Returns whether any layer has a running animation.
    #[must_use]
    pub fn has_active_animations(&self) -> bool {
        self.tree.layers().any(|l| !l.animations.is_empty())
    }

    /// Installs (or removes) the trace sink.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) {
        self.sink = sink;
    }

    fn tracer(&mut self) -> Tracer<'_> {
        match self.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        }
    }

    // -- Input between commits --

    /// Ticks every animation at `now`. Returns whether any ran.
    pub fn animate(&mut self, now: HostTime) -> bool {
        let mut changed = Vec::new();
        for layer in self.tree.layers_mut() {
            if layer.animations.is_empty() {
                continue;
            }
            let tick = layer.animations.tick(now);
            if let Some(opacity) = tick.opacity {
                layer.opacity = opacity;
            }
            if let Some(transform) = tick.transform {
                layer.transform = transform;
            }
            changed.push(layer.id);
        }
        for id in &changed {
            self.tree.note_subtree_property_changed(*id);
        }
        !changed.is_empty()
    }

    /// Scrolls a scrollable layer by `delta`, clamped to its scroll range.
    /// Returns whether the offset changed.
    pub fn scroll_by(&mut self, id: LayerId, delta: Vec2) -> bool {
        let Some(layer) = self.tree.layer_mut(id) else {
            return false;
        };
        if !layer.flags.scrollable {
            return false;
        }
        let before = layer.scroll_offset();
        layer.scroll_delta += delta;
        clamp_scroll_delta(layer);
        let moved = layer.scroll_offset() != before;
        if moved {
            self.tree.note_descendants_property_changed(id);
        }
        moved
    }

    /// Multiplies the page scale by `magnify`, clamped to the page scale
    /// limits. Returns whether the scale changed.
    pub fn pinch_zoom_by(&mut self, magnify: f64) -> bool {
        if !(magnify.is_finite() && magnify > 0.0) {
            return false;
        }
        let before = self.page_scale_delta;
        self.page_scale_delta *= magnify;
        self.clamp_page_scale_delta();
        let changed = self.page_scale_delta != before;
        if changed {
            self.note_page_scale_changed();
        }
        changed
    }

    /// Collects input the client has not seen yet, remembering what was
    /// sent so the next commit can subtract it.
    pub fn process_scroll_deltas(&mut self) -> ScrollAndScaleSet {
        let mut scrolls = Vec::new();
        for id in self.tree.sorted_ids() {
            let Some(layer) = self.tree.layer_mut(id) else {
                continue;
            };
            if layer.scroll_delta != Vec2::ZERO {
                scrolls.push(LayerScroll {
                    layer: id,
                    delta: layer.scroll_delta,
                });
            }
            layer.sent_scroll_delta = layer.scroll_delta;
        }
        self.sent_page_scale_delta = self.page_scale_delta;
        ScrollAndScaleSet {
            scrolls,
            page_scale_delta: self.page_scale_delta,
        }
    }

    fn clamp_page_scale_delta(&mut self) {
        if self.page_scale_factor <= 0.0 {
            self.page_scale_delta = 1.0;
            return;
        }
        let total = (self.page_scale_factor * self.page_scale_delta)
            .clamp(self.min_page_scale, self.max_page_scale.max(self.min_page_scale));
        self.page_scale_delta = total / self.page_scale_factor;
    }

    fn note_page_scale_changed(&mut self) {
        if let Some(root) = self.tree.root() {
            self.tree.note_descendants_property_changed(root);
        }
    }

    // -- Commit --

    /// Merges `pending` into the active tree and binds texture backings.
    pub(crate) fn commit(
        &mut self,
        pending: &mut PendingTree,
        allocator: &mut dyn BackingAllocator,
        sequence: u64,
    ) -> SyncStats {
        let frame_index = self.frame_index;
        let started = time::now();
        self.tracer().phase_begin(&PhaseBeginEvent {
            frame_index,
            phase: PhaseKind::Commit,
            timestamp: started,
        });

        if self.needs_backing_reset {
            pending.textures.all_backings_were_deleted();
            self.needs_backing_reset = false;
        }

        let stats = synchronize_trees(
            &mut pending.layers,
            pending.root,
            &pending.changes,
            &pending.content_textures,
            &mut self.tree,
        );
        #[cfg(feature = "trace-rich")]
        self.trace_layer_changes(&pending.changes);
        pending.changes.clear();
        self.tree.set_source_frame_number(pending.source_frame_number);

        if pending.viewport_size != self.viewport_size {
            self.viewport_size = pending.viewport_size;
            self.viewport_changed = true;
        }
        let scale_before = self.total_page_scale_factor();
        self.page_scale_factor = pending.page_scale_factor;
        self.min_page_scale = pending.min_page_scale;
        self.max_page_scale = pending.max_page_scale;
        if self.sent_page_scale_delta > 0.0 {
            self.page_scale_delta /= self.sent_page_scale_delta;
        }
        self.sent_page_scale_delta = 1.0;
        self.clamp_page_scale_delta();
        if self.total_page_scale_factor() != scale_before {
            self.note_page_scale_changed();
        }

        let evicted = self.bind_textures(pending, allocator);

        let layer_count = u32::try_from(self.tree.len()).unwrap_or(u32::MAX);
        let finished = time::now();
        let manager = &pending.textures;
        let memory = TextureMemoryEvent {
            frame_index,
            memory_use_bytes: manager.memory_use_bytes(),
            memory_above_cutoff_bytes: manager.memory_above_cutoff_bytes(),
            max_memory_bytes: manager.max_memory_limit_bytes(),
            evicted_backings: evicted,
        };
        let mut tracer = self.tracer();
        tracer.commit(&CommitEvent {
            frame_index,
            sequence,
            layer_count,
            created: stats.created,
            destroyed: stats.destroyed,
        });
        tracer.texture_memory(&memory);
        tracer.phase_end(&PhaseEndEvent {
            frame_index,
            phase: PhaseKind::Commit,
            timestamp: finished,
        });
        stats
    }

    /// Acquires backings for granted requests, trims memory, and points every
    /// layer at its backing. Returns how many backings were evicted.
    fn bind_textures(
        &mut self,
        pending: &mut PendingTree,
        allocator: &mut dyn BackingAllocator,
    ) -> u32 {
        let mut ids: Vec<(LayerId, _)> = pending
            .content_textures
            .iter()
            .map(|(layer, texture)| (*layer, *texture))
            .collect();
        ids.sort_unstable_by_key(|(layer, _)| *layer);

        let manager = &mut pending.textures;
        let evicted = {
            let mut access = manager.impl_access(allocator);
            for (_, texture) in &ids {
                if access.manager().contains(*texture) && access.manager().is_above_cutoff(*texture)
                {
                    access.acquire_backing_if_needed(*texture);
                }
            }
            let before = access.manager().backing_count();
            access.reduce_memory();
            before.saturating_sub(access.manager().backing_count())
        };
        if evicted > 0 {
            debug!("evicted {evicted} texture backings at commit");
        }

        for layer in self.tree.layers_mut() {
            let resource = layer
                .texture
                .filter(|t| manager.contains(*t))
                .and_then(|t| manager.backing(t));
            if resource != layer.resource {
                layer.resource = resource;
                layer.update_rect = geometry::union(layer.update_rect, layer.content_rect());
            }
        }
        u32::try_from(evicted).unwrap_or(u32::MAX)
    }

    // -- Drawing --

    /// Animates, prepares, draws, and swaps one frame.
    ///
    /// A forced draw ignores missing animated content and redraws the whole
    /// viewport even without damage.
    pub fn draw_frame(&mut self, renderer: &mut dyn Renderer, forced: bool) -> DrawOutcome {
        if renderer.is_context_lost() {
            self.did_lose_context();
            return DrawOutcome::ContextLost;
        }
        if !self.can_draw() {
            return DrawOutcome::Skipped;
        }

        let frame_index = self.frame_index;
        self.frame_index += 1;
        let now = time::now();
        let mut summary = FrameSummaryBuilder::new(frame_index, now);
        self.animate(now);

        let frame = self.timed(&mut summary, frame_index, PhaseKind::PrepareToDraw, |host| {
            host.prepare_to_draw(forced)
        });
        let dropped = frame.contains_incomplete_animating && !forced;
        if dropped || frame.has_no_damage {
            if !dropped {
                self.tree.did_draw_all_layers();
            }
            self.trace_draw(frame_index, &frame.stats, dropped);
            summary.set_dropped(dropped);
            self.tracer().frame_summary(&summary.finish());
            return if dropped {
                debug!("dropping frame {frame_index} with incomplete animated content");
                DrawOutcome::Dropped
            } else {
                DrawOutcome::Skipped
            };
        }

        self.timed(&mut summary, frame_index, PhaseKind::Draw, |host| {
            host.draw_layers(&frame, renderer);
        });
        self.trace_draw(frame_index, &frame.stats, false);
        let swap_damage = frame
            .render_passes
            .root()
            .map_or(Rect::ZERO, |root| root.scissor_rect);
        let swapped = self.timed(&mut summary, frame_index, PhaseKind::Swap, |_| {
            renderer.swap_buffers(swap_damage)
        });
        self.tracer().frame_summary(&summary.finish());

        if swapped {
            DrawOutcome::Drawn
        } else {
            self.did_lose_context();
            DrawOutcome::ContextLost
        }
    }

    fn timed<T>(
        &mut self,
        summary: &mut FrameSummaryBuilder,
        frame_index: u64,
        phase: PhaseKind,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let begin = time::now();
        summary.phase_begin(phase, begin);
        self.tracer().phase_begin(&PhaseBeginEvent {
            frame_index,
            phase,
            timestamp: begin,
        });
        let out = f(self);
        let end = time::now();
        summary.phase_end(phase, end);
        self.tracer().phase_end(&PhaseEndEvent {
            frame_index,
            phase,
            timestamp: end,
        });
        out
    }

    fn trace_draw(&mut self, frame_index: u64, stats: &DrawStats, dropped: bool) {
        self.tracer().draw(&DrawEvent {
            frame_index,
            render_passes: stats.render_passes,
            quads: stats.quads,
            culled_quads: stats.culled_quads,
            missing_textures: stats.missing_textures,
            dropped,
        });
    }

    /// Computes draw properties and damage and builds the render passes.
    pub fn prepare_to_draw(&mut self, forced: bool) -> FrameData {
        let mut frame = FrameData::default();
        let Some(root) = self.tree.root() else {
            frame.has_no_damage = true;
            return frame;
        };
        let viewport = Rect::from_origin_size(Point::ORIGIN, self.viewport_size);
        let page_scale = self.total_page_scale_factor();
        calculate_draw_properties(&mut self.tree, self.viewport_size, page_scale);

        self.update_damage();
        self.viewport_changed = false;

        let root_damage = self
            .tree
            .surface(root)
            .map_or(Rect::ZERO, |s| geometry::intersect(s.damage.current_damage_rect(), viewport));
        frame.root_damage = root_damage;
        frame.has_no_damage = !forced && geometry::is_empty(root_damage);
        if frame.has_no_damage {
            return frame;
        }

        #[cfg(feature = "trace-rich")]
        self.trace_damage(root_damage);

        let mut quads = self.build_quads(viewport, &mut frame);
        let surfaces: Vec<LayerId> = self.tree.render_surface_list().to_vec();
        for owner in surfaces.iter().rev() {
            let Some(surface) = self.tree.surface(*owner) else {
                continue;
            };
            let mut pass = RenderPass::new(
                RenderPassId(*owner),
                surface.content_rect,
                surface.screen_space_transform,
            );
            pass.damage_rect = surface.damage.current_damage_rect();
            if *owner == root && self.settings.partial_swap_enabled && !forced {
                pass.scissor_rect = geometry::intersect(geometry::enclosing(root_damage), viewport);
            }
            let mut list = quads.remove(owner).unwrap_or_default();
            list.reverse();
            pass.quads = list;
            frame.render_passes.passes.push(pass);
        }
        frame.stats.render_passes = u32::try_from(frame.render_passes.passes.len()).unwrap_or(u32::MAX);
        frame.stats.quads = u32::try_from(frame.render_passes.quad_count()).unwrap_or(u32::MAX);
        frame
    }

    #[cfg(feature = "trace-rich")]
    fn trace_damage(&mut self, damage: Rect) {
        use strata_core::trace::DamageRect;

        let r = geometry::enclosing(damage);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "viewport coordinates fit in i32"
        )]
        let rect = DamageRect {
            x: r.x0 as i32,
            y: r.y0 as i32,
            width: r.width() as u32,
            height: r.height() as u32,
        };
        let frame_index = self.frame_index;
        self.tracer().damage_rects(frame_index, &[rect]);
    }

    #[cfg(feature = "trace-rich")]
    fn trace_layer_changes(&mut self, changes: &strata_core::layer::LayerChanges) {
        use strata_core::trace::{LayerChange, LayerField};

        let fields = [
            (&changes.transforms, LayerField::Transform),
            (&changes.hidden, LayerField::Transform),
            (&changes.unhidden, LayerField::Transform),
            (&changes.opacities, LayerField::Opacity),
            (&changes.clips, LayerField::Clip),
            (&changes.content, LayerField::Content),
            (&changes.effects, LayerField::Effects),
            (&changes.added, LayerField::Topology),
            (&changes.removed, LayerField::Topology),
        ];
        let records: Vec<LayerChange> = fields
            .into_iter()
            .flat_map(|(slots, field)| {
                slots.iter().map(move |&layer_index| LayerChange { layer_index, field })
            })
            .collect();
        let frame_index = self.frame_index;
        self.tracer().layer_changes(frame_index, &records);
    }

    /// Updates every surface's damage, children before parents.
    fn update_damage(&mut self) {
        let surfaces: Vec<LayerId> = self.tree.render_surface_list().to_vec();
        for owner in surfaces.iter().rev() {
            let Some((contributors, target)) = self.damage_inputs(*owner) else {
                continue;
            };
            if let Some(surface) = self.tree.surface_mut(*owner) {
                surface
                    .damage
                    .update_damage_tracking_state(&contributors, &target);
            }
        }
    }

    fn damage_inputs(&self, owner: LayerId) -> Option<(Vec<DamageContributor>, TargetSurfaceDamage)> {
        let tree = &self.tree;
        let layer = tree.layer(owner)?;
        let surface = layer.render_surface.as_ref()?;
        let mut contributors = Vec::with_capacity(surface.layer_list.len());
        for &id in &surface.layer_list {
            let Some(entry) = tree.layer(id) else {
                continue;
            };
            let child_surface = entry.render_surface.as_ref().filter(|_| id != owner);
            let contributor = match child_surface {
                Some(child) => DamageContributor::Surface(SurfaceDamage {
                    owner: id,
                    drawable_content_rect: child.drawable_content_rect,
                    content_rect: child.content_rect,
                    draw_transform: child.draw_transform,
                    replica: child.replica_draw_transform.map(|draw_transform| ReplicaDamage {
                        draw_transform,
                        mask: entry
                            .replica
                            .and_then(|r| tree.layer(r))
                            .and_then(|r| r.mask)
                            .and_then(|m| mask_damage(tree, m)),
                    }),
                    property_changed: child.property_changed,
                    damage: child.damage.current_damage_rect(),
                }),
                None => DamageContributor::Layer(LayerDamage {
                    id,
                    draw_transform: entry.draw.draw_transform,
                    bounds: entry.bounds,
                    property_changed: entry.property_changed,
                    update_rect: entry.update_rect,
                    draws_content: entry.draws_content(),
                }),
            };
            contributors.push(contributor);
        }
        let is_root = surface.target.is_none();
        let target = TargetSurfaceDamage {
            content_rect: surface.content_rect,
            property_changed: surface.property_changed || (is_root && self.viewport_changed),
            mask: layer.mask.and_then(|m| mask_damage(tree, m)),
            filter: layer.filter,
        };
        Some((contributors, target))
    }

    /// Walks front to back, culling against occlusion. Returns quads per
    /// target surface, frontmost first.
    fn build_quads(
        &self,
        viewport: Rect,
        frame: &mut FrameData,
    ) -> HashMap<LayerId, Vec<DrawQuad>> {
        let tree = &self.tree;
        let mut quads: HashMap<LayerId, Vec<DrawQuad>> = HashMap::new();
        let mut occlusion =
            OcclusionTracker::new(viewport, self.settings.minimum_occlusion_tracking_size);

        for position in front_to_back(tree) {
            match position {
                IteratorPosition::Layer { layer, target } => {
                    let (Some(layer), Some(target_occ)) =
                        (tree.layer(layer), surface_occlusion(tree, target, viewport))
                    else {
                        continue;
                    };
                    occlusion.enter_layer(&target_occ);
                    let layer_occ = layer_occlusion(layer, target_occ.content_rect);
                    if let Some(quad) = layer_quad(layer, &layer_occ, &occlusion, frame) {
                        quads.entry(target).or_default().push(quad);
                    }
                    occlusion.leave_layer(&layer_occ, &target_occ);
                }
                IteratorPosition::TargetSurface(owner) => {
                    if let Some(surface_occ) = surface_occlusion(tree, owner, viewport) {
                        occlusion.enter_target_surface(&surface_occ);
                    }
                }
                IteratorPosition::ContributingSurface { surface, target } => {
                    let (Some(surface_occ), Some(target_occ)) = (
                        surface_occlusion(tree, surface, viewport),
                        surface_occlusion(tree, target, viewport),
                    ) else {
                        continue;
                    };
                    let list = quads.entry(target).or_default();
                    surface_quads(tree, surface, &surface_occ, &occlusion, frame, list);
                    occlusion.leave_contributing_surface(&surface_occ, &target_occ);
                }
            }
        }
        quads
    }

    /// Issues every pass to the renderer and resets per-frame change state.
    pub fn draw_layers(&mut self, frame: &FrameData, renderer: &mut dyn Renderer) {
        let Some(root) = frame.render_passes.root() else {
            return;
        };
        renderer.begin_drawing_frame(root);
        for pass in &frame.render_passes.passes {
            renderer.draw_render_pass(pass, &frame.render_passes);
        }
        renderer.finish_drawing_frame();
        self.tree.did_draw_all_layers();
    }

    // -- Context and teardown --

    /// Forgets every backing and surface after the graphics context was
    /// lost. The texture manager is reset at the next commit.
    pub fn did_lose_context(&mut self) {
        if self.needs_backing_reset {
            return;
        }
        warn!("graphics context lost at frame {}", self.frame_index);
        for layer in self.tree.layers_mut() {
            layer.resource = None;
        }
        self.tree.clear_render_surfaces();
        self.needs_backing_reset = true;
        let e = ContextLostEvent {
            frame_index: self.frame_index,
            timestamp: time::now(),
        };
        self.tracer().context_lost(&e);
    }

    /// Damages the whole viewport at the next draw.
    pub fn set_full_root_damage(&mut self) {
        self.viewport_changed = true;
    }

    /// Returns whether backings were lost and the texture manager has not
    /// been reset by a commit yet.
    #[inline]
    #[must_use]
    pub fn needs_backing_reset(&self) -> bool {
        self.needs_backing_reset
    }

    /// Drops the active tree.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.viewport_changed = true;
    }

    /// Deletes every backing of `pending`'s texture manager and drops the
    /// active tree.
    pub(crate) fn release_resources(
        &mut self,
        pending: &mut PendingTree,
        allocator: &mut dyn BackingAllocator,
    ) {
        if self.needs_backing_reset {
            pending.textures.all_backings_were_deleted();
            self.needs_backing_reset = false;
        }
        pending.textures.impl_access(allocator).evict_and_delete_all();
        for layer in self.tree.layers_mut() {
            layer.resource = None;
        }
        self.clear();
    }

    pub(crate) fn trace_begin_frame(&mut self, sequence: u64, now: HostTime, forced: bool) {
        let e = BeginFrameEvent {
            frame_index: self.frame_index,
            sequence,
            now,
            forced,
        };
        self.tracer().begin_frame(&e);
    }

    pub(crate) fn trace_stale_frame(&mut self, sequence: u64, last_executed: u64) {
        self.tracer().stale_frame(&StaleFrameEvent {
            sequence,
            last_executed,
        });
    }
}

fn mask_damage(tree: &LayerTreeImpl, mask: LayerId) -> Option<MaskDamage> {
    tree.layer(mask).map(|m| MaskDamage {
        id: mask,
        changed: m.property_changed || !geometry::is_empty(m.update_rect),
    })
}

fn surface_occlusion(tree: &LayerTreeImpl, owner: LayerId, viewport: Rect) -> Option<SurfaceOcclusion> {
    let layer = tree.layer(owner)?;
    let surface = layer.render_surface.as_ref()?;
    let target_rect = surface
        .target
        .and_then(|t| tree.surface(t))
        .map_or(viewport, |t| t.content_rect);
    let replica_has_mask = layer
        .replica
        .and_then(|r| tree.layer(r))
        .is_some_and(|r| r.mask.is_some());
    Some(SurfaceOcclusion {
        owner,
        content_rect: surface.content_rect,
        clip_rect: surface.clip_rect.unwrap_or(target_rect),
        draw_transform: surface.draw_transform,
        screen_space_transform: surface.screen_space_transform,
        replica_draw_transform: surface.replica_draw_transform,
        replica_screen_space_transform: surface.replica_screen_space_transform,
        replica_has_mask,
        has_mask: layer.mask.is_some(),
        draw_opacity: surface.draw_opacity,
        opacity_animating: surface.opacity_animating,
        filter: layer.filter,
        transforms_animating: surface.draw_transform_animating
            || surface.screen_space_transform_animating,
        nearest_ancestor_that_moves_pixels: surface.nearest_ancestor_that_moves_pixels,
    })
}

fn layer_occlusion(layer: &LayerImpl, target_rect: Rect) -> LayerOcclusion {
    LayerOcclusion {
        id: layer.id,
        draw_transform: layer.draw.draw_transform,
        screen_space_transform: layer.draw.screen_space_transform,
        draw_opacity: layer.draw.draw_opacity,
        opacity_animating: layer.draw.opacity_animating,
        visible_content_rect: layer.draw.visible_content_rect,
        opaque_rect: layer.opaque_rect(),
        clip_rect_in_target: layer.draw.clip_rect.unwrap_or(target_rect),
        transforms_animating: layer.draw.draw_transform_animating
            || layer.draw.screen_space_transform_animating,
    }
}

fn layer_quad(
    layer: &LayerImpl,
    layer_occ: &LayerOcclusion,
    occlusion: &OcclusionTracker,
    frame: &mut FrameData,
) -> Option<DrawQuad> {
    let visible = layer.draw.visible_content_rect;
    if !layer.draws_content() || geometry::is_empty(visible) {
        return None;
    }
    if occlusion.occluded(layer_occ, visible) {
        frame.stats.culled_quads += 1;
        return None;
    }
    let rect = occlusion.unoccluded_content_rect(layer_occ, visible);
    if geometry::is_empty(rect) {
        frame.stats.culled_quads += 1;
        return None;
    }
    let material = match layer.content {
        LayerContent::Empty => return None,
        LayerContent::Solid { rgba } => QuadMaterial::SolidColor { rgba },
        LayerContent::Painted { .. } => match layer.resource {
            Some(resource) => QuadMaterial::Texture {
                resource,
                opaque: layer.opaque_rect() == Some(layer.content_rect()),
            },
            None => {
                frame.stats.missing_textures += 1;
                if layer.draw.screen_space_transform_animating {
                    frame.contains_incomplete_animating = true;
                }
                QuadMaterial::Checkerboard
            }
        },
    };
    Some(DrawQuad {
        layer: layer.id,
        rect,
        transform: layer.draw.draw_transform,
        opacity: layer.draw.draw_opacity,
        clip_rect: layer.draw.clip_rect,
        material,
    })
}

/// Appends the quads of a contributing surface, the surface itself before
/// its replica (front to back).
fn surface_quads(
    tree: &LayerTreeImpl,
    owner: LayerId,
    surface_occ: &SurfaceOcclusion,
    occlusion: &OcclusionTracker,
    frame: &mut FrameData,
    out: &mut Vec<DrawQuad>,
) {
    let Some(layer) = tree.layer(owner) else {
        return;
    };
    let mask_resource = |mask: Option<LayerId>| mask.and_then(|m| tree.layer(m)).and_then(|m| m.resource);
    let replica_mask = layer.replica.and_then(|r| tree.layer(r)).and_then(|r| r.mask);
    let content_rect = surface_occ.content_rect;

    let copies = [
        (false, Some(surface_occ.draw_transform), layer.mask),
        (true, surface_occ.replica_draw_transform, replica_mask),
    ];
    for (is_replica, transform, mask) in copies {
        let Some(transform) = transform else {
            continue;
        };
        if occlusion.surface_occluded(surface_occ, is_replica, content_rect) {
            frame.stats.culled_quads += 1;
            continue;
        }
        let rect = occlusion.surface_unoccluded_content_rect(surface_occ, is_replica, content_rect);
        if geometry::is_empty(rect) {
            frame.stats.culled_quads += 1;
            continue;
        }
        out.push(DrawQuad {
            layer: owner,
            rect,
            transform,
            opacity: surface_occ.draw_opacity,
            clip_rect: Some(surface_occ.clip_rect),
            material: QuadMaterial::RenderPass {
                pass: RenderPassId(owner),
                mask: mask_resource(mask),
                is_replica,
                filter: layer.filter,
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use strata_core::layer::LayerFlags;
    use strata_core::transform::Transform3d;

    use super::*;
    use crate::renderer::HeadlessRenderer;

    fn settings() -> Settings {
        Settings {
            minimum_occlusion_tracking_size: Size::ZERO,
            ..Settings::default()
        }
    }

    struct Fixture {
        pending: PendingTree,
        host: CompositorHost,
        renderer: HeadlessRenderer,
        root: LayerId,
        sequence: u64,
    }

    impl Fixture {
        fn new() -> Self {
            let mut pending = PendingTree::new(&settings());
            let root = pending.layers.create_layer();
            pending.layers.set_anchor_point(root, Point::ZERO);
            pending.layers.set_bounds(root, Size::new(500.0, 500.0));
            pending.root = Some(root);
            pending.viewport_size = Size::new(500.0, 500.0);
            Self {
                pending,
                host: CompositorHost::new(settings()),
                renderer: HeadlessRenderer::new(),
                root,
                sequence: 0,
            }
        }

        fn child(&mut self, rect: Rect, content: LayerContent) -> LayerId {
            let layers = &mut self.pending.layers;
            let id = layers.create_layer();
            layers.add_child(self.root, id);
            layers.set_anchor_point(id, Point::ZERO);
            layers.set_position(id, rect.origin());
            layers.set_bounds(id, rect.size());
            layers.set_content(id, content);
            id
        }

        fn commit(&mut self) -> SyncStats {
            self.pending.update_layers(&settings());
            self.sequence += 1;
            self.host
                .commit(&mut self.pending, self.renderer.allocator(), self.sequence)
        }

        fn frame(&mut self) -> FrameData {
            let frame = self.host.prepare_to_draw(false);
            if !frame.has_no_damage {
                self.host.draw_layers(&frame, &mut self.renderer);
            }
            frame
        }
    }

    fn opaque() -> LayerContent {
        LayerContent::Solid {
            rgba: [0.0, 0.0, 1.0, 1.0],
        }
    }

    #[test]
    fn moved_layer_damages_old_and_new_rects() {
        let mut f = Fixture::new();
        let child = f.child(Rect::new(100.0, 100.0, 130.0, 130.0), opaque());
        let stats = f.commit();
        assert_eq!(stats.created, 2);
        let first = f.frame();
        assert_eq!(first.root_damage, Rect::new(0.0, 0.0, 500.0, 500.0));

        f.pending.layers.set_position(child, Point::new(200.0, 230.0));
        let _ = f.commit();
        let second = f.frame();
        assert_eq!(second.root_damage, Rect::new(100.0, 100.0, 230.0, 260.0));

        let _ = f.commit();
        let third = f.frame();
        assert!(third.has_no_damage, "unchanged frame has no damage");
        assert_eq!(third.root_damage, Rect::ZERO);
    }

    #[test]
    fn detached_replica_damages_its_reflection() {
        let mut f = Fixture::new();
        let owner = f.child(Rect::new(100.0, 100.0, 130.0, 130.0), opaque());
        let replica = f.pending.layers.create_layer();
        f.pending.layers.set_anchor_point(replica, Point::ZERO);
        f.pending.layers.set_position(replica, Point::new(0.0, 30.0));
        f.pending.layers.set_replica(owner, Some(replica));
        let _ = f.commit();
        let _ = f.frame();

        f.pending.layers.set_replica(owner, None);
        let _ = f.commit();
        assert!(f.pending.changes.is_empty(), "commit consumes the changes");
        let frame = f.frame();
        let reflection = Rect::new(100.0, 130.0, 130.0, 160.0);
        assert!(!frame.has_no_damage, "losing a reflection is visible");
        assert_eq!(
            frame.root_damage.union(reflection),
            frame.root_damage,
            "damage covers the old reflection"
        );
    }

    #[test]
    fn partial_swap_scissors_root_pass_to_damage() {
        let mut f = Fixture::new();
        let child = f.child(Rect::new(10.0, 10.0, 20.0, 20.0), opaque());
        let _ = f.commit();
        let _ = f.frame();
        f.pending
            .layers
            .set_needs_display_rect(child, Rect::new(0.0, 0.0, 5.0, 5.0));
        let _ = f.commit();
        let frame = f.frame();
        let root_pass = frame.render_passes.root().unwrap();
        assert_eq!(root_pass.scissor_rect, Rect::new(10.0, 10.0, 15.0, 15.0));
        assert_eq!(root_pass.output_rect, Rect::new(0.0, 0.0, 500.0, 500.0));
    }

    #[test]
    fn occluded_layer_is_culled() {
        let mut f = Fixture::new();
        let back = f.child(Rect::new(0.0, 0.0, 50.0, 50.0), opaque());
        let _front = f.child(Rect::new(0.0, 0.0, 100.0, 100.0), opaque());
        let _ = f.commit();
        let frame = f.frame();

        assert_eq!(frame.stats.culled_quads, 1);
        let root_pass = frame.render_passes.root().unwrap();
        assert!(
            root_pass.quads.iter().all(|q| q.layer != back),
            "back layer culled"
        );
    }

    #[test]
    fn partially_occluded_layer_is_shrunk() {
        let mut f = Fixture::new();
        let back = f.child(Rect::new(0.0, 0.0, 100.0, 50.0), opaque());
        let _front = f.child(Rect::new(50.0, 0.0, 150.0, 50.0), opaque());
        let _ = f.commit();
        let frame = f.frame();

        let root_pass = frame.render_passes.root().unwrap();
        let quad = root_pass.quads.iter().find(|q| q.layer == back).unwrap();
        assert_eq!(quad.rect, Rect::new(0.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn missing_texture_draws_checkerboard() {
        let mut f = Fixture::new();
        f.pending.textures.set_max_memory_limit_bytes(0);
        let painted = f.child(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            LayerContent::Painted { opaque_rect: None },
        );
        let _ = f.commit();
        let frame = f.frame();

        assert_eq!(frame.stats.missing_textures, 1);
        assert!(!frame.contains_incomplete_animating, "not animating");
        let quad = frame
            .render_passes
            .root()
            .unwrap()
            .quads
            .iter()
            .find(|q| q.layer == painted)
            .copied()
            .unwrap();
        assert_eq!(quad.material, QuadMaterial::Checkerboard);
    }

    #[test]
    fn granted_texture_is_bound_at_commit() {
        let mut f = Fixture::new();
        let painted = f.child(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            LayerContent::Painted { opaque_rect: None },
        );
        let _ = f.commit();
        let resource = f.host.tree().layer(painted).unwrap().resource;
        assert!(resource.is_some(), "backing bound");
        assert_eq!(f.renderer.handle().live_backings(), 1);
    }

    #[test]
    fn scroll_is_clamped_and_reported_once() {
        let mut f = Fixture::new();
        let scroller = f.child(Rect::new(0.0, 0.0, 100.0, 100.0), LayerContent::Empty);
        f.pending.layers.set_flags(
            scroller,
            LayerFlags {
                scrollable: true,
                ..LayerFlags::default()
            },
        );
        f.pending
            .layers
            .set_max_scroll_offset(scroller, Vec2::new(0.0, 50.0));
        let _ = f.commit();

        assert!(f.host.scroll_by(scroller, Vec2::new(0.0, 80.0)), "scrolled");
        let sent = f.host.process_scroll_deltas();
        assert_eq!(
            sent.scrolls,
            vec![LayerScroll {
                layer: scroller,
                delta: Vec2::new(0.0, 50.0),
            }]
        );

        // More input arrives before the client commits the first delta.
        assert!(f.host.scroll_by(scroller, Vec2::new(0.0, -10.0)), "scrolled back");
        f.pending
            .layers
            .set_scroll_offset(scroller, Vec2::new(0.0, 50.0));
        let _ = f.commit();
        let layer = f.host.tree().layer(scroller).unwrap();
        assert_eq!(layer.scroll_delta, Vec2::new(0.0, -10.0));
        assert_eq!(layer.scroll_offset(), Vec2::new(0.0, 40.0));
    }

    #[test]
    fn pinch_is_clamped_to_limits_and_reconciled() {
        let mut f = Fixture::new();
        f.pending.page_scale_factor = 1.0;
        f.pending.min_page_scale = 0.5;
        f.pending.max_page_scale = 2.0;
        let _ = f.commit();

        assert!(f.host.pinch_zoom_by(4.0), "zoomed");
        assert_eq!(f.host.total_page_scale_factor(), 2.0);
        let sent = f.host.process_scroll_deltas();
        assert_eq!(sent.page_scale_delta, 2.0);

        f.pending.page_scale_factor = 2.0;
        let _ = f.commit();
        assert_eq!(f.host.total_page_scale_factor(), 2.0);
        assert!(!f.host.pinch_zoom_by(1.5), "already at the limit");
    }

    #[test]
    fn nested_surface_pass_precedes_root() {
        let mut f = Fixture::new();
        let group = f.child(Rect::new(0.0, 0.0, 50.0, 50.0), LayerContent::Empty);
        f.pending.layers.set_opacity(group, 0.5);
        let leaf = f.pending.layers.create_layer();
        f.pending.layers.add_child(group, leaf);
        f.pending.layers.set_anchor_point(leaf, Point::ZERO);
        f.pending.layers.set_bounds(leaf, Size::new(20.0, 20.0));
        f.pending.layers.set_content(leaf, opaque());
        let _ = f.commit();
        let frame = f.frame();

        let ids: Vec<RenderPassId> = frame.render_passes.passes.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![RenderPassId(group), RenderPassId(f.root)]);
        let root_quads = &frame.render_passes.root().unwrap().quads;
        assert!(
            matches!(
                root_quads.last().map(|q| q.material),
                Some(QuadMaterial::RenderPass { is_replica: false, .. })
            ),
            "surface drawn into root"
        );
        assert_eq!(root_quads.last().map(|q| q.opacity), Some(0.5));
    }

    #[test]
    fn context_loss_drops_resources_and_forces_full_damage() {
        let mut f = Fixture::new();
        let painted = f.child(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            LayerContent::Painted { opaque_rect: None },
        );
        let _ = f.commit();
        let _ = f.frame();

        f.host.did_lose_context();
        assert!(f.host.tree().layer(painted).unwrap().resource.is_none(), "resource dropped");
        assert!(f.host.tree().surface(f.root).is_none(), "surfaces dropped");

        let _ = f.commit();
        assert!(
            f.host.tree().layer(painted).unwrap().resource.is_some(),
            "reacquired after reset"
        );
        let frame = f.frame();
        assert_eq!(frame.root_damage, Rect::new(0.0, 0.0, 500.0, 500.0));
    }

    #[test]
    fn draw_frame_swaps_damage() {
        let mut f = Fixture::new();
        let _ = f.child(Rect::new(0.0, 0.0, 10.0, 10.0), opaque());
        let _ = f.commit();
        let handle = f.renderer.handle();

        assert_eq!(f.host.draw_frame(&mut f.renderer, false), DrawOutcome::Drawn);
        assert_eq!(handle.frames_swapped(), 1);
        assert_eq!(
            handle.last_swap_damage(),
            Some(Rect::new(0.0, 0.0, 500.0, 500.0))
        );
        assert_eq!(f.host.draw_frame(&mut f.renderer, false), DrawOutcome::Skipped);
        assert_eq!(handle.frames_swapped(), 1, "no swap without damage");

        handle.lose_context();
        assert_eq!(
            f.host.draw_frame(&mut f.renderer, false),
            DrawOutcome::ContextLost
        );
    }

    #[test]
    fn animated_transform_is_not_overwritten_by_commit() {
        use strata_core::animation::{AnimatedProperty, Animation, AnimationId};
        use strata_core::time::Duration;

        let mut f = Fixture::new();
        let child = f.child(Rect::new(0.0, 0.0, 10.0, 10.0), opaque());
        f.pending.layers.add_animation(
            child,
            Animation::new(
                AnimationId(1),
                AnimatedProperty::Transform {
                    from: Transform3d::IDENTITY,
                    to: Transform3d::from_translation(100.0, 0.0, 0.0),
                },
                Duration::from_millis(1000),
            ),
        );
        let stats = f.commit();
        assert_eq!(stats.animations, 1);
        assert!(f.host.has_active_animations(), "animation attached");
        assert!(f.host.animate(HostTime(0)), "animation ticked");
        assert!(f.host.animate(HostTime(500_000_000)), "animation ticked");
        let mid = f.host.tree().layer(child).unwrap().transform;
        assert_eq!(mid, Transform3d::from_translation(50.0, 0.0, 0.0));

        f.pending
            .layers
            .set_transform(child, Transform3d::from_scale(2.0, 2.0, 1.0));
        let _ = f.commit();
        assert_eq!(f.host.tree().layer(child).unwrap().transform, mid);
    }
}
