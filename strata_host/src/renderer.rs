// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The renderer backend contract and an in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use strata_core::geometry;
use strata_core::kurbo::{Point, Rect};
use strata_core::layer::FilterOp;
use strata_render::{
    BackingAllocator, DrawQuad, QuadMaterial, RenderPass, RenderPassId, RenderPassList,
    ResourceKey, TextureFormat, TextureSize,
};

/// Draws render passes into a graphics context.
///
/// A frame is `begin_drawing_frame`, one `draw_render_pass` per pass in
/// list order (the root last), `finish_drawing_frame`, then
/// `swap_buffers`. Loss of the context is reported by `swap_buffers`
/// returning `false` or by `is_context_lost`.
pub trait Renderer: Send {
    /// Prepares the context; returns `false` if it cannot be used.
    fn initialize(&mut self) -> bool;

    /// Starts a frame whose root pass is `root`.
    fn begin_drawing_frame(&mut self, root: &RenderPass);

    /// Draws `pass`; passes it samples were drawn earlier in `passes`.
    fn draw_render_pass(&mut self, pass: &RenderPass, passes: &RenderPassList);

    /// Ends the frame.
    fn finish_drawing_frame(&mut self);

    /// Presents the frame; `damage` is the part of the root that changed.
    fn swap_buffers(&mut self, damage: Rect) -> bool;

    /// Reads back `rect` of the last drawn root pass as RGBA8 rows.
    fn read_pixels(&mut self, rect: Rect) -> Vec<u8>;

    /// Blocks until previously issued work has completed.
    fn finish(&mut self);

    /// Returns whether the context was lost.
    fn is_context_lost(&self) -> bool;

    /// Recreates a lost context; every backing of the old one is gone.
    fn reinitialize(&mut self) -> bool;

    /// Allocator for texture backings in this context.
    fn allocator(&mut self) -> &mut dyn BackingAllocator;
}

// ---------------------------------------------------------------------------
// Headless renderer
// ---------------------------------------------------------------------------

/// One drawn pass, as recorded by [`HeadlessRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    /// The pass.
    pub pass: RenderPassId,
    /// Region redrawn.
    pub scissor: Rect,
    /// Quads drawn, back to front.
    pub quads: Vec<DrawQuad>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    context_lost: bool,
    initialize_fails: bool,
    reinitialize_fails: bool,
    next_key: u64,
    live_backings: BTreeSet<ResourceKey>,
    frames_swapped: u64,
    last_swap_damage: Option<Rect>,
    finish_count: u32,
    draw_log: Vec<DrawRecord>,
}

#[derive(Debug)]
struct HeadlessAllocator {
    state: Arc<Mutex<HeadlessState>>,
}

impl BackingAllocator for HeadlessAllocator {
    fn create_backing(&mut self, _size: TextureSize, _format: TextureFormat) -> ResourceKey {
        let mut state = self.state.lock();
        state.next_key += 1;
        let key = ResourceKey(state.next_key);
        state.live_backings.insert(key);
        key
    }

    fn delete_backing(&mut self, key: ResourceKey) {
        if !self.state.lock().live_backings.remove(&key) {
            warn!("deleting unknown backing {key:?}");
        }
    }
}

/// Observes and manipulates a [`HeadlessRenderer`] from another thread.
#[derive(Clone, Debug)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHandle {
    /// Simulates loss of the graphics context.
    pub fn lose_context(&self) {
        self.state.lock().context_lost = true;
    }

    /// Makes [`Renderer::initialize`] fail.
    pub fn set_initialize_fails(&self, fails: bool) {
        self.state.lock().initialize_fails = fails;
    }

    /// Makes [`Renderer::reinitialize`] fail.
    pub fn set_reinitialize_fails(&self, fails: bool) {
        self.state.lock().reinitialize_fails = fails;
    }

    /// Backings created and not yet deleted in the current context.
    #[must_use]
    pub fn live_backings(&self) -> usize {
        self.state.lock().live_backings.len()
    }

    /// Successful swaps so far.
    #[must_use]
    pub fn frames_swapped(&self) -> u64 {
        self.state.lock().frames_swapped
    }

    /// Damage passed to the last successful swap.
    #[must_use]
    pub fn last_swap_damage(&self) -> Option<Rect> {
        self.state.lock().last_swap_damage
    }

    /// Number of [`Renderer::finish`] calls.
    #[must_use]
    pub fn finish_count(&self) -> u32 {
        self.state.lock().finish_count
    }

    /// Takes the passes drawn since the last call.
    #[must_use]
    pub fn take_draw_log(&self) -> Vec<DrawRecord> {
        core::mem::take(&mut self.state.lock().draw_log)
    }
}

/// Premultiplied RGBA.
type Color = [f32; 4];

const TRANSPARENT: Color = [0.0; 4];
const TEXTURE_GRAY: Color = [0.5, 0.5, 0.5, 1.0];
const CHECKER_LIGHT: Color = [0.9, 0.9, 0.9, 1.0];
const CHECKER_DARK: Color = [0.7, 0.7, 0.7, 1.0];
const CHECKER_CELL: f64 = 8.0;

/// An integer-aligned pixel buffer positioned in its pass's space.
#[derive(Clone, Debug, Default)]
struct Pixmap {
    bounds: [i64; 4],
    pixels: Vec<Color>,
}

impl Pixmap {
    fn new(rect: Rect) -> Self {
        let bounds = pixel_bounds(rect);
        let len = usize::try_from((bounds[2] - bounds[0]) * (bounds[3] - bounds[1])).unwrap_or(0);
        Self {
            bounds,
            pixels: vec![TRANSPARENT; len],
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let [x0, y0, x1, y1] = self.bounds;
        if x < x0 || y < y0 || x >= x1 || y >= y1 {
            return None;
        }
        usize::try_from((y - y0) * (x1 - x0) + (x - x0)).ok()
    }

    fn get(&self, x: i64, y: i64) -> Color {
        self.index(x, y)
            .and_then(|i| self.pixels.get(i).copied())
            .unwrap_or(TRANSPARENT)
    }
}

/// A [`Renderer`] that rasterizes into memory.
///
/// Solid colors are drawn exactly, textures as mid gray, and checkerboards
/// as an 8-pixel two-tone pattern. Render pass quads sample the pass's
/// buffer with opacity and grayscale filters applied; blur and masks are
/// ignored. The root buffer persists across frames, so only the scissored
/// part is redrawn.
#[derive(Debug)]
pub struct HeadlessRenderer {
    allocator: HeadlessAllocator,
    framebuffer: Pixmap,
    passes: HashMap<RenderPassId, Pixmap>,
}

impl HeadlessRenderer {
    /// Creates a renderer with a live context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: HeadlessAllocator {
                state: Arc::new(Mutex::new(HeadlessState::default())),
            },
            framebuffer: Pixmap::default(),
            passes: HashMap::new(),
        }
    }

    /// A handle sharing this renderer's context state.
    #[must_use]
    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle {
            state: Arc::clone(&self.allocator.state),
        }
    }

    fn fill_quad(&self, target: &mut Pixmap, quad: &DrawQuad, scissor: Rect) {
        let Some(inverse) = quad.transform.inverse() else {
            return;
        };
        let mut bounds = geometry::intersect(quad.transform.map_clipped_rect(quad.rect), scissor);
        if let Some(clip) = quad.clip_rect {
            bounds = geometry::intersect(bounds, clip);
        }
        if geometry::is_empty(bounds) {
            return;
        }
        let [x0, y0, x1, y1] = pixel_bounds(bounds);
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let Some(p) = inverse.project_point(center) else {
                    continue;
                };
                if !quad.rect.contains(p) {
                    continue;
                }
                let Some(src) = self.sample(quad, p) else {
                    continue;
                };
                if let Some(i) = target.index(x, y) {
                    let dst = target.pixels[i];
                    let keep = 1.0 - src[3];
                    target.pixels[i] = [
                        src[0] + dst[0] * keep,
                        src[1] + dst[1] * keep,
                        src[2] + dst[2] * keep,
                        src[3] + dst[3] * keep,
                    ];
                }
            }
        }
    }

    /// Premultiplied color of `quad` at content point `p`, opacity applied.
    fn sample(&self, quad: &DrawQuad, p: Point) -> Option<Color> {
        let color = match quad.material {
            QuadMaterial::SolidColor { rgba } => premultiply(rgba),
            QuadMaterial::Texture { .. } => TEXTURE_GRAY,
            QuadMaterial::Checkerboard => {
                let cell = (p.x / CHECKER_CELL).floor() + (p.y / CHECKER_CELL).floor();
                if cell.rem_euclid(2.0) < 1.0 {
                    CHECKER_LIGHT
                } else {
                    CHECKER_DARK
                }
            }
            QuadMaterial::RenderPass { pass, filter, .. } => {
                let source = self.passes.get(&pass)?;
                let texel = source.get(floor_px(p.x), floor_px(p.y));
                apply_filter(texel, filter)
            }
        };
        Some(color.map(|c| c * quad.opacity))
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for HeadlessRenderer {
    fn initialize(&mut self) -> bool {
        !self.allocator.state.lock().initialize_fails
    }

    fn begin_drawing_frame(&mut self, root: &RenderPass) {
        if self.framebuffer.bounds != pixel_bounds(root.output_rect) {
            self.framebuffer = Pixmap::new(root.output_rect);
        }
    }

    fn draw_render_pass(&mut self, pass: &RenderPass, passes: &RenderPassList) {
        let is_root = passes.root().is_some_and(|r| r.id == pass.id);
        let mut target = if is_root {
            core::mem::take(&mut self.framebuffer)
        } else {
            Pixmap::new(pass.output_rect)
        };
        let scissor = geometry::intersect(geometry::enclosing(pass.scissor_rect), pass.output_rect);
        let [x0, y0, x1, y1] = pixel_bounds(scissor);
        for y in y0..y1 {
            for x in x0..x1 {
                if let Some(i) = target.index(x, y) {
                    target.pixels[i] = TRANSPARENT;
                }
            }
        }
        for quad in &pass.quads {
            self.fill_quad(&mut target, quad, scissor);
        }

        if is_root {
            self.framebuffer = target;
        } else {
            self.passes.insert(pass.id, target);
        }
        self.allocator.state.lock().draw_log.push(DrawRecord {
            pass: pass.id,
            scissor,
            quads: pass.quads.clone(),
        });
    }

    fn finish_drawing_frame(&mut self) {
        self.passes.clear();
    }

    fn swap_buffers(&mut self, damage: Rect) -> bool {
        let mut state = self.allocator.state.lock();
        if state.context_lost {
            return false;
        }
        state.frames_swapped += 1;
        state.last_swap_damage = Some(damage);
        true
    }

    fn read_pixels(&mut self, rect: Rect) -> Vec<u8> {
        let [x0, y0, x1, y1] = pixel_bounds(rect);
        let mut out = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                out.extend(self.framebuffer.get(x, y).map(to_byte));
            }
        }
        out
    }

    fn finish(&mut self) {
        self.allocator.state.lock().finish_count += 1;
    }

    fn is_context_lost(&self) -> bool {
        self.allocator.state.lock().context_lost
    }

    fn reinitialize(&mut self) -> bool {
        let mut state = self.allocator.state.lock();
        if state.reinitialize_fails {
            return false;
        }
        state.context_lost = false;
        state.live_backings.clear();
        drop(state);
        self.framebuffer = Pixmap::default();
        self.passes.clear();
        true
    }

    fn allocator(&mut self) -> &mut dyn BackingAllocator {
        &mut self.allocator
    }
}

fn premultiply(rgba: [f32; 4]) -> Color {
    let a = rgba[3].clamp(0.0, 1.0);
    [rgba[0] * a, rgba[1] * a, rgba[2] * a, a]
}

fn apply_filter(color: Color, filter: Option<FilterOp>) -> Color {
    match filter {
        Some(FilterOp::Opacity(amount)) => color.map(|c| c * amount.clamp(0.0, 1.0)),
        Some(FilterOp::Grayscale(amount)) => {
            let amount = amount.clamp(0.0, 1.0);
            let luma = 0.2126 * color[0] + 0.7152 * color[1] + 0.0722 * color[2];
            let mix = |c: f32| c + (luma - c) * amount;
            [mix(color[0]), mix(color[1]), mix(color[2]), color[3]]
        }
        Some(FilterOp::Blur { .. }) | None => color,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "colors are clamped to 0..=255 before the cast"
)]
fn to_byte(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "headless targets are far smaller than i64::MAX pixels"
)]
fn floor_px(v: f64) -> i64 {
    v.floor() as i64
}

fn pixel_bounds(rect: Rect) -> [i64; 4] {
    let r = geometry::enclosing(rect);
    [floor_px(r.x0), floor_px(r.y0), floor_px(r.x1), floor_px(r.y1)]
}

#[cfg(test)]
mod tests {
    use strata_core::layer::LayerStore;
    use strata_core::transform::Transform3d;

    use super::*;

    fn pass_with(quads: Vec<DrawQuad>) -> (RenderPassList, RenderPassId) {
        let mut store = LayerStore::new();
        let id = RenderPassId(store.create_layer());
        let mut pass = RenderPass::new(id, Rect::new(0.0, 0.0, 4.0, 4.0), Transform3d::IDENTITY);
        pass.quads = quads;
        (RenderPassList { passes: vec![pass] }, id)
    }

    fn solid(rect: Rect, rgba: [f32; 4], opacity: f32) -> DrawQuad {
        let mut store = LayerStore::new();
        DrawQuad {
            layer: store.create_layer(),
            rect,
            transform: Transform3d::IDENTITY,
            opacity,
            clip_rect: None,
            material: QuadMaterial::SolidColor { rgba },
        }
    }

    fn draw(renderer: &mut HeadlessRenderer, list: &RenderPassList) {
        let root = list.root().unwrap();
        renderer.begin_drawing_frame(root);
        for pass in &list.passes {
            renderer.draw_render_pass(pass, list);
        }
        renderer.finish_drawing_frame();
    }

    #[test]
    fn solid_quads_blend_source_over() {
        let mut renderer = HeadlessRenderer::new();
        let (list, _) = pass_with(vec![
            solid(Rect::new(0.0, 0.0, 4.0, 4.0), [1.0, 0.0, 0.0, 1.0], 1.0),
            solid(Rect::new(0.0, 0.0, 2.0, 2.0), [0.0, 0.0, 1.0, 1.0], 0.5),
        ]);
        draw(&mut renderer, &list);

        let pixels = renderer.read_pixels(Rect::new(0.0, 0.0, 4.0, 1.0));
        assert_eq!(&pixels[0..4], &[128, 0, 128, 255]);
        assert_eq!(&pixels[12..16], &[255, 0, 0, 255]);
    }

    #[test]
    fn scissor_keeps_previous_root_content() {
        let mut renderer = HeadlessRenderer::new();
        let (list, _) = pass_with(vec![solid(
            Rect::new(0.0, 0.0, 4.0, 4.0),
            [1.0, 1.0, 1.0, 1.0],
            1.0,
        )]);
        draw(&mut renderer, &list);

        let (mut second, _) = pass_with(Vec::new());
        second.passes[0].scissor_rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        draw(&mut renderer, &second);
        let pixels = renderer.read_pixels(Rect::new(0.0, 0.0, 2.0, 1.0));
        assert_eq!(&pixels[0..4], &[0, 0, 0, 0], "scissored pixel cleared");
        assert_eq!(&pixels[4..8], &[255, 255, 255, 255], "outside scissor kept");
    }

    #[test]
    fn backings_are_tracked_and_lost_with_the_context() {
        let mut renderer = HeadlessRenderer::new();
        let handle = renderer.handle();
        let a = renderer
            .allocator()
            .create_backing(TextureSize::new(4, 4), TextureFormat::Rgba8);
        let _ = renderer
            .allocator()
            .create_backing(TextureSize::new(4, 4), TextureFormat::Rgba8);
        renderer.allocator().delete_backing(a);
        assert_eq!(handle.live_backings(), 1);

        handle.lose_context();
        assert!(renderer.is_context_lost(), "lost");
        assert!(!renderer.swap_buffers(Rect::ZERO), "swap fails while lost");
        assert!(renderer.reinitialize(), "recreated");
        assert_eq!(handle.live_backings(), 0);
        assert!(renderer.swap_buffers(Rect::ZERO), "swap succeeds again");
        assert_eq!(handle.frames_swapped(), 1);
    }

    #[test]
    fn render_pass_quad_samples_child_pass() {
        let mut store = LayerStore::new();
        let child = RenderPassId(store.create_layer());
        let root = RenderPassId(store.create_layer());
        let mut child_pass =
            RenderPass::new(child, Rect::new(0.0, 0.0, 2.0, 2.0), Transform3d::IDENTITY);
        child_pass.quads.push(solid(
            Rect::new(0.0, 0.0, 2.0, 2.0),
            [0.0, 1.0, 0.0, 1.0],
            1.0,
        ));
        let mut root_pass =
            RenderPass::new(root, Rect::new(0.0, 0.0, 4.0, 4.0), Transform3d::IDENTITY);
        root_pass.quads.push(DrawQuad {
            layer: child.0,
            rect: Rect::new(0.0, 0.0, 2.0, 2.0),
            transform: Transform3d::from_translation(2.0, 2.0, 0.0),
            opacity: 1.0,
            clip_rect: None,
            material: QuadMaterial::RenderPass {
                pass: child,
                mask: None,
                is_replica: false,
                filter: Some(FilterOp::Opacity(0.5)),
            },
        });
        let list = RenderPassList {
            passes: vec![child_pass, root_pass],
        };
        let mut renderer = HeadlessRenderer::new();
        draw(&mut renderer, &list);

        let pixels = renderer.read_pixels(Rect::new(2.0, 2.0, 3.0, 3.0));
        assert_eq!(pixels, vec![0, 128, 0, 128]);
        let log = renderer.handle().take_draw_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].pass, root);
    }
}
