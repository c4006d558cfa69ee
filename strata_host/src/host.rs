// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The client-side tree host.
//!
//! [`TreeHost`] owns the pending layer tree and its texture manager. The
//! embedder mutates layers through [`TreeHost::layers_mut`] and asks for a
//! commit; at each begin-frame the host applies compositor-side scroll and
//! zoom, lets the [`TreeHostClient`] update the tree, requests textures, and
//! hands the tree to the compositor through a proxy.

use std::collections::HashMap;

use strata_core::kurbo::{Point, Rect, Size, Vec2};
use strata_core::layer::{LayerChanges, LayerId, LayerStore};
use strata_core::time::HostTime;
use strata_core::trace::TraceSink;
use strata_core::transform::Transform3d;
use strata_render::{
    PrioritizedTextureManager, PriorityCalculator, TextureFormat, TextureId, TextureSize,
};

use crate::compositor::ScrollAndScaleSet;
use crate::error::Result;
use crate::proxy::{BeginFrameArgs, Proxy, SingleThreadProxy, ThreadProxy};
use crate::renderer::Renderer;
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Client callbacks
// ---------------------------------------------------------------------------

/// Embedder hooks called on the client context.
///
/// Every method defaults to doing nothing.
pub trait TreeHostClient {
    /// Called at the start of every commit cycle, after compositor input was
    /// applied. Mutate the tree here to have the changes committed.
    fn update(&mut self, layers: &mut LayerStore, now: HostTime) {
        _ = (layers, now);
    }

    /// Called with the scroll and zoom the compositor applied since the last
    /// begin-frame. The host has already folded it into the layer tree.
    fn apply_scroll_and_scale(&mut self, set: &ScrollAndScaleSet) {
        _ = set;
    }

    /// Called after the compositor committed `source_frame_number`.
    fn did_commit(&mut self, source_frame_number: u64) {
        _ = source_frame_number;
    }

    /// Called after a committed frame was drawn and swapped.
    fn did_commit_and_draw_frame(&mut self) {}

    /// Called when the graphics context was lost. Texture contents must be
    /// provided again.
    fn did_lose_context(&mut self) {}

    /// Called after an attempt to recreate the graphics context.
    fn did_recreate_context(&mut self, success: bool) {
        _ = success;
    }
}

/// A [`TreeHostClient`] that ignores every callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClient;

impl TreeHostClient for NoopClient {}

// ---------------------------------------------------------------------------
// Pending tree
// ---------------------------------------------------------------------------

/// Everything the client hands to the compositor at a commit.
///
/// Owned by the client between commits and moved to the compositor context
/// for the duration of one.
#[derive(Debug)]
pub(crate) struct PendingTree {
    pub(crate) layers: LayerStore,
    pub(crate) root: Option<LayerId>,
    pub(crate) viewport_size: Size,
    pub(crate) page_scale_factor: f64,
    pub(crate) min_page_scale: f64,
    pub(crate) max_page_scale: f64,
    pub(crate) source_frame_number: u64,
    pub(crate) textures: PrioritizedTextureManager,
    /// Content texture request per painted layer.
    pub(crate) content_textures: HashMap<LayerId, TextureId>,
    surface_placeholder: Option<TextureId>,
    /// Changes evaluated since the last commit that landed.
    pub(crate) changes: LayerChanges,
}

impl Default for PendingTree {
    fn default() -> Self {
        Self {
            layers: LayerStore::new(),
            root: None,
            viewport_size: Size::ZERO,
            page_scale_factor: 1.0,
            min_page_scale: 1.0,
            max_page_scale: 1.0,
            source_frame_number: 0,
            textures: PrioritizedTextureManager::new(0),
            content_textures: HashMap::new(),
            surface_placeholder: None,
            changes: LayerChanges::default(),
        }
    }
}

impl PendingTree {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            textures: PrioritizedTextureManager::new(settings.max_texture_memory_bytes),
            ..Self::default()
        }
    }

    /// Folds compositor-side scroll and zoom into the tree.
    pub(crate) fn apply_scroll_and_scale(&mut self, set: &ScrollAndScaleSet) {
        for scroll in &set.scrolls {
            if self.layers.is_alive(scroll.layer) {
                let offset = self.layers.scroll_offset(scroll.layer) + scroll.delta;
                self.layers.set_scroll_offset(scroll.layer, offset);
            }
        }
        self.page_scale_factor *= set.page_scale_delta;
    }

    /// Requests a texture for every painted layer, assigns priorities, and
    /// reserves memory for render surfaces.
    pub(crate) fn update_layers(&mut self, settings: &Settings) {
        // A cycle dropped as stale never commits, so its changes carry over.
        let changes = self.layers.evaluate();
        self.changes.merge(&changes);

        let viewport = Rect::from_origin_size(Point::ORIGIN, self.viewport_size);
        let scale = Transform3d::from_scale(self.page_scale_factor, self.page_scale_factor, 1.0);
        let mut wanted: HashMap<LayerId, (TextureSize, i32)> = HashMap::new();
        let mut surface_bytes = 0_u64;

        let mut stack: Vec<LayerId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            stack.extend(self.layers.children(id));
            stack.extend(self.layers.mask(id));
            stack.extend(self.layers.replica(id));

            let p = self.layers.properties(id);
            let size = texture_size(p.bounds);
            let has_children = self.layers.children(id).next().is_some();
            let needs_surface = (p.opacity < 1.0 && has_children)
                || p.filter.is_some()
                || self.layers.mask(id).is_some()
                || self.layers.replica(id).is_some();
            if needs_surface {
                surface_bytes = surface_bytes.saturating_add(size.bytes(TextureFormat::Rgba8));
            }
            if !p.content.needs_texture() || size.is_empty() {
                continue;
            }
            let priority = if self.layers.effective_hidden(id) {
                PriorityCalculator::LOWEST
            } else {
                let world = scale * self.layers.world_transform(id);
                let rect = world.map_clipped_rect(Rect::from_origin_size(Point::ORIGIN, p.bounds));
                PriorityCalculator::priority_from_rects(viewport, rect, true)
            };
            wanted.insert(id, (size, priority));
        }

        let textures = &mut self.textures;
        self.content_textures.retain(|layer, texture| {
            let keep = wanted
                .get(layer)
                .is_some_and(|(size, _)| textures.texture_size(*texture).0 == *size);
            if !keep {
                textures.unregister_texture(*texture);
            }
            keep
        });
        let mut layers: Vec<LayerId> = wanted.keys().copied().collect();
        layers.sort_unstable();
        for layer in layers {
            let (size, priority) = wanted[&layer];
            let texture = *self
                .content_textures
                .entry(layer)
                .or_insert_with(|| textures.create_texture(size, TextureFormat::Rgba8));
            textures.set_request_priority(texture, priority);
        }

        let reserved = surface_bytes.min(settings.surface_priority_budget);
        let placeholder = *self.surface_placeholder.get_or_insert_with(|| {
            textures.create_texture(TextureSize::new(0, 0), TextureFormat::Rgba8)
        });
        textures.set_to_self_managed_placeholder(placeholder, reserved);
        textures.set_request_priority(
            placeholder,
            if reserved > 0 {
                PriorityCalculator::RENDER_SURFACE
            } else {
                PriorityCalculator::LOWEST
            },
        );

        textures.prioritize_textures();
    }
}

fn texture_size(bounds: Size) -> TextureSize {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "layer bounds are far below u32::MAX pixels"
    )]
    let px = |v: f64| v.max(0.0).ceil() as u32;
    TextureSize::new(px(bounds.width), px(bounds.height))
}

// ---------------------------------------------------------------------------
// Client state
// ---------------------------------------------------------------------------

/// State owned by the client context and passed to the proxy explicitly.
pub(crate) struct ClientState {
    pub(crate) settings: Settings,
    pub(crate) pending: Box<PendingTree>,
    pub(crate) client: Box<dyn TreeHostClient>,
    /// Sequence of the last begin-frame run on this side.
    pub(crate) last_begin_frame: Option<u64>,
}

impl core::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClientState")
            .field("settings", &self.settings)
            .field("pending", &self.pending)
            .field("last_begin_frame", &self.last_begin_frame)
            .finish_non_exhaustive()
    }
}

impl ClientState {
    /// Runs the client half of a begin-frame: apply compositor input, let
    /// the embedder update, request textures.
    pub(crate) fn begin_frame(&mut self, args: &BeginFrameArgs) {
        self.pending.apply_scroll_and_scale(&args.scroll_and_scale);
        if !args.scroll_and_scale.is_empty() {
            self.client.apply_scroll_and_scale(&args.scroll_and_scale);
        }
        self.client.update(&mut self.pending.layers, args.now);
        self.pending.source_frame_number += 1;
        self.pending.update_layers(&self.settings);
    }
}

// ---------------------------------------------------------------------------
// TreeHost
// ---------------------------------------------------------------------------

/// Client-side entry point: owns the pending tree and drives commits.
#[derive(Debug)]
pub struct TreeHost {
    state: ClientState,
    proxy: Box<dyn Proxy>,
}

impl TreeHost {
    /// Creates a host whose compositor runs on the calling thread.
    ///
    /// Frames are produced by [`pump`](Self::pump) and by the blocking
    /// requests.
    #[must_use]
    pub fn single_threaded(
        settings: Settings,
        client: Box<dyn TreeHostClient>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self::with_proxy(settings, client, Box::new(SingleThreadProxy::new(settings, renderer)))
    }

    /// Creates a host whose compositor runs on its own thread, drawing at
    /// [`Settings::frame_interval`].
    #[must_use]
    pub fn threaded(
        settings: Settings,
        client: Box<dyn TreeHostClient>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self::with_proxy(settings, client, Box::new(ThreadProxy::new(settings, renderer)))
    }

    fn with_proxy(
        settings: Settings,
        client: Box<dyn TreeHostClient>,
        proxy: Box<dyn Proxy>,
    ) -> Self {
        Self {
            state: ClientState {
                settings,
                pending: Box::new(PendingTree::new(&settings)),
                client,
                last_begin_frame: None,
            },
            proxy,
        }
    }

    // -- Lifecycle --

    /// Initializes the renderer and starts the compositor.
    pub fn start(&mut self) -> Result<()> {
        self.proxy.start(&mut self.state)
    }

    /// Drains in-flight work and releases every compositor resource,
    /// including all texture backings. Idempotent.
    pub fn stop(&mut self) {
        self.proxy.stop(&mut self.state);
    }

    // -- Tree --

    /// The pending layer tree.
    #[inline]
    #[must_use]
    pub fn layers(&self) -> &LayerStore {
        &self.state.pending.layers
    }

    /// The pending layer tree, for mutation. Changes reach the screen at
    /// the next commit.
    #[inline]
    pub fn layers_mut(&mut self) -> &mut LayerStore {
        &mut self.state.pending.layers
    }

    /// The texture manager of the pending tree.
    #[inline]
    #[must_use]
    pub fn textures(&self) -> &PrioritizedTextureManager {
        &self.state.pending.textures
    }

    /// Sets (or clears) the root layer.
    ///
    /// # Panics
    ///
    /// Panics if `root` is a stale handle.
    pub fn set_root_layer(&mut self, root: Option<LayerId>) {
        if let Some(root) = root {
            assert!(
                self.state.pending.layers.is_alive(root),
                "root layer {root:?} is not alive"
            );
        }
        self.state.pending.root = root;
    }

    /// The root layer.
    #[inline]
    #[must_use]
    pub fn root_layer(&self) -> Option<LayerId> {
        self.state.pending.root
    }

    /// Sets the viewport size in pixels.
    pub fn set_viewport_size(&mut self, size: Size) {
        self.state.pending.viewport_size = size;
    }

    /// Sets the page scale and its limits.
    pub fn set_page_scale_factor_and_limits(&mut self, scale: f64, min: f64, max: f64) {
        let pending = &mut self.state.pending;
        pending.min_page_scale = min;
        pending.max_page_scale = max.max(min);
        pending.page_scale_factor = scale.clamp(min, pending.max_page_scale);
    }

    /// The client-side page scale.
    #[inline]
    #[must_use]
    pub fn page_scale_factor(&self) -> f64 {
        self.state.pending.page_scale_factor
    }

    /// Number of the last frame handed to the compositor.
    #[inline]
    #[must_use]
    pub fn source_frame_number(&self) -> u64 {
        self.state.pending.source_frame_number
    }

    // -- Requests --

    /// Requests a commit. Repeated calls before it runs are coalesced.
    pub fn set_needs_commit(&mut self) -> Result<()> {
        self.proxy.set_needs_commit(&mut self.state)
    }

    /// Requests a redraw of the last committed tree.
    pub fn set_needs_redraw(&mut self) -> Result<()> {
        self.proxy.set_needs_redraw(&mut self.state)
    }

    /// Shows or hides the output.
    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.proxy.set_visible(&mut self.state, visible)
    }

    /// Scrolls a layer on the compositor.
    pub fn scroll_by(&mut self, layer: LayerId, delta: Vec2) -> Result<()> {
        self.proxy.scroll_by(&mut self.state, layer, delta)
    }

    /// Zooms the page on the compositor.
    pub fn pinch_zoom_by(&mut self, magnify: f64) -> Result<()> {
        self.proxy.pinch_zoom_by(&mut self.state, magnify)
    }

    /// Commits, draws, and reads back `rect` of the result as RGBA8 rows,
    /// blocking until done.
    pub fn composite_and_readback(&mut self, rect: Rect) -> Result<Vec<u8>> {
        self.proxy.composite_and_readback(&mut self.state, rect)
    }

    /// Blocks until every issued frame has been drawn and the renderer is
    /// idle.
    pub fn finish_all_rendering(&mut self) -> Result<()> {
        self.proxy.finish_all_rendering(&mut self.state)
    }

    /// Installs (or removes) the compositor's trace sink. A sink set before
    /// [`start`](Self::start) is handed over when the compositor starts.
    pub fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) -> Result<()> {
        self.proxy.set_trace_sink(sink)
    }

    /// Processes work the compositor handed back to the client.
    ///
    /// With the single-threaded compositor this also runs one frame.
    pub fn pump(&mut self) -> Result<()> {
        self.proxy.pump(&mut self.state)
    }

    /// Returns whether a commit was requested and has not run yet.
    #[must_use]
    pub fn commit_requested(&self) -> bool {
        self.proxy.commit_requested()
    }
}

impl Drop for TreeHost {
    fn drop(&mut self) {
        self.stop();
    }
}
