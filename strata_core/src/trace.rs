// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the commit/draw loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! compositor calls at each stage. All method bodies default to no-ops, so
//! implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during a frame and
//! produces a [`FrameSummary`] at the end.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates [`LayerChange`] and [`DamageRect`]
//!   events plus the corresponding `TraceSink` methods.

use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of the frame loop is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// The client's begin-frame work (applying deltas, updating layers).
    BeginFrame,
    /// Tree synchronization.
    Commit,
    /// Draw properties, damage, occlusion, and texture acquisition.
    PrepareToDraw,
    /// Issuing render passes to the renderer.
    Draw,
    /// Presenting the frame.
    Swap,
}

impl PhaseKind {
    /// All phases in frame order.
    pub const ALL: [Self; 5] = [
        Self::BeginFrame,
        Self::Commit,
        Self::PrepareToDraw,
        Self::Draw,
        Self::Swap,
    ];

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeginFrame => "begin_frame",
            Self::Commit => "commit",
            Self::PrepareToDraw => "prepare_to_draw",
            Self::Draw => "draw",
            Self::Swap => "swap",
        }
    }
}

/// Which property of a layer changed.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerField {
    /// Geometry, transform, scroll offset, or hidden flag.
    Transform,
    /// Opacity value.
    Opacity,
    /// `masks_to_bounds`.
    Clip,
    /// Content description.
    Content,
    /// Filter, mask, or replica.
    Effects,
    /// Topology (parent/child relationships).
    Topology,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a begin-frame cycle starts executing.
#[derive(Clone, Copy, Debug)]
pub struct BeginFrameEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Sequence number of the cycle.
    pub sequence: u64,
    /// Host time at the start of the cycle.
    pub now: HostTime,
    /// Whether the cycle was forced (readback or finish).
    pub forced: bool,
}

/// Emitted after a commit synchronized the trees.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Sequence number of the committed cycle.
    pub sequence: u64,
    /// Layers in the impl tree after the commit.
    pub layer_count: u32,
    /// Impl layers created by the commit.
    pub created: u32,
    /// Impl layers destroyed by the commit.
    pub destroyed: u32,
}

/// Marks the beginning of a frame-loop phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a frame-loop phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after a frame was prepared, whether or not it was drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Render passes issued.
    pub render_passes: u32,
    /// Quads issued.
    pub quads: u32,
    /// Quads removed by occlusion culling.
    pub culled_quads: u32,
    /// Layers drawn as checkerboard because their texture had no backing.
    pub missing_textures: u32,
    /// Whether the frame was dropped.
    pub dropped: bool,
}

/// Texture budget snapshot, emitted after prioritization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureMemoryEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Bytes held by live backings.
    pub memory_use_bytes: u64,
    /// Bytes granted to requests above the cutoff.
    pub memory_above_cutoff_bytes: u64,
    /// Configured limit.
    pub max_memory_bytes: u64,
    /// Backings evicted since the previous event.
    pub evicted_backings: u32,
}

/// Emitted when a superseded begin-frame cycle is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaleFrameEvent {
    /// Sequence number of the dropped cycle.
    pub sequence: u64,
    /// Last executed sequence number.
    pub last_executed: u64,
}

/// Emitted when the renderer reports graphics context loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextLostEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// Host time of detection.
    pub timestamp: HostTime,
}

/// Per-frame timing summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Host time when the frame started.
    pub now: HostTime,
    /// Begin-frame phase duration in nanoseconds (0 if not measured).
    pub begin_frame_nanos: u64,
    /// Commit phase duration in nanoseconds (0 if not measured).
    pub commit_nanos: u64,
    /// Prepare phase duration in nanoseconds (0 if not measured).
    pub prepare_nanos: u64,
    /// Draw phase duration in nanoseconds (0 if not measured).
    pub draw_nanos: u64,
    /// Swap phase duration in nanoseconds (0 if not measured).
    pub swap_nanos: u64,
    /// Whether the frame was dropped.
    pub dropped: bool,
}

/// A per-frame layer change record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct LayerChange {
    /// Index of the layer that changed.
    pub layer_index: u32,
    /// Which field changed.
    pub field: LayerField,
}

/// An axis-aligned damage rectangle, rounded out to whole pixels.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct DamageRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the commit/draw loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a begin-frame cycle starts executing.
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        _ = e;
    }

    /// Called after a commit.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called at the beginning of a frame-loop phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a frame-loop phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called after a frame was prepared.
    fn on_draw(&mut self, e: &DrawEvent) {
        _ = e;
    }

    /// Called with a texture budget snapshot.
    fn on_texture_memory(&mut self, e: &TextureMemoryEvent) {
        _ = e;
    }

    /// Called when a stale cycle is dropped.
    fn on_stale_frame(&mut self, e: &StaleFrameEvent) {
        _ = e;
    }

    /// Called when the graphics context is lost.
    fn on_context_lost(&mut self, e: &ContextLostEvent) {
        _ = e;
    }

    /// Called with a per-frame timing summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with per-commit layer changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_layer_changes(&mut self, frame_index: u64, changes: &[LayerChange]) {
        _ = (frame_index, changes);
    }

    /// Called with per-frame root damage (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        _ = (frame_index, rects);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Expands to a `Tracer` method forwarding one event to the sink.
macro_rules! forward {
    ($(#[$doc:meta])* $name:ident, $hook:ident, $ty:ty) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$ty) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$hook(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer from an optional sink.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(sink) => Self::new(sink),
            None => Self::none(),
        }
    }

    forward!(
        /// Emits a [`BeginFrameEvent`].
        begin_frame, on_begin_frame, BeginFrameEvent
    );
    forward!(
        /// Emits a [`CommitEvent`].
        commit, on_commit, CommitEvent
    );
    forward!(
        /// Emits a [`PhaseBeginEvent`].
        phase_begin, on_phase_begin, PhaseBeginEvent
    );
    forward!(
        /// Emits a [`PhaseEndEvent`].
        phase_end, on_phase_end, PhaseEndEvent
    );
    forward!(
        /// Emits a [`DrawEvent`].
        draw, on_draw, DrawEvent
    );
    forward!(
        /// Emits a [`TextureMemoryEvent`].
        texture_memory, on_texture_memory, TextureMemoryEvent
    );
    forward!(
        /// Emits a [`StaleFrameEvent`].
        stale_frame, on_stale_frame, StaleFrameEvent
    );
    forward!(
        /// Emits a [`ContextLostEvent`].
        context_lost, on_context_lost, ContextLostEvent
    );
    forward!(
        /// Emits a [`FrameSummary`].
        frame_summary, on_frame_summary, FrameSummary
    );

    /// Emits layer changes (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layer_changes(&mut self, frame_index: u64, changes: &[LayerChange]) {
        if let Some(s) = &mut self.sink {
            s.on_layer_changes(frame_index, changes);
        }
    }

    /// Emits damage rectangles (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        if let Some(s) = &mut self.sink {
            s.on_damage_rects(frame_index, rects);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during a frame and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    frame_index: u64,
    now: HostTime,
    phase_starts: [Option<HostTime>; 5],
    phase_ends: [Option<HostTime>; 5],
    dropped: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for a frame that began at `now`.
    #[must_use]
    pub fn new(frame_index: u64, now: HostTime) -> Self {
        Self {
            frame_index,
            now,
            phase_starts: [None; 5],
            phase_ends: [None; 5],
            dropped: false,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: HostTime) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Sets whether the frame was dropped.
    pub fn set_dropped(&mut self, dropped: bool) {
        self.dropped = dropped;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.frame_index,
            now: self.now,
            begin_frame_nanos: self.phase_duration(PhaseKind::BeginFrame),
            commit_nanos: self.phase_duration(PhaseKind::Commit),
            prepare_nanos: self.phase_duration(PhaseKind::PrepareToDraw),
            draw_nanos: self.phase_duration(PhaseKind::Draw),
            swap_nanos: self.phase_duration(PhaseKind::Swap),
            dropped: self.dropped,
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).nanos(),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::BeginFrame => 0,
        PhaseKind::Commit => 1,
        PhaseKind::PrepareToDraw => 2,
        PhaseKind::Draw => 3,
        PhaseKind::Swap => 4,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
