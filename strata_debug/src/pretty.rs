// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! and durations are printed in microseconds.

use std::io::Write;

use strata_core::trace::{
    BeginFrameEvent, CommitEvent, ContextLostEvent, DamageRect, DrawEvent, FrameSummary,
    LayerChange, PhaseBeginEvent, PhaseEndEvent, StaleFrameEvent, TextureMemoryEvent, TraceSink,
};

use crate::{host_us, nanos_to_us};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    lines: u64,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer, lines: 0 }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Number of lines written so far.
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        // Trace output is best-effort.
        if writeln!(self.writer, "{args}").is_ok() {
            self.lines += 1;
        }
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let forced = if e.forced { " forced" } else { "" };
        self.line(format_args!(
            "[begin] frame={} seq={} now={:.1}µs{forced}",
            e.frame_index,
            e.sequence,
            host_us(e.now),
        ));
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.line(format_args!(
            "[commit] frame={} seq={} layers={} +{} -{}",
            e.frame_index, e.sequence, e.layer_count, e.created, e.destroyed,
        ));
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.line(format_args!(
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            host_us(e.timestamp),
        ));
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.line(format_args!(
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            e.phase.name(),
            host_us(e.timestamp),
        ));
    }

    fn on_draw(&mut self, e: &DrawEvent) {
        let status = if e.dropped { "DROPPED" } else { "ok" };
        self.line(format_args!(
            "[draw] frame={} passes={} quads={} culled={} checkerboard={} {status}",
            e.frame_index, e.render_passes, e.quads, e.culled_quads, e.missing_textures,
        ));
    }

    fn on_texture_memory(&mut self, e: &TextureMemoryEvent) {
        self.line(format_args!(
            "[textures] frame={} use={}B above_cutoff={}B max={}B evicted={}",
            e.frame_index,
            e.memory_use_bytes,
            e.memory_above_cutoff_bytes,
            e.max_memory_bytes,
            e.evicted_backings,
        ));
    }

    fn on_stale_frame(&mut self, e: &StaleFrameEvent) {
        self.line(format_args!(
            "[stale] seq={} last_executed={}",
            e.sequence, e.last_executed,
        ));
    }

    fn on_context_lost(&mut self, e: &ContextLostEvent) {
        self.line(format_args!(
            "[context-lost] frame={} at {:.1}µs",
            e.frame_index,
            host_us(e.timestamp),
        ));
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let status = if s.dropped { "DROPPED" } else { "ok" };
        self.line(format_args!(
            "[summary] frame={} begin={:.1}µs commit={:.1}µs prepare={:.1}µs \
             draw={:.1}µs swap={:.1}µs {status}",
            s.frame_index,
            nanos_to_us(s.begin_frame_nanos),
            nanos_to_us(s.commit_nanos),
            nanos_to_us(s.prepare_nanos),
            nanos_to_us(s.draw_nanos),
            nanos_to_us(s.swap_nanos),
        ));
    }

    fn on_layer_changes(&mut self, frame_index: u64, changes: &[LayerChange]) {
        self.line(format_args!(
            "[layers] frame={frame_index} changes={}",
            changes.len(),
        ));
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        match rects {
            [] => self.line(format_args!("[damage] frame={frame_index} none")),
            [r] => self.line(format_args!(
                "[damage] frame={frame_index} {}x{}+{}+{}",
                r.width, r.height, r.x, r.y,
            )),
            _ => self.line(format_args!(
                "[damage] frame={frame_index} rects={}",
                rects.len(),
            )),
        }
    }
}
