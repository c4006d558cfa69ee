// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`ChromeTraceSink`] collects events as they arrive and [`write_to`]
//! serializes them as [Chrome Trace Event Format][format] JSON.
//!
//! Phases become duration events (`B`/`E`); everything else is an instant
//! event. Events without a timestamp of their own (commits, draws, texture
//! snapshots, rich events) are stamped with the last timestamp seen.
//!
//! [`write_to`]: ChromeTraceSink::write_to
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use strata_core::time::HostTime;
use strata_core::trace::{
    BeginFrameEvent, CommitEvent, ContextLostEvent, DamageRect, DrawEvent, FrameSummary,
    LayerChange, PhaseBeginEvent, PhaseEndEvent, StaleFrameEvent, TextureMemoryEvent, TraceSink,
};

use crate::{host_us, nanos_to_us};

/// Collects trace events for export as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
#[derive(Debug, Default)]
pub struct ChromeTraceSink {
    events: Vec<Value>,
    last_us: f64,
}

impl ChromeTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every collected event.
    pub fn clear(&mut self) {
        self.events.clear();
        self.last_us = 0.0;
    }

    /// Writes the collected events as a JSON array.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }

    fn stamp(&mut self, t: HostTime) -> f64 {
        self.last_us = host_us(t);
        self.last_us
    }

    fn instant(&mut self, name: &str, cat: &str, ts: f64, args: Value) {
        self.events.push(json!({
            "ph": "i",
            "name": name,
            "cat": cat,
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "s": "t",
            "args": args,
        }));
    }
}

impl TraceSink for ChromeTraceSink {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let ts = self.stamp(e.now);
        self.instant(
            "BeginFrame",
            "Scheduler",
            ts,
            json!({
                "frame_index": e.frame_index,
                "sequence": e.sequence,
                "forced": e.forced,
            }),
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.instant(
            "Commit",
            "Frame",
            self.last_us,
            json!({
                "frame_index": e.frame_index,
                "sequence": e.sequence,
                "layer_count": e.layer_count,
                "created": e.created,
                "destroyed": e.destroyed,
            }),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let ts = self.stamp(e.timestamp);
        self.events.push(json!({
            "ph": "B",
            "name": format!("{:?}", e.phase),
            "cat": "Frame",
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "args": {
                "frame_index": e.frame_index,
            }
        }));
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let ts = self.stamp(e.timestamp);
        self.events.push(json!({
            "ph": "E",
            "name": format!("{:?}", e.phase),
            "cat": "Frame",
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "args": {
                "frame_index": e.frame_index,
            }
        }));
    }

    fn on_draw(&mut self, e: &DrawEvent) {
        self.instant(
            "Draw",
            "Frame",
            self.last_us,
            json!({
                "frame_index": e.frame_index,
                "render_passes": e.render_passes,
                "quads": e.quads,
                "culled_quads": e.culled_quads,
                "missing_textures": e.missing_textures,
                "dropped": e.dropped,
            }),
        );
    }

    fn on_texture_memory(&mut self, e: &TextureMemoryEvent) {
        // Counter events render as a graph track.
        self.events.push(json!({
            "ph": "C",
            "name": "TextureMemory",
            "cat": "Textures",
            "ts": self.last_us,
            "pid": 0,
            "tid": 0,
            "args": {
                "use": e.memory_use_bytes,
                "above_cutoff": e.memory_above_cutoff_bytes,
                "max": e.max_memory_bytes,
            }
        }));
    }

    fn on_stale_frame(&mut self, e: &StaleFrameEvent) {
        self.instant(
            "StaleFrame",
            "Scheduler",
            self.last_us,
            json!({
                "sequence": e.sequence,
                "last_executed": e.last_executed,
            }),
        );
    }

    fn on_context_lost(&mut self, e: &ContextLostEvent) {
        let ts = self.stamp(e.timestamp);
        self.events.push(json!({
            "ph": "i",
            "name": "ContextLost",
            "cat": "Renderer",
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "s": "g",
            "args": {
                "frame_index": e.frame_index,
            }
        }));
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let ts = self.stamp(s.now);
        self.events.push(json!({
            "ph": "i",
            "name": "FrameSummary",
            "cat": "Summary",
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "s": "g",
            "args": {
                "frame_index": s.frame_index,
                "begin_frame_us": nanos_to_us(s.begin_frame_nanos),
                "commit_us": nanos_to_us(s.commit_nanos),
                "prepare_us": nanos_to_us(s.prepare_nanos),
                "draw_us": nanos_to_us(s.draw_nanos),
                "swap_us": nanos_to_us(s.swap_nanos),
                "dropped": s.dropped,
            }
        }));
    }

    fn on_layer_changes(&mut self, frame_index: u64, changes: &[LayerChange]) {
        let changes: Vec<Value> = changes
            .iter()
            .map(|c| json!({ "layer": c.layer_index, "field": format!("{:?}", c.field) }))
            .collect();
        self.instant(
            "LayerChanges",
            "Rich",
            self.last_us,
            json!({
                "frame_index": frame_index,
                "changes": changes,
            }),
        );
    }

    fn on_damage_rects(&mut self, frame_index: u64, rects: &[DamageRect]) {
        let rects: Vec<Value> = rects
            .iter()
            .map(|r| json!([r.x, r.y, r.width, r.height]))
            .collect();
        self.instant(
            "DamageRects",
            "Rich",
            self.last_us,
            json!({
                "frame_index": frame_index,
                "rects": rects,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::trace::{LayerField, PhaseKind};

    fn export(sink: &ChromeTraceSink) -> Vec<Value> {
        let mut out = Vec::new();
        sink.write_to(&mut out).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn export_produces_valid_json() {
        let mut sink = ChromeTraceSink::new();
        sink.on_begin_frame(&BeginFrameEvent {
            frame_index: 0,
            sequence: 1,
            now: HostTime(1_000_000),
            forced: false,
        });
        sink.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Commit,
            timestamp: HostTime(1_000_000),
        });
        sink.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Commit,
            timestamp: HostTime(1_000_500),
        });

        let parsed = export(&sink);
        assert_eq!(parsed.len(), 3, "one object per event");

        assert_eq!(parsed[0]["ph"], "i");
        assert_eq!(parsed[0]["name"], "BeginFrame");
        assert_eq!(parsed[0]["ts"], 1000.0);

        assert_eq!(parsed[1]["ph"], "B");
        assert_eq!(parsed[1]["name"], "Commit");

        assert_eq!(parsed[2]["ph"], "E");
        assert_eq!(parsed[2]["ts"], 1000.5);
    }

    #[test]
    fn untimed_events_reuse_the_last_timestamp() {
        let mut sink = ChromeTraceSink::new();
        sink.on_phase_end(&PhaseEndEvent {
            frame_index: 2,
            phase: PhaseKind::Draw,
            timestamp: HostTime(3_000),
        });
        sink.on_draw(&DrawEvent {
            frame_index: 2,
            quads: 4,
            ..DrawEvent::default()
        });
        sink.on_texture_memory(&TextureMemoryEvent {
            frame_index: 2,
            memory_use_bytes: 1024,
            ..TextureMemoryEvent::default()
        });

        let parsed = export(&sink);
        assert_eq!(parsed[1]["name"], "Draw");
        assert_eq!(parsed[1]["ts"], 3.0);
        assert_eq!(parsed[1]["args"]["quads"], 4);
        assert_eq!(parsed[2]["ph"], "C");
        assert_eq!(parsed[2]["args"]["use"], 1024);
    }

    #[test]
    fn rich_events_carry_their_payload() {
        let mut sink = ChromeTraceSink::new();
        sink.on_layer_changes(
            1,
            &[LayerChange {
                layer_index: 5,
                field: LayerField::Opacity,
            }],
        );
        sink.on_damage_rects(
            1,
            &[DamageRect {
                x: 1,
                y: 2,
                width: 3,
                height: 4,
            }],
        );

        let parsed = export(&sink);
        assert_eq!(parsed[0]["args"]["changes"][0]["field"], "Opacity");
        assert_eq!(parsed[1]["args"]["rects"][0], json!([1, 2, 3, 4]));
    }

    #[test]
    fn export_empty_recording() {
        let mut sink = ChromeTraceSink::new();
        assert!(export(&sink).is_empty(), "nothing collected");
        sink.on_stale_frame(&StaleFrameEvent {
            sequence: 1,
            last_executed: 2,
        });
        assert_eq!(sink.len(), 1, "stale frame collected");
        sink.clear();
        assert!(sink.is_empty(), "cleared");
    }
}
