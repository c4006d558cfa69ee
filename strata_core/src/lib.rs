// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer tree, geometry, and scheduling primitives for a two-context
//! compositor.
//!
//! `strata_core` holds the data model shared by the client context (which
//! builds and mutates the layer tree) and the compositor context (which draws
//! it). It is `no_std` compatible (with `alloc`) and uses struct-of-arrays
//! storage with generational handles for the client-side tree.
//!
//! # Architecture
//!
//! ```text
//!   client context                          compositor context
//!   ──────────────                          ──────────────────
//!   LayerStore (pending tree)
//!       │ mutate, mark dirty
//!       ▼
//!   LayerStore::evaluate() ──► LayerChanges ──► synchronizer ──► impl tree
//!                                                                   │
//!                                 SchedulerStateMachine ◄───────────┤
//!                                 (begin frame / commit / draw)     ▼
//!                                                        damage, occlusion,
//!                                                        render passes
//! ```
//!
//! **[`layer`]**: Struct-of-arrays layer tree with generational handles.
//! Geometry (position, anchor point, bounds, transform), opacity, content,
//! effects (mask, replica, filter), and scroll state are set by the caller;
//! world transforms and effective opacities are computed by evaluation.
//!
//! **[`dirty`]**: Multi-channel dirty tracking via `understory_dirty`.
//!
//! **[`geometry`]**: Float rect helpers and the [`Region`](geometry::Region)
//! coverage type used by occlusion tracking.
//!
//! **[`transform`]**: Column-major 4×4 transform with inversion, homogeneous
//! point mapping, and clipped rect projection.
//!
//! **[`animation`]**: Opacity and transform animations ticked by the
//! compositor between commits.
//!
//! **[`scheduler`]**: The state machine deciding when the compositor context
//! begins a frame, commits, draws, or recreates its graphics context.
//!
//! **[`time`]**: Monotonic nanosecond timestamps and durations.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! commit/draw instrumentation, with zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-layer
//!   change and damage-rect events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub use kurbo;

pub mod animation;
pub mod dirty;
pub mod geometry;
pub mod layer;
pub mod scheduler;
pub mod time;
pub mod trace;
pub mod transform;
