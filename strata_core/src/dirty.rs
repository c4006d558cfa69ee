// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! The pending layer tree uses multi-channel dirty tracking (via
//! [`understory_dirty`]) to record which layers changed since the last
//! commit. The synchronizer turns the drained channels into the impl-side
//! "property changed" flags that drive damage tracking.
//!
//! # Propagation semantics
//!
//! - **Propagating**: [`TRANSFORM`], [`OPACITY`], and [`CLIP`] use
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) and have dependency
//!   edges from child to parent (and from mask/replica layers to their
//!   owner). Moving, fading, or re-clipping a layer changes the target-space
//!   footprint of its whole subtree, so every descendant is marked. Hidden
//!   flag changes are routed through [`TRANSFORM`].
//!
//! - **Local-only**: [`CONTENT`] and [`EFFECTS`] are marked with the default
//!   policy. Content kind, opaqueness, filters, and mask/replica attachment
//!   are per-layer properties.
//!
//! - **Structural**: [`TOPOLOGY`] is marked on topology mutations and
//!   triggers a traversal-order rebuild during evaluation.
//!
//! Repaint requests (`set_needs_display`) do not use a channel: they
//! accumulate an update rect that the synchronizer takes directly.

use understory_dirty::Channel;

/// Geometry or hidden flag changed: position, anchor point, bounds,
/// transform, or scroll offset.
pub const TRANSFORM: Channel = Channel::new(0);

/// Opacity changed.
pub const OPACITY: Channel = Channel::new(1);

/// `masks_to_bounds` changed.
pub const CLIP: Channel = Channel::new(2);

/// Content description or `contents_opaque` changed.
pub const CONTENT: Channel = Channel::new(3);

/// Filter, mask, or replica changed.
pub const EFFECTS: Channel = Channel::new(4);

/// Tree topology changed.
pub const TOPOLOGY: Channel = Channel::new(5);
