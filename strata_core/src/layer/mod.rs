// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer tree data model.
//!
//! A *layer* is a node in a compositing tree. Each layer has:
//!
//! - An identity ([`LayerId`]): a generational handle that becomes stale when
//!   the layer is destroyed.
//! - Topology: parent, first-child, and sibling links forming an ordered tree,
//!   plus optional [mask](LayerStore::set_mask) and
//!   [replica](LayerStore::set_replica) layers attached to an owner.
//! - **Local properties** set by the caller: geometry
//!   ([`position`](LayerStore::set_position),
//!   [`anchor_point`](LayerStore::set_anchor_point),
//!   [`bounds`](LayerStore::set_bounds),
//!   [`transform`](LayerStore::set_transform)),
//!   [`opacity`](LayerStore::set_opacity), [`content`](LayerStore::set_content),
//!   [`flags`](LayerStore::set_flags), [`filter`](LayerStore::set_filter), and
//!   [scroll state](LayerStore::set_scroll_offset).
//! - **Computed properties** produced by [`evaluate`](LayerStore::evaluate):
//!   `world_transform`, `effective_opacity`, and `effective_hidden`.
//!
//! # Geometry
//!
//! `position` is the top-left corner of the untransformed layer in its
//! parent's sublayer space; the transform is applied about the anchor point
//! (see [`local_matrix`]). A layer's children live in its sublayer space,
//! which is its own space shifted by its negated scroll offset.

mod content;
mod evaluate;
mod id;
mod store;
mod traverse;

use kurbo::{Point, Size};

use crate::transform::Transform3d;

pub use content::{FilterOp, LayerContent};
pub use evaluate::LayerChanges;
pub use id::{INVALID, LayerId};
pub use store::{LayerFlags, LayerProperties, LayerStore};
pub use traverse::{Children, Descendants};

/// Maps layer space to the parent's sublayer space.
///
/// Computes `translate(position + anchor * bounds) * transform *
/// translate(-anchor * bounds)`.
#[must_use]
pub fn local_matrix(
    position: Point,
    anchor_point: Point,
    bounds: Size,
    transform: &Transform3d,
) -> Transform3d {
    let ax = anchor_point.x * bounds.width;
    let ay = anchor_point.y * bounds.height;
    Transform3d::from_translation(position.x + ax, position.y + ay, 0.0)
        * *transform
        * Transform3d::from_translation(-ax, -ay, 0.0)
}
