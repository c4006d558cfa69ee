// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commit/draw hosts for strata.
//!
//! This crate runs a [`strata_core`] layer tree through the two-context
//! compositor pipeline:
//!
//! - [`TreeHost`]: client-side owner of the pending tree and its texture
//!   manager, with [`TreeHostClient`] hooks for the embedder
//! - [`CompositorHost`]: compositor-side owner of the active tree; commits,
//!   animates, scrolls, and turns the tree into render passes
//! - [`synchronize_trees`] and [`calculate_draw_properties`]: the steps
//!   between a commit and a drawable tree
//! - [`Renderer`]: the backend contract, with an in-memory
//!   [`HeadlessRenderer`]
//!
//! A host runs its compositor either inline ([`TreeHost::single_threaded`])
//! or on a dedicated thread ([`TreeHost::threaded`]). Both behave the same
//! from the client's side.
//!
//! ```
//! use strata_core::kurbo::{Point, Rect, Size};
//! use strata_core::layer::LayerContent;
//! use strata_host::{HeadlessRenderer, NoopClient, Settings, TreeHost};
//!
//! let mut host = TreeHost::single_threaded(
//!     Settings::default(),
//!     Box::new(NoopClient),
//!     Box::new(HeadlessRenderer::new()),
//! );
//! host.start().unwrap();
//!
//! let root = host.layers_mut().create_layer();
//! host.layers_mut().set_anchor_point(root, Point::ZERO);
//! host.layers_mut().set_bounds(root, Size::new(4.0, 4.0));
//! host.layers_mut().set_content(root, LayerContent::Solid { rgba: [0.0, 0.0, 1.0, 1.0] });
//! host.set_root_layer(Some(root));
//! host.set_viewport_size(Size::new(4.0, 4.0));
//!
//! let pixels = host.composite_and_readback(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
//! assert_eq!(pixels, [0, 0, 255, 255]);
//! ```
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Emits commit/draw events to an installed
//!   [`TraceSink`](strata_core::trace::TraceSink).
//! - `trace-rich` (disabled by default, implies `trace`): Also emits damage
//!   rects and per-layer changes.

mod compositor;
mod draw_properties;
mod error;
mod host;
mod iterator;
mod proxy;
mod renderer;
mod settings;
mod sync;
mod time;
mod tree;

pub use compositor::{CompositorHost, DrawOutcome, FrameData, LayerScroll, ScrollAndScaleSet};
pub use draw_properties::calculate_draw_properties;
pub use error::{Error, Result};
pub use host::{NoopClient, TreeHost, TreeHostClient};
pub use iterator::{IteratorPosition, back_to_front, front_to_back};
pub use renderer::{DrawRecord, HeadlessHandle, HeadlessRenderer, Renderer};
pub use settings::Settings;
pub use sync::{SyncStats, synchronize_trees};
pub use time::now;
pub use tree::{DrawProperties, LayerImpl, LayerTreeImpl, RenderSurface};
