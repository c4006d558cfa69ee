// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage tracking, occlusion culling, prioritized textures, and render
//! passes for strata.
//!
//! This crate sits between [`strata_core`]'s layer model and a renderer
//! backend. It defines:
//!
//! - [`DamageTracker`]: per-surface accumulation of changed pixels
//! - [`OcclusionTracker`]: front-to-back opaque coverage for quad culling
//! - [`PrioritizedTextureManager`]: priority-ordered GPU memory budgeting,
//!   with backing mutation behind [`ImplAccess`]
//! - [`RenderPass`] and [`DrawQuad`]: the per-frame draw list
//! - [`ResourceKey`] and [`BackingAllocator`]: the contract with the backend
//!
//! Everything here is `no_std` (with `alloc`) and deterministic: the same
//! inputs produce the same damage, occlusion, and cutoff.

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod damage;
mod occlusion;
mod plan;
mod resource;
mod texture;

pub use damage::{
    DamageContributor, DamageTracker, LayerDamage, MaskDamage, ReplicaDamage, SurfaceDamage,
    TargetSurfaceDamage,
};
pub use occlusion::{LayerOcclusion, OcclusionTracker, SurfaceOcclusion};
pub use plan::{DrawQuad, DrawStats, QuadMaterial, RenderPass, RenderPassId, RenderPassList};
pub use resource::{BackingAllocator, ResourceKey};
pub use texture::{
    ImplAccess, PrioritizedTextureManager, PriorityCalculator, TextureFormat, TextureId,
    TextureSize,
};
