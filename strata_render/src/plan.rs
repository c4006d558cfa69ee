// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render passes: ordered quad lists for one frame.

use alloc::vec::Vec;

use strata_core::kurbo::Rect;
use strata_core::layer::{FilterOp, LayerId};
use strata_core::transform::Transform3d;

use crate::resource::ResourceKey;

/// Identifies a render pass by the layer owning its render surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderPassId(pub LayerId);

/// What a quad draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QuadMaterial {
    /// A texture backing.
    Texture {
        /// Backing to sample.
        resource: ResourceKey,
        /// Whether blending can be skipped.
        opaque: bool,
    },
    /// A solid fill.
    SolidColor {
        /// Fill color, RGBA in `0..=1`.
        rgba: [f32; 4],
    },
    /// Placeholder for content whose texture is missing.
    Checkerboard,
    /// The output of another render pass.
    RenderPass {
        /// Pass to sample.
        pass: RenderPassId,
        /// Mask texture, if the surface is masked.
        mask: Option<ResourceKey>,
        /// Whether this quad draws the surface's replica.
        is_replica: bool,
        /// Filter applied while drawing.
        filter: Option<FilterOp>,
    },
}

/// A single draw command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawQuad {
    /// The layer this quad originates from.
    pub layer: LayerId,
    /// Quad rect in content space (already shrunk by occlusion).
    pub rect: Rect,
    /// Maps content space to the pass's target.
    pub transform: Transform3d,
    /// Opacity to draw with.
    pub opacity: f32,
    /// Clip in target space, if any.
    pub clip_rect: Option<Rect>,
    /// What to draw.
    pub material: QuadMaterial,
}

impl DrawQuad {
    /// Returns whether the quad covers its rect with opaque pixels.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.opacity >= 1.0
            && match self.material {
                QuadMaterial::Texture { opaque, .. } => opaque,
                QuadMaterial::SolidColor { rgba } => rgba[3] >= 1.0,
                QuadMaterial::Checkerboard => true,
                QuadMaterial::RenderPass { .. } => false,
            }
    }
}

/// The quads drawn into one render surface.
///
/// Quads are stored back to front.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    /// Surface owner.
    pub id: RenderPassId,
    /// Surface content rect.
    pub output_rect: Rect,
    /// Maps the surface to the screen.
    pub transform_to_root: Transform3d,
    /// Damage accumulated for this surface.
    pub damage_rect: Rect,
    /// Region to redraw; the whole output rect unless partial swap applies.
    pub scissor_rect: Rect,
    /// Draw commands, back to front.
    pub quads: Vec<DrawQuad>,
}

impl RenderPass {
    /// Creates an empty pass.
    #[must_use]
    pub fn new(id: RenderPassId, output_rect: Rect, transform_to_root: Transform3d) -> Self {
        Self {
            id,
            output_rect,
            transform_to_root,
            damage_rect: output_rect,
            scissor_rect: output_rect,
            quads: Vec::new(),
        }
    }
}

/// Passes for one frame. Every pass comes after the passes it samples, so
/// the root pass is last.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderPassList {
    /// Passes in draw order.
    pub passes: Vec<RenderPass>,
}

impl RenderPassList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The root pass.
    #[must_use]
    pub fn root(&self) -> Option<&RenderPass> {
        self.passes.last()
    }

    /// Finds a pass by id.
    #[must_use]
    pub fn find(&self, id: RenderPassId) -> Option<&RenderPass> {
        self.passes.iter().find(|p| p.id == id)
    }

    /// Total quad count.
    #[must_use]
    pub fn quad_count(&self) -> usize {
        self.passes.iter().map(|p| p.quads.len()).sum()
    }

    /// Clears the list for reuse.
    pub fn clear(&mut self) {
        self.passes.clear();
    }
}

/// Counters gathered while building passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawStats {
    /// Passes built.
    pub render_passes: u32,
    /// Quads appended.
    pub quads: u32,
    /// Quads culled as fully occluded.
    pub culled_quads: u32,
    /// Quads drawn as checkerboard for lack of a texture.
    pub missing_textures: u32,
}

#[cfg(test)]
mod tests {
    use strata_core::layer::LayerStore;

    use super::*;

    fn quad(layer: LayerId, material: QuadMaterial) -> DrawQuad {
        DrawQuad {
            layer,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            transform: Transform3d::IDENTITY,
            opacity: 1.0,
            clip_rect: None,
            material,
        }
    }

    #[test]
    fn root_is_last_pass() {
        let mut store = LayerStore::new();
        let root = store.create_layer();
        let child = store.create_layer();
        let output = Rect::new(0.0, 0.0, 100.0, 100.0);
        let mut list = RenderPassList::new();
        list.passes.push(RenderPass::new(RenderPassId(child), output, Transform3d::IDENTITY));
        let mut root_pass = RenderPass::new(RenderPassId(root), output, Transform3d::IDENTITY);
        root_pass.quads.push(quad(
            child,
            QuadMaterial::RenderPass {
                pass: RenderPassId(child),
                mask: None,
                is_replica: false,
                filter: None,
            },
        ));
        list.passes.push(root_pass);

        assert_eq!(list.root().map(|p| p.id), Some(RenderPassId(root)));
        assert!(list.find(RenderPassId(child)).is_some(), "child pass present");
        assert_eq!(list.quad_count(), 1);
        list.clear();
        assert!(list.root().is_none(), "cleared");
    }

    #[test]
    fn opacity_of_quads() {
        let mut store = LayerStore::new();
        let id = store.create_layer();
        assert!(quad(id, QuadMaterial::SolidColor { rgba: [1.0; 4] }).is_opaque(), "solid");
        assert!(
            !quad(id, QuadMaterial::SolidColor { rgba: [1.0, 1.0, 1.0, 0.5] }).is_opaque(),
            "translucent color"
        );
        let mut q = quad(
            id,
            QuadMaterial::Texture {
                resource: ResourceKey(1),
                opaque: true,
            },
        );
        assert!(q.is_opaque(), "opaque texture");
        q.opacity = 0.5;
        assert!(!q.is_opaque(), "layer opacity");
    }
}
