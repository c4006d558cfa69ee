// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-surface damage tracking.
//!
//! A [`DamageTracker`] belongs to one render surface. Each frame the
//! compositor describes every contributor drawing into that surface (its
//! layers and contributing child surfaces, back to front) and the tracker
//! unions into its damage rect everything that may have changed color:
//!
//! - a new or changed contributor damages both its previous and its current
//!   target-space rect;
//! - an unchanged layer that draws content damages its update rect, mapped to
//!   the target;
//! - an unchanged contributing surface damages its own accumulated damage,
//!   mapped through its draw transform and again through its replica draw
//!   transform;
//! - a contributor that disappeared damages the rect it covered last frame;
//! - a changed mask on the target surface damages the whole content rect.
//!
//! Damage accumulates across updates until the renderer reports it drew it
//! ([`did_draw_damaged_area`](DamageTracker::did_draw_damaged_area)). All
//! rects are floats and are unioned losslessly.

use alloc::collections::BTreeMap;

use strata_core::geometry;
use strata_core::kurbo::{Point, Rect, Size};
use strata_core::layer::{FilterOp, LayerId};
use strata_core::transform::Transform3d;

/// A layer drawing directly into the tracked surface.
#[derive(Clone, Copy, Debug)]
pub struct LayerDamage {
    /// The layer.
    pub id: LayerId,
    /// Maps layer content space to the target surface.
    pub draw_transform: Transform3d,
    /// Layer bounds; the content rect is `(0, 0) .. bounds`.
    pub bounds: Size,
    /// Whether any property affecting the layer's pixels changed.
    pub property_changed: bool,
    /// Repainted region in layer space.
    pub update_rect: Rect,
    /// Whether the layer draws anything.
    pub draws_content: bool,
}

/// The replica of a contributing surface.
#[derive(Clone, Copy, Debug)]
pub struct ReplicaDamage {
    /// Maps surface space to the target surface for the reflected copy.
    pub draw_transform: Transform3d,
    /// The replica's own mask, if any.
    pub mask: Option<MaskDamage>,
}

/// A mask layer's change state.
#[derive(Clone, Copy, Debug)]
pub struct MaskDamage {
    /// The mask layer.
    pub id: LayerId,
    /// Whether the mask changed since the last frame (new, moved, or
    /// repainted).
    pub changed: bool,
}

/// A child surface contributing to the tracked surface.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceDamage {
    /// Layer owning the child surface.
    pub owner: LayerId,
    /// Target-space bounds of the child surface, including its replica.
    pub drawable_content_rect: Rect,
    /// Child surface content rect, in its own space.
    pub content_rect: Rect,
    /// Maps the child surface to the target surface.
    pub draw_transform: Transform3d,
    /// The child's replica, if any.
    pub replica: Option<ReplicaDamage>,
    /// Whether the surface itself moved or changed opacity, filter, or mask.
    pub property_changed: bool,
    /// The child surface's current damage, in its own space.
    pub damage: Rect,
}

/// One entry of a surface's back-to-front contributor list.
#[derive(Clone, Copy, Debug)]
pub enum DamageContributor {
    /// A layer drawing into the surface.
    Layer(LayerDamage),
    /// A child surface drawing into the surface.
    Surface(SurfaceDamage),
}

/// State of the tracked surface itself.
#[derive(Clone, Copy, Debug)]
pub struct TargetSurfaceDamage {
    /// The surface content rect, in its own space.
    pub content_rect: Rect,
    /// Whether the surface's own properties changed in a way that
    /// invalidates its whole content.
    pub property_changed: bool,
    /// The surface's mask, if any.
    pub mask: Option<MaskDamage>,
    /// Filter applied when the surface is drawn.
    pub filter: Option<FilterOp>,
}

/// Damage accumulator for one render surface.
#[derive(Clone, Debug, Default)]
pub struct DamageTracker {
    current_damage: Rect,
    /// Target-space rects from the previous update, keyed by contributor.
    previous_rects: BTreeMap<LayerId, Rect>,
    force_full_damage_next_update: bool,
}

impl DamageTracker {
    /// Creates a tracker whose first update damages everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            force_full_damage_next_update: true,
            ..Self::default()
        }
    }

    /// The accumulated damage, in surface space.
    #[inline]
    #[must_use]
    pub fn current_damage_rect(&self) -> Rect {
        self.current_damage
    }

    /// Makes the next update damage the whole content rect.
    pub fn force_full_damage_next_update(&mut self) {
        self.force_full_damage_next_update = true;
    }

    /// Clears the accumulated damage after it was drawn.
    pub fn did_draw_damaged_area(&mut self) {
        self.current_damage = Rect::ZERO;
    }

    /// Folds one frame of changes into the accumulated damage.
    pub fn update_damage_tracking_state(
        &mut self,
        contributors: &[DamageContributor],
        target: &TargetSurfaceDamage,
    ) {
        let mut next_rects = BTreeMap::new();
        let mut damage = Rect::ZERO;

        for contributor in contributors {
            let contribution = match contributor {
                DamageContributor::Layer(layer) => self.layer_damage(layer, &mut next_rects),
                DamageContributor::Surface(surface) => {
                    self.surface_damage(surface, &mut next_rects)
                }
            };
            damage = geometry::union(damage, contribution);
        }

        if let Some(mask) = &target.mask {
            // Masks recompute per-pixel coverage, so partial damage is unsound.
            if mask.changed {
                damage = geometry::union(damage, target.content_rect);
            }
        }

        // Whatever was not claimed this frame disappeared.
        for rect in self.previous_rects.values() {
            damage = geometry::union(damage, *rect);
        }
        self.previous_rects = next_rects;

        if self.force_full_damage_next_update || target.property_changed {
            self.current_damage = target.content_rect;
            self.force_full_damage_next_update = false;
            return;
        }

        if let Some(filter) = target.filter.filter(FilterOp::moves_pixels) {
            damage = geometry::outset(damage, filter.outset());
        }
        self.current_damage = geometry::union(self.current_damage, damage);
    }

    /// Takes the previous rect for `id`, reporting whether it is new.
    fn take_previous(&mut self, id: LayerId) -> (Rect, bool) {
        match self.previous_rects.remove(&id) {
            Some(rect) => (rect, false),
            None => (Rect::ZERO, true),
        }
    }

    fn layer_damage(&mut self, layer: &LayerDamage, next: &mut BTreeMap<LayerId, Rect>) -> Rect {
        let (old_rect, is_new) = self.take_previous(layer.id);
        let content = Rect::from_origin_size(Point::ORIGIN, layer.bounds);
        let rect = layer.draw_transform.map_clipped_rect(content);
        next.insert(layer.id, rect);

        if is_new || layer.property_changed {
            geometry::union(rect, old_rect)
        } else if layer.draws_content && !geometry::is_empty(layer.update_rect) {
            layer.draw_transform.map_clipped_rect(layer.update_rect)
        } else {
            Rect::ZERO
        }
    }

    fn surface_damage(
        &mut self,
        surface: &SurfaceDamage,
        next: &mut BTreeMap<LayerId, Rect>,
    ) -> Rect {
        let (old_rect, is_new) = self.take_previous(surface.owner);
        let rect = surface.drawable_content_rect;
        next.insert(surface.owner, rect);

        let mut damage = if is_new || surface.property_changed {
            geometry::union(rect, old_rect)
        } else {
            let mut local = surface.draw_transform.map_clipped_rect(surface.damage);
            if let Some(replica) = &surface.replica {
                local = geometry::union(local, replica.draw_transform.map_clipped_rect(surface.damage));
            }
            local
        };

        // A replica mask change invalidates the whole reflected copy.
        if let Some(ReplicaDamage {
            draw_transform,
            mask: Some(mask),
        }) = &surface.replica
        {
            let (_, mask_is_new) = self.take_previous(mask.id);
            let mask_rect = draw_transform.map_clipped_rect(surface.content_rect);
            next.insert(mask.id, mask_rect);
            if mask_is_new || mask.changed {
                damage = geometry::union(damage, mask_rect);
            }
        }
        damage
    }
}
