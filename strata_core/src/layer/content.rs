// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer content descriptions and filters.

use kurbo::{Point, Rect, Size};

use crate::geometry;

/// What a layer draws.
///
/// Content is a capability-based description rather than a layer subtype:
/// the compositor only asks whether it draws and which part of it is opaque.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum LayerContent {
    /// A grouping node; draws nothing itself.
    #[default]
    Empty,
    /// Texture-backed painted content.
    Painted {
        /// Sub-rect (layer space) known to be fully opaque.
        opaque_rect: Option<Rect>,
    },
    /// A solid color fill, premultiplied-independent RGBA in `0..=1`.
    Solid {
        /// Fill color.
        rgba: [f32; 4],
    },
}

impl LayerContent {
    /// Returns whether the content produces any pixels.
    #[inline]
    #[must_use]
    pub const fn draws_content(&self) -> bool {
        !matches!(self, Self::Empty)
    }

    /// Returns whether the content is backed by a prioritized texture.
    #[inline]
    #[must_use]
    pub const fn needs_texture(&self) -> bool {
        matches!(self, Self::Painted { .. })
    }

    /// The layer-space rect that is fully opaque, if any.
    ///
    /// `contents_opaque` promotes the whole bounds; a solid color is opaque
    /// when its alpha is 1; painted content falls back to its explicit
    /// opaque rect.
    #[must_use]
    pub fn visible_opaque_rect(&self, bounds: Size, contents_opaque: bool) -> Option<Rect> {
        let full = Rect::from_origin_size(Point::ORIGIN, bounds);
        let rect = match self {
            Self::Empty => return None,
            _ if contents_opaque => full,
            Self::Painted { opaque_rect } => geometry::intersect((*opaque_rect)?, full),
            Self::Solid { rgba } => {
                if rgba[3] >= 1.0 {
                    full
                } else {
                    return None;
                }
            }
        };
        (!geometry::is_empty(rect)).then_some(rect)
    }
}

/// A single filter applied to a layer's subtree through its render surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOp {
    /// Gaussian blur; spreads pixels by three standard deviations.
    Blur {
        /// Standard deviation in layer pixels.
        radius: f64,
    },
    /// Grayscale conversion, `0..=1`.
    Grayscale(f32),
    /// Opacity multiplier, `0..=1`.
    Opacity(f32),
}

impl FilterOp {
    /// Distance, in surface pixels, by which the filter can move a pixel.
    #[must_use]
    pub fn outset(&self) -> f64 {
        match self {
            Self::Blur { radius } => (radius * 3.0).max(0.0),
            Self::Grayscale(_) | Self::Opacity(_) => 0.0,
        }
    }

    /// Returns whether the filter moves pixels (and so invalidates occlusion
    /// inherited from outside the filtered subtree).
    #[inline]
    #[must_use]
    pub fn moves_pixels(&self) -> bool {
        self.outset() > 0.0
    }

    /// Returns whether the filter can make opaque pixels translucent.
    #[inline]
    #[must_use]
    pub fn affects_opacity(&self) -> bool {
        match self {
            Self::Opacity(amount) => *amount < 1.0,
            Self::Blur { .. } => true,
            Self::Grayscale(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_draws_nothing() {
        assert!(!LayerContent::Empty.draws_content());
        assert_eq!(
            LayerContent::Empty.visible_opaque_rect(Size::new(10.0, 10.0), true),
            None
        );
    }

    #[test]
    fn contents_opaque_promotes_whole_bounds() {
        let painted = LayerContent::Painted { opaque_rect: None };
        assert_eq!(painted.visible_opaque_rect(Size::new(10.0, 10.0), false), None);
        assert_eq!(
            painted.visible_opaque_rect(Size::new(10.0, 10.0), true),
            Some(Rect::new(0.0, 0.0, 10.0, 10.0))
        );
    }

    #[test]
    fn opaque_rect_is_clamped_to_bounds() {
        let painted = LayerContent::Painted {
            opaque_rect: Some(Rect::new(5.0, 5.0, 50.0, 50.0)),
        };
        assert_eq!(
            painted.visible_opaque_rect(Size::new(10.0, 10.0), false),
            Some(Rect::new(5.0, 5.0, 10.0, 10.0))
        );
    }

    #[test]
    fn translucent_solid_is_not_opaque() {
        let solid = LayerContent::Solid {
            rgba: [1.0, 0.0, 0.0, 0.5],
        };
        assert_eq!(solid.visible_opaque_rect(Size::new(4.0, 4.0), false), None);
    }

    #[test]
    fn blur_moves_pixels() {
        let blur = FilterOp::Blur { radius: 2.0 };
        assert_eq!(blur.outset(), 6.0);
        assert!(blur.moves_pixels());
        assert!(!FilterOp::Grayscale(1.0).moves_pixels());
    }
}
