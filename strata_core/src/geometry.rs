// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rect helpers, quads, and the [`Region`] coverage type.
//!
//! Damage rects are float rects unioned losslessly; only occlusion works on
//! integer-aligned rects (via [`enclosed`] and [`enclosing`]). The helpers
//! here treat any rect with non-positive width or height as empty, and empty
//! rects never widen a union.

use alloc::vec::Vec;

use kurbo::{Point, Rect};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// Tolerance for treating quad edges as axis-aligned.
const RECTILINEAR_EPSILON: f64 = 1e-6;

/// Returns whether `r` covers no area (including NaN extents).
#[inline]
#[must_use]
pub fn is_empty(r: Rect) -> bool {
    !(r.x1 > r.x0 && r.y1 > r.y0)
}

/// Union that ignores empty operands.
#[must_use]
pub fn union(a: Rect, b: Rect) -> Rect {
    match (is_empty(a), is_empty(b)) {
        (true, true) => Rect::ZERO,
        (true, false) => b,
        (false, true) => a,
        (false, false) => a.union(b),
    }
}

/// Intersection that normalizes disjoint results to [`Rect::ZERO`].
#[must_use]
pub fn intersect(a: Rect, b: Rect) -> Rect {
    let r = a.intersect(b);
    if is_empty(r) { Rect::ZERO } else { r }
}

/// Returns whether `outer` fully contains `inner`. Empty rects are contained
/// by everything.
#[must_use]
pub fn contains(outer: Rect, inner: Rect) -> bool {
    is_empty(inner)
        || (outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1)
}

/// Smallest integer-aligned rect containing `r`.
#[must_use]
pub fn enclosing(r: Rect) -> Rect {
    if is_empty(r) {
        return Rect::ZERO;
    }
    Rect::new(r.x0.floor(), r.y0.floor(), r.x1.ceil(), r.y1.ceil())
}

/// Largest integer-aligned rect contained in `r`.
#[must_use]
pub fn enclosed(r: Rect) -> Rect {
    if is_empty(r) {
        return Rect::ZERO;
    }
    let out = Rect::new(r.x0.ceil(), r.y0.ceil(), r.x1.floor(), r.y1.floor());
    if is_empty(out) { Rect::ZERO } else { out }
}

/// Bounds of a set of points, or [`Rect::ZERO`] for an empty set.
#[must_use]
pub fn bounding_box(points: impl IntoIterator<Item = Point>) -> Rect {
    let mut iter = points.into_iter();
    let Some(first) = iter.next() else {
        return Rect::ZERO;
    };
    iter.fold(Rect::from_points(first, first), |acc, p| {
        Rect::new(
            acc.x0.min(p.x),
            acc.y0.min(p.y),
            acc.x1.max(p.x),
            acc.y1.max(p.y),
        )
    })
}

/// Outsets `r` by `amount` on every side; empty rects stay empty.
#[must_use]
pub fn outset(r: Rect, amount: f64) -> Rect {
    if is_empty(r) || amount <= 0.0 {
        return r;
    }
    r.inflate(amount, amount)
}

// ---------------------------------------------------------------------------
// Quad
// ---------------------------------------------------------------------------

/// Four points, in the order top-left, top-right, bottom-right, bottom-left of
/// the source rect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    /// Corner points.
    pub points: [Point; 4],
}

impl Quad {
    /// Quad for the corners of `r`.
    #[must_use]
    pub const fn from_rect(r: Rect) -> Self {
        Self {
            points: [
                Point::new(r.x0, r.y0),
                Point::new(r.x1, r.y0),
                Point::new(r.x1, r.y1),
                Point::new(r.x0, r.y1),
            ],
        }
    }

    /// Returns whether every edge is horizontal or vertical, i.e. the quad is
    /// an axis-aligned rectangle in some winding.
    #[must_use]
    pub fn is_rectilinear(&self) -> bool {
        let [a, b, c, d] = self.points;
        let near = |u: f64, v: f64| (u - v).abs() <= RECTILINEAR_EPSILON * (1.0 + u.abs().max(v.abs()));
        let horizontal_first = near(a.y, b.y) && near(b.x, c.x) && near(c.y, d.y) && near(d.x, a.x);
        let vertical_first = near(a.x, b.x) && near(b.y, c.y) && near(c.x, d.x) && near(d.y, a.y);
        horizontal_first || vertical_first
    }

    /// Bounds of the quad.
    #[must_use]
    pub fn bounding_box(&self) -> Rect {
        bounding_box(self.points)
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// A set of non-overlapping axis-aligned rects.
///
/// Used for occlusion: a point is covered if it lies inside any rect. Unions
/// split incoming rects against existing ones so the set stays disjoint and
/// [`area`](Self::area) stays exact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// Creates an empty region.
    #[must_use]
    pub const fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Creates a region covering `r`.
    #[must_use]
    pub fn from_rect(r: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(r);
        region
    }

    /// Returns whether the region covers nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rects making up the region.
    #[inline]
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Empties the region.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Bounds of all rects.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.rects.iter().fold(Rect::ZERO, |acc, r| union(acc, *r))
    }

    /// Total covered area.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Adds `r` to the region.
    pub fn union_rect(&mut self, r: Rect) {
        if is_empty(r) {
            return;
        }
        let mut pieces = Vec::from([r]);
        for existing in &self.rects {
            let mut next = Vec::with_capacity(pieces.len());
            for piece in pieces {
                push_difference(piece, *existing, &mut next);
            }
            pieces = next;
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    /// Adds every rect of `other`.
    pub fn union(&mut self, other: &Self) {
        for r in &other.rects {
            self.union_rect(*r);
        }
    }

    /// Removes `r` from the region.
    pub fn subtract_rect(&mut self, r: Rect) {
        if is_empty(r) || self.rects.is_empty() {
            return;
        }
        let mut out = Vec::with_capacity(self.rects.len());
        for existing in self.rects.drain(..) {
            push_difference(existing, r, &mut out);
        }
        self.rects = out;
    }

    /// Removes every rect of `other`.
    pub fn subtract(&mut self, other: &Self) {
        for r in &other.rects {
            self.subtract_rect(*r);
        }
    }

    /// Clips the region to `r`.
    pub fn intersect_rect(&mut self, r: Rect) {
        self.rects.retain_mut(|existing| {
            *existing = intersect(*existing, r);
            !is_empty(*existing)
        });
    }

    /// Returns whether `r` is entirely covered. Empty rects are always
    /// covered.
    #[must_use]
    pub fn contains_rect(&self, r: Rect) -> bool {
        if is_empty(r) {
            return true;
        }
        let mut remaining = Vec::from([r]);
        for existing in &self.rects {
            let mut next = Vec::with_capacity(remaining.len());
            for piece in remaining {
                push_difference(piece, *existing, &mut next);
            }
            remaining = next;
            if remaining.is_empty() {
                return true;
            }
        }
        false
    }

    /// Returns whether `r` overlaps any part of the region.
    #[must_use]
    pub fn intersects(&self, r: Rect) -> bool {
        self.rects.iter().any(|e| !is_empty(intersect(*e, r)))
    }
}

/// Pushes `a - b` as up to four disjoint rects.
fn push_difference(a: Rect, b: Rect, out: &mut Vec<Rect>) {
    let i = intersect(a, b);
    if is_empty(i) {
        out.push(a);
        return;
    }
    if a.y0 < i.y0 {
        out.push(Rect::new(a.x0, a.y0, a.x1, i.y0));
    }
    if i.y1 < a.y1 {
        out.push(Rect::new(a.x0, i.y1, a.x1, a.y1));
    }
    if a.x0 < i.x0 {
        out.push(Rect::new(a.x0, i.y0, i.x0, i.y1));
    }
    if i.x1 < a.x1 {
        out.push(Rect::new(i.x1, i.y0, a.x1, i.y1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_ignores_empty_rects() {
        let a = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(union(Rect::ZERO, a), a);
        assert_eq!(union(a, Rect::ZERO), a);
        assert!(is_empty(union(Rect::ZERO, Rect::ZERO)));
    }

    #[test]
    fn enclosed_and_enclosing_round_inward_and_outward() {
        let r = Rect::new(0.5, 0.5, 10.5, 10.5);
        assert_eq!(enclosing(r), Rect::new(0.0, 0.0, 11.0, 11.0));
        assert_eq!(enclosed(r), Rect::new(1.0, 1.0, 10.0, 10.0));
        assert!(is_empty(enclosed(Rect::new(0.2, 0.2, 0.8, 0.8))));
    }

    #[test]
    fn region_union_stays_disjoint() {
        let mut region = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.union_rect(Rect::new(5.0, 5.0, 15.0, 15.0));
        assert_eq!(region.area(), 175.0);
        for (i, a) in region.rects().iter().enumerate() {
            for b in &region.rects()[i + 1..] {
                assert!(is_empty(intersect(*a, *b)), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn region_contains_rect_spanning_pieces() {
        let mut region = Region::new();
        region.union_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.union_rect(Rect::new(10.0, 0.0, 20.0, 10.0));
        assert!(region.contains_rect(Rect::new(5.0, 2.0, 15.0, 8.0)));
        assert!(!region.contains_rect(Rect::new(5.0, 2.0, 25.0, 8.0)));
        assert!(region.contains_rect(Rect::ZERO));
    }

    #[test]
    fn region_subtract_and_intersect() {
        let mut region = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.subtract_rect(Rect::new(0.0, 0.0, 5.0, 10.0));
        assert_eq!(region.bounds(), Rect::new(5.0, 0.0, 10.0, 10.0));
        region.intersect_rect(Rect::new(0.0, 0.0, 7.0, 3.0));
        assert_eq!(region.bounds(), Rect::new(5.0, 0.0, 7.0, 3.0));
        region.intersect_rect(Rect::new(50.0, 50.0, 60.0, 60.0));
        assert!(region.is_empty());
    }

    #[test]
    fn rectilinear_quads() {
        assert!(Quad::from_rect(Rect::new(0.0, 0.0, 4.0, 2.0)).is_rectilinear());
        let diamond = Quad {
            points: [
                Point::new(1.0, 0.0),
                Point::new(2.0, 1.0),
                Point::new(1.0, 2.0),
                Point::new(0.0, 1.0),
            ],
        };
        assert!(!diamond.is_rectilinear());
        assert_eq!(diamond.bounding_box(), Rect::new(0.0, 0.0, 2.0, 2.0));
    }
}
