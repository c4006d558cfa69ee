// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Column-major 4×4 transform with projection support.
//!
//! Layers live in nested coordinate spaces related by arbitrary 3-D
//! transforms, including perspective. Damage and occlusion need three things
//! from those transforms beyond composition:
//!
//! - mapping a 2-D rect forward into a target space and taking its bounds,
//!   *clipped* against the `w = 0` plane so that geometry behind the camera
//!   never produces inverted or unbounded output
//!   ([`map_clipped_rect`](Transform3d::map_clipped_rect));
//! - mapping a rect to a [`Quad`] while reporting whether any corner was
//!   clipped, so callers can refuse to derive occlusion from it
//!   ([`map_quad`](Transform3d::map_quad));
//! - projecting a target-space rect back onto a layer's `z = 0` plane
//!   through the inverse transform
//!   ([`project_clipped_rect`](Transform3d::project_clipped_rect)).

use core::ops::Mul;

use kurbo::{Point, Rect, Vec2};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::geometry::{self, Quad};

/// Homogeneous `w` below which a mapped point is treated as behind the
/// camera.
const W_CLIP: f64 = 1e-5;

/// Pivot magnitude below which a matrix is treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// A column-major 4×4 transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix, matching the memory layout
/// used by GPU APIs. Points are column vectors: `a * b` applies `b` first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from a column-major 2-D array.
    #[inline]
    #[must_use]
    pub const fn from_cols_array_2d(cols: [[f64; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a 2-D translation from a vector.
    #[inline]
    #[must_use]
    pub const fn from_offset(offset: Vec2) -> Self {
        Self::from_translation(offset.x, offset.y, 0.0)
    }

    /// Creates a non-uniform scale transform.
    #[inline]
    #[must_use]
    pub const fn from_scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            cols: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Z axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_z(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the X axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_x(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Y axis (radians).
    #[inline]
    #[must_use]
    pub fn from_rotation_y(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a perspective projection with the viewer at distance `depth`
    /// in front of the `z = 0` plane.
    ///
    /// A non-positive `depth` yields the identity.
    #[inline]
    #[must_use]
    pub const fn from_perspective(depth: f64) -> Self {
        let mut t = Self::IDENTITY;
        if depth > 0.0 {
            t.cols[2][3] = -1.0 / depth;
        }
        t
    }

    /// Is this transform [finite]?
    ///
    /// [finite]: f64::is_finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }

    /// Returns whether this is exactly the identity.
    #[inline]
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Returns whether the transform is a pure 2-D translation.
    #[must_use]
    pub fn is_translation_2d(&self) -> bool {
        let mut t = Self::IDENTITY;
        t.cols[3][0] = self.cols[3][0];
        t.cols[3][1] = self.cols[3][1];
        *self == t
    }

    /// Returns the 2-D translation component.
    #[inline]
    #[must_use]
    pub const fn translation_2d(&self) -> Vec2 {
        Vec2::new(self.cols[3][0], self.cols[3][1])
    }

    /// Returns whether the transform has a perspective component.
    #[inline]
    #[must_use]
    pub fn has_perspective(&self) -> bool {
        self.cols[0][3] != 0.0
            || self.cols[1][3] != 0.0
            || self.cols[2][3] != 0.0
            || self.cols[3][3] != 1.0
    }

    /// Returns the inverse transform, or `None` if the matrix is singular.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        // Gauss-Jordan with partial pivoting over rows (`a[r][c]`).
        let mut a = [[0.0_f64; 4]; 4];
        let mut inv = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        for (r, row) in a.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.cols[c][r];
            }
        }

        for col in 0..4 {
            let mut pivot = col;
            for r in (col + 1)..4 {
                if a[r][col].abs() > a[pivot][col].abs() {
                    pivot = r;
                }
            }
            let magnitude = a[pivot][col].abs();
            if magnitude.is_nan() || magnitude <= SINGULAR_EPSILON {
                return None;
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let p = a[col][col];
            for c in 0..4 {
                a[col][c] /= p;
                inv[col][c] /= p;
            }
            for r in 0..4 {
                if r == col {
                    continue;
                }
                let f = a[r][col];
                if f == 0.0 {
                    continue;
                }
                for c in 0..4 {
                    a[r][c] -= f * a[col][c];
                    inv[r][c] -= f * inv[col][c];
                }
            }
        }

        let mut cols = [[0.0_f64; 4]; 4];
        for (r, row) in inv.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                cols[c][r] = *v;
            }
        }
        let out = Self { cols };
        out.is_finite().then_some(out)
    }

    /// Returns whether the transform can be inverted.
    #[inline]
    #[must_use]
    pub fn is_invertible(&self) -> bool {
        self.inverse().is_some()
    }

    /// Maps `(x, y, 0, 1)` to homogeneous coordinates `[x, y, z, w]`.
    #[inline]
    #[must_use]
    pub fn map_homogeneous(&self, p: Point) -> [f64; 4] {
        self.map_homogeneous_3d(p.x, p.y, 0.0)
    }

    fn map_homogeneous_3d(&self, x: f64, y: f64, z: f64) -> [f64; 4] {
        let c = &self.cols;
        let mut out = [0.0; 4];
        for (i, v) in out.iter_mut().enumerate() {
            *v = c[0][i] * x + c[1][i] * y + c[2][i] * z + c[3][i];
        }
        out
    }

    /// Maps a point on the `z = 0` plane, returning `None` if it lands behind
    /// the camera.
    #[must_use]
    pub fn map_point(&self, p: Point) -> Option<Point> {
        let h = self.map_homogeneous(p);
        (h[3] > W_CLIP).then(|| Point::new(h[0] / h[3], h[1] / h[3]))
    }

    /// Maps the corners of `rect`, returning the resulting quad and whether
    /// any corner was clipped by the `w = 0` plane.
    ///
    /// When the flag is `true` the quad's clipped corners are meaningless and
    /// callers must not derive coverage from it.
    #[must_use]
    pub fn map_quad(&self, rect: Rect) -> (Quad, bool) {
        let corners = Quad::from_rect(rect).points;
        let mut clipped = false;
        let mut points = [Point::ZERO; 4];
        for (out, corner) in points.iter_mut().zip(corners) {
            match self.map_point(corner) {
                Some(p) => *out = p,
                None => clipped = true,
            }
        }
        (Quad { points }, clipped)
    }

    /// Maps `rect` and returns the bounds of the visible part of the result.
    ///
    /// The quad is clipped in homogeneous space against `w > 0` before the
    /// perspective divide. A rect entirely behind the camera maps to an empty
    /// rect.
    #[must_use]
    pub fn map_clipped_rect(&self, rect: Rect) -> Rect {
        if geometry::is_empty(rect) {
            return Rect::ZERO;
        }
        if self.is_translation_2d() {
            return rect + self.translation_2d();
        }

        let corners = Quad::from_rect(rect).points;
        let h = corners.map(|p| self.map_homogeneous(p));
        if h.iter().all(|v| v[3] > W_CLIP) {
            return geometry::bounding_box(
                h.iter().map(|v| Point::new(v[0] / v[3], v[1] / v[3])),
            );
        }

        // Sutherland-Hodgman against the single plane w = W_CLIP.
        let mut visible: [Point; 8] = [Point::ZERO; 8];
        let mut n = 0;
        for i in 0..4 {
            let a = h[i];
            let b = h[(i + 1) % 4];
            let a_in = a[3] > W_CLIP;
            let b_in = b[3] > W_CLIP;
            if a_in {
                visible[n] = Point::new(a[0] / a[3], a[1] / a[3]);
                n += 1;
            }
            if a_in != b_in {
                let t = (W_CLIP - a[3]) / (b[3] - a[3]);
                let x = a[0] + t * (b[0] - a[0]);
                let y = a[1] + t * (b[1] - a[1]);
                visible[n] = Point::new(x / W_CLIP, y / W_CLIP);
                n += 1;
            }
        }
        if n == 0 {
            return Rect::ZERO;
        }
        geometry::bounding_box(visible[..n].iter().copied())
    }

    /// Treats `self` as a target-to-layer transform and finds where the
    /// target-space point `p` lands on the layer's `z = 0` plane.
    ///
    /// Returns `None` when the ray is parallel to the plane or the
    /// intersection lies behind the camera.
    #[must_use]
    pub fn project_point(&self, p: Point) -> Option<Point> {
        let c = &self.cols;
        if c[2][2] == 0.0 {
            return None;
        }
        let z = -(c[0][2] * p.x + c[1][2] * p.y + c[3][2]) / c[2][2];
        let h = self.map_homogeneous_3d(p.x, p.y, z);
        (h[3] > W_CLIP).then(|| Point::new(h[0] / h[3], h[1] / h[3]))
    }

    /// Projects the corners of `rect` with [`project_point`](Self::project_point)
    /// and returns their bounds, or `None` if any corner fails to project.
    #[must_use]
    pub fn project_clipped_rect(&self, rect: Rect) -> Option<Rect> {
        if geometry::is_empty(rect) {
            return Some(Rect::ZERO);
        }
        if self.is_translation_2d() {
            return Some(rect + self.translation_2d());
        }
        let corners = Quad::from_rect(rect).points;
        let mut projected = [Point::ZERO; 4];
        for (out, corner) in projected.iter_mut().zip(corners) {
            *out = self.project_point(corner)?;
        }
        Some(geometry::bounding_box(projected))
    }

    /// Componentwise interpolation between two transforms.
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let mut cols = self.cols;
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, v) in col.iter_mut().enumerate() {
                *v += (other.cols[c][r] - *v) * t;
            }
        }
        Self { cols }
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        for (j, col) in out.iter_mut().enumerate() {
            for (i, v) in col.iter_mut().enumerate() {
                *v = a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
            }
        }
        Self { cols: out }
    }
}

#[inline]
fn sin_cos(radians: f64) -> (f64, f64) {
    #[cfg(feature = "std")]
    let sc = radians.sin_cos();
    #[cfg(not(feature = "std"))]
    let sc = (radians.sin(), radians.cos());
    sc
}

#[cfg(test)]
mod tests {
    use core::f64::consts::FRAC_PI_2;

    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn approx_rect(a: Rect, b: Rect) -> bool {
        approx(a.x0, b.x0) && approx(a.y0, b.y0) && approx(a.x1, b.x1) && approx(a.y1, b.y1)
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform3d::default(), Transform3d::IDENTITY);
        assert!(Transform3d::IDENTITY.is_translation_2d());
    }

    #[test]
    fn scale_then_translate() {
        let s = Transform3d::from_scale(2.0, 2.0, 2.0);
        let t = Transform3d::from_translation(3.0, 4.0, 0.0);
        let combined = t * s;
        assert_eq!(combined.col(0), [2.0, 0.0, 0.0, 0.0]);
        assert_eq!(combined.col(3), [3.0, 4.0, 0.0, 1.0]);
        assert_eq!(
            combined.map_point(Point::new(1.0, 1.0)),
            Some(Point::new(5.0, 6.0))
        );
    }

    #[test]
    fn inverse_round_trips() {
        let t = Transform3d::from_translation(10.0, -4.0, 0.0)
            * Transform3d::from_rotation_z(0.3)
            * Transform3d::from_scale(2.0, 0.5, 1.0);
        let inv = t.inverse().expect("invertible");
        let p = Point::new(7.0, 3.0);
        let back = inv
            .map_point(t.map_point(p).expect("in front"))
            .expect("in front");
        assert!(approx(back.x, p.x) && approx(back.y, p.y), "{back:?}");
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let flat = Transform3d::from_scale(1.0, 0.0, 1.0);
        assert!(flat.inverse().is_none());
        assert!(!flat.is_invertible());
    }

    #[test]
    fn rotation_ninety_maps_rect_to_rect() {
        let r = Transform3d::from_rotation_z(FRAC_PI_2);
        let mapped = r.map_clipped_rect(Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!(
            approx_rect(mapped, Rect::new(-20.0, 0.0, 0.0, 10.0)),
            "{mapped:?}"
        );
        let (quad, clipped) = r.map_quad(Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!(!clipped);
        assert!(quad.is_rectilinear(), "90 degree rotation stays rectilinear");
    }

    #[test]
    fn off_axis_rotation_is_not_rectilinear() {
        let r = Transform3d::from_rotation_z(0.25);
        let (quad, clipped) = r.map_quad(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!clipped);
        assert!(!quad.is_rectilinear());
    }

    #[test]
    fn rect_behind_camera_maps_to_empty() {
        // Push the whole plane behind the viewer.
        let t = Transform3d::from_perspective(100.0) * Transform3d::from_translation(0.0, 0.0, 200.0);
        let mapped = t.map_clipped_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(geometry::is_empty(mapped), "{mapped:?}");
        let (_, clipped) = t.map_quad(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(clipped);
    }

    #[test]
    fn partially_behind_camera_is_clipped_but_visible() {
        // Rotate around Y so the left half swings behind the viewer.
        let t = Transform3d::from_perspective(10.0) * Transform3d::from_rotation_y(1.2);
        let rect = Rect::new(-50.0, -5.0, 50.0, 5.0);
        let (_, clipped) = t.map_quad(rect);
        assert!(clipped, "part of the quad is behind the camera");
        let mapped = t.map_clipped_rect(rect);
        assert!(!geometry::is_empty(mapped));
    }

    #[test]
    fn project_inverts_map_for_flat_transforms() {
        let t = Transform3d::from_translation(5.0, 5.0, 0.0) * Transform3d::from_scale(2.0, 2.0, 1.0);
        let inv = t.inverse().expect("invertible");
        let target = t.map_clipped_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let back = inv.project_clipped_rect(target).expect("projects");
        assert!(approx_rect(back, Rect::new(0.0, 0.0, 10.0, 10.0)), "{back:?}");
    }

    #[test]
    fn lerp_midpoint_of_translations() {
        let a = Transform3d::from_translation(0.0, 0.0, 0.0);
        let b = Transform3d::from_translation(10.0, 20.0, 0.0);
        assert_eq!(a.lerp(&b, 0.5), Transform3d::from_translation(5.0, 10.0, 0.0));
    }

    #[test]
    fn nan_detected() {
        let mut t = Transform3d::IDENTITY;
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite());
    }
}
