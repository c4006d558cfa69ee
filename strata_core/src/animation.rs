// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor-driven property animations.
//!
//! The client queues an [`Animation`] on a layer; the next commit hands it to
//! the compositor, where an [`AnimationController`] ticks it every frame
//! without client involvement. While an animation runs it owns its property:
//! commits do not overwrite the animated value, and a running transform
//! animation makes the layer's draw transform unknown to occlusion.

use alloc::vec::Vec;

use crate::time::{Duration, HostTime};
use crate::transform::Transform3d;

/// Identifies an animation within one layer's controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnimationId(pub u32);

/// The property an animation drives and its endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatedProperty {
    /// Linear opacity ramp.
    Opacity {
        /// Value at the start of each iteration.
        from: f32,
        /// Value at the end of each iteration.
        to: f32,
    },
    /// Component-wise transform interpolation.
    Transform {
        /// Value at the start of each iteration.
        from: Transform3d,
        /// Value at the end of each iteration.
        to: Transform3d,
    },
}

/// A value produced by sampling an animation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimatedValue {
    /// Sampled opacity.
    Opacity(f32),
    /// Sampled transform.
    Transform(Transform3d),
}

/// A single animation. Starts on its first tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Animation {
    /// Identifier, unique per layer.
    pub id: AnimationId,
    /// Driven property.
    pub property: AnimatedProperty,
    /// Length of one iteration.
    pub duration: Duration,
    /// Number of iterations, or `None` to repeat forever.
    pub iterations: Option<u32>,
    /// When the animation started, once it has.
    pub start_time: Option<HostTime>,
}

impl Animation {
    /// Creates a single-iteration animation that has not started yet.
    #[must_use]
    pub const fn new(id: AnimationId, property: AnimatedProperty, duration: Duration) -> Self {
        Self {
            id,
            property,
            duration,
            iterations: Some(1),
            start_time: None,
        }
    }

    /// Sets the iteration count (`None` repeats forever).
    #[must_use]
    pub const fn with_iterations(mut self, iterations: Option<u32>) -> Self {
        self.iterations = iterations;
        self
    }

    /// Starts the animation at `now` unless it already started.
    pub fn start(&mut self, now: HostTime) {
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
    }

    /// Returns whether the animation drives the transform.
    #[must_use]
    pub const fn is_transform(&self) -> bool {
        matches!(self.property, AnimatedProperty::Transform { .. })
    }

    /// Returns whether every iteration has completed by `now`.
    #[must_use]
    pub fn is_finished(&self, now: HostTime) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        match self.iterations {
            None => false,
            Some(n) => {
                let total = Duration(self.duration.nanos().saturating_mul(u64::from(n)));
                now.saturating_duration_since(start) >= total
            }
        }
    }

    /// Progress through the current iteration, in `[0, 1]`.
    fn progress(&self, now: HostTime) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        if self.duration.is_zero() || self.is_finished(now) {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(start).nanos();
        Duration(elapsed % self.duration.nanos()).fraction_of(self.duration)
    }

    /// Samples the animated value at `now`.
    #[must_use]
    pub fn sample(&self, now: HostTime) -> AnimatedValue {
        let t = self.progress(now);
        match self.property {
            AnimatedProperty::Opacity { from, to } => {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "progress is in [0, 1] and opacity is stored as f32"
                )]
                let t = t as f32;
                AnimatedValue::Opacity(from + (to - from) * t)
            }
            AnimatedProperty::Transform { from, to } => AnimatedValue::Transform(from.lerp(&to, t)),
        }
    }
}

/// Result of ticking an [`AnimationController`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationTick {
    /// New opacity, if an opacity animation ran.
    pub opacity: Option<f32>,
    /// New transform, if a transform animation ran.
    pub transform: Option<Transform3d>,
    /// Animations that finished on this tick (their final value is included
    /// above).
    pub finished: Vec<AnimationId>,
}

/// The running animations of one compositor-side layer.
#[derive(Clone, Debug, Default)]
pub struct AnimationController {
    animations: Vec<Animation>,
}

impl AnimationController {
    /// Creates an empty controller.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            animations: Vec::new(),
        }
    }

    /// Adds an animation, replacing one with the same id.
    pub fn add(&mut self, animation: Animation) {
        self.animations.retain(|a| a.id != animation.id);
        self.animations.push(animation);
    }

    /// Removes an animation by id.
    pub fn remove(&mut self, id: AnimationId) {
        self.animations.retain(|a| a.id != id);
    }

    /// Returns whether no animations are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    /// Returns whether a transform animation is running.
    #[must_use]
    pub fn has_running_transform(&self) -> bool {
        self.animations.iter().any(Animation::is_transform)
    }

    /// Returns whether an opacity animation is running.
    #[must_use]
    pub fn has_running_opacity(&self) -> bool {
        self.animations.iter().any(|a| !a.is_transform())
    }

    /// Starts pending animations, samples all of them at `now`, and drops
    /// those that finished. Later animations win when several drive the
    /// same property.
    pub fn tick(&mut self, now: HostTime) -> AnimationTick {
        let mut out = AnimationTick::default();
        for animation in &mut self.animations {
            animation.start(now);
            match animation.sample(now) {
                AnimatedValue::Opacity(v) => out.opacity = Some(v),
                AnimatedValue::Transform(t) => out.transform = Some(t),
            }
            if animation.is_finished(now) {
                out.finished.push(animation.id);
            }
        }
        self.animations.retain(|a| !out.finished.contains(&a.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fade(id: u32) -> Animation {
        Animation::new(
            AnimationId(id),
            AnimatedProperty::Opacity { from: 0.0, to: 1.0 },
            Duration::from_millis(100),
        )
    }

    #[test]
    fn opacity_ramps_linearly() {
        let mut controller = AnimationController::new();
        controller.add(fade(1));

        let first = controller.tick(HostTime(0));
        assert_eq!(first.opacity, Some(0.0));

        let mid = controller.tick(HostTime(50_000_000));
        assert_eq!(mid.opacity, Some(0.5));
        assert!(mid.finished.is_empty());
        assert!(controller.has_running_opacity());
        assert!(!controller.has_running_transform());
    }

    #[test]
    fn finished_animation_reports_final_value_and_is_removed() {
        let mut controller = AnimationController::new();
        controller.add(fade(1));
        let _ = controller.tick(HostTime(0));

        let end = controller.tick(HostTime(250_000_000));
        assert_eq!(end.opacity, Some(1.0));
        assert_eq!(end.finished, alloc::vec![AnimationId(1)]);
        assert!(controller.is_empty());
    }

    #[test]
    fn start_time_is_first_tick() {
        let mut controller = AnimationController::new();
        controller.add(fade(1));
        let _ = controller.tick(HostTime(1_000_000_000));
        let mid = controller.tick(HostTime(1_050_000_000));
        assert_eq!(mid.opacity, Some(0.5));
    }

    #[test]
    fn repeating_animation_wraps() {
        let mut anim = fade(1).with_iterations(None);
        anim.start(HostTime(0));
        assert!(!anim.is_finished(HostTime(u64::MAX)));
        assert_eq!(
            anim.sample(HostTime(125_000_000)),
            AnimatedValue::Opacity(0.25)
        );
    }

    #[test]
    fn transform_animation_interpolates() {
        let mut controller = AnimationController::new();
        controller.add(Animation::new(
            AnimationId(7),
            AnimatedProperty::Transform {
                from: Transform3d::IDENTITY,
                to: Transform3d::from_translation(100.0, 0.0, 0.0),
            },
            Duration::from_millis(10),
        ));
        assert!(controller.has_running_transform());

        let _ = controller.tick(HostTime(0));
        let mid = controller.tick(HostTime(5_000_000));
        assert_eq!(
            mid.transform,
            Some(Transform3d::from_translation(50.0, 0.0, 0.0))
        );
    }

    #[test]
    fn adding_same_id_replaces() {
        let mut controller = AnimationController::new();
        controller.add(fade(1));
        controller.add(fade(1));
        controller.remove(AnimationId(1));
        assert!(controller.is_empty());
    }
}
