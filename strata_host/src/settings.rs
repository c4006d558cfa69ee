// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host configuration.

use std::time::Duration;

use strata_core::kurbo::Size;
use strata_core::scheduler::SchedulerSettings;

/// Configuration shared by the tree host, the compositor host, and the
/// proxies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    /// Texture budget in bytes.
    pub max_texture_memory_bytes: u64,
    /// Upper bound on the bytes reserved for render surface intermediates.
    pub surface_priority_budget: u64,
    /// Vsync period driving the threaded proxy's scheduler.
    pub frame_interval: Duration,
    /// Whether the root pass is scissored to its damage.
    pub partial_swap_enabled: bool,
    /// Opaque rects smaller than this in both dimensions are not tracked
    /// for occlusion.
    pub minimum_occlusion_tracking_size: Size,
    /// Capacity of the client-to-compositor message queue.
    pub max_pending_messages: usize,
    /// Scheduler state machine settings.
    pub scheduler: SchedulerSettings,
}

impl Settings {
    /// Default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_texture_memory_bytes: 64 * 1024 * 1024,
            surface_priority_budget: 16 * 1024 * 1024,
            frame_interval: Duration::from_nanos(16_666_667),
            partial_swap_enabled: true,
            minimum_occlusion_tracking_size: Size::new(160.0, 160.0),
            max_pending_messages: 64,
            scheduler: SchedulerSettings::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
