// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock reads.

use std::sync::OnceLock;
use std::time::Instant;

use strata_core::time::HostTime;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the current monotonic host time in nanoseconds since the first
/// call in this process.
#[must_use]
pub fn now() -> HostTime {
    let epoch = *EPOCH.get_or_init(Instant::now);
    instant_to_host_time(epoch, Instant::now())
}

fn instant_to_host_time(epoch: Instant, instant: Instant) -> HostTime {
    let nanos = instant.saturating_duration_since(epoch).as_nanos();
    HostTime(u64::try_from(nanos).unwrap_or(u64::MAX))
}
