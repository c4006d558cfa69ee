// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostic sinks for the strata commit/draw loop.
//!
//! - [`pretty`]: [`PrettyPrintSink`](pretty::PrettyPrintSink) writes one
//!   human-readable line per event.
//! - [`chrome`]: [`ChromeTraceSink`](chrome::ChromeTraceSink) collects events
//!   and writes them as Chrome Trace Event Format JSON, for loading into
//!   `chrome://tracing` or Perfetto.
//!
//! Both sinks are `Send`, so they can be installed on a threaded host with
//! `TreeHost::set_trace_sink`.

pub mod chrome;
pub mod pretty;

use strata_core::time::HostTime;

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

fn host_us(t: HostTime) -> f64 {
    nanos_to_us(t.nanos())
}
