// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Client and compositor interleaved on the calling thread.

use log::info;
use strata_core::kurbo::{Rect, Vec2};
use strata_core::layer::LayerId;
use strata_core::trace::TraceSink;

use super::{ImplContext, Proxy, readback_with_retry, run_commit_cycle};
use crate::error::{Error, Result};
use crate::host::ClientState;
use crate::renderer::Renderer;
use crate::settings::Settings;

/// Runs the compositor inline. Frames are produced by `pump` and by the
/// blocking requests.
pub(crate) struct SingleThreadProxy {
    settings: Settings,
    /// Handed to the compositor at start.
    renderer: Option<Box<dyn Renderer>>,
    sink: Option<Box<dyn TraceSink + Send>>,
    context: Option<ImplContext>,
    stopped: bool,
}

impl core::fmt::Debug for SingleThreadProxy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SingleThreadProxy")
            .field("settings", &self.settings)
            .field("context", &self.context)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl SingleThreadProxy {
    pub(crate) fn new(settings: Settings, renderer: Box<dyn Renderer>) -> Self {
        Self {
            settings,
            renderer: Some(renderer),
            sink: None,
            context: None,
            stopped: false,
        }
    }

    fn context(&mut self) -> Result<&mut ImplContext> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        self.context.as_mut().ok_or(Error::NotStarted)
    }
}

/// Delivers queued compositor events, running a commit cycle for each
/// begin-frame, until none are left.
fn run(ctx: &mut ImplContext, state: &mut ClientState) -> Result<()> {
    loop {
        let events = ctx.take_events();
        if events.is_empty() {
            return Ok(());
        }
        for event in events {
            if let Some(args) = event.notify(state.client.as_mut()) {
                run_commit_cycle(state, &args, |sequence, pending| {
                    Ok(ctx.commit(sequence, pending))
                })?;
            }
        }
    }
}

impl Proxy for SingleThreadProxy {
    fn start(&mut self, _state: &mut ClientState) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        if self.context.is_some() {
            return Ok(());
        }
        let renderer = self.renderer.take().ok_or(Error::Stopped)?;
        let mut ctx = ImplContext::new(self.settings, renderer, self.sink.take());
        if let Err(e) = ctx.initialize() {
            self.stopped = true;
            return Err(e);
        }
        self.context = Some(ctx);
        info!("single-threaded compositor started");
        Ok(())
    }

    fn stop(&mut self, state: &mut ClientState) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.renderer = None;
        if let Some(mut ctx) = self.context.take() {
            ctx.teardown(&mut state.pending);
            info!("single-threaded compositor stopped");
        }
    }

    fn set_needs_commit(&mut self, _state: &mut ClientState) -> Result<()> {
        self.context()?.set_needs_commit();
        Ok(())
    }

    fn set_needs_redraw(&mut self, _state: &mut ClientState) -> Result<()> {
        self.context()?.set_needs_redraw();
        Ok(())
    }

    fn set_visible(&mut self, _state: &mut ClientState, visible: bool) -> Result<()> {
        self.context()?.set_visible(visible);
        Ok(())
    }

    fn scroll_by(&mut self, _state: &mut ClientState, layer: LayerId, delta: Vec2) -> Result<()> {
        self.context()?.scroll_by(layer, delta);
        Ok(())
    }

    fn pinch_zoom_by(&mut self, _state: &mut ClientState, magnify: f64) -> Result<()> {
        self.context()?.pinch_zoom_by(magnify);
        Ok(())
    }

    fn composite_and_readback(&mut self, state: &mut ClientState, rect: Rect) -> Result<Vec<u8>> {
        let ctx = self.context()?;
        let pixels = readback_with_retry(|| {
            let args = ctx.begin_forced_frame().ok_or(Error::ContextLost)?;
            run_commit_cycle(state, &args, |sequence, pending| {
                Ok(ctx.commit(sequence, pending))
            })?;
            ctx.readback(rect)
        });
        run(ctx, state)?;
        pixels
    }

    fn finish_all_rendering(&mut self, state: &mut ClientState) -> Result<()> {
        let ctx = self.context()?;
        run(ctx, state)?;
        ctx.finish()?;
        run(ctx, state)
    }

    fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        match self.context.as_mut() {
            Some(ctx) => ctx.set_trace_sink(sink),
            None => self.sink = sink,
        }
        Ok(())
    }

    fn pump(&mut self, state: &mut ClientState) -> Result<()> {
        let ctx = self.context()?;
        run(ctx, state)?;
        ctx.vsync_tick();
        run(ctx, state)
    }

    fn commit_requested(&self) -> bool {
        self.context.as_ref().is_some_and(ImplContext::commit_pending)
    }
}
