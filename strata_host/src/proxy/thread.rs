// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor on a dedicated thread.
//!
//! Requests that only set flags are posted; everything that touches the
//! client's tree (commit, teardown) or returns a value (initialization,
//! readback, finish) blocks on a [`Completion`]. The pending tree is moved
//! into the request and comes back through the completion.

use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, SendError, Sender, bounded, never, select, tick, unbounded};
use log::{debug, info, warn};
use strata_core::kurbo::{Rect, Vec2};
use strata_core::layer::LayerId;
use strata_core::trace::TraceSink;

use super::{
    BeginFrameArgs, CommitResult, Completion, ImplContext, ImplEvent, Proxy, completion,
    readback_with_retry, run_commit_cycle,
};
use crate::error::{Error, Result};
use crate::host::{ClientState, PendingTree};
use crate::renderer::Renderer;
use crate::settings::Settings;

const THREAD_NAME: &str = "strata-compositor";

/// Client-to-compositor message.
enum ImplMessage {
    SetNeedsCommit,
    SetNeedsRedraw,
    SetVisible(bool),
    ScrollBy(LayerId, Vec2),
    PinchZoomBy(f64),
    SetTraceSink(Option<Box<dyn TraceSink + Send>>),
    Commit {
        sequence: u64,
        pending: Box<PendingTree>,
        done: Completion<CommitResult>,
    },
    BeginForcedFrame(Completion<Option<BeginFrameArgs>>),
    Readback {
        rect: Rect,
        done: Completion<Result<Vec<u8>>>,
    },
    Finish(Completion<Result<()>>),
    Stop {
        pending: Box<PendingTree>,
        done: Completion<Box<PendingTree>>,
    },
}

// ---------------------------------------------------------------------------
// Compositor side
// ---------------------------------------------------------------------------

fn run_compositor(
    mut ctx: ImplContext,
    frame_interval: core::time::Duration,
    inbox: Receiver<ImplMessage>,
    outbox: Sender<ImplEvent>,
    init: Completion<Result<()>>,
) {
    let initialized = ctx.initialize();
    let failed = initialized.is_err();
    init.complete(initialized);
    if failed {
        return;
    }

    let ticker = tick(frame_interval);
    let idle: Receiver<Instant> = never();
    loop {
        let vsync = if ctx.vsync_needed() { &ticker } else { &idle };
        select! {
            recv(inbox) -> message => match message {
                Ok(ImplMessage::Stop { mut pending, done }) => {
                    ctx.teardown(&mut pending);
                    done.complete(pending);
                    return;
                }
                Ok(message) => handle(&mut ctx, message, &outbox),
                Err(_) => {
                    debug!("client went away without stopping the compositor");
                    return;
                }
            },
            recv(vsync) -> _ => ctx.vsync_tick(),
        }
        if !flush(&mut ctx, &outbox) {
            return;
        }
    }
}

/// Sends queued events to the client. Returns `false` if it went away.
fn flush(ctx: &mut ImplContext, outbox: &Sender<ImplEvent>) -> bool {
    ctx.take_events()
        .into_iter()
        .all(|event| outbox.send(event).is_ok())
}

/// Handles one message. Replies are sent after the events they caused, so a
/// client that pumps after a blocking request sees them.
fn handle(ctx: &mut ImplContext, message: ImplMessage, outbox: &Sender<ImplEvent>) {
    fn reply<T>(ctx: &mut ImplContext, outbox: &Sender<ImplEvent>, done: Completion<T>, value: T) {
        flush(ctx, outbox);
        done.complete(value);
    }

    match message {
        ImplMessage::SetNeedsCommit => ctx.set_needs_commit(),
        ImplMessage::SetNeedsRedraw => ctx.set_needs_redraw(),
        ImplMessage::SetVisible(visible) => ctx.set_visible(visible),
        ImplMessage::ScrollBy(layer, delta) => ctx.scroll_by(layer, delta),
        ImplMessage::PinchZoomBy(magnify) => ctx.pinch_zoom_by(magnify),
        ImplMessage::SetTraceSink(sink) => ctx.set_trace_sink(sink),
        ImplMessage::Commit {
            sequence,
            pending,
            done,
        } => {
            let result = ctx.commit(sequence, pending);
            reply(ctx, outbox, done, result);
        }
        ImplMessage::BeginForcedFrame(done) => {
            let args = ctx.begin_forced_frame();
            reply(ctx, outbox, done, args);
        }
        ImplMessage::Readback { rect, done } => {
            let pixels = ctx.readback(rect);
            reply(ctx, outbox, done, pixels);
        }
        ImplMessage::Finish(done) => {
            let result = ctx.finish();
            reply(ctx, outbox, done, result);
        }
        ImplMessage::Stop { .. } => unreachable!("stop is handled by the compositor loop"),
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Channels to a running compositor thread.
struct Connection {
    tx: Sender<ImplMessage>,
    events: Receiver<ImplEvent>,
    thread: JoinHandle<()>,
}

impl Connection {
    fn send(&self, message: ImplMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::Disconnected)
    }

    fn request<T>(&self, message: impl FnOnce(Completion<T>) -> ImplMessage) -> Result<T> {
        let (done, waiter) = completion();
        self.send(message(done))?;
        waiter.wait()
    }

    fn commit(&self, sequence: u64, pending: Box<PendingTree>) -> Result<CommitResult> {
        self.request(|done| ImplMessage::Commit {
            sequence,
            pending,
            done,
        })
    }

    /// Runs a commit cycle for every begin-frame the compositor sent.
    /// Returns whether any of them committed.
    fn pump(&self, state: &mut ClientState) -> Result<bool> {
        let events: Vec<ImplEvent> = self.events.try_iter().collect();
        let mut committed = false;
        for event in events {
            if let Some(args) = event.notify(state.client.as_mut()) {
                committed |= run_commit_cycle(state, &args, |sequence, pending| {
                    self.commit(sequence, pending)
                })?;
            }
        }
        Ok(committed)
    }
}

/// Runs the compositor on its own thread at [`Settings::frame_interval`].
pub(crate) struct ThreadProxy {
    settings: Settings,
    /// Moved to the compositor thread at start.
    renderer: Option<Box<dyn Renderer>>,
    sink: Option<Box<dyn TraceSink + Send>>,
    connection: Option<Connection>,
    commit_requested: bool,
    stopped: bool,
}

impl core::fmt::Debug for ThreadProxy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadProxy")
            .field("settings", &self.settings)
            .field("running", &self.connection.is_some())
            .field("commit_requested", &self.commit_requested)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl ThreadProxy {
    pub(crate) fn new(settings: Settings, renderer: Box<dyn Renderer>) -> Self {
        Self {
            settings,
            renderer: Some(renderer),
            sink: None,
            connection: None,
            commit_requested: false,
            stopped: false,
        }
    }

    fn connection(&self) -> Result<&Connection> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        self.connection.as_ref().ok_or(Error::NotStarted)
    }

    fn pump_events(&mut self, state: &mut ClientState) -> Result<()> {
        if self.connection()?.pump(state)? {
            self.commit_requested = false;
        }
        Ok(())
    }
}

impl Proxy for ThreadProxy {
    fn start(&mut self, _state: &mut ClientState) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        if self.connection.is_some() {
            return Ok(());
        }
        let renderer = self.renderer.take().ok_or(Error::Stopped)?;
        let ctx = ImplContext::new(self.settings, renderer, self.sink.take());
        let (tx, inbox) = bounded(self.settings.max_pending_messages.max(1));
        let (outbox, events) = unbounded();
        let (init, initialized) = completion();
        let frame_interval = self.settings.frame_interval;

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run_compositor(ctx, frame_interval, inbox, outbox, init))
            .map_err(|e| {
                warn!("failed to spawn the compositor thread: {e}");
                self.stopped = true;
                Error::InitializationFailed
            })?;

        if let Err(e) = initialized.wait().and_then(|result| result) {
            self.stopped = true;
            if thread.join().is_err() {
                warn!("compositor thread panicked during initialization");
            }
            return Err(e);
        }
        self.connection = Some(Connection { tx, events, thread });
        info!("compositor thread started");
        Ok(())
    }

    fn stop(&mut self, state: &mut ClientState) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.renderer = None;
        let Some(Connection { tx, events, thread }) = self.connection.take() else {
            return;
        };

        // Queued requests run first; begin-frames still waiting in `events`
        // are discarded.
        let pending = core::mem::take(&mut state.pending);
        let (done, waiter) = completion();
        match tx.send(ImplMessage::Stop { pending, done }) {
            Ok(()) => match waiter.wait() {
                Ok(pending) => state.pending = pending,
                Err(_) => warn!("compositor thread exited before teardown"),
            },
            Err(SendError(message)) => {
                if let ImplMessage::Stop { pending, .. } = message {
                    state.pending = pending;
                }
                warn!("compositor thread exited before stop");
            }
        }
        drop(tx);
        drop(events);
        if thread.join().is_err() {
            warn!("compositor thread panicked");
        }
        info!("compositor thread stopped");
    }

    fn set_needs_commit(&mut self, _state: &mut ClientState) -> Result<()> {
        self.connection()?.send(ImplMessage::SetNeedsCommit)?;
        self.commit_requested = true;
        Ok(())
    }

    fn set_needs_redraw(&mut self, _state: &mut ClientState) -> Result<()> {
        self.connection()?.send(ImplMessage::SetNeedsRedraw)
    }

    fn set_visible(&mut self, _state: &mut ClientState, visible: bool) -> Result<()> {
        self.connection()?.send(ImplMessage::SetVisible(visible))
    }

    fn scroll_by(&mut self, _state: &mut ClientState, layer: LayerId, delta: Vec2) -> Result<()> {
        self.connection()?.send(ImplMessage::ScrollBy(layer, delta))
    }

    fn pinch_zoom_by(&mut self, _state: &mut ClientState, magnify: f64) -> Result<()> {
        self.connection()?.send(ImplMessage::PinchZoomBy(magnify))
    }

    fn composite_and_readback(&mut self, state: &mut ClientState, rect: Rect) -> Result<Vec<u8>> {
        let connection = self.connection()?;
        let pixels = readback_with_retry(|| {
            let args = connection
                .request(ImplMessage::BeginForcedFrame)?
                .ok_or(Error::ContextLost)?;
            run_commit_cycle(state, &args, |sequence, pending| {
                connection.commit(sequence, pending)
            })?;
            connection.request(|done| ImplMessage::Readback { rect, done })?
        });
        self.pump_events(state)?;
        pixels
    }

    fn finish_all_rendering(&mut self, state: &mut ClientState) -> Result<()> {
        // The first round trip flushes begin-frames for every request posted
        // so far; the second draws what their commits produced.
        self.connection()?.request(ImplMessage::Finish)??;
        self.pump_events(state)?;
        self.connection()?.request(ImplMessage::Finish)??;
        self.pump_events(state)
    }

    fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) -> Result<()> {
        if self.stopped {
            return Err(Error::Stopped);
        }
        match self.connection.as_ref() {
            Some(connection) => connection.send(ImplMessage::SetTraceSink(sink)),
            None => {
                self.sink = sink;
                Ok(())
            }
        }
    }

    fn pump(&mut self, state: &mut ClientState) -> Result<()> {
        self.pump_events(state)
    }

    fn commit_requested(&self) -> bool {
        self.commit_requested
    }
}

impl Drop for ThreadProxy {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            drop(connection.tx);
            if connection.thread.join().is_err() {
                warn!("compositor thread panicked");
            }
        }
    }
}
