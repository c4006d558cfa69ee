// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The boundary between the client and compositor contexts.
//!
//! A [`Proxy`] carries client requests to the compositor and compositor
//! events back. Both proxies drive the same [`ImplContext`]: the scheduler,
//! the [`CompositorHost`], and the renderer. [`SingleThreadProxy`] calls it
//! directly; [`ThreadProxy`] owns it on a dedicated thread and talks to it
//! over channels, blocking on a [`Completion`] whenever the compositor needs
//! the client's tree.
//!
//! Every begin-frame carries a sequence number. A commit for a cycle that
//! was superseded (for example by a forced cycle for a readback) is dropped
//! by the [`SequenceGate`] without side effects.

mod single_thread;
mod thread;

pub(crate) use single_thread::SingleThreadProxy;
pub(crate) use thread::ThreadProxy;

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use strata_core::kurbo::{Rect, Vec2};
use strata_core::layer::LayerId;
use strata_core::scheduler::{CommitState, Scheduler, SchedulerClient};
use strata_core::time::HostTime;
use strata_core::trace::TraceSink;

use crate::compositor::{CompositorHost, DrawOutcome, ScrollAndScaleSet};
use crate::error::{Error, Result};
use crate::host::{ClientState, PendingTree, TreeHostClient};
use crate::renderer::Renderer;
use crate::settings::Settings;
use crate::time;

// ---------------------------------------------------------------------------
// Proxy contract
// ---------------------------------------------------------------------------

/// Client-side half of a compositor, single- or multi-threaded.
///
/// Every method runs on the client context and takes the client state
/// explicitly.
pub(crate) trait Proxy: core::fmt::Debug {
    /// Initializes the renderer and starts compositing.
    fn start(&mut self, state: &mut ClientState) -> Result<()>;

    /// Drains in-flight work and releases every compositor resource.
    fn stop(&mut self, state: &mut ClientState);

    fn set_needs_commit(&mut self, state: &mut ClientState) -> Result<()>;

    fn set_needs_redraw(&mut self, state: &mut ClientState) -> Result<()>;

    fn set_visible(&mut self, state: &mut ClientState, visible: bool) -> Result<()>;

    fn scroll_by(&mut self, state: &mut ClientState, layer: LayerId, delta: Vec2) -> Result<()>;

    fn pinch_zoom_by(&mut self, state: &mut ClientState, magnify: f64) -> Result<()>;

    /// Runs a forced commit and draw, then reads back `rect`.
    fn composite_and_readback(&mut self, state: &mut ClientState, rect: Rect) -> Result<Vec<u8>>;

    fn finish_all_rendering(&mut self, state: &mut ClientState) -> Result<()>;

    fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) -> Result<()>;

    /// Handles compositor events waiting for the client.
    fn pump(&mut self, state: &mut ClientState) -> Result<()>;

    fn commit_requested(&self) -> bool;
}

/// Runs the client half of a commit cycle around `commit`, which hands the
/// pending tree to the compositor and returns it.
fn run_commit_cycle(
    state: &mut ClientState,
    args: &BeginFrameArgs,
    commit: impl FnOnce(u64, Box<PendingTree>) -> Result<CommitResult>,
) -> Result<bool> {
    if state.last_begin_frame.is_some_and(|last| args.sequence <= last) {
        debug!("ignoring superseded begin-frame {}", args.sequence);
        return Ok(false);
    }
    state.last_begin_frame = Some(args.sequence);
    state.begin_frame(args);
    let pending = core::mem::take(&mut state.pending);
    let result = commit(args.sequence, pending)?;
    state.pending = result.pending;
    if let Some(frame) = result.committed {
        state.client.did_commit(frame);
    }
    Ok(result.committed.is_some())
}

/// Runs a readback, retrying once if the context was lost (and recreated)
/// while drawing it.
fn readback_with_retry(mut attempt: impl FnMut() -> Result<Vec<u8>>) -> Result<Vec<u8>> {
    match attempt() {
        Err(Error::ContextLost) => {
            debug!("context lost during readback, retrying");
            attempt()
        }
        result => result,
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Sent to the client when the compositor begins a frame.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BeginFrameArgs {
    pub(crate) sequence: u64,
    pub(crate) now: HostTime,
    /// Readback or finish cycles are forced.
    pub(crate) forced: bool,
    pub(crate) scroll_and_scale: ScrollAndScaleSet,
}

/// Compositor-to-client notification.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ImplEvent {
    BeginFrame(BeginFrameArgs),
    DidDraw,
    ContextLost,
    ContextRecreated(bool),
}

impl ImplEvent {
    /// Delivers a notification to `client`. Begin-frames are returned for
    /// the proxy to run.
    fn notify(self, client: &mut dyn TreeHostClient) -> Option<BeginFrameArgs> {
        match self {
            Self::BeginFrame(args) => return Some(args),
            Self::DidDraw => client.did_commit_and_draw_frame(),
            Self::ContextLost => client.did_lose_context(),
            Self::ContextRecreated(success) => client.did_recreate_context(success),
        }
        None
    }
}

/// The pending tree handed back from a commit, and the committed source
/// frame number unless the cycle was stale.
#[derive(Debug)]
pub(crate) struct CommitResult {
    pub(crate) pending: Box<PendingTree>,
    pub(crate) committed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Single-use reply slot for a blocking request.
pub(crate) struct Completion<T> {
    tx: Sender<T>,
}

/// Waits for the reply to a [`Completion`].
pub(crate) struct CompletionWaiter<T> {
    rx: Receiver<T>,
}

impl<T> core::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

impl<T> core::fmt::Debug for CompletionWaiter<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompletionWaiter").finish_non_exhaustive()
    }
}

/// Creates a linked completion and waiter.
pub(crate) fn completion<T>() -> (Completion<T>, CompletionWaiter<T>) {
    let (tx, rx) = bounded(1);
    (Completion { tx }, CompletionWaiter { rx })
}

impl<T> Completion<T> {
    /// Delivers the reply. A waiter that went away is ignored.
    pub(crate) fn complete(self, value: T) {
        if self.tx.send(value).is_err() {
            debug!("completion dropped by its waiter");
        }
    }
}

impl<T> CompletionWaiter<T> {
    /// Blocks until the reply arrives.
    pub(crate) fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// Sequence gate
// ---------------------------------------------------------------------------

/// Rejects cycles at or below the last executed sequence number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SequenceGate {
    last_executed: Option<u64>,
}

impl SequenceGate {
    pub(crate) fn is_stale(&self, sequence: u64) -> bool {
        self.last_executed.is_some_and(|last| sequence <= last)
    }

    /// Records `sequence` as executed. Returns `false` (and records nothing)
    /// if it is stale.
    pub(crate) fn execute(&mut self, sequence: u64) -> bool {
        if self.is_stale(sequence) {
            return false;
        }
        self.last_executed = Some(sequence);
        true
    }

    pub(crate) fn last_executed(&self) -> Option<u64> {
        self.last_executed
    }
}

// ---------------------------------------------------------------------------
// Impl context
// ---------------------------------------------------------------------------

/// Everything that lives on the compositor context.
#[derive(Debug)]
pub(crate) struct ImplContext {
    scheduler: Scheduler,
    state: ImplState,
}

/// The scheduler's client. Kept apart from the scheduler so both can be
/// borrowed at once.
struct ImplState {
    compositor: CompositorHost,
    renderer: Box<dyn Renderer>,
    gate: SequenceGate,
    last_sequence: u64,
    /// Sequence of the begin-frame the scheduler is waiting on.
    outstanding: Option<u64>,
    /// The next begin-frame is forced.
    forcing: bool,
    in_flight: Option<(u64, Box<PendingTree>)>,
    committed: bool,
    events: Vec<ImplEvent>,

    // -- Reported to the scheduler after its current action --
    lost: bool,
    recreated: Option<bool>,
    wants_redraw: bool,
    can_draw: bool,

    context_failed: bool,
}

impl core::fmt::Debug for ImplState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImplState")
            .field("compositor", &self.compositor)
            .field("gate", &self.gate)
            .field("last_sequence", &self.last_sequence)
            .field("outstanding", &self.outstanding)
            .field("forcing", &self.forcing)
            .field("committed", &self.committed)
            .field("events", &self.events)
            .field("context_failed", &self.context_failed)
            .finish_non_exhaustive()
    }
}

impl ImplContext {
    pub(crate) fn new(
        settings: Settings,
        renderer: Box<dyn Renderer>,
        sink: Option<Box<dyn TraceSink + Send>>,
    ) -> Self {
        let mut compositor = CompositorHost::new(settings);
        compositor.set_trace_sink(sink);
        Self {
            scheduler: Scheduler::new(settings.scheduler),
            state: ImplState {
                compositor,
                renderer,
                gate: SequenceGate::default(),
                last_sequence: 0,
                outstanding: None,
                forcing: false,
                in_flight: None,
                committed: false,
                events: Vec::new(),
                lost: false,
                recreated: None,
                wants_redraw: false,
                can_draw: false,
                context_failed: false,
            },
        }
    }

    /// Initializes the renderer and makes the output visible.
    pub(crate) fn initialize(&mut self) -> Result<()> {
        if !self.state.renderer.initialize() {
            warn!("renderer failed to initialize");
            return Err(Error::InitializationFailed);
        }
        self.scheduler.set_visible(true, &mut self.state);
        self.settle();
        Ok(())
    }

    // -- Accessors --

    #[cfg(test)]
    pub(crate) fn compositor(&self) -> &CompositorHost {
        &self.state.compositor
    }

    pub(crate) fn vsync_needed(&self) -> bool {
        self.scheduler.state().vsync_callback_needed()
    }

    pub(crate) fn commit_pending(&self) -> bool {
        self.scheduler.state().commit_pending()
    }

    pub(crate) fn take_events(&mut self) -> Vec<ImplEvent> {
        core::mem::take(&mut self.state.events)
    }

    // -- Requests --

    pub(crate) fn set_needs_commit(&mut self) {
        self.scheduler.set_needs_commit(&mut self.state);
        self.settle();
    }

    pub(crate) fn set_needs_redraw(&mut self) {
        self.state.compositor.set_full_root_damage();
        self.scheduler.set_needs_redraw(&mut self.state);
        self.settle();
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.scheduler.set_visible(visible, &mut self.state);
        self.settle();
    }

    pub(crate) fn set_trace_sink(&mut self, sink: Option<Box<dyn TraceSink + Send>>) {
        self.state.compositor.set_trace_sink(sink);
    }

    pub(crate) fn scroll_by(&mut self, layer: LayerId, delta: Vec2) {
        if self.state.compositor.scroll_by(layer, delta) {
            self.request_input_frame();
        }
    }

    pub(crate) fn pinch_zoom_by(&mut self, magnify: f64) {
        if self.state.compositor.pinch_zoom_by(magnify) {
            self.request_input_frame();
        }
    }

    /// Compositor-side input is drawn right away and reported to the client
    /// at the next begin-frame.
    fn request_input_frame(&mut self) {
        self.scheduler.set_needs_redraw(&mut self.state);
        self.scheduler.set_needs_commit(&mut self.state);
        self.settle();
    }

    /// Runs one vsync window.
    pub(crate) fn vsync_tick(&mut self) {
        self.scheduler.vsync_tick(&mut self.state);
        self.settle();
    }

    /// Begins a forced cycle right away, superseding an outstanding one.
    /// The begin-frame is returned instead of being queued as an event.
    pub(crate) fn begin_forced_frame(&mut self) -> Option<BeginFrameArgs> {
        self.state.forcing = true;
        match self.scheduler.state().commit_state() {
            CommitState::FrameInProgress => {
                debug!(
                    "begin-frame {:?} superseded by a forced one",
                    self.state.outstanding
                );
                self.state.outstanding = None;
                self.scheduler.begin_frame_aborted(&mut self.state);
            }
            CommitState::WaitingForFirstDraw => {
                self.scheduler.set_needs_forced_redraw(&mut self.state);
            }
            CommitState::Idle | CommitState::ReadyToCommit => {}
        }
        if self.scheduler.state().commit_state() == CommitState::Idle {
            self.scheduler.set_needs_forced_commit(&mut self.state);
        }
        self.settle();
        self.state.forcing = false;

        let events = &mut self.state.events;
        let index = events
            .iter()
            .rposition(|e| matches!(e, ImplEvent::BeginFrame(args) if args.forced))?;
        match events.remove(index) {
            ImplEvent::BeginFrame(args) => Some(args),
            _ => None,
        }
    }

    /// Commits `pending` for the cycle `sequence` and hands it back.
    pub(crate) fn commit(&mut self, sequence: u64, pending: Box<PendingTree>) -> CommitResult {
        let current = self.state.outstanding == Some(sequence)
            && self.scheduler.state().commit_state() == CommitState::FrameInProgress;
        if !current || !self.state.gate.execute(sequence) {
            let last_executed = self.state.gate.last_executed().unwrap_or(0);
            debug!("dropping stale commit {sequence} (last executed {last_executed})");
            self.state
                .compositor
                .trace_stale_frame(sequence, last_executed);
            return CommitResult {
                pending,
                committed: None,
            };
        }

        let source_frame_number = pending.source_frame_number;
        self.state.outstanding = None;
        self.state.committed = false;
        self.state.in_flight = Some((sequence, pending));
        self.scheduler.begin_frame_complete(&mut self.state);
        self.settle();

        let committed = core::mem::take(&mut self.state.committed);
        match self.state.in_flight.take() {
            Some((_, pending)) => CommitResult {
                pending,
                committed: committed.then_some(source_frame_number),
            },
            None => unreachable!("the in-flight tree is only taken here"),
        }
    }

    fn check_drawable(&self) -> Result<()> {
        let compositor = &self.state.compositor;
        if self.state.context_failed {
            Err(Error::ContextLost)
        } else if compositor.tree().root().is_none() {
            Err(Error::NoRootLayer)
        } else if !compositor.can_draw() {
            Err(Error::EmptyViewport)
        } else {
            Ok(())
        }
    }

    /// Draws the committed tree with a forced draw and reads back `rect`.
    pub(crate) fn readback(&mut self, rect: Rect) -> Result<Vec<u8>> {
        self.check_drawable()?;
        self.scheduler.set_needs_forced_redraw(&mut self.state);
        self.settle();
        if self.state.context_failed || self.state.renderer.is_context_lost() {
            return Err(Error::ContextLost);
        }
        if self.state.compositor.needs_backing_reset() {
            // Lost during the draw and already recreated; the frame is gone.
            return Err(Error::ContextLost);
        }
        Ok(self.state.renderer.read_pixels(rect))
    }

    /// Draws anything still waiting and blocks on the renderer.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.state.context_failed {
            return Err(Error::ContextLost);
        }
        let waiting = self.scheduler.state().redraw_pending()
            || self.scheduler.state().commit_state() == CommitState::WaitingForFirstDraw;
        if waiting {
            self.scheduler.set_needs_forced_redraw(&mut self.state);
            self.settle();
        }
        self.state.renderer.finish();
        Ok(())
    }

    /// Deletes every backing and drops the active tree.
    pub(crate) fn teardown(&mut self, pending: &mut PendingTree) {
        let state = &mut self.state;
        state
            .compositor
            .release_resources(pending, state.renderer.allocator());
        state.renderer.finish();
        state.events.clear();
        info!("compositor torn down");
    }

    /// Reports what the last scheduler action left behind until the
    /// scheduler has nothing more to do.
    fn settle(&mut self) {
        loop {
            let state = &mut self.state;
            if core::mem::take(&mut state.lost) {
                self.scheduler.did_lose_context(state);
            } else if let Some(success) = state.recreated.take() {
                if success {
                    self.scheduler.did_recreate_context(state);
                }
            } else if state.can_draw != state.compositor.can_draw() {
                state.can_draw = !state.can_draw;
                let can_draw = state.can_draw;
                self.scheduler.set_can_draw(can_draw, state);
            } else if core::mem::take(&mut state.wants_redraw) {
                self.scheduler.set_needs_redraw(state);
                // A redraw request only acts inside the next vsync window.
                break;
            } else {
                break;
            }
        }
    }
}

impl ImplState {
    fn draw(&mut self, forced: bool) -> bool {
        let outcome = self
            .compositor
            .draw_frame(self.renderer.as_mut(), forced);
        if self.compositor.has_active_animations() {
            self.wants_redraw = true;
        }
        match outcome {
            DrawOutcome::Drawn => {
                self.events.push(ImplEvent::DidDraw);
                true
            }
            DrawOutcome::Skipped => true,
            DrawOutcome::Dropped => false,
            DrawOutcome::ContextLost => {
                self.lost = true;
                true
            }
        }
    }
}

impl SchedulerClient for ImplState {
    fn scheduled_action_begin_frame(&mut self) {
        self.last_sequence += 1;
        let sequence = self.last_sequence;
        self.outstanding = Some(sequence);
        let forced = core::mem::take(&mut self.forcing);
        let now = time::now();
        self.compositor.trace_begin_frame(sequence, now, forced);
        let scroll_and_scale = self.compositor.process_scroll_deltas();
        self.events.push(ImplEvent::BeginFrame(BeginFrameArgs {
            sequence,
            now,
            forced,
            scroll_and_scale,
        }));
    }

    fn scheduled_action_commit(&mut self) {
        if let Some((sequence, pending)) = self.in_flight.as_mut() {
            let stats = self
                .compositor
                .commit(pending, self.renderer.allocator(), *sequence);
            debug!(
                "commit {sequence}: {} created, {} destroyed, {} animations",
                stats.created, stats.destroyed, stats.animations
            );
            self.committed = true;
        }
    }

    fn scheduled_action_draw_and_swap_if_possible(&mut self) -> bool {
        self.draw(false)
    }

    fn scheduled_action_draw_and_swap_forced(&mut self) {
        self.draw(true);
    }

    fn scheduled_action_begin_context_recreation(&mut self) {
        self.events.push(ImplEvent::ContextLost);
        let success = self.renderer.reinitialize();
        if success {
            info!("graphics context recreated");
        } else {
            warn!("graphics context could not be recreated");
            self.context_failed = true;
        }
        self.recreated = Some(success);
        self.events.push(ImplEvent::ContextRecreated(success));
    }
}

#[cfg(test)]
mod tests {
    use strata_core::kurbo::{Point, Size};
    use strata_core::layer::LayerContent;

    use super::*;
    use crate::renderer::{HeadlessHandle, HeadlessRenderer};

    fn settings() -> Settings {
        Settings {
            minimum_occlusion_tracking_size: Size::ZERO,
            ..Settings::default()
        }
    }

    fn context() -> (ImplContext, HeadlessHandle) {
        let renderer = HeadlessRenderer::new();
        let handle = renderer.handle();
        let mut ctx = ImplContext::new(settings(), Box::new(renderer), None);
        ctx.initialize().unwrap();
        (ctx, handle)
    }

    fn pending() -> Box<PendingTree> {
        let mut pending = Box::new(PendingTree::new(&settings()));
        let root = pending.layers.create_layer();
        pending.layers.set_anchor_point(root, Point::ZERO);
        pending.layers.set_bounds(root, Size::new(20.0, 20.0));
        pending.layers.set_content(
            root,
            LayerContent::Solid {
                rgba: [1.0, 0.0, 0.0, 1.0],
            },
        );
        pending.root = Some(root);
        pending.viewport_size = Size::new(20.0, 20.0);
        pending.update_layers(&settings());
        pending
    }

    fn begin_frames(ctx: &mut ImplContext) -> Vec<BeginFrameArgs> {
        ctx.take_events()
            .into_iter()
            .filter_map(|e| match e {
                ImplEvent::BeginFrame(args) => Some(args),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn gate_rejects_at_or_below_last_executed() {
        let mut gate = SequenceGate::default();
        assert!(!gate.is_stale(1), "nothing executed yet");
        assert!(gate.execute(2), "first cycle runs");
        assert!(gate.is_stale(1), "older cycle is stale");
        assert!(!gate.execute(2), "a cycle runs once");
        assert!(gate.execute(3), "newer cycle runs");
        assert_eq!(gate.last_executed(), Some(3));
    }

    #[test]
    fn completion_delivers_once_across_threads() {
        let (done, waiter) = completion();
        let thread = std::thread::spawn(move || done.complete(7_u32));
        assert_eq!(waiter.wait(), Ok(7));
        thread.join().unwrap();

        let (done, waiter) = completion::<u32>();
        drop(done);
        assert_eq!(waiter.wait(), Err(Error::Disconnected));
    }

    #[test]
    fn repeated_commit_requests_coalesce() {
        let (mut ctx, _) = context();
        ctx.set_needs_commit();
        ctx.set_needs_commit();
        ctx.set_needs_commit();
        let frames = begin_frames(&mut ctx);
        assert_eq!(frames.len(), 1, "one begin-frame for three requests");
        assert_eq!(frames[0].sequence, 1);
        assert!(!frames[0].forced, "regular cycle");
    }

    #[test]
    fn superseded_commit_is_dropped_without_side_effects() {
        let (mut ctx, _) = context();
        ctx.set_needs_commit();
        let stale = begin_frames(&mut ctx).remove(0);

        let forced = ctx.begin_forced_frame().unwrap();
        assert!(forced.forced, "forced cycle");
        assert!(forced.sequence > stale.sequence, "sequence increases");

        let result = ctx.commit(forced.sequence, pending());
        assert_eq!(result.committed, Some(0));
        let layers = ctx.compositor().tree().len();

        let mut other = pending();
        other.source_frame_number = 9;
        let extra = other.layers.create_layer();
        other.layers.add_child(other.root.unwrap(), extra);
        let result = ctx.commit(stale.sequence, other);
        assert_eq!(result.committed, None);
        assert_eq!(result.pending.source_frame_number, 9);
        assert_eq!(ctx.compositor().tree().len(), layers, "tree untouched");
        assert_eq!(ctx.compositor().tree().source_frame_number(), 0);
    }

    #[test]
    fn readback_after_forced_commit() {
        let (mut ctx, handle) = context();
        assert_eq!(ctx.readback(Rect::new(0.0, 0.0, 1.0, 1.0)), Err(Error::NoRootLayer));

        let args = ctx.begin_forced_frame().unwrap();
        let _ = ctx.commit(args.sequence, pending());
        let pixels = ctx.readback(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert_eq!(pixels, vec![255, 0, 0, 255]);
        assert_eq!(handle.frames_swapped(), 1);
    }

    #[test]
    fn lost_context_is_recreated_and_recommitted() {
        let (mut ctx, handle) = context();
        let args = ctx.begin_forced_frame().unwrap();
        let mut tree = ctx.commit(args.sequence, pending()).pending;
        ctx.readback(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();

        handle.lose_context();
        ctx.set_needs_redraw();
        ctx.vsync_tick();
        let events = ctx.take_events();
        assert!(events.contains(&ImplEvent::ContextLost), "client told");
        assert!(
            events.contains(&ImplEvent::ContextRecreated(true)),
            "recreated"
        );
        let frame = events
            .into_iter()
            .find_map(|e| match e {
                ImplEvent::BeginFrame(args) => Some(args),
                _ => None,
            })
            .unwrap();
        tree = ctx.commit(frame.sequence, tree).pending;
        assert!(ctx.commit_pending(), "waiting for the first draw");
        ctx.teardown(&mut tree);
        assert_eq!(handle.live_backings(), 0);
    }

    #[test]
    fn teardown_deletes_backings() {
        let (mut ctx, handle) = context();
        let args = ctx.begin_forced_frame().unwrap();
        let mut tree = pending();
        let painted = tree.layers.create_layer();
        tree.layers.add_child(tree.root.unwrap(), painted);
        tree.layers.set_bounds(painted, Size::new(4.0, 4.0));
        tree.layers
            .set_content(painted, LayerContent::Painted { opaque_rect: None });
        tree.update_layers(&settings());
        let mut tree = ctx.commit(args.sequence, tree).pending;
        assert_eq!(handle.live_backings(), 1);

        ctx.teardown(&mut tree);
        assert_eq!(handle.live_backings(), 0);
        assert!(ctx.compositor().tree().is_empty(), "tree dropped");
    }
}
