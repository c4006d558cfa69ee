// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Commit/draw scheduling for the compositor context.
//!
//! The [`SchedulerStateMachine`] is a pure state machine: callers report
//! events (a commit was requested, a vsync window opened, a draw failed, the
//! graphics context was lost) and ask [`next_action`] what to do. Every
//! returned action must be reported back through [`update_state`] before the
//! next query.
//!
//! [`Scheduler`] wraps the state machine and runs actions against a
//! [`SchedulerClient`] until the machine has nothing left to do.
//!
//! [`next_action`]: SchedulerStateMachine::next_action
//! [`update_state`]: SchedulerStateMachine::update_state

/// Progress of the current begin-frame/commit cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitState {
    /// No cycle in flight.
    Idle,
    /// A begin-frame was sent to the client, which is updating layers.
    FrameInProgress,
    /// The client finished its begin-frame; the commit can run.
    ReadyToCommit,
    /// The commit ran and has not been drawn yet.
    WaitingForFirstDraw,
}

/// Health of the graphics context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Drawing is possible.
    Active,
    /// The context was lost and recreation has not started.
    Lost,
    /// Recreation is in progress.
    Recreating,
}

/// What the compositor context should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Ask the client to begin a frame (and then commit).
    BeginFrame,
    /// Run the commit.
    Commit,
    /// Draw, dropping the frame if content is not ready.
    DrawIfPossible,
    /// Draw regardless of missing content.
    DrawForced,
    /// Start recreating the lost graphics context.
    BeginContextRecreation,
}

/// Configuration for the [`SchedulerStateMachine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Number of consecutive dropped frames after which the next draw is
    /// forced.
    pub max_failed_draws_before_forced: u32,
}

impl SchedulerSettings {
    /// Default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_failed_draws_before_forced: 3,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides when to begin a frame, commit, draw, or recreate the context.
#[derive(Clone, Debug)]
pub struct SchedulerStateMachine {
    settings: SchedulerSettings,

    // -- Cycle state --
    commit_state: CommitState,
    context_state: ContextState,

    // -- Frame numbering --
    current_frame_number: u64,
    last_frame_number_drawn: Option<u64>,
    consecutive_failed_draws: u32,

    // -- Requests --
    needs_redraw: bool,
    needs_forced_redraw: bool,
    needs_forced_redraw_after_next_commit: bool,
    needs_commit: bool,
    needs_forced_commit: bool,

    // -- Environment --
    inside_vsync: bool,
    visible: bool,
    can_draw: bool,
    draw_if_possible_failed: bool,
}

impl SchedulerStateMachine {
    /// Creates an idle, invisible state machine with an active context.
    #[must_use]
    pub const fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            commit_state: CommitState::Idle,
            context_state: ContextState::Active,
            current_frame_number: 0,
            last_frame_number_drawn: None,
            consecutive_failed_draws: 0,
            needs_redraw: false,
            needs_forced_redraw: false,
            needs_forced_redraw_after_next_commit: false,
            needs_commit: false,
            needs_forced_commit: false,
            inside_vsync: false,
            visible: false,
            can_draw: false,
            draw_if_possible_failed: false,
        }
    }

    /// Returns the commit state.
    #[inline]
    #[must_use]
    pub const fn commit_state(&self) -> CommitState {
        self.commit_state
    }

    /// Returns the context state.
    #[inline]
    #[must_use]
    pub const fn context_state(&self) -> ContextState {
        self.context_state
    }

    /// Returns whether a commit is requested or in flight.
    #[must_use]
    pub const fn commit_pending(&self) -> bool {
        self.needs_commit
            || self.needs_forced_commit
            || !matches!(self.commit_state, CommitState::Idle)
    }

    /// Returns whether a redraw is requested.
    #[must_use]
    pub const fn redraw_pending(&self) -> bool {
        self.needs_redraw || self.needs_forced_redraw
    }

    /// Returns whether the driver should keep delivering vsync ticks.
    #[must_use]
    pub const fn vsync_callback_needed(&self) -> bool {
        if !self.visible || !matches!(self.context_state, ContextState::Active) {
            return self.needs_forced_redraw;
        }
        self.needs_redraw || self.needs_forced_redraw
    }

    fn has_drawn_this_frame(&self) -> bool {
        self.last_frame_number_drawn == Some(self.current_frame_number)
    }

    fn draw_suspended_until_commit(&self) -> bool {
        !self.can_draw || !self.visible
    }

    fn scheduled_to_draw(&self) -> bool {
        self.needs_redraw && !self.draw_suspended_until_commit()
    }

    fn should_draw(&self) -> bool {
        if self.needs_forced_redraw {
            return true;
        }
        self.scheduled_to_draw()
            && self.inside_vsync
            && !self.has_drawn_this_frame()
            && self.context_state == ContextState::Active
    }

    fn draw_action(&self) -> Action {
        if self.needs_forced_redraw {
            Action::DrawForced
        } else {
            Action::DrawIfPossible
        }
    }

    /// Returns the next action to perform.
    #[must_use]
    pub fn next_action(&self) -> Action {
        match self.commit_state {
            CommitState::Idle => {
                if self.context_state != ContextState::Active && self.needs_forced_redraw {
                    return Action::DrawForced;
                }
                if self.context_state != ContextState::Active && self.needs_forced_commit {
                    return Action::BeginFrame;
                }
                match self.context_state {
                    ContextState::Lost => return Action::BeginContextRecreation,
                    ContextState::Recreating => return Action::None,
                    ContextState::Active => {}
                }
                if self.should_draw() {
                    return self.draw_action();
                }
                if self.needs_forced_commit || (self.needs_commit && self.visible) {
                    return Action::BeginFrame;
                }
                Action::None
            }
            CommitState::FrameInProgress => {
                if self.should_draw() {
                    self.draw_action()
                } else {
                    Action::None
                }
            }
            CommitState::ReadyToCommit => Action::Commit,
            CommitState::WaitingForFirstDraw => {
                if self.should_draw() || self.context_state == ContextState::Lost {
                    return self.draw_action();
                }
                // The first draw cannot happen; let another commit through
                // rather than stalling.
                let can_commit = self.visible || self.needs_forced_commit;
                if self.needs_commit && can_commit && self.draw_suspended_until_commit() {
                    return Action::BeginFrame;
                }
                Action::None
            }
        }
    }

    /// Records that `action` (as returned by [`next_action`](Self::next_action))
    /// is being performed.
    pub fn update_state(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::BeginFrame => {
                self.commit_state = CommitState::FrameInProgress;
                self.needs_commit = false;
                self.needs_forced_commit = false;
            }
            Action::Commit => {
                self.commit_state = CommitState::WaitingForFirstDraw;
                self.needs_redraw = true;
                if self.draw_if_possible_failed {
                    self.last_frame_number_drawn = None;
                }
                if self.needs_forced_redraw_after_next_commit {
                    self.needs_forced_redraw_after_next_commit = false;
                    self.needs_forced_redraw = true;
                }
            }
            Action::DrawIfPossible | Action::DrawForced => {
                self.needs_redraw = false;
                self.needs_forced_redraw = false;
                self.draw_if_possible_failed = false;
                if self.inside_vsync {
                    self.last_frame_number_drawn = Some(self.current_frame_number);
                }
                if self.commit_state == CommitState::WaitingForFirstDraw {
                    self.commit_state = CommitState::Idle;
                }
            }
            Action::BeginContextRecreation => {
                assert!(
                    self.commit_state == CommitState::Idle,
                    "context recreation must start with no commit in flight"
                );
                assert!(
                    self.context_state == ContextState::Lost,
                    "context recreation requires a lost context"
                );
                self.context_state = ContextState::Recreating;
            }
        }
    }

    /// Requests a redraw at the next vsync.
    pub fn set_needs_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Requests a draw even outside the vsync window or without content.
    pub fn set_needs_forced_redraw(&mut self) {
        self.needs_forced_redraw = true;
    }

    /// Requests a commit.
    pub fn set_needs_commit(&mut self) {
        self.needs_commit = true;
    }

    /// Requests a commit even while invisible or without a context.
    pub fn set_needs_forced_commit(&mut self) {
        self.needs_forced_commit = true;
    }

    /// Reports the outcome of a [`Action::DrawIfPossible`].
    ///
    /// A dropped frame requests another commit and redraw; after
    /// `max_failed_draws_before_forced` consecutive drops the draw after the
    /// next commit is forced.
    pub fn did_draw_if_possible_completed(&mut self, success: bool) {
        self.draw_if_possible_failed = !success;
        if success {
            self.consecutive_failed_draws = 0;
            return;
        }
        self.needs_redraw = true;
        self.needs_commit = true;
        self.consecutive_failed_draws += 1;
        if self.consecutive_failed_draws >= self.settings.max_failed_draws_before_forced {
            self.consecutive_failed_draws = 0;
            self.needs_forced_redraw_after_next_commit = true;
        }
    }

    /// Marks the start of a vsync window.
    pub fn did_enter_vsync(&mut self) {
        self.inside_vsync = true;
    }

    /// Marks the end of a vsync window.
    pub fn did_leave_vsync(&mut self) {
        self.current_frame_number += 1;
        self.inside_vsync = false;
    }

    /// Sets whether the output is visible.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Sets whether drawing is possible (a root layer and viewport exist).
    pub fn set_can_draw(&mut self, can_draw: bool) {
        self.can_draw = can_draw;
    }

    /// The client finished its begin-frame work.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn begin_frame_complete(&mut self) {
        assert!(
            self.commit_state == CommitState::FrameInProgress,
            "begin_frame_complete without a frame in progress"
        );
        self.commit_state = CommitState::ReadyToCommit;
    }

    /// The client dropped its begin-frame (for example because it was
    /// stale); a new commit is requested.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn begin_frame_aborted(&mut self) {
        assert!(
            self.commit_state == CommitState::FrameInProgress,
            "begin_frame_aborted without a frame in progress"
        );
        self.commit_state = CommitState::Idle;
        self.set_needs_commit();
    }

    /// The graphics context was lost.
    pub fn did_lose_context(&mut self) {
        if self.context_state == ContextState::Active {
            self.context_state = ContextState::Lost;
        }
    }

    /// The graphics context was recreated; a commit is requested so the
    /// client can re-upload content.
    ///
    /// # Panics
    ///
    /// Panics if recreation was not in progress.
    pub fn did_recreate_context(&mut self) {
        assert!(
            self.context_state == ContextState::Recreating,
            "did_recreate_context without recreation in progress"
        );
        self.context_state = ContextState::Active;
        self.set_needs_commit();
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Receives the actions chosen by a [`Scheduler`].
pub trait SchedulerClient {
    /// Send a begin-frame to the client context.
    fn scheduled_action_begin_frame(&mut self);

    /// Run the commit.
    fn scheduled_action_commit(&mut self);

    /// Draw and swap; returns `false` if the frame was dropped.
    fn scheduled_action_draw_and_swap_if_possible(&mut self) -> bool;

    /// Draw and swap unconditionally.
    fn scheduled_action_draw_and_swap_forced(&mut self);

    /// Start recreating the graphics context.
    fn scheduled_action_begin_context_recreation(&mut self);
}

/// Runs [`SchedulerStateMachine`] actions against a [`SchedulerClient`].
///
/// Every event method processes actions until the machine returns
/// [`Action::None`].
#[derive(Clone, Debug)]
pub struct Scheduler {
    state: SchedulerStateMachine,
}

impl Scheduler {
    /// Creates a scheduler with the given settings.
    #[must_use]
    pub const fn new(settings: SchedulerSettings) -> Self {
        Self {
            state: SchedulerStateMachine::new(settings),
        }
    }

    /// Returns the underlying state machine.
    #[must_use]
    pub const fn state(&self) -> &SchedulerStateMachine {
        &self.state
    }

    /// Requests a commit.
    pub fn set_needs_commit(&mut self, client: &mut dyn SchedulerClient) {
        self.state.set_needs_commit();
        self.process_scheduled_actions(client);
    }

    /// Requests a forced commit and a forced redraw after it.
    pub fn set_needs_forced_commit(&mut self, client: &mut dyn SchedulerClient) {
        self.state.set_needs_forced_commit();
        self.process_scheduled_actions(client);
    }

    /// Requests a redraw.
    pub fn set_needs_redraw(&mut self, client: &mut dyn SchedulerClient) {
        self.state.set_needs_redraw();
        self.process_scheduled_actions(client);
    }

    /// Requests a forced redraw.
    pub fn set_needs_forced_redraw(&mut self, client: &mut dyn SchedulerClient) {
        self.state.set_needs_forced_redraw();
        self.process_scheduled_actions(client);
    }

    /// Sets visibility.
    pub fn set_visible(&mut self, visible: bool, client: &mut dyn SchedulerClient) {
        self.state.set_visible(visible);
        self.process_scheduled_actions(client);
    }

    /// Sets whether drawing is possible.
    pub fn set_can_draw(&mut self, can_draw: bool, client: &mut dyn SchedulerClient) {
        self.state.set_can_draw(can_draw);
        self.process_scheduled_actions(client);
    }

    /// Reports that the client finished its begin-frame.
    pub fn begin_frame_complete(&mut self, client: &mut dyn SchedulerClient) {
        self.state.begin_frame_complete();
        self.process_scheduled_actions(client);
    }

    /// Reports that the client dropped its begin-frame.
    pub fn begin_frame_aborted(&mut self, client: &mut dyn SchedulerClient) {
        self.state.begin_frame_aborted();
        self.process_scheduled_actions(client);
    }

    /// Reports context loss.
    pub fn did_lose_context(&mut self, client: &mut dyn SchedulerClient) {
        self.state.did_lose_context();
        self.process_scheduled_actions(client);
    }

    /// Reports context recreation.
    pub fn did_recreate_context(&mut self, client: &mut dyn SchedulerClient) {
        self.state.did_recreate_context();
        self.process_scheduled_actions(client);
    }

    /// Runs one vsync window: enter, process, leave.
    pub fn vsync_tick(&mut self, client: &mut dyn SchedulerClient) {
        self.state.did_enter_vsync();
        self.process_scheduled_actions(client);
        self.state.did_leave_vsync();
    }

    fn process_scheduled_actions(&mut self, client: &mut dyn SchedulerClient) {
        loop {
            let action = self.state.next_action();
            self.state.update_state(action);
            match action {
                Action::None => return,
                Action::BeginFrame => client.scheduled_action_begin_frame(),
                Action::Commit => client.scheduled_action_commit(),
                Action::DrawIfPossible => {
                    let drew = client.scheduled_action_draw_and_swap_if_possible();
                    self.state.did_draw_if_possible_completed(drew);
                }
                Action::DrawForced => client.scheduled_action_draw_and_swap_forced(),
                Action::BeginContextRecreation => {
                    client.scheduled_action_begin_context_recreation();
                }
            }
        }
    }
}
