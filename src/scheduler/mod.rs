//! Side-effect scheduler - three timing tiers, cancellable.
//!
//! Lifecycle side effects run at one of three tiers:
//! - **Blocking**: synchronously, within the current turn.
//! - **Frame boundary**: deferred until the host signals the next frame.
//! - **Post render**: deferred until the host signals a completed render pass.
//!
//! The host rendering environment pumps the deferred tiers by calling
//! [`SideEffectScheduler::frame_boundary`] and
//! [`SideEffectScheduler::render_complete`] on its own schedule. Execution is
//! single-threaded and cooperative; a deferred body runs on the pump turn.
//!
//! Cancellation has exactly two forms, and both guarantee the deferred body
//! never executes:
//! - [`TaskHandle::cancel`] before the tier's signal fires.
//! - [`SideEffectScheduler::teardown`] of the owning scope, which drops every
//!   pending task and makes the scheduler refuse new work.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

// =============================================================================
// Scheduler State
// =============================================================================

struct PendingTask {
    id: u64,
    body: Box<dyn FnOnce()>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tier {
    FrameBoundary,
    PostRender,
}

struct SchedulerState {
    frame_queue: Vec<PendingTask>,
    post_render_queue: Vec<PendingTask>,
    next_id: u64,
    destroyed: bool,
}

impl SchedulerState {
    fn queue_mut(&mut self, tier: Tier) -> &mut Vec<PendingTask> {
        match tier {
            Tier::FrameBoundary => &mut self.frame_queue,
            Tier::PostRender => &mut self.post_render_queue,
        }
    }
}

// =============================================================================
// Task Handle
// =============================================================================

/// Handle for a deferred task. Dropping the handle does NOT cancel the task;
/// call [`TaskHandle::cancel`] to guarantee the body never runs.
pub struct TaskHandle {
    id: u64,
    tier: Tier,
    state: Weak<RefCell<SchedulerState>>,
}

impl TaskHandle {
    /// Cancel the pending task. No-op if it already ran, was already
    /// cancelled, or the scheduler was torn down.
    pub fn cancel(self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.borrow_mut();
            let id = self.id;
            state.queue_mut(self.tier).retain(|task| task.id != id);
        }
    }

    /// Whether the task is still waiting for its signal.
    pub fn is_pending(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => {
                let state = state.borrow();
                let queue = match self.tier {
                    Tier::FrameBoundary => &state.frame_queue,
                    Tier::PostRender => &state.post_render_queue,
                };
                queue.iter().any(|task| task.id == self.id)
            }
            None => false,
        }
    }

    fn settled(state: &Rc<RefCell<SchedulerState>>) -> Self {
        // Points at a live scheduler but at no queued task.
        Self { id: 0, tier: Tier::FrameBoundary, state: Rc::downgrade(state) }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Executes side effects at one of three timing tiers. Cheap to clone; all
/// clones share one task queue and one teardown flag.
#[derive(Clone)]
pub struct SideEffectScheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl SideEffectScheduler {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SchedulerState {
                frame_queue: Vec::new(),
                post_render_queue: Vec::new(),
                next_id: 1,
                destroyed: false,
            })),
        }
    }

    /// Run a body synchronously. After teardown the body is dropped unrun.
    pub fn run_blocking(&self, body: impl FnOnce()) {
        if self.state.borrow().destroyed {
            return;
        }
        body();
    }

    /// Defer a body until the next frame boundary.
    ///
    /// If `skip_if` is given and returns true at call time, the wait is
    /// skipped and the body runs synchronously (blocking tier semantics).
    pub fn run_at_frame_boundary(
        &self,
        skip_if: Option<&dyn Fn() -> bool>,
        body: impl FnOnce() + 'static,
    ) -> TaskHandle {
        if self.state.borrow().destroyed {
            return TaskHandle::settled(&self.state);
        }
        if skip_if.is_some_and(|pred| pred()) {
            body();
            return TaskHandle::settled(&self.state);
        }
        self.enqueue(Tier::FrameBoundary, Box::new(body))
    }

    /// Defer a body until the next render pass completes.
    pub fn run_post_render(&self, body: impl FnOnce() + 'static) -> TaskHandle {
        if self.state.borrow().destroyed {
            return TaskHandle::settled(&self.state);
        }
        self.enqueue(Tier::PostRender, Box::new(body))
    }

    fn enqueue(&self, tier: Tier, body: Box<dyn FnOnce()>) -> TaskHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.queue_mut(tier).push(PendingTask { id, body });
        TaskHandle { id, tier, state: Rc::downgrade(&self.state) }
    }

    // =========================================================================
    // Host Pumps
    // =========================================================================

    /// Host signal: a frame boundary was reached. Runs every task queued at
    /// the frame tier. Tasks queued while draining wait for the next signal.
    pub fn frame_boundary(&self) {
        self.drain(Tier::FrameBoundary);
    }

    /// Host signal: a render pass completed. Runs every task queued at the
    /// post-render tier.
    pub fn render_complete(&self) {
        self.drain(Tier::PostRender);
    }

    fn drain(&self, tier: Tier) {
        // Take the batch out before running so task bodies can reschedule
        // without holding the borrow.
        let batch: Vec<PendingTask> = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            std::mem::take(state.queue_mut(tier))
        };
        for task in batch {
            (task.body)();
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear down the owning scope: drop all pending tasks without running
    /// them and refuse all subsequent work.
    pub fn teardown(&self) {
        let mut state = self.state.borrow_mut();
        state.destroyed = true;
        state.frame_queue.clear();
        state.post_render_queue.clear();
    }

    /// Number of tasks waiting at both deferred tiers.
    pub fn pending_count(&self) -> usize {
        let state = self.state.borrow();
        state.frame_queue.len() + state.post_render_queue.len()
    }
}

impl Default for SideEffectScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn blocking_runs_synchronously() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_clone = ran.clone();
        scheduler.run_blocking(move || ran_clone.set(true));

        assert!(ran.get());
    }

    #[test]
    fn frame_tier_waits_for_signal() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_clone = ran.clone();
        let handle = scheduler.run_at_frame_boundary(None, move || ran_clone.set(true));

        assert!(!ran.get());
        assert!(handle.is_pending());

        scheduler.frame_boundary();
        assert!(ran.get());
        assert!(!handle.is_pending());
    }

    #[test]
    fn skip_if_true_behaves_like_blocking() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_clone = ran.clone();
        let handle =
            scheduler.run_at_frame_boundary(Some(&|| true), move || ran_clone.set(true));

        assert!(ran.get());
        assert!(!handle.is_pending());
    }

    #[test]
    fn post_render_tier_waits_for_render_complete() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_clone = ran.clone();
        scheduler.run_post_render(move || ran_clone.set(true));

        // The frame pump must not drain the post-render tier.
        scheduler.frame_boundary();
        assert!(!ran.get());

        scheduler.render_complete();
        assert!(ran.get());
    }

    #[test]
    fn cancel_prevents_execution() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let ran_clone = ran.clone();
        let handle = scheduler.run_at_frame_boundary(None, move || ran_clone.set(true));
        handle.cancel();

        scheduler.frame_boundary();
        assert!(!ran.get());
    }

    #[test]
    fn teardown_drops_pending_and_refuses_new_work() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(0));

        let a = ran.clone();
        scheduler.run_at_frame_boundary(None, move || a.set(a.get() + 1));
        let b = ran.clone();
        scheduler.run_post_render(move || b.set(b.get() + 1));

        scheduler.teardown();
        scheduler.frame_boundary();
        scheduler.render_complete();
        assert_eq!(ran.get(), 0);

        // New work after teardown never runs, blocking included.
        let c = ran.clone();
        scheduler.run_blocking(move || c.set(c.get() + 1));
        let d = ran.clone();
        scheduler.run_at_frame_boundary(None, move || d.set(d.get() + 1));
        scheduler.frame_boundary();
        assert_eq!(ran.get(), 0);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn tasks_scheduled_while_draining_wait_for_next_signal() {
        let scheduler = SideEffectScheduler::new();
        let ran = Rc::new(Cell::new(0));

        let inner_ran = ran.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.run_at_frame_boundary(None, move || {
            let r = inner_ran.clone();
            inner_scheduler.run_at_frame_boundary(None, move || r.set(r.get() + 1));
        });

        scheduler.frame_boundary();
        assert_eq!(ran.get(), 0);
        assert_eq!(scheduler.pending_count(), 1);

        scheduler.frame_boundary();
        assert_eq!(ran.get(), 1);
    }
}
