//! Cooperative suspend/resume for handlers that need to wait on a socket or
//! a timer mid-command, without blocking the single-threaded message loop.
//!
//! The original engine builds this on stackful coroutines
//! (`boost::context`), switching the OS stack at each `await`. Nothing in
//! this workspace's dependency stack provides stack switching or an
//! async/await runtime, so this is rebuilt as an explicit continuation: a
//! step is a boxed closure that either finishes or returns the thing it
//! needs to wait for plus the closure to resume with. The message loop
//! drives a `Coroutine` forward exactly when the awaited event occurs.

use crate::channel::ChannelId;
use std::time::Duration;

/// What a suspended coroutine is waiting on.
pub enum Awaitable {
    /// The channel identified has a message ready to read.
    Readable(ChannelId),
    /// At least `Duration` has elapsed.
    Delay(Duration),
}

/// The outcome of advancing one step of a coroutine.
pub enum StepResult {
    /// The coroutine ran to completion.
    Done,
    /// The coroutine suspended; resume it with `next` once `on` occurs.
    Suspend { on: Awaitable, next: Step },
}

pub type Step = Box<dyn FnOnce() -> StepResult + Send>;

/// A unit of cooperatively-scheduled work suspended between command
/// handling steps — e.g. the card-server proxy waiting for a reply to the
/// command it just sent before the handler that issued it can continue.
pub struct Coroutine {
    pending: Option<Step>,
    awaiting: Option<Awaitable>,
}

impl Coroutine {
    /// Starts a coroutine by running `first` immediately; if it suspends,
    /// the returned `Coroutine` tracks the rest of the work.
    pub fn start(first: Step) -> Coroutine {
        let mut coroutine = Coroutine {
            pending: None,
            awaiting: None,
        };
        coroutine.resume(first);
        coroutine
    }

    fn resume(&mut self, step: Step) {
        match step() {
            StepResult::Done => {
                self.pending = None;
                self.awaiting = None;
            }
            StepResult::Suspend { on, next } => {
                self.pending = Some(next);
                self.awaiting = Some(on);
            }
        }
    }

    /// True once the coroutine has run to completion.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.pending.is_none()
    }

    /// What this coroutine is currently suspended on, if it is not done.
    #[inline]
    pub fn awaiting(&self) -> Option<&Awaitable> {
        self.awaiting.as_ref()
    }

    /// Advances the coroutine past its current suspension point. The caller
    /// is responsible for only calling this once the awaited event has
    /// actually occurred.
    pub fn wake(&mut self) {
        if let Some(step) = self.pending.take() {
            self.resume(step);
        }
    }
}

/// Owns every in-flight coroutine for one message loop, advancing those
/// awaiting a now-readable channel or an elapsed delay.
pub struct CoroutinePool {
    coroutines: Vec<Coroutine>,
}

impl CoroutinePool {
    pub fn new() -> CoroutinePool {
        CoroutinePool { coroutines: Vec::new() }
    }

    pub fn spawn(&mut self, first: Step) {
        let coroutine = Coroutine::start(first);
        if !coroutine.is_done() {
            self.coroutines.push(coroutine);
        }
    }

    /// Wakes every coroutine awaiting `channel_id`, dropping those that
    /// complete.
    pub fn wake_readable(&mut self, channel_id: ChannelId) {
        self.coroutines.retain_mut(|coroutine| {
            if matches!(coroutine.awaiting(), Some(Awaitable::Readable(id)) if *id == channel_id) {
                coroutine.wake();
            }
            !coroutine.is_done()
        });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coroutines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coroutines.is_empty()
    }
}

impl Default for CoroutinePool {
    fn default() -> CoroutinePool {
        CoroutinePool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn completes_without_suspending() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let coroutine = Coroutine::start(Box::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
            StepResult::Done
        }));

        assert!(coroutine.is_done());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn suspends_then_resumes_on_wake() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();

        let mut coroutine = Coroutine::start(Box::new(move || StepResult::Suspend {
            on: Awaitable::Readable(3),
            next: Box::new(move || {
                ran_clone.store(true, Ordering::SeqCst);
                StepResult::Done
            }),
        }));

        assert!(!coroutine.is_done());
        assert!(!ran.load(Ordering::SeqCst));

        coroutine.wake();

        assert!(coroutine.is_done());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn pool_wakes_only_matching_channel() {
        let mut pool = CoroutinePool::new();
        let woken = Arc::new(AtomicBool::new(false));
        let woken_clone = woken.clone();

        pool.spawn(Box::new(move || StepResult::Suspend {
            on: Awaitable::Readable(5),
            next: Box::new(move || {
                woken_clone.store(true, Ordering::SeqCst);
                StepResult::Done
            }),
        }));

        pool.wake_readable(2);
        assert!(!woken.load(Ordering::SeqCst));
        assert_eq!(pool.len(), 1);

        pool.wake_readable(5);
        assert!(woken.load(Ordering::SeqCst));
        assert!(pool.is_empty());
    }
}
