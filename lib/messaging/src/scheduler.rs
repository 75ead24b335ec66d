//! Delayed callback execution integrated into the `mio` message loop.
//! Grounded in the original engine's `PollingCallbackScheduler`: a worker
//! thread owns a priority queue of pending callbacks and a channel back to
//! the main loop, waking a registered `mio::Registration` whenever a
//! callback becomes due so the loop's poll call returns promptly instead of
//! only on the next socket event.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

pub type CallbackId = u64;
pub type Callback = Box<dyn FnOnce() + Send>;

enum WorkerMessage {
    Schedule(Duration, CallbackId),
    Terminate,
}

#[derive(Eq, PartialEq)]
struct ScheduledCallback {
    time_to_execute: Instant,
    callback_id: CallbackId,
}

impl Ord for ScheduledCallback {
    // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline first.
    fn cmp(&self, other: &ScheduledCallback) -> Ordering {
        other.time_to_execute.cmp(&self.time_to_execute)
    }
}

impl PartialOrd for ScheduledCallback {
    fn partial_cmp(&self, other: &ScheduledCallback) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn worker_loop(
    from_main: mpsc::Receiver<WorkerMessage>,
    to_main: mpsc::Sender<CallbackId>,
    set_readiness: mio::SetReadiness,
) {
    let mut queue = BinaryHeap::new();

    loop {
        let wait = match queue.peek() {
            Some(next) => next
                .time_to_execute
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::from_secs(0)),
            None => Duration::from_secs(3600),
        };

        match from_main.recv_timeout(wait) {
            Ok(WorkerMessage::Schedule(timeout, id)) => {
                queue.push(ScheduledCallback {
                    time_to_execute: Instant::now() + timeout,
                    callback_id: id,
                });
            }
            Ok(WorkerMessage::Terminate) => return,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                while let Some(next) = queue.peek() {
                    if next.time_to_execute > Instant::now() {
                        break;
                    }
                    let due = queue.pop().expect("just peeked");
                    if to_main.send(due.callback_id).is_err() {
                        return;
                    }
                }
                set_readiness.set_readiness(mio::Ready::readable()).ok();
            }
        }
    }
}

/// Schedules callbacks to run on the owning message loop's thread after a
/// delay, without blocking it while they wait.
pub struct CallbackScheduler {
    next_id: CallbackId,
    pending: HashMap<CallbackId, Callback>,
    to_worker: mpsc::Sender<WorkerMessage>,
    from_worker: mpsc::Receiver<CallbackId>,
    registration: mio::Registration,
    worker: Option<thread::JoinHandle<()>>,
}

impl CallbackScheduler {
    pub fn new() -> CallbackScheduler {
        let (registration, set_readiness) = mio::Registration::new2();
        let (to_worker, from_main) = mpsc::channel();
        let (to_main, from_worker) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("callback-scheduler".to_string())
            .spawn(move || worker_loop(from_main, to_main, set_readiness))
            .expect("failed to spawn callback scheduler worker");

        CallbackScheduler {
            next_id: 0,
            pending: HashMap::new(),
            to_worker,
            from_worker,
            registration,
            worker: Some(worker),
        }
    }

    /// Registers this scheduler's wakeup source on `poll` under `token`.
    /// Events on `token` mean `drain` has work to do.
    pub fn register(&self, poll: &mio::Poll, token: mio::Token) -> std::io::Result<()> {
        poll.register(
            &self.registration,
            token,
            mio::Ready::readable(),
            mio::PollOpt::edge(),
        )
    }

    /// Schedules `callback` to run after `timeout` has elapsed.
    pub fn call_later(&mut self, timeout: Duration, callback: impl FnOnce() + Send + 'static) -> CallbackId {
        let id = self.next_id;
        self.next_id += 1;

        self.pending.insert(id, Box::new(callback));
        self.to_worker.send(WorkerMessage::Schedule(timeout, id)).ok();

        id
    }

    /// Runs every callback that has become due since the last call. Intended
    /// to be invoked whenever the registered token fires readable.
    pub fn drain(&mut self) {
        while let Ok(id) = self.from_worker.try_recv() {
            if let Some(callback) = self.pending.remove(&id) {
                callback();
            }
        }
    }
}

impl Default for CallbackScheduler {
    fn default() -> CallbackScheduler {
        CallbackScheduler::new()
    }
}

impl Drop for CallbackScheduler {
    fn drop(&mut self) {
        self.to_worker.send(WorkerMessage::Terminate).ok();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_callback_after_delay() {
        let mut scheduler = CallbackScheduler::new();
        let fired = Arc::new(Mutex::new(false));

        let fired_clone = fired.clone();
        scheduler.call_later(Duration::from_millis(10), move || {
            *fired_clone.lock().unwrap() = true;
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while !*fired.lock().unwrap() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            scheduler.drain();
        }

        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn runs_each_callback_exactly_once() {
        let mut scheduler = CallbackScheduler::new();
        let count = Arc::new(Mutex::new(0));

        let count_clone = count.clone();
        let id = scheduler.call_later(Duration::from_millis(5), move || {
            *count_clone.lock().unwrap() += 1;
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while *count.lock().unwrap() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
            scheduler.drain();
        }

        scheduler.drain();
        scheduler.drain();

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!scheduler.pending.contains_key(&id));
    }
}
