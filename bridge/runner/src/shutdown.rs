//! Cooperative shutdown (spec.md §5 "Cancellation"): a dedicated thread
//! turns SIGINT/SIGTERM into a plain `AtomicBool`, which every worker
//! thread (the authenticator, the main loop) polls on its own schedule
//! instead of being asynchronously interrupted. Grounded in
//! `signal_hook::iterator::Signals`, since the teacher repo has no signal
//! handling of its own to generalize (noted in DESIGN.md).

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Spawns the signal-watching thread and returns the flag it sets. The
/// returned flag starts false and is set exactly once, on the first
/// SIGINT/SIGTERM received.
pub fn install() -> Arc<AtomicBool> {
    let terminate = Arc::new(AtomicBool::new(false));
    let flag = terminate.clone();

    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("failed to register signal handler");
    thread::Builder::new()
        .name("signal-watcher".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                flag.store(true, Ordering::SeqCst);
                break;
            }
        })
        .expect("failed to spawn signal-watcher thread");

    terminate
}
