//! Cooperative shutdown (spec.md §5 "Cancellation"), identical in shape to
//! `bridge-runner`'s: a dedicated thread turns SIGINT/SIGTERM into a plain
//! `AtomicBool` that both the authenticator worker and the main loop poll.

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

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
