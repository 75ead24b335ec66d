//! The abstract link between the engine and whatever protocol actually
//! produces a shuffled deck: the plaintext simple protocol for trusted
//! tables, or the mental-card proxy for tables that don't trust each other.
//! Because the variant set here is open (this workspace ships two
//! implementations, but a third party could add more), it is a trait object
//! rather than a closed enum.

use crate::hand::Hand;
use crate::observer::{Observer, Subject};
use std::cell::RefCell;
use std::rc::Weak;

/// Notification fired when a requested shuffle finishes. Carries no data of
/// its own; subscribers call back into the manager to fetch hands.
pub struct Shuffled;

/// Implemented by whatever protocol actually produces the shuffled deck.
/// `request_shuffle` may complete asynchronously — callers must not assume
/// `is_shuffle_completed` is true immediately after calling it — but a
/// `Shuffled` notification always follows once it does.
pub trait CardManager {
    fn request_shuffle(&mut self);
    fn is_shuffle_completed(&self) -> bool;
    fn number_of_cards(&self) -> usize;

    /// Builds a hand over the given deck indices. Panics if any index is
    /// out of range or the shuffle has not completed — callers are expected
    /// to check `is_shuffle_completed` first, mirroring the abstract
    /// interface's `std::out_of_range` contract.
    fn hand(&self, indices: &[u8]) -> Hand;

    fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<Shuffled>>>);
}

/// Shared subscriber bookkeeping every `CardManager` implementation needs;
/// composed into concrete managers rather than inherited, since Rust has no
/// base-class notification machinery to reuse.
#[derive(Default)]
pub struct ShuffleSubject {
    subject: Subject<Shuffled>,
}

impl ShuffleSubject {
    pub fn new() -> ShuffleSubject {
        ShuffleSubject::default()
    }

    pub fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<Shuffled>>>) {
        self.subject.subscribe(observer);
    }

    pub fn notify_shuffled(&mut self) {
        self.subject.notify_all(&Shuffled);
    }
}

