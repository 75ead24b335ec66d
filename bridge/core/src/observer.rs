//! A minimal one-to-many notification helper used by the engine and the
//! card manager implementations. Subscribers are held by weak reference so
//! that a dropped observer is simply forgotten rather than kept alive; each
//! `notify_all` sweeps expired entries out of the list as it goes, matching
//! the original engine's `Observer`/`Observable` pair.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub trait Observer<T> {
    fn notify(&mut self, event: &T);
}

/// Holds the weak subscriber list for one event type. Not `Send`/`Sync`: the
/// engine and its observers all run on the single-threaded message loop.
pub struct Subject<T> {
    observers: Vec<Weak<RefCell<dyn Observer<T>>>>,
}

impl<T> Subject<T> {
    pub fn new() -> Subject<T> {
        Subject { observers: Vec::new() }
    }

    pub fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<T>>>) {
        self.observers.push(observer);
    }

    /// Notifies every live subscriber and drops the ones that have expired.
    pub fn notify_all(&mut self, event: &T) {
        self.observers.retain(|weak| match weak.upgrade() {
            Some(observer) => {
                observer.borrow_mut().notify(event);
                true
            }
            None => false,
        });
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Subject<T> {
        Subject::new()
    }
}

/// Adapts a `FnMut` closure into an `Observer`, for the common case of a
/// subscriber that doesn't need its own named type.
pub struct FunctionObserver<F> {
    function: F,
}

impl<F> FunctionObserver<F> {
    pub fn new(function: F) -> FunctionObserver<F> {
        FunctionObserver { function }
    }

    pub fn shared<T>(function: F) -> Rc<RefCell<FunctionObserver<F>>>
    where
        F: FnMut(&T) + 'static,
        FunctionObserver<F>: Observer<T>,
    {
        Rc::new(RefCell::new(FunctionObserver { function }))
    }
}

impl<T, F: FnMut(&T)> Observer<T> for FunctionObserver<F> {
    fn notify(&mut self, event: &T) {
        (self.function)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Event(u32);

    #[test]
    fn notifies_live_subscribers_and_forgets_dropped_ones() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut subject: Subject<Event> = Subject::new();
        let observer = FunctionObserver::shared(move |event: &Event| {
            seen_clone.borrow_mut().push(event.0);
        });
        subject.subscribe(Rc::downgrade(&observer));

        subject.notify_all(&Event(1));
        assert_eq!(*seen.borrow(), vec![1]);

        drop(observer);
        subject.notify_all(&Event(2));
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(subject.observers.is_empty());
    }
}
