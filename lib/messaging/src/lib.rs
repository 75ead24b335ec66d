//! Peer messaging layer: framed, encrypted TCP channels multiplexed behind
//! Router/Dealer/Pub/Sub/Pair socket kinds, a `mio`-driven poller, a command
//! queue dispatching by name, and a callback scheduler for timers — the
//! transport on which every bridge control and event message travels.

pub mod buffer;
pub mod channel;
pub mod coroutine;
pub mod frame;
pub mod handler;
pub mod message;
pub mod poller;
pub mod queue;
pub mod scheduler;
pub mod socket;
