//! Glues one `bridge-core` engine to the rest of a bridge node: the two
//! card-dealing protocols, peer-to-peer command fan-out, persisted deal
//! recall, and the message-queue-facing `BridgeGame` wrapper.

pub mod bridge_game;
pub mod cardserver_client;
pub mod mental_card_manager;
pub mod peer_command_sender;
pub mod recorder;
pub mod simple_protocol;

pub use bridge_game::BridgeGame;
