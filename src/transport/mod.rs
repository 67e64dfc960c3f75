//! Transport module - datagram-oriented socket handling.
//!
//! Provides:
//! - [`DatagramSocket`] - one inbound datagram as a readable byte stream
//!   plus an outbound write buffer bound to the sender's address
//! - [`RpcListener`] - the shared UDP port, with duplicate-suppression
//!   replay wired into the accept loop

mod datagram;
mod listener;

pub use datagram::DatagramSocket;
pub use listener::{RpcListener, MAX_DATAGRAM_SIZE};
