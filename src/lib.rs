//! Flightwire: a compact binary RPC framework over UDP datagrams.
//!
//! Each request and reply travels in a single datagram carrying a message
//! envelope (method name, message kind, sequence ID) followed by a typed
//! field stream. The server runs one worker task per datagram, with an
//! optional duplicate-suppression cache that replays stored replies for
//! retransmitted requests instead of re-executing handlers.
//!
//! The [`flight`] module ships a sample flight-information service,
//! including a server-push seat monitor built on the same wire format.

pub mod cache;
pub mod client;
pub mod error;
pub mod flight;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ClientConfig, RpcClient};
pub use error::{AppErrorKind, AppException, Result, RpcError};
pub use server::{Server, ServerHandle};
