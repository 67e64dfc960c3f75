//! Handler module - method dispatch and the invocation context.
//!
//! Provides:
//! - [`Dispatcher`] - immutable method-name-to-handler table
//! - [`Method`] - strategy trait implemented per RPC method
//! - [`Invocation`] - owns the datagram socket for one call; handlers read
//!   args and write the reply through it

mod dispatcher;
mod invocation;

pub use dispatcher::{BoxFuture, Dispatcher, DispatcherBuilder, Method};
pub use invocation::Invocation;
