//! Method-name-indexed dispatch table.
//!
//! One strategy object per method, registered once at startup into an
//! immutable map. The dispatcher decodes the envelope, routes to the bound
//! handler, and guarantees the client always gets a well-formed reply for
//! any request it could decode: unknown methods and invalid message kinds
//! come back as Exception envelopes rather than silence.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{AppErrorKind, AppException, Result};
use crate::protocol::MessageKind;
use crate::transport::DatagramSocket;

use super::invocation::Invocation;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered RPC method.
///
/// The handler takes ownership of the invocation: it reads its own typed
/// argument fields (skipping unknown field IDs) up to the stop tag, then
/// writes exactly one Reply or Exception envelope and flushes. A
/// subscription handler may keep the invocation alive and flush repeatedly.
pub trait Method: Send + Sync + 'static {
    fn invoke(&self, inv: Invocation) -> BoxFuture<'static, Result<()>>;
}

impl<F> Method for F
where
    F: Fn(Invocation) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
{
    fn invoke(&self, inv: Invocation) -> BoxFuture<'static, Result<()>> {
        self(inv)
    }
}

/// Immutable mapping from method name to handler.
pub struct Dispatcher {
    methods: HashMap<String, Arc<dyn Method>>,
}

/// Builder collecting method registrations before the map is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl DispatcherBuilder {
    pub fn method(mut self, name: &str, method: impl Method) -> Self {
        self.methods.insert(name.to_string(), Arc::new(method));
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            methods: self.methods,
        }
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Decode the envelope on `socket` and run the matching handler.
    ///
    /// Envelope decode failures propagate as protocol/transport errors and
    /// produce no reply; the client's own retransmission logic recovers.
    pub async fn dispatch(
        &self,
        mut socket: DatagramSocket,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let envelope = socket.reader().read_message_begin()?;
        debug!(method = %envelope.name, seq = envelope.seq_id, "received call");

        if envelope.kind != MessageKind::Call {
            let exc = AppException::new(
                AppErrorKind::InvalidMessageType,
                format!("expected a call, got {}", envelope.kind),
            );
            let mut inv = Invocation::new(envelope.name, envelope.seq_id, socket, shutdown);
            return inv.reply_exception(&exc).await;
        }

        match self.methods.get(&envelope.name) {
            Some(method) => {
                let method = method.clone();
                let inv = Invocation::new(envelope.name, envelope.seq_id, socket, shutdown);
                method.invoke(inv).await
            }
            None => {
                warn!(method = %envelope.name, "call for unregistered method");
                let exc = AppException::unknown_method(&envelope.name);
                let mut inv = Invocation::new(envelope.name, envelope.seq_id, socket, shutdown);
                inv.reply_exception(&exc).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::net::UdpSocket;

    use super::*;
    use crate::protocol::{BinaryReader, BinaryWriter, Envelope};
    use crate::error::RpcError;

    fn echo_seq() -> impl Method {
        |mut inv: Invocation| -> BoxFuture<'static, Result<()>> {
            Box::pin(async move {
                inv.write_reply_begin()?;
                inv.writer().write_field_stop();
                inv.flush().await
            })
        }
    }

    async fn run_dispatch(dispatcher: &Dispatcher, request: Bytes) -> (UdpSocket, Result<()>) {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let socket =
            DatagramSocket::new(server, client.local_addr().unwrap(), request, None);
        let (_tx, rx) = watch::channel(false);
        let res = dispatcher.dispatch(socket, rx).await;
        (client, res)
    }

    async fn recv_reader(client: &UdpSocket) -> BinaryReader {
        let mut buf = [0u8; 256];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        BinaryReader::new(Bytes::copy_from_slice(&buf[..n]))
    }

    fn call_bytes(name: &str, seq: i32) -> Bytes {
        let mut w = BinaryWriter::new();
        w.write_message_begin(&Envelope::call(name, seq)).unwrap();
        w.write_field_stop();
        w.take()
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_method() {
        let dispatcher = Dispatcher::builder().method("ping", echo_seq()).build();

        let (client, res) = run_dispatch(&dispatcher, call_bytes("ping", 5)).await;
        res.unwrap();

        let mut r = recv_reader(&client).await;
        let env = r.read_message_begin().unwrap();
        assert_eq!(env.kind, MessageKind::Reply);
        assert_eq!(env.seq_id, 5);
    }

    #[tokio::test]
    async fn test_unknown_method_yields_exception_with_original_seq() {
        let dispatcher = Dispatcher::builder().method("ping", echo_seq()).build();

        let (client, res) = run_dispatch(&dispatcher, call_bytes("doesNotExist", 77)).await;
        res.unwrap();

        let mut r = recv_reader(&client).await;
        let env = r.read_message_begin().unwrap();
        assert_eq!(env.kind, MessageKind::Exception);
        assert_eq!(env.seq_id, 77);
        let exc = AppException::read_fields(&mut r).unwrap();
        assert_eq!(exc.kind, AppErrorKind::UnknownMethod);
        assert!(exc.message.contains("doesNotExist"));
    }

    #[tokio::test]
    async fn test_non_call_kind_yields_invalid_message_type() {
        let dispatcher = Dispatcher::builder().method("ping", echo_seq()).build();

        let mut w = BinaryWriter::new();
        w.write_message_begin(&Envelope::reply("ping", 3)).unwrap();
        w.write_field_stop();

        let (client, res) = run_dispatch(&dispatcher, w.take()).await;
        res.unwrap();

        let mut r = recv_reader(&client).await;
        let env = r.read_message_begin().unwrap();
        assert_eq!(env.kind, MessageKind::Exception);
        let exc = AppException::read_fields(&mut r).unwrap();
        assert_eq!(exc.kind, AppErrorKind::InvalidMessageType);
    }

    #[tokio::test]
    async fn test_undecodable_envelope_aborts_without_reply() {
        let dispatcher = Dispatcher::builder().method("ping", echo_seq()).build();

        // Truncated: claims an 8-byte name but carries 2.
        let (_client, res) =
            run_dispatch(&dispatcher, Bytes::from_static(b"\x00\x00\x00\x08ab")).await;
        assert!(matches!(res.unwrap_err(), RpcError::Transport { .. }));
    }
}
