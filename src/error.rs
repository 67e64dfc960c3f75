//! Error types for flightwire.
//!
//! Three disjoint error kind spaces mirror the wire protocol's view of the
//! world:
//!
//! - **Transport** errors: the datagram layer failed (socket closed, short
//!   read, timeout). The exchange is aborted without a reply.
//! - **Protocol** errors: the byte stream is structurally invalid (bad tag,
//!   negative length). Also aborts without a reply.
//! - **Application** exceptions: a valid, well-formed reply payload carrying
//!   a numeric kind and a message. Clients always receive these as an
//!   Exception-kind envelope, never as a dropped exchange.

use thiserror::Error;

/// Numeric kinds for transport-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Unknown,
    NotOpen,
    AlreadyOpen,
    TimedOut,
    EndOfFile,
}

impl TransportErrorKind {
    pub fn code(self) -> i32 {
        match self {
            TransportErrorKind::Unknown => 0,
            TransportErrorKind::NotOpen => 1,
            TransportErrorKind::AlreadyOpen => 2,
            TransportErrorKind::TimedOut => 3,
            TransportErrorKind::EndOfFile => 4,
        }
    }
}

/// Numeric kinds for protocol-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    Unknown,
    InvalidData,
    NegativeSize,
    SizeLimit,
    NotImplemented,
    DepthLimit,
}

impl ProtocolErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ProtocolErrorKind::Unknown => 0,
            ProtocolErrorKind::InvalidData => 1,
            ProtocolErrorKind::NegativeSize => 2,
            ProtocolErrorKind::SizeLimit => 3,
            ProtocolErrorKind::NotImplemented => 4,
            ProtocolErrorKind::DepthLimit => 5,
        }
    }
}

/// Numeric kinds for application exceptions, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
}

impl AppErrorKind {
    pub fn code(self) -> i32 {
        match self {
            AppErrorKind::Unknown => 0,
            AppErrorKind::UnknownMethod => 1,
            AppErrorKind::InvalidMessageType => 2,
            AppErrorKind::WrongMethodName => 3,
            AppErrorKind::BadSequenceId => 4,
            AppErrorKind::MissingResult => 5,
            AppErrorKind::InternalError => 6,
            AppErrorKind::ProtocolError => 7,
        }
    }

    /// Map a numeric kind back to the enum. Out-of-range codes fold into
    /// `Unknown` so a newer peer cannot break decoding.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AppErrorKind::UnknownMethod,
            2 => AppErrorKind::InvalidMessageType,
            3 => AppErrorKind::WrongMethodName,
            4 => AppErrorKind::BadSequenceId,
            5 => AppErrorKind::MissingResult,
            6 => AppErrorKind::InternalError,
            7 => AppErrorKind::ProtocolError,
            _ => AppErrorKind::Unknown,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            AppErrorKind::Unknown => "unknown application exception",
            AppErrorKind::UnknownMethod => "unknown method",
            AppErrorKind::InvalidMessageType => "invalid message type",
            AppErrorKind::WrongMethodName => "wrong method name",
            AppErrorKind::BadSequenceId => "bad sequence ID",
            AppErrorKind::MissingResult => "missing result",
            AppErrorKind::InternalError => "unknown internal error",
            AppErrorKind::ProtocolError => "unknown protocol error",
        }
    }
}

/// An application exception: a valid wire payload, not a transport fault.
///
/// Written under an Exception-kind envelope as a field stream and read back
/// the same way. An empty message falls back to the kind's default text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.display_message())]
pub struct AppException {
    pub kind: AppErrorKind,
    pub message: String,
}

impl AppException {
    pub fn new(kind: AppErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_method(name: &str) -> Self {
        Self::new(AppErrorKind::UnknownMethod, format!("unknown method {name}"))
    }

    pub fn display_message(&self) -> &str {
        if self.message.is_empty() {
            self.kind.default_message()
        } else {
            &self.message
        }
    }
}

/// Main error type for all flightwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Datagram layer failure; aborts the exchange without a reply.
    #[error("transport error ({}): {message}", kind.code())]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Structurally invalid bytes; aborts the exchange without a reply.
    #[error("protocol error ({}): {message}", kind.code())]
    Protocol {
        kind: ProtocolErrorKind,
        message: String,
    },

    /// A well-formed Exception reply received or about to be sent.
    #[error("application exception: {0}")]
    Application(#[from] AppException),

    /// I/O error from the underlying UDP socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        RpcError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        RpcError::Protocol {
            kind,
            message: message.into(),
        }
    }

    /// Short read past the end of the captured datagram.
    pub fn eof() -> Self {
        RpcError::transport(TransportErrorKind::EndOfFile, "unexpected end of datagram")
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        RpcError::protocol(ProtocolErrorKind::InvalidData, message)
    }

    pub fn negative_size(what: &str) -> Self {
        RpcError::protocol(
            ProtocolErrorKind::NegativeSize,
            format!("negative {what} length"),
        )
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
