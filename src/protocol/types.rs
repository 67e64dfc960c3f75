//! Wire type tags and message kinds.
//!
//! Every value on the wire is preceded by a one-byte tag from this set. The
//! envelope carries a one-byte message kind. Unknown tags are a protocol
//! error, never silently coerced.

use std::fmt;

use crate::error::RpcError;

/// Type tags for binary serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    Byte = 3,
    Float = 4,
    I16 = 5,
    I32 = 6,
    String = 7,
    Struct = 8,
    List = 9,
}

impl WireType {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = RpcError;

    fn try_from(tag: u8) -> Result<Self, RpcError> {
        match tag {
            0 => Ok(WireType::Stop),
            1 => Ok(WireType::Void),
            2 => Ok(WireType::Bool),
            3 => Ok(WireType::Byte),
            4 => Ok(WireType::Float),
            5 => Ok(WireType::I16),
            6 => Ok(WireType::I32),
            7 => Ok(WireType::String),
            8 => Ok(WireType::Struct),
            9 => Ok(WireType::List),
            other => Err(RpcError::invalid_data(format!(
                "unknown wire type tag {other}"
            ))),
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Stop => "STOP",
            WireType::Void => "VOID",
            WireType::Bool => "BOOL",
            WireType::Byte => "BYTE",
            WireType::Float => "FLOAT",
            WireType::I16 => "I16",
            WireType::I32 => "I32",
            WireType::String => "STRING",
            WireType::Struct => "STRUCT",
            WireType::List => "LIST",
        };
        f.write_str(name)
    }
}

/// Message kinds at the envelope level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Call = 1,
    Reply = 2,
    Exception = 3,
}

impl MessageKind {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = RpcError;

    fn try_from(kind: u8) -> Result<Self, RpcError> {
        match kind {
            1 => Ok(MessageKind::Call),
            2 => Ok(MessageKind::Reply),
            3 => Ok(MessageKind::Exception),
            other => Err(RpcError::invalid_data(format!(
                "unknown message kind {other}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Call => "CALL",
            MessageKind::Reply => "REPLY",
            MessageKind::Exception => "EXCEPTION",
        };
        f.write_str(name)
    }
}
