//! CCID bulk message framing
//!
//! Every CCID bulk message is a fixed 10-byte header followed by `dwLength`
//! payload bytes:
//!
//! ```text
//! +------+----------+-------+------+-----------+---------
//! | type | length   | slot  | seq  | params[3] | payload
//! | u8   | u32 (LE) | u8    | u8   | u8 x 3    | length bytes
//! +------+----------+-------+------+-----------+---------
//! ```
//!
//! [CCID Specification for Integrated Circuit(s) Cards Interface Devices](https://www.usb.org/sites/default/files/DWG_Smart-Card_CCID_Rev110.pdf)

pub mod status;

use thiserror::Error;

pub use status::{status_byte, CommandStatus, IccStatus, SlotError};

/// Size of the fixed CCID message header
pub const CCID_HEADER_LEN: usize = 10;

/// Interrupt-IN message announcing card insertion or removal
pub const RDR_TO_PC_NOTIFY_SLOT_CHANGE: u8 = 0x50;

/// Errors raised while decoding a CCID message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("CCID message too short: got {0} bytes, header needs 10")]
    ShortHeader(usize),

    #[error("CCID length field says {declared} payload bytes, {actual} present")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("unknown CCID message type 0x{0:02X}")]
    UnknownMessageType(u8),
}

impl FramingError {
    /// The `bError` value reported back to the host for this error
    pub fn slot_error(&self) -> u8 {
        match self {
            FramingError::UnknownMessageType(_) => SlotError::CMD_NOT_SUPPORTED,
            FramingError::ShortHeader(_) | FramingError::LengthMismatch { .. } => {
                SlotError::BAD_LENGTH
            }
        }
    }
}

/// Recognized bulk message types
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    // PC_to_RDR
    IccPowerOn = 0x62,
    IccPowerOff = 0x63,
    GetSlotStatus = 0x65,
    GetParameters = 0x6C,
    XfrBlock = 0x6F,
    Abort = 0x72,

    // RDR_to_PC
    DataBlock = 0x80,
    SlotStatus = 0x81,
    Parameters = 0x82,
}

impl MessageType {
    /// Whether this is a host-to-reader command
    pub fn is_command(self) -> bool {
        (self as u8) < 0x80
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FramingError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x62 => Ok(MessageType::IccPowerOn),
            0x63 => Ok(MessageType::IccPowerOff),
            0x65 => Ok(MessageType::GetSlotStatus),
            0x6C => Ok(MessageType::GetParameters),
            0x6F => Ok(MessageType::XfrBlock),
            0x72 => Ok(MessageType::Abort),
            0x80 => Ok(MessageType::DataBlock),
            0x81 => Ok(MessageType::SlotStatus),
            0x82 => Ok(MessageType::Parameters),
            other => Err(FramingError::UnknownMessageType(other)),
        }
    }
}

/// The fixed 10-byte message header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CCIDHeader {
    pub message_type: MessageType,
    /// Payload byte count (`dwLength`)
    pub length: u32,
    pub slot: u8,
    /// Sequence number chosen by the host, echoed in the response
    pub seq: u8,
    /// Command specific bytes; `bStatus, bError, x` in responses
    pub params: [u8; 3],
}

/// A complete CCID message: header plus exactly `header.length` payload bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CCIDMessage {
    header: CCIDHeader,
    payload: Vec<u8>,
}

impl CCIDMessage {
    /// Build a message; the header length is taken from the payload
    pub fn new(
        message_type: MessageType,
        slot: u8,
        seq: u8,
        params: [u8; 3],
        payload: Vec<u8>,
    ) -> Self {
        debug_assert!(payload.len() <= u32::MAX as usize);
        Self {
            header: CCIDHeader {
                message_type,
                length: payload.len() as u32,
                slot,
                seq,
                params,
            },
            payload,
        }
    }

    /// `RDR_to_PC_DataBlock`, params are `bStatus, bError, bChainParameter`
    pub fn data_block(slot: u8, seq: u8, status: u8, error: u8, payload: Vec<u8>) -> Self {
        Self::new(MessageType::DataBlock, slot, seq, [status, error, 0], payload)
    }

    /// `RDR_to_PC_SlotStatus`, params are `bStatus, bError, bClockStatus`
    pub fn slot_status(slot: u8, seq: u8, status: u8, error: u8) -> Self {
        Self::new(MessageType::SlotStatus, slot, seq, [status, error, 0], Vec::new())
    }

    /// `RDR_to_PC_Parameters`, params are `bStatus, bError, bProtocolNum`
    pub fn parameters(
        slot: u8,
        seq: u8,
        status: u8,
        error: u8,
        protocol: u8,
        payload: Vec<u8>,
    ) -> Self {
        Self::new(
            MessageType::Parameters,
            slot,
            seq,
            [status, error, protocol],
            payload,
        )
    }

    pub fn header(&self) -> &CCIDHeader {
        &self.header
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn slot(&self) -> u8 {
        self.header.slot
    }

    pub fn seq(&self) -> u8 {
        self.header.seq
    }

    pub fn params(&self) -> [u8; 3] {
        self.header.params
    }

    /// `bStatus` of a reader-to-host message
    pub fn status(&self) -> u8 {
        self.header.params[0]
    }

    /// `bError` of a reader-to-host message
    pub fn error(&self) -> u8 {
        self.header.params[1]
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize header and payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CCID_HEADER_LEN + self.payload.len());
        out.push(self.header.message_type as u8);
        out.extend_from_slice(&self.header.length.to_le_bytes());
        out.push(self.header.slot);
        out.push(self.header.seq);
        out.extend_from_slice(&self.header.params);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one complete message
    ///
    /// The buffer must hold exactly one message: a trailing byte count
    /// different from `dwLength` is a framing error.
    pub fn decode(raw: &[u8]) -> Result<Self, FramingError> {
        if raw.len() < CCID_HEADER_LEN {
            return Err(FramingError::ShortHeader(raw.len()));
        }

        let message_type = MessageType::try_from(raw[0])?;
        let length = declared_length(raw).unwrap_or_default();
        let payload = &raw[CCID_HEADER_LEN..];

        if payload.len() as u64 != length as u64 {
            return Err(FramingError::LengthMismatch {
                declared: length,
                actual: payload.len(),
            });
        }

        Ok(Self {
            header: CCIDHeader {
                message_type,
                length,
                slot: raw[5],
                seq: raw[6],
                params: [raw[7], raw[8], raw[9]],
            },
            payload: payload.to_vec(),
        })
    }
}

/// `dwLength` of a buffer that holds at least the first five header bytes
pub fn declared_length(raw: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = raw.get(1..5)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Best-effort `(slot, seq)` of a buffer that failed to decode
pub fn peek_addressing(raw: &[u8]) -> (u8, u8) {
    (
        raw.get(5).copied().unwrap_or_default(),
        raw.get(6).copied().unwrap_or_default(),
    )
}
