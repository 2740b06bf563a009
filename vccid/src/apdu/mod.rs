//! APDU (Application Protocol Data Unit) handling
//!
//! ISO 7816-4 command and response APDUs as carried inside a CCID `XfrBlock`
//! payload. Only the short length encoding is supported: a command is
//! `CLA INS P1 P2 [Lc Data]` where `Lc` is a single byte and the trailing data
//! must be exactly `Lc` bytes long. Extended length APDUs are rejected.
//!
//! # Example
//! ```
//! use vccid::apdu::{parse_apdu, Response, SW};
//!
//! let apdu = parse_apdu(&[0x00, 0xA4, 0x00, 0x00, 0x02, 0x3F, 0x00]).unwrap();
//! assert_eq!(apdu.ins, 0xA4);
//! assert_eq!(apdu.data, vec![0x3F, 0x00]);
//!
//! let response = Response::error(SW::FILE_NOT_FOUND);
//! assert_eq!(response.to_bytes(), vec![0x6A, 0x82]);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Largest data field a short APDU can carry
pub const MAX_SHORT_DATA_LEN: usize = 255;

/// Errors that can occur while decoding or encoding an APDU
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("APDU length field says {declared} data bytes, {actual} present")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("APDU data of {0} bytes does not fit a short length field")]
    DataTooLong(usize),
}

/// A parsed command APDU
///
/// An empty `data` means the command carried no length field (or `Lc = 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
        }
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
        }
    }

    /// Whether a data field is present
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    /// Encode as a short command APDU
    ///
    /// A command without data encodes as the bare 4-byte header.
    pub fn to_bytes(&self) -> Result<Vec<u8>, APDUError> {
        if self.data.len() > MAX_SHORT_DATA_LEN {
            return Err(APDUError::DataTooLong(self.data.len()));
        }
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if self.has_data() {
            out.push(self.data.len() as u8);
            out.extend_from_slice(&self.data);
        }
        Ok(out)
    }
}

/// Parse raw bytes into a command APDU
///
/// - `CLA INS P1 P2`: no data
/// - `CLA INS P1 P2 Lc Data`: exactly `Lc` data bytes must follow
pub fn parse_apdu(raw: &[u8]) -> Result<APDU, APDUError> {
    if raw.len() < 4 {
        return Err(APDUError::TooShort {
            expected: 4,
            actual: raw.len(),
        });
    }

    let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);

    let Some((&lc, data)) = raw[4..].split_first() else {
        return Ok(APDU::new(cla, ins, p1, p2));
    };

    if data.len() != lc as usize {
        return Err(APDUError::LengthMismatch {
            declared: lc as usize,
            actual: data.len(),
        });
    }

    Ok(APDU::with_data(cla, ins, p1, p2, data.to_vec()))
}

/// Interindustry class byte: no chaining, no secure messaging, channel 0
pub const CLA_INTERINDUSTRY: u8 = 0x00;

/// Instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
}

/// SELECT FILE P1 values
pub mod select {
    /// Select MF, DF or EF by file identifier
    pub const BY_FILE_ID: u8 = 0x00;
    /// Select the parent DF of the current file
    pub const PARENT_DF: u8 = 0x03;
}
