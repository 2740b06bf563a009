//! APDU Response handling
//!
//! A response APDU is the response data followed by the two status bytes.

use super::status::SW;
use super::APDUError;

/// A response APDU
///
/// # Example
/// ```
/// use vccid::apdu::{Response, SW};
///
/// let response = Response::success(vec![0x01, 0x02]);
/// assert!(response.is_okay());
///
/// let error = Response::error(SW::INS_NOT_SUPPORTED);
/// assert_eq!(error.to_bytes(), vec![0x6D, 0x00]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status words)
    pub data: Vec<u8>,
    /// Status word 1 (SW1)
    pub sw1: u8,
    /// Status word 2 (SW2)
    pub sw2: u8,
}

impl Response {
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        let [sw1, sw2] = sw.to_be_bytes();
        Self { data, sw1, sw2 }
    }

    /// 0x9000 with data
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Status word only
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    pub fn is_okay(&self) -> bool {
        SW::is_success(self.sw())
    }

    /// Status word as `SW1 << 8 | SW2`
    pub fn sw(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// Wire form: data followed by SW1 SW2
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out.extend_from_slice(&[self.sw1, self.sw2]);
        out
    }

    /// Split raw response bytes into data and status word
    pub fn from_bytes(raw: &[u8]) -> Result<Self, APDUError> {
        match raw {
            [data @ .., sw1, sw2] => Ok(Self {
                data: data.to_vec(),
                sw1: *sw1,
                sw2: *sw2,
            }),
            _ => Err(APDUError::TooShort {
                expected: 2,
                actual: raw.len(),
            }),
        }
    }
}

impl From<u16> for Response {
    fn from(sw: u16) -> Self {
        Self::error(sw)
    }
}
