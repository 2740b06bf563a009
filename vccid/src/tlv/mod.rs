//! BER-TLV (Tag-Length-Value) encoding
//!
//! Used to build the File Control Information returned by SELECT FILE.
//!
//! # Example
//! ```
//! use vccid::tlv::TLVBuilder;
//!
//! let fci = TLVBuilder::new()
//!     .add(0x82, &[0x38])
//!     .add(0x83, &[0x3F, 0x00])
//!     .wrap(0x6F)
//!     .build();
//! assert_eq!(fci, vec![0x6F, 0x07, 0x82, 0x01, 0x38, 0x83, 0x02, 0x3F, 0x00]);
//! ```

mod encoder;

pub use encoder::{TLVBuilder, TLVEncoder};

/// Render bytes as space separated upper-case hex, for log lines
pub fn hexify(value: &[u8]) -> String {
    value
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// ISO 7816-4 file control tags
pub mod tags {
    /// File Control Information template
    pub const FCI_TEMPLATE: u8 = 0x6F;
    /// File descriptor byte
    pub const FILE_DESCRIPTOR: u8 = 0x82;
    /// File identifier
    pub const FILE_IDENTIFIER: u8 = 0x83;
}
