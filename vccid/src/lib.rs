//! Virtual CCID smart card reader
//!
//! A USB CCID message layer with embedded ISO 7816-4 APDU framing. Each
//! reader is one [`CcidEngine`]: it tracks the power and presence state of
//! its slots and routes `XfrBlock` payloads to a minimal virtual card that
//! understands SELECT FILE over an in-memory file hierarchy.
//!
//! The engine is transport agnostic. Feed it complete bulk-out messages with
//! [`CcidEngine::handle_inbound`], or hand it a [`transport::Transport`] and
//! call [`transport::serve`].
//!
//! ```
//! use vccid::{CcidEngine, ReaderConfig};
//!
//! let mut reader = CcidEngine::new(&ReaderConfig::default()).unwrap();
//!
//! // PC_to_RDR_IccPowerOn, slot 0, seq 1
//! let atr = reader.handle_inbound(&[0x62, 0, 0, 0, 0, 0, 1, 0, 0, 0]);
//! assert_eq!(atr[0], 0x80);
//!
//! // PC_to_RDR_XfrBlock carrying SELECT MF
//! let resp = reader.handle_inbound(&[0x6F, 4, 0, 0, 0, 0, 2, 0, 0, 0, 0x00, 0xA4, 0x00, 0x00]);
//! assert_eq!(&resp[resp.len() - 2..], &[0x90, 0x00]);
//! ```

pub mod apdu;
pub mod card;
pub mod ccid;
pub mod config;
pub mod engine;
pub mod slot;
pub mod tlv;
pub mod transport;

pub use apdu::{parse_apdu, APDUError, Response, APDU, SW};
pub use ccid::{CCIDMessage, FramingError, MessageType};
pub use config::{ConfigError, ReaderConfig};
pub use engine::CcidEngine;
pub use slot::{SlotState, SlotStateError};
pub use transport::{serve, MemoryTransport, Transport, TransportError};
