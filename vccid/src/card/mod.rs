//! The virtual card behind each slot
//!
//! ATR construction, the card file hierarchy and the APDU interpreter.

pub mod atr;
pub mod filesystem;
pub mod interpreter;

pub use atr::{build_atr, DEFAULT_HISTORICAL_BYTES};
pub use filesystem::{FileId, FileNode, FileSystem, FileSystemError, MF_ID};
pub use interpreter::{CardInterpreter, CardState};
