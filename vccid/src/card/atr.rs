//! ATR (Answer To Reset) handling
//!
//! The virtual card answers with the shortest legal ATR: no interface bytes
//! (so T=0 is implied and no TCK is sent) followed by up to 15 historical
//! bytes.

/// TS: direct convention
pub const TS_DIRECT_CONVENTION: u8 = 0x3B;

/// T0 can announce at most 15 historical bytes
pub const MAX_HISTORICAL_BYTES: usize = 15;

/// Historical bytes used when the reader configuration names none
pub const DEFAULT_HISTORICAL_BYTES: &[u8] = b"vccid reader";

/// Build an ATR with the given historical bytes
///
/// Historical bytes beyond the 15 that T0 can announce are dropped.
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let hist_len = historical_bytes.len().min(MAX_HISTORICAL_BYTES);
    let mut atr = Vec::with_capacity(2 + hist_len);

    atr.push(TS_DIRECT_CONVENTION);
    // T0: high nibble clear (no TA1/TB1/TC1/TD1), low nibble K
    atr.push(hist_len as u8);
    atr.extend_from_slice(&historical_bytes[..hist_len]);

    atr
}
