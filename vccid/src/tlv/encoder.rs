//! BER-TLV Encoder
//!
//! Single-byte tags only; the file control tags never need more.

/// Stateless TLV encoding helpers
pub struct TLVEncoder;

impl TLVEncoder {
    /// Encode a tag-value pair to bytes
    pub fn encode(tag: u8, value: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(value.len() + 4);
        result.push(tag);
        result.extend(Self::encode_length(value.len()));
        result.extend_from_slice(value);
        result
    }

    /// Encode just the length bytes
    ///
    /// Short form below 0x80, otherwise `0x80 | n` followed by the `n`
    /// significant big-endian length bytes.
    pub fn encode_length(length: usize) -> Vec<u8> {
        if length < 0x80 {
            return vec![length as u8];
        }
        let bytes = (length as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        let mut out = Vec::with_capacity(1 + bytes.len() - skip);
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
        out
    }
}

/// Builder for nested TLV structures
#[derive(Debug, Default)]
pub struct TLVBuilder {
    data: Vec<u8>,
}

impl TLVBuilder {
    /// Create a new, empty builder
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append a primitive TLV
    pub fn add(mut self, tag: u8, value: &[u8]) -> Self {
        self.data.extend(TLVEncoder::encode(tag, value));
        self
    }

    /// Wrap everything added so far in a constructed tag
    pub fn wrap(self, tag: u8) -> Self {
        Self {
            data: TLVEncoder::encode(tag, &self.data),
        }
    }

    /// Build the final byte vector
    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
