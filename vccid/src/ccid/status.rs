//! CCID slot status and slot error bytes
//!
//! Every reader-to-host bulk message carries `bStatus` and `bError` in the
//! first two parameter bytes of its header.

/// `bmICCStatus`, bits 0-1 of `bStatus`
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IccStatus {
    PresentActive = 0,
    PresentInactive = 1,
    NotPresent = 2,
}

/// `bmCommandStatus`, bits 6-7 of `bStatus`
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Processed = 0,
    Failed = 1,
    TimeExtension = 2,
}

impl IccStatus {
    pub fn from_status_byte(status: u8) -> Option<Self> {
        match status & 0x03 {
            0 => Some(Self::PresentActive),
            1 => Some(Self::PresentInactive),
            2 => Some(Self::NotPresent),
            _ => None,
        }
    }
}

impl CommandStatus {
    pub fn from_status_byte(status: u8) -> Option<Self> {
        match status >> 6 {
            0 => Some(Self::Processed),
            1 => Some(Self::Failed),
            2 => Some(Self::TimeExtension),
            _ => None,
        }
    }
}

/// Combine command and ICC status into a `bStatus` byte
#[inline]
pub fn status_byte(command: CommandStatus, icc: IccStatus) -> u8 {
    ((command as u8) << 6) | icc as u8
}

/// `bError` values
///
/// Values 0x01..=0x7F name the offset of the offending header field.
pub struct SlotError;

impl SlotError {
    pub const NONE: u8 = 0x00;
    /// Only meaningful together with a failed command status
    pub const CMD_NOT_SUPPORTED: u8 = 0x00;
    /// `dwLength` disagrees with the transfer
    pub const BAD_LENGTH: u8 = 0x01;
    /// `bSlot` names a slot that does not exist
    pub const BAD_SLOT: u8 = 0x05;
    pub const CMD_SLOT_BUSY: u8 = 0xE0;
    pub const ICC_MUTE: u8 = 0xFE;
    pub const CMD_ABORTED: u8 = 0xFF;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_byte() {
        assert_eq!(status_byte(CommandStatus::Processed, IccStatus::PresentActive), 0x00);
        assert_eq!(status_byte(CommandStatus::Processed, IccStatus::PresentInactive), 0x01);
        assert_eq!(status_byte(CommandStatus::Failed, IccStatus::NotPresent), 0x42);
        assert_eq!(status_byte(CommandStatus::TimeExtension, IccStatus::PresentActive), 0x80);
    }

    #[test]
    fn test_status_byte_split() {
        let status = status_byte(CommandStatus::Failed, IccStatus::PresentInactive);
        assert_eq!(CommandStatus::from_status_byte(status), Some(CommandStatus::Failed));
        assert_eq!(IccStatus::from_status_byte(status), Some(IccStatus::PresentInactive));
        assert_eq!(IccStatus::from_status_byte(0x03), None);
        assert_eq!(CommandStatus::from_status_byte(0xC0), None);
    }
}
