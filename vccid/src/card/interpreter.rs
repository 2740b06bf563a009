//! Card command interpreter
//!
//! A minimal virtual card: a CLA/INS dispatcher over an immutable file
//! hierarchy. The only mutable state is the current selection, which is
//! passed in and handed back with every command so that `process` has no
//! hidden side effects.

use log::debug;

use super::filesystem::{FileId, FileNode, FileSystem, MF_ID};
use crate::apdu::{ins, select, Response, APDU, CLA_INTERINDUSTRY, SW};

/// SELECT P2: return the FCI template
const P2_RETURN_FCI: u8 = 0x00;
/// SELECT P2: no response data
const P2_NO_RESPONSE_DATA: u8 = 0x0C;

/// Per-session card state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardState {
    current: FileId,
}

impl CardState {
    /// State right after power on: the MF is selected
    pub fn new() -> Self {
        Self { current: MF_ID }
    }

    /// Currently selected file
    pub fn current(&self) -> FileId {
        self.current
    }
}

impl Default for CardState {
    fn default() -> Self {
        Self::new()
    }
}

/// Processes command APDUs against a file hierarchy
#[derive(Debug, Clone)]
pub struct CardInterpreter {
    fs: FileSystem,
}

impl CardInterpreter {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    pub fn filesystem(&self) -> &FileSystem {
        &self.fs
    }

    /// Process one command, returning the response and the next state
    pub fn process(&self, cmd: &APDU, state: CardState) -> (Response, CardState) {
        debug!(
            "Processing APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );

        if cmd.cla != CLA_INTERINDUSTRY {
            return (Response::error(SW::CLA_NOT_SUPPORTED), state);
        }

        match cmd.ins {
            ins::SELECT => self.handle_select(cmd, state),
            _ => (Response::error(SW::INS_NOT_SUPPORTED), state),
        }
    }

    fn handle_select(&self, cmd: &APDU, state: CardState) -> (Response, CardState) {
        if cmd.p2 != P2_RETURN_FCI && cmd.p2 != P2_NO_RESPONSE_DATA {
            return (Response::error(SW::INCORRECT_P1_P2), state);
        }

        let target = match cmd.p1 {
            select::BY_FILE_ID => {
                if !cmd.has_data() {
                    Ok(self.fs.mf())
                } else if cmd.data.len() != 2 {
                    // file identifiers are exactly two bytes
                    Err(SW::WRONG_LENGTH)
                } else {
                    let fid = u16::from_be_bytes([cmd.data[0], cmd.data[1]]);
                    self.find_reachable(state, fid).ok_or(SW::FILE_NOT_FOUND)
                }
            }
            select::PARENT_DF => self
                .fs
                .parent_of(self.current_df(state).fid())
                .ok_or(SW::FILE_NOT_FOUND),
            _ => Err(SW::INCORRECT_P1_P2),
        };

        match target {
            Ok(node) => {
                debug!("Selected file {:04X}", node.fid());
                let data = if cmd.p2 == P2_RETURN_FCI {
                    node.fci()
                } else {
                    Vec::new()
                };
                (Response::success(data), CardState { current: node.fid() })
            }
            Err(sw) => (Response::error(sw), state),
        }
    }

    /// The selected DF, or the parent DF of a selected EF
    fn current_df(&self, state: CardState) -> &FileNode {
        let current = self.fs.get(state.current).unwrap_or_else(|| self.fs.mf());
        if current.is_dedicated() {
            current
        } else {
            self.fs.parent_of(current.fid()).unwrap_or_else(|| self.fs.mf())
        }
    }

    /// Files selectable by identifier from the current DF: the MF, the DF
    /// itself, its children and its parent
    fn find_reachable(&self, state: CardState, fid: FileId) -> Option<&FileNode> {
        let df = self.current_df(state);
        if fid == MF_ID {
            return Some(self.fs.mf());
        }
        if fid == df.fid() {
            return Some(df);
        }
        self.fs
            .child_of(df.fid(), fid)
            .or_else(|| self.fs.parent_of(df.fid()).filter(|parent| parent.fid() == fid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::parse_apdu;

    const MF_FCI: [u8; 9] = [0x6F, 0x07, 0x82, 0x01, 0x38, 0x83, 0x02, 0x3F, 0x00];

    fn interpreter() -> CardInterpreter {
        let mut fs = FileSystem::new();
        fs.add_df(MF_ID, 0x5000).unwrap();
        fs.add_ef(0x5000, 0x5001).unwrap();
        fs.add_df(0x5000, 0x5100).unwrap();
        fs.add_ef(MF_ID, 0x2F00).unwrap();
        CardInterpreter::new(fs)
    }

    fn run(card: &CardInterpreter, raw: &[u8], state: CardState) -> (Response, CardState) {
        card.process(&parse_apdu(raw).unwrap(), state)
    }

    fn select(fid: FileId) -> Vec<u8> {
        let [hi, lo] = fid.to_be_bytes();
        vec![0x00, 0xA4, 0x00, 0x00, 0x02, hi, lo]
    }

    #[test]
    fn test_unknown_class() {
        let card = interpreter();
        let (resp, next) = run(&card, &[0xFF, 0x00, 0x00, 0x00, 0x00], CardState::new());
        assert_eq!(resp.sw(), SW::CLA_NOT_SUPPORTED);
        assert!(resp.data.is_empty());
        assert_eq!(next, CardState::new());
    }

    #[test]
    fn test_unknown_instruction() {
        let card = interpreter();
        let (resp, _) = run(&card, &[0x00, 0xFF, 0x00, 0x00, 0x00], CardState::new());
        assert_eq!(resp.sw(), SW::INS_NOT_SUPPORTED);
        assert!(resp.data.is_empty());
    }

    #[test]
    fn test_select_mf_without_data() {
        let card = interpreter();
        let (resp, next) = run(&card, &[0x00, 0xA4, 0x00, 0x00], CardState::new());
        assert!(resp.is_okay());
        assert_eq!(resp.data, MF_FCI.to_vec());
        assert_eq!(next.current(), MF_ID);
    }

    #[test]
    fn test_select_mf_by_id() {
        let card = interpreter();
        let (resp, next) = run(&card, &select(MF_ID), CardState::new());
        assert_eq!(resp.to_bytes()[..9], MF_FCI);
        assert_eq!(resp.sw(), SW::SUCCESS);
        assert_eq!(next.current(), MF_ID);
    }

    #[test]
    fn test_select_child_and_back_to_parent() {
        let card = interpreter();
        let (resp, state) = run(&card, &select(0x5000), CardState::new());
        assert!(resp.is_okay());
        assert_eq!(state.current(), 0x5000);

        let (resp, state) = run(&card, &select(0x5100), state);
        assert!(resp.is_okay());
        assert_eq!(state.current(), 0x5100);

        // ascent to the parent DF by identifier
        let (resp, state) = run(&card, &select(0x5000), state);
        assert!(resp.is_okay());
        assert_eq!(state.current(), 0x5000);
    }

    #[test]
    fn test_select_ef_then_sibling() {
        let card = interpreter();
        let (_, state) = run(&card, &select(0x5000), CardState::new());
        let (resp, state) = run(&card, &select(0x5001), state);
        assert_eq!(resp.data, vec![0x6F, 0x07, 0x82, 0x01, 0x01, 0x83, 0x02, 0x50, 0x01]);
        assert_eq!(state.current(), 0x5001);

        // with an EF selected the current DF is its parent
        let (resp, state) = run(&card, &select(0x5100), state);
        assert!(resp.is_okay());
        assert_eq!(state.current(), 0x5100);
    }

    #[test]
    fn test_select_unreachable_file() {
        let card = interpreter();
        // 0x5001 lives under 0x5000, not under the MF
        let (resp, state) = run(&card, &select(0x5001), CardState::new());
        assert_eq!(resp.sw(), SW::FILE_NOT_FOUND);
        assert!(resp.data.is_empty());
        assert_eq!(state.current(), MF_ID);

        let (resp, _) = run(&card, &select(0x1234), CardState::new());
        assert_eq!(resp.sw(), SW::FILE_NOT_FOUND);
    }

    #[test]
    fn test_select_wrong_fid_length() {
        let card = interpreter();
        let (resp, _) = run(&card, &[0x00, 0xA4, 0x00, 0x00, 0x01, 0x3F], CardState::new());
        assert_eq!(resp.sw(), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_select_parent_df() {
        let card = interpreter();
        let (_, state) = run(&card, &select(0x5000), CardState::new());
        let (resp, state) = run(&card, &[0x00, 0xA4, 0x03, 0x00], state);
        assert_eq!(resp.data, MF_FCI.to_vec());
        assert_eq!(state.current(), MF_ID);

        let (resp, state) = run(&card, &[0x00, 0xA4, 0x03, 0x00], state);
        assert_eq!(resp.sw(), SW::FILE_NOT_FOUND);
        assert_eq!(state.current(), MF_ID);
    }

    #[test]
    fn test_select_no_response_data() {
        let card = interpreter();
        let (resp, state) = run(&card, &[0x00, 0xA4, 0x00, 0x0C, 0x02, 0x50, 0x00], CardState::new());
        assert!(resp.is_okay());
        assert!(resp.data.is_empty());
        assert_eq!(state.current(), 0x5000);
    }

    #[test]
    fn test_select_unsupported_p1_p2() {
        let card = interpreter();
        let (resp, _) = run(&card, &[0x00, 0xA4, 0x04, 0x00], CardState::new());
        assert_eq!(resp.sw(), SW::INCORRECT_P1_P2);
        let (resp, _) = run(&card, &[0x00, 0xA4, 0x00, 0x04], CardState::new());
        assert_eq!(resp.sw(), SW::INCORRECT_P1_P2);
    }
}
