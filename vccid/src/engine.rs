//! CCID protocol engine
//!
//! Owns the slots and the card interpreter of one virtual reader and turns
//! every inbound bulk message into exactly one outbound message. Nothing in
//! here fails: framing, slot and APDU errors all become wire responses.

use log::{debug, info, warn};

use crate::apdu::{parse_apdu, Response, SW};
use crate::card::CardInterpreter;
use crate::ccid::{
    peek_addressing, status_byte, CCIDMessage, CommandStatus, FramingError, IccStatus,
    MessageType, SlotError, RDR_TO_PC_NOTIFY_SLOT_CHANGE,
};
use crate::config::{ConfigError, ReaderConfig};
use crate::slot::{Slot, SlotState, SlotStateError};
use crate::tlv::hexify;

/// bProtocolNum for T=0
const PROTOCOL_T0: u8 = 0x00;

/// abProtocolDataStructure for T=0: Fi/Di, TCCKS, guard time, WI, clock stop
const T0_PARAMETERS: [u8; 5] = [0x11, 0x00, 0x00, 0x0A, 0x00];

/// A virtual CCID reader
#[derive(Debug)]
pub struct CcidEngine {
    slots: Vec<Slot>,
    interpreter: CardInterpreter,
    atr: Vec<u8>,
    /// Control-pipe abort waiting for its bulk `Abort`
    pending_abort: Option<(u8, u8)>,
    /// Bulk `Abort` that arrived before its control request
    early_abort: Option<(u8, u8)>,
}

impl CcidEngine {
    /// Build a reader from a validated configuration
    pub fn new(config: &ReaderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let slots = config
            .slots
            .iter()
            .map(|slot| Slot::new(slot.card_present))
            .collect();
        let interpreter = CardInterpreter::new(config.build_filesystem()?);
        Ok(Self::from_parts(slots, interpreter, config.atr()))
    }

    pub fn from_parts(slots: Vec<Slot>, interpreter: CardInterpreter, atr: Vec<u8>) -> Self {
        info!("Virtual reader ready with {} slot(s)", slots.len());
        Self {
            slots,
            interpreter,
            atr,
            pending_abort: None,
            early_abort: None,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// State of a slot, `None` when it does not exist
    pub fn slot_state(&self, slot: u8) -> Option<SlotState> {
        self.slots.get(slot as usize).map(Slot::state)
    }

    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn interpreter(&self) -> &CardInterpreter {
        &self.interpreter
    }

    /// Process one raw bulk-out message and return the encoded response
    pub fn handle_inbound(&mut self, raw: &[u8]) -> Vec<u8> {
        let response = match CCIDMessage::decode(raw) {
            Ok(msg) => self.process(&msg),
            Err(e) => self.framing_failure(raw, &e),
        };
        response.encode()
    }

    /// Process one decoded message
    pub fn process(&mut self, msg: &CCIDMessage) -> CCIDMessage {
        let (slot, seq) = (msg.slot(), msg.seq());
        debug!(
            "CCID {:?} slot={} seq={} len={}",
            msg.message_type(),
            slot,
            seq,
            msg.payload().len()
        );

        if slot as usize >= self.slots.len() {
            warn!("{:?} addressed to missing slot {}", msg.message_type(), slot);
            return self.failure(slot, seq, SlotStateError::NoSuchSlot(slot).slot_error());
        }

        if msg.message_type() != MessageType::Abort
            && self.early_abort.is_some_and(|(abort_slot, _)| abort_slot == slot)
        {
            debug!("Dropping unclaimed bulk Abort on slot {}", slot);
            self.early_abort = None;
        }

        if let Some((abort_slot, abort_seq)) = self.pending_abort {
            let is_matching_abort = msg.message_type() == MessageType::Abort && seq == abort_seq;
            if abort_slot == slot && !is_matching_abort {
                warn!("{:?} rejected while slot {} is aborting", msg.message_type(), slot);
                return self.failure(slot, seq, SlotError::CMD_ABORTED);
            }
        }

        match msg.message_type() {
            MessageType::IccPowerOn => self.power_on(slot, seq),
            MessageType::IccPowerOff => {
                self.slots[slot as usize].power_off();
                self.slot_status(slot, seq)
            }
            MessageType::GetSlotStatus => self.slot_status(slot, seq),
            MessageType::GetParameters => self.get_parameters(slot, seq),
            MessageType::XfrBlock => self.xfr_block(slot, seq, msg.payload()),
            MessageType::Abort => self.abort(slot, seq),
            other => {
                warn!("Message type {:?} is not a reader command", other);
                self.failure(slot, seq, SlotError::CMD_NOT_SUPPORTED)
            }
        }
    }

    /// Record an ABORT class request received on the control pipe
    pub fn expect_abort(&mut self, slot: u8, seq: u8) {
        if self.early_abort == Some((slot, seq)) {
            self.early_abort = None;
            info!("Abort on slot {} completed (seq {})", slot, seq);
            return;
        }
        debug!("Waiting for bulk Abort on slot {} seq {}", slot, seq);
        self.pending_abort = Some((slot, seq));
    }

    /// Whether a control-pipe abort still waits for its bulk message
    pub fn abort_pending(&self) -> bool {
        self.pending_abort.is_some()
    }

    pub fn insert_card(&mut self, slot: u8) -> Result<(), SlotStateError> {
        self.slot_mut(slot)?.insert();
        Ok(())
    }

    pub fn remove_card(&mut self, slot: u8) -> Result<(), SlotStateError> {
        self.slot_mut(slot)?.remove();
        Ok(())
    }

    /// `RDR_to_PC_NotifySlotChange` for the interrupt pipe, if any slot changed
    ///
    /// Two bits per slot, slot 0 in the low bits of the first byte: bit 0 is
    /// the current presence, bit 1 is set when presence changed.
    pub fn take_slot_change(&mut self) -> Option<Vec<u8>> {
        if !self.slots.iter().any(Slot::has_changed) {
            return None;
        }

        let mut msg = vec![0u8; 1 + self.slots.len().div_ceil(4)];
        msg[0] = RDR_TO_PC_NOTIFY_SLOT_CHANGE;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let mut bits = 0u8;
            if slot.state().is_present() {
                bits |= 0b01;
            }
            if slot.take_changed() {
                bits |= 0b10;
            }
            msg[1 + i / 4] |= bits << ((i % 4) * 2);
        }
        debug!("Slot change: {}", hexify(&msg));
        Some(msg)
    }

    fn slot_mut(&mut self, slot: u8) -> Result<&mut Slot, SlotStateError> {
        self.slots
            .get_mut(slot as usize)
            .ok_or(SlotStateError::NoSuchSlot(slot))
    }

    fn icc_status(&self, slot: u8) -> IccStatus {
        self.slots
            .get(slot as usize)
            .map(|s| s.state().icc_status())
            .unwrap_or(IccStatus::NotPresent)
    }

    fn success_status(&self, slot: u8) -> u8 {
        status_byte(CommandStatus::Processed, self.icc_status(slot))
    }

    fn slot_status(&self, slot: u8, seq: u8) -> CCIDMessage {
        CCIDMessage::slot_status(slot, seq, self.success_status(slot), SlotError::NONE)
    }

    fn failure(&self, slot: u8, seq: u8, error: u8) -> CCIDMessage {
        let status = status_byte(CommandStatus::Failed, self.icc_status(slot));
        CCIDMessage::slot_status(slot, seq, status, error)
    }

    fn framing_failure(&self, raw: &[u8], err: &FramingError) -> CCIDMessage {
        warn!("Malformed CCID message ({}): {}", err, hexify(raw));
        let (slot, seq) = peek_addressing(raw);
        self.failure(slot, seq, err.slot_error())
    }

    fn power_on(&mut self, slot: u8, seq: u8) -> CCIDMessage {
        let target = &mut self.slots[slot as usize];
        match target.begin_power_on() {
            Ok(true) => target.complete_power_on(),
            Ok(false) => debug!("Slot {} already powered", slot),
            Err(e) => {
                warn!("Power on slot {} failed: {}", slot, e);
                return self.failure(slot, seq, e.slot_error());
            }
        }
        CCIDMessage::data_block(
            slot,
            seq,
            self.success_status(slot),
            SlotError::NONE,
            self.atr.clone(),
        )
    }

    fn get_parameters(&self, slot: u8, seq: u8) -> CCIDMessage {
        if !self.slots[slot as usize].state().is_present() {
            return self.failure(slot, seq, SlotStateError::CardAbsent.slot_error());
        }
        CCIDMessage::parameters(
            slot,
            seq,
            self.success_status(slot),
            SlotError::NONE,
            PROTOCOL_T0,
            T0_PARAMETERS.to_vec(),
        )
    }

    fn xfr_block(&mut self, slot: u8, seq: u8, payload: &[u8]) -> CCIDMessage {
        let card = match self.slots[slot as usize].card() {
            Ok(card) => card,
            Err(e) => {
                warn!("XfrBlock on slot {} rejected: {}", slot, e);
                return self.failure(slot, seq, e.slot_error());
            }
        };

        debug!("C-APDU: {}", hexify(payload));
        let response = match parse_apdu(payload) {
            Ok(cmd) => {
                let (response, next) = self.interpreter.process(&cmd, card);
                self.slots[slot as usize].update_card(next);
                response
            }
            Err(e) => {
                warn!("Malformed APDU: {}", e);
                Response::error(SW::WRONG_LENGTH)
            }
        };

        let rapdu = response.to_bytes();
        debug!("R-APDU: {}", hexify(&rapdu));
        CCIDMessage::data_block(slot, seq, self.success_status(slot), SlotError::NONE, rapdu)
    }

    fn abort(&mut self, slot: u8, seq: u8) -> CCIDMessage {
        if self.pending_abort == Some((slot, seq)) {
            self.pending_abort = None;
            info!("Abort on slot {} completed (seq {})", slot, seq);
        } else {
            debug!("Bulk Abort on slot {} seq {} ahead of control request", slot, seq);
            self.early_abort = Some((slot, seq));
        }
        self.slot_status(slot, seq)
    }
}
