//! Slot state machine
//!
//! Tracks card presence and power for one reader slot:
//!
//! ```text
//!  NotPresent --insert--> Present --power on--> PoweringOn --> PoweredOn
//!                                                                 |  ^
//!                                                      power off  v  | power on
//!                                                               PoweredOff
//! ```
//!
//! Removal takes any state back to `NotPresent`. The card state (current
//! file selection) exists only while the slot is `PoweredOn`.

use log::{debug, info};
use thiserror::Error;

use crate::card::CardState;
use crate::ccid::{IccStatus, SlotError};

/// Power and presence state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    NotPresent,
    /// Card inserted, never powered since insertion
    Present,
    PoweredOff,
    PoweredOn,
    /// Activation sequence in progress
    PoweringOn,
}

impl SlotState {
    /// `bmICCStatus` reported for this state
    pub fn icc_status(self) -> IccStatus {
        match self {
            SlotState::PoweredOn => IccStatus::PresentActive,
            SlotState::Present | SlotState::PoweredOff | SlotState::PoweringOn => {
                IccStatus::PresentInactive
            }
            SlotState::NotPresent => IccStatus::NotPresent,
        }
    }

    pub fn is_present(self) -> bool {
        self != SlotState::NotPresent
    }
}

/// A command that the current slot state does not allow
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SlotStateError {
    #[error("slot {0} does not exist")]
    NoSuchSlot(u8),

    #[error("no card present")]
    CardAbsent,

    #[error("card is not powered (slot state {0:?})")]
    NotPowered(SlotState),

    #[error("slot is busy powering on")]
    Busy,
}

impl SlotStateError {
    /// The `bError` value reported back to the host
    pub fn slot_error(&self) -> u8 {
        match self {
            SlotStateError::NoSuchSlot(_) => SlotError::BAD_SLOT,
            SlotStateError::CardAbsent | SlotStateError::NotPowered(_) => SlotError::ICC_MUTE,
            SlotStateError::Busy => SlotError::CMD_SLOT_BUSY,
        }
    }
}

/// One reader slot
#[derive(Debug, Clone)]
pub struct Slot {
    state: SlotState,
    card: Option<CardState>,
    changed: bool,
}

impl Slot {
    /// A slot with or without a card inserted, unpowered
    pub fn new(card_present: bool) -> Self {
        Self {
            state: if card_present {
                SlotState::Present
            } else {
                SlotState::NotPresent
            },
            card: None,
            changed: false,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Start the activation sequence
    ///
    /// Returns `Ok(false)` when the card is already powered, which leaves the
    /// slot and its card state untouched.
    pub fn begin_power_on(&mut self) -> Result<bool, SlotStateError> {
        match self.state {
            SlotState::NotPresent => Err(SlotStateError::CardAbsent),
            SlotState::PoweringOn => Err(SlotStateError::Busy),
            SlotState::PoweredOn => Ok(false),
            SlotState::Present | SlotState::PoweredOff => {
                debug!("Activating card");
                self.state = SlotState::PoweringOn;
                Ok(true)
            }
        }
    }

    /// Finish the activation sequence with a fresh card state
    pub fn complete_power_on(&mut self) {
        if self.state == SlotState::PoweringOn {
            self.state = SlotState::PoweredOn;
            self.card = Some(CardState::new());
            info!("Card powered on");
        }
    }

    /// Deactivate the card
    ///
    /// Always succeeds. An empty slot stays `NotPresent`.
    pub fn power_off(&mut self) {
        self.card = None;
        if self.state != SlotState::NotPresent && self.state != SlotState::PoweredOff {
            self.state = SlotState::PoweredOff;
            info!("Card powered off");
        }
    }

    /// Card state of a powered card, or why there is none
    pub fn card(&self) -> Result<CardState, SlotStateError> {
        match (self.state, self.card) {
            (SlotState::PoweredOn, Some(card)) => Ok(card),
            (SlotState::NotPresent, _) => Err(SlotStateError::CardAbsent),
            (SlotState::PoweringOn, _) => Err(SlotStateError::Busy),
            (state, _) => Err(SlotStateError::NotPowered(state)),
        }
    }

    /// Store the card state returned by the interpreter
    pub fn update_card(&mut self, card: CardState) {
        if self.state == SlotState::PoweredOn {
            self.card = Some(card);
        }
    }

    /// Card inserted; returns whether anything changed
    pub fn insert(&mut self) -> bool {
        if self.state.is_present() {
            return false;
        }
        self.state = SlotState::Present;
        self.changed = true;
        info!("Card inserted");
        true
    }

    /// Card removed; returns whether anything changed
    pub fn remove(&mut self) -> bool {
        if !self.state.is_present() {
            return false;
        }
        self.state = SlotState::NotPresent;
        self.card = None;
        self.changed = true;
        info!("Card removed");
        true
    }

    /// Whether presence changed since the last call
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::APDU;
    use crate::card::{CardInterpreter, FileSystem, MF_ID};

    fn powered() -> Slot {
        let mut slot = Slot::new(true);
        assert_eq!(slot.begin_power_on(), Ok(true));
        slot.complete_power_on();
        slot
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(Slot::new(true).state(), SlotState::Present);
        assert_eq!(Slot::new(false).state(), SlotState::NotPresent);
    }

    #[test]
    fn test_power_on() {
        let slot = powered();
        assert_eq!(slot.state(), SlotState::PoweredOn);
        assert_eq!(slot.card().unwrap().current(), MF_ID);
    }

    #[test]
    fn test_power_on_is_idempotent() {
        let mut slot = powered();
        assert_eq!(slot.begin_power_on(), Ok(false));
        assert_eq!(slot.state(), SlotState::PoweredOn);
    }

    #[test]
    fn test_power_on_absent_card() {
        let mut slot = Slot::new(false);
        assert_eq!(slot.begin_power_on(), Err(SlotStateError::CardAbsent));
        assert_eq!(slot.state(), SlotState::NotPresent);
    }

    #[test]
    fn test_powering_on_is_busy() {
        let mut slot = Slot::new(true);
        slot.begin_power_on().unwrap();
        assert_eq!(slot.state(), SlotState::PoweringOn);
        assert_eq!(slot.card(), Err(SlotStateError::Busy));
        assert_eq!(slot.begin_power_on(), Err(SlotStateError::Busy));
    }

    #[test]
    fn test_power_off_twice() {
        let mut slot = powered();
        slot.power_off();
        assert_eq!(slot.state(), SlotState::PoweredOff);
        slot.power_off();
        assert_eq!(slot.state(), SlotState::PoweredOff);
        assert_eq!(slot.card(), Err(SlotStateError::NotPowered(SlotState::PoweredOff)));
    }

    #[test]
    fn test_power_cycle_resets_selection() {
        let mut fs = FileSystem::new();
        fs.add_df(MF_ID, 0x5000).unwrap();
        let interpreter = CardInterpreter::new(fs);

        let mut slot = powered();
        let select = APDU::with_data(0x00, 0xA4, 0x00, 0x00, vec![0x50, 0x00]);
        let (_, card) = interpreter.process(&select, slot.card().unwrap());
        slot.update_card(card);
        assert_eq!(slot.card().unwrap().current(), 0x5000);

        slot.power_off();
        slot.begin_power_on().unwrap();
        slot.complete_power_on();
        assert_eq!(slot.card().unwrap(), CardState::new());
    }

    #[test]
    fn test_unpowered_card_is_gated() {
        let slot = Slot::new(true);
        assert_eq!(slot.card(), Err(SlotStateError::NotPowered(SlotState::Present)));
        assert_eq!(Slot::new(false).card(), Err(SlotStateError::CardAbsent));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut slot = Slot::new(false);
        assert!(slot.insert());
        assert!(!slot.insert());
        assert!(slot.take_changed());
        assert!(!slot.take_changed());

        slot.begin_power_on().unwrap();
        slot.complete_power_on();
        assert!(slot.remove());
        assert_eq!(slot.state(), SlotState::NotPresent);
        assert_eq!(slot.card(), Err(SlotStateError::CardAbsent));
        assert!(slot.has_changed());
    }

    #[test]
    fn test_icc_status() {
        assert_eq!(SlotState::PoweredOn.icc_status(), IccStatus::PresentActive);
        assert_eq!(SlotState::Present.icc_status(), IccStatus::PresentInactive);
        assert_eq!(SlotState::PoweredOff.icc_status(), IccStatus::PresentInactive);
        assert_eq!(SlotState::NotPresent.icc_status(), IccStatus::NotPresent);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SlotStateError::NoSuchSlot(3).slot_error(), 0x05);
        assert_eq!(SlotStateError::CardAbsent.slot_error(), 0xFE);
        assert_eq!(SlotStateError::Busy.slot_error(), 0xE0);
    }
}
