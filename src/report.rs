//! Boot-keyboard report parsing and diffing
//!
//! The wired interface emits standard 8-byte boot reports:
//! `[modifiers, reserved, slot0..slot5]`. Each report is a full snapshot
//! of the pressed-key set, so key events are recovered by diffing
//! consecutive reports. Modifier bits are folded into the usage
//! namespace (0xE0-0xE7) and diffed together with the six slots.

use evdev::Key;

use crate::keymap;

/// Fixed boot-keyboard report length
pub const REPORT_LEN: usize = 8;

/// Number of simultaneous key slots in a boot report
const SLOT_COUNT: usize = 6;

/// Parsed boot-keyboard report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootReport {
    modifiers: u8,
    slots: [u8; SLOT_COUNT],
}

impl BootReport {
    /// Parse a raw HID report. Reports shorter than 8 bytes are
    /// malformed and rejected; longer reads keep the leading 8 bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < REPORT_LEN {
            return None;
        }
        let mut slots = [0u8; SLOT_COUNT];
        slots.copy_from_slice(&data[2..2 + SLOT_COUNT]);
        Some(Self {
            modifiers: data[0],
            slots,
        })
    }

    /// All-zero report, the baseline at the start of each session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a usage ID is asserted in this report.
    ///
    /// Usage 0 marks an empty slot and is never asserted.
    fn is_asserted(&self, usage: u8) -> bool {
        if usage == 0 {
            return false;
        }
        if usage.wrapping_sub(keymap::MODIFIER_BASE) < 8
            && self.modifiers >> (usage - keymap::MODIFIER_BASE) & 1 != 0
        {
            return true;
        }
        self.slots.contains(&usage)
    }

    /// Asserted usage IDs in ascending order.
    fn asserted(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.slots.iter().copied().filter(|&u| u != 0).collect();
        for bit in 0..8 {
            if self.modifiers >> bit & 1 != 0 {
                ids.push(keymap::MODIFIER_BASE + bit);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Key transition direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

/// A single key press or release derived from a report diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTransition {
    pub key: Key,
    pub direction: Direction,
}

impl KeyTransition {
    pub fn down(key: Key) -> Self {
        Self {
            key,
            direction: Direction::Down,
        }
    }

    pub fn up(key: Key) -> Self {
        Self {
            key,
            direction: Direction::Up,
        }
    }
}

/// Compute the transitions that reconcile `prev` with `curr`.
///
/// Releases are emitted before presses (matters for rollover when a key
/// is swapped within one report), each group in ascending usage order.
/// Usages without a keymap entry are skipped.
pub fn diff(prev: &BootReport, curr: &BootReport) -> Vec<KeyTransition> {
    let mut transitions = Vec::new();

    for usage in prev.asserted() {
        if !curr.is_asserted(usage) {
            if let Some(key) = keymap::lookup(usage) {
                transitions.push(KeyTransition::up(key));
            }
        }
    }

    for usage in curr.asserted() {
        if !prev.is_asserted(usage) {
            if let Some(key) = keymap::lookup(usage) {
                transitions.push(KeyTransition::down(key));
            }
        }
    }

    transitions
}

/// Transitions that release everything still held in `report`.
///
/// Used when the device disappears mid-session so no key stays stuck
/// down from the desktop's point of view.
pub fn release_all(report: &BootReport) -> Vec<KeyTransition> {
    diff(report, &BootReport::empty())
}
