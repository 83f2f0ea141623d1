//! The restore state as copied into scratch memory for the hand-off.
//!
//! Once the process is gone the replay routine only has the address of
//! this image. It holds the bank table and the location of every staged
//! register chunk; the payloads themselves stay where pass 2 put them.
//!
//! ```text
//! 3 x bank  { target u32, required u32, flags u32, staged u32, payload_len u32 }
//! 21 x slot { addr u32, len u32 }
//! ```
//!
//! A zero staged address marks an absent bank or slot; address 0 holds
//! the exception vectors and is never handed out by the allocator.

use stateload_core::ChipBus;

use crate::state::{BankKind, RestoreState, SLOT_COUNT, Slot, Staged};

const BANK_RECORD: u32 = 20;
const SLOT_RECORD: u32 = 8;

/// Encoded size.
pub const IMAGE_LEN: u32 = 3 * BANK_RECORD + SLOT_COUNT as u32 * SLOT_RECORD;

/// A bank image waiting in scratch memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankImage {
    pub target: u32,
    pub required: u32,
    pub flags: u32,
    /// Address of the staged chunk, header included.
    pub staged: u32,
    pub payload_len: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateImage {
    pub banks: [Option<BankImage>; 3],
    pub slots: [Option<Staged>; SLOT_COUNT],
}

impl StateImage {
    /// The parts of `state` the replay needs.
    #[must_use]
    pub fn capture(state: &RestoreState) -> Self {
        let mut image = Self::default();
        for kind in BankKind::ALL {
            let bank = state.bank(kind);
            image.banks[kind.index()] = bank.staged.map(|staged| BankImage {
                target: kind.base(),
                required: bank.required,
                flags: bank.flags,
                staged,
                payload_len: bank.payload_len,
            });
        }
        image.slots = state.slots;
        image
    }

    #[must_use]
    pub fn bank(&self, kind: BankKind) -> Option<&BankImage> {
        self.banks[kind.index()].as_ref()
    }

    #[must_use]
    pub fn slot(&self, slot: Slot) -> Option<Staged> {
        self.slots[slot.index()]
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IMAGE_LEN as usize);
        for bank in &self.banks {
            let b = bank.unwrap_or(BankImage {
                target: 0,
                required: 0,
                flags: 0,
                staged: 0,
                payload_len: 0,
            });
            for field in [b.target, b.required, b.flags, b.staged, b.payload_len] {
                out.extend_from_slice(&field.to_be_bytes());
            }
        }
        for slot in &self.slots {
            let (addr, len) = slot.map_or((0, 0), |s| (s.addr, s.len));
            out.extend_from_slice(&addr.to_be_bytes());
            out.extend_from_slice(&len.to_be_bytes());
        }
        out
    }

    /// Decode the image at `addr` straight off the bus.
    pub fn read_from(bus: &mut dyn ChipBus, addr: u32) -> Self {
        let mut long = |offset: u32| {
            let mut b = [0u8; 4];
            bus.read_block(addr + offset, &mut b);
            u32::from_be_bytes(b)
        };
        let mut image = Self::default();
        for i in 0..3u32 {
            let at = i * BANK_RECORD;
            let staged = long(at + 12);
            if staged != 0 {
                image.banks[i as usize] = Some(BankImage {
                    target: long(at),
                    required: long(at + 4),
                    flags: long(at + 8),
                    staged,
                    payload_len: long(at + 16),
                });
            }
        }
        for i in 0..SLOT_COUNT as u32 {
            let at = 3 * BANK_RECORD + i * SLOT_RECORD;
            let slot_addr = long(at);
            if slot_addr != 0 {
                image.slots[i as usize] = Some(Staged {
                    addr: slot_addr,
                    len: long(at + 4),
                });
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryBank;

    /// Flat RAM from address 0.
    struct Ram(Vec<u8>);

    impl ChipBus for Ram {
        fn read_byte(&mut self, addr: u32) -> u8 {
            self.0[addr as usize]
        }
        fn write_byte(&mut self, addr: u32, value: u8) {
            self.0[addr as usize] = value;
        }
    }

    #[test]
    fn image_survives_the_bus() {
        let mut state = RestoreState::new();
        *state.bank_mut(BankKind::Slow) = MemoryBank {
            offset: 100,
            payload_len: 0x1234,
            flags: 1,
            required: 0x8_0000,
            capacity: 0x8_0000,
            staged: Some(0x0020_1000),
        };
        state.set_slot(Slot::Spr(3), Staged { addr: 0x40, len: 8 });
        let image = StateImage::capture(&state);
        assert_eq!(image.bank(BankKind::Chip), None);

        let bytes = image.encode();
        assert_eq!(bytes.len(), IMAGE_LEN as usize);
        let mut ram = Ram(vec![0; 0x1000]);
        ram.write_block(0x100, &bytes);
        let back = StateImage::read_from(&mut ram, 0x100);
        assert_eq!(back, image);
        let slow = back.bank(BankKind::Slow).expect("slow");
        assert_eq!(slow.target, 0xC0_0000);
        assert_eq!(slow.payload_len, 0x1234);
    }

    #[test]
    fn unstaged_bank_is_left_out() {
        let mut state = RestoreState::new();
        state.bank_mut(BankKind::Fast).required = 0x10_0000;
        assert_eq!(StateImage::capture(&state).bank(BankKind::Fast), None);
    }
}
