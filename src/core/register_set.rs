//! General-purpose register usage tracking.
//!
//! A bit set over the 16-entry x86-64 GP register file. The lowering context
//! uses it to record which registers currently hold live values, so the ABI
//! setup knows what to preserve around a call and the allocator knows what is
//! free to hand out.

/// Number of general-purpose registers in the x86-64 file.
pub const GP_REGISTER_COUNT: u8 = 16;

/// Bit set for efficiently tracking register usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSet {
    bits: u16,
}

impl RegisterSet {
    /// Create an empty register set.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Create a set from an explicit bit mask (bit N = register index N).
    pub const fn from_mask(bits: u16) -> Self {
        Self { bits }
    }

    /// Check if a register index is set.
    pub fn contains(&self, index: u8) -> bool {
        index < GP_REGISTER_COUNT && (self.bits & (1 << index)) != 0
    }

    /// Mark a register index.
    pub fn set(&mut self, index: u8) {
        if index < GP_REGISTER_COUNT {
            self.bits |= 1 << index;
        }
    }

    /// Clear a register index.
    pub fn clear(&mut self, index: u8) {
        if index < GP_REGISTER_COUNT {
            self.bits &= !(1 << index);
        }
    }

    /// Find the lowest register index that is neither set here nor excluded.
    pub fn find_first_free(&self, exclude: RegisterSet) -> Option<u8> {
        let available = !(self.bits | exclude.bits) & ((1u32 << GP_REGISTER_COUNT) - 1) as u16;
        if available == 0 {
            return None;
        }
        Some(available.trailing_zeros() as u8)
    }

    /// Number of registers currently set.
    pub fn count(&self) -> u32 {
        self.bits.count_ones()
    }

    /// Clear all registers.
    pub fn clear_all(&mut self) {
        self.bits = 0;
    }
}
