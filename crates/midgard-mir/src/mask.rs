//! Component masks and byte masks.
//!
//! Registers are 128 bits wide, viewed as 16, 8, 4 or 2 lanes depending on
//! the element size. Instructions carry *component* masks (one bit per lane
//! at their size); liveness and interference work on *byte* masks (one bit
//! per byte of the register), so that two temporaries packed into different
//! halves of the same register are never treated as conflicting.

/// Element size of an operation, in bits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Size {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl Size {
    pub fn bytes(self) -> u32 {
        match self {
            Size::Bits8 => 1,
            Size::Bits16 => 2,
            Size::Bits32 => 4,
            Size::Bits64 => 8,
        }
    }

    /// Number of lanes of this size in a 128-bit register.
    pub fn lanes(self) -> u32 {
        16 / self.bytes()
    }
}

/// Expand a component mask into a byte mask over the 16 bytes of a register.
pub fn to_bytemask(mask: u16, size: Size) -> u16 {
    let bytes = size.bytes();
    let lane_bits = (1u32 << bytes) - 1;

    let mut out = 0u32;
    for lane in 0..size.lanes() {
        if mask & (1 << lane) != 0 {
            out |= lane_bits << (lane * bytes);
        }
    }

    out as u16
}

/// Contract a byte mask back into a component mask, rounding up: a component
/// with any live byte is considered live.
pub fn from_bytemask(bytemask: u16, size: Size) -> u16 {
    let bytes = size.bytes();
    let lane_bits = ((1u32 << bytes) - 1) as u16;

    let mut out = 0u16;
    for lane in 0..size.lanes() {
        if bytemask & (lane_bits << (lane * bytes)) != 0 {
            out |= 1 << lane;
        }
    }

    out
}

/// The identity swizzle, selecting lane `i` of the source for lane `i` of
/// the destination.
pub fn identity_swizzle() -> [u8; 16] {
    let mut swizzle = [0; 16];
    for (lane, entry) in swizzle.iter_mut().enumerate() {
        *entry = lane as u8;
    }
    swizzle
}

/// Byte mask of the source lanes selected by `swizzle` for the lanes set in
/// `mask`. This is what an instruction actually reads of a source register.
pub fn bytemask_of_swizzled(mask: u16, swizzle: &[u8; 16], size: Size) -> u16 {
    let bytes = size.bytes();
    let lane_bits = (1u32 << bytes) - 1;

    let mut out = 0u32;
    for lane in 0..size.lanes() {
        if mask & (1 << lane) != 0 {
            let src_lane = swizzle[lane as usize] as u32;
            debug_assert!(src_lane < size.lanes());
            out |= lane_bits << (src_lane * bytes);
        }
    }

    out as u16
}
