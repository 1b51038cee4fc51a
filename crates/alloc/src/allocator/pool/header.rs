//! In-place block headers and block geometry
//!
//! # Memory Layout
//! ```text
//! slot i:  [BlockHeader .. pad][payload: block_size][canary?][pad]
//!          ^ slot start        ^ slot start + header_pad
//!          <------------------- stride ------------------------->
//! ```
//! The last header field is the leading canary, so it sits directly in
//! front of the payload when `header_pad == HEADER_SIZE`.

use crate::core::align_up;

/// Header magic of a block handed out to a caller
pub const MAGIC_IN_USE: u32 = 0xDEAD_BEEF;
/// Header magic of a block on the free list
pub const MAGIC_FREE: u32 = 0xFEED_FACE;
/// Leading and trailing canary value
pub const CANARY: u32 = 0x00C0_FFEE;

const CANARY_SIZE: usize = core::mem::size_of::<u32>();

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BlockHeader {
    pub(super) allocation_id: u64,
    pub(super) requested_size: usize,
    pub(super) magic: u32,
    pub(super) chunk_id: u32,
    pub(super) index: u32,
    pub(super) canary: u32,
}

impl BlockHeader {
    pub(super) fn free(chunk_id: u32, index: u32) -> Self {
        Self {
            allocation_id: 0,
            requested_size: 0,
            magic: MAGIC_FREE,
            chunk_id,
            index,
            canary: CANARY,
        }
    }
}

pub(super) const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();

/// Geometry shared by every chunk of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct BlockLayout {
    pub(super) block_size: usize,
    pub(super) alignment: usize,
    pub(super) header_pad: usize,
    pub(super) stride: usize,
    pub(super) trailing_canary: bool,
}

impl BlockLayout {
    pub(super) fn new(block_size: usize, alignment: usize, trailing_canary: bool) -> Self {
        let header_pad = align_up(HEADER_SIZE, alignment);
        let tail = if trailing_canary { CANARY_SIZE } else { 0 };
        let stride = align_up(header_pad + block_size + tail, alignment);
        Self {
            block_size,
            alignment,
            header_pad,
            stride,
            trailing_canary,
        }
    }

    /// Offset of slot `index` from the chunk start
    pub(super) fn slot_offset(&self, index: usize) -> usize {
        index * self.stride
    }

    /// Offset of the payload of slot `index` from the chunk start
    pub(super) fn payload_offset(&self, index: usize) -> usize {
        self.slot_offset(index) + self.header_pad
    }

    /// Offset of the trailing canary of slot `index` from the chunk start
    pub(super) fn canary_offset(&self, index: usize) -> usize {
        self.payload_offset(index) + self.block_size
    }

    /// Slot index for a payload offset, if it is a payload boundary
    pub(super) fn index_of(&self, payload_offset: usize) -> Option<usize> {
        let slot = payload_offset.checked_sub(self.header_pad)?;
        (slot % self.stride == 0).then_some(slot / self.stride)
    }

    /// Bytes of bookkeeping and padding per block
    pub(super) fn overhead(&self) -> usize {
        self.stride - self.block_size
    }
}
