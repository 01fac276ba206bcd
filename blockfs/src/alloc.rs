use crate::error::{FsError, Result};
use crate::io::BlockNumber;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// Tracks the state of every block on a device, index `i` mapping to block `i`.
/// The length is fixed when the bitmap is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    states: Vec<State>,
}

impl Bitmap {
    /// Creates a bitmap of `blocks` entries, all free.
    pub fn new(blocks: usize) -> Self {
        Self {
            states: vec![State::Free; blocks],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, blocknr: BlockNumber) -> Result<State> {
        self.states
            .get(blocknr)
            .copied()
            .ok_or(FsError::OutOfRange(blocknr))
    }

    pub fn set_reserved(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.set(blocknr, State::Used)
    }

    pub fn set_free(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.set(blocknr, State::Free)
    }

    fn set(&mut self, blocknr: BlockNumber, state: State) -> Result<()> {
        let slot = self
            .states
            .get_mut(blocknr)
            .ok_or(FsError::OutOfRange(blocknr))?;
        *slot = state;
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.states.iter().filter(|s| **s == State::Free).count()
    }

    /// Block numbers currently in use, in ascending order.
    pub fn used(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == State::Used)
            .map(|(i, _)| i)
    }

    /// Implements a naive allocation policy: the lowest free block number always
    /// wins. Allocation is a linear scan, which keeps results deterministic.
    ///
    /// ## Other Pre-Allocation Policies
    ///
    /// 1. Finding enough contiguous free blocks for a whole file so its data sits
    ///    close together.
    /// 2. Spreading allocations over the device to even out wear on the front blocks.
    pub fn next_available(&self) -> Option<BlockNumber> {
        self.states.iter().position(|s| *s == State::Free)
    }

    /// Encodes the bitmap as one byte per block, `1` for free and `0` for used.
    pub fn serialize(&self) -> Vec<u8> {
        self.states
            .iter()
            .map(|s| match s {
                State::Free => 1,
                State::Used => 0,
            })
            .collect()
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        let states = buf
            .iter()
            .enumerate()
            .map(|(i, byte)| match byte {
                1 => Ok(State::Free),
                0 => Ok(State::Used),
                other => Err(FsError::CorruptImage(format!(
                    "bitmap entry {} has invalid value {}",
                    i, other
                ))),
            })
            .collect::<Result<Vec<State>>>()?;
        Ok(Self { states })
    }
}
