//! Block access to the extended data memory.
//!
//! The gauge maps one 32-byte block of a data class to commands 0x40..0x5F at a time. A
//! block is modified by staging the new contents locally, writing them back in one piece and
//! then writing the block checksum, which makes the gauge accept the new data.

use register_access::CommandAccess;

use crate::{Bq27621, Error};

pub const BLOCK_SIZE: usize = 32;

const BLOCK_DATA_CLASS: u8 = 0x3E;
const BLOCK_DATA_BLOCK: u8 = 0x3F;
const BLOCK_DATA: u8 = 0x40;
const BLOCK_DATA_CHECKSUM: u8 = 0x60;
const BLOCK_DATA_CONTROL: u8 = 0x61;

/// Identifier of a data class in the extended data memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataClass(u8);

impl DataClass {
    // Configuration
    pub const SAFETY: Self = Self(2);
    pub const CHARGE_TERMINATION: Self = Self(36);
    pub const DATA: Self = Self(48);
    pub const DISCHARGE: Self = Self(49);
    pub const REGISTERS: Self = Self(64);
    pub const POWER: Self = Self(68);

    // Gas gauging
    pub const IT_CFG: Self = Self(80);
    pub const CURRENT_THRESHOLDS: Self = Self(81);
    pub const STATE: Self = Self(82);

    // Ra tables
    pub const RA_RAM: Self = Self(89);

    // Security
    pub const CODES: Self = Self(112);

    pub const MAX_ID: u8 = 127;

    pub const fn new(id: u8) -> Option<Self> {
        if id <= Self::MAX_ID {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn id(self) -> u8 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockSelection {
    pub class: DataClass,
    pub index: u8,
}

/// Computes the block checksum: 255 minus the sum of all bytes, modulo 256.
pub fn compute_checksum(block: &[u8; BLOCK_SIZE]) -> u8 {
    let sum = block.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    255 - sum
}

/// Returns the block index and the in-block offset of `len` bytes at `offset`, or `None` if
/// the range does not fit in one block.
pub(crate) fn locate(offset: u8, len: usize) -> Option<(u8, usize)> {
    let index = offset / BLOCK_SIZE as u8;
    let start = offset as usize % BLOCK_SIZE;

    let end = start.checked_add(len)?;

    (end <= BLOCK_SIZE).then_some((index, start))
}

pub(crate) struct BlockBuffer {
    selected: Option<BlockSelection>,
    loaded: bool,
    dirty: bool,
    data: [u8; BLOCK_SIZE],
}

impl BlockBuffer {
    pub const fn new() -> Self {
        Self {
            selected: None,
            loaded: false,
            dirty: false,
            data: [0; BLOCK_SIZE],
        }
    }

    /// Forgets the selection and the staged data. Returns the selection if it had
    /// uncommitted changes.
    fn invalidate(&mut self) -> Option<BlockSelection> {
        let discarded = self.selected.filter(|_| self.dirty);

        self.selected = None;
        self.loaded = false;
        self.dirty = false;

        discarded
    }

    fn loaded<E>(&self) -> Result<BlockSelection, Error<E>> {
        let selection = self.selected.ok_or(Error::NoBlockSelected)?;

        if !self.loaded {
            return Err(Error::BlockNotLoaded);
        }

        Ok(selection)
    }
}

impl<B> Bq27621<B> {
    pub fn selected_block(&self) -> Option<BlockSelection> {
        self.block.selected
    }

    /// Returns whether the staged block has changes that were not committed yet.
    pub fn has_pending_changes(&self) -> bool {
        self.block.dirty
    }

    /// Returns the staged block, if the selected block was read.
    pub fn staged_block(&self) -> Option<&[u8; BLOCK_SIZE]> {
        self.block.loaded.then_some(&self.block.data)
    }
}

impl<B> Bq27621<B>
where
    B: CommandAccess,
{
    /// Makes `index` of `class` the block mapped to the block data commands.
    ///
    /// Any staged data is dropped, including changes that were not committed.
    pub fn select_block(&mut self, class: DataClass, index: u8) -> Result<(), Error<B::Error>> {
        if let Some(discarded) = self.block.invalidate() {
            warn!(
                "Discarding uncommitted changes to class {} block {}",
                discarded.class.id(),
                discarded.index
            );
        }

        self.bus
            .write_command(BLOCK_DATA_CONTROL, &[0x00])
            .map_err(Error::Bus)?;
        self.bus
            .write_command(BLOCK_DATA_CLASS, &[class.id()])
            .map_err(Error::Bus)?;
        self.bus
            .write_command(BLOCK_DATA_BLOCK, &[index])
            .map_err(Error::Bus)?;

        trace!("Selected class {} block {}", class.id(), index);
        self.block.selected = Some(BlockSelection { class, index });

        Ok(())
    }

    /// Reads the selected block into the staging buffer and returns a copy of it.
    pub fn read_block(&mut self) -> Result<[u8; BLOCK_SIZE], Error<B::Error>> {
        if self.block.selected.is_none() {
            return Err(Error::NoBlockSelected);
        }

        let mut data = [0; BLOCK_SIZE];
        self.bus
            .read_command(BLOCK_DATA, &mut data)
            .map_err(Error::Bus)?;

        self.block.data = data;
        self.block.loaded = true;
        self.block.dirty = false;

        Ok(data)
    }

    /// Changes one byte of the staged block. Nothing is sent to the device until
    /// [`Self::commit`].
    pub fn write_byte(&mut self, offset: u8, value: u8) -> Result<(), Error<B::Error>> {
        let offset = offset as usize;
        if offset >= BLOCK_SIZE {
            return Err(Error::OffsetOutOfRange);
        }

        self.block.loaded::<B::Error>()?;

        self.block.data[offset] = value;
        self.block.dirty = true;

        Ok(())
    }

    /// Writes the staged block and its checksum to the device and verifies the checksum the
    /// device reports afterwards.
    ///
    /// The device must be unsealed. On failure the selection is dropped.
    pub fn commit(&mut self) -> Result<(), Error<B::Error>> {
        let selection = self.block.loaded::<B::Error>()?;
        let checksum = compute_checksum(&self.block.data);

        let readback = match self.write_staged_block(checksum) {
            Ok(readback) => readback,
            Err(e) => {
                self.block.invalidate();
                return Err(Error::Bus(e));
            }
        };

        if readback != checksum {
            error!(
                "Checksum mismatch on class {} block {}: wrote {}, read {}",
                selection.class.id(),
                selection.index,
                checksum,
                readback
            );
            self.block.invalidate();
            return Err(Error::ChecksumVerificationFailed {
                expected: checksum,
                actual: readback,
            });
        }

        debug!(
            "Committed class {} block {}",
            selection.class.id(),
            selection.index
        );
        self.block.dirty = false;

        Ok(())
    }

    fn write_staged_block(&mut self, checksum: u8) -> Result<u8, B::Error> {
        self.bus.write_command(BLOCK_DATA, &self.block.data)?;
        self.bus.write_command(BLOCK_DATA_CHECKSUM, &[checksum])?;

        self.bus.settle();

        let mut readback = [0];
        self.bus.read_command(BLOCK_DATA_CHECKSUM, &mut readback)?;

        Ok(readback[0])
    }
}
