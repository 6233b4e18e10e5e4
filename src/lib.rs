#![cfg_attr(not(test), no_std)]

//! Driver for the TI BQ27621 fuel gauge.
//!
//! Besides the standard commands, the driver gives access to the gauge's extended data
//! memory: 32-byte blocks of configuration grouped into data classes, protected by a block
//! checksum and by the SEALED access mode.

#[macro_use]
extern crate logger;

use embedded_hal::{delay::DelayNs, i2c::I2c};

pub mod block;
pub mod descriptors;
pub mod extended;
pub mod ll;
pub mod security;
pub mod standard;
pub mod word;


pub use block::{compute_checksum, BlockSelection, DataClass, BLOCK_SIZE};
pub use extended::Field;
pub use security::SecurityState;
pub use standard::{CapacityMeasure, Command, SocMeasure, Subcommand, TempMeasure};

use block::BlockBuffer;
use ll::Bq27621I2cInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus transaction failed.
    Bus(E),

    /// A block operation was attempted before selecting a block.
    NoBlockSelected,

    /// The selected block was modified or committed before it was read.
    BlockNotLoaded,

    /// In-block offset is not smaller than the block size.
    OffsetOutOfRange,

    /// The requested range spans two blocks.
    FieldCrossesBlockBoundary,

    /// The value does not have the length of the field it is written to.
    LengthMismatch,

    /// The checksum read back after a commit differs from the one written. The block has to be
    /// selected and read again before retrying.
    ChecksumVerificationFailed { expected: u8, actual: u8 },

    /// The device on the bus is not a BQ27621.
    IncorrectDeviceType(u16),

    /// The device is sealed and the driver is not allowed to (or could not) unseal it.
    Sealed,

    /// The gauge did not report the expected CONFIG UPDATE state in time.
    ConfigUpdateTimeout,
}

/// What to do with the access mode after a data memory write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResealPolicy {
    /// Leave the device unsealed.
    Never,

    /// Seal the device again if it was sealed before the write.
    #[default]
    RestorePrevious,

    /// Seal the device after every write.
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Unseal a sealed device before writing data memory.
    pub auto_unseal: bool,

    pub reseal: ResealPolicy,

    /// Wrap data memory writes in CONFIG UPDATE mode.
    pub config_update: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_unseal: true,
            reseal: ResealPolicy::RestorePrevious,
            config_update: false,
        }
    }
}

/// A BQ27621 on a command transport.
///
/// The driver keeps the staged data memory block and the last known access mode of one
/// device, callers sharing a gauge must serialize access to the driver.
pub struct Bq27621<B> {
    bus: B,
    config: Config,
    security: SecurityState,
    block: BlockBuffer,
}

impl<B> Bq27621<B> {
    pub const fn new(bus: B, config: Config) -> Self {
        Self {
            bus,
            config,
            security: SecurityState::Sealed,
            block: BlockBuffer::new(),
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    pub fn inner_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<I, D> Bq27621<Bq27621I2cInterface<I, D>>
where
    I: I2c,
    D: DelayNs,
{
    /// Creates a driver for a gauge at the default address with default bus timing.
    pub fn new_i2c(i2c: I, delay: D, config: Config) -> Self {
        Self::new(Bq27621I2cInterface::new(i2c, delay), config)
    }
}
