use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, Operation},
};
use register_access::CommandAccess;

/// Bus timing of the gauge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Minimum idle time after every transaction, in μs.
    pub turnaround_us: u32,

    /// Time the device is given to process a write before it is verified, in ms.
    pub settle_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            turnaround_us: 66,
            settle_ms: 1,
        }
    }
}

pub struct Bq27621I2cInterface<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    timing: Timing,
}

impl<I, D> Bq27621I2cInterface<I, D> {
    pub const DEFAULT_ADDRESS: u8 = 0x55;

    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            address: Self::DEFAULT_ADDRESS,
            timing: Timing::default(),
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn inner_mut(&mut self) -> &mut I {
        &mut self.i2c
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I, D> Bq27621I2cInterface<I, D>
where
    D: DelayNs,
{
    fn turnaround(&mut self) {
        if self.timing.turnaround_us > 0 {
            self.delay.delay_us(self.timing.turnaround_us);
        }
    }
}

impl<I, D> CommandAccess for Bq27621I2cInterface<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = I::Error;

    fn read_command(&mut self, command: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        let result = self.i2c.write_read(self.address, &[command], buffer);
        self.turnaround();
        result
    }

    fn write_command(&mut self, command: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        let result = self.i2c.transaction(
            self.address,
            &mut [Operation::Write(&[command]), Operation::Write(bytes)],
        );
        self.turnaround();
        result
    }

    fn settle(&mut self) {
        if self.timing.settle_ms > 0 {
            self.delay.delay_ms(self.timing.settle_ms);
        }
    }
}
