#![no_std]

use device_descriptor::{Register, RegisterWidthType};

/// Byte-level access to a device that exposes its state behind one-byte command codes.
///
/// Implementations are bound to a single device address. Every call is one complete
/// bus transaction.
pub trait CommandAccess {
    type Error;

    /// Reads `buffer.len()` bytes starting at `command`.
    fn read_command(&mut self, command: u8, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `bytes` starting at `command`.
    fn write_command(&mut self, command: u8, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Gives the device time to process the previous write before it is read back.
    fn settle(&mut self) {}

    fn read_register<R>(&mut self) -> Result<R, Self::Error>
    where
        R: Register,
    {
        let mut buffer = [0; 4];
        let buffer = &mut buffer[..<R::RegisterWidth>::BYTES];

        self.read_command(R::ADDRESS, buffer)?;

        Ok(R::from_bits(<R::RegisterWidth>::from_le_slice(buffer)))
    }
}

impl<T> CommandAccess for &mut T
where
    T: CommandAccess,
{
    type Error = T::Error;

    fn read_command(&mut self, command: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        T::read_command(self, command, buffer)
    }

    fn write_command(&mut self, command: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_command(self, command, bytes)
    }

    fn settle(&mut self) {
        T::settle(self)
    }
}

pub trait RegisterReader: Sized {
    fn read<E>(iface: &mut impl CommandAccess<Error = E>) -> Result<Self, E>;
}

impl<T> RegisterReader for T
where
    T: Register,
{
    fn read<E>(iface: &mut impl CommandAccess<Error = E>) -> Result<Self, E> {
        iface.read_register()
    }
}
