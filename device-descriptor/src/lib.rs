#![no_std]

use core::marker::PhantomData;

/// Backing integer of a register word.
pub trait RegisterWidthType: Copy {
    const WIDTH: u8;
    const BYTES: usize;

    fn from_32(data: u32) -> Self;
    fn to_32(self) -> u32;

    /// Assembles a value from bytes transferred least significant byte first.
    fn from_le_slice(bytes: &[u8]) -> Self {
        let value = bytes
            .iter()
            .take(Self::BYTES)
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | *byte as u32);

        Self::from_32(value)
    }
}

impl RegisterWidthType for u8 {
    const WIDTH: u8 = 8;
    const BYTES: usize = 1;

    fn from_32(data: u32) -> Self {
        debug_assert!(data <= u8::MAX as u32);
        data as u8
    }

    fn to_32(self) -> u32 {
        self as u32
    }
}

impl RegisterWidthType for u16 {
    const WIDTH: u8 = 16;
    const BYTES: usize = 2;

    fn from_32(data: u32) -> Self {
        debug_assert!(data <= u16::MAX as u32);
        data as u16
    }

    fn to_32(self) -> u32 {
        self as u32
    }
}

pub trait Proxy: Copy {
    type RegisterWidth: RegisterWidthType;

    fn bits(&self) -> Self::RegisterWidth;
    fn from_bits(bits: Self::RegisterWidth) -> Self;
}

/// A word the device returns for a command code.
pub trait Register: Proxy {
    const ADDRESS: u8;
    const NAME: &'static str;
}

/// Conversion between raw field bits and a typed field value.
pub trait FieldType: Sized {
    fn from_field_bits(bits: u32) -> Self;
    fn into_field_bits(self) -> u32;
}

impl FieldType for bool {
    fn from_field_bits(bits: u32) -> Self {
        bits != 0
    }

    fn into_field_bits(self) -> u32 {
        self as u32
    }
}

impl FieldType for u8 {
    fn from_field_bits(bits: u32) -> Self {
        bits as u8
    }

    fn into_field_bits(self) -> u32 {
        self as u32
    }
}

pub struct Field<const POS: u8, const WIDTH: u8, DataType, P> {
    _marker: PhantomData<DataType>,
    reg: P,
}

impl<const POS: u8, const WIDTH: u8, DataType, P> Field<POS, WIDTH, DataType, P>
where
    DataType: FieldType,
    P: Proxy,
{
    const MASK: u32 = (1 << WIDTH) - 1;

    pub const fn new(reg: P) -> Self {
        Field {
            _marker: PhantomData,
            reg,
        }
    }

    #[inline(always)]
    pub fn read_field_bits(&self) -> u32 {
        (self.reg.bits().to_32() >> POS as u32) & Self::MASK
    }

    #[inline(always)]
    pub fn read(&self) -> DataType {
        DataType::from_field_bits(self.read_field_bits())
    }

    /// Returns a copy of the register with this field replaced.
    #[inline(always)]
    pub fn write(self, value: DataType) -> P {
        let value = value.into_field_bits();

        // make sure value fits into field
        debug_assert!(value <= Self::MASK);

        let shifted_mask = Self::MASK << POS;
        let masked = self.reg.bits().to_32() & !shifted_mask;

        P::from_bits(<P::RegisterWidth>::from_32(
            masked | ((value & Self::MASK) << POS as u32),
        ))
    }
}

/// Implements [`FieldType`] for a fieldless enum with explicit discriminants.
#[macro_export]
macro_rules! field_type {
    ($type:ident { $($name:ident = $value:literal),+ $(,)? }) => {
        impl $crate::FieldType for $type {
            fn from_field_bits(bits: u32) -> Self {
                match bits {
                    $($value => $type::$name,)+
                    _ => unreachable!(),
                }
            }

            fn into_field_bits(self) -> u32 {
                self as u32
            }
        }
    };
}

#[macro_export]
macro_rules! register {
    (@width $pos:literal) => { 1 };
    (@width $pos:literal .. $end:literal) => { $end - $pos };

    (
        $(#[$meta:meta])*
        $reg:ident($rwt:ident @ $addr:literal) {
            $(
                $(#[$field_meta:meta])*
                $field:ident @ $pos:literal $(.. $end:literal)? => $type:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[must_use]
        pub struct $reg {
            value: $rwt,
        }

        impl $crate::Proxy for $reg {
            type RegisterWidth = $rwt;

            #[inline(always)]
            fn from_bits(bits: $rwt) -> Self {
                Self { value: bits }
            }

            #[inline(always)]
            fn bits(&self) -> $rwt {
                self.value
            }
        }

        impl $crate::Register for $reg {
            const ADDRESS: u8 = $addr;
            const NAME: &'static str = stringify!($reg);
        }

        #[cfg(feature = "ufmt-impl")]
        impl ufmt::uDebug for $reg {
            fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
            where
                W: ufmt::uWrite + ?Sized,
            {
                f.debug_tuple(stringify!($reg))?.field(&self.value)?.finish()
            }
        }

        impl $reg {
            $(
                $(#[$field_meta])*
                #[inline(always)]
                #[allow(non_snake_case)]
                pub fn $field(self) -> $crate::Field<
                    $pos,
                    { $crate::register!(@width $pos $(.. $end)?) },
                    $type,
                    Self,
                > {
                    $crate::Field::new(self)
                }
            )*
        }
    };
}

/// Declares a set of registers, see [`register!`] for the syntax of one entry.
#[macro_export]
macro_rules! device {
    (
        $(
            $(#[$meta:meta])*
            $reg:ident($($proto:tt)*) {
                $($fields:tt)*
            }
        )+
    ) => {
        $(
            $crate::register! {
                $(#[$meta])*
                $reg($($proto)*) {
                    $($fields)*
                }
            }
        )+
    };
}
