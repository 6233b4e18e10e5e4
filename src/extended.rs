//! Field-level access to the extended data memory.
//!
//! Offsets are relative to the start of the data class. A field is accessed through the
//! block that contains it, so fields spanning two blocks can not be accessed.

use device_descriptor::Proxy;
use heapless::Vec;
use register_access::CommandAccess;

use crate::{
    block::{locate, DataClass, BLOCK_SIZE},
    descriptors::{GpoutFunction, GpoutPolarity, OperationConfiguration},
    word, Bq27621, Error,
};

/// Location of a value in data memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    pub class: DataClass,
    pub offset: u8,
    pub len: u8,
}

impl Field {
    pub const fn new(class: DataClass, offset: u8, len: u8) -> Self {
        Self { class, offset, len }
    }

    // State
    pub const QMAX_CELL_0: Self = Self::new(DataClass::STATE, 0, 2);
    pub const LOAD_SELECT_MODE: Self = Self::new(DataClass::STATE, 2, 1);
    /// Design capacity in mAh.
    pub const DESIGN_CAPACITY: Self = Self::new(DataClass::STATE, 3, 2);
    /// Design energy in mWh.
    pub const DESIGN_ENERGY: Self = Self::new(DataClass::STATE, 5, 2);
    pub const DEFAULT_DESIGN_CAPACITY: Self = Self::new(DataClass::STATE, 7, 2);
    /// Terminate voltage in mV.
    pub const TERMINATE_VOLTAGE: Self = Self::new(DataClass::STATE, 9, 2);
    pub const SOCI_DELTA: Self = Self::new(DataClass::STATE, 19, 1);
    pub const TAPER_RATE: Self = Self::new(DataClass::STATE, 20, 2);
    pub const TAPER_VOLTAGE: Self = Self::new(DataClass::STATE, 22, 2);
    pub const SLEEP_CURRENT: Self = Self::new(DataClass::STATE, 24, 2);
    pub const CHARGE_TERMINATION_VOLTAGE: Self = Self::new(DataClass::STATE, 26, 2);
    pub const LAST_RUN_AVERAGE_CURRENT: Self = Self::new(DataClass::STATE, 28, 2);
    pub const LAST_RUN_AVERAGE_POWER: Self = Self::new(DataClass::STATE, 30, 2);
    pub const DELTA_VOLTAGE: Self = Self::new(DataClass::STATE, 32, 2);
    pub const CHEM_ID: Self = Self::new(DataClass::STATE, 36, 2);

    // Registers
    /// Writable copy of [`OperationConfiguration`].
    pub const OPERATION_CONFIGURATION: Self = Self::new(DataClass::REGISTERS, 0, 2);

    // Discharge, state of charge thresholds in %
    pub const SOC1_SET: Self = Self::new(DataClass::DISCHARGE, 0, 1);
    pub const SOC1_CLEAR: Self = Self::new(DataClass::DISCHARGE, 1, 1);
    pub const SOCF_SET: Self = Self::new(DataClass::DISCHARGE, 2, 1);
    pub const SOCF_CLEAR: Self = Self::new(DataClass::DISCHARGE, 3, 1);
}

impl<B> Bq27621<B>
where
    B: CommandAccess,
{
    /// Writes `value` to data memory at `offset` of `class` and commits the block.
    ///
    /// A sealed device is unsealed first if the configuration allows it. The access mode and
    /// CONFIG UPDATE state are restored even if the write fails, the first error is returned.
    pub fn write_field(
        &mut self,
        class: DataClass,
        offset: u8,
        value: &[u8],
    ) -> Result<(), Error<B::Error>> {
        let (index, start) = locate(offset, value.len()).ok_or(Error::FieldCrossesBlockBoundary)?;

        if value.is_empty() {
            return Ok(());
        }

        let previous = self.ensure_unsealed()?;

        let mut result = if self.config.config_update {
            self.enter_config_update()
        } else {
            Ok(())
        };

        if result.is_ok() {
            result = self.update_block(class, index, start, value);
        }

        if self.config.config_update {
            let exit = self.exit_config_update();
            result = result.and(exit);
        }

        if result.is_err() {
            warn!("Writing class {} offset {} failed", class.id(), offset);
        }

        let reseal = self.restore_security(previous);
        result.and(reseal)
    }

    fn update_block(
        &mut self,
        class: DataClass,
        index: u8,
        start: usize,
        value: &[u8],
    ) -> Result<(), Error<B::Error>> {
        self.select_block(class, index)?;
        self.read_block()?;

        for (position, byte) in (start..).zip(value.iter()) {
            self.write_byte(position as u8, *byte)?;
        }

        self.commit()
    }

    /// Reads `len` bytes of data memory at `offset` of `class`.
    pub fn read_field(
        &mut self,
        class: DataClass,
        offset: u8,
        len: usize,
    ) -> Result<Vec<u8, BLOCK_SIZE>, Error<B::Error>> {
        let (index, start) = locate(offset, len).ok_or(Error::FieldCrossesBlockBoundary)?;

        self.select_block(class, index)?;
        let block = self.read_block()?;

        Vec::from_slice(&block[start..start + len])
            .map_err(|_| Error::FieldCrossesBlockBoundary)
    }

    pub fn read_word(&mut self, class: DataClass, offset: u8) -> Result<u16, Error<B::Error>> {
        let bytes = self.read_field(class, offset, 2)?;
        Ok(word::decode([bytes[0], bytes[1]]))
    }

    pub fn write_word(
        &mut self,
        class: DataClass,
        offset: u8,
        value: u16,
    ) -> Result<(), Error<B::Error>> {
        self.write_field(class, offset, &word::encode(value))
    }

    pub fn read_value(&mut self, field: Field) -> Result<Vec<u8, BLOCK_SIZE>, Error<B::Error>> {
        self.read_field(field.class, field.offset, field.len as usize)
    }

    pub fn write_value(&mut self, field: Field, value: &[u8]) -> Result<(), Error<B::Error>> {
        if value.len() != field.len as usize {
            return Err(Error::LengthMismatch);
        }

        self.write_field(field.class, field.offset, value)
    }

    fn read_word_field(&mut self, field: Field) -> Result<u16, Error<B::Error>> {
        self.read_word(field.class, field.offset)
    }

    fn write_word_field(&mut self, field: Field, value: u16) -> Result<(), Error<B::Error>> {
        self.write_word(field.class, field.offset, value)
    }

    /// Reads a set and a clear threshold stored next to each other.
    fn read_thresholds(&mut self, set: Field) -> Result<(u8, u8), Error<B::Error>> {
        let bytes = self.read_field(set.class, set.offset, 2)?;
        Ok((bytes[0], bytes[1]))
    }

    pub fn design_capacity(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_word_field(Field::DESIGN_CAPACITY)
    }

    pub fn set_design_capacity(&mut self, capacity_mah: u16) -> Result<(), Error<B::Error>> {
        self.write_word_field(Field::DESIGN_CAPACITY, capacity_mah)
    }

    pub fn design_energy(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_word_field(Field::DESIGN_ENERGY)
    }

    pub fn set_design_energy(&mut self, energy_mwh: u16) -> Result<(), Error<B::Error>> {
        self.write_word_field(Field::DESIGN_ENERGY, energy_mwh)
    }

    pub fn terminate_voltage(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_word_field(Field::TERMINATE_VOLTAGE)
    }

    pub fn set_terminate_voltage(&mut self, voltage_mv: u16) -> Result<(), Error<B::Error>> {
        self.write_word_field(Field::TERMINATE_VOLTAGE, voltage_mv)
    }

    /// Returns the SOC1 set and clear thresholds in %.
    pub fn soc1_thresholds(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        self.read_thresholds(Field::SOC1_SET)
    }

    /// Sets the state of charge at which the SOC1 flag is set and cleared.
    pub fn set_soc1_thresholds(&mut self, set: u8, clear: u8) -> Result<(), Error<B::Error>> {
        self.write_field(Field::SOC1_SET.class, Field::SOC1_SET.offset, &[set, clear])
    }

    /// Returns the SOCF set and clear thresholds in %.
    pub fn socf_thresholds(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        self.read_thresholds(Field::SOCF_SET)
    }

    /// Sets the state of charge at which the SOCF flag is set and cleared.
    pub fn set_socf_thresholds(&mut self, set: u8, clear: u8) -> Result<(), Error<B::Error>> {
        self.write_field(Field::SOCF_SET.class, Field::SOCF_SET.offset, &[set, clear])
    }

    /// Reads the stored operation configuration. Changes take effect after a reset.
    pub fn stored_operation_configuration(
        &mut self,
    ) -> Result<OperationConfiguration, Error<B::Error>> {
        let bits = self.read_word_field(Field::OPERATION_CONFIGURATION)?;
        Ok(OperationConfiguration::from_bits(bits))
    }

    fn update_operation_configuration(
        &mut self,
        f: impl FnOnce(OperationConfiguration) -> OperationConfiguration,
    ) -> Result<(), Error<B::Error>> {
        let current = self.stored_operation_configuration()?;
        let updated = f(current);

        if updated == current {
            debug!("Operation configuration unchanged");
            return Ok(());
        }

        self.write_word_field(Field::OPERATION_CONFIGURATION, updated.bits())
    }

    pub fn set_gpout_polarity(&mut self, polarity: GpoutPolarity) -> Result<(), Error<B::Error>> {
        self.update_operation_configuration(|config| config.gpiopol().write(polarity))
    }

    pub fn set_gpout_function(&mut self, function: GpoutFunction) -> Result<(), Error<B::Error>> {
        self.update_operation_configuration(|config| config.batlowen().write(function))
    }
}

#[cfg(test)]
mod test {
    use embedded_hal_mock::eh1::i2c::Mock as I2cMock;

    use super::*;
    use crate::{
        block::compute_checksum,
        security::SecurityState,
        test::{command_read, command_write, init_test, FakeGauge, NoopDelay},
        BlockSelection, Config, ResealPolicy,
    };

    #[test]
    fn design_capacity_write_sequence() {
        init_test();

        let mut block = [0u8; BLOCK_SIZE];
        block[3] = 0x05;
        block[4] = 0xDC;
        let checksum = compute_checksum(&block);
        assert_eq!(checksum, 30);

        let mut i2c = I2cMock::new(
            &[
                // CONTROL_STATUS: unsealed
                command_write(0x00, &[0x00, 0x00]),
                command_read(0x00, &[0x00, 0x00]),
                // Select State, block 0
                command_write(0x61, &[0x00]),
                command_write(0x3E, &[82]),
                command_write(0x3F, &[0x00]),
                command_read(0x40, &[0; BLOCK_SIZE]),
                // Commit
                command_write(0x40, &block),
                command_write(0x60, &[checksum]),
                command_read(0x60, &[checksum]),
            ]
            .concat(),
        );
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        gauge.set_design_capacity(1500).unwrap();

        i2c.done();
    }

    #[test]
    fn written_fields_read_back() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        let mut gauge = fake.driver(Config::default());

        gauge.set_design_capacity(1500).unwrap();
        assert_eq!(gauge.design_capacity().unwrap(), 1500);

        gauge.set_design_energy(5550).unwrap();
        gauge.set_terminate_voltage(3200).unwrap();
        assert_eq!(gauge.design_energy().unwrap(), 5550);
        assert_eq!(gauge.terminate_voltage().unwrap(), 3200);
        assert_eq!(gauge.design_capacity().unwrap(), 1500);

        gauge.write_value(Field::CHEM_ID, &[0x03, 0x54]).unwrap();
        assert_eq!(gauge.read_value(Field::CHEM_ID).unwrap().as_slice(), &[0x03, 0x54]);

        drop(gauge);

        let block = fake.block(DataClass::STATE, 0);
        assert_eq!(&block[3..5], &[0x05, 0xDC]);
        assert_eq!(&block[5..7], &[0x15, 0xAE]);
        assert_eq!(&block[9..11], &[0x0C, 0x80]);

        // Chem ID lives in the second block of the class.
        assert_eq!(&fake.block(DataClass::STATE, 1)[4..6], &[0x03, 0x54]);
    }

    #[test]
    fn thresholds_are_written_together() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        let mut gauge = fake.driver(Config::default());

        gauge.set_soc1_thresholds(15, 20).unwrap();
        gauge.set_socf_thresholds(2, 5).unwrap();

        assert_eq!(gauge.soc1_thresholds().unwrap(), (15, 20));
        assert_eq!(gauge.socf_thresholds().unwrap(), (2, 5));

        drop(gauge);
        assert_eq!(fake.commit_count(), 2);
        assert_eq!(&fake.block(DataClass::DISCHARGE, 0)[..4], &[15, 20, 2, 5]);
    }

    #[test]
    fn field_crossing_blocks_is_rejected_without_bus_traffic() {
        init_test();

        let mut i2c = I2cMock::new(&[]);
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        assert_eq!(
            gauge.write_field(DataClass::STATE, 31, &[0x01, 0x02]),
            Err(Error::FieldCrossesBlockBoundary)
        );
        assert_eq!(
            gauge.read_field(DataClass::STATE, 63, 2),
            Err(Error::FieldCrossesBlockBoundary)
        );
        assert_eq!(
            gauge.read_field(DataClass::STATE, 1, usize::MAX),
            Err(Error::FieldCrossesBlockBoundary)
        );

        i2c.done();
    }

    #[test]
    fn whole_block_can_be_read_as_a_field() {
        init_test();

        let mut fake = FakeGauge::new();
        let contents: Vec<u8, BLOCK_SIZE> = (0..BLOCK_SIZE as u8).collect();
        fake.set_block(DataClass::STATE, 1, 0, &contents);
        let mut gauge = fake.driver(Config::default());

        assert_eq!(
            gauge.read_field(DataClass::STATE, 32, BLOCK_SIZE).unwrap(),
            contents
        );
    }

    #[test]
    fn value_length_must_match_the_field() {
        init_test();

        let mut i2c = I2cMock::new(&[]);
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        assert_eq!(
            gauge.write_value(Field::DESIGN_CAPACITY, &[0x05]),
            Err(Error::LengthMismatch)
        );

        i2c.done();
    }

    #[test]
    fn sealed_device_is_not_touched_without_auto_unseal() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config {
            auto_unseal: false,
            ..Config::default()
        });

        assert_eq!(gauge.set_design_capacity(1500), Err(Error::Sealed));
        assert_eq!(gauge.selected_block(), None);

        drop(gauge);
        // Only the CONTROL_STATUS query went out.
        assert_eq!(fake.controls(), &[0x0000]);
        assert_eq!(fake.commit_count(), 0);
    }

    #[test]
    fn sealed_device_is_resealed_after_write() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config::default());

        gauge.set_design_capacity(1500).unwrap();
        assert_eq!(gauge.security_state(), SecurityState::Sealed);

        drop(gauge);
        assert!(fake.is_sealed());
        assert_eq!(fake.commit_count(), 1);
        assert_eq!(&fake.block(DataClass::STATE, 0)[3..5], &[0x05, 0xDC]);
    }

    #[test]
    fn reseal_policy_decides_the_final_access_mode() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config {
            reseal: ResealPolicy::Never,
            ..Config::default()
        });
        gauge.set_design_capacity(1500).unwrap();
        drop(gauge);
        assert!(!fake.is_sealed());

        // Already unsealed, stays unsealed.
        let mut gauge = fake.driver(Config::default());
        gauge.set_design_capacity(1600).unwrap();
        drop(gauge);
        assert!(!fake.is_sealed());

        let mut gauge = fake.driver(Config {
            reseal: ResealPolicy::Always,
            ..Config::default()
        });
        gauge.set_design_capacity(1700).unwrap();
        drop(gauge);
        assert!(fake.is_sealed());
    }

    #[test]
    fn failed_commit_still_reseals() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.reject_commits = true;
        let mut gauge = fake.driver(Config::default());

        let result = gauge.set_design_capacity(1500);
        assert!(
            matches!(result, Err(Error::ChecksumVerificationFailed { .. })),
            "{result:?}"
        );

        drop(gauge);
        assert!(fake.is_sealed());
    }

    #[test]
    fn config_update_wraps_the_write() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        let mut gauge = fake.driver(Config {
            config_update: true,
            ..Config::default()
        });

        gauge.set_terminate_voltage(3000).unwrap();

        drop(gauge);
        assert!(!fake.in_config_update());
        assert_eq!(fake.controls(), &[0x0000, 0x0013, 0x0042]);
        assert_eq!(&fake.block(DataClass::STATE, 0)[9..11], &[0x0B, 0xB8]);
    }

    #[test]
    fn config_update_timeout_skips_the_write() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        fake.ignore_cfgupdate = true;
        let mut gauge = fake.driver(Config {
            config_update: true,
            ..Config::default()
        });

        assert_eq!(
            gauge.set_terminate_voltage(3000),
            Err(Error::ConfigUpdateTimeout)
        );

        drop(gauge);
        assert_eq!(fake.commit_count(), 0);
        // The soft reset is sent anyway.
        assert_eq!(fake.controls().last(), Some(&0x0042));
    }

    #[test]
    fn gpout_settings_only_written_when_changed() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        fake.set_block(DataClass::REGISTERS, 0, 0, &[0x25, 0xFC]);
        let mut gauge = fake.driver(Config::default());

        gauge.set_gpout_polarity(GpoutPolarity::ActiveLow).unwrap();
        gauge.set_gpout_function(GpoutFunction::BatLow).unwrap();

        gauge.set_gpout_polarity(GpoutPolarity::ActiveHigh).unwrap();
        assert_eq!(
            gauge.stored_operation_configuration().unwrap().bits(),
            0x2DFC
        );

        gauge.set_gpout_function(GpoutFunction::SocInt).unwrap();
        assert_eq!(
            gauge
                .stored_operation_configuration()
                .unwrap()
                .batlowen()
                .read(),
            GpoutFunction::SocInt
        );

        drop(gauge);
        assert_eq!(fake.commit_count(), 2);
    }

    #[test]
    fn bus_error_during_write_is_returned() {
        init_test();

        let mut fake = FakeGauge::new();
        fake.unseal();
        fake.fail_command = Some(0x40);
        let mut gauge = fake.driver(Config::default());

        assert!(matches!(
            gauge.set_design_capacity(1500),
            Err(Error::Bus(_))
        ));
        assert_eq!(
            gauge.selected_block(),
            Some(BlockSelection {
                class: DataClass::STATE,
                index: 0,
            })
        );
    }
}
