//! Standard commands and Control() subcommands.
//!
//! Standard commands are 16-bit values transferred least significant byte first.

use device_descriptor::Proxy;
use register_access::{CommandAccess, RegisterReader};

use crate::{
    descriptors::{ControlStatus, Flags, GpoutFunction, GpoutPolarity, OperationConfiguration},
    Bq27621, Error,
};

/// Value of DEVICE_TYPE on a BQ27621.
pub const DEVICE_TYPE: u16 = 0x0621;

/// Number of Flags() reads while waiting for a CONFIG UPDATE mode change.
pub const CONFIG_UPDATE_POLLS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Control = 0x00,
    Temperature = 0x02,
    Voltage = 0x04,
    Flags = 0x06,
    NominalAvailableCapacity = 0x08,
    FullAvailableCapacity = 0x0A,
    RemainingCapacity = 0x0C,
    FullChargeCapacity = 0x0E,
    EffectiveCurrent = 0x10,
    AveragePower = 0x18,
    StateOfCharge = 0x1C,
    InternalTemperature = 0x1E,
    RemainingCapacityUnfiltered = 0x28,
    RemainingCapacityFiltered = 0x2A,
    FullChargeCapacityUnfiltered = 0x2C,
    FullChargeCapacityFiltered = 0x2E,
    StateOfChargeUnfiltered = 0x30,
    OperationConfiguration = 0x3A,
    DesignCapacity = 0x3C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Subcommand {
    ControlStatus = 0x0000,
    DeviceType = 0x0001,
    FwVersion = 0x0002,
    PrevMacwrite = 0x0007,
    ChemId = 0x0008,
    BatInsert = 0x000C,
    BatRemove = 0x000D,
    TogglePowermin = 0x0010,
    SetHibernate = 0x0011,
    ClearHibernate = 0x0012,
    SetCfgupdate = 0x0013,
    ShutdownEnable = 0x001B,
    Shutdown = 0x001C,
    Sealed = 0x0020,
    ToggleGpout = 0x0023,
    AltChem1 = 0x0031,
    AltChem2 = 0x0032,
    Reset = 0x0041,
    SoftReset = 0x0042,
    ExitCfgupdate = 0x0043,
    ExitResim = 0x0044,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapacityMeasure {
    /// Compensated remaining capacity.
    #[default]
    Remaining,
    /// Compensated capacity of a fully charged battery.
    Full,
    /// Uncompensated remaining capacity.
    Available,
    /// Uncompensated capacity of a fully charged battery.
    AvailableFull,
    RemainingFiltered,
    RemainingUnfiltered,
    FullFiltered,
    FullUnfiltered,
    Design,
}

impl CapacityMeasure {
    pub const fn command(self) -> Command {
        match self {
            Self::Remaining => Command::RemainingCapacity,
            Self::Full => Command::FullChargeCapacity,
            Self::Available => Command::NominalAvailableCapacity,
            Self::AvailableFull => Command::FullAvailableCapacity,
            Self::RemainingFiltered => Command::RemainingCapacityFiltered,
            Self::RemainingUnfiltered => Command::RemainingCapacityUnfiltered,
            Self::FullFiltered => Command::FullChargeCapacityFiltered,
            Self::FullUnfiltered => Command::FullChargeCapacityUnfiltered,
            Self::Design => Command::DesignCapacity,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocMeasure {
    #[default]
    Filtered,
    Unfiltered,
}

impl SocMeasure {
    pub const fn command(self) -> Command {
        match self {
            Self::Filtered => Command::StateOfCharge,
            Self::Unfiltered => Command::StateOfChargeUnfiltered,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TempMeasure {
    #[default]
    Battery,
    Internal,
}

impl TempMeasure {
    pub const fn command(self) -> Command {
        match self {
            Self::Battery => Command::Temperature,
            Self::Internal => Command::InternalTemperature,
        }
    }
}

impl<B> Bq27621<B>
where
    B: CommandAccess,
{
    /// Checks that the device is a BQ27621 and reads its access mode.
    pub fn init(&mut self) -> Result<(), Error<B::Error>> {
        let device_type = self.device_type()?;
        if device_type != DEVICE_TYPE {
            error!("Unexpected device type: {}", device_type);
            return Err(Error::IncorrectDeviceType(device_type));
        }

        let sealed = self.query_sealed()?;
        info!("BQ27621 found, sealed: {}", sealed);

        Ok(())
    }

    pub(crate) fn write_control_word(&mut self, word: u16) -> Result<(), Error<B::Error>> {
        self.bus
            .write_command(Command::Control as u8, &word.to_le_bytes())
            .map_err(Error::Bus)
    }

    /// Sends a subcommand to Control().
    pub fn control(&mut self, subcommand: Subcommand) -> Result<(), Error<B::Error>> {
        self.write_control_word(subcommand as u16)
    }

    /// Sends a subcommand to Control() and reads its result.
    pub fn read_control(&mut self, subcommand: Subcommand) -> Result<u16, Error<B::Error>> {
        self.control(subcommand)?;
        self.read_command_word(Command::Control)
    }

    pub fn read_command_word(&mut self, command: Command) -> Result<u16, Error<B::Error>> {
        let mut buffer = [0; 2];
        self.bus
            .read_command(command as u8, &mut buffer)
            .map_err(Error::Bus)?;

        Ok(u16::from_le_bytes(buffer))
    }

    pub fn device_type(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_control(Subcommand::DeviceType)
    }

    pub fn firmware_version(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_control(Subcommand::FwVersion)
    }

    pub fn chem_id(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_control(Subcommand::ChemId)
    }

    pub fn control_status(&mut self) -> Result<ControlStatus, Error<B::Error>> {
        let bits = self.read_control(Subcommand::ControlStatus)?;
        Ok(ControlStatus::from_bits(bits))
    }

    /// Battery voltage in mV.
    pub fn voltage(&mut self) -> Result<u16, Error<B::Error>> {
        self.read_command_word(Command::Voltage)
    }

    /// Average current in mA, negative while discharging.
    pub fn average_current(&mut self) -> Result<i16, Error<B::Error>> {
        self.read_command_word(Command::EffectiveCurrent)
            .map(|raw| raw as i16)
    }

    /// Capacity in mAh.
    pub fn capacity(&mut self, measure: CapacityMeasure) -> Result<u16, Error<B::Error>> {
        self.read_command_word(measure.command())
    }

    /// Average power in mW, negative while discharging.
    pub fn average_power(&mut self) -> Result<i16, Error<B::Error>> {
        self.read_command_word(Command::AveragePower)
            .map(|raw| raw as i16)
    }

    /// State of charge in %.
    pub fn state_of_charge(&mut self, measure: SocMeasure) -> Result<u16, Error<B::Error>> {
        self.read_command_word(measure.command())
    }

    /// Temperature in 0.1 K.
    pub fn temperature(&mut self, measure: TempMeasure) -> Result<u16, Error<B::Error>> {
        self.read_command_word(measure.command())
    }

    pub fn flags(&mut self) -> Result<Flags, Error<B::Error>> {
        Flags::read(&mut self.bus).map_err(Error::Bus)
    }

    pub fn operation_configuration(&mut self) -> Result<OperationConfiguration, Error<B::Error>> {
        OperationConfiguration::read(&mut self.bus).map_err(Error::Bus)
    }

    pub fn soc1_flag(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.flags()?.soc1().read())
    }

    pub fn socf_flag(&mut self) -> Result<bool, Error<B::Error>> {
        Ok(self.flags()?.socf().read())
    }

    pub fn gpout_polarity(&mut self) -> Result<GpoutPolarity, Error<B::Error>> {
        Ok(self.operation_configuration()?.gpiopol().read())
    }

    pub fn gpout_function(&mut self) -> Result<GpoutFunction, Error<B::Error>> {
        Ok(self.operation_configuration()?.batlowen().read())
    }

    pub fn soft_reset(&mut self) -> Result<(), Error<B::Error>> {
        self.control(Subcommand::SoftReset)
    }

    pub fn reset(&mut self) -> Result<(), Error<B::Error>> {
        self.control(Subcommand::Reset)
    }

    /// Puts the gauge into CONFIG UPDATE mode. The device must be unsealed.
    pub fn enter_config_update(&mut self) -> Result<(), Error<B::Error>> {
        self.control(Subcommand::SetCfgupdate)?;
        self.wait_for_config_update(true)?;

        debug!("Entered CONFIG UPDATE mode");
        Ok(())
    }

    /// Leaves CONFIG UPDATE mode with a soft reset, which makes the gauge apply the new
    /// configuration.
    pub fn exit_config_update(&mut self) -> Result<(), Error<B::Error>> {
        self.soft_reset()?;
        self.wait_for_config_update(false)?;

        debug!("Left CONFIG UPDATE mode");
        Ok(())
    }

    fn wait_for_config_update(&mut self, active: bool) -> Result<(), Error<B::Error>> {
        for _ in 0..CONFIG_UPDATE_POLLS {
            self.bus.settle();
            if self.flags()?.cfgupmode().read() == active {
                return Ok(());
            }
        }

        warn!("CFGUPMODE did not change to {}", active);
        Err(Error::ConfigUpdateTimeout)
    }
}
