use device_descriptor::{device, field_type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpoutPolarity {
    ActiveLow = 0,
    ActiveHigh = 1,
}

field_type!(GpoutPolarity {
    ActiveLow = 0,
    ActiveHigh = 1,
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpoutFunction {
    /// GPOUT pulses on state of charge changes.
    SocInt = 0,
    /// GPOUT reflects the low battery state.
    BatLow = 1,
}

field_type!(GpoutFunction {
    SocInt = 0,
    BatLow = 1,
});

device! {
    /// Status word returned to the Control() command after the CONTROL_STATUS subcommand.
    ControlStatus(u16 @ 0x00) {
        shutdownen @ 15 => bool,
        wdreset @ 14 => bool,
        /// Device is in SEALED mode.
        ss @ 13 => bool,
        calmode @ 12 => bool,
        ocvcmdcomp @ 9 => bool,
        /// A large current jump made the initial state of charge unreliable.
        ocvfail @ 8 => bool,
        initcomp @ 7 => bool,
        powermin @ 6 => bool,
        sleep @ 4 => bool,
        /// Constant-power model in use.
        ldmd @ 3 => bool,
        chemchng @ 0 => bool
    }

    /// Gauging status.
    Flags(u16 @ 0x06) {
        /// Over-temperature.
        ot @ 15 => bool,
        /// Under-temperature.
        ut @ 14 => bool,
        /// Full charge detected.
        fc @ 9 => bool,
        /// Fast charging allowed.
        chg @ 8 => bool,
        ocvtaken @ 7 => bool,
        /// Power-on reset or RESET subcommand occurred.
        itpor @ 5 => bool,
        /// The gauge is in CONFIG UPDATE mode.
        cfgupmode @ 4 => bool,
        bat_det @ 3 => bool,
        /// State of charge fell to the SOC1 set threshold.
        soc1 @ 2 => bool,
        /// State of charge fell to the SOCF set threshold.
        socf @ 1 => bool,
        /// Discharging.
        dsg @ 0 => bool
    }

    /// Operation configuration. The command is read-only, the writable copy lives in
    /// data memory (see [`crate::extended::Field::OPERATION_CONFIGURATION`]).
    OperationConfiguration(u16 @ 0x3A) {
        adolp @ 14 => bool,
        /// Battery insertion is detected on the BIN pin.
        bie @ 13 => bool,
        gpiopol @ 11 => GpoutPolarity,
        admlp @ 10 => bool,
        vconsen @ 7 => bool,
        rmfcc @ 4 => bool,
        fconven @ 3 => bool,
        batlowen @ 2 => GpoutFunction,
        nodvavg @ 1 => bool,
        /// The host writes Temperature() instead of using the internal sensor.
        temps @ 0 => bool
    }
}
