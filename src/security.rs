//! Access mode handling.
//!
//! A sealed gauge refuses data memory writes. Unsealing takes the unseal key written twice
//! in a row to Control(), sealing takes the SEALED subcommand.

use register_access::CommandAccess;

use crate::{standard::Subcommand, Bq27621, Error, ResealPolicy};

/// Written to Control() twice in a row to unseal the device.
pub const UNSEAL_KEY: u16 = 0x8000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SecurityState {
    #[default]
    Sealed,
    Unsealed,
}

impl<B> Bq27621<B> {
    /// Returns the access mode last observed or set by the driver.
    pub fn security_state(&self) -> SecurityState {
        self.security
    }
}

impl<B> Bq27621<B>
where
    B: CommandAccess,
{
    /// Reads the SS bit of CONTROL_STATUS and updates the tracked access mode.
    pub fn query_sealed(&mut self) -> Result<bool, Error<B::Error>> {
        let sealed = self.control_status()?.ss().read();

        self.security = if sealed {
            SecurityState::Sealed
        } else {
            SecurityState::Unsealed
        };

        Ok(sealed)
    }

    /// Sends the unseal key sequence.
    ///
    /// The device does not acknowledge the key, use [`Self::query_sealed`] to check whether
    /// it was accepted.
    pub fn unseal(&mut self) -> Result<(), Error<B::Error>> {
        self.write_control_word(UNSEAL_KEY)?;
        self.write_control_word(UNSEAL_KEY)?;

        debug!("Unseal key sent");
        self.security = SecurityState::Unsealed;

        Ok(())
    }

    pub fn seal(&mut self) -> Result<(), Error<B::Error>> {
        self.control(Subcommand::Sealed)?;

        debug!("Device sealed");
        self.security = SecurityState::Sealed;

        Ok(())
    }

    /// Makes sure the device accepts data memory writes. Returns the access mode the device
    /// was in before.
    pub(crate) fn ensure_unsealed(&mut self) -> Result<SecurityState, Error<B::Error>> {
        if !self.query_sealed()? {
            return Ok(SecurityState::Unsealed);
        }

        if !self.config.auto_unseal {
            warn!("Device is sealed, not unsealing");
            return Err(Error::Sealed);
        }

        self.unseal()?;

        if self.query_sealed()? {
            error!("Device rejected the unseal key");
            return Err(Error::Sealed);
        }

        Ok(SecurityState::Sealed)
    }

    /// Seals the device after a write, according to the configured policy.
    pub(crate) fn restore_security(
        &mut self,
        previous: SecurityState,
    ) -> Result<(), Error<B::Error>> {
        let reseal = match self.config.reseal {
            ResealPolicy::Never => false,
            ResealPolicy::RestorePrevious => previous == SecurityState::Sealed,
            ResealPolicy::Always => true,
        };

        if reseal {
            self.seal()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use embedded_hal_mock::eh1::i2c::Mock as I2cMock;

    use super::*;
    use crate::{
        test::{command_read, command_write, init_test, FakeGauge, NoopDelay},
        Config,
    };

    #[test]
    fn unseal_writes_the_key_twice() {
        init_test();

        let mut i2c = I2cMock::new(
            &[
                command_write(0x00, &[0x00, 0x80]),
                command_write(0x00, &[0x00, 0x80]),
            ]
            .concat(),
        );
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        gauge.unseal().unwrap();
        assert_eq!(gauge.security_state(), SecurityState::Unsealed);

        i2c.done();
    }

    #[test]
    fn seal_sends_the_sealed_subcommand() {
        init_test();

        let mut i2c = I2cMock::new(&command_write(0x00, &[0x20, 0x00]));
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        gauge.seal().unwrap();
        assert_eq!(gauge.security_state(), SecurityState::Sealed);

        i2c.done();
    }

    #[test]
    fn sealed_state_comes_from_control_status() {
        init_test();

        let mut i2c = I2cMock::new(
            &[
                command_write(0x00, &[0x00, 0x00]),
                command_read(0x00, &[0x00, 0x20]),
                command_write(0x00, &[0x00, 0x00]),
                command_read(0x00, &[0x80, 0x00]),
            ]
            .concat(),
        );
        let mut gauge = Bq27621::new_i2c(i2c.clone(), NoopDelay, Config::default());

        assert!(gauge.query_sealed().unwrap());
        assert_eq!(gauge.security_state(), SecurityState::Sealed);

        assert!(!gauge.query_sealed().unwrap());
        assert_eq!(gauge.security_state(), SecurityState::Unsealed);

        i2c.done();
    }

    #[test]
    fn fake_gauge_unseals_after_two_keys() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config::default());

        assert!(gauge.query_sealed().unwrap());
        gauge.unseal().unwrap();
        assert!(!gauge.query_sealed().unwrap());

        gauge.seal().unwrap();
        assert!(gauge.query_sealed().unwrap());
    }

    #[test]
    fn interrupted_key_sequence_keeps_the_device_sealed() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config::default());

        gauge.write_control_word(UNSEAL_KEY).unwrap();
        gauge.control(Subcommand::ControlStatus).unwrap();
        gauge.write_control_word(UNSEAL_KEY).unwrap();

        assert!(gauge.query_sealed().unwrap());
    }

    #[test]
    fn ensure_unsealed_respects_auto_unseal() {
        init_test();

        let mut fake = FakeGauge::new();
        let mut gauge = fake.driver(Config {
            auto_unseal: false,
            ..Config::default()
        });

        assert_eq!(gauge.ensure_unsealed(), Err(Error::Sealed));

        gauge.set_config(Config::default());
        assert_eq!(gauge.ensure_unsealed(), Ok(SecurityState::Sealed));
        assert_eq!(gauge.ensure_unsealed(), Ok(SecurityState::Unsealed));
    }
}
