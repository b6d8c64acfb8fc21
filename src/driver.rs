//! Motor driver (H-bridge) abstraction used by the track controllers.
//!
//! The command station core never touches pins directly outside of the
//! signal path. Power switching, braking and current sensing go through the
//! [`MotorDriver`] trait, so boards with unusual shields only need to
//! implement four methods.
//!
//! [`PinMotorDriver`] is the stock implementation over `embedded-hal` pins:
//!
//! - a power enable pin
//! - an optional brake pin, optionally inverted
//! - an optional fault input (active low)
//! - an optional current sense channel, see [`CurrentSense`]
//!
//! ## Example
//!
//! ```rust
//! # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
//! use dccwave::driver::{MotorDriver, NoPin, PinMotorDriver};
//!
//! # let power = Pin::new(&[PinTransaction::set(PinState::Low), PinTransaction::set(PinState::High)]);
//! let adc = || 512u16;
//! let mut driver: PinMotorDriver<Pin, NoPin, NoPin, _> =
//!     PinMotorDriver::new(power, None, false, None, Some(adc));
//! driver.set_power(true);
//! assert_eq!(driver.current_raw(), 0);
//! # driver.release().0.done();
//! ```

use core::convert::Infallible;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

/// Capability interface of one H-bridge output.
///
/// Implementations are called from the mainline loop only.
pub trait MotorDriver {
    /// Enables (`true`) or disables (`false`) the output stage.
    fn set_power(&mut self, on: bool);

    /// Applies (`true`) or releases (`false`) the brake.
    fn set_brake(&mut self, on: bool);

    /// Offset-corrected current reading in raw ADC units.
    ///
    /// A negative value flags an active fault input and must be treated as
    /// an overload.
    fn current_raw(&mut self) -> i32;

    /// Returns `false` if the driver has no current sensing at all.
    fn can_measure_current(&self) -> bool {
        true
    }
}

/// Source of raw current-sense readings, usually one ADC channel.
pub trait CurrentSense {
    /// Reads the channel. Must be fast; it is called once per sampling interval.
    fn read_raw(&mut self) -> u16;
}

impl<F> CurrentSense for F
where
    F: FnMut() -> u16,
{
    fn read_raw(&mut self) -> u16 {
        self()
    }
}

/// Placeholder for an unconnected brake or fault pin.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(false)
    }
}

/// Placeholder for a driver without current sensing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCurrentSense;

impl CurrentSense for NoCurrentSense {
    fn read_raw(&mut self) -> u16 {
        0
    }
}

/// [`MotorDriver`] over `embedded-hal` pins and a [`CurrentSense`] channel.
///
/// ## Type Parameters
///
/// - `PWR`: power enable pin
/// - `BRK`: brake pin ([`NoPin`] if absent)
/// - `FLT`: fault input, active low ([`NoPin`] if absent)
/// - `ADC`: current sense channel ([`NoCurrentSense`] if absent)
#[derive(Debug)]
pub struct PinMotorDriver<PWR, BRK, FLT, ADC>
where
    PWR: OutputPin,
    BRK: OutputPin,
    FLT: InputPin,
    ADC: CurrentSense,
{
    power: PWR,
    brake: Option<BRK>,
    invert_brake: bool,
    fault: Option<FLT>,
    sense: Option<ADC>,
    sense_offset: u16,
    powered: bool,
}

impl<PWR, BRK, FLT, ADC> PinMotorDriver<PWR, BRK, FLT, ADC>
where
    PWR: OutputPin,
    BRK: OutputPin,
    FLT: InputPin,
    ADC: CurrentSense,
{
    /// Creates a driver with power off and brake released.
    ///
    /// The zero-current offset is read from `sense` here, so the output
    /// stage must be idle when this is called.
    ///
    /// # Arguments
    /// - `power`: power enable pin
    /// - `brake`: optional brake pin
    /// - `invert_brake`: `true` if the bridge releases the brake on a high level
    /// - `fault`: optional fault input
    /// - `sense`: optional current sense channel
    pub fn new(
        mut power: PWR,
        brake: Option<BRK>,
        invert_brake: bool,
        fault: Option<FLT>,
        mut sense: Option<ADC>,
    ) -> Self {
        let _ = power.set_low();
        let sense_offset = sense.as_mut().map_or(0, |adc| adc.read_raw());
        let mut driver = Self {
            power,
            brake,
            invert_brake,
            fault,
            sense,
            sense_offset,
            powered: false,
        };
        driver.set_brake(false);
        driver
    }

    /// Reading taken as zero current.
    pub fn sense_offset(&self) -> u16 {
        self.sense_offset
    }

    /// Returns `true` while the power pin is driven high.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Releases the pins and the sense channel.
    pub fn release(self) -> (PWR, Option<BRK>, Option<FLT>, Option<ADC>) {
        (self.power, self.brake, self.fault, self.sense)
    }

    fn fault_active(&mut self) -> bool {
        match self.fault.as_mut() {
            Some(fault) => fault.is_low().unwrap_or(false),
            None => false,
        }
    }
}

impl<PWR, BRK, FLT, ADC> MotorDriver for PinMotorDriver<PWR, BRK, FLT, ADC>
where
    PWR: OutputPin,
    BRK: OutputPin,
    FLT: InputPin,
    ADC: CurrentSense,
{
    fn set_power(&mut self, on: bool) {
        if on {
            // Cycling the brake clears a latched overcurrent on some bridges.
            self.set_brake(true);
            self.set_brake(false);
            let _ = self.power.set_high();
        } else {
            let _ = self.power.set_low();
        }
        self.powered = on;
    }

    fn set_brake(&mut self, on: bool) {
        if let Some(brake) = self.brake.as_mut() {
            let _ = brake.set_state((on ^ self.invert_brake).into());
        }
    }

    fn current_raw(&mut self) -> i32 {
        let Some(adc) = self.sense.as_mut() else {
            return 0;
        };
        let current = i32::from(adc.read_raw()) - i32::from(self.sense_offset);
        let current = current.abs();
        if self.powered && self.fault_active() {
            return if current == 0 { -1 } else { -current };
        }
        current
    }

    fn can_measure_current(&self) -> bool {
        self.sense.is_some()
    }
}
