// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! GPIO capability
//!
//! The wire protocols only ever need to drive a pin to a level, read a pin,
//! and (for SWDIO) switch a pin between driving and floating.  Hosts provide
//! this through [`Gpio`]; pins are opaque [`Pin`] handles the host hands out.

use core::fmt;

/// Opaque pin handle, as understood by the host's [`Gpio`] implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pin {
    pub port: u32,
    pub pin: u32,
}

impl Pin {
    pub const fn new(port: u32, pin: u32) -> Self {
        Self { port, pin }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}.{}", self.port, self.pin)
    }
}

/// Electrical mode of a bidirectional pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Output, driving the last value set
    Drive,

    /// Input, high impedance
    Float,
}

/// GPIO access needed by [`crate::SwdTap`] and [`crate::JtagTap`]
///
/// Every call is expected to take effect immediately; the taps do their own
/// timing with a [`crate::Delay`].
pub trait Gpio {
    /// Drive `pin` to `value`
    fn set_value(&mut self, pin: Pin, value: bool);

    /// Sample the current level of `pin`
    fn get_value(&mut self, pin: Pin) -> bool;

    fn set_high(&mut self, pin: Pin) {
        self.set_value(pin, true);
    }

    fn set_low(&mut self, pin: Pin) {
        self.set_value(pin, false);
    }

    /// Switch `pin` between driving and floating.  Only used for SWDIO.
    /// Hosts that wire SWDIO through an open-drain or externally switched
    /// buffer can leave this as a no-op.
    fn set_mode(&mut self, _pin: Pin, _mode: PinMode) {}
}

impl<G: Gpio + ?Sized> Gpio for &mut G {
    fn set_value(&mut self, pin: Pin, value: bool) {
        (**self).set_value(pin, value)
    }

    fn get_value(&mut self, pin: Pin) -> bool {
        (**self).get_value(pin)
    }

    fn set_high(&mut self, pin: Pin) {
        (**self).set_high(pin)
    }

    fn set_low(&mut self, pin: Pin) {
        (**self).set_low(pin)
    }

    fn set_mode(&mut self, pin: Pin, mode: PinMode) {
        (**self).set_mode(pin, mode)
    }
}
