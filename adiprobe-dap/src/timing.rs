// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Clock timing
//!
//! Both taps wait a configurable number of busy-wait cycles in each half of
//! every clock period.  Zero cycles skips the wait entirely, which is the
//! fastest the host can toggle its GPIOs.

/// Busy-wait delay provider
pub trait Delay {
    /// Wait for roughly `cycles` CPU cycles
    fn delay_cycles(&mut self, cycles: u32);
}

/// [`Delay`] that spins on [`core::hint::spin_loop`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    #[inline]
    fn delay_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}

/// Protocol clock speed setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Speed {
    /// Aims to be roughly 500kHz clock
    Slow,

    /// Aims to be roughly 1MHz clock
    Medium,

    /// Aims to be roughly 2MHz clock
    Fast,

    /// As fast as the GPIOs toggle, no delay at all
    #[default]
    Turbo,
}

impl Speed {
    /// Returns the **approximate** speed in kHz for this setting.
    pub fn speed_khz(&self) -> u32 {
        match self {
            Speed::Slow => 500,
            Speed::Medium => 1000,
            Speed::Fast => 2000,
            Speed::Turbo => 4000,
        }
    }

    /// Busy-wait cycles for each half of the clock period
    pub fn half_period_cycles(&self) -> u32 {
        match self {
            Speed::Slow => 75,
            Speed::Medium => 33,
            Speed::Fast => 10,
            Speed::Turbo => 0,
        }
    }
}

/// Shared clock timing state for the taps
#[derive(Debug, Clone)]
pub(crate) struct Timing<D> {
    delay: D,
    cycles: u32,
}

impl<D: Delay> Timing<D> {
    pub(crate) fn new(delay: D) -> Self {
        Self {
            delay,
            cycles: Speed::default().half_period_cycles(),
        }
    }

    pub(crate) fn cycles(&self) -> u32 {
        self.cycles
    }

    pub(crate) fn set_cycles(&mut self, cycles: u32) {
        self.cycles = cycles;
    }

    #[inline]
    pub(crate) fn half_period(&mut self) {
        if self.cycles != 0 {
            self.delay.delay_cycles(self.cycles);
        }
    }

    /// A one-off wait that ignores the configured speed
    pub(crate) fn wait(&mut self, cycles: u32) {
        self.delay.delay_cycles(cycles);
    }
}
