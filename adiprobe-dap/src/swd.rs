// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Sequences
//!
//! [`SwdTap`] clocks raw bit sequences on SWCLK/SWDIO.  It knows nothing
//! about packets; [`crate::SwdDp`] builds those out of these sequences.
//!
//! Bits go out and come in LSB first.  The host changes SWDIO while SWCLK is
//! low and the target samples on the rising edge; the host samples target
//! data just before raising SWCLK.
//!
//! SWDIO ownership is tracked as a [`Direction`].  Whenever a sequence needs
//! the other direction a single turnaround clock is inserted, so back-to-back
//! sequences in the same direction cost nothing extra.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::gpio::{Gpio, Pin, PinMode};
use crate::timing::{Delay, Speed, Timing};

// JTAG-to-SWD sequence as documented: 0111100111100111
const JTAG_TO_SWD_DOCUMENTED: u16 = 0b0111100111100111; // 0x79E7

// Reversed for SWD LSB-first transmission
const JTAG_TO_SWD_SEQUENCE: u16 = JTAG_TO_SWD_DOCUMENTED.reverse_bits(); // 0xE79E

// 60 clocks high then 4 low: 32 ones followed by 28 ones and 4 zeros
const LINE_RESET_HIGH: u32 = 0xFFFF_FFFF;
const LINE_RESET_HIGH_THEN_IDLE: u32 = 0x0FFF_FFFF;

/// Which end is driving SWDIO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The probe has released SWDIO, the target may drive it
    Float,

    /// The probe is driving SWDIO
    Drive,
}

/// The two SWD pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwdPins {
    pub swclk: Pin,
    pub swdio: Pin,
}

impl SwdPins {
    pub const fn new(swclk: Pin, swdio: Pin) -> Self {
        Self { swclk, swdio }
    }
}

/// SWD sequence layer
///
/// Create with `SwdTap::new()`, passing the host's [`Gpio`], the pins and a
/// [`Delay`].  SWDIO starts floating and SWCLK low.
///
/// ```rust,ignore
/// use adiprobe_dap::{Pin, SpinDelay, SwdPins, SwdTap};
///
/// let pins = SwdPins::new(Pin::new(0, 1), Pin::new(0, 0));
/// let mut tap = SwdTap::new(gpio, pins, SpinDelay);
/// tap.jtag_to_swd();
/// tap.line_reset();
/// ```
#[derive(Debug)]
pub struct SwdTap<G, D> {
    gpio: G,
    pins: SwdPins,
    timing: Timing<D>,
    speed: Speed,
    direction: Direction,
}

impl<G: Gpio, D: Delay> SwdTap<G, D> {
    pub fn new(mut gpio: G, pins: SwdPins, delay: D) -> Self {
        // Start with SWDIO released.  It's the target's job to pull it high.
        gpio.set_low(pins.swclk);
        gpio.set_mode(pins.swdio, PinMode::Float);

        debug!(
            "SWD tap created, SWCLK {} low, SWDIO {} floating",
            pins.swclk, pins.swdio
        );

        Self {
            gpio,
            pins,
            timing: Timing::new(delay),
            speed: Speed::default(),
            direction: Direction::Float,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
        self.timing.set_cycles(speed.half_period_cycles());
        debug!("SWD speed set to {speed:?} (~{}kHz)", speed.speed_khz());
    }

    /// Busy-wait cycles per half clock.  Zero disables the delay.
    pub fn delay_cycles(&self) -> u32 {
        self.timing.cycles()
    }

    pub fn set_delay_cycles(&mut self, cycles: u32) {
        self.timing.set_cycles(cycles);
    }

    /// Current owner of SWDIO
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn pins(&self) -> SwdPins {
        self.pins
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// Drive `ticks` bits of `bits` onto SWDIO, LSB first.
    pub fn seq_out(&mut self, bits: u32, ticks: u32) {
        debug_assert!(ticks <= 32);
        self.turnaround(Direction::Drive);

        let mut bits = bits;
        for _ in 0..ticks {
            self.gpio.set_value(self.pins.swdio, bits & 1 != 0);
            self.clock();
            bits >>= 1;
        }
    }

    /// [`SwdTap::seq_out()`] followed by one even-parity bit over `value`.
    pub fn seq_out_parity(&mut self, value: u32, ticks: u32) {
        self.seq_out(value, ticks);
        self.seq_out(calculate_parity(value) as u32, 1);
    }

    /// Sample `ticks` bits from SWDIO, LSB first.  SWDIO is left floating,
    /// so another input sequence can follow without a turnaround.
    pub fn seq_in(&mut self, ticks: u32) -> u32 {
        debug_assert!(ticks <= 32);
        self.turnaround(Direction::Float);

        let mut value = 0;
        for bit in 0..ticks {
            if self.gpio.get_value(self.pins.swdio) {
                value |= 1 << bit;
            }
            self.clock();
        }
        value
    }

    /// Sample `ticks` bits and a parity bit, then take SWDIO back.
    ///
    /// Returns the value and whether its parity checked out.
    pub fn seq_in_parity(&mut self, ticks: u32) -> (u32, bool) {
        let value = self.seq_in(ticks);
        let parity = self.seq_in(1) != 0;
        self.turnaround(Direction::Drive);

        let parity_ok = calculate_parity(value) == parity;
        if !parity_ok {
            debug!("SWD read parity error: data={value:#010X}, parity={parity}");
        }
        (value, parity_ok)
    }

    /// Line reset: 60 clocks with SWDIO high, then 4 idle clocks low.
    pub fn line_reset(&mut self) {
        trace!("Exec:  SWD line reset");
        self.seq_out(LINE_RESET_HIGH, 32);
        self.seq_out(LINE_RESET_HIGH_THEN_IDLE, 32);
    }

    /// Leave JTAG (or an undefined state) for SWD: at least 50 clocks high,
    /// then the 16-bit JTAG-to-SWD select sequence.  Must be followed by a
    /// [`SwdTap::line_reset()`].
    pub fn jtag_to_swd(&mut self) {
        trace!("Exec:  JTAG-to-SWD");
        self.seq_out(LINE_RESET_HIGH, 32);
        self.seq_out(LINE_RESET_HIGH, 32);
        self.seq_out(JTAG_TO_SWD_SEQUENCE as u32, 16);
    }

    /// Idle clocks with SWDIO driven low
    pub fn idle(&mut self, cycles: u32) {
        let mut remaining = cycles;
        while remaining > 0 {
            let ticks = remaining.min(32);
            self.seq_out(0, ticks);
            remaining -= ticks;
        }
    }

    // A turnaround is one clock with neither side driving.  The probe
    // releases SWDIO before that clock and only drives it again after it.
    fn turnaround(&mut self, direction: Direction) {
        if self.direction == direction {
            return;
        }
        self.direction = direction;

        if direction == Direction::Float {
            self.gpio.set_mode(self.pins.swdio, PinMode::Float);
        }

        self.clock();

        if direction == Direction::Drive {
            self.gpio.set_mode(self.pins.swdio, PinMode::Drive);
        }
    }

    #[inline]
    fn clock(&mut self) {
        self.gpio.set_high(self.pins.swclk);
        self.timing.half_period();
        self.gpio.set_low(self.pins.swclk);
        self.timing.half_period();
    }
}

/// Calculate SWD parity - 1 for an odd number of bits set to 1, 0 otherwise.
pub(crate) fn calculate_parity<T>(value: T) -> bool
where
    T: Into<u64>,
{
    (value.into().count_ones() % 2) == 1
}
