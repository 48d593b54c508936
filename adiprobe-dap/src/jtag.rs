// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! JTAG TAP
//!
//! [`JtagTap`] clocks TMS/TDI/TDO sequences.  Each clock sets TMS and TDI
//! with TCK low, raises TCK (the target latches TMS and TDI on this edge),
//! samples TDO, then lowers TCK again.
//!
//! Data is shifted LSB first, starting at bit 0 of byte 0 of the buffer.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::AdiError;
use crate::gpio::{Gpio, Pin};
use crate::timing::{Delay, Speed, Timing};

// TMS sequences, LSB first, from Run-Test/Idle (or any state for the reset)
const TMS_SOFT_RESET: (u32, u32) = (0x1F, 6); // 1, 1, 1, 1, 1, 0
const TMS_SHIFT_IR: (u32, u32) = (0x03, 4); // 1, 1, 0, 0
const TMS_SHIFT_DR: (u32, u32) = (0x01, 3); // 1, 0, 0
const TMS_RETURN_IDLE: (u32, u32) = (0x01, 2); // 1, 0

// Length of the TRST low pulse, in delay cycles
const TRST_PULSE_CYCLES: u32 = 10_000;

/// The JTAG pins.  TRST is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JtagPins {
    pub tck: Pin,
    pub tms: Pin,
    pub tdi: Pin,
    pub tdo: Pin,
    pub trst: Option<Pin>,
}

impl JtagPins {
    pub const fn new(tck: Pin, tms: Pin, tdi: Pin, tdo: Pin) -> Self {
        Self {
            tck,
            tms,
            tdi,
            tdo,
            trst: None,
        }
    }

    pub const fn with_trst(mut self, trst: Pin) -> Self {
        self.trst = Some(trst);
        self
    }
}

/// JTAG TAP sequence layer
#[derive(Debug)]
pub struct JtagTap<G, D> {
    gpio: G,
    pins: JtagPins,
    timing: Timing<D>,
    speed: Speed,
}

impl<G: Gpio, D: Delay> JtagTap<G, D> {
    pub fn new(mut gpio: G, pins: JtagPins, delay: D) -> Self {
        gpio.set_low(pins.tck);
        gpio.set_high(pins.tms);
        gpio.set_high(pins.tdi);
        if let Some(trst) = pins.trst {
            gpio.set_high(trst);
        }

        debug!(
            "JTAG tap created, TCK {} TMS {} TDI {} TDO {}",
            pins.tck, pins.tms, pins.tdi, pins.tdo
        );

        Self {
            gpio,
            pins,
            timing: Timing::new(delay),
            speed: Speed::default(),
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
        self.timing.set_cycles(speed.half_period_cycles());
        debug!("JTAG speed set to {speed:?} (~{}kHz)", speed.speed_khz());
    }

    pub fn delay_cycles(&self) -> u32 {
        self.timing.cycles()
    }

    pub fn set_delay_cycles(&mut self, cycles: u32) {
        self.timing.set_cycles(cycles);
    }

    pub fn pins(&self) -> JtagPins {
        self.pins
    }

    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// Pulse TRST (if fitted), then force Test-Logic-Reset with TMS high and
    /// finish in Run-Test/Idle.
    pub fn reset(&mut self) {
        trace!("Exec:  JTAG reset");
        if let Some(trst) = self.pins.trst {
            self.gpio.set_low(trst);
            self.timing.wait(TRST_PULSE_CYCLES);
            self.gpio.set_high(trst);
        }
        self.tms_seq(TMS_SOFT_RESET.0, TMS_SOFT_RESET.1);
    }

    /// One TAP state transition.  Returns TDO as sampled after the rising
    /// edge.
    pub fn next(&mut self, tms: bool, tdi: bool) -> bool {
        self.gpio.set_value(self.pins.tms, tms);
        self.gpio.set_value(self.pins.tdi, tdi);
        self.gpio.set_high(self.pins.tck);
        self.timing.half_period();
        let tdo = self.gpio.get_value(self.pins.tdo);
        self.gpio.set_low(self.pins.tck);
        self.timing.half_period();
        tdo
    }

    /// Clock `ticks` bits of `bits` onto TMS, LSB first, with TDI held high.
    pub fn tms_seq(&mut self, bits: u32, ticks: u32) {
        debug_assert!(ticks <= 32);
        let mut bits = bits;
        for _ in 0..ticks {
            self.next(bits & 1 != 0, true);
            bits >>= 1;
        }
    }

    /// Shift `ticks` bits of `input` into TDI while capturing TDO into
    /// `output`, if given.  TMS is low except on the final clock, where it
    /// is `final_tms`.
    ///
    /// Bits of the last output byte beyond `ticks` are cleared.
    pub fn tdi_tdo_seq(
        &mut self,
        output: Option<&mut [u8]>,
        final_tms: bool,
        input: &[u8],
        ticks: usize,
    ) -> Result<(), AdiError> {
        let bytes = ticks.div_ceil(8);
        if input.len() < bytes {
            warn!("Error: JTAG input buffer {} bytes, need {bytes}", input.len());
            return Err(AdiError::Api);
        }

        match output {
            Some(output) => {
                if output.len() < bytes {
                    warn!("Error: JTAG output buffer {} bytes, need {bytes}", output.len());
                    return Err(AdiError::Api);
                }
                output[..bytes].fill(0);
                for bit in 0..ticks {
                    let tdi = input[bit / 8] & (1 << (bit % 8)) != 0;
                    if self.next(final_tms && bit == ticks - 1, tdi) {
                        output[bit / 8] |= 1 << (bit % 8);
                    }
                }
            }
            None => self.shift_discard(final_tms, input, ticks),
        }
        Ok(())
    }

    /// Shift `ticks` bits of `input` into TDI, discarding TDO.
    pub fn tdi_seq(&mut self, final_tms: bool, input: &[u8], ticks: usize) -> Result<(), AdiError> {
        self.tdi_tdo_seq(None, final_tms, input, ticks)
    }

    /// As [`JtagTap::tdi_tdo_seq()`], with TDO overwriting the bits of `buf`
    /// as they are shifted out.
    pub fn shift_in_place(
        &mut self,
        buf: &mut [u8],
        final_tms: bool,
        ticks: usize,
    ) -> Result<(), AdiError> {
        let bytes = ticks.div_ceil(8);
        if buf.len() < bytes {
            warn!("Error: JTAG buffer {} bytes, need {bytes}", buf.len());
            return Err(AdiError::Api);
        }

        for bit in 0..ticks {
            let mask = 1 << (bit % 8);
            let byte = &mut buf[bit / 8];
            let tdi = *byte & mask != 0;
            let tdo = self.next(final_tms && bit == ticks - 1, tdi);
            if tdo {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
        if ticks % 8 != 0 {
            buf[bytes - 1] &= (1 << (ticks % 8)) - 1;
        }
        Ok(())
    }

    /// Shift `ticks` copies of `value` into TDI, for example to fill the
    /// BYPASS registers of other devices on the chain.
    pub fn shift_constant(&mut self, value: bool, final_tms: bool, ticks: u32) {
        for bit in 0..ticks {
            self.next(final_tms && bit == ticks - 1, value);
        }
    }

    /// Run-Test/Idle to Shift-IR
    pub fn shift_ir(&mut self) {
        self.tms_seq(TMS_SHIFT_IR.0, TMS_SHIFT_IR.1);
    }

    /// Run-Test/Idle to Shift-DR
    pub fn shift_dr(&mut self) {
        self.tms_seq(TMS_SHIFT_DR.0, TMS_SHIFT_DR.1);
    }

    /// Exit1-IR/DR to Run-Test/Idle via Update-IR/DR
    pub fn return_idle(&mut self) {
        self.tms_seq(TMS_RETURN_IDLE.0, TMS_RETURN_IDLE.1);
    }

    fn shift_discard(&mut self, final_tms: bool, input: &[u8], ticks: usize) {
        for bit in 0..ticks {
            let tdi = input[bit / 8] & (1 << (bit % 8)) != 0;
            self.next(final_tms && bit == ticks - 1, tdi);
        }
    }
}
