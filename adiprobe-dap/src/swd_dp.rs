// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! SW-DP Transport
//!
//! Frames DP/AP transactions as SWD packets on an [`SwdTap`]:
//!
//! ```text
//! host   | request (8) | trn |            | trn | data (32) | parity | idle (8)   write
//! target |             |     | ack (3)    |     |           |        |
//!
//! host   | request (8) | trn |            |                          | trn        read
//! target |             |     | ack (3)    | data (32) | parity       |
//! ```
//!
//! The turnarounds come from the [`SwdTap`] direction tracking, so nothing
//! here clocks them explicitly.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use adiprobe_core::arm::dp::{IdCode, TargetSel, TargetSelRegister};
use adiprobe_core::arm::register::RegisterDescriptor;

use crate::AdiError;
use crate::gpio::Gpio;
use crate::swd::SwdTap;
use crate::timing::Delay;
use crate::transport::{DapOp, DapTransport, DpKind, Response};

const ACK_OK: u32 = 0b001;
const ACK_WAIT: u32 = 0b010;
const ACK_FAULT: u32 = 0b100;

// Idle clocks after the data phase of a write, so the target can complete
// the write before the next request
const WRITE_IDLE_CYCLES: u32 = 8;

// Idle clocks after a TARGETSEL write
const TARGET_SEL_IDLE_CYCLES: u32 = 2;

/// SWD implementation of [`DapTransport`]
///
/// Create with `SwdDp::new()`, passing an [`SwdTap`].  For multi-drop (DPv2)
/// targets also call [`SwdDp::set_target_sel()`] so that the target is
/// selected as part of each reset.
#[derive(Debug)]
pub struct SwdDp<G, D> {
    tap: SwdTap<G, D>,
    target_sel: Option<TargetSel>,
}

impl<G: Gpio, D: Delay> SwdDp<G, D> {
    pub fn new(tap: SwdTap<G, D>) -> Self {
        Self {
            tap,
            target_sel: None,
        }
    }

    /// The TARGETSEL value written after each line reset, if any
    pub fn target_sel(&self) -> Option<TargetSel> {
        self.target_sel
    }

    pub fn set_target_sel(&mut self, target_sel: Option<TargetSel>) {
        self.target_sel = target_sel;
    }

    pub fn tap(&self) -> &SwdTap<G, D> {
        &self.tap
    }

    pub fn tap_mut(&mut self) -> &mut SwdTap<G, D> {
        &mut self.tap
    }

    pub fn into_tap(self) -> SwdTap<G, D> {
        self.tap
    }

    /// Write TARGETSEL.  Selects one DP on a multi-drop bus.  Must directly
    /// follow a line reset.
    ///
    /// No target drives an ACK for this write, so the host clocks five
    /// undriven cycles in its place before sending the data.
    pub fn write_target_sel(&mut self, target_sel: TargetSel) {
        let op = DapOp::DpWrite(TargetSelRegister::ADDRESS);
        let request = op.request();
        trace!("Exec:  {op} SWD: {request:#04X} {target_sel}");

        self.tap.seq_out(request as u32, 8);

        // The turnaround into and out of the floating state supply two of the
        // five undriven cycles
        self.tap.seq_in(3);
        self.tap.seq_out_parity(target_sel.data(), 32);
        self.tap.idle(TARGET_SEL_IDLE_CYCLES);

        trace!("OK:    {op}");
    }
}

impl<G: Gpio, D: Delay> DapTransport for SwdDp<G, D> {
    fn kind(&self) -> DpKind {
        DpKind::Swd
    }

    fn reset(&mut self) -> Result<Option<IdCode>, AdiError> {
        trace!("Exec:  Reset SWD");
        self.tap.jtag_to_swd();
        self.tap.line_reset();

        if let Some(target_sel) = self.target_sel {
            self.write_target_sel(target_sel);
        }

        // The IDCODE read that has to follow is left to the DP
        Ok(None)
    }

    fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError> {
        let request = op.request();
        if op.is_read() {
            trace!("Exec:  {op}  SWD: {request:#04X}");
        } else {
            trace!("Exec:  {op} SWD: {request:#04X} {value:#010X}");
        }

        self.tap.seq_out(request as u32, 8);
        let ack = self.tap.seq_in(3);

        match ack {
            ACK_OK => (),
            ACK_WAIT => {
                trace!("Wait:  {op}");
                return Ok(Response::Wait);
            }
            ACK_FAULT => {
                debug!("Error: {op} FAULT ACK");
                return Ok(Response::Fault);
            }
            _ => {
                // The line has been left floating; a line reset is needed to
                // resynchronise
                debug!("Error: {op} invalid ACK {ack:#05b}");
                return Err(AdiError::NoAck(ack as u8));
            }
        }

        if op.is_read() {
            let (data, parity_ok) = self.tap.seq_in_parity(32);
            if !parity_ok {
                return Err(AdiError::ParityError);
            }
            trace!("OK:    {op}            {data:#010X}");
            Ok(Response::Ok(data))
        } else {
            self.tap.seq_out_parity(value, 32);
            self.tap.idle(WRITE_IDLE_CYCLES);
            trace!("OK:    {op}");
            Ok(Response::Ok(0))
        }
    }
}
