// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! JTAG-DP Transport
//!
//! Frames DP/AP transactions as 35-bit DR scans on a [`JtagTap`]:
//!
//! ```text
//!  34                 3   2   1   0
//! | DATA[31:0]         | A[3:2] | RnW |   shifted in
//! | DATA[31:0]         |   ACK[2:0]   |   shifted out
//! ```
//!
//! A JTAG-DP returns the result of the *previous* transaction in each scan,
//! so reads are always posted.  WAIT means the previous transaction has not
//! completed and this one was ignored.  There is no FAULT acknowledge; sticky
//! errors must be read from CTRL/STAT.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use adiprobe_core::arm::dp::{Abort, IdCode};

use crate::AdiError;
use crate::gpio::Gpio;
use crate::jtag::JtagTap;
use crate::timing::Delay;
use crate::transport::{DapOp, DapTransport, DpKind, Response};

/// JTAG-DP instruction register values
pub mod ir {
    pub const ABORT: u8 = 0x8;
    pub const DPACC: u8 = 0xA;
    pub const APACC: u8 = 0xB;
    pub const IDCODE: u8 = 0xE;
    pub const BYPASS: u8 = 0xF;
}

const ACK_OK_FAULT: u8 = 0b010;
const ACK_WAIT: u8 = 0b001;

const DR_ACC_LEN: usize = 35;
const DR_IDCODE_LEN: usize = 32;

/// Where the JTAG-DP sits on the scan chain
///
/// Prescan counts are for the devices between the DP and TDO, which are
/// clocked first; postscan counts are for the devices between TDI and the
/// DP.  Every other device is expected to be in BYPASS, so its DR is one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JtagDevice {
    pub ir_len: u8,
    pub ir_prescan: u32,
    pub ir_postscan: u32,
    pub dr_prescan: u32,
    pub dr_postscan: u32,
}

impl JtagDevice {
    /// ARM JTAG-DPs have a 4-bit IR
    pub const ARM_IR_LEN: u8 = 4;

    pub const fn new(ir_len: u8) -> Self {
        Self {
            ir_len,
            ir_prescan: 0,
            ir_postscan: 0,
            dr_prescan: 0,
            dr_postscan: 0,
        }
    }

    pub const fn with_ir_scan(mut self, prescan: u32, postscan: u32) -> Self {
        self.ir_prescan = prescan;
        self.ir_postscan = postscan;
        self
    }

    pub const fn with_dr_scan(mut self, prescan: u32, postscan: u32) -> Self {
        self.dr_prescan = prescan;
        self.dr_postscan = postscan;
        self
    }
}

impl Default for JtagDevice {
    fn default() -> Self {
        Self::new(Self::ARM_IR_LEN)
    }
}

/// JTAG implementation of [`DapTransport`]
#[derive(Debug)]
pub struct JtagDp<G, D> {
    tap: JtagTap<G, D>,
    device: JtagDevice,

    // Last instruction shifted, None after a reset
    current_ir: Option<u8>,
}

impl<G: Gpio, D: Delay> JtagDp<G, D> {
    pub fn new(tap: JtagTap<G, D>, device: JtagDevice) -> Self {
        Self {
            tap,
            device,
            current_ir: None,
        }
    }

    pub fn device(&self) -> JtagDevice {
        self.device
    }

    pub fn tap(&self) -> &JtagTap<G, D> {
        &self.tap
    }

    pub fn tap_mut(&mut self) -> &mut JtagTap<G, D> {
        &mut self.tap
    }

    pub fn into_tap(self) -> JtagTap<G, D> {
        self.tap
    }

    /// Load an instruction, unless it is already loaded.
    pub fn write_ir(&mut self, ir: u8) -> Result<(), AdiError> {
        if self.current_ir == Some(ir) {
            return Ok(());
        }
        trace!("Exec:  JTAG IR {ir:#03X}");

        let device = self.device;
        self.tap.shift_ir();
        self.tap.shift_constant(true, false, device.ir_prescan);
        self.tap.tdi_seq(
            device.ir_postscan == 0,
            &(ir as u32).to_le_bytes(),
            device.ir_len as usize,
        )?;
        self.tap.shift_constant(true, true, device.ir_postscan);
        self.tap.return_idle();

        self.current_ir = Some(ir);
        Ok(())
    }

    /// Scan `ticks` bits through the DP's DR, returning what was shifted out.
    fn scan_dr(&mut self, value: u64, ticks: usize) -> Result<u64, AdiError> {
        let device = self.device;
        let input = value.to_le_bytes();
        let mut output = [0u8; 8];

        self.tap.shift_dr();
        self.tap.shift_constant(true, false, device.dr_prescan);
        self.tap
            .tdi_tdo_seq(Some(&mut output), device.dr_postscan == 0, &input, ticks)?;
        self.tap.shift_constant(true, true, device.dr_postscan);
        self.tap.return_idle();

        Ok(u64::from_le_bytes(output))
    }

    fn scan_acc(&mut self, ir: u8, addr: u8, read: bool, value: u32) -> Result<(u8, u32), AdiError> {
        self.write_ir(ir)?;
        let request = ((value as u64) << 3) | (((addr as u64) >> 1) & 0x6) | read as u64;
        let result = self.scan_dr(request, DR_ACC_LEN)?;
        Ok(((result & 0x7) as u8, (result >> 3) as u32))
    }
}

impl<G: Gpio, D: Delay> DapTransport for JtagDp<G, D> {
    fn kind(&self) -> DpKind {
        DpKind::Jtag
    }

    fn reset(&mut self) -> Result<Option<IdCode>, AdiError> {
        trace!("Exec:  Reset JTAG");
        self.tap.reset();
        self.current_ir = None;

        self.write_ir(ir::IDCODE)?;
        let idcode = IdCode::new(self.scan_dr(0, DR_IDCODE_LEN)? as u32);
        trace!("Value: IDCODE: {idcode}");
        Ok(Some(idcode))
    }

    fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError> {
        let ir = if op.is_ap() { ir::APACC } else { ir::DPACC };
        if op.is_read() {
            trace!("Exec:  {op}  JTAG");
        } else {
            trace!("Exec:  {op} JTAG {value:#010X}");
        }

        let (ack, data) = self.scan_acc(ir, op.address(), op.is_read(), value)?;
        match ack {
            ACK_OK_FAULT => {
                trace!("OK:    {op}            {data:#010X}");
                Ok(Response::Ok(data))
            }
            ACK_WAIT => {
                trace!("Wait:  {op}");
                Ok(Response::Wait)
            }
            _ => {
                debug!("Error: {op} invalid ACK {ack:#05b}");
                Err(AdiError::NoAck(ack))
            }
        }
    }

    fn write_abort(&mut self, abort: Abort) -> Result<Response, AdiError> {
        trace!("Exec:  JTAG ABORT {abort}");
        // The acknowledge of an ABORT scan carries no information
        self.scan_acc(ir::ABORT, 0, false, abort.into())?;
        Ok(Response::Ok(0))
    }

    fn dp_reads_posted(&self) -> bool {
        true
    }
}
