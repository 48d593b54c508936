// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! DP/AP Transactions
//!
//! A [`DapTransport`] carries exactly one DP or AP register transaction per
//! call, over SWD ([`crate::SwdDp`]) or JTAG ([`crate::JtagDp`]).  It reports
//! what the target acknowledged and leaves retry policy, fault tracking and
//! SELECT handling to [`crate::DebugPort`].

use adiprobe_core::arm::dp::{Abort, AbortRegister, IdCode};
use adiprobe_core::arm::register::{RegisterDescriptor, offset};
use core::fmt;

use crate::AdiError;
use crate::swd::calculate_parity;

/// A single DP or AP register transaction
///
/// Each operation contains the register address as a u8 (0x0, 0x4, etc).
/// Only bits 3:2 of the address go on the wire; the bank in bits 7:4 must
/// already be selected.
///
/// SWD request format
/// Bit 0: Start (1)
/// Bit 1: APnDP (0=DP, 1=AP)
/// Bit 2: RnW (0=write, 1=read)
/// Bit 3: A2 (address bit 2)
/// Bit 4: A3 (address bit 3)
/// Bit 5: Parity
/// Bit 6: Stop (0)
/// Bit 7: Park (1)
///
/// ```rust
/// use adiprobe_core::arm::register::RegisterDescriptor;
/// use adiprobe_dap::DapOp;
///
/// let op = DapOp::ApRead(adiprobe_core::arm::map::DrwRegister::ADDRESS);
/// assert_eq!(op.request(), 0x9F);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DapOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl DapOp {
    pub const fn address(&self) -> u8 {
        match self {
            DapOp::DpRead(a) | DapOp::DpWrite(a) | DapOp::ApRead(a) | DapOp::ApWrite(a) => *a,
        }
    }

    pub const fn is_read(&self) -> bool {
        matches!(self, DapOp::DpRead(_) | DapOp::ApRead(_))
    }

    pub const fn is_ap(&self) -> bool {
        matches!(self, DapOp::ApRead(_) | DapOp::ApWrite(_))
    }

    /// The 8-bit SWD request, in transmission (LSB first) order
    pub fn request(&self) -> u8 {
        // start=1, park=1
        let mut request = 0x81;
        if self.is_ap() {
            request |= 1 << 1;
        }
        if self.is_read() {
            request |= 1 << 2;
        }
        request |= offset(self.address()) << 1; // A[3:2] to bits 4:3

        // Parity is calculated using APnDP, RnW and A[3:2]
        let parity = calculate_parity(request & 0x1E) as u8;
        request | (parity << 5)
    }
}

impl fmt::Display for DapOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DapOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            DapOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            DapOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            DapOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

/// What the target acknowledged for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Accepted.  Carries the read data (for DP reads on SWD, the register;
    /// for posted reads, the result of the previous read).  Zero for writes.
    Ok(u32),

    /// Busy, the same transaction should be sent again
    Wait,

    /// A sticky error is set on the DP
    Fault,
}

/// Which wire protocol the DP is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpKind {
    Swd,
    Jtag,
}

/// One-transaction-at-a-time access to a Debug Port
pub trait DapTransport {
    fn kind(&self) -> DpKind;

    /// Bring the link into a known state so that the next transaction is
    /// understood.  Transports that read the IDCODE as part of this return
    /// it.
    fn reset(&mut self) -> Result<Option<IdCode>, AdiError>;

    /// Send one transaction.  Returns `Err` only when the exchange itself
    /// was unintelligible (bad acknowledge, parity failure).
    fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError>;

    /// Write the DP ABORT register.  JTAG-DPs use a dedicated instruction
    /// for this; SW-DPs use a normal DP write.
    fn write_abort(&mut self, abort: Abort) -> Result<Response, AdiError> {
        self.transfer(DapOp::DpWrite(AbortRegister::ADDRESS), abort.into())
    }

    /// Whether DP register reads return the result of the previous read, so
    /// need an RDBUFF read to collect their own result.  True for JTAG-DP.
    fn dp_reads_posted(&self) -> bool {
        false
    }
}

impl<T: DapTransport + ?Sized> DapTransport for &mut T {
    fn kind(&self) -> DpKind {
        (**self).kind()
    }

    fn reset(&mut self) -> Result<Option<IdCode>, AdiError> {
        (**self).reset()
    }

    fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError> {
        (**self).transfer(op, value)
    }

    fn write_abort(&mut self, abort: Abort) -> Result<Response, AdiError> {
        (**self).write_abort(abort)
    }

    fn dp_reads_posted(&self) -> bool {
        (**self).dp_reads_posted()
    }
}
