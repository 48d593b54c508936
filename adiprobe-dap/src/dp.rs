// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port
//!
//! [`DebugPort`] sits on top of a [`DapTransport`] and turns single
//! transactions into register accesses:
//!
//! * WAIT acknowledges are retried, up to [`DebugPort::wait_retries()`]
//!   attempts in total.  When they run out a DAPABORT is written.
//! * FAULT acknowledges (and exhausted WAITs) latch [`DebugPort::fault()`].
//!   While it is latched AP accesses are refused without reaching the wire,
//!   until [`DebugPort::clear_errors()`] or [`DebugPort::abort()`] clears it.
//!   Nothing clears it implicitly.
//! * The last value written to SELECT is remembered, and SELECT is only
//!   written when an access needs a different AP, AP bank or DP bank.
//! * Posted reads are collected from RDBUFF.
//!
//! Once connected, a `DebugPort` is usually shared between its
//! [`crate::AccessPort`]s as a [`DpHandle`].

use alloc::format;
use alloc::rc::Rc;
use core::cell::RefCell;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use adiprobe_core::arm::dp::{
    Abort, AbortRegister, CtrlStat, CtrlStatRegister, IdCode, IdCodeRegister, RdBuffRegister, Select,
    SelectRegister, TargetId, TargetIdRegister,
};
use adiprobe_core::arm::register::{
    DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister, offset,
};

use crate::AdiError;
use crate::transport::{DapOp, DapTransport, DpKind, Response};

/// Default number of attempts at a transaction that keeps getting WAIT
pub const DEFAULT_WAIT_RETRIES: u32 = 8;

/// How many times CTRL/STAT is read waiting for the power-up acknowledges
pub const POWER_UP_POLLS: u32 = 100;

/// A shared [`DebugPort`].  Each [`crate::AccessPort`] holds one share; the
/// port is dropped along with the last share.
pub type DpHandle<T> = Rc<RefCell<DebugPort<T>>>;

/// ARM Debug Port object
///
/// Create with `DebugPort::new()`, passing in a [`DapTransport`], then call
/// [`DebugPort::connect()`].
///
/// ```rust,ignore
/// use adiprobe_core::arm::dp::CtrlStatRegister;
/// use adiprobe_dap::{DebugPort, SwdDp};
///
/// let mut dp = DebugPort::new(SwdDp::new(tap));
/// let idcode = dp.connect()?;
/// let status = dp.read_dp_register(CtrlStatRegister)?;
/// log::info!("IDCODE {idcode} CTRL/STAT {status}");
/// ```
#[derive(Debug)]
pub struct DebugPort<T> {
    transport: T,
    idcode: Option<IdCode>,
    targetid: Option<TargetId>,
    fault: bool,

    // Last value written to SELECT.  None if unknown, for example after a
    // reset or a failed SELECT write.
    select: Option<Select>,

    wait_retries: u32,
    powered_up: bool,
}

impl<T: DapTransport> DebugPort<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            idcode: None,
            targetid: None,
            fault: false,
            select: None,
            wait_retries: DEFAULT_WAIT_RETRIES,
            powered_up: false,
        }
    }

    /// Wrap this port up so it can be shared between APs.
    pub fn into_handle(self) -> DpHandle<T> {
        Rc::new(RefCell::new(self))
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn kind(&self) -> DpKind {
        self.transport.kind()
    }

    /// IDCODE read by the last successful [`DebugPort::connect()`]
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// TARGETID, for SW-DP v2 targets
    pub fn targetid(&self) -> Option<TargetId> {
        self.targetid
    }

    /// Whether a sticky fault is latched.  AP accesses are refused until it
    /// is cleared.
    pub fn fault(&self) -> bool {
        self.fault
    }

    /// Whether the debug and system power domains have acknowledged power up
    pub fn powered_up(&self) -> bool {
        self.powered_up
    }

    /// The SELECT value last written, if known
    pub fn select(&self) -> Option<Select> {
        self.select
    }

    pub fn wait_retries(&self) -> u32 {
        self.wait_retries
    }

    /// Sets the total number of attempts made at a transaction that keeps
    /// getting WAIT.  At least one attempt is always made.
    pub fn set_wait_retries(&mut self, retries: u32) {
        self.wait_retries = retries.max(1);
    }

    /// Resets the link and brings the DP up ready for AP accesses.
    ///
    /// This
    /// - resets the transport (line reset or TAP reset)
    /// - reads the IDCODE, and on SW-DP v2 the TARGETID
    /// - clears any sticky errors
    /// - powers up the debug and system domains.
    pub fn connect(&mut self) -> Result<IdCode, AdiError> {
        debug!("Exec:  Connect {:?}", self.transport.kind());
        self.idcode = None;
        self.targetid = None;
        self.fault = false;
        self.select = None;
        self.powered_up = false;

        let idcode = match self.transport.reset()? {
            Some(idcode) => idcode,
            None => self.read_dp_register(IdCodeRegister)?,
        };
        if !idcode.is_valid() {
            warn!("Error: Invalid IDCODE {idcode}");
            return Err(AdiError::OperationFailed(format!("invalid IDCODE {idcode}")));
        }
        debug!(
            "Value: IDCODE: {idcode} (DPv{}, designer {})",
            idcode.version(),
            idcode.designer()
        );
        self.idcode = Some(idcode);

        if self.transport.kind() == DpKind::Swd && idcode.version() >= 2 {
            let targetid = self.read_dp_register(TargetIdRegister)?;
            debug!("Value: TARGETID: {targetid}");
            self.targetid = Some(targetid);
        }

        self.clear_errors()?;
        self.power_up()?;

        Ok(idcode)
    }

    /// Requests debug and system power up, and waits for both
    /// acknowledges.
    pub fn power_up(&mut self) -> Result<(), AdiError> {
        trace!("Exec:  Power up debug domain");
        let mut request = CtrlStat::default();
        request.set_cdbgpwrupreq(true).set_csyspwrupreq(true);
        self.write_dp_register(CtrlStatRegister, request)?;

        for _ in 0..POWER_UP_POLLS {
            let status = self.read_dp_register(CtrlStatRegister)?;
            if status.powered_up() {
                debug!("OK:    Debug domain powered up {}", status.power_states());
                self.powered_up = true;
                return Ok(());
            }
        }

        warn!("Error: Debug domain power up not acknowledged");
        Err(AdiError::OperationFailed(
            "debug domain power up failed".into(),
        ))
    }

    /// Send one transaction, retrying on WAIT.  Returns the data phase of
    /// the transaction, which for AP reads (and all reads on a JTAG-DP) is
    /// the result of an earlier read.
    ///
    /// Sticky faults are latched here.  An AP transaction while a fault is
    /// latched fails with [`AdiError::ProtocolFault`] without being sent.
    pub fn low_access(&mut self, op: DapOp, value: u32) -> Result<u32, AdiError> {
        self.refuse_if_faulted(op)?;

        let attempts = self.wait_retries.max(1);
        for attempt in 1..=attempts {
            match self.transport.transfer(op, value)? {
                Response::Ok(data) => return Ok(data),
                Response::Wait => {
                    if attempt < attempts {
                        trace!("Retry: {op} {attempt}");
                    }
                }
                Response::Fault => {
                    warn!("Error: {op} FAULT, sticky error latched");
                    self.fault = true;
                    return Err(AdiError::ProtocolFault);
                }
            }
        }

        warn!("Error: {op} WAIT after {attempts} attempts, aborting");
        if let Err(e) = self.transport.write_abort(Abort::DAP_ABORT) {
            debug!("Error: DAPABORT write failed: {e}");
        }
        self.fault = true;
        Err(AdiError::WaitTimeout)
    }

    /// Read a DP register by address.  Bits 7:4 of the address select the
    /// DP register bank, which only applies to address 0x4.
    pub fn dp_read(&mut self, addr: u8) -> Result<u32, AdiError> {
        self.select_dp_bank(addr)?;
        let data = self.low_access(DapOp::DpRead(addr), 0)?;
        if self.transport.dp_reads_posted() {
            self.read_rdbuff()
        } else {
            Ok(data)
        }
    }

    /// Write a DP register by address.  ABORT writes go through
    /// [`DebugPort::abort()`], so clearing the sticky flags also clears the
    /// latched fault.
    pub fn dp_write(&mut self, addr: u8, value: u32) -> Result<(), AdiError> {
        if addr == SelectRegister::ADDRESS {
            return self.write_select(Select::from(value), true);
        }
        if addr == AbortRegister::ADDRESS {
            return self.abort(Abort::new(value));
        }
        self.select_dp_bank(addr)?;
        self.low_access(DapOp::DpWrite(addr), value)?;
        Ok(())
    }

    /// Read an AP register.  Issues the AP read, then collects its result
    /// from RDBUFF.
    pub fn ap_read(&mut self, apsel: u8, addr: u8) -> Result<u32, AdiError> {
        let op = DapOp::ApRead(addr);
        self.refuse_if_faulted(op)?;
        self.select_ap(apsel, addr)?;
        self.low_access(op, 0)?;
        self.read_rdbuff()
    }

    /// Write an AP register.
    pub fn ap_write(&mut self, apsel: u8, addr: u8, value: u32) -> Result<(), AdiError> {
        let op = DapOp::ApWrite(addr);
        self.refuse_if_faulted(op)?;
        self.select_ap(apsel, addr)?;
        self.low_access(op, value)?;
        Ok(())
    }

    /// Read RDBUFF, which holds the result of the last posted read.
    pub fn read_rdbuff(&mut self) -> Result<u32, AdiError> {
        self.low_access(DapOp::DpRead(RdBuffRegister::ADDRESS), 0)
    }

    /// Read a Debug Port register.
    ///
    /// ```rust,ignore
    /// use adiprobe_core::arm::dp::CtrlStatRegister;
    /// let value = dp.read_dp_register(CtrlStatRegister)?;
    /// log::info!("DP CTRL/STAT value: {value}");
    /// ```
    pub fn read_dp_register<R>(&mut self, _reg: R) -> Result<R::Value, AdiError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let raw_data = self.dp_read(R::ADDRESS)?;
        Ok(R::from_raw(raw_data))
    }

    /// Write a Debug Port register.
    pub fn write_dp_register<R>(&mut self, _reg: R, value: R::Value) -> Result<(), AdiError>
    where
        R: WritableRegister + DpRegister,
        R::Value: Into<u32>,
    {
        let raw_data = R::to_raw(value);
        self.dp_write(R::ADDRESS, raw_data)
    }

    /// Point SELECT at `apsel` and the AP register bank `addr` is in.
    pub fn select_ap(&mut self, apsel: u8, addr: u8) -> Result<(), AdiError> {
        let select = self.select.unwrap_or_default().with_ap(apsel, addr);
        self.write_select(select, false)
    }

    /// Reads CTRL/STAT, clears any sticky error flags through ABORT and
    /// clears the latched fault.
    ///
    /// Returns the sticky flags that were set.
    pub fn clear_errors(&mut self) -> Result<CtrlStat, AdiError> {
        trace!("Exec:  Clear errors");
        let status = self.read_dp_register(CtrlStatRegister)?;
        let sticky = status.sticky();

        if sticky.has_errors() {
            warn!("DP status errors detected: {}", status.error_states());
            self.abort(sticky.clearing_abort())?;
        }
        self.fault = false;

        trace!("OK:    Clear errors");
        Ok(sticky)
    }

    /// Write the ABORT register.  If any sticky flag is cleared by `abort`,
    /// the latched fault is cleared too.
    pub fn abort(&mut self, abort: Abort) -> Result<(), AdiError> {
        trace!("Exec:  ABORT {abort}");
        match self.transport.write_abort(abort)? {
            Response::Ok(_) => (),
            Response::Wait | Response::Fault => {
                warn!("Error: ABORT {abort} not accepted");
                return Err(AdiError::OperationFailed(format!("ABORT {abort} not accepted")));
            }
        }

        if abort.clears_sticky() {
            self.fault = false;
        }
        Ok(())
    }

    /// Read CTRL/STAT and fail with [`AdiError::DpError`] if any sticky
    /// error flag is set.  The fault is latched in that case.
    ///
    /// A JTAG-DP has no FAULT acknowledge, so this is how failed AP
    /// transactions show up there.
    pub fn check_errors(&mut self) -> Result<(), AdiError> {
        let status = self.read_dp_register(CtrlStatRegister)?;
        if status.has_errors() {
            warn!("DP status errors detected: {}", status.error_states());
            self.fault = true;
            return Err(AdiError::DpError);
        }
        Ok(())
    }

    fn refuse_if_faulted(&self, op: DapOp) -> Result<(), AdiError> {
        if op.is_ap() && self.fault {
            debug!("Error: {op} refused, sticky fault latched");
            return Err(AdiError::ProtocolFault);
        }
        Ok(())
    }

    // Only address 0x4 is banked
    fn select_dp_bank(&mut self, addr: u8) -> Result<(), AdiError> {
        if offset(addr) != CtrlStatRegister::ADDRESS {
            return Ok(());
        }
        let select = self.select.unwrap_or_default().with_dp_bank(addr);
        self.write_select(select, false)
    }

    fn write_select(&mut self, select: Select, force: bool) -> Result<(), AdiError> {
        if !force && self.select == Some(select) {
            return Ok(());
        }
        trace!("Exec:  Update SELECT {select}");

        // If the write fails the target's SELECT is unknown
        self.select = None;
        self.low_access(DapOp::DpWrite(SelectRegister::ADDRESS), select.into())?;
        self.select = Some(select);
        Ok(())
    }
}
