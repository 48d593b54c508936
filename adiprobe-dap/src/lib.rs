// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! adiprobe-dap library
//!
//! Probe-side implementation of the
//! [ARM Debug Interface v5](https://developer.arm.com/documentation/ihi0031/latest/)
//! over bit-banged JTAG or SWD.
//!
//! It is `no_std`, requires an `alloc` implementation, and is generic over
//! the GPIO and delay facilities of the host it runs on.
//!
//! The following diagram shows the key `adiprobe-dap` concepts.
//!
//! ```text
//!      Debugger logic     (GDB server, flash loaders, target drivers)
//! ----------------------
//!   Scanner/discover_aps  \
//! ----------------------   \
//!   AccessPort (MEM-AP)     \
//! ----------------------     |--  AdiError
//!       DebugPort           /
//! ----------------------   /
//!   SwdDp    |   JtagDp   /          DapTransport
//! ----------------------
//!   SwdTap   |   JtagTap             bit sequences
//! ----------------------
//!      Gpio + Delay      >=========<   Target
//! ```
//!
//! * [`Gpio`] and [`Delay`] are the capabilities the host provides.
//! * [`SwdTap`] and [`JtagTap`] clock bit sequences on the pins.
//! * [`SwdDp`] and [`JtagDp`] frame a single DP or AP transaction on those
//!   sequences, implementing [`DapTransport`].
//! * [`DebugPort`] adds WAIT retries, sticky fault tracking, SELECT caching
//!   and posted read handling on top of a transport.
//! * [`AccessPort`] performs memory access through a MEM-AP.
//! * [`Scanner`] walks CoreSight ROM tables behind an AP.
//!
//! `adiprobe-dap` uses and is designed to be used alongside the
//! [`adiprobe_core`] library, which provides the register definitions.
//!
//! A typical session:
//!
//! ```rust,ignore
//! use adiprobe_dap::{DebugPort, SwdDp, SwdPins, SwdTap, SpinDelay, discover_aps, Scanner};
//!
//! let tap = SwdTap::new(gpio, SwdPins::new(swclk, swdio), SpinDelay);
//! let mut dp = DebugPort::new(SwdDp::new(tap));
//! let idcode = dp.connect()?;
//!
//! let dp = dp.into_handle();
//! for ap in discover_aps(&dp)? {
//!     let report = Scanner::new(&ap).scan()?;
//!     for component in report.components {
//!         log::info!("{component}");
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]

pub mod ap;
pub mod dp;
pub mod gpio;
pub mod jtag;
pub mod jtag_dp;
pub mod scan;
pub mod swd;
pub mod swd_dp;
pub mod timing;
pub mod transport;

#[doc(inline)]
pub use crate::ap::{AccessPort, Align, ApHandle};
#[doc(inline)]
pub use crate::dp::{DebugPort, DpHandle};
#[doc(inline)]
pub use crate::gpio::{Gpio, Pin, PinMode};
#[doc(inline)]
pub use crate::jtag::{JtagPins, JtagTap};
#[doc(inline)]
pub use crate::jtag_dp::{JtagDevice, JtagDp};
#[doc(inline)]
pub use crate::scan::{ComponentDescriptor, ScanReport, Scanner, Unexplored, discover_aps};
#[doc(inline)]
pub use crate::swd::{Direction, SwdPins, SwdTap};
#[doc(inline)]
pub use crate::swd_dp::SwdDp;
#[doc(inline)]
pub use crate::timing::{Delay, SpinDelay, Speed};
#[doc(inline)]
pub use crate::transport::{DapOp, DapTransport, DpKind, Response};

extern crate alloc;
use alloc::format;
use alloc::string::String;
use core::fmt;
use serde::Serialize;

/// Core error type used by all adiprobe-dap objects
///
/// Methods are provided to make it easier to handle errors, by checking what
/// is required to recover:
///
/// - [`AdiError::requires_retry()`]
/// - [`AdiError::requires_abort()`]
/// - [`AdiError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdiError {
    /// The target kept answering WAIT for more attempts than the
    /// [`DebugPort`] retry bound allows.  A DAPABORT has been issued and the
    /// DP fault flag is set.
    WaitTimeout,

    /// The target answered FAULT, or an AP access was refused without
    /// being sent because a previous FAULT is still latched.  The sticky
    /// error must be cleared with [`DebugPort::clear_errors()`] (or an
    /// explicit [`DebugPort::abort()`]) before AP accesses resume.
    ProtocolFault,

    /// The acknowledge phase matched none of OK, WAIT or FAULT.  The value
    /// received is included; 7 means SWDIO stayed high for the whole phase,
    /// which usually means no target is driving the line.
    NoAck(u8),

    /// The parity bit of read data did not match the data.  The value read
    /// cannot be trusted.  Usually noise, or clocking too fast for the wiring
    /// or the target.
    ParityError,

    /// A ROM table branch went deeper than the scanner's bound.  Reported
    /// against the branch in a [`ScanReport`], not returned from the scan.
    DepthExceeded,

    /// The DP CTRL/STAT register reported a sticky error.  JTAG-DPs report
    /// faults this way rather than through the acknowledge.
    DpError,

    /// There was no protocol level error, but the requested operation did
    /// not take effect, for example the debug domain never acknowledged a
    /// power-up request.
    OperationFailed(String),

    /// The API was called incorrectly.
    Api,

    /// The requested operation is not supported by this port.
    Unsupported,
}

impl AdiError {
    /// Returns true if the error is transient and the operation can simply
    /// be retried.
    pub fn requires_retry(&self) -> bool {
        matches!(self, AdiError::WaitTimeout | AdiError::ParityError)
    }

    /// Returns true if sticky errors must be cleared with an ABORT write
    /// before further AP accesses will succeed.
    pub fn requires_abort(&self) -> bool {
        matches!(
            self,
            AdiError::WaitTimeout | AdiError::ProtocolFault | AdiError::DpError
        )
    }

    /// Returns true if the line has probably lost synchronisation and a new
    /// [`DebugPort::connect()`] is needed.
    pub fn requires_reset(&self) -> bool {
        matches!(self, AdiError::NoAck(_))
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdiError::WaitTimeout => "Wait Timeout",
            AdiError::ProtocolFault => "Protocol Fault",
            AdiError::NoAck(_) => "No ACK",
            AdiError::ParityError => "Parity Error",
            AdiError::DepthExceeded => "Depth Exceeded",
            AdiError::DpError => "Debug Port Error",
            AdiError::OperationFailed(_) => "Operation Failed",
            AdiError::Api => "API Error",
            AdiError::Unsupported => "Unsupported Operation",
        }
    }
}

impl Serialize for AdiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("AdiError", 2)?;

        let kind = match self {
            AdiError::WaitTimeout => "wait timeout",
            AdiError::ProtocolFault => "protocol fault",
            AdiError::NoAck(_) => "no ack",
            AdiError::ParityError => "parity",
            AdiError::DepthExceeded => "depth exceeded",
            AdiError::DpError => "debug port",
            AdiError::OperationFailed(_) => "operation failed",
            AdiError::Api => "api error",
            AdiError::Unsupported => "unsupported",
        };
        state.serialize_field("kind", kind)?;

        let detail = match self {
            AdiError::OperationFailed(msg) => msg.clone(),
            AdiError::NoAck(code) => format!("{code}"),
            _ => String::new(),
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}

impl fmt::Display for AdiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdiError::NoAck(ack) => write!(f, "{}: {ack:#05b}", self.as_str()),
            AdiError::OperationFailed(msg) => write!(f, "{}: {msg}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}
