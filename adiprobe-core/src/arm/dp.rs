// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Debug Port Registers

use crate::arm::Designer;
use crate::{register, register_data_r, register_data_rw, register_data_w, register_flags};
use alloc::{format, string::String, vec::Vec};
use core::fmt;

register!(
    /// IDCODE (DPIDR) Register descriptor (read-only)
    IdCodeRegister,
    0x00,
    IdCode,
    DpRegister,
    read
);

/// ARM Debug Port IDCODE register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

register_data_r!(IdCode);

impl IdCode {
    const VERSION_MASK: u32 = 0xF;
    const VERSION_SHIFT: u32 = 12;
    const MIN: u32 = 1 << 16;

    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    /// Get revision field (bits 31:28)
    pub const fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// Get part number (bits 27:20)
    pub const fn part_number(&self) -> u8 {
        ((self.0 >> 20) & 0xFF) as u8
    }

    /// DP architecture version (bits 15:12).  0 for the ADIv5.0 JTAG-DP, 1
    /// for DPv1 and 2 for DPv2, which adds TARGETID and multi-drop.
    pub const fn version(&self) -> u8 {
        ((self.0 >> Self::VERSION_SHIFT) & Self::VERSION_MASK) as u8
    }

    /// Minimal debug port (no pushed operations, no transaction counter)
    pub const fn min(&self) -> bool {
        self.0 & Self::MIN != 0
    }

    /// Raw JEDEC designer field (bits 11:1)
    pub const fn designer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Designer, repacked to the same form as CoreSight PIDRs use
    pub fn designer(&self) -> Designer {
        let raw = self.designer_id();
        Designer(((raw >> 7) & 0xF) << 8 | (raw & 0x7F))
    }

    /// LSB must read as one for a valid IDCODE.  An all-ones value is a
    /// floating data line rather than a target.
    pub const fn is_valid(&self) -> bool {
        (self.0 & 1) == 1 && self.0 != 0xFFFF_FFFF
    }

    /// Check if this is an ARM Debug Port
    pub fn is_arm_debug_port(&self) -> bool {
        self.designer_id() == 0x23B && self.part_number() == 0xBA
    }
}

impl fmt::LowerHex for IdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

register!(
    /// ABORT Register descriptor (write-only)
    AbortRegister,
    0x00,
    Abort,
    DpRegister,
    write
);

/// ARM Debug Port ABORT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

register_data_w!(Abort);

impl Abort {
    const DAPABORT: u32 = 1 << 0;
    const STKCMPCLR: u32 = 1 << 1;
    const STKERRCLR: u32 = 1 << 2;
    const WDERRCLR: u32 = 1 << 3;
    const ORUNERRCLR: u32 = 1 << 4;
    const CLEAR_MASK: u32 =
        Self::STKCMPCLR | Self::STKERRCLR | Self::WDERRCLR | Self::ORUNERRCLR;

    /// Cancels the transaction that is holding the DP in WAIT
    pub const DAP_ABORT: Abort = Abort(Self::DAPABORT);

    /// Clears every sticky error flag
    pub const CLEAR_ALL: Abort = Abort(Self::CLEAR_MASK);

    pub const fn new(value: u32) -> Self {
        Abort(value)
    }

    /// Whether writing this value clears at least one sticky flag
    pub const fn clears_sticky(&self) -> bool {
        self.0 & Self::CLEAR_MASK != 0
    }
}

register_flags!(Abort {
    dapabort / set_dapabort = Abort::DAPABORT;
    stkcmpclr / set_stkcmpclr = Abort::STKCMPCLR;
    stkerrclr / set_stkerrclr = Abort::STKERRCLR;
    wderrclr / set_wderrclr = Abort::WDERRCLR;
    orunerrclr / set_orunerrclr = Abort::ORUNERRCLR;
});

register!(
    /// CTRL/STAT Register descriptor (read-write, DP bank 0)
    CtrlStatRegister,
    0x04,
    CtrlStat,
    DpRegister,
    read,
    write
);

/// ARM Debug Port CTRL/STAT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

register_data_rw!(CtrlStat);

impl CtrlStat {
    const ORUNDETECT: u32 = 1 << 0;
    const STICKYORUN: u32 = 1 << 1;
    const STICKYCMP: u32 = 1 << 4;
    const STICKYERR: u32 = 1 << 5;
    const READOK: u32 = 1 << 6;
    const WDATAERR: u32 = 1 << 7;

    const TRNCNT_MASK: u32 = 0xFFF;
    const TRNCNT_SHIFT: u32 = 12;

    const CDBGRSTREQ: u32 = 1 << 26;
    const CDBGRSTACK: u32 = 1 << 27;
    const CDBGPWRUPREQ: u32 = 1 << 28;
    const CDBGPWRUPACK: u32 = 1 << 29;
    const CSYSPWRUPREQ: u32 = 1 << 30;
    const CSYSPWRUPACK: u32 = 1 << 31;

    /// Every bit that latches until cleared through ABORT
    pub const STICKY_MASK: u32 =
        Self::STICKYORUN | Self::STICKYCMP | Self::STICKYERR | Self::WDATAERR;

    pub const fn new(value: u32) -> Self {
        CtrlStat(value)
    }

    /// Get raw register value
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Get transaction count
    pub const fn trncnt(&self) -> u32 {
        (self.0 >> Self::TRNCNT_SHIFT) & Self::TRNCNT_MASK
    }

    /// Only the sticky error flags
    pub const fn sticky(&self) -> CtrlStat {
        CtrlStat(self.0 & Self::STICKY_MASK)
    }

    pub const fn has_errors(&self) -> bool {
        self.0 & Self::STICKY_MASK != 0
    }

    /// The ABORT value that clears exactly the sticky flags set here
    pub fn clearing_abort(&self) -> Abort {
        let mut abort = Abort::default();
        abort
            .set_orunerrclr(self.stickyorun())
            .set_stkcmpclr(self.stickycmp())
            .set_stkerrclr(self.stickyerr())
            .set_wderrclr(self.wdataerr());
        abort
    }

    /// Both power domains requested and acknowledged
    pub const fn powered_up(&self) -> bool {
        self.cdbgpwrupack() && self.csyspwrupack()
    }

    /// Get error state description
    pub fn error_states(&self) -> String {
        let errors: Vec<&str> = [
            (self.stickyorun(), "STICKYORUN"),
            (self.stickycmp(), "STICKYCMP"),
            (self.stickyerr(), "STICKYERR"),
            (self.wdataerr(), "WDATAERR"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();

        if errors.is_empty() {
            format!("No errors{}", if self.readok() { " (READOK)" } else { "" })
        } else {
            format!("Errors: {}", errors.join(", "))
        }
    }

    /// Get power state description
    pub fn power_states(&self) -> String {
        format!(
            "Debug: {}/{}, System: {}/{}",
            if self.cdbgpwrupreq() { "REQ" } else { "off" },
            if self.cdbgpwrupack() { "ACK" } else { "nak" },
            if self.csyspwrupreq() { "REQ" } else { "off" },
            if self.csyspwrupack() { "ACK" } else { "nak" }
        )
    }
}

register_flags!(CtrlStat {
    orundetect / set_orundetect = CtrlStat::ORUNDETECT;
    stickyorun / set_stickyorun = CtrlStat::STICKYORUN;
    stickycmp / set_stickycmp = CtrlStat::STICKYCMP;
    stickyerr / set_stickyerr = CtrlStat::STICKYERR;
    readok = CtrlStat::READOK;
    wdataerr / set_wdataerr = CtrlStat::WDATAERR;
    cdbgrstreq / set_cdbgrstreq = CtrlStat::CDBGRSTREQ;
    cdbgrstack = CtrlStat::CDBGRSTACK;
    cdbgpwrupreq / set_cdbgpwrupreq = CtrlStat::CDBGPWRUPREQ;
    cdbgpwrupack = CtrlStat::CDBGPWRUPACK;
    csyspwrupreq / set_csyspwrupreq = CtrlStat::CSYSPWRUPREQ;
    csyspwrupack = CtrlStat::CSYSPWRUPACK;
});

register!(
    /// SELECT Register descriptor (read-write)
    SelectRegister,
    0x08,
    Select,
    DpRegister,
    read,
    write
);

/// ARM Debug Port SELECT register data
///
/// `APSEL` in bits 31:24, `APBANKSEL` in bits 7:4 and `DPBANKSEL` in bits 3:0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

register_data_rw!(Select);

impl Select {
    const APSEL_MASK: u32 = 0xFF;
    const APSEL_SHIFT: u32 = 24;

    const APBANKSEL_MASK: u32 = 0xF;
    const APBANKSEL_SHIFT: u32 = 4;

    const DPBANKSEL_MASK: u32 = 0xF;

    pub const fn new(apsel: u8, apbanksel: u8, dpbanksel: u8) -> Self {
        Select(
            (apsel as u32) << Self::APSEL_SHIFT
                | ((apbanksel as u32) & Self::APBANKSEL_MASK) << Self::APBANKSEL_SHIFT
                | ((dpbanksel as u32) & Self::DPBANKSEL_MASK),
        )
    }

    /// Get raw register value
    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn apsel(&self) -> u8 {
        ((self.0 >> Self::APSEL_SHIFT) & Self::APSEL_MASK) as u8
    }

    pub const fn apbanksel(&self) -> u8 {
        ((self.0 >> Self::APBANKSEL_SHIFT) & Self::APBANKSEL_MASK) as u8
    }

    pub const fn dpbanksel(&self) -> u8 {
        (self.0 & Self::DPBANKSEL_MASK) as u8
    }

    /// This selection, retargeted at the AP and AP register bank used by
    /// `addr`
    pub const fn with_ap(self, apsel: u8, addr: u8) -> Self {
        Select::new(apsel, (addr >> 4) & 0xF, self.dpbanksel())
    }

    /// This selection, retargeted at the DP register bank used by `addr`
    pub const fn with_dp_bank(self, addr: u8) -> Self {
        Select::new(self.apsel(), self.apbanksel(), (addr >> 4) & 0xF)
    }
}

register!(
    /// RDBUFF Register descriptor (read-only)
    RdBuffRegister,
    0x0C,
    RdBuff,
    DpRegister,
    read
);

/// ARM Debug Port RDBUFF register data.  Holds the result of the previous
/// posted AP read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

register_data_r!(RdBuff);

impl RdBuff {
    pub const fn data(&self) -> u32 {
        self.0
    }
}

register!(
    /// TARGETID Register descriptor (read-only, DPv2, DP bank 2)
    TargetIdRegister,
    0x24,
    TargetId,
    DpRegister,
    read
);

/// ARM Debug Port TARGETID register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetId(u32);

register_data_r!(TargetId);

impl TargetId {
    pub const fn new(value: u32) -> Self {
        TargetId(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    /// Target revision (bits 31:28)
    pub const fn revision(&self) -> u8 {
        ((self.0 >> 28) & 0xF) as u8
    }

    /// Target part number (bits 27:12)
    pub const fn part_number(&self) -> u16 {
        ((self.0 >> 12) & 0xFFFF) as u16
    }

    /// Target designer (bits 11:1), repacked as a JEP106 code
    pub fn designer(&self) -> Designer {
        let raw = ((self.0 >> 1) & 0x7FF) as u16;
        Designer(((raw >> 7) & 0xF) << 8 | (raw & 0x7F))
    }
}

register!(
    /// TARGETSEL Register descriptor (write-only, DPv2)
    TargetSelRegister,
    0x0C,
    TargetSel,
    DpRegister,
    write
);

/// ARM Debug Port TARGETSEL register data.  Written straight after a line
/// reset to select one DP on a multi-drop SWD bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetSel(u32);

register_data_w!(TargetSel);

impl TargetSel {
    pub const fn new(value: u32) -> Self {
        TargetSel(value)
    }

    pub const fn data(&self) -> u32 {
        self.0
    }

    /// Select the DP with this TARGETID and instance number (bits 31:28)
    pub const fn for_target(targetid: TargetId, instance: u8) -> Self {
        TargetSel((targetid.0 & 0x0FFF_FFFF) | ((instance as u32 & 0xF) << 28))
    }
}
