// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Generic Access Port Registers
//!
//! The identification registers every AP implements at the top of bank 0xF.

use crate::arm::Designer;
use crate::{register, register_data_r, register_flags};
use alloc::format;
use alloc::string::String;
use core::fmt;

register!(
    /// Access Port Identification Register descriptor
    IdrRegister,
    0xFC,
    Idr,
    ApRegister,
    read
);

/// Access Port Identification Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Idr(u32);

register_data_r!(Idr);

impl Idr {
    const REVISION_MASK: u32 = 0xF;
    const REVISION_SHIFT: u32 = 28;

    const CONTINUATION_MASK: u32 = 0xF;
    const CONTINUATION_SHIFT: u32 = 24;

    const IDENTIFICATION_MASK: u32 = 0x7F;
    const IDENTIFICATION_SHIFT: u32 = 17;

    const CLASS_MASK: u32 = 0xF;
    const CLASS_SHIFT: u32 = 13;

    const VARIANT_MASK: u32 = 0xF;
    const VARIANT_SHIFT: u32 = 4;

    const TYPE_MASK: u32 = 0xF;

    /// No Access Port present
    pub const CLASS_NONE: u8 = 0x0;
    /// Memory Access Port
    pub const CLASS_MEM_AP: u8 = 0x8;

    pub const AP_TYPE_JTAG: u8 = 0x0;
    pub const AP_TYPE_AMBA_AHB3: u8 = 0x1;
    pub const AP_TYPE_AMBA_APB2_3: u8 = 0x2;
    pub const AP_TYPE_AMBA_AXI3_4: u8 = 0x4;
    pub const AP_TYPE_AMBA_AHB5: u8 = 0x5;
    pub const AP_TYPE_AMBA_APB4_5: u8 = 0x6;
    pub const AP_TYPE_AMBA_AXI5: u8 = 0x7;
    pub const AP_TYPE_AMBA_AHB5_HPROT: u8 = 0x8;

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// An IDR of zero means nothing is implemented at this APSEL
    pub const fn is_present(&self) -> bool {
        self.0 != 0
    }

    /// Get revision field (bits 31:28)
    pub const fn revision(&self) -> u8 {
        ((self.0 >> Self::REVISION_SHIFT) & Self::REVISION_MASK) as u8
    }

    /// Designer (bits 27:17), as a JEP106 code
    pub const fn designer(&self) -> Designer {
        let cont = (self.0 >> Self::CONTINUATION_SHIFT) & Self::CONTINUATION_MASK;
        let id = (self.0 >> Self::IDENTIFICATION_SHIFT) & Self::IDENTIFICATION_MASK;
        Designer((cont << 8 | id) as u16)
    }

    /// Get class field (bits 16:13)
    pub const fn class(&self) -> u8 {
        ((self.0 >> Self::CLASS_SHIFT) & Self::CLASS_MASK) as u8
    }

    pub const fn is_mem_ap(&self) -> bool {
        self.class() == Self::CLASS_MEM_AP
    }

    /// Get variant field (bits 7:4)
    pub const fn variant(&self) -> u8 {
        ((self.0 >> Self::VARIANT_SHIFT) & Self::VARIANT_MASK) as u8
    }

    /// Get AP type field (bits 3:0)
    pub const fn ap_type(&self) -> u8 {
        (self.0 & Self::TYPE_MASK) as u8
    }

    pub fn ap_type_str(&self) -> &'static str {
        match self.ap_type() {
            Self::AP_TYPE_JTAG => "JTAG-AP",
            Self::AP_TYPE_AMBA_AHB3 => "AHB3-AP",
            Self::AP_TYPE_AMBA_APB2_3 => "APB2/3-AP",
            Self::AP_TYPE_AMBA_AXI3_4 => "AXI3/4-AP",
            Self::AP_TYPE_AMBA_AHB5 => "AHB5-AP",
            Self::AP_TYPE_AMBA_APB4_5 => "APB4/5-AP",
            Self::AP_TYPE_AMBA_AXI5 => "AXI5-AP",
            Self::AP_TYPE_AMBA_AHB5_HPROT => "AHB5-AP (HPROT)",
            _ => "Unknown AP",
        }
    }

    /// Get formatted information string
    pub fn idr_info(&self) -> String {
        format!(
            "{} Designer: {}, Class: 0x{:X}, Variant: 0x{:X}, Rev: 0x{:X}",
            self.ap_type_str(),
            self.designer(),
            self.class(),
            self.variant(),
            self.revision()
        )
    }
}

register!(
    /// Debug Base Address Register descriptor
    BaseRegister,
    0xF8,
    Base,
    ApRegister,
    read
);

/// Debug Base Address Register data.  Points at the top-level ROM table or
/// the single debug component behind a MEM-AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Base(u32);

register_data_r!(Base);

impl Base {
    const BASEADDR_MASK: u32 = 0xFFFF_F000;
    const PRESENT: u32 = 1 << 0;
    const FORMAT: u32 = 1 << 1;

    /// Legacy value meaning no debug entry is present
    pub const NOT_PRESENT_LEGACY: u32 = 0xFFFF_FFFF;

    pub const fn new(value: u32) -> Self {
        Base(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// 4KB-aligned address of the first debug component
    pub const fn address(&self) -> u32 {
        self.0 & Self::BASEADDR_MASK
    }

    /// Whether a debug entry is present.  Legacy (format 0) registers have no
    /// present bit, so any value other than all ones counts.
    pub const fn is_present(&self) -> bool {
        if self.format() {
            self.present()
        } else {
            self.0 != Self::NOT_PRESENT_LEGACY
        }
    }
}

register_flags!(Base {
    present = Base::PRESENT;
    /// ADIv5 format (as opposed to the legacy format)
    format = Base::FORMAT;
});

register!(
    /// Configuration Register descriptor
    CfgRegister,
    0xF4,
    Cfg,
    ApRegister,
    read
);

/// MEM-AP Configuration Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cfg(u32);

register_data_r!(Cfg);

register_flags!(Cfg {
    /// Big-endian memory system (deprecated)
    big_endian = 1 << 0;
    /// Addresses wider than 32 bits
    large_address = 1 << 1;
    large_data = 1 << 2;
});
