// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port Registers

use crate::{register, register_data_rw, register_flags};
use alloc::{format, string::String};
use core::fmt;

register!(
    /// Control/Status Word Register descriptor (read-write)
    CswRegister,
    0x00,
    Csw,
    ApRegister,
    read,
    write
);

/// Control/Status Word register data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csw(u32);

register_data_rw!(Csw);

impl Csw {
    const SIZE_MASK: u32 = 0b111;

    const ADDRINC_MASK: u32 = 0b11;
    const ADDRINC_SHIFT: u32 = 4;

    const DEVICE_EN: u32 = 1 << 6;
    const TR_IN_PROG: u32 = 1 << 7;

    const MODE_MASK: u32 = 0b1111;
    const MODE_SHIFT: u32 = 8;

    // SPIDEN is read only
    const SPIDEN: u32 = 1 << 23;

    const PROT_MASK: u32 = 0b111_1111;
    const PROT_SHIFT: u32 = 24;

    const DBG_SW_ENABLE: u32 = 1 << 31;

    // Size values
    pub const SIZE_8BIT: u32 = 0b000;
    pub const SIZE_16BIT: u32 = 0b001;
    pub const SIZE_32BIT: u32 = 0b010;
    pub const SIZE_64BIT: u32 = 0b011;

    // Address increment values
    pub const ADDRINC_OFF: u32 = 0b00;
    pub const ADDRINC_SINGLE: u32 = 0b01;
    pub const ADDRINC_PACKED: u32 = 0b10;

    // Prot values (Cortex-M: HPROT1 and a debug master type)
    pub const PROT_MASTER_DEBUG: u32 = 1 << 5;
    pub const PROT_HPROT1: u32 = 1 << 1;

    pub const fn new(value: u32) -> Self {
        Csw(value)
    }

    /// Get raw register value
    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn size(&self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    pub const fn addrinc(&self) -> u32 {
        (self.0 >> Self::ADDRINC_SHIFT) & Self::ADDRINC_MASK
    }

    pub const fn mode(&self) -> u32 {
        (self.0 >> Self::MODE_SHIFT) & Self::MODE_MASK
    }

    pub const fn prot(&self) -> u32 {
        (self.0 >> Self::PROT_SHIFT) & Self::PROT_MASK
    }

    /// The same control word with the per-transfer fields (SIZE and
    /// ADDRINC) cleared, ready to be merged with a transfer's own settings
    pub const fn without_transfer_fields(self) -> Self {
        Csw(self.0 & !(Self::SIZE_MASK | (Self::ADDRINC_MASK << Self::ADDRINC_SHIFT)))
    }

    /// Chainable size setter
    pub const fn with_size(self, size: u32) -> Self {
        Csw((self.0 & !Self::SIZE_MASK) | (size & Self::SIZE_MASK))
    }

    /// Chainable address increment setter
    pub const fn with_addrinc(self, addrinc: u32) -> Self {
        Csw((self.0 & !(Self::ADDRINC_MASK << Self::ADDRINC_SHIFT))
            | ((addrinc & Self::ADDRINC_MASK) << Self::ADDRINC_SHIFT))
    }

    pub fn set_size(&mut self, size: u32) {
        *self = self.with_size(size);
    }

    pub fn set_addrinc(&mut self, addrinc: u32) {
        *self = self.with_addrinc(addrinc);
    }

    pub fn set_prot(&mut self, prot: u32) {
        self.0 = (self.0 & !(Self::PROT_MASK << Self::PROT_SHIFT))
            | ((prot & Self::PROT_MASK) << Self::PROT_SHIFT);
    }

    /// Get transfer configuration description
    pub fn transfer_config(&self) -> String {
        let size = match self.size() {
            Self::SIZE_8BIT => "8-bit",
            Self::SIZE_16BIT => "16-bit",
            Self::SIZE_32BIT => "32-bit",
            Self::SIZE_64BIT => "64-bit",
            _ => "Reserved",
        };

        let addrinc = match self.addrinc() {
            Self::ADDRINC_OFF => "Off",
            Self::ADDRINC_SINGLE => "Single",
            Self::ADDRINC_PACKED => "Packed",
            _ => "Reserved",
        };

        format!("Size: {size}, AddrInc: {addrinc}")
    }
}

register_flags!(Csw {
    device_en / set_device_en = Csw::DEVICE_EN;
    /// A transfer is still in progress on the memory bus
    tr_in_prog = Csw::TR_IN_PROG;
    spiden = Csw::SPIDEN;
    dbg_sw_enable / set_dbg_sw_enable = Csw::DBG_SW_ENABLE;
});

impl Default for Csw {
    fn default() -> Self {
        let mut csw = Csw(0);
        csw.set_prot(Self::PROT_MASTER_DEBUG | Self::PROT_HPROT1);
        csw.set_size(Self::SIZE_32BIT);
        csw.set_addrinc(Self::ADDRINC_OFF);
        csw.set_device_en(true);
        csw
    }
}

register!(
    /// Transfer Address Register descriptor (read-write)
    TarRegister,
    0x04,
    Tar,
    ApRegister,
    read,
    write
);

/// Transfer Address Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

register_data_rw!(Tar);

impl Tar {
    pub const fn new(address: u32) -> Self {
        Tar(address)
    }

    pub const fn address(&self) -> u32 {
        self.0
    }
}

register!(
    /// Data Read/Write Register descriptor (read-write)
    DrwRegister,
    0x0C,
    Drw,
    ApRegister,
    read,
    write
);

/// Data Read/Write Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

register_data_rw!(Drw);

impl Drw {
    pub const fn data(&self) -> u32 {
        self.0
    }
}

register!(
    /// Banked Data Register 0 descriptor (read-write)
    Bd0Register,
    0x10,
    BankedData,
    ApRegister,
    read,
    write
);

register!(
    /// Banked Data Register 1 descriptor (read-write)
    Bd1Register,
    0x14,
    BankedData,
    ApRegister,
    read,
    write
);

register!(
    /// Banked Data Register 2 descriptor (read-write)
    Bd2Register,
    0x18,
    BankedData,
    ApRegister,
    read,
    write
);

register!(
    /// Banked Data Register 3 descriptor (read-write)
    Bd3Register,
    0x1C,
    BankedData,
    ApRegister,
    read,
    write
);

/// MEM-AP Banked Data register data.  Each of BD0-BD3 accesses the word at
/// `TAR[31:4] + n * 4` without moving TAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankedData(u32);

register_data_rw!(BankedData);

impl BankedData {
    pub const fn data(&self) -> u32 {
        self.0
    }
}
