// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Contains ARM debug architecture objects and routines
//!
//! * [`dp`] - Debug Port registers (IDCODE, ABORT, CTRL/STAT, SELECT, ...)
//! * [`ap`] - registers common to every Access Port (IDR, BASE, CFG)
//! * [`map`] - MEM-AP registers (CSW, TAR, DRW, banked data)
//! * [`component`] - CoreSight component identification and ROM tables
//! * [`register`] - the traits tying register addresses to value types

pub mod ap;
pub mod component;
pub mod dp;
pub mod map;
pub mod register;

use core::fmt;

/// JEP106 designer codes, as packed by [`component::PeripheralId::designer`]
/// and [`ap::Idr::designer`]: continuation count in bits 11:8, identity code
/// in bits 6:0.
pub mod designer {
    pub const FREESCALE: u16 = 0x00E;
    pub const TEXAS: u16 = 0x017;
    pub const ATMEL: u16 = 0x01F;
    pub const STM: u16 = 0x020;
    pub const CYPRESS: u16 = 0x034;
    pub const INFINEON: u16 = 0x041;
    pub const NORDIC: u16 = 0x244;
    pub const ARM: u16 = 0x43B;
    /// Seen on the LPC845
    pub const SPECULAR: u16 = 0x501;
    pub const CS: u16 = 0x555;
    pub const ENERGY_MICRO: u16 = 0x673;
    pub const GIGADEVICE: u16 = 0x751;
    pub const RASPBERRY: u16 = 0x927;
}

/// A JEP106 designer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Designer(pub u16);

impl Designer {
    /// Name of the designer, if it is one we know of.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            designer::FREESCALE => "Freescale",
            designer::TEXAS => "Texas Instruments",
            designer::ATMEL => "Atmel",
            designer::STM => "STMicroelectronics",
            designer::CYPRESS => "Cypress",
            designer::INFINEON => "Infineon",
            designer::NORDIC => "Nordic Semiconductor",
            designer::ARM => "ARM Ltd",
            designer::SPECULAR => "Specular Networks",
            designer::CS => "Community Silicon",
            designer::ENERGY_MICRO => "Energy Micro",
            designer::GIGADEVICE => "GigaDevice",
            designer::RASPBERRY => "Raspberry Pi",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Designer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "JEP106 0x{:03X}", self.0),
        }
    }
}
