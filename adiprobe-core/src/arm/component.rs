// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! CoreSight Component Identification
//!
//! Every debug component occupies a 4KB block whose last 48 bytes hold the
//! Peripheral ID (PIDR4-7, PIDR0-3) and Component ID (CIDR0-3) registers.
//! Each of those 32-bit registers carries one byte of identification in its
//! low 8 bits.
//!
//! Class 0x1 components are ROM tables: a list of 32-bit entries at the start
//! of the block, each giving the signed offset of a child component.

use crate::arm::Designer;
use core::fmt;
use serde::Serialize;
use static_assertions::const_assert;

/// Offset of PIDR4 within a component's 4KB block
pub const PIDR4_OFFSET: u32 = 0xFD0;
/// Offset of PIDR0 within a component's 4KB block
pub const PIDR0_OFFSET: u32 = 0xFE0;
/// Offset of CIDR0 within a component's 4KB block
pub const CIDR0_OFFSET: u32 = 0xFF0;
/// Offset of a ROM table's MEMTYPE register
pub const ROM_MEMTYPE_OFFSET: u32 = 0xFCC;

/// Mask selecting the 4KB block a component lives in
pub const COMPONENT_MASK: u32 = 0xFFFF_F000;

/// Largest number of entries a class 0x1 ROM table can hold
pub const MAX_ROM_ENTRIES: u32 = 960;

// Entries must stop short of the identification registers
const_assert!(MAX_ROM_ENTRIES * 4 <= ROM_MEMTYPE_OFFSET);

/// Component class, CIDR1 bits 7:4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentClass {
    GenericVerification,
    RomTable,
    CoreSight,
    PeripheralTestBlock,
    GenericIp,
    PrimeCell,
    Reserved(u8),
}

impl ComponentClass {
    pub const fn from_u8(class: u8) -> Self {
        match class {
            0x0 => ComponentClass::GenericVerification,
            0x1 => ComponentClass::RomTable,
            0x9 => ComponentClass::CoreSight,
            0xB => ComponentClass::PeripheralTestBlock,
            0xE => ComponentClass::GenericIp,
            0xF => ComponentClass::PrimeCell,
            other => ComponentClass::Reserved(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentClass::GenericVerification => "Generic verification component",
            ComponentClass::RomTable => "ROM Table",
            ComponentClass::CoreSight => "Debug component",
            ComponentClass::PeripheralTestBlock => "Peripheral Test Block",
            ComponentClass::GenericIp => "Generic IP component",
            ComponentClass::PrimeCell => "PrimeCell or System component",
            ComponentClass::Reserved(_) => "Reserved",
        }
    }
}

impl fmt::Display for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentClass::Reserved(class) => write!(f, "Reserved class 0x{class:X}"),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Component ID, assembled from CIDR0-3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentId(u32);

impl ComponentId {
    const PREAMBLE: u32 = 0xB105_000D;
    const PREAMBLE_MASK: u32 = !0x0000_F000;

    pub const fn new(value: u32) -> Self {
        ComponentId(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// All bits outside the class field must match the fixed preamble
    pub const fn is_valid(&self) -> bool {
        self.0 & Self::PREAMBLE_MASK == Self::PREAMBLE
    }

    pub const fn class(&self) -> ComponentClass {
        ComponentClass::from_u8(((self.0 >> 12) & 0xF) as u8)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Peripheral ID, assembled from PIDR4-7 (high word) and PIDR0-3 (low word)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeripheralId(u64);

impl PeripheralId {
    const PART_MASK: u64 = 0xFFF;
    const JEP106_CODE_SHIFT: u64 = 12;
    const JEP106_CODE_MASK: u64 = 0x7F;
    const JEP106_USED: u64 = 1 << 19;
    const REVISION_SHIFT: u64 = 20;
    const JEP106_CONT_SHIFT: u64 = 32;
    const JEP106_CONT_MASK: u64 = 0xF;
    const SIZE_SHIFT: u64 = 36;

    pub const fn new(value: u64) -> Self {
        PeripheralId(value)
    }

    pub const fn from_words(high: u32, low: u32) -> Self {
        PeripheralId((high as u64) << 32 | low as u64)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub const fn part_number(&self) -> u16 {
        (self.0 & Self::PART_MASK) as u16
    }

    /// Designer, from the JEP106 continuation count and identity code
    pub const fn designer(&self) -> Designer {
        let cont = (self.0 >> Self::JEP106_CONT_SHIFT) & Self::JEP106_CONT_MASK;
        let code = (self.0 >> Self::JEP106_CODE_SHIFT) & Self::JEP106_CODE_MASK;
        Designer((cont << 8 | code) as u16)
    }

    /// Whether the designer fields hold a JEP106 code
    pub const fn uses_jep106(&self) -> bool {
        self.0 & Self::JEP106_USED != 0
    }

    pub const fn revision(&self) -> u8 {
        ((self.0 >> Self::REVISION_SHIFT) & 0xF) as u8
    }

    /// Log2 of the number of 4KB blocks the component occupies
    pub const fn size_log2(&self) -> u8 {
        ((self.0 >> Self::SIZE_SHIFT) & 0xF) as u8
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

/// A 32-bit class 0x1 ROM table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RomEntry(u32);

impl RomEntry {
    const PRESENT: u32 = 1 << 0;
    const FORMAT_32BIT: u32 = 1 << 1;
    const OFFSET_MASK: u32 = 0xFFFF_F000;

    pub const fn new(value: u32) -> Self {
        RomEntry(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// A zero entry terminates the table
    pub const fn is_end(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_present(&self) -> bool {
        self.0 & Self::PRESENT != 0
    }

    pub const fn is_32bit_format(&self) -> bool {
        self.0 & Self::FORMAT_32BIT != 0
    }

    /// Signed offset from the ROM table base to the child component
    pub const fn offset(&self) -> i32 {
        (self.0 & Self::OFFSET_MASK) as i32
    }

    /// Address of the child component this entry points at
    pub const fn child_address(&self, table_base: u32) -> u32 {
        table_base.wrapping_add_signed(self.offset())
    }
}

/// Name of an ARM-designed CoreSight component, by part number.
pub fn arm_part_name(part_number: u16) -> Option<&'static str> {
    ARM_PARTS
        .iter()
        .find(|(part, _)| *part == part_number)
        .map(|(_, name)| *name)
}

const ARM_PARTS: &[(u16, &str)] = &[
    (0x000, "Cortex-M3 SCS"),
    (0x001, "Cortex-M3 ITM"),
    (0x002, "Cortex-M3 DWT"),
    (0x003, "Cortex-M3 FPB"),
    (0x008, "Cortex-M0 SCS"),
    (0x00A, "Cortex-M0 DWT"),
    (0x00B, "Cortex-M0 BPU"),
    (0x00C, "Cortex-M4 SCS"),
    (0x00D, "CoreSight ETM11"),
    (0x00E, "Cortex-M7 FPB"),
    (0x101, "System TSGEN"),
    (0x471, "Cortex-M0 ROM"),
    (0x4C0, "Cortex-M0+ ROM"),
    (0x4C3, "Cortex-M3 ROM"),
    (0x4C4, "Cortex-M4 ROM"),
    (0x4C7, "Cortex-M7 PPB ROM"),
    (0x4C8, "Cortex-M7 ROM"),
    (0x906, "CoreSight CTI"),
    (0x907, "CoreSight ETB"),
    (0x908, "CoreSight CSTF"),
    (0x910, "CoreSight ETM9"),
    (0x912, "CoreSight TPIU"),
    (0x913, "CoreSight ITM"),
    (0x914, "CoreSight SWO"),
    (0x923, "Cortex-M3 TPIU"),
    (0x924, "Cortex-M3 ETM"),
    (0x925, "Cortex-M4 ETM"),
    (0x941, "CoreSight TPIU-Lite"),
    (0x961, "CoreSight TMC"),
    (0x962, "CoreSight STM"),
    (0x975, "Cortex-M7 ETM"),
    (0x9A1, "Cortex-M4 TPIU"),
    (0x9A9, "Cortex-M7 TPIU"),
    (0xC05, "Cortex-A5 Debug"),
    (0xC08, "Cortex-A8 Debug"),
    (0xC09, "Cortex-A9 Debug"),
    (0xC0F, "Cortex-A15 Debug"),
    (0xC14, "Cortex-R4 Debug"),
    (0xD21, "Cortex-M33 SCS"),
];
