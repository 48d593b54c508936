// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! adiprobe-core - ARM Debug Interface (ADIv5) definitions.
//!
//! Strongly typed descriptors for the Debug Port, Access Port and MEM-AP
//! registers, plus CoreSight component identification (CIDR/PIDR, ROM
//! table entries, JEP106 designers and known ARM part numbers).
//!
//! Designed to be used in conjunction with the `adiprobe-dap` library, which
//! drives the JTAG and SWD wire protocols and performs the register
//! transactions described here.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![cfg_attr(not(test), no_std)]

pub mod arm;

extern crate alloc;
