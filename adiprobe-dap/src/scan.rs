// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Debug Component Discovery
//!
//! [`discover_aps()`] finds the APs on a DP, and a [`Scanner`] walks the
//! CoreSight ROM tables behind a MEM-AP, producing a [`ScanReport`] of every
//! component found.
//!
//! ROM tables can point anywhere, including back at themselves, so the walk
//! is bounded by depth only.  Branches deeper than the bound are reported as
//! [`Unexplored`] with [`AdiError::DepthExceeded`], as are branches whose
//! reads failed with a recoverable error.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use adiprobe_core::arm::Designer;
use adiprobe_core::arm::component::{
    COMPONENT_MASK, ComponentClass, MAX_ROM_ENTRIES, RomEntry, arm_part_name,
};
use adiprobe_core::arm::designer;

use crate::AdiError;
use crate::ap::{AccessPort, ApHandle};
use crate::dp::DpHandle;
use crate::transport::DapTransport;

/// Default bound on ROM table nesting
pub const DEFAULT_MAX_ROM_DEPTH: u32 = 8;

/// AP discovery stops after this many consecutive empty APSELs
pub const MAX_VOID_APS: u32 = 8;

/// One debug component found by a [`Scanner`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDescriptor {
    /// 4KB-aligned address of the component
    pub base_address: u32,
    pub designer: Designer,
    pub part_number: u16,
    pub revision: u8,
    pub class: ComponentClass,

    /// ROM table nesting, 0 for the component the AP's BASE points at
    pub depth: u32,

    /// Index of the entry in the parent ROM table, None at depth 0
    pub entry_index: Option<usize>,

    /// Name of the part, for known ARM parts
    pub name: Option<&'static str>,
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}0x{:08X} {} designer {} part 0x{:03X} rev {}",
            "",
            self.base_address,
            self.class,
            self.designer,
            self.part_number,
            self.revision,
            indent = self.depth as usize * 2
        )?;
        if let Some(name) = self.name {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

/// A ROM table branch that was not walked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unexplored {
    pub base_address: u32,
    pub depth: u32,
    pub reason: AdiError,
}

/// Everything a [`Scanner`] found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub components: Vec<ComponentDescriptor>,
    pub unexplored: Vec<Unexplored>,
}

/// ROM table walker for one MEM-AP
///
/// ```rust,ignore
/// let report = Scanner::new(&ap).with_max_depth(4).scan()?;
/// for component in &report.components {
///     log::info!("{component}");
/// }
/// ```
pub struct Scanner<'a, T> {
    ap: &'a AccessPort<T>,
    max_depth: u32,
}

impl<'a, T: DapTransport> Scanner<'a, T> {
    pub fn new(ap: &'a AccessPort<T>) -> Self {
        Self {
            ap,
            max_depth: DEFAULT_MAX_ROM_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Walk everything reachable from the AP's BASE register.
    ///
    /// Recoverable errors (faults, WAIT timeouts, parity errors) end the
    /// branch they happen in and are reported in
    /// [`ScanReport::unexplored`].  Anything else, such as loss of the
    /// link, fails the scan.
    pub fn scan(&self) -> Result<ScanReport, AdiError> {
        let mut report = ScanReport::default();
        let base = self.ap.base();
        if !base.is_present() {
            debug!("AP {}: no debug entry in BASE {base}", self.ap.apsel());
            return Ok(report);
        }

        self.component_probe(base.address(), 0, None, &mut report)?;
        debug!(
            "AP {}: found {} components, {} unexplored",
            self.ap.apsel(),
            report.components.len(),
            report.unexplored.len()
        );
        Ok(report)
    }

    /// Identify the component at `addr` and, if it is a ROM table, walk its
    /// entries.  Results are added to `report`.
    pub fn component_probe(
        &self,
        addr: u32,
        depth: u32,
        entry_index: Option<usize>,
        report: &mut ScanReport,
    ) -> Result<(), AdiError> {
        let base = addr & COMPONENT_MASK;
        if base == 0 {
            return Ok(());
        }

        if depth > self.max_depth {
            warn!("0x{base:08X}: ROM table nesting deeper than {}, not followed", self.max_depth);
            report.unexplored.push(Unexplored {
                base_address: base,
                depth,
                reason: AdiError::DepthExceeded,
            });
            return Ok(());
        }

        let cidr = match self.ap.read_cidr(base) {
            Ok(cidr) => cidr,
            Err(e) => return self.unexplored(report, base, depth, e),
        };
        if !cidr.is_valid() {
            debug!("0x{base:08X}: no component (CIDR {cidr})");
            return Ok(());
        }

        let pidr = match self.ap.read_pidr(base) {
            Ok(pidr) => pidr,
            Err(e) => return self.unexplored(report, base, depth, e),
        };

        let class = cidr.class();
        let designer = pidr.designer();
        let part_number = pidr.part_number();
        let name = if designer.0 == designer::ARM {
            arm_part_name(part_number)
        } else {
            None
        };
        let component = ComponentDescriptor {
            base_address: base,
            designer,
            part_number,
            revision: pidr.revision(),
            class,
            depth,
            entry_index,
            name,
        };
        debug!("{component}");
        report.components.push(component);

        if depth == 0 {
            self.ap.set_identity(designer.0, part_number);
        }

        if class != ComponentClass::RomTable {
            return Ok(());
        }

        for index in 0..MAX_ROM_ENTRIES {
            let entry = match self.ap.mem_read32(base + index * 4) {
                Ok(value) => RomEntry::new(value),
                Err(e) => return self.unexplored(report, base, depth, e),
            };
            if entry.is_end() {
                break;
            }
            if !entry.is_present() {
                trace!("0x{base:08X}[{index}]: entry {:#010X} not present", entry.value());
                continue;
            }

            self.component_probe(
                entry.child_address(base),
                depth + 1,
                Some(index as usize),
                report,
            )?;
        }

        Ok(())
    }

    // Record a branch that failed, clearing the sticky error so that the
    // rest of the walk can continue
    fn unexplored(
        &self,
        report: &mut ScanReport,
        base: u32,
        depth: u32,
        e: AdiError,
    ) -> Result<(), AdiError> {
        if !recoverable(&e) {
            return Err(e);
        }

        warn!("0x{base:08X}: unreadable, {e}");
        clear_errors(self.ap.dp_handle())?;
        report.unexplored.push(Unexplored {
            base_address: base,
            depth,
            reason: e,
        });
        Ok(())
    }
}

// Errors that an ABORT recovers from
fn recoverable(e: &AdiError) -> bool {
    e.requires_abort() || *e == AdiError::ParityError
}

fn clear_errors<T: DapTransport>(dp: &DpHandle<T>) -> Result<(), AdiError> {
    dp.try_borrow_mut()
        .map_err(|_| AdiError::Api)?
        .clear_errors()
        .map(|_| ())
}

/// Probe every APSEL on `dp`, returning the APs found.
///
/// Probing stops after [`MAX_VOID_APS`] consecutive empty APSELs.  An APSEL
/// that faults while being probed is cleared and counted as empty.
pub fn discover_aps<T: DapTransport>(dp: &DpHandle<T>) -> Result<Vec<ApHandle<T>>, AdiError> {
    let mut aps = Vec::new();
    let mut void = 0;

    for apsel in 0..=u8::MAX {
        match AccessPort::probe(dp, apsel) {
            Ok(Some(ap)) => {
                debug!("Value: {ap}");
                aps.push(Rc::new(ap));
                void = 0;
            }
            Ok(None) => void += 1,
            Err(e) if recoverable(&e) => {
                warn!("AP {apsel}: probe failed, {e}");
                clear_errors(dp)?;
                void += 1;
            }
            Err(e) => return Err(e),
        }

        if void >= MAX_VOID_APS {
            trace!("{void} empty APs, stopping at APSEL {apsel}");
            break;
        }
    }

    debug!("Found {} APs", aps.len());
    Ok(aps)
}
