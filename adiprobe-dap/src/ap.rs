// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM Memory Access Port
//!
//! [`AccessPort`] reads and writes target memory through a MEM-AP.
//!
//! Transfers go through DRW with TAR auto-incrementing, so a block of memory
//! costs one CSW and one TAR write plus one transaction per element.
//! Auto-increment is only guaranteed within a 1KB block, so TAR is written
//! again whenever a transfer reaches the next 1KB boundary.
//!
//! Ranges are split into runs so that no byte outside the requested range is
//! touched:
//!
//! ```text
//!  addr                                                     addr + len
//!   | byte | halfword |  words (or the requested size) ... | halfword | byte |
//! ```
//!
//! APs hold a share of their [`DpHandle`], and are themselves usually shared
//! as an [`ApHandle`].

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefMut};
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use adiprobe_core::arm::ap::{Base, BaseRegister, Idr, IdrRegister};
use adiprobe_core::arm::component::{
    CIDR0_OFFSET, COMPONENT_MASK, ComponentId, PIDR0_OFFSET, PIDR4_OFFSET, PeripheralId,
};
use adiprobe_core::arm::map::{Csw, CswRegister, DrwRegister, TarRegister};
use adiprobe_core::arm::register::{
    ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister,
};

use crate::AdiError;
use crate::dp::{DebugPort, DpHandle};
use crate::transport::{DapOp, DapTransport, DpKind};

// TAR auto-increment is only guaranteed to work within a 1KB block
const TAR_WRAP: u32 = 0x400;

/// A shared [`AccessPort`]
pub type ApHandle<T> = Rc<AccessPort<T>>;

/// Size of each memory transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Byte,
    Halfword,
    Word,

    /// Transferred as pairs of 32-bit accesses
    Dword,
}

impl Align {
    pub const fn bytes(&self) -> u32 {
        match self {
            Align::Byte => 1,
            Align::Halfword => 2,
            Align::Word => 4,
            Align::Dword => 8,
        }
    }

    /// Bytes moved by each DRW access
    pub const fn transfer_bytes(&self) -> u32 {
        match self {
            Align::Dword => 4,
            other => other.bytes(),
        }
    }

    /// CSW SIZE field for this alignment
    pub const fn csw_size(&self) -> u32 {
        match self {
            Align::Byte => Csw::SIZE_8BIT,
            Align::Halfword => Csw::SIZE_16BIT,
            Align::Word | Align::Dword => Csw::SIZE_32BIT,
        }
    }
}

/// A run of same-sized transfers making up part of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    pub(crate) addr: u32,

    // Offset of the run's first byte within the caller's buffer
    pub(crate) offset: usize,

    pub(crate) count: usize,
    pub(crate) align: Align,
}

impl Run {
    fn bytes(&self) -> usize {
        self.count * self.align.transfer_bytes() as usize
    }
}

/// Split `len` bytes at `addr` into leading, body and trailing runs.  The
/// body uses `align`; the leading and trailing runs use whatever smaller
/// sizes are needed to reach alignment without going outside the range.
pub(crate) fn split_runs(addr: u32, len: usize, align: Align) -> Vec<Run> {
    let unit = align.transfer_bytes() as usize;
    let at = |pos: usize| addr.wrapping_add(pos as u32);
    let mut runs = Vec::new();
    let mut pos = 0;

    for lead in [Align::Byte, Align::Halfword] {
        let size = lead.bytes() as usize;
        if size < unit && (at(pos) as usize) & size != 0 && len - pos >= size {
            runs.push(Run {
                addr: at(pos),
                offset: pos,
                count: 1,
                align: lead,
            });
            pos += size;
        }
    }

    let body = (len - pos) / unit;
    if body > 0 {
        runs.push(Run {
            addr: at(pos),
            offset: pos,
            count: body,
            align: if align == Align::Dword { Align::Word } else { align },
        });
        pos += body * unit;
    }

    for trail in [Align::Halfword, Align::Byte] {
        let size = trail.bytes() as usize;
        if size < unit && len - pos >= size {
            runs.push(Run {
                addr: at(pos),
                offset: pos,
                count: 1,
                align: trail,
            });
            pos += size;
        }
    }

    runs
}

// Extract the bytes at `addr` from a DRW value, using the byte lanes a MEM-AP
// places them on
fn lane_extract(addr: u32, value: u32, dest: &mut [u8]) {
    match dest.len() {
        1 => dest[0] = (value >> ((addr & 3) * 8)) as u8,
        2 => dest.copy_from_slice(&((value >> ((addr & 2) * 8)) as u16).to_le_bytes()),
        _ => dest.copy_from_slice(&value.to_le_bytes()),
    }
}

// Place `src`, destined for `addr`, on the byte lanes of a DRW value
fn lane_insert(addr: u32, src: &[u8]) -> u32 {
    match src.len() {
        1 => (src[0] as u32) << ((addr & 3) * 8),
        2 => (u16::from_le_bytes([src[0], src[1]]) as u32) << ((addr & 2) * 8),
        _ => u32::from_le_bytes([src[0], src[1], src[2], src[3]]),
    }
}

/// ARM Access Port object
///
/// Create with [`AccessPort::probe()`], or find every AP on a DP with
/// [`crate::discover_aps()`].
///
/// ```rust,ignore
/// use adiprobe_dap::{AccessPort, Align};
///
/// let ap = AccessPort::probe(&dp, 0)?.ok_or(AdiError::Unsupported)?;
/// let mut buf = [0u8; 64];
/// ap.mem_read(&mut buf, 0x2000_0000)?;
/// ap.mem_write_sized(0x2000_0100, &buf, Align::Halfword)?;
/// ```
pub struct AccessPort<T> {
    dp: DpHandle<T>,
    apsel: u8,
    idr: Idr,
    base: Base,

    // CSW as read at probe time, with SIZE and ADDRINC cleared
    csw: Csw,

    auto_increment: bool,
    designer: Cell<u16>,
    part_number: Cell<u16>,
}

impl<T: DapTransport> AccessPort<T> {
    /// Probe the AP at `apsel`.
    ///
    /// Returns `Ok(None)` if nothing is implemented there (IDR reads as
    /// zero), or if a MEM-AP has a memory transfer stuck in progress.
    pub fn probe(dp: &DpHandle<T>, apsel: u8) -> Result<Option<Self>, AdiError> {
        let (idr, base, csw, auto_increment) = {
            let mut port = dp.try_borrow_mut().map_err(|_| AdiError::Api)?;

            let idr = Idr::from(port.ap_read(apsel, IdrRegister::ADDRESS)?);
            if !idr.is_present() {
                return Ok(None);
            }
            let base = Base::from(port.ap_read(apsel, BaseRegister::ADDRESS)?);
            let csw = Csw::from(port.ap_read(apsel, CswRegister::ADDRESS)?);

            if !idr.is_mem_ap() {
                (idr, base, csw, false)
            } else {
                if csw.tr_in_prog() {
                    warn!("AP {apsel}: transfer in progress, AP is not usable");
                    return Ok(None);
                }

                // Auto-increment is optional; an AP without it reads back
                // ADDRINC as off
                let csw = csw.without_transfer_fields();
                let trial = csw
                    .with_size(Csw::SIZE_32BIT)
                    .with_addrinc(Csw::ADDRINC_SINGLE);
                port.ap_write(apsel, CswRegister::ADDRESS, trial.into())?;
                let readback = Csw::from(port.ap_read(apsel, CswRegister::ADDRESS)?);
                (idr, base, csw, readback.addrinc() == Csw::ADDRINC_SINGLE)
            }
        };

        debug!("Value: AP {apsel}: {} BASE {base}", idr.idr_info());

        Ok(Some(Self {
            dp: Rc::clone(dp),
            apsel,
            idr,
            base,
            csw,
            auto_increment,
            designer: Cell::new(idr.designer().0),
            part_number: Cell::new(0),
        }))
    }

    pub fn apsel(&self) -> u8 {
        self.apsel
    }

    pub fn idr(&self) -> Idr {
        self.idr
    }

    pub fn base(&self) -> Base {
        self.base
    }

    /// The cached CSW, without SIZE and ADDRINC
    pub fn csw(&self) -> Csw {
        self.csw
    }

    /// Whether TAR auto-increments after each DRW access
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Designer, from the IDR until a ROM table scan finds a better one
    pub fn designer(&self) -> u16 {
        self.designer.get()
    }

    /// Part number of the top-level ROM table, once scanned.  Zero before.
    pub fn part_number(&self) -> u16 {
        self.part_number.get()
    }

    pub(crate) fn set_identity(&self, designer: u16, part_number: u16) {
        self.designer.set(designer);
        self.part_number.set(part_number);
    }

    /// The DP this AP is on
    pub fn dp_handle(&self) -> &DpHandle<T> {
        &self.dp
    }

    /// Number of live shares of the DP this AP is on, including its own
    pub fn dp_shares(&self) -> usize {
        Rc::strong_count(&self.dp)
    }

    /// Read an AP register by address
    pub fn read_register(&self, addr: u8) -> Result<u32, AdiError> {
        self.port()?.ap_read(self.apsel, addr)
    }

    /// Write an AP register by address
    pub fn write_register(&self, addr: u8, value: u32) -> Result<(), AdiError> {
        self.port()?.ap_write(self.apsel, addr, value)
    }

    /// Read an Access Port register
    ///
    /// ```rust,ignore
    /// use adiprobe_core::arm::map::TarRegister;
    /// let tar = ap.read(TarRegister)?;
    /// ```
    pub fn read<R>(&self, _reg: R) -> Result<R::Value, AdiError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let raw_data = self.read_register(R::ADDRESS)?;
        Ok(R::from_raw(raw_data))
    }

    /// Write an Access Port register
    pub fn write<R>(&self, _reg: R, value: R::Value) -> Result<(), AdiError>
    where
        R: WritableRegister + ApRegister,
        R::Value: Into<u32>,
    {
        self.write_register(R::ADDRESS, R::to_raw(value))
    }

    /// Write CSW and TAR ready for DRW transfers of `align` size starting at
    /// `addr`.
    pub fn mem_access_setup(&self, addr: u32, align: Align) -> Result<(), AdiError> {
        let mut port = self.port()?;
        self.setup(&mut port, addr, align)
    }

    /// Read `dest.len()` bytes of target memory starting at `src`.
    pub fn mem_read(&self, dest: &mut [u8], src: u32) -> Result<(), AdiError> {
        trace!("Exec:  AP {} read {} bytes from {src:#010X}", self.apsel, dest.len());
        let mut port = self.port()?;

        for run in split_runs(src, dest.len(), Align::Word) {
            let buf = &mut dest[run.offset..run.offset + run.bytes()];
            self.read_run(&mut port, run, buf)?;
        }

        self.check_jtag_errors(&mut port)
    }

    /// Write `src` to target memory at `dest`, using `align` sized transfers
    /// for the aligned part of the range.
    pub fn mem_write_sized(&self, dest: u32, src: &[u8], align: Align) -> Result<(), AdiError> {
        trace!(
            "Exec:  AP {} write {} bytes to {dest:#010X} ({align:?})",
            self.apsel,
            src.len()
        );
        let mut port = self.port()?;

        let runs = split_runs(dest, src.len(), align);
        if runs.is_empty() {
            return Ok(());
        }
        for run in runs {
            let buf = &src[run.offset..run.offset + run.bytes()];
            self.write_run(&mut port, run, buf)?;
        }

        // The last write is posted until something else is read
        port.read_rdbuff()?;

        self.check_jtag_errors(&mut port)
    }

    /// Write `src` to target memory at `dest`, using word transfers where
    /// possible.
    pub fn mem_write(&self, dest: u32, src: &[u8]) -> Result<(), AdiError> {
        self.mem_write_sized(dest, src, Align::Word)
    }

    /// Read one word of target memory.
    pub fn mem_read32(&self, src: u32) -> Result<u32, AdiError> {
        let mut buf = [0u8; 4];
        self.mem_read(&mut buf, src)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write one word of target memory.
    pub fn mem_write32(&self, dest: u32, value: u32) -> Result<(), AdiError> {
        self.mem_write_sized(dest, &value.to_le_bytes(), Align::Word)
    }

    /// Read four consecutive ID registers starting at `addr`, keeping the
    /// low byte of each.
    pub fn read_id(&self, addr: u32) -> Result<u32, AdiError> {
        let mut buf = [0u8; 16];
        self.mem_read(&mut buf, addr)?;
        Ok(buf
            .chunks_exact(4)
            .enumerate()
            .fold(0, |id, (ii, word)| id | (word[0] as u32) << (ii * 8)))
    }

    /// Read the 64-bit Peripheral ID of the component containing `base`
    pub fn read_pidr(&self, base: u32) -> Result<PeripheralId, AdiError> {
        let base = base & COMPONENT_MASK;
        let high = self.read_id(base | PIDR4_OFFSET)?;
        let low = self.read_id(base | PIDR0_OFFSET)?;
        Ok(PeripheralId::from_words(high, low))
    }

    /// Read the Component ID of the component containing `base`
    pub fn read_cidr(&self, base: u32) -> Result<ComponentId, AdiError> {
        let base = base & COMPONENT_MASK;
        Ok(ComponentId::new(self.read_id(base | CIDR0_OFFSET)?))
    }

    fn port(&self) -> Result<RefMut<'_, DebugPort<T>>, AdiError> {
        self.dp.try_borrow_mut().map_err(|_| {
            warn!("Error: AP {} DP already in use", self.apsel);
            AdiError::Api
        })
    }

    fn setup(&self, port: &mut DebugPort<T>, addr: u32, align: Align) -> Result<(), AdiError> {
        let addrinc = if self.auto_increment {
            Csw::ADDRINC_SINGLE
        } else {
            Csw::ADDRINC_OFF
        };
        let csw = self.csw.with_size(align.csw_size()).with_addrinc(addrinc);
        port.ap_write(self.apsel, CswRegister::ADDRESS, csw.into())?;
        port.ap_write(self.apsel, TarRegister::ADDRESS, addr)
    }

    // Reads are posted: each DRW read returns the previous read's data.  The
    // final element, and the element before a 1KB boundary, are collected
    // from RDBUFF instead, so that no read is issued at a wrapped TAR.
    fn read_run(&self, port: &mut DebugPort<T>, run: Run, dest: &mut [u8]) -> Result<(), AdiError> {
        let size = run.align.transfer_bytes();
        let chunks = dest.chunks_exact_mut(size as usize);

        if !self.auto_increment {
            for (ii, chunk) in chunks.enumerate() {
                let addr = run.addr.wrapping_add(ii as u32 * size);
                self.setup(port, addr, run.align)?;
                let value = port.ap_read(self.apsel, DrwRegister::ADDRESS)?;
                lane_extract(addr, value, chunk);
            }
            return Ok(());
        }

        let drw_read = DapOp::ApRead(DrwRegister::ADDRESS);
        self.setup(port, run.addr, run.align)?;
        port.select_ap(self.apsel, DrwRegister::ADDRESS)?;
        port.low_access(drw_read, 0)?;

        for (ii, chunk) in chunks.enumerate() {
            let addr = run.addr.wrapping_add(ii as u32 * size);
            let next = addr.wrapping_add(size);
            let last = ii == run.count - 1;
            let wraps = !last && next % TAR_WRAP == 0;

            let value = if last || wraps {
                port.read_rdbuff()?
            } else {
                port.low_access(drw_read, 0)?
            };
            lane_extract(addr, value, chunk);

            if wraps {
                trace!("Exec:  TAR wrap at {next:#010X}");
                self.setup(port, next, run.align)?;
                port.low_access(drw_read, 0)?;
            }
        }
        Ok(())
    }

    fn write_run(&self, port: &mut DebugPort<T>, run: Run, src: &[u8]) -> Result<(), AdiError> {
        let size = run.align.transfer_bytes();
        self.setup(port, run.addr, run.align)?;

        for (ii, chunk) in src.chunks_exact(size as usize).enumerate() {
            let addr = run.addr.wrapping_add(ii as u32 * size);
            if ii > 0 && (!self.auto_increment || addr % TAR_WRAP == 0) {
                self.setup(port, addr, run.align)?;
            }
            port.ap_write(self.apsel, DrwRegister::ADDRESS, lane_insert(addr, chunk))?;
        }
        Ok(())
    }

    // A JTAG-DP has no FAULT acknowledge, so a failed transfer only shows up
    // in CTRL/STAT
    fn check_jtag_errors(&self, port: &mut DebugPort<T>) -> Result<(), AdiError> {
        if port.kind() == DpKind::Jtag {
            port.check_errors()?;
        }
        Ok(())
    }
}

impl<T> fmt::Debug for AccessPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPort")
            .field("apsel", &self.apsel)
            .field("idr", &self.idr)
            .field("base", &self.base)
            .field("csw", &self.csw)
            .field("auto_increment", &self.auto_increment)
            .field("designer", &self.designer.get())
            .field("part_number", &self.part_number.get())
            .finish()
    }
}

impl<T> fmt::Display for AccessPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AP {} {} BASE {}", self.apsel, self.idr.ap_type_str(), self.base)
    }
}
