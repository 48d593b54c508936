// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated targets for the integration tests
//!
//! - [`TargetModel`] is a register level model of a DP with MEM-APs behind
//!   it: posted AP reads, sticky errors, WAIT injection, TAR auto-increment
//!   wrapping at 1KB, byte lanes.
//! - [`ModelTransport`] drives the model one transaction at a time.
//! - [`SwdTarget`] and [`JtagTarget`] put the same model behind a wire
//!   level protocol engine, implementing [`Gpio`].
//! - [`Recorder`] records every GPIO call.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};

use adiprobe_core::arm::dp::IdCode;
use adiprobe_core::arm::register::offset;
use adiprobe_dap::{
    AdiError, DapOp, DapTransport, Delay, DebugPort, DpHandle, DpKind, Gpio, JtagDevice, JtagDp,
    JtagPins, JtagTap, Pin, PinMode, Response, SwdDp, SwdPins, SwdTap,
};

pub const IDCODE_DPV1: u32 = 0x2BA0_1477;
pub const IDCODE_DPV2: u32 = 0x0BC1_2477;
pub const JTAG_IDCODE: u32 = 0x4BA0_0477;
pub const TARGETID: u32 = 0x0100_2927;

pub const AHB_AP_IDR: u32 = 0x2477_0011;
pub const APB_AP_IDR: u32 = 0x4477_0002;
pub const JTAG_AP_IDR: u32 = 0x0476_0010;

pub const ROM_BASE: u32 = 0xE00F_F000;

// CTRL/STAT
pub const STICKYORUN: u32 = 1 << 1;
pub const STICKYCMP: u32 = 1 << 4;
pub const STICKYERR: u32 = 1 << 5;
pub const WDATAERR: u32 = 1 << 7;
const STICKY: u32 = STICKYORUN | STICKYCMP | STICKYERR | WDATAERR;
const CDBGPWRUPREQ: u32 = 1 << 28;
const CDBGPWRUPACK: u32 = 1 << 29;
const CSYSPWRUPREQ: u32 = 1 << 30;
const CSYSPWRUPACK: u32 = 1 << 31;

const CSW_TR_IN_PROG: u32 = 1 << 7;
const CSW_ADDRINC: u32 = 0b11 << 4;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Acknowledge given to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
}

/// One transaction as the target saw it.  AP addresses include the bank
/// from SELECT, as do DP addresses for the banked register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub op: DapOp,
    pub value: u32,
    pub ack: Ack,
}

#[derive(Debug, Clone)]
pub struct ApModel {
    pub idr: u32,
    pub base: u32,
    pub csw: u32,
    pub tar: u32,
    pub auto_increment: bool,
    pub tr_in_prog: bool,
}

impl ApModel {
    pub fn mem_ap(idr: u32, base: u32) -> Self {
        Self {
            idr,
            base,
            csw: 0x0300_0040,
            tar: 0,
            auto_increment: true,
            tr_in_prog: false,
        }
    }

    pub fn other(idr: u32) -> Self {
        Self {
            idr,
            base: 0,
            csw: 0,
            tar: 0,
            auto_increment: false,
            tr_in_prog: false,
        }
    }

    fn size_bytes(&self) -> u32 {
        match self.csw & 0b111 {
            0 => 1,
            1 => 2,
            _ => 4,
        }
    }

    fn increment(&mut self) {
        if self.auto_increment && self.csw & CSW_ADDRINC == 1 << 4 {
            let next = self.tar.wrapping_add(self.size_bytes());
            self.tar = (self.tar & !0x3FF) | (next & 0x3FF);
        }
    }
}

/// Register level model of a DP and its APs
#[derive(Debug)]
pub struct TargetModel {
    pub idcode: u32,
    pub targetid: u32,
    pub ctrl_stat: u32,
    pub select: u32,
    pub rdbuff: u32,
    pub aps: BTreeMap<u8, ApModel>,
    pub memory: HashMap<u32, u8>,

    /// Word addresses that give a bus error
    pub bus_errors: HashSet<u32>,

    /// AP accesses (and RDBUFF reads) to answer WAIT before accepting one
    pub waits: u32,

    /// Flip the parity bit of the next read
    pub corrupt_parity: bool,

    /// Never acknowledge power up requests
    pub power_stuck: bool,

    pub dap_aborts: u32,
    pub line_resets: u32,
    pub targetsel: Option<u32>,
    pub log: Vec<Transaction>,
}

impl Default for TargetModel {
    fn default() -> Self {
        Self::new(IDCODE_DPV1)
    }
}

impl TargetModel {
    /// A DP with an AHB-AP at APSEL 0 whose BASE points at [`ROM_BASE`]
    pub fn new(idcode: u32) -> Self {
        let mut aps = BTreeMap::new();
        aps.insert(0, ApModel::mem_ap(AHB_AP_IDR, ROM_BASE | 0x3));
        Self {
            idcode,
            targetid: TARGETID,
            ctrl_stat: 0,
            select: 0,
            rdbuff: 0,
            aps,
            memory: HashMap::new(),
            bus_errors: HashSet::new(),
            waits: 0,
            corrupt_parity: false,
            power_stuck: false,
            dap_aborts: 0,
            line_resets: 0,
            targetsel: None,
            log: Vec::new(),
        }
    }

    pub fn with_ap(mut self, apsel: u8, ap: ApModel) -> Self {
        self.aps.insert(apsel, ap);
        self
    }

    pub fn without_ap(mut self, apsel: u8) -> Self {
        self.aps.remove(&apsel);
        self
    }

    /// Give `op`, as sent on the wire, the bank bits SELECT adds
    pub fn resolve(&self, op: DapOp) -> DapOp {
        let a = offset(op.address());
        let apbank = ((self.select >> 4) & 0xF) as u8;
        let dpbank = (self.select & 0xF) as u8;
        match op {
            DapOp::ApRead(_) => DapOp::ApRead(apbank << 4 | a),
            DapOp::ApWrite(_) => DapOp::ApWrite(apbank << 4 | a),
            DapOp::DpRead(_) if a == 0x4 => DapOp::DpRead(dpbank << 4 | a),
            DapOp::DpWrite(_) if a == 0x4 => DapOp::DpWrite(dpbank << 4 | a),
            DapOp::DpRead(_) => DapOp::DpRead(a),
            DapOp::DpWrite(_) => DapOp::DpWrite(a),
        }
    }

    /// Decide the acknowledge for a wire level `op`, and log it.  Returns
    /// the resolved op.
    pub fn respond(&mut self, op: DapOp) -> (Ack, DapOp) {
        let op = self.resolve(op);
        let ack = if op.is_ap() && self.ctrl_stat & STICKY != 0 {
            Ack::Fault
        } else if (op.is_ap() || op == DapOp::DpRead(0xC)) && self.take_wait() {
            Ack::Wait
        } else {
            Ack::Ok
        };
        self.log.push(Transaction { op, value: 0, ack });
        (ack, op)
    }

    pub fn take_wait(&mut self) -> bool {
        if self.waits > 0 {
            self.waits -= 1;
            true
        } else {
            false
        }
    }

    /// Carry out a resolved read
    pub fn read(&mut self, op: DapOp) -> u32 {
        let value = match op {
            DapOp::DpRead(0x00) => self.idcode,
            DapOp::DpRead(0x04) => self.ctrl_stat_value(),
            DapOp::DpRead(0x24) => self.targetid,
            DapOp::DpRead(0x0C) => self.rdbuff,
            DapOp::DpRead(_) => 0,
            DapOp::ApRead(addr) => {
                let value = self.ap_read(addr);
                return std::mem::replace(&mut self.rdbuff, value);
            }
            _ => 0,
        };
        if let Some(last) = self.log.last_mut() {
            last.value = value;
        }
        value
    }

    /// Carry out a resolved write
    pub fn write(&mut self, op: DapOp, value: u32) {
        if let Some(last) = self.log.last_mut() {
            last.value = value;
        }
        match op {
            DapOp::DpWrite(0x00) => self.abort(value),
            DapOp::DpWrite(0x04) => {
                let keep = self.ctrl_stat & STICKY;
                self.ctrl_stat =
                    (value & !(STICKY | CDBGPWRUPACK | CSYSPWRUPACK)) | keep;
            }
            DapOp::DpWrite(0x08) => self.select = value,
            DapOp::ApWrite(addr) => self.ap_write(addr, value),
            _ => (),
        }
    }

    /// A whole SWD style transaction
    pub fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError> {
        let (ack, op) = self.respond(op);
        match ack {
            Ack::Wait => Ok(Response::Wait),
            Ack::Fault => Ok(Response::Fault),
            Ack::Ok if op.is_read() => {
                let data = self.read(op);
                if std::mem::take(&mut self.corrupt_parity) {
                    return Err(AdiError::ParityError);
                }
                Ok(Response::Ok(data))
            }
            Ack::Ok => {
                self.write(op, value);
                Ok(Response::Ok(0))
            }
        }
    }

    pub fn line_reset(&mut self) {
        self.line_resets += 1;
        self.select = 0;
    }

    fn abort(&mut self, value: u32) {
        if value & 1 != 0 {
            self.dap_aborts += 1;
            self.waits = 0;
        }
        for (clear, flag) in [
            (1 << 1, STICKYCMP),
            (1 << 2, STICKYERR),
            (1 << 3, WDATAERR),
            (1 << 4, STICKYORUN),
        ] {
            if value & clear != 0 {
                self.ctrl_stat &= !flag;
            }
        }
    }

    fn ctrl_stat_value(&self) -> u32 {
        let mut value = self.ctrl_stat;
        if !self.power_stuck {
            if value & CDBGPWRUPREQ != 0 {
                value |= CDBGPWRUPACK;
            }
            if value & CSYSPWRUPREQ != 0 {
                value |= CSYSPWRUPACK;
            }
        }
        value
    }

    fn apsel(&self) -> u8 {
        (self.select >> 24) as u8
    }

    fn ap_read(&mut self, addr: u8) -> u32 {
        let apsel = self.apsel();
        let Some(ap) = self.aps.get(&apsel) else {
            return 0;
        };
        match addr {
            0x00 => {
                let mut csw = ap.csw;
                if ap.tr_in_prog {
                    csw |= CSW_TR_IN_PROG;
                }
                csw
            }
            0x04 => ap.tar,
            0x0C => self.drw_read(apsel),
            0xF8 => ap.base,
            0xFC => ap.idr,
            _ => 0,
        }
    }

    fn ap_write(&mut self, addr: u8, value: u32) {
        let apsel = self.apsel();
        if addr == 0x0C {
            self.drw_write(apsel, value);
            return;
        }
        let Some(ap) = self.aps.get_mut(&apsel) else {
            return;
        };
        match addr {
            0x00 => {
                let mut csw = value & !CSW_TR_IN_PROG;
                if !ap.auto_increment {
                    csw &= !CSW_ADDRINC;
                }
                ap.csw = csw;
            }
            0x04 => ap.tar = value,
            _ => (),
        }
    }

    fn drw_read(&mut self, apsel: u8) -> u32 {
        let Some(ap) = self.aps.get(&apsel) else {
            return 0;
        };
        let (tar, size) = (ap.tar, ap.size_bytes());
        let value = if self.bus_errors.contains(&(tar & !3)) {
            self.ctrl_stat |= STICKYERR;
            0
        } else {
            let lane = tar & (4 - size) & 3;
            let mut bytes = [0u8; 4];
            for ii in 0..size {
                bytes[(lane + ii) as usize] = self.byte(tar + ii);
            }
            u32::from_le_bytes(bytes)
        };
        if let Some(ap) = self.aps.get_mut(&apsel) {
            ap.increment();
        }
        value
    }

    fn drw_write(&mut self, apsel: u8, value: u32) {
        let Some(ap) = self.aps.get(&apsel) else {
            return;
        };
        let (tar, size) = (ap.tar, ap.size_bytes());
        if self.bus_errors.contains(&(tar & !3)) {
            self.ctrl_stat |= STICKYERR;
        } else {
            let lane = tar & (4 - size) & 3;
            let bytes = value.to_le_bytes();
            for ii in 0..size {
                self.memory.insert(tar + ii, bytes[(lane + ii) as usize]);
            }
        }
        if let Some(ap) = self.aps.get_mut(&apsel) {
            ap.increment();
        }
    }

    pub fn byte(&self, addr: u32) -> u8 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (ii, byte) in data.iter().enumerate() {
            self.memory.insert(addr + ii as u32, *byte);
        }
    }

    pub fn bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32).map(|ii| self.byte(addr + ii)).collect()
    }

    pub fn store32(&mut self, addr: u32, value: u32) {
        self.load(addr, &value.to_le_bytes());
    }

    /// Place a CoreSight component's ID registers at `base`
    pub fn component(&mut self, base: u32, class: u8, part: u16, revision: u8) {
        // ARM: continuation 4, identity 0x3B
        let pidr_low = part as u32 | 0x3B << 12 | 1 << 19 | (revision as u32) << 20;
        let cidr = 0xB105_000D | (class as u32) << 12;
        for ii in 0..4u32 {
            self.store32(base + 0xFE0 + ii * 4, (pidr_low >> (ii * 8)) & 0xFF);
            self.store32(base + 0xFF0 + ii * 4, (cidr >> (ii * 8)) & 0xFF);
        }
        self.store32(base + 0xFD0, 0x04);
    }

    /// Place a ROM table with `entries` at `base`
    pub fn rom_table(&mut self, base: u32, part: u16, entries: &[u32]) {
        self.component(base, 0x1, part, 0);
        for (ii, entry) in entries.iter().enumerate() {
            self.store32(base + ii as u32 * 4, *entry);
        }
        self.store32(base + entries.len() as u32 * 4, 0);
    }

    /// Number of logged transactions matching `op`
    pub fn count(&self, op: DapOp) -> usize {
        self.log.iter().filter(|t| t.op == op).count()
    }

    /// Values written by logged transactions matching `op`
    pub fn writes(&self, op: DapOp) -> Vec<u32> {
        self.log
            .iter()
            .filter(|t| t.op == op && t.ack == Ack::Ok)
            .map(|t| t.value)
            .collect()
    }
}

/// [`DapTransport`] straight onto a [`TargetModel`]
#[derive(Debug, Default)]
pub struct ModelTransport {
    pub target: TargetModel,
}

impl ModelTransport {
    pub fn new(target: TargetModel) -> Self {
        Self { target }
    }
}

impl DapTransport for ModelTransport {
    fn kind(&self) -> DpKind {
        DpKind::Swd
    }

    fn reset(&mut self) -> Result<Option<IdCode>, AdiError> {
        self.target.line_reset();
        Ok(None)
    }

    fn transfer(&mut self, op: DapOp, value: u32) -> Result<Response, AdiError> {
        self.target.transfer(op, value)
    }
}

/// A connected DP on a model target, with the connect traffic cleared from
/// the log
pub fn connected(target: TargetModel) -> DebugPort<ModelTransport> {
    init_logging();
    let mut dp = DebugPort::new(ModelTransport::new(target));
    dp.connect().expect("connect");
    dp.transport_mut().target.log.clear();
    dp
}

pub fn connected_handle(target: TargetModel) -> DpHandle<ModelTransport> {
    connected(target).into_handle()
}

pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_cycles(&mut self, _cycles: u32) {}
}

/// Counts delay cycles
#[derive(Default)]
pub struct CountingDelay {
    pub cycles: u64,
}

impl Delay for &mut CountingDelay {
    fn delay_cycles(&mut self, cycles: u32) {
        self.cycles += cycles as u64;
    }
}

pub const SWCLK: Pin = Pin::new(0, 0);
pub const SWDIO: Pin = Pin::new(0, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum After {
    Read(u64),
    Write(DapOp),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    // Out of sync, waiting for a line reset
    Lockout,

    // Line high for at least 50 clocks, waiting for it to go low
    Reset,

    Idle,
    Request { bits: u8, n: u8 },

    // n = 0 is the turnaround, 1..=3 the ack bits
    Ack { ack: u8, n: u8, then: After },

    ReadData { data: u64, n: u8 },
    WriteData { op: Option<DapOp>, data: u64, n: u8 },
}

/// An SW-DP on the end of the wire.  Decodes packets on SWCLK rising edges
/// and answers them from a [`TargetModel`].
#[derive(Debug)]
pub struct SwdTarget {
    pub model: TargetModel,

    /// TARGETSEL value that selects this DP, if it is on a multi-drop bus
    pub select_as: Option<u32>,

    pub protocol_errors: u32,
    pub clocks: u64,

    phase: Phase,
    ones: u32,
    clk: bool,
    host_bit: bool,
    host_driving: bool,
}

impl SwdTarget {
    pub fn new(model: TargetModel) -> Self {
        Self {
            model,
            select_as: None,
            protocol_errors: 0,
            clocks: 0,
            phase: Phase::Lockout,
            ones: 0,
            clk: false,
            host_bit: false,
            host_driving: false,
        }
    }

    fn output(&self) -> bool {
        match self.phase {
            Phase::Ack { ack, n, .. } if n > 0 => ack >> (n - 1) & 1 != 0,
            Phase::ReadData { data, n } => data >> n & 1 != 0,
            // Pulled up
            _ => true,
        }
    }

    fn rising_edge(&mut self) {
        self.clocks += 1;
        let driven = self.host_driving;
        let bit = self.host_bit;

        if driven && bit {
            self.ones += 1;
            if self.ones == 50 {
                self.model.line_reset();
            }
            if self.ones >= 50 {
                self.phase = Phase::Reset;
            }
        } else {
            self.ones = 0;
        }

        let phase = self.phase;
        self.phase = match phase {
            Phase::Lockout => Phase::Lockout,
            Phase::Reset if driven && !bit => Phase::Idle,
            Phase::Reset => Phase::Reset,
            Phase::Idle if driven && bit => Phase::Request { bits: 1, n: 1 },
            Phase::Idle => Phase::Idle,
            Phase::Request { bits, n } => {
                let bits = bits | (bit as u8) << n;
                if n == 7 {
                    self.decode(bits)
                } else {
                    Phase::Request { bits, n: n + 1 }
                }
            }
            Phase::Ack { ack, n, then } => {
                if n < 3 {
                    Phase::Ack { ack, n: n + 1, then }
                } else {
                    match then {
                        After::Read(data) => Phase::ReadData { data, n: 0 },
                        After::Write(op) => Phase::WriteData {
                            op: Some(op),
                            data: 0,
                            n: 0,
                        },
                        After::Idle => Phase::Idle,
                    }
                }
            }
            Phase::ReadData { data, n } => {
                if n == 32 {
                    Phase::Idle
                } else {
                    Phase::ReadData { data, n: n + 1 }
                }
            }
            // Undriven clocks are the turnaround, or for TARGETSEL the
            // missing ack
            Phase::WriteData { op, data, n } if !driven => Phase::WriteData { op, data, n },
            Phase::WriteData { op, data, n } => {
                let data = data | (bit as u64) << n;
                if n == 32 {
                    self.complete_write(op, data)
                } else {
                    Phase::WriteData { op, data, n: n + 1 }
                }
            }
        };
    }

    fn decode(&mut self, bits: u8) -> Phase {
        let parity = (bits >> 1 & 0xF).count_ones() as u8 & 1;
        if bits & 1 != 1 || bits >> 6 & 1 != 0 || bits >> 7 != 1 || bits >> 5 & 1 != parity {
            self.protocol_errors += 1;
            return Phase::Lockout;
        }

        let a = (bits >> 3 & 3) << 2;
        let op = match (bits >> 1 & 1, bits >> 2 & 1) {
            (0, 0) => DapOp::DpWrite(a),
            (0, _) => DapOp::DpRead(a),
            (_, 0) => DapOp::ApWrite(a),
            _ => DapOp::ApRead(a),
        };

        if op == DapOp::DpWrite(0xC) {
            // TARGETSEL has no ack
            return Phase::WriteData {
                op: None,
                data: 0,
                n: 0,
            };
        }

        let (ack, op) = self.model.respond(op);
        match ack {
            Ack::Ok if op.is_read() => {
                let data = self.model.read(op);
                let mut parity = data.count_ones() as u64 & 1;
                if std::mem::take(&mut self.model.corrupt_parity) {
                    parity ^= 1;
                }
                Phase::Ack {
                    ack: 0b001,
                    n: 0,
                    then: After::Read(data as u64 | parity << 32),
                }
            }
            Ack::Ok => Phase::Ack {
                ack: 0b001,
                n: 0,
                then: After::Write(op),
            },
            Ack::Wait => Phase::Ack {
                ack: 0b010,
                n: 0,
                then: After::Idle,
            },
            Ack::Fault => Phase::Ack {
                ack: 0b100,
                n: 0,
                then: After::Idle,
            },
        }
    }

    fn complete_write(&mut self, op: Option<DapOp>, data: u64) -> Phase {
        let value = data as u32;
        if (data >> 32) as u32 != value.count_ones() & 1 {
            self.model.ctrl_stat |= WDATAERR;
            self.protocol_errors += 1;
            return Phase::Idle;
        }

        match op {
            Some(op) => {
                self.model.write(op, value);
                Phase::Idle
            }
            None => {
                self.model.targetsel = Some(value);
                match self.select_as {
                    Some(expected) if expected != value => Phase::Lockout,
                    _ => Phase::Idle,
                }
            }
        }
    }
}

impl Gpio for SwdTarget {
    fn set_value(&mut self, pin: Pin, value: bool) {
        if pin == SWCLK {
            if value && !self.clk {
                self.rising_edge();
            }
            self.clk = value;
        } else if pin == SWDIO {
            self.host_bit = value;
        }
    }

    fn get_value(&mut self, pin: Pin) -> bool {
        if pin == SWDIO { self.output() } else { self.clk }
    }

    fn set_mode(&mut self, pin: Pin, mode: PinMode) {
        if pin == SWDIO {
            self.host_driving = mode == PinMode::Drive;
        }
    }
}

pub type WireSwdDp = SwdDp<SwdTarget, NoDelay>;

pub fn swd_dp(model: TargetModel) -> WireSwdDp {
    init_logging();
    SwdDp::new(SwdTap::new(
        SwdTarget::new(model),
        SwdPins::new(SWCLK, SWDIO),
        NoDelay,
    ))
}

pub fn swd_target(dp: &DebugPort<WireSwdDp>) -> &SwdTarget {
    dp.transport().tap().gpio()
}

pub const TCK: Pin = Pin::new(1, 0);
pub const TMS: Pin = Pin::new(1, 1);
pub const TDI: Pin = Pin::new(1, 2);
pub const TDO: Pin = Pin::new(1, 3);
pub const TRST: Pin = Pin::new(1, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDr,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIr,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl TapState {
    pub fn next(self, tms: bool) -> Self {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, true) => TestLogicReset,
            (TestLogicReset, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDr,
            (RunTestIdle, false) => RunTestIdle,
            (SelectDr, true) => SelectIr,
            (SelectDr, false) => CaptureDr,
            (CaptureDr, true) => Exit1Dr,
            (CaptureDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (Exit1Dr, true) => UpdateDr,
            (Exit1Dr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (PauseDr, false) => PauseDr,
            (Exit2Dr, true) => UpdateDr,
            (Exit2Dr, false) => ShiftDr,
            (UpdateDr, true) => SelectDr,
            (UpdateDr, false) => RunTestIdle,
            (SelectIr, true) => TestLogicReset,
            (SelectIr, false) => CaptureIr,
            (CaptureIr, true) => Exit1Ir,
            (CaptureIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (Exit1Ir, true) => UpdateIr,
            (Exit1Ir, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (PauseIr, false) => PauseIr,
            (Exit2Ir, true) => UpdateIr,
            (Exit2Ir, false) => ShiftIr,
            (UpdateIr, true) => SelectDr,
            (UpdateIr, false) => RunTestIdle,
        }
    }
}

const IR_ABORT: u8 = 0x8;
const IR_DPACC: u8 = 0xA;
const IR_APACC: u8 = 0xB;
const IR_IDCODE: u8 = 0xE;

/// A scan chain with a JTAG-DP on it, answering from a [`TargetModel`].
/// Other devices on the chain are held in BYPASS.
#[derive(Debug)]
pub struct JtagTarget {
    pub model: TargetModel,
    pub state: TapState,
    pub ir: u8,

    /// Devices between the DP and TDO, and between TDI and the DP
    pub tdo_side: usize,
    pub tdi_side: usize,
    pub other_ir_len: usize,

    pub ir_updates: u32,
    pub trst_pulses: u32,

    // Index 0 is nearest TDO
    shift: Vec<bool>,
    pending: u32,
    wait_scan: bool,
    tms: bool,
    tdi: bool,
    tdo: bool,
    tck: bool,
}

impl JtagTarget {
    pub fn new(model: TargetModel) -> Self {
        Self {
            model,
            state: TapState::TestLogicReset,
            ir: IR_IDCODE,
            tdo_side: 0,
            tdi_side: 0,
            other_ir_len: 5,
            ir_updates: 0,
            trst_pulses: 0,
            shift: Vec::new(),
            pending: 0,
            wait_scan: false,
            tms: true,
            tdi: true,
            tdo: false,
            tck: false,
        }
    }

    pub fn with_chain(mut self, tdo_side: usize, tdi_side: usize, other_ir_len: usize) -> Self {
        self.tdo_side = tdo_side;
        self.tdi_side = tdi_side;
        self.other_ir_len = other_ir_len;
        self
    }

    fn dr_len(&self) -> usize {
        match self.ir {
            IR_IDCODE => 32,
            IR_ABORT | IR_DPACC | IR_APACC => 35,
            _ => 1,
        }
    }

    fn rising_edge(&mut self) {
        if matches!(self.state, TapState::ShiftDr | TapState::ShiftIr) && !self.shift.is_empty() {
            self.tdo = self.shift.remove(0);
            self.shift.push(self.tdi);
        }

        self.state = self.state.next(self.tms);

        match self.state {
            TapState::TestLogicReset => self.ir = IR_IDCODE,
            TapState::CaptureIr => self.capture_ir(),
            TapState::CaptureDr => self.capture_dr(),
            TapState::UpdateIr => self.update_ir(),
            TapState::UpdateDr => self.update_dr(),
            _ => (),
        }
    }

    fn capture_ir(&mut self) {
        let ir_bits = |len: usize| (0..len).map(|bit| bit == 0);
        let mut shift = Vec::new();
        for _ in 0..self.tdo_side {
            shift.extend(ir_bits(self.other_ir_len));
        }
        shift.extend(ir_bits(4));
        for _ in 0..self.tdi_side {
            shift.extend(ir_bits(self.other_ir_len));
        }
        self.shift = shift;
    }

    fn capture_dr(&mut self) {
        let value: u64 = match self.ir {
            IR_IDCODE => self.model.idcode as u64,
            IR_DPACC | IR_APACC => {
                self.wait_scan = self.model.take_wait();
                let ack = if self.wait_scan { 0b001 } else { 0b010 };
                (self.pending as u64) << 3 | ack
            }
            _ => 0,
        };

        let mut shift = vec![false; self.tdo_side];
        shift.extend((0..self.dr_len()).map(|bit| value >> bit & 1 != 0));
        shift.extend(vec![false; self.tdi_side]);
        self.shift = shift;
    }

    fn update_ir(&mut self) {
        let start = self.tdo_side * self.other_ir_len;
        let Some(bits) = self.shift.get(start..start + 4) else {
            return;
        };
        self.ir = bits
            .iter()
            .enumerate()
            .fold(0, |ir, (bit, set)| ir | (*set as u8) << bit);
        self.ir_updates += 1;
    }

    fn update_dr(&mut self) {
        let len = self.dr_len();
        let Some(bits) = self.shift.get(self.tdo_side..self.tdo_side + len) else {
            return;
        };
        let value = bits
            .iter()
            .enumerate()
            .fold(0u64, |value, (bit, set)| value | (*set as u64) << bit);
        let data = (value >> 3) as u32;

        match self.ir {
            IR_ABORT => {
                self.model.log.push(Transaction {
                    op: DapOp::DpWrite(0),
                    value: data,
                    ack: Ack::Ok,
                });
                self.model.write(DapOp::DpWrite(0), data);
            }
            IR_DPACC | IR_APACC => {
                if std::mem::take(&mut self.wait_scan) {
                    return;
                }
                let a = ((value >> 1) & 3) as u8 * 4;
                let read = value & 1 != 0;
                let op = match (self.ir == IR_APACC, read) {
                    (false, false) => DapOp::DpWrite(a),
                    (false, true) => DapOp::DpRead(a),
                    (true, false) => DapOp::ApWrite(a),
                    (true, true) => DapOp::ApRead(a),
                };

                // JTAG-DPs have no FAULT ack.  With a sticky error set, AP
                // transactions are dropped.
                let op = self.model.resolve(op);

                // DPACC address 0 is reserved, ABORT has its own instruction
                if op == DapOp::DpWrite(0) {
                    return;
                }
                let dropped = op.is_ap() && self.model.ctrl_stat & STICKY != 0;
                self.model.log.push(Transaction {
                    op,
                    value: 0,
                    ack: if dropped { Ack::Fault } else { Ack::Ok },
                });
                if dropped {
                    return;
                }

                if read {
                    let data = self.model.read(op);
                    self.pending = if op.is_ap() { self.model.rdbuff } else { data };
                } else {
                    self.model.write(op, data);
                }
            }
            _ => (),
        }
    }
}

impl Gpio for JtagTarget {
    fn set_value(&mut self, pin: Pin, value: bool) {
        if pin == TCK {
            if value && !self.tck {
                self.rising_edge();
            }
            self.tck = value;
        } else if pin == TMS {
            self.tms = value;
        } else if pin == TDI {
            self.tdi = value;
        } else if pin == TRST {
            if !value {
                self.trst_pulses += 1;
                self.state = TapState::TestLogicReset;
                self.ir = IR_IDCODE;
            }
        }
    }

    fn get_value(&mut self, pin: Pin) -> bool {
        if pin == TDO { self.tdo } else { false }
    }
}

pub type WireJtagDp = JtagDp<JtagTarget, NoDelay>;

pub fn jtag_dp(target: JtagTarget, device: JtagDevice) -> WireJtagDp {
    init_logging();
    let pins = JtagPins::new(TCK, TMS, TDI, TDO).with_trst(TRST);
    JtagDp::new(JtagTap::new(target, pins, NoDelay), device)
}

pub fn jtag_target(dp: &DebugPort<WireJtagDp>) -> &JtagTarget {
    dp.transport().tap().gpio()
}

/// A GPIO call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    Set(Pin, bool),
    Get(Pin),
    Mode(Pin, PinMode),
}

/// Records every GPIO call, reading `input` back from every pin
#[derive(Debug, Default)]
pub struct Recorder {
    pub ops: Vec<GpioOp>,
    pub input: bool,
}

impl Recorder {
    /// Number of rising edges on `pin`
    pub fn rising_edges(&self, pin: Pin) -> usize {
        self.ops
            .iter()
            .filter(|op| **op == GpioOp::Set(pin, true))
            .count()
    }

    /// Number of mode changes to `mode`
    pub fn mode_changes(&self, mode: PinMode) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, GpioOp::Mode(_, m) if *m == mode))
            .count()
    }
}

impl Gpio for Recorder {
    fn set_value(&mut self, pin: Pin, value: bool) {
        self.ops.push(GpioOp::Set(pin, value));
    }

    fn get_value(&mut self, pin: Pin) -> bool {
        self.ops.push(GpioOp::Get(pin));
        self.input
    }

    fn set_mode(&mut self, pin: Pin, mode: PinMode) {
        self.ops.push(GpioOp::Mode(pin, mode));
    }
}
