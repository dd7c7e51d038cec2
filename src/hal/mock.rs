//! 宿主机侧的测试替身
//!
//! # Overview
//! 真机上的寄存器由 `hal/arch` 提供；在宿主机上跑测试时，用这里的
//! 软件模型顶替：一个 CSR 寄存器堆、一个按仲裁语义工作的 PLIC 模型、
//! 一个带可推进 `mtime` 的 CLINT 模型，以及一个缓冲控制台。
//!
//! # Design
//! - [`MachineModel`] 把两个设备模型拼成一条总线，按板级基地址解码，
//!   驱动测试用与真机完全相同的地址跑。
//! - PLIC 模型在 claim 读上做「阈值之上、挂起且使能、优先级最高」的
//!   选择并清挂起位；同优先级取最小源号——真机上这是硬件仲裁的，
//!   测试不得依赖这个次序。
//! - 挂起位图按硬件语义只读，对它的写入被丢弃。

use core::cell::{Cell, RefCell};

use crate::console::ConsoleSink;
use crate::hal::csr::{Csr, CsrFile};
use crate::hal::mmio::BusAccess;
use crate::hal::platform::{
    CLINT_BASE, CLINT_MSIP_OFFSET, CLINT_MTIMECMP_HI_OFFSET, CLINT_MTIMECMP_LO_OFFSET, PLIC_BASE,
    PLIC_CLAIM_OFFSET, PLIC_ENABLE_OFFSET, PLIC_PENDING_OFFSET, PLIC_PRIORITY_OFFSET,
    PLIC_THRESHOLD_OFFSET,
};

const CSR_COUNT: usize = 8;
const CSR_EVENT_CAP: usize = 64;

/// CSR 模型记录的访问事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrEvent {
    Set(Csr, usize),
    FenceVm,
}

/// CSR 寄存器堆模型，附带写入/屏障事件日志。
pub struct MockCsr {
    regs: RefCell<[usize; CSR_COUNT]>,
    events: RefCell<[Option<CsrEvent>; CSR_EVENT_CAP]>,
    event_len: Cell<usize>,
}

impl MockCsr {
    pub fn new() -> Self {
        Self {
            regs: RefCell::new([0; CSR_COUNT]),
            events: RefCell::new([None; CSR_EVENT_CAP]),
            event_len: Cell::new(0),
        }
    }

    fn push(&self, event: CsrEvent) {
        let len = self.event_len.get();
        if len < CSR_EVENT_CAP {
            self.events.borrow_mut()[len] = Some(event);
            self.event_len.set(len + 1);
        }
    }

    pub fn event(&self, index: usize) -> Option<CsrEvent> {
        self.events.borrow().get(index).copied().flatten()
    }

    pub fn event_count(&self) -> usize {
        self.event_len.get()
    }
}

impl Default for MockCsr {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrFile for MockCsr {
    fn get(&self, csr: Csr) -> usize {
        self.regs.borrow()[csr as usize]
    }

    fn set(&self, csr: Csr, value: usize) {
        self.regs.borrow_mut()[csr as usize] = value;
        self.push(CsrEvent::Set(csr, value));
    }

    fn fence_vm(&self) {
        self.push(CsrEvent::FenceVm);
    }
}

/// 模型里实现的中断源数，要不低于板级的 `NR_SOURCES`。
pub const MODEL_SOURCES: usize = 128;
const MODEL_WORDS: usize = MODEL_SOURCES / 32;

/// 软件 PLIC：优先级表、位图、阈值与 claim/complete 仲裁。
pub struct PlicModel {
    priority: RefCell<[u32; MODEL_SOURCES]>,
    pending: RefCell<[u32; MODEL_WORDS]>,
    enable: RefCell<[u32; MODEL_WORDS]>,
    threshold: Cell<u32>,
}

impl PlicModel {
    pub fn new() -> Self {
        Self {
            priority: RefCell::new([0; MODEL_SOURCES]),
            pending: RefCell::new([0; MODEL_WORDS]),
            enable: RefCell::new([0; MODEL_WORDS]),
            threshold: Cell::new(0),
        }
    }

    /// 拉高一条中断线（测试桩）。
    pub fn raise(&self, id: usize) {
        self.pending.borrow_mut()[id / 32] |= 1 << (id % 32);
    }

    pub fn pending(&self, id: usize) -> bool {
        self.pending.borrow()[id / 32] & (1 << (id % 32)) != 0
    }

    fn best_claimable(&self) -> Option<usize> {
        let threshold = self.threshold.get();
        let priority = self.priority.borrow();
        let mut best: Option<(usize, u32)> = None;
        for id in 1..MODEL_SOURCES {
            if !self.pending(id) {
                continue;
            }
            if self.enable.borrow()[id / 32] & (1 << (id % 32)) == 0 {
                continue;
            }
            if priority[id] <= threshold {
                continue;
            }
            match best {
                Some((_, p)) if p >= priority[id] => {}
                _ => best = Some((id, priority[id])),
            }
        }
        best.map(|(id, _)| id)
    }

    fn read(&self, offset: usize) -> u32 {
        match offset {
            PLIC_THRESHOLD_OFFSET => self.threshold.get(),
            PLIC_CLAIM_OFFSET => match self.best_claimable() {
                Some(id) => {
                    self.pending.borrow_mut()[id / 32] &= !(1 << (id % 32));
                    id as u32
                }
                None => 0,
            },
            o if (PLIC_PRIORITY_OFFSET..PLIC_PRIORITY_OFFSET + 4 * MODEL_SOURCES).contains(&o) => {
                self.priority.borrow()[(o - PLIC_PRIORITY_OFFSET) / 4]
            }
            o if (PLIC_PENDING_OFFSET..PLIC_PENDING_OFFSET + 4 * MODEL_WORDS).contains(&o) => {
                self.pending.borrow()[(o - PLIC_PENDING_OFFSET) / 4]
            }
            o if (PLIC_ENABLE_OFFSET..PLIC_ENABLE_OFFSET + 4 * MODEL_WORDS).contains(&o) => {
                self.enable.borrow()[(o - PLIC_ENABLE_OFFSET) / 4]
            }
            _ => 0,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        match offset {
            PLIC_THRESHOLD_OFFSET => self.threshold.set(value),
            // complete：门控释放，挂起状态由下一次 raise 决定
            PLIC_CLAIM_OFFSET => {}
            o if (PLIC_PRIORITY_OFFSET..PLIC_PRIORITY_OFFSET + 4 * MODEL_SOURCES).contains(&o) => {
                self.priority.borrow_mut()[(o - PLIC_PRIORITY_OFFSET) / 4] = value;
            }
            o if (PLIC_ENABLE_OFFSET..PLIC_ENABLE_OFFSET + 4 * MODEL_WORDS).contains(&o) => {
                self.enable.borrow_mut()[(o - PLIC_ENABLE_OFFSET) / 4] = value;
            }
            // 挂起位图只读，写入丢弃
            _ => {}
        }
    }
}

impl Default for PlicModel {
    fn default() -> Self {
        Self::new()
    }
}

/// 软件 CLINT：比较器两半、软件中断触发位、可推进的 mtime。
pub struct ClintModel {
    msip: Cell<u32>,
    cmp_lo: Cell<u32>,
    cmp_hi: Cell<u32>,
    mtime: Cell<u64>,
}

impl ClintModel {
    pub fn new() -> Self {
        Self {
            msip: Cell::new(0),
            cmp_lo: Cell::new(u32::MAX),
            cmp_hi: Cell::new(u32::MAX),
            mtime: Cell::new(0),
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.mtime.set(self.mtime.get() + ticks);
    }

    pub fn compare(&self) -> u64 {
        (self.cmp_hi.get() as u64) << 32 | self.cmp_lo.get() as u64
    }

    pub fn timer_pending(&self) -> bool {
        self.mtime.get() >= self.compare()
    }

    pub fn software_pending(&self) -> bool {
        self.msip.get() & 1 != 0
    }

    fn read(&self, offset: usize) -> u32 {
        match offset {
            CLINT_MSIP_OFFSET => self.msip.get(),
            CLINT_MTIMECMP_LO_OFFSET => self.cmp_lo.get(),
            CLINT_MTIMECMP_HI_OFFSET => self.cmp_hi.get(),
            _ => 0,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        match offset {
            CLINT_MSIP_OFFSET => self.msip.set(value & 1),
            CLINT_MTIMECMP_LO_OFFSET => self.cmp_lo.set(value),
            CLINT_MTIMECMP_HI_OFFSET => self.cmp_hi.set(value),
            _ => {}
        }
    }
}

impl Default for ClintModel {
    fn default() -> Self {
        Self::new()
    }
}

/// 两个设备模型拼成的一条总线，按板级基地址解码。
pub struct MachineModel {
    pub plic: PlicModel,
    pub clint: ClintModel,
}

impl MachineModel {
    pub fn new() -> Self {
        Self {
            plic: PlicModel::new(),
            clint: ClintModel::new(),
        }
    }
}

impl Default for MachineModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BusAccess for MachineModel {
    fn read32(&self, addr: usize) -> u32 {
        if addr >= CLINT_BASE {
            self.clint.read(addr - CLINT_BASE)
        } else if addr >= PLIC_BASE {
            self.plic.read(addr - PLIC_BASE)
        } else {
            0
        }
    }

    fn write32(&self, addr: usize, value: u32) {
        if addr >= CLINT_BASE {
            self.clint.write(addr - CLINT_BASE, value);
        } else if addr >= PLIC_BASE {
            self.plic.write(addr - PLIC_BASE, value);
        }
    }
}

/// 把诊断输出攒进定长缓冲，供断言用。
pub struct CaptureSink {
    buf: RefCell<[u8; 4096]>,
    len: Cell<usize>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            buf: RefCell::new([0; 4096]),
            len: Cell::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    pub fn contains(&self, needle: &str) -> bool {
        let len = self.len.get();
        let buf = self.buf.borrow();
        let needle = needle.as_bytes();
        if needle.is_empty() {
            return true;
        }
        buf[..len].windows(needle.len()).any(|w| w == needle)
    }
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink for CaptureSink {
    fn put_byte(&self, byte: u8) {
        let len = self.len.get();
        let mut buf = self.buf.borrow_mut();
        if len < buf.len() {
            buf[len] = byte;
            self.len.set(len + 1);
        }
    }
}
