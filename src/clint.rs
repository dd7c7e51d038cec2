//! 核内定时器与软件中断驱动。
//!
//! 比较器是一个 64 位值，硬件上拆成固定偏移处的两个 32 位半字。
//! 重编程必须先关掉时钟中断使能位，否则半写状态可能被比较器看见，
//! 提前放出一次假中断——`program` 把这条纪律做成了错误而不是约定。

use thiserror::Error;

use crate::hal::csr::{Csr, CsrFile, IE_SOFTWARE, IE_TIMER};
use crate::hal::mmio::{BusAccess, MmioError};
use crate::hal::platform::{CLINT_MSIP_OFFSET, CLINT_MTIMECMP_HI_OFFSET, CLINT_MTIMECMP_LO_OFFSET};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClintError {
    #[error("comparator reprogrammed while the timer interrupt is enabled")]
    ProgramWhileEnabled,
    #[error(transparent)]
    Mmio(#[from] MmioError),
}

/// CLINT 比较器与软件中断触发位。
pub struct ClintTimer<B: BusAccess, C: CsrFile> {
    bus: B,
    csr: C,
    base: usize,
}

impl<B: BusAccess, C: CsrFile> ClintTimer<B, C> {
    pub fn new(bus: B, csr: C, base: usize) -> Self {
        Self { bus, csr, base }
    }

    /// 打开时钟中断使能位，比较器即刻生效。
    pub fn enable(&self) {
        self.csr.set_bits(Csr::InterruptEnable, IE_TIMER);
    }

    /// 关掉时钟中断使能位。
    pub fn disable(&self) {
        self.csr.clear_bits(Csr::InterruptEnable, IE_TIMER);
    }

    pub fn is_enabled(&self) -> bool {
        self.csr.get(Csr::InterruptEnable) & IE_TIMER != 0
    }

    /// 写入 64 位截止值的两个半字，低半在前。
    ///
    /// 使能位还开着时拒绝执行；先 `disable`，写完再 `enable`。
    pub fn program(&self, compare_lo: u32, compare_hi: u32) -> Result<(), ClintError> {
        if self.is_enabled() {
            return Err(ClintError::ProgramWhileEnabled);
        }
        self.bus
            .write32_checked(self.base + CLINT_MTIMECMP_LO_OFFSET, compare_lo)?;
        self.bus
            .write32_checked(self.base + CLINT_MTIMECMP_HI_OFFSET, compare_hi)?;
        Ok(())
    }

    /// 读回当前的 64 位截止值。
    pub fn compare(&self) -> u64 {
        let lo = self.bus.read32(self.base + CLINT_MTIMECMP_LO_OFFSET) as u64;
        let hi = self.bus.read32(self.base + CLINT_MTIMECMP_HI_OFFSET) as u64;
        hi << 32 | lo
    }

    /// 陷阱上下文里的重编程：写入下一个截止值。
    ///
    /// 此时全局中断位已被硬件清零，半写状态不会被观测到。返回前
    /// 必须调用到这里，否则时钟不会再响。
    pub fn rearm(&self, next_compare: u64) -> Result<(), ClintError> {
        self.bus
            .write32_checked(self.base + CLINT_MTIMECMP_LO_OFFSET, next_compare as u32)?;
        self.bus
            .write32_checked(self.base + CLINT_MTIMECMP_HI_OFFSET, (next_compare >> 32) as u32)?;
        Ok(())
    }

    /// 以上一个截止值为基准顺延，返回新的截止值。
    ///
    /// 以 compare 而不是 mtime 为基准，周期不随处理延迟漂移。
    pub fn rearm_after(&self, ticks: u64) -> Result<u64, ClintError> {
        let next = self.compare().wrapping_add(ticks);
        self.rearm(next)?;
        Ok(next)
    }

    /// 拉起软件中断。
    pub fn raise_soft(&self) -> Result<(), ClintError> {
        self.bus.write32_checked(self.base + CLINT_MSIP_OFFSET, 1)?;
        Ok(())
    }

    /// 清掉软件中断挂起位。
    pub fn clear_soft(&self) -> Result<(), ClintError> {
        self.bus.write32_checked(self.base + CLINT_MSIP_OFFSET, 0)?;
        Ok(())
    }

    pub fn enable_soft(&self) {
        self.csr.set_bits(Csr::InterruptEnable, IE_SOFTWARE);
    }

    pub fn disable_soft(&self) {
        self.csr.clear_bits(Csr::InterruptEnable, IE_SOFTWARE);
    }
}
