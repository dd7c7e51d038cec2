//! 平台级中断控制器驱动。
//!
//! # Overview
//! PLIC 按优先级与阈值仲裁最多 1024 个外部中断源。驱动覆盖五组
//! 寄存器：优先级表、挂起位图（只读）、hart 使能位图、阈值、
//! claim/complete。认领与完成是一对两步协议：读 claim 寄存器取得
//! 当前最高优先级的就绪源并清其挂起位；把同一个源号写回去，源才
//! 重新武装。
//!
//! # Design
//! - 非法优先级 / 阈值（>= 32）直接以错误返回，寄存器不被触碰。
//! - [`ClaimToken`] 只能由 [`Plic::claim`] 铸出且不可复制，
//!   `complete` 按值消费它；驱动另记一张在途位图，别的实例铸出的
//!   token 会被拒绝，而不是写进硬件去扰动无关的源。
//! - 使能位图的读-改-写与陷阱上下文共享同一个字，必须套
//!   [`IntrGuard`] 进行。
//!
//! # Invariants
//! - 源号 0 保留，永远不会被使能或认领；claim 读到 0 表示无事可做。
//! - 优先级 0 的源无论阈值如何都不会触发。
//! - 同优先级之间的次序由硬件仲裁，这里不做任何假设。

use bit_field::BitField;
use thiserror::Error;

use crate::hal::csr::{Csr, CsrFile, IntrGuard, IE_EXTERNAL};
use crate::hal::mmio::{BusAccess, MmioError};
use crate::hal::platform::{
    PLIC_CLAIM_OFFSET, PLIC_ENABLE_OFFSET, PLIC_PENDING_OFFSET, PLIC_PRIORITY_OFFSET,
    PLIC_THRESHOLD_OFFSET,
};

/// 架构允许的中断源上限。
pub const MAX_SOURCES: u32 = 1024;
/// 优先级与阈值的开区间上界。
pub const PRIORITY_LIMIT: u32 = 32;

const CLAIM_WORDS: usize = (MAX_SOURCES / 32) as usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlicError {
    #[error("priority {0} out of range (must be < 32)")]
    PriorityOutOfRange(u32),
    #[error("threshold {0} out of range (must be < 32)")]
    ThresholdOutOfRange(u32),
    #[error("interrupt source {0} out of range")]
    SourceOutOfRange(u32),
    #[error("completing source {0} which has no outstanding claim here")]
    UnclaimedComplete(u32),
    #[error(transparent)]
    Mmio(#[from] MmioError),
}

/// 一次成功认领的凭据。
///
/// 不可复制；交还给 [`Plic::complete`] 时被消费。丢弃一个未完成的
/// token 会让对应源永远不再触发——这是调用方要避免的活性风险。
#[must_use]
#[derive(Debug)]
pub struct ClaimToken {
    id: u32,
}

impl ClaimToken {
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// PLIC 驱动，hart0 机器态上下文。
pub struct Plic<B: BusAccess, C: CsrFile> {
    bus: B,
    csr: C,
    base: usize,
    nr_sources: u32,
    claimed: [u32; CLAIM_WORDS],
}

impl<B: BusAccess, C: CsrFile> Plic<B, C> {
    pub fn new(bus: B, csr: C, base: usize, nr_sources: u32) -> Self {
        debug_assert!(nr_sources <= MAX_SOURCES);
        Self {
            bus,
            csr,
            base,
            nr_sources,
            claimed: [0; CLAIM_WORDS],
        }
    }

    fn check_source(&self, id: u32) -> Result<(), PlicError> {
        if id == 0 || id >= self.nr_sources {
            return Err(PlicError::SourceOutOfRange(id));
        }
        Ok(())
    }

    fn enable_word_addr(&self, id: u32) -> usize {
        self.base + PLIC_ENABLE_OFFSET + 4 * (id / 32) as usize
    }

    /// 设置一个源的优先级。
    pub fn set_priority(&self, id: u32, priority: u32) -> Result<(), PlicError> {
        self.check_source(id)?;
        if priority >= PRIORITY_LIMIT {
            return Err(PlicError::PriorityOutOfRange(priority));
        }
        self.bus
            .write32_checked(self.base + PLIC_PRIORITY_OFFSET + 4 * id as usize, priority)?;
        Ok(())
    }

    /// 读回一个源的优先级。
    pub fn priority(&self, id: u32) -> Result<u32, PlicError> {
        self.check_source(id)?;
        Ok(self
            .bus
            .read32(self.base + PLIC_PRIORITY_OFFSET + 4 * id as usize))
    }

    /// 设置仲裁阈值；只有优先级严格大于阈值的源会触发。
    pub fn set_threshold(&self, threshold: u32) -> Result<(), PlicError> {
        if threshold >= PRIORITY_LIMIT {
            return Err(PlicError::ThresholdOutOfRange(threshold));
        }
        self.bus
            .write32_checked(self.base + PLIC_THRESHOLD_OFFSET, threshold)?;
        Ok(())
    }

    pub fn threshold(&self) -> u32 {
        self.bus.read32(self.base + PLIC_THRESHOLD_OFFSET)
    }

    /// 使能一个源。读-改-写期间屏蔽中断。
    pub fn enable(&self, id: u32) -> Result<(), PlicError> {
        self.check_source(id)?;
        let addr = self.enable_word_addr(id);
        let _guard = IntrGuard::new(&self.csr);
        let mut word = self.bus.read32(addr);
        word.set_bit((id % 32) as usize, true);
        self.bus.write32_checked(addr, word)?;
        Ok(())
    }

    /// 关掉一个源。读-改-写期间屏蔽中断。
    pub fn disable(&self, id: u32) -> Result<(), PlicError> {
        self.check_source(id)?;
        let addr = self.enable_word_addr(id);
        let _guard = IntrGuard::new(&self.csr);
        let mut word = self.bus.read32(addr);
        word.set_bit((id % 32) as usize, false);
        self.bus.write32_checked(addr, word)?;
        Ok(())
    }

    pub fn is_enabled(&self, id: u32) -> Result<bool, PlicError> {
        self.check_source(id)?;
        let word = self.bus.read32(self.enable_word_addr(id));
        Ok(word.get_bit((id % 32) as usize))
    }

    /// 启动静默：清空所有使能字。
    pub fn disable_all(&self) -> Result<(), PlicError> {
        let words = self.nr_sources.div_ceil(32) as usize;
        let _guard = IntrGuard::new(&self.csr);
        for word in 0..words {
            self.bus
                .write32_checked(self.base + PLIC_ENABLE_OFFSET + 4 * word, 0)?;
        }
        Ok(())
    }

    /// 只读探询挂起位；协议正确性不依赖它。
    pub fn is_pending(&self, id: u32) -> Result<bool, PlicError> {
        self.check_source(id)?;
        let word = self
            .bus
            .read32(self.base + PLIC_PENDING_OFFSET + 4 * (id / 32) as usize);
        Ok(word.get_bit((id % 32) as usize))
    }

    /// 认领当前最高优先级的就绪源。
    ///
    /// 读本身就把该源的挂起位清掉了；读到保留号 0 说明没有可认领
    /// 的源，返回 `None`。
    pub fn claim(&mut self) -> Option<ClaimToken> {
        let id = self.bus.read32(self.base + PLIC_CLAIM_OFFSET);
        if id == 0 {
            return None;
        }
        self.claimed[(id / 32) as usize].set_bit((id % 32) as usize, true);
        Some(ClaimToken { id })
    }

    /// 完成一次认领，重新武装该源。
    ///
    /// token 必须是本实例铸出且尚未完成的，否则报错并且不触碰硬件。
    pub fn complete(&mut self, token: ClaimToken) -> Result<(), PlicError> {
        let id = token.id;
        let word = (id / 32) as usize;
        let bit = (id % 32) as usize;
        if !self.claimed[word].get_bit(bit) {
            return Err(PlicError::UnclaimedComplete(id));
        }
        self.claimed[word].set_bit(bit, false);
        self.bus.write32(self.base + PLIC_CLAIM_OFFSET, id);
        Ok(())
    }

    /// 把积压的认领逐个完成，返回清掉的数量。
    ///
    /// 启动时调用，复位残留的在途中断不清会卡住后续仲裁。
    pub fn drain(&mut self) -> Result<u32, PlicError> {
        let mut drained = 0;
        while let Some(token) = self.claim() {
            self.complete(token)?;
            drained += 1;
            if drained >= self.nr_sources {
                break;
            }
        }
        Ok(drained)
    }

    /// 打开外部中断类使能位。
    pub fn enable_external(&self) {
        self.csr.set_bits(Csr::InterruptEnable, IE_EXTERNAL);
    }

    /// 关掉外部中断类使能位。
    pub fn disable_external(&self) {
        self.csr.clear_bits(Csr::InterruptEnable, IE_EXTERNAL);
    }
}
