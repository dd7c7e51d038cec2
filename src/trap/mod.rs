//! 陷阱分发模块。
//!
//! # Overview
//! 硬件把所有陷入送到同一个入口；这里读出原因并分路：
//! - 时钟中断 → 顺延比较器，回去；
//! - 软件中断 → 清触发位，回去；
//! - 外部中断 → PLIC 认领 → 按源号回调 → 完成；
//! - 同步异常与不认识的编码 → 经诊断通道转储现场，交由外层停机。
//!
//! # Control Flow
//! 1. 启动代码在未武装状态下 `install` 陷阱向量；
//! 2. 配置好 CLINT / PLIC 后 `arm` 打开全局使能位；
//! 3. 此后每次陷入由 `hal/arch` 的汇编入口调到 [`TrapDispatcher::dispatch`]。
//!
//! # Invariants
//! - 武装状态下拒绝改写陷阱向量，不会打烂在途处理器的跳转目标。
//! - 处理器全程在全局使能位清零的状态下执行；本模块任何路径都不
//!   会在 `dispatch` 中途把它重新打开，不支持嵌套陷入。

mod frame;

use core::fmt::Write;

use thiserror::Error;

use crate::clint::ClintTimer;
use crate::console::{ConsoleSink, SinkWriter};
use crate::hal::csr::{Csr, CsrFile, STATUS_MIE};
use crate::hal::mmio::BusAccess;
use crate::plic::Plic;

pub use frame::{ExceptionKind, InterruptKind, TrapCause, TrapFrame, INTERRUPT_FLAG};

/// 可注册的外部中断回调数。
pub const HANDLER_SLOTS: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("trap vector installed while armed")]
    InstallWhileArmed,
    #[error("trap vector {0:#x} is not 4-byte aligned")]
    MisalignedVector(usize),
    #[error("armed without an installed trap vector")]
    VectorNotInstalled,
    #[error("handler table full")]
    HandlerTableFull,
    #[error("handler already registered for source {0}")]
    DuplicateHandler(u32),
}

/// 一次 `dispatch` 的结果；`Fatal` 由外层转成停机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    Handled,
    /// 外部中断已被别处消化（claim 读到 0），直接返回。
    Spurious,
    Fatal,
}

/// 外部中断回调：按源号分发，附带陷入现场。
pub trait IrqHandler {
    fn handle(&mut self, id: u32, frame: &TrapFrame);
}

/// 陷阱分发器。
///
/// 两个状态：未武装（初始，向量未装或全局使能清零）与武装。
/// 持有两个驱动与回调表，是陷阱上下文里唯一的执行者。
pub struct TrapDispatcher<'a, B: BusAccess, C: CsrFile> {
    csr: C,
    clint: ClintTimer<B, C>,
    plic: Plic<B, C>,
    sink: &'a dyn ConsoleSink,
    handlers: [Option<(u32, &'a mut dyn IrqHandler)>; HANDLER_SLOTS],
    tick_interval: u64,
    installed: bool,
    armed: bool,
}

impl<'a, B: BusAccess, C: CsrFile> TrapDispatcher<'a, B, C> {
    pub fn new(
        csr: C,
        clint: ClintTimer<B, C>,
        plic: Plic<B, C>,
        sink: &'a dyn ConsoleSink,
        tick_interval: u64,
    ) -> Self {
        Self {
            csr,
            clint,
            plic,
            sink,
            handlers: core::array::from_fn(|_| None),
            tick_interval,
            installed: false,
            armed: false,
        }
    }

    pub fn clint(&self) -> &ClintTimer<B, C> {
        &self.clint
    }

    pub fn plic(&self) -> &Plic<B, C> {
        &self.plic
    }

    pub fn plic_mut(&mut self) -> &mut Plic<B, C> {
        &mut self.plic
    }

    /// 写入陷阱向量基址（direct 模式，入口 4 字节对齐）。
    ///
    /// 必须在未武装状态下进行：使能位还开着就改向量，陷入可能落到
    /// 半初始化的目标上。
    pub fn install(&mut self, handler_entry: usize) -> Result<(), DispatchError> {
        if self.armed {
            return Err(DispatchError::InstallWhileArmed);
        }
        if handler_entry & 0b11 != 0 {
            return Err(DispatchError::MisalignedVector(handler_entry));
        }
        self.csr.set(Csr::TrapVector, handler_entry);
        self.installed = true;
        Ok(())
    }

    /// 打开全局中断使能位。
    pub fn arm(&mut self) -> Result<(), DispatchError> {
        if !self.installed {
            return Err(DispatchError::VectorNotInstalled);
        }
        self.csr.set_bits(Csr::Status, STATUS_MIE);
        self.armed = true;
        Ok(())
    }

    /// 清掉全局中断使能位。
    pub fn disarm(&mut self) {
        self.csr.clear_bits(Csr::Status, STATUS_MIE);
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// 注册一个源号到回调的映射。
    pub fn register(
        &mut self,
        id: u32,
        handler: &'a mut dyn IrqHandler,
    ) -> Result<(), DispatchError> {
        if self.handlers.iter().flatten().any(|(i, _)| *i == id) {
            return Err(DispatchError::DuplicateHandler(id));
        }
        match self.handlers.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some((id, handler));
                Ok(())
            }
            None => Err(DispatchError::HandlerTableFull),
        }
    }

    /// 陷入分发，由汇编入口调用。
    pub fn dispatch(&mut self) -> TrapOutcome {
        let frame = TrapFrame::capture(&self.csr);
        match frame.cause() {
            TrapCause::Interrupt(InterruptKind::MachineTimer) => {
                match self.clint.rearm_after(self.tick_interval) {
                    Ok(_) => TrapOutcome::Handled,
                    Err(e) => self.fatal(&frame, Some(&e)),
                }
            }
            TrapCause::Interrupt(InterruptKind::MachineSoft) => {
                match self.clint.clear_soft() {
                    Ok(()) => TrapOutcome::Handled,
                    Err(e) => self.fatal(&frame, Some(&e)),
                }
            }
            TrapCause::Interrupt(InterruptKind::MachineExternal) => {
                let Some(token) = self.plic.claim() else {
                    return TrapOutcome::Spurious;
                };
                let id = token.id();
                match self.handlers.iter_mut().flatten().find(|(i, _)| *i == id) {
                    Some((_, handler)) => handler.handle(id, &frame),
                    None => log::warn!("external interrupt {} has no handler", id),
                }
                match self.plic.complete(token) {
                    Ok(()) => TrapOutcome::Handled,
                    Err(e) => self.fatal(&frame, Some(&e)),
                }
            }
            // 同步异常与未知编码在这一层没有恢复策略
            _ => self.fatal(&frame, None),
        }
    }

    fn fatal(&self, frame: &TrapFrame, error: Option<&dyn core::fmt::Display>) -> TrapOutcome {
        let mut out = SinkWriter(self.sink);
        let _ = writeln!(out, "unrecoverable trap");
        let _ = writeln!(out, "  mepc:   {:#018x}", frame.exception_pc);
        let _ = writeln!(out, "  mcause: {:#018x}", frame.cause);
        let _ = writeln!(out, "  mtval:  {:#018x}", frame.trap_value);
        if let Some(error) = error {
            let _ = writeln!(out, "  error:  {}", error);
        }
        TrapOutcome::Fatal
    }
}
