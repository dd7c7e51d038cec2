//! riscv64 机器态粘合层。
//!
//! 把可移植的核心接到真实硬件上：CSR 实现、汇编陷阱入口、全局
//! 分发器槽位，以及按固定次序走完的初始化。启动次序是硬约束：
//! 先静默（关全局使能、关类使能、清空 PLIC 使能、完成积压认领），
//! 再装向量、装定时器、设阈值，最后才打开全局使能位。

pub mod csr;

use core::arch::global_asm;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::clint::{ClintError, ClintTimer};
use crate::console::{self, ConsoleSink};
use crate::hal::csr::IntrGuard;
use crate::hal::mmio::PhysBus;
use crate::hal::platform::{CLINT_BASE, NR_SOURCES, PLIC_BASE};
use crate::plic::{Plic, PlicError};
use crate::sync::UPSafeCell;
use crate::trap::{DispatchError, IrqHandler, TrapDispatcher, TrapOutcome};

pub use csr::MachineCsr;

global_asm!(include_str!("trap.S"));

type MachineDispatcher = TrapDispatcher<'static, PhysBus, MachineCsr>;

lazy_static! {
    static ref DISPATCHER: UPSafeCell<Option<MachineDispatcher>> =
        unsafe { UPSafeCell::new(None) };
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Clint(#[from] ClintError),
    #[error(transparent)]
    Plic(#[from] PlicError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// 机器态初始化。
///
/// `first_deadline` 是首个绝对截止值，`tick_interval` 是此后每次
/// 顺延的步长。这里的失败都是接线级错误：报告之后停机。
pub fn machine_init(sink: &'static dyn ConsoleSink, first_deadline: u64, tick_interval: u64) {
    console::init(sink);

    let clint = ClintTimer::new(unsafe { PhysBus::new() }, MachineCsr, CLINT_BASE);
    let plic = Plic::new(unsafe { PhysBus::new() }, MachineCsr, PLIC_BASE, NR_SOURCES);
    let mut dispatcher = TrapDispatcher::new(MachineCsr, clint, plic, sink, tick_interval);

    if let Err(e) = quiesce_and_configure(&mut dispatcher, first_deadline) {
        log::error!("machine bring-up failed: {}", e);
        halt();
    }

    // 分发器先落位，再打开全局使能，第一次陷入就能找到它
    *DISPATCHER.exclusive_access() = Some(dispatcher);
    match with_dispatcher(|d| d.arm()) {
        Some(Ok(())) => log::info!("machine init completed"),
        Some(Err(e)) => {
            log::error!("machine bring-up failed: {}", e);
            halt();
        }
        None => halt(),
    }
}

fn quiesce_and_configure(
    dispatcher: &mut MachineDispatcher,
    first_deadline: u64,
) -> Result<(), InitError> {
    dispatcher.disarm();
    dispatcher.plic().disable_external();
    dispatcher.clint().disable();
    dispatcher.plic().disable_all()?;

    let stale = dispatcher.plic_mut().drain()?;
    if stale > 0 {
        log::info!("completed {} stale claims", stale);
    }

    extern "C" {
        fn __machine_traps();
    }
    dispatcher.install(__machine_traps as usize)?;

    dispatcher.plic().set_threshold(0)?;
    dispatcher
        .clint()
        .program(first_deadline as u32, (first_deadline >> 32) as u32)?;
    dispatcher.clint().enable();
    dispatcher.plic().enable_external();
    Ok(())
}

/// 借出全局分发器。借用期间屏蔽中断，避免与陷阱上下文撞车。
pub fn with_dispatcher<R>(f: impl FnOnce(&mut MachineDispatcher) -> R) -> Option<R> {
    let csr = MachineCsr;
    let _guard = IntrGuard::new(&csr);
    let mut slot = DISPATCHER.exclusive_access();
    slot.as_mut().map(f)
}

/// 注册外部中断回调；应在使能对应源之前完成。
pub fn register_external(
    id: u32,
    handler: &'static mut dyn IrqHandler,
) -> Result<(), DispatchError> {
    with_dispatcher(|d| d.register(id, handler)).unwrap_or(Err(DispatchError::VectorNotInstalled))
}

#[no_mangle]
extern "C" fn machine_trap_rust() {
    let outcome = {
        let mut slot = DISPATCHER.exclusive_access();
        match slot.as_mut() {
            Some(dispatcher) => dispatcher.dispatch(),
            // 初始化完成之前不应该有陷入
            None => TrapOutcome::Fatal,
        }
    };
    if outcome == TrapOutcome::Fatal {
        halt();
    }
}

/// 致命错误后的停机：无限等待，不复位、不重试。
pub fn halt() -> ! {
    loop {
        unsafe { riscv::asm::wfi() };
    }
}
