#![cfg_attr(not(test), no_std)]

//! 单核 RISC-V 机器态运行时核心。
//!
//! 提供裸机板级支持层里真正需要状态机的四块东西：陷阱分发、平台级
//! 中断控制器（PLIC）驱动、核内定时器（CLINT）比较器、以及 Sv39 三级
//! 页表的构造与启用。UART/GPIO 这类单寄存器外设不在这里，它们通过
//! [`hal::BusAccess`] 与 [`console::ConsoleSink`] 两个窄接口与本 crate
//! 协作。

#[macro_use]
pub mod console;

pub mod clint;
pub mod hal;
pub mod mm;
pub mod plic;
pub mod sync;
pub mod trap;

pub use clint::ClintTimer;
pub use plic::{ClaimToken, Plic};
pub use trap::{IrqHandler, TrapDispatcher, TrapFrame, TrapOutcome};
