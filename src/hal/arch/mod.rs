//! 架构相关实现的选择开关。
//!
//! 只有 riscv64 目标会编出真正碰硬件的代码；其余目标（宿主机测试）
//! 用 `hal::mock` 里的替身。

#[cfg(target_arch = "riscv64")]
pub mod riscv;

#[cfg(target_arch = "riscv64")]
pub use riscv::{halt, machine_init, register_external, with_dispatcher, MachineCsr};
