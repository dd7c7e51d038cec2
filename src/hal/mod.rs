//! 硬件访问层
//!
//! 所有对硬件的触碰都收敛到两个接口：[`BusAccess`]（内存映射寄存器）
//! 与 [`CsrFile`]（特权控制状态寄存器）。真正会说体系结构方言的实现
//! 只存在于 `arch` 下，按目标架构选择；宿主机上编译的是 `mock` 里的
//! 软件替身，供测试使用。

pub mod arch;
pub mod csr;
pub mod mmio;
pub mod platform;

#[cfg(not(target_arch = "riscv64"))]
pub mod mock;

pub use csr::{Csr, CsrFile, IntrGuard, IE_EXTERNAL, IE_SOFTWARE, IE_TIMER, STATUS_MIE};
pub use mmio::{BusAccess, MmioError, PhysBus};
