//! BL808（T-head C906 单 hart）的中断与定时器寄存器布局。
//!
//! PLIC 与 CLINT 同属一个设备窗口：PLIC 在窗口起始处，CLINT 在
//! 窗口内偏移 0x400_0000 处。

/// 平台级中断控制器基地址
pub const PLIC_BASE: usize = 0xe000_0000;

/// 源优先级表偏移，每源一个字，取值 0..=31
pub const PLIC_PRIORITY_OFFSET: usize = 0x0;
/// 挂起位图偏移，只读，每字 32 个源
pub const PLIC_PENDING_OFFSET: usize = 0x1000;
/// hart0 机器态使能位图偏移，每字 32 个源
pub const PLIC_ENABLE_OFFSET: usize = 0x2000;
/// hart0 机器态阈值寄存器偏移
pub const PLIC_THRESHOLD_OFFSET: usize = 0x20_0000;
/// hart0 机器态 claim/complete 寄存器偏移（读即认领，写即完成）
pub const PLIC_CLAIM_OFFSET: usize = 0x20_0004;

/// 核内中断控制器基地址
pub const CLINT_BASE: usize = 0xe400_0000;

/// 软件中断触发寄存器偏移
pub const CLINT_MSIP_OFFSET: usize = 0x0;
/// 64 位定时器比较值的低半偏移
pub const CLINT_MTIMECMP_LO_OFFSET: usize = 0x4000;
/// 64 位定时器比较值的高半偏移
pub const CLINT_MTIMECMP_HI_OFFSET: usize = 0x4004;

/// 片上外设的中断号起始值（手册 pg 45：外设源从 16 号排起）
pub const IRQ_NUM_BASE: u32 = 16;
/// 板上实际接线的中断源数，覆盖 3 个使能/挂起字
pub const NR_SOURCES: u32 = 96;
/// mtime 计数频率
pub const TIMEBASE_FREQ: usize = 1_000_000;
