//! 陷入现场与原因解码。

use num_enum::TryFromPrimitive;

use crate::hal::csr::{Csr, CsrFile};

/// cause 最高位置位表示中断，清零表示同步异常。
pub const INTERRUPT_FLAG: usize = 1 << (usize::BITS as usize - 1);

/// 异步中断的子码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum InterruptKind {
    MachineSoft = 3,
    MachineTimer = 7,
    MachineExternal = 11,
}

/// 同步异常的子码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(usize)]
pub enum ExceptionKind {
    InstructionMisaligned = 0,
    InstructionFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadMisaligned = 4,
    LoadFault = 5,
    StoreMisaligned = 6,
    StoreFault = 7,
    UserEnvCall = 8,
    SupervisorEnvCall = 9,
    MachineEnvCall = 11,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    Interrupt(InterruptKind),
    Exception(ExceptionKind),
    /// 不认识的编码原样带回，报告后停机。
    Unknown(usize),
}

impl TrapCause {
    pub fn decode(bits: usize) -> Self {
        if bits & INTERRUPT_FLAG != 0 {
            match InterruptKind::try_from(bits & !INTERRUPT_FLAG) {
                Ok(kind) => TrapCause::Interrupt(kind),
                Err(_) => TrapCause::Unknown(bits),
            }
        } else {
            match ExceptionKind::try_from(bits) {
                Ok(kind) => TrapCause::Exception(kind),
                Err(_) => TrapCause::Unknown(bits),
            }
        }
    }
}

/// 陷入瞬间的快照，只活到处理器返回。
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub exception_pc: usize,
    pub cause: usize,
    pub trap_value: usize,
}

impl TrapFrame {
    /// 从 CSR 采集现场。
    pub fn capture<C: CsrFile>(csr: &C) -> Self {
        Self {
            exception_pc: csr.get(Csr::ExceptionPc),
            cause: csr.get(Csr::Cause),
            trap_value: csr.get(Csr::TrapValue),
        }
    }

    pub fn cause(&self) -> TrapCause {
        TrapCause::decode(self.cause)
    }
}
