//! 地址翻译控制寄存器的镜像编码与开关。
//!
//! 镜像布局：模式在 63..60，ASID 在 59..44，根页号在 43..0。
//! 每次改写前后各做一次地址翻译屏障：先冲掉旧表的缓存翻译，
//! 再保证新表在后续访存被翻译之前可见。

use bit_field::BitField;

use crate::hal::csr::{Csr, CsrFile};
use crate::mm::address::PhysPageNum;

/// 地址翻译模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    Off = 0,
    Sv39 = 8,
}

/// 构造控制寄存器镜像。
pub fn encode(mode: TranslationMode, asid: u16, root: PhysPageNum) -> usize {
    let mut bits = 0usize;
    bits.set_bits(60..64, mode as usize);
    bits.set_bits(44..60, asid as usize);
    bits.set_bits(0..44, root.0);
    bits
}

/// 取镜像的模式字段。
pub fn mode_of(bits: usize) -> usize {
    bits.get_bits(60..64)
}

/// 取镜像的 ASID 字段。
pub fn asid_of(bits: usize) -> u16 {
    bits.get_bits(44..60) as u16
}

/// 取镜像的根页号字段。
pub fn root_of(bits: usize) -> PhysPageNum {
    PhysPageNum(bits.get_bits(0..44))
}

/// 地址翻译控制：持有根表页号与地址空间号，独占控制寄存器。
pub struct MmuController<C: CsrFile> {
    csr: C,
    root: PhysPageNum,
    asid: u16,
}

impl<C: CsrFile> MmuController<C> {
    pub fn new(csr: C, root: PhysPageNum, asid: u16) -> Self {
        Self { csr, root, asid }
    }

    /// 当前配置对应的控制寄存器镜像（Sv39 模式）。
    pub fn satp_image(&self) -> usize {
        encode(TranslationMode::Sv39, self.asid, self.root)
    }

    /// 装入根表并打开 Sv39 翻译。
    pub fn activate(&self) {
        self.csr.fence_vm();
        self.csr.set(Csr::TranslationControl, self.satp_image());
        self.csr.fence_vm();
    }

    /// 关闭翻译，保留 ASID 与根页号字段。
    pub fn deactivate(&self) {
        let mut bits = self.csr.get(Csr::TranslationControl);
        bits.set_bits(60..64, TranslationMode::Off as usize);
        self.csr.fence_vm();
        self.csr.set(Csr::TranslationControl, bits);
        self.csr.fence_vm();
    }

    pub fn is_enabled(&self) -> bool {
        mode_of(self.csr.get(Csr::TranslationControl)) == TranslationMode::Sv39 as usize
    }

    pub fn is_disabled(&self) -> bool {
        mode_of(self.csr.get(Csr::TranslationControl)) == TranslationMode::Off as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_fields_sit_at_their_bit_positions() {
        let bits = encode(TranslationMode::Sv39, 1, PhysPageNum(0xabcde));
        assert_eq!(bits >> 60, 8);
        assert_eq!((bits >> 44) & 0xffff, 1);
        assert_eq!(bits & ((1 << 44) - 1), 0xabcde);
    }

    #[test]
    fn decode_matches_encode() {
        let bits = encode(TranslationMode::Sv39, 0x42, PhysPageNum(0x1000));
        assert_eq!(mode_of(bits), 8);
        assert_eq!(asid_of(bits), 0x42);
        assert_eq!(root_of(bits), PhysPageNum(0x1000));

        let off = encode(TranslationMode::Off, 0, PhysPageNum(0));
        assert_eq!(mode_of(off), 0);
    }
}
