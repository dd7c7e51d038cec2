//! 三级页表的表项编码与恒等映射构造。

use bitflags::bitflags;
use thiserror::Error;

use crate::mm::address::{PhysAddr, PhysPageNum, VPNRange, VirtAddr, VirtPageNum};
use crate::mm::PAGE_SIZE_BITS;

bitflags! {
    /// Sv39 页表项标志位
    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub struct PteFlags: u8 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
        const G = 1 << 5;
        const A = 1 << 6;
        const D = 1 << 7;
    }
}

const PTE_PPN_SHIFT: usize = 10;
const PTE_PPN_MASK: u64 = (1 << 44) - 1;

/// 一个 8 字节页表项。
///
/// 两种形态：非叶（valid 且 R/W/X 全零，指向下一级表）与叶
/// （valid 且至少一个权限位，给出物理页）。一个表项绝不同时是两者。
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct Pte {
    pub bits: u64,
}

impl Pte {
    pub fn new(ppn: PhysPageNum, flags: PteFlags) -> Self {
        Pte {
            bits: (ppn.0 as u64) << PTE_PPN_SHIFT | flags.bits() as u64,
        }
    }
    pub fn empty() -> Self {
        Pte { bits: 0 }
    }
    pub fn ppn(&self) -> PhysPageNum {
        (((self.bits >> PTE_PPN_SHIFT) & PTE_PPN_MASK) as usize).into()
    }
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.bits as u8)
    }
    pub fn is_valid(&self) -> bool {
        self.flags().contains(PteFlags::V)
    }
    pub fn readable(&self) -> bool {
        self.flags().contains(PteFlags::R)
    }
    pub fn writable(&self) -> bool {
        self.flags().contains(PteFlags::W)
    }
    pub fn executable(&self) -> bool {
        self.flags().contains(PteFlags::X)
    }
    /// 叶项：终结翻译并给出物理页。
    pub fn is_leaf(&self) -> bool {
        self.is_valid() && self.flags().intersects(PteFlags::R | PteFlags::W | PteFlags::X)
    }
    /// 非叶项：指向下一级表。
    pub fn is_table(&self) -> bool {
        self.is_valid() && !self.flags().intersects(PteFlags::R | PteFlags::W | PteFlags::X)
    }
}

/// 一级页表：512 项，恰好占一个 4KiB 页。
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Pte; 512],
}

impl PageTable {
    pub const fn zeroed() -> Self {
        Self {
            entries: [Pte { bits: 0 }; 512],
        }
    }
}

/// 页表帧来源：交出一个清零的 4KiB 对齐帧。
pub trait FrameSource {
    fn alloc_table(&mut self) -> Option<PhysPageNum>;
}

/// 由调用方预分配的页表池。
///
/// 裸机上喂静态数组，测试里喂堆上的数组；`alloc_table` 发出前清零。
pub struct TableArena<'a> {
    tables: &'a mut [PageTable],
    next: usize,
}

impl<'a> TableArena<'a> {
    pub fn new(tables: &'a mut [PageTable]) -> Self {
        Self { tables, next: 0 }
    }

    /// 已发出的表数。
    pub fn used(&self) -> usize {
        self.next
    }
}

impl FrameSource for TableArena<'_> {
    fn alloc_table(&mut self) -> Option<PhysPageNum> {
        let table = self.tables.get_mut(self.next)?;
        self.next += 1;
        for entry in table.entries.iter_mut() {
            *entry = Pte::empty();
        }
        let pa = PhysAddr::from(table as *const PageTable as usize);
        Some(pa.floor())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("range bound {0:#x} is not page aligned")]
    Unaligned(usize),
    #[error("table frames exhausted")]
    OutOfTables,
    #[error("page {0:?} is already mapped")]
    AlreadyMapped(VirtPageNum),
}

/// 三级页表构造器。
///
/// 只在构造期间改动表项；构造完成后页表视为静态，交给
/// [`MmuController`](crate::mm::MmuController) 启用。
pub struct Sv39Builder<A: FrameSource> {
    root_ppn: PhysPageNum,
    frames: A,
}

impl<A: FrameSource> Sv39Builder<A> {
    pub fn new(mut frames: A) -> Result<Self, MapError> {
        let root_ppn = frames.alloc_table().ok_or(MapError::OutOfTables)?;
        Ok(Self { root_ppn, frames })
    }

    pub fn root_ppn(&self) -> PhysPageNum {
        self.root_ppn
    }

    fn find_pte_create(&mut self, vpn: VirtPageNum) -> Result<&'static mut Pte, MapError> {
        let idxs = vpn.indexes();
        let mut ppn = self.root_ppn;
        for (i, idx) in idxs.iter().enumerate() {
            let pte = &mut ppn.pte_array()[*idx];
            if i == 2 {
                return Ok(pte);
            }
            if !pte.is_valid() {
                // 子表先清零再被父项指到，走表的人永远看不到脏表
                let frame = self.frames.alloc_table().ok_or(MapError::OutOfTables)?;
                *pte = Pte::new(frame, PteFlags::V);
            }
            ppn = pte.ppn();
        }
        unreachable!()
    }

    fn find_pte(&self, vpn: VirtPageNum) -> Option<&'static Pte> {
        let idxs = vpn.indexes();
        let mut ppn = self.root_ppn;
        for (i, idx) in idxs.iter().enumerate() {
            let pte = &ppn.pte_array()[*idx];
            if i == 2 {
                return Some(pte);
            }
            if !pte.is_valid() {
                return None;
            }
            ppn = pte.ppn();
        }
        None
    }

    /// 建立单页映射。
    ///
    /// 叶项带上 A/D：没有硬件管理 A/D 的核会在首次访问时缺页。
    pub fn map(
        &mut self,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
        perms: PteFlags,
    ) -> Result<(), MapError> {
        let pte = self.find_pte_create(vpn)?;
        if pte.is_valid() {
            return Err(MapError::AlreadyMapped(vpn));
        }
        *pte = Pte::new(ppn, perms | PteFlags::V | PteFlags::A | PteFlags::D);
        Ok(())
    }

    /// 按页步进恒等映射物理区间 `[start, end)`。
    pub fn map_identity(
        &mut self,
        start: PhysAddr,
        end: PhysAddr,
        perms: PteFlags,
    ) -> Result<(), MapError> {
        if !start.aligned() {
            return Err(MapError::Unaligned(start.0));
        }
        if !end.aligned() {
            return Err(MapError::Unaligned(end.0));
        }
        let range = VPNRange::new(VirtPageNum(start.floor().0), VirtPageNum(end.floor().0));
        for vpn in range {
            self.map(vpn, PhysPageNum(vpn.0), perms)?;
        }
        Ok(())
    }

    /// 软件走表；非叶项终止于 `None`。
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        let pte = self.find_pte(va.floor())?;
        if !pte.is_leaf() {
            return None;
        }
        Some(PhysAddr::from(
            (pte.ppn().0 << PAGE_SIZE_BITS) + va.page_offset(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pte_fields_sit_at_their_bit_positions() {
        let pte = Pte::new(PhysPageNum(0x1234), PteFlags::V | PteFlags::R | PteFlags::W);
        assert_eq!(pte.bits & 0xff, 0b0000_0111);
        assert_eq!(pte.bits >> 10, 0x1234);

        let flags = PteFlags::all();
        let pte = Pte::new(PhysPageNum(0), flags);
        assert_eq!(pte.bits, 0xff);
    }

    #[test]
    fn ppn_field_is_44_bits_wide() {
        let ppn = PhysPageNum((1 << 44) - 1);
        let pte = Pte::new(ppn, PteFlags::V);
        assert_eq!(pte.ppn().0, (1 << 44) - 1);
        assert_eq!(pte.bits >> 54, 0);
    }

    #[test]
    fn leaf_and_table_shapes_are_disjoint() {
        let table = Pte::new(PhysPageNum(5), PteFlags::V);
        assert!(table.is_table());
        assert!(!table.is_leaf());

        let leaf = Pte::new(PhysPageNum(5), PteFlags::V | PteFlags::X);
        assert!(leaf.is_leaf());
        assert!(!leaf.is_table());

        assert!(!Pte::empty().is_leaf());
        assert!(!Pte::empty().is_table());
    }
}
