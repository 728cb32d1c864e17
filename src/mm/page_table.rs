//! Implementation of [`PageTableEntry`] and [`PageTable`].

use super::address::{PhysPageNum, VirtPageNum};
use super::pmt_pool::PmtMemory;
use crate::config::{PMT_ENTRIES, PTE_ATTR_BITS};
use bitflags::*;

bitflags! {
    /// Access types a segment can grant and an access can request
    pub struct AccessFlags: u64 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const READ_WRITE = Self::READ.bits | Self::WRITE.bits;
    }
}

bitflags! {
    /// page table entry attribute bits
    pub struct PteFlags: u64 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
        const D = 1 << 3;
        const A = 1 << 4;
        const M = 1 << 5;
    }
}

impl From<AccessFlags> for PteFlags {
    fn from(flags: AccessFlags) -> Self {
        PteFlags::from_bits_truncate(flags.bits)
    }
}

/// page table entry structure: `frame << 6 | attribute bits`
#[derive(Copy, Clone, PartialEq)]
pub struct PageTableEntry {
    pub bits: u64,
}

impl PageTableEntry {
    pub fn new(ppn: PhysPageNum, flags: PteFlags) -> Self {
        PageTableEntry {
            bits: (ppn.0 as u64) << PTE_ATTR_BITS | flags.bits,
        }
    }
    pub fn empty() -> Self {
        PageTableEntry { bits: 0 }
    }
    pub fn ppn(&self) -> PhysPageNum {
        PhysPageNum((self.bits >> PTE_ATTR_BITS) as usize)
    }
    pub fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.bits)
    }
    /// the page belongs to a segment
    pub fn is_mapped(&self) -> bool {
        self.flags().contains(PteFlags::M)
    }
    /// the page has a frame behind it
    pub fn is_resident(&self) -> bool {
        self.ppn().0 != 0
    }
    pub fn is_accessed(&self) -> bool {
        self.flags().contains(PteFlags::A)
    }
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(PteFlags::D)
    }
    /// Permission rule: the request and the grant must share a bit
    pub fn permits(&self, ty: AccessFlags) -> bool {
        self.flags().intersects(PteFlags::from(ty))
    }
    pub fn set_ppn(&mut self, ppn: PhysPageNum) {
        self.bits = (self.bits & ((1 << PTE_ATTR_BITS) - 1)) | (ppn.0 as u64) << PTE_ATTR_BITS;
    }
    pub fn set_flag(&mut self, flag: PteFlags) {
        self.bits |= flag.bits;
    }
    pub fn clear_flag(&mut self, flag: PteFlags) {
        self.bits &= !flag.bits;
    }
}

/// Single-level page table of one process, a view over its PMT slot
pub struct PageTable {
    slot: usize,
}

impl PageTable {
    pub fn new(slot: usize) -> Self {
        PageTable { slot }
    }
    pub fn slot(&self) -> usize {
        self.slot
    }
    pub fn get(&self, pmt: &PmtMemory, vpn: VirtPageNum) -> PageTableEntry {
        assert!(vpn.0 < PMT_ENTRIES);
        PageTableEntry {
            bits: pmt.word(self.slot + vpn.0),
        }
    }
    pub fn set(&self, pmt: &mut PmtMemory, vpn: VirtPageNum, pte: PageTableEntry) {
        assert!(vpn.0 < PMT_ENTRIES);
        *pmt.word_mut(self.slot + vpn.0) = pte.bits;
    }
}
