//! Implementation of [`Segment`] and [`MemorySet`].

use super::address::{PhysAddr, PhysPageNum, VPNRange, VirtAddr, VirtPageNum};
use super::frame_allocator::BuddyAllocator;
use super::page_table::{AccessFlags, PageTable, PageTableEntry, PteFlags};
use super::phys::PhysMemory;
use super::pmt_pool::PmtMemory;
use crate::config::{PAGE_SIZE, PMT_ENTRIES, VA_BITS};
use crate::Status;
use log::trace;
use std::collections::BTreeMap;
use swap_fs::SwapStore;

/// One contiguous run of mapped virtual pages
pub struct Segment {
    start: VirtAddr,
    /// mapped pages
    pages: usize,
    /// pages currently backed by a frame
    resident: usize,
}

/// Memory state of one process: its page table, its segment map ordered by
/// start address, and the clock hand of the replacement sweep.
pub struct MemorySet {
    table: PageTable,
    segments: BTreeMap<usize, Segment>,
    clock_hand: usize,
}

impl MemorySet {
    pub fn new(slot: usize) -> Self {
        Self {
            table: PageTable::new(slot),
            segments: BTreeMap::new(),
            clock_hand: 0,
        }
    }

    pub fn slot(&self) -> usize {
        self.table.slot()
    }

    /// Mapped pages across all segments
    pub fn virtual_pages(&self) -> usize {
        self.segments.values().map(|s| s.pages).sum()
    }

    /// Resident pages across all segments
    pub fn resident_pages(&self) -> usize {
        self.segments.values().map(|s| s.resident).sum()
    }

    pub fn first_segment(&self) -> Option<VirtAddr> {
        self.segments.keys().next().map(|&start| VirtAddr(start))
    }

    pub fn pte(&self, pmt: &PmtMemory, vpn: VirtPageNum) -> PageTableEntry {
        self.table.get(pmt, vpn)
    }

    pub fn set_pte(&mut self, pmt: &mut PmtMemory, vpn: VirtPageNum, pte: PageTableEntry) {
        self.table.set(pmt, vpn, pte);
    }

    /// Map `pages` pages at `start` with the given access rights. Nothing is
    /// made resident; the pages sit unbacked until they fault in.
    pub fn create_segment(
        &mut self,
        pmt: &mut PmtMemory,
        start: VirtAddr,
        pages: usize,
        flags: AccessFlags,
    ) -> Status {
        // address zero is reserved, and a segment must hold at least a page
        if !start.aligned() || start.0 == 0 || pages == 0 {
            return Status::Trap;
        }
        let end = start.0 + pages * PAGE_SIZE;
        if end > 1 << VA_BITS {
            return Status::Trap;
        }
        // the neighbors in the ordered map decide overlap
        if let Some((_, prev)) = self.segments.range(..=start.0).next_back() {
            if prev.start.0 + prev.pages * PAGE_SIZE > start.0 {
                return Status::Trap;
            }
        }
        if let Some((_, next)) = self.segments.range(start.0..).next() {
            if end > next.start.0 {
                return Status::Trap;
            }
        }
        for vpn in VPNRange::new(start.floor(), VirtAddr(end).floor()) {
            if self.table.get(pmt, vpn).is_mapped() {
                return Status::Trap;
            }
        }
        for vpn in VPNRange::new(start.floor(), VirtAddr(end).floor()) {
            let pte = PageTableEntry::new(PhysPageNum(0), PteFlags::from(flags) | PteFlags::M);
            self.table.set(pmt, vpn, pte);
        }
        self.segments.insert(
            start.0,
            Segment {
                start,
                pages,
                resident: 0,
            },
        );
        Status::Ok
    }

    /// Unmap the segment starting at `start`. Resident frames go back to the
    /// buddy system; swapped-out pages are erased from the partition.
    pub fn delete_segment(
        &mut self,
        pmt: &mut PmtMemory,
        buddy: &mut BuddyAllocator,
        swap: &mut SwapStore,
        pid: u32,
        start: VirtAddr,
    ) -> Status {
        if !start.aligned() {
            return Status::Trap;
        }
        let pages = match self.segments.get(&start.0) {
            Some(segment) => segment.pages,
            None => return Status::Trap,
        };
        let start_vpn = start.floor();
        for vpn in VPNRange::new(start_vpn, VirtPageNum(start_vpn.0 + pages)) {
            let pte = self.table.get(pmt, vpn);
            if pte.is_resident() {
                buddy.give(PhysAddr::from(pte.ppn()), 1);
            } else {
                swap.erase_page(pid, usize::from(VirtAddr::from(vpn)) as u32);
            }
            self.table.set(pmt, vpn, PageTableEntry::empty());
        }
        buddy.defragment();
        self.segments.remove(&start.0);
        Status::Ok
    }

    /// Clock sweep of the second-chance policy: skip non-resident entries,
    /// strip the accessed bit from recently used ones, and take the first
    /// cold page as the victim. A dirty victim is written back before its
    /// frame is handed over.
    pub fn evict_one(
        &mut self,
        pmt: &mut PmtMemory,
        phys: &PhysMemory,
        swap: &mut SwapStore,
        pid: u32,
    ) -> Option<PhysAddr> {
        for _ in 0..2 * PMT_ENTRIES {
            let vpn = VirtPageNum(self.clock_hand);
            self.clock_hand = (self.clock_hand + 1) % PMT_ENTRIES;
            let mut pte = self.table.get(pmt, vpn);
            if !pte.is_resident() {
                continue;
            }
            if pte.is_accessed() {
                // second chance
                pte.clear_flag(PteFlags::A);
                self.table.set(pmt, vpn, pte);
                continue;
            }
            let frame = PhysAddr::from(pte.ppn());
            let va = VirtAddr::from(vpn);
            if pte.is_dirty() {
                swap.write_page(pid, va.0 as u32, 1, phys.page(frame));
                pte.clear_flag(PteFlags::D);
            }
            pte.set_ppn(PhysPageNum(0));
            pte.clear_flag(PteFlags::A);
            self.table.set(pmt, vpn, pte);
            self.segment_of_mut(va)
                .unwrap_or_else(|| panic!("no segment owns virtual address {:#x}", va.0))
                .resident -= 1;
            trace!("pid {} evicted {:?} from {:?}", pid, va, frame);
            return Some(frame);
        }
        None
    }

    /// Account a page brought in by a fault to its owning segment
    pub fn fault_in(&mut self, va: VirtAddr) {
        self.segment_of_mut(va)
            .unwrap_or_else(|| panic!("no segment owns virtual address {:#x}", va.0))
            .resident += 1;
    }

    fn segment_of_mut(&mut self, va: VirtAddr) -> Option<&mut Segment> {
        self.segments
            .values_mut()
            .find(|s| va.0 >= s.start.0 && va.0 < s.start.0 + s.pages * PAGE_SIZE)
    }
}
