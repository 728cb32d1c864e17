//! Implementation of [`System`] and the kernel behind it.

use crate::config::{FRAME_REGION_BASE, PAGE_SIZE, TICK_LENGTH, VA_BITS};
use crate::mm::{
    AccessFlags, BuddyAllocator, MemorySet, PhysAddr, PhysMemory, PmtMemory, PteFlags, VirtAddr,
};
use crate::process::Process;
use crate::Status;
use log::{debug, info, trace};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use swap_fs::{ClusterDevice, SwapStore, CLUSTER_SZ};

/// Process identifier, assigned from 1 up
pub type Pid = u32;
/// Tick length unit of the periodic job
pub type Time = u64;

/// Everything behind the global lock: the frame region and its buddy
/// allocator, the PMT region and slot pool, the swap store and the process
/// registry.
pub(crate) struct Kernel {
    phys: PhysMemory,
    pmt: PmtMemory,
    buddy: BuddyAllocator,
    swap: SwapStore,
    processes: BTreeMap<Pid, MemorySet>,
    next_pid: Pid,
    /// inter-process hand of the eviction policy
    process_clock_hand: Pid,
}

/// The virtual memory manager: private paged address spaces for any number
/// of processes over a shared frame pool, backed by a swap partition.
///
/// Every public entry point takes the one kernel lock, so operations
/// serialize in the order their critical sections begin.
pub struct System {
    kernel: Arc<Mutex<Kernel>>,
}

impl System {
    /// Build a manager over `frame_pages` pages of process memory and
    /// `pmt_pages` pages of page-table space, formatting a fresh swap
    /// partition on `device`.
    pub fn new(frame_pages: usize, pmt_pages: usize, device: Arc<dyn ClusterDevice>) -> Self {
        assert_eq!(
            PAGE_SIZE, CLUSTER_SZ,
            "cannot start: page size {} differs from cluster size {}",
            PAGE_SIZE, CLUSTER_SZ
        );
        let phys = PhysMemory::new(frame_pages);
        let buddy = BuddyAllocator::new(phys.base(), frame_pages);
        let pmt = PmtMemory::new(pmt_pages);
        let swap = SwapStore::format(device);
        info!(
            "frame region: {} pages at {:#x}, pmt pool: {} slots, swap: {} clusters",
            frame_pages,
            FRAME_REGION_BASE,
            pmt.free_slots(),
            swap.num_clusters()
        );
        System {
            kernel: Arc::new(Mutex::new(Kernel {
                phys,
                pmt,
                buddy,
                swap,
                processes: BTreeMap::new(),
                next_pid: 1,
                process_clock_hand: 1,
            })),
        }
    }

    /// Create a process with an empty address space. The returned handle
    /// owns the process; dropping it tears the process down.
    pub fn create_process(&self) -> Process {
        let pid = self.kernel.lock().unwrap().create_process();
        Process::new(pid, Arc::clone(&self.kernel))
    }

    /// The hardware access check, the hot path of the manager.
    pub fn access(&self, pid: Pid, va: usize, ty: AccessFlags) -> Status {
        self.kernel.lock().unwrap().access(pid, VirtAddr(va), ty)
    }

    /// Periodic maintenance: precoalesce the buddy system and flush the
    /// cluster cache, then report the tick length.
    pub fn periodic_job(&self) -> Time {
        let mut kernel = self.kernel.lock().unwrap();
        kernel.buddy.defragment();
        kernel.swap.sync_all();
        TICK_LENGTH
    }

    /// Load from simulated RAM at a translated physical address.
    pub fn read_physical(&self, pa: usize, buf: &mut [u8]) {
        self.kernel.lock().unwrap().phys.read(PhysAddr(pa), buf);
    }

    /// Store to simulated RAM at a translated physical address. The dirty
    /// bit is not touched here; that is the job of the access check.
    pub fn write_physical(&self, pa: usize, data: &[u8]) {
        self.kernel.lock().unwrap().phys.write(PhysAddr(pa), data);
    }

    /// Pages currently free in the buddy system
    pub fn free_frames(&self) -> usize {
        self.kernel.lock().unwrap().buddy.free_pages()
    }
}

impl Kernel {
    pub(crate) fn create_process(&mut self) -> Pid {
        let pid = self.next_pid;
        let slot = match self.pmt.take_slot() {
            Some(slot) => slot,
            None => panic!("cannot create process {}: no space left in PMT pool", pid),
        };
        self.next_pid += 1;
        self.processes.insert(pid, MemorySet::new(slot));
        debug!("created process {}", pid);
        pid
    }

    /// Tear a process down: its segments, its swap chains, its PMT slot.
    pub(crate) fn destroy_process(&mut self, pid: Pid) {
        if !self.processes.contains_key(&pid) {
            return;
        }
        while let Some(start) = self.processes.get(&pid).and_then(|p| p.first_segment()) {
            let Kernel {
                processes,
                pmt,
                buddy,
                swap,
                ..
            } = self;
            processes
                .get_mut(&pid)
                .unwrap()
                .delete_segment(pmt, buddy, swap, pid, start);
        }
        self.swap.erase_process(pid);
        let set = self.processes.remove(&pid).unwrap();
        self.pmt.give_slot(set.slot());
        debug!("destroyed process {}", pid);
    }

    pub(crate) fn access(&mut self, pid: Pid, va: VirtAddr, ty: AccessFlags) -> Status {
        if va.0 == 0 || va.0 >= 1 << VA_BITS {
            return Status::Trap;
        }
        let Kernel { processes, pmt, .. } = self;
        let process = match processes.get_mut(&pid) {
            Some(process) => process,
            None => return Status::Trap,
        };
        let vpn = va.floor();
        let mut pte = process.pte(pmt, vpn);
        if !pte.is_mapped() || !pte.permits(ty) {
            return Status::Trap;
        }
        if !pte.is_resident() {
            return Status::PageFault;
        }
        pte.set_flag(PteFlags::A);
        if ty.contains(AccessFlags::WRITE) {
            pte.set_flag(PteFlags::D);
        }
        process.set_pte(pmt, vpn, pte);
        Status::Ok
    }

    /// Bring a faulting page in from swap: take a frame from the buddy
    /// system, or evict one when none is free, then read the page contents
    /// into it.
    pub(crate) fn page_fault(&mut self, pid: Pid, va: VirtAddr) -> Status {
        if va.0 == 0 || va.0 >= 1 << VA_BITS {
            return Status::Trap;
        }
        let vpn = va.floor();
        let pte = match self.processes.get(&pid) {
            Some(process) => process.pte(&self.pmt, vpn),
            None => return Status::Trap,
        };
        if !pte.is_mapped() {
            return Status::Trap;
        }
        if pte.is_resident() {
            // already brought in, nothing to resolve
            return Status::Ok;
        }
        let frame = match self.buddy.take(1) {
            Some(frame) => frame,
            None => self.eject_frame(),
        };
        let page_va = VirtAddr::from(vpn);
        trace!("pid {} page in {:?} -> {:?}", pid, page_va, frame);
        self.swap
            .read_page(pid, page_va.0 as u32, self.phys.page_mut(frame));
        let Kernel { processes, pmt, .. } = self;
        let process = processes.get_mut(&pid).unwrap();
        let mut pte = pte;
        pte.set_ppn(frame.into());
        pte.clear_flag(PteFlags::A);
        pte.clear_flag(PteFlags::D);
        process.set_pte(pmt, vpn, pte);
        process.fault_in(page_va);
        Status::Ok
    }

    /// Pick a victim process and have it evict one frame. A process is a
    /// candidate when its share of physical memory is at least its share of
    /// the total virtual footprint; the hand cycles over live pids only.
    fn eject_frame(&mut self) -> PhysAddr {
        let total_physical = self.phys.pages();
        let Kernel {
            processes,
            pmt,
            phys,
            swap,
            process_clock_hand,
            ..
        } = self;
        let total_virtual: usize = processes.values().map(|p| p.virtual_pages()).sum();
        assert!(total_virtual > 0, "eviction requested with no mapped pages");
        let pids: Vec<Pid> = processes.keys().copied().collect();
        let start = pids
            .iter()
            .position(|&pid| pid >= *process_clock_hand)
            .unwrap_or(0);
        for i in 0..pids.len() {
            let pid = pids[(start + i) % pids.len()];
            *process_clock_hand = pid + 1;
            let process = processes.get_mut(&pid).unwrap();
            let physical_ratio = process.resident_pages() as f64 / total_physical as f64;
            let virtual_ratio = process.virtual_pages() as f64 / total_virtual as f64;
            if physical_ratio >= virtual_ratio {
                if let Some(frame) = process.evict_one(pmt, phys, swap, pid) {
                    debug!("pid {} ejected frame {:?}", pid, frame);
                    return frame;
                }
            }
        }
        // the frames are all held by these processes, so one of them must
        // have had an ejectable page
        panic!("all processes checked for victim pages, none can be ejected");
    }

    pub(crate) fn physical_address(&self, pid: Pid, va: VirtAddr) -> Option<usize> {
        if va.0 == 0 || va.0 >= 1 << VA_BITS {
            return None;
        }
        let process = self.processes.get(&pid)?;
        let pte = process.pte(&self.pmt, va.floor());
        if !pte.is_mapped() || !pte.is_resident() {
            return None;
        }
        Some(PhysAddr::from(pte.ppn()).0 + va.page_offset())
    }

    pub(crate) fn create_segment(
        &mut self,
        pid: Pid,
        start: VirtAddr,
        pages: usize,
        flags: AccessFlags,
    ) -> Status {
        let Kernel { processes, pmt, .. } = self;
        match processes.get_mut(&pid) {
            Some(process) => process.create_segment(pmt, start, pages, flags),
            None => Status::Trap,
        }
    }

    /// `create_segment`, then seed the pages' swap clusters from `content`.
    /// The pages stay non-resident until they fault in.
    pub(crate) fn load_segment(
        &mut self,
        pid: Pid,
        start: VirtAddr,
        pages: usize,
        flags: AccessFlags,
        content: &[u8],
    ) -> Status {
        if content.len() != pages * PAGE_SIZE {
            return Status::Trap;
        }
        let status = self.create_segment(pid, start, pages, flags);
        if status == Status::Ok {
            self.swap.write_page(pid, start.0 as u32, pages, content);
        }
        status
    }

    pub(crate) fn delete_segment(&mut self, pid: Pid, start: VirtAddr) -> Status {
        let Kernel {
            processes,
            pmt,
            buddy,
            swap,
            ..
        } = self;
        match processes.get_mut(&pid) {
            Some(process) => process.delete_segment(pmt, buddy, swap, pid, start),
            None => Status::Trap,
        }
    }
}
