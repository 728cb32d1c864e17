//! Constants of the virtual memory core

/// Width of the in-page offset
pub const PAGE_OFFSET_BITS: usize = 10;
/// Page size in bytes; must equal the swap cluster size
pub const PAGE_SIZE: usize = 1 << PAGE_OFFSET_BITS;
/// Width of a virtual address
pub const VA_BITS: usize = 24;
/// Entries in one process page table, covering the whole virtual space
pub const PMT_ENTRIES: usize = 1 << (VA_BITS - PAGE_OFFSET_BITS);
/// Pages occupied by one page-table slot in the PMT region
pub const PMT_SLOT_PAGES: usize = (PMT_ENTRIES * core::mem::size_of::<u64>() - 1) / PAGE_SIZE + 1;
/// Attribute bits at the bottom of a page table entry
pub const PTE_ATTR_BITS: usize = 6;
/// Base of the frame region in the simulated physical address space.
/// Frame numbers start well above zero, so a zero frame field in a page
/// table entry keeps its "not resident" meaning.
pub const FRAME_REGION_BASE: usize = 1 << VA_BITS;
/// Tick length reported by the periodic maintenance job
pub const TICK_LENGTH: u64 = 18000;
