//! Memory management implementation
//!
//! Buddy-allocated physical frames, per-process single-level page tables and
//! segment maps, the PMT slot pool and the clock replacement sweep all live
//! here. The swap directory itself is the `swap-fs` crate.

mod address;
mod frame_allocator;
mod memory_set;
pub mod page_table;
mod phys;
mod pmt_pool;

pub use address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum};
pub use frame_allocator::BuddyAllocator;
pub use memory_set::MemorySet;
pub use page_table::{AccessFlags, PageTableEntry, PteFlags};
pub use phys::PhysMemory;
pub use pmt_pool::PmtMemory;
