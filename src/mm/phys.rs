//! The simulated RAM backing process frames.

use super::address::PhysAddr;
use crate::config::{FRAME_REGION_BASE, PAGE_SIZE};

/// Frame region of the physical address space, addressed from
/// `FRAME_REGION_BASE` up. Zero-filled at construction.
pub struct PhysMemory {
    bytes: Vec<u8>,
}

impl PhysMemory {
    pub fn new(pages: usize) -> Self {
        Self {
            bytes: vec![0u8; pages * PAGE_SIZE],
        }
    }

    /// Lowest frame address of the region
    pub fn base(&self) -> PhysAddr {
        PhysAddr(FRAME_REGION_BASE)
    }

    /// Size of the region in pages
    pub fn pages(&self) -> usize {
        self.bytes.len() / PAGE_SIZE
    }

    fn range_of(&self, pa: PhysAddr, len: usize) -> core::ops::Range<usize> {
        assert!(
            pa.0 >= FRAME_REGION_BASE && pa.0 + len <= FRAME_REGION_BASE + self.bytes.len(),
            "physical access {:#x}+{} outside the frame region",
            pa.0,
            len
        );
        let start = pa.0 - FRAME_REGION_BASE;
        start..start + len
    }

    /// The whole page starting at the page-aligned address `pa`
    pub fn page(&self, pa: PhysAddr) -> &[u8] {
        let range = self.range_of(pa, PAGE_SIZE);
        &self.bytes[range]
    }

    pub fn page_mut(&mut self, pa: PhysAddr) -> &mut [u8] {
        let range = self.range_of(pa, PAGE_SIZE);
        &mut self.bytes[range]
    }

    /// Byte-granular load, the read side of the memory bus
    pub fn read(&self, pa: PhysAddr, buf: &mut [u8]) {
        let range = self.range_of(pa, buf.len());
        buf.copy_from_slice(&self.bytes[range]);
    }

    /// Byte-granular store, the write side of the memory bus
    pub fn write(&mut self, pa: PhysAddr, data: &[u8]) {
        let range = self.range_of(pa, data.len());
        self.bytes[range].copy_from_slice(data);
    }
}
