use crate::ClusterNo;

/// Marker for erased directory entries; never reused for lookups
pub const TOMBSTONE: u32 = u32::MAX;

/// Entry of a root cluster, binding a process to its process-cluster chain.
/// `pid == 0` marks the unused tail of the cluster.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RootEntry {
    pub pid: u32,
    pub process_cluster: ClusterNo,
}

/// Entry of a process cluster, binding a page's virtual address to the
/// cluster holding its contents. `address == 0` marks the unused tail.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PageEntry {
    pub address: u32,
    pub page_cluster: ClusterNo,
}

/// Size of one directory entry
pub const ENTRY_SZ: usize = core::mem::size_of::<RootEntry>();

/// Entries per directory cluster. Entry 0 is reserved: its first word is the
/// link to the next cluster of the chain (0 at the end).
pub const CLUSTER_ENTRIES: usize = crate::CLUSTER_SZ / ENTRY_SZ;
