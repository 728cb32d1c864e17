use crate::cluster_cache::{ClusterCache, ClusterCacheManager};
use crate::layout::{PageEntry, RootEntry, CLUSTER_ENTRIES, ENTRY_SZ, TOMBSTONE};
use crate::{ClusterDevice, ClusterNo, CLUSTER_SZ};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

type ClusterData = [u8; CLUSTER_SZ];

/// Where a process sits in the root directory
struct ProcessSlot {
    root_cluster: ClusterNo,
    root_entry: usize,
    process_cluster: ClusterNo,
}

/// Where a page sits in its process-cluster chain
struct PageSlot {
    process_cluster: ClusterNo,
    process_entry: usize,
    page_cluster: ClusterNo,
}

/// The swap partition: a three-tier cluster directory plus a free-cluster
/// list, everything reached through the cluster cache.
pub struct SwapStore {
    device: Arc<dyn ClusterDevice>,
    cache: ClusterCacheManager,
    /// head of the free-cluster list, 0 when exhausted
    free_head: ClusterNo,
    num_clusters: usize,
}

impl SwapStore {
    /// Format `device` and open the store on it: cluster 0 becomes the first
    /// root cluster and clusters `1..n` are chained into the free list.
    pub fn format(device: Arc<dyn ClusterDevice>) -> Self {
        let num_clusters = device.num_clusters();
        assert!(
            num_clusters >= 2,
            "partition of {} clusters cannot hold a directory",
            num_clusters
        );
        let mut store = Self {
            device,
            cache: ClusterCacheManager::new(),
            free_head: 1,
            num_clusters,
        };
        store.zero_cluster(0);
        for c in 1..num_clusters as ClusterNo {
            let next = (c + 1) % num_clusters as ClusterNo;
            store.zero_cluster(c);
            store
                .cluster(c)
                .lock()
                .modify(0, |link: &mut ClusterNo| *link = next);
        }
        store.sync_all();
        store
    }

    fn cluster(&mut self, c: ClusterNo) -> Arc<Mutex<ClusterCache>> {
        self.cache.get(c as usize, Arc::clone(&self.device))
    }

    fn zero_cluster(&mut self, c: ClusterNo) {
        self.cluster(c).lock().modify(0, |data: &mut ClusterData| {
            data.iter_mut().for_each(|b| *b = 0)
        });
    }

    /// Pop the head of the free-cluster list. Contents are whatever the
    /// cluster last held.
    fn alloc_cluster(&mut self) -> ClusterNo {
        if self.free_head == 0 {
            panic!("free cluster list points to cluster zero, no free clusters remain");
        }
        let head = self.free_head;
        self.free_head = self.cluster(head).lock().read(0, |link: &ClusterNo| *link);
        head
    }

    /// Push `c` back onto the free-cluster list.
    fn release_cluster(&mut self, c: ClusterNo) {
        let old_head = self.free_head;
        self.cluster(c)
            .lock()
            .modify(0, |link: &mut ClusterNo| *link = old_head);
        self.free_head = c;
    }

    /// Walk the root chain for `pid`. A pid seen for the first time gets a
    /// fresh zeroed process cluster attached at the tail; if every root
    /// cluster is full, a new root cluster is chained first.
    fn resolve_process(&mut self, pid: u32) -> ProcessSlot {
        let mut root: ClusterNo = 0;
        loop {
            for idx in 1..CLUSTER_ENTRIES {
                let entry = self
                    .cluster(root)
                    .lock()
                    .read(idx * ENTRY_SZ, |e: &RootEntry| *e);
                if entry.pid == pid {
                    return ProcessSlot {
                        root_cluster: root,
                        root_entry: idx,
                        process_cluster: entry.process_cluster,
                    };
                }
                if entry.pid == 0 {
                    // reached the tail without a match
                    let pc = self.alloc_cluster();
                    self.zero_cluster(pc);
                    self.cluster(root)
                        .lock()
                        .modify(idx * ENTRY_SZ, |e: &mut RootEntry| {
                            e.pid = pid;
                            e.process_cluster = pc;
                        });
                    return ProcessSlot {
                        root_cluster: root,
                        root_entry: idx,
                        process_cluster: pc,
                    };
                }
            }
            let next = self.cluster(root).lock().read(0, |link: &ClusterNo| *link);
            if next != 0 {
                root = next;
                continue;
            }
            // every root cluster is full, chain a new one
            let new_root = self.alloc_cluster();
            self.cluster(root)
                .lock()
                .modify(0, |link: &mut ClusterNo| *link = new_root);
            self.zero_cluster(new_root);
            let pc = self.alloc_cluster();
            self.zero_cluster(pc);
            self.cluster(new_root)
                .lock()
                .modify(ENTRY_SZ, |e: &mut RootEntry| {
                    e.pid = pid;
                    e.process_cluster = pc;
                });
            return ProcessSlot {
                root_cluster: new_root,
                root_entry: 1,
                process_cluster: pc,
            };
        }
    }

    /// Walk a process-cluster chain for `address`, attaching a fresh zeroed
    /// page cluster at the tail when the page has none yet. Tombstoned
    /// entries never match and are never reused.
    fn resolve_page(&mut self, process_cluster: ClusterNo, address: u32) -> PageSlot {
        let mut pc = process_cluster;
        loop {
            for idx in 1..CLUSTER_ENTRIES {
                let entry = self
                    .cluster(pc)
                    .lock()
                    .read(idx * ENTRY_SZ, |e: &PageEntry| *e);
                if entry.address == address {
                    return PageSlot {
                        process_cluster: pc,
                        process_entry: idx,
                        page_cluster: entry.page_cluster,
                    };
                }
                if entry.address == 0 {
                    let page = self.alloc_cluster();
                    self.zero_cluster(page);
                    self.cluster(pc)
                        .lock()
                        .modify(idx * ENTRY_SZ, |e: &mut PageEntry| {
                            e.address = address;
                            e.page_cluster = page;
                        });
                    return PageSlot {
                        process_cluster: pc,
                        process_entry: idx,
                        page_cluster: page,
                    };
                }
            }
            let next = self.cluster(pc).lock().read(0, |link: &ClusterNo| *link);
            if next != 0 {
                pc = next;
                continue;
            }
            let new_pc = self.alloc_cluster();
            self.cluster(pc)
                .lock()
                .modify(0, |link: &mut ClusterNo| *link = new_pc);
            self.zero_cluster(new_pc);
            let page = self.alloc_cluster();
            self.zero_cluster(page);
            self.cluster(new_pc)
                .lock()
                .modify(ENTRY_SZ, |e: &mut PageEntry| {
                    e.address = address;
                    e.page_cluster = page;
                });
            return PageSlot {
                process_cluster: new_pc,
                process_entry: 1,
                page_cluster: page,
            };
        }
    }

    /// Write `pages` consecutive pages of `content` for `pid` starting at
    /// the page-aligned virtual address `va_start`.
    pub fn write_page(&mut self, pid: u32, va_start: u32, pages: usize, content: &[u8]) {
        assert_eq!(content.len(), pages * CLUSTER_SZ);
        let slot = self.resolve_process(pid);
        for page in 0..pages {
            let va = va_start + (page * CLUSTER_SZ) as u32;
            let page_slot = self.resolve_page(slot.process_cluster, va);
            let src = &content[page * CLUSTER_SZ..(page + 1) * CLUSTER_SZ];
            self.cluster(page_slot.page_cluster)
                .lock()
                .modify(0, |data: &mut ClusterData| data.copy_from_slice(src));
        }
    }

    /// Read the page of `pid` at `va` into `dest`. A page never written
    /// before reads back as zeros.
    pub fn read_page(&mut self, pid: u32, va: u32, dest: &mut [u8]) {
        assert_eq!(dest.len(), CLUSTER_SZ);
        let slot = self.resolve_process(pid);
        let page_slot = self.resolve_page(slot.process_cluster, va);
        self.cluster(page_slot.page_cluster)
            .lock()
            .read(0, |data: &ClusterData| dest.copy_from_slice(data));
    }

    /// Release the page cluster of (`pid`, `va`) and tombstone its entry.
    pub fn erase_page(&mut self, pid: u32, va: u32) {
        let slot = self.resolve_process(pid);
        let page_slot = self.resolve_page(slot.process_cluster, va);
        self.release_cluster(page_slot.page_cluster);
        self.cluster(page_slot.process_cluster).lock().modify(
            page_slot.process_entry * ENTRY_SZ,
            |e: &mut PageEntry| e.address = TOMBSTONE,
        );
    }

    /// Release every cluster reachable from `pid`'s root entry, then
    /// tombstone the entry itself.
    pub fn erase_process(&mut self, pid: u32) {
        let slot = self.resolve_process(pid);
        let mut pc = slot.process_cluster;
        while pc != 0 {
            for idx in 1..CLUSTER_ENTRIES {
                let entry = self
                    .cluster(pc)
                    .lock()
                    .read(idx * ENTRY_SZ, |e: &PageEntry| *e);
                if entry.address == 0 {
                    break;
                }
                if entry.address == TOMBSTONE {
                    continue;
                }
                self.release_cluster(entry.page_cluster);
            }
            let next = self.cluster(pc).lock().read(0, |link: &ClusterNo| *link);
            self.release_cluster(pc);
            pc = next;
        }
        self.cluster(slot.root_cluster).lock().modify(
            slot.root_entry * ENTRY_SZ,
            |e: &mut RootEntry| e.pid = TOMBSTONE,
        );
    }

    /// Flush the cluster cache to the device.
    pub fn sync_all(&mut self) {
        self.cache.sync_all();
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    pub fn free_head(&self) -> ClusterNo {
        self.free_head
    }

    /// First clusters of the free list, at most `n` of them.
    pub fn freelist_top(&mut self, n: usize) -> Vec<ClusterNo> {
        let mut top = Vec::new();
        let mut current = self.free_head;
        while current != 0 && top.len() < n {
            top.push(current);
            current = self
                .cluster(current)
                .lock()
                .read(0, |link: &ClusterNo| *link);
        }
        top
    }

    /// Live `(pid, process_cluster)` pairs at the front of the root
    /// directory, at most `n` of them.
    pub fn root_top(&mut self, n: usize) -> Vec<(u32, ClusterNo)> {
        let mut top = Vec::new();
        let mut root: ClusterNo = 0;
        loop {
            for idx in 1..CLUSTER_ENTRIES {
                if top.len() == n {
                    return top;
                }
                let entry = self
                    .cluster(root)
                    .lock()
                    .read(idx * ENTRY_SZ, |e: &RootEntry| *e);
                if entry.pid == 0 {
                    return top;
                }
                if entry.pid != TOMBSTONE {
                    top.push((entry.pid, entry.process_cluster));
                }
            }
            root = self.cluster(root).lock().read(0, |link: &ClusterNo| *link);
            if root == 0 {
                return top;
            }
        }
    }
}
