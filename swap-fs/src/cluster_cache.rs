use super::{ClusterDevice, CLUSTER_SZ};
use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

/// Cached cluster inside memory
pub struct ClusterCache {
    /// cached cluster data
    cache: [u8; CLUSTER_SZ],
    /// underlying cluster id
    cluster_id: usize,
    /// underlying cluster device
    device: Arc<dyn ClusterDevice>,
    /// whether the cluster is dirty
    modified: bool,
}

impl ClusterCache {
    /// Load a new ClusterCache from the partition.
    pub fn new(cluster_id: usize, device: Arc<dyn ClusterDevice>) -> Self {
        let mut cache = [0u8; CLUSTER_SZ];
        device.read_cluster(cluster_id, &mut cache);
        Self {
            cache,
            cluster_id,
            device,
            modified: false,
        }
    }
    /// Get the address of an offset inside the cached cluster data
    fn addr_of_offset(&self, offset: usize) -> usize {
        &self.cache[offset] as *const _ as usize
    }

    pub fn get_ref<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= CLUSTER_SZ);
        let addr = self.addr_of_offset(offset);
        unsafe { &*(addr as *const T) }
    }

    pub fn get_mut<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= CLUSTER_SZ);
        self.modified = true;
        let addr = self.addr_of_offset(offset);
        unsafe { &mut *(addr as *mut T) }
    }

    pub fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get_ref(offset))
    }

    pub fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.device.write_cluster(self.cluster_id, &self.cache);
        }
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        self.sync()
    }
}

/// Keep at most 16 clusters resident in memory
const CLUSTER_CACHE_SIZE: usize = 16;

pub struct ClusterCacheManager {
    queue: VecDeque<(usize, Arc<Mutex<ClusterCache>>)>,
}

impl ClusterCacheManager {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn get(
        &mut self,
        cluster_id: usize,
        device: Arc<dyn ClusterDevice>,
    ) -> Arc<Mutex<ClusterCache>> {
        if let Some(pair) = self.queue.iter().find(|pair| pair.0 == cluster_id) {
            Arc::clone(&pair.1)
        } else {
            // substitute
            if self.queue.len() == CLUSTER_CACHE_SIZE {
                // from front to tail
                if let Some((idx, _)) = self
                    .queue
                    .iter()
                    .enumerate()
                    .find(|(_, pair)| Arc::strong_count(&pair.1) == 1)
                {
                    self.queue.drain(idx..=idx);
                } else {
                    panic!("Run out of ClusterCache!");
                }
            }
            // load cluster into mem and push back
            let cluster_cache = Arc::new(Mutex::new(ClusterCache::new(
                cluster_id,
                Arc::clone(&device),
            )));
            self.queue.push_back((cluster_id, Arc::clone(&cluster_cache)));
            cluster_cache
        }
    }

    /// Write every dirty cached cluster back to the device
    pub fn sync_all(&self) {
        for (_, cache) in self.queue.iter() {
            cache.lock().sync();
        }
    }
}
