use std::sync::Mutex;
use vmem::{ClusterDevice, CLUSTER_SZ};

/// In-memory cluster device standing in for the block driver.
pub struct MemDisk {
    clusters: Mutex<Vec<[u8; CLUSTER_SZ]>>,
}

impl MemDisk {
    pub fn new(clusters: usize) -> Self {
        MemDisk {
            clusters: Mutex::new(vec![[0u8; CLUSTER_SZ]; clusters]),
        }
    }
}

impl ClusterDevice for MemDisk {
    fn read_cluster(&self, cluster_id: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.clusters.lock().unwrap()[cluster_id]);
    }

    fn write_cluster(&self, cluster_id: usize, buf: &[u8]) {
        self.clusters.lock().unwrap()[cluster_id].copy_from_slice(buf);
    }

    fn num_clusters(&self) -> usize {
        self.clusters.lock().unwrap().len()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
