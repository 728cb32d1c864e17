use clap::{App, Arg};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::Mutex;
use swap_fs::{ClusterDevice, SwapStore, CLUSTER_SZ};

/// A host file standing in for the swap partition device
struct ClusterFile {
    file: Mutex<File>,
    clusters: usize,
}

impl ClusterFile {
    fn create(path: &str, clusters: usize) -> std::io::Result<Self> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        f.set_len((clusters * CLUSTER_SZ) as u64)?;
        Ok(Self {
            file: Mutex::new(f),
            clusters,
        })
    }
}

impl ClusterDevice for ClusterFile {
    fn read_cluster(&self, cluster_id: usize, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((cluster_id * CLUSTER_SZ) as u64))
            .expect("Error when seeking!");
        assert_eq!(
            file.read(buf).unwrap(),
            CLUSTER_SZ,
            "Not a complete cluster!"
        );
    }

    fn write_cluster(&self, cluster_id: usize, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((cluster_id * CLUSTER_SZ) as u64))
            .expect("Error when seeking!");
        assert_eq!(
            file.write(buf).unwrap(),
            CLUSTER_SZ,
            "Not a complete cluster!"
        );
    }

    fn num_clusters(&self) -> usize {
        self.clusters
    }
}

fn main() {
    let matches = App::new("swap partition packer")
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .help("Path of the swap image file"),
        )
        .arg(
            Arg::with_name("clusters")
                .short("c")
                .long("clusters")
                .takes_value(true)
                .help("Partition size in clusters"),
        )
        .get_matches();
    let image = matches.value_of("image").unwrap_or("swap.img");
    let clusters: usize = matches
        .value_of("clusters")
        .unwrap_or("4096")
        .parse()
        .expect("cluster count must be a number");
    let device = Arc::new(ClusterFile::create(image, clusters).expect("Error when opening the image!"));
    let mut store = SwapStore::format(device);
    println!(
        "formatted {}: {} clusters, free list head {}",
        image,
        clusters,
        store.free_head()
    );
    println!("free list top: {:?}", store.freelist_top(5));
    println!("root directory top: {:?}", store.root_top(5));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn test_store(name: &str, clusters: usize) -> SwapStore {
        let path = std::env::temp_dir().join(format!("swap-fs-test-{}.img", name));
        let device = Arc::new(ClusterFile::create(path.to_str().unwrap(), clusters).unwrap());
        SwapStore::format(device)
    }

    fn free_clusters(store: &mut SwapStore) -> usize {
        let n = store.num_clusters();
        store.freelist_top(n).len()
    }

    #[test]
    fn format_builds_the_freelist() {
        let mut store = test_store("format", 64);
        assert_eq!(store.free_head(), 1);
        assert_eq!(store.freelist_top(5), vec![1, 2, 3, 4, 5]);
        // cluster 0 is the root and never free
        assert_eq!(free_clusters(&mut store), 63);
        assert!(store.root_top(5).is_empty());
    }

    #[test]
    fn pages_round_trip() {
        let mut store = test_store("roundtrip", 64);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut content = vec![0u8; 3 * CLUSTER_SZ];
        rng.fill(&mut content[..]);
        store.write_page(1, 0x1000, 3, &content);
        for page in 0..3 {
            let mut buf = [0u8; CLUSTER_SZ];
            store.read_page(1, 0x1000 + (page * CLUSTER_SZ) as u32, &mut buf);
            assert_eq!(buf[..], content[page * CLUSTER_SZ..(page + 1) * CLUSTER_SZ]);
        }
        // a page never written reads back as zeros
        let mut buf = [0xffu8; CLUSTER_SZ];
        store.read_page(1, 0x8000, &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(store.root_top(5), vec![(1, 1)]);
    }

    #[test]
    fn erased_pages_release_their_cluster_and_stay_erased() {
        let mut store = test_store("erase-page", 64);
        let a = [0xaau8; CLUSTER_SZ];
        let b = [0xbbu8; CLUSTER_SZ];
        store.write_page(7, 0x1000, 1, &a);
        store.write_page(7, 0x1400, 1, &b);
        let before = free_clusters(&mut store);
        store.erase_page(7, 0x1000);
        assert_eq!(free_clusters(&mut store), before + 1);
        // the sibling survives
        let mut buf = [0u8; CLUSTER_SZ];
        store.read_page(7, 0x1400, &mut buf);
        assert_eq!(buf, b);
        // rewriting the erased page takes a fresh cluster, not the tombstone
        let c = [0xccu8; CLUSTER_SZ];
        store.write_page(7, 0x1000, 1, &c);
        assert_eq!(free_clusters(&mut store), before);
        store.read_page(7, 0x1000, &mut buf);
        assert_eq!(buf, c);
        store.read_page(7, 0x1400, &mut buf);
        assert_eq!(buf, b);
    }

    #[test]
    fn erase_process_releases_the_whole_chain() {
        let mut store = test_store("erase-process", 128);
        let baseline = free_clusters(&mut store);
        for page in 0..5u32 {
            store.write_page(1, 0x2000 + page * CLUSTER_SZ as u32, 1, &[1u8; CLUSTER_SZ]);
        }
        for page in 0..3u32 {
            store.write_page(2, 0x2000 + page * CLUSTER_SZ as u32, 1, &[2u8; CLUSTER_SZ]);
        }
        // one process cluster plus one page cluster per page, for each pid
        assert_eq!(free_clusters(&mut store), baseline - 10);
        store.erase_process(1);
        assert_eq!(free_clusters(&mut store), baseline - 4);
        let mut buf = [0u8; CLUSTER_SZ];
        store.read_page(2, 0x2000, &mut buf);
        assert_eq!(buf, [2u8; CLUSTER_SZ]);
        // only the tombstoned entry disappears from the directory listing
        let top = store.root_top(5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, 2);
    }

    #[test]
    fn process_chain_grows_past_one_cluster() {
        let mut store = test_store("chain-growth", 1024);
        for page in 0..200u32 {
            let fill = page as u8;
            store.write_page(3, 0x1000 + page * CLUSTER_SZ as u32, 1, &[fill; CLUSTER_SZ]);
        }
        for page in 0..200u32 {
            let mut buf = [0u8; CLUSTER_SZ];
            store.read_page(3, 0x1000 + page * CLUSTER_SZ as u32, &mut buf);
            assert_eq!(buf, [page as u8; CLUSTER_SZ]);
        }
    }

    #[test]
    fn root_directory_grows_past_one_cluster() {
        let mut store = test_store("root-growth", 1024);
        for pid in 1..=130u32 {
            store.write_page(pid, 0x1000, 1, &[pid as u8; CLUSTER_SZ]);
        }
        assert_eq!(store.root_top(200).len(), 130);
        let mut buf = [0u8; CLUSTER_SZ];
        store.read_page(130, 0x1000, &mut buf);
        assert_eq!(buf, [130u8; CLUSTER_SZ]);
        store.read_page(1, 0x1000, &mut buf);
        assert_eq!(buf, [1u8; CLUSTER_SZ]);
    }

    #[test]
    #[should_panic(expected = "no free clusters remain")]
    fn exhaustion_is_fatal() {
        let mut store = test_store("exhaustion", 8);
        for page in 0..10u32 {
            store.write_page(1, 0x1000 + page * CLUSTER_SZ as u32, 1, &[0u8; CLUSTER_SZ]);
        }
    }
}
