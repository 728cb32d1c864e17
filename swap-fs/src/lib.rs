//! A cluster-addressed swap partition format over a raw block device.
//!
//! The partition is a three-tier directory: root clusters map process ids to
//! process-cluster chains, process clusters map page virtual addresses to
//! page clusters, and page clusters hold the page contents themselves. Free
//! clusters form an in-cluster singly linked list.
#![no_std]

extern crate alloc;

mod cluster_cache;
mod cluster_dev;
mod layout;
mod store;

/// Size of one cluster in bytes.
pub const CLUSTER_SZ: usize = 1024;

/// Index of a cluster on the partition.
pub type ClusterNo = u32;

pub use cluster_dev::ClusterDevice;
pub use store::SwapStore;
