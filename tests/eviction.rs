mod common;

use common::MemDisk;
use std::sync::Arc;
use vmem::{AccessFlags, Status, System, PAGE_SIZE, PMT_SLOT_PAGES};

fn system(frame_pages: usize, pmt_slots: usize, clusters: usize) -> System {
    common::init_logger();
    System::new(
        frame_pages,
        pmt_slots * PMT_SLOT_PAGES,
        Arc::new(MemDisk::new(clusters)),
    )
}

#[test]
fn dirty_pages_are_written_back_and_reload() {
    let sys = system(8, 2, 256);
    let p1 = sys.create_process();
    assert_eq!(
        p1.create_segment(0x1000, 2, AccessFlags::READ_WRITE),
        Status::Ok
    );
    assert_eq!(sys.access(p1.pid(), 0x1000, AccessFlags::READ), Status::PageFault);
    assert_eq!(p1.page_fault(0x1000), Status::Ok);
    assert_eq!(sys.access(p1.pid(), 0x1000, AccessFlags::WRITE), Status::Ok);
    let payload = [0x5au8; PAGE_SIZE];
    let pa = p1.physical_address(0x1000).unwrap();
    sys.write_physical(pa, &payload);

    // a second process big enough to tip the fairness ratio against p1
    let p2 = sys.create_process();
    assert_eq!(
        p2.create_segment(0x4000, 14, AccessFlags::READ_WRITE),
        Status::Ok
    );
    for page in 0..8 {
        assert_eq!(p2.page_fault(0x4000 + page * PAGE_SIZE), Status::Ok);
    }

    // p1's only resident page was the victim, written back to swap
    assert_eq!(sys.access(p1.pid(), 0x1000, AccessFlags::READ), Status::PageFault);
    assert_eq!(p1.page_fault(0x1000), Status::Ok);
    assert_eq!(sys.access(p1.pid(), 0x1000, AccessFlags::READ), Status::Ok);
    let pa = p1.physical_address(0x1000).unwrap();
    let mut buf = [0u8; PAGE_SIZE];
    sys.read_physical(pa, &mut buf);
    assert_eq!(buf, payload);
}

#[test]
fn eviction_prefers_the_overweight_process() {
    let sys = system(8, 2, 256);
    let p1 = sys.create_process();
    assert_eq!(
        p1.create_segment(0x1000, 2, AccessFlags::READ_WRITE),
        Status::Ok
    );
    assert_eq!(p1.page_fault(0x1000), Status::Ok);

    let p2 = sys.create_process();
    assert_eq!(
        p2.create_segment(0x8000, 8, AccessFlags::READ_WRITE),
        Status::Ok
    );
    for page in 0..8 {
        assert_eq!(p2.page_fault(0x8000 + page * PAGE_SIZE), Status::Ok);
    }

    // p2 held most of physical memory, so it ate its own eviction
    assert_eq!(sys.access(p1.pid(), 0x1000, AccessFlags::READ), Status::Ok);
    assert_eq!(sys.access(p2.pid(), 0x8000, AccessFlags::READ), Status::PageFault);
}

#[test]
fn recently_accessed_pages_get_a_second_chance() {
    let sys = system(4, 1, 256);
    let p = sys.create_process();
    assert_eq!(
        p.create_segment(0x2000, 5, AccessFlags::READ_WRITE),
        Status::Ok
    );
    for page in 0..4 {
        assert_eq!(p.page_fault(0x2000 + page * PAGE_SIZE), Status::Ok);
    }
    // touch every resident page except the first
    for page in 1..4 {
        assert_eq!(
            sys.access(p.pid(), 0x2000 + page * PAGE_SIZE, AccessFlags::READ),
            Status::Ok
        );
    }
    // the fifth page must displace the one cold page
    assert_eq!(p.page_fault(0x2000 + 4 * PAGE_SIZE), Status::Ok);
    assert_eq!(sys.access(p.pid(), 0x2000, AccessFlags::READ), Status::PageFault);
    for page in 1..4 {
        assert_eq!(
            sys.access(p.pid(), 0x2000 + page * PAGE_SIZE, AccessFlags::READ),
            Status::Ok
        );
    }
}

#[test]
fn cycling_through_a_small_region_preserves_contents() {
    let sys = system(4, 1, 256);
    let p = sys.create_process();
    assert_eq!(
        p.create_segment(0x2000, 8, AccessFlags::READ_WRITE),
        Status::Ok
    );
    for page in 0..8 {
        let va = 0x2000 + page * PAGE_SIZE;
        if sys.access(p.pid(), va, AccessFlags::WRITE) == Status::PageFault {
            assert_eq!(p.page_fault(va), Status::Ok);
            assert_eq!(sys.access(p.pid(), va, AccessFlags::WRITE), Status::Ok);
        }
        let pa = p.physical_address(va).unwrap();
        sys.write_physical(pa, &[page as u8 + 1; PAGE_SIZE]);
    }
    for page in 0..8 {
        let va = 0x2000 + page * PAGE_SIZE;
        if sys.access(p.pid(), va, AccessFlags::READ) == Status::PageFault {
            assert_eq!(p.page_fault(va), Status::Ok);
            assert_eq!(sys.access(p.pid(), va, AccessFlags::READ), Status::Ok);
        }
        let pa = p.physical_address(va).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        sys.read_physical(pa, &mut buf);
        assert_eq!(buf, [page as u8 + 1; PAGE_SIZE]);
    }
}

#[test]
fn destroyed_processes_return_every_resource() {
    let sys = system(8, 1, 128);
    {
        let p = sys.create_process();
        assert_eq!(
            p.create_segment(0x3000, 4, AccessFlags::READ_WRITE),
            Status::Ok
        );
        assert_eq!(p.page_fault(0x3000), Status::Ok);
        assert_eq!(p.page_fault(0x3400), Status::Ok);
        assert_eq!(sys.free_frames(), 6);
    }
    // the drop gave the frames and the page-table slot back
    assert_eq!(sys.free_frames(), 8);
    let p = sys.create_process();
    assert_eq!(
        p.create_segment(0x3000, 4, AccessFlags::READ_WRITE),
        Status::Ok
    );
    // the recycled page table carries nothing over
    assert_eq!(sys.access(p.pid(), 0x3000, AccessFlags::READ), Status::PageFault);
    assert_eq!(p.page_fault(0x3000), Status::Ok);
    let pa = p.physical_address(0x3000).unwrap();
    let mut buf = [0xffu8; PAGE_SIZE];
    sys.read_physical(pa, &mut buf);
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn eviction_skips_destroyed_pids() {
    let sys = system(4, 3, 256);
    let p1 = sys.create_process();
    assert_eq!(
        p1.create_segment(0x1000, 2, AccessFlags::READ_WRITE),
        Status::Ok
    );
    assert_eq!(p1.page_fault(0x1000), Status::Ok);
    drop(p1);

    // with pid 1 gone, filling memory must evict from the live processes
    let p2 = sys.create_process();
    assert_eq!(
        p2.create_segment(0x2000, 6, AccessFlags::READ_WRITE),
        Status::Ok
    );
    for page in 0..6 {
        assert_eq!(p2.page_fault(0x2000 + page * PAGE_SIZE), Status::Ok);
    }
    assert_eq!(sys.access(p2.pid(), 0x2000 + 5 * PAGE_SIZE, AccessFlags::READ), Status::Ok);
}
