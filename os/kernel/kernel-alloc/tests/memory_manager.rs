mod common;

use common::{MIB, SimRam};
use kernel_alloc::{FrameAllocError, FrameAllocator, MemoryManager, StackFrameAllocator};
use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::{MapError, PageDirectory, PageEntryBits};
use std::collections::HashSet;

const KERNEL_HEAP: u32 = 0xC000_0000;

/// 1536 free frames between 1 MiB and 7 MiB, one of them taken by the directory.
fn manager(ram: &SimRam) -> MemoryManager<'_, SimRam> {
    let mut frames: StackFrameAllocator<'_, SimRam> = StackFrameAllocator::new(ram);
    frames.init([MemoryRegion::new(MIB, 6 * MIB, MemoryRegionType::Free)]);
    let directory = PageDirectory::new(ram, &mut frames).unwrap();
    MemoryManager::new(directory, frames)
}

fn page(index: u32) -> VirtualAddress {
    VirtualAddress::new(KERNEL_HEAP + index * 4096)
}

#[test]
fn concurrent_mapped_allocations_are_distinct() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    let free = mm.stats().free;

    let frames: Vec<_> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4u32)
            .map(|t| {
                let mm = &mm;
                s.spawn(move || {
                    (0..64)
                        .map(|i| {
                            let va = page(t * 64 + i);
                            let frame = mm
                                .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
                                .unwrap();
                            (va, frame)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let distinct: HashSet<_> = frames.iter().map(|&(_, frame)| frame).collect();
    assert_eq!(distinct.len(), 256);
    for (va, frame) in frames {
        assert_eq!(mm.translate(va), Some(frame.base()));
    }

    // 256 data frames and one page table for slot 768.
    assert_eq!(mm.stats().free, free - 257);
}

#[test]
fn free_frame_mapped_unmaps_and_returns_the_frame() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);

    let va = page(3);
    let frame = mm
        .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
        .unwrap();
    let free = mm.stats().free;

    mm.free_frame_mapped(frame, va);
    assert_eq!(mm.translate(va), None);
    assert_eq!(mm.stats().free, free + 1);
}

#[test]
fn failed_mapping_returns_the_frame() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);

    let va = page(0);
    let frame = mm
        .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
        .unwrap();
    let free = mm.stats().free;

    let err = mm
        .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
        .unwrap_err();
    assert_eq!(
        err,
        FrameAllocError::Map(MapError::AlreadyMapped {
            va,
            existing: frame.base()
        })
    );
    assert_eq!(mm.stats().free, free);
}

#[test]
fn plain_frames_round_trip() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    let before = mm.stats();

    let frame = mm.alloc_frame().unwrap();
    assert_eq!(mm.stats().allocated(), before.allocated() + 1);
    assert!(ram.is_zeroed(frame));

    mm.free_frame(frame);
    assert_eq!(mm.stats(), before);
}

#[test]
fn task_spaces_see_later_kernel_mappings() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    mm.preallocate_kernel_tables().unwrap();
    let before = mm.stats();

    let task = mm.create_address_space().unwrap();
    assert_eq!(mm.stats().free, before.free - 1);

    let va = page(42);
    let frame = mm
        .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
        .unwrap();
    assert_eq!(task.translate(va), Some(frame.base()));
    mm.free_frame_mapped(frame, va);

    mm.destroy_address_space(task);
    assert_eq!(mm.stats(), before);
}

#[test]
fn task_spaces_cannot_map_kernel_pages() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    mm.preallocate_kernel_tables().unwrap();

    let mut task = mm.create_address_space().unwrap();
    let va = page(5);
    let before = mm.stats();

    let err = mm.with_kernel(|kernel| {
        kernel
            .frames
            .alloc_frame_mapped(&mut task, va, PageEntryBits::new_user_rw())
            .unwrap_err()
    });
    assert_eq!(err, FrameAllocError::Map(MapError::SharedTable(va)));
    assert_eq!(mm.stats(), before);
    assert_eq!(mm.translate(va), None);
    assert_eq!(task.translate(va), None);

    mm.destroy_address_space(task);
}

#[test]
fn cloned_spaces_copy_user_pages() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    mm.preallocate_kernel_tables().unwrap();

    let mut task = mm.create_address_space().unwrap();
    let va = VirtualAddress::new(0x0804_8000);
    let frame = mm.with_kernel(|kernel| {
        kernel
            .frames
            .alloc_frame_mapped(&mut task, va, PageEntryBits::new_user_rw())
            .unwrap()
    });
    ram.write_u32(frame.base(), 0x1234_5678);
    let before = mm.stats();

    let copy = mm.clone_address_space(&task).unwrap();
    // Directory, one user table, one data frame.
    assert_eq!(mm.stats().free, before.free - 3);

    let copied = copy.translate(va).unwrap();
    assert_ne!(copied, frame.base());
    assert_eq!(ram.read_u32(copied), 0x1234_5678);

    let kernel_va = page(7);
    let kernel_frame = mm
        .alloc_frame_mapped(kernel_va, PageEntryBits::new_kernel_rw())
        .unwrap();
    assert_eq!(copy.translate(kernel_va), Some(kernel_frame.base()));
    assert_eq!(task.translate(kernel_va), Some(kernel_frame.base()));
}

#[test]
fn destroying_a_clone_returns_its_pages() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);
    mm.preallocate_kernel_tables().unwrap();

    let mut task = mm.create_address_space().unwrap();
    mm.with_kernel(|kernel| {
        for i in 0..4u32 {
            let va = VirtualAddress::new(0x0804_8000 + i * 4096);
            kernel
                .frames
                .alloc_frame_mapped(&mut task, va, PageEntryBits::new_user_rw())
                .unwrap();
        }
    });
    let before = mm.stats();

    for _ in 0..3 {
        let copy = mm.clone_address_space(&task).unwrap();
        assert_eq!(mm.stats().free, before.free - 6);
        mm.destroy_address_space_with_pages(copy);
        assert_eq!(mm.stats(), before);
    }
    assert!(task.mapping_exists(VirtualAddress::new(0x0804_B000)));
}

#[test]
fn kernel_directory_maps_itself() {
    let ram = SimRam::with_bytes(8 * MIB);
    let mm = manager(&ram);

    let root = mm.with_kernel(|kernel| kernel.directory.physical_address());
    assert_eq!(mm.translate(VirtualAddress::new(0xFFFF_F000)), Some(root));
    assert_eq!(
        mm.translate(VirtualAddress::new(0xFFFF_FFFC)),
        Some(root + 0xFFC)
    );
    assert_eq!(
        PhysicalAddress::new(ram.read_u32(root + 0xFFC) & !0xFFF),
        root
    );
}
