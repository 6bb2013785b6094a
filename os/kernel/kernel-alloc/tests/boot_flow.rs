//! The whole hand-over from the loader's memory map to the memory manager.

mod common;

use common::{MIB, RecordingMmu, SimRam};
use kernel_alloc::frame_states::FrameState;
use kernel_alloc::{BootstrapAllocator, FrameAllocator, MemoryManager, StackFrameAllocator};
use kernel_info::boot_info::BootInfoPage;
use kernel_info::memory::{BOOT_INFO_PAGE, KERNEL_SPACE_START, PHYS_LOAD};
use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_vmem::{PageDirectory, PageEntryBits};

fn loader_page() -> BootInfoPage {
    let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
    for region in [
        MemoryRegion::new(0, 0x9_F000, MemoryRegionType::Free),
        MemoryRegion::new(0x9_F000, 0x6_1000, MemoryRegionType::Reserved),
        MemoryRegion::new(MIB, 14 * MIB, MemoryRegionType::Free),
        MemoryRegion::new(15 * MIB, MIB, MemoryRegionType::Reserved),
        MemoryRegion::new(PHYS_LOAD.as_u64(), MIB, MemoryRegionType::NonFree),
        MemoryRegion::new(BOOT_INFO_PAGE.as_u64(), 0x1000, MemoryRegionType::BootInfo),
    ] {
        page.append_region(region).unwrap();
    }
    page
}

#[test]
fn bootstrap_hands_over_to_the_memory_manager() {
    let ram = SimRam::with_bytes(16 * MIB);
    let mut page = loader_page();
    page.log_memory_map();

    let start = page.find_highmem_range_of_at_least(MIB).unwrap();
    assert_eq!(start, 2 * MIB);

    let mut boot =
        BootstrapAllocator::new(&ram, PhysicalAddress::from_u64(start).unwrap()).unwrap();
    boot.init(page.memory_map());
    boot.mapping_enter_range(
        VirtualAddress::new(0x0010_0000),
        PhysicalAddress::new(0x0010_0000),
        0x0030_0000,
        PageEntryBits::new_kernel_rw(),
    )
    .unwrap();
    boot.mapping_enter_range(
        KERNEL_SPACE_START,
        PHYS_LOAD,
        0x0010_0000,
        PageEntryBits::new_kernel_rw(),
    )
    .unwrap();
    boot.start_paging(&mut RecordingMmu::default());

    // Directory and the tables for slots 0 and 768.
    let hand_over = boot.hand_over();
    assert_eq!(
        hand_over.consumed,
        MemoryRegion::new(2 * MIB, 0x3000, MemoryRegionType::NonFree)
    );
    page.append_region(hand_over.consumed).unwrap();
    assert!(page.is_valid());

    let mut frames: StackFrameAllocator<'_, SimRam> = StackFrameAllocator::new(&ram);
    frames.init(page.memory_map());

    let stats = frames.stats();
    assert_eq!(stats.free, 158 + (3584 - 256 - 3));
    assert_eq!(stats.reserved, 97 + 256 + 256 + 3 + 1);
    assert_eq!(frames.state(hand_over.directory), FrameState::Reserved);
    assert_eq!(
        frames.state(PhysicalFrame::from_addr(BOOT_INFO_PAGE)),
        FrameState::Reserved
    );

    let directory = unsafe { PageDirectory::adopt(&ram, hand_over.directory) };
    let mm = MemoryManager::new(directory, frames);

    assert_eq!(
        mm.translate(VirtualAddress::new(0xC000_1234)),
        Some(PhysicalAddress::new(0x0010_1234))
    );

    let va = VirtualAddress::new(0xC040_0000);
    let frame = mm
        .alloc_frame_mapped(va, PageEntryBits::new_kernel_rw())
        .unwrap();
    assert_eq!(mm.translate(va), Some(frame.base()));
    assert!(!hand_over.consumed.contains(frame.base().as_u64()));
    assert!(!(PHYS_LOAD.as_u64()..2 * MIB).contains(&frame.base().as_u64()));
}

#[test]
fn boot_info_page_fills_up() {
    let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
    let region = MemoryRegion::new(MIB, MIB, MemoryRegionType::Free);

    let mut stored = 0;
    while page.append_region(region).is_ok() {
        stored += 1;
    }
    assert_eq!(stored, 170);
    assert_eq!(page.memory_map().count(), 170);
    assert!(page.is_valid());
}
