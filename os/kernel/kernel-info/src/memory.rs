//! # Memory Layout

use kernel_memory_addresses::{PhysicalAddress, Size4K, Size4M, VirtualAddress, PageSize};

/// Size of a page and of a physical frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of entries in a page table and in a page directory.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Bytes of virtual memory covered by one directory slot.
pub const DIRECTORY_SPAN: u32 = Size4M::SIZE;

/// The directory slot that points back at the directory itself.
pub const RECURSIVE_SLOT: u16 = 1023;

/// Virtual base of the recursive window: page table `i` is visible at
/// `RECURSIVE_TABLES_BASE + i * PAGE_SIZE`.
pub const RECURSIVE_TABLES_BASE: VirtualAddress =
    VirtualAddress::from_indices(RECURSIVE_SLOT, 0);

/// Virtual address at which the active page directory is visible.
pub const RECURSIVE_DIRECTORY_ADDRESS: VirtualAddress =
    VirtualAddress::from_indices(RECURSIVE_SLOT, RECURSIVE_SLOT);

/// First address of kernel space. Directory slots from here on (except the
/// recursive slot) hold page tables shared by every address space.
pub const KERNEL_SPACE_START: VirtualAddress = VirtualAddress::new(0xC000_0000);

/// Physical location of the Boot Info Page.
pub const BOOT_INFO_PAGE: PhysicalAddress = PhysicalAddress::new(0x8000);

/// Where the kernel image is placed in *physical* memory.
pub const PHYS_LOAD: PhysicalAddress = PhysicalAddress::new(0x0010_0000); // 1 MiB

/// Lower bound of "high memory" on x86.
pub const HIGH_MEMORY_START: u64 = 0x0010_0000;

const _: () = {
    assert!(PAGE_SIZE == Size4K::SIZE as usize);
    assert!(ENTRIES_PER_TABLE * 4 == PAGE_SIZE);
    assert!(RECURSIVE_SLOT as usize == ENTRIES_PER_TABLE - 1);
    assert!(RECURSIVE_TABLES_BASE.as_u32() == 0xFFC0_0000);
    assert!(RECURSIVE_DIRECTORY_ADDRESS.as_u32() == 0xFFFF_F000);
    assert!(KERNEL_SPACE_START.is_aligned::<Size4M>());
    assert!(KERNEL_SPACE_START.as_u32() < RECURSIVE_TABLES_BASE.as_u32());
    assert!(BOOT_INFO_PAGE.is_aligned::<Size4K>());
    assert!(BOOT_INFO_PAGE.as_u32() < PHYS_LOAD.as_u32());
};
