//! # Recursive Page-Table Window
//!
//! Slot [`RECURSIVE_SLOT`] of every directory points at the directory's own
//! frame. Walking through that slot makes the CPU treat the directory as a
//! page table, so once a directory is active:
//!
//! ```text
//! 0xFFC0_0000 + i * 4096          page table i
//! 0xFFC0_0000 + (va >> 12) * 4    the PTE that maps va
//! 0xFFFF_F000                     the directory itself
//! 0xFFFF_F000 + i * 4             directory slot i
//! ```
//!
//! Every address in the window is reserved; it can never be mapped
//! explicitly.
//!
//! ### Example
//! ```rust
//! # use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::recursive;
//!
//! let va = VirtualAddress::new(0xC000_5000);
//! assert_eq!(recursive::table_address(0x300).as_u32(), 0xFFF0_0000);
//! assert_eq!(recursive::entry_address(va).as_u32(), 0xFFF0_0014);
//! assert_eq!(recursive::directory_entry_address(0x300).as_u32(), 0xFFFF_FC00);
//! assert!(recursive::is_in_window(recursive::RECURSIVE_DIRECTORY_ADDRESS));
//! ```

use crate::page_table::pd::PdEntry;
use crate::PageEntryBits;
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};

pub use kernel_info::memory::{RECURSIVE_DIRECTORY_ADDRESS, RECURSIVE_SLOT, RECURSIVE_TABLES_BASE};

/// Virtual address at which page table `directory_index` is visible.
#[inline]
#[must_use]
pub const fn table_address(directory_index: u16) -> VirtualAddress {
    VirtualAddress::from_indices(RECURSIVE_SLOT, directory_index)
}

/// Virtual address of the page-table entry that maps `va`.
#[inline]
#[must_use]
pub const fn entry_address(va: VirtualAddress) -> VirtualAddress {
    VirtualAddress::new(RECURSIVE_TABLES_BASE.as_u32() + (va.as_u32() >> 12) * 4)
}

/// Virtual address of directory slot `directory_index`.
#[inline]
#[must_use]
pub const fn directory_entry_address(directory_index: u16) -> VirtualAddress {
    VirtualAddress::new(RECURSIVE_DIRECTORY_ADDRESS.as_u32() + directory_index as u32 * 4)
}

/// Whether `va` lies in the recursive window.
#[inline]
#[must_use]
pub const fn is_in_window(va: VirtualAddress) -> bool {
    va.directory_index() == RECURSIVE_SLOT
}

/// The value of the recursive slot of the directory stored in `directory`.
#[inline]
#[must_use]
pub const fn self_entry(directory: PhysicalFrame) -> PdEntry {
    PdEntry::make_next(directory, PageEntryBits::new_kernel_rw())
}
