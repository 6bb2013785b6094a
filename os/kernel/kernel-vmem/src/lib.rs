//! # Virtual Memory Support
//!
//! IA-32 two-level paging for the kernel: entries, tables, and the
//! [`PageDirectory`] handle that owns one address space.
//!
//! ## What you get
//! - [`PageEntryBits`]: the 32-bit entry layout shared by PDEs and PTEs.
//! - [`PageTable`] / [`DirectoryTable`]: 4 KiB-aligned arrays of 1024 entries.
//! - [`PageDirectory`]: create, replace, remove, translate, clone and destroy
//!   mappings, with page tables allocated on demand.
//! - The [`recursive`] window: every directory maps itself in slot 1023.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## IA-32 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//!  CR3 → PD  →  PT  →  Physical Page
//!         │      └───► PTE  → maps 4 KiB
//!         └──────────► PDE  → PS=1 → maps 4 MiB
//! ```
//!
//! | Level | Table name | Entry name | Description |
//! |:------|:-----------|:-----------|:------------|
//! | 1 | **PD** (Page Directory) | **PDE** | Referenced by CR3. Each entry points to a PT, or maps 4 MiB if `PS=1`. |
//! | 2 | **PT** (Page Table) | **PTE** | Each entry maps a 4 KiB page. |
//!
//! ## Reaching table memory
//!
//! Tables are always accessed through a [`PhysMapper`]. Before paging the
//! kernel runs identity-mapped; afterwards the mapper of the memory manager
//! decides how a physical frame becomes addressable. The recursive window
//! exists for code that only has the active directory at hand.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod format;
pub mod mmu;
mod page_directory;
mod page_entry_bits;
pub mod page_table;
pub mod recursive;

#[cfg(test)]
mod testing;

pub use crate::format::{PageFrame, allocate_and_format, copy_frame, zero_frame};
#[cfg(target_arch = "x86")]
pub use crate::mmu::HardwareMmu;
pub use crate::mmu::{PagingControl, flush_tlb_page};
pub use crate::page_directory::{FIRST_KERNEL_SLOT, PageDirectory};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{DirectoryTable, L2Index, PdEntry, PdEntryKind};
pub use crate::page_table::pt::{L1Index, PageTable, PtEntry};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};

/// Source of physical 4 KiB frames for page tables and cloned pages.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one 4 KiB physical frame.
    fn alloc_4k(&mut self) -> Option<PhysicalFrame>;

    /// Return a frame previously handed out by [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PhysicalFrame);
}

/// Converts physical addresses to *temporarily* usable references in the
/// current virtual address space.
///
/// Typical patterns:
/// - **Before paging**: identity; the physical address is the pointer.
/// - **After paging**: a fixed offset or a window mapped on demand.
pub trait PhysMapper {
    /// Convert a physical address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable for `&mut T` for the whole of `'a`.
    /// - `T` must match the bytes at `pa` and no other live reference may
    ///   alias them mutably.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Errors reported by mapping operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No frame was available for a page table or a copied page.
    #[error("out of physical memory")]
    OutOfMemory,
    /// The page is already mapped; the mapping was left untouched.
    #[error("{va} is already mapped to {existing}")]
    AlreadyMapped {
        va: VirtualAddress,
        existing: PhysicalAddress,
    },
    /// The address lies in the recursive page-table window.
    #[error("{0} lies in the recursive page-table window")]
    ReservedWindow(VirtualAddress),
    /// A 4 MiB mapping covers the address.
    #[error("{0} is covered by a 4 MiB mapping")]
    LargePage(VirtualAddress),
    /// The page table covering the address is aliased from the kernel
    /// directory; only the kernel directory may change it.
    #[error("{0} is mapped by a page table shared with the kernel")]
    SharedTable(VirtualAddress),
}

/// Align `x` down to a multiple of `a`, which must be a power of two.
///
/// ```rust
/// # use kernel_vmem::align_down;
/// assert_eq!(align_down(0x1FFF, 0x1000), 0x1000);
/// assert_eq!(align_down(0x2000, 0x1000), 0x2000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to a multiple of `a`, which must be a power of two.
///
/// Saturates to the last aligned value below `u64::MAX` instead of wrapping.
///
/// ```rust
/// # use kernel_vmem::align_up;
/// assert_eq!(align_up(0x1001, 0x1000), 0x2000);
/// assert_eq!(align_up(0x2000, 0x1000), 0x2000);
/// assert_eq!(align_up(u64::MAX, 0x1000), 0xFFFF_FFFF_FFFF_F000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    x.saturating_add(a - 1) & !(a - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_error_messages() {
        let e = MapError::AlreadyMapped {
            va: VirtualAddress::new(0x0040_0000),
            existing: PhysicalAddress::new(0x5000),
        };
        assert_eq!(e.to_string(), "0x00400000 is already mapped to 0x00005000");
        assert_eq!(
            MapError::ReservedWindow(VirtualAddress::new(0xFFC0_0000)).to_string(),
            "0xFFC00000 lies in the recursive page-table window"
        );
    }
}
