//! # Virtual and Physical Memory Address Types (IA-32)
//!
//! Strongly typed wrappers for raw 32-bit memory addresses and page bases used
//! in paging and frame allocation code.
//!
//! ## Overview
//!
//! The principal types keep virtual and physical values apart at compile time
//! while staying zero-cost wrappers around `u32`:
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Linear (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory or MMIO regions. |
//!
//! ## Page Sizes
//!
//! - [`Size4K`]: 4 KiB pages, mapped through a page table.
//! - [`Size4M`]: 4 MiB pages, mapped directly by a directory entry (PSE).
//!
//! A 4 KiB physical page is a **frame**; [`PhysicalFrame`] names it.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC000_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xC000_1000);
//! assert_eq!(page.join(off), va);
//!
//! let frame = PhysicalFrame::from_addr(PhysicalAddress::new(0x0010_0FFF));
//! assert_eq!(frame.base().as_u32(), 0x0010_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always, clippy::cast_possible_truncation)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::memory_address_offset::MemoryAddressOffset;
pub use crate::memory_page::MemoryPage;
pub use crate::page_size::{PageSize, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

/// A 4 KiB physical frame.
pub type PhysicalFrame = PhysicalPage<Size4K>;

/// Size of a frame in bytes.
pub const FRAME_SIZE: u32 = Size4K::SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = MemoryAddress::new(0x1234_5678);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u32(), 0x1234_5000);
        assert_eq!(o.as_u32(), 0x678);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn split_and_join_4m() {
        let a = MemoryAddress::new(0x1234_5678);
        let (p, o) = a.split::<Size4M>();
        assert_eq!(p.base().as_u32(), 0x1200_0000);
        assert_eq!(o.as_u32(), 0x0034_5678);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn directory_and_table_indices() {
        let va = VirtualAddress::new(0xFFFF_F000);
        assert_eq!(va.directory_index(), 1023);
        assert_eq!(va.table_index(), 1023);

        let va = VirtualAddress::new(0x0040_1000);
        assert_eq!(va.directory_index(), 1);
        assert_eq!(va.table_index(), 1);
        assert_eq!(VirtualAddress::from_indices(1, 1), va);
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x12000);
        assert_eq!(a.align_up::<Size4K>().map(MemoryAddress::as_u32), Some(0x13000));
        assert_eq!(MemoryAddress::new(0x13000).align_up::<Size4K>().map(MemoryAddress::as_u32), Some(0x13000));
        assert_eq!(MemoryAddress::new(0xFFFF_F001).align_up::<Size4K>(), None);
        assert!(!a.is_aligned::<Size4K>());
    }

    #[test]
    fn frames_and_numbers() {
        let frame = PhysicalFrame::from_number(0x400);
        assert_eq!(frame.base(), PhysicalAddress::new(0x0040_0000));
        assert_eq!(frame.number(), 0x400);
        assert_eq!(PhysicalAddress::new(0x0040_0123).frame_number(), 0x400);
        assert_eq!(PhysicalFrame::from_number(0xF_FFFF).next(), None);
    }

    #[test]
    fn narrowing_from_firmware_values() {
        assert_eq!(
            PhysicalAddress::from_u64(0xFFFF_F000),
            Some(PhysicalAddress::new(0xFFFF_F000))
        );
        assert_eq!(PhysicalAddress::from_u64(0x1_0000_0000), None);
    }

    #[test]
    fn virtual_page_requires_alignment() {
        assert!(VirtualPage::<Size4K>::try_from(VirtualAddress::new(0x1000)).is_ok());
        assert!(VirtualPage::<Size4K>::try_from(VirtualAddress::new(0x1001)).is_err());
    }
}
