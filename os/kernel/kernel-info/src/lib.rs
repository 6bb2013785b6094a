//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants and the loader-to-kernel hand-off structures of the
//! IA-32 kernel. Everything that the loader stage and the paging layer must
//! agree on lives here, so both sides compile against one definition.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! * **Paging geometry**: page size, entries per table, 4 MiB directory span
//! * **Recursive window**: the directory slot that maps the directory itself
//!   and the virtual addresses this makes every page table visible at
//! * **Kernel space**: the shared upper quarter of every address space
//!
//! ### Memory Map ([`memory_map`])
//! * **Region types**: multiboot numbering plus the kernel's own tags
//! * **Wire entries**: the packed 24-byte multiboot entry
//!
//! ### Boot Info Page ([`boot_info`])
//! * **One page**: header, memory map, optional trailing back-pointer
//! * **Append-only**: writes that would overflow the page are rejected
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │                                 │
//!             │          User Space             │
//!             │                                 │
//! KERNEL_SPACE├─────────────────────────────────┤ 0xC000_0000
//!   _START    │    Kernel Text, Data, Heap      │
//!             │   (tables shared by all tasks)  │
//! RECURSIVE_  ├─────────────────────────────────┤ 0xFFC0_0000
//!   TABLES_   │   Recursive page-table window   │
//!   BASE      │ (directory at 0xFFFF_F000)      │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//! BOOT_INFO_  │  Boot Info Page at 0x8000       │
//!   PAGE      │                                 │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             ├─────────────────────────────────┤
//!             │    Available RAM                │
//!             │  (Managed by allocator)         │
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::boot_info::BootInfoPage;
//! use kernel_info::memory::BOOT_INFO_PAGE;
//! use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
//!
//! let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
//! page.append_region(MemoryRegion::new(0x10_0000, 0x40_0000, MemoryRegionType::Free))
//!     .unwrap();
//!
//! assert_eq!(page.size(), 16 + 24);
//! assert_eq!(page.find_usable_physical_memory_top(), 0x50_0000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot_info;
pub mod memory;
pub mod memory_map;
