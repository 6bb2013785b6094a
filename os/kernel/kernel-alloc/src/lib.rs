//! # Kernel Physical Frame Allocation
//!
//! Physical frames for the kernel, from the first instruction of the
//! kickstart stage to the running system.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Memory Manager                      │
//! │    • kernel directory + frame allocator             │
//! │    • one spin lock around both                      │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Stack Frame Allocator                    │
//! │    • LIFO free list inside the free frames          │
//! │    • 2-bit state per frame, O(1) alloc/free         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ replaces
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Bootstrap Allocator                      │
//! │    • bump pointer, never frees                      │
//! │    • builds the first directory, enables paging     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boot flow
//!
//! 1. The loader fills the Boot Info Page with the memory map.
//! 2. [`BootstrapAllocator`] skips reserved memory, builds the initial
//!    directory through the [`IdentityMapper`](phys_mapper::IdentityMapper)
//!    and enables paging.
//! 3. Its [`HandOver`](bootstrap::HandOver) region is appended to the Boot
//!    Info Page as non-free memory.
//! 4. [`StackFrameAllocator`] is initialized from that map and, together
//!    with the adopted directory, becomes the [`MemoryManager`].
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::{FrameAllocator, StackFrameAllocator};
//! use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
//! # use kernel_memory_addresses::PhysicalAddress;
//! # use kernel_vmem::PhysMapper;
//! # #[repr(C, align(4096))]
//! # struct Frame(std::cell::UnsafeCell<[u8; 4096]>);
//! # struct Ram(Vec<Frame>);
//! # impl PhysMapper for Ram {
//! #     unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
//! #         let frame = &self.0[pa.frame_number() as usize];
//! #         unsafe { &mut *frame.0.get().cast::<u8>().add((pa.as_u32() & 0xFFF) as usize).cast::<T>() }
//! #     }
//! # }
//! # let ram = Ram((0..16).map(|_| Frame(std::cell::UnsafeCell::new([0; 4096]))).collect());
//!
//! let mut frames = StackFrameAllocator::<_, 1>::new(&ram);
//! frames.init([MemoryRegion::new(0x1000, 0x4000, MemoryRegionType::Free)]);
//!
//! let frame = frames.alloc_frame().unwrap();
//! assert_eq!(frames.stats().free, 3);
//! frames.free_frame(frame);
//! assert_eq!(frames.stats().free, 4);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod bootstrap;
mod frame_alloc;
pub mod frame_states;
pub mod memory_manager;
pub mod phys_mapper;
pub mod stack;

pub use crate::bootstrap::{BootstrapAllocator, HandOver, Phase};
pub use crate::frame_alloc::{FrameAllocError, FrameAllocator, FrameStats};
pub use crate::memory_manager::{KernelMemory, MemoryManager};
pub use crate::stack::StackFrameAllocator;
