//! # Physical Mappers for the Kernel
//!
//! Two [`PhysMapper`] strategies, one per boot stage:
//!
//! - [`IdentityMapper`]: before paging, and for the low memory that stays
//!   identity-mapped afterwards. A physical address *is* the pointer.
//! - [`OffsetMapper`]: after paging, physical memory is reachable through a
//!   fixed window at `offset + pa`.
//!
//! Page-table code never dereferences a physical address on its own; it asks
//! the mapper it was handed.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::OffsetMapper;
//! use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
//!
//! let mapper = OffsetMapper::new(0xC000_0000);
//! assert_eq!(
//!     mapper.virtual_address(PhysicalAddress::new(0x1234)),
//!     Some(VirtualAddress::new(0xC000_1234))
//! );
//! assert_eq!(mapper.virtual_address(PhysicalAddress::new(0x4000_0000)), None);
//! ```

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for identity-mapped memory.
///
/// # Safety
/// Only valid while the referenced physical range is reachable at the same
/// virtual address: before paging, or through an identity mapping.
#[derive(Debug, Copy, Clone, Default)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = core::ptr::with_exposed_provenance_mut::<T>(pa.as_u32() as usize);
        // SAFETY: the caller guarantees the address is mapped and typed as `T`.
        unsafe { &mut *ptr }
    }
}

/// [`PhysMapper`] for a fixed physical-memory window at `offset`.
#[derive(Debug, Copy, Clone)]
pub struct OffsetMapper {
    offset: u32,
}

impl OffsetMapper {
    #[must_use]
    pub const fn new(offset: u32) -> Self {
        Self { offset }
    }

    /// Where `pa` is visible, or `None` if the window does not reach it.
    #[must_use]
    pub const fn virtual_address(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        match self.offset.checked_add(pa.as_u32()) {
            Some(va) => Some(VirtualAddress::new(va)),
            None => None,
        }
    }
}

impl PhysMapper for OffsetMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let Some(va) = self.virtual_address(pa) else {
            panic!("{pa} lies outside the physical memory window");
        };
        let ptr = core::ptr::with_exposed_provenance_mut::<T>(va.as_u32() as usize);
        // SAFETY: the caller guarantees the window maps `pa` and it holds a `T`.
        unsafe { &mut *ptr }
    }
}
