use crate::{MemoryAddress, MemoryAddressOffset, PageSize, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses
/// in the 4 GiB IA-32 linear address space.
///
/// ### Semantics
/// Two-level paging splits the address as
///
/// ```text
/// | 31‒22     | 21‒12  | 11‒0   |
/// | directory | table  | offset |
/// ```
///
/// - [`VirtualAddress::directory_index`] selects the page-directory slot (`va >> 22`).
/// - [`VirtualAddress::table_index`] selects the entry inside that page table.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xC012_3456);
/// assert_eq!(va.directory_index(), 0x300);
/// assert_eq!(va.table_index(), 0x123);
/// assert_eq!(va.offset::<Size4K>().as_u32(), 0x456);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub(crate) MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0.as_u32()
    }

    /// Index into the page directory (bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> u16 {
        ((self.as_u32() >> 22) & 0x3FF) as u16
    }

    /// Index into the page table (bits `[21:12]`).
    #[inline]
    #[must_use]
    pub const fn table_index(self) -> u16 {
        ((self.as_u32() >> 12) & 0x3FF) as u16
    }

    /// Build the address of table entry `table` in directory slot `directory`.
    #[inline]
    #[must_use]
    pub const fn from_indices(directory: u16, table: u16) -> Self {
        debug_assert!(directory < 1024 && table < 1024);
        Self::new(((directory as u32) << 22) | ((table as u32) << 12))
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::<S>(self.0.page::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, MemoryAddressOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0.is_aligned::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.as_u32())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl<S> From<VirtualPage<S>> for VirtualAddress
where
    S: PageSize,
{
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
