//! # IA-32 Page Directory (PD)
//!
//! This module models the top paging level:
//!
//! - [`L2Index`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a PD entry that is either a pointer to a PT (`PS=0`) or a
//!   4 MiB leaf (`PS=1`).
//! - [`PdEntryKind`]: decoded view of an entry (next PT vs 4 MiB leaf).
//! - [`DirectoryTable`]: a 4 KiB-aligned array of 1024 PD entries.
//!
//! ## Semantics
//!
//! At this level the `PS` bit selects the role of an entry:
//! - `PS=0`: entry points to a Page Table, whose base is 4 KiB-aligned.
//! - `PS=1`: entry maps a 4 MiB page; base bits `[31:22]`, bits `[21:12]` zero.
//!
//! The raw table carries no notion of the recursive slot or of ownership;
//! both live in [`PageDirectory`](crate::PageDirectory).

use crate::PageEntryBits;
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalFrame, PhysicalPage, Size4M, VirtualAddress,
};

/// Index into the Page Directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L2Index(u16);

/// Decoded PDE kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PdEntryKind {
    /// Non-leaf (`PS=0`): the frame of the next page table.
    NextPageTable(PhysicalFrame, PageEntryBits),
    /// Leaf (`PS=1`): the 4 MiB page it maps.
    Leaf4MiB(PhysicalPage<Size4M>, PageEntryBits),
}

/// A single Page Directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct DirectoryTable {
    entries: [PdEntry; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<DirectoryTable>() == 4096);

impl L2Index {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(va.directory_index())
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 1024);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Return the index as `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::from_indices(self.0, 0)
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// Decode the entry into its semantic kind, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.is_present() {
            return None;
        }

        if self.0.large_page() {
            let base = PhysicalAddress::new(self.0.physical_address().as_u32() & !(Size4M::SIZE - 1));
            Some(PdEntryKind::Leaf4MiB(PhysicalPage::from_addr(base), self.0))
        } else {
            Some(PdEntryKind::NextPageTable(self.0.frame(), self.0))
        }
    }

    /// Frame of the page table this entry points to, if any.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalFrame> {
        match self.kind() {
            Some(PdEntryKind::NextPageTable(frame, _)) => Some(frame),
            _ => None,
        }
    }

    /// Create a non-leaf PDE that points to the page table in `table`.
    ///
    /// Sets `present=1` and forces `PS=0`.
    #[inline]
    #[must_use]
    pub const fn make_next(table: PhysicalFrame, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_large_page(false)
                .with_present(true)
                .with_frame(table),
        )
    }

    /// Create a 4 MiB leaf PDE.
    ///
    /// Sets `present=1` and forces `PS=1`.
    #[inline]
    #[must_use]
    pub const fn make_4m(page: PhysicalPage<Size4M>, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_large_page(true)
                .with_present(true)
                .with_physical_address(page.base()),
        )
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl DirectoryTable {
    /// Create a fully zeroed Page Directory (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    /// Read the entry at `i`.
    ///
    /// Plain load; does not imply any TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: L2Index) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: L2Index, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Set the entry at `i` to [`PdEntry::zero`].
    #[inline]
    pub const fn set_zero(&mut self, i: L2Index) {
        self.set(i, PdEntry::zero());
    }

    /// Derive the PD index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> L2Index {
        L2Index::from(va)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pd_table_vs_4m() {
        let pt = PhysicalFrame::from_addr(PhysicalAddress::new(0x3000_0000));
        let e_tbl = PdEntry::make_next(pt, PageEntryBits::new_kernel_rw());
        match e_tbl.kind().unwrap() {
            PdEntryKind::NextPageTable(p, f) => {
                assert_eq!(p.base().as_u32(), 0x3000_0000);
                assert!(!f.large_page(), "must be PS=0");
            }
            PdEntryKind::Leaf4MiB(..) => panic!("expected next PT"),
        }

        let m4 = PhysicalPage::<Size4M>::from_addr(PhysicalAddress::new(0x4000_0000));
        let e_4m = PdEntry::make_4m(m4, PageEntryBits::new_kernel_rw());
        assert_eq!(e_4m.raw(), 0x4000_0083);
        assert_eq!(e_4m.next_table(), None);
        match e_4m.kind().unwrap() {
            PdEntryKind::Leaf4MiB(p, f) => {
                assert_eq!(p.base().as_u32(), 0x4000_0000);
                assert!(f.large_page(), "must be PS=1");
            }
            PdEntryKind::NextPageTable(..) => panic!("expected 4MiB leaf"),
        }
    }

    #[test]
    fn slot_base_addresses() {
        assert_eq!(L2Index::new(0x300).base(), VirtualAddress::new(0xC000_0000));
        assert_eq!(
            DirectoryTable::index_of(VirtualAddress::new(0xFFC0_1234)),
            L2Index::new(1023)
        );
    }
}
