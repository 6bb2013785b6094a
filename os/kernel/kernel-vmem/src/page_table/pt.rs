//! # IA-32 Page Table (PT)
//!
//! This module models the lowest paging level.
//!
//! - [`L1Index`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a page-table entry (PTE); every present entry maps 4 KiB.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 PTEs.
//!
//! ## Invariants & Notes
//!
//! - [`PageTable`] is 4 KiB-aligned and occupies exactly one frame.
//! - [`PtEntry::make_4k`] forces `present=1` and clears the PAT bit.
//! - After modifying active mappings, the caller performs TLB maintenance.

use crate::format::{allocate_and_format, copy_frame};
use crate::{FrameAlloc, MapError, PageEntryBits, PhysMapper};
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};

/// Index into a Page Table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct L1Index(u16);

/// A single Page Table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PtEntry(PageEntryBits);

/// The Page Table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl L1Index {
    /// Build an index from a virtual address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(va.table_index())
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
}

impl PtEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    /// The "not present, writable" entry left behind by an unmap.
    #[inline]
    #[must_use]
    pub const fn tombstone() -> Self {
        Self(PageEntryBits::TOMBSTONE)
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// If present, return the mapped frame and the entry's flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalFrame, PageEntryBits)> {
        if !self.is_present() {
            return None;
        }
        Some((self.0.frame(), self.0))
    }

    /// Create a present 4 KiB leaf for `frame` with the given flags.
    #[inline]
    #[must_use]
    pub const fn make_4k(frame: PhysicalFrame, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_large_page(false)
                .with_present(true)
                .with_frame(frame),
        )
    }

    /// Return the raw 32-bit value (flags + address).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }

    /// Construct from a raw 32-bit value. No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_raw(v: u32) -> Self {
        Self(PageEntryBits::from_bits(v))
    }
}

impl PageTable {
    /// Create a fully zeroed Page Table (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); ENTRIES_PER_TABLE],
        }
    }

    /// Read the entry at `i`.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: L1Index) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: L1Index, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Bounds-checked mutable access by plain index.
    ///
    /// # Panics
    /// If `index >= 1024`.
    #[inline]
    pub fn entry_at(&mut self, index: usize) -> &mut PtEntry {
        assert!(
            index < ENTRIES_PER_TABLE,
            "page table index {index} out of range"
        );
        &mut self.entries[index]
    }

    /// Derive the PT index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> L1Index {
        L1Index::from(va)
    }

    /// Iterate over every present entry with its index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter_present(&self) -> impl Iterator<Item = (L1Index, PhysicalFrame, PageEntryBits)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            let (frame, flags) = e.page_4k()?;
            Some((L1Index::new(i as u16), frame, flags))
        })
    }

    /// Whether no entry is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter_present().next().is_none()
    }

    /// Copy this table into a newly allocated one.
    ///
    /// Every present entry gets a fresh frame whose contents are copied byte
    /// for byte; the copy keeps the entry's flags. Returns the frame of the
    /// new table.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if any allocation fails. Frames allocated so
    /// far are returned to `alloc` before the error is reported.
    pub fn deep_clone<A: FrameAlloc + ?Sized, M: PhysMapper + ?Sized>(
        &self,
        mapper: &M,
        alloc: &mut A,
    ) -> Result<PhysicalFrame, MapError> {
        let (copy, copy_table_frame) = allocate_and_format(alloc, mapper, Self::zeroed)?;

        for (index, frame, flags) in self.iter_present() {
            let Some(target) = alloc.alloc_4k() else {
                copy.release_leaves(alloc);
                alloc.free_4k(copy_table_frame);
                return Err(MapError::OutOfMemory);
            };

            unsafe { copy_frame(mapper, frame, target) };
            copy.set(index, PtEntry::make_4k(target, flags));
        }

        log::trace!("cloned page table into {copy_table_frame}");
        Ok(copy_table_frame)
    }

    /// Return every mapped frame to `alloc` and clear the table.
    pub(crate) fn release_leaves<A: FrameAlloc + ?Sized>(&mut self, alloc: &mut A) {
        for entry in &mut self.entries {
            if let Some((frame, _)) = entry.page_4k() {
                alloc.free_4k(frame);
            }
            *entry = PtEntry::zero();
        }
    }
}
