//! # Boot Info Page
//!
//! One page of metadata that the loader stage fills and the kernel reads.
//!
//! ```text
//! offset  size  field
//!      0     4  size            bytes in use, header included
//!      4     4  flags           bit 0: bootstrap allocator pointer present
//!      8     4  mmap_length     bytes of memory-map entries
//!     12     4  mmap_addr       physical address of the first entry
//!     16   24n  entries         multiboot memory-map entries
//!    ...        (free space)
//!   4092     4  bootstrap allocator pointer (optional)
//! ```
//!
//! ### Invariants
//! - `size() + optional_fields_size() <= PAGE_SIZE` at all times.
//! - Appends that would violate the bound fail with
//!   [`BootInfoError::PageOverflow`] and leave the page untouched.

use crate::memory::{HIGH_MEMORY_START, PAGE_SIZE};
use crate::memory_map::{MemoryMapEntry, MemoryRegion};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

const SIZE_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 4;
const MMAP_LENGTH_OFFSET: usize = 8;
const MMAP_ADDR_OFFSET: usize = 12;
const POINTER_OFFSET: usize = PAGE_SIZE - POINTER_BYTES as usize;
const POINTER_BYTES: u32 = 4;

/// Bytes occupied by the fixed header.
pub const HEADER_SIZE: u32 = 16;

const PAGE_BYTES: u32 = 4096;
const ENTRY_BYTES: u32 = 24;

const _: () = {
    assert!(PAGE_BYTES as usize == PAGE_SIZE);
    assert!(ENTRY_BYTES as usize == MemoryMapEntry::SIZE);
    assert!(HEADER_SIZE as usize == MMAP_ADDR_OFFSET + 4);
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BootInfoError {
    #[error("boot info page overflow: {required} bytes required, {available} available")]
    PageOverflow { required: u32, available: u32 },
    /// The header fields disagree; see [`BootInfoPage::is_valid`].
    #[error("boot info page header is inconsistent")]
    Corrupted,
}

#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct BootInfoFlags {
    /// Bit 0: the last word of the page holds the bootstrap allocator pointer.
    pub bootstrap_allocator: bool,

    #[bits(31)]
    __: u32,
}

/// The Boot Info Page.
///
/// The type is exactly one page large and page aligned, so it can be placed
/// over the frame at [`BOOT_INFO_PAGE`](crate::memory::BOOT_INFO_PAGE) by
/// whatever physical mapper the caller has at hand.
#[repr(C, align(4096))]
pub struct BootInfoPage {
    bytes: [u8; PAGE_SIZE],
}

const _: () = assert!(size_of::<BootInfoPage>() == PAGE_SIZE);

impl BootInfoPage {
    /// Create an empty page that describes itself as living at `location`.
    #[must_use]
    pub fn new(location: PhysicalAddress) -> Self {
        let mut page = Self {
            bytes: [0; PAGE_SIZE],
        };
        page.format(location);
        page
    }

    /// Reset the page to an empty header.
    pub fn format(&mut self, location: PhysicalAddress) {
        self.bytes.fill(0);
        self.write_u32(SIZE_OFFSET, HEADER_SIZE);
        self.write_u32(FLAGS_OFFSET, 0);
        self.write_u32(MMAP_LENGTH_OFFSET, 0);
        self.write_u32(
            MMAP_ADDR_OFFSET,
            location.as_u32().wrapping_add(HEADER_SIZE),
        );
    }

    /// Bytes in use, header included.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.read_u32(SIZE_OFFSET)
    }

    #[must_use]
    pub fn flags(&self) -> BootInfoFlags {
        BootInfoFlags::from_bits(self.read_u32(FLAGS_OFFSET))
    }

    /// Bytes of memory-map entries stored.
    #[must_use]
    pub fn mmap_length(&self) -> u32 {
        self.read_u32(MMAP_LENGTH_OFFSET)
    }

    /// Physical address of the first memory-map entry.
    #[must_use]
    pub fn mmap_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.read_u32(MMAP_ADDR_OFFSET))
    }

    /// Bytes at the end of the page claimed by optional trailing fields.
    #[must_use]
    pub fn optional_fields_size(&self) -> u32 {
        if self.flags().bootstrap_allocator() {
            POINTER_BYTES
        } else {
            0
        }
    }

    /// Append one memory-map entry.
    ///
    /// The entry's `entry_size` is normalized to
    /// [`MemoryMapEntry::PAYLOAD_SIZE`] regardless of what the caller passed.
    ///
    /// # Errors
    /// - [`BootInfoError::Corrupted`] if the header fails
    ///   [`is_valid`](Self::is_valid).
    /// - [`BootInfoError::PageOverflow`] if the entry does not fit in front of
    ///   the optional trailing fields.
    ///
    /// On error the page is not modified.
    pub fn append_mmap_entry(&mut self, entry: &MemoryMapEntry) -> Result<(), BootInfoError> {
        if !self.is_valid() {
            log::warn!("refusing to append to an inconsistent boot info page");
            return Err(BootInfoError::Corrupted);
        }

        let size = self.size();
        let available = PAGE_BYTES - self.optional_fields_size();
        let required = size
            .checked_add(ENTRY_BYTES)
            .ok_or(BootInfoError::Corrupted)?;
        if required > available {
            log::trace!("boot info page full: {size} + {ENTRY_BYTES} > {available}");
            return Err(BootInfoError::PageOverflow {
                required,
                available,
            });
        }

        let normalized = MemoryMapEntry {
            entry_size: MemoryMapEntry::PAYLOAD_SIZE,
            ..*entry
        };
        let at = size as usize;
        self.bytes[at..at + MemoryMapEntry::SIZE].copy_from_slice(&normalized.to_bytes());
        self.write_u32(MMAP_LENGTH_OFFSET, self.mmap_length() + ENTRY_BYTES);
        self.write_u32(SIZE_OFFSET, required);
        Ok(())
    }

    /// Convenience wrapper over [`append_mmap_entry`](Self::append_mmap_entry).
    ///
    /// # Errors
    /// See [`append_mmap_entry`](Self::append_mmap_entry).
    pub fn append_region(&mut self, region: MemoryRegion) -> Result<(), BootInfoError> {
        self.append_mmap_entry(&MemoryMapEntry::from(region))
    }

    /// Store the address of the bootstrap allocator in the last word of the
    /// page and mark it present in the flags.
    ///
    /// # Errors
    /// [`BootInfoError::PageOverflow`] if the entries already reach into the
    /// last word of the page.
    pub fn set_bootstrap_allocator(&mut self, pointer: VirtualAddress) -> Result<(), BootInfoError> {
        let size = self.size();
        if size as usize > POINTER_OFFSET {
            return Err(BootInfoError::PageOverflow {
                required: size + POINTER_BYTES,
                available: PAGE_BYTES,
            });
        }

        self.write_u32(POINTER_OFFSET, pointer.as_u32());
        let flags = self.flags().with_bootstrap_allocator(true);
        self.write_u32(FLAGS_OFFSET, flags.into_bits());
        Ok(())
    }

    #[must_use]
    pub fn bootstrap_allocator(&self) -> Option<VirtualAddress> {
        self.flags()
            .bootstrap_allocator()
            .then(|| VirtualAddress::new(self.read_u32(POINTER_OFFSET)))
    }

    /// Iterate over the stored memory map.
    #[must_use]
    pub fn memory_map(&self) -> MemoryMapIter<'_> {
        let end = HEADER_SIZE as usize + self.mmap_length() as usize;
        MemoryMapIter {
            page: self,
            at: HEADER_SIZE as usize,
            end: end.min(PAGE_SIZE),
        }
    }

    /// One past the highest byte of RAM that is free or reclaimable.
    #[must_use]
    pub fn find_usable_physical_memory_top(&self) -> u64 {
        self.memory_map()
            .filter(|r| r.kind.is_usable())
            .map(|r| r.end())
            .max()
            .unwrap_or(0)
    }

    /// Lowest address above 1 MiB at which at least `bytes` bytes of free
    /// memory are not covered by any non-free region.
    #[must_use]
    pub fn find_highmem_range_of_at_least(&self, bytes: u64) -> Option<u64> {
        let mut best: Option<u64> = None;
        for free in self.memory_map().filter(|r| r.kind.is_free()) {
            let mut start = free.base.max(HIGH_MEMORY_START);
            let end = free.end();

            // Walk forward past every non-free overlay; anything in between
            // that is large enough is a candidate.
            while start < end {
                let blocker = self
                    .memory_map()
                    .filter(|r| !r.kind.is_free())
                    .filter(|r| r.base < end && r.end() > start)
                    .min_by_key(|r| r.base);

                let gap_end = blocker.map_or(end, |b| b.base.max(start));
                if gap_end - start >= bytes {
                    best = Some(best.map_or(start, |b| b.min(start)));
                    break;
                }

                match blocker {
                    Some(b) => start = b.end(),
                    None => break,
                }
            }
        }

        log::trace!("first free high-memory range of {bytes} bytes: {best:x?}");
        best
    }

    /// Log the stored memory map at `info` level.
    pub fn log_memory_map(&self) {
        log::info!("Bootloader-provided memory map:");
        for r in self.memory_map() {
            log::info!(
                "Range: [{:#010x}, {:#010x}), size: {:#x}, type: {} ({})",
                r.base,
                r.end(),
                r.length,
                r.kind.as_raw(),
                r.kind
            );
        }
    }

    /// Whether the header is self-consistent.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let size = self.size();
        let entries = self.mmap_length();
        size >= HEADER_SIZE
            && size.saturating_add(self.optional_fields_size()) <= PAGE_BYTES
            && entries == size - HEADER_SIZE
            && entries % ENTRY_BYTES == 0
    }

    /// Raw contents of the page.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    fn read_u32(&self, at: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_le_bytes(word)
    }

    fn write_u32(&mut self, at: usize, value: u32) {
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Iterator over the memory regions of a [`BootInfoPage`].
#[derive(Clone)]
pub struct MemoryMapIter<'a> {
    page: &'a BootInfoPage,
    at: usize,
    end: usize,
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at + MemoryMapEntry::SIZE > self.end {
            return None;
        }

        let mut raw = [0u8; MemoryMapEntry::SIZE];
        raw.copy_from_slice(&self.page.bytes[self.at..self.at + MemoryMapEntry::SIZE]);
        self.at += MemoryMapEntry::SIZE;
        Some(MemoryMapEntry::from_bytes(&raw).region())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BOOT_INFO_PAGE;
    use crate::memory_map::MemoryRegionType;

    fn free(base: u64, length: u64) -> MemoryRegion {
        MemoryRegion::new(base, length, MemoryRegionType::Free)
    }

    #[test]
    fn fresh_page_has_only_a_header() {
        let page = BootInfoPage::new(BOOT_INFO_PAGE);
        assert_eq!(page.size(), HEADER_SIZE);
        assert_eq!(page.mmap_length(), 0);
        assert_eq!(page.mmap_address(), PhysicalAddress::new(0x8010));
        assert_eq!(page.flags(), BootInfoFlags::new());
        assert_eq!(page.bootstrap_allocator(), None);
        assert_eq!(page.memory_map().count(), 0);
        assert!(page.is_valid());
    }

    #[test]
    fn append_refuses_an_inconsistent_header() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        page.append_region(free(0x0010_0000, 0x1000)).unwrap();

        for size in [8, u32::MAX, HEADER_SIZE + 1] {
            page.write_u32(SIZE_OFFSET, size);
            let before = *page.as_bytes();
            assert!(!page.is_valid());
            assert_eq!(
                page.append_region(free(0x0020_0000, 0x1000)),
                Err(BootInfoError::Corrupted)
            );
            assert_eq!(page.as_bytes(), &before);
        }

        page.write_u32(SIZE_OFFSET, HEADER_SIZE + ENTRY_BYTES);
        assert!(page.is_valid());
        page.append_region(free(0x0020_0000, 0x1000)).unwrap();
        assert_eq!(page.memory_map().count(), 2);
    }

    #[test]
    fn append_normalizes_entry_size() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        let entry = MemoryMapEntry {
            entry_size: 0xDEAD,
            base: 0x0010_0000,
            length: 0x1000,
            kind: 1,
        };
        page.append_mmap_entry(&entry).unwrap();

        assert_eq!(page.size(), HEADER_SIZE + 24);
        assert_eq!(page.mmap_length(), 24);
        assert_eq!(&page.as_bytes()[16..20], &[20, 0, 0, 0]);
        assert_eq!(page.memory_map().next(), Some(free(0x0010_0000, 0x1000)));
    }

    #[test]
    fn exactly_170_entries_fit_without_trailing_fields() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        for i in 0..170u64 {
            page.append_region(free(i * 0x1000, 0x1000)).unwrap();
        }
        assert_eq!(page.size(), 16 + 170 * 24);

        let before = *page.as_bytes();
        let err = page.append_region(free(0, 0x1000)).unwrap_err();
        assert_eq!(
            err,
            BootInfoError::PageOverflow {
                required: 4096 + 24,
                available: 4096
            }
        );
        assert_eq!(page.as_bytes(), &before);
        assert_eq!(page.memory_map().count(), 170);
        assert!(page.is_valid());
    }

    #[test]
    fn trailing_pointer_reduces_capacity() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        page.set_bootstrap_allocator(VirtualAddress::new(0xC010_0000))
            .unwrap();
        assert!(page.flags().bootstrap_allocator());
        assert_eq!(page.optional_fields_size(), 4);

        let mut appended = 0;
        while page.append_region(free(0, 0x1000)).is_ok() {
            appended += 1;
        }
        assert_eq!(appended, 169);
        assert_eq!(
            page.bootstrap_allocator(),
            Some(VirtualAddress::new(0xC010_0000))
        );
        assert!(page.size() + page.optional_fields_size() <= 4096);
    }

    #[test]
    fn pointer_is_rejected_when_entries_reach_the_last_word() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        while page.append_region(free(0, 0x1000)).is_ok() {}
        assert!(page.set_bootstrap_allocator(VirtualAddress::new(1)).is_err());
        assert!(!page.flags().bootstrap_allocator());
    }

    #[test]
    fn usable_top_counts_free_and_reclaimable_only() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        page.append_region(free(0, 0x9_F000)).unwrap();
        page.append_region(free(0x10_0000, 0x70_0000)).unwrap();
        page.append_region(MemoryRegion::new(
            0x80_0000,
            0x1_0000,
            MemoryRegionType::AcpiReclaimable,
        ))
        .unwrap();
        page.append_region(MemoryRegion::new(
            0xFFFC_0000,
            0x4_0000,
            MemoryRegionType::Reserved,
        ))
        .unwrap();
        assert_eq!(page.find_usable_physical_memory_top(), 0x81_0000);
    }

    #[test]
    fn highmem_search_skips_low_memory_and_overlays() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        page.append_region(free(0, 0x9_F000)).unwrap();
        page.append_region(free(0x10_0000, 0x70_0000)).unwrap();
        page.append_region(MemoryRegion::new(
            0x10_0000,
            0x20_0000,
            MemoryRegionType::NonFree,
        ))
        .unwrap();

        assert_eq!(page.find_highmem_range_of_at_least(0x1000), Some(0x30_0000));
        assert_eq!(page.find_highmem_range_of_at_least(0x50_0000), Some(0x30_0000));
        assert_eq!(page.find_highmem_range_of_at_least(0x50_0001), None);
    }

    #[test]
    fn validity_tracks_header_consistency() {
        let mut page = BootInfoPage::new(BOOT_INFO_PAGE);
        page.append_region(free(0x10_0000, 0x1000)).unwrap();
        assert!(page.is_valid());
        page.write_u32(MMAP_LENGTH_OFFSET, 7);
        assert!(!page.is_valid());
    }
}
