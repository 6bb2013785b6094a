//! # Page Directory (IA-32, two-level)
//!
//! A handle to one address space: the frame of its directory, the mapper
//! used to reach page-table memory, and the set of slots whose tables it owns.
//!
//! ## Highlights
//!
//! - [`PageDirectory::create_mapping`] installs one 4 KiB mapping, creating
//!   the page table on demand. It never overwrites; that is
//!   [`PageDirectory::replace_mapping`].
//! - [`PageDirectory::remove_mapping`] leaves a tombstone and keeps the table.
//! - [`PageDirectory::translate`] resolves 4 KiB and 4 MiB leaves.
//! - [`PageDirectory::deep_clone`] copies an address space, aliasing the
//!   kernel tables it shares with the kernel directory.
//!
//! ## Ownership
//!
//! A slot is **owned** when this directory allocated (or cloned) the table in
//! it. Tables copied in from the kernel directory are **aliased**: they are
//! referenced by physical address only and [`PageDirectory::destroy`] leaves
//! them alone. Aliased tables are read-only through this handle: mapping or
//! unmapping through them fails with [`MapError::SharedTable`].
//!
//! ## Recursive slot
//!
//! Slot 1023 always holds `own frame | writable | present`. Addresses in the
//! window it creates are rejected with [`MapError::ReservedWindow`].

use crate::format::allocate_and_format;
use crate::mmu::{PagingControl, flush_tlb_page};
use crate::page_table::pd::{DirectoryTable, L2Index, PdEntry, PdEntryKind};
use crate::page_table::pt::{L1Index, PageTable, PtEntry};
use crate::recursive::{self, RECURSIVE_SLOT};
use crate::{FrameAlloc, MapError, PageEntryBits, PhysMapper};
use core::fmt;
use kernel_info::memory::KERNEL_SPACE_START;
use kernel_memory_addresses::{
    PhysicalAddress, PhysicalFrame, PhysicalPage, Size4K, Size4M, VirtualAddress, VirtualPage,
};

/// First directory slot of kernel space.
pub const FIRST_KERNEL_SLOT: u16 = KERNEL_SPACE_START.directory_index();

/// Handle to a single page directory.
pub struct PageDirectory<'m, M: PhysMapper> {
    root: PhysicalFrame,
    mapper: &'m M,
    owned: SlotSet,
}

/// One bit per directory slot.
#[derive(Copy, Clone, Default, Eq, PartialEq)]
struct SlotSet([u32; 32]);

impl SlotSet {
    const fn new() -> Self {
        Self([0; 32])
    }

    const fn insert(&mut self, slot: L2Index) {
        self.0[slot.as_usize() / 32] |= 1 << (slot.as_usize() % 32);
    }

    const fn remove(&mut self, slot: L2Index) {
        self.0[slot.as_usize() / 32] &= !(1 << (slot.as_usize() % 32));
    }

    const fn contains(&self, slot: L2Index) -> bool {
        self.0[slot.as_usize() / 32] & (1 << (slot.as_usize() % 32)) != 0
    }

    fn iter(self) -> impl Iterator<Item = L2Index> {
        (0..RECURSIVE_SLOT)
            .map(L2Index::new)
            .filter(move |&slot| self.contains(slot))
    }
}

impl<'m, M: PhysMapper> PageDirectory<'m, M> {
    /// Allocate an empty directory whose only present slot is the recursive one.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if no frame is available.
    pub fn new<A: FrameAlloc + ?Sized>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let (table, root) = allocate_and_format(alloc, mapper, DirectoryTable::zeroed)?;
        table.set(L2Index::new(RECURSIVE_SLOT), recursive::self_entry(root));
        log::debug!("created page directory at {root}");
        Ok(Self {
            root,
            mapper,
            owned: SlotSet::new(),
        })
    }

    /// Allocate a directory that aliases every kernel-space table of `kernel`.
    ///
    /// Kernel tables should be preallocated with
    /// [`preallocate_kernel_tables`](Self::preallocate_kernel_tables) first,
    /// or later kernel mappings will not show up in this directory.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if no frame is available.
    pub fn new_sharing_kernel<A: FrameAlloc + ?Sized>(
        kernel: &Self,
        alloc: &mut A,
    ) -> Result<Self, MapError> {
        let mut directory = Self::new(kernel.mapper, alloc)?;
        for slot in (FIRST_KERNEL_SLOT..RECURSIVE_SLOT).map(L2Index::new) {
            let entry = kernel.entry(slot);
            if entry.is_present() {
                directory.table_mut().set(slot, entry);
            }
        }
        Ok(directory)
    }

    /// Wrap an existing directory, e.g. the one built before paging.
    ///
    /// Every present page table below the recursive slot is treated as owned.
    ///
    /// # Safety
    /// `root` must hold a well-formed directory whose recursive slot points
    /// at `root`, and no other handle may release its tables.
    pub unsafe fn adopt(mapper: &'m M, root: PhysicalFrame) -> Self {
        let mut directory = Self {
            root,
            mapper,
            owned: SlotSet::new(),
        };
        debug_assert_eq!(
            directory.entry(L2Index::new(RECURSIVE_SLOT)).next_table(),
            Some(root),
            "adopted directory lacks its recursive slot"
        );
        for slot in (0..RECURSIVE_SLOT).map(L2Index::new) {
            if directory.entry(slot).next_table().is_some() {
                directory.owned.insert(slot);
            }
        }
        directory
    }

    /// Frame holding the directory; the value loaded into CR3.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> PhysicalFrame {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.root.base()
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Raw directory entry in `slot`.
    #[inline]
    #[must_use]
    pub fn entry(&self, slot: L2Index) -> PdEntry {
        self.table().get(slot)
    }

    /// Whether the table in `slot` was allocated by this directory.
    #[inline]
    #[must_use]
    pub const fn owns(&self, slot: L2Index) -> bool {
        self.owned.contains(slot)
    }

    /// Load this directory into CR3.
    pub fn activate<C: PagingControl + ?Sized>(&self, mmu: &mut C) {
        mmu.load_directory(self.root);
    }

    /// The owned page table covering `va`, if one is installed.
    ///
    /// Never creates tables. Returns `None` for 4 MiB leaves, for aliased
    /// kernel tables and for the recursive window.
    pub fn page_table_for(&mut self, va: VirtualAddress) -> Option<&mut PageTable> {
        if recursive::is_in_window(va) {
            return None;
        }
        let slot = L2Index::from(va);
        if !self.owns(slot) {
            return None;
        }
        let frame = self.entry(slot).next_table()?;
        Some(unsafe { self.mapper.phys_to_mut(frame.base()) })
    }

    /// The page table covering `va`, allocated and installed if missing.
    ///
    /// A new table is installed `present | writable`; `user` additionally sets
    /// the slot's user bit, also on an existing table.
    ///
    /// # Errors
    /// - [`MapError::ReservedWindow`] for addresses in the recursive window.
    /// - [`MapError::LargePage`] if a 4 MiB leaf occupies the slot.
    /// - [`MapError::SharedTable`] if the slot holds an aliased kernel table;
    ///   neither the table nor the slot is changed.
    /// - [`MapError::OutOfMemory`] if the table cannot be allocated.
    pub fn ensure_page_table_for<A: FrameAlloc + ?Sized>(
        &mut self,
        va: VirtualAddress,
        alloc: &mut A,
        user: bool,
    ) -> Result<&mut PageTable, MapError> {
        if recursive::is_in_window(va) {
            return Err(MapError::ReservedWindow(va));
        }

        let slot = L2Index::from(va);
        let frame = match self.entry(slot).kind() {
            Some(PdEntryKind::NextPageTable(frame, flags)) => {
                if !self.owns(slot) {
                    return Err(MapError::SharedTable(va));
                }
                if user && !flags.user_access() {
                    self.table_mut()
                        .set(slot, PdEntry::make_next(frame, flags.with_user_access(true)));
                    flush_tlb_page(va);
                }
                frame
            }
            Some(PdEntryKind::Leaf4MiB(..)) => return Err(MapError::LargePage(va)),
            None => {
                let (_, frame) = allocate_and_format(alloc, self.mapper, PageTable::zeroed)?;
                let flags = PageEntryBits::new_kernel_rw().with_user_access(user);
                self.table_mut().set(slot, PdEntry::make_next(frame, flags));
                self.owned.insert(slot);
                flush_tlb_page(recursive::table_address(slot.as_u16()));
                log::debug!("created page table {} at {frame}", slot.as_u16());
                frame
            }
        };

        Ok(unsafe { self.mapper.phys_to_mut(frame.base()) })
    }

    /// Map the page containing `va` to `frame`.
    ///
    /// # Errors
    /// - [`MapError::AlreadyMapped`] if the page is mapped; the existing
    ///   mapping is left untouched.
    /// - Any error of [`ensure_page_table_for`](Self::ensure_page_table_for).
    pub fn create_mapping<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalFrame,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let table = self.ensure_page_table_for(va, alloc, flags.user_access())?;
        let index = L1Index::from(va);
        if let Some((existing, _)) = table.get(index).page_4k() {
            return Err(MapError::AlreadyMapped {
                va,
                existing: existing.base(),
            });
        }

        table.set(index, PtEntry::make_4k(frame, flags));
        flush_tlb_page(va);
        log::trace!("mapped {va} -> {frame}");
        Ok(())
    }

    /// Map the page containing `va` to `frame`, overwriting any previous
    /// mapping. Returns the frame that was mapped before.
    ///
    /// # Errors
    /// Any error of [`ensure_page_table_for`](Self::ensure_page_table_for).
    pub fn replace_mapping<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalFrame,
        flags: PageEntryBits,
    ) -> Result<Option<PhysicalFrame>, MapError> {
        let table = self.ensure_page_table_for(va, alloc, flags.user_access())?;
        let index = L1Index::from(va);
        let previous = table.get(index).page_4k().map(|(f, _)| f);
        table.set(index, PtEntry::make_4k(frame, flags));
        flush_tlb_page(va);
        Ok(previous)
    }

    /// Unmap the page containing `va` and return the frame it mapped.
    ///
    /// Removing an absent mapping is a no-op returning `Ok(None)`. Empty
    /// tables are not reclaimed.
    ///
    /// # Errors
    /// [`MapError::SharedTable`] if `va` lies in an aliased kernel table;
    /// the kernel's mapping stays in place.
    pub fn remove_mapping(
        &mut self,
        va: VirtualAddress,
    ) -> Result<Option<PhysicalFrame>, MapError> {
        let slot = L2Index::from(va);
        if !recursive::is_in_window(va)
            && !self.owns(slot)
            && self.entry(slot).next_table().is_some()
        {
            return Err(MapError::SharedTable(va));
        }

        let Some(table) = self.page_table_for(va) else {
            return Ok(None);
        };
        let index = L1Index::from(va);
        let Some((frame, _)) = table.get(index).page_4k() else {
            return Ok(None);
        };
        table.set(index, PtEntry::tombstone());
        flush_tlb_page(va);
        log::trace!("unmapped {va} (was {frame})");
        Ok(Some(frame))
    }

    /// Whether `va` is mapped, by a 4 KiB or a 4 MiB leaf.
    #[must_use]
    pub fn mapping_exists(&self, va: VirtualAddress) -> bool {
        self.translate(va).is_some()
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    ///
    /// The recursive slot is walked like any other, so addresses in the
    /// window resolve to page-table memory.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.entry(L2Index::from(va)).kind()? {
            PdEntryKind::Leaf4MiB(page, _) => Some(page.join(va.offset::<Size4M>())),
            PdEntryKind::NextPageTable(frame, _) => {
                let table: &PageTable = unsafe { self.mapper.phys_to_mut(frame.base()) };
                let (leaf, _) = table.get(L1Index::from(va)).page_4k()?;
                Some(leaf.join(va.offset::<Size4K>()))
            }
        }
    }

    /// Map a 4 MiB page directly from the directory.
    ///
    /// # Errors
    /// - [`MapError::ReservedWindow`] for the recursive slot.
    /// - [`MapError::AlreadyMapped`] if the slot holds a table or a leaf;
    ///   `existing` is the address the slot points at.
    pub fn create_large_mapping(
        &mut self,
        page: VirtualPage<Size4M>,
        target: PhysicalPage<Size4M>,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let va = page.base();
        if recursive::is_in_window(va) {
            return Err(MapError::ReservedWindow(va));
        }

        let slot = L2Index::from(va);
        let entry = self.entry(slot);
        if entry.is_present() {
            return Err(MapError::AlreadyMapped {
                va,
                existing: entry.flags().physical_address(),
            });
        }

        self.table_mut().set(slot, PdEntry::make_4m(target, flags));
        flush_tlb_page(va);
        log::trace!("mapped 4 MiB {va} -> {target}");
        Ok(())
    }

    /// Remove a 4 MiB mapping and return the page it mapped.
    pub fn remove_large_mapping(&mut self, page: VirtualPage<Size4M>) -> Option<PhysicalPage<Size4M>> {
        let va = page.base();
        let slot = L2Index::from(va);
        let Some(PdEntryKind::Leaf4MiB(target, _)) = self.entry(slot).kind() else {
            return None;
        };
        self.table_mut().set_zero(slot);
        flush_tlb_page(va);
        Some(target)
    }

    /// Install empty page tables in every kernel-space slot that has none.
    ///
    /// Directories created with [`new_sharing_kernel`](Self::new_sharing_kernel)
    /// afterwards see every later kernel mapping.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if a table cannot be allocated. Tables
    /// installed so far stay in place.
    pub fn preallocate_kernel_tables<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &mut A,
    ) -> Result<(), MapError> {
        for slot in (FIRST_KERNEL_SLOT..RECURSIVE_SLOT).map(L2Index::new) {
            if !self.entry(slot).is_present() {
                self.ensure_page_table_for(slot.base(), alloc, false)?;
            }
        }
        Ok(())
    }

    /// Copy this address space.
    ///
    /// - A slot whose table is the one `kernel` has in the same slot is
    ///   aliased.
    /// - Every other table is deep-cloned, including the frames it maps.
    /// - 4 MiB leaves are copied as-is.
    /// - The recursive slot of the copy points at the copy.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`]; everything allocated for the copy is
    /// released again.
    pub fn deep_clone<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        kernel: Option<&Self>,
    ) -> Result<Self, MapError> {
        let mut clone = Self::new(self.mapper, alloc)?;

        for slot in (0..RECURSIVE_SLOT).map(L2Index::new) {
            let entry = self.entry(slot);
            match entry.kind() {
                None => {}
                Some(PdEntryKind::Leaf4MiB(..)) => clone.table_mut().set(slot, entry),
                Some(PdEntryKind::NextPageTable(frame, flags)) => {
                    let shared = kernel.is_some_and(|k| k.entry(slot).next_table() == Some(frame));
                    if shared {
                        clone.table_mut().set(slot, entry);
                        continue;
                    }

                    let table: &PageTable = unsafe { self.mapper.phys_to_mut(frame.base()) };
                    match table.deep_clone(self.mapper, alloc) {
                        Ok(copy) => {
                            clone.table_mut().set(slot, PdEntry::make_next(copy, flags));
                            clone.owned.insert(slot);
                        }
                        Err(e) => {
                            clone.release(alloc, true);
                            return Err(e);
                        }
                    }
                }
            }
        }

        log::debug!("cloned page directory {} into {}", self.root, clone.root);
        Ok(clone)
    }

    /// Free the owned page tables and the directory frame.
    ///
    /// Aliased kernel tables and the frames mapped through any table are not
    /// touched; they belong to whoever mapped them.
    pub fn destroy<A: FrameAlloc + ?Sized>(self, alloc: &mut A) {
        log::debug!("destroying page directory {}", self.root);
        self.release(alloc, false);
    }

    /// Free the owned page tables, every frame mapped through them, and the
    /// directory frame.
    ///
    /// The counterpart of [`deep_clone`](Self::deep_clone): a clone owns the
    /// copied pages and nobody else frees them. Frames mapped through
    /// aliased kernel tables and 4 MiB leaves are left alone.
    pub fn destroy_with_pages<A: FrameAlloc + ?Sized>(self, alloc: &mut A) {
        log::debug!("destroying page directory {} with its pages", self.root);
        self.release(alloc, true);
    }

    /// Log every present mapping.
    ///
    /// ```text
    /// Page table 768
    ///     0xC0000000 => 0x00123000
    /// End of table.
    /// End of directory.
    /// ```
    pub fn dump(&self) {
        for slot in (0..RECURSIVE_SLOT).map(L2Index::new) {
            match self.entry(slot).kind() {
                None => {}
                Some(PdEntryKind::Leaf4MiB(page, _)) => {
                    log::info!("Page table {}", slot.as_u16());
                    log::info!("    {} => {} (4 MiB)", slot.base(), page);
                    log::info!("End of table.");
                }
                Some(PdEntryKind::NextPageTable(frame, _)) => {
                    log::info!("Page table {}", slot.as_u16());
                    let table: &PageTable = unsafe { self.mapper.phys_to_mut(frame.base()) };
                    for (index, leaf, _) in table.iter_present() {
                        let va = VirtualAddress::from_indices(slot.as_u16(), index.as_u16());
                        log::info!("    {va} => {leaf}");
                    }
                    log::info!("End of table.");
                }
            }
        }
        log::info!("End of directory.");
    }

    fn release<A: FrameAlloc + ?Sized>(mut self, alloc: &mut A, with_leaves: bool) {
        for slot in self.owned.iter() {
            if let Some(frame) = self.entry(slot).next_table() {
                if with_leaves {
                    let table: &mut PageTable = unsafe { self.mapper.phys_to_mut(frame.base()) };
                    table.release_leaves(alloc);
                }
                alloc.free_4k(frame);
            }
            self.table_mut().set_zero(slot);
            self.owned.remove(slot);
        }
        alloc.free_4k(self.root);
    }

    fn table(&self) -> &DirectoryTable {
        unsafe { self.mapper.phys_to_mut(self.root.base()) }
    }

    fn table_mut(&mut self) -> &mut DirectoryTable {
        unsafe { self.mapper.phys_to_mut(self.root.base()) }
    }
}

impl<M: PhysMapper> fmt::Debug for PageDirectory<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDirectory")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
