//! # Bootstrap Frame Allocator
//!
//! The degenerate allocator of the kickstart stage. It bumps a physical
//! pointer upwards, never frees, never runs out, and builds the first page
//! directory the CPU loads.
//!
//! ## Phases
//!
//! | Phase            | Legal operations |
//! |------------------|------------------|
//! | `PrePaging`      | [`init`](FrameAllocator::init), [`alloc_next_page`](BootstrapAllocator::alloc_next_page), [`mapping_enter`](BootstrapAllocator::mapping_enter), [`alloc_page`](BootstrapAllocator::alloc_page), [`adjust_alloc_start`](BootstrapAllocator::adjust_alloc_start), [`start_paging`](BootstrapAllocator::start_paging) |
//! | `PagingEnabled`  | [`alloc_frame`](FrameAllocator::alloc_frame), [`free_frame`](FrameAllocator::free_frame) and the mapped variants |
//!
//! The transition is one-way. Calling an operation in the wrong phase panics.
//!
//! ## Hand-over
//!
//! [`hand_over`](BootstrapAllocator::hand_over) ends the allocator's life: it
//! returns the directory frame for the next stage to adopt and the consumed
//! physical range as a [`MemoryRegionType::NonFree`] region for the Boot Info
//! Page, so the stack allocator never hands those frames out.

use crate::frame_alloc::{FrameAllocError, FrameAllocator, FrameStats};
use kernel_info::memory_map::{MemoryRegion, MemoryRegionType};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalFrame, Size4K, VirtualAddress};
use kernel_vmem::{FrameAlloc, MapError, PageDirectory, PageEntryBits, PagingControl, PhysMapper};

/// Where the bootstrap allocator is in its life.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    /// Physical addresses only; the directory is being built.
    PrePaging,
    /// The directory is loaded and CR0.PG is set.
    PagingEnabled,
}

/// What the next stage inherits from the bootstrap allocator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HandOver {
    /// The directory that is loaded in CR3.
    pub directory: PhysicalFrame,
    /// Every frame the allocator handed out, as one non-free region.
    pub consumed: MemoryRegion,
}

/// The bump pointer on its own, so the directory can borrow it.
struct Bump {
    start: PhysicalAddress,
    next: PhysicalAddress,
    allocated: usize,
}

impl FrameAlloc for Bump {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        let frame = PhysicalFrame::from_addr(self.next);
        self.next = self.next.checked_add(Size4K::SIZE)?;
        self.allocated += 1;
        log::trace!("bootstrap frame {frame}");
        Some(frame)
    }

    fn free_4k(&mut self, _frame: PhysicalFrame) {}
}

/// Bump allocator plus the first page directory.
pub struct BootstrapAllocator<'m, M: PhysMapper> {
    bump: Bump,
    directory: PageDirectory<'m, M>,
    phase: Phase,
    initialized: bool,
}

impl<'m, M: PhysMapper> BootstrapAllocator<'m, M> {
    /// Start allocating at `start` (rounded up to a frame) and allocate the
    /// page directory there.
    ///
    /// `start` must lie in free memory, typically right behind the loaded
    /// image; [`init`](FrameAllocator::init) only moves later allocations.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if `start` lies in the last frame of the
    /// address space.
    pub fn new(mapper: &'m M, start: PhysicalAddress) -> Result<Self, MapError> {
        let start = start.align_up::<Size4K>().ok_or(MapError::OutOfMemory)?;
        let mut bump = Bump {
            start,
            next: start,
            allocated: 0,
        };
        let directory = PageDirectory::new(mapper, &mut bump)?;
        log::debug!("bootstrap allocator starts at {start}");
        Ok(Self {
            bump,
            directory,
            phase: Phase::PrePaging,
            initialized: false,
        })
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The physical address the next frame is taken from.
    #[must_use]
    pub const fn next_address(&self) -> PhysicalAddress {
        self.bump.next
    }

    /// The directory under construction.
    #[must_use]
    pub const fn directory(&self) -> &PageDirectory<'m, M> {
        &self.directory
    }

    /// Take the next physical page.
    ///
    /// # Panics
    /// After paging was enabled, or if the bump pointer wraps.
    pub fn alloc_next_page(&mut self) -> PhysicalFrame {
        self.expect_phase(Phase::PrePaging, "alloc_next_page");
        self.bump()
    }

    /// Map `va` to `frame` in the bootstrap directory.
    ///
    /// # Errors
    /// Any [`MapError`] of [`PageDirectory::create_mapping`].
    ///
    /// # Panics
    /// After paging was enabled.
    pub fn mapping_enter(
        &mut self,
        va: VirtualAddress,
        frame: PhysicalFrame,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        self.expect_phase(Phase::PrePaging, "mapping_enter");
        self.directory.create_mapping(&mut self.bump, va, frame, flags)
    }

    /// Map `bytes` starting at `va` to consecutive frames starting at `pa`.
    ///
    /// Both addresses are rounded down to a page; a partial last page is
    /// mapped whole.
    ///
    /// # Errors
    /// The first [`MapError`]; pages mapped before it stay mapped.
    ///
    /// # Panics
    /// After paging was enabled.
    pub fn mapping_enter_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        bytes: u32,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let va = va.page::<Size4K>().base();
        let first = pa.page::<Size4K>();
        let pages = bytes.div_ceil(Size4K::SIZE);
        for i in 0..pages {
            let offset = i * Size4K::SIZE;
            self.mapping_enter(
                va + offset,
                PhysicalFrame::from_number(first.number() + i),
                flags,
            )?;
        }
        Ok(())
    }

    /// Take the next physical page and map it at `va`.
    ///
    /// # Errors
    /// Any [`MapError`] of [`PageDirectory::create_mapping`].
    ///
    /// # Panics
    /// After paging was enabled.
    pub fn alloc_page(
        &mut self,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<PhysicalFrame, MapError> {
        let frame = self.alloc_next_page();
        self.mapping_enter(va, frame, flags)?;
        Ok(frame)
    }

    /// Move the bump pointer to at least `address`, rounded up to a page.
    ///
    /// The pointer never moves down.
    ///
    /// # Panics
    /// After paging was enabled, or if the rounded address wraps.
    pub fn adjust_alloc_start(&mut self, address: PhysicalAddress) {
        self.expect_phase(Phase::PrePaging, "adjust_alloc_start");
        let target = address.max(self.bump.next);
        let Some(aligned) = target.align_up::<Size4K>() else {
            panic!("bootstrap allocation start {target} cannot be page aligned");
        };
        self.bump.next = aligned;
        log::debug!("bootstrap allocation continues at {aligned}");
    }

    /// Load the directory and turn paging on.
    ///
    /// The directory must map the executing code and the bootstrap frames.
    ///
    /// # Panics
    /// If paging was enabled already.
    pub fn start_paging<C: PagingControl + ?Sized>(&mut self, mmu: &mut C) {
        self.expect_phase(Phase::PrePaging, "start_paging");
        self.directory.activate(mmu);
        mmu.enable_paging();
        self.phase = Phase::PagingEnabled;
        log::debug!(
            "paging enabled with directory {} after {} bootstrap frames",
            self.directory.root(),
            self.bump.allocated
        );
    }

    /// The physical range consumed so far as a non-free region.
    #[must_use]
    pub fn consumed_region(&self) -> MemoryRegion {
        let start = self.bump.start.as_u64();
        MemoryRegion::new(start, self.bump.next.as_u64() - start, MemoryRegionType::NonFree)
    }

    /// End the bootstrap stage.
    #[must_use]
    pub fn hand_over(self) -> HandOver {
        HandOver {
            directory: self.directory.root(),
            consumed: self.consumed_region(),
        }
    }

    fn bump(&mut self) -> PhysicalFrame {
        let Some(frame) = self.bump.alloc_4k() else {
            panic!("bootstrap allocator wrapped past 4 GiB");
        };
        frame
    }

    #[track_caller]
    fn expect_phase(&self, phase: Phase, operation: &str) {
        assert!(
            self.phase == phase,
            "bootstrap allocator: {operation} is not allowed in phase {:?}",
            self.phase
        );
    }
}

impl<M: PhysMapper> FrameAllocator for BootstrapAllocator<'_, M> {
    /// Skip the allocation start past every non-free region that covers it.
    fn init<I>(&mut self, memory_map: I)
    where
        I: IntoIterator<Item = MemoryRegion>,
        I::IntoIter: Clone,
    {
        self.expect_phase(Phase::PrePaging, "init");
        assert!(!self.initialized, "bootstrap allocator initialized twice");
        self.initialized = true;

        let regions = memory_map.into_iter();
        loop {
            let next = self.bump.next.as_u64();
            let blocking = regions
                .clone()
                .filter(|r| !r.kind.is_free() && r.contains(next))
                .map(|r| r.end())
                .max();
            let Some(end) = blocking else { break };
            let Some(end) = PhysicalAddress::from_u64(end) else {
                panic!("no free memory above {}", self.bump.next);
            };
            self.adjust_alloc_start(end);
        }
    }

    fn alloc_frame(&mut self) -> Result<PhysicalFrame, FrameAllocError> {
        self.expect_phase(Phase::PagingEnabled, "alloc_frame");
        Ok(self.bump())
    }

    /// Never frees; the frame stays part of the consumed region.
    fn free_frame(&mut self, frame: PhysicalFrame) {
        self.expect_phase(Phase::PagingEnabled, "free_frame");
        log::trace!("bootstrap allocator keeps {frame}");
    }

    fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.bump.allocated,
            free: 0,
            reserved: 0,
        }
    }
}

/// Page-table frames for directories other than the bootstrap one; only
/// after paging, like [`alloc_frame`](FrameAllocator::alloc_frame).
impl<M: PhysMapper> FrameAlloc for BootstrapAllocator<'_, M> {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        self.expect_phase(Phase::PagingEnabled, "alloc_4k");
        self.bump.alloc_4k()
    }

    fn free_4k(&mut self, frame: PhysicalFrame) {
        self.free_frame(frame);
    }
}
