//! # Stack Frame Allocator
//!
//! A LIFO stack of free 4 KiB frames, threaded through the free frames
//! themselves: the first word of every free frame holds the physical address
//! of the next one.
//!
//! ```text
//! top ──► [frame 0x0049F000 | next=0x0049E000] ──► [0x0049E000 | next=…] ──► … ──► EMPTY
//! ```
//!
//! ## Semantics
//!
//! - [`init`](FrameAllocator::init) scans the memory map once. Free regions
//!   are rounded inward to whole frames, non-free regions outward; a frame
//!   touched by any non-free region is reserved even when a free region
//!   covers it too.
//! - Frames above the tracked range are ignored with a warning.
//! - Allocation and free are O(1). Allocated frames are zero-filled.
//! - Freeing a frame that is not currently allocated panics.

use crate::frame_alloc::{FrameAllocError, FrameAllocator, FrameStats};
use crate::frame_states::{FrameState, FrameStates};
use kernel_info::memory::PAGE_SIZE;
use kernel_info::memory_map::MemoryRegion;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};
use kernel_vmem::{FrameAlloc, PhysMapper, align_down, align_up, zero_frame};

/// State words of the default allocator: 256 MiB of physical memory.
pub const DEFAULT_STATE_WORDS: usize = 4096;

/// Link value that terminates the free stack. Never frame-aligned.
const EMPTY: u32 = 0xFFFF_FFFF;

const FRAME_BYTES: u64 = PAGE_SIZE as u64;

/// LIFO frame allocator over the frames below `WORDS * 16 * 4 KiB`.
pub struct StackFrameAllocator<'m, M: PhysMapper, const WORDS: usize = DEFAULT_STATE_WORDS> {
    mapper: &'m M,
    top: u32,
    states: FrameStates<WORDS>,
    stats: FrameStats,
    initialized: bool,
}

impl<'m, M: PhysMapper, const WORDS: usize> StackFrameAllocator<'m, M, WORDS> {
    /// First physical address the allocator does not track.
    pub const TRACKED_LIMIT: u64 = (FrameStates::<WORDS>::FRAMES as u64) * FRAME_BYTES;

    /// An empty allocator; nothing can be allocated before [`init`](FrameAllocator::init).
    #[must_use]
    pub const fn new(mapper: &'m M) -> Self {
        Self {
            mapper,
            top: EMPTY,
            states: FrameStates::new(),
            stats: FrameStats {
                total: 0,
                free: 0,
                reserved: 0,
            },
            initialized: false,
        }
    }

    /// State of `frame` as seen by the allocator.
    #[must_use]
    pub const fn state(&self, frame: PhysicalFrame) -> FrameState {
        self.states.get(frame)
    }

    /// Clamp `[start, end)` to the tracked range, warning about the rest.
    fn clamp(region: &MemoryRegion, start: u64, end: u64) -> Option<(u32, u32)> {
        if end > Self::TRACKED_LIMIT {
            log::warn!(
                "ignoring {:#x}..{:#x} ({}) above the tracked range",
                start.max(Self::TRACKED_LIMIT),
                end,
                region.kind
            );
        }
        let end = end.min(Self::TRACKED_LIMIT);
        if start >= end {
            return None;
        }
        let first = u32::try_from(start / FRAME_BYTES).ok()?;
        let last = u32::try_from(end / FRAME_BYTES).ok()?;
        Some((first, last))
    }

    fn mark(&mut self, first: u32, last: u32, state: FrameState) {
        for n in first..last {
            self.states.set(PhysicalFrame::from_number(n), state);
        }
    }

    fn push(&mut self, frame: PhysicalFrame) {
        // SAFETY: free frames belong to the allocator; the first word is the link.
        let link: &mut u32 = unsafe { self.mapper.phys_to_mut(frame.base()) };
        *link = self.top;
        self.top = frame.base().as_u32();
        self.states.set(frame, FrameState::Free);
        self.stats.free += 1;
    }
}

impl<M: PhysMapper, const WORDS: usize> FrameAllocator for StackFrameAllocator<'_, M, WORDS> {
    fn init<I>(&mut self, memory_map: I)
    where
        I: IntoIterator<Item = MemoryRegion>,
        I::IntoIter: Clone,
    {
        assert!(!self.initialized, "frame allocator initialized twice");
        self.initialized = true;

        let regions = memory_map.into_iter();

        for region in regions.clone().filter(|r| r.kind.is_free()) {
            let start = align_up(region.base, FRAME_BYTES);
            let end = align_down(region.end(), FRAME_BYTES);
            if let Some((first, last)) = Self::clamp(&region, start, end) {
                self.mark(first, last, FrameState::Free);
            }
        }

        for region in regions.filter(|r| !r.kind.is_free()) {
            let start = align_down(region.base, FRAME_BYTES);
            let end = align_up(region.end(), FRAME_BYTES);
            if let Some((first, last)) = Self::clamp(&region, start, end) {
                self.mark(first, last, FrameState::Reserved);
            }
        }

        for n in 0..FrameStates::<WORDS>::FRAMES {
            let Ok(n) = u32::try_from(n) else { break };
            let frame = PhysicalFrame::from_number(n);
            match self.states.get(frame) {
                FrameState::Free => self.push(frame),
                FrameState::Reserved => self.stats.reserved += 1,
                FrameState::Untracked | FrameState::Allocated => continue,
            }
            self.stats.total += 1;
        }

        log::info!(
            "frame allocator: {} frames, {} reserved, {} free ({} KiB)",
            self.stats.total,
            self.stats.reserved,
            self.stats.free,
            self.stats.free * PAGE_SIZE / 1024
        );
    }

    fn alloc_frame(&mut self) -> Result<PhysicalFrame, FrameAllocError> {
        if self.top == EMPTY {
            return Err(FrameAllocError::OutOfMemory);
        }

        let frame = PhysicalFrame::from_addr(PhysicalAddress::new(self.top));
        assert_eq!(
            self.states.get(frame),
            FrameState::Free,
            "free stack corrupted at {frame}"
        );

        // SAFETY: the frame is on the free stack; its first word is the link.
        let next: &mut u32 = unsafe { self.mapper.phys_to_mut(frame.base()) };
        self.top = *next;
        self.states.set(frame, FrameState::Allocated);
        self.stats.free -= 1;

        // SAFETY: the frame left the free stack and nothing refers to it yet.
        unsafe { zero_frame(self.mapper, frame) };

        log::trace!("allocated frame {frame}");
        Ok(frame)
    }

    fn free_frame(&mut self, frame: PhysicalFrame) {
        match self.states.get(frame) {
            FrameState::Allocated => {}
            FrameState::Free => panic!("double free of frame {frame}"),
            FrameState::Reserved | FrameState::Untracked => {
                panic!("frame {frame} was never handed out by this allocator")
            }
        }
        self.push(frame);
        log::trace!("freed frame {frame}");
    }

    fn stats(&self) -> FrameStats {
        self.stats
    }
}

impl<M: PhysMapper, const WORDS: usize> FrameAlloc for StackFrameAllocator<'_, M, WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        self.alloc_frame().ok()
    }

    fn free_4k(&mut self, frame: PhysicalFrame) {
        self.free_frame(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory_map::MemoryRegionType;
    use std::cell::UnsafeCell;

    #[repr(C, align(4096))]
    struct Frame(UnsafeCell<[u8; PAGE_SIZE]>);

    struct Ram(Box<[Frame]>);

    impl Ram {
        fn new(frames: usize) -> Self {
            Self((0..frames).map(|_| Frame(UnsafeCell::new([0xCC; PAGE_SIZE]))).collect())
        }
    }

    impl PhysMapper for Ram {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let frame = &self.0[pa.frame_number() as usize];
            let offset = (pa.as_u32() & 0xFFF) as usize;
            unsafe { &mut *frame.0.get().cast::<u8>().add(offset).cast::<T>() }
        }
    }

    type Small<'m> = StackFrameAllocator<'m, Ram, 2>;

    #[test]
    fn free_regions_round_inward_reserved_outward() {
        let ram = Ram::new(32);
        let mut alloc = Small::new(&ram);
        alloc.init([
            MemoryRegion::new(0x0800, 0x8000, MemoryRegionType::Free),
            MemoryRegion::new(0x6800, 0x100, MemoryRegionType::Reserved),
        ]);

        // Free 0x1000..0x8000 is frames 1..=7; frame 6 is reserved.
        let stats = alloc.stats();
        assert_eq!(stats.total, 7);
        assert_eq!(stats.reserved, 1);
        assert_eq!(stats.free, 6);
        assert_eq!(alloc.state(PhysicalFrame::from_number(0)), FrameState::Untracked);
        assert_eq!(alloc.state(PhysicalFrame::from_number(6)), FrameState::Reserved);
        assert_eq!(alloc.state(PhysicalFrame::from_number(8)), FrameState::Untracked);
    }

    #[test]
    fn memory_above_the_tracked_range_is_ignored() {
        let ram = Ram::new(32);
        let mut alloc = Small::new(&ram);
        alloc.init([MemoryRegion::new(0x1_0000, 0x1000_0000, MemoryRegionType::Free)]);

        // Frames 16..32 only.
        assert_eq!(alloc.stats().free, 16);
    }

    #[test]
    fn allocation_is_lifo_and_zero_filled() {
        let ram = Ram::new(32);
        let mut alloc = Small::new(&ram);
        alloc.init([MemoryRegion::new(0x1000, 0x3000, MemoryRegionType::Free)]);

        let a = alloc.alloc_frame().unwrap();
        assert_eq!(a, PhysicalFrame::from_number(3));
        let bytes: &[u8; PAGE_SIZE] = unsafe { ram.phys_to_mut(a.base()) };
        assert!(bytes.iter().all(|&b| b == 0));

        alloc.free_frame(a);
        assert_eq!(alloc.alloc_frame(), Ok(a));
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let ram = Ram::new(32);
        let mut alloc = Small::new(&ram);
        alloc.init([MemoryRegion::new(0x1000, 0x2000, MemoryRegionType::Free)]);

        assert!(alloc.alloc_frame().is_ok());
        assert!(alloc.alloc_frame().is_ok());
        assert_eq!(alloc.alloc_frame(), Err(FrameAllocError::OutOfMemory));
        assert_eq!(alloc.alloc_4k(), None);
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn second_init_panics() {
        let ram = Ram::new(4);
        let mut alloc = Small::new(&ram);
        alloc.init(std::iter::empty::<MemoryRegion>());
        alloc.init(std::iter::empty::<MemoryRegion>());
    }

    #[test]
    #[should_panic(expected = "never handed out")]
    fn freeing_a_reserved_frame_panics() {
        let ram = Ram::new(32);
        let mut alloc = Small::new(&ram);
        alloc.init([MemoryRegion::new(0x1000, 0x1000, MemoryRegionType::AcpiNvs)]);
        alloc.free_frame(PhysicalFrame::from_number(1));
    }
}
