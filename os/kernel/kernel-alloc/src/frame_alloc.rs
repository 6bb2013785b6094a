//! The frame-allocator capability set shared by the stack allocator and the
//! bootstrap allocator.

use kernel_info::memory_map::MemoryRegion;
use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};
use kernel_vmem::{FrameAlloc, MapError, PageDirectory, PageEntryBits, PhysMapper};

/// Errors of frame allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    /// No free frame is left.
    #[error("out of physical frames")]
    OutOfMemory,
    /// The frame was allocated but could not be mapped; it was freed again.
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Frame counts of an allocator.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames described by the memory map and tracked by the allocator.
    pub total: usize,
    /// Frames ready to be handed out.
    pub free: usize,
    /// Frames covered by non-free regions.
    pub reserved: usize,
}

impl FrameStats {
    /// Frames currently handed out.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.total - self.free - self.reserved
    }
}

/// Hands out and takes back single 4 KiB physical frames.
///
/// Every implementation also acts as a [`FrameAlloc`] for page-table code,
/// which is how the mapped operations install missing page tables.
pub trait FrameAllocator: FrameAlloc {
    /// Populate the bookkeeping from a memory map.
    ///
    /// # Panics
    /// If called a second time.
    fn init<I>(&mut self, memory_map: I)
    where
        I: IntoIterator<Item = MemoryRegion>,
        I::IntoIter: Clone;

    /// Take one frame.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] if no frame is free.
    fn alloc_frame(&mut self) -> Result<PhysicalFrame, FrameAllocError>;

    /// Return a frame.
    ///
    /// # Panics
    /// If the frame was not handed out by this allocator or is already free.
    fn free_frame(&mut self, frame: PhysicalFrame);

    fn stats(&self) -> FrameStats;

    /// Take one frame and map it at `va` in `directory`.
    ///
    /// Page tables the mapping needs come from this allocator as well.
    ///
    /// # Errors
    /// - [`FrameAllocError::OutOfMemory`] if no frame is free.
    /// - [`FrameAllocError::Map`] if the mapping fails; the frame is freed.
    fn alloc_frame_mapped<M: PhysMapper>(
        &mut self,
        directory: &mut PageDirectory<'_, M>,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<PhysicalFrame, FrameAllocError>
    where
        Self: Sized,
    {
        let frame = self.alloc_frame()?;
        if let Err(e) = directory.create_mapping(self, va, frame, flags) {
            self.free_frame(frame);
            return Err(e.into());
        }
        Ok(frame)
    }

    /// Remove the mapping at `va`, then return `frame`.
    ///
    /// # Panics
    /// As [`free_frame`](Self::free_frame), if `va` maps a different frame,
    /// or if `va` lies in a page table `directory` shares with the kernel.
    fn free_frame_mapped<M: PhysMapper>(
        &mut self,
        directory: &mut PageDirectory<'_, M>,
        frame: PhysicalFrame,
        va: VirtualAddress,
    ) where
        Self: Sized,
    {
        match directory.remove_mapping(va) {
            Ok(Some(mapped)) => assert_eq!(mapped, frame, "{va} mapped {mapped}, not {frame}"),
            Ok(None) => {}
            Err(e) => panic!("cannot free {frame}: {e}"),
        }
        self.free_frame(frame);
    }
}
