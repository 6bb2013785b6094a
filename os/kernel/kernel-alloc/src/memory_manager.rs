//! # Memory Manager
//!
//! The composition root after the bootstrap stage: the kernel page directory
//! and the stack frame allocator behind one [`SpinLock`]. Allocating a frame
//! and mapping it happen under the same guard, so concurrent callers never
//! observe a frame that is allocated but not yet mapped.

use crate::frame_alloc::{FrameAllocError, FrameAllocator, FrameStats};
use crate::stack::{DEFAULT_STATE_WORDS, StackFrameAllocator};
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{MapError, PageDirectory, PageEntryBits, PhysMapper};

/// The kernel directory and the frames backing it.
pub struct KernelMemory<'m, M: PhysMapper, const WORDS: usize = DEFAULT_STATE_WORDS> {
    pub directory: PageDirectory<'m, M>,
    pub frames: StackFrameAllocator<'m, M, WORDS>,
}

/// Locked access to [`KernelMemory`].
pub struct MemoryManager<'m, M: PhysMapper, const WORDS: usize = DEFAULT_STATE_WORDS> {
    inner: SpinLock<KernelMemory<'m, M, WORDS>>,
}

impl<'m, M: PhysMapper, const WORDS: usize> MemoryManager<'m, M, WORDS> {
    /// Take over an initialized allocator and the kernel directory.
    pub const fn new(
        directory: PageDirectory<'m, M>,
        frames: StackFrameAllocator<'m, M, WORDS>,
    ) -> Self {
        Self {
            inner: SpinLock::new(KernelMemory { directory, frames }),
        }
    }

    /// Take one frame.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfMemory`] if no frame is free.
    pub fn alloc_frame(&self) -> Result<PhysicalFrame, FrameAllocError> {
        self.inner.lock().frames.alloc_frame()
    }

    /// Take one frame and map it at `va` in the kernel directory.
    ///
    /// # Errors
    /// See [`FrameAllocator::alloc_frame_mapped`].
    pub fn alloc_frame_mapped(
        &self,
        va: VirtualAddress,
        flags: PageEntryBits,
    ) -> Result<PhysicalFrame, FrameAllocError> {
        let mut guard = self.inner.lock();
        let KernelMemory { directory, frames } = &mut *guard;
        frames.alloc_frame_mapped(directory, va, flags)
    }

    /// Return a frame.
    ///
    /// # Panics
    /// On double or foreign free.
    pub fn free_frame(&self, frame: PhysicalFrame) {
        self.inner.lock().frames.free_frame(frame);
    }

    /// Unmap `va` in the kernel directory and return `frame`.
    ///
    /// # Panics
    /// On double or foreign free, or if `va` maps another frame.
    pub fn free_frame_mapped(&self, frame: PhysicalFrame, va: VirtualAddress) {
        let mut guard = self.inner.lock();
        let KernelMemory { directory, frames } = &mut *guard;
        frames.free_frame_mapped(directory, frame, va);
    }

    /// Install empty tables in every kernel slot.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`].
    pub fn preallocate_kernel_tables(&self) -> Result<(), MapError> {
        let mut guard = self.inner.lock();
        let KernelMemory { directory, frames } = &mut *guard;
        directory.preallocate_kernel_tables(frames)
    }

    /// A new directory that shares the kernel tables.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`].
    pub fn create_address_space(&self) -> Result<PageDirectory<'m, M>, MapError> {
        let mut guard = self.inner.lock();
        let KernelMemory { directory, frames } = &mut *guard;
        PageDirectory::new_sharing_kernel(directory, frames)
    }

    /// Deep-clone `source`, aliasing the kernel tables.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`]; nothing stays allocated.
    pub fn clone_address_space(
        &self,
        source: &PageDirectory<'m, M>,
    ) -> Result<PageDirectory<'m, M>, MapError> {
        let mut guard = self.inner.lock();
        let KernelMemory { directory, frames } = &mut *guard;
        source.deep_clone(frames, Some(&*directory))
    }

    /// Free the tables a task directory owns.
    pub fn destroy_address_space(&self, space: PageDirectory<'m, M>) {
        space.destroy(&mut self.inner.lock().frames);
    }

    /// Free the tables a task directory owns and every frame mapped through
    /// them; for spaces made by [`clone_address_space`](Self::clone_address_space).
    pub fn destroy_address_space_with_pages(&self, space: PageDirectory<'m, M>) {
        space.destroy_with_pages(&mut self.inner.lock().frames);
    }

    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.inner.lock().directory.translate(va)
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.inner.lock().frames.stats()
    }

    /// Run `f` with the directory and the allocator locked together.
    pub fn with_kernel<R>(&self, f: impl FnOnce(&mut KernelMemory<'m, M, WORDS>) -> R) -> R {
        self.inner.with_lock(f)
    }

    /// Log the kernel directory.
    pub fn dump(&self) {
        self.inner.lock().directory.dump();
    }
}
