//! # Frame Formatting
//!
//! Turning a freshly allocated frame into a typed structure without
//! placement tricks: [`allocate_and_format`] hands back the usable reference
//! together with the frame it lives in.

use crate::{FrameAlloc, MapError, PhysMapper};
use core::mem::MaybeUninit;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::PhysicalFrame;

/// The raw bytes of one frame.
#[repr(C, align(4096))]
pub struct PageFrame(pub [u8; PAGE_SIZE]);

/// Allocate one frame and initialize it with `init()`.
///
/// `T` must fit into a frame and must not need more than page alignment;
/// both are checked at compile time.
///
/// # Errors
/// [`MapError::OutOfMemory`] if `alloc` is exhausted.
///
/// # Example
/// ```rust,ignore
/// let (table, frame) = allocate_and_format(&mut alloc, &mapper, PageTable::zeroed)?;
/// ```
pub fn allocate_and_format<'a, T, A, M>(
    alloc: &mut A,
    mapper: &M,
    init: impl FnOnce() -> T,
) -> Result<(&'a mut T, PhysicalFrame), MapError>
where
    A: FrameAlloc + ?Sized,
    M: PhysMapper + ?Sized,
{
    const {
        assert!(size_of::<T>() <= PAGE_SIZE);
        assert!(align_of::<T>() <= PAGE_SIZE);
    }

    let frame = alloc.alloc_4k().ok_or(MapError::OutOfMemory)?;
    // SAFETY: the frame was just handed out and nothing else refers to it.
    let slot: &'a mut MaybeUninit<T> = unsafe { mapper.phys_to_mut(frame.base()) };
    Ok((slot.write(init()), frame))
}

/// Fill `frame` with zeros.
///
/// # Safety
/// No live reference may point into `frame`.
pub unsafe fn zero_frame<M: PhysMapper + ?Sized>(mapper: &M, frame: PhysicalFrame) {
    let bytes: &mut PageFrame = unsafe { mapper.phys_to_mut(frame.base()) };
    bytes.0.fill(0);
}

/// Copy the contents of `from` into `to`.
///
/// # Safety
/// The frames must differ and no live mutable reference may point into either.
pub unsafe fn copy_frame<M: PhysMapper + ?Sized>(mapper: &M, from: PhysicalFrame, to: PhysicalFrame) {
    debug_assert_ne!(from, to);
    let source: &PageFrame = unsafe { mapper.phys_to_mut(from.base()) };
    let target: &mut PageFrame = unsafe { mapper.phys_to_mut(to.base()) };
    target.0.copy_from_slice(&source.0);
}
