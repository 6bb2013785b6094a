//! Host-side stand-ins for physical memory and a frame allocator.

use crate::{FrameAlloc, PageTable, PhysMapper};
use core::cell::UnsafeCell;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; PAGE_SIZE]>);

/// Simulated RAM: frame `n` lives at physical address `n * 4096`.
pub struct TestPhys {
    frames: Box<[Frame]>,
}

impl TestPhys {
    pub fn with_frames(n: usize) -> Self {
        Self {
            frames: (0..n)
                .map(|_| Frame(UnsafeCell::new([0; PAGE_SIZE])))
                .collect(),
        }
    }

    fn frame_ptr(&self, frame: PhysicalFrame) -> *mut u8 {
        self.frames[frame.number() as usize].0.get().cast()
    }

    pub fn fill(&self, frame: PhysicalFrame, byte: u8) {
        unsafe { self.frame_ptr(frame).write_bytes(byte, PAGE_SIZE) };
    }

    pub fn bytes(&self, frame: PhysicalFrame) -> [u8; PAGE_SIZE] {
        unsafe { *self.frame_ptr(frame).cast::<[u8; PAGE_SIZE]>() }
    }

    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        let frame = PhysicalFrame::from_addr(pa);
        let offset = (pa.as_u32() & 0xFFF) as usize;
        unsafe { self.frame_ptr(frame).add(offset).cast::<u32>().read() }
    }

    /// # Safety
    /// `frame` must hold a page table and no other reference to it may be live.
    pub unsafe fn table<'a>(&self, frame: PhysicalFrame) -> &'a mut PageTable {
        unsafe { self.phys_to_mut(frame.base()) }
    }
}

impl PhysMapper for TestPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let frame = PhysicalFrame::from_addr(pa);
        let offset = (pa.as_u32() & 0xFFF) as usize;
        debug_assert!(offset + size_of::<T>() <= PAGE_SIZE);
        unsafe { &mut *self.frame_ptr(frame).add(offset).cast::<T>() }
    }
}

/// Hands out frames `start..end` in order and reuses freed ones first.
pub struct BumpAlloc {
    next: u32,
    end: u32,
    freed: Vec<PhysicalFrame>,
    outstanding: usize,
}

impl BumpAlloc {
    pub const fn new(start: u32, end: u32) -> Self {
        Self {
            next: start,
            end,
            freed: Vec::new(),
            outstanding: 0,
        }
    }

    /// Frames handed out and not yet returned.
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl FrameAlloc for BumpAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalFrame> {
        let frame = if let Some(frame) = self.freed.pop() {
            frame
        } else if self.next < self.end {
            self.next += 1;
            PhysicalFrame::from_number(self.next - 1)
        } else {
            return None;
        };
        self.outstanding += 1;
        Some(frame)
    }

    fn free_4k(&mut self, frame: PhysicalFrame) {
        assert!(!self.freed.contains(&frame), "double free of {frame}");
        self.outstanding -= 1;
        self.freed.push(frame);
    }
}
