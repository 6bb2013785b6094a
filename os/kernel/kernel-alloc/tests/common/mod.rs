#![allow(dead_code)]

use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};
use kernel_vmem::{PagingControl, PhysMapper};
use std::cell::UnsafeCell;

pub const MIB: u64 = 1024 * 1024;

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; 4096]>);

/// Simulated RAM: frame `n` lives at physical address `n * 4096`.
pub struct SimRam {
    frames: Box<[Frame]>,
}

// Tests share the RAM between threads only behind the memory manager's lock.
unsafe impl Sync for SimRam {}

impl SimRam {
    pub fn with_bytes(bytes: u64) -> Self {
        let frames = usize::try_from(bytes / 4096).unwrap();
        Self {
            frames: (0..frames).map(|_| Frame(UnsafeCell::new([0xA5; 4096]))).collect(),
        }
    }

    fn ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let frame = &self.frames[pa.frame_number() as usize];
        unsafe { frame.0.get().cast::<u8>().add((pa.as_u32() & 0xFFF) as usize) }
    }

    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        unsafe { self.ptr(pa).cast::<u32>().read() }
    }

    pub fn write_u32(&self, pa: PhysicalAddress, value: u32) {
        unsafe { self.ptr(pa).cast::<u32>().write(value) }
    }

    pub fn is_zeroed(&self, frame: PhysicalFrame) -> bool {
        (0..1024).all(|i| self.read_u32(frame.base() + i * 4) == 0)
    }
}

impl PhysMapper for SimRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        unsafe { &mut *self.ptr(pa).cast::<T>() }
    }
}

/// Records what would have been written to CR3 and CR0.
#[derive(Debug, Default)]
pub struct RecordingMmu {
    pub directory: Option<PhysicalFrame>,
    pub paging: bool,
}

impl PagingControl for RecordingMmu {
    fn load_directory(&mut self, directory: PhysicalFrame) {
        self.directory = Some(directory);
    }

    fn enable_paging(&mut self) {
        assert!(self.directory.is_some(), "paging enabled without a directory");
        self.paging = true;
    }

    fn paging_enabled(&self) -> bool {
        self.paging
    }
}
