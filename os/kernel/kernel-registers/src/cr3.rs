use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};

/// CR3, the Page-Directory Base Register (32-bit paging, no PAE).
///
/// Holds the physical frame of the active page directory and the cache
/// control flags used when the processor reads directory entries.
#[bitfield(u32)]
pub struct Cr3 {
    /// Bits 0..=2: Ignored.
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3, PWT: Page-level Write-Through for the directory.
    pub pwt: bool,

    /// Bit 4, PCD: Page-level Cache Disable for the directory.
    pub pcd: bool,

    /// Bits 5..=11: Ignored.
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12..=31: page directory physical base >> 12.
    #[bits(20)]
    directory_frame: u32,
}

impl Cr3 {
    /// Create a `Cr3` value that activates the directory in `directory`.
    #[must_use]
    pub const fn from_directory(directory: PhysicalFrame) -> Self {
        Self::new().with_directory_frame(directory.number())
    }

    /// Return the physical address of the page directory.
    #[must_use]
    pub const fn directory_phys(&self) -> PhysicalAddress {
        PhysicalFrame::from_number(self.directory_frame()).base()
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
