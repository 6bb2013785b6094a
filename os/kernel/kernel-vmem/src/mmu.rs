//! # MMU Control
//!
//! The paging switch and TLB maintenance. The hardware path only exists on
//! `target_arch = "x86"`; elsewhere [`flush_tlb_page`] compiles to nothing so
//! the page-table code runs unchanged on a host.

use kernel_memory_addresses::{PhysicalFrame, VirtualAddress};

/// The operations that switch a CPU onto a page directory.
///
/// [`HardwareMmu`] drives the real registers; tests substitute a recording
/// implementation.
pub trait PagingControl {
    /// Load the directory in `directory` into CR3.
    fn load_directory(&mut self, directory: PhysicalFrame);

    /// Set CR0.PG.
    fn enable_paging(&mut self);

    /// Whether CR0.PG is set.
    fn paging_enabled(&self) -> bool;
}

/// The CPU's own control registers.
#[cfg(target_arch = "x86")]
pub struct HardwareMmu {
    _private: (),
}

#[cfg(target_arch = "x86")]
impl HardwareMmu {
    /// # Safety
    /// Must run at CPL0 in protected mode. Enabling paging through this handle
    /// requires the loaded directory to map the executing code.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "x86")]
impl PagingControl for HardwareMmu {
    fn load_directory(&mut self, directory: PhysicalFrame) {
        use kernel_registers::StoreRegisterUnsafe;
        use kernel_registers::cr3::Cr3;
        unsafe { Cr3::from_directory(directory).store_unsafe() }
    }

    fn enable_paging(&mut self) {
        use kernel_registers::cr0::Cr0;
        use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};
        unsafe {
            let cr0 = Cr0::load_unsafe().with_pg_paging(true);
            cr0.store_unsafe();
        }
    }

    fn paging_enabled(&self) -> bool {
        use kernel_registers::LoadRegisterUnsafe;
        use kernel_registers::cr0::Cr0;
        unsafe { Cr0::load_unsafe().pg_paging() }
    }
}

/// Invalidate the TLB entry for the page containing `va`.
#[inline]
pub fn flush_tlb_page(va: VirtualAddress) {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
    }

    #[cfg(not(all(target_arch = "x86", target_os = "none")))]
    let _ = va;
}
