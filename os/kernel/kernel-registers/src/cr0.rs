use bitfield_struct::bitfield;

/// Architectural model of CR0 in 32-bit protected mode.
///
/// Reserved bits are private. They start at 0 in [`Cr0::new`] and keep the
/// value read from the register, so a read-modify-write preserves them.
#[bitfield(u32)]
pub struct Cr0 {
    /// Bit 0: Protection Enable (PE). Must be set before paging.
    pub pe_protection_enable: bool,

    /// Bit 1: Monitor Coprocessor (MP).
    pub mp_monitor_coprocessor: bool,

    /// Bit 2: Emulation (EM). x87 instructions fault when set.
    pub em_emulation: bool,

    /// Bit 3: Task Switched (TS).
    pub ts_task_switched: bool,

    /// Bit 4: Extension Type (ET). Hardwired to 1 on modern CPUs.
    pub et_extension_type: bool,

    /// Bit 5: Numeric Error (NE).
    pub ne_numeric_error: bool,

    #[bits(10, default = 0)]
    _reserved_6_15: u16,

    /// Bit 16: Write Protect (WP).
    ///
    /// When set, supervisor code honours read-only pages.
    pub wp_write_protect: bool,

    #[bits(default = 0)]
    _reserved_17: bool,

    /// Bit 18: Alignment Mask (AM).
    pub am_alignment_mask: bool,

    #[bits(10, default = 0)]
    _reserved_19_28: u16,

    /// Bit 29: Not-Write-Through (NW).
    pub nw_not_write_through: bool,

    /// Bit 30: Cache Disable (CD).
    pub cd_cache_disable: bool,

    /// Bit 31: Paging (PG).
    ///
    /// - 0: linear addresses are physical addresses.
    /// - 1: linear addresses are translated through CR3 (requires PE=1).
    pub pg_paging: bool,
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let mut cr0: u32;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_the_top_bit() {
        let cr0 = Cr0::new().with_pe_protection_enable(true).with_pg_paging(true);
        assert_eq!(cr0.into_bits(), 0x8000_0001);
    }

    #[test]
    fn reserved_bits_survive_a_round_trip() {
        const RESERVED: u32 = 0x1FFA_FFC0;
        assert_eq!(Cr0::new().into_bits(), 0);

        let cr0 = Cr0::from_bits(0xFFFF_FFFF);
        assert_eq!(cr0.into_bits(), 0xFFFF_FFFF);
        assert!(cr0.pg_paging());
        assert!(cr0.wp_write_protect());

        let cleared = cr0.with_pg_paging(false);
        assert_eq!(cleared.into_bits() & RESERVED, RESERVED);
        assert_eq!(cleared.into_bits(), 0x7FFF_FFFF);
    }
}
