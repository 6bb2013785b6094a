use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalFrame};

/// A single 32-bit IA-32 paging entry in its raw bitfield form.
///
/// The same layout serves page-table entries (PTEs) and page-directory
/// entries (PDEs); the few bits whose meaning differs between the two are
/// documented on the field.
///
/// ### Bit layout
///
/// | Bits   | Name / Mnemonic | Meaning |
/// |--------|-----------------|---------|
/// | 0      | `P`             | Valid entry if set |
/// | 1      | `RW`            | Writable if set |
/// | 2      | `US`            | User-mode accessible if set |
/// | 3      | `PWT`           | Write-through caching |
/// | 4      | `PCD`           | Disable caching |
/// | 5      | `A`             | Accessed |
/// | 6      | `D`             | Dirty (leaf only) |
/// | 7      | `PS` / `PAT`    | 4 MiB page in a PDE, PAT selector in a PTE |
/// | 8      | `G`             | Global (leaf only) |
/// | 9      | avail           | Copy-on-write marker |
/// | 10     | avail           | Swapped-out marker |
/// | 11     | avail           | Free marker |
/// | 12–31  | `addr`          | Physical frame number |
///
/// ### Notes
/// - A 4 MiB directory leaf keeps its base in bits 22–31; bits 12–21 must be
///   zero (no PSE-36).
/// - A non-present entry is never interpreted as a frame pointer. The value
///   `2` (writable, not present) marks a removed mapping.
/// - The three avail bits are named but no code assigns them a protocol.
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_vmem::PageEntryBits;
/// let mut e = PageEntryBits::new();
/// e.set_present(true);
/// e.set_writable(true);
/// e.set_physical_address(PhysicalAddress::new(0x12345));
/// assert_eq!(e.into_bits(), 0x0001_2003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a page table or maps a page.
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Clear for read-only. Supervisor writes honour this only with CR0.WP.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// A user access needs this bit in both the directory and the table entry.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), leaf only. Set by the CPU on first write.
    pub dirty: bool,

    /// Page Size (PS, bit 7) in a directory entry; PAT in a table entry.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    ///
    /// Survives CR3 reloads when CR4.PGE is enabled.
    pub global_translation: bool,

    /// OS-available bit 9: copy-on-write.
    pub os_copy_on_write: bool,

    /// OS-available bit 10: swapped out.
    pub os_swapped: bool,

    /// OS-available bit 11: free.
    pub os_free: bool,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_number: u32,
}

impl PageEntryBits {
    /// Entry value of a removed mapping: writable, not present.
    pub const TOMBSTONE: Self = Self::new().with_writable(true);

    /// Physical base address stored in the entry.
    #[inline]
    #[must_use]
    pub const fn physical_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame_number() << 12)
    }

    /// Store the frame containing `pa`; the low 12 bits are dropped.
    #[inline]
    pub const fn set_physical_address(&mut self, pa: PhysicalAddress) {
        self.set_frame_number(pa.frame_number());
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_address(mut self, pa: PhysicalAddress) -> Self {
        self.set_physical_address(pa);
        self
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalFrame {
        PhysicalFrame::from_number(self.frame_number())
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: PhysicalFrame) -> Self {
        self.with_frame_number(frame.number())
    }

    /// The flags without the address part.
    #[inline]
    #[must_use]
    pub const fn flags_only(self) -> Self {
        self.with_frame_number(0)
    }

    /// Kernel read/write data.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Kernel read-only data or code.
    #[inline]
    #[must_use]
    pub const fn new_kernel_ro() -> Self {
        Self::new().with_present(true)
    }

    /// User read/write data.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new_kernel_rw().with_user_access(true)
    }

    /// User read-only data or code.
    #[inline]
    #[must_use]
    pub const fn new_user_ro() -> Self {
        Self::new_kernel_ro().with_user_access(true)
    }

    /// Device memory: kernel read/write, caching disabled.
    #[inline]
    #[must_use]
    pub const fn new_mmio() -> Self {
        Self::new_kernel_rw()
            .with_cache_disabled(true)
            .with_write_through(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_land_where_the_cpu_expects_them() {
        assert_eq!(PageEntryBits::new().with_present(true).into_bits(), 1 << 0);
        assert_eq!(PageEntryBits::new().with_user_access(true).into_bits(), 1 << 2);
        assert_eq!(PageEntryBits::new().with_large_page(true).into_bits(), 1 << 7);
        assert_eq!(PageEntryBits::new().with_global_translation(true).into_bits(), 1 << 8);
        assert_eq!(PageEntryBits::new().with_os_copy_on_write(true).into_bits(), 1 << 9);
        assert_eq!(PageEntryBits::new().with_os_swapped(true).into_bits(), 1 << 10);
        assert_eq!(PageEntryBits::new().with_os_free(true).into_bits(), 1 << 11);
    }

    #[test]
    fn tombstone_is_writable_not_present() {
        assert_eq!(PageEntryBits::TOMBSTONE.into_bits(), 2);
        assert!(!PageEntryBits::TOMBSTONE.present());
    }

    #[test]
    fn address_round_trip_drops_offset() {
        let e = PageEntryBits::new_user_rw().with_physical_address(PhysicalAddress::new(0xFFFF_FABC));
        assert_eq!(e.physical_address(), PhysicalAddress::new(0xFFFF_F000));
        assert_eq!(e.frame().number(), 0xFFFFF);
        assert_eq!(e.flags_only(), PageEntryBits::new_user_rw());
    }
}
