//! # Physical Memory Map
//!
//! Region descriptors as handed over by the loader. The numbering follows the
//! multiboot memory map (`1..=5`), extended by the kernel's own tags for
//! regions it carves out during boot.

use core::fmt;

/// Type of a physical memory region.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryRegionType {
    /// RAM available for general use.
    Free,
    /// Reserved by firmware or hardware.
    Reserved,
    /// ACPI tables; usable once they have been parsed.
    AcpiReclaimable,
    /// ACPI non-volatile storage; must be preserved.
    AcpiNvs,
    /// Defective RAM.
    BadMemory,
    /// Disabled by firmware.
    Disabled,
    /// Consumed by an early boot stage, e.g. the bootstrap allocator.
    NonFree,
    /// The Boot Info Page itself.
    BootInfo,
    /// Any tag this kernel does not know.
    Unknown(u32),
}

impl MemoryRegionType {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Free,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            6 => Self::Disabled,
            99 => Self::NonFree,
            111 => Self::BootInfo,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Free => 1,
            Self::Reserved => 2,
            Self::AcpiReclaimable => 3,
            Self::AcpiNvs => 4,
            Self::BadMemory => 5,
            Self::Disabled => 6,
            Self::NonFree => 99,
            Self::BootInfo => 111,
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether the frame allocator may hand out frames from this region.
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }

    /// Whether the region holds RAM that can eventually be used,
    /// i.e. free memory or reclaimable ACPI tables.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Free | Self::AcpiReclaimable)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Reserved => "reserved",
            Self::AcpiReclaimable => "acpi_reclaimable",
            Self::AcpiNvs => "acpi_nvs",
            Self::BadMemory => "bad_memory",
            Self::Disabled => "disabled",
            Self::NonFree => "non_free",
            Self::BootInfo => "bootinfo",
            Self::Unknown(_) => "<unknown>",
        }
    }
}

impl fmt::Display for MemoryRegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical memory range `[base, base + length)` and its type.
///
/// Bases and lengths stay 64-bit: firmware reports memory above 4 GiB even to
/// a 32-bit kernel, and consumers decide what to ignore.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: MemoryRegionType,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionType) -> Self {
        Self { base, length, kind }
    }

    /// One past the last byte of the region.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

/// Multiboot memory-map entry in its wire format.
///
/// ```text
/// offset  size  field
///   0      4    entry_size (bytes following this field, i.e. 20)
///   4      8    base_addr
///  12      8    length
///  20      4    type
/// ```
///
/// All fields are little endian and unaligned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub entry_size: u32,
    pub base: u64,
    pub length: u64,
    pub kind: u32,
}

impl MemoryMapEntry {
    /// Size of an entry on the wire.
    pub const SIZE: usize = 24;

    /// Value of `entry_size` for a well-formed entry.
    pub const PAYLOAD_SIZE: u32 = 20;

    #[must_use]
    pub const fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            entry_size: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            base: u64::from_le_bytes([
                bytes[4], bytes[5], bytes[6], bytes[7], bytes[8], bytes[9], bytes[10], bytes[11],
            ]),
            length: u64::from_le_bytes([
                bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18],
                bytes[19],
            ]),
            kind: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.entry_size.to_le_bytes());
        out[4..12].copy_from_slice(&self.base.to_le_bytes());
        out[12..20].copy_from_slice(&self.length.to_le_bytes());
        out[20..24].copy_from_slice(&self.kind.to_le_bytes());
        out
    }

    #[must_use]
    pub const fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.base, self.length, MemoryRegionType::from_raw(self.kind))
    }
}

impl From<MemoryRegion> for MemoryMapEntry {
    fn from(region: MemoryRegion) -> Self {
        Self {
            entry_size: Self::PAYLOAD_SIZE,
            base: region.base,
            length: region.length,
            kind: region.kind.as_raw(),
        }
    }
}

const _: () = assert!(MemoryMapEntry::PAYLOAD_SIZE as usize + 4 == MemoryMapEntry::SIZE);
