//! # Memory Page Table
//!
//! The two IA-32 paging levels:
//!
//! - [`pd`]: the page directory, indexed by VA bits `[31:22]`.
//! - [`pt`]: the page table, indexed by VA bits `[21:12]`.

pub mod pd;
pub mod pt;

use crate::page_table::pd::L2Index;
use crate::page_table::pt::L1Index;
use kernel_memory_addresses::VirtualAddress;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (L2Index, L1Index) {
    (L2Index::from(va), L1Index::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_ok() {
        let (i2, i1) = split_indices(VirtualAddress::new(0xC012_3456));
        assert_eq!(i2.as_usize(), 0x300);
        assert_eq!(i1.as_usize(), 0x123);
    }
}
