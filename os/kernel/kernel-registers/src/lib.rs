//! # Typed IA-32 Control Registers
//!
//! Bit-exact models of the control registers the paging layer touches:
//!
//! - [`Cr0`](cr0::Cr0): `PG` turns paging on once a directory is loaded.
//! - [`Cr3`](cr3::Cr3): physical base of the active page directory.
//!
//! The `mov crN` instructions are only emitted for `target_arch = "x86"` with
//! the `asm` feature; on every other target the types remain plain values so
//! the paging code can be exercised on a host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Control register access is privileged and requires ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every following memory access
    /// is translated.
    unsafe fn store_unsafe(self);
}
