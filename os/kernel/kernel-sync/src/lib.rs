//! # Kernel synchronization primitives
//!
//! A single spin lock. The memory manager keeps its frame allocator and the
//! kernel page directory behind one [`SpinLock`] so that allocation and
//! mapping happen atomically.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
