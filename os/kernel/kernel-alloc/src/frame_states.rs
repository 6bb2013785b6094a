//! # Frame State Map
//!
//! Two bits per frame over a fixed physical range starting at address 0.
//! The stack allocator keeps its free list inside the free frames themselves;
//! this map is what lets it tell an allocated frame from a free, reserved or
//! unknown one in O(1).
//!
//! ```text
//! word n:  | f(16n+15) | ... | f(16n+1) | f(16n) |
//!          | 31    30  |     | 3     2  | 1    0 |
//! ```

use kernel_memory_addresses::PhysicalFrame;

/// What the allocator knows about one frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum FrameState {
    /// Not described by the memory map, or outside the tracked range.
    Untracked = 0,
    /// On the free stack.
    Free = 1,
    /// Handed out.
    Allocated = 2,
    /// Covered by a non-free region.
    Reserved = 3,
}

impl FrameState {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => Self::Free,
            2 => Self::Allocated,
            3 => Self::Reserved,
            _ => Self::Untracked,
        }
    }
}

const STATES_PER_WORD: usize = 16;

/// State of every frame below `WORDS * 16 * 4 KiB`.
pub struct FrameStates<const WORDS: usize> {
    words: [u32; WORDS],
}

impl<const WORDS: usize> FrameStates<WORDS> {
    /// Number of frames covered.
    pub const FRAMES: usize = WORDS * STATES_PER_WORD;

    /// Every frame [`FrameState::Untracked`].
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Whether `frame` lies in the covered range.
    #[inline]
    #[must_use]
    pub const fn covers(frame: PhysicalFrame) -> bool {
        (frame.number() as usize) < Self::FRAMES
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, frame: PhysicalFrame) -> FrameState {
        if !Self::covers(frame) {
            return FrameState::Untracked;
        }
        let (word, shift) = Self::position(frame);
        FrameState::from_bits(self.words[word] >> shift)
    }

    /// # Panics
    /// If `frame` lies outside the covered range.
    #[inline]
    pub fn set(&mut self, frame: PhysicalFrame, state: FrameState) {
        assert!(Self::covers(frame), "frame {frame} outside the tracked range");
        let (word, shift) = Self::position(frame);
        self.words[word] = (self.words[word] & !(0b11 << shift)) | ((state as u32) << shift);
    }

    /// Number of frames in `state`.
    #[must_use]
    pub fn count(&self, state: FrameState) -> usize {
        self.words
            .iter()
            .map(|&word| {
                (0..STATES_PER_WORD)
                    .filter(|i| FrameState::from_bits(word >> (i * 2)) == state)
                    .count()
            })
            .sum()
    }

    const fn position(frame: PhysicalFrame) -> (usize, usize) {
        let n = frame.number() as usize;
        (n / STATES_PER_WORD, (n % STATES_PER_WORD) * 2)
    }
}

impl<const WORDS: usize> Default for FrameStates<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_independent_per_frame() {
        let mut states = FrameStates::<2>::new();
        let a = PhysicalFrame::from_number(15);
        let b = PhysicalFrame::from_number(16);

        states.set(a, FrameState::Reserved);
        states.set(b, FrameState::Allocated);
        assert_eq!(states.get(a), FrameState::Reserved);
        assert_eq!(states.get(b), FrameState::Allocated);
        assert_eq!(states.get(PhysicalFrame::from_number(14)), FrameState::Untracked);

        states.set(a, FrameState::Free);
        assert_eq!(states.get(a), FrameState::Free);
        assert_eq!(states.get(b), FrameState::Allocated);
        assert_eq!(states.count(FrameState::Untracked), 30);
    }

    #[test]
    fn frames_beyond_the_range_are_untracked() {
        let states = FrameStates::<1>::new();
        assert_eq!(FrameStates::<1>::FRAMES, 16);
        assert!(!FrameStates::<1>::covers(PhysicalFrame::from_number(16)));
        assert_eq!(states.get(PhysicalFrame::from_number(1000)), FrameState::Untracked);
    }

    #[test]
    #[should_panic(expected = "outside the tracked range")]
    fn setting_beyond_the_range_panics() {
        FrameStates::<1>::new().set(PhysicalFrame::from_number(16), FrameState::Free);
    }
}
