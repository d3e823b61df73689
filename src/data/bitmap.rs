//! Fixed-length bitmap with rank support.
//!
//! Used by the bitmap reference delegate: the rank of a set bit is the
//! position of its reference in the compacted backing array.

/// A fixed-length bitmap over `len` bits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    /// Creates an empty bitmap with `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; Self::words_for(len)],
            len,
        }
    }

    /// Number of 64-bit words needed for `len` bits.
    #[inline]
    pub const fn words_for(len: usize) -> usize {
        len.div_ceil(64)
    }

    /// Rebuilds a bitmap from raw words.
    ///
    /// Returns `None` if the word count does not match `len` or if a bit
    /// beyond `len` is set.
    pub fn from_words(words: Vec<u64>, len: usize) -> Option<Self> {
        if words.len() != Self::words_for(len) {
            return None;
        }
        let tail = len % 64;
        if tail != 0 {
            let last = *words.last()?;
            if last >> tail != 0 {
                return None;
            }
        }
        Some(Self { words, len })
    }

    /// Number of bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true for a zero-length bitmap.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw words, least significant bit first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Returns the bit at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Sets the bit at `index`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clears the bit at `index`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of set bits strictly below `index`.
    pub fn rank(&self, index: usize) -> usize {
        debug_assert!(index <= self.len);
        let word = index / 64;
        let full: usize = self.words[..word].iter().map(|w| w.count_ones() as usize).sum();
        let bit = index % 64;
        if bit == 0 {
            full
        } else {
            full + (self.words[word] & ((1u64 << bit) - 1)).count_ones() as usize
        }
    }

    /// Iterates over set bit indices in ascending order.
    pub fn iter_ones(&self) -> OnesIter<'_> {
        OnesIter {
            bitmap: self,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

/// Iterator over set bits of a [`Bitmap`].
pub struct OnesIter<'a> {
    bitmap: &'a Bitmap,
    word_idx: usize,
    current: u64,
}

impl<'a> Iterator for OnesIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            if self.word_idx >= self.bitmap.words.len() {
                return None;
            }
            self.current = self.bitmap.words[self.word_idx];
        }
    }
}
