/// Fixed-capacity bit set over `[0, len)`.
#[derive(Debug)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Sets `idx` and returns whether it was already set.
    #[inline]
    pub fn test_and_set(&mut self, idx: usize) -> bool {
        let (w, b) = (idx / 64, idx % 64);
        let mask = 1u64 << b;
        let was_set = self.words[w] & mask != 0;
        self.words[w] |= mask;
        was_set
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Every bit in `[0, len)` is set.
    pub fn is_full(&self) -> bool {
        self.count_ones() == self.len
    }
}
