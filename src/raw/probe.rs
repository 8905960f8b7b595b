// The bucket a key hashes to for a table of the given length.
//
// This depends only on the hash and the length, never on the contents of the
// table, so a bucket computed before a lookup stays valid for the whole scan.
#[inline]
pub fn bucket(hash: u64, len: usize) -> usize {
    debug_assert!(len > 0);
    (hash % len as u64) as usize
}

// A linear probe sequence.
//
// Starting from the home bucket, the sequence visits every slot of the table
// exactly once, wrapping around at the end.
pub struct Probe {
    // The current index in the probe sequence.
    pub i: usize,
    // The number of slots visited so far.
    pub len: usize,
    // The length of the table.
    limit: usize,
}

impl Probe {
    // Initialize the probe sequence at the home bucket of `hash`.
    #[inline]
    pub fn start(hash: u64, len: usize) -> Probe {
        Probe {
            i: bucket(hash, len),
            len: 0,
            limit: len,
        }
    }

    // Returns `true` if the sequence has not yet wrapped through the whole table.
    #[inline]
    pub fn remaining(&self) -> bool {
        self.len < self.limit
    }

    // Increment the probe sequence.
    #[inline]
    pub fn next(&mut self) {
        self.len += 1;
        self.i += 1;

        if self.i == self.limit {
            self.i = 0;
        }
    }
}
