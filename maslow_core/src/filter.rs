//! Rolling average filter keeping the last `N` samples.
//!
//! Used to denoise the motor current-sense readings. The average is biased
//! toward `0.0` until the history fills: the sum is always divided by the
//! full window size, which settles fast and avoids a division per sample.
//! Callers that care (overcurrent thresholds) account for the warm-up.

pub struct RollingAverage<const N: usize> {
    buf: [f32; N],
    sum: f32,
    index: usize,
}

impl<const N: usize> Default for RollingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RollingAverage<N> {
    const INV_N: f32 = 1.0 / N as f32;

    pub fn new() -> Self {
        const { assert!(N > 0, "window size must be > 0") };
        Self {
            buf: [0.0; N],
            sum: 0.0,
            index: 0,
        }
    }

    /// Add one sample, obtain the current average. O(1).
    pub fn update(&mut self, sample: f32) -> f32 {
        self.sum -= self.buf[self.index]; // discard oldest
        self.buf[self.index] = sample; // store newest
        self.sum += sample; // accumulate

        self.index = (self.index + 1) % N;
        self.sum * Self::INV_N // multiply is cheaper than divide
    }
}
