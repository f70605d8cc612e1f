//! Streaming accumulators used by the evaluation engine.

/// Running mean and population standard deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    sum: f64,
    sum_sq: f64,
    count: u64,
}

impl RunningStats {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation, 0.0 below two observations.
    pub fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let variance = (self.sum_sq / n) - (mean * mean);
        // Cancellation can push a zero variance slightly negative.
        variance.max(0.0).sqrt()
    }
}

/// Ordinary least-squares fit of `y = a + b·x`, accumulated point by point.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFit {
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
    count: u64,
}

impl LinearFit {
    /// Empty fit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one point.
    pub fn add(&mut self, x: f64, y: f64) {
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_xy += x * y;
        self.count += 1;
    }

    /// Slope `b`. Zero with fewer than two points or no spread in `x`.
    pub fn slope(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let denom = n * self.sum_xx - self.sum_x * self.sum_x;
        if denom.abs() <= f64::EPSILON * n * self.sum_xx.abs().max(1.0) {
            return 0.0;
        }
        (n * self.sum_xy - self.sum_x * self.sum_y) / denom
    }
}
