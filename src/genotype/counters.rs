//! Count accumulators used by genotypes and the statistics pass

use serde::{Deserialize, Serialize};

/// A counter with a current interval, the previous interval and a lifetime total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalCount {
    current: u64,
    last: u64,
    total: u64,
}

impl IntervalCount {
    pub fn inc(&mut self) {
        self.add(1);
    }

    pub fn add(&mut self, n: u64) {
        self.current += n;
        self.total += n;
    }

    /// Roll the interval: current becomes last, current restarts at zero
    pub fn update_reset(&mut self) {
        self.last = self.current;
        self.current = 0;
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn last(&self) -> u64 {
        self.last
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Weighted running sums supporting mean, variance, standard error and skew
///
/// Samples are folded into power sums, so the accumulator is O(1) in space
/// regardless of how many values it has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    weight: f64,
    s1: f64,
    s2: f64,
    s3: f64,
    last: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1.0);
    }

    pub fn add_weighted(&mut self, value: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.weight += weight;
        self.s1 += value * weight;
        self.s2 += value * value * weight;
        self.s3 += value * value * value * weight;
        self.last = value;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Total weight of all samples (the sample count when unweighted)
    pub fn count(&self) -> f64 {
        self.weight
    }

    /// Most recently added value
    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn sum(&self) -> f64 {
        self.s1
    }

    pub fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.s1 / self.weight
        } else {
            0.0
        }
    }

    /// Sample variance (n - 1 denominator); zero with fewer than two samples
    pub fn variance(&self) -> f64 {
        if self.weight <= 1.0 {
            return 0.0;
        }
        let var = (self.s2 - self.s1 * self.s1 / self.weight) / (self.weight - 1.0);
        var.max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn std_error(&self) -> f64 {
        if self.weight <= 1.0 {
            return 0.0;
        }
        (self.variance() / self.weight).sqrt()
    }

    /// Population skewness; zero when the distribution has no spread
    pub fn skewness(&self) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let n = self.weight;
        let mean = self.mean();
        let pop_var = (self.s2 / n - mean * mean).max(0.0);
        if pop_var <= f64::EPSILON {
            return 0.0;
        }
        let m3 = self.s3 / n - 3.0 * mean * self.s2 / n + 2.0 * mean * mean * mean;
        m3 / pop_var.powf(1.5)
    }
}

/// Mean, variance and standard error of one statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub variance: f64,
    pub std_error: f64,
}

impl From<&RunningStats> for Moments {
    fn from(stats: &RunningStats) -> Self {
        Self {
            mean: stats.mean(),
            variance: stats.variance(),
            std_error: stats.std_error(),
        }
    }
}
