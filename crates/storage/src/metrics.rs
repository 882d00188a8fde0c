//! Latency percentile tracking shared by the metrics collectors.
//!
//! Percentiles (p50, p95, p99) are computed from a bounded sliding window of
//! recent samples. Each [`LatencyHistogram`] is a circular buffer of the most
//! recent latency values in microseconds, protected by a
//! [`parking_lot::Mutex`] held only for a single push.
//!
//! Percentiles are computed at snapshot time by sorting a copy of the
//! buffer, which keeps the recording path O(1).

use parking_lot::Mutex;

/// Default number of latency samples retained per histogram.
pub(crate) const DEFAULT_HISTOGRAM_WINDOW_SIZE: usize = 1024;

/// Latency percentiles for a single operation type, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// 50th percentile (median) latency in microseconds.
    pub p50: u64,
    /// 95th percentile latency in microseconds.
    pub p95: u64,
    /// 99th percentile latency in microseconds.
    pub p99: u64,
}

/// Fixed-size circular buffer of latency samples.
#[derive(Debug)]
pub(crate) struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

#[derive(Debug)]
struct HistogramInner {
    buf: Vec<u64>,
    pos: usize,
    capacity: usize,
}

impl LatencyHistogram {
    /// Creates a new histogram with the given window size.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { inner: Mutex::new(HistogramInner { buf: Vec::with_capacity(capacity), pos: 0, capacity }) }
    }

    /// Records a latency sample in microseconds.
    pub(crate) fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % inner.capacity;
    }

    /// Computes p50, p95, p99 percentiles from the current buffer contents.
    ///
    /// Returns all zeros if no samples have been recorded.
    pub(crate) fn percentiles(&self) -> LatencyPercentiles {
        let inner = self.inner.lock();
        if inner.buf.is_empty() {
            return LatencyPercentiles::default();
        }
        let mut sorted = inner.buf.clone();
        sorted.sort_unstable();
        let len = sorted.len();
        LatencyPercentiles {
            p50: sorted[percentile_index(len, 50)],
            p95: sorted[percentile_index(len, 95)],
            p99: sorted[percentile_index(len, 99)],
        }
    }

    /// Discards all samples.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.buf.clear();
        inner.pos = 0;
    }
}

/// Nearest-rank index: `ceil(percentile/100 * len) - 1`, clamped to range.
fn percentile_index(len: usize, percentile: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (u64::from(percentile) * len as u64).div_ceil(100) as usize;
    rank.saturating_sub(1).min(len - 1)
}
