//! Resource metrics.
//!
//! Counters are scoped to one open [`ResourceManager`](super::ResourceManager)
//! and shared by every transaction on it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Resource metrics container.
///
/// All counters are atomic for thread-safe access.
#[derive(Debug, Default)]
pub struct DbMetrics {
    /// Pages loaded from storage.
    pub page_reads: AtomicU64,
    /// Pages appended to storage.
    pub page_writes: AtomicU64,
    /// Bytes loaded from storage.
    pub bytes_read: AtomicU64,
    /// Bytes appended to storage.
    pub bytes_written: AtomicU64,
    /// Page cache hits.
    pub cache_hits: AtomicU64,
    /// Page cache misses.
    pub cache_misses: AtomicU64,
    /// Committed pages copied into an intent log.
    pub cow_copies: AtomicU64,
    /// Successful commits.
    pub commits: AtomicU64,
    /// Aborted write transactions.
    pub aborts: AtomicU64,
    /// Commits that failed and were rolled back.
    pub failed_commits: AtomicU64,
    /// Read transactions opened.
    pub read_trxs: AtomicU64,
    /// Write transactions opened.
    pub write_trxs: AtomicU64,
}

impl DbMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_page_reads(&self) {
        self.page_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_page_writes(&self) {
        self.page_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cow_copies(&self) {
        self.cow_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_aborts(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_commits(&self) {
        self.failed_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_read_trxs(&self) {
        self.read_trxs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_trxs(&self) {
        self.write_trxs.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            page_reads: self.page_reads.load(Ordering::Relaxed),
            page_writes: self.page_writes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cow_copies: self.cow_copies.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            failed_commits: self.failed_commits.load(Ordering::Relaxed),
            read_trxs: self.read_trxs.load(Ordering::Relaxed),
            write_trxs: self.write_trxs.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        for counter in [
            &self.page_reads,
            &self.page_writes,
            &self.bytes_read,
            &self.bytes_written,
            &self.cache_hits,
            &self.cache_misses,
            &self.cow_copies,
            &self.commits,
            &self.aborts,
            &self.failed_commits,
            &self.read_trxs,
            &self.write_trxs,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub page_reads: u64,
    pub page_writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cow_copies: u64,
    pub commits: u64,
    pub aborts: u64,
    pub failed_commits: u64,
    pub read_trxs: u64,
    pub write_trxs: u64,
}

impl MetricsSnapshot {
    /// Calculates the difference between two snapshots.
    pub fn diff(&self, other: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            page_reads: self.page_reads.saturating_sub(other.page_reads),
            page_writes: self.page_writes.saturating_sub(other.page_writes),
            bytes_read: self.bytes_read.saturating_sub(other.bytes_read),
            bytes_written: self.bytes_written.saturating_sub(other.bytes_written),
            cache_hits: self.cache_hits.saturating_sub(other.cache_hits),
            cache_misses: self.cache_misses.saturating_sub(other.cache_misses),
            cow_copies: self.cow_copies.saturating_sub(other.cow_copies),
            commits: self.commits.saturating_sub(other.commits),
            aborts: self.aborts.saturating_sub(other.aborts),
            failed_commits: self.failed_commits.saturating_sub(other.failed_commits),
            read_trxs: self.read_trxs.saturating_sub(other.read_trxs),
            write_trxs: self.write_trxs.saturating_sub(other.write_trxs),
        }
    }

    /// Returns the page cache hit rate (0.0 - 1.0).
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Returns the average bytes per page write.
    pub fn avg_bytes_per_write(&self) -> f64 {
        if self.page_writes == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.page_writes as f64
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Resource Metrics:")?;
        writeln!(f, "  Page reads:       {}", self.page_reads)?;
        writeln!(f, "  Page writes:      {} ({:.1} B avg)", self.page_writes, self.avg_bytes_per_write())?;
        writeln!(f, "  Cache hits:       {} ({:.1}%)", self.cache_hits, self.cache_hit_rate() * 100.0)?;
        writeln!(f, "  Cache misses:     {}", self.cache_misses)?;
        writeln!(f, "  CoW copies:       {}", self.cow_copies)?;
        writeln!(f, "  Commits:          {}", self.commits)?;
        writeln!(f, "  Failed commits:   {}", self.failed_commits)?;
        writeln!(f, "  Aborts:           {}", self.aborts)?;
        writeln!(f, "  Read trxs:        {}", self.read_trxs)?;
        writeln!(f, "  Write trxs:       {}", self.write_trxs)?;
        writeln!(f, "  Bytes written:    {} ({:.2} KB)", self.bytes_written, self.bytes_written as f64 / 1024.0)?;
        writeln!(f, "  Bytes read:       {} ({:.2} KB)", self.bytes_read, self.bytes_read as f64 / 1024.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = DbMetrics::new();

        metrics.inc_page_writes();
        metrics.inc_page_writes();
        metrics.inc_cow_copies();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.page_writes, 2);
        assert_eq!(snapshot.cow_copies, 1);
    }

    #[test]
    fn test_metrics_snapshot_diff() {
        let metrics = DbMetrics::new();

        metrics.inc_cache_misses();
        let before = metrics.snapshot();

        metrics.inc_cache_hits();
        metrics.inc_cache_hits();
        metrics.inc_cache_misses();
        let diff = metrics.snapshot().diff(&before);

        assert_eq!(diff.cache_hits, 2);
        assert_eq!(diff.cache_misses, 1);
    }

    #[test]
    fn test_cache_hit_rate() {
        let snapshot = MetricsSnapshot {
            cache_hits: 30,
            cache_misses: 10,
            ..Default::default()
        };
        assert!((snapshot.cache_hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(MetricsSnapshot::default().cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = DbMetrics::new();

        metrics.inc_commits();
        metrics.add_bytes_written(512);

        metrics.reset();

        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_display() {
        let snapshot = MetricsSnapshot {
            commits: 3,
            ..Default::default()
        };
        assert!(snapshot.to_string().contains("Commits:          3"));
    }
}
