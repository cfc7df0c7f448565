//! Helpers for collecting engine statistics.

use std::collections::BTreeMap;
use std::fmt;

use bitvec::prelude::*;
use itertools::Itertools;

/// Counters for the whole engine, plus per-offset usage data.
#[derive(Default)]
pub struct EngineStats {
    /// Prefetches accepted by the host.
    pub pf_issued: u64,

    /// Useful prefetches observed through demand hits (and, when enabled,
    /// mid-flight MSHR matches).
    pub pf_useful: u64,

    /// Prefetches the host refused.
    pub pf_rejected: u64,

    /// Candidates dropped before reaching the host.
    pub dropped_page: u64,
    pub dropped_queue: u64,
    pub dropped_accuracy: u64,
    pub dropped_suppressed: u64,

    /// Learning phases that installed an offset.
    pub phases_committed: u64,

    /// Learning phases abandoned at termination.
    pub phases_abandoned: u64,

    /// Accesses the coverage gate kept out of learning, and how many of
    /// those the leakage valve let back in.
    pub overlap_skips: u64,
    pub overlap_leaks: u64,

    /// Recent-prefetch steering outcomes.
    pub rp_hits: u64,
    pub rp_misses: u64,

    /// Per-offset usage data, keyed by offset value.
    pub offsets: BTreeMap<i64, OffsetData>,
}
impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_mut(&mut self, offset: i64) -> &mut OffsetData {
        self.offsets.entry(offset).or_default()
    }

    /// Clear the usage data for an offset that was just relearned.
    pub fn clear_offset(&mut self, offset: i64) {
        self.offsets.remove(&offset);
    }

    /// Offsets ordered by how many prefetches they produced.
    pub fn offsets_by_usage(&self) -> Vec<(i64, &OffsetData)> {
        self.offsets
            .iter()
            .sorted_by_key(|(_, d)| std::cmp::Reverse(d.issued))
            .map(|(off, d)| (*off, d))
            .collect()
    }
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "issued:    {}", self.pf_issued)?;
        writeln!(f, "useful:    {}", self.pf_useful)?;
        writeln!(f, "rejected:  {}", self.pf_rejected)?;
        writeln!(
            f,
            "dropped:   page={} queue={} accuracy={} suppressed={}",
            self.dropped_page, self.dropped_queue, self.dropped_accuracy,
            self.dropped_suppressed
        )?;
        writeln!(
            f,
            "phases:    committed={} abandoned={}",
            self.phases_committed, self.phases_abandoned
        )?;
        writeln!(
            f,
            "overlap:   skipped={} leaked={}  rp: hits={} misses={}",
            self.overlap_skips, self.overlap_leaks, self.rp_hits, self.rp_misses
        )?;
        for (offset, data) in self.offsets_by_usage() {
            writeln!(
                f,
                "  offset {:>4}: issued={} useful={} accuracy={:.2}{}",
                offset,
                data.issued,
                data.useful,
                data.accuracy(),
                if data.accuracy_log.is_empty() {
                    String::new()
                } else {
                    format!(" log={:?}", data.accuracy_log)
                }
            )?;
        }
        Ok(())
    }
}

/// Usage data for one learned offset.
#[derive(Default)]
pub struct OffsetData {
    /// Prefetches this offset produced that the host accepted.
    pub issued: u64,

    /// Demand hits attributed back to this offset.
    pub useful: u64,

    /// One bit per bookkeeping epoch: whether the offset stayed above the
    /// suppression threshold that epoch.
    pub pat: BitVec,

    /// Accuracy sampled at each bookkeeping epoch.
    pub accuracy_log: Vec<f64>,
}
impl OffsetData {
    pub fn accuracy(&self) -> f64 {
        if self.issued == 0 {
            return 0.0;
        }
        self.useful as f64 / self.issued as f64
    }
}
