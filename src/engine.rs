//! The best-offset engine: trigger filtering, prefetch issue, and the
//! fill-time feedback paths.

use log::{debug, info, trace};

use crate::access::{Access, AccessKind, Fill, Geometry};
use crate::config::{BuildError, EngineConfig, FillRule};
use crate::host::CacheHost;
use crate::offsets::OffsetList;
use crate::stats::EngineStats;
use crate::table::{
    AccuracyPolicy, AccuracyTable, EvictionTable, HoldingTable, RecentPrefetches,
    RrBank, RrTable,
};
use std::collections::BTreeSet;

/// Metadata value stamped on prefetches issued by this engine, so a fill
/// can be recognized as a prefetch originated by this cache level. The
/// host ABI reserves the value; it is surfaced here as a named constant.
pub const PREFETCH_ORIGINATED_THIS_LEVEL: u32 = 2;

/// One best-offset prefetcher instance, owned by exactly one cache.
pub struct Engine {
    pub(crate) cfg: EngineConfig,
    pub(crate) geom: Geometry,

    /// Candidate sweep state.
    pub(crate) offsets: OffsetList,
    pub(crate) round: u32,
    pub(crate) best_score: u8,
    pub(crate) phase_best_offset: i64,

    /// Learned slots. 0 marks an unused slot and is never a prefetch source.
    pub(crate) learned: Vec<i64>,
    pub(crate) learning_slot: usize,

    /// Cleared when a single-offset phase fails its score threshold.
    pub(crate) issue_enabled: bool,

    pub(crate) rr: RrTable,
    pub(crate) holding: Option<HoldingTable>,
    pub(crate) accuracy: Option<AccuracyTable>,
    pub(crate) eviction: Option<EvictionTable>,
    pub(crate) recent: Option<RecentPrefetches>,

    /// Offsets benched by the periodic accuracy bookkeeping.
    pub(crate) suppressed: BTreeSet<i64>,
    pub(crate) cycles: u64,

    pub stats: EngineStats,
}
impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self, BuildError> {
        cfg.validate()?;
        let geom = Geometry::new(cfg.block_size, cfg.page_size);
        let offsets = OffsetList::generate(cfg.offset_list_size, cfg.negative_offsets);

        let mut learned = vec![0i64; cfg.num_offsets];
        for (slot, &off) in cfg.initial_offsets.iter().take(cfg.num_offsets).enumerate() {
            learned[slot] = off;
        }

        let rr = RrTable::new(cfg.rr_style, cfg.rr_size, cfg.tag_bits, geom);
        let holding = (cfg.holding_size > 0)
            .then(|| HoldingTable::new(cfg.holding_size, cfg.consuming_holding_lookup));
        let accuracy = (cfg.accuracy_table_size > 0).then(|| {
            AccuracyTable::new(
                cfg.accuracy_table_size,
                cfg.num_offsets,
                AccuracyPolicy {
                    acc_min: cfg.acc_min,
                    acc_max: cfg.acc_max,
                    neutral: cfg.acc_neutral,
                    increment: cfg.accuracy_increment,
                    decrement: cfg.accuracy_decrement,
                },
            )
        });
        let eviction =
            (cfg.eviction_table_size > 0).then(|| EvictionTable::new(cfg.eviction_table_size, geom));
        let recent = (cfg.recent_prefetches_size > 0)
            .then(|| RecentPrefetches::new(cfg.recent_prefetches_size));

        Ok(Self {
            geom,
            offsets,
            round: 0,
            best_score: 0,
            phase_best_offset: 0,
            learned,
            learning_slot: 0,
            issue_enabled: true,
            rr,
            holding,
            accuracy,
            eviction,
            recent,
            suppressed: BTreeSet::new(),
            cycles: 0,
            stats: EngineStats::new(),
            cfg,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn learned_offsets(&self) -> &[i64] {
        &self.learned
    }

    pub fn current_learning_slot(&self) -> usize {
        self.learning_slot
    }

    pub fn issue_enabled(&self) -> bool {
        self.issue_enabled
    }

    fn triggers_on(&self, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Load => true,
            AccessKind::Prefetch => self.cfg.trigger_on_prefetch,
            _ => false,
        }
    }

    /// Entry point for every cache access the host reports.
    ///
    /// Only loads (and prefetches, when configured) that are misses or
    /// useful prefetch hits drive the engine; everything else passes the
    /// metadata through untouched.
    pub fn on_access(&mut self, host: &mut dyn CacheHost, a: Access) -> u32 {
        if !self.triggers_on(a.kind) {
            return a.metadata;
        }
        if !((a.cache_hit && a.useful_prefetch) || !a.cache_hit) {
            return a.metadata;
        }

        if a.cache_hit && a.useful_prefetch {
            self.stats.pf_useful += 1;
            if self.cfg.suppression {
                // Attribute the hit to the offset that prefetched it.
                if let Some(recent) = &self.recent {
                    if let Some((off, _)) = recent.peek(a.addr) {
                        self.stats.offset_mut(off).useful += 1;
                    }
                }
            }
        }
        if !a.cache_hit
            && self.cfg.mshr_inflight_credit
            && host.inflight_prefetch(self.geom.line(a.addr))
        {
            // The miss will be absorbed by a prefetch already in flight.
            self.stats.pf_useful += 1;
        }

        self.best_offset_learning(a.addr, a.cache_hit);
        self.issue_prefetches(host, &a);
        a.metadata
    }

    fn queues_full(&self, host: &dyn CacheHost) -> bool {
        let pq_occ = host.pq_occupancy().last().copied().unwrap_or(0);
        let pq_size = host.pq_size().last().copied().unwrap_or(0);
        pq_occ >= pq_size
            || pq_occ + host.mshr_occupancy() >= host.mshr_size().saturating_sub(1)
    }

    fn issue_prefetches(&mut self, host: &mut dyn CacheHost, a: &Access) {
        if !self.issue_enabled {
            return;
        }

        let mut candidates: Vec<(u64, i64, usize)> = Vec::new();
        for slot in 0..self.cfg.num_offsets {
            let off = self.learned[slot];
            if off == 0 {
                continue;
            }
            if self.suppressed.contains(&off) {
                self.stats.dropped_suppressed += 1;
                continue;
            }
            if self.cfg.accuracy_gate {
                if let Some(acc) = &self.accuracy {
                    if acc.lookup(a.pc, slot) < self.cfg.accuracy_threshold {
                        self.stats.dropped_accuracy += 1;
                        continue;
                    }
                }
            }
            let pf_addr = self.geom.offset_addr(a.addr, off);
            if !self.cfg.allow_cross_page && self.geom.page(pf_addr) != self.geom.page(a.addr) {
                self.stats.dropped_page += 1;
                continue;
            }
            candidates.push((pf_addr, off, slot));
        }

        let mut holding_written = false;
        for &(pf_addr, off, slot) in &candidates {
            if self.queues_full(&*host) {
                self.stats.dropped_queue += 1;
                continue;
            }
            if host.prefetch_line(pf_addr, true, PREFETCH_ORIGINATED_THIS_LEVEL) {
                trace!("{}: prefetch {:#x} (offset {})", self.cfg.name, pf_addr, off);
                self.stats.pf_issued += 1;
                self.stats.offset_mut(off).issued += 1;
                if let Some(recent) = &mut self.recent {
                    recent.insert(pf_addr, off, slot);
                }
                // Feedback is sampled: one holding entry per trigger.
                if !holding_written {
                    if let Some(holding) = &mut self.holding {
                        holding.insert(pf_addr, a.addr, a.pc);
                        holding_written = true;
                    }
                }
            } else {
                self.stats.pf_rejected += 1;
            }
        }

        // With nothing to issue, the feedback loop still has to be fed.
        if self.holding.is_some() && candidates.is_empty() {
            if a.cache_hit && a.useful_prefetch {
                let evicted = self.rr.lookup(a.addr);
                self.train_accuracy(evicted.line_addr, evicted.pc);
                self.rr.insert(a.addr, a.pc);
            } else if !a.cache_hit {
                if let Some(holding) = &mut self.holding {
                    holding.insert(a.addr, a.addr, a.pc);
                }
            }
        }
    }

    /// Entry point for every line fill the host reports.
    pub fn on_fill(&mut self, f: Fill) -> u32 {
        match self.cfg.fill_rule() {
            FillRule::TwoBankTag => {
                if f.prefetch
                    && f.metadata == PREFETCH_ORIGINATED_THIS_LEVEL
                    && self.issue_enabled
                {
                    // Tag arithmetic wraps; a wrapped tag simply never
                    // matches a later probe.
                    let tag = self.rr.tag(f.addr).wrapping_sub(self.learned[0] as u64);
                    self.rr.insert_tag(f.addr, tag, RrBank::Right);
                }
            }
            FillRule::OffsetLink => {
                if f.prefetch {
                    // Peek rather than take: the entry must survive the
                    // fill so a later demand hit can still be attributed
                    // to its offset.
                    let linked = self.recent.as_ref().and_then(|rp| rp.peek(f.addr));
                    if let Some((off, _slot)) = linked {
                        let base = self.geom.offset_addr(f.addr, -off);
                        if !self.cfg.allow_cross_page
                            && self.geom.page(base) != self.geom.page(f.addr)
                        {
                            return f.metadata;
                        }
                        let tag = self.rr.tag(base);
                        self.rr.insert_tag(f.addr, tag, RrBank::Left);
                    } else if self.cfg.suppression && self.all_learned_suppressed() {
                        // Keep the RR warm while every offset is benched,
                        // otherwise learning starves until round-max.
                        let tag = self.rr.tag(f.addr);
                        self.rr.insert_tag(f.addr, tag, RrBank::Left);
                    }
                }
            }
            FillRule::HoldingFeedback => {
                let entry = self.holding.as_mut().and_then(|h| h.lookup(f.addr));
                if let Some(entry) = entry {
                    let evicted = self.rr.lookup(entry.base_addr);
                    self.train_accuracy(evicted.line_addr, evicted.pc);
                    self.rr.insert(entry.base_addr, entry.pc);
                }
            }
        }
        f.metadata
    }

    /// Emit the end-of-run summary and hand back the counters.
    pub fn final_stats(&self) -> &EngineStats {
        info!(
            "{}: issued {} useful {}",
            self.cfg.name, self.stats.pf_issued, self.stats.pf_useful
        );
        &self.stats
    }

    /// Per-cycle bookkeeping hook. A no-op unless suppression is enabled.
    pub fn on_cycle(&mut self) {
        self.cycles += 1;
        if self.cfg.suppression && self.cycles % self.cfg.suppression_epoch == 0 {
            self.record_accuracy();
        }
    }

    /// Train the per-PC accuracy counters against the RR row that is about
    /// to be evicted. Works in line units; each learned slot is judged
    /// exactly once.
    pub(crate) fn train_accuracy(&mut self, evicted_line: u64, evicted_pc: u64) {
        if self.accuracy.is_none() || evicted_pc == 0 {
            return;
        }
        for slot in 0..self.cfg.num_offsets {
            let off = self.learned[slot];
            if off == 0 {
                continue;
            }
            let target_line = evicted_line.wrapping_add(off as u64);
            if !self.cfg.allow_cross_page
                && self.geom.page_of_line(target_line) != self.geom.page_of_line(evicted_line)
            {
                continue;
            }
            let target = self.geom.line_to_addr(target_line);
            let credited = self.rr.test(target)
                || self.eviction.as_ref().map_or(false, |e| e.test(target));
            if let Some(acc) = &mut self.accuracy {
                if credited {
                    acc.increment(evicted_pc, slot);
                } else {
                    acc.decrement(evicted_pc, slot);
                }
            }
        }
        if let Some(eviction) = &mut self.eviction {
            eviction.insert(evicted_line);
        }
    }

    fn all_learned_suppressed(&self) -> bool {
        self.learned
            .iter()
            .filter(|&&off| off != 0)
            .all(|off| self.suppressed.contains(off))
    }

    /// Sample per-offset accuracy for the epoch and bench offsets that
    /// fell below the suppression threshold. A benched offset returns to
    /// service when a learning phase re-commits it.
    fn record_accuracy(&mut self) {
        let threshold = self.cfg.suppression_threshold;
        for slot in 0..self.cfg.num_offsets {
            let off = self.learned[slot];
            if off == 0 {
                continue;
            }
            let data = self.stats.offset_mut(off);
            let accuracy = data.accuracy();
            data.accuracy_log.push(accuracy);
            data.pat.push(accuracy >= threshold);
            if accuracy < threshold {
                debug!("{}: suppressing offset {} ({:.2})", self.cfg.name, off, accuracy);
                self.suppressed.insert(off);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::CommitPolicy;
    use crate::host::ModelHost;
    use crate::trace::{random_stream, strided_stream};

    fn load(addr: u64, pc: u64, cache_hit: bool, useful_prefetch: bool) -> Access {
        Access {
            addr,
            pc,
            cache_hit,
            useful_prefetch,
            kind: AccessKind::Load,
            metadata: 0,
        }
    }

    fn host() -> ModelHost {
        ModelHost::new(16, 32, 1, 6)
    }

    /// A single-slot engine over an entry RR with holding feedback, the
    /// shape the concrete scenarios run on.
    fn single_slot_config() -> EngineConfig {
        EngineConfig {
            num_offsets: 1,
            offset_list_size: 26,
            rr_size: 64,
            accuracy_table_size: 128,
            current_offset_hit_gate: false,
            ..EngineConfig::kairios()
        }
    }

    /// Drive a demand miss and complete its fill immediately.
    fn miss_and_fill(engine: &mut Engine, host: &mut ModelHost, addr: u64, pc: u64) {
        engine.on_access(host, load(addr, pc, false, false));
        engine.on_fill(Fill {
            addr,
            set: 0,
            way: 0,
            prefetch: false,
            evicted_addr: 0,
            metadata: 0,
        });
    }

    #[test]
    fn stride_1_stream_learns_offset_1() {
        let mut engine = single_slot_config().build().unwrap();
        let mut h = host();
        for k in 0..1024u64 {
            miss_and_fill(&mut engine, &mut h, 64 * k, 0x100);
            if engine.stats.phases_committed > 0 {
                break;
            }
        }
        assert_eq!(engine.stats.phases_committed, 1);
        assert_eq!(engine.learned_offsets(), &[1]);
    }

    #[test]
    fn random_stream_stays_silent() {
        let cfg = EngineConfig {
            commit: CommitPolicy::DisableOnBadScore,
            bad_score: 10,
            initial_offsets: &[],
            ..single_slot_config()
        };
        let mut engine = cfg.build().unwrap();
        let mut h = host();
        for rec in random_stream(0x5eed, 4096, 64) {
            miss_and_fill(&mut engine, &mut h, rec.addr, rec.pc);
        }
        assert_eq!(engine.stats.pf_issued, 0);
        assert!(h.accepted.is_empty());
        assert_eq!(engine.learned_offsets(), &[0]);
        assert_eq!(engine.stats.phases_committed, 0);
        assert!(engine.stats.phases_abandoned >= 1);
        assert!(!engine.issue_enabled());
    }

    #[test]
    fn page_boundary_blocks_issue() {
        let cfg = EngineConfig { allow_cross_page: false, ..single_slot_config() };
        let mut engine = cfg.build().unwrap();
        engine.learned[0] = 1;
        let mut h = host();
        // Last block of the page; offset 1 would cross into the next one.
        engine.on_access(&mut h, load(0x0fc0, 0x100, false, false));
        assert!(h.accepted.is_empty());
        assert_eq!(engine.stats.dropped_page, 1);
        assert_eq!(engine.stats.pf_issued, 0);
    }

    #[test]
    fn refused_prefetches_do_not_count_as_issued() {
        let mut engine = single_slot_config().build().unwrap();
        engine.learned[0] = 1;
        let mut h = host();
        h.set_accept(false);
        for k in 0..32u64 {
            engine.on_access(&mut h, load(0x40_0000 + 64 * k, 0x100, false, false));
        }
        assert_eq!(engine.stats.pf_issued, 0);
        assert!(engine.stats.pf_rejected > 0);
    }

    #[test]
    fn mid_flight_prefetch_still_counts_useful() {
        let mut engine = EngineConfig::multi_bop().build().unwrap();
        let mut h = host();
        h.set_accept(true);
        assert!(h.prefetch_line(0x8000, true, 0));
        h.set_accept(false);
        engine.on_access(&mut h, load(0x8000, 0x100, false, false));
        assert_eq!(engine.stats.pf_useful, 1);
        assert_eq!(engine.stats.pf_issued, 0);
    }

    #[test]
    fn coverage_gate_suppresses_learning() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        engine.learning_slot = 1;
        engine.learned[0] = 4;
        let addr = 0x40_0000u64;
        // Slot 0 would have predicted this address, and its witness PC sits
        // at the neutral accuracy, which meets the threshold.
        engine.rr.insert(addr - 4 * 64, 0x500);
        let before: Vec<u8> = engine.offsets.iter().map(|e| e.score).collect();
        engine.best_offset_learning(addr, true);
        let after: Vec<u8> = engine.offsets.iter().map(|e| e.score).collect();
        assert_eq!(before, after);
        assert_eq!(engine.stats.overlap_skips, 1);
    }

    #[test]
    fn recent_prefetch_from_other_slot_does_not_train() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        let addr = 0x80_0000u64;
        engine.learned[1] = 5;
        if let Some(rp) = &mut engine.recent {
            rp.insert(addr, 5, 1);
        }
        let before: Vec<u8> = engine.offsets.iter().map(|e| e.score).collect();
        engine.best_offset_learning(addr, true);
        let after: Vec<u8> = engine.offsets.iter().map(|e| e.score).collect();
        assert_eq!(before, after);
        assert_eq!(engine.stats.rp_hits, 0);
        assert_eq!(engine.stats.rp_misses, 0);
    }

    #[test]
    fn round_advances_once_per_sweep() {
        let cfg = EngineConfig { initial_offsets: &[], ..single_slot_config() };
        let mut engine = cfg.build().unwrap();
        let mut h = host();
        // Blocks far enough apart that no candidate offset ever scores.
        for k in 0..52u64 {
            miss_and_fill(&mut engine, &mut h, k * 1000 * 64, 0x100);
        }
        assert_eq!(engine.round, 2);
    }

    #[test]
    fn an_access_changes_at_most_one_learned_slot() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        let mut h = host();
        let mut stream = strided_stream(0x40_0000, 0x100, 1, 3000, 64);
        stream.extend(random_stream(9, 2000, 64));
        for rec in stream {
            let before = engine.learned_offsets().to_vec();
            miss_and_fill(&mut engine, &mut h, rec.addr, rec.pc);
            for fill in h.tick() {
                engine.on_fill(fill);
            }
            let after = engine.learned_offsets();
            let changed = before.iter().zip(after).filter(|(a, b)| a != b).count();
            assert!(changed <= 1);
        }
    }

    #[test]
    fn holding_insert_is_sampled_once_per_trigger() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        engine.learned[0] = 1;
        engine.learned[1] = 2;
        let mut h = host();
        let addr = 0x40_0000u64;
        engine.on_access(&mut h, load(addr, 0x100, false, false));
        assert_eq!(h.accepted, vec![addr + 64, addr + 128]);
        let holding = engine.holding.as_mut().unwrap();
        assert!(holding.lookup(addr + 64).is_some());
        assert!(holding.lookup(addr + 128).is_none());
    }

    #[test]
    fn two_bank_fill_links_back_to_the_trigger() {
        let mut engine = EngineConfig::bop().build().unwrap();
        // Keep the tags involved nonzero; the zero-initialized banks match
        // any zero-tag probe.
        let addr = 0x40_1040u64;
        engine.on_fill(Fill {
            addr,
            set: 0,
            way: 0,
            prefetch: true,
            evicted_addr: 0,
            metadata: PREFETCH_ORIGINATED_THIS_LEVEL,
        });
        // The stored tag is the trigger's: fill address minus the learned
        // offset, in blocks.
        assert!(engine.rr.test(addr - 64));

        // Fills that this level did not originate train nothing.
        let other = 0x80_2040u64;
        engine.on_fill(Fill {
            addr: other,
            set: 0,
            way: 0,
            prefetch: true,
            evicted_addr: 0,
            metadata: 0,
        });
        assert!(!engine.rr.test(other - 64));
    }

    #[test]
    fn offset_link_fill_restores_the_trigger_tag() {
        let mut engine = EngineConfig::kairos().build().unwrap();
        engine.learned[0] = 2;
        let mut h = host();
        // Nonzero line tag, away from the page edge.
        let addr = 0x40_1000u64;
        engine.on_access(&mut h, load(addr, 0x100, false, false));
        assert_eq!(h.accepted, vec![addr + 128]);
        engine.on_fill(Fill {
            addr: addr + 128,
            set: 0,
            way: 0,
            prefetch: true,
            evicted_addr: 0,
            metadata: PREFETCH_ORIGINATED_THIS_LEVEL,
        });
        assert!(engine.rr.test(addr));
    }

    #[test]
    fn disabled_issue_recovers_on_a_later_phase() {
        let mut engine = EngineConfig::bop().build().unwrap();
        engine.issue_enabled = false;
        let mut h = host();
        for k in 1..4000u64 {
            let addr = 64 * k;
            engine.on_access(&mut h, load(addr, 0x100, false, false));
            // Stand in for the fill path so the banks see the stream.
            let tag = engine.rr.tag(addr);
            engine.rr.insert_tag(addr, tag, RrBank::Left);
            if engine.issue_enabled {
                break;
            }
        }
        assert!(engine.issue_enabled());
        assert_eq!(engine.learned_offsets(), &[1]);
    }

    #[test]
    fn cross_page_config_never_issues_across_pages() {
        let mut engine = EngineConfig::kairos().build().unwrap();
        engine.learned[0] = 1;
        engine.learned[1] = -3;
        let mut h = host();
        for rec in random_stream(0xabcd, 2000, 64) {
            let seen = h.accepted.len();
            engine.on_access(&mut h, load(rec.addr, rec.pc, false, false));
            for &pf in &h.accepted[seen..] {
                assert_eq!(pf >> 12, rec.addr >> 12);
            }
            for fill in h.tick() {
                engine.on_fill(fill);
            }
        }
    }

    #[test]
    fn learning_state_invariants_hold_under_fuzz() {
        for cfg in [EngineConfig::caerus(), EngineConfig::multi_bop()] {
            let mut engine = cfg.build().unwrap();
            let mut h = ModelHost::new(16, 32, 4, 6);
            let mut stream = strided_stream(0x10_0000, 0x100, 1, 2000, 64);
            stream.extend(random_stream(3, 1000, 64));
            stream.extend(strided_stream(0xf0_0000, 0x104, -2, 2000, 64));
            for rec in stream {
                for fill in h.tick() {
                    engine.on_fill(fill);
                }
                engine.on_access(&mut h, load(rec.addr, rec.pc, false, false));
                h.demand_miss(rec.addr, 0);
                engine.on_cycle();

                assert!(engine.current_learning_slot() < engine.config().num_offsets);
                for &off in engine.learned_offsets() {
                    assert!(off == 0 || engine.offsets.contains(off));
                }
                for entry in engine.offsets.iter() {
                    assert!(entry.score <= engine.config().score_max);
                }
                if engine.phase_best_offset != 0 {
                    assert_eq!(
                        engine.offsets.score_of(engine.phase_best_offset),
                        Some(engine.best_score)
                    );
                }
                if let Some(acc) = &engine.accuracy {
                    for slot in 0..engine.cfg.num_offsets {
                        assert!(acc.lookup(rec.pc, slot) <= engine.cfg.acc_max);
                    }
                }
            }
        }
    }

    #[test]
    fn suppression_benches_inaccurate_offsets() {
        let cfg = EngineConfig { suppression_epoch: 10, ..EngineConfig::multi_bop() };
        let mut engine = cfg.build().unwrap();
        let mut h = host();
        // Slot 0 starts seeded with offset 1. Issue plenty of prefetches
        // that are never useful, then cross a bookkeeping epoch.
        for k in 0..8u64 {
            engine.on_access(&mut h, load(0x40_0000 + 64 * k, 0x100, false, false));
        }
        assert!(engine.stats.pf_issued > 0);
        for _ in 0..10 {
            engine.on_cycle();
        }
        assert!(engine.suppressed.contains(&1));

        // A suppressed offset issues nothing.
        let before = engine.stats.pf_issued;
        engine.on_access(&mut h, load(0x80_0000, 0x100, false, false));
        assert_eq!(engine.stats.pf_issued, before);
        assert!(engine.stats.dropped_suppressed > 0);
    }

    #[test]
    fn non_load_accesses_are_ignored() {
        let mut engine = single_slot_config().build().unwrap();
        engine.learned[0] = 1;
        let mut h = host();
        for kind in [AccessKind::Rfo, AccessKind::Write, AccessKind::Translation] {
            let a = Access {
                addr: 0x40_0000,
                pc: 0x100,
                cache_hit: false,
                useful_prefetch: false,
                kind,
                metadata: 5,
            };
            assert_eq!(engine.on_access(&mut h, a), 5);
        }
        assert!(h.accepted.is_empty());

        // A plain hit that was not a useful prefetch is also a no-op.
        engine.on_access(&mut h, load(0x40_0000, 0x100, true, false));
        assert!(h.accepted.is_empty());
    }

    #[test]
    fn accuracy_training_judges_each_slot_once() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        engine.learned[0] = 1;
        engine.learned[1] = 2;
        let line = 0x10000u64;
        let pc = 0x600u64;
        // Only slot 0's hypothetical target is resident.
        engine.rr.insert((line + 1) << 6, 0x700);
        engine.train_accuracy(line, pc);
        let acc = engine.accuracy.as_ref().unwrap();
        assert_eq!(acc.lookup(pc, 0), 9);
        assert_eq!(acc.lookup(pc, 1), 7);
        // Unused slots are untouched.
        assert_eq!(acc.lookup(pc, 2), 8);

        // The trained line lands in the eviction table, so a later pass
        // still credits an offset pointing at it.
        assert!(engine.eviction.as_ref().unwrap().test(line << 6));
    }

    #[test]
    fn prefetch_kind_triggers_when_configured() {
        let mut engine = EngineConfig::caerus().build().unwrap();
        engine.learned[0] = 1;
        let mut h = host();
        let a = Access {
            addr: 0x40_1000,
            pc: 0x100,
            cache_hit: false,
            useful_prefetch: false,
            kind: AccessKind::Prefetch,
            metadata: 0,
        };
        engine.on_access(&mut h, a);
        assert_eq!(h.accepted, vec![0x40_1040]);

        // The same access kind is filtered out where it is not configured.
        let mut engine = single_slot_config().build().unwrap();
        engine.learned[0] = 1;
        let mut h = host();
        engine.on_access(&mut h, a);
        assert!(h.accepted.is_empty());
    }

    #[test]
    fn queue_pressure_drops_candidates() {
        let mut engine = single_slot_config().build().unwrap();
        engine.learned[0] = 1;
        // One PQ slot and a tiny MSHR leave no headroom at all.
        let mut h = ModelHost::new(1, 2, 100, 6);
        h.demand_miss(0x9000, 0);
        engine.on_access(&mut h, load(0x40_0000, 0x100, false, false));
        assert_eq!(engine.stats.pf_issued, 0);
        assert!(engine.stats.dropped_queue > 0);
    }
}
