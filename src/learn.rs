//! The learning controller: candidate scoring, phase termination, and
//! learned-slot rotation.

use log::debug;

use crate::config::CommitPolicy;
use crate::engine::Engine;

impl Engine {
    /// One learning step for a qualifying access.
    ///
    /// On a hit the access first has to get past the gates: an address
    /// already predicted by another learned slot must not reward the slot
    /// being trained, and a hit produced by a recorded prefetch only
    /// trains when that prefetch belongs to the current slot.
    pub(crate) fn best_offset_learning(&mut self, addr: u64, cache_hit: bool) {
        if cache_hit {
            if self.cfg.coverage_gate && self.covered_by_other_slot(addr) {
                self.stats.overlap_skips += 1;
                let leak = self.cfg.overlap_leakage
                    && self.stats.overlap_skips % self.cfg.leakage_period == 0;
                if !leak {
                    return;
                }
                self.stats.overlap_leaks += 1;
            }

            if self.cfg.current_offset_hit_gate {
                let off = self.learned[self.learning_slot];
                if !self.rr.test(self.geom.offset_addr(addr, -off)) {
                    return;
                }
            }

            if self.cfg.rp_gate {
                let recorded = self.recent.as_mut().and_then(|rp| rp.take(addr));
                match recorded {
                    Some((off, slot)) => {
                        if slot != self.learning_slot
                            || off != self.learned[self.learning_slot]
                        {
                            // Credit belongs to some other offset.
                            return;
                        }
                        self.stats.rp_hits += 1;
                    }
                    None => self.stats.rp_misses += 1,
                }
            }
        }

        for _ in 0..self.cfg.train_speed {
            let candidate = self.offsets.current().offset;
            let taken_by_other_slot = self.cfg.skip_learned_candidates
                && (0..self.cfg.num_offsets)
                    .any(|j| j != self.learning_slot && self.learned[j] == candidate);
            if !taken_by_other_slot {
                let probe = self.geom.offset_addr(addr, -candidate);
                if self.rr.test(probe) {
                    let score = self.offsets.bump_current(self.cfg.score_max);
                    if score > self.best_score {
                        self.best_score = score;
                        self.phase_best_offset = candidate;
                    }
                }
            }
            if self.offsets.advance() {
                self.round += 1;
            }
        }

        if self.best_score >= self.cfg.score_max || self.round >= self.cfg.round_max {
            self.end_phase();
        }
    }

    /// Whether a learned slot other than the one being trained already
    /// predicts this address, witnessed by the RR row it would have
    /// trained from and (when accuracy is tracked) by that witness PC
    /// meeting the issue threshold.
    fn covered_by_other_slot(&self, addr: u64) -> bool {
        for slot in 0..self.cfg.num_offsets {
            if slot == self.learning_slot {
                continue;
            }
            let off = self.learned[slot];
            if off == 0 {
                continue;
            }
            let witness = self.geom.offset_addr(addr, -off);
            if !self.rr.test(witness) {
                continue;
            }
            match &self.accuracy {
                Some(acc) => {
                    let pc = self.rr.lookup(witness).pc;
                    if acc.lookup(pc, slot) >= self.cfg.accuracy_threshold {
                        return true;
                    }
                }
                None => return true,
            }
        }
        false
    }

    fn end_phase(&mut self) {
        let winner = self.phase_best_offset;
        match self.cfg.commit {
            CommitPolicy::Always => self.commit_offset(winner),
            CommitPolicy::DisableOnBadScore => {
                if self.best_score > self.cfg.bad_score {
                    self.commit_offset(winner);
                    self.issue_enabled = true;
                } else {
                    self.issue_enabled = false;
                    self.stats.phases_abandoned += 1;
                    debug!("{}: phase abandoned, issue disabled", self.cfg.name);
                }
            }
            CommitPolicy::RetreatOnBadOffset => {
                // The comparison happens in address bits, so a negative
                // winner wraps high and passes while 0 (no winner) fails.
                if (winner as u64) > self.cfg.bad_score as u64 {
                    self.commit_offset(winner);
                } else {
                    self.learning_slot =
                        (self.learning_slot + self.cfg.num_offsets - 1) % self.cfg.num_offsets;
                    self.stats.phases_abandoned += 1;
                    debug!("{}: phase abandoned, slot rewound to {}", self.cfg.name,
                        self.learning_slot);
                }
            }
        }
        self.round = 0;
        self.best_score = 0;
        self.phase_best_offset = 0;
        self.offsets.reset_scores();
    }

    fn commit_offset(&mut self, offset: i64) {
        debug!("{}: slot {} learned offset {}", self.cfg.name, self.learning_slot, offset);
        self.learned[self.learning_slot] = offset;
        if let Some(acc) = &mut self.accuracy {
            acc.reset_slot(self.learning_slot);
        }
        if self.cfg.suppression && offset != 0 {
            self.stats.clear_offset(offset);
            self.suppressed.remove(&offset);
        }
        self.stats.phases_committed += 1;
        self.learning_slot = (self.learning_slot + 1) % self.cfg.num_offsets;
    }
}
