//! Engine configuration and the preset family of variants.
//!
//! The variants differ by which gates are enabled and by table geometry,
//! not by polymorphic extension, so a single engine type is parameterized
//! by this record. Presets reproduce the published parameter sets.

use thiserror::Error;

use crate::engine::Engine;
use crate::table::RrStyle;

/// What a learning phase does with its winner when it terminates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Install the phase winner unconditionally, even when it is 0.
    Always,

    /// Install only when the best score beats `bad_score`; otherwise stop
    /// issuing prefetches until a later phase succeeds. Single-offset
    /// behavior.
    DisableOnBadScore,

    /// Install only when the winning offset, compared in address bits,
    /// exceeds `bad_score`; otherwise rewind the learning slot by one so
    /// the phase is retried.
    RetreatOnBadOffset,
}

/// How a fill trains the RR table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillRule {
    /// On a self-originated prefetch fill, store `tag(addr) - best_offset`
    /// in the right bank.
    TwoBankTag,

    /// Look the fill up in the recent-prefetches table, reconstruct the
    /// triggering base address from the recorded offset, and store its tag.
    OffsetLink,

    /// Look the fill up in the holding table, train accuracy on the RR row
    /// about to be evicted, then insert the triggering demand.
    HoldingFeedback,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{table} size {size} is not a nonzero power of two")]
    TableSize { table: &'static str, size: usize },

    #[error("block size {0} is not a power of two")]
    BlockSize(u64),

    #[error("page size {0} is not a power of two larger than the block")]
    PageSize(u64),

    #[error("the candidate offset list may not be empty")]
    EmptyOffsetList,

    #[error("negative offsets require an even offset list size, got {0}")]
    OddOffsetList(usize),

    #[error("at least one learned-offset slot is required")]
    NoSlots,

    #[error("train speed must be nonzero")]
    ZeroTrainSpeed,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub name: &'static str,

    pub block_size: u64,
    pub page_size: u64,

    // Learning phase
    pub score_max: u8,
    pub round_max: u32,
    pub bad_score: u8,
    pub commit: CommitPolicy,
    pub offset_list_size: usize,
    pub negative_offsets: bool,
    pub num_offsets: usize,
    /// Offsets pre-installed in the first learned slots at reset.
    pub initial_offsets: &'static [i64],
    pub train_speed: usize,
    /// Skip sweep candidates that already occupy another learned slot.
    pub skip_learned_candidates: bool,

    // Learning gates
    pub coverage_gate: bool,
    pub overlap_leakage: bool,
    pub leakage_period: u64,
    pub rp_gate: bool,
    /// On a hit, learn only when the currently learning slot's offset
    /// predicted the address.
    pub current_offset_hit_gate: bool,

    // Tables
    pub rr_style: RrStyle,
    pub rr_size: usize,
    pub tag_bits: u32,
    pub holding_size: usize,
    pub consuming_holding_lookup: bool,
    pub accuracy_table_size: usize,
    pub eviction_table_size: usize,
    pub recent_prefetches_size: usize,

    // Accuracy counter policy
    pub accuracy_gate: bool,
    pub accuracy_threshold: u8,
    pub acc_min: u8,
    pub acc_max: u8,
    pub acc_neutral: u8,
    pub accuracy_increment: u8,
    pub accuracy_decrement: u8,

    // Issue
    pub allow_cross_page: bool,
    pub trigger_on_prefetch: bool,
    pub mshr_inflight_credit: bool,

    // Periodic per-offset bookkeeping
    pub suppression: bool,
    pub suppression_epoch: u64,
    pub suppression_threshold: f64,
}
impl EngineConfig {
    /// A baseline every preset starts from. Not a usable variant by itself.
    fn base() -> Self {
        Self {
            name: "base",
            block_size: 64,
            page_size: 4096,
            score_max: 31,
            round_max: 100,
            bad_score: 0,
            commit: CommitPolicy::Always,
            offset_list_size: 26,
            negative_offsets: false,
            num_offsets: 1,
            initial_offsets: &[],
            train_speed: 1,
            skip_learned_candidates: false,
            coverage_gate: false,
            overlap_leakage: false,
            leakage_period: 50,
            rp_gate: false,
            current_offset_hit_gate: false,
            rr_style: RrStyle::Entries,
            rr_size: 256,
            tag_bits: 12,
            holding_size: 0,
            consuming_holding_lookup: false,
            accuracy_table_size: 0,
            eviction_table_size: 0,
            recent_prefetches_size: 0,
            accuracy_gate: false,
            accuracy_threshold: 0,
            acc_min: 0,
            acc_max: 15,
            acc_neutral: 0,
            accuracy_increment: 1,
            accuracy_decrement: 1,
            allow_cross_page: true,
            trigger_on_prefetch: false,
            mshr_inflight_credit: false,
            suppression: false,
            suppression_epoch: 100_000,
            suppression_threshold: 0.3,
        }
    }

    /// The original single-offset best-offset prefetcher: two tagged RR
    /// banks, one learned offset, issue disabled whenever a phase fails to
    /// beat the bad score.
    pub fn bop() -> Self {
        Self {
            name: "bop",
            bad_score: 10,
            commit: CommitPolicy::DisableOnBadScore,
            offset_list_size: 46,
            initial_offsets: &[1],
            rr_style: RrStyle::TwoBankTagged,
            rr_size: 64,
            ..Self::base()
        }
    }

    /// Four learned offsets over a single tagged RR bank, with the overlap
    /// suppression gate and page-bounded issue.
    pub fn kairos() -> Self {
        Self {
            name: "kairos",
            num_offsets: 4,
            coverage_gate: true,
            rr_style: RrStyle::Tagged,
            rr_size: 256,
            recent_prefetches_size: 128,
            allow_cross_page: false,
            ..Self::base()
        }
    }

    /// `kairos` plus a seeded stride-1 slot, mid-flight MSHR crediting,
    /// and epoch-based per-offset suppression bookkeeping.
    pub fn multi_bop() -> Self {
        Self {
            name: "multi_bop",
            initial_offsets: &[1],
            mshr_inflight_credit: true,
            suppression: true,
            ..Self::kairos()
        }
    }

    /// Four learned offsets with per-PC accuracy gating, holding-table
    /// feedback, and an RR victim table.
    pub fn kairios() -> Self {
        Self {
            name: "kairios",
            num_offsets: 4,
            current_offset_hit_gate: true,
            rr_style: RrStyle::Entries,
            rr_size: 256,
            holding_size: 128,
            accuracy_table_size: 512,
            eviction_table_size: 128,
            accuracy_gate: true,
            accuracy_threshold: 0,
            acc_neutral: 0,
            ..Self::base()
        }
    }

    /// The richest member: eight signed learned offsets, accuracy-witnessed
    /// coverage gate, recent-prefetch steering, consuming holding lookups,
    /// and commit-or-retreat phase endings.
    pub fn caerus() -> Self {
        Self {
            name: "caerus",
            bad_score: 1,
            commit: CommitPolicy::RetreatOnBadOffset,
            offset_list_size: 52,
            negative_offsets: true,
            num_offsets: 8,
            train_speed: 1,
            skip_learned_candidates: true,
            coverage_gate: true,
            rp_gate: true,
            rr_style: RrStyle::Entries,
            rr_size: 256,
            holding_size: 128,
            consuming_holding_lookup: true,
            accuracy_table_size: 128,
            eviction_table_size: 128,
            recent_prefetches_size: 128,
            accuracy_gate: true,
            accuracy_threshold: 8,
            acc_neutral: 8,
            trigger_on_prefetch: true,
            ..Self::base()
        }
    }

    /// Every variant in the family, for evaluation sweeps.
    pub fn all_presets() -> Vec<Self> {
        vec![
            Self::bop(),
            Self::kairos(),
            Self::multi_bop(),
            Self::kairios(),
            Self::caerus(),
        ]
    }

    pub fn fill_rule(&self) -> FillRule {
        match self.rr_style {
            RrStyle::TwoBankTagged => FillRule::TwoBankTag,
            _ if self.holding_size > 0 => FillRule::HoldingFeedback,
            _ => FillRule::OffsetLink,
        }
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        fn pow2(table: &'static str, size: usize) -> Result<(), BuildError> {
            if size == 0 || !size.is_power_of_two() {
                return Err(BuildError::TableSize { table, size });
            }
            Ok(())
        }
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(BuildError::BlockSize(self.block_size));
        }
        if !self.page_size.is_power_of_two() || self.page_size <= self.block_size {
            return Err(BuildError::PageSize(self.page_size));
        }
        pow2("rr table", self.rr_size)?;
        if self.holding_size > 0 {
            pow2("holding table", self.holding_size)?;
        }
        if self.eviction_table_size > 0 {
            pow2("eviction table", self.eviction_table_size)?;
        }
        if self.recent_prefetches_size > 0 {
            pow2("recent prefetches table", self.recent_prefetches_size)?;
        }
        if self.offset_list_size == 0 {
            return Err(BuildError::EmptyOffsetList);
        }
        if self.negative_offsets && self.offset_list_size % 2 != 0 {
            return Err(BuildError::OddOffsetList(self.offset_list_size));
        }
        if self.num_offsets == 0 {
            return Err(BuildError::NoSlots);
        }
        if self.train_speed == 0 {
            return Err(BuildError::ZeroTrainSpeed);
        }
        Ok(())
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        Engine::new(self)
    }
}
