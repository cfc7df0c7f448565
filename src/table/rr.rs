//! The recent-requests (RR) table.

use crate::access::Geometry;

/// Which storage representation an [`RrTable`] uses.
///
/// The three representations differ in what a slot holds, but they are
/// interchangeable at the [`RrTable::test`] level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RrStyle {
    /// Two banks of truncated line-address tags. The right bank is indexed
    /// with a doubled shift. Membership is a scan of both banks.
    TwoBankTagged,

    /// A single bank of truncated line-address tags, scanned for membership.
    Tagged,

    /// A single bank of full `(line_addr, pc)` entries, probed by index.
    Entries,
}

/// Selects a bank of a two-banked table. Single-bank tables ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RrBank {
    Left = 0,
    Right = 1,
}

/// A full RR row as stored by the [`RrStyle::Entries`] representation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RrEntry {
    pub line_addr: u64,
    pub pc: u64,
}

enum RrStore {
    TwoBank { left: Vec<u64>, right: Vec<u64> },
    Tagged(Vec<u64>),
    Entries(Vec<RrEntry>),
}

pub struct RrTable {
    store: RrStore,
    log_size: u32,
    tag_mask: u64,
    geom: Geometry,
}
impl RrTable {
    pub fn new(style: RrStyle, size: usize, tag_bits: u32, geom: Geometry) -> Self {
        let store = match style {
            RrStyle::TwoBankTagged => RrStore::TwoBank {
                left: vec![0; size],
                right: vec![0; size],
            },
            RrStyle::Tagged => RrStore::Tagged(vec![0; size]),
            RrStyle::Entries => RrStore::Entries(vec![RrEntry::default(); size]),
        };
        Self {
            store,
            log_size: size.ilog2(),
            tag_mask: (1u64 << tag_bits) - 1,
            geom,
        }
    }

    /// Truncated line-address tag for an address.
    pub fn tag(&self, addr: u64) -> u64 {
        self.geom.line(addr) & self.tag_mask
    }

    /// Hash an address into a slot index. The right bank of the two-banked
    /// representation doubles the shift amount.
    fn index(&self, addr: u64, bank: RrBank) -> usize {
        let line = self.geom.line(addr);
        let shift = self.log_size << (bank as u32);
        let hash = line ^ (line.wrapping_shr(shift));
        (hash & ((1u64 << self.log_size) - 1)) as usize
    }

    /// Record a demand access. Only meaningful for the entry representation;
    /// tagged representations take their inserts through [`Self::insert_tag`].
    pub fn insert(&mut self, addr: u64, pc: u64) {
        let idx = self.index(addr, RrBank::Left);
        let line_addr = self.geom.line(addr);
        match &mut self.store {
            RrStore::Entries(slots) => slots[idx] = RrEntry { line_addr, pc },
            RrStore::Tagged(slots) => slots[idx] = line_addr & self.tag_mask,
            RrStore::TwoBank { left, .. } => left[idx] = line_addr & self.tag_mask,
        }
    }

    /// Store a precomputed tag at the slot `addr` hashes to. Fill rules use
    /// this to record a tag derived from a different address than the one
    /// being indexed.
    pub fn insert_tag(&mut self, addr: u64, tag: u64, bank: RrBank) {
        let idx = self.index(addr, bank);
        match &mut self.store {
            RrStore::Entries(slots) => {
                slots[idx] = RrEntry { line_addr: tag, pc: 0 }
            }
            RrStore::Tagged(slots) => slots[idx] = tag,
            RrStore::TwoBank { left, right } => match bank {
                RrBank::Left => left[idx] = tag,
                RrBank::Right => right[idx] = tag,
            },
        }
    }

    /// Whether an address is present. Tagged representations scan every
    /// slot for the tag, matching the hardware CAM; the entry
    /// representation probes a single slot.
    pub fn test(&self, addr: u64) -> bool {
        match &self.store {
            RrStore::TwoBank { left, right } => {
                let tag = self.tag(addr);
                left.iter().any(|&t| t == tag) || right.iter().any(|&t| t == tag)
            }
            RrStore::Tagged(slots) => {
                let tag = self.tag(addr);
                slots.iter().any(|&t| t == tag)
            }
            RrStore::Entries(slots) => {
                slots[self.index(addr, RrBank::Left)].line_addr == self.geom.line(addr)
            }
        }
    }

    /// Read the row an address hashes to, which may be stale or belong to a
    /// different address. The caller interprets it.
    pub fn lookup(&self, addr: u64) -> RrEntry {
        match &self.store {
            RrStore::Entries(slots) => slots[self.index(addr, RrBank::Left)],
            // Tagged representations have no per-row payload to return.
            _ => RrEntry::default(),
        }
    }
}
