//! Record of which offset produced each recently issued prefetch.

/// A recently issued prefetch: the address it targeted, the offset that
/// produced it, and the learned slot the offset occupied at issue time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RecentPrefetchEntry {
    pf_addr: u64,
    offset: i64,
    slot: usize,
}

/// Direct-mapped table keyed by prefetch address, sentinel address 0.
///
/// Learning reads entries with [`Self::take`], which consumes the slot so
/// one prefetch can steer at most one training decision. The fill linkage
/// and usefulness attribution read with [`Self::peek`], leaving the entry
/// in place.
pub struct RecentPrefetches {
    slots: Vec<RecentPrefetchEntry>,
    log_size: u32,
}
impl RecentPrefetches {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![RecentPrefetchEntry::default(); size],
            log_size: size.ilog2(),
        }
    }

    fn index(&self, addr: u64) -> usize {
        let hash = addr ^ (addr >> self.log_size);
        (hash & ((1u64 << self.log_size) - 1)) as usize
    }

    pub fn insert(&mut self, pf_addr: u64, offset: i64, slot: usize) {
        let idx = self.index(pf_addr);
        self.slots[idx] = RecentPrefetchEntry { pf_addr, offset, slot };
    }

    /// Non-destructive lookup of `(offset, slot)` for a prefetch address.
    pub fn peek(&self, pf_addr: u64) -> Option<(i64, usize)> {
        let entry = self.slots[self.index(pf_addr)];
        (entry.pf_addr == pf_addr && pf_addr != 0).then_some((entry.offset, entry.slot))
    }

    /// Consuming lookup of `(offset, slot)` for a prefetch address.
    pub fn take(&mut self, pf_addr: u64) -> Option<(i64, usize)> {
        let idx = self.index(pf_addr);
        let entry = self.slots[idx];
        if entry.pf_addr != pf_addr || pf_addr == 0 {
            return None;
        }
        self.slots[idx] = RecentPrefetchEntry::default();
        Some((entry.offset, entry.slot))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn peek_preserves_take_consumes() {
        let mut t = RecentPrefetches::new(128);
        t.insert(0x9000, 4, 1);
        assert_eq!(t.peek(0x9000), Some((4, 1)));
        assert_eq!(t.peek(0x9000), Some((4, 1)));
        assert_eq!(t.take(0x9000), Some((4, 1)));
        assert_eq!(t.take(0x9000), None);
        assert_eq!(t.peek(0x9000), None);
    }

    #[test]
    fn mismatched_address_misses() {
        let mut t = RecentPrefetches::new(128);
        t.insert(0x9000, 4, 1);
        assert_eq!(t.peek(0x9040), None);
    }
}
