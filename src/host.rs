//! The host cache contract, and a minimal host model for evaluation.

use std::collections::VecDeque;

use crate::access::Fill;

/// What an engine needs from the cache it is attached to.
///
/// Occupancy and size queries return the host's per-level lists; the last
/// element is the level the engine sits at.
pub trait CacheHost {
    /// Enqueue a prefetch. Returns whether the host accepted it.
    fn prefetch_line(&mut self, pf_addr: u64, fill_this_level: bool, metadata: u32) -> bool;

    fn pq_occupancy(&self) -> Vec<usize>;
    fn pq_size(&self) -> Vec<usize>;

    fn mshr_occupancy(&self) -> usize;
    fn mshr_size(&self) -> usize;

    /// Whether an in-flight prefetch in the MSHR matches this line address.
    fn inflight_prefetch(&self, _line_addr: u64) -> bool {
        false
    }

    fn current_cycle(&self) -> u64;
}

struct PendingFill {
    addr: u64,
    ready: u64,
    metadata: u32,
    prefetch: bool,
}

/// A queue-and-latency host model.
///
/// Prefetches occupy the PQ until their latency elapses; demand misses
/// occupy the MSHR. [`ModelHost::tick`] advances one cycle and returns the
/// fills that completed, which the caller feeds back into the engine.
///
/// `set_accept(false)` makes the host refuse every prefetch, which is how
/// back-pressure scenarios are driven.
pub struct ModelHost {
    pq: VecDeque<PendingFill>,
    mshr: VecDeque<PendingFill>,
    pq_cap: usize,
    mshr_cap: usize,
    latency: u64,
    cycle: u64,
    accept: bool,
    log2_block: u32,

    /// Every prefetch address accepted, in order.
    pub accepted: Vec<u64>,
}
impl ModelHost {
    pub fn new(pq_cap: usize, mshr_cap: usize, latency: u64, log2_block: u32) -> Self {
        Self {
            pq: VecDeque::new(),
            mshr: VecDeque::new(),
            pq_cap,
            mshr_cap,
            latency,
            cycle: 0,
            accept: true,
            log2_block,
            accepted: Vec::new(),
        }
    }

    pub fn set_accept(&mut self, accept: bool) {
        self.accept = accept;
    }

    /// Register a demand miss so it occupies the MSHR and later fills.
    pub fn demand_miss(&mut self, addr: u64, metadata: u32) {
        if self.mshr.len() >= self.mshr_cap {
            return;
        }
        self.mshr.push_back(PendingFill {
            addr,
            ready: self.cycle + self.latency,
            metadata,
            prefetch: false,
        });
    }

    /// Advance one cycle and return the fills that completed.
    pub fn tick(&mut self) -> Vec<Fill> {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut fills = Vec::new();
        let mut drain = |queue: &mut VecDeque<PendingFill>| {
            while queue.front().map_or(false, |p| p.ready <= cycle) {
                if let Some(p) = queue.pop_front() {
                    fills.push(Fill {
                        addr: p.addr,
                        set: 0,
                        way: 0,
                        prefetch: p.prefetch,
                        evicted_addr: 0,
                        metadata: p.metadata,
                    });
                }
            }
        };
        drain(&mut self.pq);
        drain(&mut self.mshr);
        fills
    }
}

impl CacheHost for ModelHost {
    fn prefetch_line(&mut self, pf_addr: u64, _fill_this_level: bool, metadata: u32) -> bool {
        if !self.accept || self.pq.len() >= self.pq_cap {
            return false;
        }
        self.pq.push_back(PendingFill {
            addr: pf_addr,
            ready: self.cycle + self.latency,
            metadata,
            prefetch: true,
        });
        self.accepted.push(pf_addr);
        true
    }

    fn pq_occupancy(&self) -> Vec<usize> {
        vec![self.pq.len()]
    }

    fn pq_size(&self) -> Vec<usize> {
        vec![self.pq_cap]
    }

    fn mshr_occupancy(&self) -> usize {
        self.mshr.len()
    }

    fn mshr_size(&self) -> usize {
        self.mshr_cap
    }

    fn inflight_prefetch(&self, line_addr: u64) -> bool {
        self.pq.iter().any(|p| (p.addr >> self.log2_block) == line_addr)
    }

    fn current_cycle(&self) -> u64 {
        self.cycle
    }
}
