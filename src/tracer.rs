//! A per-branch tracer: a bimodal predictor paired with a packed trace
//! writer that streams records through a compressor.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;

pub const BIMODAL_TABLE_SIZE: usize = 16384;
const BIMODAL_PRIME: u64 = 16381;
const COUNTER_MAX: u8 = 3;

/// Flush the buffer roughly every million branches.
const TRACE_BUFFER_RECORDS: usize = 1 << 20;

/// Branch classes as encoded in the trace format.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchClass {
    NotBranch = 0,
    CondDirect = 1,
    CondIndirect = 2,
    UncondDirect = 3,
    UncondIndirect = 4,
    Call = 5,
    Ret = 6,
}
impl BranchClass {
    pub fn from_raw(raw: i8) -> Option<Self> {
        match raw {
            0 => Some(Self::NotBranch),
            1 => Some(Self::CondDirect),
            2 => Some(Self::CondIndirect),
            3 => Some(Self::UncondDirect),
            4 => Some(Self::UncondIndirect),
            5 => Some(Self::Call),
            6 => Some(Self::Ret),
            _ => None,
        }
    }
}

/// One branch outcome as written to the trace: 18 bytes, no padding,
/// native endianness.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct BranchEvent {
    pub pc: u64,
    pub target: u64,
    /// 1 if taken, 0 otherwise.
    pub direction: u8,
    pub class: i8,
}

pub const BRANCH_EVENT_BYTES: usize = 18;

impl BranchEvent {
    fn write_to(&self, out: &mut Vec<u8>) {
        let (pc, target) = (self.pc, self.target);
        out.extend_from_slice(&pc.to_ne_bytes());
        out.extend_from_slice(&target.to_ne_bytes());
        out.push(self.direction);
        out.push(self.class as u8);
    }

    /// Decode one record from exactly [`BRANCH_EVENT_BYTES`] bytes.
    pub fn read_from(bytes: &[u8; BRANCH_EVENT_BYTES]) -> Self {
        let mut pc = [0u8; 8];
        let mut target = [0u8; 8];
        pc.copy_from_slice(&bytes[0..8]);
        target.copy_from_slice(&bytes[8..16]);
        Self {
            pc: u64::from_ne_bytes(pc),
            target: u64::from_ne_bytes(target),
            direction: bytes[16],
            class: bytes[17] as i8,
        }
    }
}

/// A table of 2-bit counters hashed by a prime modulus of the PC.
pub struct Bimodal {
    table: Vec<u8>,
}
impl Bimodal {
    pub fn new() -> Self {
        Self { table: vec![0; BIMODAL_TABLE_SIZE] }
    }

    fn hash(pc: u64) -> usize {
        (pc % BIMODAL_PRIME) as usize
    }

    pub fn predict(&self, pc: u64) -> bool {
        self.table[Self::hash(pc)] > COUNTER_MAX / 2
    }

    pub fn update(&mut self, pc: u64, taken: bool) {
        let ctr = &mut self.table[Self::hash(pc)];
        if taken {
            *ctr = (*ctr + 1).min(COUNTER_MAX);
        } else {
            *ctr = ctr.saturating_sub(1);
        }
    }
}

impl Default for Bimodal {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffered, compressed trace output.
///
/// Records accumulate in memory and are flushed through the compressor at
/// [`TRACE_BUFFER_RECORDS`]. Dropping the sink flushes and finishes the
/// stream, so the trace survives any termination path that unwinds.
pub struct TraceSink<W: Write> {
    encoder: Option<GzEncoder<W>>,
    buffer: Vec<BranchEvent>,
    records_written: u64,
}
impl TraceSink<File> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}
impl<W: Write> TraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            encoder: Some(GzEncoder::new(writer, Compression::default())),
            buffer: Vec::new(),
            records_written: 0,
        }
    }

    pub fn record(&mut self, event: BranchEvent) -> io::Result<()> {
        self.buffer.push(event);
        if self.buffer.len() >= TRACE_BUFFER_RECORDS {
            self.flush()?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written + self.buffer.len() as u64
    }

    pub fn flush(&mut self) -> io::Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(self.buffer.len() * BRANCH_EVENT_BYTES);
        for event in &self.buffer {
            event.write_to(&mut bytes);
        }
        encoder.write_all(&bytes)?;
        encoder.flush()?;
        self.records_written += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    /// Flush and close the compressed stream, returning the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        match self.encoder.take() {
            Some(encoder) => encoder.finish(),
            None => Err(io::Error::new(io::ErrorKind::Other, "sink already finished")),
        }
    }
}
impl<W: Write> Drop for TraceSink<W> {
    fn drop(&mut self) {
        let _ = self.flush();
        if let Some(encoder) = self.encoder.take() {
            let _ = encoder.finish();
        }
    }
}

/// The tracer itself: predicts with the bimodal table, records every
/// resolved branch, and splits counts into warmup and simulation phases by
/// retired-instruction count.
pub struct BranchTracer<W: Write> {
    bimodal: Bimodal,
    sink: TraceSink<W>,
    warmup_instr_limit: u64,
    warmup_branches: u64,
    simulation_branches: u64,
}
impl BranchTracer<File> {
    pub fn create(path: impl AsRef<Path>, warmup_instr_limit: u64) -> io::Result<Self> {
        info!("branch tracer writing to {:?}", path.as_ref());
        Ok(Self::new(TraceSink::create(path)?, warmup_instr_limit))
    }
}
impl<W: Write> BranchTracer<W> {
    pub fn new(sink: TraceSink<W>, warmup_instr_limit: u64) -> Self {
        Self {
            bimodal: Bimodal::new(),
            sink,
            warmup_instr_limit,
            warmup_branches: 0,
            simulation_branches: 0,
        }
    }

    pub fn predict(&self, pc: u64) -> bool {
        self.bimodal.predict(pc)
    }

    /// Record a resolved branch and train the predictor.
    pub fn resolve(
        &mut self,
        pc: u64,
        target: u64,
        taken: bool,
        class: BranchClass,
        retired_instrs: u64,
    ) -> io::Result<()> {
        self.bimodal.update(pc, taken);
        self.sink.record(BranchEvent {
            pc,
            target,
            direction: taken as u8,
            class: class as i8,
        })?;
        if self.warmup_instr_limit == 0 || retired_instrs < self.warmup_instr_limit {
            self.warmup_branches += 1;
        } else {
            self.simulation_branches += 1;
        }
        Ok(())
    }

    /// Branch counts split as `(warmup, simulation)`.
    pub fn counts(&self) -> (u64, u64) {
        (self.warmup_branches, self.simulation_branches)
    }

    /// Persist the phase counts alongside the trace.
    pub fn write_counts(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut f = File::create(path)?;
        writeln!(f, "warmup_branches {}", self.warmup_branches)?;
        writeln!(f, "simulation_branches {}", self.simulation_branches)?;
        Ok(())
    }

    /// Flush and close the trace.
    pub fn finish(self) -> io::Result<W> {
        self.sink.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn record_layout_is_18_bytes() {
        assert_eq!(std::mem::size_of::<BranchEvent>(), BRANCH_EVENT_BYTES);
        let mut bytes = Vec::new();
        BranchEvent { pc: 1, target: 2, direction: 1, class: BranchClass::Ret as i8 }
            .write_to(&mut bytes);
        assert_eq!(bytes.len(), BRANCH_EVENT_BYTES);
    }

    #[test]
    fn bimodal_learns_a_biased_branch() {
        let mut b = Bimodal::new();
        assert!(!b.predict(0x40));
        for _ in 0..4 {
            b.update(0x40, true);
        }
        assert!(b.predict(0x40));
        for _ in 0..4 {
            b.update(0x40, false);
        }
        assert!(!b.predict(0x40));
    }

    #[test]
    fn sink_round_trips_through_gzip() {
        let mut sink = TraceSink::new(Vec::new());
        let events = [
            BranchEvent { pc: 0x1000, target: 0x2000, direction: 1, class: 1 },
            BranchEvent { pc: 0x1004, target: 0x0, direction: 0, class: 6 },
        ];
        for e in events {
            sink.record(e).unwrap();
        }
        let compressed = sink.finish().unwrap();

        let mut raw = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut raw).unwrap();
        assert_eq!(raw.len(), 2 * BRANCH_EVENT_BYTES);
        let first = BranchEvent::read_from(raw[..BRANCH_EVENT_BYTES].try_into().unwrap());
        // Copy out of the packed struct before asserting; references into
        // it would be unaligned.
        let (pc, target, direction, class) =
            (first.pc, first.target, first.direction, first.class);
        assert_eq!(pc, 0x1000);
        assert_eq!(target, 0x2000);
        assert_eq!(direction, 1);
        assert_eq!(class, 1);
    }

    #[test]
    fn tracer_splits_counts_at_the_warmup_limit() {
        let mut tracer = BranchTracer::new(TraceSink::new(Vec::new()), 100);
        tracer.resolve(0x10, 0x20, true, BranchClass::CondDirect, 50).unwrap();
        tracer.resolve(0x10, 0x20, false, BranchClass::CondDirect, 150).unwrap();
        assert_eq!(tracer.counts(), (1, 1));
    }
}
