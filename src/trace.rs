//! Access traces: binary replay files and synthetic streams.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::access::AccessKind;

/// One demand access as stored in a binary trace.
///
/// NOTE: The layout is kept in-sync *manually* with the trace producer;
/// files are a flat array of these records in native endianness.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AccessRecord {
    pub addr: u64,
    pub pc: u64,
    pub kind: u32,
}
impl AccessRecord {
    pub fn load(addr: u64, pc: u64) -> Self {
        Self { addr, pc, kind: AccessKind::Load as u32 }
    }

    pub fn kind(&self) -> Option<AccessKind> {
        AccessKind::from_raw(self.kind)
    }
}

/// A binary access trace held in memory as raw records.
pub struct BinaryAccessTrace {
    data: Vec<u8>,
    name: String,
    num_entries: usize,
}
impl BinaryAccessTrace {
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut f = File::open(path)?;
        let len = f.metadata()?.len() as usize;
        if len % std::mem::size_of::<AccessRecord>() != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trace length is not a whole number of records",
            ));
        }
        let num_entries = len / std::mem::size_of::<AccessRecord>();
        let mut data = vec![0; len];
        f.read_exact(&mut data)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { data, name, num_entries })
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reinterpret the raw bytes as records.
    pub fn as_slice(&self) -> &[AccessRecord] {
        unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const AccessRecord,
                self.num_entries,
            )
        }
    }
}

/// A strided demand stream: `count` loads starting at `base`, advancing by
/// `stride_blocks` each access, all from one PC.
pub fn strided_stream(
    base: u64,
    pc: u64,
    stride_blocks: i64,
    count: usize,
    block_size: u64,
) -> Vec<AccessRecord> {
    let step = stride_blocks * block_size as i64;
    (0..count)
        .map(|i| AccessRecord::load(base.wrapping_add((step * i as i64) as u64), pc))
        .collect()
}

/// A uniformly random demand stream over a wide address range, so that no
/// small block delta recurs often enough to train an offset.
pub fn random_stream(seed: u64, count: usize, block_size: u64) -> Vec<AccessRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let line: u64 = rng.gen_range(0..(1u64 << 40));
            let pc: u64 = rng.gen_range(0x1000..0x2000);
            AccessRecord::load(line * block_size, pc)
        })
        .collect()
}
