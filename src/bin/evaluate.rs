/// Evaluate every prefetcher variant against one or more access streams.
///
/// With no arguments, runs the built-in synthetic streams. Arguments are
/// treated as binary access-trace files.

use std::collections::BTreeSet;
use std::env;

use myelin::*;

/// An infinite-capacity line store. Just enough cache to produce hit,
/// miss, and useful-prefetch signals for the engine under test.
struct MiniCache {
    resident: BTreeSet<u64>,
    prefetched: BTreeSet<u64>,
}
impl MiniCache {
    fn new() -> Self {
        Self { resident: BTreeSet::new(), prefetched: BTreeSet::new() }
    }
}

fn run(cfg: EngineConfig, label: &str, records: &[AccessRecord]) {
    let block_shift = cfg.block_size.ilog2();
    let mut engine = match cfg.build() {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to build engine: {}", err);
            return;
        }
    };
    let mut host = ModelHost::new(16, 32, 20, block_shift);
    let mut cache = MiniCache::new();

    for rec in records {
        for fill in host.tick() {
            let line = fill.addr >> block_shift;
            cache.resident.insert(line);
            if fill.prefetch {
                cache.prefetched.insert(line);
            }
            engine.on_fill(fill);
        }

        let line = rec.addr >> block_shift;
        let hit = cache.resident.contains(&line);
        let useful = hit && cache.prefetched.remove(&line);
        let kind = rec.kind().unwrap_or(AccessKind::Load);
        engine.on_access(
            &mut host,
            Access {
                addr: rec.addr,
                pc: rec.pc,
                cache_hit: hit,
                useful_prefetch: useful,
                kind,
                metadata: 0,
            },
        );
        if !hit {
            host.demand_miss(rec.addr, 0);
        }
        engine.on_cycle();
    }

    println!("[*] {:10} {} ({} accesses)", engine.config().name, label, records.len());
    println!("    learned offsets: {:?}", engine.learned_offsets());
    for line in engine.final_stats().to_string().lines() {
        println!("    {}", line);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        for path in &args[1..] {
            match BinaryAccessTrace::from_file(path) {
                Ok(trace) => {
                    for cfg in EngineConfig::all_presets() {
                        run(cfg, trace.name(), trace.as_slice());
                    }
                }
                Err(err) => eprintln!("{}: {}", path, err),
            }
        }
        return;
    }

    let streams: Vec<(&str, Vec<AccessRecord>)> = vec![
        ("stride-1", strided_stream(0x40_0000, 0x1000, 1, 20_000, 64)),
        ("stride-3", strided_stream(0x80_0000, 0x1004, 3, 20_000, 64)),
        ("stride-neg-2", strided_stream(0xc0_0000, 0x1008, -2, 20_000, 64)),
        ("random", random_stream(0xdead, 20_000, 64)),
    ];
    for (label, records) in &streams {
        for cfg in EngineConfig::all_presets() {
            run(cfg, label, records);
        }
        println!();
    }
}
