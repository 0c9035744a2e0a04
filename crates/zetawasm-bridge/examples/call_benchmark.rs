//! Bridge call benchmarks against an engine module
//!
//! Run with: cargo run -p zetawasm-bridge --example call_benchmark --release -- <engine.wasm>
//!
//! The module path may also come from `ZETAWASM_ENGINE`.

use std::time::Instant;

use zetawasm_bridge::{BridgeConfig, EngineRuntime, GuestInstance, Handle, PreparedResponse, Query};

#[derive(Clone, PartialEq, prost::Message)]
struct FormatSqlRequest {
    #[prost(string, optional, tag = "1")]
    sql: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct FormatSqlResponse {
    #[prost(string, optional, tag = "1")]
    sql: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct PrepareQueryRequest {
    #[prost(string, optional, tag = "1")]
    sql: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct PreparedQueryState {
    #[prost(int64, optional, tag = "1")]
    prepared_query_id: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct PrepareQueryResponse {
    #[prost(message, optional, tag = "1")]
    prepared: Option<PreparedQueryState>,
}

impl PreparedResponse for PrepareQueryResponse {
    fn prepared_id(&self) -> Option<i64> {
        self.prepared.as_ref().and_then(|p| p.prepared_query_id)
    }
}

fn main() {
    let Some(path) = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ZETAWASM_ENGINE").ok())
    else {
        eprintln!("usage: call_benchmark <engine.wasm>  (or set ZETAWASM_ENGINE)");
        std::process::exit(2);
    };

    println!("=== Bridge Call Benchmarks ===\n");

    bench_module_loading(&path);
    bench_instantiation(&path);
    bench_arena(&path);
    bench_payload_calls(&path);
    bench_prepare_cycle(&path);

    println!("\n=== Benchmark Complete ===");
}

fn open(path: &str) -> GuestInstance {
    let runtime = EngineRuntime::new(BridgeConfig::default()).unwrap();
    runtime.open(path).unwrap()
}

fn bench_module_loading(path: &str) {
    println!("## Module Loading");

    let runtime = EngineRuntime::new(BridgeConfig::default()).unwrap();
    let mut times = Vec::new();

    // Engine modules are large; a few samples are enough
    for _ in 0..5 {
        let start = Instant::now();
        let _ = runtime.load_module(path).unwrap();
        times.push(start.elapsed().as_micros() as u64);
    }

    print_stats("load_module", &times);
    println!();
}

fn bench_instantiation(path: &str) {
    println!("## Instantiation");

    let runtime = EngineRuntime::new(BridgeConfig::default()).unwrap();
    let module = runtime.load_module(path).unwrap();

    let mut times = Vec::new();
    for _ in 0..20 {
        let start = Instant::now();
        let _ = runtime.instantiate(&module).unwrap();
        times.push(start.elapsed().as_micros() as u64);
    }

    print_stats("instantiate", &times);
    println!();
}

fn bench_arena(path: &str) {
    println!("## Guest Memory");

    let mut guest = open(path);

    for size in [64usize, 4096, 65536] {
        let data = vec![0xA5u8; size];
        let mut times = Vec::new();

        for _ in 0..1000 {
            let start = Instant::now();
            let ptr = guest.allocate(size as u32).unwrap();
            guest.write(ptr, &data).unwrap();
            let _ = guest.read(ptr, size).unwrap();
            guest.free(ptr).unwrap();
            times.push(start.elapsed().as_nanos() as u64 / 1000);
        }

        print_stats(&format!("alloc+write+read+free {}B", size), &times);
    }
    println!();
}

fn bench_payload_calls(path: &str) {
    println!("## Payload Calls");

    let mut guest = open(path);

    for sql in ["SELECT 1", "SELECT a, b, c FROM t WHERE a > 1 AND b < 2 ORDER BY c"] {
        let request = FormatSqlRequest {
            sql: Some(sql.to_string()),
        };

        // Warm up
        for _ in 0..10 {
            let _: FormatSqlResponse = guest.format_sql(&request).unwrap();
        }

        let mut times = Vec::new();
        for _ in 0..500 {
            let start = Instant::now();
            let _: FormatSqlResponse = guest.format_sql(&request).unwrap();
            times.push(start.elapsed().as_micros() as u64);
        }

        print_stats(&format!("format_sql ({} chars)", sql.len()), &times);
    }
    println!();
}

fn bench_prepare_cycle(path: &str) {
    println!("## Prepare / Unprepare");

    let mut guest = open(path);
    let request = PrepareQueryRequest {
        sql: Some("SELECT 1 AS one".to_string()),
    };

    let mut times = Vec::new();
    for _ in 0..200 {
        let start = Instant::now();
        let (handle, _): (Handle<Query>, PrepareQueryResponse) =
            guest.prepare::<Query, _, _>(&request).unwrap();
        guest.unprepare(handle).unwrap();
        times.push(start.elapsed().as_micros() as u64);
    }

    print_stats("prepare_query+unprepare_query", &times);
    println!();
}

fn print_stats(name: &str, times: &[u64]) {
    if times.is_empty() {
        println!("  {}: no samples", name);
        return;
    }

    let mut sorted = times.to_vec();
    sorted.sort();

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let mean = times.iter().sum::<u64>() as f64 / times.len() as f64;
    let p50 = sorted[sorted.len() / 2];
    let p99 = sorted[(sorted.len() * 99) / 100];

    println!("  {}: n={} min={}us mean={:.1}us p50={}us p99={}us max={}us",
             name, times.len(), min, mean, p50, p99, max);
}
