//! Decode throughput benchmark
//!
//! Measures `decode_packet` over plain UDP, Teredo and nested Teredo traffic,
//! plus the full threaded pipeline over the same mix.
//!
//! Run with `--quick` for a short pass.

use std::time::{Duration, Instant};

use crmonban_ingest::config::{Config, DecodeConfig};
use crmonban_ingest::core::{Packet, PacketIds, PacketProto};
use crmonban_ingest::decode::{decode_packet, DecodeStats, DecodeThreadVars};
use crmonban_ingest::engine::{MemoryCapture, PipelineBuilder, RawFrame};

/// Benchmark results
#[derive(Debug, Clone)]
struct BenchmarkResult {
    name: &'static str,
    packets: u64,
    elapsed: Duration,
    min_ns: u64,
    p50_ns: u64,
    p99_ns: u64,
}

impl BenchmarkResult {
    fn packets_per_second(&self) -> f64 {
        self.packets as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

fn ipv6_packet(next_header: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 40];
    buf[0] = 0x60;
    buf[4..6].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    buf[6] = next_header;
    buf[7] = 64;
    buf.extend_from_slice(payload);
    buf
}

fn ipv4_udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 28];
    buf[0] = 0x45;
    buf[2..4].copy_from_slice(&((28 + payload.len()) as u16).to_be_bytes());
    buf[8] = 64;
    buf[9] = 17;
    buf[20..22].copy_from_slice(&src_port.to_be_bytes());
    buf[22..24].copy_from_slice(&dst_port.to_be_bytes());
    buf[24..26].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn ipv6_udp(payload: &[u8]) -> Vec<u8> {
    let mut udp = Vec::with_capacity(8 + payload.len());
    udp.extend_from_slice(&3544u16.to_be_bytes());
    udp.extend_from_slice(&3544u16.to_be_bytes());
    udp.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    udp.extend_from_slice(&[0, 0]);
    udp.extend_from_slice(payload);
    ipv6_packet(17, &udp)
}

fn with_origin(inner: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x00, 0x00, 0x0d, 0x96, 0x3f, 0x57, 0xfe, 0xfd];
    buf.extend_from_slice(inner);
    buf
}

fn workload(name: &str) -> Vec<u8> {
    let inner = ipv6_packet(59, &[0x5a; 512]);
    match name {
        "plain udp" => ipv4_udp(53, 5353, &[0x5a; 512]),
        "teredo" => ipv4_udp(3544, 40000, &with_origin(&inner)),
        _ => ipv4_udp(3544, 40000, &with_origin(&ipv6_udp(&with_origin(&inner)))),
    }
}

fn bench_decode(name: &'static str, iterations: u64) -> BenchmarkResult {
    let data = workload(name);
    let tv = DecodeThreadVars::new(DecodeConfig::default(), DecodeStats::shared(), PacketIds::shared());
    let mut samples = Vec::with_capacity(iterations as usize);

    let start = Instant::now();
    for id in 0..iterations {
        let t = Instant::now();
        let mut packet = Packet::root(id, data.clone(), PacketProto::Ipv4);
        decode_packet(&tv, &mut packet);
        drop(tv.take_pending());
        packet.finish();
        samples.push(t.elapsed().as_nanos() as u64);
    }
    let elapsed = start.elapsed();

    samples.sort_unstable();
    let pct = |p: usize| samples.get(samples.len() * p / 100).copied().unwrap_or(0);

    BenchmarkResult {
        name,
        packets: iterations,
        elapsed,
        min_ns: samples.first().copied().unwrap_or(0),
        p50_ns: pct(50),
        p99_ns: pct(99),
    }
}

fn bench_pipeline(iterations: u64) -> BenchmarkResult {
    let names = ["plain udp", "teredo", "nested teredo"];
    let frames: Vec<RawFrame> = (0..iterations)
        .map(|i| RawFrame::new(workload(names[(i % 3) as usize]), PacketProto::Ipv4))
        .collect();

    let pipeline = match PipelineBuilder::from_config(&Config::default()).build() {
        Ok(p) => p,
        Err(e) => panic!("pipeline: {}", e),
    };

    let start = Instant::now();
    let mut running = match pipeline.start(Box::new(MemoryCapture::new(frames))) {
        Ok(r) => r,
        Err(e) => panic!("start: {}", e),
    };
    running.wait_capture();
    let stats = running.shutdown();
    let elapsed = start.elapsed();

    BenchmarkResult {
        name: "pipeline (mixed)",
        packets: stats.roots_finished + stats.derived_finished,
        elapsed,
        min_ns: 0,
        p50_ns: 0,
        p99_ns: 0,
    }
}

fn print_results(results: &[BenchmarkResult]) {
    println!(
        "{:<20} {:>10} {:>14} {:>10} {:>10} {:>10}",
        "workload", "packets", "pkt/s", "min ns", "p50 ns", "p99 ns"
    );
    println!("{}", "-".repeat(79));
    for r in results {
        println!(
            "{:<20} {:>10} {:>14.0} {:>10} {:>10} {:>10}",
            r.name,
            r.packets,
            r.packets_per_second(),
            r.min_ns,
            r.p50_ns,
            r.p99_ns
        );
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let quick = args.iter().any(|a| a == "--quick");
    let iterations = if quick { 10_000 } else { 200_000 };

    println!("crmonban-ingest Decode Benchmark\n");

    let results = vec![
        bench_decode("plain udp", iterations),
        bench_decode("teredo", iterations),
        bench_decode("nested teredo", iterations),
        bench_pipeline(iterations),
    ];

    print_results(&results);
}
