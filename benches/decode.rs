//! Benchmarks for the heart rate codec and the per-notification path.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use hrm_osc_bridge::heart_rate::{decode, encode};
use hrm_osc_bridge::output::{PublishError, Publisher};
use hrm_osc_bridge::session::handle_notification;
use hrm_osc_bridge::{Measurement, SensorContact};
use std::hint::black_box;

/// Publisher that drops everything, so only decode and dispatch are measured.
struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _path: &str, heart_rate: u16) -> Result<(), PublishError> {
        black_box(heart_rate);
        Ok(())
    }
}

/// Heart rate only, 8-bit
fn minimal_payload() -> Vec<u8> {
    vec![0x00, 0x4B]
}

/// 16-bit heart rate, contact detected, energy expended and `rr_count` RR intervals
fn full_payload(rr_count: usize) -> Vec<u8> {
    encode(&Measurement {
        heart_rate: 300,
        sensor_contact: SensorContact::Detected,
        energy_expended: Some(1234),
        rr_intervals: (0..rr_count).map(|i| (800 + i) as f64 / 1024.0).collect(),
    })
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    let minimal = minimal_payload();
    group.bench_function("heart_rate_only", |b| {
        b.iter(|| decode(black_box(&minimal)))
    });

    for rr_count in [1, 4, 9] {
        let payload = full_payload(rr_count);
        group.bench_with_input(
            BenchmarkId::new("all_fields", rr_count),
            &payload,
            |b, payload| b.iter(|| decode(black_box(payload))),
        );
    }

    let truncated = vec![0x18, 0x4B, 0x0A];
    group.bench_function("truncated", |b| b.iter(|| decode(black_box(&truncated))));

    group.finish();
}

fn bench_notifications(c: &mut Criterion) {
    let mut group = c.benchmark_group("notifications");
    let publisher = NullPublisher;
    let payload = full_payload(2);

    for batch_size in [1, 10, 100] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &size| {
                b.iter(|| {
                    for _ in 0..size {
                        black_box(handle_notification(
                            &payload,
                            "/avatar/parameters/HR",
                            Some(&publisher),
                        ));
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_notifications);
criterion_main!(benches);
