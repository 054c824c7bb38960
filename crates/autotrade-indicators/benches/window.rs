//! Benchmarks for the window and weighted average primitives.

use autotrade_indicators::{TimeWindow, WeightedAverageCalculator};
use chrono::{TimeDelta, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_test_data(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn benchmark_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("TimeWindow::append");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("30m", size), &data, |b, data| {
            b.iter(|| {
                let window = TimeWindow::from_minutes(30);
                for (i, value) in data.iter().enumerate() {
                    window.append(black_box(*value), start + TimeDelta::seconds(i as i64 * 10));
                }
                window.len()
            })
        });
    }

    group.finish();
}

fn benchmark_weighted_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("WeightedAverage");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let calculator = WeightedAverageCalculator::new();

    for minutes in [5, 30, 120].iter() {
        let window = TimeWindow::from_minutes(*minutes);
        for (i, value) in generate_test_data(*minutes as usize * 6 + 1).iter().enumerate() {
            window.append(*value, start + TimeDelta::seconds(i as i64 * 10));
        }

        group.bench_with_input(BenchmarkId::new("window_minutes", minutes), &window, |b, window| {
            b.iter(|| calculator.calculate(black_box(window)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_append, benchmark_weighted_average);
criterion_main!(benches);
