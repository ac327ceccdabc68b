use chrono::{Days, NaiveDate};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use domain::{Batch, OrderLine, allocate};

fn make_batches(count: u64) -> Vec<Batch> {
    let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    (0..count)
        .map(|n| {
            let eta = if n == 0 {
                None
            } else {
                start.checked_add_days(Days::new(count - n))
            };
            Batch::new(format!("batch-{n:04}"), "BENCH-SKU", 100, eta)
        })
        .collect()
}

fn bench_allocate_first_fit(c: &mut Criterion) {
    c.bench_function("domain/allocate_10_batches", |b| {
        b.iter_batched(
            || make_batches(10),
            |mut batches| {
                let line = OrderLine::new("order-1", "BENCH-SKU", 10);
                allocate(&line, batches.iter_mut()).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_allocate_until_exhausted(c: &mut Criterion) {
    c.bench_function("domain/allocate_100_lines_over_50_batches", |b| {
        b.iter_batched(
            || make_batches(50),
            |mut batches| {
                for n in 0..100 {
                    let line = OrderLine::new(format!("order-{n}"), "BENCH-SKU", 40);
                    allocate(&line, batches.iter_mut()).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_quantity_correction(c: &mut Criterion) {
    c.bench_function("domain/deallocate_to_fit_reduced_quantity", |b| {
        b.iter_batched(
            || {
                let mut batch = Batch::new("batch", "BENCH-SKU", 1000, None);
                for n in 0..100 {
                    batch.allocate(&OrderLine::new(format!("order-{n}"), "BENCH-SKU", 10));
                }
                batch
            },
            |mut batch| {
                batch.change_purchased_quantity(100);
                while batch.available_quantity() < 0 {
                    batch.deallocate_one().unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_allocate_first_fit,
    bench_allocate_until_exhausted,
    bench_quantity_correction,
);
criterion_main!(benches);
