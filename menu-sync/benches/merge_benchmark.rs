use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use menu_sync::broadcast::BroadcastMerger;
use menu_sync::model::{ItemId, MenuItem};
use menu_sync::normalize::normalize;
use menu_sync::protocol::{decode_notification, encode_notification, ChangeNotification};
use menu_sync::spreadsheet::{template_rows, Row};
use menu_sync::store::OptimisticStore;
use tokio::runtime::Runtime;

fn menu(n: i64) -> Vec<MenuItem> {
    (0..n)
        .map(|i| {
            MenuItem::new(format!("Item {i}"), i as f64)
                .with_id(i)
                .with_category("Mains")
                .with_tags(["veg", "house"])
        })
        .collect()
}

fn bench_upsert_existing_1k(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = OptimisticStore::with_items(menu(1_000));
    let merger = BroadcastMerger::default();
    let update = MenuItem::new("Renamed", 1.0).with_id(500);

    c.bench_function("merge_upsert_existing_1k", |b| {
        b.iter(|| {
            rt.block_on(merger.apply(&store, ChangeNotification::Upsert(black_box(update.clone()))));
        })
    });
}

fn bench_full_replace_1k(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = OptimisticStore::new();
    let merger = BroadcastMerger::default();
    let items = menu(1_000);

    c.bench_function("merge_full_replace_1k", |b| {
        b.iter(|| {
            rt.block_on(merger.apply(&store, ChangeNotification::FullReplace(black_box(items.clone()))));
        })
    });
}

fn bench_delete_marker_1k(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let merger = BroadcastMerger::default();
    let items = menu(1_000);

    c.bench_function("merge_delete_marker_1k", |b| {
        b.iter(|| {
            let store = OptimisticStore::with_items(items.clone());
            rt.block_on(merger.apply(&store, ChangeNotification::DeleteMarker(black_box(ItemId::Int(999)))));
        })
    });
}

fn bench_envelope_decode(c: &mut Criterion) {
    let frame = encode_notification(&ChangeNotification::FullReplace(menu(100))).unwrap();

    c.bench_function("envelope_decode_100_items", |b| {
        b.iter(|| {
            black_box(decode_notification(black_box(&frame)).unwrap());
        })
    });
}

fn bench_normalize_rows(c: &mut Criterion) {
    let rows: Vec<Row> = std::iter::repeat_with(|| template_rows().remove(0))
        .take(500)
        .collect();

    c.bench_function("normalize_500_rows", |b| {
        b.iter(|| {
            black_box(normalize(black_box(&rows)));
        })
    });
}

criterion_group!(
    benches,
    bench_upsert_existing_1k,
    bench_full_replace_1k,
    bench_delete_marker_1k,
    bench_envelope_decode,
    bench_normalize_rows,
);
criterion_main!(benches);
