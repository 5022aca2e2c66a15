//! Performance benchmarks for the collection cache.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use photo_sync::api::wire;
use photo_sync::{
    CollectionKey, CollectionState, CollectionStore, Generation, Item, ItemId, LoadTicket, Page,
    ViewId,
};
use serde_json::json;
use std::collections::HashMap;

fn page(start: usize, len: usize, has_more: bool) -> Page {
    Page {
        items: (start..start + len)
            .map(|i| {
                Item::new(format!("p{}", i))
                    .with_likes(i % 3 == 0, i as i64)
                    .with_field("title", json!(format!("photo {}", i)))
            })
            .collect(),
        has_more,
    }
}

/// Benchmark appending a page to views of growing length
fn bench_merge_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_page");

    for loaded in [12, 120, 1200] {
        group.bench_with_input(BenchmarkId::new("loaded", loaded), &loaded, |b, &loaded| {
            let mut base = CollectionState::new(CollectionKey::feed(), Generation(1));
            let (pending, removing) = (HashMap::new(), HashMap::new());
            base.merge_page(1, page(0, loaded, true), &pending, &removing);
            // Half the next page overlaps what is loaded
            let next = page(loaded - 6, 12, true);

            b.iter(|| {
                let mut state = base.clone();
                black_box(state.merge_page(2, next.clone(), &pending, &removing));
            });
        });
    }

    group.finish();
}

/// Benchmark the store path: ticket, generation check, merge
fn bench_store_apply(c: &mut Criterion) {
    c.bench_function("store_apply_page", |b| {
        let view = ViewId::new("home");
        let fetched = page(0, 12, true);
        b.iter(|| {
            let store = CollectionStore::new();
            store.open(&view, CollectionKey::feed());
            let ticket: LoadTicket = store.begin_load(&view).unwrap();
            black_box(store.apply_page(&ticket, fetched.clone()).unwrap());
        });
    });
}

/// Benchmark optimistic like and settle across several views
fn bench_optimistic_toggle(c: &mut Criterion) {
    let store = CollectionStore::new();
    for name in ["home", "saved", "search"] {
        let view = ViewId::new(name);
        store.open(&view, CollectionKey::search(name));
        let ticket = store.begin_load(&view).unwrap();
        store.apply_page(&ticket, page(0, 240, true)).unwrap();
    }
    let id = ItemId::new("p200");

    c.bench_function("optimistic_toggle", |b| {
        b.iter(|| {
            store.begin_item_mutation(&id, |state| state.like_count += 1);
            black_box(store.settle_item(&id, |state| state.like_count -= 1));
        });
    });
}

/// Benchmark decoding a page body
fn bench_parse_page(c: &mut Criterion) {
    let body = json!({
        "photos": (0..12).map(|i| json!({
            "_id": format!("p{}", i),
            "isLiked": i % 2 == 0,
            "likes": ["u1", "u2"],
            "title": "sunset",
            "location": "Lisbon",
        })).collect::<Vec<_>>(),
        "hasMore": true,
    });

    c.bench_function("parse_page", |b| {
        b.iter(|| black_box(wire::parse_page(body.clone(), 12, None).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_merge_page,
    bench_store_apply,
    bench_optimistic_toggle,
    bench_parse_page,
);

criterion_main!(benches);
