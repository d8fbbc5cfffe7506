use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cardvault_cardindex::FlatIndex;

/// Deterministic pseudo-random unit vectors (xorshift).
fn unit_vectors(n: usize, dim: usize, mut state: u64) -> Vec<Vec<f32>> {
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 2000) as f32 / 1000.0 - 1.0
    };
    (0..n)
        .map(|_| {
            let mut v: Vec<f32> = (0..dim).map(|_| next()).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter_mut().for_each(|x| *x /= norm);
            v
        })
        .collect()
}

fn build_index(n: usize, dim: usize) -> FlatIndex {
    let mut idx = FlatIndex::new(dim).unwrap();
    for v in unit_vectors(n, dim, 0x9E37_79B9_7F4A_7C15) {
        idx.push(&v).unwrap();
    }
    idx
}

fn bench_search_10k(c: &mut Criterion) {
    let idx = build_index(10_000, 384);
    let query = unit_vectors(1, 384, 42).remove(0);

    c.bench_function("flat_search_10k_384d_top3", |b| {
        b.iter(|| {
            let _ = black_box(idx.search(black_box(&query), 3));
        });
    });
}

fn bench_search_50k(c: &mut Criterion) {
    let idx = build_index(50_000, 384);
    let query = unit_vectors(1, 384, 7).remove(0);

    c.bench_function("flat_search_50k_384d_top3", |b| {
        b.iter(|| {
            let _ = black_box(idx.search(black_box(&query), 3));
        });
    });
}

criterion_group!(benches, bench_search_10k, bench_search_50k);
criterion_main!(benches);
