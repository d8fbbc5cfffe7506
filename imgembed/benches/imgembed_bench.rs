use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cardvault_imgembed::{CardEmbedder, DescriptorModel, DynamicImage};
use image::{Rgb, RgbImage};

fn make_card(w: u32, h: u32, seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            ((x * 3 + seed) % 256) as u8,
            ((y * 5 + seed) % 256) as u8,
            (((x + y) * 7) % 256) as u8,
        ])
    }))
}

fn bench_embed_small(c: &mut Criterion) {
    let model = DescriptorModel::new();
    let img = make_card(245, 342, 1); // thumbnail-sized scan

    c.bench_function("imgembed_descriptor_245x342", |b| {
        b.iter(|| {
            let _ = black_box(model.embed(black_box(&img)));
        });
    });
}

fn bench_embed_photo(c: &mut Criterion) {
    let model = DescriptorModel::new();
    let img = make_card(1200, 1680, 2); // phone photo crop

    c.bench_function("imgembed_descriptor_1200x1680", |b| {
        b.iter(|| {
            let _ = black_box(model.embed(black_box(&img)));
        });
    });
}

fn bench_embed_batch(c: &mut Criterion) {
    let model = DescriptorModel::new();
    let images: Vec<DynamicImage> = (0..32).map(|i| make_card(245, 342, i)).collect();

    c.bench_function("imgembed_descriptor_batch_32", |b| {
        b.iter(|| {
            let _ = black_box(model.embed_batch(black_box(&images)));
        });
    });
}

criterion_group!(benches, bench_embed_small, bench_embed_photo, bench_embed_batch);
criterion_main!(benches);
