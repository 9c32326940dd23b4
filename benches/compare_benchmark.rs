use criterion::{Criterion, black_box, criterion_group, criterion_main};
use visreg::capture::{draw_rect, solid};
use visreg::compare::{CompareOptions, compare_images};
use visreg::scenario::CompareMode;

fn benchmark_compare(c: &mut Criterion) {
    let reference = solid(768, 512, [40, 40, 40, 255]);
    let mut capture = reference.clone();
    draw_rect(&mut capture, 100, 100, 200, 120, [255, 0, 0, 255]);

    let options = CompareOptions {
        fuzz: 13,
        trim_edges: 0,
        diff_image: false,
    };
    c.bench_function("compare_768x512_percent", |b| {
        b.iter(|| {
            let result = compare_images(
                black_box(&capture),
                black_box(&reference),
                5.0,
                CompareMode::MaxPercent,
                &options,
            );
            assert!(result.is_ok());
        })
    });

    let with_diff = CompareOptions {
        diff_image: true,
        ..options
    };
    c.bench_function("compare_768x512_exact_with_diff", |b| {
        b.iter(|| {
            let result = compare_images(
                black_box(&capture),
                black_box(&reference),
                0.0,
                CompareMode::Exact,
                &with_diff,
            );
            assert!(result.is_ok());
        })
    });
}

criterion_group!(benches, benchmark_compare);
criterion_main!(benches);
