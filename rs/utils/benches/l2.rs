use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use utils::distance::l2::{l2sqr_u8, L2Accumulator, L2DistanceCalculator};
use utils::test_utils::generate_random_vector;
use utils::{DistanceCalculator, StreamingDistanceCalculator};

fn bench_l2_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("L2 Distance");
    for size in [
        8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096,
        384,  // VECTOR_DIM_SENTENCE_TRANSFORMERS_MINI_LM
        768,  // VECTOR_DIM_SENTENCE_TRANSFORMERS_MPNET
        1536, // VECTOR_DIM_OPENAI_SMALL
    ]
    .iter()
    {
        let a = generate_random_vector(*size);
        let b = generate_random_vector(*size);

        group.bench_with_input(BenchmarkId::new("Scalar", *size), &size, |bencher, _| {
            bencher.iter(|| L2DistanceCalculator::calculate_scalar(black_box(&a), black_box(&b)))
        });

        group.bench_with_input(BenchmarkId::new("SIMD", *size), &size, |bencher, _| {
            bencher.iter(|| L2DistanceCalculator::calculate_simd(black_box(&a), black_box(&b)))
        });

        group.bench_with_input(BenchmarkId::new("Dispatch", *size), &size, |bencher, _| {
            bencher.iter(|| L2DistanceCalculator::calculate(black_box(&a), black_box(&b)))
        });

        // Same vector split into 8 streamed chunks, as a PQ code distance would be
        let mut accumulator = L2Accumulator::new();
        let chunk = (*size / 8).max(1);
        group.bench_with_input(BenchmarkId::new("Streaming", *size), &size, |bencher, _| {
            bencher.iter(|| {
                for (x, y) in a.chunks(chunk).zip(b.chunks(chunk)) {
                    accumulator.stream(black_box(x), black_box(y));
                }
                accumulator.finalize()
            })
        });

        let a_u8: Vec<u8> = a.iter().map(|&x| (x * 255.0) as u8).collect();
        let b_u8: Vec<u8> = b.iter().map(|&x| (x * 255.0) as u8).collect();
        group.bench_with_input(BenchmarkId::new("U8", *size), &size, |bencher, _| {
            bencher.iter(|| l2sqr_u8(black_box(&a_u8), black_box(&b_u8)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_l2_distance);
criterion_main!(benches);
