use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use digitboost::dataset::cache_writer::write_training_cache;
use digitboost::dataset::mmap::open_training_cache;
use digitboost::features::flatten;
use digitboost::ml::gbdt::{BoostParams, train_gbdt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::{TempDir, tempdir};

const SAMPLE_COUNT: usize = 2_000;
const SIDE: usize = 28;

fn setup_cache() -> TempDir {
    let dir = tempdir().expect("tempdir");
    let mut rng = StdRng::seed_from_u64(7);
    let labels: Vec<i64> = (0..SAMPLE_COUNT).map(|i| (i % 10) as i64).collect();
    let mut pixels = vec![0.0f32; SAMPLE_COUNT * SIDE * SIDE];
    for (sample, &label) in pixels.chunks_exact_mut(SIDE * SIDE).zip(&labels) {
        // A noisy bright band whose row encodes the label.
        let row = 2 + label as usize * 2;
        for col in 0..SIDE {
            sample[row * SIDE + col] = 0.5 + rng.random::<f32>() * 0.5;
        }
        for value in sample.iter_mut().step_by(7) {
            *value += rng.random::<f32>() * 0.2;
        }
    }
    write_training_cache(
        &dir.path().join("images.dat"),
        &dir.path().join("labels.npy"),
        &pixels,
        &labels,
        SIDE * SIDE,
    )
    .expect("write cache");
    dir
}

fn bench_train_from_mmap(c: &mut Criterion) {
    let dir = setup_cache();
    let params = BoostParams {
        num_boost_round: 5,
        ..BoostParams::default()
    };
    c.bench_with_input(
        BenchmarkId::new("train_hist_mmap", SAMPLE_COUNT),
        &params,
        |b, params| {
            b.iter(|| {
                let (images, labels) = open_training_cache(
                    &dir.path().join("images.dat"),
                    &dir.path().join("labels.npy"),
                    1,
                    SIDE,
                    SIDE,
                )
                .expect("open cache");
                let view = images.view().expect("view");
                let features = flatten(view).expect("flatten");
                train_gbdt(black_box(features), labels.as_slice(), params).expect("train")
            });
        },
    );
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_train_from_mmap
}
criterion_main!(benches);
