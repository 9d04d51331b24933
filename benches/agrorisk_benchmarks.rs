use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use agrorisk::booster::{BoosterConfig, GradientBooster};
use agrorisk::data::Matrix;
use agrorisk::objective::Objective;

fn synthetic(rows: usize, cols: usize) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(0);
    let data: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(0.0..1.0)).collect();
    let y: Vec<f64> = (0..rows)
        .map(|i| {
            let mut v = 0.0;
            for j in 0..cols {
                v += data[j * rows + i] * (j + 1) as f64;
            }
            v + rng.gen_range(-0.5..0.5)
        })
        .collect();
    (data, y)
}

pub fn booster_benchmarks(c: &mut Criterion) {
    let rows = 2000;
    let cols = 10;
    let (data, y) = synthetic(rows, cols);
    let matrix = Matrix::new(&data, rows, cols);

    let cfg = BoosterConfig {
        objective: Objective::QuantileLoss { quantile: 0.9 },
        n_rounds: 50,
        ..BoosterConfig::default()
    };

    c.bench_function("quantile booster fit", |b| {
        b.iter(|| {
            let mut booster = GradientBooster::new(cfg.clone()).unwrap();
            booster.fit(black_box(&matrix), black_box(&y)).unwrap();
        })
    });

    let mut booster = GradientBooster::new(cfg).unwrap();
    booster.fit(&matrix, &y).unwrap();
    c.bench_function("booster predict", |b| {
        b.iter(|| booster.predict(black_box(&matrix), true))
    });
}

criterion_group!(benches, booster_benchmarks);
criterion_main!(benches);
