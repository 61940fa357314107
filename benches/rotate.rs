use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use alm_rs::{rotate_alm, Alm, Complex, WignerDRisbo};

fn random_alm(lmax: usize) -> Alm<'static, Complex<f64>> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut alm = Alm::zeros(lmax, lmax).unwrap();
    for m in 0..=lmax {
        for l in m..=lmax {
            *alm.at_mut(l, m) = Complex::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5);
        }
    }
    alm
}

fn bench_rotate(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotate_alm");
    for lmax in [64usize, 256, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(lmax), &lmax, |b, &lmax| {
            let mut alm = random_alm(lmax);
            b.iter(|| rotate_alm(&mut alm, 0.3, 0.7, -0.2).unwrap());
        });
    }
    group.finish();
}

fn bench_wigner(c: &mut Criterion) {
    let mut group = c.benchmark_group("wigner_recursion");
    for lmax in [128usize, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(lmax), &lmax, |b, &lmax| {
            b.iter(|| {
                let mut rec = WignerDRisbo::new(lmax, 0.7);
                for _ in 0..=lmax {
                    criterion::black_box(rec.advance());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rotate, bench_wigner);
criterion_main!(benches);
