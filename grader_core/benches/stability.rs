use criterion::{Criterion, black_box, criterion_group, criterion_main};
use grader_core::{StabilityCfg, StabilityDetector, ThresholdTable, WeightSample};

fn bench_observe(c: &mut Criterion) {
    let samples: Vec<WeightSample> = (0..1_000u64)
        .map(|i| {
            // damped oscillation settling around 320 g
            let t = i as f32 / 20.0;
            let g = 320.0 + 40.0 * (-t / 8.0).exp() * (t * 3.0).sin();
            WeightSample::new(g, i * 20)
        })
        .collect();

    c.bench_function("stability_observe_1000", |b| {
        b.iter(|| {
            let mut d = StabilityDetector::new(StabilityCfg::default());
            let table = ThresholdTable::default();
            let mut graded = 0u32;
            for s in &samples {
                if d.observe(black_box(*s)) == grader_core::StabilityState::Stable {
                    let _ = table.classify(s.grams);
                    d.reset();
                    graded += 1;
                }
            }
            black_box(graded)
        });
    });
}

criterion_group!(benches, bench_observe);
criterion_main!(benches);
