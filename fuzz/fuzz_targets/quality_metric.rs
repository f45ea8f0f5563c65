#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tmop::{QualityMetric, SmallMat};

fuzz_target!(|setup: Setup| {
    let d = setup.metric.dim();
    let mut t = SmallMat::zeros(d);
    for i in 0..d {
        for j in 0..d {
            t[(i, j)] = setup.entries[i * 3 + j];
        }
    }
    match setup.metric.evaluate(&t) {
        Ok(mu) => {
            assert!(mu >= 0.0 || mu.is_nan());
            let _ = setup.metric.gradient(&t).unwrap();
            let _ = setup.metric.hessian(&t).unwrap();
        }
        Err(e) => assert!(!(e.det > 0.0 && e.det.is_finite())),
    }
});

#[derive(Debug, Arbitrary)]
struct Setup {
    metric: QualityMetric,
    entries: [f64; 9],
}
