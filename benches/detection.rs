use barscan::detector::{BarcodeDetector, RxingDetector};
use barscan::testing::{blank_frame, synthetic_barcode_frame};
use barscan::types::Symbology;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn benchmark_detection(c: &mut Criterion) {
    let detector = RxingDetector::default();
    let qr = synthetic_barcode_frame("ABC123", Symbology::Qr, 232).expect("encode");
    let blank = blank_frame(640, 480);

    let mut group = c.benchmark_group("detect");
    group.bench_function("qr_hit", |b| {
        b.iter(|| {
            let _ = detector.detect(black_box(&qr));
        })
    });
    group.bench_function("blank_miss", |b| {
        b.iter(|| {
            let _ = detector.detect(black_box(&blank));
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_detection);
criterion_main!(benches);
