//! Production detector tests: real encode/decode through rxing and the
//! symbology-restriction contract.

use barscan::detector::{BarcodeDetector, RxingDetector};
use barscan::testing::{blank_frame, synthetic_barcode_frame};
use barscan::types::{Symbology, SymbologySet};

#[test]
fn test_qr_payload_round_trip() {
    let frame = synthetic_barcode_frame("ABC123", Symbology::Qr, 232).expect("encode");
    let detector = RxingDetector::default();

    let observations = detector.detect(&frame).expect("detection");
    assert!(!observations.is_empty());
    let observation = &observations[0];
    assert_eq!(observation.symbology, Symbology::Qr);
    assert_eq!(observation.payload.as_deref(), Some("ABC123"));
}

#[test]
fn test_code39_payload_round_trip() {
    let frame = synthetic_barcode_frame("SCAN39", Symbology::Code39, 200).expect("encode");
    let detector = RxingDetector::default();

    let observations = detector.detect(&frame).expect("detection");
    assert!(observations
        .iter()
        .any(|o| o.symbology == Symbology::Code39 && o.payload.as_deref() == Some("SCAN39")));
}

#[test]
fn test_ean13_payload_round_trip() {
    // Valid EAN-13 with check digit.
    let frame = synthetic_barcode_frame("5901234123457", Symbology::Ean13, 200).expect("encode");
    let detector = RxingDetector::default();

    let observations = detector.detect(&frame).expect("detection");
    assert!(observations
        .iter()
        .any(|o| o.symbology == Symbology::Ean13 && o.payload.as_deref() == Some("5901234123457")));
}

#[test]
fn test_detection_honors_the_configured_symbology_set() {
    // A physically present QR code must be ignored when QR is not configured.
    let frame = synthetic_barcode_frame("ABC123", Symbology::Qr, 232).expect("encode");
    let detector = RxingDetector::new(SymbologySet::new(vec![Symbology::Code39]));

    let observations = detector.detect(&frame).expect("detection");
    assert!(observations.is_empty());
}

#[test]
fn test_blank_frame_detects_nothing() {
    let detector = RxingDetector::default();
    let observations = detector.detect(&blank_frame(320, 240)).expect("detection");
    assert!(observations.is_empty());
}

#[test]
fn test_detector_set_accessor_preserves_order() {
    let set = SymbologySet::new(vec![Symbology::Code128, Symbology::Qr]);
    let detector = RxingDetector::new(set.clone());
    assert_eq!(detector.symbologies(), &set);
}
