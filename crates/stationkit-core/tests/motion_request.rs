use proptest::prelude::*;
use stationkit_core::{MachinePosition, MotionRequest};
use std::time::Duration;

#[test]
fn test_estimate_for_ten_units_at_600() {
    let request = MotionRequest::new(Some(10.0), None, None).with_feed_rate(600.0);
    let estimate = request.estimated_duration(&MachinePosition::new(0.0, 0.0, 0.0));
    assert!((estimate.as_secs_f64() - 1.0).abs() < 1e-9);

    let gcode = request.to_gcode();
    assert!(gcode.contains("X10.000"));
    assert!(gcode.contains("F600"));
    assert!(!gcode.contains('Y'));
}

#[test]
fn test_empty_request_has_zero_estimate() {
    let request = MotionRequest::default();
    assert!(request.is_empty());
    assert_eq!(
        request.estimated_duration(&MachinePosition::new(3.0, 4.0, 5.0)),
        Duration::ZERO
    );
}

proptest! {
    #[test]
    fn estimate_is_never_negative_and_scales_with_distance(
        x in -500.0f64..500.0,
        y in -500.0f64..500.0,
        feed in 1.0f64..20000.0,
    ) {
        let request = MotionRequest::new(Some(x), Some(y), None).with_feed_rate(feed);
        let from = MachinePosition::default();
        let expected = x.abs().max(y.abs()) / feed * 60.0;
        let estimate = request.estimated_duration(&from).as_secs_f64();
        prop_assert!(estimate >= 0.0);
        prop_assert!((estimate - expected).abs() < 1e-6);
    }
}
