//! Assertion helpers for tests.

use kubelka::Spectrum;

/// Assert two numbers agree within `tolerance`
pub fn assert_close(actual: f64, expected: f64, tolerance: f64, context: &str) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{}: expected {} ± {}, got {}",
        context,
        expected,
        tolerance,
        actual
    );
}

/// Assert two spectra share a grid and agree everywhere within `tolerance`
pub fn assert_spectrum_close(actual: &Spectrum, expected: &Spectrum, tolerance: f64, context: &str) {
    assert!(
        actual.same_grid(expected),
        "{}: grid {}-{} nm, expected {}-{} nm",
        context,
        actual.start_nm(),
        actual.end_nm(),
        expected.start_nm(),
        expected.end_nm()
    );
    for ((nm, a), e) in actual.iter().zip(expected.values()) {
        assert_close(a, *e, tolerance, &format!("{} at {} nm", context, nm));
    }
}
