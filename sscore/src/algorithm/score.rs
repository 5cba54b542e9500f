//! Energy-reduction score of a template against a signal window.

/// Returns `||window||^2 - ||window - template||^2`.
///
/// Positive when subtracting the template removes energy from the window.
/// Both slices are flattened M*T blocks in the same layout.
#[inline]
pub fn compute_score(window: &[f64], template: &[f64]) -> f64 {
    debug_assert_eq!(window.len(), template.len());
    let (norm1_sq, norm2_sq) = window
        .iter()
        .zip(template.iter())
        .fold((0.0f64, 0.0f64), |(n1, n2), (&x, &t)| {
            let r = x - t;
            (n1 + x * x, n2 + r * r)
        });
    norm1_sq - norm2_sq
}

/// Subtracts `template` from `window` in place.
#[inline]
pub fn subtract_template(window: &mut [f64], template: &[f64]) {
    debug_assert_eq!(window.len(), template.len());
    for (x, &t) in window.iter_mut().zip(template.iter()) {
        *x -= t;
    }
}
