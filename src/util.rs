use ndarray::prelude::*;
use std::fmt;



// n evenly spaced samples across `length`, with sample n/2 sitting on zero
pub fn coords(length: f64, n: usize) -> Array1<f64> {
    let half = (n/2) as f64;

    Array::from_shape_fn(n, |i| (i as f64-half)*length/n as f64)
}

/// DFT bin frequencies for `n` samples spaced by `dt`. The zero frequency is
/// at index 0, followed by the positive then the negative frequencies.
pub fn fftfreq(n: usize, dt: f64) -> Array1<f64> {
    let split = (n+1)/2;
    let scale = dt*n as f64;

    Array::from_shape_fn(n, |i| {
        if i < split { i as f64/scale } else { (i as f64-n as f64)/scale }
    })
}

/// Rotate a sequence so that the element at `(n+1)/2` comes first, moving the
/// zero frequency of an `fftfreq` layout to the middle.
pub fn fftshift<T: Clone>(v: ArrayView1<T>) -> Array1<T> {
    let n = v.len();
    let first = (n+1)/2;

    Array::from_shape_fn(n, |i| v[(i+first)%n].clone())
}



/// A measured quantity and its uncertainty.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ValueWithError {
    pub value: f64,
    pub err: f64
}

impl ValueWithError {
    pub fn new(value: f64, err: f64) -> Self {
        Self { value, err }
    }

    pub fn scaled(self, k: f64) -> Self {
        Self { value: self.value*k, err: (self.err*k).abs() }
    }
}

impl fmt::Display for ValueWithError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} +/- {}", self.value, self.err)
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_all_close(actual: ArrayView1<f64>, expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());

        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(a, e, epsilon = 1e-6);
        }
    }

    #[test]
    fn fftfreq_even_and_odd() {
        assert_all_close(fftfreq(4, 0.25).view(), &[0., 1., -2., -1.]);
        assert_all_close(fftfreq(5, 0.2).view(), &[0., 1., 2., -2., -1.]);
    }

    #[test]
    fn fftshift_centres_zero_frequency() {
        assert_all_close(fftshift(fftfreq(4, 0.25).view()).view(), &[-2., -1., 0., 1.]);
        assert_all_close(fftshift(fftfreq(5, 0.2).view()).view(), &[-2., -1., 0., 1., 2.]);
    }

    #[test]
    fn fftshift_of_empty_is_empty() {
        let empty = Array1::<f64>::zeros(0);

        assert_eq!(fftshift(empty.view()).len(), 0);
    }

    #[test]
    fn coords_are_centred() {
        let xs = coords(4., 4);

        assert_all_close(xs.view(), &[-2., -1., 0., 1.]);

        let ys = coords(10., 5);

        assert_all_close(ys.view(), &[-4., -2., 0., 2., 4.]);
    }

    #[test]
    fn scaled_keeps_error_positive() {
        let v = ValueWithError::new(1.5, 0.25).scaled(-2.);

        assert_eq!(v, ValueWithError::new(-3., 0.5));
    }
}
