use ndarray::prelude::*;
use ndarray::{par_azip, Zip};
use ndrustfft::Complex;
use thiserror::Error;



/// Default tolerance for [`ComplexGrid::equals_approx`].
pub const DEFAULT_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("could not allocate a {rows}x{cols} grid")]
    Allocation { rows: usize, cols: usize },

    #[error("grid dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch { expected: (usize, usize), found: (usize, usize) }
}



/// Dense `rows x cols` grid of complex doubles, stored row-major.
///
/// Cloning always duplicates the backing storage. The only aliased access is
/// through [`ComplexGrid::buffer`] and [`ComplexGrid::buffer_mut`], which hand
/// the storage to the transform executor.
#[derive(Clone, Debug)]
pub struct ComplexGrid {
    data: Array2<Complex<f64>>
}

impl ComplexGrid {
    /// Allocates a zeroed grid, failing with `GridError::Allocation` instead of
    /// aborting when the storage cannot be obtained.
    pub fn new(rows: usize, cols: usize) -> Result<Self, GridError> {
        let err = GridError::Allocation { rows, cols };
        let len = rows.checked_mul(cols).ok_or(err)?;
        let mut store = Vec::new();

        store.try_reserve_exact(len).map_err(|_| err)?;
        store.resize(len, Complex::new(0., 0.));

        let data = Array2::from_shape_vec((rows, cols), store).map_err(|_| err)?;

        Ok(Self { data })
    }

    pub fn from_array(data: Array2<Complex<f64>>) -> Self {
        Self { data: data.as_standard_layout().into_owned() }
    }

    /// Builds a grid from real rows, mostly useful for small literal grids.
    pub fn from_real_rows(rows: &[&[f64]]) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());

        let data = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| {
            Complex::new(rows[i][j], 0.)
        });

        Self { data }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Reads element `(row, col)`. The caller guarantees `row < rows()` and
    /// `col < cols()`; out of range indices panic.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Complex<f64> {
        self.data[[row, col]]
    }

    /// Writes element `(row, col)`, with the same precondition as [`get`].
    ///
    /// [`get`]: ComplexGrid::get
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: Complex<f64>) {
        self.data[[row, col]] = value;
    }

    pub fn fill(&mut self, value: Complex<f64>) {
        self.data.fill(value);
    }

    /// True iff both grids have the same shape and every pair of elements
    /// satisfies `|a - b| < epsilon` (absolute difference of the modulus).
    pub fn equals_approx(&self, other: &Self, epsilon: f64) -> bool {
        if self.dim() != other.dim() {
            return false;
        }

        Zip::from(&self.data)
            .and(&other.data)
            .all(|&a, &b| (a-b).norm() < epsilon)
    }

    /// New grid with `result[j][i] = self[i][j]`.
    pub fn transpose(&self) -> Self {
        Self { data: self.data.t().as_standard_layout().into_owned() }
    }

    /// In-place `self[i][j] *= other[i][j]`.
    pub fn multiply_elementwise(&mut self, other: &Self) -> Result<(), GridError> {
        self.check_dim(other.dim())?;

        par_azip!((a in &mut self.data, &b in &other.data) { *a *= b; });

        Ok(())
    }

    pub fn scale_by(&mut self, scalar: f64) {
        par_azip!((a in &mut self.data) { *a *= scalar; });
    }

    /// Multiplies by the reciprocal of `scalar`. A zero scalar fills the grid
    /// with infinities and NaNs; avoiding it is up to the caller.
    pub fn divide_by(&mut self, scalar: f64) {
        self.scale_by(1./scalar);
    }

    /// Applies `metric` to every element, e.g. `Complex::norm` or `Complex::arg`.
    pub fn map_real<F>(&self, metric: F) -> Array2<f64>
    where F: Fn(Complex<f64>) -> f64 + Sync + Send
    {
        let mut out = Array2::<f64>::zeros(self.dim());

        par_azip!((o in &mut out, &v in &self.data) { *o = metric(v); });

        out
    }

    pub fn view(&self) -> ArrayView2<Complex<f64>> {
        self.data.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut2<Complex<f64>> {
        self.data.view_mut()
    }

    /// The backing storage itself, not a copy. Used by the transform executor.
    pub fn buffer(&self) -> &Array2<Complex<f64>> {
        &self.data
    }

    /// Mutable alias of the backing storage. Writes through it are writes to
    /// this grid; this is the single intended aliasing point.
    pub fn buffer_mut(&mut self) -> &mut Array2<Complex<f64>> {
        &mut self.data
    }

    pub(crate) fn check_dim(&self, found: (usize, usize)) -> Result<(), GridError> {
        if self.dim() == found {
            Ok(())
        }
        else {
            Err(GridError::DimensionMismatch { expected: self.dim(), found })
        }
    }
}
