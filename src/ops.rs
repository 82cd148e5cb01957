use crate::grid::ComplexGrid;
use crate::util::ValueWithError;
use ndarray::prelude::*;
use ndrustfft::Complex;
use rayon::prelude::*;



/// Magnitude below which a cell counts as empty for statistics.
pub const MAGNITUDE_EPSILON: f64 = 1e-9;

/// Half-open sub-rectangle `[row_min, row_max) x [col_min, col_max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize
}

impl Limits {
    pub fn full(rows: usize, cols: usize) -> Self {
        Self { row_min: 0, row_max: rows, col_min: 0, col_max: cols }
    }

    pub fn is_empty(&self) -> bool {
        self.row_min >= self.row_max || self.col_min >= self.col_max
    }

    pub fn rows(&self) -> usize {
        self.row_max.saturating_sub(self.row_min)
    }

    pub fn cols(&self) -> usize {
        self.col_max.saturating_sub(self.col_min)
    }
}

/// Outcome of a 1D feature search. `Exhausted` carries the last scanned
/// position, which callers may still use as a lenient estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scan {
    Found(ValueWithError),
    Exhausted(ValueWithError)
}

impl Scan {
    pub fn value(self) -> ValueWithError {
        match self {
            Scan::Found(v) | Scan::Exhausted(v) => v
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Scan::Found(_))
    }
}



fn shift_amounts(rows: usize, cols: usize) -> (usize, usize) {
    ((rows+1)/2, (cols+1)/2)
}

fn rotated(grid: &ComplexGrid, sr: usize, sc: usize) -> ComplexGrid {
    let (rows, cols) = grid.dim();
    let src = grid.view();

    ComplexGrid::from_array(Array2::from_shape_fn((rows, cols), |(i, j)| {
        src[[(i+sr)%rows, (j+sc)%cols]]
    }))
}

fn rotate_in_place(grid: &mut ComplexGrid, sr: usize, sc: usize) {
    let (rows, cols) = grid.dim();

    match grid.buffer_mut().as_slice_mut() {
        Some(flat) => {
            for row in flat.chunks_exact_mut(cols.max(1)) {
                row.rotate_left(sc%cols.max(1));
            }

            flat.rotate_left((sr%rows.max(1))*cols);
        },
        None => *grid = rotated(grid, sr, sc)
    }
}

/// New grid with `result[i][j] = grid[(i+sr) % rows][(j+sc) % cols]`, where
/// `sr = (rows+1)/2` and `sc = (cols+1)/2`. Shifting twice is the identity only
/// when both dimensions are even.
pub fn fftshift_grid(grid: &ComplexGrid) -> ComplexGrid {
    let (sr, sc) = shift_amounts(grid.rows(), grid.cols());

    rotated(grid, sr, sc)
}

/// Same rotation as [`fftshift_grid`], done on the grid's own storage.
pub fn fftshift_grid_in_place(grid: &mut ComplexGrid) {
    let (sr, sc) = shift_amounts(grid.rows(), grid.cols());

    rotate_in_place(grid, sr, sc);
}

/// Inverse of [`fftshift_grid_in_place`] for any size: rotates by `rows/2`
/// and `cols/2`, bringing the cell at the centre index back to `[0][0]`.
pub fn ifftshift_grid_in_place(grid: &mut ComplexGrid) {
    let (rows, cols) = grid.dim();

    rotate_in_place(grid, rows/2, cols/2);
}



/// Bounding box of the cells whose metric is large, either relative to the
/// largest metric (`> rel_sens*max`) or in absolute terms (`> abs_sens`).
/// A sensitivity of zero switches its criterion off. When nothing qualifies
/// the returned limits are empty (`row_min > row_max`).
pub fn find_interesting_region<F>(
    grid: &ComplexGrid,
    metric: F,
    abs_sens: f64,
    rel_sens: f64
) -> Limits
where F: Fn(Complex<f64>) -> f64 + Sync + Send
{
    let (rows, cols) = grid.dim();
    let values = grid.map_real(|v| metric(v).abs());
    let max = values.iter().cloned().fold(0., f64::max);

    let rel_threshold = if rel_sens == 0. { f64::INFINITY } else { rel_sens*max };
    let abs_threshold = if abs_sens == 0. { f64::INFINITY } else { abs_sens };

    let hit = |m: f64| m > rel_threshold || m > abs_threshold;
    let empty = Limits { row_min: rows, row_max: 0, col_min: cols, col_max: 0 };

    (0..rows).into_par_iter()
        .filter_map(|i| {
            let row = values.row(i);
            let first = row.iter().position(|&m| hit(m))?;
            let last = row.iter().rposition(|&m| hit(m))?;

            Some(Limits { row_min: i, row_max: i+1, col_min: first, col_max: last+1 })
        })
        .reduce(|| empty, |a, b| Limits {
            row_min: a.row_min.min(b.row_min),
            row_max: a.row_max.max(b.row_max),
            col_min: a.col_min.min(b.col_min),
            col_max: a.col_max.max(b.col_max)
        })
}



/// Cell predicates for [`mean_and_std`]. Each takes `(x, y, value)`.
pub mod filter {
    use super::*;

    pub fn any() -> impl Fn(f64, f64, Complex<f64>) -> bool {
        |_, _, _| true
    }

    pub fn magnitude_above(eps: f64) -> impl Fn(f64, f64, Complex<f64>) -> bool {
        move |_, _, v| v.norm() > eps
    }

    pub fn within_radius(radius: f64) -> impl Fn(f64, f64, Complex<f64>) -> bool {
        let rsq = radius*radius;

        move |x, y, _| x*x+y*y <= rsq
    }

    pub fn both<A, B>(a: A, b: B) -> impl Fn(f64, f64, Complex<f64>) -> bool
    where
        A: Fn(f64, f64, Complex<f64>) -> bool,
        B: Fn(f64, f64, Complex<f64>) -> bool
    {
        move |x, y, v| a(x, y, v) && b(x, y, v)
    }
}

/// Mean and (population) standard deviation of `metric` over the cells
/// accepted by `accept`, computed with Welford's running update. Cell
/// `(i, j)` sits at `(xs[j], ys[i])`. With no accepted cells both are NaN.
pub fn mean_and_std<M, P>(
    grid: &ComplexGrid,
    metric: M,
    xs: ArrayView1<f64>,
    ys: ArrayView1<f64>,
    accept: P
) -> ValueWithError
where
    M: Fn(Complex<f64>) -> f64,
    P: Fn(f64, f64, Complex<f64>) -> bool
{
    let mut count = 0usize;
    let mut mean = 0.;
    let mut m2 = 0.;

    for ((i, j), &v) in grid.view().indexed_iter() {
        if !accept(xs[j], ys[i], v) {
            continue;
        }

        let m = metric(v);
        count += 1;

        let delta = m-mean;
        mean += delta/count as f64;
        m2 += delta*(m-mean);
    }

    if count == 0 {
        return ValueWithError::new(f64::NAN, f64::NAN);
    }

    ValueWithError::new(mean, (m2/count as f64).sqrt())
}



fn at(xs: ArrayView1<f64>, j: usize) -> ValueWithError {
    let spacing = if j > 0 { (xs[j]-xs[j-1]).abs() } else { 0. };

    ValueWithError::new(xs[j], spacing)
}

/// First strict local minimum of `metric` along row 0, starting at column 1.
/// Without one, the column before last is reported as `Scan::Exhausted`.
pub fn find_first_local_minimum<M>(metric: M, grid: &ComplexGrid, xs: ArrayView1<f64>) -> Scan
where M: Fn(Complex<f64>) -> f64
{
    let row: Vec<f64> = grid.view().row(0).iter().map(|&v| metric(v)).collect();
    let n = row.len();

    for j in 1..n.saturating_sub(1) {
        if row[j-1] > row[j] && row[j] < row[j+1] {
            return Scan::Found(at(xs, j));
        }
    }

    Scan::Exhausted(at(xs, n.saturating_sub(2)))
}

/// First column of row 0 whose magnitude drops below `|grid[0][0]|/sqrt(2)`.
pub fn half_power_point(grid: &ComplexGrid, xs: ArrayView1<f64>) -> Scan {
    let view = grid.view();
    let row = view.row(0);
    let half_power = row[0].norm()/2f64.sqrt();

    match row.iter().position(|v| v.norm() < half_power) {
        Some(j) => Scan::Found(at(xs, j)),
        None => Scan::Exhausted(at(xs, row.len()-1))
    }
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DEFAULT_EPSILON;
    use crate::util::coords;
    use approx::assert_abs_diff_eq;

    fn impulse_grid() -> ComplexGrid {
        ComplexGrid::from_real_rows(&[
            &[0., 1., 2., -2., -1.],
            &[1., 0., 0., 0., 0.],
            &[-2., 0., 0., 0., 0.],
            &[-1., 0., 0., 0., 5.]
        ])
    }

    #[test]
    fn fftshift_4x5_golden() {
        let expected = ComplexGrid::from_real_rows(&[
            &[0., 0., -2., 0., 0.],
            &[0., 5., -1., 0., 0.],
            &[-2., -1., 0., 1., 2.],
            &[0., 0., 1., 0., 0.]
        ]);

        assert!(fftshift_grid(&impulse_grid()).equals_approx(&expected, DEFAULT_EPSILON));
    }

    #[test]
    fn in_place_shift_matches_copying_shift() {
        let mut g = impulse_grid();
        let shifted = fftshift_grid(&g);

        fftshift_grid_in_place(&mut g);

        assert!(g.equals_approx(&shifted, DEFAULT_EPSILON));
    }

    #[test]
    fn ifftshift_undoes_fftshift() {
        let odd = impulse_grid();
        let mut g = fftshift_grid(&odd);

        ifftshift_grid_in_place(&mut g);

        assert!(g.equals_approx(&odd, DEFAULT_EPSILON));

        // the centre cell of a 3x5 grid comes back to the corner
        let mut centred = ComplexGrid::new(3, 5).unwrap();

        centred.set(1, 2, Complex::new(1., 0.));
        ifftshift_grid_in_place(&mut centred);

        assert_eq!(centred.get(0, 0), Complex::new(1., 0.));
    }

    #[test]
    fn double_shift_is_identity_only_for_even_sizes() {
        let odd = impulse_grid();
        let even = ComplexGrid::from_real_rows(&[&[1., 2.], &[3., 4.], &[5., 6.], &[7., 8.]]);

        assert!(!fftshift_grid(&fftshift_grid(&odd)).equals_approx(&odd, DEFAULT_EPSILON));
        assert!(fftshift_grid(&fftshift_grid(&even)).equals_approx(&even, DEFAULT_EPSILON));
    }

    #[test]
    fn zero_sensitivities_flag_nothing() {
        let lims = find_interesting_region(&impulse_grid(), |v| v.norm(), 0., 0.);

        assert!(lims.is_empty());
        assert!(lims.row_min > lims.row_max);
    }

    #[test]
    fn relative_sensitivity() {
        let lims = find_interesting_region(&impulse_grid(), |v| v.norm(), 0., 0.5);

        // only the 5 clears 2.5
        assert_eq!(lims, Limits { row_min: 3, row_max: 4, col_min: 4, col_max: 5 });

        let lims = find_interesting_region(&impulse_grid(), |v| v.norm(), 0., 0.3);

        assert_eq!(lims, Limits { row_min: 0, row_max: 4, col_min: 0, col_max: 5 });
    }

    #[test]
    fn absolute_sensitivity() {
        let g = ComplexGrid::from_real_rows(&[
            &[0., 0., 0., 0.],
            &[0., 0.5, 0., 0.],
            &[0., 0., 0.7, 0.],
            &[0., 0., 0., 0.]
        ]);
        let lims = find_interesting_region(&g, |v| v.norm(), 0.4, 0.);

        assert_eq!(lims, Limits { row_min: 1, row_max: 3, col_min: 1, col_max: 3 });
        assert_eq!((lims.rows(), lims.cols()), (2, 2));
    }

    #[test]
    fn statistics_with_filters() {
        let g = ComplexGrid::from_real_rows(&[
            &[0., 0., 0.],
            &[0., 2., 4.],
            &[0., 0., 0.]
        ]);
        let xs = coords(3., 3);
        let ys = coords(3., 3);

        let s = mean_and_std(&g, |v| v.re, xs.view(), ys.view(), filter::magnitude_above(1e-9));

        assert_abs_diff_eq!(s.value, 3., epsilon = 1e-12);
        assert_abs_diff_eq!(s.err, 1., epsilon = 1e-12);

        let s = mean_and_std(&g, |v| v.re, xs.view(), ys.view(), filter::within_radius(0.5));

        assert_abs_diff_eq!(s.value, 2., epsilon = 1e-12);
        assert_abs_diff_eq!(s.err, 0., epsilon = 1e-12);

        let s = mean_and_std(&g, |v| v.re, xs.view(), ys.view(), filter::any());

        assert_abs_diff_eq!(s.value, 6./9., epsilon = 1e-12);

        let accept = filter::both(filter::within_radius(0.5), filter::magnitude_above(3.));
        let s = mean_and_std(&g, |v| v.re, xs.view(), ys.view(), accept);

        assert!(s.value.is_nan());
    }

    #[test]
    fn local_minimum_found() {
        let g = ComplexGrid::from_real_rows(&[&[5., 3., 1., 2., 0.5, 4.]]);
        let xs = coords(6., 6);
        let scan = find_first_local_minimum(|v| v.norm(), &g, xs.view());

        assert_eq!(scan, Scan::Found(ValueWithError::new(xs[2], 1.)));
    }

    #[test]
    fn local_minimum_fallback_is_flagged() {
        let g = ComplexGrid::from_real_rows(&[&[5., 4., 3., 2., 1.]]);
        let xs = coords(5., 5);
        let scan = find_first_local_minimum(|v| v.norm(), &g, xs.view());

        assert!(!scan.is_found());
        assert_eq!(scan.value(), ValueWithError::new(xs[3], 1.));
    }

    #[test]
    fn half_power_crossing() {
        let g = ComplexGrid::from_real_rows(&[&[1., 0.9, 0.75, 0.7, 0.2]]);
        let xs = coords(10., 5);
        let scan = half_power_point(&g, xs.view());

        assert_eq!(scan, Scan::Found(ValueWithError::new(xs[3], 2.)));
    }
}
