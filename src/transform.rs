use crate::grid::{ComplexGrid, GridError};
use ndarray::prelude::*;
use ndarray::par_azip;
use ndrustfft::{ndfft, ndfft_par, Complex, FftHandler};
use std::sync::Mutex;
use tracing::debug;



#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse
}

/// Something that hands out transform plans. Building a plan goes through
/// here so that an implementation can serialize planning across threads.
pub trait Planner: Sync {
    fn plan(&self, rows: usize, cols: usize, direction: Direction) -> Result<Plan, GridError>;
}

/// Planner that allows one planning call at a time, process wide.
pub struct SerialPlanner {
    lock: Mutex<()>,
    parallel: bool
}

impl SerialPlanner {
    /// With `parallel` set, the plans it builds spread each transform over
    /// the rayon pool; leave it off when several workers transform at once.
    pub fn new(parallel: bool) -> Self {
        Self { lock: Mutex::new(()), parallel }
    }
}

impl Planner for SerialPlanner {
    fn plan(&self, rows: usize, cols: usize, direction: Direction) -> Result<Plan, GridError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        debug!(rows, cols, ?direction, "planning transform");

        Plan::new(rows, cols, direction, self.parallel)
    }
}



/// A 2D DFT of fixed size and direction. The inverse is unnormalized, so a
/// forward/inverse round trip scales the data by `rows*cols`. Dropping the plan
/// releases it.
pub struct Plan {
    direction: Direction,
    handler_rows: FftHandler<f64>,
    handler_cols: FftHandler<f64>,
    work: ComplexGrid,
    parallel: bool
}

impl Plan {
    pub fn new(rows: usize, cols: usize, direction: Direction, parallel: bool) -> Result<Self, GridError> {
        Ok(Self {
            direction,
            handler_rows: FftHandler::new(rows),
            handler_cols: FftHandler::new(cols),
            work: ComplexGrid::new(rows, cols)?,
            parallel
        })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.work.dim()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Transforms `input` into `output`; both must match the plan's size.
    pub fn execute(&mut self, input: &ComplexGrid, output: &mut ComplexGrid) -> Result<(), GridError> {
        self.work.check_dim(input.dim())?;
        self.work.check_dim(output.dim())?;

        match self.direction {
            Direction::Forward => {
                self.cols_into_work(input.buffer());
                self.rows_from_work(output);
            },
            Direction::Inverse => {
                output.buffer_mut().assign(input.buffer());
                self.execute_in_place(output)?;
            }
        }

        Ok(())
    }

    /// Transforms `grid` onto itself.
    pub fn execute_in_place(&mut self, grid: &mut ComplexGrid) -> Result<(), GridError> {
        self.work.check_dim(grid.dim())?;

        // The inverse DFT is conj(DFT(conj(x))), without the 1/n factor
        if self.direction == Direction::Inverse {
            conjugate(grid);
        }

        self.cols_into_work(grid.buffer());
        self.rows_from_work(grid);

        if self.direction == Direction::Inverse {
            conjugate(grid);
        }

        Ok(())
    }

    fn cols_into_work(&mut self, input: &Array2<Complex<f64>>) {
        if self.parallel {
            ndfft_par(input, self.work.buffer_mut(), &mut self.handler_cols, 1);
        }
        else {
            ndfft(input, self.work.buffer_mut(), &mut self.handler_cols, 1);
        }
    }

    fn rows_from_work(&mut self, output: &mut ComplexGrid) {
        if self.parallel {
            ndfft_par(self.work.buffer(), output.buffer_mut(), &mut self.handler_rows, 0);
        }
        else {
            ndfft(self.work.buffer(), output.buffer_mut(), &mut self.handler_rows, 0);
        }
    }
}

fn conjugate(grid: &mut ComplexGrid) {
    par_azip!((v in grid.buffer_mut()) { *v = v.conj(); });
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DEFAULT_EPSILON;
    use std::f64::consts::TAU;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Direct O(n^4) DFT for checking small grids
    fn naive_dft(grid: &ComplexGrid, sign: f64) -> ComplexGrid {
        let (h, w) = grid.dim();
        let src = grid.view();

        ComplexGrid::from_array(Array2::from_shape_fn((h, w), |(k, l)| {
            let mut sum = Complex::new(0., 0.);

            for ((i, j), &v) in src.indexed_iter() {
                let phase = sign*TAU*((k*i) as f64/h as f64+(l*j) as f64/w as f64);
                sum += v*Complex::from_polar(1., phase);
            }

            sum
        }))
    }

    fn sample_grid() -> ComplexGrid {
        ComplexGrid::from_array(Array2::from_shape_fn((3, 4), |(i, j)| {
            Complex::new(i as f64-j as f64*0.5, (i*j) as f64*0.25)
        }))
    }

    #[test]
    fn forward_matches_direct_dft() {
        let input = sample_grid();
        let mut output = ComplexGrid::new(3, 4).unwrap();
        let mut plan = Plan::new(3, 4, Direction::Forward, false).unwrap();

        plan.execute(&input, &mut output).unwrap();

        assert!(output.equals_approx(&naive_dft(&input, -1.), DEFAULT_EPSILON));
    }

    #[test]
    fn inverse_is_unnormalized() {
        let input = sample_grid();
        let mut output = ComplexGrid::new(3, 4).unwrap();
        let mut plan = Plan::new(3, 4, Direction::Inverse, true).unwrap();

        plan.execute(&input, &mut output).unwrap();

        assert!(output.equals_approx(&naive_dft(&input, 1.), DEFAULT_EPSILON));
    }

    #[test]
    fn round_trip_scales_by_size() {
        let original = sample_grid();
        let mut grid = original.clone();
        let mut fwd = Plan::new(3, 4, Direction::Forward, false).unwrap();
        let mut inv = Plan::new(3, 4, Direction::Inverse, false).unwrap();

        fwd.execute_in_place(&mut grid).unwrap();
        inv.execute_in_place(&mut grid).unwrap();
        grid.divide_by(12.);

        assert!(grid.equals_approx(&original, DEFAULT_EPSILON));
    }

    #[test]
    fn impulse_transforms_to_constant() {
        let mut grid = ComplexGrid::new(4, 4).unwrap();
        let mut plan = Plan::new(4, 4, Direction::Forward, false).unwrap();

        grid.set(0, 0, Complex::new(1., 0.));
        plan.execute_in_place(&mut grid).unwrap();

        assert!(grid.view().iter().all(|v| (v-Complex::new(1., 0.)).norm() < 1e-12));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let input = ComplexGrid::new(3, 4).unwrap();
        let mut output = ComplexGrid::new(4, 3).unwrap();
        let mut plan = Plan::new(3, 4, Direction::Forward, false).unwrap();

        assert_eq!(
            plan.execute(&input, &mut output),
            Err(GridError::DimensionMismatch { expected: (3, 4), found: (4, 3) })
        );
    }

    struct CountingPlanner(AtomicUsize);

    impl Planner for CountingPlanner {
        fn plan(&self, rows: usize, cols: usize, direction: Direction) -> Result<Plan, GridError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Plan::new(rows, cols, direction, false)
        }
    }

    #[test]
    fn planners_are_swappable() {
        let counting = CountingPlanner(AtomicUsize::new(0));
        let serial = SerialPlanner::new(false);
        let planners: [&dyn Planner; 2] = [&counting, &serial];

        for planner in planners {
            let plan = planner.plan(2, 3, Direction::Inverse).unwrap();

            assert_eq!(plan.dim(), (2, 3));
            assert_eq!(plan.direction(), Direction::Inverse);
        }

        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
    }
}
