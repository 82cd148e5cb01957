use crate::aperture::{GeneratorContext, Registry};
use crate::config::{Config, ShapeSpec};
use crate::grid::ComplexGrid;
use crate::ops::{self, filter, Limits, MAGNITUDE_EPSILON};
use crate::output;
use crate::tasks::{Dump, DumpFormat, Source, Task};
use crate::transform::{Direction, Plan, Planner};
use crate::util::{coords, fftfreq, fftshift};
use anyhow::Context;
use ndarray::prelude::*;
use std::collections::BinaryHeap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};



/// Scalar outputs of one shape, in task order.
#[derive(Clone, Debug)]
pub struct ShapeResult {
    pub index: usize,
    pub columns: Vec<f64>
}

// Reversed on the index so the max-heap hands out the lowest index first
impl PartialEq for ShapeResult {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for ShapeResult {}

impl PartialOrd for ShapeResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShapeResult {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.index.cmp(&self.index)
    }
}

/// Results pushed by the workers in any order, drained by shape index.
#[derive(Default)]
pub struct ResultCollector {
    heap: Mutex<BinaryHeap<ShapeResult>>
}

impl ResultCollector {
    pub fn push(&self, result: ShapeResult) {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).push(result);
    }

    pub fn into_ordered(self) -> Vec<ShapeResult> {
        let mut heap = self.heap.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut ordered = Vec::with_capacity(heap.len());

        while let Some(result) = heap.pop() {
            ordered.push(result);
        }

        ordered
    }
}



// Coordinates of one shape: real space for the aperture, spatial frequency for
// the pattern, both unshifted and shifted
struct Axes {
    xs: Array1<f64>,
    ys: Array1<f64>,
    fx: Array1<f64>,
    fy: Array1<f64>,
    fx_shifted: Array1<f64>,
    fy_shifted: Array1<f64>
}

impl Axes {
    fn new(config: &Config, shape: &ShapeSpec) -> Self {
        let fx = fftfreq(config.nx, shape.lx/config.nx as f64);
        let fy = fftfreq(config.ny, shape.ly/config.ny as f64);

        Self {
            xs: coords(shape.lx, config.nx),
            ys: coords(shape.ly, config.ny),
            fx_shifted: fftshift(fx.view()),
            fy_shifted: fftshift(fy.view()),
            fx,
            fy
        }
    }
}

/// Everything one worker owns: its grid pair, its forward plan and the
/// generator context holding any auxiliary plans.
pub struct Worker<'a> {
    config: &'a Config,
    registry: &'a Registry,
    input: ComplexGrid,
    output: ComplexGrid,
    plan: Plan,
    ctx: GeneratorContext<'a>
}

impl<'a> Worker<'a> {
    pub fn new(config: &'a Config, registry: &'a Registry, planner: &'a dyn Planner) -> anyhow::Result<Self> {
        let (rows, cols) = (config.ny, config.nx);

        Ok(Self {
            config,
            registry,
            input: ComplexGrid::new(rows, cols).context("allocating the aperture grid")?,
            output: ComplexGrid::new(rows, cols).context("allocating the pattern grid")?,
            plan: planner.plan(rows, cols, Direction::Forward).context("planning the main transform")?,
            ctx: GeneratorContext::new(planner)
        })
    }

    /// Generate, transform and analyze shape `index`, writing any requested
    /// array dumps on the way.
    pub fn run_shape(&mut self, index: usize) -> anyhow::Result<ShapeResult> {
        let shape = &self.config.shapes[index];
        let generator = self.registry.get(&shape.kind)?;
        let axes = Axes::new(self.config, shape);

        debug!(index, kind = %shape.kind, "generating aperture");

        generator(&mut self.input, axes.xs.view(), axes.ys.view(), &shape.params, &mut self.ctx)
            .with_context(|| format!("generating shape {index} ({})", shape.kind))?;

        self.plan.execute(&self.input, &mut self.output)?;

        let mut columns = Vec::new();
        let mut shifted: Option<ComplexGrid> = None;

        for task in &self.config.tasks {
            match *task {
                Task::Params => columns.extend_from_slice(&shape.params),
                Task::FindMin => {
                    let scan = ops::find_first_local_minimum(|v| v.norm(), &self.output, axes.fx.view());

                    if !scan.is_found() {
                        warn!(index, "no local minimum along x, reporting the last scanned point");
                    }

                    let v = scan.value();
                    columns.extend([v.value, v.err]);
                },
                Task::Fwhp => {
                    let v = half_width(&self.output, axes.fx.view(), index, "x");
                    columns.extend([v.value, v.err]);
                },
                Task::FwhpY => {
                    let v = half_width(&self.output.transpose(), axes.fy.view(), index, "y");
                    columns.extend([v.value, v.err]);
                },
                Task::CentralAmplitude => columns.push(self.output.get(0, 0).norm()),
                Task::InPhaseStat => {
                    let accept = filter::magnitude_above(MAGNITUDE_EPSILON);
                    let v = ops::mean_and_std(&self.input, |v| v.arg(), axes.xs.view(), axes.ys.view(), accept);
                    columns.extend([v.value, v.err]);
                },
                Task::OutLims => {
                    let grid = shifted.get_or_insert_with(|| ops::fftshift_grid(&self.output));
                    let lims = self.region(grid);

                    if lims.is_empty() {
                        warn!(index, "no interesting region in the pattern");
                    }

                    columns.extend(output::region_bounds(&lims, axes.fx_shifted.view(), axes.fy_shifted.view()));
                },
                Task::Dump(dump) => {
                    let (grid, xs, ys) = match dump.source {
                        Source::In => (&self.input, axes.xs.view(), axes.ys.view()),
                        Source::Out => (
                            &*shifted.get_or_insert_with(|| ops::fftshift_grid(&self.output)),
                            axes.fx_shifted.view(),
                            axes.fy_shifted.view()
                        )
                    };

                    let path = self.dump_path(index, &dump);

                    if let Err(e) = self.write_dump(&path, grid, xs, ys, &dump) {
                        warn!(index, "skipping {}: {e:#}", path.display());
                    }
                }
            }
        }

        Ok(ShapeResult { index, columns })
    }

    fn region(&self, grid: &ComplexGrid) -> Limits {
        ops::find_interesting_region(grid, |v| v.norm(), self.config.abs_sens, self.config.rel_sens)
    }

    fn dump_path(&self, index: usize, dump: &Dump) -> PathBuf {
        PathBuf::from(format!("{}{index}{}.{}", self.config.prefix, dump.suffix(), dump.extension()))
    }

    fn write_dump(
        &self,
        path: &Path,
        grid: &ComplexGrid,
        xs: ArrayView1<f64>,
        ys: ArrayView1<f64>,
        dump: &Dump
    ) -> anyhow::Result<()> {
        let mut lims = self.region(grid);

        if lims.is_empty() {
            warn!("empty region for {}, dumping the whole grid", path.display());
            lims = Limits::full(grid.rows(), grid.cols());
        }

        let values = output::crop(grid.map_real(dump.quantity.metric()).view(), &lims);

        match dump.format {
            DumpFormat::Text => output::save_text(path, values.view(), output::region_bounds(&lims, xs, ys)),
            DumpFormat::Npy => output::save_npy(path, values.view()),
            DumpFormat::Png => output::save_png(path, values.view())
        }
    }
}

// Twice the half-power point, i.e. the full width at half power
fn half_width(grid: &ComplexGrid, axis: ArrayView1<f64>, index: usize, name: &str) -> crate::util::ValueWithError {
    let scan = ops::half_power_point(grid, axis);

    if !scan.is_found() {
        warn!(index, "pattern never drops to half power along {name}");
    }

    scan.value().scaled(2.)
}



/// Number of workers actually started for `shapes` shapes: at least one, and
/// never more than there are shapes.
pub fn worker_count(threads: usize, shapes: usize) -> usize {
    threads.clamp(1, shapes.max(1))
}

/// Runs every shape of `config` on `threads` workers, each taking one contiguous
/// block of shape indices. Progress is reported as one message per finished
/// shape. Results come back ordered by shape index.
pub fn run(
    config: &Config,
    registry: &Registry,
    planner: &dyn Planner,
    threads: usize,
    monitor: Option<flume::Sender<usize>>
) -> anyhow::Result<Vec<ShapeResult>> {
    config.check_generators(registry)?;

    let n = config.shapes.len();
    let threads = worker_count(threads, n);
    let block = (n+threads-1)/threads;
    let collector = ResultCollector::default();

    info!(shapes = n, threads, "starting batch");

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let handles: Vec<_> = (0..threads)
            .map(|w| {
                let range = (w*block).min(n)..((w+1)*block).min(n);
                let collector = &collector;
                let monitor = monitor.clone();

                scope.spawn(move || -> anyhow::Result<()> {
                    if range.is_empty() {
                        return Ok(());
                    }

                    let mut worker = Worker::new(config, registry, planner)?;

                    for index in range {
                        collector.push(worker.run_shape(index)?);

                        if let Some(monitor) = &monitor {
                            monitor.send(index).ok();
                        }
                    }

                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))??;
        }

        Ok(())
    })?;

    Ok(collector.into_ordered())
}

pub fn write_results<W: Write>(out: W, results: &[ShapeResult]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(out);

    for r in results {
        writeln!(out, "{}", output::result_line(r.index, &r.columns))?;
    }

    out.flush()?;

    Ok(())
}



#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::SerialPlanner;
    use approx::assert_abs_diff_eq;

    fn config(tasks: &str, shapes: &str, n_shapes: usize) -> Config {
        format!("nx = 32\nny = 32\nprefix = unused/\ntasks = {tasks}\nrel_sens = 0.5\nn_shapes = {n_shapes}\n{shapes}")
            .parse()
            .unwrap()
    }

    fn circles(n: usize) -> String {
        (0..n)
            .map(|i| format!("type = circular\nlx = 32\nly = 32\nparams = {}\n", 2+i))
            .collect()
    }

    #[test]
    fn collector_orders_by_index() {
        let collector = ResultCollector::default();

        for index in [3, 0, 2, 1] {
            collector.push(ShapeResult { index, columns: vec![index as f64] });
        }

        let ordered: Vec<usize> = collector.into_ordered().iter().map(|r| r.index).collect();

        assert_eq!(ordered, vec![0, 1, 2, 3]);
    }

    #[test]
    fn scalar_tasks_fill_columns_in_order() {
        let config = config("params central_amplitude find_min fwhp fwhp_y in_phase_stat out_lims", &circles(1), 1);
        let registry = Registry::standard();
        let planner = SerialPlanner::new(false);
        let mut worker = Worker::new(&config, &registry, &planner).unwrap();
        let result = worker.run_shape(0).unwrap();

        // params 1, amplitude 1, find_min 2, fwhp 2, fwhp_y 2, phase stat 2, lims 4
        assert_eq!(result.columns.len(), 14);
        assert_eq!(result.columns[0], 2.);

        // the central amplitude of a lit disc is its number of cells
        let lit = worker.input.view().iter().filter(|v| v.re == 1.).count();

        assert_abs_diff_eq!(result.columns[1], lit as f64, epsilon = 1e-9);

        // a symmetric disc has the same width both ways, and no phase
        assert_abs_diff_eq!(result.columns[4], result.columns[6], epsilon = 1e-12);
        assert_abs_diff_eq!(result.columns[8], 0., epsilon = 1e-12);
        assert_abs_diff_eq!(result.columns[9], 0., epsilon = 1e-12);

        // the main lobe is centred on the zero frequency
        assert!(result.columns[10] < 0.);
        assert_abs_diff_eq!(result.columns[10], -result.columns[11], epsilon = 1e-12);
        assert_abs_diff_eq!(result.columns[12], -result.columns[13], epsilon = 1e-12);
    }

    #[test]
    fn batch_is_ordered_regardless_of_threads() {
        let config = config("params fwhp", &circles(5), 5);
        let registry = Registry::standard();
        let planner = SerialPlanner::new(false);
        let (tx, rx) = flume::unbounded();

        let results = run(&config, &registry, &planner, 3, Some(tx)).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        let params: Vec<f64> = results.iter().map(|r| r.columns[0]).collect();

        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(params, vec![2., 3., 4., 5., 6.]);
        assert_eq!(rx.drain().count(), 5);

        let single = run(&config, &registry, &planner, 1, None).unwrap();

        for (a, b) in results.iter().zip(&single) {
            assert_eq!(a.columns, b.columns);
        }
    }

    #[test]
    fn unknown_generator_aborts_before_any_shape() {
        let shapes = format!("{}type = hexagon\nlx = 1\nly = 1\nparams = 1\n", circles(1));
        let config = config("params", &shapes, 2);
        let planner = SerialPlanner::new(false);
        let (tx, rx) = flume::unbounded();

        assert!(run(&config, &Registry::standard(), &planner, 1, Some(tx)).is_err());
        assert_eq!(rx.drain().count(), 0);
    }

    #[test]
    fn short_parameter_list_aborts_before_any_shape() {
        let shapes = format!("{}type = rectangle\nlx = 1\nly = 1\nparams = 1\n", circles(1));
        let config = config("params", &shapes, 2);
        let planner = SerialPlanner::new(false);
        let (tx, rx) = flume::unbounded();

        assert!(run(&config, &Registry::standard(), &planner, 1, Some(tx)).is_err());
        assert_eq!(rx.drain().count(), 0);
    }

    #[test]
    fn worker_count_is_clamped_to_shapes() {
        assert_eq!(worker_count(8, 1), 1);
        assert_eq!(worker_count(8, 3), 3);
        assert_eq!(worker_count(2, 5), 2);
        assert_eq!(worker_count(0, 5), 1);
        assert_eq!(worker_count(4, 0), 1);
    }

    #[test]
    fn results_file_lines() {
        let results = vec![
            ShapeResult { index: 0, columns: vec![1.] },
            ShapeResult { index: 1, columns: vec![] }
        ];
        let mut buf = Vec::new();

        write_results(&mut buf, &results).unwrap();

        assert_eq!(String::from_utf8(buf).unwrap(), "0\t1.00000000e0\n1\n");
    }
}
