use crate::aperture::{ApertureError, Registry};
use crate::tasks::{parse_tasks, Task};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;



#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("config ended while expecting \"{expected}\"")]
    UnexpectedEof { expected: &'static str },

    #[error("line {line}: expected \"{expected}\", found \"{found}\"")]
    KeyMismatch { line: usize, expected: &'static str, found: String },

    #[error("line {line}: not a `key = value` line")]
    MalformedLine { line: usize },

    #[error("line {line}: bad value \"{value}\" for {key}")]
    InvalidValue { line: usize, key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String)
}

/// One aperture to simulate: generator name, physical extent of the grid and
/// generator-specific parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeSpec {
    pub kind: String,
    pub lx: f64,
    pub ly: f64,
    pub params: Vec<f64>
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub nx: usize,
    pub ny: usize,
    pub prefix: String,
    pub tasks: Vec<Task>,
    pub abs_sens: f64,
    pub rel_sens: f64,
    pub shapes: Vec<ShapeSpec>
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        text.parse()
    }

    pub fn results_path(&self) -> PathBuf {
        PathBuf::from(format!("{}dat.txt", self.prefix))
    }

    /// Fails on the first shape whose generator is not registered or whose
    /// parameter list is too short for it.
    pub fn check_generators(&self, registry: &Registry) -> Result<(), ApertureError> {
        for shape in &self.shapes {
            registry.check(&shape.kind, &shape.params)?;
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut reader = Reader::new(text);

        let nx: usize = reader.value("nx")?;
        let ny: usize = reader.value("ny")?;
        let prefix = reader.expect("prefix")?.1.to_string();
        let tasks = parse_tasks(reader.expect("tasks")?.1);

        let (mut abs_sens, mut rel_sens): (f64, f64) = (0., 0.);

        while let Some(key) = reader.peek_key()? {
            match key {
                "abs_sens" => abs_sens = reader.value("abs_sens")?,
                "rel_sens" => rel_sens = reader.value("rel_sens")?,
                _ => break
            }
        }

        let n_shapes: usize = reader.value("n_shapes")?;

        if nx == 0 || ny == 0 {
            return Err(ConfigError::Invalid(format!("grid size {nx}x{ny} must be positive")));
        }

        let shapes = (0..n_shapes)
            .map(|_| reader.shape())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { nx, ny, prefix, tasks, abs_sens, rel_sens, shapes })
    }
}



// Walks `key = value` lines in order, skipping blanks and # comments
struct Reader<'a> {
    lines: std::iter::Peekable<std::iter::Enumerate<std::str::Lines<'a>>>
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self { lines: text.lines().enumerate().peekable() }
    }

    fn skip_blank(&mut self) {
        while let Some((_, line)) = self.lines.peek() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                self.lines.next();
            }
            else {
                break;
            }
        }
    }

    fn peek_key(&mut self) -> Result<Option<&'a str>, ConfigError> {
        self.skip_blank();

        match self.lines.peek() {
            Some(&(i, line)) => split(i+1, line).map(|(key, _)| Some(key)),
            None => Ok(None)
        }
    }

    // Next entry, which must be `key`. Returns its line number and raw value.
    fn expect(&mut self, key: &'static str) -> Result<(usize, &'a str), ConfigError> {
        self.skip_blank();

        let (i, line) = self.lines.next().ok_or(ConfigError::UnexpectedEof { expected: key })?;
        let (found, value) = split(i+1, line)?;

        if found != key {
            return Err(ConfigError::KeyMismatch { line: i+1, expected: key, found: found.to_string() });
        }

        Ok((i+1, value))
    }

    fn value<T: FromStr>(&mut self, key: &'static str) -> Result<T, ConfigError> {
        let (line, raw) = self.expect(key)?;

        parse_value(line, key, raw)
    }

    fn shape(&mut self) -> Result<ShapeSpec, ConfigError> {
        let kind = self.expect("type")?.1.to_string();
        let lx: f64 = self.value("lx")?;
        let ly: f64 = self.value("ly")?;
        let (line, raw) = self.expect("params")?;

        if !(lx > 0. && ly > 0.) {
            return Err(ConfigError::InvalidValue { line, key: "lx/ly", value: format!("{lx} {ly}") });
        }

        let params = raw.split_whitespace()
            .map(|p| parse_value(line, "params", p))
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(ShapeSpec { kind, lx, ly, params })
    }
}

fn split(line_no: usize, line: &str) -> Result<(&str, &str), ConfigError> {
    let (key, value) = line.split_once('=').ok_or(ConfigError::MalformedLine { line: line_no })?;

    Ok((key.trim(), value.trim()))
}

fn parse_value<T: FromStr>(line: usize, key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue { line, key, value: raw.to_string() })
}
