use ndrustfft::Complex;
use tracing::warn;



#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    In,
    Out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
    Abs,
    Phase
}

impl Quantity {
    pub fn metric(self) -> fn(Complex<f64>) -> f64 {
        match self {
            Quantity::Abs => |v: Complex<f64>| v.norm(),
            Quantity::Phase => |v: Complex<f64>| v.arg()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpFormat {
    Text,
    Npy,
    Png
}

/// An array output: which grid, which quantity of it, and in what format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dump {
    pub format: DumpFormat,
    pub source: Source,
    pub quantity: Quantity
}

impl Dump {
    /// File name part following the shape index, e.g. `out_abs`.
    pub fn suffix(&self) -> &'static str {
        match (self.source, self.quantity) {
            (Source::In, Quantity::Abs) => "in_abs",
            (Source::In, Quantity::Phase) => "in_phase",
            (Source::Out, Quantity::Abs) => "out_abs",
            (Source::Out, Quantity::Phase) => "out_phase"
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.format {
            DumpFormat::Text => "txt",
            DumpFormat::Npy => "npy",
            DumpFormat::Png => "png"
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    Params,
    FindMin,
    Fwhp,
    FwhpY,
    CentralAmplitude,
    InPhaseStat,
    OutLims,
    Dump(Dump)
}

impl std::str::FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let task = match s {
            "params" => Task::Params,
            "find_min" => Task::FindMin,
            "fwhp" => Task::Fwhp,
            "fwhp_y" => Task::FwhpY,
            "central_amplitude" => Task::CentralAmplitude,
            "in_phase_stat" => Task::InPhaseStat,
            "out_lims" => Task::OutLims,
            _ => return parse_dump(s).map(Task::Dump)
        };

        Ok(task)
    }
}

// <format>_<in|out>_<abs|phase>
fn parse_dump(s: &str) -> Result<Dump, String> {
    let unknown = || format!("unknown task \"{s}\"");
    let (format, rest) = s.split_once('_').ok_or_else(unknown)?;
    let (source, quantity) = rest.split_once('_').ok_or_else(unknown)?;

    Ok(Dump {
        format: match format {
            "print" => DumpFormat::Text,
            "npy" => DumpFormat::Npy,
            "png" => DumpFormat::Png,
            _ => return Err(unknown())
        },
        source: match source {
            "in" => Source::In,
            "out" => Source::Out,
            _ => return Err(unknown())
        },
        quantity: match quantity {
            "abs" => Quantity::Abs,
            "phase" => Quantity::Phase,
            _ => return Err(unknown())
        }
    })
}

/// Parses a space separated task list. Unknown names are logged and dropped.
pub fn parse_tasks(list: &str) -> Vec<Task> {
    list.split_whitespace()
        .filter_map(|name| match name.parse() {
            Ok(task) => Some(task),
            Err(e) => {
                warn!("{e}, skipping it");
                None
            }
        })
        .collect()
}
