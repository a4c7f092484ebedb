use std::io::{self, Stdout, Write};

use chrono::Local;

use crate::solvers::StepReport;

/// Per-step progress table printed in verbose mode.
///
/// ```text
///       Step     Time          Energy          fmax
/// FIRE:    0 12:00:01      -12.345678        0.412345
/// ```
pub struct ProgressLog<W: Write> {
    name: &'static str,
    out: Option<W>,
    header_written: bool,
}

impl ProgressLog<Stdout> {
    /// Prints to stdout when `enabled`, otherwise discards everything.
    pub fn stdout(name: &'static str, enabled: bool) -> Self {
        Self::new(name, enabled.then(io::stdout))
    }
}

impl<W: Write> ProgressLog<W> {
    pub fn new(name: &'static str, out: Option<W>) -> Self {
        Self {
            name,
            out,
            header_written: false,
        }
    }

    pub fn log(&mut self, report: &StepReport) -> io::Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };
        if !self.header_written {
            writeln!(
                out,
                "{} {:>5} {:>8} {:>15} {:>15}",
                " ".repeat(self.name.len()),
                "Step",
                "Time",
                "Energy",
                "fmax"
            )?;
            self.header_written = true;
        }
        writeln!(
            out,
            "{}: {:>5} {} {:>15.6} {:>15.6}",
            self.name,
            report.step,
            Local::now().format("%H:%M:%S"),
            report.energy,
            report.fmax
        )?;
        out.flush()
    }

    pub fn into_inner(self) -> Option<W> {
        self.out
    }
}
