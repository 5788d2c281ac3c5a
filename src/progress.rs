//! Coarse load progress.
//!
//! The loader reports one [`Progress`] message per phase transition, plus byte
//! fractions while the input is being read when its length is known. A single
//! [`ProgressObserver`] receives every message; closures work directly.

use crate::config::PROGRESS_STEP;
use std::fmt;
use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Parse,
    Filter,
    Convert,
    Ingest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Download => "Downloading",
            Phase::Parse => "Parsing",
            Phase::Filter => "Filtering",
            Phase::Convert => "Converting",
            Phase::Ingest => "Ingesting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub phase: Phase,
    /// Completed share of the phase in `0.0..=1.0`, when it can be measured.
    pub fraction: Option<f64>,
}

impl Progress {
    pub fn started(phase: Phase) -> Self {
        Self {
            phase,
            fraction: None,
        }
    }

    pub fn at(phase: Phase, fraction: f64) -> Self {
        Self {
            phase,
            fraction: Some(fraction.clamp(0.0, 1.0)),
        }
    }
}

pub trait ProgressObserver {
    fn on_progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressObserver for F {
    fn on_progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Discards every message.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: Progress) {}
}

/// Counts bytes read through it and reports them as a fraction of `total`.
///
/// Without a known total nothing is reported; reading is unaffected.
pub struct ProgressReader<'o, R> {
    inner: R,
    observer: &'o mut dyn ProgressObserver,
    phase: Phase,
    total: Option<u64>,
    read: u64,
    last_reported: f64,
}

impl<'o, R: Read> ProgressReader<'o, R> {
    pub fn new(inner: R, total: Option<u64>, phase: Phase, observer: &'o mut dyn ProgressObserver) -> Self {
        Self {
            inner,
            observer,
            phase,
            total: total.filter(|t| *t > 0),
            read: 0,
            last_reported: 0.0,
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;

        if let Some(total) = self.total {
            let fraction = (self.read as f64 / total as f64).min(1.0);
            let done = n == 0 && fraction >= 1.0 && self.last_reported < 1.0;
            if fraction - self.last_reported >= PROGRESS_STEP || done {
                self.last_reported = fraction;
                self.observer.on_progress(Progress::at(self.phase, fraction));
            }
        }
        Ok(n)
    }
}
