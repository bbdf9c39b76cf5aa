//! Run driver and event-level concurrency for the AT-TPC reconstruction
//! pipeline (C10).
//!
//! `attpc_core` is a pure algorithm library; this crate is where I/O
//! boundaries (`io`), progress reporting (`progress`), the bounded
//! worker pool (`worker`), and the phase-composing driver (`run`) live.

pub mod io;
pub mod progress;
pub mod run;
pub mod worker;

pub use io::{EventSource, RawFrame, ResultRow, ResultSink};
pub use progress::{channel, Phase, ProgressReporter, ProgressUpdate};
pub use run::{run, RunContext, RunOutcome};
pub use worker::CancellationToken;
