//! foresight-algorithm — the boundary to out-of-process scoring routines.
//!
//! A prediction model hands a serialized request to an [`AlgorithmRunner`]
//! together with the address of the routine to run, and gets back the
//! routine's raw text output. The runner owns process lifecycle and
//! deadlines; callers treat every failure as opaque and do not retry.
//!
//! [`ProcessRunner`] runs the routine as `<interpreter> <address>`, with the
//! payload on stdin and the result read from stdout.

pub mod error;
pub mod runner;

pub use error::{RunnerError, RunnerResult};
pub use runner::{AlgorithmRunner, ProcessRunner};
