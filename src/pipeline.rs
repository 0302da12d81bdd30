//! Pipeline plumbing: the processor trait, the per-utterance error
//! taxonomy, and the stage runner.
//!
//! Stages run in strict order on one utterance at a time. Each stage reads
//! only what earlier stages produced and adds its own relation or features;
//! re-running a stage on an already-processed utterance is not supported.
//! A stage error aborts the rest of the pipeline for that utterance only —
//! the voice and its queue keep going. Cancellation is checked between
//! stages, never mid-stage, so an aborted utterance is always left at a
//! stage boundary and no partial audio escapes.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::debug;

use crate::utterance::{GraphError, Utterance};

/// Errors that abort a single utterance.
///
/// Load-time problems (bad tree text, missing database files) are not here;
/// those surface as `anyhow` errors from voice allocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("no waveform to output")]
    NoWaveform,
    #[error("audio output failed: {0}")]
    Audio(String),
    #[error("external synthesizer failed: {0}")]
    External(String),
}

/// One stage of the synthesis pipeline.
pub trait UtteranceProcessor: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError>;
}

/// Run `stages` over one utterance, checking `cancelled` at every stage
/// boundary. `Ok(true)` means the pipeline completed, `Ok(false)` that it
/// stopped at a checkpoint because of cancellation.
pub fn run_pipeline(
    stages: &[Box<dyn UtteranceProcessor>],
    utt: &mut Utterance,
    cancelled: &AtomicBool,
) -> Result<bool, ProcessError> {
    for stage in stages {
        if cancelled.load(Ordering::Acquire) {
            debug!(stage = stage.name(), "cancelled before stage");
            return Ok(false);
        }
        debug!(stage = stage.name(), "running");
        stage.process(utt)?;
    }
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct Mark(&'static str, Arc<AtomicUsize>);

    impl UtteranceProcessor for Mark {
        fn name(&self) -> &'static str {
            self.0
        }
        fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            utt.features_mut().set_string(self.0, "done");
            Ok(())
        }
    }

    struct Fail;

    impl UtteranceProcessor for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }
        fn process(&self, _utt: &mut Utterance) -> Result<(), ProcessError> {
            Err(ProcessError::External("boom".into()))
        }
    }

    /// Sets the shared cancel flag while "working", simulating an external
    /// cancel landing mid-stage; the next boundary must catch it.
    struct CancelDuring(Arc<AtomicBool>);

    impl UtteranceProcessor for CancelDuring {
        fn name(&self) -> &'static str {
            "canceller"
        }
        fn process(&self, _utt: &mut Utterance) -> Result<(), ProcessError> {
            self.0.store(true, Ordering::Release);
            Ok(())
        }
    }

    fn utt() -> Utterance {
        Utterance::new("x", Arc::new(FeatureSet::new()))
    }

    #[test]
    fn test_all_stages_run_in_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Box<dyn UtteranceProcessor>> = vec![
            Box::new(Mark("a", count.clone())),
            Box::new(Mark("b", count.clone())),
        ];
        let mut u = utt();
        let done = run_pipeline(&stages, &mut u, &AtomicBool::new(false)).unwrap();
        assert!(done);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(u.own_features().string("b"), Some("done"));
    }

    #[test]
    fn test_error_aborts_remaining_stages() {
        let count = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Box<dyn UtteranceProcessor>> = vec![
            Box::new(Fail),
            Box::new(Mark("after", count.clone())),
        ];
        let mut u = utt();
        let err = run_pipeline(&stages, &mut u, &AtomicBool::new(false)).unwrap_err();
        assert_eq!(err, ProcessError::External("boom".into()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancellation_checked_at_stage_boundary() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let count = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Box<dyn UtteranceProcessor>> = vec![
            Box::new(CancelDuring(cancelled.clone())),
            Box::new(Mark("never", count.clone())),
        ];
        let mut u = utt();
        let done = run_pipeline(&stages, &mut u, &cancelled).unwrap();
        assert!(!done, "pipeline should report cancellation");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pre_cancelled_runs_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Box<dyn UtteranceProcessor>> =
            vec![Box::new(Mark("a", count.clone()))];
        let mut u = utt();
        let done = run_pipeline(&stages, &mut u, &AtomicBool::new(true)).unwrap();
        assert!(!done);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
