//! Pipeline stage timeline.
//!
//! Each named stage moves through an explicit state machine:
//!
//! ```text
//! Pending -> Running -> Done(Ok | Failed)
//! Pending -> Done(Skipped)      (only after an earlier stage failed)
//! ```
//!
//! Stages run strictly in order. Once a stage fails, every later stage is
//! marked skipped with a reason naming the failed stage, so the per-bug
//! report always carries one outcome per stage.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::process::CommandOutput;

/// Named stages of one bug pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    CheckoutBuggy,
    CheckoutFixed,
    Compile,
    ResolveTargets,
    Instrument,
    Rebuild,
    RunTests,
    Collect,
}

impl StageName {
    pub const ALL: [StageName; 8] = [
        StageName::CheckoutBuggy,
        StageName::CheckoutFixed,
        StageName::Compile,
        StageName::ResolveTargets,
        StageName::Instrument,
        StageName::Rebuild,
        StageName::RunTests,
        StageName::Collect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::CheckoutBuggy => "checkout_buggy",
            StageName::CheckoutFixed => "checkout_fixed",
            StageName::Compile => "compile",
            StageName::ResolveTargets => "resolve_targets",
            StageName::Instrument => "instrument",
            StageName::Rebuild => "rebuild",
            StageName::RunTests => "run_tests",
            StageName::Collect => "collect",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Ok {
        #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
        details: serde_json::Value,
    },
    Failed {
        message: String,
        #[serde(default)]
        timed_out: bool,
    },
    Skipped {
        reason: String,
    },
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageOutcome::Ok { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

/// Current state of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Done(StageOutcome),
}

impl StageState {
    fn label(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Done(StageOutcome::Ok { .. }) => "ok",
            StageState::Done(StageOutcome::Failed { .. }) => "failed",
            StageState::Done(StageOutcome::Skipped { .. }) => "skipped",
        }
    }
}

/// Why a stage failed, as reported by the stage body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub message: String,
    pub timed_out: bool,
}

impl StageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        StageFailure {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        StageFailure {
            message: message.into(),
            timed_out: true,
        }
    }

    /// Failure describing an unsuccessful external command.
    pub fn from_command(output: &CommandOutput) -> Self {
        StageFailure {
            message: output.failure_summary(),
            timed_out: output.timed_out(),
        }
    }
}

impl<E: std::error::Error> From<E> for StageFailure {
    fn from(err: E) -> Self {
        StageFailure::new(err.to_string())
    }
}

/// Illegal state machine transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("stage {stage}: cannot move from {from} to {to}")]
    IllegalTransition {
        stage: StageName,
        from: &'static str,
        to: &'static str,
    },

    #[error("stage {stage} is not part of this timeline")]
    UnknownStage { stage: StageName },

    #[error("stage {stage} cannot start before {blocking} completes")]
    OutOfOrder {
        stage: StageName,
        blocking: StageName,
    },
}

/// One stage and its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: StageName,
    #[serde(flatten)]
    pub state: StageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Ordered stage records for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTimeline {
    pub stages: Vec<StageRecord>,
    #[serde(skip)]
    running_since: Option<(StageName, InstantWrapper)>,
}

/// `Instant` is not comparable across serde round-trips; keep it out of
/// equality checks.
#[derive(Debug, Clone, Copy)]
struct InstantWrapper(Instant);

impl PartialEq for InstantWrapper {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Default for StageTimeline {
    fn default() -> Self {
        StageTimeline::new(&StageName::ALL)
    }
}

impl StageTimeline {
    pub fn new(names: &[StageName]) -> Self {
        StageTimeline {
            stages: names
                .iter()
                .map(|&name| StageRecord {
                    name,
                    state: StageState::Pending,
                    started_at: None,
                    duration_secs: None,
                })
                .collect(),
            running_since: None,
        }
    }

    fn index(&self, stage: StageName) -> Result<usize, StageError> {
        self.stages
            .iter()
            .position(|r| r.name == stage)
            .ok_or(StageError::UnknownStage { stage })
    }

    pub fn state(&self, stage: StageName) -> Option<&StageState> {
        self.stages.iter().find(|r| r.name == stage).map(|r| &r.state)
    }

    /// Move `stage` from Pending to Running.
    ///
    /// Every earlier stage must have finished Ok.
    pub fn start(&mut self, stage: StageName) -> Result<(), StageError> {
        let idx = self.index(stage)?;
        if let Some(blocking) = self.stages[..idx]
            .iter()
            .find(|r| !matches!(r.state, StageState::Done(StageOutcome::Ok { .. })))
        {
            return Err(StageError::OutOfOrder {
                stage,
                blocking: blocking.name,
            });
        }
        let record = &mut self.stages[idx];
        if record.state != StageState::Pending {
            return Err(StageError::IllegalTransition {
                stage,
                from: record.state.label(),
                to: "running",
            });
        }
        record.state = StageState::Running;
        record.started_at = Some(Utc::now().to_rfc3339());
        self.running_since = Some((stage, InstantWrapper(Instant::now())));
        Ok(())
    }

    /// Move a Running stage to Done with an Ok or Failed outcome.
    ///
    /// A failure marks every later Pending stage as skipped.
    pub fn finish(&mut self, stage: StageName, outcome: StageOutcome) -> Result<(), StageError> {
        let idx = self.index(stage)?;
        let to = match &outcome {
            StageOutcome::Ok { .. } => "ok",
            StageOutcome::Failed { .. } => "failed",
            StageOutcome::Skipped { .. } => "skipped",
        };
        let record = &mut self.stages[idx];
        if record.state != StageState::Running || to == "skipped" {
            return Err(StageError::IllegalTransition {
                stage,
                from: record.state.label(),
                to,
            });
        }
        if let Some((running, started)) = self.running_since.take() {
            if running == stage {
                record.duration_secs = Some(started.0.elapsed().as_secs_f64());
            }
        }
        let failed = outcome.is_failed();
        record.state = StageState::Done(outcome);
        if failed {
            self.skip_after(idx, stage);
        }
        Ok(())
    }

    /// Move a Pending stage to Skipped. Only legal after an earlier failure.
    pub fn skip(&mut self, stage: StageName, reason: impl Into<String>) -> Result<(), StageError> {
        let idx = self.index(stage)?;
        let earlier_failed = self.stages[..idx]
            .iter()
            .any(|r| matches!(r.state, StageState::Done(StageOutcome::Failed { .. })));
        let record = &mut self.stages[idx];
        if record.state != StageState::Pending || !earlier_failed {
            return Err(StageError::IllegalTransition {
                stage,
                from: record.state.label(),
                to: "skipped",
            });
        }
        record.state = StageState::Done(StageOutcome::Skipped {
            reason: reason.into(),
        });
        Ok(())
    }

    fn skip_after(&mut self, idx: usize, failed: StageName) {
        for record in &mut self.stages[idx + 1..] {
            if record.state == StageState::Pending {
                record.state = StageState::Done(StageOutcome::Skipped {
                    reason: format!("stage {} failed", failed),
                });
            }
        }
    }

    /// Run `body` as `stage`: start it, record its outcome, and return its
    /// value on success.
    ///
    /// Returns `None` without running `body` when the stage was already
    /// skipped by an earlier failure.
    pub fn run<T, F>(&mut self, stage: StageName, body: F) -> Option<T>
    where
        T: Serialize,
        F: FnOnce() -> Result<T, StageFailure>,
    {
        if let Err(err) = self.start(stage) {
            if !matches!(
                self.state(stage),
                Some(StageState::Done(StageOutcome::Skipped { .. }))
            ) {
                warn!(%stage, "{}", err);
            }
            return None;
        }
        info!(%stage, "stage started");

        let (outcome, value) = match body() {
            Ok(value) => (
                StageOutcome::Ok {
                    details: serde_json::to_value(&value).unwrap_or_default(),
                },
                Some(value),
            ),
            Err(failure) => {
                warn!(%stage, timed_out = failure.timed_out, "stage failed: {}", failure.message);
                (
                    StageOutcome::Failed {
                        message: failure.message,
                        timed_out: failure.timed_out,
                    },
                    None,
                )
            }
        };

        if let Err(err) = self.finish(stage, outcome) {
            warn!(%stage, "{}", err);
        }
        value
    }

    /// First failed stage and its message.
    pub fn first_failure(&self) -> Option<(StageName, &str)> {
        self.stages.iter().find_map(|r| match &r.state {
            StageState::Done(StageOutcome::Failed { message, .. }) => Some((r.name, message.as_str())),
            _ => None,
        })
    }

    /// True when every stage finished Ok.
    pub fn all_ok(&self) -> bool {
        self.stages
            .iter()
            .all(|r| matches!(r.state, StageState::Done(StageOutcome::Ok { .. })))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod transition_tests {
        use super::*;

        #[test]
        fn start_then_finish_ok() {
            let mut tl = StageTimeline::default();
            tl.start(StageName::CheckoutBuggy).unwrap();
            assert_eq!(tl.state(StageName::CheckoutBuggy), Some(&StageState::Running));
            tl.finish(
                StageName::CheckoutBuggy,
                StageOutcome::Ok {
                    details: serde_json::Value::Null,
                },
            )
            .unwrap();
            assert!(matches!(
                tl.state(StageName::CheckoutBuggy),
                Some(StageState::Done(StageOutcome::Ok { .. }))
            ));
        }

        #[test]
        fn cannot_start_out_of_order() {
            let mut tl = StageTimeline::default();
            assert_eq!(
                tl.start(StageName::Compile),
                Err(StageError::OutOfOrder {
                    stage: StageName::Compile,
                    blocking: StageName::CheckoutBuggy,
                })
            );
        }

        #[test]
        fn cannot_finish_pending_stage() {
            let mut tl = StageTimeline::default();
            let err = tl
                .finish(
                    StageName::CheckoutBuggy,
                    StageOutcome::Failed {
                        message: "x".into(),
                        timed_out: false,
                    },
                )
                .unwrap_err();
            assert!(matches!(err, StageError::IllegalTransition { from: "pending", .. }));
        }

        #[test]
        fn skip_requires_earlier_failure() {
            let mut tl = StageTimeline::default();
            assert!(tl.skip(StageName::Compile, "no reason").is_err());
        }

        #[test]
        fn failure_skips_later_stages() {
            let mut tl = StageTimeline::default();
            tl.start(StageName::CheckoutBuggy).unwrap();
            tl.finish(
                StageName::CheckoutBuggy,
                StageOutcome::Failed {
                    message: "checkout failed".into(),
                    timed_out: false,
                },
            )
            .unwrap();
            for record in &tl.stages[1..] {
                match &record.state {
                    StageState::Done(StageOutcome::Skipped { reason }) => {
                        assert_eq!(reason, "stage checkout_buggy failed")
                    }
                    other => panic!("Expected Skipped, got {:?}", other),
                }
            }
            assert_eq!(
                tl.first_failure(),
                Some((StageName::CheckoutBuggy, "checkout failed"))
            );
        }

        #[test]
        fn skipped_stage_cannot_start() {
            let mut tl = StageTimeline::new(&[StageName::Compile, StageName::Rebuild]);
            tl.start(StageName::Compile).unwrap();
            tl.finish(
                StageName::Compile,
                StageOutcome::Failed {
                    message: "boom".into(),
                    timed_out: true,
                },
            )
            .unwrap();
            assert!(tl.start(StageName::Rebuild).is_err());
        }
    }

    mod run_tests {
        use super::*;

        #[test]
        fn run_short_circuits_after_failure() {
            let mut tl = StageTimeline::new(&[
                StageName::CheckoutBuggy,
                StageName::Compile,
                StageName::Collect,
            ]);
            let a: Option<u32> = tl.run(StageName::CheckoutBuggy, || Ok(1));
            assert_eq!(a, Some(1));
            let b: Option<u32> = tl.run(StageName::Compile, || Err(StageFailure::new("javac")));
            assert_eq!(b, None);
            let mut ran = false;
            let c: Option<()> = tl.run(StageName::Collect, || {
                ran = true;
                Ok(())
            });
            assert_eq!(c, None);
            assert!(!ran);
            assert!(!tl.all_ok());
        }

        #[test]
        fn details_are_recorded() {
            let mut tl = StageTimeline::new(&[StageName::ResolveTargets]);
            tl.run(StageName::ResolveTargets, || Ok(vec!["a", "b"]));
            match tl.state(StageName::ResolveTargets) {
                Some(StageState::Done(StageOutcome::Ok { details })) => {
                    assert_eq!(details, &serde_json::json!(["a", "b"]))
                }
                other => panic!("Expected Ok, got {:?}", other),
            }
            assert!(tl.all_ok());
            assert!(tl.stages[0].duration_secs.is_some());
        }

        #[test]
        fn timeline_serializes_with_status_tags() {
            let mut tl = StageTimeline::new(&[StageName::Compile, StageName::RunTests]);
            tl.run::<(), _>(StageName::Compile, || Err(StageFailure::timed_out("slow")));
            let json = serde_json::to_value(&tl).unwrap();
            let stages = json["stages"].as_array().unwrap();
            assert_eq!(stages[0]["name"], "compile");
            assert_eq!(stages[0]["state"], "done");
            assert_eq!(stages[0]["status"], "failed");
            assert_eq!(stages[0]["timed_out"], true);
            assert_eq!(stages[1]["status"], "skipped");
        }
    }
}
