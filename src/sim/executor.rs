//! Sequence executor: the run state machine and the per-tick step logic
//!
//! The executor owns one [`BeamModel`] (handed in by the host) and at most
//! one loaded [`Sequence`]. It only moves when the host calls
//! [`Executor::tick`] or [`Executor::run`]; nothing runs in the background.
//!
//! ```text
//! IDLE --load--> READY --start--> RUNNING --pause--> PAUSED
//!                                   |  ^----resume-----'
//!                                   +--> COMPLETED (terminal)
//!                                   '--> FAILED    (terminal)
//! stop/reset: any state --> IDLE
//! ```
//!
//! Every command returns a [`Frame`]: the post-call snapshot plus the events
//! raised during that call.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::beam::{BeamModel, BeamState, BeamStatus, Parameter};
use super::physics::ramp_profile;
use super::step::{Sequence, SequenceStep, StepKind};
use crate::error::{Error, Result, StepFailure};

/// Position in the execution state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No sequence loaded
    #[default]
    Idle,
    /// Sequence loaded, cursor at 0
    Ready,
    /// Actively ticking
    Running,
    /// Suspended mid-sequence, resumable
    Paused,
    /// Cursor reached the end
    Completed,
    /// A step failed
    Failed,
}

impl RunState {
    /// Leaving a terminal state takes an explicit load or reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Idle => "IDLE",
            RunState::Ready => "READY",
            RunState::Running => "RUNNING",
            RunState::Paused => "PAUSED",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
        })
    }
}

/// Cursor and progress of the current run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionContext {
    /// Index of the active step (equals the sequence length once completed)
    pub cursor: usize,
    pub run_state: RunState,
    /// Simulated time spent on the active step
    pub elapsed_in_step: f64,
    pub last_error: Option<StepFailure>,
    /// Value the active ramp started from (captured on its first tick)
    #[serde(skip)]
    ramp_start: Option<f64>,
}

/// Something the host may want to react to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutorEvent {
    RunStateChanged { from: RunState, to: RunState },
    StepCompleted { index: usize },
    StepFailed { failure: StepFailure },
    StatusChanged { from: BeamStatus, to: BeamStatus },
}

/// Snapshot handed back to the host after every command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    #[serde(flatten)]
    pub beam: BeamState,
    pub run_state: RunState,
    pub cursor: usize,
    pub sequence_len: usize,
    pub elapsed_in_step: f64,
    pub last_error: Option<StepFailure>,
    /// Events raised by the call that produced this frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<ExecutorEvent>,
}

/// Host decision between ticks of [`Executor::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Continue,
    Pause,
    Stop,
}

/// Result of applying the active step for one tick
enum StepOutcome {
    /// Still on this step
    Pending,
    /// Step finished, advance the cursor
    Done,
    Failed(StepFailure),
}

/// Drives a loaded sequence against a beam model
///
/// Not internally synchronized: all commands must come from one logical
/// thread of control (e.g. the host's event loop).
#[derive(Debug)]
pub struct Executor {
    model: BeamModel,
    sequence: Option<Sequence>,
    ctx: ExecutionContext,
    events: Vec<ExecutorEvent>,
}

impl Executor {
    pub fn new(model: BeamModel) -> Self {
        Self {
            model,
            sequence: None,
            ctx: ExecutionContext::default(),
            events: Vec::new(),
        }
    }

    pub fn model(&self) -> &BeamModel {
        &self.model
    }

    /// Release the model (e.g. to hand it to a new executor)
    pub fn into_model(self) -> BeamModel {
        self.model
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn run_state(&self) -> RunState {
        self.ctx.run_state
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    /// The step under the cursor, if any
    pub fn current_step(&self) -> Option<&SequenceStep> {
        self.sequence
            .as_ref()
            .and_then(|s| s.steps.get(self.ctx.cursor))
    }

    /// Snapshot without mutation (no events)
    pub fn frame(&self) -> Frame {
        Frame {
            beam: self.model.snapshot(),
            run_state: self.ctx.run_state,
            cursor: self.ctx.cursor,
            sequence_len: self.sequence.as_ref().map_or(0, Sequence::len),
            elapsed_in_step: self.ctx.elapsed_in_step,
            last_error: self.ctx.last_error.clone(),
            events: Vec::new(),
        }
    }

    /// Load a sequence, replacing any previous one
    ///
    /// A running or paused sequence is stopped first. A sequence that fails
    /// validation leaves everything as it was.
    pub fn load(&mut self, sequence: Sequence) -> Result<Frame> {
        sequence.validate()?;

        if matches!(self.ctx.run_state, RunState::Running | RunState::Paused) {
            log::info!("Stopping active run to load a new sequence");
            self.halt();
        }

        log::info!(
            "Loaded sequence {:?} ({} steps)",
            sequence.name,
            sequence.len()
        );
        self.sequence = Some(sequence);
        let from = self.ctx.run_state;
        self.ctx = ExecutionContext::default();
        self.ctx.run_state = from;
        self.transition(RunState::Ready);
        Ok(self.take_frame())
    }

    pub fn start(&mut self) -> Result<Frame> {
        self.require(&[RunState::Ready], "start")?;
        self.transition(RunState::Running);
        Ok(self.take_frame())
    }

    pub fn pause(&mut self) -> Result<Frame> {
        self.require(&[RunState::Running], "pause")?;
        self.transition(RunState::Paused);
        Ok(self.take_frame())
    }

    /// Continue from the exact cursor and step progress held at pause
    pub fn resume(&mut self) -> Result<Frame> {
        self.require(&[RunState::Paused], "resume")?;
        self.transition(RunState::Running);
        Ok(self.take_frame())
    }

    /// Discard the sequence and run context; always succeeds
    ///
    /// The beam itself is left as it is.
    pub fn stop(&mut self) -> Frame {
        self.halt();
        self.take_frame()
    }

    pub fn reset(&mut self) -> Frame {
        self.stop()
    }

    /// Manual operator override, allowed only while IDLE or PAUSED
    pub fn set_parameter(&mut self, parameter: Parameter, value: f64) -> Result<Frame> {
        self.require(&[RunState::Idle, RunState::Paused], "set_parameter")?;
        let before = self.model.status();
        self.model.set_parameter(parameter, value)?;
        log::info!("Operator set {} to {}", parameter, value);
        self.note_status(before);
        Ok(self.take_frame())
    }

    /// Advance simulated time by `delta_time` and apply the active step
    ///
    /// At most one step resolves per tick. Step failures end the run in
    /// `Failed` and are reported through the frame, not as `Err`.
    pub fn tick(&mut self, delta_time: f64) -> Result<Frame> {
        self.require(&[RunState::Running], "tick")?;
        if !delta_time.is_finite() || delta_time < 0.0 {
            return Err(Error::InvalidTimeDelta(delta_time));
        }

        let Some(step) = self.current_step().cloned() else {
            // Cursor is past the end; only reachable if completion was missed
            self.transition(RunState::Completed);
            return Ok(self.take_frame());
        };

        let before = self.model.status();
        self.model.advance(delta_time)?;

        match self.apply(&step, delta_time) {
            StepOutcome::Pending => {}
            StepOutcome::Done => self.complete_step(),
            StepOutcome::Failed(failure) => self.fail(failure),
        }

        self.note_status(before);
        Ok(self.take_frame())
    }

    /// Tick repeatedly until the run ends or the host asks to pause or stop
    ///
    /// `control` sees every frame and decides what happens before the next
    /// tick; a host that paces ticks in real time sleeps inside it.
    pub fn run<F>(&mut self, tick_interval: f64, mut control: F) -> Result<Frame>
    where
        F: FnMut(&Frame) -> HostCommand,
    {
        if !tick_interval.is_finite() || tick_interval <= 0.0 {
            return Err(Error::InvalidTimeDelta(tick_interval));
        }
        self.require(&[RunState::Running], "run")?;

        loop {
            let frame = self.tick(tick_interval)?;
            let command = control(&frame);
            if frame.run_state.is_terminal() {
                return Ok(frame);
            }
            match command {
                HostCommand::Continue => {}
                HostCommand::Pause => return self.pause(),
                HostCommand::Stop => return Ok(self.stop()),
            }
        }
    }

    fn apply(&mut self, step: &SequenceStep, delta_time: f64) -> StepOutcome {
        let index = self.ctx.cursor;

        match step.kind {
            StepKind::SetParameter { parameter, value } => self.write(index, parameter, value),

            StepKind::Wait { duration } => {
                self.ctx.elapsed_in_step += delta_time;
                if let Some(failure) = self.check_timeout(index, step.timeout) {
                    return StepOutcome::Failed(failure);
                }
                if self.ctx.elapsed_in_step >= duration {
                    StepOutcome::Done
                } else {
                    StepOutcome::Pending
                }
            }

            StepKind::AssertCondition { condition } => {
                let (holds, observed) = condition.evaluate(&self.model.snapshot());
                if holds {
                    StepOutcome::Done
                } else {
                    StepOutcome::Failed(StepFailure::AssertionFailed {
                        step: index,
                        condition,
                        observed,
                    })
                }
            }

            StepKind::RampParameter {
                parameter,
                target,
                duration,
            } => {
                let current = self.model.snapshot().get(parameter);
                let start = *self.ctx.ramp_start.get_or_insert(current);
                self.ctx.elapsed_in_step += delta_time;
                if let Some(failure) = self.check_timeout(index, step.timeout) {
                    return StepOutcome::Failed(failure);
                }

                let progress = if duration > 0.0 {
                    self.ctx.elapsed_in_step / duration
                } else {
                    1.0
                };
                if progress >= 1.0 {
                    return self.write(index, parameter, target);
                }
                let value = start + ramp_profile(progress) * (target - start);
                match self.write(index, parameter, value) {
                    StepOutcome::Done => StepOutcome::Pending,
                    other => other,
                }
            }

            StepKind::Inject { species, count } => match self.model.inject(species, count) {
                Ok(_) => StepOutcome::Done,
                Err(err) => Self::rejected(index, Parameter::Intensity, count as f64, err),
            },

            StepKind::Extract => {
                self.model.extract();
                StepOutcome::Done
            }
        }
    }

    fn write(&mut self, index: usize, parameter: Parameter, value: f64) -> StepOutcome {
        match self.model.set_parameter(parameter, value) {
            Ok(()) => StepOutcome::Done,
            Err(err) => Self::rejected(index, parameter, value, err),
        }
    }

    fn rejected(index: usize, parameter: Parameter, value: f64, err: Error) -> StepOutcome {
        log::debug!("Step {} rejected by the model: {}", index, err);
        let reason = match err {
            Error::InvalidParameter { reason, .. } => reason,
            _ => "rejected by the model",
        };
        StepOutcome::Failed(StepFailure::ParameterRejected {
            step: index,
            parameter,
            value,
            reason,
        })
    }

    fn check_timeout(&self, index: usize, timeout: Option<f64>) -> Option<StepFailure> {
        let timeout = timeout?;
        (self.ctx.elapsed_in_step > timeout).then(|| StepFailure::Timeout {
            step: index,
            elapsed: self.ctx.elapsed_in_step,
            timeout,
        })
    }

    fn complete_step(&mut self) {
        let index = self.ctx.cursor;
        log::debug!("Step {} complete", index);
        self.events.push(ExecutorEvent::StepCompleted { index });

        self.ctx.cursor += 1;
        self.ctx.elapsed_in_step = 0.0;
        self.ctx.ramp_start = None;

        let len = self.sequence.as_ref().map_or(0, Sequence::len);
        if self.ctx.cursor >= len {
            self.transition(RunState::Completed);
        }
    }

    fn fail(&mut self, failure: StepFailure) {
        log::warn!("Sequence failed: {}", failure);
        self.events.push(ExecutorEvent::StepFailed {
            failure: failure.clone(),
        });
        self.ctx.last_error = Some(failure);
        self.transition(RunState::Failed);
    }

    /// Drop the sequence and context, landing in IDLE
    fn halt(&mut self) {
        let from = self.ctx.run_state;
        self.sequence = None;
        self.ctx = ExecutionContext::default();
        self.ctx.run_state = from;
        self.transition(RunState::Idle);
    }

    fn transition(&mut self, to: RunState) {
        let from = self.ctx.run_state;
        if from == to {
            return;
        }
        log::info!("Run state {} -> {}", from, to);
        self.ctx.run_state = to;
        self.events.push(ExecutorEvent::RunStateChanged { from, to });
    }

    fn note_status(&mut self, before: BeamStatus) {
        let after = self.model.status();
        if before != after {
            log::info!("Beam status {} -> {}", before, after);
            self.events
                .push(ExecutorEvent::StatusChanged { from: before, to: after });
        }
    }

    fn require(&self, allowed: &[RunState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.ctx.run_state) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                operation,
                state: self.ctx.run_state,
            })
        }
    }

    fn take_frame(&mut self) -> Frame {
        let mut frame = self.frame();
        frame.events = std::mem::take(&mut self.events);
        frame
    }
}
