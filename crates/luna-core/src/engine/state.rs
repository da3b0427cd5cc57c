//! Executor states

use std::fmt;

/// Position of one `evaluate` run in its state machine
///
/// `Start → Applying → WaitPreStageReady → CopyIn → WaitStageExit(1..=N) →
/// WaitPostStageReady → CopyOut → Remove → Done`, or `Failed(code)` right
/// after a stage exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Start,
    Applying,
    WaitPreStageReady,
    CopyIn,
    WaitStageExit(usize),
    WaitPostStageReady,
    CopyOut,
    Remove,
    Done,
    Failed(i32),
}

impl ExecutorState {
    /// State following a successful step; `stages` is the task's stage count
    pub fn next(self, stages: usize) -> ExecutorState {
        match self {
            Self::Start => Self::Applying,
            Self::Applying => Self::WaitPreStageReady,
            Self::WaitPreStageReady => Self::CopyIn,
            Self::CopyIn => Self::WaitStageExit(1),
            Self::WaitStageExit(i) if i < stages => Self::WaitStageExit(i + 1),
            Self::WaitStageExit(_) => Self::WaitPostStageReady,
            Self::WaitPostStageReady => Self::CopyOut,
            Self::CopyOut => Self::Remove,
            Self::Remove => Self::Done,
            Self::Done => Self::Done,
            Self::Failed(code) => Self::Failed(code),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitStageExit(i) => write!(f, "WaitStageExit({})", i),
            Self::Failed(code) => write!(f, "Failed({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}
