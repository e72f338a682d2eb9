/// Discrete commands from the input-handling side.
///
/// Commands are queued and applied at the start of the next tick, so the
/// sequencer's state has a single writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SpeedUp,
    SpeedDown,
    FxLevelUp,
    FxLevelDown,
    PrevState,
    NextState,
    RandomState,
    SelectState(usize),
    ToggleRandomizer,
    /// Enter forced mode; the State is selected once on the next tick.
    ForceState(usize),
    /// Leave forced mode.
    ClearForced,
    Shutdown,
}

impl Command {
    /// True for commands that pick a State directly.
    pub fn selects_state(&self) -> bool {
        matches!(
            self,
            Command::PrevState | Command::NextState | Command::RandomState | Command::SelectState(_)
        )
    }
}

/// Transition policy currently in charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Sequential,
    Randomized,
    Forced,
}
