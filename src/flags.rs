use crate::components::{Flag, PlayerSlot};

/// What a single sensor contact changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagUpdate {
    /// Index of a flag that went from lowered to raised.
    pub raised: Option<usize>,
    /// True only on the contact that completed the set.
    pub win: bool,
}

/// Raised-state of every flag in the attempt. This is the source of truth;
/// rendering reads it and never writes back.
#[derive(Clone, Debug, Default)]
pub struct FlagBoard {
    flags: Vec<Flag>,
    win_signaled: bool,
}

impl FlagBoard {
    /// Fresh board for a new attempt; every flag starts lowered.
    pub fn new(flags: &[Flag]) -> Self {
        Self {
            flags: flags
                .iter()
                .map(|f| Flag {
                    raised: false,
                    ..*f
                })
                .collect(),
            win_signaled: false,
        }
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn is_raised(&self, index: usize) -> bool {
        self.flags.get(index).is_some_and(|f| f.raised)
    }

    pub fn all_raised(&self) -> bool {
        !self.flags.is_empty() && self.flags.iter().all(|f| f.raised)
    }

    pub fn win_signaled(&self) -> bool {
        self.win_signaled
    }

    /// A player's body started touching flag `index`. Only the owner raises
    /// it, raising is permanent, and win fires on the first all-raised state.
    pub fn on_flag_touched(&mut self, index: usize, player: PlayerSlot) -> FlagUpdate {
        let mut update = FlagUpdate::default();
        if let Some(flag) = self.flags.get_mut(index) {
            if flag.owner == player && !flag.raised {
                flag.raised = true;
                update.raised = Some(index);
            }
        }
        if self.all_raised() && !self.win_signaled {
            self.win_signaled = true;
            update.win = true;
        }
        update
    }
}
