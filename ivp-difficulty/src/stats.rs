//! Difficulty statistics for completed and in-progress sessions

use crate::state::SessionDifficultyState;
use ivp_common::DifficultyLevel;
use serde::Serialize;
use uuid::Uuid;

/// Summary of one session's difficulty trajectory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DifficultyStatistics {
    pub session_id: Uuid,
    pub initial_difficulty: DifficultyLevel,
    /// Final difficulty if finalized, else current
    pub ending_difficulty: DifficultyLevel,
    pub is_finalized: bool,
    pub changes_count: usize,
    pub increases: usize,
    pub decreases: usize,
    pub peak_difficulty: DifficultyLevel,
    pub lowest_difficulty: DifficultyLevel,
    /// Ending ordinal minus initial ordinal
    pub net_change: i8,
    /// Every level visited, starting with the initial difficulty
    pub trajectory: Vec<DifficultyLevel>,
    /// Earlier history was lost and rebuilt from columns
    pub history_truncated: bool,
}

impl DifficultyStatistics {
    pub fn from_state(state: &SessionDifficultyState) -> Self {
        let mut trajectory = vec![state.initial_difficulty()];
        if let Some(baseline) = state.history_baseline() {
            trajectory.push(baseline);
        }
        trajectory.extend(state.changes().iter().map(|change| change.to));

        let increases = state.changes().iter().filter(|c| c.to > c.from).count();
        let decreases = state.changes().iter().filter(|c| c.to < c.from).count();

        let peak_difficulty = trajectory.iter().copied().max().unwrap_or(state.initial_difficulty());
        let lowest_difficulty = trajectory.iter().copied().min().unwrap_or(state.initial_difficulty());

        let ending_difficulty = state.get_difficulty_for_practice();
        let net_change = ending_difficulty.ordinal() as i8 - state.initial_difficulty().ordinal() as i8;

        Self {
            session_id: state.session_id(),
            initial_difficulty: state.initial_difficulty(),
            ending_difficulty,
            is_finalized: state.is_finalized(),
            changes_count: state.changes().len(),
            increases,
            decreases,
            peak_difficulty,
            lowest_difficulty,
            net_change,
            trajectory,
            history_truncated: state.history_baseline().is_some(),
        }
    }
}
