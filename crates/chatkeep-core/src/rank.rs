use std::collections::HashMap;

use chatkeep_config::{Rank, RanksConfig};

use crate::error::{RecordError, Result};

/// Source of per-rank history limits. Owned by bot-wide settings; records only read it.
pub trait RankPolicy: Send + Sync {
    /// Maximum history length for `rank`, or `None` if the rank is not configured.
    fn limit_for(&self, rank: Rank) -> Option<usize>;
}

impl RankPolicy for RanksConfig {
    fn limit_for(&self, rank: Rank) -> Option<usize> {
        // Negative limits clamp to 0; history trimming never goes below the system message.
        self.history_limits
            .get(&rank)
            .map(|&limit| usize::try_from(limit).unwrap_or(0))
    }
}

impl RankPolicy for HashMap<Rank, usize> {
    fn limit_for(&self, rank: Rank) -> Option<usize> {
        self.get(&rank).copied()
    }
}

/// Look up the limit for `rank`. A missing entry is an error, never "unlimited".
pub fn history_limit(policy: &dyn RankPolicy, rank: Rank) -> Result<usize> {
    policy
        .limit_for(rank)
        .ok_or(RecordError::PolicyLookup(rank))
}
