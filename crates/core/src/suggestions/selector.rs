//! Trickle-down selection past members in cooldown

use tracing::debug;

use super::cooldown::{CooldownGuard, CooldownStore};
use super::types::{RankedCandidate, Selection, TrickledCandidate};

/// Walks `ranked` in order, skipping members whose cooldown is running, until
/// `limit` members are accepted or the list is exhausted.
///
/// The store is only read. Committing the selection is the caller's call, so
/// an aborted suggestion never consumes cooldown slots. A short or empty
/// selection is a normal outcome.
pub fn select(
    ranked: &[RankedCandidate],
    limit: usize,
    oversample_factor: usize,
    cooldown: &CooldownStore,
) -> Selection {
    select_guarded(ranked, limit, oversample_factor, &cooldown.guard())
}

/// [`select`] against an already held guard, so the caller can commit the
/// result before anyone else observes the store.
pub fn select_guarded(
    ranked: &[RankedCandidate],
    limit: usize,
    oversample_factor: usize,
    cooldown: &CooldownGuard<'_>,
) -> Selection {
    let expected_pool = limit.saturating_mul(oversample_factor);
    if ranked.len() < expected_pool {
        debug!(
            event_name = "suggestions.select.small_pool",
            pool = ranked.len(),
            expected_pool,
            "candidate pool is smaller than the oversampled window"
        );
    }

    let mut selection = Selection { pool_size: ranked.len(), ..Selection::default() };

    for (index, candidate) in ranked.iter().enumerate() {
        if selection.selected.len() >= limit {
            break;
        }

        if let Some(remaining) = cooldown.remaining(&candidate.user_id) {
            debug!(
                event_name = "suggestions.select.trickled",
                user_id = %candidate.user_id,
                original_rank = index + 1,
                "member in cooldown, trickling down"
            );
            selection.trickled.push(TrickledCandidate {
                user_id: candidate.user_id.clone(),
                original_rank: index + 1,
                remaining,
            });
            continue;
        }

        selection.selected.push(candidate.clone());
    }

    selection
}
