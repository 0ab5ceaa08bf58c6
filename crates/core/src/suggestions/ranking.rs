//! Candidate ranking across topics

use std::cmp::Ordering;
use std::collections::HashMap;

use super::types::{RankedCandidate, TopicMatch};

/// Consolidates matches per member and orders them by relationship kind
/// (desc), activity score (desc) and user id (asc).
///
/// Pure: the output depends only on the multiset of input matches.
pub fn rank(matches: &[TopicMatch]) -> Vec<RankedCandidate> {
    let mut by_user: HashMap<&str, RankedCandidate> = HashMap::new();

    for candidate_match in matches {
        let score = sanitize_score(candidate_match.activity_score);
        let entry = by_user.entry(candidate_match.user_id.as_str()).or_insert_with(|| {
            RankedCandidate {
                user_id: candidate_match.user_id.clone(),
                display_name: None,
                best_kind: candidate_match.relationship_kind,
                activity_score: score,
                topics: Vec::new(),
                relationship_count: 0,
            }
        });

        entry.relationship_count += 1;
        if !entry.topics.contains(&candidate_match.topic) {
            entry.topics.push(candidate_match.topic.clone());
        }
        if entry.display_name.is_none() {
            entry.display_name.clone_from(&candidate_match.display_name);
        }

        match candidate_match.relationship_kind.cmp(&entry.best_kind) {
            Ordering::Greater => {
                entry.best_kind = candidate_match.relationship_kind;
                entry.activity_score = score;
            }
            Ordering::Equal => {
                entry.activity_score = entry.activity_score.max(score);
            }
            Ordering::Less => {}
        }
    }

    let mut ranked: Vec<RankedCandidate> = by_user.into_values().collect();
    // Topic lists follow input order, which may itself be unordered.
    for candidate in &mut ranked {
        candidate.topics.sort();
    }
    ranked.sort_by(compare_candidates);
    ranked
}

fn compare_candidates(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.best_kind
        .cmp(&a.best_kind)
        .then_with(|| b.activity_score.total_cmp(&a.activity_score))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

fn sanitize_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::rank;
    use crate::domain::topic::RelationshipKind::{Expert, InterestedIn, WorkingOn};
    use crate::suggestions::TopicMatch;

    fn ids(matches: &[TopicMatch]) -> Vec<String> {
        rank(matches).into_iter().map(|candidate| candidate.user_id).collect()
    }

    #[test]
    fn empty_input_ranks_to_empty_output() {
        assert!(rank(&[]).is_empty());
    }

    #[test]
    fn best_kind_wins_across_topics() {
        let matches = vec![
            TopicMatch::new("u1", "ai", Expert, 5.0),
            TopicMatch::new("u2", "ai", WorkingOn, 9.0),
            TopicMatch::new("u1", "ml", WorkingOn, 1.0),
        ];

        let ranked = rank(&matches);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].user_id, "u1");
        assert_eq!(ranked[0].best_kind, Expert);
        assert_eq!(ranked[0].activity_score, 5.0);
        assert_eq!(ranked[0].topics, vec!["ai".to_string(), "ml".to_string()]);
        assert_eq!(ranked[0].relationship_count, 2);
        assert_eq!(ranked[1].user_id, "u2");
        assert_eq!(ranked[1].best_kind, WorkingOn);
        assert_eq!(ranked[1].activity_score, 9.0);
    }

    #[test]
    fn activity_only_counts_at_best_kind() {
        let matches = vec![
            TopicMatch::new("u1", "ai", InterestedIn, 100.0),
            TopicMatch::new("u1", "ml", WorkingOn, 2.0),
            TopicMatch::new("u1", "cv", WorkingOn, 4.0),
        ];

        let ranked = rank(&matches);

        assert_eq!(ranked[0].best_kind, WorkingOn);
        assert_eq!(ranked[0].activity_score, 4.0);
    }

    #[test]
    fn expert_outranks_interested_regardless_of_activity() {
        let matches = vec![
            TopicMatch::new("busy", "ai", InterestedIn, 1_000.0),
            TopicMatch::new("quiet", "ai", Expert, 0.0),
            TopicMatch::new("builder", "ai", WorkingOn, 500.0),
        ];

        assert_eq!(ids(&matches), vec!["quiet", "builder", "busy"]);
    }

    #[test]
    fn ties_break_by_ascending_user_id() {
        let matches = vec![
            TopicMatch::new("u9", "ai", WorkingOn, 3.0),
            TopicMatch::new("u10", "ai", WorkingOn, 3.0),
            TopicMatch::new("u2", "ai", WorkingOn, 3.0),
        ];

        assert_eq!(ids(&matches), vec!["u10", "u2", "u9"]);
    }

    #[test]
    fn ranking_is_independent_of_input_order() {
        let mut matches = vec![
            TopicMatch::new("u3", "ai", WorkingOn, 3.0),
            TopicMatch::new("u1", "ml", Expert, 1.0),
            TopicMatch::new("u2", "ai", WorkingOn, 3.0),
            TopicMatch::new("u4", "cv", InterestedIn, 8.0),
            TopicMatch::new("u1", "ai", InterestedIn, 4.0),
            TopicMatch::new("u5", "ml", WorkingOn, 7.5),
        ];

        let first = rank(&matches);
        assert_eq!(first, rank(&matches));

        matches.reverse();
        assert_eq!(first, rank(&matches));

        matches.rotate_left(2);
        assert_eq!(first, rank(&matches));
    }

    #[test]
    fn nan_scores_are_ranked_as_zero() {
        let matches = vec![
            TopicMatch::new("u1", "ai", WorkingOn, f64::NAN),
            TopicMatch::new("u2", "ai", WorkingOn, 0.5),
            TopicMatch::new("u0", "ai", WorkingOn, 0.0),
        ];

        assert_eq!(ids(&matches), vec!["u2", "u0", "u1"]);
    }

    #[test]
    fn first_known_display_name_is_kept() {
        let matches = vec![
            TopicMatch::new("u1", "ai", WorkingOn, 1.0),
            TopicMatch::new("u1", "ml", WorkingOn, 1.0).with_display_name("Ada"),
        ];

        assert_eq!(rank(&matches)[0].label(), "Ada");
    }
}
