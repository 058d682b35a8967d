//! New-score detection between consecutive polls

use std::collections::HashMap;

use crate::models::Machine;
use crate::notifications::NewHighScoreEvent;

/// rank → score id for one machine
pub type RankMap = HashMap<u32, String>;

/// machine id → rank map, as seen on the last successful poll
pub type ScoreHistory = HashMap<String, RankMap>;

/// Rank map of a machine's current leaderboard
pub fn rank_map(machine: &Machine) -> RankMap {
    machine
        .high_scores
        .iter()
        .map(|s| (s.rank, s.score_id.clone()))
        .collect()
}

/// Events for every rank whose entry changed since `history` was taken
///
/// A rank only counts as new when it was known before and now holds a
/// different score id. The first poll of a machine, and ranks that were empty
/// before, produce nothing.
pub fn detect_new_scores(history: &ScoreHistory, machine: &Machine) -> Vec<NewHighScoreEvent> {
    let Some(previous) = history.get(&machine.machine_id) else {
        return Vec::new();
    };

    machine
        .high_scores
        .iter()
        .filter(|score| {
            previous
                .get(&score.rank)
                .is_some_and(|prev_id| *prev_id != score.score_id)
        })
        .map(|score| NewHighScoreEvent::new(machine, score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HighScore;

    fn machine(id: &str, scores: &[(u32, &str)]) -> Machine {
        let mut machine = Machine::new(id, format!("Machine {id}"), "Godzilla");
        machine.high_scores = scores
            .iter()
            .map(|(rank, score_id)| HighScore {
                score_id: (*score_id).to_string(),
                rank: *rank,
                score: 1000 * u64::from(*rank),
                player_name: "Pat".to_string(),
                player_username: "pat".to_string(),
                player_initials: "PAT".to_string(),
                avatar_url: None,
            })
            .collect();
        machine
    }

    fn history(entries: &[(&str, u32, &str)]) -> ScoreHistory {
        let mut history = ScoreHistory::new();
        for (machine_id, rank, score_id) in entries {
            history
                .entry((*machine_id).to_string())
                .or_default()
                .insert(*rank, (*score_id).to_string());
        }
        history
    }

    #[test]
    fn test_changed_rank_emits_one_event() {
        let events = detect_new_scores(&history(&[("m1", 1, "A")]), &machine("m1", &[(1, "B")]));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].machine_id, "m1");
        assert_eq!(events[0].rank, 1);
        assert!(events[0].is_new_entry);
    }

    #[test]
    fn test_first_poll_emits_nothing() {
        let events = detect_new_scores(&ScoreHistory::new(), &machine("m1", &[(1, "B")]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_unchanged_rank_emits_nothing() {
        let events = detect_new_scores(&history(&[("m1", 1, "A")]), &machine("m1", &[(1, "A")]));
        assert!(events.is_empty());
    }

    #[test]
    fn test_previously_empty_rank_emits_nothing() {
        let events = detect_new_scores(
            &history(&[("m1", 1, "A")]),
            &machine("m1", &[(1, "A"), (2, "C")]),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_shifted_leaderboard() {
        // new champion pushes everyone down one rank
        let before = history(&[("m1", 1, "A"), ("m1", 2, "B"), ("m1", 3, "C")]);
        let after = machine("m1", &[(1, "N"), (2, "A"), (3, "B"), (4, "C")]);

        let ranks: Vec<u32> = detect_new_scores(&before, &after).iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_map() {
        let map = rank_map(&machine("m1", &[(1, "A"), (2, "B")]));
        assert_eq!(map.get(&1).map(String::as_str), Some("A"));
        assert_eq!(map.len(), 2);
    }
}
