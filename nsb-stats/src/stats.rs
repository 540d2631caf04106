//! Summaries shown on the stats page. These are plain reductions over a snapshot.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::events::{Difficulty, PracticeEvent, StatsSnapshot, VersusEvent};

pub const SUBJECTS: [&str; 10] = [
    "Life Science",
    "Physical Science",
    "Earth and Space",
    "Energy",
    "Math",
    "Mathematics",
    "General Science",
    "Biology",
    "Chemistry",
    "Physics",
];

const RECENT_WINDOW_DAYS: i64 = 7;
const RECENT_MATCHES: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubjectStats {
    pub total: usize,
    pub correct: usize,
    /// Rounded percentage correct.
    pub pct: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PracticeStats {
    pub total: usize,
    pub correct: usize,
    pub points: u32,
    /// Only subjects with at least one answer, in [`SUBJECTS`] order.
    pub by_subject: IndexMap<&'static str, SubjectStats>,
    /// Consecutive correct answers at the end of the history.
    pub streak: usize,
    pub recent_total: usize,
    pub recent_correct: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DifficultyStats {
    pub played: usize,
    pub wins: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VersusStats {
    pub total: usize,
    pub wins: usize,
    /// Ties are neither wins nor losses.
    pub losses: usize,
    pub ties: usize,
    pub by_difficulty: IndexMap<Difficulty, DifficultyStats>,
    /// The most recent matches, newest first.
    pub recent: Vec<VersusEvent>,
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

pub fn practice_stats(snapshot: &StatsSnapshot, now: DateTime<Utc>) -> PracticeStats {
    let history = &snapshot.practice_history;

    let mut by_subject = IndexMap::new();
    for subject in SUBJECTS {
        let answers: Vec<&PracticeEvent> = history
            .iter()
            .filter(|h| h.event.subject == subject)
            .collect();
        if answers.is_empty() {
            continue;
        }
        let correct = answers.iter().filter(|h| h.event.correct).count();
        by_subject.insert(
            subject,
            SubjectStats {
                total: answers.len(),
                correct,
                pct: percent(correct, answers.len()),
            },
        );
    }

    let week_ago = now - Duration::days(RECENT_WINDOW_DAYS);
    let recent = history
        .iter()
        .filter(|h| h.timestamp.as_datetime() > week_ago);

    PracticeStats {
        total: history.len(),
        correct: history.iter().filter(|h| h.event.correct).count(),
        points: history.iter().map(|h| h.event.points()).sum(),
        by_subject,
        streak: history
            .iter()
            .rev()
            .take_while(|h| h.event.correct)
            .count(),
        recent_total: recent.clone().count(),
        recent_correct: recent.filter(|h| h.event.correct).count(),
    }
}

pub fn versus_stats(snapshot: &StatsSnapshot) -> VersusStats {
    let history = &snapshot.versus_history;

    let mut by_difficulty = IndexMap::new();
    for difficulty in Difficulty::ALL {
        let matches = history
            .iter()
            .filter(|h| h.event.difficulty == difficulty);
        let played = matches.clone().count();
        if played == 0 {
            continue;
        }
        by_difficulty.insert(
            difficulty,
            DifficultyStats {
                played,
                wins: matches.filter(|h| h.event.won()).count(),
            },
        );
    }

    VersusStats {
        total: history.len(),
        wins: history.iter().filter(|h| h.event.won()).count(),
        losses: history
            .iter()
            .filter(|h| !h.event.won() && !h.event.tied())
            .count(),
        ties: history.iter().filter(|h| h.event.tied()).count(),
        by_difficulty,
        recent: history.iter().rev().take(RECENT_MATCHES).cloned().collect(),
    }
}
