use serde::{Deserialize, Serialize};
use tally::{Mergeable, Timestamped, merge_by_timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "Multiple Choice")]
    MultipleChoice,
    #[serde(rename = "Short Answer")]
    ShortAnswer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Novice,
    Varsity,
    Elite,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Novice, Difficulty::Varsity, Difficulty::Elite];
}

/// One answered toss-up or bonus in practice mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PracticeAnswerRecord", into = "PracticeAnswerRecord")]
pub struct PracticeAnswer {
    pub subject: String,
    pub question_type: QuestionType,
    pub is_bonus: bool,
    pub correct: bool,
}

impl PracticeAnswer {
    pub fn points(&self) -> u32 {
        match (self.correct, self.is_bonus) {
            (false, _) => 0,
            (true, true) => 10,
            (true, false) => 4,
        }
    }
}

// `points` is written for consumers of the stored JSON, but always recomputed when read back
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PracticeAnswerRecord {
    subject: String,
    question_type: QuestionType,
    is_bonus: bool,
    correct: bool,
    #[serde(default)]
    points: u32,
}

impl From<PracticeAnswerRecord> for PracticeAnswer {
    fn from(record: PracticeAnswerRecord) -> Self {
        Self {
            subject: record.subject,
            question_type: record.question_type,
            is_bonus: record.is_bonus,
            correct: record.correct,
        }
    }
}

impl From<PracticeAnswer> for PracticeAnswerRecord {
    fn from(answer: PracticeAnswer) -> Self {
        let points = answer.points();
        Self {
            subject: answer.subject,
            question_type: answer.question_type,
            is_bonus: answer.is_bonus,
            correct: answer.correct,
            points,
        }
    }
}

/// One finished match against the bot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VersusMatchRecord", into = "VersusMatchRecord")]
pub struct VersusMatch {
    pub difficulty: Difficulty,
    pub length: u32,
    pub you_score: u32,
    pub bot_score: u32,
}

impl VersusMatch {
    /// Ties are not wins.
    pub fn won(&self) -> bool {
        self.you_score > self.bot_score
    }

    pub fn tied(&self) -> bool {
        self.you_score == self.bot_score
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersusMatchRecord {
    difficulty: Difficulty,
    length: u32,
    you_score: u32,
    bot_score: u32,
    #[serde(default)]
    won: bool,
}

impl From<VersusMatchRecord> for VersusMatch {
    fn from(record: VersusMatchRecord) -> Self {
        Self {
            difficulty: record.difficulty,
            length: record.length,
            you_score: record.you_score,
            bot_score: record.bot_score,
        }
    }
}

impl From<VersusMatch> for VersusMatchRecord {
    fn from(versus: VersusMatch) -> Self {
        let won = versus.won();
        Self {
            difficulty: versus.difficulty,
            length: versus.length,
            you_score: versus.you_score,
            bot_score: versus.bot_score,
            won,
        }
    }
}

pub type PracticeEvent = Timestamped<PracticeAnswer>;
pub type VersusEvent = Timestamped<VersusMatch>;

/// Both of a user's histories, each in ascending timestamp order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsSnapshot {
    pub practice_history: Vec<PracticeEvent>,
    pub versus_history: Vec<VersusEvent>,
}

impl Mergeable for StatsSnapshot {
    fn merge(local: &Self, remote: &Self) -> Self {
        Self {
            practice_history: merge_by_timestamp(&local.practice_history, &remote.practice_history),
            versus_history: merge_by_timestamp(&local.versus_history, &remote.versus_history),
        }
    }

    fn num_events(&self) -> usize {
        self.practice_history.len() + self.versus_history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally::Timestamp;

    fn answer(is_bonus: bool, correct: bool) -> PracticeAnswer {
        PracticeAnswer {
            subject: "Physics".to_string(),
            question_type: QuestionType::ShortAnswer,
            is_bonus,
            correct,
        }
    }

    #[test]
    fn test_points() {
        assert_eq!(answer(false, false).points(), 0);
        assert_eq!(answer(true, false).points(), 0);
        assert_eq!(answer(true, true).points(), 10);
        assert_eq!(answer(false, true).points(), 4);
    }

    #[test]
    fn test_won() {
        let versus = |you_score, bot_score| VersusMatch {
            difficulty: Difficulty::Elite,
            length: 10,
            you_score,
            bot_score,
        };
        assert!(versus(10, 7).won());
        assert!(!versus(7, 10).won());
        assert!(!versus(8, 8).won());
        assert!(versus(8, 8).tied());
    }

    #[test]
    fn test_practice_event_json_shape() {
        let event = Timestamped::new(
            Timestamp::parse("2025-02-01T09:30:00.250Z").unwrap(),
            PracticeAnswer {
                subject: "Earth and Space".to_string(),
                question_type: QuestionType::MultipleChoice,
                is_bonus: true,
                correct: true,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": "2025-02-01T09:30:00.250Z",
                "subject": "Earth and Space",
                "questionType": "Multiple Choice",
                "isBonus": true,
                "correct": true,
                "points": 10,
            })
        );
    }

    #[test]
    fn test_stored_points_and_won_are_ignored() {
        let practice: PracticeEvent = serde_json::from_value(serde_json::json!({
            "timestamp": "2025-02-01T09:30:00.000Z",
            "subject": "Math",
            "questionType": "Short Answer",
            "isBonus": false,
            "correct": false,
            "points": 99,
        }))
        .unwrap();
        assert_eq!(practice.event.points(), 0);

        let versus: VersusEvent = serde_json::from_value(serde_json::json!({
            "timestamp": "2025-02-01T09:30:00.000Z",
            "difficulty": "varsity",
            "length": 15,
            "youScore": 3,
            "botScore": 3,
            "won": true,
        }))
        .unwrap();
        assert!(!versus.event.won());
        assert_eq!(serde_json::to_value(&versus).unwrap()["won"], false);
    }

    #[test]
    fn test_snapshot_missing_lists_read_as_empty() {
        let snapshot: StatsSnapshot = serde_json::from_str(r#"{ "practiceHistory": [] }"#).unwrap();
        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_snapshot_merge_is_per_list() {
        let t1 = Timestamp::parse("2025-01-01T00:00:00Z").unwrap();
        let t2 = Timestamp::parse("2025-01-02T00:00:00Z").unwrap();
        let versus = |bot_score| VersusMatch {
            difficulty: Difficulty::Novice,
            length: 5,
            you_score: 4,
            bot_score,
        };

        let local = StatsSnapshot {
            practice_history: vec![Timestamped::new(t1, answer(false, true))],
            versus_history: vec![Timestamped::new(t1, versus(1))],
        };
        let remote = StatsSnapshot {
            practice_history: vec![Timestamped::new(t2, answer(true, true))],
            versus_history: vec![Timestamped::new(t1, versus(9))],
        };

        let merged = StatsSnapshot::merge(&local, &remote);
        assert_eq!(merged.practice_history.len(), 2);
        assert_eq!(merged.versus_history, vec![Timestamped::new(t1, versus(9))]);
        assert_eq!(StatsSnapshot::merge(&merged, &remote), merged);
    }
}
