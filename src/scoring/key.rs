//! Answer keys
//!
//! Keys are kept sorted by question number, so the scorer can pair the n-th decoded
//! answer with the n-th entry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::KeyError;

/// Questions on the standard form
pub const STANDARD_QUESTIONS: usize = 45;

/// Points per question unless a key says otherwise
pub const DEFAULT_POINTS: u32 = 2;

/// Highest valid answer choice
pub const MAX_CHOICE: u8 = 5;

/// Question type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Listening,
    /// Purpose or mood of the writer
    Purpose,
    /// Main idea, title, claim or gist
    #[default]
    Topic,
    /// Charts, notices and detail matching
    Data,
    /// Implied meaning of an underlined phrase
    Meaning,
    Grammar,
    Vocab,
    Blank,
    /// Sentence that breaks the flow
    Flow,
    Order,
    Insert,
    Summary,
    /// Long passage sets
    Long,
}

impl Category {
    /// Reporting bucket this category is tallied under
    pub fn bucket(self) -> ReportBucket {
        match self {
            Category::Listening => ReportBucket::Listening,
            Category::Vocab | Category::Meaning => ReportBucket::Vocab,
            Category::Grammar => ReportBucket::Grammar,
            _ => ReportBucket::Reading,
        }
    }
}

/// Coarse grouping used in score reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportBucket {
    Listening,
    Vocab,
    Grammar,
    Reading,
}

impl ReportBucket {
    pub const ALL: [ReportBucket; 4] = [
        ReportBucket::Listening,
        ReportBucket::Vocab,
        ReportBucket::Grammar,
        ReportBucket::Reading,
    ];
}

/// One question of an answer key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub number: u32,
    pub correct_choice: u8,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub category: Category,
}

fn default_points() -> u32 {
    DEFAULT_POINTS
}

/// Validated answer key, sorted by question number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KeyFile", into = "KeyFile")]
pub struct AnswerKey {
    entries: Vec<KeyEntry>,
}

/// On-disk layout: a list of `[[questions]]` tables
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyFile {
    questions: Vec<KeyEntry>,
}

impl TryFrom<KeyFile> for AnswerKey {
    type Error = KeyError;

    fn try_from(file: KeyFile) -> Result<Self, Self::Error> {
        AnswerKey::new(file.questions)
    }
}

impl From<AnswerKey> for KeyFile {
    fn from(key: AnswerKey) -> Self {
        KeyFile {
            questions: key.entries,
        }
    }
}

impl AnswerKey {
    /// Build a key, sorting by question number
    pub fn new(mut entries: Vec<KeyEntry>) -> Result<Self, KeyError> {
        entries.sort_by_key(|e| e.number);

        for pair in entries.windows(2) {
            if pair[0].number == pair[1].number {
                return Err(KeyError::DuplicateQuestion(pair[0].number));
            }
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| !(1..=MAX_CHOICE).contains(&e.correct_choice))
        {
            return Err(KeyError::InvalidChoice {
                number: bad.number,
                choice: bad.correct_choice,
            });
        }

        Ok(Self { entries })
    }

    /// The standard 45-question form with its usual question types
    pub fn standard(correct_choices: &[u8]) -> Result<Self, KeyError> {
        if correct_choices.len() != STANDARD_QUESTIONS {
            return Err(KeyError::WrongLength {
                expected: STANDARD_QUESTIONS,
                actual: correct_choices.len(),
            });
        }

        let entries = correct_choices
            .iter()
            .zip(1u32..)
            .map(|(&correct_choice, number)| KeyEntry {
                number,
                correct_choice,
                points: DEFAULT_POINTS,
                category: standard_category(number),
            })
            .collect();
        Self::new(entries)
    }

    pub fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all question points, saturating at `u32::MAX`
    pub fn max_score(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |total, e| total.saturating_add(e.points))
    }
}

/// Question type of a standard-form question number
pub fn standard_category(number: u32) -> Category {
    match number {
        1..=17 => Category::Listening,
        18 | 19 => Category::Purpose,
        20 | 22..=24 => Category::Topic,
        21 => Category::Meaning,
        25..=28 => Category::Data,
        29 => Category::Grammar,
        30 => Category::Vocab,
        31..=34 => Category::Blank,
        35 => Category::Flow,
        36 | 37 => Category::Order,
        38 | 39 => Category::Insert,
        40 => Category::Summary,
        41..=45 => Category::Long,
        _ => Category::default(),
    }
}

/// Load an answer key from a TOML file
pub fn load_answer_key(path: &Path) -> Result<AnswerKey> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read answer key from {:?}", path))?;
    let key: AnswerKey = toml::from_str(&content)
        .with_context(|| format!("Failed to parse answer key {:?}", path))?;
    Ok(key)
}

/// Save an answer key as TOML
pub fn save_answer_key(key: &AnswerKey, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(key).context("Failed to serialize answer key")?;
    fs::write(path, content).with_context(|| format!("Failed to write answer key to {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(number: u32, correct_choice: u8) -> KeyEntry {
        KeyEntry {
            number,
            correct_choice,
            points: 2,
            category: Category::Topic,
        }
    }

    #[test]
    fn test_new_sorts_entries() {
        let key = AnswerKey::new(vec![entry(3, 1), entry(1, 2), entry(2, 3)]).unwrap();
        let numbers: Vec<u32> = key.entries().iter().map(|e| e.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(key.max_score(), 6);
    }

    #[test]
    fn test_max_score_saturates() {
        let mut big = entry(1, 1);
        big.points = u32::MAX - 1;
        let key = AnswerKey::new(vec![big, entry(2, 2), entry(3, 3)]).unwrap();
        assert_eq!(key.max_score(), u32::MAX);
    }

    #[test]
    fn test_new_rejects_duplicates_and_bad_choices() {
        assert_eq!(
            AnswerKey::new(vec![entry(1, 1), entry(2, 2), entry(1, 3)]),
            Err(KeyError::DuplicateQuestion(1))
        );
        assert_eq!(
            AnswerKey::new(vec![entry(1, 1), entry(2, 6)]),
            Err(KeyError::InvalidChoice { number: 2, choice: 6 })
        );
        assert_eq!(
            AnswerKey::new(vec![entry(1, 0)]),
            Err(KeyError::InvalidChoice { number: 1, choice: 0 })
        );
    }

    #[test]
    fn test_standard_key_layout() {
        let key = AnswerKey::standard(&[1; STANDARD_QUESTIONS]).unwrap();

        assert_eq!(key.len(), 45);
        assert_eq!(key.max_score(), 90);
        let category = |n: usize| key.entries()[n - 1].category;
        assert_eq!(category(1), Category::Listening);
        assert_eq!(category(17), Category::Listening);
        assert_eq!(category(18), Category::Purpose);
        assert_eq!(category(21), Category::Meaning);
        assert_eq!(category(24), Category::Topic);
        assert_eq!(category(28), Category::Data);
        assert_eq!(category(29), Category::Grammar);
        assert_eq!(category(30), Category::Vocab);
        assert_eq!(category(34), Category::Blank);
        assert_eq!(category(35), Category::Flow);
        assert_eq!(category(37), Category::Order);
        assert_eq!(category(39), Category::Insert);
        assert_eq!(category(40), Category::Summary);
        assert_eq!(category(45), Category::Long);
    }

    #[test]
    fn test_standard_key_needs_every_question() {
        assert_eq!(
            AnswerKey::standard(&[1; 44]),
            Err(KeyError::WrongLength { expected: 45, actual: 44 })
        );
    }

    #[test]
    fn test_buckets() {
        assert_eq!(Category::Listening.bucket(), ReportBucket::Listening);
        assert_eq!(Category::Meaning.bucket(), ReportBucket::Vocab);
        assert_eq!(Category::Vocab.bucket(), ReportBucket::Vocab);
        assert_eq!(Category::Grammar.bucket(), ReportBucket::Grammar);
        assert_eq!(Category::Blank.bucket(), ReportBucket::Reading);
        assert_eq!(Category::Purpose.bucket(), ReportBucket::Reading);
    }

    #[test]
    fn test_parse_toml_key_with_defaults() {
        let content = r#"
[[questions]]
number = 2
correct_choice = 4
category = "VOCAB"

[[questions]]
number = 1
correct_choice = 3
points = 3
category = "LISTENING"

[[questions]]
number = 3
correct_choice = 5
"#;
        let key: AnswerKey = toml::from_str(content).unwrap();

        assert_eq!(
            key.entries(),
            &[
                KeyEntry {
                    number: 1,
                    correct_choice: 3,
                    points: 3,
                    category: Category::Listening
                },
                KeyEntry {
                    number: 2,
                    correct_choice: 4,
                    points: 2,
                    category: Category::Vocab
                },
                KeyEntry {
                    number: 3,
                    correct_choice: 5,
                    points: 2,
                    category: Category::Topic
                },
            ]
        );
    }

    #[test]
    fn test_parse_rejects_invalid_key() {
        let content = r#"
[[questions]]
number = 1
correct_choice = 9
"#;
        assert!(toml::from_str::<AnswerKey>(content).is_err());
    }

    #[test]
    fn test_save_and_load_answer_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("key.toml");
        let key = AnswerKey::standard(&[3; STANDARD_QUESTIONS]).unwrap();

        save_answer_key(&key, &path).unwrap();
        let loaded = load_answer_key(&path).unwrap();

        assert_eq!(loaded, key);
    }

    #[test]
    fn test_load_answer_key_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_answer_key(&dir.path().join("missing.toml")).is_err());
    }
}
