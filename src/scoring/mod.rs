//! Scoring
//!
//! Pairs a decoded answer vector with an answer key. Scoring never fails: answers and
//! key are compared up to the shorter of the two and any difference in length is
//! reported on the result.

pub mod key;

pub use key::{load_answer_key, save_answer_key, AnswerKey, Category, KeyEntry, ReportBucket};

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Minimum total for grades 1 through 8; anything lower is grade 9
pub const GRADE_CUTOFFS: [u32; 8] = [90, 80, 70, 60, 50, 40, 30, 20];

/// Grade (1-9) for a total score
pub fn grade_for(total: u32) -> u8 {
    GRADE_CUTOFFS
        .iter()
        .position(|&cutoff| total >= cutoff)
        .map_or(9, |i| i as u8 + 1)
}

/// Outcome of scoring one answer vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub total_score: u32,
    /// Sum of the points of every key question
    pub max_score: u32,
    pub grade: u8,
    /// Wrong answers per question type; types with none are absent
    pub wrong_by_category: BTreeMap<Category, u32>,
    /// Wrong answers per report bucket; every bucket is present
    pub wrong_by_bucket: BTreeMap<ReportBucket, u32>,
    pub wrong_questions: Vec<u32>,
    /// Question number to chosen answer, for every graded question
    pub answer_map: BTreeMap<u32, u8>,
    /// Questions actually compared
    pub graded_questions: usize,
    /// Answer count and key length differ
    pub length_mismatch: bool,
}

/// Score answers against a key, pairing them in order
pub fn score(answers: &[u8], key: &AnswerKey) -> ScoreResult {
    let entries = key.entries();
    let graded = answers.len().min(entries.len());
    let length_mismatch = answers.len() != entries.len();
    if length_mismatch {
        warn!(
            "Answer count {} does not match key length {}, grading first {}",
            answers.len(),
            entries.len(),
            graded
        );
    }

    let mut total_score: u32 = 0;
    let mut wrong_by_category: BTreeMap<Category, u32> = BTreeMap::new();
    let mut wrong_by_bucket: BTreeMap<ReportBucket, u32> =
        ReportBucket::ALL.iter().map(|&bucket| (bucket, 0)).collect();
    let mut wrong_questions = Vec::new();
    let mut answer_map = BTreeMap::new();

    for (&answer, entry) in answers.iter().zip(entries) {
        answer_map.insert(entry.number, answer);
        if answer == entry.correct_choice {
            total_score = total_score.saturating_add(entry.points);
        } else {
            *wrong_by_category.entry(entry.category).or_insert(0) += 1;
            *wrong_by_bucket.entry(entry.category.bucket()).or_insert(0) += 1;
            wrong_questions.push(entry.number);
        }
    }

    let grade = grade_for(total_score);
    debug!(
        "Scored {} questions: {}/{} (grade {}), {} wrong",
        graded,
        total_score,
        key.max_score(),
        grade,
        wrong_questions.len()
    );

    ScoreResult {
        total_score,
        max_score: key.max_score(),
        grade,
        wrong_by_category,
        wrong_by_bucket,
        wrong_questions,
        answer_map,
        graded_questions: graded,
        length_mismatch,
    }
}
