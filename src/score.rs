//! Score aggregation
//!
//! Merges canonical test records into the criteria tree, then walks it
//! bottom-up: a test contributes the fraction of its calls that passed
//! (count-based checks go through the quantitative policy instead), a
//! subject combines child subjects and direct tests by `subjects_weight`,
//! a category scales its composite by `max_score`, and the final score is
//! `base + bonus - penalty` clamped to [0,100].

use serde::Serialize;
use tracing::debug;

use crate::criteria::{CategoryKind, CriteriaTree, Subject, Test};
use crate::error::{Result, RubricError};
use crate::report::{CategoryResults, TestStatus};

/// Maps an observed count against an expected threshold to a score in
/// [0,1]. The exact mapping is a policy decision; supply your own to
/// [`ScoreAggregator::with_policy`] to change it.
pub trait QuantitativePolicy {
    fn score(&self, actual: u64, expected: u64) -> f64;
}

/// Default policy: fraction of the expected count that was observed,
/// capped at full credit
#[derive(Debug, Default)]
pub struct CappedRatio;

impl QuantitativePolicy for CappedRatio {
    fn score(&self, actual: u64, expected: u64) -> f64 {
        if expected == 0 {
            return 1.0;
        }
        (actual as f64 / expected as f64).min(1.0)
    }
}

/// Final score plus the populated tree snapshot that produced it
#[derive(Debug, Serialize)]
pub struct GradeStepResult {
    pub final_score: f64,
    pub result_tree: CriteriaTree,
}

/// Bottom-up scorer over a populated criteria tree
pub struct ScoreAggregator {
    policy: Box<dyn QuantitativePolicy>,
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        ScoreAggregator::new()
    }
}

impl ScoreAggregator {
    pub fn new() -> Self {
        ScoreAggregator {
            policy: Box::new(CappedRatio),
        }
    }

    pub fn with_policy(policy: Box<dyn QuantitativePolicy>) -> Self {
        ScoreAggregator { policy }
    }

    /// Attach normalized records to the tree's test nodes by test name,
    /// preserving report order. Tree structure is untouched.
    pub fn merge_results(&self, tree: &mut CriteriaTree, results: &CategoryResults) {
        for kind in CategoryKind::ALL {
            if let Some(category) = tree.get_mut(kind) {
                let records = results.get(kind);
                for test in category.all_tests_mut() {
                    test.results = records
                        .iter()
                        .filter(|record| record.test == test.name)
                        .cloned()
                        .collect();
                }
            }
        }
    }

    /// Consume the populated tree and produce the final score.
    pub fn grade(&self, tree: CriteriaTree) -> Result<GradeStepResult> {
        let mut final_score = 0.0;
        for kind in CategoryKind::ALL {
            if let Some(category) = tree.get(kind) {
                let composite = self.score_group(
                    category.kind.as_str(),
                    &category.subjects,
                    &category.tests,
                    category.subjects_weight,
                )?;
                let points = composite / 100.0 * f64::from(category.max_score);
                debug!(category = %kind, composite, points, "scored category");
                match kind {
                    CategoryKind::Base | CategoryKind::Bonus => final_score += points,
                    CategoryKind::Penalty => final_score -= points,
                }
            }
        }

        Ok(GradeStepResult {
            final_score: final_score.clamp(0.0, 100.0),
            result_tree: tree,
        })
    }

    fn score_subject(&self, subject: &Subject) -> Result<f64> {
        self.score_group(
            &subject.name,
            &subject.subjects,
            &subject.tests,
            subject.subjects_weight,
        )
    }

    /// Score in [0,100] for one subjects/tests group. With both kinds
    /// present the shares split by `subjects_weight`; with one kind that
    /// kind takes the whole group.
    fn score_group(
        &self,
        name: &str,
        subjects: &[Subject],
        tests: &[Test],
        subjects_weight: Option<u32>,
    ) -> Result<f64> {
        match (subjects.is_empty(), tests.is_empty()) {
            (true, true) => Ok(0.0),
            (false, true) => self.score_subjects(subjects),
            (true, false) => Ok(self.score_tests(tests)),
            (false, false) => {
                let weight = subjects_weight.ok_or_else(|| RubricError::MissingSubjectsWeight {
                    name: name.to_string(),
                })?;
                let share = f64::from(weight) / 100.0;
                let subjects_part = self.score_subjects(subjects)?;
                let tests_part = self.score_tests(tests);
                Ok(subjects_part * share + tests_part * (1.0 - share))
            }
        }
    }

    /// Weighted average over the actual sibling weight sum, so normalized
    /// weights that drift below 100 never deflate the score. All-zero
    /// weights share equally.
    fn score_subjects(&self, subjects: &[Subject]) -> Result<f64> {
        let total: u32 = subjects.iter().map(|s| s.weight).sum();
        if total == 0 {
            let mut sum = 0.0;
            for subject in subjects {
                sum += self.score_subject(subject)?;
            }
            return Ok(sum / subjects.len() as f64);
        }

        let mut weighted = 0.0;
        for subject in subjects {
            weighted += self.score_subject(subject)? * f64::from(subject.weight);
        }
        Ok(weighted / f64::from(total))
    }

    fn score_tests(&self, tests: &[Test]) -> f64 {
        if tests.is_empty() {
            return 0.0;
        }
        let sum: f64 = tests.iter().map(|test| self.score_test(test)).sum();
        sum / tests.len() as f64 * 100.0
    }

    /// Score in [0,1]: the mean over calls, pairing records to calls in
    /// order. A call without a record scores zero; skipped counts as not
    /// passed. Count-based calls go through the quantitative policy.
    fn score_test(&self, test: &Test) -> f64 {
        if test.calls.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for (index, call) in test.calls.iter().enumerate() {
            let Some(record) = test.results.get(index) else {
                continue;
            };
            sum += match (record.actual_count, call.expected_count()) {
                (Some(actual), Some(expected)) => self.policy.score(actual, expected),
                _ => {
                    if record.status == TestStatus::Passed {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
        }
        sum / test.calls.len() as f64
    }
}
