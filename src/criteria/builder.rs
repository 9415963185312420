//! Criteria tree construction
//!
//! Parses a validated [`CriteriaConfig`] into a weight-normalized
//! [`CriteriaTree`]. Parsing recurses depth-first; after all children of a
//! sibling group are parsed, weight normalization runs exactly once for
//! that group and is never re-applied to ancestors.
//!
//! Normalization: for a sibling list with total weight `W`, `W != 0` and
//! `W != 100`, each weight becomes `round(weight * 100 / W)`. The rounding
//! is per-element, so the normalized sum may drift from 100 by up to
//! `n - 1` units. The drift is an accepted property of the format; the
//! aggregator divides by the actual sum, so it never deflates scores.

use tracing::debug;

use crate::config::{CategoryConfig, CriteriaConfig, SubjectConfig, SubjectsConfig, TestConfig};
use crate::criteria::{Category, CategoryKind, CriteriaTree, Subject, Test, TestCall};
use crate::error::{Result, RubricError};

/// Default category max score when config omits `weight`
const DEFAULT_MAX_SCORE: u32 = 100;

/// Build the criteria tree for a grading run.
///
/// Absent category keys leave that category unset; it is excluded from
/// score aggregation entirely.
pub fn parse_tree(config: &CriteriaConfig) -> Result<CriteriaTree> {
    let mut tree = CriteriaTree::default();

    for kind in CategoryKind::ALL {
        let category_config = match kind {
            CategoryKind::Base => config.base.as_ref(),
            CategoryKind::Bonus => config.bonus.as_ref(),
            CategoryKind::Penalty => config.penalty.as_ref(),
        };
        if let Some(category_config) = category_config {
            let category = parse_category(kind, category_config)?;
            debug!(category = %kind, max_score = category.max_score, "parsed category");
            match kind {
                CategoryKind::Base => tree.base = Some(category),
                CategoryKind::Bonus => tree.bonus = Some(category),
                CategoryKind::Penalty => tree.penalty = Some(category),
            }
        }
    }

    Ok(tree)
}

fn parse_category(kind: CategoryKind, config: &CategoryConfig) -> Result<Category> {
    let subjects = match &config.subjects {
        Some(subjects_config) => parse_subjects(subjects_config)?,
        None => Vec::new(),
    };
    let tests = match &config.tests {
        Some(tests_config) => parse_tests(tests_config),
        None => Vec::new(),
    };

    if subjects.is_empty() && tests.is_empty() {
        return Err(RubricError::EmptyCategory {
            category: kind.to_string(),
        });
    }
    check_subjects_weight(kind.as_str(), &subjects, &tests, config.subjects_weight)?;

    Ok(Category {
        kind,
        max_score: config.weight.unwrap_or(DEFAULT_MAX_SCORE),
        subjects,
        tests,
        subjects_weight: config.subjects_weight,
    })
}

/// Parse one sibling group, then normalize its weights exactly once.
fn parse_subjects(config: &SubjectsConfig) -> Result<Vec<Subject>> {
    let mut subjects = Vec::new();
    for (index, (map_name, subject_config)) in config.entries().into_iter().enumerate() {
        let name = map_name
            .or(subject_config.name.as_deref())
            .ok_or(RubricError::MissingSubjectName { index })?;
        subjects.push(parse_subject(name, subject_config)?);
    }
    normalize_weights(&mut subjects);
    Ok(subjects)
}

fn parse_subject(name: &str, config: &SubjectConfig) -> Result<Subject> {
    let subjects = match &config.subjects {
        Some(subjects_config) => parse_subjects(subjects_config)?,
        None => Vec::new(),
    };
    let tests = match &config.tests {
        Some(tests_config) => parse_tests(tests_config),
        None => Vec::new(),
    };

    if subjects.is_empty() && tests.is_empty() {
        return Err(RubricError::EmptySubject {
            subject: name.to_string(),
        });
    }
    check_subjects_weight(name, &subjects, &tests, config.subjects_weight)?;

    Ok(Subject {
        name: name.to_string(),
        weight: config.weight.unwrap_or(0),
        subjects,
        tests,
        subjects_weight: config.subjects_weight,
    })
}

fn check_subjects_weight(
    name: &str,
    subjects: &[Subject],
    tests: &[Test],
    subjects_weight: Option<u32>,
) -> Result<()> {
    if let Some(value) = subjects_weight {
        // Exclusive bounds: 0 would zero out the subjects share, 100 the
        // tests share, both of which contradict declaring both kinds
        if value == 0 || value >= 100 {
            return Err(RubricError::SubjectsWeightOutOfRange {
                name: name.to_string(),
                value,
            });
        }
    } else if !subjects.is_empty() && !tests.is_empty() {
        return Err(RubricError::MissingSubjectsWeight {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn parse_tests(config: &[TestConfig]) -> Vec<Test> {
    config.iter().map(parse_test).collect()
}

/// A bare name implies exactly one empty-argument call; a descriptor turns
/// every call-list entry into one `TestCall`, preserving input order.
fn parse_test(config: &TestConfig) -> Test {
    match config {
        TestConfig::Name(name) => Test::new(name.clone(), None, vec![TestCall::default()]),
        TestConfig::Detailed(descriptor) => {
            let calls = match &descriptor.calls {
                Some(calls) => calls
                    .iter()
                    .map(|args| TestCall::new(args.clone()))
                    .collect(),
                None => vec![TestCall::default()],
            };
            Test::new(descriptor.name.clone(), descriptor.file.clone(), calls)
        }
    }
}

/// Per-element independent rounding; sums of 0 and 100 are left untouched.
fn normalize_weights(subjects: &mut [Subject]) {
    let total: u32 = subjects.iter().map(|s| s.weight).sum();
    if total == 0 || total == 100 {
        return;
    }
    for subject in subjects.iter_mut() {
        subject.weight = ((subject.weight as f64) * 100.0 / (total as f64)).round() as u32;
    }
}
