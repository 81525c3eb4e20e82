use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selected option per question index.
///
/// Entries are inserted or overwritten while a session is open and never removed.
/// Range checks against the question list happen in `ExamSession`, which owns the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMap(BTreeMap<usize, usize>);

impl AnswerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `option_index` for `question_index`, returning the previous selection.
    pub fn select(&mut self, question_index: usize, option_index: usize) -> Option<usize> {
        self.0.insert(question_index, option_index)
    }

    #[must_use]
    pub fn get(&self, question_index: usize) -> Option<usize> {
        self.0.get(&question_index).copied()
    }

    #[must_use]
    pub fn is_answered(&self, question_index: usize) -> bool {
        self.0.contains_key(&question_index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of indices in `0..total` that have a selection.
    #[must_use]
    pub fn answered_count(&self, total: usize) -> usize {
        self.0.range(..total).count()
    }

    /// Indices in `0..total` without a selection, ascending.
    #[must_use]
    pub fn unanswered(&self, total: usize) -> Vec<usize> {
        (0..total).filter(|&i| !self.is_answered(i)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(usize, usize)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
