use serde::{Deserialize, Serialize};

use crate::model::{AnswerMap, Question, QuestionId};

/// Upper bound of the percentage scale.
pub const PERCENT_SCALE: u32 = 100;

/// Upper bound of the normalized score, matching the external proficiency-test grading scale.
pub const SCORE_SCALE: u32 = 180;

//
// ─── BREAKDOWN ─────────────────────────────────────────────────────────────────
//

/// How a single question was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: QuestionId,
    pub selected: Option<usize>,
    pub correct_index: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// Output of [`score`].
///
/// `correct + incorrect == total` always holds; unanswered questions count as incorrect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub percentage: u32,
    pub score: u32,
    pub reviews: Vec<QuestionReview>,
}

//
// ─── SCORER ────────────────────────────────────────────────────────────────────
//

/// Scores `answers` against `questions`.
///
/// Pure: the same inputs always produce the same breakdown.
#[must_use]
pub fn score(questions: &[Question], answers: &AnswerMap) -> ScoreBreakdown {
    let reviews: Vec<QuestionReview> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let selected = answers.get(index);
            QuestionReview {
                question_id: question.id(),
                selected,
                correct_index: question.correct_index(),
                is_correct: selected.is_some_and(|s| question.is_correct(s)),
                explanation: question.explanation().map(str::to_owned),
            }
        })
        .collect();

    let total = u32::try_from(reviews.len()).unwrap_or(u32::MAX);
    let correct = u32::try_from(reviews.iter().filter(|r| r.is_correct).count()).unwrap_or(total);

    ScoreBreakdown {
        total,
        correct,
        incorrect: total - correct,
        percentage: percentage(correct, total),
        score: normalized_score(correct, total),
        reviews,
    }
}

/// `round(100 * correct / total)`, or 0 when there are no questions.
#[must_use]
pub fn percentage(correct: u32, total: u32) -> u32 {
    scaled_round(correct, total, PERCENT_SCALE)
}

/// `round(180 * correct / total)`, or 0 when there are no questions.
#[must_use]
pub fn normalized_score(correct: u32, total: u32) -> u32 {
    scaled_round(correct, total, SCORE_SCALE)
}

/// Round-half-up of `scale * part / total` in integer arithmetic.
fn scaled_round(part: u32, total: u32, scale: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let numerator = 2 * u64::from(part) * u64::from(scale) + u64::from(total);
    let rounded = numerator / (2 * u64::from(total));
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;

    fn questions(n: u64) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    QuestionId::new(i + 1),
                    format!("Q{i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    usize::try_from(i % 4).unwrap(),
                    Some(format!("because {i}")),
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn all_correct_scores_full_marks() {
        let qs = questions(6);
        let answers: AnswerMap = qs
            .iter()
            .enumerate()
            .map(|(i, q)| (i, q.correct_index()))
            .collect();

        let b = score(&qs, &answers);
        assert_eq!((b.correct, b.incorrect, b.percentage, b.score), (6, 0, 100, 180));
    }

    #[test]
    fn nothing_answered_scores_zero() {
        let b = score(&questions(6), &AnswerMap::new());
        assert_eq!((b.correct, b.incorrect, b.percentage, b.score), (0, 6, 0, 0));
        assert!(b.reviews.iter().all(|r| r.selected.is_none() && !r.is_correct));
    }

    #[test]
    fn half_right_half_wrong() {
        let qs = questions(6);
        let answers: AnswerMap = qs
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let pick = if i < 3 {
                    q.correct_index()
                } else {
                    (q.correct_index() + 1) % 4
                };
                (i, pick)
            })
            .collect();

        let b = score(&qs, &answers);
        assert_eq!((b.correct, b.incorrect, b.percentage, b.score), (3, 3, 50, 90));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(normalized_score(1, 7), 26);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn counts_always_add_up() {
        for total in 1..=12_u64 {
            let qs = questions(total);
            for answered in 0..=total {
                let answers: AnswerMap = (0..usize::try_from(answered).unwrap())
                    .map(|i| (i, i % 4))
                    .collect();
                let b = score(&qs, &answers);
                assert_eq!(b.correct + b.incorrect, b.total);
                let expected = (100.0 * f64::from(b.correct) / f64::from(b.total)).round();
                assert_eq!(f64::from(b.percentage), expected);
            }
        }
    }

    #[test]
    fn scoring_is_idempotent() {
        let qs = questions(5);
        let answers: AnswerMap = [(0, 0), (1, 3), (4, 0)].into_iter().collect();
        assert_eq!(score(&qs, &answers), score(&qs, &answers));
    }
}
