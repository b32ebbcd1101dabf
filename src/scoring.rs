//! Answer evaluation and score aggregation.
//!
//! Automatic evaluation asks the model for six criterion scores, an
//! overall score, and feedback. Evaluation is the one generation call
//! that must not fail the caller: a participant mid-session gets a
//! neutral score and honest feedback instead of an error. Reviewer edits
//! override the automatic score and re-run the aggregate.

use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{generate_json, LlmClient};
use crate::models::ReviewLog;
use crate::prompts::{self, PromptQaPair};
use crate::store::Store;

/// Score assigned when the evaluator cannot be reached.
const NEUTRAL_SCORE: f64 = 5.0;

const NEUTRAL_FEEDBACK: &str =
    "Automatic evaluation was unavailable for this answer. A reviewer will assess it manually.";

/// Outcome of one automatic evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Overall score in [0, 10].
    pub score: f64,
    pub feedback: String,
}

/// Evaluate a submitted answer against its reference.
///
/// Never fails: retry exhaustion and malformed output degrade to a
/// neutral score so submission can complete.
pub async fn auto_evaluate(
    llm: &dyn LlmClient,
    config: &Config,
    question: &str,
    student_answer: &str,
    reference_answer: &str,
    difficulty: &str,
) -> Evaluation {
    let prompt = prompts::evaluate_answer(question, student_answer, reference_answer, difficulty);
    let response = match generate_json(llm, &prompt, &config.llm).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "automatic evaluation unavailable, scoring neutral");
            return Evaluation {
                score: NEUTRAL_SCORE,
                feedback: NEUTRAL_FEEDBACK.to_string(),
            };
        }
    };

    let score = response
        .get("overall_score")
        .and_then(|v| v.as_f64())
        .or_else(|| mean_criterion_score(&response))
        .map(clamp_score);
    let feedback = response
        .get("feedback")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string);

    match (score, feedback) {
        (Some(score), Some(feedback)) => Evaluation { score, feedback },
        (Some(score), None) => Evaluation {
            score,
            feedback: NEUTRAL_FEEDBACK.to_string(),
        },
        _ => {
            warn!("evaluation response carried no usable score, scoring neutral");
            Evaluation {
                score: NEUTRAL_SCORE,
                feedback: NEUTRAL_FEEDBACK.to_string(),
            }
        }
    }
}

/// Mean of whatever criterion scores the response did include.
fn mean_criterion_score(response: &serde_json::Value) -> Option<f64> {
    let scores = response.get("scores")?.as_object()?;
    let values: Vec<f64> = scores.values().filter_map(|v| v.as_f64()).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

/// Recompute a participant's aggregate as the mean of effective scores
/// (reviewer score when present, automatic otherwise). No scored answers
/// clears the aggregate.
pub async fn recompute_score_total(
    store: &dyn Store,
    participant_session_id: i64,
) -> Result<Option<f64>> {
    let answers = store.answers_for_participant(participant_session_id).await?;
    let scores: Vec<f64> = answers.iter().filter_map(|a| a.effective_score()).collect();
    let total = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };
    store
        .update_participant_totals(participant_session_id, total, None)
        .await?;
    Ok(total)
}

/// Apply a reviewer's score or feedback edit to one answer.
///
/// The old values are written to the review log first (best-effort), the
/// edit is applied, and the participant's aggregate is recomputed so a
/// reviewer override is immediately visible in the total.
pub async fn review_answer(
    store: &dyn Store,
    answer_id: i64,
    reviewer_id: i64,
    new_score: Option<f64>,
    new_feedback: Option<&str>,
) -> Result<()> {
    if new_score.is_none() && new_feedback.is_none() {
        return Err(Error::Precondition("review edit carries no changes".into()));
    }
    if let Some(score) = new_score {
        if !(0.0..=10.0).contains(&score) {
            return Err(Error::Precondition(format!(
                "reviewer score {score} outside [0, 10]"
            )));
        }
    }

    let answer = store
        .get_answer(answer_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("answer {answer_id}")))?;

    let log = ReviewLog {
        answer_id,
        reviewer_id,
        old_score: answer.reviewer_score.or(answer.auto_score),
        new_score,
        old_feedback: answer.reviewer_feedback.clone().or(answer.auto_feedback.clone()),
        new_feedback: new_feedback.map(str::to_string),
    };
    if let Err(err) = store.log_review(&log).await {
        warn!(answer_id, error = %err, "failed to write review log");
    }

    if let Some(score) = new_score {
        store.set_reviewer_score(answer_id, score).await?;
    }
    if let Some(feedback) = new_feedback {
        store.set_reviewer_feedback(answer_id, feedback).await?;
    }
    store
        .set_participant_review(answer.participant_session_id, reviewer_id, None)
        .await?;

    recompute_score_total(store, answer.participant_session_id).await?;
    Ok(())
}

/// Close out a participant's attempt: final aggregate plus session-level
/// feedback. Feedback generation failure falls back to a plain summary
/// rather than failing completion.
pub async fn complete_participant(
    store: &dyn Store,
    llm: &dyn LlmClient,
    config: &Config,
    participant_session_id: i64,
) -> Result<Option<f64>> {
    let answers = store.answers_for_participant(participant_session_id).await?;
    let total = recompute_score_total(store, participant_session_id).await?;

    let mut pairs = Vec::with_capacity(answers.len());
    let mut questions = Vec::with_capacity(answers.len());
    for answer in &answers {
        let question = store
            .get_question(answer.question_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("question {}", answer.question_id)))?;
        questions.push(question);
    }
    for (answer, question) in answers.iter().zip(&questions) {
        pairs.push(PromptQaPair {
            question: &question.content,
            answer: &answer.answer_text,
            score: answer.effective_score().unwrap_or(0.0),
            feedback: answer
                .reviewer_feedback
                .as_deref()
                .or(answer.auto_feedback.as_deref())
                .unwrap_or(""),
        });
    }

    let feedback = if pairs.is_empty() {
        "No answers were submitted in this session.".to_string()
    } else {
        let prompt = prompts::overall_feedback(&pairs, total.unwrap_or(0.0));
        match generate_json(llm, &prompt, &config.llm).await {
            Ok(response) => response
                .get("overall_feedback")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_feedback(total)),
            Err(err) => {
                warn!(participant_session_id, error = %err, "overall feedback generation failed");
                fallback_feedback(total)
            }
        }
    };

    store
        .update_participant_totals(participant_session_id, total, Some(&feedback))
        .await?;
    Ok(total)
}

fn fallback_feedback(total: Option<f64>) -> String {
    match total {
        Some(total) => format!(
            "Session complete. Average score: {total:.1}/10. Detailed feedback was unavailable."
        ),
        None => "Session complete. No scored answers were recorded.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::LlmClient;
    use crate::models::{NewAnswer, NewSession, SessionType};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedLlm {
        outputs: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedLlm {
        fn new(outputs: Vec<Result<String>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Provider("model down".into())))
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.llm.base_delay_ms = 1;
        config
    }

    async fn participant_with_scores(
        store: &InMemoryStore,
        scores: &[f64],
    ) -> i64 {
        let session = store
            .create_session(&NewSession {
                session_name: "s".into(),
                session_type: SessionType::Practice,
                course_name: None,
                created_by: 1,
                material_id: None,
                difficulty_level: "UNDERSTAND".into(),
                password: None,
                start_time: None,
                end_time: None,
                time_limit_minutes: None,
            })
            .await
            .unwrap();
        let participant = store
            .insert_participant_session(session.id, 2)
            .await
            .unwrap();
        let new_questions: Vec<crate::models::NewQuestion> = scores
            .iter()
            .enumerate()
            .map(|(i, _)| crate::models::NewQuestion {
                session_id: session.id,
                content: format!("q{i}"),
                keywords: String::new(),
                difficulty: "MEDIUM".into(),
                status: crate::models::QuestionStatus::Approved,
            })
            .collect();
        let question_ids = store.insert_questions(&new_questions).await.unwrap();
        for (question_id, score) in question_ids.iter().zip(scores) {
            store
                .insert_answer(&NewAnswer {
                    participant_session_id: participant.id,
                    question_id: *question_id,
                    answer_text: "a".into(),
                    auto_score: Some(*score),
                    auto_feedback: Some("fb".into()),
                })
                .await
                .unwrap();
        }
        participant.id
    }

    #[tokio::test]
    async fn evaluation_parses_overall_score() {
        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"scores":{"correctness":8.0},"overall_score":7.5,"feedback":"solid"}"#.into(),
        )]);
        let eval = auto_evaluate(&llm, &fast_config(), "q", "a", "ref", "MEDIUM").await;
        assert_eq!(eval.score, 7.5);
        assert_eq!(eval.feedback, "solid");
    }

    #[tokio::test]
    async fn evaluation_clamps_out_of_range_scores() {
        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"overall_score":14.0,"feedback":"generous"}"#.into(),
        )]);
        let eval = auto_evaluate(&llm, &fast_config(), "q", "a", "ref", "EASY").await;
        assert_eq!(eval.score, 10.0);
    }

    #[tokio::test]
    async fn evaluation_falls_back_to_criterion_mean() {
        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"scores":{"correctness":6.0,"coverage":8.0},"feedback":"ok"}"#.into(),
        )]);
        let eval = auto_evaluate(&llm, &fast_config(), "q", "a", "ref", "EASY").await;
        assert_eq!(eval.score, 7.0);
    }

    #[tokio::test]
    async fn unreachable_evaluator_scores_neutral() {
        let llm = ScriptedLlm::new(vec![]);
        let eval = auto_evaluate(&llm, &fast_config(), "q", "a", "ref", "HARD").await;
        assert_eq!(eval.score, NEUTRAL_SCORE);
        assert_eq!(eval.feedback, NEUTRAL_FEEDBACK);
    }

    #[tokio::test]
    async fn aggregate_is_mean_of_effective_scores() {
        let store = InMemoryStore::new();
        let participant_id = participant_with_scores(&store, &[4.0, 8.0]).await;
        let total = recompute_score_total(&store, participant_id).await.unwrap();
        assert_eq!(total, Some(6.0));
    }

    #[tokio::test]
    async fn reviewer_edit_updates_aggregate() {
        let store = InMemoryStore::new();
        let participant_id = participant_with_scores(&store, &[4.0, 8.0]).await;
        let answers = store.answers_for_participant(participant_id).await.unwrap();

        review_answer(&store, answers[0].id, 9, Some(10.0), Some("reviewed")).await.unwrap();

        let participant = store
            .get_participant_session(participant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participant.score_total, Some(9.0));
        assert_eq!(participant.reviewed_by, Some(9));
        assert!(participant.reviewed_at.is_some());
        let edited = store.get_answer(answers[0].id).await.unwrap().unwrap();
        assert_eq!(edited.reviewer_score, Some(10.0));
        assert_eq!(edited.effective_score(), Some(10.0));
    }

    #[tokio::test]
    async fn out_of_range_reviewer_score_rejected() {
        let store = InMemoryStore::new();
        let participant_id = participant_with_scores(&store, &[5.0]).await;
        let answers = store.answers_for_participant(participant_id).await.unwrap();
        let err = review_answer(&store, answers[0].id, 9, Some(11.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test]
    async fn completion_survives_feedback_failure() {
        let store = InMemoryStore::new();
        let participant_id = participant_with_scores(&store, &[6.0]).await;
        // Model never answers; completion still records the total.
        let llm = ScriptedLlm::new(vec![]);
        let total = complete_participant(&store, &llm, &fast_config(), participant_id)
            .await
            .unwrap();
        assert_eq!(total, Some(6.0));
        let participant = store
            .get_participant_session(participant_id)
            .await
            .unwrap()
            .unwrap();
        assert!(participant.overall_feedback.is_some());
    }
}
