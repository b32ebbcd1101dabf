//! End-to-end pipeline tests over the in-memory store with scripted
//! model backends: ingestion, the full EXAM authoring lifecycle,
//! participation and scoring, and the PRACTICE shortcut.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use examkit::config::Config;
use examkit::embedding::Embedder;
use examkit::error::{Error, Result};
use examkit::ingest::ingest_material;
use examkit::llm::LlmClient;
use examkit::models::{NewSession, QuestionStatus, SessionStatus, SessionType};
use examkit::scoring;
use examkit::sessions;
use examkit::store::memory::InMemoryStore;
use examkit::store::Store;

/// Deterministic embedder: a short hash of the text, padded to 4 dims.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = [0.0f32; 4];
                for (i, b) in t.bytes().enumerate() {
                    v[i % 4] += b as f32 / 255.0;
                }
                v.to_vec()
            })
            .collect())
    }
}

/// Replays scripted generation outcomes in order; exhausted scripts fail.
struct ScriptedLlm {
    outputs: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedLlm {
    fn new(outputs: Vec<Result<String>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
        }
    }

    fn always_failing() -> Self {
        Self::new(Vec::new())
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
            .unwrap_or_else(|| Err(Error::Provider("script exhausted".into())))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.llm.base_delay_ms = 1;
    config
}

fn material_text() -> String {
    let mut text = String::from("Chapter 1. Transactions. ");
    for i in 0..80 {
        text.push_str(&format!(
            "Fact {i}: isolation levels trade consistency for concurrency. "
        ));
    }
    text
}

fn questions_json(count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"question":"Question {i} about isolation?","keywords":"isolation","difficulty":"MEDIUM"}}"#
            )
        })
        .collect();
    format!(r#"{{"questions":[{}]}}"#, items.join(","))
}

fn answers_json(count: usize) -> String {
    let items: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"question_index":{i},"reference_answer":"Reference {i}."}}"#))
        .collect();
    format!(r#"{{"answers":[{}]}}"#, items.join(","))
}

const SCRIPT_JSON: &str =
    r#"{"opening_script":"Welcome to the exam.","closing_script":"Thank you for participating."}"#;

fn evaluation_json(score: f64) -> String {
    format!(
        r#"{{"scores":{{"correctness":{score}}},"overall_score":{score},"feedback":"evaluated"}}"#
    )
}

async fn seeded_material(store: &InMemoryStore, config: &Config) -> i64 {
    ingest_material(
        store,
        &HashEmbedder,
        config,
        "db notes",
        1,
        false,
        None,
        &material_text(),
    )
    .await
    .unwrap()
    .id
}

fn practice_session(material_id: i64) -> NewSession {
    NewSession {
        session_name: "drill".into(),
        session_type: SessionType::Practice,
        course_name: None,
        created_by: 1,
        material_id: Some(material_id),
        difficulty_level: "REMEMBER".into(),
        password: None,
        start_time: None,
        end_time: None,
        time_limit_minutes: None,
    }
}

fn exam_session(material_id: i64) -> NewSession {
    NewSession {
        session_name: "final exam".into(),
        session_type: SessionType::Exam,
        course_name: Some("Databases".into()),
        created_by: 1,
        material_id: Some(material_id),
        difficulty_level: "APPLY".into(),
        password: Some("secret".into()),
        start_time: None,
        end_time: None,
        time_limit_minutes: Some(60),
    }
}

#[tokio::test]
async fn exam_lifecycle_end_to_end() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;

    let session = sessions::create_session(&store, exam_session(material_id))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Created);

    // Questions: exactly the generated batch, all drafts.
    let llm = ScriptedLlm::new(vec![Ok(questions_json(5))]);
    let questions = sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        1,
        Some(5),
    )
    .await
    .unwrap();
    assert_eq!(questions.len(), 5);
    assert!(questions.iter().all(|q| q.status == QuestionStatus::Draft));
    let session = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::ReviewingQuestions);

    // Approving is what moves the session into answer generation.
    let approved_ids: Vec<i64> = questions.iter().take(3).map(|q| q.id).collect();
    sessions::approve_questions(&store, session.id, 1, &approved_ids)
        .await
        .unwrap();
    let session = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::GeneratingAnswers);

    // Reference answers only for the approved batch.
    let llm = ScriptedLlm::new(vec![Ok(answers_json(3))]);
    let answered = sessions::generate_session_answers(&store, &llm, &config, session.id, 1)
        .await
        .unwrap();
    assert_eq!(answered.len(), 3);
    assert!(answered
        .iter()
        .all(|q| q.reference_answer.as_deref().is_some_and(|a| !a.is_empty())));

    // Creator touches up one generated answer before approving.
    sessions::edit_reference_answer(
        &store,
        session.id,
        1,
        approved_ids[0],
        "Reference 0, corrected.",
    )
    .await
    .unwrap();
    let edited = store.get_question(approved_ids[0]).await.unwrap().unwrap();
    assert_eq!(edited.reference_answer.as_deref(), Some("Reference 0, corrected."));

    sessions::approve_answers(&store, session.id, 1, &approved_ids)
        .await
        .unwrap();
    let session = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::GeneratingScript);

    // Script, then finalize.
    let llm = ScriptedLlm::new(vec![Ok(SCRIPT_JSON.into())]);
    let session = sessions::generate_session_script(&store, &llm, &config, session.id, 1)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::ReviewingScript);

    // Finalizing is blocked while the two unapproved drafts remain.
    let err = sessions::finalize_session(&store, session.id, 1).await.unwrap_err();
    assert!(matches!(err, Error::Precondition(_)));
    for question in &questions[3..] {
        sessions::remove_question(&store, session.id, 1, question.id)
            .await
            .unwrap();
    }
    let session = sessions::finalize_session(&store, session.id, 1).await.unwrap();
    assert_eq!(session.status, SessionStatus::Ready);

    // Joining an EXAM happens at `ready`, before the session starts.
    // Wrong password rejected, right password joins, re-join is idempotent.
    let err = sessions::join_session(&store, session.id, 2, Some("wrong"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    let participant = sessions::join_session(&store, session.id, 2, Some("secret"))
        .await
        .unwrap();
    let rejoined = sessions::join_session(&store, session.id, 2, Some("secret"))
        .await
        .unwrap();
    assert_eq!(participant.id, rejoined.id);

    let llm = ScriptedLlm::always_failing();
    let session =
        sessions::start_session(&store, &HashEmbedder, &llm, &config, session.id, 1)
            .await
            .unwrap();
    assert_eq!(session.status, SessionStatus::Active);

    // Once active, an EXAM no longer accepts joins.
    let err = sessions::join_session(&store, session.id, 3, Some("secret"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // Answer the first two questions.
    let llm = ScriptedLlm::new(vec![Ok(evaluation_json(8.0)), Ok(evaluation_json(4.0))]);
    let first = sessions::submit_answer(
        &store,
        &llm,
        &config,
        participant.id,
        approved_ids[0],
        "Isolation prevents anomalies.",
    )
    .await
    .unwrap();
    assert_eq!(first.auto_score, Some(8.0));
    sessions::submit_answer(
        &store,
        &llm,
        &config,
        participant.id,
        approved_ids[1],
        "Not sure.",
    )
    .await
    .unwrap();

    // Second submission for the same question is a conflict.
    let llm = ScriptedLlm::new(vec![Ok(evaluation_json(9.0))]);
    let err = sessions::submit_answer(
        &store,
        &llm,
        &config,
        participant.id,
        approved_ids[0],
        "Trying again.",
    )
    .await
    .unwrap_err();
    assert!(err.is_conflict());

    // Aggregate is the mean of the two auto scores.
    let participant_row = store
        .get_participant_session(participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(participant_row.score_total, Some(6.0));

    // Next question is the one still unanswered.
    let next = sessions::next_question(&store, participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, approved_ids[2]);

    // Reviewer override recomputes the aggregate.
    let answers = store.answers_for_participant(participant.id).await.unwrap();
    scoring::review_answer(&store, answers[1].id, 1, Some(10.0), Some("actually fine"))
        .await
        .unwrap();
    let participant_row = store
        .get_participant_session(participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(participant_row.score_total, Some(9.0));

    // End the session.
    let session = sessions::end_session(&store, session.id, 1).await.unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
}

#[tokio::test]
async fn generation_failure_rolls_back_to_created() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;
    let session = sessions::create_session(&store, exam_session(material_id))
        .await
        .unwrap();

    let llm = ScriptedLlm::always_failing();
    let err = sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        1,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));

    let session = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Created);
    assert!(store
        .questions_for_session(session.id, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn finalize_requires_approved_answers() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;
    let session = sessions::create_session(&store, exam_session(material_id))
        .await
        .unwrap();

    let llm = ScriptedLlm::new(vec![Ok(questions_json(2))]);
    sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        1,
        Some(2),
    )
    .await
    .unwrap();

    // Finalizing out of order is rejected by the status gate.
    let err = sessions::finalize_session(&store, session.id, 1).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn non_creator_cannot_drive_the_pipeline() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;
    let session = sessions::create_session(&store, exam_session(material_id))
        .await
        .unwrap();

    let llm = ScriptedLlm::new(vec![Ok(questions_json(2))]);
    let err = sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        99,
        None,
    )
    .await
    .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn practice_shortcut_skips_reviews_and_answers_lazily() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;

    let session = sessions::create_session(&store, practice_session(material_id))
        .await
        .unwrap();

    // Practice participants may join before any questions exist.
    let participant = sessions::join_session(&store, session.id, 5, None)
        .await
        .unwrap();

    let llm = ScriptedLlm::new(vec![Ok(questions_json(2))]);
    let questions = sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        1,
        Some(2),
    )
    .await
    .unwrap();

    // Starting from question review auto-approves the drafts.
    let llm = ScriptedLlm::always_failing();
    let session =
        sessions::start_session(&store, &HashEmbedder, &llm, &config, session.id, 1)
            .await
            .unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    let approved = store
        .questions_for_session(session.id, Some(QuestionStatus::Approved))
        .await
        .unwrap();
    assert_eq!(approved.len(), 2);

    // Submission generates the missing reference answer, then evaluates.
    let llm = ScriptedLlm::new(vec![Ok(answers_json(1)), Ok(evaluation_json(7.0))]);
    let answer = sessions::submit_answer(
        &store,
        &llm,
        &config,
        participant.id,
        questions[0].id,
        "My attempt.",
    )
    .await
    .unwrap();
    assert_eq!(answer.auto_score, Some(7.0));
    let question = store
        .get_question(questions[0].id)
        .await
        .unwrap()
        .unwrap();
    assert!(question
        .reference_answer
        .as_deref()
        .is_some_and(|a| !a.is_empty()));

    // The lazily answered question moved past `approved`, but the other
    // question is still served next.
    let next = sessions::next_question(&store, participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, questions[1].id);

    // Lazy generation failure still lets the participant submit: the
    // evaluator scores against an empty reference, here also failing,
    // which degrades to the neutral score.
    let llm = ScriptedLlm::always_failing();
    let answer = sessions::submit_answer(
        &store,
        &llm,
        &config,
        participant.id,
        questions[1].id,
        "Another attempt.",
    )
    .await
    .unwrap();
    assert_eq!(answer.auto_score, Some(5.0));

    // Completion records a total and survives feedback failure.
    let llm = ScriptedLlm::always_failing();
    let total = scoring::complete_participant(&store, &llm, &config, participant.id)
        .await
        .unwrap();
    assert_eq!(total, Some(6.0));
}

#[tokio::test]
async fn practice_start_generates_questions_when_none_exist() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;
    let session = sessions::create_session(&store, practice_session(material_id))
        .await
        .unwrap();

    let participant = sessions::join_session(&store, session.id, 5, None)
        .await
        .unwrap();

    // A failed generation leaves the session joinable at `created`.
    let llm = ScriptedLlm::always_failing();
    let err = sessions::start_session(&store, &HashEmbedder, &llm, &config, session.id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));
    let current = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(current.status, SessionStatus::Created);

    // Starting with no questions generates a batch, already approved,
    // with the reference answers left for lazy generation.
    let llm = ScriptedLlm::new(vec![Ok(questions_json(3))]);
    let session = sessions::start_session(&store, &HashEmbedder, &llm, &config, session.id, 1)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Active);

    let questions = store.questions_for_session(session.id, None).await.unwrap();
    assert_eq!(questions.len(), 3);
    assert!(questions
        .iter()
        .all(|q| q.status == QuestionStatus::Approved && q.reference_answer.is_none()));

    let next = sessions::next_question(&store, participant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id, questions[0].id);
}

#[tokio::test]
async fn failed_answer_generation_is_retried_by_reapproving() {
    let store = InMemoryStore::new();
    let config = test_config();
    let material_id = seeded_material(&store, &config).await;
    let session = sessions::create_session(&store, exam_session(material_id))
        .await
        .unwrap();

    let llm = ScriptedLlm::new(vec![Ok(questions_json(2))]);
    let questions = sessions::generate_session_questions(
        &store,
        &HashEmbedder,
        &llm,
        &config,
        session.id,
        1,
        Some(2),
    )
    .await
    .unwrap();
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();

    sessions::approve_questions(&store, session.id, 1, &ids)
        .await
        .unwrap();
    let llm = ScriptedLlm::always_failing();
    sessions::generate_session_answers(&store, &llm, &config, session.id, 1)
        .await
        .unwrap_err();
    let current = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(current.status, SessionStatus::ReviewingQuestions);

    // Re-approving the already-approved questions re-enters generation.
    sessions::approve_questions(&store, session.id, 1, &ids)
        .await
        .unwrap();
    let llm = ScriptedLlm::new(vec![Ok(answers_json(2))]);
    let answered = sessions::generate_session_answers(&store, &llm, &config, session.id, 1)
        .await
        .unwrap();
    assert_eq!(answered.len(), 2);
    let current = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(current.status, SessionStatus::ReviewingAnswers);
}
