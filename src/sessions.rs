//! Session lifecycle operations.
//!
//! The authoring pipeline walks a session through its review stages:
//! question generation, question review, reference-answer generation and
//! review, script generation and review, then `ready`. Approving a
//! review stage is the trigger that moves the session into the next
//! `generating_*` stage. Every hop is validated against the transition
//! table in [`SessionStatus`](crate::models::SessionStatus); a generation
//! failure rolls the session back to the review stage it left so the
//! creator can re-approve and retry.
//!
//! EXAM sessions take the full pipeline. PRACTICE and INTERVIEW sessions
//! skip the review stages on first start: questions are generated when
//! none exist yet, drafts are auto-approved, and reference answers are
//! generated lazily at submission time.

use tracing::{info, warn};

use crate::bloom::BLOOM_LEVELS;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::generator;
use crate::llm::{generate_json, LlmClient};
use crate::models::{
    AiRequestLog, Answer, NewAnswer, NewQuestion, NewSession, ParticipantSession, Question,
    QuestionStatus, Session, SessionStatus, SessionType,
};
use crate::prompts;
use crate::scoring;
use crate::store::Store;

/// Validate and persist a hop, returning the session at its new status.
async fn advance(store: &dyn Store, session: &Session, to: SessionStatus) -> Result<Session> {
    let next = session.status.advance_to(to)?;
    store.update_session_status(session.id, next).await?;
    let mut updated = session.clone();
    updated.status = next;
    Ok(updated)
}

/// Undo a `generating_*` hop after a failed generation call. Best-effort:
/// a rollback failure is logged, the original error still wins.
async fn roll_back(store: &dyn Store, session_id: i64, to: SessionStatus) {
    if let Err(err) = store.update_session_status(session_id, to).await {
        warn!(session_id, error = %err, "failed to roll back session status");
    }
}

async fn require_session(store: &dyn Store, session_id: i64) -> Result<Session> {
    store
        .get_session(session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
}

fn require_creator(session: &Session, actor_id: i64) -> Result<()> {
    if session.created_by != actor_id {
        return Err(Error::Conflict(format!(
            "user {actor_id} does not own session {}",
            session.id
        )));
    }
    Ok(())
}

fn require_status(session: &Session, expected: SessionStatus) -> Result<()> {
    if session.status != expected {
        return Err(Error::Conflict(format!(
            "session {} is {}, expected {}",
            session.id,
            session.status.as_str(),
            expected.as_str()
        )));
    }
    Ok(())
}

/// Create a session in `created` status.
///
/// The difficulty must be a Bloom level, an EXAM needs a join password,
/// and a referenced material must exist.
pub async fn create_session(store: &dyn Store, new: NewSession) -> Result<Session> {
    if !BLOOM_LEVELS.contains(&new.difficulty_level.as_str()) {
        return Err(Error::Precondition(format!(
            "unknown difficulty level {:?}",
            new.difficulty_level
        )));
    }
    if new.session_type == SessionType::Exam
        && new.password.as_deref().map_or(true, |p| p.is_empty())
    {
        return Err(Error::Precondition("EXAM sessions require a password".into()));
    }
    if let Some(material_id) = new.material_id {
        store
            .get_material(material_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("material {material_id}")))?;
    }
    let session = store.create_session(&new).await?;
    info!(
        session_id = session.id,
        session_type = session.session_type.as_str(),
        "created session"
    );
    Ok(session)
}

/// Generate the session's draft questions (created -> reviewing_questions).
pub async fn generate_session_questions(
    store: &dyn Store,
    embedder: &dyn Embedder,
    llm: &dyn LlmClient,
    config: &Config,
    session_id: i64,
    actor_id: i64,
    num_questions: Option<usize>,
) -> Result<Vec<Question>> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::Created)?;

    let session = advance(store, &session, SessionStatus::GeneratingQuestions).await?;
    let count = num_questions.unwrap_or(config.llm.question_batch_size);

    let generated = match generator::generate_questions(
        store,
        embedder,
        llm,
        config,
        session_id,
        session.material_id,
        session.course_name.as_deref(),
        &session.difficulty_level,
        count,
    )
    .await
    {
        Ok(generated) if !generated.is_empty() => generated,
        Ok(_) => {
            roll_back(store, session_id, SessionStatus::Created).await;
            return Err(Error::Generation {
                attempts: config.llm.max_retries,
                reason: "model returned no usable questions".into(),
            });
        }
        Err(err) => {
            roll_back(store, session_id, SessionStatus::Created).await;
            return Err(err);
        }
    };

    let ids = store.insert_questions(&generated).await?;
    advance(store, &session, SessionStatus::ReviewingQuestions).await?;

    log_ai(
        store,
        session_id,
        "generate_questions",
        &format!("difficulty={} count={count}", session.difficulty_level),
        &format!("{} questions", ids.len()),
    )
    .await;

    store.questions_by_ids(&ids).await
}

/// Approve a subset of draft questions. Approval is the trigger that
/// moves the session on to answer generation
/// (reviewing_questions -> generating_answers).
///
/// Already-approved questions may be re-approved; that is how a rolled
/// back answer generation is retried.
pub async fn approve_questions(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
    question_ids: &[i64],
) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::ReviewingQuestions)?;

    if question_ids.is_empty() {
        return Err(Error::Precondition("no questions selected for approval".into()));
    }
    let questions = store.questions_by_ids(question_ids).await?;
    if questions.len() != question_ids.len() {
        return Err(Error::NotFound("one or more questions".into()));
    }
    for question in &questions {
        if question.session_id != session_id {
            return Err(Error::Conflict(format!(
                "question {} belongs to another session",
                question.id
            )));
        }
        if !matches!(
            question.status,
            QuestionStatus::Draft | QuestionStatus::Approved
        ) {
            return Err(Error::Conflict(format!(
                "question {} is not awaiting approval",
                question.id
            )));
        }
    }
    store
        .set_question_status(question_ids, QuestionStatus::Approved)
        .await?;
    advance(store, &session, SessionStatus::GeneratingAnswers).await?;
    Ok(())
}

/// Edit a draft or approved question before the session is finalized.
pub async fn edit_question(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
    question_id: i64,
    content: Option<&str>,
    keywords: Option<&str>,
    difficulty: Option<&str>,
) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    if matches!(
        session.status,
        SessionStatus::Ready | SessionStatus::Active | SessionStatus::Ended
    ) {
        return Err(Error::Conflict(
            "questions cannot be edited after the session is finalized".into(),
        ));
    }
    if let Some(difficulty) = difficulty {
        if !crate::bloom::is_valid_difficulty(difficulty) {
            return Err(Error::Precondition(format!(
                "unknown question difficulty {difficulty:?}"
            )));
        }
    }
    let question = store
        .get_question(question_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;
    if question.session_id != session_id {
        return Err(Error::Conflict(format!(
            "question {question_id} belongs to another session"
        )));
    }
    store
        .update_question_content(question_id, content, keywords, difficulty)
        .await
}

/// Replace a generated reference answer during answer review.
pub async fn edit_reference_answer(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
    question_id: i64,
    reference_answer: &str,
) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::ReviewingAnswers)?;
    if reference_answer.trim().is_empty() {
        return Err(Error::Precondition("reference answer cannot be empty".into()));
    }
    let question = store
        .get_question(question_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;
    if question.session_id != session_id {
        return Err(Error::Conflict(format!(
            "question {question_id} belongs to another session"
        )));
    }
    if question.status != QuestionStatus::AnswersGenerated {
        return Err(Error::Conflict(format!(
            "question {question_id} has no generated answer to edit"
        )));
    }
    store
        .set_reference_answer(question_id, reference_answer, QuestionStatus::AnswersGenerated)
        .await
}

/// Remove an unwanted question before the session is finalized.
pub async fn remove_question(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
    question_id: i64,
) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    if matches!(
        session.status,
        SessionStatus::Ready | SessionStatus::Active | SessionStatus::Ended
    ) {
        return Err(Error::Conflict(
            "questions cannot be removed after the session is finalized".into(),
        ));
    }
    let question = store
        .get_question(question_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;
    if question.session_id != session_id {
        return Err(Error::Conflict(format!(
            "question {question_id} belongs to another session"
        )));
    }
    store.delete_question(question_id).await
}

/// Generate reference answers for the approved questions
/// (generating_answers -> reviewing_answers). Entered via
/// [`approve_questions`]; failure rolls back to question review.
pub async fn generate_session_answers(
    store: &dyn Store,
    llm: &dyn LlmClient,
    config: &Config,
    session_id: i64,
    actor_id: i64,
) -> Result<Vec<Question>> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::GeneratingAnswers)?;

    let approved = store
        .questions_for_session(session_id, Some(QuestionStatus::Approved))
        .await?;
    if approved.is_empty() {
        return Err(Error::Precondition("no approved questions to answer".into()));
    }

    let pairs = match generator::generate_reference_answers(
        store,
        llm,
        config,
        &approved,
        session.material_id,
        session.course_name.as_deref(),
    )
    .await
    {
        Ok(pairs) if !pairs.is_empty() => pairs,
        Ok(_) => {
            roll_back(store, session_id, SessionStatus::ReviewingQuestions).await;
            return Err(Error::Generation {
                attempts: config.llm.max_retries,
                reason: "model returned no usable reference answers".into(),
            });
        }
        Err(err) => {
            roll_back(store, session_id, SessionStatus::ReviewingQuestions).await;
            return Err(err);
        }
    };

    for (question_id, answer) in &pairs {
        store
            .set_reference_answer(*question_id, answer, QuestionStatus::AnswersGenerated)
            .await?;
    }
    advance(store, &session, SessionStatus::ReviewingAnswers).await?;

    log_ai(
        store,
        session_id,
        "generate_reference_answers",
        &format!("{} questions", approved.len()),
        &format!("{} answers", pairs.len()),
    )
    .await;

    store
        .questions_for_session(session_id, Some(QuestionStatus::AnswersGenerated))
        .await
}

/// Approve generated reference answers. Approval moves the session on to
/// script generation (reviewing_answers -> generating_script).
///
/// Already-approved answers may be re-approved; that is how a rolled
/// back script generation is retried.
pub async fn approve_answers(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
    question_ids: &[i64],
) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::ReviewingAnswers)?;

    if question_ids.is_empty() {
        return Err(Error::Precondition("no answers selected for approval".into()));
    }
    let questions = store.questions_by_ids(question_ids).await?;
    if questions.len() != question_ids.len() {
        return Err(Error::NotFound("one or more questions".into()));
    }
    for question in &questions {
        if question.session_id != session_id {
            return Err(Error::Conflict(format!(
                "question {} belongs to another session",
                question.id
            )));
        }
        if !matches!(
            question.status,
            QuestionStatus::AnswersGenerated | QuestionStatus::AnswersApproved
        ) {
            return Err(Error::Conflict(format!(
                "question {} has no generated answer to approve",
                question.id
            )));
        }
        if question
            .reference_answer
            .as_deref()
            .map_or(true, |a| a.trim().is_empty())
        {
            return Err(Error::Precondition(format!(
                "question {} has an empty reference answer",
                question.id
            )));
        }
    }
    store
        .set_question_status(question_ids, QuestionStatus::AnswersApproved)
        .await?;
    advance(store, &session, SessionStatus::GeneratingScript).await?;
    Ok(())
}

/// Generate the opening and closing scripts
/// (generating_script -> reviewing_script). Entered via
/// [`approve_answers`]; failure rolls back to answer review.
pub async fn generate_session_script(
    store: &dyn Store,
    llm: &dyn LlmClient,
    config: &Config,
    session_id: i64,
    actor_id: i64,
) -> Result<Session> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::GeneratingScript)?;

    let prompt = prompts::session_script(
        &session.session_name,
        session.course_name.as_deref(),
        Some(&session.difficulty_level),
        session.session_type.as_str(),
    );
    let response = match generate_json(llm, &prompt, &config.llm).await {
        Ok(response) => response,
        Err(err) => {
            roll_back(store, session_id, SessionStatus::ReviewingAnswers).await;
            return Err(err);
        }
    };

    let opening = response
        .get("opening_script")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    let closing = response
        .get("closing_script")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    if opening.is_empty() || closing.is_empty() {
        roll_back(store, session_id, SessionStatus::ReviewingAnswers).await;
        return Err(Error::Generation {
            attempts: config.llm.max_retries,
            reason: "script response missing opening or closing text".into(),
        });
    }

    store
        .update_session_scripts(session_id, &opening, &closing)
        .await?;
    let session = advance(store, &session, SessionStatus::ReviewingScript).await?;

    log_ai(
        store,
        session_id,
        "generate_script",
        session.session_type.as_str(),
        "opening and closing scripts",
    )
    .await;

    let mut updated = session;
    updated.opening_script = Some(opening);
    updated.closing_script = Some(closing);
    Ok(updated)
}

/// Final gate before participants may join (reviewing_script -> ready).
///
/// Every question of the session must carry an approved, non-empty
/// reference answer, and both scripts must be present. Fails with the
/// offending question id; leftover drafts have to be removed first.
pub async fn finalize_session(
    store: &dyn Store,
    session_id: i64,
    actor_id: i64,
) -> Result<Session> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::ReviewingScript)?;

    let questions = store.questions_for_session(session_id, None).await?;
    if questions.is_empty() {
        return Err(Error::Precondition("session has no questions".into()));
    }
    for question in &questions {
        if question.status != QuestionStatus::AnswersApproved
            || question
                .reference_answer
                .as_deref()
                .map_or(true, |a| a.trim().is_empty())
        {
            return Err(Error::Precondition(format!(
                "question {} lacks an approved reference answer",
                question.id
            )));
        }
    }
    if session.opening_script.as_deref().map_or(true, str::is_empty)
        || session.closing_script.as_deref().map_or(true, str::is_empty)
    {
        return Err(Error::Precondition("session scripts are missing".into()));
    }

    let session = advance(store, &session, SessionStatus::Ready).await?;
    info!(session_id, "session finalized");
    Ok(session)
}

/// Open the session for answering.
///
/// EXAM sessions start from `ready`. PRACTICE and INTERVIEW sessions may
/// start straight from `created` or question review: when no questions
/// exist yet a batch is generated and inserted already approved (the
/// reference answers are filled in lazily at submission time), drafts are
/// auto-approved, and the remaining stages are walked through in order,
/// each hop validated.
pub async fn start_session(
    store: &dyn Store,
    embedder: &dyn Embedder,
    llm: &dyn LlmClient,
    config: &Config,
    session_id: i64,
    actor_id: i64,
) -> Result<Session> {
    let mut session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;

    if session.session_type.is_lightweight() && session.status == SessionStatus::Created {
        session = advance(store, &session, SessionStatus::GeneratingQuestions).await?;
        let count = config.llm.question_batch_size;
        let generated = match generator::generate_questions(
            store,
            embedder,
            llm,
            config,
            session_id,
            session.material_id,
            session.course_name.as_deref(),
            &session.difficulty_level,
            count,
        )
        .await
        {
            Ok(generated) if !generated.is_empty() => generated,
            Ok(_) => {
                roll_back(store, session_id, SessionStatus::Created).await;
                return Err(Error::Generation {
                    attempts: config.llm.max_retries,
                    reason: "model returned no usable questions".into(),
                });
            }
            Err(err) => {
                roll_back(store, session_id, SessionStatus::Created).await;
                return Err(err);
            }
        };
        let approved: Vec<NewQuestion> = generated
            .into_iter()
            .map(|mut q| {
                q.status = QuestionStatus::Approved;
                q
            })
            .collect();
        let ids = store.insert_questions(&approved).await?;
        session = advance(store, &session, SessionStatus::ReviewingQuestions).await?;
        log_ai(
            store,
            session_id,
            "generate_questions",
            &format!("difficulty={} count={count}", session.difficulty_level),
            &format!("{} questions", ids.len()),
        )
        .await;
    }

    if session.session_type.is_lightweight()
        && session.status == SessionStatus::ReviewingQuestions
    {
        let drafts = store
            .questions_for_session(session_id, Some(QuestionStatus::Draft))
            .await?;
        if !drafts.is_empty() {
            let ids: Vec<i64> = drafts.iter().map(|q| q.id).collect();
            store
                .set_question_status(&ids, QuestionStatus::Approved)
                .await?;
        }
        while session.status != SessionStatus::Ready {
            let next = session
                .status
                .next()
                .ok_or_else(|| Error::Conflict("session lifecycle exhausted".into()))?;
            session = advance(store, &session, next).await?;
        }
    }

    require_status(&session, SessionStatus::Ready)?;
    let session = advance(store, &session, SessionStatus::Active).await?;
    info!(session_id, "session started");
    Ok(session)
}

/// Join a session as a participant.
///
/// EXAM sessions check the password and are joinable exactly at `ready`.
/// PRACTICE and INTERVIEW sessions also accept joins while still at
/// `created`, before any questions exist. Joining twice is idempotent:
/// the existing participant row comes back instead of an error.
pub async fn join_session(
    store: &dyn Store,
    session_id: i64,
    participant_id: i64,
    password: Option<&str>,
) -> Result<ParticipantSession> {
    let session = require_session(store, session_id).await?;
    let joinable = if session.session_type.is_lightweight() {
        matches!(session.status, SessionStatus::Created | SessionStatus::Ready)
    } else {
        session.status == SessionStatus::Ready
    };
    if !joinable {
        return Err(Error::Conflict(format!(
            "session {} is not open for joining",
            session_id
        )));
    }
    if session.session_type == SessionType::Exam {
        let expected = session.password.as_deref().unwrap_or_default();
        if password.unwrap_or_default() != expected {
            return Err(Error::Conflict("incorrect session password".into()));
        }
    }

    match store
        .insert_participant_session(session_id, participant_id)
        .await
    {
        Ok(participant) => Ok(participant),
        Err(err) if err.is_conflict() => store
            .find_participant_session(session_id, participant_id)
            .await?
            .ok_or(err),
        Err(err) => Err(err),
    }
}

/// Questions a participant may answer, in id order.
///
/// EXAM questions must have fully approved reference answers. Lightweight
/// sessions serve any non-draft question: lazy answer generation moves a
/// question past `approved` while other participants still need it.
pub async fn answerable_questions(
    store: &dyn Store,
    session: &Session,
) -> Result<Vec<Question>> {
    if session.session_type.is_lightweight() {
        let questions = store.questions_for_session(session.id, None).await?;
        Ok(questions
            .into_iter()
            .filter(|q| q.status != QuestionStatus::Draft)
            .collect())
    } else {
        store
            .questions_for_session(session.id, Some(QuestionStatus::AnswersApproved))
            .await
    }
}

/// The next unanswered question for a participant, if any.
pub async fn next_question(
    store: &dyn Store,
    participant_session_id: i64,
) -> Result<Option<Question>> {
    let participant = store
        .get_participant_session(participant_session_id)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!("participant session {participant_session_id}"))
        })?;
    let session = require_session(store, participant.session_id).await?;
    let questions = answerable_questions(store, &session).await?;
    let answered: Vec<i64> = store
        .answers_for_participant(participant_session_id)
        .await?
        .into_iter()
        .map(|a| a.question_id)
        .collect();
    Ok(questions
        .into_iter()
        .find(|q| !answered.contains(&q.id)))
}

/// Submit and auto-evaluate one answer. Single-shot per question: a second
/// submission surfaces the store's conflict.
///
/// Lightweight sessions generate a missing reference answer on the spot;
/// if that fails the evaluation proceeds against an empty reference
/// rather than blocking the participant.
pub async fn submit_answer(
    store: &dyn Store,
    llm: &dyn LlmClient,
    config: &Config,
    participant_session_id: i64,
    question_id: i64,
    answer_text: &str,
) -> Result<Answer> {
    let participant = store
        .get_participant_session(participant_session_id)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!("participant session {participant_session_id}"))
        })?;
    let session = require_session(store, participant.session_id).await?;
    require_status(&session, SessionStatus::Active)?;

    let mut question = store
        .get_question(question_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;
    if question.session_id != session.id {
        return Err(Error::Conflict(format!(
            "question {question_id} belongs to another session"
        )));
    }

    let needs_reference = question
        .reference_answer
        .as_deref()
        .map_or(true, |a| a.trim().is_empty());
    if needs_reference && session.session_type.is_lightweight() {
        let batch = std::slice::from_ref(&question);
        match generator::generate_reference_answers(
            store,
            llm,
            config,
            batch,
            session.material_id,
            session.course_name.as_deref(),
        )
        .await
        {
            Ok(pairs) => {
                if let Some((_, reference)) = pairs.into_iter().next() {
                    store
                        .set_reference_answer(
                            question_id,
                            &reference,
                            QuestionStatus::AnswersGenerated,
                        )
                        .await?;
                    question.reference_answer = Some(reference);
                }
            }
            Err(err) => {
                warn!(question_id, error = %err, "lazy reference answer generation failed");
            }
        }
    }

    let reference = question.reference_answer.as_deref().unwrap_or_default();
    let evaluation = scoring::auto_evaluate(
        llm,
        config,
        &question.content,
        answer_text,
        reference,
        &question.difficulty,
    )
    .await;

    let answer = store
        .insert_answer(&NewAnswer {
            participant_session_id,
            question_id,
            answer_text: answer_text.to_string(),
            auto_score: Some(evaluation.score),
            auto_feedback: Some(evaluation.feedback),
        })
        .await?;

    log_ai(
        store,
        session.id,
        "evaluate_answer",
        &format!("question {question_id}"),
        &format!("score {:.1}", evaluation.score),
    )
    .await;

    scoring::recompute_score_total(store, participant_session_id).await?;
    Ok(answer)
}

/// Close an active session (active -> ended).
pub async fn end_session(store: &dyn Store, session_id: i64, actor_id: i64) -> Result<Session> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    require_status(&session, SessionStatus::Active)?;
    let session = advance(store, &session, SessionStatus::Ended).await?;
    info!(session_id, "session ended");
    Ok(session)
}

/// Delete a session that never ran. A session with participants is
/// history and stays.
pub async fn delete_session(store: &dyn Store, session_id: i64, actor_id: i64) -> Result<()> {
    let session = require_session(store, session_id).await?;
    require_creator(&session, actor_id)?;
    if store.count_participants(session_id).await? > 0 {
        return Err(Error::Conflict(
            "session has participants and cannot be deleted".into(),
        ));
    }
    store.delete_session(session_id).await
}

/// Record an AI call in the audit log. Failures are logged, not surfaced.
async fn log_ai(
    store: &dyn Store,
    session_id: i64,
    request_type: &str,
    request_summary: &str,
    response_summary: &str,
) {
    let log = AiRequestLog {
        session_id,
        request_type: request_type.to_string(),
        request_summary: request_summary.to_string(),
        response_summary: response_summary.to_string(),
    };
    if let Err(err) = store.log_ai_request(&log).await {
        warn!(session_id, error = %err, "failed to write ai request log");
    }
}
