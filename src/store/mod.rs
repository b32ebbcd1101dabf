//! Storage abstraction for the assessment pipeline.
//!
//! The [`Store`] trait defines all persistence operations the core needs,
//! enabling pluggable backends: the production SQLite implementation in
//! [`sqlite`] and the in-memory implementation in [`memory`] used by tests.
//!
//! Uniqueness is the store's contract: one [`ParticipantSession`] per
//! (session, participant) pair and one [`Answer`] per
//! (participant_session, question) pair. Implementations surface a
//! violated uniqueness constraint as [`Error::Conflict`]; callers treat
//! it as "already joined" / "already answered", never as a fatal error.
//!
//! [`Error::Conflict`]: crate::error::Error::Conflict

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AiRequestLog, Answer, Chunk, Material, NewAnswer, NewChunk, NewQuestion, NewSession,
    ParticipantSession, Question, QuestionStatus, ReviewLog, Session, SessionStatus,
};

/// Abstract storage backend.
///
/// All operations are async (via `async-trait`). In-memory implementations
/// return immediately-ready futures.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Materials ──────────────────────────────────────────────────

    /// Insert a material record, returning it with its generated id.
    async fn create_material(
        &self,
        title: &str,
        uploaded_by: i64,
        is_public: bool,
        file_path: Option<&str>,
    ) -> Result<Material>;

    async fn get_material(&self, id: i64) -> Result<Option<Material>>;

    /// Record the final chunk count once ingestion completes.
    async fn set_material_chunk_count(&self, id: i64, num_chunks: i64) -> Result<()>;

    /// Delete a material and cascade its chunks.
    async fn delete_material(&self, id: i64) -> Result<()>;

    async fn list_materials(&self) -> Result<Vec<Material>>;

    // ── Chunks ─────────────────────────────────────────────────────

    /// Insert one batch of chunks. The ingestion pipeline bounds batch
    /// sizes; a failure here aborts the remaining batches.
    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()>;

    /// All chunks of a material, ordered by ascending `chunk_index`.
    async fn chunks_for_material(&self, material_id: i64) -> Result<Vec<Chunk>>;

    // ── Sessions ───────────────────────────────────────────────────

    async fn create_session(&self, new: &NewSession) -> Result<Session>;

    async fn get_session(&self, id: i64) -> Result<Option<Session>>;

    async fn update_session_status(&self, id: i64, status: SessionStatus) -> Result<()>;

    async fn update_session_scripts(
        &self,
        id: i64,
        opening: &str,
        closing: &str,
    ) -> Result<()>;

    async fn count_participants(&self, session_id: i64) -> Result<i64>;

    async fn delete_session(&self, id: i64) -> Result<()>;

    // ── Questions ──────────────────────────────────────────────────

    /// Batch-insert questions, returning generated ids in input order.
    async fn insert_questions(&self, questions: &[NewQuestion]) -> Result<Vec<i64>>;

    async fn get_question(&self, id: i64) -> Result<Option<Question>>;

    /// Questions of a session, optionally filtered by status, ordered by id.
    async fn questions_for_session(
        &self,
        session_id: i64,
        status: Option<QuestionStatus>,
    ) -> Result<Vec<Question>>;

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>>;

    async fn set_question_status(&self, ids: &[i64], status: QuestionStatus) -> Result<()>;

    /// Store a reference answer and move the question to `status`.
    async fn set_reference_answer(
        &self,
        question_id: i64,
        reference_answer: &str,
        status: QuestionStatus,
    ) -> Result<()>;

    /// Creator edit of question text/keywords/difficulty before finalize.
    async fn update_question_content(
        &self,
        id: i64,
        content: Option<&str>,
        keywords: Option<&str>,
        difficulty: Option<&str>,
    ) -> Result<()>;

    async fn delete_question(&self, id: i64) -> Result<()>;

    // ── Participant sessions ───────────────────────────────────────

    async fn find_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<Option<ParticipantSession>>;

    async fn get_participant_session(&self, id: i64) -> Result<Option<ParticipantSession>>;

    /// Insert a join row. A duplicate (session, participant) pair is a
    /// `Conflict`; callers handle it as an idempotent re-join.
    async fn insert_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<ParticipantSession>;

    async fn update_participant_totals(
        &self,
        id: i64,
        score_total: Option<f64>,
        overall_feedback: Option<&str>,
    ) -> Result<()>;

    async fn set_participant_review(
        &self,
        id: i64,
        reviewer_id: i64,
        feedback: Option<&str>,
    ) -> Result<()>;

    // ── Answers ────────────────────────────────────────────────────

    /// Insert an answer. A duplicate (participant_session, question)
    /// pair is a `Conflict`; submission is single-shot.
    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer>;

    async fn get_answer(&self, id: i64) -> Result<Option<Answer>>;

    async fn answers_for_participant(
        &self,
        participant_session_id: i64,
    ) -> Result<Vec<Answer>>;

    async fn set_reviewer_score(&self, answer_id: i64, score: f64) -> Result<()>;

    async fn set_reviewer_feedback(&self, answer_id: i64, feedback: &str) -> Result<()>;

    // ── Audit logs (best-effort at call sites) ─────────────────────

    async fn log_ai_request(&self, log: &AiRequestLog) -> Result<()>;

    async fn log_review(&self, log: &ReviewLog) -> Result<()>;
}
