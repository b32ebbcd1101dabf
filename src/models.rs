//! Core data models for the assessment pipeline.
//!
//! These types represent the materials, chunks, sessions, questions, and
//! answers that flow through ingestion, generation, and scoring. Status
//! fields are closed enums with an explicit forward-only transition table;
//! any transition not in the table is rejected rather than trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A source document that has been ingested and chunked.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: i64,
    pub title: String,
    pub uploaded_by: i64,
    pub is_public: bool,
    pub file_path: Option<String>,
    /// Equals the number of persisted chunks once processing completes.
    pub num_chunks: i64,
    pub created_at: DateTime<Utc>,
}

/// A segment of a material's text, carrying its embedding and position.
///
/// Immutable after ingestion; deleted with its material.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub material_id: i64,
    /// Unique within a material, contiguous from 0.
    pub chunk_index: i64,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    /// Most recently detected chapter heading, carried forward.
    pub chapter: Option<String>,
    pub start_offset: i64,
    pub end_offset: i64,
}

/// A chunk ready for insertion, produced by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub material_id: i64,
    pub chunk_index: i64,
    pub chunk_text: String,
    pub embedding: Vec<f32>,
    pub chapter: Option<String>,
    pub start_offset: i64,
    pub end_offset: i64,
}

/// A chunk paired with its similarity to a query, as returned by retrieval.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in [-1, 1]; uniformly 0 when retrieval degraded
    /// to an unranked sample.
    pub similarity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Exam,
    Practice,
    Interview,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Exam => "EXAM",
            SessionType::Practice => "PRACTICE",
            SessionType::Interview => "INTERVIEW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EXAM" => Some(SessionType::Exam),
            "PRACTICE" => Some(SessionType::Practice),
            "INTERVIEW" => Some(SessionType::Interview),
            _ => None,
        }
    }

    /// PRACTICE and INTERVIEW skip the review pipeline: questions are
    /// auto-approved on first start and reference answers generated lazily.
    pub fn is_lightweight(&self) -> bool {
        matches!(self, SessionType::Practice | SessionType::Interview)
    }
}

/// Session lifecycle, strictly forward-only, no skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    GeneratingQuestions,
    ReviewingQuestions,
    GeneratingAnswers,
    ReviewingAnswers,
    GeneratingScript,
    ReviewingScript,
    Ready,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::GeneratingQuestions => "generating_questions",
            SessionStatus::ReviewingQuestions => "reviewing_questions",
            SessionStatus::GeneratingAnswers => "generating_answers",
            SessionStatus::ReviewingAnswers => "reviewing_answers",
            SessionStatus::GeneratingScript => "generating_script",
            SessionStatus::ReviewingScript => "reviewing_script",
            SessionStatus::Ready => "ready",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(SessionStatus::Created),
            "generating_questions" => Some(SessionStatus::GeneratingQuestions),
            "reviewing_questions" => Some(SessionStatus::ReviewingQuestions),
            "generating_answers" => Some(SessionStatus::GeneratingAnswers),
            "reviewing_answers" => Some(SessionStatus::ReviewingAnswers),
            "generating_script" => Some(SessionStatus::GeneratingScript),
            "reviewing_script" => Some(SessionStatus::ReviewingScript),
            "ready" => Some(SessionStatus::Ready),
            "active" => Some(SessionStatus::Active),
            "ended" => Some(SessionStatus::Ended),
            _ => None,
        }
    }

    /// The single status that legally follows this one, if any.
    pub fn next(&self) -> Option<SessionStatus> {
        use SessionStatus::*;
        match self {
            Created => Some(GeneratingQuestions),
            GeneratingQuestions => Some(ReviewingQuestions),
            ReviewingQuestions => Some(GeneratingAnswers),
            GeneratingAnswers => Some(ReviewingAnswers),
            ReviewingAnswers => Some(GeneratingScript),
            GeneratingScript => Some(ReviewingScript),
            ReviewingScript => Some(Ready),
            Ready => Some(Active),
            Active => Some(Ended),
            Ended => None,
        }
    }

    /// Validate a transition against the table, returning the target.
    pub fn advance_to(&self, to: SessionStatus) -> Result<SessionStatus, Error> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(Error::Conflict(format!(
                "invalid session transition {} -> {}",
                self.as_str(),
                to.as_str()
            )))
        }
    }
}

/// An assessment instance.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub session_name: String,
    pub session_type: SessionType,
    pub course_name: Option<String>,
    pub created_by: i64,
    pub material_id: Option<i64>,
    /// Bloom-taxonomy label targeted by question generation.
    pub difficulty_level: String,
    pub status: SessionStatus,
    pub password: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i64>,
    pub opening_script: Option<String>,
    pub closing_script: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a session; the store generates the id,
/// timestamps, and initial `created` status.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_name: String,
    pub session_type: SessionType,
    pub course_name: Option<String>,
    pub created_by: i64,
    pub material_id: Option<i64>,
    pub difficulty_level: String,
    pub password: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub time_limit_minutes: Option<i64>,
}

/// Question review lifecycle, forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionStatus {
    Draft,
    Approved,
    AnswersGenerated,
    AnswersApproved,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Draft => "draft",
            QuestionStatus::Approved => "approved",
            QuestionStatus::AnswersGenerated => "answers_generated",
            QuestionStatus::AnswersApproved => "answers_approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QuestionStatus::Draft),
            "approved" => Some(QuestionStatus::Approved),
            "answers_generated" => Some(QuestionStatus::AnswersGenerated),
            "answers_approved" => Some(QuestionStatus::AnswersApproved),
            _ => None,
        }
    }
}

/// One assessment item, owned by a session.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: i64,
    pub session_id: i64,
    pub content: String,
    pub keywords: String,
    /// EASY | MEDIUM | HARD.
    pub difficulty: String,
    pub status: QuestionStatus,
    /// Required (non-empty) before status can reach `answers_approved`.
    pub reference_answer: Option<String>,
}

/// A draft question as produced by the generator, before insertion.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub session_id: i64,
    pub content: String,
    pub keywords: String,
    pub difficulty: String,
    pub status: QuestionStatus,
}

/// One participant's attempt at a session. Exactly one per
/// (session, participant) pair.
#[derive(Debug, Clone)]
pub struct ParticipantSession {
    pub id: i64,
    pub session_id: i64,
    pub participant_id: i64,
    pub join_time: DateTime<Utc>,
    /// Mean of effective answer scores; recomputed on completion and on
    /// every reviewer edit.
    pub score_total: Option<f64>,
    pub overall_feedback: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One participant response to one question. At most one per
/// (participant_session, question) pair.
#[derive(Debug, Clone)]
pub struct Answer {
    pub id: i64,
    pub participant_session_id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub auto_score: Option<f64>,
    pub auto_feedback: Option<String>,
    /// Takes precedence over `auto_score` when present.
    pub reviewer_score: Option<f64>,
    pub reviewer_feedback: Option<String>,
}

impl Answer {
    /// Reviewer score if present, else automatic score.
    pub fn effective_score(&self) -> Option<f64> {
        self.reviewer_score.or(self.auto_score)
    }
}

/// A submitted answer with its automatic evaluation, before insertion.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub participant_session_id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub auto_score: Option<f64>,
    pub auto_feedback: Option<String>,
}

/// Best-effort audit record for one language-model call.
#[derive(Debug, Clone)]
pub struct AiRequestLog {
    pub session_id: i64,
    pub request_type: String,
    /// Size-bounded summaries, never full payloads.
    pub request_summary: String,
    pub response_summary: String,
}

/// Best-effort audit record for one reviewer edit.
#[derive(Debug, Clone)]
pub struct ReviewLog {
    pub answer_id: i64,
    pub reviewer_id: i64,
    pub old_score: Option<f64>,
    pub new_score: Option<f64>,
    pub old_feedback: Option<String>,
    pub new_feedback: Option<String>,
}
