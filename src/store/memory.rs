//! In-memory [`Store`] implementation.
//!
//! Backs tests and ephemeral runs. Ids come from per-table atomic
//! counters; the uniqueness constraints the SQLite backend enforces with
//! UNIQUE indexes are checked by hand here so callers see the same
//! `Conflict` behavior against either backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{
    AiRequestLog, Answer, Chunk, Material, NewAnswer, NewChunk, NewQuestion, NewSession,
    ParticipantSession, Question, QuestionStatus, ReviewLog, Session, SessionStatus,
};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    materials: HashMap<i64, Material>,
    chunks: HashMap<i64, Chunk>,
    sessions: HashMap<i64, Session>,
    questions: HashMap<i64, Question>,
    participant_sessions: HashMap<i64, ParticipantSession>,
    answers: HashMap<i64, Answer>,
    ai_request_logs: Vec<AiRequestLog>,
    review_logs: Vec<ReviewLog>,
}

/// Thread-safe in-memory storage.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_material(
        &self,
        title: &str,
        uploaded_by: i64,
        is_public: bool,
        file_path: Option<&str>,
    ) -> Result<Material> {
        let material = Material {
            id: self.alloc_id(),
            title: title.to_string(),
            uploaded_by,
            is_public,
            file_path: file_path.map(str::to_string),
            num_chunks: 0,
            created_at: Utc::now(),
        };
        self.write().materials.insert(material.id, material.clone());
        Ok(material)
    }

    async fn get_material(&self, id: i64) -> Result<Option<Material>> {
        Ok(self.read().materials.get(&id).cloned())
    }

    async fn set_material_chunk_count(&self, id: i64, num_chunks: i64) -> Result<()> {
        let mut tables = self.write();
        let material = tables
            .materials
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("material {id}")))?;
        material.num_chunks = num_chunks;
        Ok(())
    }

    async fn delete_material(&self, id: i64) -> Result<()> {
        let mut tables = self.write();
        tables.materials.remove(&id);
        tables.chunks.retain(|_, c| c.material_id != id);
        Ok(())
    }

    async fn list_materials(&self) -> Result<Vec<Material>> {
        let mut materials: Vec<Material> = self.read().materials.values().cloned().collect();
        materials.sort_by_key(|m| m.id);
        Ok(materials)
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        let mut tables = self.write();
        for new in chunks {
            let dup = tables
                .chunks
                .values()
                .any(|c| c.material_id == new.material_id && c.chunk_index == new.chunk_index);
            if dup {
                return Err(Error::Conflict(format!(
                    "chunk index {} already present for material {}",
                    new.chunk_index, new.material_id
                )));
            }
            let id = self.alloc_id();
            tables.chunks.insert(
                id,
                Chunk {
                    id,
                    material_id: new.material_id,
                    chunk_index: new.chunk_index,
                    chunk_text: new.chunk_text.clone(),
                    embedding: new.embedding.clone(),
                    chapter: new.chapter.clone(),
                    start_offset: new.start_offset,
                    end_offset: new.end_offset,
                },
            );
        }
        Ok(())
    }

    async fn chunks_for_material(&self, material_id: i64) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()
            .chunks
            .values()
            .filter(|c| c.material_id == material_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn create_session(&self, new: &NewSession) -> Result<Session> {
        let session = Session {
            id: self.alloc_id(),
            session_name: new.session_name.clone(),
            session_type: new.session_type,
            course_name: new.course_name.clone(),
            created_by: new.created_by,
            material_id: new.material_id,
            difficulty_level: new.difficulty_level.clone(),
            status: SessionStatus::Created,
            password: new.password.clone(),
            start_time: new.start_time,
            end_time: new.end_time,
            time_limit_minutes: new.time_limit_minutes,
            opening_script: None,
            closing_script: None,
            created_at: Utc::now(),
        };
        self.write().sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        Ok(self.read().sessions.get(&id).cloned())
    }

    async fn update_session_status(&self, id: i64, status: SessionStatus) -> Result<()> {
        let mut tables = self.write();
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        session.status = status;
        Ok(())
    }

    async fn update_session_scripts(&self, id: i64, opening: &str, closing: &str) -> Result<()> {
        let mut tables = self.write();
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        session.opening_script = Some(opening.to_string());
        session.closing_script = Some(closing.to_string());
        Ok(())
    }

    async fn count_participants(&self, session_id: i64) -> Result<i64> {
        Ok(self
            .read()
            .participant_sessions
            .values()
            .filter(|p| p.session_id == session_id)
            .count() as i64)
    }

    async fn delete_session(&self, id: i64) -> Result<()> {
        let mut tables = self.write();
        tables.sessions.remove(&id);
        tables.questions.retain(|_, q| q.session_id != id);
        let participant_ids: Vec<i64> = tables
            .participant_sessions
            .values()
            .filter(|p| p.session_id == id)
            .map(|p| p.id)
            .collect();
        tables.participant_sessions.retain(|_, p| p.session_id != id);
        tables
            .answers
            .retain(|_, a| !participant_ids.contains(&a.participant_session_id));
        Ok(())
    }

    async fn insert_questions(&self, questions: &[NewQuestion]) -> Result<Vec<i64>> {
        let mut tables = self.write();
        let mut ids = Vec::with_capacity(questions.len());
        for new in questions {
            let id = self.alloc_id();
            tables.questions.insert(
                id,
                Question {
                    id,
                    session_id: new.session_id,
                    content: new.content.clone(),
                    keywords: new.keywords.clone(),
                    difficulty: new.difficulty.clone(),
                    status: new.status,
                    reference_answer: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        Ok(self.read().questions.get(&id).cloned())
    }

    async fn questions_for_session(
        &self,
        session_id: i64,
        status: Option<QuestionStatus>,
    ) -> Result<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .read()
            .questions
            .values()
            .filter(|q| q.session_id == session_id && status.map_or(true, |s| q.status == s))
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>> {
        let tables = self.read();
        let mut questions: Vec<Question> = ids
            .iter()
            .filter_map(|id| tables.questions.get(id).cloned())
            .collect();
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn set_question_status(&self, ids: &[i64], status: QuestionStatus) -> Result<()> {
        let mut tables = self.write();
        for id in ids {
            if let Some(question) = tables.questions.get_mut(id) {
                question.status = status;
            }
        }
        Ok(())
    }

    async fn set_reference_answer(
        &self,
        question_id: i64,
        reference_answer: &str,
        status: QuestionStatus,
    ) -> Result<()> {
        let mut tables = self.write();
        let question = tables
            .questions
            .get_mut(&question_id)
            .ok_or_else(|| Error::NotFound(format!("question {question_id}")))?;
        question.reference_answer = Some(reference_answer.to_string());
        question.status = status;
        Ok(())
    }

    async fn update_question_content(
        &self,
        id: i64,
        content: Option<&str>,
        keywords: Option<&str>,
        difficulty: Option<&str>,
    ) -> Result<()> {
        let mut tables = self.write();
        let question = tables
            .questions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("question {id}")))?;
        if let Some(content) = content {
            question.content = content.to_string();
        }
        if let Some(keywords) = keywords {
            question.keywords = keywords.to_string();
        }
        if let Some(difficulty) = difficulty {
            question.difficulty = difficulty.to_string();
        }
        Ok(())
    }

    async fn delete_question(&self, id: i64) -> Result<()> {
        self.write().questions.remove(&id);
        Ok(())
    }

    async fn find_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<Option<ParticipantSession>> {
        Ok(self
            .read()
            .participant_sessions
            .values()
            .find(|p| p.session_id == session_id && p.participant_id == participant_id)
            .cloned())
    }

    async fn get_participant_session(&self, id: i64) -> Result<Option<ParticipantSession>> {
        Ok(self.read().participant_sessions.get(&id).cloned())
    }

    async fn insert_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<ParticipantSession> {
        let mut tables = self.write();
        let dup = tables
            .participant_sessions
            .values()
            .any(|p| p.session_id == session_id && p.participant_id == participant_id);
        if dup {
            return Err(Error::Conflict(format!(
                "participant {participant_id} already joined session {session_id}"
            )));
        }
        let participant = ParticipantSession {
            id: self.alloc_id(),
            session_id,
            participant_id,
            join_time: Utc::now(),
            score_total: None,
            overall_feedback: None,
            reviewed_by: None,
            reviewed_at: None,
        };
        tables
            .participant_sessions
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn update_participant_totals(
        &self,
        id: i64,
        score_total: Option<f64>,
        overall_feedback: Option<&str>,
    ) -> Result<()> {
        let mut tables = self.write();
        let participant = tables
            .participant_sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("participant session {id}")))?;
        participant.score_total = score_total;
        if let Some(feedback) = overall_feedback {
            participant.overall_feedback = Some(feedback.to_string());
        }
        Ok(())
    }

    async fn set_participant_review(
        &self,
        id: i64,
        reviewer_id: i64,
        feedback: Option<&str>,
    ) -> Result<()> {
        let mut tables = self.write();
        let participant = tables
            .participant_sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("participant session {id}")))?;
        participant.reviewed_by = Some(reviewer_id);
        participant.reviewed_at = Some(Utc::now());
        if let Some(feedback) = feedback {
            participant.overall_feedback = Some(feedback.to_string());
        }
        Ok(())
    }

    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer> {
        let mut tables = self.write();
        let dup = tables.answers.values().any(|a| {
            a.participant_session_id == new.participant_session_id
                && a.question_id == new.question_id
        });
        if dup {
            return Err(Error::Conflict(format!(
                "question {} already answered in participant session {}",
                new.question_id, new.participant_session_id
            )));
        }
        let answer = Answer {
            id: self.alloc_id(),
            participant_session_id: new.participant_session_id,
            question_id: new.question_id,
            answer_text: new.answer_text.clone(),
            auto_score: new.auto_score,
            auto_feedback: new.auto_feedback.clone(),
            reviewer_score: None,
            reviewer_feedback: None,
        };
        tables.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    async fn get_answer(&self, id: i64) -> Result<Option<Answer>> {
        Ok(self.read().answers.get(&id).cloned())
    }

    async fn answers_for_participant(
        &self,
        participant_session_id: i64,
    ) -> Result<Vec<Answer>> {
        let mut answers: Vec<Answer> = self
            .read()
            .answers
            .values()
            .filter(|a| a.participant_session_id == participant_session_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.id);
        Ok(answers)
    }

    async fn set_reviewer_score(&self, answer_id: i64, score: f64) -> Result<()> {
        let mut tables = self.write();
        let answer = tables
            .answers
            .get_mut(&answer_id)
            .ok_or_else(|| Error::NotFound(format!("answer {answer_id}")))?;
        answer.reviewer_score = Some(score);
        Ok(())
    }

    async fn set_reviewer_feedback(&self, answer_id: i64, feedback: &str) -> Result<()> {
        let mut tables = self.write();
        let answer = tables
            .answers
            .get_mut(&answer_id)
            .ok_or_else(|| Error::NotFound(format!("answer {answer_id}")))?;
        answer.reviewer_feedback = Some(feedback.to_string());
        Ok(())
    }

    async fn log_ai_request(&self, log: &AiRequestLog) -> Result<()> {
        self.write().ai_request_logs.push(log.clone());
        Ok(())
    }

    async fn log_review(&self, log: &ReviewLog) -> Result<()> {
        self.write().review_logs.push(log.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session(name: &str) -> NewSession {
        NewSession {
            session_name: name.to_string(),
            session_type: crate::models::SessionType::Exam,
            course_name: None,
            created_by: 1,
            material_id: None,
            difficulty_level: "UNDERSTAND".to_string(),
            password: Some("pw".to_string()),
            start_time: None,
            end_time: None,
            time_limit_minutes: None,
        }
    }

    #[tokio::test]
    async fn chunks_come_back_ordered_by_index() {
        let store = InMemoryStore::new();
        let material = store.create_material("m", 1, false, None).await.unwrap();
        let chunks: Vec<NewChunk> = [2, 0, 1]
            .iter()
            .map(|&i| NewChunk {
                material_id: material.id,
                chunk_index: i,
                chunk_text: format!("chunk {i}"),
                embedding: vec![0.0; 4],
                chapter: None,
                start_offset: 0,
                end_offset: 0,
            })
            .collect();
        store.insert_chunks(&chunks).await.unwrap();
        let got = store.chunks_for_material(material.id).await.unwrap();
        let indices: Vec<i64> = got.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn duplicate_join_is_conflict() {
        let store = InMemoryStore::new();
        let session = store.create_session(&new_session("s")).await.unwrap();
        store
            .insert_participant_session(session.id, 7)
            .await
            .unwrap();
        let err = store
            .insert_participant_session(session.id, 7)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn duplicate_answer_is_conflict() {
        let store = InMemoryStore::new();
        let session = store.create_session(&new_session("s")).await.unwrap();
        let participant = store
            .insert_participant_session(session.id, 7)
            .await
            .unwrap();
        let new = NewAnswer {
            participant_session_id: participant.id,
            question_id: 42,
            answer_text: "a".to_string(),
            auto_score: None,
            auto_feedback: None,
        };
        store.insert_answer(&new).await.unwrap();
        let err = store.insert_answer(&new).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn deleting_material_removes_chunks() {
        let store = InMemoryStore::new();
        let material = store.create_material("m", 1, false, None).await.unwrap();
        store
            .insert_chunks(&[NewChunk {
                material_id: material.id,
                chunk_index: 0,
                chunk_text: "t".to_string(),
                embedding: vec![],
                chapter: None,
                start_offset: 0,
                end_offset: 1,
            }])
            .await
            .unwrap();
        store.delete_material(material.id).await.unwrap();
        assert!(store.get_material(material.id).await.unwrap().is_none());
        assert!(store
            .chunks_for_material(material.id)
            .await
            .unwrap()
            .is_empty());
    }
}
