//! SQLite [`Store`] implementation over an sqlx pool.
//!
//! Unique-index violations on the join and answer tables are translated
//! to [`Error::Conflict`] so the session layer can treat them as the
//! "already joined" / "already answered" signal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{
    AiRequestLog, Answer, Chunk, Material, NewAnswer, NewChunk, NewQuestion, NewSession,
    ParticipantSession, Question, QuestionStatus, ReviewLog, Session, SessionStatus, SessionType,
};
use crate::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a unique-index violation to `Conflict`, everything else to `Store`.
fn map_insert_err(err: sqlx::Error, what: &str) -> Error {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return Error::Conflict(format!("{what} already exists"));
        }
    }
    Error::Store(err)
}

fn decode_err(msg: String) -> Error {
    Error::Store(sqlx::Error::Decode(msg.into()))
}

fn row_to_material(row: &sqlx::sqlite::SqliteRow) -> Material {
    Material {
        id: row.get("id"),
        title: row.get("title"),
        uploaded_by: row.get("uploaded_by"),
        is_public: row.get::<i64, _>("is_public") != 0,
        file_path: row.get("file_path"),
        num_chunks: row.get("num_chunks"),
        created_at: row.get("created_at"),
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        material_id: row.get("material_id"),
        chunk_index: row.get("chunk_index"),
        chunk_text: row.get("chunk_text"),
        embedding: blob_to_vec(&blob),
        chapter: row.get("chapter"),
        start_offset: row.get("start_offset"),
        end_offset: row.get("end_offset"),
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let type_str: String = row.get("session_type");
    let status_str: String = row.get("status");
    Ok(Session {
        id: row.get("id"),
        session_name: row.get("session_name"),
        session_type: SessionType::parse(&type_str)
            .ok_or_else(|| decode_err(format!("unknown session type {type_str:?}")))?,
        course_name: row.get("course_name"),
        created_by: row.get("created_by"),
        material_id: row.get("material_id"),
        difficulty_level: row.get("difficulty_level"),
        status: SessionStatus::parse(&status_str)
            .ok_or_else(|| decode_err(format!("unknown session status {status_str:?}")))?,
        password: row.get("password"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        time_limit_minutes: row.get("time_limit_minutes"),
        opening_script: row.get("opening_script"),
        closing_script: row.get("closing_script"),
        created_at: row.get("created_at"),
    })
}

fn row_to_question(row: &sqlx::sqlite::SqliteRow) -> Result<Question> {
    let status_str: String = row.get("status");
    Ok(Question {
        id: row.get("id"),
        session_id: row.get("session_id"),
        content: row.get("content"),
        keywords: row.get("keywords"),
        difficulty: row.get("difficulty"),
        status: QuestionStatus::parse(&status_str)
            .ok_or_else(|| decode_err(format!("unknown question status {status_str:?}")))?,
        reference_answer: row.get("reference_answer"),
    })
}

fn row_to_participant(row: &sqlx::sqlite::SqliteRow) -> ParticipantSession {
    ParticipantSession {
        id: row.get("id"),
        session_id: row.get("session_id"),
        participant_id: row.get("participant_id"),
        join_time: row.get("join_time"),
        score_total: row.get("score_total"),
        overall_feedback: row.get("overall_feedback"),
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
    }
}

fn row_to_answer(row: &sqlx::sqlite::SqliteRow) -> Answer {
    Answer {
        id: row.get("id"),
        participant_session_id: row.get("participant_session_id"),
        question_id: row.get("question_id"),
        answer_text: row.get("answer_text"),
        auto_score: row.get("auto_score"),
        auto_feedback: row.get("auto_feedback"),
        reviewer_score: row.get("reviewer_score"),
        reviewer_feedback: row.get("reviewer_feedback"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_material(
        &self,
        title: &str,
        uploaded_by: i64,
        is_public: bool,
        file_path: Option<&str>,
    ) -> Result<Material> {
        let created_at: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO materials (title, uploaded_by, is_public, file_path, num_chunks, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            RETURNING *
            "#,
        )
        .bind(title)
        .bind(uploaded_by)
        .bind(is_public as i64)
        .bind(file_path)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_material(&row))
    }

    async fn get_material(&self, id: i64) -> Result<Option<Material>> {
        let row = sqlx::query("SELECT * FROM materials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_material))
    }

    async fn set_material_chunk_count(&self, id: i64, num_chunks: i64) -> Result<()> {
        let result = sqlx::query("UPDATE materials SET num_chunks = ? WHERE id = ?")
            .bind(num_chunks)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("material {id}")));
        }
        Ok(())
    }

    async fn delete_material(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM material_chunks WHERE material_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM materials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_materials(&self) -> Result<Vec<Material>> {
        let rows = sqlx::query("SELECT * FROM materials ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_material).collect())
    }

    async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO material_chunks
                    (material_id, chunk_index, chunk_text, embedding, chapter, start_offset, end_offset)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.material_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.chunk_text)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(&chunk.chapter)
            .bind(chunk.start_offset)
            .bind(chunk.end_offset)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_err(e, "chunk"))?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn chunks_for_material(&self, material_id: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM material_chunks WHERE material_id = ? ORDER BY chunk_index",
        )
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn create_session(&self, new: &NewSession) -> Result<Session> {
        let created_at: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO sessions
                (session_name, session_type, course_name, created_by, material_id,
                 difficulty_level, status, password, start_time, end_time,
                 time_limit_minutes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'created', ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&new.session_name)
        .bind(new.session_type.as_str())
        .bind(&new.course_name)
        .bind(new.created_by)
        .bind(new.material_id)
        .bind(&new.difficulty_level)
        .bind(&new.password)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.time_limit_minutes)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;
        row_to_session(&row)
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn update_session_status(&self, id: i64, status: SessionStatus) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    async fn update_session_scripts(&self, id: i64, opening: &str, closing: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE sessions SET opening_script = ?, closing_script = ? WHERE id = ?")
                .bind(opening)
                .bind(closing)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    async fn count_participants(&self, session_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participant_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn delete_session(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            DELETE FROM answers WHERE participant_session_id IN
                (SELECT id FROM participant_sessions WHERE session_id = ?)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM participant_sessions WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM questions WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_questions(&self, questions: &[NewQuestion]) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(questions.len());
        for question in questions {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO questions (session_id, content, keywords, difficulty, status)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(question.session_id)
            .bind(&question.content)
            .bind(&question.keywords)
            .bind(&question.difficulty)
            .bind(question.status.as_str())
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let row = sqlx::query("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_question).transpose()
    }

    async fn questions_for_session(
        &self,
        session_id: i64,
        status: Option<QuestionStatus>,
    ) -> Result<Vec<Question>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM questions WHERE session_id = ? AND status = ? ORDER BY id",
                )
                .bind(session_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM questions WHERE session_id = ? ORDER BY id")
                    .bind(session_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_question).collect()
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("SELECT * FROM questions WHERE id IN ({placeholders}) ORDER BY id");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_question).collect()
    }

    async fn set_question_status(&self, ids: &[i64], status: QuestionStatus) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE questions SET status = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(status.as_str());
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn set_reference_answer(
        &self,
        question_id: i64,
        reference_answer: &str,
        status: QuestionStatus,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE questions SET reference_answer = ?, status = ? WHERE id = ?")
                .bind(reference_answer)
                .bind(status.as_str())
                .bind(question_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("question {question_id}")));
        }
        Ok(())
    }

    async fn update_question_content(
        &self,
        id: i64,
        content: Option<&str>,
        keywords: Option<&str>,
        difficulty: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE questions SET
                content = COALESCE(?, content),
                keywords = COALESCE(?, keywords),
                difficulty = COALESCE(?, difficulty)
            WHERE id = ?
            "#,
        )
        .bind(content)
        .bind(keywords)
        .bind(difficulty)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("question {id}")));
        }
        Ok(())
    }

    async fn delete_question(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<Option<ParticipantSession>> {
        let row = sqlx::query(
            "SELECT * FROM participant_sessions WHERE session_id = ? AND participant_id = ?",
        )
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_participant))
    }

    async fn get_participant_session(&self, id: i64) -> Result<Option<ParticipantSession>> {
        let row = sqlx::query("SELECT * FROM participant_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_participant))
    }

    async fn insert_participant_session(
        &self,
        session_id: i64,
        participant_id: i64,
    ) -> Result<ParticipantSession> {
        let join_time: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO participant_sessions (session_id, participant_id, join_time)
            VALUES (?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(participant_id)
        .bind(join_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "participant session"))?;
        Ok(row_to_participant(&row))
    }

    async fn update_participant_totals(
        &self,
        id: i64,
        score_total: Option<f64>,
        overall_feedback: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE participant_sessions SET
                score_total = ?,
                overall_feedback = COALESCE(?, overall_feedback)
            WHERE id = ?
            "#,
        )
        .bind(score_total)
        .bind(overall_feedback)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("participant session {id}")));
        }
        Ok(())
    }

    async fn set_participant_review(
        &self,
        id: i64,
        reviewer_id: i64,
        feedback: Option<&str>,
    ) -> Result<()> {
        let reviewed_at: DateTime<Utc> = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE participant_sessions SET
                reviewed_by = ?,
                reviewed_at = ?,
                overall_feedback = COALESCE(?, overall_feedback)
            WHERE id = ?
            "#,
        )
        .bind(reviewer_id)
        .bind(reviewed_at)
        .bind(feedback)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("participant session {id}")));
        }
        Ok(())
    }

    async fn insert_answer(&self, new: &NewAnswer) -> Result<Answer> {
        let row = sqlx::query(
            r#"
            INSERT INTO answers
                (participant_session_id, question_id, answer_text, auto_score, auto_feedback)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.participant_session_id)
        .bind(new.question_id)
        .bind(&new.answer_text)
        .bind(new.auto_score)
        .bind(&new.auto_feedback)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "answer"))?;
        Ok(row_to_answer(&row))
    }

    async fn get_answer(&self, id: i64) -> Result<Option<Answer>> {
        let row = sqlx::query("SELECT * FROM answers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_answer))
    }

    async fn answers_for_participant(
        &self,
        participant_session_id: i64,
    ) -> Result<Vec<Answer>> {
        let rows = sqlx::query(
            "SELECT * FROM answers WHERE participant_session_id = ? ORDER BY id",
        )
        .bind(participant_session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_answer).collect())
    }

    async fn set_reviewer_score(&self, answer_id: i64, score: f64) -> Result<()> {
        let result = sqlx::query("UPDATE answers SET reviewer_score = ? WHERE id = ?")
            .bind(score)
            .bind(answer_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("answer {answer_id}")));
        }
        Ok(())
    }

    async fn set_reviewer_feedback(&self, answer_id: i64, feedback: &str) -> Result<()> {
        let result = sqlx::query("UPDATE answers SET reviewer_feedback = ? WHERE id = ?")
            .bind(feedback)
            .bind(answer_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("answer {answer_id}")));
        }
        Ok(())
    }

    async fn log_ai_request(&self, log: &AiRequestLog) -> Result<()> {
        let created_at: DateTime<Utc> = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO ai_request_logs (session_id, request_type, request_summary, response_summary, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.session_id)
        .bind(&log.request_type)
        .bind(&log.request_summary)
        .bind(&log.response_summary)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_review(&self, log: &ReviewLog) -> Result<()> {
        let created_at: DateTime<Utc> = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO review_logs
                (answer_id, reviewer_id, old_score, new_score, old_feedback, new_feedback, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.answer_id)
        .bind(log.reviewer_id)
        .bind(log.old_score)
        .bind(log.new_score)
        .bind(&log.old_feedback)
        .bind(&log.new_feedback)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
