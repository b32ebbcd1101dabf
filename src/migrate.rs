use sqlx::SqlitePool;

use crate::error::Result;

/// Create the schema if it does not exist. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Materials table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS materials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            uploaded_by INTEGER NOT NULL,
            is_public INTEGER NOT NULL DEFAULT 0,
            file_path TEXT,
            num_chunks INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks table; embeddings stored as little-endian f32 blobs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS material_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            material_id INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            chapter TEXT,
            start_offset INTEGER NOT NULL,
            end_offset INTEGER NOT NULL,
            UNIQUE(material_id, chunk_index),
            FOREIGN KEY (material_id) REFERENCES materials(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sessions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_name TEXT NOT NULL,
            session_type TEXT NOT NULL,
            course_name TEXT,
            created_by INTEGER NOT NULL,
            material_id INTEGER,
            difficulty_level TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'created',
            password TEXT,
            start_time TEXT,
            end_time TEXT,
            time_limit_minutes INTEGER,
            opening_script TEXT,
            closing_script TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (material_id) REFERENCES materials(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Questions table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            keywords TEXT NOT NULL DEFAULT '',
            difficulty TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            reference_answer TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (session, participant) pair
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS participant_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            participant_id INTEGER NOT NULL,
            join_time TEXT NOT NULL,
            score_total REAL,
            overall_feedback TEXT,
            reviewed_by INTEGER,
            reviewed_at TEXT,
            UNIQUE(session_id, participant_id),
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (participant_session, question) pair
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            participant_session_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            answer_text TEXT NOT NULL,
            auto_score REAL,
            auto_feedback TEXT,
            reviewer_score REAL,
            reviewer_feedback TEXT,
            UNIQUE(participant_session_id, question_id),
            FOREIGN KEY (participant_session_id) REFERENCES participant_sessions(id) ON DELETE CASCADE,
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Audit tables
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_request_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL,
            request_type TEXT NOT NULL,
            request_summary TEXT NOT NULL,
            response_summary TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            answer_id INTEGER NOT NULL,
            reviewer_id INTEGER NOT NULL,
            old_score REAL,
            new_score REAL,
            old_feedback TEXT,
            new_feedback TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_material_chunks_material_id ON material_chunks(material_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_questions_session_id ON questions(session_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_answers_participant_session_id ON answers(participant_session_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
