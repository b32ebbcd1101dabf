//! # ExamKit CLI (`exk`)
//!
//! The `exk` binary drives the assessment pipeline from the command line:
//! database initialization, material ingestion, retrieval checks, and the
//! full session lifecycle from question generation through scoring.
//!
//! ## Usage
//!
//! ```bash
//! exk --config ./config/examkit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `exk init` | Create the SQLite database and run schema migrations |
//! | `exk ingest <file>` | Ingest a material (PDF or text) |
//! | `exk materials` | List ingested materials |
//! | `exk delete-material <id>` | Delete a material, its chunks, and the stored upload |
//! | `exk search <material-id> "<query>"` | Similarity search over a material's chunks |
//! | `exk session create` | Create a session |
//! | `exk session generate-questions` | Generate draft questions |
//! | `exk session approve-questions` | Approve drafts |
//! | `exk session edit-question` / `remove-question` | Adjust drafts before finalize |
//! | `exk session edit-answer` | Replace a generated reference answer |
//! | `exk session generate-answers` | Generate reference answers |
//! | `exk session approve-answers` | Approve reference answers |
//! | `exk session generate-script` | Generate opening/closing scripts |
//! | `exk session finalize` | Gate the session to `ready` |
//! | `exk session start` / `end` | Open and close answering |
//! | `exk session join` | Join as a participant |
//! | `exk session submit` | Submit and auto-evaluate an answer |
//! | `exk session next` | Show the next unanswered question |
//! | `exk session complete` | Final aggregate and overall feedback |
//! | `exk session review` | Reviewer score/feedback override |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use examkit::blob::{BlobStore, LocalBlobStore};
use examkit::config::{self, Config};
use examkit::embedding::GeminiEmbedder;
use examkit::error::Error;
use examkit::llm::GeminiLlm;
use examkit::models::{NewSession, SessionType};
use examkit::store::sqlite::SqliteStore;
use examkit::store::Store;
use examkit::{db, extract, ingest, migrate, retrieval, scoring, sessions};

/// ExamKit CLI — a retrieval-augmented assessment pipeline.
#[derive(Parser)]
#[command(
    name = "exk",
    about = "ExamKit — retrieval-augmented question generation, sessions, and scoring",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/examkit.toml")]
    config: PathBuf,

    /// Acting user id for ownership and review checks.
    #[arg(long, global = true, default_value_t = 1)]
    user: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a material file (PDF, txt, md) into chunks and embeddings.
    Ingest {
        /// Path to the source file.
        file: PathBuf,

        /// Material title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        /// Make the material visible to all sessions.
        #[arg(long)]
        public: bool,
    },

    /// List ingested materials.
    Materials,

    /// Delete a material, its chunks, and the stored upload.
    DeleteMaterial { material_id: i64 },

    /// Similarity search over one material's chunks.
    Search {
        /// Material id.
        material_id: i64,

        /// The search query string.
        query: String,

        /// Maximum number of chunks to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Session lifecycle operations.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session in `created` status.
    Create {
        /// Session name.
        name: String,

        /// Session type: EXAM, PRACTICE, or INTERVIEW.
        #[arg(long, default_value = "PRACTICE")]
        session_type: String,

        /// Material to draw questions from.
        #[arg(long)]
        material: Option<i64>,

        /// Course name, used when no material is attached.
        #[arg(long)]
        course: Option<String>,

        /// Bloom taxonomy level targeted by generation.
        #[arg(long, default_value = "UNDERSTAND")]
        difficulty: String,

        /// Join password. Required for EXAM sessions.
        #[arg(long)]
        password: Option<String>,

        /// Time limit per attempt, in minutes.
        #[arg(long)]
        time_limit: Option<i64>,
    },

    /// Generate draft questions (created -> reviewing_questions).
    GenerateQuestions {
        session_id: i64,

        /// Number of questions. Defaults to the configured batch size.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Approve draft questions.
    ApproveQuestions {
        session_id: i64,

        /// Question ids to approve.
        #[arg(required = true)]
        question_ids: Vec<i64>,
    },

    /// Generate reference answers for the approved questions.
    GenerateAnswers { session_id: i64 },

    /// Approve generated reference answers.
    ApproveAnswers {
        session_id: i64,

        /// Question ids whose answers to approve.
        #[arg(required = true)]
        question_ids: Vec<i64>,
    },

    /// Generate the opening and closing scripts.
    GenerateScript { session_id: i64 },

    /// Gate the session to `ready`.
    Finalize { session_id: i64 },

    /// Open the session for answering.
    Start { session_id: i64 },

    /// Join a session as a participant.
    Join {
        session_id: i64,

        /// Session password (EXAM sessions).
        #[arg(long)]
        password: Option<String>,
    },

    /// Submit an answer for automatic evaluation. One shot per question.
    Submit {
        /// Participant session id from `join`.
        participant_session_id: i64,

        question_id: i64,

        /// Answer text.
        answer: String,
    },

    /// Show the next unanswered question for a participant.
    Next { participant_session_id: i64 },

    /// Final aggregate and overall feedback for a participant.
    Complete { participant_session_id: i64 },

    /// Close an active session.
    End { session_id: i64 },

    /// Reviewer override of one answer's score or feedback.
    Review {
        answer_id: i64,

        /// New score in [0, 10].
        #[arg(long)]
        score: Option<f64>,

        /// New feedback text.
        #[arg(long)]
        feedback: Option<String>,
    },

    /// List a session's questions with status and reference answers.
    Questions { session_id: i64 },

    /// Edit a question's content, keywords, or difficulty before finalize.
    EditQuestion {
        session_id: i64,
        question_id: i64,

        /// New question text.
        #[arg(long)]
        content: Option<String>,

        /// New comma-separated keywords.
        #[arg(long)]
        keywords: Option<String>,

        /// New difficulty bucket: EASY, MEDIUM, or HARD.
        #[arg(long)]
        difficulty: Option<String>,
    },

    /// Replace a generated reference answer during answer review.
    EditAnswer {
        session_id: i64,
        question_id: i64,

        /// New reference answer text.
        answer: String,
    },

    /// Remove a question before finalize.
    RemoveQuestion { session_id: i64, question_id: i64 },

    /// Delete a session that has no participants.
    Delete { session_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "examkit=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    if matches!(&cli.command, Commands::Init) {
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }
    let store = SqliteStore::new(pool);

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Ingest {
            file,
            title,
            public,
        } => {
            run_ingest(&store, &cfg, &file, title, public, cli.user).await?;
        }
        Commands::Materials => {
            for material in store.list_materials().await? {
                println!(
                    "{:>5}  {:<40}  {:>4} chunks  {}",
                    material.id,
                    material.title,
                    material.num_chunks,
                    material.created_at.format("%Y-%m-%d")
                );
            }
        }
        Commands::DeleteMaterial { material_id } => {
            let material = store
                .get_material(material_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("material {material_id}")))?;
            if let Some(blob_key) = material.file_path.as_deref() {
                let blobs = LocalBlobStore::new(cfg.storage.upload_root.clone());
                if let Err(err) = blobs.delete(blob_key).await {
                    eprintln!("warning: stored upload {blob_key} not removed: {err}");
                }
            }
            store.delete_material(material_id).await?;
            println!("Material {material_id} deleted.");
        }
        Commands::Search {
            material_id,
            query,
            limit,
        } => {
            let embedder = GeminiEmbedder::new(&cfg.embedding)?;
            let hits =
                retrieval::search_similar_chunks(&store, &embedder, material_id, &query, limit)
                    .await?;
            for hit in hits {
                println!(
                    "[{:.3}] #{} {}",
                    hit.similarity,
                    hit.chunk.chunk_index,
                    snippet(&hit.chunk.chunk_text, 120)
                );
            }
        }
        Commands::Session { action } => {
            run_session_action(&store, &cfg, cli.user, action).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    store: &SqliteStore,
    cfg: &Config,
    file: &PathBuf,
    title: Option<String>,
    public: bool,
    user: i64,
) -> anyhow::Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let content_type = extract::content_type_for(&file_name)
        .ok_or_else(|| Error::EmptyOrUnreadableSource(format!("unsupported file: {file_name}")))?;
    let bytes = std::fs::read(file)?;
    let text = extract::extract_text(&bytes, content_type)?;

    // Keep the original upload for re-processing and download.
    let blobs = LocalBlobStore::new(cfg.storage.upload_root.clone());
    let blob_key = blobs.put(&file_name, &bytes).await?;

    let embedder = GeminiEmbedder::new(&cfg.embedding)?;
    let material = ingest::ingest_material(
        store,
        &embedder,
        cfg,
        title.as_deref().unwrap_or(&file_name),
        user,
        public,
        Some(&blob_key),
        &text,
    )
    .await?;
    println!(
        "Ingested material {} ({} chunks).",
        material.id, material.num_chunks
    );
    Ok(())
}

async fn run_session_action(
    store: &SqliteStore,
    cfg: &Config,
    user: i64,
    action: SessionAction,
) -> anyhow::Result<()> {
    match action {
        SessionAction::Create {
            name,
            session_type,
            material,
            course,
            difficulty,
            password,
            time_limit,
        } => {
            let session_type = SessionType::parse(&session_type).ok_or_else(|| {
                Error::Precondition(format!("unknown session type {session_type:?}"))
            })?;
            let session = sessions::create_session(
                store,
                NewSession {
                    session_name: name,
                    session_type,
                    course_name: course,
                    created_by: user,
                    material_id: material,
                    difficulty_level: difficulty,
                    password,
                    start_time: None,
                    end_time: None,
                    time_limit_minutes: time_limit,
                },
            )
            .await?;
            println!("Created session {} ({}).", session.id, session.status.as_str());
        }
        SessionAction::GenerateQuestions { session_id, count } => {
            let embedder = GeminiEmbedder::new(&cfg.embedding)?;
            let llm = GeminiLlm::new(&cfg.llm)?;
            let questions = sessions::generate_session_questions(
                store, &embedder, &llm, cfg, session_id, user, count,
            )
            .await?;
            for question in questions {
                println!("{:>5}  [{}] {}", question.id, question.difficulty, question.content);
            }
        }
        SessionAction::ApproveQuestions {
            session_id,
            question_ids,
        } => {
            sessions::approve_questions(store, session_id, user, &question_ids).await?;
            println!("Approved {} questions.", question_ids.len());
        }
        SessionAction::GenerateAnswers { session_id } => {
            let llm = GeminiLlm::new(&cfg.llm)?;
            let questions =
                sessions::generate_session_answers(store, &llm, cfg, session_id, user).await?;
            for question in questions {
                println!(
                    "{:>5}  {}",
                    question.id,
                    snippet(question.reference_answer.as_deref().unwrap_or(""), 120)
                );
            }
        }
        SessionAction::ApproveAnswers {
            session_id,
            question_ids,
        } => {
            sessions::approve_answers(store, session_id, user, &question_ids).await?;
            println!("Approved {} reference answers.", question_ids.len());
        }
        SessionAction::GenerateScript { session_id } => {
            let llm = GeminiLlm::new(&cfg.llm)?;
            let session =
                sessions::generate_session_script(store, &llm, cfg, session_id, user).await?;
            println!("--- opening ---");
            println!("{}", session.opening_script.as_deref().unwrap_or(""));
            println!("--- closing ---");
            println!("{}", session.closing_script.as_deref().unwrap_or(""));
        }
        SessionAction::Finalize { session_id } => {
            let session = sessions::finalize_session(store, session_id, user).await?;
            println!("Session {} is {}.", session.id, session.status.as_str());
        }
        SessionAction::Start { session_id } => {
            let embedder = GeminiEmbedder::new(&cfg.embedding)?;
            let llm = GeminiLlm::new(&cfg.llm)?;
            let session =
                sessions::start_session(store, &embedder, &llm, cfg, session_id, user).await?;
            println!("Session {} is {}.", session.id, session.status.as_str());
        }
        SessionAction::Join {
            session_id,
            password,
        } => {
            let participant =
                sessions::join_session(store, session_id, user, password.as_deref()).await?;
            println!("Joined as participant session {}.", participant.id);
        }
        SessionAction::Submit {
            participant_session_id,
            question_id,
            answer,
        } => {
            let llm = GeminiLlm::new(&cfg.llm)?;
            let result = sessions::submit_answer(
                store,
                &llm,
                cfg,
                participant_session_id,
                question_id,
                &answer,
            )
            .await?;
            println!(
                "Score: {:.1}/10\n{}",
                result.auto_score.unwrap_or(0.0),
                result.auto_feedback.as_deref().unwrap_or("")
            );
        }
        SessionAction::Next {
            participant_session_id,
        } => match sessions::next_question(store, participant_session_id).await? {
            Some(question) => {
                println!("{:>5}  [{}] {}", question.id, question.difficulty, question.content);
            }
            None => println!("All questions answered."),
        },
        SessionAction::Complete {
            participant_session_id,
        } => {
            let llm = GeminiLlm::new(&cfg.llm)?;
            let total =
                scoring::complete_participant(store, &llm, cfg, participant_session_id).await?;
            match total {
                Some(total) => println!("Final score: {total:.1}/10"),
                None => println!("No scored answers."),
            }
        }
        SessionAction::End { session_id } => {
            let session = sessions::end_session(store, session_id, user).await?;
            println!("Session {} is {}.", session.id, session.status.as_str());
        }
        SessionAction::Review {
            answer_id,
            score,
            feedback,
        } => {
            scoring::review_answer(store, answer_id, user, score, feedback.as_deref()).await?;
            println!("Review applied.");
        }
        SessionAction::Questions { session_id } => {
            for question in store.questions_for_session(session_id, None).await? {
                println!(
                    "{:>5}  [{:<17}] [{}] {}",
                    question.id,
                    question.status.as_str(),
                    question.difficulty,
                    question.content
                );
            }
        }
        SessionAction::EditQuestion {
            session_id,
            question_id,
            content,
            keywords,
            difficulty,
        } => {
            sessions::edit_question(
                store,
                session_id,
                user,
                question_id,
                content.as_deref(),
                keywords.as_deref(),
                difficulty.as_deref(),
            )
            .await?;
            println!("Question {question_id} updated.");
        }
        SessionAction::EditAnswer {
            session_id,
            question_id,
            answer,
        } => {
            sessions::edit_reference_answer(store, session_id, user, question_id, &answer)
                .await?;
            println!("Reference answer for question {question_id} updated.");
        }
        SessionAction::RemoveQuestion {
            session_id,
            question_id,
        } => {
            sessions::remove_question(store, session_id, user, question_id).await?;
            println!("Question {question_id} removed.");
        }
        SessionAction::Delete { session_id } => {
            sessions::delete_session(store, session_id, user).await?;
            println!("Session {session_id} deleted.");
        }
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}
