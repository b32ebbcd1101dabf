//! Question and reference-answer generation.
//!
//! Both operations retrieve context from the session's material, build a
//! prompt, and parse the model's JSON. Reference answers come back keyed
//! by positional index into the submitted batch; indexes out of range are
//! dropped rather than guessed at.

use tracing::{info, warn};

use crate::bloom::{bloom_to_difficulty, included_levels, is_valid_difficulty};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::llm::{generate_json, LlmClient};
use crate::models::{NewQuestion, Question, QuestionStatus};
use crate::prompts::{self, PromptQuestion};
use crate::retrieval::search_similar_chunks;
use crate::store::Store;

/// Query used to pull a broad context sample for question generation.
const GENERATION_QUERY: &str = "general knowledge";

/// Chunks retrieved as context for generation calls.
const GENERATION_CONTEXT_K: usize = 10;

/// Generate `num_questions` draft questions for a session.
///
/// A session with a material retrieves context chunks first; a material
/// with no chunks is an error rather than an empty prompt. A session
/// without a material falls back to course-name-only generation.
pub async fn generate_questions(
    store: &dyn Store,
    embedder: &dyn Embedder,
    llm: &dyn LlmClient,
    config: &Config,
    session_id: i64,
    material_id: Option<i64>,
    course_name: Option<&str>,
    difficulty_level: &str,
    num_questions: usize,
) -> Result<Vec<NewQuestion>> {
    let context: Vec<String> = match material_id {
        Some(material_id) => {
            let hits = search_similar_chunks(
                store,
                embedder,
                material_id,
                GENERATION_QUERY,
                GENERATION_CONTEXT_K,
            )
            .await?;
            if hits.is_empty() {
                return Err(Error::Precondition(format!(
                    "material {material_id} has no chunks"
                )));
            }
            hits.into_iter().map(|h| h.chunk.chunk_text).collect()
        }
        None => Vec::new(),
    };
    let context_refs: Vec<&str> = context.iter().map(String::as_str).collect();

    let prompt = prompts::batch_questions(
        &context_refs,
        difficulty_level,
        included_levels(difficulty_level),
        course_name,
        num_questions,
    );
    let response = generate_json(llm, &prompt, &config.llm).await?;

    let items = response
        .get("questions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Generation {
            attempts: config.llm.max_retries,
            reason: "response missing questions array".into(),
        })?;

    let fallback_difficulty = bloom_to_difficulty(difficulty_level);
    let mut questions = Vec::with_capacity(items.len());
    for item in items {
        let content = item
            .get("question")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if content.is_empty() {
            warn!(session_id, "skipping generated question with empty content");
            continue;
        }
        let keywords = item
            .get("keywords")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let difficulty = item
            .get("difficulty")
            .and_then(|v| v.as_str())
            .filter(|d| is_valid_difficulty(d))
            .unwrap_or(fallback_difficulty)
            .to_string();
        questions.push(NewQuestion {
            session_id,
            content,
            keywords,
            difficulty,
            status: QuestionStatus::Draft,
        });
    }

    info!(session_id, count = questions.len(), "generated draft questions");
    Ok(questions)
}

/// Generate reference answers for a batch of questions, returning
/// `(question_id, reference_answer)` pairs.
///
/// Context is the material's first chunks in document order, budgeted at
/// `retrieval.max_chunks_per_question` per question; answer generation
/// wants representative text, not query-specific ranking. The model
/// reports a `question_index` per answer; indexes outside the batch are
/// dropped.
pub async fn generate_reference_answers(
    store: &dyn Store,
    llm: &dyn LlmClient,
    config: &Config,
    questions: &[Question],
    material_id: Option<i64>,
    course_name: Option<&str>,
) -> Result<Vec<(i64, String)>> {
    if questions.is_empty() {
        return Ok(Vec::new());
    }

    let context_budget = config
        .retrieval
        .max_chunks_per_question
        .saturating_mul(questions.len());
    let context: Vec<String> = match material_id {
        Some(material_id) => store
            .chunks_for_material(material_id)
            .await?
            .into_iter()
            .take(context_budget)
            .map(|c| c.chunk_text)
            .collect(),
        None => Vec::new(),
    };
    let context_refs: Vec<&str> = context.iter().map(String::as_str).collect();

    let prompt_questions: Vec<PromptQuestion<'_>> = questions
        .iter()
        .map(|q| PromptQuestion {
            question: &q.content,
            keywords: &q.keywords,
            difficulty: &q.difficulty,
        })
        .collect();

    let prompt = prompts::reference_answers(&prompt_questions, &context_refs, course_name);
    let response = generate_json(llm, &prompt, &config.llm).await?;

    let items = response
        .get("answers")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Generation {
            attempts: config.llm.max_retries,
            reason: "response missing answers array".into(),
        })?;

    let mut pairs = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let index = item
            .get("question_index")
            .and_then(|v| v.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let Some(question) = questions.get(index) else {
            warn!(index, batch = questions.len(), "dropping answer with out-of-range index");
            continue;
        };
        let answer = item
            .get("reference_answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        if answer.is_empty() {
            warn!(question_id = question.id, "dropping empty reference answer");
            continue;
        }
        pairs.push((question.id, answer));
    }

    info!(count = pairs.len(), batch = questions.len(), "generated reference answers");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::NewChunk;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedLlm {
        outputs: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedLlm {
        fn returning(json: &str) -> Self {
            Self {
                outputs: Mutex::new(VecDeque::from(vec![Ok(json.to_string())])),
            }
        }

        fn failing() -> Self {
            Self {
                outputs: Mutex::new(VecDeque::new()),
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

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.llm.base_delay_ms = 1;
        config
    }

    async fn store_with_material() -> (InMemoryStore, i64) {
        let store = InMemoryStore::new();
        let material = store.create_material("m", 1, false, None).await.unwrap();
        store
            .insert_chunks(&[NewChunk {
                material_id: material.id,
                chunk_index: 0,
                chunk_text: "transactions and isolation levels".into(),
                embedding: vec![1.0, 0.0],
                chapter: None,
                start_offset: 0,
                end_offset: 33,
            }])
            .await
            .unwrap();
        (store, material.id)
    }

    #[tokio::test]
    async fn parses_generated_questions() {
        let (store, material_id) = store_with_material().await;
        let llm = ScriptedLlm::returning(
            r#"{"questions":[
                {"question":"Explain isolation levels.","keywords":"isolation, acid","difficulty":"MEDIUM"},
                {"question":"When is serializable required?","keywords":"serializable","difficulty":"nonsense"}
            ]}"#,
        );
        let questions = generate_questions(
            &store,
            &FixedEmbedder,
            &llm,
            &fast_config(),
            7,
            Some(material_id),
            Some("Databases"),
            "APPLY",
            2,
        )
        .await
        .unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].session_id, 7);
        assert_eq!(questions[0].status, QuestionStatus::Draft);
        // Unknown difficulty label falls back to the Bloom mapping.
        assert_eq!(questions[1].difficulty, "MEDIUM");
    }

    #[tokio::test]
    async fn material_without_chunks_is_precondition_failure() {
        let store = InMemoryStore::new();
        let material = store.create_material("empty", 1, false, None).await.unwrap();
        let llm = ScriptedLlm::failing();
        let err = generate_questions(
            &store,
            &FixedEmbedder,
            &llm,
            &fast_config(),
            1,
            Some(material.id),
            None,
            "UNDERSTAND",
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[tokio::test]
    async fn exhausted_model_is_generation_error() {
        let (store, material_id) = store_with_material().await;
        let llm = ScriptedLlm::failing();
        let err = generate_questions(
            &store,
            &FixedEmbedder,
            &llm,
            &fast_config(),
            1,
            Some(material_id),
            None,
            "UNDERSTAND",
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
    }

    #[tokio::test]
    async fn out_of_range_answer_indexes_are_dropped() {
        let (store, material_id) = store_with_material().await;
        let question_ids = store
            .insert_questions(&[
                NewQuestion {
                    session_id: 1,
                    content: "q0".into(),
                    keywords: String::new(),
                    difficulty: "EASY".into(),
                    status: QuestionStatus::Approved,
                },
                NewQuestion {
                    session_id: 1,
                    content: "q1".into(),
                    keywords: String::new(),
                    difficulty: "EASY".into(),
                    status: QuestionStatus::Approved,
                },
            ])
            .await
            .unwrap();
        let questions = store.questions_by_ids(&question_ids).await.unwrap();
        let llm = ScriptedLlm::returning(
            r#"{"answers":[
                {"question_index":0,"reference_answer":"first"},
                {"question_index":5,"reference_answer":"phantom"},
                {"question_index":1,"reference_answer":"second"}
            ]}"#,
        );
        let pairs = generate_reference_answers(
            &store,
            &llm,
            &fast_config(),
            &questions,
            Some(material_id),
            None,
        )
        .await
        .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (question_ids[0], "first".to_string()));
        assert_eq!(pairs[1], (question_ids[1], "second".to_string()));
    }
}
