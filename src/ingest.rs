//! Material ingestion: clean, chunk, embed, persist.
//!
//! Embedding calls are batched to the provider's batch size; chunk rows
//! go to the store in bounded insert batches. A failure partway through
//! aborts the remaining batches and surfaces the error, leaving the
//! material without a final chunk count so the caller can retry or
//! delete it.

use tracing::info;

use crate::chunking::chunk_material;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{Material, NewChunk};
use crate::store::Store;

/// Chunk rows per insert batch.
const INSERT_BATCH_SIZE: usize = 50;

/// Ingest one material's text end to end, returning the material with its
/// final chunk count.
pub async fn ingest_material(
    store: &dyn Store,
    embedder: &dyn Embedder,
    config: &Config,
    title: &str,
    uploaded_by: i64,
    is_public: bool,
    file_path: Option<&str>,
    text: &str,
) -> Result<Material> {
    let drafts = chunk_material(text, &config.chunking)?;
    let material = store
        .create_material(title, uploaded_by, is_public, file_path)
        .await?;

    let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(config.embedding.batch_size.max(1)) {
        let mut batch_embeddings = embedder.embed_batch(batch).await?;
        embeddings.append(&mut batch_embeddings);
    }

    let rows: Vec<NewChunk> = drafts
        .into_iter()
        .zip(embeddings)
        .map(|(draft, embedding)| NewChunk {
            material_id: material.id,
            chunk_index: draft.chunk_index,
            chunk_text: draft.text,
            embedding,
            chapter: draft.chapter,
            start_offset: draft.start_offset,
            end_offset: draft.end_offset,
        })
        .collect();

    for batch in rows.chunks(INSERT_BATCH_SIZE) {
        store.insert_chunks(batch).await?;
    }

    let num_chunks = rows.len() as i64;
    store
        .set_material_chunk_count(material.id, num_chunks)
        .await?;

    info!(
        material_id = material.id,
        num_chunks,
        model = embedder.model_name(),
        "ingested material"
    );

    let mut material = material;
    material.num_chunks = num_chunks;
    Ok(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct CountingEmbedder;

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Provider("embedding service down".into()))
        }
    }

    fn long_text() -> String {
        let mut text = String::new();
        for i in 0..120 {
            text.push_str(&format!("Sentence number {i} about transaction isolation. "));
        }
        text
    }

    #[tokio::test]
    async fn ingests_and_records_chunk_count() {
        let store = InMemoryStore::new();
        let config = Config::default();
        let material = ingest_material(
            &store,
            &CountingEmbedder,
            &config,
            "db notes",
            1,
            false,
            None,
            &long_text(),
        )
        .await
        .unwrap();

        assert!(material.num_chunks > 1);
        let chunks = store.chunks_for_material(material.id).await.unwrap();
        assert_eq!(chunks.len() as i64, material.num_chunks);
        // Indices are contiguous and every chunk carries an embedding.
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.embedding.len(), 2);
        }
        let stored = store.get_material(material.id).await.unwrap().unwrap();
        assert_eq!(stored.num_chunks, material.num_chunks);
    }

    #[tokio::test]
    async fn thin_material_is_rejected_before_insert() {
        let store = InMemoryStore::new();
        let config = Config::default();
        let err = ingest_material(
            &store,
            &CountingEmbedder,
            &config,
            "thin",
            1,
            false,
            None,
            "too short",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EmptyOrUnreadableSource(_)));
        assert!(store.list_materials().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_aborts_ingestion() {
        let store = InMemoryStore::new();
        let config = Config::default();
        let err = ingest_material(
            &store,
            &FailingEmbedder,
            &config,
            "db notes",
            1,
            false,
            None,
            &long_text(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        // Material row exists but carries no chunks and no final count.
        let materials = store.list_materials().await.unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].num_chunks, 0);
        assert!(store
            .chunks_for_material(materials[0].id)
            .await
            .unwrap()
            .is_empty());
    }
}
