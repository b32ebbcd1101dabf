//! Similarity search over a material's chunks.
//!
//! Brute-force cosine ranking. Materials are bounded (hundreds of chunks),
//! so a linear scan beats the operational cost of a vector index.

use tracing::warn;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::ScoredChunk;
use crate::store::Store;

/// The `k` most similar chunks of a material for `query`, ranked by
/// descending cosine similarity with ties broken by lower chunk index.
///
/// A material with no chunks yields an empty list. When the query cannot
/// be embedded the function degrades to the first `k` chunks in document
/// order, all scored 0, rather than failing the caller's generation step.
pub async fn search_similar_chunks(
    store: &dyn Store,
    embedder: &dyn Embedder,
    material_id: i64,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    let chunks = store.chunks_for_material(material_id).await?;
    if chunks.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_embedding = match embedder.embed(query).await {
        Ok(embedding) => embedding,
        Err(err) => {
            warn!(
                material_id,
                error = %err,
                "query embedding failed, falling back to document-order sample"
            );
            return Ok(chunks
                .into_iter()
                .take(k)
                .map(|chunk| ScoredChunk {
                    chunk,
                    similarity: 0.0,
                })
                .collect());
        }
    };

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let similarity = cosine_similarity(&query_embedding, &chunk.embedding);
            ScoredChunk { chunk, similarity }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    scored.truncate(k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::NewChunk;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    /// Echoes a fixed embedding per recognized text, fails otherwise.
    struct StubEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dims(&self) -> usize {
            3
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(Error::Provider("stub embedder down".into()));
            }
            Ok(texts.iter().map(|t| text_vec(t)).collect())
        }
    }

    fn text_vec(text: &str) -> Vec<f32> {
        match text {
            "alpha" => vec![1.0, 0.0, 0.0],
            "beta" => vec![0.0, 1.0, 0.0],
            "mixed" => vec![0.7, 0.7, 0.0],
            _ => vec![0.0, 0.0, 1.0],
        }
    }

    async fn seeded_store() -> (InMemoryStore, i64) {
        let store = InMemoryStore::new();
        let material = store.create_material("m", 1, false, None).await.unwrap();
        let chunks: Vec<NewChunk> = ["alpha", "beta", "mixed"]
            .iter()
            .enumerate()
            .map(|(i, text)| NewChunk {
                material_id: material.id,
                chunk_index: i as i64,
                chunk_text: text.to_string(),
                embedding: text_vec(text),
                chapter: None,
                start_offset: 0,
                end_offset: 0,
            })
            .collect();
        store.insert_chunks(&chunks).await.unwrap();
        (store, material.id)
    }

    #[tokio::test]
    async fn ranks_by_similarity_descending() {
        let (store, material_id) = seeded_store().await;
        let embedder = StubEmbedder { fail: false };
        let hits = search_similar_chunks(&store, &embedder, material_id, "alpha", 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.chunk_text, "alpha");
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits[1].similarity >= hits[2].similarity);
    }

    #[tokio::test]
    async fn truncates_to_k() {
        let (store, material_id) = seeded_store().await;
        let embedder = StubEmbedder { fail: false };
        let hits = search_similar_chunks(&store, &embedder, material_id, "beta", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_text, "beta");
    }

    #[tokio::test]
    async fn empty_material_yields_empty() {
        let store = InMemoryStore::new();
        let material = store.create_material("m", 1, false, None).await.unwrap();
        let embedder = StubEmbedder { fail: false };
        let hits = search_similar_chunks(&store, &embedder, material.id, "alpha", 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn embed_failure_falls_back_to_document_order() {
        let (store, material_id) = seeded_store().await;
        let embedder = StubEmbedder { fail: true };
        let hits = search_similar_chunks(&store, &embedder, material_id, "alpha", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_index, 0);
        assert_eq!(hits[1].chunk.chunk_index, 1);
        assert!(hits.iter().all(|h| h.similarity == 0.0));
    }
}
