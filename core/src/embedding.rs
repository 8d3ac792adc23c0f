//! # Embedding Module
//!
//! Embeddings are dense vector representations of text that capture semantic meaning. Similar
//! texts produce similar vectors, which is what the retrieval engine ranks on.
//!
//! The engine never talks to an embedding API directly. It depends on the narrow
//! [`EmbeddingModel`] interface defined here (text → vector), and calls it only on cache misses.
//!
//! ```rust
//! use recall_core::EmbeddingModel;
//!
//! async fn example<T: EmbeddingModel>(model: &T) -> recall_core::Result<()> {
//!     let dim = model.dim();
//!     let embedding = model.embed("Hello, world!").await?;
//!     assert_eq!(embedding.len(), dim);
//!
//!     let batch = model
//!         .embed_batch(&["first".into(), "second".into()])
//!         .await?;
//!     assert_eq!(batch.len(), 2);
//!     Ok(())
//! }
//! ```

use alloc::string::String;
use alloc::vec::Vec;
use core::future::Future;

/// Dense vector produced by an [`EmbeddingModel`].
pub type Embedding = Vec<f32>;

/// Turns text into fixed-length vectors whose cosine similarity tracks meaning.
///
/// # Contract
///
/// - [`embed`](EmbeddingModel::embed) must return vectors with length equal to [`dim`](EmbeddingModel::dim)
/// - [`embed_batch`](EmbeddingModel::embed_batch) returns one vector per input, in input order.
///   A provider that partially fails may return an empty vector for the failed inputs; callers
///   treat empty vectors as "no embedding" rather than as a hard error.
/// - [`model`](EmbeddingModel::model) should be stable across runs, it is hashed into cache keys.
///
/// # Example
///
/// ```rust
/// use recall_core::EmbeddingModel;
///
/// /// Hashes characters into a handful of buckets. Useful in tests, useless for search.
/// struct Buckets(usize);
///
/// impl EmbeddingModel for Buckets {
///     fn dim(&self) -> usize {
///         self.0
///     }
///
///     fn model(&self) -> &str {
///         "buckets-v1"
///     }
///
///     async fn embed(&self, text: &str) -> recall_core::Result<Vec<f32>> {
///         let mut vector = vec![0.0; self.0];
///         for ch in text.chars() {
///             vector[ch as usize % self.0] += 1.0;
///         }
///         Ok(vector)
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let vector = Buckets(8).embed("retrieval").await.unwrap();
/// assert_eq!(vector.len(), 8);
/// assert_eq!(vector.iter().sum::<f32>(), 9.0);
/// # });
/// ```
pub trait EmbeddingModel: Send + Sync {
    /// Length of every vector this model returns.
    ///
    /// A vector store only accepts models whose dimension matches its own.
    fn dim(&self) -> usize;

    /// Identifier of the underlying model.
    ///
    /// Two models with different identifiers never share cached vectors.
    fn model(&self) -> &str {
        "default"
    }

    /// Embeds one text: a query, a chunk, or a whole short document.
    fn embed(&self, text: &str) -> impl Future<Output = crate::Result<Vec<f32>>> + Send;

    /// Converts several texts to embedding vectors, one per input.
    ///
    /// The default implementation embeds each text in turn and stops at the first error.
    /// Providers with a native batch endpoint should override it.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = crate::Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed(text).await?);
            }
            Ok(vectors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    /// Fills each component with the text length plus its index, scaled down.
    struct LengthModel {
        dimension: usize,
    }

    impl EmbeddingModel for LengthModel {
        fn dim(&self) -> usize {
            self.dimension
        }

        #[allow(clippy::cast_precision_loss)]
        async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            Ok((0..self.dimension)
                .map(|i| (text.len() + i) as f32 / 100.0)
                .collect())
        }
    }

    struct FailingModel;

    impl EmbeddingModel for FailingModel {
        fn dim(&self) -> usize {
            2
        }

        async fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            if text == "bad" {
                anyhow::bail!("provider rejected input");
            }
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn vectors_have_model_dimension() {
        let vector = LengthModel { dimension: 4 }.embed("test").await.unwrap();

        assert_eq!(vector.len(), 4);
        assert!((vector[0] - 0.04).abs() < f32::EPSILON);
        assert!((vector[3] - 0.07).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn default_model_identifier() {
        assert_eq!(LengthModel { dimension: 2 }.model(), "default");
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let texts = vec!["a".to_string(), "abc".to_string()];
        let batch = LengthModel { dimension: 2 }.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 2);
        assert!((batch[0][0] - 0.01).abs() < f32::EPSILON);
        assert!((batch[1][0] - 0.03).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn batch_stops_at_first_error() {
        let texts = vec!["ok".to_string(), "bad".to_string(), "ok".to_string()];
        assert!(FailingModel.embed_batch(&texts).await.is_err());
    }
}
