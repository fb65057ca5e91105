//! Word-embedding training and retrieval: vocabulary building, skip-gram with
//! negative sampling, a versioned binary model format, word2vec binary import
//! and cosine nearest-neighbour queries.

mod run;
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod sampling;
pub mod similarity;
pub mod store;
pub mod train;
pub mod vocab;

pub use run::Run;
pub use config::TrainConfig;
pub use corpus::{Corpus, LineCorpus};
pub use error::{Result, W2vError};
pub use model::Model;
pub use similarity::{most_similar, vector_of, Similarity, SimilarityResult};

/// Builds a vocabulary from `corpus` and trains a model with `config`.
pub fn train<C: Corpus>(corpus: &C, config: &TrainConfig) -> Result<Model> {
    Model::train(corpus, config)
}
