use crate::config::TrainConfig;
use crate::corpus::Corpus;
use crate::error::{Result, W2vError};
use crate::sampling::SamplingTables;
use crate::similarity::{self, Similarity, SimilarityResult};
use crate::store;
use crate::train::{EmbeddingTrainer, EpochProgress, TrainReport};
use crate::vocab::Vocab;

use ndarray::{Array1, Array2, ArrayView1};
use std::path::Path;
use std::sync::OnceLock;

/// A trained (or imported) embedding: vocabulary, one vector per vocabulary
/// id, and the hyperparameters it was trained with. Imported pretrained
/// models carry no hyperparameters and cannot be trained further.
#[derive(Clone, Debug)]
pub struct Model {
    vocab: Vocab,
    vectors: Array2<f32>,
    hyperparameters: Option<TrainConfig>,
    // unit-normalized rows, built on the first similarity query
    unit: OnceLock<Array2<f32>>,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.vocab == other.vocab && self.vectors == other.vectors && self.hyperparameters == other.hyperparameters
    }
}

impl Model {

    pub fn new(vocab: Vocab, vectors: Array2<f32>, hyperparameters: Option<TrainConfig>) -> Result<Model> {
        if vectors.nrows() != vocab.len() {
            return Err(W2vError::InvalidConfig(format!(
                "{} vectors for a vocabulary of {} tokens", vectors.nrows(), vocab.len())))
        }
        if let Some(config) = &hyperparameters {
            if config.dimension != vectors.ncols() {
                return Err(W2vError::InvalidConfig(format!(
                    "vectors have {} columns but the configured dimension is {}", vectors.ncols(), config.dimension)))
            }
        }
        Ok(Self { vocab, vectors, hyperparameters, unit: OnceLock::new() })
    }

    /// Builds the vocabulary and sampling tables from `corpus` and trains a model.
    pub fn train<C: Corpus>(corpus: &C, config: &TrainConfig) -> Result<Model> {
        Model::train_with(corpus, EmbeddingTrainer::new(config.clone()), None).map(|(model, _)| model)
    }

    /// Full-control variant of `train`: takes a prepared trainer (e.g. with a
    /// cancel flag) and an optional epoch observer, and also returns the report.
    pub fn train_with<C: Corpus>(corpus: &C,
        trainer: EmbeddingTrainer,
        observer: Option<&mut dyn FnMut(&EpochProgress<'_>)>) -> Result<(Model, TrainReport)> {

        let config = trainer.config().clone();
        config.validate()?;
        let vocab = Vocab::build(corpus, config.min_count, config.max_vocab_size)?;
        let tables = SamplingTables::build(&vocab, config.subsample_threshold, config.negative_table_size)?;
        let trained = match observer {
            Some(observer) => trainer.train_with_observer(corpus, &vocab, &tables, observer)?,
            None => trainer.train(corpus, &vocab, &tables)?
        };

        Ok((Model { vocab, vectors: trained.vectors, hyperparameters: Some(config), unit: OnceLock::new() }, trained.report))
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn hyperparameters(&self) -> Option<&TrainConfig> {
        self.hyperparameters.as_ref()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Pretrained imports are read-only: they have no training history.
    pub fn is_pretrained(&self) -> bool {
        self.hyperparameters.is_none()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.vocab.contains(token)
    }

    pub fn row(&self, token: &str) -> Option<ArrayView1<'_, f32>> {
        self.vocab.id_of(token).map(|i| self.vectors.row(i))
    }

    /// Rows scaled to unit length, computed once per model and shared by
    /// every `Similarity` built on it.
    pub fn unit_vectors(&self) -> &Array2<f32> {
        self.unit.get_or_init(|| similarity::normalize_rows(&self.vectors))
    }

    pub fn similarity(&self) -> Similarity<'_> {
        Similarity::new(self)
    }

    pub fn most_similar(&self, token: &str, k: usize) -> Result<SimilarityResult> {
        self.similarity().most_similar(token, k)
    }

    pub fn vector_of<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<(String, Array1<f32>)>> {
        self.similarity().vector_of(tokens)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        store::save(self, path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
        store::load(path)
    }

    pub fn load_pretrained_binary<P: AsRef<Path>>(path: P) -> Result<Model> {
        store::load_pretrained_binary(path)
    }
}


#[cfg(test)]
mod tests {

    use super::Model;
    use crate::config::TrainConfig;
    use crate::error::W2vError;
    use crate::train::{EmbeddingTrainer, EpochProgress};
    use crate::vocab::{Vocab, VocabEntry};
    use ndarray::Array2;

    fn config() -> TrainConfig {
        TrainConfig {
            dimension: 6,
            window: 3,
            min_count: 2,
            epochs: 3,
            negative_table_size: 1000,
            worker_count: 2,
            ..TrainConfig::default()
        }
    }

    fn sentences() -> Vec<Vec<String>> {
        ["a b c a b", "b c d a", "e a b c"].iter()
            .map(|l| l.split(' ').map(|x| x.to_string()).collect())
            .collect()
    }

    #[test]
    fn train_builds_vocab_and_keeps_hyperparameters() {

        let model = Model::train(&sentences(), &config()).unwrap();
        // d and e fall below min_count
        assert_eq!(model.vocab().len(), 3);
        assert!(!model.contains("d"));
        assert_eq!(model.vectors().dim(), (3, 6));
        assert_eq!(model.hyperparameters(), Some(&config()));
        assert!(!model.is_pretrained());
        assert_eq!(model.row("a").unwrap().len(), 6);
    }

    #[test]
    fn train_reports_typed_failures() {

        let err = Model::train(&sentences(), &TrainConfig { min_count: 10, ..config() }).unwrap_err();
        assert!(matches!(err, W2vError::EmptyVocabulary { min_count: 10 }));

        let err = Model::train(&sentences(), &TrainConfig { dimension: 0, ..config() }).unwrap_err();
        assert!(matches!(err, W2vError::InvalidConfig(_)));
    }

    #[test]
    fn train_with_observer_returns_report() {

        let mut epochs = 0;
        let mut count_epochs = |_: &EpochProgress<'_>| epochs += 1;
        let (model, report) = Model::train_with(&sentences(), EmbeddingTrainer::new(config()), Some(&mut count_epochs)).unwrap();
        assert_eq!(epochs, 3);
        assert_eq!(report.epochs_completed, 3);
        assert_eq!(report.words_processed, 3 * model.vocab().total_count());
    }

    #[test]
    fn repeated_queries_share_one_normalized_table() {

        let model = Model::train(&sentences(), &config()).unwrap();
        let first = model.unit_vectors() as *const Array2<f32>;
        let expected = model.most_similar("a", 2).unwrap();
        assert_eq!(model.most_similar("a", 2).unwrap(), expected);
        assert_eq!(model.vector_of(&["b"]).unwrap()[0].1, model.vectors().row(1));
        assert!(std::ptr::eq(first, model.unit_vectors()));
        assert!(std::ptr::eq(model.similarity().model().unit_vectors(), model.unit_vectors()));

        // a clone compares equal whether or not its table was built
        let fresh = Model::new(model.vocab().clone(), model.vectors().clone(), model.hyperparameters().cloned()).unwrap();
        assert_eq!(fresh, model);
        for row in model.unit_vectors().rows() {
            assert!((row.dot(&row).sqrt() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn new_checks_shapes() {

        let vocab = Vocab::from_entries(vec![VocabEntry { token: "x".to_string(), count: 1 }]).unwrap();
        assert!(Model::new(vocab.clone(), Array2::zeros((2, 4)), None).is_err());
        assert!(Model::new(vocab.clone(), Array2::zeros((1, 4)), Some(config())).is_err());
        assert!(Model::new(vocab, Array2::zeros((1, 4)), None).unwrap().is_pretrained());
    }
}
