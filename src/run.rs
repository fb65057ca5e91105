use crate::config::{Config, RunConfig};
use crate::corpus::{Corpus, LineCorpus};
use crate::evaluate::{evaluate, Probe};
use crate::model::Model;
use crate::train::{EmbeddingTrainer, EpochProgress};

use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};


pub struct Run {}

impl Run {

    // runs the main procedure of 3 steps -
    // -> configuration of arguments
    // -> one training per (dimension, window) sweep point, each model saved
    // -> evaluation of the saved models (and of a pretrained file if given)

    pub fn run() -> Result<(), Box<dyn Error>> {

        info!("entering program...");
        let args: Vec<String> = env::args().collect();

        info!("building parameters...");
        let params = Config::new(&args)?.get_params();
        info!("{}", params);

        Run::run_with(&params)?;
        Ok(())
    }

    /// Trains, saves and evaluates every sweep point of `params`, returning
    /// the saved model paths.
    pub fn run_with(params: &RunConfig) -> Result<Vec<PathBuf>, Box<dyn Error>> {

        let timer = Instant::now();
        let corpus = LineCorpus::read(&params.corpus_file)?;
        info!(sentences = corpus.len(), tokens = corpus.token_count(), "loaded corpus, took {} ms", timer.elapsed().as_millis());

        fs::create_dir_all(&params.output_dir)?;

        let mut saved: Vec<PathBuf> = Vec::new();
        for (dimension, window) in &params.sweep {
            saved.push(Run::train_one(&corpus, params, *dimension, *window)?);
        }

        info!(test_words = ?params.test_words, "evaluating saved models");
        for path in &saved {
            let model = Model::load(path)?;
            if let Some(config) = model.hyperparameters() {
                info!("model parameter: dimension={}, window={}", config.dimension, config.window);
            }
            Run::log_probes(&evaluate(&model, &params.test_words, params.top_k));
        }

        if let Some(pretrained) = &params.pretrained_file {
            Run::evaluate_pretrained(pretrained, params)?;
        }

        Ok(saved)
    }

    fn train_one(corpus: &LineCorpus, params: &RunConfig, dimension: usize, window: usize) -> Result<PathBuf, Box<dyn Error>> {

        let train_config = params.train_config_for(dimension, window);
        info!(dimension, window, min_count = train_config.min_count, workers = train_config.worker_count, "starting training");

        let timer = Instant::now();
        let mut epoch_timer = Instant::now();
        let mut log_epoch = |progress: &EpochProgress<'_>| {
            info!(words = progress.words_processed, learning_rate = progress.learning_rate,
                "finished epoch {} / {}, took {} ms", progress.epoch, progress.epochs, epoch_timer.elapsed().as_millis());
            epoch_timer = Instant::now();
        };
        let (model, report) = Model::train_with(corpus, EmbeddingTrainer::new(train_config), Some(&mut log_epoch))?;
        info!(vocab_size = model.vocab().len(), words = report.words_processed,
            "finished training, took {} seconds", timer.elapsed().as_secs());

        // quick look at the first probe word, like the sweep did after every run
        if let Some(word) = params.test_words.first() {
            match model.most_similar(word, params.top_k) {
                Ok(similar) => info!("{}: {:?}", word, similar),
                Err(e) => warn!("{}", e)
            }
        }

        let path = params.model_path(dimension, window);
        model.save(&path)?;
        info!("'{}' saved", path.display());
        Ok(path)
    }

    fn evaluate_pretrained(path: &Path, params: &RunConfig) -> Result<(), Box<dyn Error>> {

        let timer = Instant::now();
        let model = Model::load_pretrained_binary(path)?;
        info!(vocab_size = model.vocab().len(), dimension = model.dimension(),
            "loaded pretrained vectors '{}', took {} ms", path.display(), timer.elapsed().as_millis());
        Run::log_probes(&evaluate(&model, &params.test_words, params.top_k));
        Ok(())
    }

    fn log_probes(probes: &[Probe]) {
        for probe in probes {
            match &probe.outcome {
                Ok(similar) => info!("{}: {:?}", probe.word, similar),
                Err(e) => warn!("{}", e)
            }
        }
    }
}


#[cfg(test)]
mod tests {

    use super::Run;
    use crate::config::{Config, TrainConfig};
    use crate::model::Model;
    use byteorder::{LittleEndian, WriteBytesExt};
    use serde_json::json;
    use std::fs;

    #[test]
    fn sweep_trains_saves_and_reloads() {

        let dir = tempfile::tempdir().unwrap();
        let corpus_file = dir.path().join("corpus.txt");
        fs::write(&corpus_file, "北京 是 首都\n华为 是 公司\n\n向量 和 矩阵\n北京 华为 向量\n").unwrap();

        // a tiny word2vec binary file for the pretrained step
        let pretrained_file = dir.path().join("pretrained.bin");
        let mut bin: Vec<u8> = b"2 2\n".to_vec();
        for (token, x) in [("北京", 1.0f32), ("向量", -1.0)] {
            bin.extend_from_slice(token.as_bytes());
            bin.push(b' ');
            bin.write_f32::<LittleEndian>(x).unwrap();
            bin.write_f32::<LittleEndian>(0.5).unwrap();
        }
        fs::write(&pretrained_file, bin).unwrap();

        let output_dir = dir.path().join("outputs");
        let params = Config::from_json(&json!({
            "corpus_file": corpus_file,
            "output_dir": output_dir,
            "pretrained_file": pretrained_file,
            "sweep": [[8, 2], [4, 3]],
            "test_words": ["北京", "噌吰"],
            "min_count": 1,
            "epochs": 2,
            "negative_table_size": 1000,
            "worker_count": 2
        })).unwrap().get_params();

        let saved = Run::run_with(&params).unwrap();
        assert_eq!(saved, vec![output_dir.join("word_vectors_s8_w2.w2v"), output_dir.join("word_vectors_s4_w3.w2v")]);

        let model = Model::load(&saved[1]).unwrap();
        assert_eq!(model.dimension(), 4);
        let expected = TrainConfig { dimension: 4, window: 3, ..params.train.clone() };
        assert_eq!(model.hyperparameters(), Some(&expected));
        assert!(model.contains("矩阵"));
    }

    #[test]
    fn missing_corpus_is_reported() {

        let dir = tempfile::tempdir().unwrap();
        let params = Config::from_json(&json!({
            "corpus_file": dir.path().join("nope.txt"),
            "output_dir": dir.path().join("out"),
        })).unwrap().get_params();
        assert!(Run::run_with(&params).is_err());
    }
}
