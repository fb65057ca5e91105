use crate::error::W2vError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt::Display, fs, path::PathBuf};

/// Training hyperparameters. Stored alongside the vectors of every trained model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dimension: usize,
    pub window: usize,
    pub min_count: usize,
    pub max_vocab_size: Option<usize>,
    pub negative: usize,
    pub epochs: usize,
    pub initial_learning_rate: f32,
    pub subsample_threshold: f64,
    pub negative_table_size: usize,
    pub worker_count: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dimension: 100,
            window: 10,
            min_count: 5,
            max_vocab_size: None,
            negative: 5,
            epochs: 5,
            initial_learning_rate: 0.025,
            subsample_threshold: 1e-3,
            negative_table_size: 10_000_000,
            worker_count: 4,
            seed: 1,
        }
    }
}

impl TrainConfig {

    /// Rejects settings the trainer cannot run with.
    pub fn validate(&self) -> Result<(), W2vError> {

        let invalid = |msg: &str| Err(W2vError::InvalidConfig(msg.to_string()));
        if self.dimension == 0 {
            return invalid("dimension must be positive")
        }
        if self.window == 0 {
            return invalid("window must be positive")
        }
        if self.negative == 0 {
            return invalid("negative must be positive")
        }
        if self.epochs == 0 {
            return invalid("epochs must be positive")
        }
        if self.worker_count == 0 {
            return invalid("worker_count must be positive")
        }
        if !self.initial_learning_rate.is_finite() || self.initial_learning_rate <= 0.0 {
            return invalid("initial_learning_rate must be a positive number")
        }
        if !self.subsample_threshold.is_finite() || self.subsample_threshold < 0.0 {
            return invalid("subsample_threshold must be a non-negative number")
        }
        if self.negative_table_size == 0 {
            return invalid("negative_table_size must be positive")
        }
        Ok(())
    }
}

impl Display for TrainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        dimension: {},
        window: {},
        min_count: {},
        max_vocab_size: {:?},
        negative: {},
        epochs: {},
        initial_learning_rate: {},
        subsample_threshold: {},
        negative_table_size: {},
        worker_count: {},
        seed: {}",
        self.dimension, self.window, self.min_count, self.max_vocab_size, self.negative, self.epochs,
        self.initial_learning_rate, self.subsample_threshold, self.negative_table_size, self.worker_count, self.seed
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("input should be a path to json file only")]
    Usage,

    #[error("cannot read json file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse json file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} was not supplied through json")]
    Missing(&'static str),

    #[error("given {key} is not {expected}")]
    WrongType { key: &'static str, expected: &'static str },

    #[error(transparent)]
    Invalid(#[from] W2vError),
}

/// Everything one driver run needs: where the corpus is, where models go,
/// which `(dimension, window)` pairs to train and which words to probe.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub corpus_file: PathBuf,
    pub output_dir: PathBuf,
    pub sweep: Vec<(usize, usize)>,
    pub test_words: Vec<String>,
    pub top_k: usize,
    pub pretrained_file: Option<PathBuf>,
    pub train: TrainConfig,
}

impl RunConfig {

    /// The trained configuration for one sweep point.
    pub fn train_config_for(&self, dimension: usize, window: usize) -> TrainConfig {
        TrainConfig { dimension, window, ..self.train.clone() }
    }

    pub fn model_path(&self, dimension: usize, window: usize) -> PathBuf {
        self.output_dir.join(format!("word_vectors_s{}_w{}.w2v", dimension, window))
    }
}

impl Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using hyper-params:
        corpus_file: {}
        output_dir: {}
        sweep: {:?}
        test_words: {:?}
        top_k: {}
        pretrained_file: {:?},
        Using {}",
        self.corpus_file.display(), self.output_dir.display(), self.sweep, self.test_words, self.top_k,
        self.pretrained_file, self.train)
    }
}

// the original tool's size/window grid
const DEFAULT_SWEEP: [(usize, usize); 6] = [(100, 5), (100, 10), (200, 5), (200, 10), (300, 5), (300, 10)];

fn get_usize(json: &Value, key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match json.get(key) {
        Some(v) => v.as_u64().map(|x| x as usize).ok_or(ConfigError::WrongType { key, expected: "a non-negative integer" }),
        None => Ok(default)
    }
}

fn get_f64(json: &Value, key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match json.get(key) {
        Some(v) => v.as_f64().ok_or(ConfigError::WrongType { key, expected: "numeric" }),
        None => Ok(default)
    }
}

fn get_str<'a>(json: &'a Value, key: &'static str) -> Result<Option<&'a str>, ConfigError> {
    match json.get(key) {
        Some(v) => v.as_str().map(Some).ok_or(ConfigError::WrongType { key, expected: "a string" }),
        None => Ok(None)
    }
}

pub struct Config {
    params: RunConfig
}

impl Config {

    pub fn get_params(&self) -> RunConfig {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config, ConfigError> {

        if args.len() != 2 {
            return Err(ConfigError::Usage);
        }

        let text = fs::read_to_string(&args[1])?;
        let json: Value = serde_json::from_str(&text)?;
        Config::from_json(&json)
    }

    pub fn from_json(json: &Value) -> Result<Config, ConfigError> {

        // required input and output locations
        let corpus_file = get_str(json, "corpus_file")?.ok_or(ConfigError::Missing("corpus_file"))?;
        let output_dir = get_str(json, "output_dir")?.ok_or(ConfigError::Missing("output_dir"))?;
        let pretrained_file = get_str(json, "pretrained_file")?.map(PathBuf::from);

        // handle default vs input parameters
        let defaults = TrainConfig::default();
        let max_vocab_size = match json.get("max_vocab_size") {
            Some(Value::Null) | None => None,
            Some(v) => Some(v.as_u64().ok_or(ConfigError::WrongType { key: "max_vocab_size", expected: "a non-negative integer" })? as usize)
        };
        let seed = match json.get("seed") {
            Some(v) => v.as_u64().ok_or(ConfigError::WrongType { key: "seed", expected: "a non-negative integer" })?,
            None => defaults.seed
        };

        let train = TrainConfig {
            dimension: get_usize(json, "dimension", defaults.dimension)?,
            window: get_usize(json, "window", defaults.window)?,
            min_count: get_usize(json, "min_count", defaults.min_count)?,
            max_vocab_size,
            negative: get_usize(json, "negative", defaults.negative)?,
            epochs: get_usize(json, "epochs", defaults.epochs)?,
            initial_learning_rate: get_f64(json, "initial_learning_rate", defaults.initial_learning_rate as f64)? as f32,
            subsample_threshold: get_f64(json, "subsample_threshold", defaults.subsample_threshold)?,
            negative_table_size: get_usize(json, "negative_table_size", defaults.negative_table_size)?,
            worker_count: get_usize(json, "worker_count", defaults.worker_count)?,
            seed,
        };

        let sweep = match json.get("sweep") {
            Some(v) => {
                let pairs = v.as_array().ok_or(ConfigError::WrongType { key: "sweep", expected: "a list of [dimension, window] pairs" })?;
                let mut sweep = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    match pair.as_array().map(|p| p.as_slice()) {
                        Some([d, w]) => match (d.as_u64(), w.as_u64()) {
                            (Some(d), Some(w)) => sweep.push((d as usize, w as usize)),
                            _ => return Err(ConfigError::WrongType { key: "sweep", expected: "a list of [dimension, window] pairs" })
                        },
                        _ => return Err(ConfigError::WrongType { key: "sweep", expected: "a list of [dimension, window] pairs" })
                    }
                }
                sweep
            },
            None => DEFAULT_SWEEP.to_vec()
        };

        let test_words = match json.get("test_words") {
            Some(v) => v.as_array()
                .and_then(|words| words.iter().map(|w| w.as_str().map(|s| s.to_owned())).collect::<Option<Vec<String>>>())
                .ok_or(ConfigError::WrongType { key: "test_words", expected: "a list of strings" })?,
            None => Vec::new()
        };

        let params = RunConfig {
            corpus_file: PathBuf::from(corpus_file),
            output_dir: PathBuf::from(output_dir),
            sweep,
            test_words,
            top_k: get_usize(json, "top_k", 10)?,
            pretrained_file,
            train,
        };

        // every sweep point must be trainable
        for (dimension, window) in &params.sweep {
            params.train_config_for(*dimension, *window).validate()?;
        }

        Ok(Self { params })
    }
}
