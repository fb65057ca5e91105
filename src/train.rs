use crate::config::TrainConfig;
use crate::corpus::Corpus;
use crate::error::{Result, W2vError};
use crate::sampling::SamplingTables;
use crate::vocab::Vocab;

use ndarray::{Array, Array2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::ThreadPoolBuilder;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

// sigmoid saturates outside [-MAX_EXP, MAX_EXP]
const MAX_EXP: f32 = 6.0;
const MAX_NEGATIVE_RETRIES: usize = 8;
// learning rate never decays below this share of the initial rate
const LEARNING_RATE_FLOOR: f32 = 0.01;


/// Row-major f32 matrix that every worker reads and writes without locks.
///
/// Values are stored as `f32` bits in relaxed atomics: two workers updating
/// the same row can overwrite each other's increment (asynchronous SGD), but
/// no access is a data race in the language sense.
struct SharedMatrix {
    data: Vec<AtomicU32>,
    rows: usize,
    dim: usize,
}

impl SharedMatrix {

    fn from_array(arr: &Array2<f32>) -> Self {
        let (rows, dim) = arr.dim();
        Self {
            data: arr.iter().map(|x| AtomicU32::new(x.to_bits())).collect(),
            rows,
            dim,
        }
    }

    fn zeros(rows: usize, dim: usize) -> Self {
        Self {
            data: (0..rows * dim).map(|_| AtomicU32::new(0f32.to_bits())).collect(),
            rows,
            dim,
        }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f32 {
        f32::from_bits(self.data[row * self.dim + col].load(Ordering::Relaxed))
    }

    #[inline]
    fn add(&self, row: usize, col: usize, delta: f32) {
        let cell = &self.data[row * self.dim + col];
        let value = f32::from_bits(cell.load(Ordering::Relaxed)) + delta;
        cell.store(value.to_bits(), Ordering::Relaxed);
    }

    fn read_row(&self, row: usize, buf: &mut [f32]) {
        for (col, x) in buf.iter_mut().enumerate() {
            *x = self.get(row, col);
        }
    }

    fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.rows, self.dim), |(i, j)| self.get(i, j))
    }
}

#[inline]
fn sigmoid(f: f32) -> f32 {
    if f > MAX_EXP {
        1.0
    } else if f < -MAX_EXP {
        0.0
    } else {
        1.0 / (1.0 + (-f).exp())
    }
}

/// State passed to the epoch observer once all workers finished an epoch.
pub struct EpochProgress<'a> {
    pub epoch: usize,
    pub epochs: usize,
    pub words_processed: u64,
    pub learning_rate: f32,
    input: &'a SharedMatrix,
}

impl EpochProgress<'_> {
    /// Copy of the input vectors as they are at the end of this epoch.
    pub fn snapshot(&self) -> Array2<f32> {
        self.input.to_array()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainReport {
    pub epochs_completed: usize,
    pub words_processed: u64,
    pub final_learning_rate: f32,
    pub cancelled: bool,
}

/// Output of one training run: the input vector table plus how far the run got.
#[derive(Clone, Debug)]
pub struct Trained {
    pub vectors: Array2<f32>,
    pub report: TrainReport,
}

struct WorkerState {
    rng: StdRng,
    ids: Vec<usize>,
    l1: Vec<f32>,
    neu1e: Vec<f32>,
    epochs_done: usize,
}

impl WorkerState {
    fn new(seed: u64, dim: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ids: Vec::new(),
            l1: vec![0.0; dim],
            neu1e: vec![0.0; dim],
            epochs_done: 0,
        }
    }
}

// everything the workers share during one call to `train`
struct TrainingRun<'a, C: Corpus> {
    corpus: &'a C,
    vocab: &'a Vocab,
    tables: &'a SamplingTables,
    config: &'a TrainConfig,
    cancel: &'a AtomicBool,
    input: SharedMatrix,
    context: SharedMatrix,
    progress: AtomicU64,
    total_words: u64,
}

impl<'a, C: Corpus> TrainingRun<'a, C> {

    fn learning_rate(&self) -> f32 {
        let initial = self.config.initial_learning_rate;
        let processed = self.progress.load(Ordering::Relaxed) as f64;
        let decayed = initial as f64 * (1.0 - processed / (self.total_words as f64 + 1.0));
        (decayed as f32).max(initial * LEARNING_RATE_FLOOR)
    }

    fn draw_negative(&self, context: usize, rng: &mut StdRng) -> usize {
        let mut target = self.tables.draw(rng);
        let mut retries = 0;
        while target == context && retries < MAX_NEGATIVE_RETRIES {
            target = self.tables.draw(rng);
            retries += 1;
        }
        target
    }

    fn train_pair(&self, center: usize, context: usize, lr: f32, rng: &mut StdRng, l1: &mut [f32], neu1e: &mut [f32]) {

        self.input.read_row(center, l1);
        neu1e.iter_mut().for_each(|x| *x = 0.0);

        // target 0 is the observed context, the rest are negatives
        for d in 0..=self.config.negative {
            let (target, label) = if d == 0 {
                (context, 1.0)
            } else {
                (self.draw_negative(context, rng), 0.0)
            };

            let f: f32 = l1.iter().enumerate().map(|(k, x)| x * self.context.get(target, k)).sum();
            let g = (label - sigmoid(f)) * lr;
            for (k, x) in l1.iter().enumerate() {
                neu1e[k] += g * self.context.get(target, k);
                self.context.add(target, k, g * x);
            }
        }

        for (k, delta) in neu1e.iter().enumerate() {
            self.input.add(center, k, *delta);
        }
    }

    // returns the number of in-vocabulary tokens in the sentence
    fn train_sentence(&self, sentence: &[String], state: &mut WorkerState) -> u64 {

        let mut in_vocab = 0u64;
        state.ids.clear();
        for tok in sentence {
            if let Some(id) = self.vocab.id_of(tok) {
                in_vocab += 1;
                if self.tables.should_keep(id, &mut state.rng) {
                    state.ids.push(id);
                }
            }
        }

        let lr = self.learning_rate();
        let window = self.config.window;
        let n = state.ids.len();
        for i in 0..n {
            let center = state.ids[i];
            // dynamic window, nearer words are used more often
            let reach = window - state.rng.gen_range(0..window);
            let start = i.saturating_sub(reach);
            let end = (i + reach + 1).min(n);
            for j in start..end {
                if j == i {
                    continue
                }
                let context = state.ids[j];
                self.train_pair(center, context, lr, &mut state.rng, &mut state.l1, &mut state.neu1e);
            }
        }

        in_vocab
    }

    // one pass over a shard, false if cancelled before the end
    fn run_shard(&self, shard: Range<usize>, state: &mut WorkerState) -> bool {
        for idx in shard {
            if self.cancel.load(Ordering::Relaxed) {
                return false
            }
            let words = self.train_sentence(self.corpus.sentence(idx), state);
            self.progress.fetch_add(words, Ordering::Relaxed);
        }
        true
    }
}

// contiguous line ranges, one per worker
fn shards(n_sentences: usize, workers: usize) -> Vec<Range<usize>> {
    let chunk = (n_sentences + workers - 1) / workers;
    (0..workers)
        .map(|w| (w * chunk).min(n_sentences)..((w + 1) * chunk).min(n_sentences))
        .collect()
}

/// Skip-gram with negative sampling, trained by asynchronous SGD over a
/// fixed pool of workers.
pub struct EmbeddingTrainer {
    config: TrainConfig,
    cancel: Arc<AtomicBool>,
}

impl EmbeddingTrainer {

    pub fn new(config: TrainConfig) -> Self {
        Self { config, cancel: Arc::new(AtomicBool::new(false)) }
    }

    /// Uses `flag` for cooperative cancellation. Workers check it before every
    /// sentence and stop once it is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn train<C: Corpus>(&self, corpus: &C, vocab: &Vocab, tables: &SamplingTables) -> Result<Trained> {
        self.run(corpus, vocab, tables, None)
    }

    /// Like `train`, but workers meet at the end of every epoch and
    /// `observer` runs on the calling thread before the next epoch starts.
    pub fn train_with_observer<C: Corpus>(&self,
        corpus: &C,
        vocab: &Vocab,
        tables: &SamplingTables,
        observer: &mut dyn FnMut(&EpochProgress<'_>)) -> Result<Trained> {
        self.run(corpus, vocab, tables, Some(observer))
    }

    fn run<C: Corpus>(&self,
        corpus: &C,
        vocab: &Vocab,
        tables: &SamplingTables,
        observer: Option<&mut dyn FnMut(&EpochProgress<'_>)>) -> Result<Trained> {

        let config = &self.config;
        config.validate()?;
        if vocab.is_empty() {
            return Err(W2vError::InvalidConfig("cannot train on an empty vocabulary".to_string()))
        }
        if tables.vocab_len() != vocab.len() {
            return Err(W2vError::InvalidConfig(format!(
                "sampling tables cover {} ids but the vocabulary has {}", tables.vocab_len(), vocab.len())))
        }

        let pool = ThreadPoolBuilder::new().num_threads(config.worker_count).build()?;

        let dim = config.dimension;
        let mut init_rng = StdRng::seed_from_u64(config.seed);
        let half_width = 0.5 / dim as f32;
        let input: Array2<f32> = Array::random_using((vocab.len(), dim), Uniform::new(-half_width, half_width), &mut init_rng);

        let run = TrainingRun {
            corpus,
            vocab,
            tables,
            config,
            cancel: self.cancel.as_ref(),
            input: SharedMatrix::from_array(&input),
            context: SharedMatrix::zeros(vocab.len(), dim),
            progress: AtomicU64::new(0),
            total_words: config.epochs as u64 * vocab.total_count(),
        };

        let shards = shards(corpus.len(), config.worker_count);
        let mut states: Vec<WorkerState> = (0..config.worker_count)
            .map(|w| WorkerState::new(config.seed.wrapping_add(1 + w as u64), dim))
            .collect();
        let epochs = config.epochs;

        match observer {
            None => {
                // no epoch-level work requested, workers run all epochs independently
                pool.scope(|s| {
                    for (state, shard) in states.iter_mut().zip(&shards) {
                        let run = &run;
                        s.spawn(move |_| {
                            for _ in 0..epochs {
                                if !run.run_shard(shard.clone(), state) {
                                    return
                                }
                                state.epochs_done += 1;
                            }
                        });
                    }
                });
            },
            Some(observer) => {
                for epoch in 0..epochs {
                    pool.scope(|s| {
                        for (state, shard) in states.iter_mut().zip(&shards) {
                            let run = &run;
                            s.spawn(move |_| {
                                if run.run_shard(shard.clone(), state) {
                                    state.epochs_done += 1;
                                }
                            });
                        }
                    });

                    if states.iter().any(|state| state.epochs_done <= epoch) {
                        break
                    }
                    observer(&EpochProgress {
                        epoch: epoch + 1,
                        epochs,
                        words_processed: run.progress.load(Ordering::Relaxed),
                        learning_rate: run.learning_rate(),
                        input: &run.input,
                    });
                }
            }
        }

        let epochs_completed = states.iter().map(|state| state.epochs_done).min().unwrap_or(0);
        let report = TrainReport {
            epochs_completed,
            words_processed: run.progress.load(Ordering::Relaxed),
            final_learning_rate: run.learning_rate(),
            cancelled: epochs_completed < epochs,
        };

        Ok(Trained { vectors: run.input.to_array(), report })
    }
}
