// imports
use crate::error::{Result, W2vError};
use crate::vocab::Vocab;

use rand::Rng;

const UNIGRAM_POWER: f64 = 0.75;

/// Per-id tables derived from one vocabulary: the probability of keeping an
/// occurrence during subsampling, and the unigram^0.75 table negatives are
/// drawn from.
#[derive(Clone, Debug)]
pub struct SamplingTables {
    keep_prob: Vec<f32>,
    negative: Vec<u32>,
}

impl SamplingTables {

    pub fn build(vocab: &Vocab, subsample_threshold: f64, negative_table_size: usize) -> Result<SamplingTables> {

        if !subsample_threshold.is_finite() || subsample_threshold < 0.0 {
            return Err(W2vError::InvalidConfig(format!("subsample_threshold must be a finite non-negative number, got {}", subsample_threshold)))
        }
        if negative_table_size == 0 {
            return Err(W2vError::InvalidConfig("negative_table_size must be positive".to_string()))
        }
        if vocab.is_empty() {
            return Err(W2vError::InvalidConfig("cannot build sampling tables for an empty vocabulary".to_string()))
        }
        if vocab.len() > u32::MAX as usize {
            return Err(W2vError::InvalidConfig(format!("vocabulary of {} tokens exceeds the negative table id range", vocab.len())))
        }

        Ok(Self {
            keep_prob: SamplingTables::subsample_table(vocab, subsample_threshold),
            negative: SamplingTables::unigram_table(vocab, negative_table_size),
        })
    }

    fn subsample_table(vocab: &Vocab, threshold: f64) -> Vec<f32> {

        // threshold 0 turns subsampling off
        if threshold == 0.0 {
            return vec![1.0; vocab.len()]
        }

        let scaled = threshold * vocab.total_count() as f64;
        vocab.entries().iter().map(|entry| {
            let count = entry.count as f64;
            let keep = ((count / scaled).sqrt() + 1.0) * (scaled / count);
            keep.clamp(0.0, 1.0) as f32
        }).collect()
    }

    fn unigram_table(vocab: &Vocab, table_size: usize) -> Vec<u32> {

        // cumulative fill: id i owns a run of slots proportional to count_i ^ 0.75
        let powered: Vec<f64> = vocab.entries().iter().map(|e| (e.count as f64).powf(UNIGRAM_POWER)).collect();
        let norm: f64 = powered.iter().sum();
        let last = vocab.len() - 1;

        let mut table = Vec::with_capacity(table_size);
        let mut i = 0usize;
        let mut cumulative = powered[0] / norm;
        for a in 0..table_size {
            table.push(i as u32);
            if (a + 1) as f64 / table_size as f64 > cumulative && i < last {
                i += 1;
                cumulative += powered[i] / norm;
            }
        }
        table
    }

    pub fn keep_probability(&self, id: usize) -> f32 {
        self.keep_prob[id]
    }

    /// Whether one occurrence of `id` survives subsampling.
    pub fn should_keep<R: Rng>(&self, id: usize, rng: &mut R) -> bool {
        let keep = self.keep_prob[id];
        keep >= 1.0 || rng.gen::<f32>() <= keep
    }

    /// Draws a negative-sample id in O(1).
    pub fn draw<R: Rng>(&self, rng: &mut R) -> usize {
        self.negative[rng.gen_range(0..self.negative.len())] as usize
    }

    pub fn negative_table(&self) -> &[u32] {
        &self.negative
    }

    pub fn vocab_len(&self) -> usize {
        self.keep_prob.len()
    }
}


#[cfg(test)]
mod tests {

    use super::SamplingTables;
    use crate::error::W2vError;
    use crate::vocab::{Vocab, VocabEntry};
    use rand::{rngs::StdRng, SeedableRng};

    fn vocab(counts: &[u64]) -> Vocab {
        let entries = counts.iter().enumerate()
            .map(|(i, c)| VocabEntry { token: format!("t{}", i), count: *c })
            .collect();
        Vocab::from_entries(entries).unwrap()
    }

    #[test]
    fn frequent_tokens_are_down_weighted() {

        let vocab = vocab(&[10000, 100, 10, 1]);
        let tables = SamplingTables::build(&vocab, 1e-3, 1000).unwrap();

        // t * total = 10.111
        let scaled = 1e-3 * 10111.0;
        let expected = ((10000.0f64 / scaled).sqrt() + 1.0) * (scaled / 10000.0);
        assert!((tables.keep_probability(0) as f64 - expected).abs() < 1e-6);
        assert!(tables.keep_probability(0) < tables.keep_probability(1));
        assert_eq!(tables.keep_probability(2), 1.0);
        assert_eq!(tables.keep_probability(3), 1.0);
    }

    #[test]
    fn zero_threshold_keeps_everything() {

        let vocab = vocab(&[10000, 1]);
        let tables = SamplingTables::build(&vocab, 0.0, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert!((0..1000).all(|_| tables.should_keep(0, &mut rng)));
    }

    #[test]
    fn negative_table_follows_powered_unigram() {

        let counts = [1000u64, 500, 100, 10];
        let vocab = vocab(&counts);
        let size = 100_000;
        let tables = SamplingTables::build(&vocab, 0.0, size).unwrap();
        assert_eq!(tables.negative_table().len(), size);

        let powered: Vec<f64> = counts.iter().map(|c| (*c as f64).powf(0.75)).collect();
        let norm: f64 = powered.iter().sum();
        for (id, p) in powered.iter().enumerate() {
            let slots = tables.negative_table().iter().filter(|x| **x as usize == id).count();
            let share = slots as f64 / size as f64;
            assert!((share - p / norm).abs() < 0.01, "id {} share {} expected {}", id, share, p / norm);
        }
    }

    #[test]
    fn draws_are_reproducible_with_a_seed() {

        let vocab = vocab(&[50, 40, 30, 20, 10]);
        let tables = SamplingTables::build(&vocab, 1e-2, 1000).unwrap();

        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..200).map(|i| (tables.draw(&mut rng), tables.should_keep(i % 5, &mut rng))).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).iter().all(|(id, _)| *id < 5));
    }

    #[test]
    fn invalid_parameters() {

        let vocab = vocab(&[5]);
        assert!(matches!(SamplingTables::build(&vocab, -1.0, 10), Err(W2vError::InvalidConfig(_))));
        assert!(matches!(SamplingTables::build(&vocab, f64::NAN, 10), Err(W2vError::InvalidConfig(_))));
        assert!(matches!(SamplingTables::build(&vocab, 1e-3, 0), Err(W2vError::InvalidConfig(_))));
    }
}
