use crate::error::W2vError;
use crate::model::Model;
use crate::similarity::{Similarity, SimilarityResult};

/// Outcome of probing one test word.
#[derive(Debug)]
pub struct Probe {
    pub word: String,
    pub outcome: Result<SimilarityResult, W2vError>,
}

/// Runs `most_similar` for every test word against one shared index. A word
/// the model does not know yields an `UnknownToken` outcome and does not stop
/// the batch.
pub fn evaluate<S: AsRef<str>>(model: &Model, test_words: &[S], k: usize) -> Vec<Probe> {

    let similarity = Similarity::new(model);
    test_words.iter().map(|word| {
        let word = word.as_ref();
        Probe { word: word.to_string(), outcome: similarity.most_similar(word, k) }
    }).collect()
}
