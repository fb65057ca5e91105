use crate::error::{Result, W2vError};
use crate::model::Model;

use ndarray::{prelude::*};
use std::cmp::Ordering;

/// `(token, cosine score)` pairs, best first.
pub type SimilarityResult = Vec<(String, f32)>;

// each row scaled to l2 norm 1, all-zero rows stay zero
pub(crate) fn normalize_rows(vectors: &Array2<f32>) -> Array2<f32> {
    let mut unit = vectors.to_owned();
    for mut row in unit.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|a| a / norm);
        }
    }
    unit
}

/// Cosine-similarity queries over a model's vectors.
///
/// The normalized rows are cached on the model, so building a `Similarity`
/// is cheap after the first one; all queries take `&self`, so one index can
/// serve many threads.
pub struct Similarity<'a> {
    model: &'a Model,
    unit: &'a Array2<f32>,
}

impl<'a> Similarity<'a> {

    pub fn new(model: &'a Model) -> Similarity<'a> {
        Self { model, unit: model.unit_vectors() }
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }

    fn id_of(&self, token: &str) -> Result<usize> {
        self.model.vocab().id_of(token).ok_or_else(|| W2vError::UnknownToken(token.to_string()))
    }

    // every token of `tokens` absent from the vocabulary, in query order, without repeats
    fn missing<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for token in tokens {
            let token = token.as_ref();
            if !self.model.contains(token) && !missing.iter().any(|m| m == token) {
                missing.push(token.to_string());
            }
        }
        missing
    }

    /// Raw vectors of `tokens`, in query order. Fails with `PartialMiss`
    /// naming every absent token, and then returns no vectors at all.
    pub fn vector_of<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Vec<(String, Array1<f32>)>> {

        let missing = self.missing(tokens);
        if !missing.is_empty() {
            return Err(W2vError::PartialMiss { missing })
        }

        tokens.iter().map(|token| {
            let id = self.id_of(token.as_ref())?;
            Ok((token.as_ref().to_string(), self.model.vectors().row(id).to_owned()))
        }).collect()
    }

    /// The `k` tokens closest to `token`, never including `token` itself.
    pub fn most_similar(&self, token: &str, k: usize) -> Result<SimilarityResult> {
        let id = self.id_of(token)?;
        Ok(self.rank(self.unit.row(id), k, &[id]))
    }

    /// The `k` tokens closest to an arbitrary query vector, skipping `exclude`.
    pub fn most_similar_to_vector(&self, vec: ArrayView1<f32>, k: usize, exclude: &[&str]) -> Result<SimilarityResult> {

        if vec.len() != self.unit.ncols() {
            return Err(W2vError::InvalidConfig(format!(
                "query vector has {} components, the model has {}", vec.len(), self.unit.ncols())))
        }

        let norm = vec.dot(&vec).sqrt();
        let query: Array1<f32> = if norm > 0.0 { vec.mapv(|a| a / norm) } else { vec.to_owned() };
        let exclude: Vec<usize> = exclude.iter().filter_map(|t| self.model.vocab().id_of(t)).collect();
        Ok(self.rank(query.view(), k, &exclude))
    }

    /// `b - a + c` over normalized vectors: "a is to b as c is to ?".
    pub fn analogy_vec(&self, inputs: [&str; 3]) -> Result<Array1<f32>> {

        let missing = self.missing(&inputs);
        if !missing.is_empty() {
            return Err(W2vError::PartialMiss { missing })
        }

        let row = |t: &str| self.id_of(t).map(|i| self.unit.row(i));
        Ok(&row(inputs[1])? - &row(inputs[0])? + &row(inputs[2])?)
    }

    /// Tokens answering the analogy, the three inputs excluded.
    pub fn analogy(&self, inputs: [&str; 3], k: usize) -> Result<SimilarityResult> {
        let analogy = self.analogy_vec(inputs)?;
        self.most_similar_to_vector(analogy.view(), k, &inputs)
    }

    fn rank(&self, query: ArrayView1<f32>, k: usize, exclude: &[usize]) -> SimilarityResult {

        let scores = self.unit.dot(&query);
        let mut indexed_scores: Vec<(usize, f32)> = scores.iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| !exclude.contains(i))
            .collect();

        // descending by score, ties by ascending id
        let order = |(i, s): &(usize, f32), (j, t): &(usize, f32)| -> Ordering { t.total_cmp(s).then(i.cmp(j)) };
        let k = k.min(indexed_scores.len());
        if k == 0 {
            return Vec::new()
        }
        if k < indexed_scores.len() {
            indexed_scores.select_nth_unstable_by(k - 1, order);
            indexed_scores.truncate(k);
        }
        indexed_scores.sort_by(order);

        let entries = self.model.vocab().entries();
        indexed_scores.into_iter()
            .map(|(i, score)| (entries[i].token.clone(), score.clamp(-1.0, 1.0)))
            .collect()
    }
}

/// Top-`k` cosine neighbours of `token` in `model`.
pub fn most_similar(model: &Model, token: &str, k: usize) -> Result<SimilarityResult> {
    Similarity::new(model).most_similar(token, k)
}

/// Raw vectors of `tokens`, or the full list of tokens `model` does not know.
pub fn vector_of<S: AsRef<str>>(model: &Model, tokens: &[S]) -> Result<Vec<(String, Array1<f32>)>> {
    Similarity::new(model).vector_of(tokens)
}


#[cfg(test)]
mod tests {

    use super::{most_similar, vector_of, Similarity};
    use crate::error::W2vError;
    use crate::model::Model;
    use crate::vocab::{Vocab, VocabEntry};
    use ndarray::{array, Array2};

    fn model(tokens: &[&str], vectors: Array2<f32>) -> Model {
        let entries = tokens.iter().enumerate()
            .map(|(i, t)| VocabEntry { token: t.to_string(), count: (100 - i) as u64 })
            .collect();
        Model::new(Vocab::from_entries(entries).unwrap(), vectors, None).unwrap()
    }

    fn circle_model(n: usize) -> Model {
        let tokens: Vec<String> = (0..n).map(|i| format!("w{}", i)).collect();
        let refs: Vec<&str> = tokens.iter().map(|t| t.as_str()).collect();
        let vectors = Array2::from_shape_fn((n, 3), |(i, j)| {
            let angle = i as f32 * 0.1;
            [angle.cos(), angle.sin(), 0.2][j] * (1.0 + i as f32)
        });
        model(&refs, vectors)
    }

    #[test]
    fn top_ten_excludes_query_and_is_sorted() {

        let model = circle_model(30);
        for token in ["w0", "w7", "w29"] {
            let result = most_similar(&model, token, 10).unwrap();
            assert_eq!(result.len(), 10);
            assert!(result.iter().all(|(t, _)| t != token));
            assert!(result.windows(2).all(|w| w[0].1 >= w[1].1));
            assert!(result.iter().all(|(_, s)| (-1.0..=1.0).contains(s)));
        }

        // neighbours on the circle come first
        let result = most_similar(&model, "w7", 2).unwrap();
        let names: Vec<&str> = result.iter().map(|(t, _)| t.as_str()).collect();
        assert!(names.contains(&"w6") && names.contains(&"w8"));
    }

    #[test]
    fn k_larger_than_vocab_and_zero() {

        let model = circle_model(4);
        assert_eq!(most_similar(&model, "w1", 10).unwrap().len(), 3);
        assert!(most_similar(&model, "w1", 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_ascending_id() {

        let model = model(&["q", "b", "a", "c"], array![[1.0, 0.0], [0.0, 1.0], [0.0, 2.0], [0.0, 1.0]]);
        let result = most_similar(&model, "q", 3).unwrap();
        let names: Vec<&str> = result.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn unknown_token_is_an_error() {

        let model = circle_model(5);
        match most_similar(&model, "噌吰", 10) {
            Err(W2vError::UnknownToken(t)) => assert_eq!(t, "噌吰"),
            other => panic!("expected UnknownToken, got {:?}", other)
        }
    }

    #[test]
    fn vector_of_reports_every_missing_token() {

        let model = circle_model(5);
        match vector_of(&model, &["w1", "b", "w3"]) {
            Err(W2vError::PartialMiss { missing }) => assert_eq!(missing, vec!["b".to_string()]),
            other => panic!("expected PartialMiss, got {:?}", other)
        }
        match vector_of(&model, &["x", "w1", "y", "x"]) {
            Err(W2vError::PartialMiss { missing }) => assert_eq!(missing, vec!["x".to_string(), "y".to_string()]),
            other => panic!("expected PartialMiss, got {:?}", other)
        }

        let found = vector_of(&model, &["w3", "w1"]).unwrap();
        assert_eq!(found[0].0, "w3");
        assert_eq!(found[0].1, model.vectors().row(3));
        assert_eq!(found[1].1, model.vectors().row(1));
    }

    #[test]
    fn analogy_finds_fourth_term() {

        let model = model(
            &["king", "queen", "man", "woman", "apple"],
            array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, -1.0, 0.0]],
        );
        let sim = Similarity::new(&model);
        // man is to king as woman is to ?
        let result = sim.analogy(["man", "king", "woman"], 1).unwrap();
        assert_eq!(result[0].0, "queen");

        assert!(matches!(sim.analogy(["man", "prince", "girl"], 1), Err(W2vError::PartialMiss { missing }) if missing.len() == 2));
        assert!(sim.most_similar_to_vector(array![1.0, 0.0].view(), 1, &[]).is_err());
    }

    #[test]
    fn zero_rows_score_zero() {

        let model = model(&["a", "z", "b"], array![[1.0, 0.0], [0.0, 0.0], [0.5, 0.5]]);
        let result = most_similar(&model, "a", 2).unwrap();
        assert_eq!(result[0].0, "b");
        assert_eq!(result[1], ("z".to_string(), 0.0));
    }

    #[test]
    fn concurrent_queries_share_one_index() {

        let model = circle_model(50);
        let sim = Similarity::new(&model);
        let expected = sim.most_similar("w10", 5).unwrap();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(sim.most_similar("w10", 5).unwrap(), expected));
            }
        });
    }
}
