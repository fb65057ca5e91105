// imports
use crate::corpus::Corpus;
use crate::error::{Result, W2vError};

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VocabEntry {
    pub token: String,
    pub count: u64,
}

/// Token to id mapping, with ids dense in `0..len()` and ordered by
/// descending frequency (ties by first appearance in the corpus).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocab {
    entries: Vec<VocabEntry>,
    t2i: HashMap<String, usize>,
    total_count: u64,
}

impl Vocab {

    fn accumulate<C: Corpus>(corpus: &C) -> Vec<VocabEntry> {

        // exact counts, kept in first-seen order so the later stable sort breaks ties by appearance
        let mut token2pos: HashMap<&str, usize> = HashMap::new();
        let mut seen: Vec<VocabEntry> = Vec::new();
        for sequence in corpus.sentences() {
            for tok in sequence {
                match token2pos.get(tok.as_str()) {
                    Some(pos) => seen[*pos].count += 1,
                    None => {
                        token2pos.insert(tok.as_str(), seen.len());
                        seen.push(VocabEntry { token: tok.to_owned(), count: 1 });
                    }
                }
            }
        }
        seen
    }

    /// Counts every token of `corpus`, drops tokens seen fewer than
    /// `min_count` times and keeps at most `max_vocab_size` of the rest.
    pub fn build<C: Corpus>(corpus: &C, min_count: usize, max_vocab_size: Option<usize>) -> Result<Vocab> {

        let min_count = min_count.max(1);
        let mut entries: Vec<VocabEntry> = Vocab::accumulate(corpus)
            .into_iter()
            .filter(|entry| entry.count >= min_count as u64)
            .collect();

        entries.sort_by(|a, b| b.count.cmp(&a.count));
        if let Some(max_vocab_size) = max_vocab_size {
            entries.truncate(max_vocab_size);
        }

        if entries.is_empty() {
            return Err(W2vError::EmptyVocabulary { min_count })
        }

        Vocab::from_entries(entries)
    }

    /// Rebuilds a vocabulary whose ids are the positions of `entries`.
    pub fn from_entries(entries: Vec<VocabEntry>) -> Result<Vocab> {

        let mut t2i: HashMap<String, usize> = HashMap::with_capacity(entries.len());
        let mut total_count = 0u64;
        for (i, entry) in entries.iter().enumerate() {
            if t2i.insert(entry.token.clone(), i).is_some() {
                return Err(W2vError::CorruptModel(format!("duplicate token '{}' in vocabulary", entry.token)))
            }
            total_count += entry.count;
        }

        Ok(Vocab { entries, t2i, total_count })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the counts of retained tokens.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn id_of(&self, token: &str) -> Option<usize> {
        self.t2i.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.t2i.contains_key(token)
    }

    pub fn token_of(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.token.as_str())
    }

    pub fn count_of(&self, id: usize) -> Option<u64> {
        self.entries.get(id).map(|entry| entry.count)
    }

    pub fn entries(&self) -> &[VocabEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &VocabEntry)> {
        self.entries.iter().enumerate()
    }

    pub fn t2i(&self) -> &HashMap<String, usize> {
        &self.t2i
    }
}
