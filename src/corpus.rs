// imports
use crate::error::Result;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

/// A restartable source of tokenized sentences.
///
/// Training reads the corpus once for counting and once per epoch, and shards
/// it by sentence index across workers, so random access is required.
pub trait Corpus: Sync {
    fn len(&self) -> usize;
    fn sentence(&self, idx: usize) -> &[String];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sentences(&self) -> Sentences<'_, Self> where Self: Sized {
        Sentences { corpus: self, next: 0 }
    }
}

pub struct Sentences<'a, C: Corpus> {
    corpus: &'a C,
    next: usize,
}

impl<'a, C: Corpus> Iterator for Sentences<'a, C> {
    type Item = &'a [String];

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.corpus.len() {
            return None
        }
        let sentence = self.corpus.sentence(self.next);
        self.next += 1;
        Some(sentence)
    }
}

impl Corpus for [Vec<String>] {
    fn len(&self) -> usize {
        <[Vec<String>]>::len(self)
    }
    fn sentence(&self, idx: usize) -> &[String] {
        &self[idx]
    }
}

impl Corpus for Vec<Vec<String>> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }
    fn sentence(&self, idx: usize) -> &[String] {
        &self[idx]
    }
}

// defines the behavior needed for tokenizing a corpus line
pub trait Tokenizer {
    fn tokenize(sequence: &str) -> Vec<String>;
}

/// Sentences read from a text file, one sentence per line, tokens separated
/// by whitespace. Empty lines are dropped.
#[derive(Clone, Debug, Default)]
pub struct LineCorpus {
    sequences: Vec<Vec<String>>,
}

impl LineCorpus {

    fn read_file(file_path: &Path) -> io::Result<Lines<BufReader<File>>> {
        let f = File::open(file_path)?;
        Ok(BufReader::new(f).lines())
    }

    fn accumulate(line: &str, sequences: &mut Vec<Vec<String>>) {
        let split_sequence = LineCorpus::tokenize(line.trim());
        if !split_sequence.is_empty() {
            sequences.push(split_sequence);
        }
    }

    pub fn read<P: AsRef<Path>>(file_path: P) -> Result<LineCorpus> {
        let mut sequences = Vec::new();
        for line in LineCorpus::read_file(file_path.as_ref())? {
            LineCorpus::accumulate(&line?, &mut sequences);
        }
        Ok(LineCorpus { sequences })
    }

    pub fn from_lines<I, S>(lines: I) -> LineCorpus
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sequences = Vec::new();
        for line in lines {
            LineCorpus::accumulate(line.as_ref(), &mut sequences);
        }
        LineCorpus { sequences }
    }

    pub fn token_count(&self) -> usize {
        self.sequences.iter().map(|s| s.len()).sum()
    }

    pub fn into_inner(self) -> Vec<Vec<String>> {
        self.sequences
    }
}

impl Tokenizer for LineCorpus {
    // simple tokenizer, split on any whitespace run
    fn tokenize(sequence: &str) -> Vec<String> {
        sequence.split_whitespace().map(|x| x.to_string()).collect()
    }
}

impl Corpus for LineCorpus {
    fn len(&self) -> usize {
        self.sequences.len()
    }
    fn sentence(&self, idx: usize) -> &[String] {
        &self.sequences[idx]
    }
}


#[cfg(test)]
mod tests {

    use super::{Corpus, LineCorpus};
    use std::io::Write;

    #[test]
    fn line_corpus_skips_blank_lines_and_extra_spaces() {

        let corpus = LineCorpus::from_lines(["  the cat  sat ", "", "   ", "dog\tran"]);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.sentence(0), &["the", "cat", "sat"]);
        assert_eq!(corpus.sentence(1), &["dog", "ran"]);
        assert_eq!(corpus.token_count(), 5);
    }

    #[test]
    fn line_corpus_reads_file_and_is_restartable() {

        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "北京 华为 向量").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "神经网络 矩阵").unwrap();
        f.flush().unwrap();

        let corpus = LineCorpus::read(f.path()).unwrap();
        let first: Vec<usize> = corpus.sentences().map(|s| s.len()).collect();
        let second: Vec<usize> = corpus.sentences().map(|s| s.len()).collect();
        assert_eq!(first, vec![3, 2]);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LineCorpus::read("does/not/exist.txt").unwrap_err();
        assert!(matches!(err, crate::error::W2vError::Io(_)));
    }
}
