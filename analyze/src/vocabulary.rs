use std::collections::{HashMap, HashSet};

use counter::Counter;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::VocabularyError;
use crate::text::stopwords;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\w+\b").expect("word pattern is valid");
}

/// Minimum global frequency a term needs to enter the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyThreshold {
    AtLeast(usize),
    MoreThan(usize),
}

pub struct VocabularyConfig {
    pub threshold: FrequencyThreshold,
    pub common_words: HashSet<String>, // Curated academic filler words
    pub reserved_stems: Vec<String>,   // Any token containing one of these is dropped
    pub extra_stopwords: HashSet<String>,
}

pub struct VocabularyBuilder {
    config: VocabularyConfig,
}

/// Sparse documents x terms count matrix.
///
/// Rows are labelled by document id and hold `(term index, count)` pairs in
/// ascending term order. Built matrices never contain an all-zero row or
/// column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTermMatrix {
    doc_ids: Vec<u64>,
    terms: Vec<String>,
    rows: Vec<Vec<(usize, u32)>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyReport {
    pub dropped_documents: Vec<u64>, // Lost every token during filtering
    pub kept_terms: usize,
    pub dropped_terms: usize,
}

impl FrequencyThreshold {
    pub fn admits(&self, frequency: usize) -> bool {
        match *self {
            FrequencyThreshold::AtLeast(minimum) => frequency >= minimum,
            FrequencyThreshold::MoreThan(minimum) => frequency > minimum,
        }
    }
}

impl VocabularyConfig {
    pub fn new(threshold: FrequencyThreshold) -> Self {
        VocabularyConfig {
            threshold,
            common_words: HashSet::new(),
            reserved_stems: Vec::new(),
            extra_stopwords: HashSet::new(),
        }
    }
}

impl VocabularyBuilder {
    pub fn new(config: VocabularyConfig) -> Self {
        VocabularyBuilder { config }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        WORD.find_iter(&text.to_lowercase())
            .map(|m| m.as_str())
            .filter(|word| self.is_kept_token(word))
            .map(|word| word.to_string())
            .collect()
    }

    fn is_kept_token(&self, word: &str) -> bool {
        !stopwords::is_stopword(word)
            && !self.config.extra_stopwords.contains(word)
            && !self.config.common_words.contains(word)
            && !self
                .config
                .reserved_stems
                .iter()
                .any(|stem| word.contains(stem.as_str()))
    }

    /// Global token frequencies across the given tokenized documents.
    pub fn term_frequencies(documents: &[Vec<String>]) -> Counter<String> {
        let mut frequencies: Counter<String> = Counter::new();

        for doc in documents {
            for word in doc {
                frequencies[word] += 1;
            }
        }

        frequencies
    }

    /// Terms whose frequency passes the threshold, alphabetically ordered.
    pub fn select_terms(&self, frequencies: &Counter<String>) -> Vec<String> {
        let mut terms: Vec<String> = frequencies
            .iter()
            .filter(|&(_, &count)| self.config.threshold.admits(count))
            .map(|(word, _)| word.clone())
            .collect();

        terms.sort();
        terms
    }

    /// Builds the matrix from `(document id, cleaned text)` pairs, in input
    /// order. Documents left without any vocabulary term are excluded and
    /// reported.
    pub fn build(
        &self,
        documents: &[(u64, String)],
    ) -> Result<(DocumentTermMatrix, VocabularyReport), VocabularyError> {
        // Step 1: Tokenize and drop excluded tokens
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|(_, text)| self.tokenize(text))
            .collect();

        // Step 2: Count and threshold
        let frequencies = Self::term_frequencies(&tokenized);
        let terms = self.select_terms(&frequencies);

        if terms.is_empty() {
            return Err(VocabularyError::EmptyVocabulary);
        }

        let term_index: HashMap<&str, usize> = terms
            .iter()
            .enumerate()
            .map(|(i, term)| (term.as_str(), i))
            .collect();

        // Step 3: Vectorize, skipping emptied documents
        let mut doc_ids = Vec::with_capacity(documents.len());
        let mut rows = Vec::with_capacity(documents.len());
        let mut report = VocabularyReport {
            kept_terms: terms.len(),
            dropped_terms: frequencies.len() - terms.len(),
            ..Default::default()
        };

        for ((id, _), tokens) in documents.iter().zip(&tokenized) {
            let mut counts: Counter<usize> = Counter::new();
            for token in tokens {
                if let Some(&index) = term_index.get(token.as_str()) {
                    counts[&index] += 1;
                }
            }

            if counts.is_empty() {
                report.dropped_documents.push(*id);
                continue;
            }

            let mut row: Vec<(usize, u32)> = counts
                .into_iter()
                .map(|(index, count)| (index, count as u32))
                .collect();
            row.sort_unstable();

            doc_ids.push(*id);
            rows.push(row);
        }

        if !report.dropped_documents.is_empty() {
            warn!(
                "{} documents lost every token and were excluded from the matrix",
                report.dropped_documents.len()
            );
        }

        info!(
            "built {} x {} document-term matrix ({} terms below threshold)",
            rows.len(),
            terms.len(),
            report.dropped_terms
        );

        Ok((DocumentTermMatrix { doc_ids, terms, rows }, report))
    }
}

impl DocumentTermMatrix {
    /// Assembles a matrix from parts, checking labels against the rows.
    pub fn from_rows(
        doc_ids: Vec<u64>,
        terms: Vec<String>,
        mut rows: Vec<Vec<(usize, u32)>>,
    ) -> Option<Self> {
        if doc_ids.len() != rows.len() {
            return None;
        }

        for row in rows.iter_mut() {
            row.retain(|&(_, count)| count > 0);
            row.sort_unstable();
            if row.iter().any(|&(index, _)| index >= terms.len()) {
                return None;
            }
        }

        Some(DocumentTermMatrix { doc_ids, terms, rows })
    }

    /// Same labels, other counts. Zero cells are dropped.
    pub(crate) fn with_rows(&self, mut rows: Vec<Vec<(usize, u32)>>) -> Self {
        for row in rows.iter_mut() {
            row.retain(|&(_, count)| count > 0);
        }

        DocumentTermMatrix {
            doc_ids: self.doc_ids.clone(),
            terms: self.terms.clone(),
            rows,
        }
    }

    pub fn n_docs(&self) -> usize {
        self.rows.len()
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn doc_ids(&self) -> &[u64] {
        &self.doc_ids
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn row(&self, doc: usize) -> &[(usize, u32)] {
        &self.rows[doc]
    }

    pub fn rows(&self) -> &[Vec<(usize, u32)>] {
        &self.rows
    }

    pub fn get(&self, doc: usize, term: usize) -> u32 {
        self.rows[doc]
            .binary_search_by_key(&term, |&(index, _)| index)
            .map(|position| self.rows[doc][position].1)
            .unwrap_or(0)
    }

    pub fn row_total(&self, doc: usize) -> u32 {
        self.rows[doc].iter().map(|&(_, count)| count).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.rows
            .iter()
            .flatten()
            .map(|&(_, count)| count as u64)
            .sum()
    }

    pub fn column_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.terms.len()];
        for &(index, count) in self.rows.iter().flatten() {
            totals[index] += count as u64;
        }
        totals
    }

    /// Number of documents containing each term.
    pub fn doc_frequencies(&self) -> Vec<usize> {
        let mut frequencies = vec![0usize; self.terms.len()];
        for &(index, _) in self.rows.iter().flatten() {
            frequencies[index] += 1;
        }
        frequencies
    }

    /// Number of documents containing both terms.
    pub fn co_doc_frequency(&self, a: usize, b: usize) -> usize {
        self.rows
            .iter()
            .filter(|row| {
                let has = |term| row.binary_search_by_key(&term, |&(index, _)| index).is_ok();
                has(a) && has(b)
            })
            .count()
    }

    pub fn has_empty_row_or_column(&self) -> bool {
        self.rows.iter().any(|row| row.is_empty())
            || self.column_totals().iter().any(|&total| total == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(threshold: FrequencyThreshold) -> VocabularyBuilder {
        let mut config = VocabularyConfig::new(threshold);
        config.common_words = ["study", "result"].iter().map(|w| w.to_string()).collect();
        config.reserved_stems = vec!["autonom".to_string()];
        VocabularyBuilder::new(config)
    }

    fn frequencies(pairs: &[(&str, usize)]) -> Counter<String> {
        let mut counter: Counter<String> = Counter::new();
        for &(word, count) in pairs {
            counter[&word.to_string()] += count;
        }
        counter
    }

    #[test]
    fn it_applies_strict_threshold() {
        let freq = frequencies(&[("a", 25), ("b", 19), ("c", 20)]);

        let terms = builder(FrequencyThreshold::MoreThan(20)).select_terms(&freq);

        assert_eq!(terms, vec!["a".to_string()]);
    }

    #[test]
    fn it_applies_inclusive_threshold() {
        let freq = frequencies(&[("a", 25), ("b", 19), ("c", 20)]);

        let terms = builder(FrequencyThreshold::AtLeast(5)).select_terms(&freq);

        assert_eq!(terms, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn it_drops_stopwords_common_words_and_reserved_stems() {
        let tokens = builder(FrequencyThreshold::AtLeast(1))
            .tokenize("The Study of Autonomy and autonomous Network use results");

        assert_eq!(
            tokens,
            vec!["network".to_string(), "use".to_string(), "results".to_string()]
        );
    }

    #[test]
    fn it_builds_sparse_matrix_without_empty_rows_or_columns() {
        let documents = vec![
            (10, "network user network".to_string()),
            (11, "the autonomy of study".to_string()),
            (12, "user platform".to_string()),
            (13, "platform network rare".to_string()),
        ];

        let (dtm, report) = builder(FrequencyThreshold::AtLeast(2))
            .build(&documents)
            .expect("vocabulary builds");

        assert_eq!(dtm.terms(), &["network", "platform", "user"]);
        assert_eq!(dtm.doc_ids(), &[10, 12, 13]);
        assert_eq!(report.dropped_documents, vec![11]);
        assert_eq!(report.kept_terms, 3);
        assert_eq!(report.dropped_terms, 1);
        assert_eq!(dtm.row(0), &[(0, 2), (2, 1)]);
        assert_eq!(dtm.get(2, 1), 1);
        assert_eq!(dtm.get(1, 0), 0);
        assert!(!dtm.has_empty_row_or_column());
    }

    #[test]
    fn it_fails_on_empty_vocabulary() {
        let documents = vec![(1, "the of and".to_string())];

        assert!(matches!(
            builder(FrequencyThreshold::AtLeast(1)).build(&documents),
            Err(VocabularyError::EmptyVocabulary)
        ));
    }

    #[test]
    fn it_computes_document_statistics() {
        let dtm = DocumentTermMatrix::from_rows(
            vec![1, 2, 3],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![vec![(0, 2), (1, 1)], vec![(1, 3)], vec![(0, 1), (1, 1), (2, 4)]],
        )
        .expect("valid rows");

        assert_eq!(dtm.row_total(2), 6);
        assert_eq!(dtm.total_tokens(), 12);
        assert_eq!(dtm.column_totals(), vec![3, 5, 4]);
        assert_eq!(dtm.doc_frequencies(), vec![2, 3, 1]);
        assert_eq!(dtm.co_doc_frequency(0, 1), 2);
        assert_eq!(dtm.co_doc_frequency(0, 2), 1);
    }

    #[test]
    fn it_rejects_mislabelled_rows() {
        assert!(DocumentTermMatrix::from_rows(vec![1], vec!["a".to_string()], vec![]).is_none());
        assert!(
            DocumentTermMatrix::from_rows(vec![1], vec!["a".to_string()], vec![vec![(3, 1)]])
                .is_none()
        );
    }
}
