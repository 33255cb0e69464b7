use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::LemmaError;

pub const COMMON_NOUN: &str = "NOUN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedToken {
    pub token: String,
    pub lemma: String,
    pub upos: String, // Universal part-of-speech tag
}

/// A pretrained tagging and lemmatization model.
pub trait Lemmatizer {
    /// Annotates every `(document id, text)` pair of the batch, in order. Any
    /// failure fails the whole batch.
    fn annotate(&self, documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError>;
}

/// Reduces each document to its space-joined common-noun lemmas, in token
/// order.
pub fn noun_lemmas<L: Lemmatizer + ?Sized>(
    lemmatizer: &L,
    documents: &[(u64, String)],
) -> Result<Vec<String>, LemmaError> {
    let annotated = lemmatizer.annotate(documents)?;

    if annotated.len() != documents.len() {
        return Err(LemmaError::LengthMismatch {
            expected: documents.len(),
            actual: annotated.len(),
        });
    }

    let lemmas: Vec<String> = annotated
        .iter()
        .map(|tokens| {
            tokens
                .iter()
                .filter(|token| token.upos == COMMON_NOUN)
                .map(|token| token.lemma.as_str())
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .collect();

    info!("lemmatized {} documents", lemmas.len());
    Ok(lemmas)
}

#[derive(Debug, Deserialize)]
struct AnnotationRow {
    doc_id: u64,
    #[serde(flatten)]
    token: AnnotatedToken,
}

/// Annotations produced ahead of time by the tagging model and stored as JSON
/// lines of `{doc_id, token, lemma, upos}`.
///
/// The table may cover more records than the batch, typically every raw
/// record before filtering; rows of other documents are ignored.
#[derive(Debug, Clone)]
pub struct AnnotationTable {
    path: PathBuf,
}

impl AnnotationTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AnnotationTable { path: path.into() }
    }

    fn load(&self) -> Result<HashMap<u64, Vec<AnnotatedToken>>, LemmaError> {
        let file = File::open(&self.path).map_err(|err| {
            LemmaError::Unavailable(format!("{}: {}", self.path.display(), err))
        })?;

        let mut by_document: HashMap<u64, Vec<AnnotatedToken>> = HashMap::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|err| LemmaError::Unavailable(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let row: AnnotationRow = serde_json::from_str(&line)
                .map_err(|source| LemmaError::Malformed { line: i + 1, source })?;
            by_document.entry(row.doc_id).or_default().push(row.token);
        }

        debug!(
            "loaded annotations for {} documents from {}",
            by_document.len(),
            self.path.display()
        );

        Ok(by_document)
    }
}

impl Lemmatizer for AnnotationTable {
    fn annotate(&self, documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError> {
        let mut by_document = self.load()?;

        let annotated = documents
            .iter()
            .map(|(id, text)| match by_document.remove(id) {
                Some(tokens) => Ok(tokens),
                // Nothing to tag in a blank text
                None if text.trim().is_empty() => Ok(Vec::new()),
                None => Err(LemmaError::MissingAnnotations(*id)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !by_document.is_empty() {
            debug!(
                "ignored annotations of {} documents outside the batch",
                by_document.len()
            );
        }

        Ok(annotated)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn token(token: &str, lemma: &str, upos: &str) -> AnnotatedToken {
        AnnotatedToken {
            token: token.to_string(),
            lemma: lemma.to_string(),
            upos: upos.to_string(),
        }
    }

    fn batch(ids: &[u64]) -> Vec<(u64, String)> {
        ids.iter().map(|&id| (id, format!("text {}", id))).collect()
    }

    struct FixedLemmatizer(Vec<Vec<AnnotatedToken>>);

    impl Lemmatizer for FixedLemmatizer {
        fn annotate(&self, _documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError> {
            Ok(self.0.clone())
        }
    }

    struct OfflineLemmatizer;

    impl Lemmatizer for OfflineLemmatizer {
        fn annotate(&self, _documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError> {
            Err(LemmaError::Unavailable("model not loaded".to_string()))
        }
    }

    fn table(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        for line in lines {
            writeln!(file, "{}", line).expect("write");
        }
        file
    }

    #[test]
    fn it_keeps_common_noun_lemmas_in_order() {
        let lemmatizer = FixedLemmatizer(vec![
            vec![
                token("Teenagers", "teenager", "NOUN"),
                token("use", "use", "VERB"),
                token("networks", "network", "NOUN"),
                token("Facebook", "Facebook", "PROPN"),
            ],
            vec![token("quickly", "quickly", "ADV")],
        ]);

        let lemmas = noun_lemmas(&lemmatizer, &batch(&[1, 2])).expect("lemmatization succeeds");

        assert_eq!(lemmas, vec!["teenager network".to_string(), String::new()]);
    }

    #[test]
    fn it_fails_whole_batch_when_unavailable() {
        assert!(matches!(
            noun_lemmas(&OfflineLemmatizer, &batch(&[1])),
            Err(LemmaError::Unavailable(_))
        ));
    }

    #[test]
    fn it_rejects_partial_output() {
        let lemmatizer = FixedLemmatizer(vec![vec![]]);

        assert!(matches!(
            noun_lemmas(&lemmatizer, &batch(&[1, 2])),
            Err(LemmaError::LengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn it_matches_annotations_by_document_id() {
        let file = table(&[
            r#"{"doc_id": 30, "token": "sites", "lemma": "site", "upos": "NOUN"}"#,
            "",
            r#"{"doc_id": 10, "token": "users", "lemma": "user", "upos": "NOUN"}"#,
            r#"{"doc_id": 10, "token": "post", "lemma": "post", "upos": "VERB"}"#,
            r#"{"doc_id": 20, "token": "apps", "lemma": "app", "upos": "NOUN"}"#,
        ]);

        let lemmas = noun_lemmas(&AnnotationTable::new(file.path()), &batch(&[30, 10]))
            .expect("table loads");

        assert_eq!(lemmas, vec!["site".to_string(), "user".to_string()]);
    }

    #[test]
    fn it_rejects_documents_without_annotations() {
        let file = table(&[r#"{"doc_id": 10, "token": "users", "lemma": "user", "upos": "NOUN"}"#]);
        let table = AnnotationTable::new(file.path());

        assert!(matches!(
            table.annotate(&batch(&[10, 11])),
            Err(LemmaError::MissingAnnotations(11))
        ));
        assert_eq!(
            table
                .annotate(&[(10, "users".to_string()), (12, "  ".to_string())])
                .expect("blank text needs no annotations")[1],
            Vec::<AnnotatedToken>::new()
        );
    }

    #[test]
    fn it_reports_malformed_lines() {
        let file = table(&[r#"{"doc_index": 0, "token": "users"}"#]);

        assert!(matches!(
            AnnotationTable::new(file.path()).annotate(&batch(&[0])),
            Err(LemmaError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn it_reports_missing_table_as_unavailable() {
        let table = AnnotationTable::new("/nonexistent/annotations.jsonl");

        assert!(matches!(
            table.annotate(&batch(&[1])),
            Err(LemmaError::Unavailable(_))
        ));
    }
}
