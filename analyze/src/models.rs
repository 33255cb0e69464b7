use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Candidate topical concept attached to a bibliographic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    #[serde(alias = "display_name")]
    pub name: String,
    pub level: u32, // Specificity, 0 is the broadest
    #[serde(default)]
    pub score: f64, // Confidence
}

/// Raw record as fetched from the bibliographic service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_plain: Option<String>,
    #[serde(default)]
    pub abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    #[serde(default, rename = "type")]
    pub document_type: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub referenced_works: Vec<String>,
}

/// Document-level covariates used to condition topic prevalence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariates {
    pub year: Option<i32>,
    pub main_concept: Option<String>,
    pub concepts: Vec<String>, // All associated concepts, for reference
}

/// A surviving record after relevance filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub raw_text: String,
    pub normalized_text: String,
    pub lemmatized_text: String,
    pub covariates: Covariates,
}

/// Count of retained documents lacking a covariate value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCovariates {
    pub year: usize,
    pub main_concept: usize,
}

/// The document collection threaded through the pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub documents: Vec<Document>,
}

impl Record {
    /// Plain abstract text, rebuilding it from the inverted index when only
    /// that form is available.
    pub fn abstract_text(&self) -> Option<String> {
        if let Some(text) = &self.abstract_plain {
            return Some(text.clone());
        }

        let index = self.abstract_inverted_index.as_ref()?;
        let mut positioned: Vec<(usize, &str)> = index
            .iter()
            .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
            .collect();

        if positioned.is_empty() {
            return None;
        }

        positioned.sort();
        Some(
            positioned
                .into_iter()
                .map(|(_, word)| word)
                .collect::<Vec<&str>>()
                .join(" "),
        )
    }

    pub fn year(&self) -> Option<i32> {
        if self.publication_year.is_some() {
            return self.publication_year;
        }

        self.publication_date
            .as_deref()
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
            .map(|date| date.year())
    }
}

impl Covariates {
    pub fn is_complete(&self) -> bool {
        self.year.is_some() && self.main_concept.is_some()
    }
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Corpus { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn missing_covariates(&self) -> MissingCovariates {
        self.documents
            .iter()
            .fold(MissingCovariates::default(), |mut missing, doc| {
                if doc.covariates.year.is_none() {
                    missing.year += 1;
                }
                if doc.covariates.main_concept.is_none() {
                    missing.main_concept += 1;
                }
                missing
            })
    }
}

impl MissingCovariates {
    pub fn total(&self) -> usize {
        self.year + self.main_concept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record {
            id: 7,
            title: Some("Title".to_string()),
            abstract_plain: None,
            abstract_inverted_index: None,
            document_type: Some("article".to_string()),
            publication_year: None,
            publication_date: None,
            concepts: vec![],
            referenced_works: vec![],
        }
    }

    #[test]
    fn it_rebuilds_inverted_abstract() {
        let mut rec = record();
        rec.abstract_inverted_index = Some(HashMap::from([
            ("media".to_string(), vec![1]),
            ("social".to_string(), vec![0, 3]),
            ("and".to_string(), vec![2]),
        ]));

        assert_eq!(rec.abstract_text().as_deref(), Some("social media and social"));
    }

    #[test]
    fn it_prefers_plain_abstract() {
        let mut rec = record();
        rec.abstract_plain = Some("plain".to_string());
        rec.abstract_inverted_index = Some(HashMap::from([("other".to_string(), vec![0])]));

        assert_eq!(rec.abstract_text().as_deref(), Some("plain"));
    }

    #[test]
    fn it_falls_back_to_publication_date_year() {
        let mut rec = record();
        assert_eq!(rec.year(), None);

        rec.publication_date = Some("2019-04-02".to_string());
        assert_eq!(rec.year(), Some(2019));

        rec.publication_year = Some(2020);
        assert_eq!(rec.year(), Some(2020));
    }

    #[test]
    fn it_deserializes_service_fields() {
        let rec: Record = serde_json::from_str(
            r#"{"id": 3, "type": "article", "abstract": "Text",
                "concepts": [{"display_name": "Sociology", "level": 1, "score": 0.4}]}"#,
        )
        .expect("record parses");

        assert_eq!(rec.document_type.as_deref(), Some("article"));
        assert_eq!(rec.concepts[0].name, "Sociology");
        assert_eq!(rec.concepts[0].level, 1);
    }

    #[test]
    fn it_counts_missing_covariates() {
        let doc = |id, year: Option<i32>, concept: Option<&str>| Document {
            id,
            raw_text: String::new(),
            normalized_text: String::new(),
            lemmatized_text: String::new(),
            covariates: Covariates {
                year,
                main_concept: concept.map(|c| c.to_string()),
                concepts: vec![],
            },
        };
        let corpus = Corpus::new(vec![
            doc(1, Some(2010), Some("Psychology")),
            doc(2, None, Some("Psychology")),
            doc(3, None, None),
        ]);

        let missing = corpus.missing_covariates();
        assert_eq!(missing, MissingCovariates { year: 2, main_concept: 1 });
        assert_eq!(missing.total(), 3);
        let complete: Vec<bool> = corpus.documents.iter().map(|d| d.covariates.is_complete()).collect();
        assert_eq!(complete, vec![true, false, false]);
    }
}
