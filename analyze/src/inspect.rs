use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::topic_modeling::FittedModel;
use crate::vocabulary::DocumentTermMatrix;

// Topic numbers in every table below are 1-based, as in "Topic 1".

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermProbability {
    pub topic: usize,
    pub term: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProportion {
    pub document: u64,
    pub topic: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTerms {
    pub topic: usize,
    pub terms: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DominantTopic {
    pub document: u64,
    pub topic: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub label: String,
    pub documents: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRow {
    pub topic: usize,
    pub label: Option<String>,
    pub documents: usize,
    pub citing: usize,
    pub percent: f64,
}

/// Manually assigned topic categories, keyed `"Topic N" = "Category"`.
/// These change with every refit, so they live outside the code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicLabels {
    labels: BTreeMap<usize, String>,
}

pub const UNLABELED: &str = "Unlabeled";

pub struct TopicInspector<'a> {
    model: &'a FittedModel,
    dtm: &'a DocumentTermMatrix,
}

impl TopicLabels {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let raw: BTreeMap<String, String> = toml::from_str(text)?;
        let mut labels = BTreeMap::new();

        for (key, label) in raw {
            match key
                .strip_prefix("Topic")
                .and_then(|number| number.trim().parse::<usize>().ok())
            {
                Some(topic) => {
                    labels.insert(topic, label);
                }
                None => warn!("ignoring label key that names no topic: {}", key),
            }
        }

        Ok(TopicLabels { labels })
    }

    pub fn get(&self, topic: usize) -> Option<&str> {
        self.labels.get(&topic).map(|label| label.as_str())
    }

    pub fn insert(&mut self, topic: usize, label: &str) {
        self.labels.insert(topic, label.to_string());
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Documents whose references include any of the seminal works.
pub fn seminal_membership(records: &[Record], seminal_works: &[String]) -> HashSet<u64> {
    let seminal: HashSet<&str> = seminal_works.iter().map(|work| work.as_str()).collect();

    records
        .iter()
        .filter(|record| {
            record
                .referenced_works
                .iter()
                .any(|work| seminal.contains(work.as_str()))
        })
        .map(|record| record.id)
        .collect()
}

impl<'a> TopicInspector<'a> {
    /// `dtm` must be the matrix the model was fitted on, for its row labels.
    pub fn new(model: &'a FittedModel, dtm: &'a DocumentTermMatrix) -> Self {
        TopicInspector { model, dtm }
    }

    pub fn term_table(&self) -> Vec<TermProbability> {
        self.model
            .beta
            .iter()
            .enumerate()
            .flat_map(|(topic, row)| {
                row.iter()
                    .zip(self.dtm.terms())
                    .map(move |(&probability, term)| TermProbability {
                        topic: topic + 1,
                        term: term.clone(),
                        probability,
                    })
            })
            .collect()
    }

    pub fn document_table(&self) -> Vec<DocumentProportion> {
        self.model
            .theta
            .iter()
            .zip(self.dtm.doc_ids())
            .flat_map(|(shares, &document)| {
                shares
                    .iter()
                    .enumerate()
                    .map(move |(topic, &proportion)| DocumentProportion {
                        document,
                        topic: topic + 1,
                        proportion,
                    })
            })
            .collect()
    }

    /// The `n` most probable terms per topic; ties by term, ascending.
    pub fn top_terms(&self, n: usize) -> Vec<TopicTerms> {
        self.model
            .beta
            .iter()
            .enumerate()
            .map(|(topic, row)| {
                let mut terms: Vec<(String, f64)> = self
                    .dtm
                    .terms()
                    .iter()
                    .cloned()
                    .zip(row.iter().copied())
                    .collect();

                terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                terms.truncate(n);

                TopicTerms {
                    topic: topic + 1,
                    terms,
                }
            })
            .collect()
    }

    /// Highest-proportion topic of every document; ties go to the lowest
    /// topic number.
    pub fn dominant_topics(&self) -> Vec<DominantTopic> {
        self.model
            .theta
            .iter()
            .zip(self.dtm.doc_ids())
            .map(|(shares, &document)| {
                let (topic, proportion) = dominant(shares);
                DominantTopic {
                    document,
                    topic: topic + 1,
                    proportion,
                }
            })
            .collect()
    }

    /// Documents per label of their dominant topic, largest first.
    pub fn label_summary(&self, labels: &TopicLabels) -> Vec<LabelSummary> {
        let dominant = self.dominant_topics();
        let total = dominant.len().max(1) as f64;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for doc in &dominant {
            let label = labels.get(doc.topic).unwrap_or(UNLABELED);
            *counts.entry(label.to_string()).or_insert(0) += 1;
        }

        let mut summary: Vec<LabelSummary> = counts
            .into_iter()
            .map(|(label, documents)| LabelSummary {
                label,
                documents,
                share: documents as f64 / total,
            })
            .collect();

        summary.sort_by(|a, b| b.documents.cmp(&a.documents).then_with(|| a.label.cmp(&b.label)));
        summary
    }

    /// Share of each topic's documents that cite a seminal work.
    pub fn citation_crosstab(&self, citing: &HashSet<u64>, labels: &TopicLabels) -> Vec<CitationRow> {
        let mut rows: Vec<CitationRow> = (1..=self.model.k)
            .map(|topic| CitationRow {
                topic,
                label: labels.get(topic).map(|label| label.to_string()),
                documents: 0,
                citing: 0,
                percent: 0.0,
            })
            .collect();

        for doc in self.dominant_topics() {
            let row = &mut rows[doc.topic - 1];
            row.documents += 1;
            if citing.contains(&doc.document) {
                row.citing += 1;
            }
        }

        for row in rows.iter_mut() {
            if row.documents > 0 {
                row.percent = 100.0 * row.citing as f64 / row.documents as f64;
            }
        }

        rows
    }

    pub fn print_summary(&self, top: &[TopicTerms], labels: &TopicLabels) {
        println!("🎯 Topics for K={}", self.model.k);
        for topic in top {
            let words: Vec<&str> = topic.terms.iter().take(10).map(|(w, _)| w.as_str()).collect();
            println!(
                "   Topic {:<3} {:<24} {}",
                topic.topic,
                labels.get(topic.topic).unwrap_or(UNLABELED),
                words.join(", ")
            );
        }
    }
}

/// Index and value of the largest share, first one on ties.
fn dominant(shares: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (topic, &share) in shares.iter().enumerate() {
        if share.partial_cmp(&best.1) == Some(Ordering::Greater) {
            best = (topic, share);
        }
    }
    best
}
