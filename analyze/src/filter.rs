use log::{debug, info};
use regex::{Regex, RegexBuilder};

use crate::error::FilterError;
use crate::models::{Concept, Record};

/// Case-insensitive keyword filter over titles and abstracts.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    pattern: Regex,
}

/// Restricts records to one document type and a controlled concept vocabulary.
#[derive(Debug, Clone)]
pub struct ConceptPolicy {
    pub document_type: String,
    pub allowed: Vec<String>,
    pub excluded: Vec<String>, // Only kept when it is a document's sole candidate
}

impl RelevanceFilter {
    /// Phrases are matched literally, patterns are taken as regular expressions.
    pub fn new(phrases: &[String], patterns: &[String]) -> Result<Self, FilterError> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|phrase| regex::escape(phrase))
            .chain(patterns.iter().cloned())
            .map(|alternative| format!("(?:{})", alternative))
            .collect();

        if alternatives.is_empty() {
            return Err(FilterError::NoPatterns);
        }

        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;

        debug!("compiled relevance filter with {} alternatives", alternatives.len());

        Ok(RelevanceFilter { pattern })
    }

    /// Missing fields count as no match.
    pub fn matches(&self, title: Option<&str>, abstract_text: Option<&str>) -> bool {
        [title, abstract_text]
            .into_iter()
            .flatten()
            .any(|field| self.pattern.is_match(field))
    }

    pub fn matches_record(&self, record: &Record) -> bool {
        self.matches(record.title.as_deref(), record.abstract_text().as_deref())
    }

    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let total = records.len();
        let kept: Vec<Record> = records
            .into_iter()
            .filter(|record| self.matches_record(record))
            .collect();

        info!("relevance filter kept {} of {} records", kept.len(), total);
        kept
    }
}

impl ConceptPolicy {
    /// Picks the main concept among a document's candidates.
    ///
    /// A sole candidate is always kept. Otherwise excluded concepts are
    /// dropped and the lowest specificity level wins, the first encountered
    /// one on ties.
    pub fn resolve_main_concept(&self, concepts: &[Concept]) -> Option<String> {
        if let [only] = concepts {
            return Some(only.name.clone());
        }

        let mut best: Option<&Concept> = None;
        for concept in concepts.iter().filter(|c| !self.is_excluded(&c.name)) {
            match best {
                Some(current) if current.level <= concept.level => {}
                _ => best = Some(concept),
            }
        }

        best.map(|concept| concept.name.clone())
    }

    pub fn is_allowed(&self, concept: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == concept)
    }

    fn is_excluded(&self, concept: &str) -> bool {
        self.excluded.iter().any(|excluded| excluded == concept)
    }

    pub fn has_document_type(&self, record: &Record) -> bool {
        record
            .document_type
            .as_deref()
            .map(|kind| kind.eq_ignore_ascii_case(&self.document_type))
            .unwrap_or(false)
    }

    /// Second filter stage. Returns each kept record with its resolved main
    /// concept.
    pub fn apply(&self, records: Vec<Record>) -> Vec<(Record, String)> {
        let total = records.len();
        let mut wrong_type = 0;
        let mut out_of_vocabulary = 0;

        let kept: Vec<(Record, String)> = records
            .into_iter()
            .filter_map(|record| {
                if !self.has_document_type(&record) {
                    wrong_type += 1;
                    return None;
                }

                match self.resolve_main_concept(&record.concepts) {
                    Some(concept) if self.is_allowed(&concept) => Some((record, concept)),
                    _ => {
                        out_of_vocabulary += 1;
                        None
                    }
                }
            })
            .collect();

        info!(
            "concept policy kept {} of {} records ({} wrong type, {} outside vocabulary)",
            kept.len(),
            total,
            wrong_type,
            out_of_vocabulary
        );

        kept
    }
}
