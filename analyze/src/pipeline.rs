use std::collections::HashSet;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{LemmaError, PipelineError, VocabularyError};
use crate::filter::{ConceptPolicy, RelevanceFilter};
use crate::lemma::{self, Lemmatizer};
use crate::models::{Corpus, Covariates, Document, Record};
use crate::text;
use crate::topic_modeling::CovariateTable;
use crate::vocabulary::{DocumentTermMatrix, VocabularyBuilder, VocabularyConfig, VocabularyReport};

/// Everything the model search needs, in matching row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedCorpus {
    pub corpus: Corpus,
    pub dtm: DocumentTermMatrix,
    pub covariates: CovariateTable,
    pub report: VocabularyReport,
}

/// Reports covariate gaps when a stage hands its corpus over.
pub fn log_boundary(stage: &str, corpus: &Corpus) {
    let missing = corpus.missing_covariates();

    if missing.total() > 0 {
        warn!(
            "after {}: {} documents, {} missing year, {} missing main concept",
            stage,
            corpus.len(),
            missing.year,
            missing.main_concept
        );
    } else {
        info!("after {}: {} documents, no missing covariates", stage, corpus.len());
    }
}

/// Relevance and concept filtering of raw records into documents.
pub fn select(records: Vec<Record>, filter: &RelevanceFilter, policy: &ConceptPolicy) -> Corpus {
    let relevant = filter.apply(records);

    let documents = policy
        .apply(relevant)
        .into_iter()
        .map(|(record, main_concept)| {
            let raw_text = record.abstract_text().unwrap_or_default();
            Document {
                id: record.id,
                normalized_text: String::new(),
                lemmatized_text: String::new(),
                covariates: Covariates {
                    year: record.year(),
                    main_concept: Some(main_concept),
                    concepts: record.concepts.iter().map(|c| c.name.clone()).collect(),
                },
                raw_text,
            }
        })
        .collect();

    let corpus = Corpus::new(documents);
    log_boundary("selection", &corpus);
    corpus
}

pub fn normalize(corpus: Corpus) -> Corpus {
    let documents = corpus
        .documents
        .into_iter()
        .map(|doc| Document {
            normalized_text: text::normalize(&doc.raw_text),
            ..doc
        })
        .collect();

    let corpus = Corpus::new(documents);
    log_boundary("normalization", &corpus);
    corpus
}

/// Replaces each document's lemma text by its cleaned common-noun lemmas.
/// Fails as a whole when the lemmatizer does.
pub fn lemmatize<L: Lemmatizer + ?Sized>(corpus: Corpus, lemmatizer: &L) -> Result<Corpus, LemmaError> {
    let batch: Vec<(u64, String)> = corpus
        .documents
        .iter()
        .map(|doc| (doc.id, doc.normalized_text.clone()))
        .collect();
    let lemmas = lemma::noun_lemmas(lemmatizer, &batch)?;

    let documents = corpus
        .documents
        .into_iter()
        .zip(lemmas)
        .map(|(doc, lemmas)| Document {
            lemmatized_text: text::normalize(&lemmas),
            ..doc
        })
        .collect();

    let corpus = Corpus::new(documents);
    log_boundary("lemmatization", &corpus);
    Ok(corpus)
}

/// Builds the matrix and covariate table. Documents the vocabulary empties
/// leave the corpus too, so all three stay row-aligned.
pub fn vectorize(corpus: Corpus, builder: &VocabularyBuilder) -> Result<PreparedCorpus, VocabularyError> {
    let inputs: Vec<(u64, String)> = corpus
        .documents
        .iter()
        .map(|doc| (doc.id, doc.lemmatized_text.clone()))
        .collect();
    let (dtm, report) = builder.build(&inputs)?;

    let dropped: HashSet<u64> = report.dropped_documents.iter().copied().collect();
    let corpus = Corpus::new(
        corpus
            .documents
            .into_iter()
            .filter(|doc| !dropped.contains(&doc.id))
            .collect(),
    );
    log_boundary("vectorization", &corpus);

    let covariates = CovariateTable::align(&dtm, &corpus)?;

    Ok(PreparedCorpus {
        corpus,
        dtm,
        covariates,
        report,
    })
}

pub fn vocabulary_builder(config: &Config, common_words: Vec<String>) -> VocabularyBuilder {
    let vocabulary = &config.vocabulary;
    let mut settings = VocabularyConfig::new(vocabulary.frequency_threshold());

    settings.common_words = vocabulary
        .common_words
        .iter()
        .cloned()
        .chain(common_words)
        .map(|word| word.to_lowercase())
        .collect();
    settings.reserved_stems = vocabulary.reserved_stems.clone();

    VocabularyBuilder::new(settings)
}

/// Raw records to a prepared corpus, stage by stage.
pub fn prepare<L: Lemmatizer + ?Sized>(
    records: Vec<Record>,
    config: &Config,
    lemmatizer: &L,
    common_words: Vec<String>,
) -> Result<PreparedCorpus, PipelineError> {
    let filter = RelevanceFilter::new(&config.filter.phrases, &config.filter.patterns)?;
    let policy = ConceptPolicy {
        document_type: config.filter.document_type.clone(),
        allowed: config.filter.allowed_concepts.clone(),
        excluded: config.filter.excluded_concepts.clone(),
    };

    let corpus = select(records, &filter, &policy);
    let corpus = normalize(corpus);
    let corpus = lemmatize(corpus, lemmatizer)?;

    Ok(vectorize(corpus, &vocabulary_builder(config, common_words))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::lemma::{AnnotatedToken, AnnotationTable};
    use crate::models::Concept;

    /// Tags every word as a noun and lemmatizes by dropping a plural `s`.
    struct PluralStripper;

    impl Lemmatizer for PluralStripper {
        fn annotate(&self, documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError> {
            Ok(documents
                .iter()
                .map(|(_, text)| {
                    text.split_whitespace()
                        .map(|word| AnnotatedToken {
                            token: word.to_string(),
                            lemma: word.trim_end_matches('s').to_lowercase(),
                            upos: "NOUN".to_string(),
                        })
                        .collect()
                })
                .collect())
        }
    }

    struct Offline;

    impl Lemmatizer for Offline {
        fn annotate(&self, _documents: &[(u64, String)]) -> Result<Vec<Vec<AnnotatedToken>>, LemmaError> {
            Err(LemmaError::Unavailable("model not installed".to_string()))
        }
    }

    fn record(id: u64, abstract_text: &str, concept: &str, year: Option<i32>) -> Record {
        Record {
            id,
            title: Some("Social media study".to_string()),
            abstract_plain: Some(abstract_text.to_string()),
            abstract_inverted_index: None,
            document_type: Some("article".to_string()),
            publication_year: year,
            publication_date: None,
            concepts: vec![Concept {
                name: concept.to_string(),
                level: 0,
                score: 0.8,
            }],
            referenced_works: vec![],
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.vocabulary.min_term_frequency = 1;
        config
    }

    #[test]
    fn it_prepares_aligned_artifacts() {
        let records = vec![
            record(1, "Teens use apps, teens post #selfie photos 24/7", "Psychology", Some(2014)),
            record(2, "Apps and photos shape parents", "Sociology", Some(2018)),
            record(3, "The of and", "Psychology", Some(2019)),
            record(4, "Photos of dogs", "Geology", Some(2020)),
        ];

        let prepared = prepare(records, &config(), &PluralStripper, vec![]).expect("pipeline succeeds");

        assert_eq!(prepared.report.dropped_documents, vec![3]);
        assert_eq!(prepared.dtm.doc_ids(), &[1, 2]);
        assert_eq!(prepared.dtm.terms(), &["app", "photo", "teen"]);
        assert_eq!(prepared.covariates.doc_ids, vec![1, 2]);
        assert_eq!(prepared.covariates.years, vec![2014, 2018]);
        assert_eq!(prepared.corpus.len(), 2);
        assert_eq!(prepared.corpus.documents[0].normalized_text, "Teens use apps teens post photos");
    }

    #[test]
    fn it_fails_the_whole_batch_without_a_lemmatizer() {
        let records = vec![record(1, "Teens use apps", "Psychology", Some(2014))];

        let result = prepare(records, &config(), &Offline, vec![]);

        assert!(matches!(result, Err(PipelineError::Lemma(LemmaError::Unavailable(_)))));
    }

    #[test]
    fn it_rejects_documents_missing_covariates_at_alignment() {
        let records = vec![
            record(1, "Teens use apps", "Psychology", Some(2014)),
            record(2, "Parents use apps", "Sociology", None),
        ];

        let filter = RelevanceFilter::new(&["social media".to_string()], &[]).expect("valid filter");
        let policy = ConceptPolicy {
            document_type: "article".to_string(),
            allowed: vec!["Psychology".to_string(), "Sociology".to_string()],
            excluded: vec![],
        };

        let corpus = select(records, &filter, &policy);
        assert_eq!(corpus.missing_covariates().year, 1);

        let corpus = lemmatize(normalize(corpus), &PluralStripper).expect("lemmas");
        let result = vectorize(corpus, &vocabulary_builder(&config(), vec![]));

        assert!(matches!(result, Err(VocabularyError::IncompleteCovariates(1))));
    }

    #[test]
    fn it_lines_up_annotations_of_unfiltered_records() {
        let mut off_topic = record(1, "Soil samples", "Psychology", Some(2012));
        off_topic.title = Some("Soil chemistry".to_string());
        let records = vec![
            off_topic,
            record(2, "Parents and apps", "Sociology", Some(2016)),
            record(3, "Teens share photos", "Psychology", Some(2019)),
        ];

        let mut annotations = tempfile::NamedTempFile::new().expect("temp file");
        for (id, token, lemma) in [
            (1, "Soil", "soil"),
            (1, "samples", "sample"),
            (2, "Parents", "parent"),
            (2, "apps", "app"),
            (3, "Teens", "teen"),
            (3, "photos", "photo"),
        ] {
            writeln!(
                annotations,
                r#"{{"doc_id": {}, "token": "{}", "lemma": "{}", "upos": "NOUN"}}"#,
                id, token, lemma
            )
            .expect("write");
        }

        let filter = RelevanceFilter::new(&["social media".to_string()], &[]).expect("valid filter");
        let policy = ConceptPolicy {
            document_type: "article".to_string(),
            allowed: vec!["Psychology".to_string(), "Sociology".to_string()],
            excluded: vec![],
        };

        let corpus = normalize(select(records, &filter, &policy));
        let corpus = lemmatize(corpus, &AnnotationTable::new(annotations.path())).expect("lemmas");

        let lemmas: Vec<(u64, &str)> = corpus
            .documents
            .iter()
            .map(|doc| (doc.id, doc.lemmatized_text.as_str()))
            .collect();
        assert_eq!(lemmas, vec![(2, "parent app"), (3, "teen photo")]);
    }

    #[test]
    fn it_merges_common_words_from_config_and_file() {
        let mut config = config();
        config.vocabulary.common_words = vec!["Study".to_string()];

        let builder = vocabulary_builder(&config, vec!["research".to_string()]);

        assert_eq!(builder.tokenize("study research teen"), vec!["teen"]);
    }
}
