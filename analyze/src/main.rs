use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};

use abstract_topics::config::logger::ConfigLogger;
use abstract_topics::config::reader::ConfigReader;
use abstract_topics::config::Config;
use abstract_topics::diagnostics::{self, DiagnosticTable, DiagnosticsConfig, SearchConfig};
use abstract_topics::error::PipelineError;
use abstract_topics::inspect::{self, TopicInspector, TopicLabels};
use abstract_topics::lemma::AnnotationTable;
use abstract_topics::models::Record;
use abstract_topics::pipeline::{self, PreparedCorpus};
use abstract_topics::store;
use abstract_topics::sweep::Sweep;
use abstract_topics::topic_modeling::{CovariateEm, TopicModelFitter};

#[derive(Parser, Debug)]
#[command(version, about = "Topic model search over academic abstracts", long_about = None)]
struct Args {
    #[clap(short, long, default_value = "config.toml", help = "Path to the TOML configuration file")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter, clean and lemmatize records into a document-term matrix
    Prepare {
        #[clap(help = "JSON array of bibliographic records")]
        records: PathBuf,
        #[clap(short, long, help = "JSON lines of {doc_id, token, lemma, upos} annotations of the records")]
        annotations: PathBuf,
        #[clap(short, long, default_value = "prepared.json")]
        output: PathBuf,
    },
    /// Fit one model per topic count and compute diagnostics
    Search {
        prepared: PathBuf,
        #[clap(short, long, default_value = "diagnostics.json")]
        output: PathBuf,
    },
    /// Fit the selected topic count and write its summary tables
    Inspect {
        prepared: PathBuf,
        #[clap(short, long, help = "Overrides the configured topic count")]
        k: Option<usize>,
        #[clap(short, long, help = "Records used to flag documents citing seminal works")]
        records: Option<PathBuf>,
        #[clap(short, long, default_value = "inspection")]
        output_dir: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let config = match ConfigReader::read(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let level = LevelFilter::from_str(&config.logging.level).unwrap_or(LevelFilter::Info);
    if let Err(e) = ConfigLogger::init(level) {
        eprintln!("Error: cannot initialize logger: {}", e);
    }

    if let Err(e) = run(&config, args.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config, command: Command) -> Result<(), PipelineError> {
    match command {
        Command::Prepare {
            records,
            annotations,
            output,
        } => prepare(config, &records, &annotations, &output),
        Command::Search { prepared, output } => search(config, &prepared, &output),
        Command::Inspect {
            prepared,
            k,
            records,
            output_dir,
        } => inspect(
            config,
            &prepared,
            k.unwrap_or(config.inspect.selected_k),
            records.as_deref(),
            &output_dir,
        ),
    }
}

fn prepare(config: &Config, records: &Path, annotations: &Path, output: &Path) -> Result<(), PipelineError> {
    let records: Vec<Record> = store::read_json(records)?;
    info!("loaded {} records", records.len());

    let common_words = match &config.vocabulary.common_words_path {
        Some(path) => store::read_lines(path)?,
        None => Vec::new(),
    };

    let prepared = pipeline::prepare(records, config, &AnnotationTable::new(annotations), common_words)?;

    println!(
        "✅ Prepared {} documents x {} terms ({} documents emptied by the vocabulary)",
        prepared.dtm.n_docs(),
        prepared.dtm.n_terms(),
        prepared.report.dropped_documents.len()
    );

    store::write_json(output, &prepared)?;
    Ok(())
}

fn search(config: &Config, prepared: &Path, output: &Path) -> Result<(), PipelineError> {
    let prepared: PreparedCorpus = store::read_json(prepared)?;
    let sweep = Sweep::new(config.sweep.workers, config.sweep.seed)?;
    let fitter = CovariateEm::new(config.sweep.em_config());

    let search = SearchConfig {
        document_proportion: config.heldout.document_proportion,
        token_proportion: config.heldout.token_proportion,
        heldout_seed: config.heldout.seed,
        diagnostics: diagnostics_config(config),
    };

    let table: DiagnosticTable = diagnostics::search_k(
        &fitter,
        &sweep,
        &prepared.dtm,
        &prepared.covariates,
        &config.sweep.topic_counts(),
        &search,
    )?;

    table.print_summary();
    store::write_json(output, &table)?;
    Ok(())
}

fn inspect(
    config: &Config,
    prepared: &Path,
    k: usize,
    records: Option<&Path>,
    output_dir: &Path,
) -> Result<(), PipelineError> {
    let prepared: PreparedCorpus = store::read_json(prepared)?;
    let fitter = CovariateEm::new(config.sweep.em_config());

    info!("fitting selected model with K={}", k);
    let model = fitter.fit(&prepared.dtm, &prepared.covariates, k, config.sweep.seed)?;

    let labels = match &config.inspect.labels_path {
        Some(path) => store::read_labels(path)?,
        None => TopicLabels::default(),
    };

    let inspector = TopicInspector::new(&model, &prepared.dtm);
    let top_terms = inspector.top_terms(config.inspect.top_terms);
    inspector.print_summary(&top_terms, &labels);

    store::write_json(&output_dir.join("model.json"), &model)?;
    store::write_json(&output_dir.join("terms.json"), &inspector.term_table())?;
    store::write_json(&output_dir.join("documents.json"), &inspector.document_table())?;
    store::write_json(&output_dir.join("top_terms.json"), &top_terms)?;
    store::write_json(&output_dir.join("dominant_topics.json"), &inspector.dominant_topics())?;
    store::write_json(&output_dir.join("label_summary.json"), &inspector.label_summary(&labels))?;

    if let Some(path) = records {
        if config.inspect.seminal_works.is_empty() {
            info!("no seminal works configured, skipping citation cross-tab");
        } else {
            let records: Vec<Record> = store::read_json(path)?;
            let citing = inspect::seminal_membership(&records, &config.inspect.seminal_works);
            let crosstab = inspector.citation_crosstab(&citing, &labels);

            store::write_json(&output_dir.join("citing_documents.json"), &citing.iter().collect::<BTreeSet<_>>())?;
            store::write_json(&output_dir.join("citations.json"), &crosstab)?;
        }
    }

    println!("✅ Wrote inspection tables to {}", output_dir.display());
    Ok(())
}

fn diagnostics_config(config: &Config) -> DiagnosticsConfig {
    DiagnosticsConfig {
        top_terms: config.diagnostics.top_terms,
        frex_weight: config.diagnostics.frex_weight,
    }
}
