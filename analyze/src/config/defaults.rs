pub fn logging_level() -> String {
    "info".to_string()
}

pub fn filter_document_type() -> String {
    "article".to_string()
}

pub fn filter_phrases() -> Vec<String> {
    [
        "social media",
        "social networking",
        "social network site",
        "online social network",
        "facebook",
        "twitter",
        "instagram",
        "tiktok",
        "snapchat",
        "youtube",
        "whatsapp",
        "linkedin",
        "reddit",
    ]
    .iter()
    .map(|phrase| phrase.to_string())
    .collect()
}

pub fn filter_patterns() -> Vec<String> {
    vec![r"social\W+(?:\w+\W+){0,3}?network\w*\W+(?:\w+\W+){0,3}?sites?\b".to_string()]
}

pub fn filter_allowed_concepts() -> Vec<String> {
    [
        "Psychology",
        "Sociology",
        "Political science",
        "Philosophy",
        "Computer science",
        "Business",
        "Economics",
        "Medicine",
        "Autonomy",
    ]
    .iter()
    .map(|concept| concept.to_string())
    .collect()
}

pub fn filter_excluded_concepts() -> Vec<String> {
    vec!["Autonomy".to_string()]
}

pub fn vocabulary_min_term_frequency() -> usize {
    20
}

pub fn vocabulary_reserved_stems() -> Vec<String> {
    vec!["autonom".to_string()]
}

pub fn heldout_document_proportion() -> f64 {
    0.1
}

pub fn heldout_token_proportion() -> f64 {
    0.5
}

pub fn heldout_seed() -> u64 {
    8458159
}

pub fn sweep_k_min() -> usize {
    5
}

pub fn sweep_k_max() -> usize {
    100
}

pub fn sweep_seed() -> u64 {
    9934
}

pub fn sweep_workers() -> usize {
    4
}

pub fn sweep_max_iterations() -> usize {
    500
}

pub fn sweep_tolerance() -> f64 {
    1e-5
}

pub fn sweep_prior_concentration() -> f64 {
    1.0
}

pub fn sweep_term_smoothing() -> f64 {
    0.01
}

pub fn sweep_covariate_penalty() -> f64 {
    0.05
}

pub fn diagnostics_top_terms() -> usize {
    10
}

pub fn diagnostics_frex_weight() -> f64 {
    0.7
}

pub fn inspect_selected_k() -> usize {
    14
}

pub fn inspect_top_terms() -> usize {
    20
}
