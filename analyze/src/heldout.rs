use log::info;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::topic_modeling::FittedModel;
use crate::vocabulary::DocumentTermMatrix;

/// Token counts masked out of one matrix row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldoutDocument {
    pub row: usize,
    pub entries: Vec<(usize, u32)>, // (term index, masked count)
}

/// A training matrix with some token occurrences masked out, shared by
/// every topic count so heldout scores stay comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldoutSplit {
    pub training: DocumentTermMatrix,
    pub documents: Vec<HeldoutDocument>,
}

impl HeldoutSplit {
    /// Masks `floor(token_proportion * N_d)` tokens in each of
    /// `floor(document_proportion * D)` randomly chosen documents.
    ///
    /// The last training occurrence of a term is never masked, so the
    /// training matrix keeps every column. Rows keep at least one token.
    pub fn make(
        dtm: &DocumentTermMatrix,
        document_proportion: f64,
        token_proportion: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_docs = dtm.n_docs();
        let n_heldout = ((document_proportion * n_docs as f64).floor() as usize).min(n_docs);

        let mut chosen = index::sample(&mut rng, n_docs, n_heldout).into_vec();
        chosen.sort_unstable();

        let mut rows: Vec<Vec<(usize, u32)>> = dtm.rows().to_vec();
        let mut remaining = dtm.column_totals();
        let mut documents = Vec::with_capacity(chosen.len());

        for row in chosen {
            // One entry per token occurrence
            let tokens: Vec<usize> = rows[row]
                .iter()
                .flat_map(|&(term, count)| std::iter::repeat(term).take(count as usize))
                .collect();
            let to_mask = (token_proportion * tokens.len() as f64).floor() as usize;
            if to_mask == 0 {
                continue;
            }

            let mut masked: Vec<(usize, u32)> = Vec::new();
            for position in index::sample(&mut rng, tokens.len(), tokens.len()).into_iter() {
                if masked.iter().map(|&(_, c)| c as usize).sum::<usize>() == to_mask {
                    break;
                }

                let term = tokens[position];
                if remaining[term] <= 1 {
                    continue;
                }
                remaining[term] -= 1;

                if let Some(cell) = rows[row].iter_mut().find(|(t, _)| *t == term) {
                    cell.1 -= 1;
                }
                match masked.iter_mut().find(|(t, _)| *t == term) {
                    Some(entry) => entry.1 += 1,
                    None => masked.push((term, 1)),
                }
            }

            if !masked.is_empty() {
                masked.sort_unstable();
                documents.push(HeldoutDocument {
                    row,
                    entries: masked,
                });
            }
        }

        info!(
            "heldout split masked tokens in {} of {} documents",
            documents.len(),
            n_docs
        );

        HeldoutSplit {
            training: dtm.with_rows(rows),
            documents,
        }
    }

    pub fn masked_tokens(&self) -> u64 {
        self.documents
            .iter()
            .flat_map(|doc| doc.entries.iter())
            .map(|&(_, count)| count as u64)
            .sum()
    }

    /// Mean over heldout documents of the average log predictive probability
    /// of their masked tokens. Higher is better; `None` without heldout data.
    pub fn evaluate(&self, model: &FittedModel) -> Option<f64> {
        if self.documents.is_empty() {
            return None;
        }

        let per_document: Vec<f64> = self
            .documents
            .iter()
            .map(|doc| {
                let (log_probability, tokens) = doc.entries.iter().fold(
                    (0.0, 0.0),
                    |(sum, tokens), &(term, count)| {
                        let count = count as f64;
                        (
                            sum + count * model.term_probability(doc.row, term).ln(),
                            tokens + count,
                        )
                    },
                );
                log_probability / tokens
            })
            .collect();

        Some(per_document.iter().sum::<f64>() / per_document.len() as f64)
    }
}
