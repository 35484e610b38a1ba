//! TF-IDF feature extraction over a learned vocabulary.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};
use vulnsentry_core::{Result, VulnError};

/// Tokenization settings; persisted with the vocabulary they produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TfidfConfig {
    /// Regex whose matches are the tokens of a snippet
    pub token_pattern: String,
    pub lowercase: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            token_pattern: r"(?u)\b\w\w+\b".to_string(),
            lowercase: true,
        }
    }
}

/// Terms observed during `fit` with their inverse document frequencies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vocabulary {
    /// Training run this vocabulary belongs to
    pub run_id: String,
    pub config: TfidfConfig,
    /// Sorted, distinct terms; a term's position is its feature index
    terms: Vec<String>,
    idf: Vec<f64>,
    pub document_count: usize,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.terms
            .binary_search_by(|probe| probe.as_str().cmp(term))
            .ok()
    }
}

/// Sparse, L2-normalised TF-IDF vector tagged with its vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub vocabulary_id: String,
    /// (feature index, weight) pairs sorted by index, zero weights omitted
    entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    pub fn new(vocabulary_id: impl Into<String>, mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|(_, weight)| *weight != 0.0);
        entries.sort_by_key(|(index, _)| *index);
        Self {
            vocabulary_id: vocabulary_id.into(),
            entries,
        }
    }

    /// Weight of a feature; zero when absent.
    pub fn get(&self, index: usize) -> f64 {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Fits vocabularies and turns snippets into feature vectors.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: TfidfConfig,
    token_re: Regex,
}

impl FeatureExtractor {
    pub fn new(config: TfidfConfig) -> Result<Self> {
        let token_re = Regex::new(&config.token_pattern).map_err(|e| {
            VulnError::InvalidConfig(format!(
                "invalid token pattern {:?}: {}",
                config.token_pattern, e
            ))
        })?;
        Ok(Self { config, token_re })
    }

    /// Extractor matching the tokenization a vocabulary was fitted with.
    pub fn for_vocabulary(vocabulary: &Vocabulary) -> Result<Self> {
        Self::new(vocabulary.config.clone())
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    pub fn tokenize<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        self.token_re.find_iter(text).map(move |m| {
            if self.config.lowercase {
                m.as_str().to_lowercase()
            } else {
                m.as_str().to_string()
            }
        })
    }

    /// Learn the vocabulary and smoothed idf weights of `corpus`.
    pub fn fit<S: AsRef<str>>(&self, corpus: &[S], run_id: impl Into<String>) -> Vocabulary {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for document in corpus {
            let distinct: BTreeSet<String> = self.tokenize(document.as_ref()).collect();
            for term in distinct {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let n = corpus.len() as f64;
        let (terms, idf): (Vec<String>, Vec<f64>) = document_frequency
            .into_iter()
            .map(|(term, df)| (term, ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0))
            .unzip();

        let vocabulary = Vocabulary {
            run_id: run_id.into(),
            config: self.config.clone(),
            terms,
            idf,
            document_count: corpus.len(),
        };
        log::debug!(
            "Fitted vocabulary {}: {} terms over {} documents",
            vocabulary.run_id,
            vocabulary.len(),
            vocabulary.document_count
        );
        vocabulary
    }

    /// Vectorize `texts` against `vocabulary`. Unknown tokens get zero weight.
    pub fn transform<S: AsRef<str>>(
        &self,
        texts: &[S],
        vocabulary: &Vocabulary,
    ) -> Result<Vec<FeatureVector>> {
        if vocabulary.config != self.config {
            return Err(VulnError::VocabularyMismatch {
                expected: format!("tokenization {:?}", self.config),
                found: format!("{} with tokenization {:?}", vocabulary.run_id, vocabulary.config),
            });
        }

        Ok(texts
            .iter()
            .map(|text| self.transform_one(text.as_ref(), vocabulary))
            .collect())
    }

    fn transform_one(&self, text: &str, vocabulary: &Vocabulary) -> FeatureVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in self.tokenize(text) {
            if let Some(index) = vocabulary.index_of(&token) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * vocabulary.idf[index]))
            .collect();

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, weight) in entries.iter_mut() {
                *weight /= norm;
            }
        }

        FeatureVector::new(vocabulary.run_id.clone(), entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(TfidfConfig::default()).unwrap()
    }

    #[test]
    fn test_tokenize_default_pattern() {
        let tokens: Vec<String> = extractor().tokenize("Eval(x) + print(42)").collect();
        assert_eq!(tokens, vec!["eval", "print", "42"]);
    }

    #[test]
    fn test_fit_vocabulary_is_observed_terms() {
        let vocabulary = extractor().fit(&["eval(user)", "print(user)"], "run-1");

        assert_eq!(vocabulary.len(), 3);
        assert_eq!(vocabulary.terms[0], "eval");
        assert_eq!(vocabulary.index_of("user"), Some(2));
        assert_eq!(vocabulary.index_of("exec"), None);

        // user occurs in both documents: idf = ln(3/3) + 1
        let user_idf = vocabulary.idf[2];
        assert!((user_idf - 1.0).abs() < 1e-12);
        // eval occurs in one document: idf = ln(3/2) + 1
        let eval_idf = vocabulary.idf[0];
        assert!((eval_idf - (1.5f64.ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_transform_is_normalised_and_ignores_unknown_tokens() {
        let extractor = extractor();
        let vocabulary = extractor.fit(&["eval(user)", "print(user)"], "run-1");

        let vectors = extractor
            .transform(&["eval(user) unknown_token", "nothing_known"], &vocabulary)
            .unwrap();

        let norm: f64 = vectors[0].entries().iter().map(|(_, w)| w * w).sum();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(vectors[0].nnz(), 2);
        assert!(vectors[0].get(0) > vectors[0].get(2));
        assert_eq!(vectors[0].vocabulary_id, "run-1");

        assert_eq!(vectors[1].nnz(), 0);
        assert_eq!(vectors[1].get(0), 0.0);
    }

    #[test]
    fn test_transform_with_foreign_tokenization_is_mismatch() {
        let vocabulary = extractor().fit(&["eval(x)"], "run-1");
        let other = FeatureExtractor::new(TfidfConfig {
            lowercase: false,
            ..TfidfConfig::default()
        })
        .unwrap();

        let err = other.transform(&["eval(x)"], &vocabulary).unwrap_err();
        assert!(matches!(err, VulnError::VocabularyMismatch { .. }));
    }

    #[test]
    fn test_invalid_token_pattern() {
        let err = FeatureExtractor::new(TfidfConfig {
            token_pattern: "(".to_string(),
            lowercase: true,
        })
        .unwrap_err();
        assert!(matches!(err, VulnError::InvalidConfig(_)));
    }
}
