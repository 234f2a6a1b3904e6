//! Text analysis as configuration, not types: one struct describes the
//! tokenizer and its filter chain, builds the tantivy analyzer, registers
//! it on an index, and normalizes query-side terms through the same
//! chain so indexed and queried tokens always agree.

use serde::Deserialize;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer,
};
use tantivy::Index;

/// Registered name of the submission text analyzer
pub const SUBMISSION_ANALYZER: &str = "submission_text";

const MAX_TOKEN_LEN: usize = 64;

#[derive(Deserialize, Clone, Debug)]
pub struct AnalyzerConfig {
    #[serde(default = "AnalyzerConfig::default_ascii_folding")]
    pub ascii_folding: bool,
    #[serde(default = "AnalyzerConfig::default_lowercase")]
    pub lowercase: bool,
    #[serde(default)]
    pub stopwords: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ascii_folding: Self::default_ascii_folding(),
            lowercase: Self::default_lowercase(),
            stopwords: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    fn default_ascii_folding() -> bool {
        true
    }

    fn default_lowercase() -> bool {
        true
    }

    pub fn build(&self) -> TextAnalyzer {
        let mut analyzer = TextAnalyzer::from(SimpleTokenizer).filter(RemoveLongFilter::limit(MAX_TOKEN_LEN));
        if self.ascii_folding {
            analyzer = analyzer.filter(AsciiFoldingFilter);
        }
        if self.lowercase {
            analyzer = analyzer.filter(LowerCaser);
        }
        if !self.stopwords.is_empty() {
            analyzer = analyzer.filter(StopWordFilter::remove(self.stopwords.clone()));
        }
        analyzer
    }

    pub fn register(&self, index: &Index) {
        index.tokenizers().register(SUBMISSION_ANALYZER, self.build());
    }

    /// Run text through the chain and collect the surviving tokens
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let analyzer = self.build();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_chain_folds_and_lowercases() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.analyze("Müller-Straße"), vec!["muller".to_string(), "strasse".to_string()]);
        assert_eq!(config.analyze("Myeloid Leukocyte"), vec!["myeloid".to_string(), "leukocyte".to_string()]);
    }

    #[test]
    fn test_stopwords_removed() {
        let config = AnalyzerConfig {
            stopwords: vec!["of".into(), "the".into()],
            ..AnalyzerConfig::default()
        };
        assert_eq!(config.analyze("study of the cell"), vec!["study".to_string(), "cell".to_string()]);
    }

    #[test]
    fn test_chain_can_be_disabled() {
        let config = AnalyzerConfig {
            ascii_folding: false,
            lowercase: false,
            stopwords: Vec::new(),
        };
        assert_eq!(config.analyze("Cell"), vec!["Cell".to_string()]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(AnalyzerConfig::default().analyze("  "), Vec::<String>::new());
    }
}
