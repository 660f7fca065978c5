//! Artifact extraction from free-form model output.
//!
//! Models often wrap code in Markdown fences or prefix it with prose. The
//! [`ArtifactExtractor`] recovers the source text with a fixed rule: prefer
//! fenced content; otherwise drop leading lines until the first line that
//! starts a top-level declaration.

use crate::config::models::ArtifactConfig;
use regex::Regex;
use std::sync::OnceLock;

fn fenced_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?:[\w+-]+)?[ \t]*\n(.*?)\n[ \t]*```").expect("valid fence regex")
    })
}

fn fenced_json_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```json(.*?)```").expect("valid json fence regex"))
}

/// Content of the first ```` ```json ```` fenced block, trimmed.
pub fn fenced_json_block(text: &str) -> Option<&str> {
    fenced_json_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Strip Markdown fences around JSON output, if any.
pub fn clean_json_text(text: &str) -> &str {
    let text = text.trim();
    if !text.contains("```") {
        return text;
    }
    if let Some(block) = fenced_json_block(text) {
        return block;
    }
    fenced_block_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str().trim())
}

/// Content of the first fenced block of any language, trimmed.
pub fn fenced_block(text: &str) -> Option<&str> {
    fenced_block_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Recovers candidate source text from model output.
#[derive(Debug, Clone)]
pub struct ArtifactExtractor {
    declaration_prefixes: Vec<String>,
    min_length: usize,
}

impl Default for ArtifactExtractor {
    fn default() -> Self {
        Self::from(&ArtifactConfig::default())
    }
}

impl From<&ArtifactConfig> for ArtifactExtractor {
    fn from(config: &ArtifactConfig) -> Self {
        Self {
            declaration_prefixes: config.declaration_prefixes.clone(),
            min_length: config.min_length,
        }
    }
}

impl ArtifactExtractor {
    pub fn new(declaration_prefixes: Vec<String>, min_length: usize) -> Self {
        Self {
            declaration_prefixes,
            min_length,
        }
    }

    /// Extract the artifact from raw model text.
    pub fn extract(&self, raw: &str) -> String {
        let text = raw.trim();
        if text.is_empty() {
            return String::new();
        }

        let text = if text.contains("```") {
            match fenced_block(text) {
                Some(block) => block.to_string(),
                None => text.replace("```", "").trim().to_string(),
            }
        } else {
            text.to_string()
        };

        self.skip_leading_prose(&text)
    }

    /// True when `line` begins a top-level declaration.
    pub fn is_declaration_start(&self, line: &str) -> bool {
        let line = line.trim_start();
        self.declaration_prefixes
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
    }

    /// True when a candidate is too short to be worth verifying.
    pub fn is_implausible(&self, artifact: &str) -> bool {
        artifact.trim().chars().count() < self.min_length
    }

    fn skip_leading_prose(&self, text: &str) -> String {
        let lines: Vec<&str> = text.lines().collect();
        let start = lines
            .iter()
            .position(|line| !line.trim().is_empty() && self.is_declaration_start(line));

        match start {
            Some(idx) if idx > 0 => lines[idx..].join("\n").trim().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_prefers_fenced_content() {
        let raw = "Here is the program:\n```grammo\nfunc int -> one() {\n  return 1;\n}\n```\nHope it helps!";
        let extractor = ArtifactExtractor::default();
        assert_eq!(extractor.extract(raw), "func int -> one() {\n  return 1;\n}");
    }

    #[test]
    fn test_extract_drops_leading_prose() {
        let raw = "Sure! Below is the code.\n\nvar int: x;\nfunc void -> main() {\n}";
        let extractor = ArtifactExtractor::default();
        assert_eq!(extractor.extract(raw), "var int: x;\nfunc void -> main() {\n}");
    }

    #[test]
    fn test_extract_without_declaration_keeps_text() {
        let extractor = ArtifactExtractor::default();
        assert_eq!(extractor.extract("  just words  "), "just words");
        assert_eq!(extractor.extract(""), "");
    }

    #[test]
    fn test_extract_unterminated_fence() {
        let extractor = ArtifactExtractor::default();
        assert_eq!(
            extractor.extract("```\nfunc void -> main() {}"),
            "func void -> main() {}"
        );
    }

    #[test]
    fn test_custom_prefixes() {
        let extractor = ArtifactExtractor::new(vec!["fn ".to_string()], 3);
        assert_eq!(extractor.extract("prose\nfn main() {}"), "fn main() {}");
    }

    #[test]
    fn test_implausible_length() {
        let extractor = ArtifactExtractor::default();
        assert!(extractor.is_implausible("func"));
        assert!(extractor.is_implausible("   \n"));
        assert!(!extractor.is_implausible("func void -> main() {}"));
    }

    #[test]
    fn test_clean_json_text() {
        assert_eq!(clean_json_text("```json\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(clean_json_text("```\n{\"route\": \"plan\"}\n```"), "{\"route\": \"plan\"}");
        assert_eq!(clean_json_text("  [1] "), "[1]");
    }
}
