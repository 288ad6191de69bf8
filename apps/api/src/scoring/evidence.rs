//! Evidence linking: attaches resume text spans to each requirement match so
//! an opaque oracle's claims can be audited against the source document.

use std::collections::HashSet;

use super::result::{EvidenceSpan, ScoringResult};

/// Generic tokens that never identify a requirement on their own: articles,
/// pronouns, and boilerplate hiring vocabulary.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "you", "your", "are", "was",
    "were", "have", "has", "had", "they", "them", "their", "role", "candidate", "requirement",
    "score", "based", "using", "used", "will", "can", "not", "but", "also",
];

/// A non-empty resume line with absolute byte offsets into the original text.
struct ResumeLineSpan {
    start: usize,
    end: usize,
    excerpt: String,
}

/// Keyword extractor and line matcher. The stop-word set is immutable and
/// built once at startup; handlers share one instance via `AppState`.
pub struct EvidenceLinker {
    stop_words: HashSet<&'static str>,
}

impl Default for EvidenceLinker {
    fn default() -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl EvidenceLinker {
    /// Populates `evidence_spans` on every match, overwriting anything the
    /// oracle supplied. Spans follow resume line order; relevance re-sorting
    /// is a presentation concern and does not happen here.
    pub fn enrich(&self, mut result: ScoringResult, resume_text: &str) -> ScoringResult {
        let line_spans = build_resume_line_spans(resume_text);

        for m in &mut result.matches {
            let keywords = self.extract_keywords(&m.requirement_name, &m.reasoning);

            let spans: Vec<EvidenceSpan> = line_spans
                .iter()
                .filter_map(|span| {
                    let lower_excerpt = span.excerpt.to_lowercase();
                    let matched_keywords: Vec<String> = keywords
                        .iter()
                        .filter(|keyword| lower_excerpt.contains(keyword.as_str()))
                        .cloned()
                        .collect();

                    (!matched_keywords.is_empty()).then(|| EvidenceSpan {
                        start: span.start,
                        end: span.end,
                        excerpt: span.excerpt.clone(),
                        matched_keywords,
                    })
                })
                .collect();

            m.evidence_spans = Some(spans);
        }

        result
    }

    /// Tokenizes `requirement_name + " " + reasoning` into lookup keywords:
    /// lower-cased, split on anything outside `[a-z0-9+.#-]`, length >= 3,
    /// stop words removed, de-duplicated preserving first appearance.
    fn extract_keywords(&self, requirement_name: &str, reasoning: &str) -> Vec<String> {
        let text = format!("{requirement_name} {reasoning}").to_lowercase();
        let mut seen = HashSet::new();
        let mut keywords = Vec::new();

        for token in text.split(|c: char| !is_keyword_char(c)) {
            if token.len() < 3 || self.stop_words.contains(token) {
                continue;
            }
            if seen.insert(token.to_string()) {
                keywords.push(token.to_string());
            }
        }

        keywords
    }
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '#' | '-')
}

/// Splits resume text into non-empty trimmed line spans. Line breaks are
/// delimiters; only horizontal whitespace is trimmed, and offsets stay
/// absolute so the UI can highlight the original document.
fn build_resume_line_spans(resume_text: &str) -> Vec<ResumeLineSpan> {
    let mut spans = Vec::new();
    let mut line_start = 0usize;

    for (idx, c) in resume_text.char_indices() {
        if c == '\n' || c == '\r' {
            push_trimmed_span(resume_text, line_start, idx, &mut spans);
            line_start = idx + 1;
        }
    }
    push_trimmed_span(resume_text, line_start, resume_text.len(), &mut spans);

    spans
}

fn push_trimmed_span(text: &str, start: usize, end: usize, spans: &mut Vec<ResumeLineSpan>) {
    let line = &text[start..end];
    let leading = line.len() - line.trim_start().len();
    let trailing = line.len() - line.trim_end().len();

    let span_start = start + leading;
    let span_end = end - trailing;
    if span_end > span_start {
        spans.push(ResumeLineSpan {
            start: span_start,
            end: span_end,
            excerpt: text[span_start..span_end].to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::result::RequirementMatch;

    fn result_with_match(requirement_name: &str, reasoning: &str) -> ScoringResult {
        ScoringResult {
            matches: vec![RequirementMatch {
                requirement_name: requirement_name.to_string(),
                score: 75.0,
                reasoning: reasoning.to_string(),
                evidence_spans: None,
            }],
            summary: "summary".to_string(),
            overall_score: 75.0,
        }
    }

    #[test]
    fn test_matching_line_produces_span_with_keyword() {
        let linker = EvidenceLinker::default();
        let resume = "Jane Doe\n5 years of React experience\nLikes dogs";
        let enriched = linker.enrich(result_with_match("React", "Solid frontend work"), resume);

        let spans = enriched.matches[0].evidence_spans.as_ref().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].excerpt, "5 years of React experience");
        assert!(spans[0].matched_keywords.contains(&"react".to_string()));
    }

    #[test]
    fn test_unrelated_lines_produce_no_spans() {
        let linker = EvidenceLinker::default();
        let resume = "Enjoys gardening\nPlays chess on weekends";
        let enriched = linker.enrich(result_with_match("Kubernetes", "Cluster operations"), resume);

        assert!(enriched.matches[0]
            .evidence_spans
            .as_ref()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_spans_carry_absolute_offsets_past_trimmed_whitespace() {
        let linker = EvidenceLinker::default();
        let resume = "Header\n  Rust developer since 2019  \nFooter";
        let enriched = linker.enrich(result_with_match("Rust", "systems"), resume);

        let spans = enriched.matches[0].evidence_spans.as_ref().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(&resume[span.start..span.end], "Rust developer since 2019");
        assert_eq!(span.excerpt, "Rust developer since 2019");
    }

    #[test]
    fn test_oracle_supplied_spans_are_overwritten() {
        let linker = EvidenceLinker::default();
        let mut result = result_with_match("Go", "Backend services in Go");
        result.matches[0].evidence_spans = Some(vec![EvidenceSpan {
            start: 0,
            end: 5,
            excerpt: "bogus".to_string(),
            matched_keywords: vec!["bogus".to_string()],
        }]);

        let enriched = linker.enrich(result, "No relevant lines here at all");
        assert!(enriched.matches[0]
            .evidence_spans
            .as_ref()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_keywords_skip_stop_words_and_short_tokens() {
        let linker = EvidenceLinker::default();
        let keywords =
            linker.extract_keywords("React", "The candidate used React and has a JS role");
        assert!(keywords.contains(&"react".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"candidate".to_string()));
        assert!(!keywords.contains(&"js".to_string())); // under 3 chars
    }

    #[test]
    fn test_keywords_preserve_symbol_heavy_tokens() {
        let linker = EvidenceLinker::default();
        let keywords = linker.extract_keywords("C++ / .NET", "shipped c++ services on .net");
        assert!(keywords.contains(&"c++".to_string()));
        assert!(keywords.contains(&".net".to_string()));
    }

    #[test]
    fn test_keywords_deduplicate_preserving_first_appearance() {
        let linker = EvidenceLinker::default();
        let keywords = linker.extract_keywords("Rust", "rust tooling then kafka then rust again");
        assert_eq!(
            keywords,
            vec![
                "rust".to_string(),
                "tooling".to_string(),
                "then".to_string(),
                "kafka".to_string(),
                "again".to_string()
            ]
        );
    }

    #[test]
    fn test_blank_and_crlf_lines_are_skipped() {
        let spans = build_resume_line_spans("first\r\n\r\n   \r\nsecond");
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].excerpt, "first");
        assert_eq!(spans[1].excerpt, "second");
    }
}
