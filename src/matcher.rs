use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WatchError};
use crate::record::{self, codes::DEFAULT_CODE_FIELDS};

/// How positive keyword terms are compared against the searchable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMode {
    /// Case-insensitive substring containment.
    #[default]
    Substring,
    /// Each term is escaped and wrapped in word boundaries.
    Word,
    /// Each term is a regular expression.
    Regex,
}

/// Matching rules as data. Every historical scanner variant is one instance of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub keywords: Vec<String>,
    pub keyword_mode: KeywordMode,
    /// Regular expressions that veto a keyword hit when found anywhere in the text.
    pub negative_patterns: Vec<String>,
    /// Classification code prefixes, compared against digit-only codes.
    pub code_prefixes: Vec<String>,
    pub code_fields: Vec<String>,
    /// A code hit alone is not enough; a keyword must also fire.
    pub require_keyword: bool,
    /// Negative patterns also veto code hits. Off keeps a lone code hit alive
    /// when the text trips a negative pattern.
    pub negatives_veto_codes: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        let keywords = [
            // photo / video production
            "photo", "photography", "photographer", "photoshoot", "shooting",
            "video", "videography", "videographer", "filming", "film production",
            "video production", "post-production", "post production", "editing",
            "motion graphics", "animation", "subtitling", "voice-over", "voice over",
            // comms / campaign creative
            "audiovisual", "audio-visual", "audio visual", "visual content",
            "content creation", "creative services", "creative agency", "creative support",
            "visual identity", "branding", "brand assets", "graphic design", "design services",
            "communication campaign", "campaign", "awareness campaign",
            "social media content", "social media assets", "media content",
            "promotional video", "explainer video",
            // procurement wording
            "framework contract", "service contract", "communication services", "media services",
        ];
        Self {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            keyword_mode: KeywordMode::Substring,
            negative_patterns: Vec::new(),
            // photographic, motion picture/video, entertainment, printing
            code_prefixes: ["7996", "921", "923", "798"].iter().map(|s| s.to_string()).collect(),
            code_fields: DEFAULT_CODE_FIELDS.iter().map(|s| s.to_string()).collect(),
            require_keyword: false,
            negatives_veto_codes: true,
        }
    }
}

#[derive(Debug)]
enum KeywordRule {
    /// Lowercased terms.
    Substring(Vec<String>),
    Patterns(Vec<Regex>),
}

/// Which strategies fired for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub keyword: bool,
    pub code: bool,
    /// A negative pattern was found in the text.
    pub suppressed: bool,
    matched: bool,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.matched
    }

    pub fn strategies(&self) -> Vec<&'static str> {
        let mut fired = Vec::new();
        if self.keyword {
            fired.push("keyword");
        }
        if self.code {
            fired.push("code");
        }
        fired
    }
}

/// Compiled rule set. Evaluation is pure; build once per run.
#[derive(Debug)]
pub struct Matcher {
    keywords: KeywordRule,
    negatives: Vec<Regex>,
    prefixes: Vec<String>,
    code_fields: Vec<String>,
    require_keyword: bool,
    negatives_veto_codes: bool,
}

impl Matcher {
    pub fn new(rules: &RuleSet) -> Result<Self> {
        let terms = rules.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty());
        let keywords = match rules.keyword_mode {
            KeywordMode::Substring => KeywordRule::Substring(terms.map(str::to_lowercase).collect()),
            KeywordMode::Word => KeywordRule::Patterns(
                terms
                    .map(|t| compile(&format!(r"\b{}\b", regex::escape(t))))
                    .collect::<Result<_>>()?,
            ),
            KeywordMode::Regex => KeywordRule::Patterns(terms.map(compile).collect::<Result<_>>()?),
        };
        let negatives = rules
            .negative_patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(compile)
            .collect::<Result<_>>()?;

        Ok(Self {
            keywords,
            negatives,
            prefixes: rules
                .code_prefixes
                .iter()
                .map(|p| record::codes::digits_only(p))
                .filter(|p| !p.is_empty())
                .collect(),
            code_fields: rules.code_fields.clone(),
            require_keyword: rules.require_keyword,
            negatives_veto_codes: rules.negatives_veto_codes,
        })
    }

    /// Evaluate a raw record.
    pub fn evaluate(&self, record: &Value) -> MatchOutcome {
        let blob = record::search_blob(record);
        let codes = self.extract_codes(record);
        self.evaluate_parts(&blob, &codes)
    }

    /// Evaluate already-normalized text and codes.
    pub fn evaluate_parts(&self, text: &str, codes: &[String]) -> MatchOutcome {
        // negatives first: a veto never evaluates positive terms
        let suppressed = self.is_suppressed(text);
        let keyword = !suppressed && self.keyword_hit(text);
        let code = !(suppressed && self.negatives_veto_codes)
            && record::any_prefix_match(codes, self.prefixes.as_slice());

        let matched = if self.require_keyword {
            keyword
        } else {
            keyword || code
        };
        MatchOutcome {
            keyword,
            code,
            suppressed,
            matched,
        }
    }

    pub fn extract_codes(&self, record: &Value) -> Vec<String> {
        record::extract_codes_from(record, self.code_fields.as_slice())
    }

    pub fn is_suppressed(&self, text: &str) -> bool {
        self.negatives.iter().any(|re| re.is_match(text))
    }

    pub fn keyword_hit(&self, text: &str) -> bool {
        match &self.keywords {
            KeywordRule::Substring(terms) => {
                let lower = text.to_lowercase();
                terms.iter().any(|t| lower.contains(t.as_str()))
            }
            KeywordRule::Patterns(patterns) => patterns.iter().any(|re| re.is_match(text)),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| WatchError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(keywords: &[&str], mode: KeywordMode, negatives: &[&str], prefixes: &[&str]) -> RuleSet {
        RuleSet {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            keyword_mode: mode,
            negative_patterns: negatives.iter().map(|s| s.to_string()).collect(),
            code_prefixes: prefixes.iter().map(|s| s.to_string()).collect(),
            ..RuleSet::default()
        }
    }

    #[test]
    fn keyword_and_code_both_fire() {
        let m = Matcher::new(&RuleSet::default()).unwrap();
        let record = json!({ "id": "A1", "title": "Photography services tender", "cpv": ["79961000"] });
        let outcome = m.evaluate(&record);
        assert!(outcome.is_match());
        assert!(outcome.keyword);
        assert!(outcome.code);
        assert_eq!(outcome.strategies(), vec!["keyword", "code"]);
    }

    #[test]
    fn negative_pattern_wins_over_positive() {
        let m = Matcher::new(&rules(&["photo"], KeywordMode::Regex, &["photonics"], &[])).unwrap();
        let record = json!({ "id": "B2", "title": "Photonics research equipment" });
        let outcome = m.evaluate(&record);
        assert!(!outcome.is_match());
        assert!(outcome.suppressed);
        assert!(!outcome.keyword);
    }

    #[test]
    fn negative_applies_in_substring_mode_too() {
        let m = Matcher::new(&rules(&["photo"], KeywordMode::Substring, &[r"\bphotonics?\b"], &[])).unwrap();
        assert!(!m.evaluate_parts("Photo and photonics lab", &[]).is_match());
        assert!(m.evaluate_parts("Photo studio hire", &[]).is_match());
    }

    #[test]
    fn word_mode_requires_boundaries() {
        let m = Matcher::new(&rules(&["photo", "voice-over"], KeywordMode::Word, &[], &[])).unwrap();
        assert!(!m.keyword_hit("Photonics research equipment"));
        assert!(m.keyword_hit("Event PHOTO coverage"));
        assert!(m.keyword_hit("multilingual voice-over recording"));
    }

    #[test]
    fn substring_mode_is_case_insensitive() {
        let m = Matcher::new(&rules(&["Video Production"], KeywordMode::Substring, &[], &[])).unwrap();
        assert!(m.keyword_hit("corporate VIDEO PRODUCTION services"));
        assert!(!m.keyword_hit("video editing"));
    }

    #[test]
    fn code_match_is_string_prefix() {
        let m = Matcher::new(&rules(&[], KeywordMode::Substring, &[], &["7996"])).unwrap();
        assert!(m.evaluate_parts("", &["79961000".to_string()]).code);
        assert!(!m.evaluate_parts("", &["7799610".to_string()]).code);
        assert!(!m.evaluate_parts("", &[]).is_match());
    }

    #[test]
    fn negatives_veto_code_hits_unless_disabled() {
        let mut r = rules(&["photo"], KeywordMode::Substring, &["photonics"], &["7996"]);
        let codes = vec!["79961000".to_string()];
        let m = Matcher::new(&r).unwrap();
        let outcome = m.evaluate_parts("photonics imaging", &codes);
        assert!(!outcome.is_match());
        assert!(!outcome.code);

        r.negatives_veto_codes = false;
        let m = Matcher::new(&r).unwrap();
        let outcome = m.evaluate_parts("photonics imaging", &codes);
        assert!(outcome.is_match());
        assert!(!outcome.keyword && outcome.code);
    }

    #[test]
    fn require_keyword_ignores_lone_code_hit() {
        let mut r = rules(&["video"], KeywordMode::Substring, &[], &["921"]);
        r.require_keyword = true;
        let m = Matcher::new(&r).unwrap();
        let codes = vec!["92111000".to_string()];
        let outcome = m.evaluate_parts("catering services", &codes);
        assert!(outcome.code);
        assert!(!outcome.is_match());
        assert!(m.evaluate_parts("video services", &codes).is_match());
    }

    #[test]
    fn evaluation_is_repeatable() {
        let m = Matcher::new(&RuleSet::default()).unwrap();
        let record = json!({ "id": "A1", "title": "Branding and campaign", "metadata": { "cpv": "92312000" } });
        assert_eq!(m.evaluate(&record), m.evaluate(&record));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = Matcher::new(&rules(&["(unclosed"], KeywordMode::Regex, &[], &[])).unwrap_err();
        assert!(matches!(err, WatchError::Pattern { .. }));
        let err = Matcher::new(&rules(&[], KeywordMode::Substring, &["[bad"], &[])).unwrap_err();
        assert!(err.to_string().contains("[bad"));
    }

    #[test]
    fn prefixes_are_normalized_to_digits() {
        let m = Matcher::new(&rules(&[], KeywordMode::Substring, &[], &["7996-", " 921 "])).unwrap();
        assert!(m.evaluate_parts("", &["92100000".to_string()]).code);
        assert!(m.evaluate_parts("", &["79961000".to_string()]).code);
    }
}
