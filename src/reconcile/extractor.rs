//! Identifier extractor — pure text → labeled candidate identifiers.
//!
//! Candidates come out in a fixed order: the labeled patterns in declared
//! order, then the two derived candidates, then every standalone 5–17 digit
//! run. The same text always yields the same list.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Label attached to a candidate. Variant order is match precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IdLabel {
    NationalId,
    Pin,
    VoterNo,
    FormNo,
    BirthRegistrationNo,
    Tin,
    Passport,
    NidFather,
    NidMother,
    NidSpouse,
    VoterNoFather,
    VoterNoMother,
    VoterNoSpouse,
    Phone,
    Mobile,
    /// Pin without its first four characters.
    OldNid,
    /// Form No with everything but digits removed.
    FormNoDigits,
    /// Any standalone digit run.
    AllDigit,
}

impl IdLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NationalId => "National ID",
            Self::Pin => "Pin",
            Self::VoterNo => "Voter No",
            Self::FormNo => "Form No",
            Self::BirthRegistrationNo => "Birth Registration No",
            Self::Tin => "TIN",
            Self::Passport => "Passport",
            Self::NidFather => "NID Father",
            Self::NidMother => "NID Mother",
            Self::NidSpouse => "Nid Spouse",
            Self::VoterNoFather => "Voter No Father",
            Self::VoterNoMother => "Voter No Mother",
            Self::VoterNoSpouse => "Voter No Spouse",
            Self::Phone => "Phone",
            Self::Mobile => "Mobile",
            Self::OldNid => "OldNID(PinTrim)",
            Self::FormNoDigits => "FormNoDigits",
            Self::AllDigit => "AllDigit",
        }
    }
}

impl fmt::Display for IdLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled identifier found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Candidate {
    pub label: IdLabel,
    pub value: String,
}

impl Candidate {
    pub fn new(label: IdLabel, value: impl Into<String>) -> Self {
        Self {
            label,
            value: value.into(),
        }
    }
}

/// Everything the extractor learns from one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub candidates: Vec<Candidate>,
    /// The document carries the generated-report phrase.
    pub generated_copy: bool,
    pub name_english: Option<String>,
}

impl Extraction {
    /// Value of the first candidate with this label.
    pub fn value_of(&self, label: IdLabel) -> Option<&str> {
        self.candidates
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.value.as_str())
    }
}

/// Labeled patterns in precedence order. A label starts a line and its
/// value follows immediately.
static LABELED: LazyLock<Vec<(IdLabel, Regex)>> = LazyLock::new(|| {
    let table = [
        (IdLabel::NationalId, r"(?m)^National ID([0-9]{5,17})"),
        (IdLabel::Pin, r"(?m)^Pin([0-9]{5,17})"),
        (IdLabel::VoterNo, r"(?m)^Voter No([0-9]{5,17})"),
        (IdLabel::FormNo, r"(?m)^Form No([A-Za-z0-9]+)"),
        (
            IdLabel::BirthRegistrationNo,
            r"(?m)^Birth Registration\nNo\n([0-9]{5,17})",
        ),
        (IdLabel::Tin, r"(?m)^TIN([0-9]{5,17})"),
        (IdLabel::Passport, r"(?m)^Passport([A-Za-z0-9]+)"),
        (IdLabel::NidFather, r"(?m)^NID Father([0-9]{5,17})"),
        (IdLabel::NidMother, r"(?m)^NID Mother([0-9]{5,17})"),
        (IdLabel::NidSpouse, r"(?m)^Nid Spouse([0-9]{5,17})"),
        (IdLabel::VoterNoFather, r"(?m)^Voter No Father([0-9]{5,17})"),
        (IdLabel::VoterNoMother, r"(?m)^Voter No Mother([0-9]{5,17})"),
        (IdLabel::VoterNoSpouse, r"(?m)^Voter No Spouse([0-9]{5,17})"),
        (IdLabel::Phone, r"(?m)^Phone([0-9]{5,17})"),
        (IdLabel::Mobile, r"(?m)^Mobile([0-9]{5,17})"),
    ];
    table
        .into_iter()
        .map(|(label, pattern)| (label, Regex::new(pattern).unwrap()))
        .collect()
});

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

static REQUEST_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]{5,17}").unwrap());

static BENGALI_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\u{09E6}-\u{09EF}]{5,17}").unwrap());

static GENERATED_COPY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)software[\s-]*generated[\s-]*report[\s-]*from[\s-]*bangladesh[\s-]*election[\s-]*commission[\s,]*signature[\s&and]*seal\s*(aren't|not|are\s*not)?\s*required",
    )
    .unwrap()
});

static NAME_ENGLISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^Name\(English\)[ \t]*[:\-]?[ \t]*([^\n]+)").unwrap()
});

static LATIN_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z\s]{1,150}$").unwrap());

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Digit runs of `min..=max` length not glued to an ASCII letter or underscore.
fn standalone_digit_runs(text: &str, min: usize, max: usize) -> impl Iterator<Item = &str> {
    DIGIT_RUN.find_iter(text).filter_map(move |m| {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        let glued = before.is_some_and(is_ascii_word) || after.is_some_and(is_ascii_word);
        (!glued && (min..=max).contains(&m.len())).then_some(m.as_str())
    })
}

/// Run the extractor over a document's text.
pub fn extract(text: &str) -> Extraction {
    let text = text.replace("\r\n", "\n");
    let mut seen: HashSet<Candidate> = HashSet::new();
    let mut candidates = Vec::new();
    let mut push = |candidate: Candidate| {
        if seen.insert(candidate.clone()) {
            candidates.push(candidate);
        }
    };

    let mut pin = None;
    let mut form_no = None;
    for (label, re) in LABELED.iter() {
        let Some(value) = re.captures(&text).and_then(|c| c.get(1)) else {
            continue;
        };
        let value = value.as_str().to_string();
        match label {
            IdLabel::Pin => pin = Some(value.clone()),
            IdLabel::FormNo => form_no = Some(value.clone()),
            _ => {}
        }
        push(Candidate::new(*label, value));
    }

    if let Some(pin) = pin.filter(|p| p.len() >= 5) {
        push(Candidate::new(IdLabel::OldNid, &pin[4..]));
    }
    if let Some(form_no) = form_no {
        let digits: String = form_no.chars().filter(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() {
            push(Candidate::new(IdLabel::FormNoDigits, digits));
        }
    }

    for run in standalone_digit_runs(&text, 5, 17) {
        push(Candidate::new(IdLabel::AllDigit, run));
    }

    Extraction {
        candidates,
        generated_copy: GENERATED_COPY.is_match(&text),
        name_english: english_name(&text),
    }
}

/// `Name(English): X` if present, else the first line made only of Latin letters and spaces.
fn english_name(text: &str) -> Option<String> {
    if let Some(name) = NAME_ENGLISH
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|n| !n.is_empty())
    {
        return Some(name.to_string());
    }
    text.lines()
        .map(str::trim)
        .find(|line| LATIN_LINE.is_match(line))
        .map(str::to_string)
}

/// Order keys in a request body: every 5–17 digit run, deduplicated, numerically sorted.
pub fn request_keys(body: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for m in REQUEST_KEY.find_iter(body) {
        let key = m.as_str().to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    // Same-length digit strings compare like numbers; leading zeros sort first.
    keys.sort_by(|a, b| {
        let (ta, tb) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
        ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb)).then_with(|| a.cmp(b))
    });
    keys
}

/// A 5–17 long run of Bengali digits.
pub fn has_bengali_digits(body: &str) -> bool {
    BENGALI_DIGITS.is_match(body)
}

/// Standalone exactly-10-digit numbers, used to route NID-make documents.
pub fn ten_digit_numbers(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for run in standalone_digit_runs(text, 10, 10) {
        if !out.iter().any(|v| v == run) {
            out.push(run.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Some header\nName(English): MD RAHIM UDDIN\nNational ID1990123456789\nPin19901234567890123\nVoter No123456789012\nForm NoAB12C34\nPassportEA1234567\nMobile01711000000\nissued 20240101 reference";

    fn values(e: &Extraction, label: IdLabel) -> Vec<&str> {
        e.candidates
            .iter()
            .filter(|c| c.label == label)
            .map(|c| c.value.as_str())
            .collect()
    }

    #[test]
    fn labeled_values_in_declared_order() {
        let e = extract(SAMPLE);
        let labels: Vec<IdLabel> = e.candidates.iter().map(|c| c.label).collect();
        assert_eq!(
            &labels[..8],
            &[
                IdLabel::NationalId,
                IdLabel::Pin,
                IdLabel::VoterNo,
                IdLabel::FormNo,
                IdLabel::Passport,
                IdLabel::Mobile,
                IdLabel::OldNid,
                IdLabel::FormNoDigits,
            ]
        );
        assert_eq!(e.value_of(IdLabel::NationalId), Some("1990123456789"));
        assert_eq!(e.value_of(IdLabel::Pin), Some("19901234567890123"));
        assert_eq!(e.value_of(IdLabel::OldNid), Some("1234567890123"));
        assert_eq!(e.value_of(IdLabel::FormNo), Some("AB12C34"));
        assert_eq!(e.value_of(IdLabel::FormNoDigits), Some("1234"));
        assert_eq!(e.value_of(IdLabel::Passport), Some("EA1234567"));
    }

    #[test]
    fn all_digit_runs_must_stand_alone() {
        let e = extract(SAMPLE);
        // Glued to labels, so only the free-standing date qualifies.
        assert_eq!(values(&e, IdLabel::AllDigit), vec!["20240101"]);
    }

    #[test]
    fn label_at_start_of_text_matches() {
        let e = extract("National ID12345678901");
        assert_eq!(e.value_of(IdLabel::NationalId), Some("12345678901"));
    }

    #[test]
    fn value_longer_than_seventeen_is_truncated_like_a_prefix() {
        let e = extract("\nTIN1234567890123456789");
        assert_eq!(e.value_of(IdLabel::Tin), Some("12345678901234567"));
    }

    #[test]
    fn birth_registration_spans_lines() {
        let e = extract("x\nBirth Registration\nNo\n20011234567890123\n");
        assert_eq!(
            e.value_of(IdLabel::BirthRegistrationNo),
            Some("20011234567890123")
        );
        assert_eq!(values(&e, IdLabel::AllDigit), vec!["20011234567890123"]);
    }

    #[test]
    fn voter_no_does_not_swallow_relative_labels() {
        let e = extract("\nVoter No Father123456789\n");
        assert_eq!(e.value_of(IdLabel::VoterNo), None);
        assert_eq!(e.value_of(IdLabel::VoterNoFather), Some("123456789"));
    }

    #[test]
    fn short_pin_has_no_old_nid() {
        let e = extract("\nPin12345");
        assert_eq!(e.value_of(IdLabel::OldNid), Some("5"));
        let e = extract("\nPin1234");
        assert_eq!(e.value_of(IdLabel::Pin), None);
        assert_eq!(e.value_of(IdLabel::OldNid), None);
    }

    #[test]
    fn duplicate_pairs_are_dropped() {
        let e = extract("a 123456 b 123456 c");
        assert_eq!(values(&e, IdLabel::AllDigit), vec!["123456"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        assert_eq!(extract(SAMPLE), extract(SAMPLE));
    }

    #[test]
    fn crlf_text_is_handled() {
        let e = extract("head\r\nNational ID12345678901\r\n");
        assert_eq!(e.value_of(IdLabel::NationalId), Some("12345678901"));
    }

    #[test]
    fn generated_copy_phrase() {
        let text = "This is a Software Generated Report From Bangladesh Election Commission, Signature & Seal Aren't Required.";
        assert!(extract(text).generated_copy);
        let text = "software-generated report from bangladesh election commission signature and seal not required";
        assert!(extract(text).generated_copy);
        assert!(!extract("Signature required").generated_copy);
    }

    #[test]
    fn english_name_label_then_fallback() {
        assert_eq!(extract(SAMPLE).name_english.as_deref(), Some("MD RAHIM UDDIN"));

        let e = extract("১২৩ তথ্য\n  Karim Ahmed  \nNational ID12345678901");
        assert_eq!(e.name_english.as_deref(), Some("Karim Ahmed"));

        assert_eq!(extract("12345\n---").name_english, None);
    }

    #[test]
    fn request_keys_sorted_numerically() {
        let keys = request_keys("please 9876543210 and 123456 and 9876543210, 0012345");
        assert_eq!(keys, vec!["0012345", "123456", "9876543210"]);
        assert!(request_keys("no numbers 1234").is_empty());
    }

    #[test]
    fn bengali_digit_runs() {
        assert!(has_bengali_digits("নং ১২৩৪৫৬৭"));
        assert!(!has_bengali_digits("নং ১২৩৪"));
        assert!(!has_bengali_digits("1234567"));
    }

    #[test]
    fn ten_digit_numbers_only() {
        let nums = ten_digit_numbers("NID 1234567890, old 12345678901, x1234567890, 1234567890");
        assert_eq!(nums, vec!["1234567890"]);
    }
}
