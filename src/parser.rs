// =============================================================================
// parser.rs - THE LINE-BY-LINE INTERROGATOR
// =============================================================================
//
// The ads.txt grammar is ambiguous. Nobody says whether `=` may appear in a
// buyer record's free-text fields, which means a line like
//
//   contact=ads@example.com
//
// and a (hypothetical, cursed) buyer line with an `=` in it can't be told
// apart by a generic tokenizer. So we don't write one. Each line is offered
// to a short, fixed list of classifiers, in order, and the first one that
// accepts it wins:
//
//   1. Variable: case-insensitive `CONTACT=` then `SUBDOMAIN=` prefix.
//   2. Buyer:    exactly 3 or 4 comma-separated fields.
//
// A line that nobody accepts is dropped. No error, no partial record. The
// parser is lenient because the format is.
// =============================================================================

use std::fmt;

use tracing::debug;

use crate::error::ParseError;
use crate::models::{AdsTxt, Buyer, Variable};

/// Why a single classifier passed on a line. Never escapes this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifyError {
    NotAVariable,
    FieldCount(usize),
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyError::NotAVariable => f.write_str("not a recognized variable"),
            ClassifyError::FieldCount(n) => write!(f, "{} fields, want 3 or 4", n),
        }
    }
}

type Classifier = fn(&mut AdsTxt, &str) -> Result<(), ClassifyError>;

/// The classification order. Variables first, buyers second. Do not reorder.
const CLASSIFIERS: &[(&str, Classifier)] = &[
    ("variable", parse_variable),
    ("buyer", parse_buyer_record),
];

/// Try to read `line` as one of the supported variables.
///
/// Only the prefix is checked. The value is the raw remainder of the line,
/// case preserved, no further trimming, no validation.
fn parse_variable(doc: &mut AdsTxt, line: &str) -> Result<(), ClassifyError> {
    for variable in Variable::ALL {
        let token = variable.token();
        let matches = line
            .get(..token.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(token));

        if matches {
            doc.push_variable(variable, line[token.len()..].to_string());
            return Ok(());
        }
    }
    Err(ClassifyError::NotAVariable)
}

/// Try to read `line` as a comma separated buyer record.
fn parse_buyer_record(doc: &mut AdsTxt, line: &str) -> Result<(), ClassifyError> {
    // Count commas first so obviously wrong lines never allocate.
    let fields = memchr::memchr_iter(b',', line.as_bytes()).count() + 1;
    if fields != 3 && fields != 4 {
        return Err(ClassifyError::FieldCount(fields));
    }

    let mut cols = line.split(',').map(str::trim);
    let mut next = || cols.next().unwrap_or_default().to_string();

    doc.push_buyer(Buyer {
        domain: next(),
        publisher_id: next(),
        account_type: next(),
        // A 3-field record yields nothing here, which is the empty default.
        certification_authority: next(),
    });
    Ok(())
}

/// Run the classifiers in order. Returns the name of the one that accepted
/// the line, or the last rejection if none did.
fn classify(doc: &mut AdsTxt, line: &str) -> Result<&'static str, ClassifyError> {
    let mut rejection = ClassifyError::NotAVariable;
    for (name, classifier) in CLASSIFIERS {
        match classifier(doc, line) {
            Ok(()) => return Ok(*name),
            Err(e) => rejection = e,
        }
    }
    Err(rejection)
}

/// Parse an ads.txt document.
///
/// Fails only on empty input, and even then hands the empty document back
/// inside the error. Any non-empty text parses: blank lines, comments, and
/// lines matching neither grammar are skipped.
///
/// Lines are split on `\n` with an optional trailing `\r` stripped, so both
/// Unix and Windows files work. A lone `\r` is not a line break.
pub fn parse(source: &str, text: &str) -> Result<AdsTxt, ParseError> {
    let mut doc = AdsTxt::new(source);

    if text.is_empty() {
        return Err(ParseError::EmptyInput {
            document: Box::new(doc),
        });
    }

    let mut dropped = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Err(reason) = classify(&mut doc, line) {
            dropped += 1;
            debug!(
                source = source,
                line = idx + 1,
                reason = %reason,
                "Dropping unclassifiable ads.txt line"
            );
        }
    }

    debug!(
        source = source,
        buyers = doc.buyers().len(),
        contacts = doc.contacts().len(),
        subdomains = doc.subdomains().len(),
        dropped = dropped,
        "ads.txt parse complete"
    );

    Ok(doc)
}
