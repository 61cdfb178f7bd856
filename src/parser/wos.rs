//! Web of Science plain-text record parsing.
//!
//! An export is a sequence of tagged records, each terminated by an `ER`
//! line, with an `EF` line closing the file:
//!
//! ```text
//! PT J
//! TI A title
//! DI 10.1000/xyz123
//! ER
//!
//! EF
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// Strict DOI shape accepted from the `DI` field.
#[allow(clippy::expect_used)]
static VALID_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("DOI regex is valid"));

const RECORD_SEPARATOR: &str = "\nER\n";
const END_OF_RECORD: &str = "ER";
const END_OF_FILE: &str = "EF";
const DOI_TAG: &str = "DI";

/// Splits export text into records, each a list of lines ending with `ER`.
///
/// ```
/// use doihive_core::parser::parse_wos_records;
///
/// let records = parse_wos_records("PT J\nDI 10.1000/a\nER\n\nPT J\nER\n\nEF\n");
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[0], ["PT J", "DI 10.1000/a", "ER"]);
/// ```
#[must_use]
pub fn parse_wos_records(text: &str) -> Vec<Vec<String>> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|block| !is_trailer(block))
        .map(|block| {
            let mut lines: Vec<String> = block.lines().map(str::to_string).collect();
            lines.push(END_OF_RECORD.to_string());
            lines
        })
        .collect()
}

fn is_trailer(block: &str) -> bool {
    block.is_empty()
        || block == END_OF_FILE
        || (block.starts_with(END_OF_FILE) && block.split_whitespace().count() == 1)
}

/// Returns the value of the first `DI` line that carries one.
#[must_use]
pub fn doi_from_record<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    lines.iter().find_map(|line| {
        let line = line.as_ref();
        if !line.starts_with(DOI_TAG) {
            return None;
        }
        let value = line.split_whitespace().skip(1).collect::<Vec<_>>().join(" ");
        (!value.is_empty()).then_some(value)
    })
}

/// Whether `doi` has the `10.<registrant>/<suffix>` shape.
#[must_use]
pub fn is_valid_doi(doi: &str) -> bool {
    VALID_DOI.is_match(doi)
}

/// All valid DOIs of an export text, in record order, duplicates kept.
#[must_use]
pub fn dois_from_text(text: &str) -> Vec<String> {
    parse_wos_records(text)
        .iter()
        .filter_map(|record| doi_from_record(record.as_slice()))
        .filter(|doi| {
            let valid = is_valid_doi(doi);
            if !valid {
                trace!(doi = %doi, "rejected malformed DOI");
            }
            valid
        })
        .collect()
}
