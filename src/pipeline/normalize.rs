//! Text normalisation shared by every extractor.
//!
//! Source cells mix full-width and half-width forms, embed line breaks and
//! ideographic spaces, and use a bare `0` for "not applicable". Everything
//! extracted passes through [`normalize`] so that the same facility name
//! produces the same key in the spreadsheet and in the open data.
//!
//! ## Rule Order
//!
//! 1. Absence sentinel: a bare `"0"` becomes `""`
//! 2. Ideographic space, CR and LF become ASCII spaces
//! 3. Runs of spaces collapse to one; the ends are trimmed
//! 4. NFKC folds full-width digits, letters and symbols to half width
//! 5. Rules 1 and 3 run again, since NFKC can itself yield spaces
//!    (`U+00A0`, `U+2003`) or a bare `0` (`U+FF10`)
//!
//! Step 5 is what makes `normalize(normalize(s)) == normalize(s)` hold.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Open-data convention: a bare zero means "field not applicable".
pub const ABSENT_SENTINEL: &str = "0";

/// The two circle glyphs the spreadsheet uses as a "yes" mark:
/// WHITE CIRCLE and IDEOGRAPHIC NUMBER ZERO.
pub const PRESENCE_MARKS: [char; 2] = ['\u{25CB}', '\u{3007}'];

/// Canonicalise one extracted value.
pub fn normalize(raw: &str) -> String {
    if raw == ABSENT_SENTINEL {
        return String::new();
    }
    let s = collapse_spaces(&unify_breaks(raw));
    let s: String = s.nfkc().collect();
    let s = collapse_spaces(&s);
    if s == ABSENT_SENTINEL {
        String::new()
    } else {
        s
    }
}

/// [`normalize`] for values that may be missing; a missing value is `""`.
pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize).unwrap_or_default()
}

/// Normalise every cell of a row.
pub fn normalize_row<S: AsRef<str>>(row: &[S]) -> Vec<String> {
    row.iter().map(|cell| normalize(cell.as_ref())).collect()
}

/// `true` when the text contains either presence-mark glyph anywhere.
pub fn is_marked(text: &str) -> bool {
    text.contains(PRESENCE_MARKS)
}

// ── Rule 2: Unify line breaks and ideographic spaces ─────────────────────────

fn unify_breaks(input: &str) -> String {
    input.replace(['\u{3000}', '\r', '\n'], " ")
}

// ── Rule 3: Collapse space runs and trim ─────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn collapse_spaces(input: &str) -> String {
    RE_SPACES.replace_all(input.trim(), " ").into_owned()
}
