//! Screenshot file names derived from validation calls.
//!
//! The replacement rules mirror the ones the visual regression service applies
//! when it writes images, so a name resolved here matches the file on disk
//! byte for byte.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::syntax::{CallExpr, CallId, CallIndex};

pub const SCREENSHOT_EXTENSION: &str = ".png";

/// Partial name the legacy library uses when a validation call has no name argument.
pub const DEFAULT_PARTIAL_NAME: &str = "default";

pub const SCREENSHOT_VALIDATION_CALLS: [&str; 4] = [
    "Terra.validates.screenshot",
    "Terra.validates.element",
    "Terra.it.matchesScreenshot",
    "Terra.it.validatesElement",
];

/// Blocks whose name argument prefixes legacy screenshot names.
pub const NAMING_BLOCK_CALLS: [&str; 4] = [
    "describe",
    "describe.only",
    "describe.skip",
    "Terra.describeViewports",
];

static TEST_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?P<test_id>[^)]+)\]").expect("test id pattern is valid"));
static DELIMITERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\n\x0B\f\r]+|\.|\+").expect("delimiter pattern is valid"));
static RESERVED_CHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[?<>/|*:+"]"#).expect("reserved character pattern is valid"));

pub fn is_screenshot_validation_call(call: &CallExpr) -> bool {
    SCREENSHOT_VALIDATION_CALLS.contains(&call.callee.as_str())
}

pub fn is_naming_block(call: &CallExpr) -> bool {
    NAMING_BLOCK_CALLS.contains(&call.callee.as_str())
}

/// Replace delimiter runs with `_` and file-system-hostile characters with `-`.
pub fn normalize(text: &str) -> String {
    let delimited = DELIMITERS.replace_all(text, "_");
    RESERVED_CHARACTERS.replace_all(&delimited, "-").into_owned()
}

/// The widest `[...]` segment without a `)` inside, or the whole name when there is none.
pub fn parse_test_id(partial_name: &str) -> &str {
    TEST_ID
        .captures(partial_name)
        .and_then(|caps| caps.name("test_id"))
        .map(|m| m.as_str())
        .unwrap_or(partial_name)
}

/// Legacy naming: `<enclosing block name>[<test id>].png`.
///
/// Returns an empty string when no naming block encloses the call, when
/// that block has no name literal, or when the partial name is blank.
pub fn resolve_legacy<T: CallIndex + ?Sized>(tree: &T, call: CallId, partial_name: &str) -> String {
    if partial_name.trim().is_empty() {
        return String::new();
    }
    let block_name = tree
        .find_enclosing(call, &is_naming_block)
        .and_then(|block| block.name_arg.as_ref());

    match block_name {
        Some(block_name) => {
            let test_id = parse_test_id(partial_name).trim();
            let combined = format!("{}[{}]", block_name.value.trim(), test_id);
            normalize(&combined) + SCREENSHOT_EXTENSION
        }
        None => String::new(),
    }
}

/// Modern naming: the call's own name argument only, no enclosing block.
pub fn resolve_modern(name_argument: Option<&str>) -> String {
    let Some(name) = name_argument else {
        return String::new();
    };
    if name.trim().is_empty() {
        return String::new();
    }
    let resolved = normalize(parse_test_id(name));
    match resolved.is_empty() {
        true => String::new(),
        false => resolved + SCREENSHOT_EXTENSION,
    }
}
