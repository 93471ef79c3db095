//! Breadcrumbs describing where a screenshot sits in the dimensional hierarchy.
//!
//! Both layouts put the dimensional segments directly after the category
//! folder: `locale/browser_viewport` for the legacy layout and
//! `theme/locale/browser_viewport` for the modern one.
//!
//! Callers must only pass reference or diff paths. A path carrying neither
//! marker is a caller bug and panics instead of producing a wrong breadcrumb.

use crate::internal::models::{DimensionalContext, VariantCategory};

pub const LEGACY_SEPARATOR: &str = " | ";
pub const MODERN_SEPARATOR: &str = " / ";

/// The `/`-separated remainder of `path` after its diff or reference marker.
///
/// # Panics
///
/// When `path` contains neither `/__snapshots__/diff` nor `/__snapshots__/reference`.
fn after_category(path: &str) -> &str {
    find_after_category(path).unwrap_or_else(|| {
        panic!("context parsing requires a diff or reference screenshot path, got '{path}'")
    })
}

fn find_after_category(path: &str) -> Option<&str> {
    let diff = VariantCategory::Diff.marker();
    let marker = match path.contains(&diff) {
        true => diff,
        false => VariantCategory::Reference.marker(),
    };
    let start = path.rfind(&marker)?;
    path.get(start + marker.len() + 1..)
}

/// Whether `path` is a diff or reference screenshot with every segment a
/// breadcrumb needs: the dimensional folders, the spec folder and the file.
pub fn is_screenshot_path(path: &str, themed: bool) -> bool {
    let dimensions = if themed { 3 } else { 2 };
    find_after_category(path).is_some_and(|rest| {
        let parts: Vec<&str> = rest.split('/').collect();
        parts.len() >= dimensions + 2 && parts.iter().all(|part| !part.is_empty())
    })
}

fn segments(path: &str, expected: usize) -> Vec<&str> {
    let segments: Vec<&str> = after_category(path).split('/').collect();
    assert!(
        segments.len() >= expected,
        "screenshot path '{path}' has fewer than {expected} dimensional segments"
    );
    segments
}

/// `locale | browser | viewport` for the legacy layout.
pub fn parse_legacy(path: &str, separator: &str) -> String {
    let parts = segments(path, 2);
    format!("{}{}{}", parts[0], separator, parts[1].replace('_', separator))
}

/// `theme / locale / browser / viewport` for the modern layout.
pub fn parse_modern(path: &str, separator: &str) -> String {
    let parts = segments(path, 3);
    format!(
        "{}{sep}{}{sep}{}",
        parts[0],
        parts[1],
        parts[2].replace('_', separator),
        sep = separator
    )
}

/// Structured form of the same segments. `themed` selects the modern layout.
pub fn dimensional_context(path: &str, themed: bool) -> DimensionalContext {
    let parts = segments(path, if themed { 3 } else { 2 });
    let (theme, rest) = match themed {
        true => (Some(parts[0].to_string()), &parts[1..]),
        false => (None, &parts[..]),
    };
    let (browser, viewport) = rest[1].split_once('_').unwrap_or((rest[1], ""));
    DimensionalContext {
        theme,
        locale: rest[0].to_string(),
        browser: browser.to_string(),
        viewport: viewport.to_string(),
    }
}
