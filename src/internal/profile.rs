//! Naming and layout rules of the two supported screenshot test libraries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

use crate::internal::context::{self, LEGACY_SEPARATOR, MODERN_SEPARATOR};
use crate::internal::models::{DimensionalContext, VariantCategory};
use crate::internal::naming::{self, DEFAULT_PARTIAL_NAME};
use crate::internal::spec_folders::{self, LEGACY_CATEGORY_DEPTH, MODERN_CATEGORY_DEPTH};
use crate::syntax::{CallId, CallIndex};
use crate::vfs::FsEntry;

/// Dependency whose presence switches a project to the modern profile.
pub const MODERN_LIBRARY_PACKAGE: &str = "@cerner/terra-functional-testing";

const DEPENDENCY_TABLES: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// terra-toolkit: `<describe>[<test id>].png`, `locale/browser_viewport` folders.
    #[default]
    Legacy,
    /// terra-functional-testing: `<test id>.png`, `theme/locale/browser_viewport` folders.
    Modern,
    /// No screenshot library; every operation yields nothing.
    #[strum(to_string = "none", serialize = "noop")]
    #[serde(rename = "none", alias = "noop")]
    Noop,
}

/// Option names accepted by each kind of validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationProperties {
    pub screenshot: &'static [&'static str],
    pub element: &'static [&'static str],
    pub accessibility: &'static [&'static str],
}

impl Profile {
    /// Pick the profile from the project's root `package.json`.
    ///
    /// The modern library wins when it is declared in any dependency table;
    /// anything else, including a missing manifest, means legacy.
    pub fn detect(project_dir: &Path) -> Result<Self> {
        let manifest = project_dir.join("package.json");
        if !manifest.exists() {
            debug!(project_dir = %project_dir.display(), "No package.json, assuming legacy profile");
            return Ok(Self::Legacy);
        }
        let content = fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let profile = Self::from_manifest(&content)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        info!(manifest = %manifest.display(), %profile, "Detected screenshot profile");
        Ok(profile)
    }

    pub fn from_manifest(content: &str) -> Result<Self> {
        let manifest: Value = serde_json::from_str(content)?;
        let declares_modern = DEPENDENCY_TABLES.iter().any(|table| {
            manifest
                .get(table)
                .and_then(Value::as_object)
                .is_some_and(|deps| deps.contains_key(MODERN_LIBRARY_PACKAGE))
        });
        Ok(match declares_modern {
            true => Self::Modern,
            false => Self::Legacy,
        })
    }

    /// Name from the call's literal name argument. Empty when unresolvable.
    pub fn resolve_name<T: CallIndex + ?Sized>(&self, tree: &T, call: CallId) -> String {
        let name_arg = tree
            .call(call)
            .and_then(|c| c.name_arg.as_ref())
            .map(|arg| arg.value.as_str());
        match (self, name_arg) {
            (Self::Legacy, Some(name)) => naming::resolve_legacy(tree, call, name),
            (Self::Legacy, None) => String::new(),
            (Self::Modern, name) => naming::resolve_modern(name),
            (Self::Noop, _) => String::new(),
        }
    }

    /// Name the library would use for a call without a name argument.
    /// Only the legacy library has such a default.
    pub fn resolve_default_name<T: CallIndex + ?Sized>(&self, tree: &T, call: CallId) -> String {
        match self {
            Self::Legacy => naming::resolve_legacy(tree, call, DEFAULT_PARTIAL_NAME),
            Self::Modern | Self::Noop => String::new(),
        }
    }

    /// The literal name when present, otherwise the default name.
    pub fn resolve_with_fallback<T: CallIndex + ?Sized>(&self, tree: &T, call: CallId) -> String {
        let has_name_arg = tree.call(call).is_some_and(|c| c.name_arg.is_some());
        match has_name_arg {
            true => self.resolve_name(tree, call),
            false => self.resolve_default_name(tree, call),
        }
    }

    pub fn supports_default_name(&self) -> bool {
        matches!(self, Self::Legacy)
    }

    pub fn default_separator(&self) -> &'static str {
        match self {
            Self::Legacy => LEGACY_SEPARATOR,
            Self::Modern | Self::Noop => MODERN_SEPARATOR,
        }
    }

    /// Breadcrumb of a reference or diff screenshot path, `None` for the noop profile.
    ///
    /// # Panics
    ///
    /// When given a path outside the reference and diff categories.
    pub fn context_breadcrumb(&self, slash_path: &str, separator: &str) -> Option<String> {
        match self {
            Self::Legacy => Some(context::parse_legacy(slash_path, separator)),
            Self::Modern => Some(context::parse_modern(slash_path, separator)),
            Self::Noop => None,
        }
    }

    /// Whether [`Self::context_breadcrumb`] can parse `slash_path` without panicking.
    pub fn has_context(&self, slash_path: &str) -> bool {
        match self {
            Self::Legacy => context::is_screenshot_path(slash_path, false),
            Self::Modern => context::is_screenshot_path(slash_path, true),
            Self::Noop => false,
        }
    }

    pub fn dimensional_context(&self, slash_path: &str) -> Option<DimensionalContext> {
        match self {
            Self::Legacy => Some(context::dimensional_context(slash_path, false)),
            Self::Modern => Some(context::dimensional_context(slash_path, true)),
            Self::Noop => None,
        }
    }

    pub fn category_depth(&self) -> Option<usize> {
        match self {
            Self::Legacy => Some(LEGACY_CATEGORY_DEPTH),
            Self::Modern => Some(MODERN_CATEGORY_DEPTH),
            Self::Noop => None,
        }
    }

    pub fn folder_category(&self, dir: &Path) -> Option<VariantCategory> {
        self.category_depth()
            .and_then(|depth| spec_folders::folder_category(dir, depth))
    }

    pub fn collect_spec_folders<'a>(&self, category: VariantCategory, entries: &'a [FsEntry]) -> Vec<&'a FsEntry> {
        match self.category_depth() {
            Some(depth) => spec_folders::collect_spec_folders(category, entries, depth),
            None => Vec::new(),
        }
    }

    pub fn validation_properties(&self) -> ValidationProperties {
        match self {
            Self::Legacy => ValidationProperties {
                screenshot: &["misMatchTolerance", "selector", "viewports"],
                element: &["selector", "misMatchTolerance", "axeRules"],
                accessibility: &["axeRules"],
            },
            Self::Modern => ValidationProperties {
                screenshot: &["mismatchTolerance", "selector"],
                element: &["selector", "mismatchTolerance", "rules"],
                accessibility: &["rules"],
            },
            Self::Noop => ValidationProperties {
                screenshot: &[],
                element: &[],
                accessibility: &[],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CallTree;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_detection() {
        let modern = r#"{ "devDependencies": { "@cerner/terra-functional-testing": "^4.0.0" } }"#;
        let legacy = r#"{ "devDependencies": { "terra-toolkit": "^6.0.0" } }"#;
        let both = r#"{ "dependencies": { "terra-toolkit": "^6.0.0", "@cerner/terra-functional-testing": "^4.0.0" } }"#;
        assert_eq!(Profile::from_manifest(modern).unwrap(), Profile::Modern);
        assert_eq!(Profile::from_manifest(legacy).unwrap(), Profile::Legacy);
        assert_eq!(Profile::from_manifest(both).unwrap(), Profile::Modern);
        assert!(Profile::from_manifest("not json").is_err());
    }

    #[test]
    fn test_detect_without_manifest_is_legacy() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Profile::detect(dir.path()).unwrap(), Profile::Legacy);
    }

    #[test]
    fn test_fallback_resolution_per_profile() {
        let tree = CallTree::parse(
            "describe('terra screenshot', () => {\n  Terra.validates.screenshot({ selector: '#s' });\n  Terra.validates.element('this is the [test id]');\n});",
        )
        .unwrap();
        assert_eq!(Profile::Legacy.resolve_with_fallback(&tree, 1), "terra_screenshot[default].png");
        assert_eq!(Profile::Modern.resolve_with_fallback(&tree, 1), "");
        assert_eq!(Profile::Legacy.resolve_with_fallback(&tree, 2), "terra_screenshot[test_id].png");
        assert_eq!(Profile::Modern.resolve_with_fallback(&tree, 2), "test_id.png");
        assert_eq!(Profile::Noop.resolve_with_fallback(&tree, 2), "");
    }

    #[test]
    fn test_noop_yields_nothing() {
        let entries = vec![FsEntry::dir("/r/__snapshots__/reference/en/chrome_huge/a-spec")];
        assert!(Profile::Noop.collect_spec_folders(VariantCategory::Reference, &entries).is_empty());
        assert_eq!(Profile::Noop.context_breadcrumb("/r/__snapshots__/reference/en/chrome_huge/a-spec/a.png", " | "), None);
        assert!(Profile::Noop.validation_properties().screenshot.is_empty());
    }

    #[test]
    fn test_config_names() {
        assert_eq!(ron::from_str::<Profile>("modern").unwrap(), Profile::Modern);
        assert_eq!(ron::from_str::<Profile>("none").unwrap(), Profile::Noop);
        assert_eq!(Profile::Legacy.to_string(), "legacy");
        assert_eq!("Modern".parse::<Profile>().unwrap(), Profile::Modern);
        assert_eq!("noop".parse::<Profile>().unwrap(), Profile::Noop);
        assert_eq!(Profile::Noop.to_string(), "none");
    }
}
