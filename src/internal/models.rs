use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter};

/// Name of the folder holding every screenshot variant under the test root.
pub const SNAPSHOTS_DIR: &str = "__snapshots__";

/// Suffix shared by spec folders inside the snapshot tree.
pub const SPEC_FOLDER_SUFFIX: &str = "-spec";

/// Spec source files: `*-spec.js`, `*-spec.jsx`, `*-spec.ts`.
pub static SPEC_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r".*-spec\.(jsx?|ts)$").expect("spec file pattern is valid"));

/// The three image kinds a screenshot run produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VariantCategory {
    Reference,
    Latest,
    Diff,
}

impl VariantCategory {
    /// Order in which the aggregator walks the categories. Reference comes
    /// first since only reference folders may introduce new identities.
    pub const AGGREGATION_ORDER: [VariantCategory; 3] = [
        VariantCategory::Reference,
        VariantCategory::Diff,
        VariantCategory::Latest,
    ];

    pub fn folder_name(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Latest => "latest",
            Self::Diff => "diff",
        }
    }

    pub fn from_folder_name(name: &str) -> Option<Self> {
        match name {
            "reference" => Some(Self::Reference),
            "latest" => Some(Self::Latest),
            "diff" => Some(Self::Diff),
            _ => None,
        }
    }

    /// `/__snapshots__/<category>`, the marker used to locate a category inside a path.
    pub fn marker(&self) -> String {
        format!("/{}/{}", SNAPSHOTS_DIR, self.folder_name())
    }
}

/// The capture context of one physical screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DimensionalContext {
    pub theme: Option<String>,
    pub locale: String,
    pub browser: String,
    pub viewport: String,
}

impl DimensionalContext {
    pub fn join(&self, separator: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(4);
        if let Some(theme) = &self.theme {
            parts.push(theme);
        }
        parts.push(&self.locale);
        parts.push(&self.browser);
        parts.push(&self.viewport);
        parts.join(separator)
    }
}

/// Addresses one logical screenshot inside an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScreenshotKey {
    pub spec: String,
    pub screenshot: String,
}

impl ScreenshotKey {
    pub fn new(spec: impl Into<String>, screenshot: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            screenshot: screenshot.into(),
        }
    }
}

impl fmt::Display for ScreenshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.spec, self.screenshot)
    }
}
