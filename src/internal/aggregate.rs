//! In-memory aggregate of logical screenshot identities.
//!
//! Nodes hold plain paths to the physical images; the file system stays the
//! source of truth and the aggregate is rebuilt wholesale when it changes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::internal::models::{ScreenshotKey, VariantCategory};

pub const ROOT_LABEL: &str = "Wdio Resources";

/// One logical screenshot: every physical variant sharing a display name within a spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotIdentity {
    pub display_name: String,
    references: Vec<PathBuf>,
    latests: Vec<PathBuf>,
    diffs: Vec<PathBuf>,
    unused: bool,
}

impl ScreenshotIdentity {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn files(&self, category: VariantCategory) -> &[PathBuf] {
        match category {
            VariantCategory::Reference => &self.references,
            VariantCategory::Latest => &self.latests,
            VariantCategory::Diff => &self.diffs,
        }
    }

    fn files_mut(&mut self, category: VariantCategory) -> &mut Vec<PathBuf> {
        match category {
            VariantCategory::Reference => &mut self.references,
            VariantCategory::Latest => &mut self.latests,
            VariantCategory::Diff => &mut self.diffs,
        }
    }

    /// Attach a physical file; attaching the same path twice is a no-op.
    pub fn add_file(&mut self, category: VariantCategory, path: PathBuf) {
        let files = self.files_mut(category);
        if !files.contains(&path) {
            files.push(path);
        }
    }

    /// Detach `path` from `category`; returns whether it was attached.
    pub fn remove_file(&mut self, category: VariantCategory, path: &Path) -> bool {
        let files = self.files_mut(category);
        let before = files.len();
        files.retain(|file| file != path);
        before != files.len()
    }

    /// Every attached file with its category, references first.
    pub fn all_files(&self) -> Vec<(VariantCategory, PathBuf)> {
        VariantCategory::AGGREGATION_ORDER
            .iter()
            .flat_map(|category| {
                self.files(*category)
                    .iter()
                    .map(move |path| (*category, path.clone()))
            })
            .collect()
    }

    pub fn has_diff(&self) -> bool {
        !self.diffs.is_empty()
    }

    pub fn has_latest(&self) -> bool {
        !self.latests.is_empty()
    }

    pub fn is_unused(&self) -> bool {
        self.unused
    }

    pub fn set_unused(&mut self, unused: bool) {
        self.unused = unused;
    }

    pub fn file_count(&self) -> usize {
        self.references.len() + self.latests.len() + self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }

    pub fn label(&self, show_statistics: bool) -> String {
        match show_statistics {
            true => format!("{} ({})", self.display_name, self.references.len()),
            false => self.display_name.clone(),
        }
    }
}

/// One spec: its screenshot identities, snapshot folders, and optional source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecIdentity {
    pub display_name: String,
    pub folders: Vec<PathBuf>,
    pub spec_file: Option<PathBuf>,
    screenshots: Vec<ScreenshotIdentity>,
}

impl SpecIdentity {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Self::default()
        }
    }

    pub fn screenshots(&self) -> &[ScreenshotIdentity] {
        &self.screenshots
    }

    pub fn screenshots_mut(&mut self) -> &mut [ScreenshotIdentity] {
        &mut self.screenshots
    }

    pub fn find(&self, display_name: &str) -> Option<&ScreenshotIdentity> {
        self.screenshots
            .iter()
            .find(|screenshot| screenshot.display_name == display_name)
    }

    pub fn find_mut(&mut self, display_name: &str) -> Option<&mut ScreenshotIdentity> {
        self.screenshots
            .iter_mut()
            .find(|screenshot| screenshot.display_name == display_name)
    }

    pub fn find_or_insert(&mut self, display_name: &str) -> &mut ScreenshotIdentity {
        let index = match self
            .screenshots
            .iter()
            .position(|screenshot| screenshot.display_name == display_name)
        {
            Some(index) => index,
            None => {
                self.screenshots.push(ScreenshotIdentity::new(display_name));
                self.screenshots.len() - 1
            }
        };
        &mut self.screenshots[index]
    }

    pub fn remove(&mut self, display_name: &str) -> Option<ScreenshotIdentity> {
        let index = self
            .screenshots
            .iter()
            .position(|screenshot| screenshot.display_name == display_name)?;
        Some(self.screenshots.remove(index))
    }

    pub fn add_folder(&mut self, folder: PathBuf) {
        if !self.folders.contains(&folder) {
            self.folders.push(folder);
        }
    }

    pub fn sort(&mut self) {
        self.screenshots
            .sort_by(|l, r| l.display_name.cmp(&r.display_name));
    }

    pub fn is_empty(&self) -> bool {
        self.screenshots.is_empty()
    }

    pub fn label(&self, show_statistics: bool) -> String {
        match show_statistics {
            true => format!("{} ({})", self.display_name, self.screenshots.len()),
            false => self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub spec_count: usize,
    pub screenshot_count: usize,
    pub reference_count: usize,
}

/// The full set of spec identities found under one test root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateRoot {
    specs: Vec<SpecIdentity>,
}

impl AggregateRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn specs(&self) -> &[SpecIdentity] {
        &self.specs
    }

    pub fn specs_mut(&mut self) -> &mut [SpecIdentity] {
        &mut self.specs
    }

    pub fn spec(&self, display_name: &str) -> Option<&SpecIdentity> {
        self.specs.iter().find(|spec| spec.display_name == display_name)
    }

    pub fn spec_mut(&mut self, display_name: &str) -> Option<&mut SpecIdentity> {
        self.specs
            .iter_mut()
            .find(|spec| spec.display_name == display_name)
    }

    /// Insert a new spec identity unless one with the same display name exists.
    /// Returns the spec stored under that name.
    pub fn insert_spec(&mut self, spec: SpecIdentity) -> &mut SpecIdentity {
        let index = match self
            .specs
            .iter()
            .position(|existing| existing.display_name == spec.display_name)
        {
            Some(index) => index,
            None => {
                self.specs.push(spec);
                self.specs.len() - 1
            }
        };
        &mut self.specs[index]
    }

    pub fn remove_spec(&mut self, display_name: &str) -> Option<SpecIdentity> {
        let index = self
            .specs
            .iter()
            .position(|spec| spec.display_name == display_name)?;
        Some(self.specs.remove(index))
    }

    pub fn screenshot(&self, key: &ScreenshotKey) -> Option<&ScreenshotIdentity> {
        self.spec(&key.spec)?.find(&key.screenshot)
    }

    pub fn screenshot_mut(&mut self, key: &ScreenshotKey) -> Option<&mut ScreenshotIdentity> {
        self.spec_mut(&key.spec)?.find_mut(&key.screenshot)
    }

    /// Keys of every screenshot identity, in tree order.
    pub fn keys(&self) -> Vec<ScreenshotKey> {
        self.specs
            .iter()
            .flat_map(|spec| {
                spec.screenshots()
                    .iter()
                    .map(|screenshot| ScreenshotKey::new(&spec.display_name, &screenshot.display_name))
            })
            .collect()
    }

    pub fn sort_all(&mut self) {
        for spec in &mut self.specs {
            spec.sort();
        }
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            spec_count: self.specs.len(),
            screenshot_count: self.specs.iter().map(|spec| spec.screenshots().len()).sum(),
            reference_count: self
                .specs
                .iter()
                .flat_map(|spec| spec.screenshots())
                .map(|screenshot| screenshot.files(VariantCategory::Reference).len())
                .sum(),
        }
    }

    /// Display names and per-category file counts, independent of listing order.
    pub fn summary(&self) -> BTreeMap<ScreenshotKey, [usize; 3]> {
        self.specs
            .iter()
            .flat_map(|spec| {
                spec.screenshots().iter().map(|screenshot| {
                    (
                        ScreenshotKey::new(&spec.display_name, &screenshot.display_name),
                        [
                            screenshot.files(VariantCategory::Reference).len(),
                            screenshot.files(VariantCategory::Latest).len(),
                            screenshot.files(VariantCategory::Diff).len(),
                        ],
                    )
                })
            })
            .collect()
    }

    /// Indented text rendering of the tree, as shown by the CLI.
    pub fn render(&self, show_statistics: bool) -> String {
        let mut out = String::new();
        let root_label = match show_statistics {
            true => format!("{} ({})", ROOT_LABEL, self.specs.len()),
            false => ROOT_LABEL.to_string(),
        };
        let _ = writeln!(out, "{root_label}");
        for spec in &self.specs {
            let _ = writeln!(out, "  {}", spec.label(show_statistics));
            for screenshot in spec.screenshots() {
                let mut markers = Vec::new();
                if screenshot.has_diff() {
                    markers.push("diff");
                }
                if screenshot.has_latest() {
                    markers.push("latest");
                }
                if screenshot.is_unused() {
                    markers.push("unused");
                }
                let label = screenshot.label(show_statistics);
                match markers.is_empty() {
                    true => {
                        let _ = writeln!(out, "    {label}");
                    }
                    false => {
                        let _ = writeln!(out, "    {label} [{}]", markers.join(", "));
                    }
                }
            }
        }
        out
    }
}
