use std::path::Path;

use crate::internal::models::{SPEC_FOLDER_SUFFIX, VariantCategory};
use crate::vfs::FsEntry;

/// Depth of the category folder above a spec folder in the legacy layout:
/// `<category>/<locale>/<browser_viewport>/<spec>`.
pub const LEGACY_CATEGORY_DEPTH: usize = 3;

/// Same for the modern layout: `<category>/<theme>/<locale>/<browser_viewport>/<spec>`.
pub const MODERN_CATEGORY_DEPTH: usize = 4;

/// Name of the ancestor `depth` levels above `dir`.
pub fn ancestor_name(dir: &Path, depth: usize) -> Option<&str> {
    dir.ancestors()
        .nth(depth)
        .and_then(|ancestor| ancestor.file_name())
        .and_then(|name| name.to_str())
}

/// The category a spec folder belongs to, read from its fixed-depth ancestor.
pub fn folder_category(dir: &Path, depth: usize) -> Option<VariantCategory> {
    ancestor_name(dir, depth).and_then(VariantCategory::from_folder_name)
}

/// Spec folders among `entries` that live under the `category` folder.
pub fn collect_spec_folders(category: VariantCategory, entries: &[FsEntry], depth: usize) -> Vec<&FsEntry> {
    entries
        .iter()
        .filter(|entry| entry.is_dir)
        .filter(|entry| entry.name().ends_with(SPEC_FOLDER_SUFFIX))
        .filter(|entry| ancestor_name(&entry.path, depth) == Some(category.folder_name()))
        .collect()
}
