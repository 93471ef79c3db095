use std::path::Path;

/// Render a path with `/` separators regardless of platform.
///
/// Every marker lookup in the snapshot layout works on this form, so paths
/// coming from the file system go through here before any string matching.
pub fn to_slash(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    match std::path::MAIN_SEPARATOR {
        '/' => rendered.into_owned(),
        sep => rendered.replace(sep, "/"),
    }
}

/// Path of `path` relative to `root`, `/`-separated.
/// Returns `None` when `path` is not inside `root`.
pub fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(to_slash)
}

/// Drop everything from the last `.` of the final segment onwards.
/// Example: "nested/button-spec.js" -> "nested/button-spec"
pub fn strip_extension(slash_path: &str) -> &str {
    let name_start = slash_path.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match slash_path[name_start..].rfind('.') {
        Some(dot) => &slash_path[..name_start + dot],
        None => slash_path,
    }
}

/// File name of a path as an owned string, empty when the path has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
