//! String path helpers shared by the local and remote endpoints.
//!
//! Local paths may arrive with either separator; remote paths always use `/`.
//! Everything is normalized to forward slashes before any prefix/suffix
//! manipulation, so path arithmetic never depends on the host platform.

/// Replace backslashes with forward slashes and drop a trailing separator.
///
/// The filesystem root (`/`) and drive roots (`C:/`) keep their separator.
pub fn normalize(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') && !normalized.ends_with(":/") {
        normalized.pop();
    }
    normalized
}

/// Last component of a path, ignoring a trailing separator.
pub fn base_name(path: &str) -> &str {
    let trimmed = trim_trailing(path);
    match trimmed.rfind(|c| c == '/' || c == '\\') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Parent directory of a path; `"."` when the path has no directory part.
pub fn parent_dir(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Join a relative suffix onto a base path with exactly one `/` between them.
pub fn join(base: &str, name: &str) -> String {
    let base = normalize(base);
    let name = normalize(name);
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        return base;
    }
    if base.is_empty() {
        return name.to_string();
    }
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Suffix of `path` below `root`, or `None` when `path` is not under `root`.
///
/// `relative_to("/a/b", "/a/b")` is `Some("")`.
pub fn relative_to(root: &str, path: &str) -> Option<String> {
    let root = normalize(root);
    let path = normalize(path);
    if path == root {
        return Some(String::new());
    }
    let prefix = if root.ends_with('/') {
        root
    } else {
        format!("{}/", root)
    };
    path.strip_prefix(&prefix).map(|rest| rest.to_string())
}

/// Every directory from the first component down to `path` itself.
///
/// `"/srv/a/b"` gives `["/srv", "/srv/a", "/srv/a/b"]`. Drive prefixes such as
/// `C:` are never returned on their own.
pub fn ancestors(path: &str) -> Vec<String> {
    let normalized = normalize(path);
    let absolute = normalized.starts_with('/');
    let mut result = Vec::new();
    let mut current = String::new();

    for component in normalized.split('/').filter(|c| !c.is_empty()) {
        if current.is_empty() {
            current = if absolute {
                format!("/{}", component)
            } else {
                component.to_string()
            };
        } else {
            current.push('/');
            current.push_str(component);
        }
        if !component.ends_with(':') {
            result.push(current.clone());
        }
    }
    result
}

/// Quote a string for a POSIX shell command line.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn trim_trailing(path: &str) -> &str {
    let trimmed = path.trim_end_matches(|c| c == '/' || c == '\\');
    if trimmed.is_empty() && !path.is_empty() {
        &path[..1]
    } else {
        trimmed
    }
}
