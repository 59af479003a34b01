//! Node path helpers and the sequential-name convention
//!
//! Paths are absolute, `/`-separated, with no trailing separator (except the
//! root itself) and no empty, `.` or `..` segments.

use super::CoordinationError;

/// Width of the zero-padded decimal suffix appended to sequential nodes
pub const SEQUENCE_WIDTH: usize = 10;

/// Validate an absolute node path
pub fn validate(path: &str) -> Result<(), CoordinationError> {
    if !path.starts_with('/') {
        return Err(CoordinationError::invalid_path(path, "must start with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(CoordinationError::invalid_path(path, "must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(CoordinationError::invalid_path(path, "empty segment")),
            "." | ".." => {
                return Err(CoordinationError::invalid_path(path, "relative segment"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Parent of a validated path, `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a validated path
pub fn name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a parent path and a child name
pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Every proper prefix of `path` plus `path` itself, shallowest first, root excluded
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result: Vec<&str> = path
        .match_indices('/')
        .skip(1)
        .map(|(idx, _)| &path[..idx])
        .collect();
    if path != "/" {
        result.push(path);
    }
    result
}

/// Append the sequence suffix to a base path or name
pub fn sequential_name(base: &str, sequence: u64) -> String {
    format!("{}{:0width$}", base, sequence, width = SEQUENCE_WIDTH)
}

/// Parse the sequence suffix of a child name created with `prefix`.
///
/// Returns `None` for names that do not follow the convention.
pub fn parse_sequence(child: &str, prefix: &str) -> Option<u64> {
    let digits = child.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
