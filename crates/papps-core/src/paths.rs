use std::path::{Path, PathBuf};

/// Characters that may never appear in a single file name component.
const INVALID_FILE_NAME_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '/', '\\'];

/// Characters that may never appear anywhere in a path.
pub const INVALID_PATH_CHARS: &[char] = &['"', '<', '>', '|'];

fn is_invalid_file_name_char(ch: char) -> bool {
    ch.is_control() || INVALID_FILE_NAME_CHARS.contains(&ch)
}

pub fn is_invalid_path_char(ch: char) -> bool {
    ch.is_control() || INVALID_PATH_CHARS.contains(&ch)
}

pub fn is_separator(ch: char) -> bool {
    ch == '/' || ch == '\\'
}

/// Checks that `path` names a location inside an install directory.
///
/// Returns a message naming `field` when the value is missing, empty (unless
/// `allow_empty`), contains reserved characters, is rooted, or climbs above
/// the root through `..` components.
pub fn validate_relative_path(field: &str, path: Option<&str>, allow_empty: bool) -> Option<String> {
    let Some(path) = path else {
        return Some(format!("{field} cannot be null."));
    };

    if path.trim().is_empty() {
        if allow_empty {
            return None;
        }
        return Some(format!("{field} cannot be empty."));
    }

    if path
        .chars()
        .any(|ch| !is_separator(ch) && is_invalid_file_name_char(ch))
    {
        return Some(format!("{field} contain invalid characters."));
    }

    if is_rooted(path) {
        return Some(format!("{field} should be relative and cannot be rooted."));
    }

    let mut depth = 0_usize;
    for component in relative_components(path) {
        if component == ".." {
            let Some(next) = depth.checked_sub(1) else {
                return Some(format!(
                    "{field} must remain below the application installation folder."
                ));
            };
            depth = next;
        } else {
            depth += 1;
        }
    }

    None
}

fn is_rooted(path: &str) -> bool {
    if path.starts_with(is_separator) {
        return true;
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    Path::new(path).has_root()
}

/// Splits a manifest path on either separator, dropping empty and `.` parts.
pub fn relative_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(is_separator)
        .filter(|component| !component.is_empty() && *component != ".")
}

/// Joins a manifest-relative path onto `root`, honouring both separators.
pub fn resolve_relative(root: &Path, relative: &str) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for component in relative_components(relative) {
        if component == ".." {
            resolved.pop();
        } else {
            resolved.push(component);
        }
    }
    resolved
}

pub fn ends_with_separator(path: &str) -> bool {
    path.ends_with(is_separator)
}

/// Replaces every character that cannot appear in a file name with `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| if is_invalid_file_name_char(ch) { '_' } else { ch })
        .collect()
}
