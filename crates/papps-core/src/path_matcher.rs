use regex::{Regex, RegexBuilder};

use crate::error::PappsError;

/// Compiled form of a files wildcard.
///
/// `?` matches one character other than a separator, `*` matches any run of
/// non-separator characters and `**` (or any longer run of stars) matches
/// across directories. Both `/` and `\` are accepted as separators.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: String,
    source: String,
    regex: Regex,
}

impl PathMatcher {
    pub fn compile(pattern: &str) -> Result<Self, PappsError> {
        let source = wildcard_to_regex(pattern);
        let regex = RegexBuilder::new(&format!("^(?:{source})$"))
            .case_insensitive(cfg!(windows))
            .build()
            .map_err(|err| {
                PappsError::Validation(format!("invalid files wildcard pattern: {err}"))
            })?;

        Ok(Self {
            pattern: pattern.to_string(),
            source,
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Unanchored regular expression the wildcard translates to.
    pub fn regex_source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, relative_path: &str) -> bool {
        self.regex.is_match(&relative_path.replace('\\', "/"))
    }
}

pub fn wildcard_to_regex(wildcard: &str) -> String {
    let normalized = wildcard.replace('\\', "/");
    let collapsed = collapse_star_runs(&normalized);
    regex::escape(&collapsed)
        .replace(r"\*\*", ".*")
        .replace(r"\*", r"[^\\/]*")
        .replace(r"\?", r"[^\\/]")
}

fn collapse_star_runs(wildcard: &str) -> String {
    let mut out = String::with_capacity(wildcard.len());
    let mut run = 0_usize;
    for ch in wildcard.chars() {
        if ch == '*' {
            run += 1;
            continue;
        }
        push_stars(&mut out, run);
        run = 0;
        out.push(ch);
    }
    push_stars(&mut out, run);
    out
}

fn push_stars(out: &mut String, run: usize) {
    match run {
        0 => {}
        1 => out.push('*'),
        _ => out.push_str("**"),
    }
}

/// Validation helper shared by the steps that take a files wildcard.
pub fn validate_wildcard(field: &str, pattern: Option<&str>) -> Option<String> {
    let Some(pattern) = pattern else {
        return Some(format!("{field} cannot be null."));
    };
    match PathMatcher::compile(pattern) {
        Ok(_) => None,
        Err(err) => Some(format!("{field} in an {err}")),
    }
}
