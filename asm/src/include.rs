//! `.include` expansion.
//!
//! Include resolution order: absolute path, then the including file's
//! directory (top of the include stack), then the current working directory.
//! Each expanded region is delimited with comment markers so errors in
//! included content stay traceable, and an optional label on the `.include`
//! line is emitted immediately before the expanded content.

use crate::error::{AsmError, AsmErrorKind, Result};
use crate::line::{directive_is, split_label, strip_comment};
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const MAX_INCLUDE_DEPTH: usize = 100;

/// A UTF-8 byte-order mark at the start of a file is tolerated and dropped.
pub(crate) fn strip_bom(source: &str) -> &str {
    source.strip_prefix('\u{feff}').unwrap_or(source)
}

pub(crate) fn expand_includes(
    source: &str,
    base_stack: &mut Vec<PathBuf>,
    depth: usize,
) -> Result<String> {
    let source = strip_bom(source);
    let mut out: Vec<String> = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let stripped = strip_comment(raw);
        if stripped.is_empty() {
            out.push(raw.to_string());
            continue;
        }
        let (label, rest) = split_label(stripped);
        if !directive_is(rest, ".include") {
            out.push(raw.to_string());
            continue;
        }

        let arg = rest[".include".len()..].trim();
        if arg.is_empty() {
            return Err(AsmError::new(AsmErrorKind::IncludeMissingPath, line_no, raw));
        }
        if depth + 1 > MAX_INCLUDE_DEPTH {
            return Err(AsmError::new(AsmErrorKind::IncludeLoop, line_no, raw));
        }
        let spec = parse_include_arg(arg).map_err(|kind| AsmError::new(kind, line_no, raw))?;
        let path = resolve_include_path(&spec, base_stack);
        let text = fs::read_to_string(&path).map_err(|err| {
            AsmError::new(
                AsmErrorKind::IncludeRead {
                    path: path.clone(),
                    source: err,
                },
                line_no,
                raw,
            )
        })?;

        if let Some(label) = label {
            out.push(format!("{}:", label));
        }
        out.push(format!("; ---- begin include: {} ----", path.display()));
        base_stack.push(path.parent().map(Path::to_path_buf).unwrap_or_default());
        let expanded = expand_includes(&text, base_stack, depth + 1)?;
        base_stack.pop();
        out.push(expanded);
        out.push(format!("; ---- end include: {} ----", path.display()));
    }

    Ok(out.join("\n"))
}

/// Accepts `"path"`, `'path'`, `<path>`, or a bare token up to whitespace.
fn parse_include_arg(arg: &str) -> std::result::Result<String, AsmErrorKind> {
    let a = arg.trim();
    match a.chars().next() {
        Some(quote @ ('"' | '\'')) => match a[1..].find(quote) {
            Some(end) => Ok(a[1..1 + end].to_string()),
            None => Err(AsmErrorKind::IncludeUnterminatedPath),
        },
        Some('<') => match a.find('>') {
            Some(end) => Ok(a[1..end].to_string()),
            None => Err(AsmErrorKind::IncludeUnterminatedPath),
        },
        _ => Ok(a
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()),
    }
}

fn resolve_include_path(spec: &str, base_stack: &[PathBuf]) -> PathBuf {
    let direct = PathBuf::from(spec);
    if direct.is_absolute() && direct.exists() {
        return direct;
    }
    if let Some(base) = base_stack.last() {
        let candidate = base.join(spec);
        if candidate.exists() {
            return candidate;
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(spec);
        if candidate.exists() {
            return candidate;
        }
    }
    // Let the read fail with the original spelling.
    direct
}
