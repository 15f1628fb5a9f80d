//! User-defined macros.
//!
//! A first pass collects every `.macro NAME [p1[, p2 ...]] ... .endm` block
//! (`.endmacro` is accepted) and removes the definitions from the stream. A
//! second pass replaces each invocation with the body: `{param}` placeholders
//! are substituted textually, and every name listed in an in-body `.local`
//! directive is suffixed with a unique per-expansion tag so labels never
//! collide across expansions. Expansion recurses so macros may invoke macros.

use crate::error::{AsmError, AsmErrorKind, Result};
use crate::line::{directive_is, is_ident, split_label, strip_comment};
use regex::Regex;
use std::collections::HashMap;

pub(crate) const MAX_MACRO_DEPTH: usize = 100;

#[derive(Debug)]
struct MacroDef {
    params: Vec<String>,
    body: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct MacroTable {
    macros: HashMap<String, MacroDef>,
    param_re: Regex,
    expansion_id: usize,
}

/// Comma- or whitespace-separated name list (macro parameters, `.local`).
fn split_names(rest: &str) -> Vec<String> {
    rest.split(',')
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect()
}

/// Whole-word replacement; word characters are `[A-Za-z0-9_]`.
fn replace_word(line: &str, word: &str, replacement: &str) -> String {
    fn is_word_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_'
    }

    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        if line[i..].starts_with(word) {
            let end = i + word.len();
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after_ok = end >= line.len() || !is_word_byte(bytes[end]);
            if before_ok && after_ok {
                out.push_str(replacement);
                i = end;
                continue;
            }
        }
        let step = line[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&line[i..i + step]);
        i += step;
    }
    out
}

impl MacroTable {
    /// Collect all macro definitions, returning the table and the stream
    /// with the definitions removed.
    pub fn collect(source: &str) -> Result<(MacroTable, Vec<String>)> {
        let mut table = MacroTable {
            macros: HashMap::new(),
            param_re: Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}").unwrap(),
            expansion_id: 0,
        };

        let lines: Vec<&str> = source.lines().collect();
        let mut kept: Vec<String> = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let raw = lines[i];
            let line = strip_comment(raw);
            if !directive_is(line, ".macro") {
                kept.push(raw.to_string());
                i += 1;
                continue;
            }

            let def_line_no = i + 1;
            let head = line[".macro".len()..].trim();
            if head.is_empty() {
                return Err(AsmError::new(AsmErrorKind::MacroMissingName, def_line_no, raw));
            }
            let (name, param_text) = match head.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (head, ""),
            };
            if !is_ident(name) {
                return Err(AsmError::new(
                    AsmErrorKind::MacroInvalidName(name.to_string()),
                    def_line_no,
                    raw,
                ));
            }
            let params = split_names(param_text);

            let mut body: Vec<String> = Vec::new();
            i += 1;
            let mut found_end = false;
            while i < lines.len() {
                let body_line = strip_comment(lines[i]);
                if directive_is(body_line, ".endm") || directive_is(body_line, ".endmacro") {
                    found_end = true;
                    break;
                }
                body.push(lines[i].to_string());
                i += 1;
            }
            if !found_end {
                return Err(AsmError::new(
                    AsmErrorKind::MacroMissingEnd(name.to_string()),
                    def_line_no,
                    raw,
                ));
            }

            let key = name.to_ascii_uppercase();
            if table.macros.contains_key(&key) {
                return Err(AsmError::new(
                    AsmErrorKind::MacroRedefined(name.to_string()),
                    def_line_no,
                    raw,
                ));
            }
            table.macros.insert(key, MacroDef { params, body });
            i += 1; // skip the .endm line
        }

        Ok((table, kept))
    }

    pub fn expand_all(&mut self, lines: Vec<String>) -> Result<Vec<String>> {
        self.expand_recursive(&lines, 0)
    }

    fn expand_recursive(&mut self, lines: &[String], depth: usize) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let stripped = strip_comment(raw);
            if stripped.is_empty() {
                out.push(raw.clone());
                continue;
            }
            let (label, rest) = split_label(stripped);
            if rest.is_empty() || rest.starts_with('.') {
                out.push(raw.clone());
                continue;
            }
            let (mnemonic, arg_text) = match rest.split_once(char::is_whitespace) {
                Some((mnemonic, rest)) => (mnemonic, rest.trim()),
                None => (rest, ""),
            };
            let key = mnemonic.to_ascii_uppercase();
            if !self.macros.contains_key(&key) {
                out.push(raw.clone());
                continue;
            }
            if depth >= MAX_MACRO_DEPTH {
                return Err(AsmError::new(AsmErrorKind::MacroDepth, line_no, raw));
            }

            let args: Vec<String> = if arg_text.is_empty() {
                Vec::new()
            } else {
                arg_text.split(',').map(|a| a.trim().to_string()).collect()
            };
            let expansion = self.expand_one(&key, &args, label, line_no, raw)?;
            let expanded = self.expand_recursive(&expansion, depth + 1)?;
            out.extend(expanded);
        }
        Ok(out)
    }

    fn expand_one(
        &mut self,
        name: &str,
        args: &[String],
        call_label: Option<&str>,
        line_no: usize,
        raw: &str,
    ) -> Result<Vec<String>> {
        self.expansion_id += 1;
        let uid = format!("__{}_{}", name, self.expansion_id);

        let def = &self.macros[name];
        if args.len() != def.params.len() {
            return Err(AsmError::new(
                AsmErrorKind::MacroArgCount {
                    name: name.to_string(),
                    expected: def.params.len(),
                    got: args.len(),
                },
                line_no,
                raw,
            ));
        }
        let pmap: HashMap<String, &str> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| (param.to_ascii_uppercase(), arg.as_str()))
            .collect();

        // Collect `.local` names and drop those directives from the body.
        let mut locals: Vec<(String, String)> = Vec::new();
        let mut filtered: Vec<&String> = Vec::new();
        for body_raw in &def.body {
            let body_line = strip_comment(body_raw);
            if directive_is(body_line, ".local") {
                for local in split_names(body_line[".local".len()..].trim()) {
                    let tagged = format!("{}{}", local, uid);
                    locals.push((local, tagged));
                }
                continue;
            }
            filtered.push(body_raw);
        }

        let mut out: Vec<String> = Vec::new();
        if let Some(label) = call_label {
            out.push(format!("{}:", label));
        }
        for body_raw in filtered {
            let mut line = self.substitute_params(name, body_raw, &pmap, line_no, raw)?;
            for (local, tagged) in &locals {
                line = replace_word(&line, local, tagged);
            }
            out.push(line);
        }
        Ok(out)
    }

    fn substitute_params(
        &self,
        name: &str,
        line: &str,
        pmap: &HashMap<String, &str>,
        line_no: usize,
        raw: &str,
    ) -> Result<String> {
        let mut out = String::with_capacity(line.len());
        let mut last = 0;
        for caps in self.param_re.captures_iter(line) {
            let whole = caps.get(0).unwrap();
            let key = caps[1].to_ascii_uppercase();
            let replacement = pmap.get(&key).ok_or_else(|| {
                AsmError::new(
                    AsmErrorKind::MacroUnknownParam {
                        name: name.to_string(),
                        param: caps[1].to_string(),
                    },
                    line_no,
                    raw,
                )
            })?;
            out.push_str(&line[last..whole.start()]);
            out.push_str(replacement);
            last = whole.end();
        }
        out.push_str(&line[last..]);
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whole_word_replacement() {
        assert_eq!(replace_word("loop: BCCso EQ, loop", "loop", "loop__M_1"),
                   "loop__M_1: BCCso EQ, loop__M_1");
        assert_eq!(replace_word("looped", "loop", "X"), "looped");
        assert_eq!(replace_word("a_loop", "loop", "X"), "a_loop");
    }

    #[test]
    fn collect_strips_definitions() {
        let src = ".macro TWICE r\nADDUR {r}, {r}\n.endm\nTWICE DR1\n";
        let (table, kept) = MacroTable::collect(src).unwrap();
        assert!(table.macros.contains_key("TWICE"));
        assert_eq!(kept, vec!["TWICE DR1".to_string()]);
    }

    #[test]
    fn expansion_substitutes_parameters() {
        let src = ".macro TWICE r\nADDUR {r}, {r}\n.endm\nTWICE DR1\n";
        let (mut table, kept) = MacroTable::collect(src).unwrap();
        let out = table.expand_all(kept).unwrap();
        assert_eq!(out, vec!["ADDUR DR1, DR1".to_string()]);
    }

    #[test]
    fn missing_endm_is_an_error() {
        let src = ".macro OOPS\nNOP\n";
        let err = MacroTable::collect(src).unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::MacroMissingEnd(_)));
    }
}
