//! Build request normalization.
//!
//! The generation role's payload arrives in one of several shapes: raw
//! source, a JSON manifest (possibly with the request nested under an
//! `arguments` object), a fenced JSON block inside prose, or a fenced
//! source block. An ordered chain of typed parsers turns any of them into
//! a canonical [`BuildRequest`]; the first parser that succeeds wins.

use crate::request::BuildRequest;
use crucible_core::config::BuildConfig;
use crucible_core::{CrucibleError, Result};

/// Field names that identify a manifest object as carrying source code.
const CODE_FIELDS: [&str; 4] = ["code", "source", "sourceCode", "source_code"];

/// Fence labels accepted as source blocks.
const SOURCE_LABELS: [&str; 4] = ["csharp", "cs", "c#", ""];

/// Turns an arbitrary generation payload into a canonical build request.
pub fn normalize(payload: &str, config: &BuildConfig) -> Result<BuildRequest> {
    let parsers: [fn(&str) -> Option<BuildRequest>; 3] =
        [parse_whole_json, parse_fenced_json, parse_fenced_source];

    let mut request = parsers
        .iter()
        .find_map(|parse| parse(payload))
        .ok_or_else(|| {
            CrucibleError::normalize(
                "payload contains neither a JSON manifest with a code field nor a fenced source block",
            )
        })?;

    finalize(&mut request, config);
    Ok(request)
}

/// Parser 1: the entire payload is a JSON manifest.
fn parse_whole_json(payload: &str) -> Option<BuildRequest> {
    let value: serde_json::Value = serde_json::from_str(payload.trim()).ok()?;
    request_from_value(value)
}

/// Parser 2: a fenced block explicitly labeled as JSON.
fn parse_fenced_json(payload: &str) -> Option<BuildRequest> {
    fenced_blocks(payload)
        .into_iter()
        .filter(|(label, _)| label == "json")
        .find_map(|(_, body)| {
            let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
            request_from_value(value)
        })
}

/// Parser 3: a fenced source block, used verbatim with default settings.
fn parse_fenced_source(payload: &str) -> Option<BuildRequest> {
    fenced_blocks(payload)
        .into_iter()
        .find(|(label, body)| {
            SOURCE_LABELS.contains(&label.as_str()) && !body.trim().is_empty()
        })
        .map(|(_, body)| BuildRequest::from_code(body))
}

/// Interprets a parsed JSON value as a build request, descending one level
/// into a nested `arguments` object when the top level has no code field.
fn request_from_value(value: serde_json::Value) -> Option<BuildRequest> {
    let obj = value.as_object()?;

    if CODE_FIELDS.iter().any(|f| obj.contains_key(*f)) {
        return serde_json::from_value(value).ok();
    }

    // Tool-call style payloads nest the real request under `arguments`,
    // either as an object or as a JSON-encoded string.
    match obj.get("arguments")? {
        serde_json::Value::Object(args) if CODE_FIELDS.iter().any(|f| args.contains_key(*f)) => {
            serde_json::from_value(serde_json::Value::Object(args.clone())).ok()
        }
        serde_json::Value::String(raw) => {
            let nested: serde_json::Value = serde_json::from_str(raw).ok()?;
            let args = nested.as_object()?;
            if CODE_FIELDS.iter().any(|f| args.contains_key(*f)) {
                serde_json::from_value(nested.clone()).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Applies post-parse fixups: empty-setting defaults, escaped-newline
/// repair and the GUI OS-qualifier suffix.
fn finalize(request: &mut BuildRequest, config: &BuildConfig) {
    if request.settings.target_framework.is_empty() {
        request.settings.target_framework = config.default_target_framework.clone();
    }

    if !request.code.contains('\n') {
        if let Some(repaired) = unescape_outside_literals(&request.code) {
            request.code = repaired;
        }
    }

    // GUI builds need an OS-qualified TFM; leave an existing qualifier alone.
    if request.settings.wants_gui() && !request.settings.target_framework.contains('-') {
        request.settings.target_framework =
            format!("{}-windows", request.settings.target_framework);
    }
}

/// Extracts all fenced blocks as (label, body) pairs.
fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut label: Option<String> = None;
    let mut body = String::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            match label.take() {
                Some(l) => {
                    blocks.push((l, std::mem::take(&mut body)));
                }
                None => {
                    label = Some(rest.trim().to_lowercase());
                }
            }
        } else if label.is_some() {
            body.push_str(line);
            body.push('\n');
        }
    }
    blocks
}

/// Lexer state for the escaped-newline repair scan.
#[derive(PartialEq)]
enum LexState {
    Normal,
    Str,
    VerbatimStr,
    Char,
}

/// Replaces `\n` / `\r\n` escape sequences with real newlines, but only
/// outside string and character literals. A generated program whose whole
/// body arrived on one physical line needs its structure back without
/// corrupting literal content.
///
/// Returns `None` when no newline escape exists outside a literal; escapes
/// that live only inside string or char literals leave the code untouched.
fn unescape_outside_literals(code: &str) -> Option<String> {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut state = LexState::Normal;
    let mut repaired_newline = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            LexState::Normal => {
                if c == '@' && chars.get(i + 1) == Some(&'"') {
                    state = LexState::VerbatimStr;
                    out.push('@');
                    out.push('"');
                    i += 2;
                    continue;
                }
                if c == '"' {
                    state = LexState::Str;
                } else if c == '\'' {
                    state = LexState::Char;
                } else if c == '\\' {
                    match chars.get(i + 1) {
                        Some('n') => {
                            out.push('\n');
                            repaired_newline = true;
                            i += 2;
                            continue;
                        }
                        Some('r') if chars.get(i + 2) == Some(&'\\') && chars.get(i + 3) == Some(&'n') => {
                            out.push('\n');
                            repaired_newline = true;
                            i += 4;
                            continue;
                        }
                        Some('t') => {
                            out.push('\t');
                            i += 2;
                            continue;
                        }
                        _ => {}
                    }
                }
                out.push(c);
            }
            LexState::Str => {
                if c == '\\' {
                    out.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else {
                    if c == '"' {
                        state = LexState::Normal;
                    }
                    out.push(c);
                }
            }
            LexState::VerbatimStr => {
                if c == '"' {
                    if chars.get(i + 1) == Some(&'"') {
                        // Doubled quote stays inside the verbatim string.
                        out.push('"');
                        out.push('"');
                        i += 2;
                        continue;
                    }
                    state = LexState::Normal;
                }
                out.push(c);
            }
            LexState::Char => {
                if c == '\\' {
                    out.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else {
                    if c == '\'' {
                        state = LexState::Normal;
                    }
                    out.push(c);
                }
            }
        }
        i += 1;
    }
    repaired_newline.then_some(out)
}
