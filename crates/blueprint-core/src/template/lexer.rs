//! Tokenizer for `{{ ... }}` actions
//!
//! Produces a flat list of text runs and classified actions, with `{{-`/`-}}`
//! trim markers applied and standalone block lines removed.

use crate::condition::{self, parser::read_string, Expression};
use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Var(String),
    Dot,
    If(Expression),
    ElseIf(Expression),
    Else,
    End,
    Range(String),
    Define(String),
    Template(String),
    Require { package: String, version: String },
    Comment,
}

impl Action {
    /// Actions that own their line when nothing else is on it
    fn is_block(&self) -> bool {
        !matches!(self, Action::Var(_) | Action::Dot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    Text(String),
    Action { action: Action, line: usize },
}

struct RawAction {
    body: String,
    line: usize,
    trim_left: bool,
    trim_right: bool,
}

enum RawItem {
    Text(String),
    Action(RawAction),
}

/// Tokenize a template source into text runs and actions
pub(crate) fn tokenize(source: &str) -> Result<Vec<Item>, RenderError> {
    let raw = split(source)?;

    let mut items = Vec::with_capacity(raw.len());
    let mut trims = Vec::with_capacity(raw.len());
    for item in raw {
        match item {
            RawItem::Text(text) => {
                items.push(Item::Text(text));
                trims.push((false, false));
            }
            RawItem::Action(raw) => {
                let action = classify(&raw.body, raw.line)?;
                items.push(Item::Action {
                    action,
                    line: raw.line,
                });
                trims.push((raw.trim_left, raw.trim_right));
            }
        }
    }

    apply_trim_markers(&mut items, &trims);
    strip_standalone_lines(&mut items);
    Ok(items)
}

fn split(source: &str) -> Result<Vec<RawItem>, RenderError> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some(open) = rest.find("{{") {
        let text = &rest[..open];
        line += text.matches('\n').count();
        items.push(RawItem::Text(text.to_string()));

        let after = &rest[open + 2..];
        let trim_left = after.starts_with('-')
            && after[1..].starts_with(|c: char| c.is_whitespace());
        let inner_start = if trim_left { 1 } else { 0 };

        let close = find_close(&after[inner_start..]).ok_or_else(|| {
            RenderError::MalformedTemplate {
                line,
                message: "unclosed action, expected '}}'".to_string(),
            }
        })?;
        let mut inner = &after[inner_start..inner_start + close];

        let trim_right =
            inner.ends_with('-') && inner[..inner.len() - 1].ends_with(|c: char| c.is_whitespace());
        if trim_right {
            inner = &inner[..inner.len() - 1];
        }

        items.push(RawItem::Action(RawAction {
            body: inner.trim().to_string(),
            line,
            trim_left,
            trim_right,
        }));

        line += inner.matches('\n').count();
        rest = &after[inner_start + close + 2..];
    }

    items.push(RawItem::Text(rest.to_string()));
    Ok(items)
}

/// Offset of the closing `}}`, skipping string literals and comments
fn find_close(body: &str) -> Option<usize> {
    let trimmed = body.trim_start();
    if trimmed.starts_with("/*") {
        let offset = body.len() - trimmed.len();
        let end = trimmed.find("*/")?;
        return body[offset + end..].find("}}").map(|i| offset + end + i);
    }

    let bytes = body.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn classify(body: &str, line: usize) -> Result<Action, RenderError> {
    let malformed = |message: String| RenderError::MalformedTemplate { line, message };

    if body.starts_with("/*") {
        return if body.ends_with("*/") {
            Ok(Action::Comment)
        } else {
            Err(malformed("unterminated comment".to_string()))
        };
    }
    if body == "." {
        return Ok(Action::Dot);
    }
    if let Some(name) = body.strip_prefix('.') {
        return if is_identifier(name) {
            Ok(Action::Var(name.to_string()))
        } else {
            Err(malformed(format!("invalid variable reference '{}'", body)))
        };
    }

    let (keyword, rest) = match body.find(char::is_whitespace) {
        Some(i) => (&body[..i], body[i..].trim()),
        None => (body, ""),
    };
    let condition = |source: &str| {
        condition::parse(source).map_err(|e| malformed(format!("invalid condition: {}", e)))
    };

    match keyword {
        "if" => Ok(Action::If(condition(rest)?)),
        "else" if rest.is_empty() => Ok(Action::Else),
        "else" => match rest.strip_prefix("if") {
            Some(cond) if cond.starts_with(char::is_whitespace) => {
                Ok(Action::ElseIf(condition(cond.trim())?))
            }
            _ => Err(malformed(format!("unexpected '{}' after else", rest))),
        },
        "end" if rest.is_empty() => Ok(Action::End),
        "range" => match rest.strip_prefix('.') {
            Some(name) if is_identifier(name) => Ok(Action::Range(name.to_string())),
            _ => Err(malformed("range expects a single list variable".to_string())),
        },
        "define" => {
            let (args, tail) = string_args(rest, line)?;
            match (args.as_slice(), tail.as_str()) {
                ([name], "") => Ok(Action::Define(name.clone())),
                _ => Err(malformed("define expects a quoted fragment name".to_string())),
            }
        }
        "template" => {
            let (args, tail) = string_args(rest, line)?;
            match (args.as_slice(), tail.as_str()) {
                ([name], "" | ".") => Ok(Action::Template(name.clone())),
                _ => Err(malformed("template expects a quoted fragment name".to_string())),
            }
        }
        "require" => {
            let (args, tail) = string_args(rest, line)?;
            match (args.as_slice(), tail.as_str()) {
                ([package, version], "") if !package.is_empty() && !version.is_empty() => {
                    Ok(Action::Require {
                        package: package.clone(),
                        version: version.clone(),
                    })
                }
                _ => Err(malformed(
                    "require expects a quoted package path and version".to_string(),
                )),
            }
        }
        other => Err(malformed(format!("unknown action '{}'", other))),
    }
}

/// Leading quoted string arguments, and whatever non-string text follows them
fn string_args(input: &str, line: usize) -> Result<(Vec<String>, String), RenderError> {
    let chars: Vec<char> = input.chars().collect();
    let mut args = Vec::new();
    let mut i = 0;
    loop {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '"' {
            break;
        }
        let (value, next) = read_string(&chars, i).map_err(|e| RenderError::MalformedTemplate {
            line,
            message: e.message,
        })?;
        args.push(value);
        i = next;
    }
    Ok((args, chars[i..].iter().collect::<String>().trim().to_string()))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn apply_trim_markers(items: &mut [Item], trims: &[(bool, bool)]) {
    for i in 0..items.len() {
        let (trim_left, trim_right) = trims[i];
        if trim_left && i > 0 {
            if let Item::Text(text) = &mut items[i - 1] {
                let kept = text.trim_end().len();
                text.truncate(kept);
            }
        }
        if trim_right && i + 1 < items.len() {
            if let Item::Text(text) = &mut items[i + 1] {
                *text = text.trim_start().to_string();
            }
        }
    }
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

/// Remove lines that hold nothing but a single block action
///
/// A false `{{if}}` written on its own line then leaves no blank line behind.
fn strip_standalone_lines(items: &mut [Item]) {
    let last = items.len().saturating_sub(1);
    // (start, end) byte window kept of each text item
    let mut windows: Vec<(usize, usize)> = items
        .iter()
        .map(|item| match item {
            Item::Text(t) => (0, t.len()),
            Item::Action { .. } => (0, 0),
        })
        .collect();

    for i in 0..items.len() {
        let is_block = matches!(&items[i], Item::Action { action, .. } if action.is_block());
        if !is_block {
            continue;
        }

        let before = if i == 0 {
            Some(None)
        } else {
            match &items[i - 1] {
                Item::Text(t) => match t.rfind('\n') {
                    Some(pos) if is_blank(&t[pos + 1..]) => Some(Some(pos + 1)),
                    None if i - 1 == 0 && is_blank(t) => Some(Some(0)),
                    _ => None,
                },
                Item::Action { .. } => None,
            }
        };
        let after = if i == last {
            Some(None)
        } else {
            match &items[i + 1] {
                Item::Text(t) => match t.find('\n') {
                    Some(pos) if is_blank(&t[..pos]) => Some(Some(pos + 1)),
                    None if i + 1 == last && is_blank(t) => Some(Some(t.len())),
                    _ => None,
                },
                Item::Action { .. } => None,
            }
        };

        if let (Some(before), Some(after)) = (before, after) {
            if let Some(end) = before {
                let window = &mut windows[i - 1];
                window.1 = window.1.min(end);
            }
            if let Some(start) = after {
                let window = &mut windows[i + 1];
                window.0 = window.0.max(start);
            }
        }
    }

    for (item, (start, end)) in items.iter_mut().zip(windows) {
        if let Item::Text(text) = item {
            *text = if start < end {
                text[start..end].to_string()
            } else {
                String::new()
            };
        }
    }
}
