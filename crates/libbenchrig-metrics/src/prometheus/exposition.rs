//! Parser for the Prometheus text exposition format
//!
//! Comments, `# HELP` and `# TYPE` lines are skipped. Sample timestamps are
//! ignored; a scrape is stamped with the time it was taken.

use std::collections::BTreeMap;

use crate::error::MetricsError;

/// One series value from a scrape
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Series {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Parse a whole exposition body
pub fn parse(body: &str) -> Result<Vec<Series>, MetricsError> {
    let mut series = Vec::new();
    for (idx, raw) in body.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        series.push(parse_line(line).map_err(|reason| MetricsError::Exposition {
            line: idx + 1,
            reason,
        })?);
    }
    Ok(series)
}

fn parse_line(line: &str) -> Result<Series, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "missing value".to_string())?;
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return Err(format!("invalid metric name {:?}", name));
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if rest.starts_with('{') {
        let (parsed, remaining) = parse_labels(&rest[1..])?;
        labels = parsed;
        rest = remaining;
    }

    let value = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| "missing value".to_string())?;

    Ok(Series {
        name: name.to_string(),
        labels,
        value: parse_value(value)?,
    })
}

/// Parse `key="value",...}` and return the labels and the text after `}`
pub(crate) fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| "unterminated label set".to_string())?;
        let key = rest[..eq].trim();
        if !is_label_name(key) {
            return Err(format!("invalid label name {:?}", key));
        }

        let after_eq = rest[eq + 1..].trim_start();
        let quoted = after_eq
            .strip_prefix('"')
            .ok_or_else(|| format!("label {} value must be quoted", key))?;
        let (value, consumed) = unescape(quoted)?;
        labels.insert(key.to_string(), value);

        rest = quoted[consumed..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        } else if !rest.starts_with('}') {
            return Err("expected ',' or '}' after label".to_string());
        }
    }
}

/// Read a quoted string body up to the closing quote. Returns the value and
/// the number of bytes consumed including the quote.
fn unescape(input: &str) -> Result<(String, usize), String> {
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, idx + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            other => out.push(other),
        }
    }
    Err("unterminated label value".to_string())
}

fn parse_value(raw: &str) -> Result<f64, String> {
    match raw {
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => raw
            .parse::<f64>()
            .map_err(|_| format!("invalid sample value {:?}", raw)),
    }
}

pub(crate) fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
