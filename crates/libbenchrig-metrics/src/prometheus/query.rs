//! Query expressions evaluated against recent scrapes
//!
//! Supported forms:
//!
//! ```text
//! metric{label="value"}
//! rate(metric{label="value"}[2s])
//! <either of the above> / 1048576
//! <either of the above> * 100
//! ```
//!
//! A selector evaluates to the sum of every series it matches.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use humantime_serde::re::humantime;

use super::exposition::{self, Series};
use crate::error::MetricsError;

/// One scrape of the endpoint
#[derive(Debug, Clone)]
pub struct Scrape {
    pub at: DateTime<Utc>,
    pub series: Vec<Series>,
}

/// Metric name plus exact-match label constraints
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub metric: String,
    pub labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn matches(&self, series: &Series) -> bool {
        series.name == self.metric
            && self
                .labels
                .iter()
                .all(|(k, v)| series.label(k) == Some(v.as_str()))
    }

    /// Sum of every matching series, `None` when nothing matches
    fn sum(&self, scrape: &Scrape) -> Option<f64> {
        let mut matched = false;
        let total: f64 = scrape
            .series
            .iter()
            .filter(|s| self.matches(s))
            .inspect(|_| matched = true)
            .map(|s| s.value)
            .sum();
        matched.then_some(total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Instant(Selector),
    Rate { selector: Selector, window: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    Div(f64),
    Mul(f64),
}

/// A parsed query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub expr: Expr,
    pub scale: Option<Scale>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, MetricsError> {
        Parser { src: input, pos: 0 }
            .query()
            .map_err(|reason| MetricsError::InvalidQuery {
                query: input.to_string(),
                reason,
            })
    }

    /// How far back in history this query looks
    pub fn lookback(&self) -> Duration {
        match &self.expr {
            Expr::Instant(_) => Duration::ZERO,
            Expr::Rate { window, .. } => *window,
        }
    }

    /// Evaluate against the scrape history, oldest first. Returns `None` when
    /// there is not enough data.
    pub fn evaluate(&self, history: &VecDeque<Scrape>) -> Option<f64> {
        let raw = match &self.expr {
            Expr::Instant(selector) => selector.sum(history.back()?)?,
            Expr::Rate { selector, window } => rate(selector, *window, history)?,
        };
        Some(match self.scale {
            None => raw,
            Some(Scale::Div(d)) => raw / d,
            Some(Scale::Mul(m)) => raw * m,
        })
    }
}

/// Per-second increase across the matching scrapes inside the window. Every
/// decrease between two consecutive scrapes is treated as a counter reset.
fn rate(selector: &Selector, window: Duration, history: &VecDeque<Scrape>) -> Option<f64> {
    let newest = history.back()?;
    let window = chrono::Duration::from_std(window).ok()?;
    let cutoff = newest.at - window;

    let mut points = history
        .iter()
        .filter(|scrape| scrape.at >= cutoff)
        .filter_map(|scrape| selector.sum(scrape).map(|v| (scrape.at, v)));
    let (first_at, mut previous) = points.next()?;
    let mut last_at = first_at;
    let mut increase = 0.0;
    for (at, value) in points {
        increase += if value < previous { value } else { value - previous };
        previous = value;
        last_at = at;
    }

    let elapsed = (last_at - first_at).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return None;
    }
    Some(increase / elapsed)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some(found) if found == c => {
                self.pos += c.len_utf8();
                Ok(())
            }
            Some(found) => Err(format!("expected {:?}, found {:?}", c, found)),
            None => Err(format!("expected {:?} at end of query", c)),
        }
    }

    fn ident(&mut self) -> Result<&'a str, String> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
            .unwrap_or(rest.len());
        let ident = &rest[..len];
        if !exposition::is_metric_name(ident) {
            return Err(format!("expected metric name at offset {}", self.pos));
        }
        self.pos += len;
        Ok(ident)
    }

    fn selector(&mut self, metric: &str) -> Result<Selector, String> {
        self.skip_ws();
        let mut labels = BTreeMap::new();
        if self.peek() == Some('{') {
            let (parsed, remaining) = exposition::parse_labels(&self.rest()[1..])?;
            labels = parsed;
            self.pos = self.src.len() - remaining.len();
        }
        Ok(Selector {
            metric: metric.to_string(),
            labels,
        })
    }

    fn window(&mut self) -> Result<Duration, String> {
        self.expect('[')?;
        let rest = self.rest();
        let end = rest.find(']').ok_or_else(|| "unterminated range".to_string())?;
        let window = humantime::parse_duration(rest[..end].trim())
            .map_err(|e| format!("invalid range {:?}: {}", &rest[..end], e))?;
        if window.is_zero() {
            return Err("range must be greater than zero".to_string());
        }
        self.pos += end + 1;
        Ok(window)
    }

    fn number(&mut self) -> Result<f64, String> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
            .unwrap_or(rest.len());
        let value = rest[..len]
            .parse::<f64>()
            .map_err(|_| format!("expected number at offset {}", self.pos))?;
        self.pos += len;
        Ok(value)
    }

    fn query(mut self) -> Result<Query, String> {
        let ident = self.ident()?;
        self.skip_ws();

        let expr = if ident == "rate" && self.peek() == Some('(') {
            self.pos += 1;
            let metric = self.ident()?;
            let selector = self.selector(metric)?;
            let window = self.window()?;
            self.expect(')')?;
            Expr::Rate { selector, window }
        } else {
            Expr::Instant(self.selector(ident)?)
        };

        self.skip_ws();
        let scale = match self.peek() {
            None => None,
            Some(op @ ('/' | '*')) => {
                self.pos += 1;
                let operand = self.number()?;
                if op == '/' {
                    if operand == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    Some(Scale::Div(operand))
                } else {
                    Some(Scale::Mul(operand))
                }
            }
            Some(other) => return Err(format!("unexpected {:?} at offset {}", other, self.pos)),
        };

        self.skip_ws();
        if !self.rest().is_empty() {
            return Err(format!("trailing input at offset {}", self.pos));
        }
        Ok(Query { expr, scale })
    }
}
