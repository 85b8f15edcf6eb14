// SPDX-License-Identifier: Apache-2.0

//! Inline expressions
//!
//! Two small languages share the `${...}` placeholder syntax (`$->{...}` is
//! accepted as an alias):
//!
//! - node lists such as `ds_${0..1}.t_order_${[0, 1]}`, expanded into the
//!   cartesian product of their placeholders;
//! - templates such as `t_order_${order_id % 2}`, whose placeholders hold
//!   integer arithmetic over named variables.

use std::sync::OnceLock;

use regex::Regex;
use shardline_core::{ShardingError, ShardingResult, Value};

fn placeholder_regex() -> ShardingResult<&'static Regex> {
    static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$(?:->)?\{([^}]*)\}"))
        .as_ref()
        .map_err(|e| ShardingError::config(format!("placeholder pattern: {e}")))
}

// ==================== Node list expansion ====================

/// Expands a node-list expression into every concrete name, in order.
pub fn expand(expression: &str) -> ShardingResult<Vec<String>> {
    let mut result = Vec::new();
    for segment in split_top_level(expression) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        result.extend(expand_segment(segment)?);
    }
    Ok(result)
}

/// Splits on commas that are not inside a placeholder.
fn split_top_level(expression: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = expression.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'{' if i > 0 && (bytes[i - 1] == b'$' || bytes[i - 1] == b'>') => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expression[start..]);
    parts
}

fn expand_segment(segment: &str) -> ShardingResult<Vec<String>> {
    let mut results = vec![String::new()];
    let mut cursor = 0usize;
    for caps in placeholder_regex()?.captures_iter(segment) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let literal = &segment[cursor..whole.start()];
        let choices = placeholder_choices(body.as_str())?;
        let mut next = Vec::with_capacity(results.len() * choices.len());
        for prefix in &results {
            for choice in &choices {
                next.push(format!("{prefix}{literal}{choice}"));
            }
        }
        results = next;
        cursor = whole.end();
    }
    let tail = &segment[cursor..];
    Ok(results.into_iter().map(|r| format!("{r}{tail}")).collect())
}

fn placeholder_choices(body: &str) -> ShardingResult<Vec<String>> {
    let body = body.trim();
    if let Some((lo, hi)) = body.split_once("..") {
        let lo: i64 = lo.trim().parse().map_err(|_| {
            ShardingError::config(format!("invalid range start in '${{{body}}}'"))
        })?;
        let hi: i64 = hi.trim().parse().map_err(|_| {
            ShardingError::config(format!("invalid range end in '${{{body}}}'"))
        })?;
        if lo > hi {
            return Err(ShardingError::config(format!("empty range '${{{body}}}'")));
        }
        return Ok((lo..=hi).map(|v| v.to_string()).collect());
    }
    let list = body
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .unwrap_or(body);
    Ok(list
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

// ==================== Templates ====================

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(i64),
    Variable(String),
    Negate(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

/// A parsed template like `t_order_${order_id % 2}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl InlineTemplate {
    pub fn parse(source: &str) -> ShardingResult<Self> {
        let mut segments = Vec::new();
        let mut cursor = 0usize;
        for caps in placeholder_regex()?.captures_iter(source) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(Segment::Literal(source[cursor..whole.start()].to_string()));
            }
            segments.push(Segment::Expr(ExprParser::new(body.as_str()).parse()?));
            cursor = whole.end();
        }
        if cursor < source.len() {
            segments.push(Segment::Literal(source[cursor..].to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names referenced by the template, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        fn collect<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
            match expr {
                Expr::Number(_) => {}
                Expr::Variable(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::Negate(inner) => collect(inner, out),
                Expr::Binary(_, l, r) => {
                    collect(l, out);
                    collect(r, out);
                }
            }
        }
        let mut out = Vec::new();
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                collect(expr, &mut out);
            }
        }
        out
    }

    /// Renders the template. A placeholder holding a bare variable renders
    /// the value as text; arithmetic requires integer operands.
    pub fn evaluate(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> ShardingResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    let value = eval(expr, lookup, &self.source)?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }
}

fn eval(expr: &Expr, lookup: &dyn Fn(&str) -> Option<Value>, source: &str) -> ShardingResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Int(*n)),
        Expr::Variable(name) => lookup(name).ok_or_else(|| {
            ShardingError::config(format!("unknown variable '{name}' in expression '{source}'"))
        }),
        Expr::Negate(inner) => {
            let v = integer(&eval(inner, lookup, source)?, source)?;
            v.checked_neg().map(Value::Int).ok_or_else(|| overflow(source))
        }
        Expr::Binary(op, l, r) => {
            let a = integer(&eval(l, lookup, source)?, source)?;
            let b = integer(&eval(r, lookup, source)?, source)?;
            let result = match op {
                '+' => a.checked_add(b),
                '-' => a.checked_sub(b),
                '*' => a.checked_mul(b),
                '/' => a.checked_div(b),
                '%' => a.checked_rem(b),
                _ => None,
            };
            result.map(Value::Int).ok_or_else(|| overflow(source))
        }
    }
}

fn integer(value: &Value, source: &str) -> ShardingResult<i64> {
    value.as_i64().ok_or_else(|| {
        ShardingError::config(format!(
            "expression '{source}' needs an integer operand, got '{value}'"
        ))
    })
}

fn overflow(source: &str) -> ShardingError {
    ShardingError::config(format!(
        "arithmetic overflow or division by zero in '{source}'"
    ))
}

struct ExprParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            source,
        }
    }

    fn parse(mut self) -> ShardingResult<Expr> {
        let expr = self.additive()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn additive(&mut self) -> ShardingResult<Expr> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.eat_any(&['+', '-']) {
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> ShardingResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_any(&['*', '/', '%']) {
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> ShardingResult<Expr> {
        if self.eat_any(&['-']).is_some() {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> ShardingResult<Expr> {
        self.skip_ws();
        let Some(&c) = self.chars.get(self.pos) else {
            return Err(self.error("unexpected end of expression"));
        };
        if c == '(' {
            self.pos += 1;
            let inner = self.additive()?;
            if self.eat_any(&[')']).is_none() {
                return Err(self.error("missing ')'"));
            }
            return Ok(inner);
        }
        if c.is_ascii_digit() {
            let start = self.pos;
            while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            return text
                .parse()
                .map(Expr::Number)
                .map_err(|_| self.error("number out of range"));
        }
        if c.is_alphabetic() || c == '_' {
            let start = self.pos;
            while self
                .chars
                .get(self.pos)
                .is_some_and(|c| c.is_alphanumeric() || *c == '_')
            {
                self.pos += 1;
            }
            return Ok(Expr::Variable(self.chars[start..self.pos].iter().collect()));
        }
        Err(self.error(&format!("unexpected character '{c}'")))
    }

    fn eat_any(&mut self, ops: &[char]) -> Option<char> {
        self.skip_ws();
        let c = *self.chars.get(self.pos)?;
        if ops.contains(&c) {
            self.pos += 1;
            Some(c)
        } else {
            None
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, msg: &str) -> ShardingError {
        ShardingError::config(format!("invalid inline expression '{}': {msg}", self.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_ranges_and_lists() {
        let nodes = expand("ds_${0..1}.t_order_${[0, 1]}").unwrap();
        assert_eq!(
            nodes,
            vec![
                "ds_0.t_order_0",
                "ds_0.t_order_1",
                "ds_1.t_order_0",
                "ds_1.t_order_1"
            ]
        );
    }

    #[test]
    fn expands_comma_separated_segments() {
        let nodes = expand("ds_0.t_user, ds_$->{['a','b']}.t_user").unwrap();
        assert_eq!(nodes, vec!["ds_0.t_user", "ds_a.t_user", "ds_b.t_user"]);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(expand("t_${3..1}").is_err());
    }

    #[test]
    fn evaluates_arithmetic_templates() {
        let template = InlineTemplate::parse("t_order_${(order_id + 1) % 2}").unwrap();
        assert_eq!(template.variables(), vec!["order_id"]);
        let name = template
            .evaluate(&|var| (var == "order_id").then_some(Value::Int(4)))
            .unwrap();
        assert_eq!(name, "t_order_1");
    }

    #[test]
    fn bare_variables_render_as_text() {
        let template = InlineTemplate::parse("${value}").unwrap();
        let name = template.evaluate(&|_| Some(Value::from("ds_1"))).unwrap();
        assert_eq!(name, "ds_1");
    }

    #[test]
    fn arithmetic_on_text_fails() {
        let template = InlineTemplate::parse("t_${id % 2}").unwrap();
        assert!(template.evaluate(&|_| Some(Value::from("abc"))).is_err());
        assert!(InlineTemplate::parse("t_${id %}").is_err());
        let zero = InlineTemplate::parse("t_${id % 0}").unwrap();
        assert!(zero.evaluate(&|_| Some(Value::Int(1))).is_err());
    }
}
