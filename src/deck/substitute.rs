//! Braced parameter substitution.
//!
//! A deck may name values inside braces and reuse them:
//!
//! ```text
//! EL={E_M=3.0E3},{E_M},{NU_M=0.3},{NU_M},{0.5*E_M/(1+NU_M)},45.0E-6,45.0E-6
//! ```
//!
//! `{NAME=literal}` defines a default and stands for the literal,
//! `{NAME}` stands for the current value of `NAME`, and a placeholder
//! containing an operator is evaluated as an arithmetic expression over
//! numbers and names. Defaults may appear anywhere in the text, including
//! after `*END`. Caller-supplied overrides win over defaults.
//!
//! Substitution is a text-to-text pass that runs before line reading.

use std::collections::HashMap;

use crate::error::{DeckError, Result};

/// Characters that turn a placeholder into an expression.
const OPERATORS: &[char] = &['+', '-', '*', '/'];

/// Find the inner text of every `{...}` placeholder on a line.
fn placeholders(line: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open = None;
    for (i, ch) in line.char_indices() {
        match ch {
            '{' => open = Some(i),
            '}' => {
                if let Some(start) = open.take() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }
    spans
}

/// Named values collected from a deck.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    values: HashMap<String, String>,
}

impl ParameterTable {
    /// Collect `{NAME=literal}` defaults from `text` and apply overrides.
    ///
    /// The first default given for a name is used.
    pub fn collect(text: &str, overrides: &HashMap<String, String>) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            for (start, end) in placeholders(line) {
                if let Some((name, literal)) = line[start + 1..end].split_once('=') {
                    values
                        .entry(name.trim().to_string())
                        .or_insert_with(|| literal.trim().to_string());
                }
            }
        }
        for (name, value) in overrides {
            values.insert(name.clone(), value.clone());
        }
        Self { values }
    }

    /// Current literal for a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Number of named values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether no values were collected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve one placeholder body to its replacement text.
    fn resolve(&self, body: &str) -> Result<String> {
        if let Some((name, _)) = body.split_once('=') {
            let name = name.trim();
            return self.get(name).map(str::to_string).ok_or_else(|| DeckError::ParameterUndefined {
                name: name.to_string(),
            });
        }
        let body = body.trim();
        if let Some(value) = self.get(body) {
            return Ok(value.to_string());
        }
        if body.contains(OPERATORS) {
            let value = evaluate(body, self)?;
            return Ok(scientific(value));
        }
        Err(DeckError::ParameterUndefined {
            name: body.to_string(),
        })
    }
}

/// Six-digit scientific notation with a signed, two-digit exponent
/// (`1.000000E+03`).
fn scientific(value: f64) -> String {
    let text = format!("{:.6E}", value);
    match text.split_once('E') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(e) => format!("{}E{}{:02}", mantissa, if e < 0 { '-' } else { '+' }, e.abs()),
            Err(_) => text,
        },
        None => text,
    }
}

/// Replace every braced placeholder in `text`.
///
/// Text without braces is returned unchanged.
pub fn substitute(text: &str, overrides: &HashMap<String, String>) -> Result<String> {
    if !text.contains('{') {
        return Ok(text.to_string());
    }

    let table = ParameterTable::collect(text, overrides);
    let mut out = String::with_capacity(text.len());

    for line in text.split_inclusive('\n') {
        let mut last = 0;
        for (start, end) in placeholders(line) {
            out.push_str(&line[last..start]);
            out.push_str(&table.resolve(&line[start + 1..end])?);
            last = end + 1;
        }
        out.push_str(&line[last..]);
    }

    Ok(out)
}

// ============ Expression evaluation ============

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Number(f64),
    Name(String),
    Op(&'static str),
    OpenParen,
    CloseParen,
}

fn tokenize(expr: &str) -> Result<Vec<ExprToken>> {
    let invalid = |message: String| DeckError::InvalidExpression {
        expr: expr.to_string(),
        message,
    };
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::CloseParen);
            }
            '*' | '/' => {
                chars.next();
                let doubled = chars.peek().is_some_and(|&(_, c)| c == ch);
                if doubled {
                    chars.next();
                }
                tokens.push(ExprToken::Op(match (ch, doubled) {
                    ('*', true) => "**",
                    ('*', false) => "*",
                    ('/', true) => "//",
                    _ => "/",
                }));
            }
            '+' | '-' | '%' | '^' => {
                chars.next();
                tokens.push(ExprToken::Op(match ch {
                    '+' => "+",
                    '-' => "-",
                    '%' => "%",
                    _ => "**",
                }));
            }
            '0'..='9' | '.' => {
                let mut end = start;
                let mut prev = ' ';
                while let Some(&(i, c)) = chars.peek() {
                    let exponent_sign = (c == '-' || c == '+') && (prev == 'e' || prev == 'E');
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                        end = i + c.len_utf8();
                        prev = c;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &expr[start..end];
                let value = text
                    .parse()
                    .map_err(|_| invalid(format!("invalid number '{}'", text)))?;
                tokens.push(ExprToken::Number(value));
            }
            _ if ch.is_alphabetic() || ch == '_' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(ExprToken::Name(expr[start..end].to_string()));
            }
            _ => return Err(invalid(format!("unexpected character '{}'", ch))),
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator over a token slice.
struct Evaluator<'a> {
    tokens: Vec<ExprToken>,
    pos: usize,
    table: &'a ParameterTable,
    expr: &'a str,
}

impl<'a> Evaluator<'a> {
    fn error(&self, message: impl Into<String>) -> DeckError {
        DeckError::InvalidExpression {
            expr: self.expr.to_string(),
            message: message.into(),
        }
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(ExprToken::Op(op)) => Some(op),
            _ => None,
        }
    }

    // expr = term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == "+" { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term = unary (('*' | '/' | '//' | '%') unary)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ ("*" | "/" | "//" | "%")) = self.peek_op() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = match op {
                "*" => value * rhs,
                "/" | "//" | "%" if rhs == 0.0 => return Err(self.error("division by zero")),
                "/" => value / rhs,
                "//" => (value / rhs).floor(),
                _ => value - rhs * (value / rhs).floor(),
            };
        }
        Ok(value)
    }

    // unary = ('+' | '-') unary | power
    fn unary(&mut self) -> Result<f64> {
        match self.peek_op() {
            Some("-") => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some("+") => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power = primary ('**' unary)?
    fn power(&mut self) -> Result<f64> {
        let base = self.primary()?;
        if self.peek_op() == Some("**") {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;

        match token {
            ExprToken::Number(v) => Ok(v),
            ExprToken::Name(name) => {
                let literal = self.table.get(&name).ok_or_else(|| DeckError::ParameterUndefined {
                    name: name.clone(),
                })?;
                literal
                    .trim()
                    .parse()
                    .map_err(|_| self.error(format!("'{}' = '{}' is not numeric", name, literal)))
            }
            ExprToken::OpenParen => {
                let value = self.expr()?;
                match self.tokens.get(self.pos) {
                    Some(ExprToken::CloseParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

/// Evaluate an arithmetic expression whose names resolve through `table`.
pub fn evaluate(expr: &str, table: &ParameterTable) -> Result<f64> {
    let mut evaluator = Evaluator {
        tokens: tokenize(expr)?,
        pos: 0,
        table,
        expr,
    };
    let value = evaluator.expr()?;
    if evaluator.pos != evaluator.tokens.len() {
        return Err(evaluator.error("trailing input"));
    }
    Ok(value)
}
