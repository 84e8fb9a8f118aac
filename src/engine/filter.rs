//! Attribute filters for the in-memory engine.
//!
//! Understands the subset of OGR SQL that attribute filters use in practice:
//! comparisons (`= <> != < <= > >=`), `AND`, `OR`, `NOT`, `IN (...)`,
//! `IS [NOT] NULL`, `LIKE` with `%`/`_` wildcards, and parentheses. Field names
//! may be bare or double-quoted, strings are single-quoted (`''` escapes a quote).
//!
//! Evaluation is three-valued: any comparison involving a null is unknown and a
//! feature only matches when the whole expression is true.

use std::cmp::Ordering;

use crate::engine::{FieldDefn, FieldValue};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

#[derive(Clone, Debug, PartialEq)]
enum Literal {
    Str(String),
    Num(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Operand {
    Field(usize),
    Literal(Literal),
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Operand, CmpOp, Operand),
    In {
        field: usize,
        values: Vec<Literal>,
        negated: bool,
    },
    IsNull {
        field: usize,
        negated: bool,
    },
    Like {
        field: usize,
        pattern: String,
        negated: bool,
    },
}

/// A parsed filter bound to a layer's fields.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeFilter {
    expr: Expr,
}

impl AttributeFilter {
    /// Parse `clause` against `fields`. The error is a human-readable parser
    /// diagnostic.
    pub fn parse(clause: &str, fields: &[FieldDefn]) -> Result<AttributeFilter, String> {
        let tokens = tokenize(clause)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            fields,
            nesting: 0,
            connectives: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected {} after end of expression", describe(token)));
        }
        Ok(AttributeFilter { expr })
    }

    /// Whether `values` (aligned with the fields given to [`parse`](Self::parse)) match.
    pub fn matches(&self, values: &[FieldValue]) -> bool {
        eval(&self.expr, values) == Some(true)
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{name}'"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Num(n) => format!("number {n}"),
        Token::Op(op) => format!("'{op}'"),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(format!("unterminated quoted text starting at {value}")),
                        Some(&q) if q == quote && chars.get(i + 1) == Some(&quote) => {
                            value.push(quote);
                            i += 2;
                        }
                        Some(&q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            value.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '\'' {
                    Token::Str(value)
                } else {
                    Token::Ident(value)
                });
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '<' | '>' | '!' => {
                let next = chars.get(i + 1).copied();
                let op = match (c, next) {
                    ('<', Some('=')) => "<=",
                    ('<', Some('>')) => "<>",
                    ('>', Some('=')) => ">=",
                    ('!', Some('=')) => "!=",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    _ => return Err("unexpected character '!'".to_string()),
                };
                i += op.len();
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_digit()
                || c == '.'
                || ((c == '-' || c == '+')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.')) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                    if i < chars.len() && (chars[i] == '-' || chars[i] == '+') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// Deepest run of parentheses and `NOT`s accepted.
const MAX_NESTING: usize = 128;
/// Most `AND`/`OR` operators accepted in one filter.
const MAX_CONNECTIVES: usize = 1024;

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    fields: &'a [FieldDefn],
    nesting: usize,
    connectives: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!(
                "expected {} but found {}",
                describe(&expected),
                describe(&token)
            )),
            None => Err(format!("expected {} at end of expression", describe(&expected))),
        }
    }

    fn field_index(&self, name: &str) -> Result<usize, String> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("'{name}' not recognised as an available field"))
    }

    fn connective(&mut self) -> Result<(), String> {
        self.connectives += 1;
        if self.connectives > MAX_CONNECTIVES {
            return Err(format!("filter has more than {MAX_CONNECTIVES} AND/OR operators"));
        }
        Ok(())
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        if self.nesting == MAX_NESTING {
            return Err(format!("filter nested more than {MAX_NESTING} levels deep"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("OR") {
            self.connective()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("AND") {
            self.connective()?;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat_keyword("NOT") {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let expr = self.nested(Self::parse_or)?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }

        let lhs = self.parse_operand()?;

        if let Operand::Field(field) = lhs {
            if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                if !self.eat_keyword("NULL") {
                    return Err("expected NULL after IS".to_string());
                }
                return Ok(Expr::IsNull { field, negated });
            }
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("IN") {
                self.expect(Token::LParen)?;
                let mut values = vec![self.parse_literal()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    values.push(self.parse_literal()?);
                }
                self.expect(Token::RParen)?;
                return Ok(Expr::In {
                    field,
                    values,
                    negated,
                });
            }
            if self.eat_keyword("LIKE") {
                return match self.parse_literal()? {
                    Literal::Str(pattern) => Ok(Expr::Like {
                        field,
                        pattern,
                        negated,
                    }),
                    Literal::Num(_) => Err("LIKE expects a string pattern".to_string()),
                };
            }
            if negated {
                return Err("expected IN or LIKE after NOT".to_string());
            }
        }

        let op = match self.next() {
            Some(Token::Op(op)) => match op {
                "=" => CmpOp::Eq,
                "<>" | "!=" => CmpOp::Ne,
                "<" => CmpOp::Lt,
                "<=" => CmpOp::Le,
                ">" => CmpOp::Gt,
                _ => CmpOp::Ge,
            },
            Some(token) => {
                return Err(format!(
                    "expected a comparison operator but found {}",
                    describe(&token)
                ))
            }
            None => return Err("expected a comparison operator at end of expression".to_string()),
        };
        let rhs = self.parse_operand()?;
        Ok(Expr::Cmp(lhs, op, rhs))
    }

    fn parse_operand(&mut self) -> Result<Operand, String> {
        match self.peek() {
            Some(Token::Ident(name)) if !is_reserved(name) => {
                let idx = self.field_index(name)?;
                self.pos += 1;
                Ok(Operand::Field(idx))
            }
            _ => self.parse_literal().map(Operand::Literal),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Num(n)) => Ok(Literal::Num(n)),
            Some(token) => Err(format!("expected a literal but found {}", describe(&token))),
            None => Err("expected a literal at end of expression".to_string()),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(word))
}

fn resolve<'v>(operand: &'v Operand, values: &'v [FieldValue]) -> Option<Scalar<'v>> {
    match operand {
        Operand::Literal(Literal::Num(n)) => Some(Scalar::Num(*n)),
        Operand::Literal(Literal::Str(s)) => Some(Scalar::Str(s.as_str())),
        Operand::Field(idx) => scalar(&values[*idx]),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Scalar<'v> {
    Num(f64),
    Str(&'v str),
    Owned(String),
}

fn scalar(value: &FieldValue) -> Option<Scalar<'_>> {
    match value {
        FieldValue::Null => None,
        FieldValue::Integer(v) => Some(Scalar::Num(*v as f64)),
        FieldValue::Real(v) => Some(Scalar::Num(*v)),
        FieldValue::String(v) => Some(Scalar::Str(v)),
        // OGR SQL compares temporal fields against their text form
        FieldValue::Date(v) => Some(Scalar::Owned(v.format("%Y/%m/%d").to_string())),
        FieldValue::Time(v) => Some(Scalar::Owned(v.format("%H:%M:%S").to_string())),
        FieldValue::DateTime(v) => Some(Scalar::Owned(v.format("%Y/%m/%d %H:%M:%S").to_string())),
        FieldValue::DateTimeTz(v) => {
            Some(Scalar::Owned(v.format("%Y/%m/%d %H:%M:%S%:z").to_string()))
        }
    }
}

fn compare(a: &Scalar<'_>, b: &Scalar<'_>) -> Option<Ordering> {
    let text = |s: &Scalar<'_>| match s {
        Scalar::Str(v) => Some(v.to_string()),
        Scalar::Owned(v) => Some(v.clone()),
        Scalar::Num(_) => None,
    };
    match (a, b) {
        (Scalar::Num(x), Scalar::Num(y)) => x.partial_cmp(y),
        (Scalar::Num(x), other) | (other, Scalar::Num(x)) => {
            // numeric text compared with a number, as OGR does for string fields
            let parsed = text(other)?.trim().parse::<f64>().ok()?;
            if matches!(a, Scalar::Num(_)) {
                x.partial_cmp(&parsed)
            } else {
                parsed.partial_cmp(x)
            }
        }
        _ => Some(text(a)?.cmp(&text(b)?)),
    }
}

fn like(text: &str, pattern: &str) -> bool {
    // case-insensitive, as OGR SQL LIKE
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

fn eval(expr: &Expr, values: &[FieldValue]) -> Option<bool> {
    match expr {
        Expr::And(a, b) => match (eval(a, values), eval(b, values)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expr::Or(a, b) => match (eval(a, values), eval(b, values)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expr::Not(inner) => eval(inner, values).map(|v| !v),
        Expr::Cmp(lhs, op, rhs) => {
            let ordering = compare(&resolve(lhs, values)?, &resolve(rhs, values)?)?;
            Some(match op {
                CmpOp::Eq => ordering == Ordering::Equal,
                CmpOp::Ne => ordering != Ordering::Equal,
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::Ge => ordering != Ordering::Less,
            })
        }
        Expr::In {
            field,
            values: candidates,
            negated,
        } => {
            let value = scalar(&values[*field])?;
            let found = candidates.iter().any(|literal| {
                let literal = match literal {
                    Literal::Num(n) => Scalar::Num(*n),
                    Literal::Str(s) => Scalar::Str(s),
                };
                compare(&value, &literal) == Some(Ordering::Equal)
            });
            Some(found != *negated)
        }
        Expr::IsNull { field, negated } => Some(values[*field].is_null() != *negated),
        Expr::Like {
            field,
            pattern,
            negated,
        } => {
            let matched = match scalar(&values[*field])? {
                Scalar::Str(s) => like(s, pattern),
                Scalar::Owned(s) => like(&s, pattern),
                Scalar::Num(n) => like(&n.to_string(), pattern),
            };
            Some(matched != *negated)
        }
    }
}
