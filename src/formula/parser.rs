//! Tokenizer and recursive-descent parser for guesstimate formulas.

use super::ast::{BinaryOp, Expr, Function, RefName, UnaryOp};
use crate::reference::scan::{dangling_accessor, token_at, MARKER};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("formula is empty")]
    Empty,
    #[error("malformed reference at offset {offset}")]
    MalformedReference { offset: usize },
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("invalid number '{text}'")]
    InvalidNumber { text: String },
    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("function '{name}' does not accept {found} argument(s)")]
    WrongArity { name: &'static str, found: usize },
    #[error("unknown property '.{name}'")]
    UnknownProperty { name: String },
    #[error("'@{reference}' has more than one property accessor")]
    TooManyProperties { reference: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Ref(RefName),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Ref(r) => format!("{}{}", MARKER, r.ident),
            Token::Op(s) => s.to_string(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => { i += 1; continue; }
            b'@' => {
                let tok = token_at(text, i).ok_or(ParseError::MalformedReference { offset: i })?;
                if dangling_accessor(text, tok.end) {
                    return Err(ParseError::MalformedReference { offset: tok.end });
                }
                i = tok.end;
                let r = RefName {
                    ident: tok.ident.to_string(),
                    properties: tok.properties.iter().map(|p| p.to_string()).collect(),
                };
                tokens.push((Token::Ref(r), start));
            }
            b'0'..=b'9' | b'.' => {
                let (n, end) = lex_number(text, i)?;
                i = end;
                tokens.push((Token::Number(n), start));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((Token::Ident(text[start..i].to_string()), start));
            }
            b'(' => { i += 1; tokens.push((Token::LParen, start)); }
            b')' => { i += 1; tokens.push((Token::RParen, start)); }
            b',' => { i += 1; tokens.push((Token::Comma, start)); }
            _ => {
                let op: &'static str = match (c, bytes.get(i + 1)) {
                    (b'<', Some(b'=')) => "<=",
                    (b'>', Some(b'=')) => ">=",
                    (b'=', Some(b'=')) => "==",
                    (b'!', Some(b'=')) => "!=",
                    (b'+', _) => "+",
                    (b'-', _) => "-",
                    (b'*', _) => "*",
                    (b'/', _) => "/",
                    (b'^', _) => "^",
                    (b'<', _) => "<",
                    (b'>', _) => ">",
                    _ => {
                        let ch = text[i..].chars().next().unwrap_or('?');
                        return Err(ParseError::UnexpectedChar { ch, offset: i });
                    }
                };
                i += op.len();
                tokens.push((Token::Op(op), start));
            }
        }
    }
    Ok(tokens)
}

/// Decimal literal with optional exponent and a K/M/B/T magnitude suffix.
fn lex_number(text: &str, start: usize) -> Result<(f64, usize), ParseError> {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    let literal = &text[start..i];
    let mut value: f64 = literal
        .parse()
        .map_err(|_| ParseError::InvalidNumber { text: literal.to_string() })?;

    let suffix_ends_word = |at: usize| at >= bytes.len() || !(bytes[at].is_ascii_alphanumeric() || bytes[at] == b'_');
    if i < bytes.len() && suffix_ends_word(i + 1) {
        let scale = match bytes[i] {
            b'K' => Some(1e3),
            b'M' => Some(1e6),
            b'B' => Some(1e9),
            b'T' => Some(1e12),
            _ => None,
        };
        if let Some(scale) = scale {
            value *= scale;
            i += 1;
        }
    }
    Ok((value, i))
}

/// Comma- or newline-separated numeric observations (at least two).
pub fn parse_data(text: &str) -> Option<Vec<f64>> {
    let trimmed = text.trim();
    if !(trimmed.contains(',') || trimmed.contains('\n')) {
        return None;
    }
    let points: Vec<f64> = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<_>>()?;
    (points.len() >= 2).then_some(points)
}

pub fn parse_formula(text: &str) -> Result<Expr<RefName>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if let Some(points) = parse_data(text) {
        return Ok(Expr::Data(Arc::from(points)));
    }
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.range()?;
    match parser.peek() {
        None => Ok(expr),
        Some((tok, offset)) => Err(ParseError::UnexpectedToken { found: tok.describe(), offset: *offset }),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> { self.tokens.get(self.pos) }

    fn next(&mut self) -> Result<(Token, usize), ParseError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        let found = match self.peek() {
            Some((Token::Op(op), _)) => ops.iter().copied().find(|o| o == op)?,
            _ => return None,
        };
        self.pos += 1;
        Some(found)
    }

    fn expect(&mut self, want: Token) -> Result<(), ParseError> {
        let (tok, offset) = self.next()?;
        if tok == want { Ok(()) } else { Err(ParseError::UnexpectedToken { found: tok.describe(), offset }) }
    }

    fn range(&mut self) -> Result<Expr<RefName>, ParseError> {
        let low = self.comparison()?;
        if matches!(self.peek(), Some((Token::Ident(w), _)) if w.eq_ignore_ascii_case("to")) {
            self.pos += 1;
            let high = self.comparison()?;
            return Ok(Expr::Range { low: Box::new(low), high: Box::new(high) });
        }
        Ok(low)
    }

    fn comparison(&mut self) -> Result<Expr<RefName>, ParseError> {
        let lhs = self.additive()?;
        let op = match self.eat_op(&["<", "<=", ">", ">=", "==", "!="]) {
            Some("<") => BinaryOp::Lt,
            Some("<=") => BinaryOp::Le,
            Some(">") => BinaryOp::Gt,
            Some(">=") => BinaryOp::Ge,
            Some("==") => BinaryOp::Eq,
            Some(_) => BinaryOp::Ne,
            None => return Ok(lhs),
        };
        let rhs = self.additive()?;
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn additive(&mut self) -> Result<Expr<RefName>, ParseError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            let rhs = self.term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr<RefName>, ParseError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/"]) {
            let op = if op == "*" { BinaryOp::Mul } else { BinaryOp::Div };
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr<RefName>, ParseError> {
        if self.eat_op(&["-"]).is_some() {
            let operand = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) });
        }
        if self.eat_op(&["+"]).is_some() {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr<RefName>, ParseError> {
        let base = self.primary()?;
        if self.eat_op(&["^"]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary { op: BinaryOp::Pow, lhs: Box::new(base), rhs: Box::new(exponent) });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr<RefName>, ParseError> {
        let (tok, offset) = self.next()?;
        match tok {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ref(r) => Ok(Expr::Reference(r)),
            Token::LParen => {
                let inner = self.range()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) if matches!(self.peek(), Some((Token::LParen, _))) => {
                let func = Function::from_name(&name).ok_or(ParseError::UnknownFunction { name })?;
                self.pos += 1;
                let args = self.arguments()?;
                if !func.arity().accepts(args.len()) {
                    return Err(ParseError::WrongArity { name: func.name(), found: args.len() });
                }
                Ok(Expr::Call { func, args })
            }
            other => Err(ParseError::UnexpectedToken { found: other.describe(), offset }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr<RefName>>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some((Token::RParen, _))) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.range()?);
            let (tok, offset) = self.next()?;
            match tok {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(ParseError::UnexpectedToken { found: other.describe(), offset }),
            }
        }
    }
}
