//! Cleaning of raw ingredient lines.
//!
//! Ingredient names lose their parenthetical annotations and any symbol
//! outside Hangul, Latin letters, digits and whitespace. Quantity strings
//! such as `"2+1/2컵"` or `"1과1/2"` are reduced to an arithmetic
//! expression over `+ - * / .` and digits, which is evaluated by a small
//! recursive-descent parser. Nothing here returns an error: a malformed
//! quantity becomes [`Quantity::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static NAME_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^ㄱ-ㅎ가-힣a-zA-Z0-9\s]").unwrap());
static QUANTITY_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+\-*/.]").unwrap());
static CONJUNCTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)과|와|and").unwrap());

/// Evaluated ingredient amount. Unknown reads as 0 downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Known(f64),
    Unknown,
}

impl Quantity {
    pub fn value_or_zero(&self) -> f64 {
        match self {
            Quantity::Known(v) => *v,
            Quantity::Unknown => 0.0,
        }
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantity::Known(v) => write!(f, "{}", format_quantity(*v)),
            Quantity::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIngredient {
    pub name: String,
    pub quantity: Quantity,
}

impl NormalizedIngredient {
    /// `"{name} {quantity}"` with unknown quantities written as 0.
    pub fn feature_text(&self) -> String {
        format!("{} {}", self.name, format_quantity(self.quantity.value_or_zero()))
    }
}

pub fn normalize_ingredient(name: &str, quantity_expr: &str) -> NormalizedIngredient {
    NormalizedIngredient {
        name: clean_ingredient_name(name),
        quantity: evaluate_quantity(quantity_expr),
    }
}

pub fn clean_ingredient_name(name: &str) -> String {
    let name = PARENTHETICAL.replace_all(name, "");
    let name = NAME_DISALLOWED.replace_all(name.trim(), "");
    name.trim().to_string()
}

pub fn evaluate_quantity(expr: &str) -> Quantity {
    let expr: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let expr = CONJUNCTION.replace_all(&expr, "+");
    let expr = QUANTITY_DISALLOWED.replace_all(&expr, "");

    match eval_expression(&expr) {
        Ok(value) => Quantity::Known((value * 1000.0).round() / 1000.0),
        Err(err) => {
            log::trace!("quantity {expr:?} is not evaluable: {err}");
            Quantity::Unknown
        }
    }
}

/// Whole numbers keep one decimal (`200.0`), others print as-is (`2.5`).
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedQuantity {
    #[error("empty expression")]
    Empty,

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unexpected {0:?} at position {1}")]
    UnexpectedToken(String, usize),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, MalformedQuantity> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| MalformedQuantity::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c => return Err(MalformedQuantity::UnexpectedChar(c)),
        }
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// expr = term (("+" | "-") term)*
    fn parse_expr(&mut self) -> Result<f64, MalformedQuantity> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    left += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    left -= self.parse_term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    /// term = unary (("*" | "/") unary)*
    fn parse_term(&mut self) -> Result<f64, MalformedQuantity> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    left *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err(MalformedQuantity::DivisionByZero);
                    }
                    left /= right;
                }
                _ => return Ok(left),
            }
        }
    }

    /// unary = ("+" | "-")* number
    fn parse_unary(&mut self) -> Result<f64, MalformedQuantity> {
        let mut negative = false;
        while let Some(sign @ (Token::Plus | Token::Minus)) = self.peek() {
            negative ^= *sign == Token::Minus;
            self.advance();
        }

        match self.advance() {
            Some(Token::Number(n)) if negative => Ok(-n),
            Some(Token::Number(n)) => Ok(n),
            Some(tok) => Err(MalformedQuantity::UnexpectedToken(
                tok.to_string(),
                self.pos - 1,
            )),
            None => Err(MalformedQuantity::UnexpectedEnd),
        }
    }
}

/// Evaluate an expression made only of digits, `.` and `+ - * /`.
pub fn eval_expression(input: &str) -> Result<f64, MalformedQuantity> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(MalformedQuantity::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(MalformedQuantity::UnexpectedToken(tok.to_string(), parser.pos));
    }
    if !value.is_finite() {
        return Err(MalformedQuantity::NotFinite);
    }
    Ok(value)
}
