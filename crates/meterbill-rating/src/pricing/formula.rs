//! Pricing formula parser and evaluator
//!
//! Formulas are plain arithmetic over one variable:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | primary
//! primary := NUMBER | '$time_in_seconds' | ('ceil' | 'floor') '(' expr ')' | '(' expr ')'
//! ```
//!
//! Evaluation is exact decimal arithmetic; overflow and division by zero
//! are errors, never silently saturated.

use chrono::Duration;
use meterbill_common::{FormulaError, TIME_IN_SECONDS};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Values bound to formula variables for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormulaVariables {
    pub time_in_seconds: Decimal,
}

impl FormulaVariables {
    /// Bind `$time_in_seconds` to a duration, at microsecond precision
    pub fn for_duration(duration: Duration) -> FormulaResult<Self> {
        let micros = duration.num_microseconds().ok_or(FormulaError::Overflow)?;
        Ok(Self {
            time_in_seconds: Decimal::new(micros, 6),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rounding {
    Ceil,
    Floor,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(Decimal),
    TimeInSeconds,
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Round(Rounding, Box<Expr>),
}

impl Expr {
    fn eval(&self, vars: &FormulaVariables) -> FormulaResult<Decimal> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::TimeInSeconds => Ok(vars.time_in_seconds),
            Expr::Neg(inner) => Ok(-inner.eval(vars)?),
            Expr::Round(rounding, inner) => {
                let value = inner.eval(vars)?;
                Ok(match rounding {
                    Rounding::Ceil => value.ceil(),
                    Rounding::Floor => value.floor(),
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = lhs.eval(vars)?;
                let rhs = rhs.eval(vars)?;
                let result = match op {
                    BinaryOp::Add => lhs.checked_add(rhs),
                    BinaryOp::Sub => lhs.checked_sub(rhs),
                    BinaryOp::Mul => lhs.checked_mul(rhs),
                    BinaryOp::Div => {
                        if rhs.is_zero() {
                            return Err(FormulaError::DivisionByZero);
                        }
                        lhs.checked_div(rhs)
                    }
                };
                result.ok_or(FormulaError::Overflow)
            }
        }
    }
}

/// A parsed pricing formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> FormulaResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;

        if let Some((token, position)) = parser.tokens.get(parser.pos) {
            return Err(FormulaError::UnexpectedToken {
                found: token.to_string(),
                position: *position,
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a non-negative amount
    pub fn evaluate(&self, vars: &FormulaVariables) -> FormulaResult<Decimal> {
        let value = self.expr.eval(vars)?;
        if value < Decimal::ZERO {
            return Err(FormulaError::NegativeResult(value));
        }
        Ok(value)
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> FormulaResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Variable(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Variable(name) => write!(f, "${}", name),
            Token::Ident(name) => f.write_str(name),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(source: &str) -> FormulaResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '0'..='9' | '.' => {
                let literal = take_while(&mut chars, |c| c.is_ascii_digit() || c == '.');
                let number = Decimal::from_str(&literal)
                    .map_err(|_| FormulaError::InvalidNumber(literal.clone()))?;
                tokens.push((Token::Number(number), position));
                continue;
            }
            '$' => {
                chars.next();
                let name = take_while(&mut chars, is_ident_char);
                if name != TIME_IN_SECONDS {
                    return Err(FormulaError::UnknownVariable(name));
                }
                tokens.push((Token::Variable(name), position));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let name = take_while(&mut chars, is_ident_char);
                tokens.push((Token::Ident(name), position));
                continue;
            }
            found => return Err(FormulaError::UnexpectedCharacter { found, position }),
        };
        chars.next();
        tokens.push((token, position));
    }

    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn take_while(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    accept: impl Fn(char) -> bool,
) -> String {
    let mut out = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if !accept(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> FormulaResult<(Token, usize)> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormulaError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        let (token, position) = self.next()?;
        if token != expected {
            return Err(FormulaError::UnexpectedToken {
                found: token.to_string(),
                position,
            });
        }
        Ok(())
    }

    fn expr(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> FormulaResult<Expr> {
        let (token, position) = self.next()?;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Variable(_) => Ok(Expr::TimeInSeconds),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                let rounding = match name.as_str() {
                    "ceil" => Rounding::Ceil,
                    "floor" => Rounding::Floor,
                    _ => return Err(FormulaError::UnknownFunction(name)),
                };
                self.expect(Token::LParen)?;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Round(rounding, Box::new(inner)))
            }
            other => Err(FormulaError::UnexpectedToken {
                found: other.to_string(),
                position,
            }),
        }
    }
}
