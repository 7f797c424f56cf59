//! Parser for the prefix-call condition syntax
//!
//! ```text
//! expr  := IDENT term+ | term
//! term  := '(' expr ')' | '.' IDENT | STRING | INT | 'true' | 'false'
//! ```
//!
//! `IDENT` is one of `eq`, `ne`, `and`, `or`, `not`. The same grammar is used
//! for file-entry conditions and for `{{if ...}}` blocks inside templates.

use super::expr::{Expression, Literal};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at column {column})")]
pub struct ParseError {
    pub message: String,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Var(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Open,
    Close,
}

/// Parse a condition expression
pub fn parse(input: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError {
            message: "empty expression".to_string(),
            column: 1,
        });
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if let Some((_, column)) = parser.tokens.get(parser.pos) {
        return Err(ParseError {
            message: "unexpected trailing input".to_string(),
            column: *column,
        });
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::Open, column));
                i += 1;
            }
            ')' => {
                tokens.push((Token::Close, column));
                i += 1;
            }
            '.' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(ParseError {
                        message: "expected a variable name after '.'".to_string(),
                        column,
                    });
                }
                tokens.push((Token::Var(chars[start..end].iter().collect()), column));
                i = end;
            }
            '"' => {
                let (value, next) = read_string(&chars, i)?;
                tokens.push((Token::Str(value), column));
                i = next;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text.parse::<i64>().map_err(|_| ParseError {
                    message: format!("invalid integer literal '{}'", text),
                    column,
                })?;
                tokens.push((Token::Int(n), column));
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                };
                tokens.push((token, column));
            }
            other => {
                return Err(ParseError {
                    message: format!("unexpected character '{}'", other),
                    column,
                })
            }
        }
    }

    Ok(tokens)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Read a double-quoted string starting at `start`; returns the value and the
/// index just past the closing quote
pub(crate) fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((value, i + 1)),
            '\\' if i + 1 < chars.len() => {
                let escaped = match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    '"' => '"',
                    '\\' => '\\',
                    other => {
                        return Err(ParseError {
                            message: format!("unknown escape '\\{}'", other),
                            column: i + 1,
                        })
                    }
                };
                value.push(escaped);
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(ParseError {
        message: "unterminated string literal".to_string(),
        column: start + 1,
    })
}

enum Term {
    Var(String),
    Lit(Literal),
    Expr(Expression),
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn column(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, c)| *c)
            .unwrap_or(1)
    }

    fn parse_expr(&mut self) -> Result<Expression, ParseError> {
        if let Some((Token::Ident(name), column)) = self.tokens.get(self.pos).cloned() {
            self.pos += 1;
            return self.parse_call(&name, column);
        }
        let column = self.column();
        match self.parse_term()? {
            Term::Var(name) => Ok(Expression::Var(name)),
            Term::Expr(expr) => Ok(expr),
            Term::Lit(_) => Err(ParseError {
                message: "a condition must reference a variable".to_string(),
                column,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, column: usize) -> Result<Expression, ParseError> {
        let mut args = Vec::new();
        while self.pos < self.tokens.len() && self.tokens[self.pos].0 != Token::Close {
            let arg_column = self.column();
            args.push((self.parse_term()?, arg_column));
        }

        let err = |message: String| ParseError { message, column };

        match name {
            "eq" | "ne" => {
                let mut args = args.into_iter();
                let var = match args.next() {
                    Some((Term::Var(var), _)) => var,
                    _ => return Err(err(format!("{} expects a variable as first argument", name))),
                };
                let literals = args
                    .map(|(term, col)| match term {
                        Term::Lit(lit) => Ok(lit),
                        _ => Err(ParseError {
                            message: format!("{} compares a variable against literals", name),
                            column: col,
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if literals.is_empty() {
                    return Err(err(format!("{} expects at least one literal", name)));
                }
                if name == "eq" {
                    Ok(Expression::Eq(var, literals))
                } else if literals.len() == 1 {
                    let literal = literals.into_iter().next().ok_or_else(|| {
                        err("ne expects exactly one literal".to_string())
                    })?;
                    Ok(Expression::Ne(var, literal))
                } else {
                    Err(err("ne expects exactly one literal".to_string()))
                }
            }
            "and" | "or" | "not" => {
                let operands = args
                    .into_iter()
                    .map(|(term, col)| match term {
                        Term::Var(var) => Ok(Expression::Var(var)),
                        Term::Expr(expr) => Ok(expr),
                        Term::Lit(_) => Err(ParseError {
                            message: format!("{} expects conditions, not literals", name),
                            column: col,
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                match name {
                    "not" => {
                        let mut operands = operands.into_iter();
                        match (operands.next(), operands.next()) {
                            (Some(inner), None) => Ok(Expression::Not(Box::new(inner))),
                            _ => Err(err("not expects exactly one argument".to_string())),
                        }
                    }
                    _ if operands.len() < 2 => {
                        Err(err(format!("{} expects at least two arguments", name)))
                    }
                    "and" => Ok(Expression::And(operands)),
                    _ => Ok(Expression::Or(operands)),
                }
            }
            other => Err(err(format!("unknown function '{}'", other))),
        }
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        let column = self.column();
        let (token, _) = self.tokens.get(self.pos).cloned().ok_or_else(|| ParseError {
            message: "unexpected end of expression".to_string(),
            column,
        })?;
        self.pos += 1;
        match token {
            Token::Var(name) => Ok(Term::Var(name)),
            Token::Str(s) => Ok(Term::Lit(Literal::Str(s))),
            Token::Int(n) => Ok(Term::Lit(Literal::Int(n))),
            Token::Bool(b) => Ok(Term::Lit(Literal::Bool(b))),
            Token::Open => {
                let expr = self.parse_expr()?;
                match self.tokens.get(self.pos) {
                    Some((Token::Close, _)) => {
                        self.pos += 1;
                        Ok(Term::Expr(expr))
                    }
                    _ => Err(ParseError {
                        message: "expected ')'".to_string(),
                        column: self.column(),
                    }),
                }
            }
            Token::Close => Err(ParseError {
                message: "unexpected ')'".to_string(),
                column,
            }),
            Token::Ident(name) => Err(ParseError {
                message: format!("function '{}' must be wrapped in parentheses here", name),
                column,
            }),
        }
    }
}
