// SPDX-License-Identifier: MIT

//! Hand-rolled lexer and recursive-descent parser for the condition language
//!
//! The grammar is a deliberate allow-list. Anything the parser does not
//! recognize (function calls, lambdas, comprehensions, star-expressions,
//! suspension keywords, imports) is rejected with an `EvalError::Disallowed`
//! rather than being handed to any general-purpose interpreter.
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! ternary    := or_test ['if' or_test 'else' ternary]
//! or_test    := and_test ('or' and_test)*
//! and_test   := not_test ('and' not_test)*
//! not_test   := 'not' not_test | comparison
//! comparison := arith ((== != < <= > >= in | not in | is | is not) arith)*
//! arith      := term (('+' | '-') term)*
//! term       := unary ('*' unary)*
//! unary      := ('-' | '+') unary | postfix
//! postfix    := atom ('[' ternary ']' | '.' NAME)*
//! atom       := NUMBER | STRING | NAME | '(' ... ')' | '[' ... ']' | '{' ... '}'
//! ```

use super::ast::{BinaryOp, BoolOp, CompareOp, Expr, Literal, UnaryOp};
use super::MAX_EXPRESSION_LEN;
use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

/// Keywords the grammar itself consumes.
const KEYWORDS: &[&str] = &["and", "or", "not", "if", "else", "in", "is"];

/// Maps a reserved-but-forbidden keyword to its violation message.
fn disallowed_keyword(name: &str) -> Option<&'static str> {
    match name {
        "lambda" => Some("lambda expressions are not allowed"),
        "for" | "while" => Some("comprehensions and loops are not allowed"),
        "await" | "yield" => Some("suspension expressions (await/yield) are not allowed"),
        "import" | "from" => Some("imports are not allowed"),
        "def" | "class" | "return" | "del" | "raise" | "assert" | "global" | "nonlocal"
        | "with" | "async" | "pass" | "try" | "except" | "finally" => {
            Some("statements are not allowed in expressions")
        }
        _ => None,
    }
}

/// Tokenizes `input`. In collecting mode every lexical violation is pushed to
/// `issues` and skipped; in strict mode the first violation aborts.
fn tokenize(input: &str, mut issues: Option<&mut Vec<String>>) -> Result<Vec<Spanned>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    macro_rules! violation {
        ($pos:expr, $msg:expr) => {
            match issues.as_deref_mut() {
                Some(list) => list.push($msg.to_string()),
                None => return Err(EvalError::Disallowed($msg.to_string())),
            }
        };
    }

    while i < chars.len() {
        let c = chars[i];
        let pos = i;
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Spanned { token: Token::LParen, pos });
                i += 1;
            }
            ')' => {
                tokens.push(Spanned { token: Token::RParen, pos });
                i += 1;
            }
            '[' => {
                tokens.push(Spanned { token: Token::LBracket, pos });
                i += 1;
            }
            ']' => {
                tokens.push(Spanned { token: Token::RBracket, pos });
                i += 1;
            }
            '{' => {
                tokens.push(Spanned { token: Token::LBrace, pos });
                i += 1;
            }
            '}' => {
                tokens.push(Spanned { token: Token::RBrace, pos });
                i += 1;
            }
            ',' => {
                tokens.push(Spanned { token: Token::Comma, pos });
                i += 1;
            }
            ':' => {
                tokens.push(Spanned { token: Token::Colon, pos });
                i += 1;
            }
            '.' => {
                tokens.push(Spanned { token: Token::Dot, pos });
                i += 1;
            }
            '+' => {
                tokens.push(Spanned { token: Token::Plus, pos });
                i += 1;
            }
            '-' => {
                tokens.push(Spanned { token: Token::Minus, pos });
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    violation!(pos, "star-expressions and '**' are not allowed");
                    i += 2;
                } else {
                    tokens.push(Spanned { token: Token::Star, pos });
                    i += 1;
                }
            }
            '/' => {
                violation!(pos, "operator '/' is not allowed");
                i += if chars.get(i + 1) == Some(&'/') { 2 } else { 1 };
            }
            '%' => {
                violation!(pos, "operator '%' is not allowed");
                i += 1;
            }
            ';' => {
                violation!(pos, "multiple statements are not allowed");
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Spanned { token: Token::EqEq, pos });
                    i += 2;
                } else {
                    violation!(pos, "assignment is not allowed");
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Spanned { token: Token::NotEq, pos });
                    i += 2;
                } else {
                    violation!(pos, "unexpected character '!'");
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Spanned { token: Token::Lte, pos });
                    i += 2;
                } else {
                    tokens.push(Spanned { token: Token::Lt, pos });
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Spanned { token: Token::Gte, pos });
                    i += 2;
                } else {
                    tokens.push(Spanned { token: Token::Gt, pos });
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        let esc = chars[i + 1];
                        s.push(match esc {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 2;
                    } else if ch == quote {
                        closed = true;
                        i += 1;
                        break;
                    } else {
                        s.push(ch);
                        i += 1;
                    }
                }
                if !closed {
                    match issues.as_deref_mut() {
                        Some(list) => list.push("unterminated string literal".to_string()),
                        None => {
                            return Err(EvalError::Syntax {
                                position: pos,
                                message: "unterminated string literal".to_string(),
                            })
                        }
                    }
                }
                tokens.push(Spanned { token: Token::Str(s), pos });
            }
            d if d.is_ascii_digit() => {
                let mut num = String::new();
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // A '.' only belongs to the number when a digit follows;
                    // otherwise it is a (bogus) attribute access on a literal.
                    if chars[i] == '.'
                        && !chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false)
                    {
                        break;
                    }
                    num.push(chars[i]);
                    i += 1;
                }
                match num.parse::<f64>() {
                    Ok(n) => tokens.push(Spanned { token: Token::Number(n), pos }),
                    Err(_) => {
                        violation!(pos, format!("invalid number literal '{}'", num));
                    }
                }
            }
            a if a.is_alphabetic() || a == '_' => {
                let mut name = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    name.push(chars[i]);
                    i += 1;
                }
                tokens.push(Spanned { token: Token::Ident(name), pos });
            }
            other => {
                violation!(pos, format!("unexpected character '{}'", other));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Parse an expression string into an AST.
///
/// Fails on empty input, input past the length cap, lexical violations,
/// disallowed constructs and plain syntax errors.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    if input.trim().is_empty() {
        return Err(EvalError::Empty);
    }
    // the cap is in characters, not bytes
    let char_count = input.chars().count();
    if char_count > MAX_EXPRESSION_LEN {
        return Err(EvalError::TooLong {
            len: char_count,
            max: MAX_EXPRESSION_LEN,
        });
    }

    let tokens = tokenize(input, None)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_ternary()?;
    if let Some(extra) = parser.peek() {
        return Err(EvalError::Syntax {
            position: extra.pos,
            message: format!("unexpected trailing input at '{:?}'", extra.token),
        });
    }
    Ok(expr)
}

/// Parse without evaluating and report every disallowed construct found.
///
/// Used to validate edge conditions before any run exists; referenced
/// variables need not be defined. Returns an empty list when the expression
/// is acceptable.
pub fn static_check(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return vec!["expression is empty".to_string()];
    }
    if input.chars().count() > MAX_EXPRESSION_LEN {
        return vec![format!(
            "expression exceeds the {}-character limit",
            MAX_EXPRESSION_LEN
        )];
    }

    let mut issues = Vec::new();
    let tokens = match tokenize(input, Some(&mut issues)) {
        Ok(t) => t,
        // Collecting mode never errors, but keep the fallback total.
        Err(e) => return vec![e.to_string()],
    };

    // Token-level scan: flags every violation at once, where the parser
    // would stop at the first.
    let mut prev_is_callable = false;
    for spanned in &tokens {
        match &spanned.token {
            Token::Ident(name) => {
                if let Some(msg) = disallowed_keyword(name) {
                    issues.push(msg.to_string());
                }
                prev_is_callable = !KEYWORDS.contains(&name.as_str());
            }
            Token::LParen if prev_is_callable => {
                issues.push("function calls are not allowed".to_string());
                prev_is_callable = false;
            }
            Token::RParen | Token::RBracket | Token::Str(_) => prev_is_callable = true,
            _ => prev_is_callable = false,
        }
    }

    if issues.is_empty() {
        let mut parser = Parser { tokens, pos: 0 };
        match parser.parse_ternary() {
            Ok(_) => {
                if let Some(extra) = parser.peek() {
                    issues.push(format!(
                        "unexpected trailing input at position {}",
                        extra.pos
                    ));
                }
            }
            Err(e) => issues.push(e.to_string()),
        }
    }

    issues
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Spanned { token: Token::Ident(n), .. }) if n == name)
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.at_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), EvalError> {
        match self.advance() {
            Some(s) if s.token == token => Ok(()),
            Some(s) => Err(EvalError::Syntax {
                position: s.pos,
                message: format!("expected {}, found '{:?}'", what, s.token),
            }),
            None => Err(EvalError::Syntax {
                position: 0,
                message: format!("expected {}, found end of expression", what),
            }),
        }
    }

    fn error_here(&self, message: String) -> EvalError {
        let position = self.peek().map(|s| s.pos).unwrap_or(0);
        EvalError::Syntax { position, message }
    }

    fn parse_ternary(&mut self) -> Result<Expr, EvalError> {
        let value = self.parse_or()?;
        if self.eat_ident("if") {
            let condition = self.parse_or()?;
            if !self.eat_ident("else") {
                return Err(self.error_here("expected 'else' in conditional expression".into()));
            }
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_and()?;
        if !self.at_ident("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_ident("or") {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp { op: BoolOp::Or, values })
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_not()?;
        if !self.at_ident("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_ident("and") {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp { op: BoolOp::And, values })
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        // 'not' is a prefix here, but 'not in' belongs to the comparison level.
        if self.at_ident("not") {
            let after = self.tokens.get(self.pos + 1);
            let is_not_in = matches!(after, Some(Spanned { token: Token::Ident(n), .. }) if n == "in");
            if !is_not_in {
                self.pos += 1;
                let operand = self.parse_not()?;
                return Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                });
            }
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_arith()?;
        let mut comparators = Vec::new();
        while let Some(op) = self.try_compare_op()? {
            let right = self.parse_arith()?;
            comparators.push((op, right));
        }
        if comparators.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                comparators,
            })
        }
    }

    fn try_compare_op(&mut self) -> Result<Option<CompareOp>, EvalError> {
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::EqEq) => Some(CompareOp::Eq),
            Some(Token::NotEq) => Some(CompareOp::NotEq),
            Some(Token::Lt) => Some(CompareOp::Lt),
            Some(Token::Lte) => Some(CompareOp::Lte),
            Some(Token::Gt) => Some(CompareOp::Gt),
            Some(Token::Gte) => Some(CompareOp::Gte),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            return Ok(Some(op));
        }
        if self.at_ident("in") {
            self.pos += 1;
            return Ok(Some(CompareOp::In));
        }
        if self.at_ident("is") {
            self.pos += 1;
            if self.eat_ident("not") {
                return Ok(Some(CompareOp::IsNot));
            }
            return Ok(Some(CompareOp::Is));
        }
        if self.at_ident("not") {
            self.pos += 1;
            if self.eat_ident("in") {
                return Ok(Some(CompareOp::NotIn));
            }
            return Err(self.error_here("expected 'in' after 'not' in comparison".into()));
        }
        Ok(None)
    }

    fn parse_arith(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek().map(|s| &s.token), Some(Token::Star)) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Plus) => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut value = self.parse_atom()?;
        loop {
            match self.peek().map(|s| &s.token) {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_ternary()?;
                    self.expect(Token::RBracket, "']'")?;
                    value = Expr::Subscript {
                        value: Box::new(value),
                        index: Box::new(index),
                    };
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Spanned { token: Token::Ident(attr), .. }) => {
                            value = Expr::Attribute {
                                value: Box::new(value),
                                attr,
                            };
                        }
                        other => {
                            return Err(EvalError::Syntax {
                                position: other.map(|s| s.pos).unwrap_or(0),
                                message: "expected attribute name after '.'".to_string(),
                            })
                        }
                    }
                }
                Some(Token::LParen) => {
                    return Err(EvalError::Disallowed(
                        "function calls are not allowed".to_string(),
                    ));
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_atom(&mut self) -> Result<Expr, EvalError> {
        let spanned = match self.advance() {
            Some(s) => s,
            None => {
                return Err(EvalError::Syntax {
                    position: 0,
                    message: "unexpected end of expression".to_string(),
                })
            }
        };

        match spanned.token {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::String(s))),
            Token::Ident(name) => {
                if let Some(msg) = disallowed_keyword(&name) {
                    return Err(EvalError::Disallowed(msg.to_string()));
                }
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(EvalError::Syntax {
                        position: spanned.pos,
                        message: format!("unexpected keyword '{}'", name),
                    });
                }
                Ok(Expr::Name(name))
            }
            Token::LParen => {
                // Grouping, or a tuple when commas are present.
                if matches!(self.peek().map(|s| &s.token), Some(Token::RParen)) {
                    self.pos += 1;
                    return Ok(Expr::Tuple(vec![]));
                }
                let first = self.parse_ternary()?;
                if matches!(self.peek().map(|s| &s.token), Some(Token::Comma)) {
                    let mut items = vec![first];
                    while matches!(self.peek().map(|s| &s.token), Some(Token::Comma)) {
                        self.pos += 1;
                        if matches!(self.peek().map(|s| &s.token), Some(Token::RParen)) {
                            break;
                        }
                        items.push(self.parse_ternary()?);
                    }
                    self.expect(Token::RParen, "')'")?;
                    return Ok(Expr::Tuple(items));
                }
                self.expect(Token::RParen, "')'")?;
                Ok(first)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !matches!(self.peek().map(|s| &s.token), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_ternary()?);
                        if matches!(self.peek().map(|s| &s.token), Some(Token::Comma)) {
                            self.pos += 1;
                            if matches!(self.peek().map(|s| &s.token), Some(Token::RBracket)) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut pairs = Vec::new();
                if !matches!(self.peek().map(|s| &s.token), Some(Token::RBrace)) {
                    loop {
                        let key = self.parse_ternary()?;
                        self.expect(Token::Colon, "':'")?;
                        let value = self.parse_ternary()?;
                        pairs.push((key, value));
                        if matches!(self.peek().map(|s| &s.token), Some(Token::Comma)) {
                            self.pos += 1;
                            if matches!(self.peek().map(|s| &s.token), Some(Token::RBrace)) {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBrace, "'}'")?;
                Ok(Expr::Dict(pairs))
            }
            other => Err(EvalError::Syntax {
                position: spanned.pos,
                message: format!("unexpected token '{:?}'", other),
            }),
        }
    }
}
