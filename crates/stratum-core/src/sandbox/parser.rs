//! Recursive-descent parser from tokens to `ast::Expr`.
//!
//! All rejection of disallowed names happens here, at compile time, per the
//! controller spec: an attribute name starting or ending with `_` is a
//! compile error regardless of what `result` is bound to at evaluation time.

use super::ast::{BinOp, Expr, Literal, WHITELISTED_CALLS};
use super::lexer::{tokenize, Token};

pub fn parse(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.parse_or()?;
    p.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {:?}", self.peek()))
        }
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.is_ident("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinOp(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        while self.is_ident("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::BinOp(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.is_ident("not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            Token::Eq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Lt => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Gt => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            Token::Ident(s) if s == "in" => Some(BinOp::In),
            Token::Ident(s) if s == "not" => {
                // lookahead for "not in"
                if matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(n)) if n == "in") {
                    Some(BinOp::NotIn)
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(op) = op else {
            return Ok(left);
        };

        if op == BinOp::NotIn {
            self.advance(); // "not"
            self.advance(); // "in"
        } else {
            self.advance();
        }

        let right = self.parse_additive()?;
        Ok(Expr::BinOp(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if *self.peek() == Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().clone() {
                Token::Dot => {
                    self.advance();
                    let Token::Ident(field) = self.advance() else {
                        return Err("expected field name after '.'".to_string());
                    };
                    if field.starts_with('_') || field.ends_with('_') {
                        return Err(format!(
                            "attribute access to '{field}' is rejected: names starting or \
                             ending with '_' are not reachable"
                        ));
                    }
                    expr = Expr::Attr(Box::new(expr), field);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Literal::Int(n))),
            Token::Float(f) => Ok(Expr::Literal(Literal::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.parse_ident_primary(name),
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_ident_primary(&mut self, name: String) -> Result<Expr, String> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Literal::Bool(true))),
            "false" => return Ok(Expr::Literal(Literal::Bool(false))),
            "null" | "none" => return Ok(Expr::Literal(Literal::Null)),
            "result" => return Ok(Expr::Result),
            _ => {}
        }

        if *self.peek() == Token::LParen {
            if !WHITELISTED_CALLS.contains(&name.as_str()) {
                return Err(format!(
                    "call to '{name}' is rejected: only {WHITELISTED_CALLS:?} are whitelisted"
                ));
            }
            self.advance(); // '('
            let mut args = Vec::new();
            if *self.peek() != Token::RParen {
                loop {
                    args.push(self.parse_or()?);
                    if *self.peek() == Token::Comma {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::Call(name, args));
        }

        Err(format!(
            "unknown name '{name}': only 'result' and whitelisted calls are reachable"
        ))
    }
}
