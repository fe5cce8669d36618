use serde_json::Value;

use super::lexer::{tokenize, Token};
use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Ident(String),
    Member {
        target: Box<Expr>,
        name: String,
        optional: bool,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    And,
    Or,
    Coalesce,
}

impl Expr {
    /// Dotted rendering of an access path, used in lookup error messages.
    pub fn path(&self) -> String {
        match self {
            Expr::Ident(name) => name.clone(),
            Expr::Member {
                target,
                name,
                optional,
            } => {
                let sep = if *optional { "?." } else { "." };
                format!("{}{sep}{name}", target.path())
            }
            Expr::Index { target, index } => match index.as_ref() {
                Expr::Literal(v) => format!("{}[{v}]", target.path()),
                _ => format!("{}[..]", target.path()),
            },
            Expr::Call { name, .. } => format!("{name}(..)"),
            _ => "<expr>".to_string(),
        }
    }
}

pub fn parse_expr(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_coalesce()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprError::UnexpectedToken {
            found: tok.describe(),
            expected: "end of expression",
        });
    }
    Ok(expr)
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

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ExprError> {
        match self.advance() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(ExprError::UnexpectedToken {
                found: tok.describe(),
                expected: what,
            }),
            None => Err(ExprError::UnexpectedEnd(what)),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_coalesce(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_or()?;
        while self.eat(&Token::Coalesce) {
            let right = self.parse_or()?;
            left = Self::binary(BinaryOp::Coalesce, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Word(w)) if w == "in" => BinaryOp::In,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let expr = self.parse_unary()?;
        // Fold `-<literal>` so `-1` stays an integer literal.
        if op == UnaryOp::Neg {
            if let Expr::Literal(Value::Number(n)) = &expr {
                if let Some(i) = n.as_i64() {
                    return Ok(Expr::Literal(Value::from(-i)));
                }
            }
        }
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) | Some(Token::QuestionDot) => {
                    let optional = matches!(self.advance(), Some(Token::QuestionDot));
                    let name = match self.advance() {
                        Some(Token::Word(w)) => w,
                        Some(Token::Str(s)) => s,
                        Some(Token::Int(i)) => i.to_string(),
                        Some(tok) => {
                            return Err(ExprError::UnexpectedToken {
                                found: tok.describe(),
                                expected: "member name",
                            })
                        }
                        None => return Err(ExprError::UnexpectedEnd("member name")),
                    };
                    expr = Expr::Member {
                        target: Box::new(expr),
                        name,
                        optional,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_coalesce()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let tok = self
            .advance()
            .ok_or(ExprError::UnexpectedEnd("an operand"))?;
        match tok {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Word(w) => match w.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "nil" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.parse_list(Token::RParen, "')'")?;
                    Ok(Expr::Call { name: w, args })
                }
                _ => Ok(Expr::Ident(w)),
            },
            Token::LParen => {
                let inner = self.parse_coalesce()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.parse_list(Token::RBracket, "']'")?;
                Ok(Expr::Array(items))
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                expected: "an operand",
            }),
        }
    }

    fn parse_list(&mut self, close: Token, what: &'static str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_coalesce()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(close, what)?;
            return Ok(items);
        }
    }
}
