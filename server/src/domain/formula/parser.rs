//! Formula tokenizer and recursive-descent parser
//!
//! Grammar (left-associative, usual precedence):
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := '(' expr ')' | IDENT '(' expr ')' | NUMBER | IDENT
//! ```

use std::fmt;

use super::error::FormulaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Expression tree for a metric formula
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaNode {
    Number(f64),
    Field(String),
    Binary {
        op: BinaryOp,
        left: Box<FormulaNode>,
        right: Box<FormulaNode>,
    },
    /// Aggregation function call, e.g. `sum(revenue)`. The argument is always a field.
    Call { function: String, field: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Op(BinaryOp),
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Op(op) => write!(f, "{}", op),
            Token::Ident(s) => f.write_str(s),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '.' || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::Op(BinaryOp::Add),
            '-' => Token::Op(BinaryOp::Sub),
            '*' => Token::Op(BinaryOp::Mul),
            '/' => Token::Op(BinaryOp::Div),
            c if is_ident_char(c) => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
                continue;
            }
            _ => return Err(FormulaError::UnsupportedToken(input[start..].to_string())),
        };
        chars.next();
        tokens.push(token);
    }

    Ok(tokens)
}

/// Numeric literals start with a digit or a dot; `inf`/`nan` stay field names.
fn parse_number(text: &str) -> Option<f64> {
    let first = text.chars().next()?;
    if !(first.is_ascii_digit() || first == '.') {
        return None;
    }
    text.parse::<f64>().ok()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<(), FormulaError> {
        match self.advance() {
            Some(Token::RParen) => Ok(()),
            _ => Err(FormulaError::MissingClosingParen),
        }
    }

    fn expr(&mut self) -> Result<FormulaNode, FormulaError> {
        let mut node = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.term()?;
            node = FormulaNode::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<FormulaNode, FormulaError> {
        let mut node = self.factor()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.factor()?;
            node = FormulaNode::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<FormulaNode, FormulaError> {
        match self.advance() {
            None => Err(FormulaError::UnexpectedEnd),
            Some(Token::LParen) => {
                let node = self.expr()?;
                self.expect_rparen()?;
                Ok(node)
            }
            Some(Token::Ident(name)) if self.peek() == Some(&Token::LParen) => {
                // Empty call `f()` has nothing to aggregate
                if self.peek_at(1).is_none() {
                    return Err(FormulaError::MissingClosingParen);
                }
                self.pos += 1;
                let arg = self.expr()?;
                self.expect_rparen()?;
                match arg {
                    FormulaNode::Field(field) => Ok(FormulaNode::Call {
                        function: name,
                        field,
                    }),
                    _ => Err(FormulaError::InvalidFunctionArgument { function: name }),
                }
            }
            Some(Token::Ident(text)) => Ok(match parse_number(&text) {
                Some(value) => FormulaNode::Number(value),
                None => FormulaNode::Field(text),
            }),
            Some(other) => Err(FormulaError::UnexpectedToken(other.to_string())),
        }
    }
}

/// Parse a formula such as `1000 * revenue / impressions` into an expression tree
pub fn parse(formula: &str) -> Result<FormulaNode, FormulaError> {
    let tokens = tokenize(formula)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::TrailingTokens(token.to_string()));
    }
    Ok(node)
}

/// Field names referenced by the formula, left to right, duplicates kept
pub fn collect_leaf_fields(node: &FormulaNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_into(node, &mut out);
    out
}

fn collect_into(node: &FormulaNode, out: &mut Vec<String>) {
    match node {
        FormulaNode::Number(_) => {}
        FormulaNode::Field(name) => out.push(name.clone()),
        FormulaNode::Call { field, .. } => out.push(field.clone()),
        FormulaNode::Binary { left, right, .. } => {
            collect_into(left, out);
            collect_into(right, out);
        }
    }
}
