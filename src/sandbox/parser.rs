//! Recursive-descent parser for the scriptlet grammar.
//!
//! Statements are newline- or `;`-separated; blocks are brace-delimited.
//! Expression nesting depth is capped so deeply nested submissions fail at
//! compile time instead of exhausting the parser's stack.

use crate::sandbox::ast::{BinOp, Expr, LogicOp, Program, Stmt, UnaryOp};
use crate::sandbox::lexer::{tokenize, Tok, Token};

/// Maximum expression nesting depth accepted by the parser.
const MAX_DEPTH: usize = 64;

/// Parse `source` into a [`Program`], or return a compile-stage message.
pub fn parse(source: &str) -> Result<Program, String> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let body = parser.parse_block_body(None)?;
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&Tok::Newline)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, kind: &Tok) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &Tok, what: &str) -> Result<(), String> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(format!(
                "line {}: expected {}, found {:?}",
                self.line(),
                what,
                self.peek()
            ))
        }
    }

    fn skip_newlines(&mut self) {
        while !self.at_end() && self.peek() == &Tok::Newline {
            self.pos += 1;
        }
    }

    /// Parse statements until `terminator` (or end of input when `None`).
    fn parse_block_body(&mut self, terminator: Option<&Tok>) -> Result<Vec<Stmt>, String> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() {
                if let Some(term) = terminator {
                    return Err(format!("line {}: expected {:?}", self.line(), term));
                }
                return Ok(body);
            }
            if let Some(term) = terminator {
                if self.peek() == term {
                    self.pos += 1;
                    return Ok(body);
                }
            }
            body.push(self.parse_stmt()?);
        }
    }

    fn parse_braced_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.skip_newlines();
        self.expect(&Tok::LBrace, "'{'")?;
        self.parse_block_body(Some(&Tok::RBrace))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        match self.peek().clone() {
            Tok::Import => {
                self.pos += 1;
                let module = self.parse_dotted_name()?;
                self.end_of_stmt()?;
                Ok(Stmt::Import { module })
            }
            Tok::If => {
                self.pos += 1;
                self.parse_if()
            }
            Tok::While => {
                self.pos += 1;
                let cond = self.parse_expr()?;
                let body = self.parse_braced_block()?;
                Ok(Stmt::While { cond, body })
            }
            Tok::For => {
                self.pos += 1;
                let var = self.parse_ident("loop variable")?;
                self.expect(&Tok::In, "'in'")?;
                let iter = self.parse_expr()?;
                let body = self.parse_braced_block()?;
                Ok(Stmt::For { var, iter, body })
            }
            Tok::Break => {
                self.pos += 1;
                self.end_of_stmt()?;
                Ok(Stmt::Break)
            }
            Tok::Continue => {
                self.pos += 1;
                self.end_of_stmt()?;
                Ok(Stmt::Continue)
            }
            Tok::Pass => {
                self.pos += 1;
                self.end_of_stmt()?;
                Ok(Stmt::Pass)
            }
            _ => self.parse_assign_or_expr(),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        let body = self.parse_braced_block()?;
        arms.push((cond, body));

        let mut else_body = None;
        loop {
            // `elif`/`else` may sit on the line after the closing brace.
            let mark = self.pos;
            self.skip_newlines();
            match self.peek() {
                Tok::Elif => {
                    self.pos += 1;
                    let cond = self.parse_expr()?;
                    let body = self.parse_braced_block()?;
                    arms.push((cond, body));
                }
                Tok::Else => {
                    self.pos += 1;
                    else_body = Some(self.parse_braced_block()?);
                    break;
                }
                _ => {
                    self.pos = mark;
                    break;
                }
            }
        }
        Ok(Stmt::If { arms, else_body })
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, String> {
        // Lookahead for the assignment forms before committing to an
        // expression parse: `name = ...`, `name op= ...`, `name[expr] = ...`.
        if let Tok::Ident(name) = self.peek().clone() {
            let next = self.tokens.get(self.pos + 1).map(|t| t.kind.clone());
            match next {
                Some(Tok::Assign) => {
                    self.pos += 2;
                    let value = self.parse_expr()?;
                    self.end_of_stmt()?;
                    return Ok(Stmt::Assign {
                        name,
                        op: None,
                        value,
                    });
                }
                Some(Tok::PlusAssign)
                | Some(Tok::MinusAssign)
                | Some(Tok::StarAssign)
                | Some(Tok::SlashAssign) => {
                    let op = match next {
                        Some(Tok::PlusAssign) => BinOp::Add,
                        Some(Tok::MinusAssign) => BinOp::Sub,
                        Some(Tok::StarAssign) => BinOp::Mul,
                        _ => BinOp::Div,
                    };
                    self.pos += 2;
                    let value = self.parse_expr()?;
                    self.end_of_stmt()?;
                    return Ok(Stmt::Assign {
                        name,
                        op: Some(op),
                        value,
                    });
                }
                Some(Tok::LBracket) => {
                    // Could be an index assignment; try it, fall back to an
                    // expression statement if no `=` follows the `]`.
                    let mark = self.pos;
                    self.pos += 2;
                    if let Ok(index) = self.parse_expr() {
                        if self.eat(&Tok::RBracket) && self.eat(&Tok::Assign) {
                            let value = self.parse_expr()?;
                            self.end_of_stmt()?;
                            return Ok(Stmt::IndexAssign { name, index, value });
                        }
                    }
                    self.pos = mark;
                }
                _ => {}
            }
        }
        let expr = self.parse_expr()?;
        self.end_of_stmt()?;
        Ok(Stmt::Expr(expr))
    }

    fn end_of_stmt(&mut self) -> Result<(), String> {
        if self.at_end() || self.peek() == &Tok::RBrace {
            return Ok(());
        }
        self.expect(&Tok::Newline, "end of statement")
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            other => Err(format!(
                "line {}: expected {}, found {:?}",
                self.line(),
                what,
                other
            )),
        }
    }

    fn parse_dotted_name(&mut self) -> Result<String, String> {
        let mut name = self.parse_ident("module name")?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.parse_ident("module name")?);
        }
        Ok(name)
    }

    // -- expressions, lowest to highest precedence --

    fn parse_expr(&mut self) -> Result<Expr, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("line {}: expression too deeply nested", self.line()));
        }
        self.depth += 1;
        let expr = self.parse_or();
        self.depth -= 1;
        expr
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Logic {
                op: LogicOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Tok::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::Logic {
                op: LogicOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Tok::Eq => BinOp::Eq,
            Tok::NotEq => BinOp::NotEq,
            Tok::Lt => BinOp::Lt,
            Tok::LtEq => BinOp::LtEq,
            Tok::Gt => BinOp::Gt,
            Tok::GtEq => BinOp::GtEq,
            Tok::In => BinOp::In,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Tok::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_postfix()?;
        if self.eat(&Tok::StarStar) {
            // Right-associative.
            let rhs = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Tok::LParen => {
                    self.pos += 1;
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Tok::LBracket => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Tok::Dot => {
                    self.pos += 1;
                    let name = self.parse_ident("attribute name")?;
                    expr = Expr::Attr {
                        obj: Box::new(expr),
                        name,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Tok::RParen) {
                return Ok(args);
            }
            self.expect(&Tok::Comma, "',' or ')'")?;
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        let line = self.line();
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Int(n)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::NoneLit => Ok(Expr::None),
            Tok::Ident(name) => Ok(Expr::Name(name)),
            Tok::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_expr()?);
                    if self.eat(&Tok::RBracket) {
                        return Ok(Expr::List(items));
                    }
                    self.expect(&Tok::Comma, "',' or ']'")?;
                }
            }
            Tok::LBrace => {
                let mut entries = Vec::new();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Map(entries));
                }
                loop {
                    let key = self.parse_expr()?;
                    self.expect(&Tok::Colon, "':'")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if self.eat(&Tok::RBrace) {
                        return Ok(Expr::Map(entries));
                    }
                    self.expect(&Tok::Comma, "',' or '}'")?;
                }
            }
            other => Err(format!(
                "line {}: unexpected {:?} in expression",
                line, other
            )),
        }
    }
}
