//! Recursive-descent parser producing [`crate::ast`] nodes.
//!
//! Error messages follow CPython's wording for the same mistake so that a
//! beginner sees the text they would get from the real interpreter.

use std::collections::BTreeSet;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::tokenize;
use crate::token::{Keyword, Token, TokenKind};

/// CPython refuses deeper bracket nesting with the same message.
const MAX_NESTING: u32 = 200;

/// Expression depth accepted by [`parse`].
pub const DEFAULT_EXPRESSION_DEPTH: u32 = 1000;

/// Parse a module.
pub fn parse(source: &str) -> ParseResult<Block> {
    parse_with_depth(source, DEFAULT_EXPRESSION_DEPTH)
}

/// Parse a module, refusing expressions nested deeper than `max_depth`
/// with `RecursionError`. Each unary operator, operand of an operator chain
/// and parenthesised group counts as one level.
pub fn parse_with_depth(source: &str, max_depth: u32) -> ParseResult<Block> {
    let tokens = tokenize(source)?;
    Parser::new(tokens, max_depth).module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: u32,
    function_depth: u32,
    nesting: u32,
    depth: u32,
    max_depth: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            function_depth: 0,
            nesting: 0,
            depth: 0,
            max_depth,
        }
    }

    // ---------------------------------------------------------------------
    // Token helpers
    // ---------------------------------------------------------------------

    fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let tok = self.peek();
        ParseError::syntax(message, tok.line, tok.column)
    }

    fn invalid_syntax(&self) -> ParseError {
        self.error_here("invalid syntax")
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    fn module(mut self) -> ParseResult<Block> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.check(&TokenKind::Indent) {
                let tok = self.peek();
                return Err(ParseError::indentation(
                    "unexpected indent",
                    tok.line,
                    tok.column,
                ));
            }
            body.extend(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> ParseResult<Vec<Stmt>> {
        let line = self.peek().line;
        let kw = match self.peek_kind() {
            TokenKind::Keyword(kw) => Some(*kw),
            _ => None,
        };
        match kw {
            Some(Keyword::If) => {
                self.advance();
                Ok(vec![self.if_stmt(line, "if")?])
            }
            Some(Keyword::While) => Ok(vec![self.while_stmt(line)?]),
            Some(Keyword::For) => Ok(vec![self.for_stmt(line)?]),
            Some(Keyword::Def) => Ok(vec![self.function_def(line)?]),
            Some(Keyword::Try) => Ok(vec![self.try_stmt(line)?]),
            Some(
                kw @ (Keyword::Class
                | Keyword::With
                | Keyword::Async
                | Keyword::Global
                | Keyword::Nonlocal),
            ) => Err(self.error_here(format!(
                "'{}' statements are not supported in snippets",
                kw.as_str()
            ))),
            Some(Keyword::Else) | Some(Keyword::Elif) | Some(Keyword::Except)
            | Some(Keyword::Finally) => Err(self.invalid_syntax()),
            _ => self.simple_statements(),
        }
    }

    fn simple_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            stmts.push(self.simple_statement()?);
            if self.eat(&TokenKind::Semicolon) {
                if self.check(&TokenKind::Newline) || self.check(&TokenKind::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        if !self.eat(&TokenKind::Newline) && !self.check(&TokenKind::Eof) {
            if let Some(Stmt {
                kind: StmtKind::Expr(Expr::Name(name)),
                line,
            }) = stmts.last()
            {
                if name == "print" || name == "exec" {
                    return Err(ParseError::syntax(
                        format!("Missing parentheses in call to '{name}'. Did you mean {name}(...)?"),
                        *line,
                        self.first_column_of_line(*line),
                    ));
                }
            }
            return Err(self.invalid_syntax());
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> ParseResult<Stmt> {
        let tok = self.peek().clone();
        let line = tok.line;
        let kind = match &tok.kind {
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Keyword(Keyword::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'break' outside loop"));
                }
                self.advance();
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.error_here("'continue' not properly in loop"));
                }
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Return) => {
                if self.function_depth == 0 {
                    return Err(self.error_here("'return' outside function"));
                }
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expr_list()?))
                }
            }
            TokenKind::Keyword(Keyword::Del) => {
                self.advance();
                let mut targets = Vec::new();
                loop {
                    let start = self.peek().clone();
                    let expr = self.expr()?;
                    targets.push(self.to_target(expr, &start, "delete")?);
                    if !self.eat(&TokenKind::Comma) || self.at_statement_end() {
                        break;
                    }
                }
                StmtKind::Del(targets)
            }
            TokenKind::Keyword(Keyword::Import) => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    let name = self.dotted_name()?;
                    let asname = if self.eat_kw(Keyword::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push(Alias { name, asname });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::Import(names)
            }
            TokenKind::Keyword(Keyword::From) => {
                self.advance();
                let module = self.dotted_name()?;
                if !self.eat_kw(Keyword::Import) {
                    return Err(self.invalid_syntax());
                }
                let parenthesized = self.eat(&TokenKind::LParen);
                let mut names = Vec::new();
                loop {
                    if self.check(&TokenKind::Star) {
                        return Err(self.error_here("'import *' is not supported in snippets"));
                    }
                    let name = self.expect_name()?;
                    let asname = if self.eat_kw(Keyword::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push(Alias { name, asname });
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                    if parenthesized && self.check(&TokenKind::RParen) {
                        break;
                    }
                }
                if parenthesized {
                    self.expect(&TokenKind::RParen, "invalid syntax")?;
                }
                StmtKind::ImportFrom { module, names }
            }
            TokenKind::Keyword(Keyword::Raise) => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    let exc = self.expr()?;
                    // `raise X from Y`: the cause is evaluated for errors only.
                    if self.eat_kw(Keyword::From) {
                        self.expr()?;
                    }
                    StmtKind::Raise(Some(exc))
                }
            }
            TokenKind::Keyword(Keyword::Assert) => {
                self.advance();
                let test = self.expr()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.expr()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Keyword(
                kw @ (Keyword::Yield | Keyword::Await | Keyword::Global | Keyword::Nonlocal),
            ) => {
                return Err(self.error_here(format!(
                    "'{}' is not supported in snippets",
                    kw.as_str()
                )))
            }
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn expression_statement(&mut self) -> ParseResult<StmtKind> {
        let start = self.peek().clone();
        let first = self.expr_list()?;

        if let Some(op) = self.augmented_op() {
            self.advance();
            let target = match &first {
                Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. } => {
                    self.to_target(first, &start, "assign to")?
                }
                other => {
                    let noun = match other {
                        Expr::Tuple(_) => "'tuple'",
                        Expr::List(_) => "'list'",
                        _ => other.describe(),
                    };
                    return Err(ParseError::syntax(
                        format!("{noun} is an illegal expression for augmented assignment"),
                        start.line,
                        start.column,
                    ));
                }
            };
            let value = self.expr_list()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }

        if !self.check(&TokenKind::Assign) {
            return Ok(StmtKind::Expr(first));
        }

        let mut pending = vec![(first, start)];
        while self.eat(&TokenKind::Assign) {
            let start = self.peek().clone();
            if self.at_statement_end() {
                return Err(self.invalid_syntax());
            }
            pending.push((self.expr_list()?, start));
        }
        let (value, _) = pending.pop().ok_or_else(|| self.invalid_syntax())?;
        let mut targets = Vec::with_capacity(pending.len());
        for (expr, start) in pending {
            targets.push(self.assign_target(expr, &start)?);
        }
        Ok(StmtKind::Assign { targets, value })
    }

    fn augmented_op(&self) -> Option<BinOp> {
        let op = match self.peek_kind() {
            TokenKind::PlusAssign => BinOp::Add,
            TokenKind::MinusAssign => BinOp::Sub,
            TokenKind::StarAssign => BinOp::Mul,
            TokenKind::SlashAssign => BinOp::Div,
            TokenKind::DoubleSlashAssign => BinOp::FloorDiv,
            TokenKind::PercentAssign => BinOp::Mod,
            TokenKind::DoubleStarAssign => BinOp::Pow,
            _ => return None,
        };
        Some(op)
    }

    fn assign_target(&self, expr: Expr, start: &Token) -> ParseResult<Target> {
        match expr {
            Expr::Name(_)
            | Expr::Subscript { .. }
            | Expr::Attribute { .. }
            | Expr::Tuple(_)
            | Expr::List(_) => self.to_target(expr, start, "assign to"),
            other => Err(ParseError::syntax(
                format!(
                    "cannot assign to {} here. Maybe you meant '==' instead of '='?",
                    other.describe()
                ),
                start.line,
                start.column,
            )),
        }
    }

    fn to_target(&self, expr: Expr, start: &Token, verb: &str) -> ParseResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { value, index } => Ok(Target::Subscript { value, index }),
            Expr::Attribute { value, attr } => Ok(Target::Attribute { value, attr }),
            Expr::Tuple(items) | Expr::List(items) => {
                let mut targets = Vec::with_capacity(items.len());
                for item in items {
                    targets.push(self.to_target(item, start, verb)?);
                }
                Ok(Target::Tuple(targets))
            }
            other => Err(ParseError::syntax(
                format!("cannot {verb} {}", other.describe()),
                start.line,
                start.column,
            )),
        }
    }

    fn first_column_of_line(&self, line: u32) -> u32 {
        self.tokens
            .iter()
            .find(|t| t.line == line && !matches!(t.kind, TokenKind::Indent | TokenKind::Dedent))
            .map(|t| t.column)
            .unwrap_or(1)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    /// Parse `':' suite`. `header` names the construct in CPython's
    /// "expected an indented block after ..." message.
    fn block(&mut self, header: &str, header_line: u32) -> ParseResult<Block> {
        self.expect(&TokenKind::Colon, "expected ':'")?;
        if !self.eat(&TokenKind::Newline) {
            if self.check(&TokenKind::Eof) {
                return Err(self.invalid_syntax());
            }
            return self.simple_statements();
        }
        if !self.eat(&TokenKind::Indent) {
            let tok = self.peek();
            return Err(ParseError::indentation(
                format!("expected an indented block after {header} on line {header_line}"),
                tok.line,
                tok.column,
            ));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.check(&TokenKind::Eof) {
                break;
            }
            if self.check(&TokenKind::Indent) {
                let tok = self.peek();
                return Err(ParseError::indentation(
                    "unexpected indent",
                    tok.line,
                    tok.column,
                ));
            }
            body.extend(self.statement()?);
        }
        Ok(body)
    }

    /// Parse the rest of an `if`/`elif` after its keyword.
    fn if_stmt(&mut self, line: u32, keyword: &str) -> ParseResult<Stmt> {
        let test = self.expr()?;
        let body = self.block(&format!("'{keyword}' statement"), line)?;
        let orelse = if self.check_kw(Keyword::Elif) {
            let elif_line = self.advance().line;
            vec![self.if_stmt(elif_line, "elif")?]
        } else if self.check_kw(Keyword::Else) {
            let else_line = self.advance().line;
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            line,
        })
    }

    fn loop_body(&mut self, header: &str, line: u32) -> ParseResult<Block> {
        self.loop_depth += 1;
        let body = self.block(header, line);
        self.loop_depth -= 1;
        body
    }

    fn loop_else(&mut self) -> ParseResult<Block> {
        if self.check_kw(Keyword::Else) {
            let else_line = self.advance().line;
            self.block("'else' statement", else_line)
        } else {
            Ok(Vec::new())
        }
    }

    fn while_stmt(&mut self, line: u32) -> ParseResult<Stmt> {
        self.advance();
        let test = self.expr()?;
        let body = self.loop_body("'while' statement", line)?;
        let orelse = self.loop_else()?;
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            line,
        })
    }

    fn for_stmt(&mut self, line: u32) -> ParseResult<Stmt> {
        self.advance();
        let start = self.peek().clone();
        let mut items = vec![self.arith()?];
        while self.eat(&TokenKind::Comma) {
            if self.check_kw(Keyword::In) {
                break;
            }
            items.push(self.arith()?);
        }
        let target_expr = if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Tuple(items)
        };
        let target = self.to_target(target_expr, &start, "assign to")?;
        if !self.eat_kw(Keyword::In) {
            return Err(self.invalid_syntax());
        }
        let iter = self.expr_list()?;
        let body = self.loop_body("'for' statement", line)?;
        let orelse = self.loop_else()?;
        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            line,
        })
    }

    fn function_def(&mut self, line: u32) -> ParseResult<Stmt> {
        self.advance();
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen, "expected '('")?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if matches!(self.peek_kind(), TokenKind::Star | TokenKind::DoubleStar) {
                return Err(self.error_here("'*args' and '**kwargs' are not supported in snippets"));
            }
            let param_tok = self.peek().clone();
            let param_name = self.expect_name()?;
            if params.iter().any(|p| p.name == param_name) {
                return Err(ParseError::syntax(
                    format!("duplicate argument '{param_name}' in function definition"),
                    param_tok.line,
                    param_tok.column,
                ));
            }
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(ParseError::syntax(
                        "non-default argument follows default argument",
                        param_tok.line,
                        param_tok.column,
                    ));
                }
                None
            };
            params.push(Param {
                name: param_name,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "invalid syntax")?;
        // return annotation `-> T` arrives as `-` `>`
        if self.check(&TokenKind::Minus) && self.peek_next_kind() == Some(&TokenKind::Gt) {
            self.advance();
            self.advance();
            self.expr()?;
        }

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.block("function definition", line);
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        let body = body?;

        let mut locals: BTreeSet<String> = params.iter().map(|p| p.name.clone()).collect();
        collect_locals(&body, &mut locals);
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                params,
                body,
                line,
                locals,
            })),
            line,
        })
    }

    fn try_stmt(&mut self, line: u32) -> ParseResult<Stmt> {
        self.advance();
        let body = self.block("'try' statement", line)?;

        let mut handlers: Vec<Handler> = Vec::new();
        while self.check_kw(Keyword::Except) {
            let except_tok = self.advance();
            if handlers.last().is_some_and(|h| h.kinds.is_none()) {
                return Err(ParseError::syntax(
                    "default 'except:' must be last",
                    except_tok.line,
                    except_tok.column,
                ));
            }
            let (kinds, name) = if self.check(&TokenKind::Colon) {
                (None, None)
            } else {
                let kinds = self.expr()?;
                if self.check(&TokenKind::Comma) {
                    return Err(self.error_here(
                        "multiple exception types must be parenthesized",
                    ));
                }
                let name = if self.eat_kw(Keyword::As) {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(kinds), name)
            };
            let handler_body = self.block("'except' statement", except_tok.line)?;
            handlers.push(Handler {
                kinds,
                name,
                body: handler_body,
                line: except_tok.line,
            });
        }

        let orelse = if !handlers.is_empty() && self.check_kw(Keyword::Else) {
            let else_line = self.advance().line;
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        let finalbody = if self.check_kw(Keyword::Finally) {
            let finally_line = self.advance().line;
            self.block("'finally' statement", finally_line)?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }

        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            line,
        })
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// `expr (',' expr)* [',']`: a bare tuple when a comma is present.
    fn expr_list(&mut self) -> ParseResult<Expr> {
        let first = self.expr()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expr() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn starts_expr(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::BigInt(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::FString(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::True | Keyword::False | Keyword::None | Keyword::Not | Keyword::Lambda
            ),
            _ => false,
        }
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        if self.check_kw(Keyword::Lambda) {
            return Err(self.error_here("'lambda' is not supported in snippets"));
        }
        let body = self.or_test()?;
        if !self.eat_kw(Keyword::If) {
            return Ok(body);
        }
        let test = self.or_test()?;
        if !self.eat_kw(Keyword::Else) {
            return Err(self.error_here("expected 'else' after 'if' expression"));
        }
        let orelse = self.expr()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_test(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let mut left = self.and_test()?;
        while self.eat_kw(Keyword::Or) {
            self.descend()?;
            let right = self.and_test()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn and_test(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let mut left = self.not_test()?;
        while self.eat_kw(Keyword::And) {
            self.descend()?;
            let right = self.not_test()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn not_test(&mut self) -> ParseResult<Expr> {
        if self.eat_kw(Keyword::Not) {
            let operand = self.nested(Self::not_test)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let next = self.peek_next_kind().cloned();
        let (op, width) = match (self.peek_kind(), next) {
            (TokenKind::EqEq, _) => (CmpOp::Eq, 1),
            (TokenKind::NotEq, _) => (CmpOp::NotEq, 1),
            (TokenKind::Lt, _) => (CmpOp::Lt, 1),
            (TokenKind::LtEq, _) => (CmpOp::LtEq, 1),
            (TokenKind::Gt, _) => (CmpOp::Gt, 1),
            (TokenKind::GtEq, _) => (CmpOp::GtEq, 1),
            (TokenKind::Keyword(Keyword::In), _) => (CmpOp::In, 1),
            (TokenKind::Keyword(Keyword::Not), Some(TokenKind::Keyword(Keyword::In))) => {
                (CmpOp::NotIn, 2)
            }
            (TokenKind::Keyword(Keyword::Is), Some(TokenKind::Keyword(Keyword::Not))) => {
                (CmpOp::IsNot, 2)
            }
            (TokenKind::Keyword(Keyword::Is), _) => (CmpOp::Is, 1),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(op)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let left = self.arith()?;
        let mut links = Vec::new();
        while let Some(op) = self.comparison_op() {
            links.push((op, self.arith()?));
        }
        if links.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                links,
            })
        }
    }

    fn arith(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.term()?;
            left = binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let mut left = self.factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.factor()?;
            left = binary(op, left, right);
        }
        self.depth = saved;
        Ok(left)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Self::factor)?;
        // fold negative literals so `-5` reprs and compares like a literal
        if op == UnaryOp::Neg {
            match &operand {
                Expr::Int(i) => {
                    return Ok(match i.checked_neg() {
                        Some(n) => Expr::Int(n),
                        None => Expr::BigInt(-BigInt::from(*i)),
                    })
                }
                Expr::BigInt(n) => {
                    let n = -n;
                    return Ok(n.to_i64().map_or(Expr::BigInt(n), Expr::Int));
                }
                Expr::Float(f) => return Ok(Expr::Float(-*f)),
                _ => {}
            }
        }
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> ParseResult<Expr> {
        let base = self.primary()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.nested(Self::factor)?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let mut expr = self.atom()?;
        loop {
            if matches!(
                self.peek_kind(),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot
            ) {
                self.descend()?;
            }
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    self.enter()?;
                    let call = self.call_args(expr);
                    self.nesting -= 1;
                    expr = call?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.enter()?;
                    let index = self.subscript();
                    self.nesting -= 1;
                    let index = index?;
                    self.expect(&TokenKind::RBracket, "invalid syntax")?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                _ => break,
            }
        }
        self.depth = saved;
        Ok(expr)
    }

    fn call_args(&mut self, func: Expr) -> ParseResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if matches!(self.peek_kind(), TokenKind::Star | TokenKind::DoubleStar) {
                return Err(self.error_here("argument unpacking is not supported in snippets"));
            }
            let is_keyword = matches!(self.peek_kind(), TokenKind::Name(_))
                && self.peek_next_kind() == Some(&TokenKind::Assign);
            if is_keyword {
                let name_tok = self.peek().clone();
                let name = self.expect_name()?;
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(ParseError::syntax(
                        format!("keyword argument repeated: {name}"),
                        name_tok.line,
                        name_tok.column,
                    ));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let arg = self.expr()?;
                if self.check_kw(Keyword::For) {
                    return Err(self.error_here("comprehensions are not supported in snippets"));
                }
                args.push(arg);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "invalid syntax")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self) -> ParseResult<Expr> {
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let first = self.expr_list()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(first);
            }
            Some(Box::new(first))
        };
        self.expect(&TokenKind::Colon, "invalid syntax")?;
        let upper = if matches!(self.peek_kind(), TokenKind::RBracket | TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.expr()?))
        };
        let step = if self.eat(&TokenKind::Colon) && !self.check(&TokenKind::RBracket) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    /// Charge one level of expression depth. Callers restore `depth`.
    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            let tok = self.peek();
            return Err(ParseError::recursion(tok.line, tok.column));
        }
        Ok(())
    }

    /// Run `inner` one expression level deeper.
    fn nested<T>(&mut self, inner: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let saved = self.depth;
        self.descend()?;
        let result = inner(self);
        self.depth = saved;
        result
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            self.nesting -= 1;
            return Err(self.error_here("too many nested parentheses"));
        }
        Ok(())
    }

    fn atom(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Name(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Int(i))
            }
            TokenKind::BigInt(n) => {
                self.advance();
                Ok(Expr::BigInt(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            TokenKind::Str(_) | TokenKind::FString(_) => self.strings(),
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                Ok(Expr::None)
            }
            TokenKind::LParen => {
                self.advance();
                self.enter()?;
                let inner = self.paren_body();
                self.nesting -= 1;
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                self.enter()?;
                let items = self.sequence_items(&TokenKind::RBracket);
                self.nesting -= 1;
                Ok(Expr::List(items?))
            }
            TokenKind::LBrace => {
                self.advance();
                self.enter()?;
                let dict = self.dict_body();
                self.nesting -= 1;
                dict
            }
            TokenKind::Keyword(Keyword::Lambda) => {
                Err(self.error_here("'lambda' is not supported in snippets"))
            }
            TokenKind::Keyword(Keyword::Yield) | TokenKind::Keyword(Keyword::Await) => {
                Err(self.error_here("generators and coroutines are not supported in snippets"))
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    fn paren_body(&mut self) -> ParseResult<Expr> {
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.expr()?;
        if self.check_kw(Keyword::For) {
            return Err(self.error_here("generator expressions are not supported in snippets"));
        }
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }
        self.expect(&TokenKind::Comma, "invalid syntax")?;
        let mut items = vec![first];
        while !self.check(&TokenKind::RParen) {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "invalid syntax")?;
        Ok(Expr::Tuple(items))
    }

    fn sequence_items(&mut self, close: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(close) {
            items.push(self.expr()?);
            if self.check_kw(Keyword::For) {
                return Err(self.error_here("comprehensions are not supported in snippets"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(close) {
            return Err(self.error_here("invalid syntax. Perhaps you forgot a comma?"));
        }
        Ok(items)
    }

    fn dict_body(&mut self) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.expr()?;
            if !self.check(&TokenKind::Colon) {
                return Err(self.error_here("set literals are not supported in snippets"));
            }
            self.advance();
            let value = self.expr()?;
            if self.check_kw(Keyword::For) {
                return Err(self.error_here("comprehensions are not supported in snippets"));
            }
            pairs.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(&TokenKind::RBrace) {
            return Err(self.error_here("invalid syntax. Perhaps you forgot a comma?"));
        }
        Ok(Expr::Dict(pairs))
    }

    /// Adjacent string literals concatenate; any f-string in the run makes
    /// the whole run an f-string.
    fn strings(&mut self) -> ParseResult<Expr> {
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Str(s) => {
                    self.advance();
                    push_literal(&mut parts, &s);
                }
                TokenKind::FString(body) => {
                    self.advance();
                    formatted = true;
                    for part in parse_fstring(&body, tok.line, tok.column)? {
                        match part {
                            FStringPart::Literal(s) => push_literal(&mut parts, &s),
                            field => parts.push(field),
                        }
                    }
                }
                _ => break,
            }
        }
        if formatted {
            return Ok(Expr::FString(parts));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(s)) => s,
            _ => String::new(),
        };
        Ok(Expr::Str(text))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

/// Split an f-string body into literal text and `{expr!c:spec}` fields.
fn parse_fstring(body: &str, line: u32, column: u32) -> ParseResult<Vec<FStringPart>> {
    let err = |msg: &str| ParseError::syntax(format!("f-string: {msg}"), line, column);
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' {
            if chars.get(i + 1) == Some(&'}') {
                literal.push('}');
                i += 2;
                continue;
            }
            return Err(err("single '}' is not allowed"));
        }
        if c != '{' {
            literal.push(c);
            i += 1;
            continue;
        }

        // find the end of the replacement field
        i += 1;
        let start = i;
        let mut depth = 0i32;
        let mut quote: Option<char> = None;
        let mut expr_end: Option<usize> = None;
        let mut conversion: Option<char> = None;
        let mut spec_start: Option<usize> = None;
        while i < chars.len() {
            let ch = chars[i];
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match ch {
                '\'' | '"' if spec_start.is_none() => quote = Some(ch),
                '(' | '[' | '{' if spec_start.is_none() => depth += 1,
                ')' | ']' if spec_start.is_none() => depth -= 1,
                '}' if depth > 0 && spec_start.is_none() => depth -= 1,
                '}' => break,
                '!' if depth == 0
                    && spec_start.is_none()
                    && expr_end.is_none()
                    && chars.get(i + 1) != Some(&'=') =>
                {
                    expr_end = Some(i);
                    conversion = chars.get(i + 1).copied();
                    i += 1;
                }
                ':' if depth == 0 && spec_start.is_none() => {
                    if expr_end.is_none() {
                        expr_end = Some(i);
                    }
                    spec_start = Some(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        if i >= chars.len() {
            return Err(err("expecting '}'"));
        }
        let end = expr_end.unwrap_or(i);
        let mut expr_text: String = chars[start..end].iter().collect();
        let spec = spec_start.map(|s| chars[s..i].iter().collect::<String>());
        i += 1;

        if let Some(conv) = conversion {
            if !matches!(conv, 'r' | 's' | 'a') {
                return Err(err("invalid conversion character: expected 's', 'r', or 'a'"));
            }
        }

        // self-documenting `{name=}`
        let trimmed = expr_text.trim_end();
        let debug = trimmed.ends_with('=')
            && !trimmed.ends_with("==")
            && !trimmed.ends_with("!=")
            && !trimmed.ends_with("<=")
            && !trimmed.ends_with(">=");
        if debug {
            literal.push_str(&expr_text);
            let without = trimmed.trim_end_matches('=').to_string();
            expr_text = without;
        }

        if expr_text.trim().is_empty() {
            return Err(err("empty expression not allowed"));
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
        }
        let expr = parse_inline_expr(expr_text.trim()).map_err(|e| {
            ParseError::syntax(format!("f-string: {}", e.message), line, column)
        })?;
        let conversion = match (conversion, debug, &spec) {
            (None, true, None) => Some('r'),
            (conv, _, _) => conv,
        };
        parts.push(FStringPart::Field {
            expr,
            conversion,
            spec,
        });
    }
    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

fn parse_inline_expr(text: &str) -> ParseResult<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(tokens, DEFAULT_EXPRESSION_DEPTH);
    let expr = parser.expr_list()?;
    if !matches!(parser.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
        return Err(parser.invalid_syntax());
    }
    Ok(expr)
}
