// crates/dcal-expr/src/parser.rs
// ============================================================================
// Module: Expression Parser
// Description: Recursive-descent parser producing the closed Expr AST.
// Purpose: Turn a token stream into a tree the evaluator can walk, enforcing
//          nesting limits and reporting precise positions on failure.
// Dependencies: crate::ast, crate::error::ExprSyntaxError, crate::lexer
// ============================================================================

use time::Date;
use time::macros::format_description;

use crate::MAX_EXPRESSION_NESTING;
use crate::ast::ArithOp;
use crate::ast::CompareOp;
use crate::ast::Expr;
use crate::error::ExprSyntaxError;
use crate::lexer::SpannedToken;
use crate::lexer::Token;

/// Recursive-descent parser over a token stream.
pub(crate) struct Parser {
    tokens: Vec<SpannedToken>,
    index: usize,
    nesting: usize,
}

impl Parser {
    pub(crate) const fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, index: 0, nesting: 0 }
    }

    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ExprSyntaxError> {
        self.parse_or()
    }

    pub(crate) fn expect_eof(&self) -> Result<(), ExprSyntaxError> {
        if matches!(self.current().token, Token::Eof) {
            Ok(())
        } else {
            Err(ExprSyntaxError::TrailingInput { position: self.current().position })
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprSyntaxError> {
        let mut parts = vec![self.parse_and()?];
        while self.matches(&Token::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::Or(parts) })
    }

    fn parse_and(&mut self) -> Result<Expr, ExprSyntaxError> {
        let mut parts = vec![self.parse_not()?];
        while self.matches(&Token::And) {
            parts.push(self.parse_not()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expr::And(parts) })
    }

    fn parse_not(&mut self) -> Result<Expr, ExprSyntaxError> {
        if self.matches(&Token::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprSyntaxError> {
        let lhs = self.parse_membership()?;
        let op = match self.current().token {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_membership()?;
        Ok(Expr::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn parse_membership(&mut self) -> Result<Expr, ExprSyntaxError> {
        let negated_prefix = self.peek_not_in();
        let needle = self.parse_additive()?;

        if negated_prefix {
            self.advance(); // consume `not`
            self.expect(&Token::In, "`in` after `not`")?;
            let haystack = self.parse_additive()?;
            return Ok(Expr::In { needle: Box::new(needle), haystack: Box::new(haystack), negated: true });
        }

        if self.matches(&Token::In) {
            let haystack = self.parse_additive()?;
            return Ok(Expr::In { needle: Box::new(needle), haystack: Box::new(haystack), negated: false });
        }

        Ok(needle)
    }

    /// Detects a `not in` sequence without consuming tokens, since `not` also
    /// starts unary negation at a higher precedence level.
    fn peek_not_in(&self) -> bool {
        matches!(self.current().token, Token::Not)
            && matches!(self.peek(1).map(|t| &t.token), Some(Token::In))
    }

    fn peek(&self, delta: usize) -> Option<&SpannedToken> {
        self.tokens.get(self.index + delta)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprSyntaxError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current().token {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprSyntaxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current().token {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprSyntaxError> {
        if self.matches(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprSyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().token {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_ident("attribute name after `.`")?;
                    expr = match expr {
                        Expr::Attribute { root, mut path } => {
                            path.push(name);
                            Expr::Attribute { root, path }
                        }
                        other => {
                            // Only root attribute chains are addressable;
                            // attribute-of-a-non-root expression is rejected
                            // at parse time to keep the surface closed.
                            return Err(ExprSyntaxError::UnexpectedToken {
                                expected: "attribute access only on a root entity",
                                found: format!("{other:?}"),
                                position: self.current().position,
                            });
                        }
                    };
                }
                Token::LBracket => {
                    let pos = self.current().position;
                    self.advance();
                    let index = self.with_nesting(pos, Self::parse_expression)?;
                    self.expect(&Token::RBracket, "`]`")?;
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprSyntaxError> {
        let SpannedToken { token, position } = self.current().clone();
        match token {
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Number(raw) => {
                self.advance();
                Self::parse_number(&raw, position)
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expr::Str(value))
            }
            Token::LBracket => {
                self.advance();
                let items = self.with_nesting(position, Self::parse_list_items)?;
                Ok(Expr::List(items))
            }
            Token::LParen => {
                self.advance();
                let inner = self.with_nesting(position, Self::parse_expression)?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                if self.matches(&Token::LParen) {
                    let args = self.with_nesting(position, Self::parse_argument_list)?;
                    return Ok(Expr::Call { name, args });
                }
                Ok(Expr::Attribute { root: name, path: Vec::new() })
            }
            other => Err(ExprSyntaxError::UnexpectedToken {
                expected: "literal, identifier, `(`, or `[`",
                found: Self::describe(&other),
                position,
            }),
        }
    }

    fn parse_number(raw: &str, position: usize) -> Result<Expr, ExprSyntaxError> {
        if raw.contains('.') {
            raw.parse::<f64>()
                .map(Expr::Float)
                .map_err(|_| ExprSyntaxError::InvalidNumber { raw: raw.to_string(), position })
        } else {
            raw.parse::<i64>()
                .map(Expr::Int)
                .map_err(|_| ExprSyntaxError::InvalidNumber { raw: raw.to_string(), position })
        }
    }

    fn parse_list_items(&mut self) -> Result<Vec<Expr>, ExprSyntaxError> {
        let mut items = Vec::new();
        if self.matches(&Token::RBracket) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.matches(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RBracket, "`]` after list items")?;
            break;
        }
        Ok(items)
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expr>, ExprSyntaxError> {
        let mut args = Vec::new();
        if self.matches(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.matches(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen, "`)` after arguments")?;
            break;
        }
        Ok(args)
    }

    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ExprSyntaxError>,
    ) -> Result<T, ExprSyntaxError> {
        let next_depth = self.nesting + 1;
        if next_depth > MAX_EXPRESSION_NESTING {
            return Err(ExprSyntaxError::NestingTooDeep {
                max_depth: MAX_EXPRESSION_NESTING,
                actual_depth: next_depth,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, ExprSyntaxError> {
        match self.current().token.clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ExprSyntaxError::UnexpectedToken {
                expected,
                found: Self::describe(&other),
                position: self.current().position,
            }),
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), ExprSyntaxError> {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(token) {
            self.advance();
            Ok(())
        } else {
            Err(ExprSyntaxError::UnexpectedToken {
                expected,
                found: Self::describe(&self.current().token),
                position: self.current().position,
            })
        }
    }

    fn matches(&mut self, token: &Token) -> bool {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn current(&self) -> &SpannedToken {
        debug_assert!(self.index < self.tokens.len(), "parser index out of bounds");
        &self.tokens[self.index]
    }

    const fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    fn describe(token: &Token) -> String {
        match token {
            Token::Ident(name) => name.clone(),
            Token::Number(raw) => raw.clone(),
            Token::Str(value) => format!("{value:?}"),
            Token::And => "and".to_string(),
            Token::Or => "or".to_string(),
            Token::Not => "not".to_string(),
            Token::In => "in".to_string(),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            Token::Null => "null".to_string(),
            Token::Eq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Le => "<=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Percent => "%".to_string(),
            Token::Dot => ".".to_string(),
            Token::Comma => ",".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::LBracket => "[".to_string(),
            Token::RBracket => "]".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// Parses a `YYYY-MM-DD` literal into a [`Date`], used by the `date(...)`
/// builtin at evaluation time rather than the lexer/parser, since date
/// literals are represented as ordinary string literals in expression
/// source.
pub(crate) fn parse_date_literal(raw: &str) -> Result<Date, ()> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(raw, &format).map_err(|_| ())
}
