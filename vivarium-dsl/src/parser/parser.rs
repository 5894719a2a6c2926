//! Parser implementation
//!
//! Recursive descent with precedence climbing. Parsing is scope-aware: a
//! declaration creates its symbol-table entry immediately, so later
//! statements (and nested scopes) can resolve names while the token stream
//! is still being consumed. Nodes are appended to the caller's AST arena.

use std::rc::Rc;

use tracing::debug;
use vivarium_core::{
    BaseType, ConfigError, FunctionBody, FunctionEntry, HostLink, ParseError, ScopeId,
    SymbolTable, TypeRegistry, Value,
};

use crate::ast::{Ast, Math2Op, Node, NodeId, StrOp};
use crate::lexer::{Symbol, Token, TokenKind};

use vivarium_core::EntryId;

/// Precedence limit that admits every operator.
const TOP_PREC: u8 = u8::MAX;

/// Parser for the configuration language.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source_name: String,
    table: &'a mut SymbolTable,
    types: &'a TypeRegistry,
    event_names: &'a [String],
    ast: &'a mut Ast,
    /// Event declarations are rejected when the parsed tree will be
    /// discarded after evaluation (EVAL snippets), since a deferred action
    /// must outlive the scheduler that holds it.
    allow_events: bool,
}

impl<'a> Parser<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tokens: Vec<Token>,
        source_name: &str,
        table: &'a mut SymbolTable,
        types: &'a TypeRegistry,
        event_names: &'a [String],
        ast: &'a mut Ast,
        allow_events: bool,
    ) -> Self {
        Parser {
            tokens,
            pos: 0,
            source_name: source_name.to_string(),
            table,
            types,
            event_names,
            ast,
            allow_events,
        }
    }

    /// Keep parsing statements until end of stream or a closing `}`.
    pub fn parse_statement_list(&mut self, scope: ScopeId) -> Result<NodeId, ParseError> {
        debug!(scope = self.table.scope_name(scope), "parse_statement_list");
        let mut children = Vec::new();
        while !self.at_end() && !self.check_symbol(Symbol::RBrace) {
            if let Some(node) = self.parse_statement(scope)? {
                children.push(node);
            }
        }
        Ok(self.ast.push(Node::Block { scope, children }))
    }

    /// Parse one statement: empty, anonymous block, event, declaration, or
    /// expression. Returns `None` for statements with no runtime effect.
    pub fn parse_statement(&mut self, scope: ScopeId) -> Result<Option<NodeId>, ParseError> {
        // Empty statement.
        if self.eat_symbol(Symbol::Semi) {
            return Ok(None);
        }

        // Anonymous block: statements in the *current* scope (no new scope
        // is introduced; shared lookup with the surrounding code).
        if self.eat_symbol(Symbol::LBrace) {
            let node = self.parse_statement_list(scope)?;
            self.expect_symbol(Symbol::RBrace, "Expected '}' to close scope.")?;
            return Ok(Some(node));
        }

        // Event declaration.
        if self.check_symbol(Symbol::At) {
            return self.parse_event(scope).map(Some);
        }

        // Declaration, when the statement begins with a known type name.
        if self.at_type_name() {
            let entry = self.parse_declaration(scope)?;

            // A ';' ends a stand-alone declaration.
            if self.eat_symbol(Symbol::Semi) {
                return Ok(None);
            }

            // A newly declared scope must be populated now.
            if let Some(inner) = self.table.entry(entry).scope_id() {
                let name = self.table.entry(entry).name.clone();
                self.expect_symbol(
                    Symbol::LBrace,
                    format!("Expected scope '{name}' definition to start with a '{{'."),
                )?;
                let node = self.parse_statement_list(inner)?;
                self.expect_symbol(
                    Symbol::RBrace,
                    format!("Expected scope '{name}' to end with a '}}'."),
                )?;
                return Ok(Some(node));
            }

            // Otherwise rewind the identifier so the fresh variable can start
            // an expression (`Value x = 3;`).
            self.pos -= 1;
        }

        let node = self.parse_expression(scope, TOP_PREC)?;
        self.expect_symbol(Symbol::Semi, "Expected ';' at the end of a statement.")?;
        Ok(Some(node))
    }

    /// Parse `TypeName identifier`, creating the entry in `scope`.
    fn parse_declaration(&mut self, scope: ScopeId) -> Result<EntryId, ParseError> {
        let type_name = match &self.current().kind {
            TokenKind::Identifier(s) => s.clone(),
            _ => return Err(self.error("Expected a type name to start a declaration.")),
        };
        self.advance();
        let var_name = self.expect_identifier(format!(
            "Type name '{type_name}' must be followed by variable to declare."
        ))?;
        debug!(var = %var_name, ty = %type_name, "parse_declaration");

        let info = match self.types.get(&type_name) {
            Some(info) => info,
            None => {
                return Err(self.error(
                    ConfigError::UnknownType { name: type_name }.to_string(),
                ))
            }
        };

        match info.base {
            BaseType::Value => self
                .table
                .add_value(scope, &var_name, 0.0, "Local value variable.")
                .map_err(|e| self.error(e.to_string())),
            BaseType::String => self
                .table
                .add_string(scope, &var_name, "", "Local string variable.")
                .map_err(|e| self.error(e.to_string())),
            BaseType::Struct => self
                .table
                .add_scope(scope, &var_name, "Local struct.", "Struct")
                .map(|(entry, _)| entry)
                .map_err(|e| self.error(e.to_string())),
            BaseType::Void | BaseType::Invalid => Err(self.error(format!(
                "Cannot declare a variable of type '{}'.",
                info.name
            ))),
            BaseType::Custom => {
                let (entry, inner) = self
                    .table
                    .add_scope(scope, &var_name, &info.desc, &info.name)
                    .map_err(|e| self.error(e.to_string()))?;

                // Instantiate the host object and install its configuration
                // surface: the standard internal variables first, then the
                // module's own links, then its member functions.
                if let Some(setup) = info.make_instance(&var_name) {
                    self.table
                        .link_var(
                            inner,
                            "_active",
                            HostLink::Bool(Rc::clone(&setup.active)),
                            "Should this module be active? (0=off, 1=on)",
                            true,
                        )
                        .map_err(|e| self.error(e.to_string()))?;
                    self.table
                        .link_var(
                            inner,
                            "_desc",
                            HostLink::Str(Rc::clone(&setup.desc_var)),
                            "Special description for this object.",
                            true,
                        )
                        .map_err(|e| self.error(e.to_string()))?;
                    for link in setup.links {
                        self.table
                            .link_var(inner, &link.name, link.link, &link.desc, link.builtin)
                            .map_err(|e| self.error(e.to_string()))?;
                    }
                    for member in info.member_funs() {
                        let object = Rc::clone(&setup.object);
                        let fun = Rc::clone(&member.fun);
                        let bound = FunctionEntry {
                            returns: member.returns,
                            body: FunctionBody::Native(Rc::new(move |args: &[Value]| {
                                fun(&object, args)
                            })),
                        };
                        self.table
                            .add_builtin_function(inner, &member.name, bound, &member.desc)
                            .map_err(|e| self.error(e.to_string()))?;
                    }
                }
                Ok(entry)
            }
        }
    }

    /// Parse `@Name(first[, repeat[, max]]) statement`.
    fn parse_event(&mut self, scope: ScopeId) -> Result<NodeId, ParseError> {
        if !self.allow_events {
            return Err(self.error("Event declarations are not allowed in evaluated statements."));
        }
        self.expect_symbol(Symbol::At, "All event declarations must begin with an '@'.")?;
        let name = self.expect_identifier("Events must start by specifying event name.")?;
        if !self.event_names.iter().any(|n| n == &name) {
            return Err(self.error(format!("Unknown event type '{name}'.")));
        }
        self.expect_symbol(
            Symbol::LParen,
            format!("Expected parentheses after '{name}' for args."),
        )?;
        let mut args = Vec::new();
        while !self.check_symbol(Symbol::RParen) {
            args.push(self.parse_expression(scope, TOP_PREC)?);
            if !self.eat_symbol(Symbol::Comma) {
                break;
            }
        }
        self.expect_symbol(Symbol::RParen, "Event args must end in a ')'.")?;
        if args.len() > 3 {
            return Err(self.error(format!(
                "Event '{name}' takes at most three arguments (first, repeat, max)."
            )));
        }
        let action = self
            .parse_statement(scope)?
            .ok_or_else(|| self.error("Expected a statement as the event action."))?;
        Ok(self.ast.push(Node::Event { name, action, args }))
    }

    /// Parse a variable reference, handling leading dots and dotted paths.
    fn parse_var(&mut self, scope: ScopeId, scan_scopes: bool) -> Result<NodeId, ParseError> {
        let mut scope = scope;
        let mut scan_scopes = scan_scopes;

        // Leading dots pin the lookup scope: one dot means "this scope
        // only", each extra dot ascends one parent level.
        if let TokenKind::Dots(count) = self.current().kind {
            scan_scopes = false;
            for _ in 1..count {
                scope = self
                    .table
                    .parent(scope)
                    .ok_or_else(|| self.error("Too many dots; goes beyond global scope."))?;
            }
            self.advance();
        }

        let name = self.expect_identifier("Must provide a variable identifier!")?;
        let entry = self
            .table
            .lookup(scope, &name, scan_scopes)
            .ok_or_else(|| {
                self.error(format!(
                    "'{name}' does not exist as a parameter, variable, or type."
                ))
            })?;

        // A following dots token steps into the named scope.
        if matches!(self.current().kind, TokenKind::Dots(_)) {
            let inner = self
                .table
                .entry(entry)
                .scope_id()
                .ok_or_else(|| self.error(format!("'{name}' is not a scope.")))?;
            return self.parse_var(inner, false);
        }

        Ok(self.ast.push(Node::Var(entry)))
    }

    /// Parse a single value: variable, literal, or parenthesized expression.
    fn parse_value(&mut self, scope: ScopeId) -> Result<NodeId, ParseError> {
        match &self.current().kind {
            TokenKind::Identifier(_) | TokenKind::Dots(_) => self.parse_var(scope, true),
            TokenKind::Number(n) => {
                let node = self.ast.push(Node::Literal(Value::Num(*n)));
                self.advance();
                Ok(node)
            }
            TokenKind::CharLit(c) => {
                // Literal chars fold immediately to their scalar value.
                let node = self.ast.push(Node::Literal(Value::Num(*c as u32 as f64)));
                self.advance();
                Ok(node)
            }
            TokenKind::StrLit(s) => {
                let node = self.ast.push(Node::Literal(Value::Str(s.clone())));
                self.advance();
                Ok(node)
            }
            TokenKind::Symbol(Symbol::LParen) => {
                self.advance();
                let node = self.parse_expression(scope, TOP_PREC)?;
                self.expect_symbol(
                    Symbol::RParen,
                    "Expected a close parenthesis in expression.",
                )?;
                Ok(node)
            }
            other => Err(self.error(format!("Expected a value, found: {}", other.lexeme()))),
        }
    }

    /// Precedence-climbing expression parser. Operators at or above
    /// `prec_limit` are left for the caller.
    pub fn parse_expression(
        &mut self,
        scope: ScopeId,
        prec_limit: u8,
    ) -> Result<NodeId, ParseError> {
        let mut cur = self.parse_value(scope)?;

        loop {
            let symbol = match self.current().kind {
                TokenKind::Symbol(s) => s,
                _ => break,
            };
            let prec = match symbol.precedence() {
                Some(p) if p < prec_limit => p,
                _ => break,
            };
            self.advance();

            if symbol == Symbol::LParen {
                // Function call: collect comma-separated arguments.
                let mut args = Vec::new();
                while !self.check_symbol(Symbol::RParen) {
                    args.push(self.parse_expression(scope, TOP_PREC)?);
                    if !self.eat_symbol(Symbol::Comma) {
                        break;
                    }
                }
                self.expect_symbol(Symbol::RParen, "Expected a ')' to end function call.")?;
                cur = self.ast.push(Node::Call { callee: cur, args });
            } else {
                let rhs = self.parse_expression(scope, prec)?;
                cur = self.build_operation(symbol, cur, rhs)?;
            }
        }

        Ok(cur)
    }

    /// Build the AST node for a binary operation, dispatching on the static
    /// kind of the left operand: numeric operands get math nodes, string
    /// operands get the string operations.
    fn build_operation(
        &mut self,
        symbol: Symbol,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<NodeId, ParseError> {
        if symbol == Symbol::Assign {
            return Ok(self.ast.push(Node::Assign { lhs, rhs }));
        }
        if self.ast.is_numeric(lhs, self.table) {
            let op = Math2Op::from_symbol(symbol).ok_or_else(|| {
                self.error(format!("Cannot use '{}' as an operator.", symbol.as_str()))
            })?;
            Ok(self.ast.push(Node::Math2 { op, lhs, rhs }))
        } else {
            let op = StrOp::from_symbol(symbol).ok_or_else(|| {
                self.error(format!(
                    "Cannot use operator '{}' on strings.",
                    symbol.as_str()
                ))
            })?;
            Ok(self.ast.push(Node::StrOp2 { op, lhs, rhs }))
        }
    }

    // -- Cursor helpers ------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.at_end() {
            self.pos += 1;
        }
    }

    fn check_symbol(&self, symbol: Symbol) -> bool {
        self.current().kind == TokenKind::Symbol(symbol)
    }

    fn eat_symbol(&mut self, symbol: Symbol) -> bool {
        if self.check_symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(
        &mut self,
        symbol: Symbol,
        message: impl Into<String>,
    ) -> Result<(), ParseError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_identifier(&mut self, message: impl Into<String>) -> Result<String, ParseError> {
        match &self.current().kind {
            TokenKind::Identifier(s) => {
                let name = s.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(message)),
        }
    }

    fn at_type_name(&self) -> bool {
        match &self.current().kind {
            TokenKind::Identifier(s) => self.types.contains(s),
            _ => false,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: if self.at_end() {
                None
            } else {
                Some(self.current().span.line)
            },
            source: self.source_name.clone(),
        }
    }
}

/// Insert a `;` before the trailing `Eof` unless one is already there. Used
/// by the single-statement eval surface so `a + 1` works without a
/// terminator.
pub fn ensure_trailing_semi(tokens: &mut Vec<Token>) {
    let n = tokens.len();
    if n >= 2 {
        if let TokenKind::Symbol(Symbol::Semi) = tokens[n - 2].kind {
            return;
        }
    }
    let span = tokens.last().map(|t| t.span).unwrap_or_default();
    tokens.insert(
        n.saturating_sub(1),
        Token {
            kind: TokenKind::Symbol(Symbol::Semi),
            span,
        },
    );
}
