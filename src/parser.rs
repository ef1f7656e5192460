//! Recursive-descent parser plus the `ParserActions` factory surface it
//! drives.
//!
//! The grammar/tokenizing loop below plays the role of an external parser
//! service — in production this crate would hand preprocessed
//! text to a generated parser and only implement `ParserActions`. We ship a
//! small hand-written recursive-descent parser so the crate is runnable
//! end to end, but keep the two concerns separated: `Parser` never builds
//! an AST node directly, it always calls through `self.actions`.

use crate::ast::{
    BaseType, BinOp, Declarator, Expr, ExternalDecl, LogicalOp, Param, Program, Stmt, TypeName,
    UnOp,
};
use crate::diagnostics::SourceLocation;
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{PrimitiveKind, Qualifiers};
use std::path::Path;

/// A narrow factory surface that turns already-parsed pieces into AST
/// nodes. The parser threads source position through to
/// every call so the error reporter can point at it.
pub trait ParserActions {
    fn function_definition(
        &mut self,
        return_type: TypeName,
        return_pointer_level: u32,
        name: String,
        params: Vec<Param>,
        variadic: bool,
        body: Stmt,
        loc: SourceLocation,
    ) -> ExternalDecl;

    fn function_prototype(
        &mut self,
        return_type: TypeName,
        return_pointer_level: u32,
        name: String,
        params: Vec<Param>,
        variadic: bool,
        loc: SourceLocation,
    ) -> ExternalDecl;

    fn global_declaration(
        &mut self,
        type_name: TypeName,
        declarator: Declarator,
        loc: SourceLocation,
    ) -> ExternalDecl;

    fn struct_declaration(
        &mut self,
        name: String,
        members: Option<Vec<(String, TypeName, u32)>>,
        loc: SourceLocation,
    ) -> ExternalDecl;

    fn parameter(&mut self, type_name: TypeName, declarator: Declarator) -> Param;

    fn compound_statement(&mut self, stmts: Vec<Stmt>, loc: SourceLocation) -> Stmt;
    fn if_stmt(
        &mut self,
        cond: Expr,
        then_branch: Stmt,
        else_branch: Option<Stmt>,
        loc: SourceLocation,
    ) -> Stmt;
    fn for_stmt(
        &mut self,
        init: Option<Stmt>,
        cond: Option<Expr>,
        inc: Option<Expr>,
        body: Stmt,
        loc: SourceLocation,
    ) -> Stmt;
    fn while_stmt(&mut self, cond: Expr, body: Stmt, loc: SourceLocation) -> Stmt;
    fn do_while_stmt(&mut self, body: Stmt, cond: Expr, loc: SourceLocation) -> Stmt;
    fn switch_stmt(&mut self, discriminant: Expr, body: Stmt, loc: SourceLocation) -> Stmt;
    fn case_stmt(&mut self, value: Expr, loc: SourceLocation) -> Stmt;
    fn default_stmt(&mut self, loc: SourceLocation) -> Stmt;
    fn label_stmt(&mut self, name: String, stmt: Stmt, loc: SourceLocation) -> Stmt;
    fn goto_stmt(&mut self, name: String, loc: SourceLocation) -> Stmt;
    fn return_stmt(&mut self, expr: Option<Expr>, loc: SourceLocation) -> Stmt;
    fn break_stmt(&mut self, loc: SourceLocation) -> Stmt;
    fn continue_stmt(&mut self, loc: SourceLocation) -> Stmt;
    fn declaration_statement(
        &mut self,
        type_name: TypeName,
        declarators: Vec<Declarator>,
        loc: SourceLocation,
    ) -> Stmt;
    fn expression_statement(&mut self, expr: Expr) -> Stmt;

    fn declarator(&mut self, name: String, pointer_level: u32, loc: SourceLocation) -> Declarator;
    fn array_declarator(&mut self, decl: Declarator, dim_expr: Expr) -> Declarator;
    fn init_declarator(&mut self, decl: Declarator, init: Expr) -> Declarator;

    fn binary(&mut self, op: BinOp, l: Expr, r: Expr, loc: SourceLocation) -> Expr;
    fn unary(&mut self, op: UnOp, x: Expr, loc: SourceLocation) -> Expr;
    fn logical(&mut self, op: LogicalOp, l: Expr, r: Expr, loc: SourceLocation) -> Expr;
    fn assignment(&mut self, l: Expr, r: Expr, loc: SourceLocation) -> Expr;
    fn compound_assignment(&mut self, l: Expr, op: BinOp, r: Expr, loc: SourceLocation) -> Expr;
    fn conditional(&mut self, c: Expr, t: Expr, f: Expr, loc: SourceLocation) -> Expr;
    fn comma(&mut self, l: Expr, r: Expr, loc: SourceLocation) -> Expr;
    fn function_call(&mut self, name: String, args: Vec<Expr>, loc: SourceLocation) -> Expr;
    fn array_access(&mut self, a: Expr, i: Expr, loc: SourceLocation) -> Expr;
    fn member_access(&mut self, base: Expr, name: String, is_arrow: bool, loc: SourceLocation) -> Expr;
    fn cast(&mut self, type_name: TypeName, pointer_level: u32, expr: Expr, loc: SourceLocation) -> Expr;
    fn sizeof_type(&mut self, type_name: TypeName, pointer_level: u32, loc: SourceLocation) -> Expr;
    fn sizeof_expr(&mut self, expr: Expr, loc: SourceLocation) -> Expr;
    fn identifier(&mut self, name: String, loc: SourceLocation) -> Expr;
    fn integer(&mut self, value: i64, loc: SourceLocation) -> Expr;
    fn float(&mut self, value: f64, loc: SourceLocation) -> Expr;
    fn string(&mut self, value: String, loc: SourceLocation) -> Expr;
    fn char_constant(&mut self, value: i64, loc: SourceLocation) -> Expr;
    fn initializer_list(&mut self, elements: Vec<Expr>, loc: SourceLocation) -> Expr;

    fn primitive_type(&mut self, kind: PrimitiveKind) -> TypeName;
    fn struct_specifier(
        &mut self,
        name: String,
        members: Option<Vec<(String, TypeName, u32)>>,
    ) -> TypeName;
    fn struct_reference(&mut self, name: String) -> TypeName;
}

/// The default `ParserActions` implementation: a stateless factory that
/// just assembles the AST nodes it's handed. A hosting application could
/// swap in a different implementation (e.g. one that interns types
/// eagerly) without touching the grammar in `Parser`.
#[derive(Debug, Default)]
pub struct AstBuilder;

impl ParserActions for AstBuilder {
    fn function_definition(
        &mut self,
        return_type: TypeName,
        return_pointer_level: u32,
        name: String,
        params: Vec<Param>,
        variadic: bool,
        body: Stmt,
        loc: SourceLocation,
    ) -> ExternalDecl {
        ExternalDecl::FunctionDef {
            return_type,
            return_pointer_level,
            name,
            params,
            variadic,
            body,
            loc,
        }
    }

    fn function_prototype(
        &mut self,
        return_type: TypeName,
        return_pointer_level: u32,
        name: String,
        params: Vec<Param>,
        variadic: bool,
        loc: SourceLocation,
    ) -> ExternalDecl {
        ExternalDecl::FunctionProto {
            return_type,
            return_pointer_level,
            name,
            params,
            variadic,
            loc,
        }
    }

    fn global_declaration(
        &mut self,
        type_name: TypeName,
        declarator: Declarator,
        loc: SourceLocation,
    ) -> ExternalDecl {
        ExternalDecl::GlobalVar {
            type_name,
            declarator,
            loc,
        }
    }

    fn struct_declaration(
        &mut self,
        name: String,
        members: Option<Vec<(String, TypeName, u32)>>,
        loc: SourceLocation,
    ) -> ExternalDecl {
        ExternalDecl::StructDecl { name, members, loc }
    }

    fn parameter(&mut self, type_name: TypeName, declarator: Declarator) -> Param {
        Param {
            type_name,
            declarator,
        }
    }

    fn compound_statement(&mut self, stmts: Vec<Stmt>, loc: SourceLocation) -> Stmt {
        Stmt::Block(stmts, loc)
    }

    fn if_stmt(
        &mut self,
        cond: Expr,
        then_branch: Stmt,
        else_branch: Option<Stmt>,
        loc: SourceLocation,
    ) -> Stmt {
        Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
            loc,
        }
    }

    fn for_stmt(
        &mut self,
        init: Option<Stmt>,
        cond: Option<Expr>,
        inc: Option<Expr>,
        body: Stmt,
        loc: SourceLocation,
    ) -> Stmt {
        Stmt::For {
            init: init.map(Box::new),
            cond,
            increment: inc,
            body: Box::new(body),
            loc,
        }
    }

    fn while_stmt(&mut self, cond: Expr, body: Stmt, loc: SourceLocation) -> Stmt {
        Stmt::While {
            cond,
            body: Box::new(body),
            loc,
        }
    }

    fn do_while_stmt(&mut self, body: Stmt, cond: Expr, loc: SourceLocation) -> Stmt {
        Stmt::DoWhile {
            body: Box::new(body),
            cond,
            loc,
        }
    }

    fn switch_stmt(&mut self, discriminant: Expr, body: Stmt, loc: SourceLocation) -> Stmt {
        Stmt::Switch {
            discriminant,
            body: Box::new(body),
            loc,
        }
    }

    fn case_stmt(&mut self, value: Expr, loc: SourceLocation) -> Stmt {
        Stmt::Case(value, loc)
    }

    fn default_stmt(&mut self, loc: SourceLocation) -> Stmt {
        Stmt::Default(loc)
    }

    fn label_stmt(&mut self, name: String, stmt: Stmt, loc: SourceLocation) -> Stmt {
        Stmt::Label {
            name,
            stmt: Box::new(stmt),
            loc,
        }
    }

    fn goto_stmt(&mut self, name: String, loc: SourceLocation) -> Stmt {
        Stmt::Goto(name, loc)
    }

    fn return_stmt(&mut self, expr: Option<Expr>, loc: SourceLocation) -> Stmt {
        Stmt::Return(expr, loc)
    }

    fn break_stmt(&mut self, loc: SourceLocation) -> Stmt {
        Stmt::Break(loc)
    }

    fn continue_stmt(&mut self, loc: SourceLocation) -> Stmt {
        Stmt::Continue(loc)
    }

    fn declaration_statement(
        &mut self,
        type_name: TypeName,
        declarators: Vec<Declarator>,
        loc: SourceLocation,
    ) -> Stmt {
        Stmt::Declaration {
            type_name,
            declarators,
            loc,
        }
    }

    fn expression_statement(&mut self, expr: Expr) -> Stmt {
        Stmt::Expression(expr)
    }

    fn declarator(&mut self, name: String, pointer_level: u32, loc: SourceLocation) -> Declarator {
        Declarator {
            name,
            pointer_level,
            qualifiers: Qualifiers::NONE,
            array_dims: Vec::new(),
            initializer: None,
            next: None,
            loc,
        }
    }

    fn array_declarator(&mut self, mut decl: Declarator, dim_expr: Expr) -> Declarator {
        decl.array_dims.push(dim_expr);
        decl
    }

    fn init_declarator(&mut self, mut decl: Declarator, init: Expr) -> Declarator {
        decl.initializer = Some(init);
        decl
    }

    fn binary(&mut self, op: BinOp, l: Expr, r: Expr, loc: SourceLocation) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
            loc,
        }
    }

    fn unary(&mut self, op: UnOp, x: Expr, loc: SourceLocation) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(x),
            loc,
        }
    }

    fn logical(&mut self, op: LogicalOp, l: Expr, r: Expr, loc: SourceLocation) -> Expr {
        Expr::Logical {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
            loc,
        }
    }

    fn assignment(&mut self, l: Expr, r: Expr, loc: SourceLocation) -> Expr {
        Expr::Assignment {
            target: Box::new(l),
            value: Box::new(r),
            loc,
        }
    }

    fn compound_assignment(&mut self, l: Expr, op: BinOp, r: Expr, loc: SourceLocation) -> Expr {
        Expr::CompoundAssignment {
            op,
            target: Box::new(l),
            value: Box::new(r),
            loc,
        }
    }

    fn conditional(&mut self, c: Expr, t: Expr, f: Expr, loc: SourceLocation) -> Expr {
        Expr::Conditional {
            cond: Box::new(c),
            then_expr: Box::new(t),
            else_expr: Box::new(f),
            loc,
        }
    }

    fn comma(&mut self, l: Expr, r: Expr, loc: SourceLocation) -> Expr {
        Expr::Comma {
            lhs: Box::new(l),
            rhs: Box::new(r),
            loc,
        }
    }

    fn function_call(&mut self, name: String, args: Vec<Expr>, loc: SourceLocation) -> Expr {
        Expr::FunctionCall {
            callee: name,
            args,
            loc,
        }
    }

    fn array_access(&mut self, a: Expr, i: Expr, loc: SourceLocation) -> Expr {
        Expr::ArraySubscript {
            base: Box::new(a),
            index: Box::new(i),
            loc,
        }
    }

    fn member_access(&mut self, base: Expr, name: String, is_arrow: bool, loc: SourceLocation) -> Expr {
        Expr::MemberAccess {
            base: Box::new(base),
            member: name,
            arrow: is_arrow,
            loc,
        }
    }

    fn cast(&mut self, type_name: TypeName, pointer_level: u32, expr: Expr, loc: SourceLocation) -> Expr {
        Expr::Cast {
            type_name,
            pointer_level,
            expr: Box::new(expr),
            loc,
        }
    }

    fn sizeof_type(&mut self, type_name: TypeName, pointer_level: u32, loc: SourceLocation) -> Expr {
        Expr::SizeofType {
            type_name,
            pointer_level,
            loc,
        }
    }

    fn sizeof_expr(&mut self, expr: Expr, loc: SourceLocation) -> Expr {
        Expr::SizeofExpr {
            expr: Box::new(expr),
            loc,
        }
    }

    fn identifier(&mut self, name: String, loc: SourceLocation) -> Expr {
        Expr::Identifier { name, loc }
    }

    fn integer(&mut self, value: i64, loc: SourceLocation) -> Expr {
        Expr::Integer { value, loc }
    }

    fn float(&mut self, value: f64, loc: SourceLocation) -> Expr {
        Expr::Float { value, loc }
    }

    fn string(&mut self, value: String, loc: SourceLocation) -> Expr {
        Expr::StringLiteral { value, loc }
    }

    fn char_constant(&mut self, value: i64, loc: SourceLocation) -> Expr {
        Expr::Integer { value, loc }
    }

    fn initializer_list(&mut self, elements: Vec<Expr>, loc: SourceLocation) -> Expr {
        Expr::InitializerList { elements, loc }
    }

    fn primitive_type(&mut self, kind: PrimitiveKind) -> TypeName {
        TypeName::new(BaseType::Primitive(kind))
    }

    fn struct_specifier(
        &mut self,
        name: String,
        _members: Option<Vec<(String, TypeName, u32)>>,
    ) -> TypeName {
        TypeName::new(BaseType::Struct(name))
    }

    fn struct_reference(&mut self, name: String) -> TypeName {
        TypeName::new(BaseType::Struct(name))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{loc}: error: {message}")]
pub struct ParseError {
    pub loc: SourceLocation,
    pub message: String,
}

type PResult<T> = Result<T, ParseError>;

pub struct Parser<'a, A: ParserActions> {
    tokens: Vec<Token>,
    pos: usize,
    actions: &'a mut A,
    /// Extra top-level decls produced while parsing a comma-separated
    /// global declaration list (`int a, b;` yields one decl per name);
    /// `parse_program` drains these before parsing the next declaration.
    pending_decls: Vec<ExternalDecl>,
    /// Struct names seen so far (forward-declared or complete), needed to
    /// disambiguate `Name * x;` (a pointer declaration) from `Name * x;`
    /// (a multiplication expression) when `Name` isn't a keyword.
    known_types: std::collections::HashSet<String>,
}

impl<'a, A: ParserActions> Parser<'a, A> {
    pub fn new(source: &str, file: &Path, actions: &'a mut A) -> Self {
        Parser {
            tokens: tokenize(source, file),
            pos: 0,
            actions,
            pending_decls: Vec::new(),
            known_types: std::collections::HashSet::new(),
        }
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut program = Program::new();
        while !self.at_eof() {
            program.decls.push(self.parse_external_declaration()?);
            program.decls.append(&mut self.pending_decls);
        }
        Ok(program)
    }

    // ---- token helpers ----

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur().kind, TokenKind::Eof)
    }

    fn loc(&self) -> SourceLocation {
        self.cur().loc.clone()
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, text: &str) -> bool {
        self.cur().is(text)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> PResult<Token> {
        if self.check(text) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", text, self.cur().text)))
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if matches!(self.cur().kind, TokenKind::Ident) {
            Ok(self.advance().text)
        } else {
            Err(self.error(format!("expected identifier, found '{}'", self.cur().text)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            loc: self.loc(),
            message: message.into(),
        }
    }

    fn is_type_keyword(&self, text: &str) -> bool {
        matches!(
            text,
            "void" | "bool" | "char" | "short" | "int" | "long" | "float" | "double" | "struct"
        )
    }

    fn at_type_start(&self) -> bool {
        let t = &self.cur().text;
        matches!(self.cur().kind, TokenKind::Ident)
            && (self.is_type_keyword(t) || t == "const" || t == "volatile" || self.known_types.contains(t))
    }

    // ---- top level ----

    fn parse_external_declaration(&mut self) -> PResult<ExternalDecl> {
        let loc = self.loc();
        let (type_name, qualifiers) = self.parse_type_specifier()?;
        let type_name = type_name.qualified(qualifiers);

        // A bare `struct Name { ... };` with no declarator.
        if self.check(";") {
            self.advance();
            if let BaseType::Struct(name) = type_name.base {
                return Ok(self.actions.struct_declaration(name, None, loc));
            }
            return Err(self.error("expected declarator"));
        }

        let pointer_level = self.parse_pointer_stars();
        let name = self.expect_ident()?;

        if self.check("(") {
            let (params, variadic) = self.parse_param_list()?;
            if self.eat(";") {
                return Ok(self
                    .actions
                    .function_prototype(type_name, pointer_level, name, params, variadic, loc));
            }
            let body = self.parse_compound_statement()?;
            return Ok(self
                .actions
                .function_definition(type_name, pointer_level, name, params, variadic, body, loc));
        }

        // Global variable declaration, possibly a comma list: build every
        // declarator, emit the first as the return value and stash the rest
        // in `pending_decls` for `parse_program` to drain.
        let mut decl = self.actions.declarator(name, pointer_level, loc.clone());
        decl = self.parse_array_suffix(decl)?;
        if self.eat("=") {
            let init = self.parse_assignment_expr()?;
            decl = self.actions.init_declarator(decl, init);
        }
        let first = self.actions.global_declaration(type_name.clone(), decl, loc.clone());

        while self.eat(",") {
            let ptr = self.parse_pointer_stars();
            let name = self.expect_ident()?;
            let mut decl = self.actions.declarator(name, ptr, self.loc());
            decl = self.parse_array_suffix(decl)?;
            if self.eat("=") {
                let init = self.parse_assignment_expr()?;
                decl = self.actions.init_declarator(decl, init);
            }
            self.pending_decls
                .push(self.actions.global_declaration(type_name.clone(), decl, loc.clone()));
        }
        self.expect(";")?;
        Ok(first)
    }

    fn parse_type_specifier(&mut self) -> PResult<(TypeName, Qualifiers)> {
        let mut qualifiers = Qualifiers::NONE;
        loop {
            if self.eat("const") {
                qualifiers |= Qualifiers::CONST;
                continue;
            }
            if self.eat("volatile") {
                qualifiers |= Qualifiers::VOLATILE;
                continue;
            }
            break;
        }

        if self.eat("struct") {
            let name = self.expect_ident()?;
            self.known_types.insert(name.clone());
            if self.eat("{") {
                let mut members = Vec::new();
                while !self.check("}") {
                    let (member_type, member_quals) = self.parse_type_specifier()?;
                    let member_type = member_type.qualified(member_quals);
                    loop {
                        let ptr = self.parse_pointer_stars();
                        let member_name = self.expect_ident()?;
                        while self.eat("[") {
                            // Member array dims must be constant; they're
                            // folded from the declared type at codegen time,
                            // so we just need to skip past the tokens here.
                            while !self.check("]") {
                                self.advance();
                            }
                            self.expect("]")?;
                        }
                        members.push((member_name, member_type.clone(), ptr));
                        if !self.eat(",") {
                            break;
                        }
                    }
                    self.expect(";")?;
                }
                self.expect("}")?;
                let type_name = self.actions.struct_specifier(name, Some(members));
                return Ok((type_name, qualifiers));
            }
            let type_name = self.actions.struct_reference(name);
            return Ok((type_name, qualifiers));
        }

        let tok_text = self.cur().text.clone();
        let kind = match tok_text.as_str() {
            "void" => Some(PrimitiveKind::Void),
            "bool" => Some(PrimitiveKind::Bool),
            "char" => Some(PrimitiveKind::Char),
            "short" => Some(PrimitiveKind::Short),
            "int" => Some(PrimitiveKind::Int),
            "long" => Some(PrimitiveKind::Long),
            "float" => Some(PrimitiveKind::Float),
            "double" => Some(PrimitiveKind::Double),
            _ => None,
        };
        if let Some(kind) = kind {
            self.advance();
            let type_name = self.actions.primitive_type(kind);
            return Ok((type_name, qualifiers));
        }
        if self.known_types.contains(&tok_text) {
            self.advance();
            let type_name = self.actions.struct_reference(tok_text);
            return Ok((type_name, qualifiers));
        }

        Err(self.error(format!("expected a type, found '{}'", self.cur().text)))
    }

    fn parse_pointer_stars(&mut self) -> u32 {
        let mut level = 0;
        while self.eat("*") {
            level += 1;
            while self.eat("const") || self.eat("volatile") {}
        }
        level
    }

    fn parse_array_suffix(&mut self, mut decl: Declarator) -> PResult<Declarator> {
        while self.eat("[") {
            if self.check("]") {
                self.advance();
                // Unsized dimension (parameter decay); a sentinel (-1)
                // stands in for "size determined elsewhere".
                let loc = self.loc();
                let placeholder = self.actions.integer(-1, loc);
                decl = self.actions.array_declarator(decl, placeholder);
                continue;
            }
            let dim = self.parse_assignment_expr()?;
            self.expect("]")?;
            decl = self.actions.array_declarator(decl, dim);
        }
        Ok(decl)
    }

    fn parse_param_list(&mut self) -> PResult<(Vec<Param>, bool)> {
        self.expect("(")?;
        let mut params = Vec::new();
        let mut variadic = false;
        if self.eat(")") {
            return Ok((params, variadic));
        }
        loop {
            if self.eat("...") {
                variadic = true;
                break;
            }
            if self.check("void") && self.peek_is_close_paren_after_void() {
                self.advance();
                break;
            }
            let (type_name, qualifiers) = self.parse_type_specifier()?;
            let type_name = type_name.qualified(qualifiers);
            let ptr = self.parse_pointer_stars();
            let loc = self.loc();
            let name = if matches!(self.cur().kind, TokenKind::Ident) {
                self.expect_ident()?
            } else {
                String::new()
            };
            let mut decl = self.actions.declarator(name, ptr, loc);
            decl = self.parse_array_suffix(decl)?;
            params.push(self.actions.parameter(type_name, decl));
            if !self.eat(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok((params, variadic))
    }

    fn peek_is_close_paren_after_void(&self) -> bool {
        self.tokens.get(self.pos + 1).is_some_and(|t| t.is(")"))
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        if self.check("{") {
            return self.parse_compound_statement();
        }
        if self.eat("if") {
            self.expect("(")?;
            let cond = self.parse_expression()?;
            self.expect(")")?;
            let then_branch = self.parse_statement()?;
            let else_branch = if self.eat("else") {
                Some(self.parse_statement()?)
            } else {
                None
            };
            return Ok(self.actions.if_stmt(cond, then_branch, else_branch, loc));
        }
        if self.eat("while") {
            self.expect("(")?;
            let cond = self.parse_expression()?;
            self.expect(")")?;
            let body = self.parse_statement()?;
            return Ok(self.actions.while_stmt(cond, body, loc));
        }
        if self.eat("do") {
            let body = self.parse_statement()?;
            self.expect("while")?;
            self.expect("(")?;
            let cond = self.parse_expression()?;
            self.expect(")")?;
            self.expect(";")?;
            return Ok(self.actions.do_while_stmt(body, cond, loc));
        }
        if self.eat("for") {
            self.expect("(")?;
            let init = if self.check(";") {
                None
            } else if self.at_type_start() {
                Some(self.parse_declaration_statement()?)
            } else {
                let e = self.parse_expression()?;
                self.expect(";")?;
                Some(self.actions.expression_statement(e))
            };
            if init.is_none() {
                self.expect(";")?;
            }
            let cond = if self.check(";") {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(";")?;
            let inc = if self.check(")") {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(")")?;
            let body = self.parse_statement()?;
            return Ok(self.actions.for_stmt(init, cond, inc, body, loc));
        }
        if self.eat("switch") {
            self.expect("(")?;
            let discriminant = self.parse_expression()?;
            self.expect(")")?;
            let body = self.parse_statement()?;
            return Ok(self.actions.switch_stmt(discriminant, body, loc));
        }
        if self.eat("case") {
            let value = self.parse_conditional_expr()?;
            self.expect(":")?;
            return Ok(self.actions.case_stmt(value, loc));
        }
        if self.eat("default") {
            self.expect(":")?;
            return Ok(self.actions.default_stmt(loc));
        }
        if self.eat("break") {
            self.expect(";")?;
            return Ok(self.actions.break_stmt(loc));
        }
        if self.eat("continue") {
            self.expect(";")?;
            return Ok(self.actions.continue_stmt(loc));
        }
        if self.eat("return") {
            let expr = if self.check(";") {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(";")?;
            return Ok(self.actions.return_stmt(expr, loc));
        }
        if self.eat("goto") {
            let name = self.expect_ident()?;
            self.expect(";")?;
            return Ok(self.actions.goto_stmt(name, loc));
        }
        // Label: `ident ':'`, distinguished by lookahead since a bare
        // identifier statement would otherwise be an expression statement.
        if matches!(self.cur().kind, TokenKind::Ident)
            && !self.at_type_start()
            && self.tokens.get(self.pos + 1).is_some_and(|t| t.is(":"))
        {
            let name = self.advance().text;
            self.advance(); // ':'
            let stmt = self.parse_statement()?;
            return Ok(self.actions.label_stmt(name, stmt, loc));
        }
        if self.at_type_start() {
            return self.parse_declaration_statement();
        }
        let expr = self.parse_expression()?;
        self.expect(";")?;
        Ok(self.actions.expression_statement(expr))
    }

    fn parse_compound_statement(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.expect("{")?;
        let mut stmts = Vec::new();
        while !self.check("}") {
            stmts.push(self.parse_statement()?);
        }
        self.expect("}")?;
        Ok(self.actions.compound_statement(stmts, loc))
    }

    fn parse_declaration_statement(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        let (type_name, qualifiers) = self.parse_type_specifier()?;
        let type_name = type_name.qualified(qualifiers);
        let mut declarators = Vec::new();
        loop {
            let ptr = self.parse_pointer_stars();
            let name = self.expect_ident()?;
            let mut decl = self.actions.declarator(name, ptr, self.loc());
            decl = self.parse_array_suffix(decl)?;
            if self.eat("=") {
                if self.check("{") {
                    let init = self.parse_initializer_list()?;
                    decl = self.actions.init_declarator(decl, init);
                } else {
                    let init = self.parse_assignment_expr()?;
                    decl = self.actions.init_declarator(decl, init);
                }
            }
            declarators.push(decl);
            if !self.eat(",") {
                break;
            }
        }
        self.expect(";")?;
        Ok(self.actions.declaration_statement(type_name, declarators, loc))
    }

    fn parse_initializer_list(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        self.expect("{")?;
        let mut elements = Vec::new();
        while !self.check("}") {
            if self.check("{") {
                elements.push(self.parse_initializer_list()?);
            } else {
                elements.push(self.parse_assignment_expr()?);
            }
            if !self.eat(",") {
                break;
            }
        }
        self.expect("}")?;
        Ok(self.actions.initializer_list(elements, loc))
    }

    // ---- expressions ----
    // Precedence (low to high): comma, assignment, conditional, logical-or,
    // logical-and, bitor, bitxor, bitand, equality, relational, shift,
    // additive, multiplicative, cast/unary, postfix, primary.

    fn parse_expression(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_assignment_expr()?;
        while self.check(",") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_assignment_expr()?;
            expr = self.actions.comma(expr, rhs, loc);
        }
        Ok(expr)
    }

    fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional_expr()?;
        let loc = self.loc();
        if self.eat("=") {
            let rhs = self.parse_assignment_expr()?;
            return Ok(self.actions.assignment(lhs, rhs, loc));
        }
        let compound_op = match self.cur().text.as_str() {
            "+=" => Some(BinOp::Add),
            "-=" => Some(BinOp::Sub),
            "*=" => Some(BinOp::Mul),
            "/=" => Some(BinOp::Div),
            "%=" => Some(BinOp::Mod),
            "&=" => Some(BinOp::BitAnd),
            "|=" => Some(BinOp::BitOr),
            "^=" => Some(BinOp::BitXor),
            "<<=" => Some(BinOp::Shl),
            ">>=" => Some(BinOp::Shr),
            _ => None,
        };
        if let Some(op) = compound_op {
            self.advance();
            let rhs = self.parse_assignment_expr()?;
            return Ok(self.actions.compound_assignment(lhs, op, rhs, loc));
        }
        Ok(lhs)
    }

    fn parse_conditional_expr(&mut self) -> PResult<Expr> {
        let cond = self.parse_logical_or_expr()?;
        let loc = self.loc();
        if self.eat("?") {
            let then_expr = self.parse_expression()?;
            self.expect(":")?;
            let else_expr = self.parse_conditional_expr()?;
            return Ok(self.actions.conditional(cond, then_expr, else_expr, loc));
        }
        Ok(cond)
    }

    fn parse_logical_or_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logical_and_expr()?;
        while self.check("||") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_logical_and_expr()?;
            lhs = self.actions.logical(LogicalOp::Or, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_logical_and_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitor_expr()?;
        while self.check("&&") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_bitor_expr()?;
            lhs = self.actions.logical(LogicalOp::And, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_bitor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitxor_expr()?;
        while self.check("|") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_bitxor_expr()?;
            lhs = self.actions.binary(BinOp::BitOr, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_bitxor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitand_expr()?;
        while self.check("^") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_bitand_expr()?;
            lhs = self.actions.binary(BinOp::BitXor, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_bitand_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality_expr()?;
        while self.check("&") {
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_equality_expr()?;
            lhs = self.actions.binary(BinOp::BitAnd, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_equality_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational_expr()?;
        loop {
            let op = match self.cur().text.as_str() {
                "==" => BinOp::Eq,
                "!=" => BinOp::Ne,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_relational_expr()?;
            lhs = self.actions.binary(op, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_relational_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift_expr()?;
        loop {
            let op = match self.cur().text.as_str() {
                "<" => BinOp::Lt,
                ">" => BinOp::Gt,
                "<=" => BinOp::Le,
                ">=" => BinOp::Ge,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_shift_expr()?;
            lhs = self.actions.binary(op, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_shift_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive_expr()?;
        loop {
            let op = match self.cur().text.as_str() {
                "<<" => BinOp::Shl,
                ">>" => BinOp::Shr,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_additive_expr()?;
            lhs = self.actions.binary(op, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_additive_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative_expr()?;
        loop {
            let op = match self.cur().text.as_str() {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_multiplicative_expr()?;
            lhs = self.actions.binary(op, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_multiplicative_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_cast_expr()?;
        loop {
            let op = match self.cur().text.as_str() {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let rhs = self.parse_cast_expr()?;
            lhs = self.actions.binary(op, lhs, rhs, loc);
        }
        Ok(lhs)
    }

    fn parse_cast_expr(&mut self) -> PResult<Expr> {
        if self.check("(") && self.looks_like_type_at(self.pos + 1) {
            let loc = self.loc();
            self.advance();
            let (type_name, qualifiers) = self.parse_type_specifier()?;
            let type_name = type_name.qualified(qualifiers);
            let ptr = self.parse_pointer_stars();
            self.expect(")")?;
            let expr = self.parse_cast_expr()?;
            return Ok(self.actions.cast(type_name, ptr, expr, loc));
        }
        self.parse_unary_expr()
    }

    fn looks_like_type_at(&self, pos: usize) -> bool {
        self.tokens.get(pos).is_some_and(|t| {
            matches!(t.kind, TokenKind::Ident)
                && (self.is_type_keyword(&t.text)
                    || t.text == "const"
                    || t.text == "volatile"
                    || self.known_types.contains(&t.text))
        })
    }

    fn parse_unary_expr(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        if self.eat("sizeof") {
            if self.check("(") && self.looks_like_type_at(self.pos + 1) {
                self.advance();
                let (type_name, qualifiers) = self.parse_type_specifier()?;
                let type_name = type_name.qualified(qualifiers);
                let ptr = self.parse_pointer_stars();
                self.expect(")")?;
                return Ok(self.actions.sizeof_type(type_name, ptr, loc));
            }
            let expr = self.parse_unary_expr()?;
            return Ok(self.actions.sizeof_expr(expr, loc));
        }
        if self.check("+") {
            // Unary plus has no semantic effect; just skip it.
            self.advance();
            return self.parse_unary_expr();
        }
        let op = match self.cur().text.as_str() {
            "-" => Some(UnOp::Neg),
            "!" => Some(UnOp::Not),
            "~" => Some(UnOp::BitNot),
            "&" => Some(UnOp::AddrOf),
            "*" => Some(UnOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_cast_expr()?;
            return Ok(self.actions.unary(op, operand, loc));
        }
        if self.check("++") || self.check("--") {
            let is_increment = self.check("++");
            self.advance();
            let operand = self.parse_unary_expr()?;
            return Ok(self
                .actions
                .unary(UnOp::PreIncDec { is_increment }, operand, loc));
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let loc = self.loc();
            if self.eat("[") {
                let index = self.parse_expression()?;
                self.expect("]")?;
                expr = self.actions.array_access(expr, index, loc);
            } else if self.eat(".") {
                let name = self.expect_ident()?;
                expr = self.actions.member_access(expr, name, false, loc);
            } else if self.eat("->") {
                let name = self.expect_ident()?;
                expr = self.actions.member_access(expr, name, true, loc);
            } else if self.check("++") || self.check("--") {
                let is_increment = self.check("++");
                self.advance();
                expr = self
                    .actions
                    .unary(UnOp::PostIncDec { is_increment }, expr, loc);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let tok = self.cur().clone();
        match &tok.kind {
            TokenKind::Int(v) => {
                self.advance();
                Ok(self.actions.integer(*v, loc))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(self.actions.float(*v, loc))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(self.actions.string(s.clone(), loc))
            }
            TokenKind::Char(v) => {
                self.advance();
                Ok(self.actions.char_constant(*v, loc))
            }
            TokenKind::Ident => {
                let name = tok.text.clone();
                self.advance();
                if self.check("(") {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(")") {
                        loop {
                            args.push(self.parse_assignment_expr()?);
                            if !self.eat(",") {
                                break;
                            }
                        }
                    }
                    self.expect(")")?;
                    return Ok(self.actions.function_call(name, args, loc));
                }
                Ok(self.actions.identifier(name, loc))
            }
            TokenKind::Punct if tok.is("(") => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(")")?;
                Ok(expr)
            }
            _ => Err(self.error(format!("unexpected token '{}'", tok.text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(src: &str) -> Program {
        let mut actions = AstBuilder;
        let mut parser = Parser::new(src, &PathBuf::from("test.tc"), &mut actions);
        parser.parse_program().expect("parse should succeed")
    }

    #[test]
    fn parses_minimal_main() {
        let program = parse("int main(void) { return 0; }");
        assert_eq!(program.decls.len(), 1);
        assert!(program.find_function("main").is_some());
    }

    #[test]
    fn parses_comma_separated_globals() {
        let program = parse("int a, b, c;");
        assert_eq!(program.decls.len(), 3);
    }

    #[test]
    fn parses_struct_with_self_pointer() {
        let program = parse(
            "struct Node { int value; struct Node *next; };\n\
             int main(void) { struct Node n; return 0; }",
        );
        assert_eq!(program.decls.len(), 2);
    }

    #[test]
    fn parses_switch_with_fallthrough() {
        let program = parse(
            "int classify(int x) {\n\
               switch (x) {\n\
               case 0:\n\
               case 1:\n\
                 return 1;\n\
               default:\n\
                 return 0;\n\
               }\n\
             }",
        );
        assert!(program.find_function("classify").is_some());
    }

    #[test]
    fn parses_pointer_arithmetic_and_cast() {
        let program = parse(
            "int main(void) {\n\
               int *p;\n\
               int x = (int) *p + 1;\n\
               return x;\n\
             }",
        );
        assert!(program.find_function("main").is_some());
    }

    #[test]
    fn parses_goto_and_label() {
        let program = parse(
            "int main(void) {\n\
               goto done;\n\
               done:\n\
               return 0;\n\
             }",
        );
        assert!(program.find_function("main").is_some());
    }
}
