// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;
use crate::value::*;

use anyhow::{bail, Result};

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    /// Doc comment immediately preceding `tok`.
    doc: Option<Span>,
    line: u32,
    end: u32,
    next_eidx: u32,
    next_fidx: u32,
}

const CAST_KEYWORDS: [(&str, CastKind); 9] = [
    ("array", CastKind::Array),
    ("int", CastKind::Int),
    ("integer", CastKind::Int),
    ("float", CastKind::Float),
    ("double", CastKind::Float),
    ("string", CastKind::String),
    ("bool", CastKind::Bool),
    ("boolean", CastKind::Bool),
    ("object", CastKind::Object),
];

const MODIFIERS: [&str; 8] = [
    "public",
    "protected",
    "private",
    "static",
    "abstract",
    "final",
    "var",
    "readonly",
];

enum BinKind {
    Arith(ArithOp),
    Bool(BoolOp),
    InstanceOf,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let (tok, doc) = Self::read_token(&mut lexer)?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            doc,
            line: 0,
            end: 0,
            next_eidx: 0,
            next_fidx: 0,
        })
    }

    fn read_token(lexer: &mut Lexer<'source>) -> Result<(Token, Option<Span>)> {
        let mut doc = None;
        loop {
            let tok = lexer.next_token()?;
            if tok.0 == TokenKind::DocComment {
                doc = Some(tok.1);
                continue;
            }
            return Ok((tok, doc));
        }
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String | TokenKind::Variable | TokenKind::DocComment => "",
        }
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.line = self.tok.1.line;
        self.end = self.tok.1.end;
        let (tok, doc) = Self::read_token(&mut self.lexer)?;
        self.tok = tok;
        self.doc = doc;
        Ok(())
    }

    fn peek_token(&self) -> Result<Token> {
        let mut lexer = self.lexer.clone();
        Ok(Self::read_token(&mut lexer)?.0)
    }

    fn peek_tokens<const N: usize>(&self) -> Result<[Token; N]> {
        let mut lexer = self.lexer.clone();
        let mut tokens: [Token; N] = core::array::from_fn(|_| self.tok.clone());
        for slot in tokens.iter_mut() {
            *slot = Self::read_token(&mut lexer)?.0;
        }
        Ok(tokens)
    }

    fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.tok.1.line, self.tok.1.col, msg)
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self.error(&msg))
        }
    }

    fn is_symbol(&self, text: &str) -> bool {
        self.tok.0 == TokenKind::Symbol && self.tok.1.text() == text
    }

    fn is_kw(&self, kw: &str) -> bool {
        self.tok.0 == TokenKind::Ident && self.tok.1.text().eq_ignore_ascii_case(kw)
    }

    fn eat_symbol(&mut self, text: &str) -> Result<bool> {
        if self.is_symbol(text) {
            self.next_token()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn span_from(&self, start: &Span) -> Span {
        let mut span = start.clone();
        span.end = self.end.max(span.start);
        span
    }

    fn eidx(&mut self) -> u32 {
        let eidx = self.next_eidx;
        self.next_eidx += 1;
        eidx
    }

    fn fidx(&mut self) -> u32 {
        let fidx = self.next_fidx;
        self.next_fidx += 1;
        fidx
    }

    fn skip_to_semicolon(&mut self) -> Result<()> {
        let mut depth = 0i32;
        loop {
            if self.tok.0 == TokenKind::Eof {
                return Ok(());
            }
            match self.token_text() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                ";" if depth <= 0 => return self.next_token(),
                _ => (),
            }
            self.next_token()?;
        }
    }

    pub fn parse(&mut self) -> Result<Module> {
        let mut stmts = vec![];
        while self.tok.0 != TokenKind::Eof {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Module {
            source: self.source.clone(),
            stmts,
            num_expressions: self.next_eidx,
            num_functions: self.next_fidx,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Ref<Stmt>>> {
        self.expect("{", "to start block")?;
        let mut stmts = vec![];
        while !self.is_symbol("}") {
            if self.tok.0 == TokenKind::Eof {
                bail!(self.error("unexpected end of file, expecting `}`"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.next_token()?;
        Ok(stmts)
    }

    // Body of if/while/foreach: a block or a single statement.
    fn parse_body(&mut self) -> Result<Vec<Ref<Stmt>>> {
        if self.is_symbol("{") {
            self.parse_block()
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn parse_paren_expr(&mut self, context: &str) -> Result<Ref<Expr>> {
        self.expect("(", context)?;
        let expr = self.parse_expr()?;
        self.expect(")", context)?;
        Ok(expr)
    }

    pub fn parse_stmt(&mut self) -> Result<Ref<Stmt>> {
        let start = self.tok.1.clone();
        let doc = self.doc.clone();

        if self.tok.0 == TokenKind::Symbol {
            match self.token_text() {
                "{" => {
                    let stmts = self.parse_block()?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Block { span, stmts }));
                }
                ";" => {
                    self.next_token()?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Nop { span }));
                }
                _ => (),
            }
        }

        if self.tok.0 == TokenKind::Ident {
            let kw = self.tok.1.text().to_ascii_lowercase();
            match kw.as_str() {
                "function" => {
                    let next = self.peek_token()?;
                    let named = next.0 == TokenKind::Ident
                        || (next.1.text() == "&" && self.peek_tokens::<2>()?[1].0 == TokenKind::Ident);
                    if named {
                        let func = self.parse_function(doc, Modifiers::default(), false)?;
                        return Ok(Ref::new(Stmt::Function(func)));
                    }
                }
                "abstract" | "final" | "readonly" | "class" | "interface" | "trait" | "enum" => {
                    let next = self.peek_token()?;
                    let is_decl = kw != "enum" || next.0 == TokenKind::Ident;
                    if is_decl && !(kw == "class" && next.1.text() == "(") {
                        let class = self.parse_class(doc)?;
                        return Ok(Ref::new(Stmt::Class(class)));
                    }
                }
                "return" => {
                    self.next_token()?;
                    let value = if self.is_symbol(";") || self.tok.0 == TokenKind::Eof {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.eat_symbol(";")?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Return { span, value }));
                }
                "if" => return self.parse_if(start),
                "while" => {
                    self.next_token()?;
                    let cond = self.parse_paren_expr("after while")?;
                    let body = self.parse_body()?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::While { span, cond, body }));
                }
                "do" => {
                    self.next_token()?;
                    let body = self.parse_body()?;
                    if !self.is_kw("while") {
                        bail!(self.error("expecting `while` after do block"));
                    }
                    self.next_token()?;
                    let cond = self.parse_paren_expr("after while")?;
                    self.eat_symbol(";")?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::While { span, cond, body }));
                }
                "for" => return self.parse_for(start),
                "foreach" => return self.parse_foreach(start),
                "switch" => return self.parse_switch(start),
                "try" => return self.parse_try(start),
                "echo" | "print" => {
                    self.next_token()?;
                    let mut exprs = vec![self.parse_expr()?];
                    while self.eat_symbol(",")? {
                        exprs.push(self.parse_expr()?);
                    }
                    self.eat_symbol(";")?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Echo { span, exprs }));
                }
                "namespace" => {
                    self.next_token()?;
                    while self.tok.0 == TokenKind::Ident {
                        self.next_token()?;
                    }
                    if self.is_symbol("{") {
                        let stmts = self.parse_block()?;
                        let span = self.span_from(&start);
                        return Ok(Ref::new(Stmt::Block { span, stmts }));
                    }
                    self.skip_to_semicolon()?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Nop { span }));
                }
                "use" | "global" | "break" | "continue" | "declare" | "const" | "goto" => {
                    self.skip_to_semicolon()?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Nop { span }));
                }
                "static" if self.peek_token()?.0 == TokenKind::Variable => {
                    // static $x = 1, $y;
                    self.next_token()?;
                    let mut stmts = vec![];
                    loop {
                        let expr = self.parse_assign()?;
                        let span = expr.span().clone();
                        stmts.push(Ref::new(Stmt::Expr {
                            span,
                            expr,
                            doc: doc.clone(),
                        }));
                        if !self.eat_symbol(",")? {
                            break;
                        }
                    }
                    self.eat_symbol(";")?;
                    let span = self.span_from(&start);
                    return Ok(Ref::new(Stmt::Block { span, stmts }));
                }
                _ => (),
            }
        }

        let expr = self.parse_expr()?;
        if !self.eat_symbol(";")? && self.tok.0 != TokenKind::Eof && !self.is_symbol("}") {
            bail!(self.error("expecting `;` after expression"));
        }
        let span = self.span_from(&start);
        Ok(Ref::new(Stmt::Expr { span, expr, doc }))
    }

    fn parse_if(&mut self, start: Span) -> Result<Ref<Stmt>> {
        self.next_token()?;
        let cond = self.parse_paren_expr("after if")?;
        let then = self.parse_body()?;
        let otherwise = if self.is_kw("elseif") {
            let start = self.tok.1.clone();
            vec![self.parse_if(start)?]
        } else if self.is_kw("else") {
            self.next_token()?;
            if self.is_kw("if") {
                let start = self.tok.1.clone();
                vec![self.parse_if(start)?]
            } else {
                self.parse_body()?
            }
        } else {
            vec![]
        };
        let span = self.span_from(&start);
        Ok(Ref::new(Stmt::If {
            span,
            cond,
            then,
            otherwise,
        }))
    }

    // for (init; cond; step) body  =>  { init; while (cond) { body; step } }
    fn parse_for(&mut self, start: Span) -> Result<Ref<Stmt>> {
        self.next_token()?;
        self.expect("(", "after for")?;
        let mut sections: [Vec<Ref<Expr>>; 3] = [vec![], vec![], vec![]];
        for (idx, section) in sections.iter_mut().enumerate() {
            let terminator = if idx == 2 { ")" } else { ";" };
            while !self.is_symbol(terminator) {
                section.push(self.parse_expr()?);
                if !self.eat_symbol(",")? {
                    break;
                }
            }
            self.expect(terminator, "in for header")?;
        }
        let [init, cond, step] = sections;
        let mut body = self.parse_body()?;
        let span = self.span_from(&start);

        let as_stmt = |expr: Ref<Expr>| {
            let span = expr.span().clone();
            Ref::new(Stmt::Expr {
                span,
                expr,
                doc: None,
            })
        };
        body.extend(step.into_iter().map(as_stmt));
        let mut stmts: Vec<Ref<Stmt>> = init.into_iter().map(as_stmt).collect();
        let cond = match cond.into_iter().last() {
            Some(cond) => cond,
            None => Ref::new(Expr::Bool {
                span: span.clone(),
                value: Value::Bool(true),
                eidx: self.eidx(),
            }),
        };
        stmts.push(Ref::new(Stmt::While {
            span: span.clone(),
            cond,
            body,
        }));
        Ok(Ref::new(Stmt::Block { span, stmts }))
    }

    fn parse_foreach(&mut self, start: Span) -> Result<Ref<Stmt>> {
        self.next_token()?;
        self.expect("(", "after foreach")?;
        let collection = self.parse_expr()?;
        if !self.is_kw("as") {
            bail!(self.error("expecting `as` in foreach"));
        }
        self.next_token()?;
        self.eat_symbol("&")?;
        let first = self.parse_ternary()?;
        let (key, value) = if self.eat_symbol("=>")? {
            self.eat_symbol("&")?;
            (Some(first), self.parse_ternary()?)
        } else {
            (None, first)
        };
        self.expect(")", "after foreach header")?;
        let body = self.parse_body()?;
        let span = self.span_from(&start);
        Ok(Ref::new(Stmt::Foreach {
            span,
            collection,
            key,
            value,
            body,
        }))
    }

    fn parse_switch(&mut self, start: Span) -> Result<Ref<Stmt>> {
        self.next_token()?;
        let subject = self.parse_paren_expr("after switch")?;
        let mut stmts = vec![Ref::new(Stmt::Expr {
            span: subject.span().clone(),
            expr: subject,
            doc: None,
        })];
        self.expect("{", "to start switch body")?;
        while !self.is_symbol("}") {
            if self.tok.0 == TokenKind::Eof {
                bail!(self.error("unexpected end of file in switch"));
            }
            if self.is_kw("case") {
                self.next_token()?;
                let label = self.parse_expr()?;
                stmts.push(Ref::new(Stmt::Expr {
                    span: label.span().clone(),
                    expr: label,
                    doc: None,
                }));
                if !self.eat_symbol(":")? {
                    self.expect(";", "after case label")?;
                }
            } else if self.is_kw("default") {
                self.next_token()?;
                if !self.eat_symbol(":")? {
                    self.expect(";", "after default")?;
                }
            } else {
                stmts.push(self.parse_stmt()?);
            }
        }
        self.next_token()?;
        let span = self.span_from(&start);
        Ok(Ref::new(Stmt::Block { span, stmts }))
    }

    fn parse_try(&mut self, start: Span) -> Result<Ref<Stmt>> {
        self.next_token()?;
        let mut stmts = self.parse_block()?;
        loop {
            if self.is_kw("catch") {
                self.next_token()?;
                self.expect("(", "after catch")?;
                while !self.is_symbol(")") {
                    if self.tok.0 == TokenKind::Eof {
                        bail!(self.error("unexpected end of file in catch"));
                    }
                    self.next_token()?;
                }
                self.next_token()?;
                stmts.extend(self.parse_block()?);
            } else if self.is_kw("finally") {
                self.next_token()?;
                stmts.extend(self.parse_block()?);
            } else {
                break;
            }
        }
        let span = self.span_from(&start);
        Ok(Ref::new(Stmt::Block { span, stmts }))
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers> {
        let mut modifiers = Modifiers::default();
        while self.tok.0 == TokenKind::Ident {
            let text = self.tok.1.text().to_ascii_lowercase();
            if !MODIFIERS.contains(&text.as_str()) {
                break;
            }
            // `static function` inside a class body is a method modifier, but
            // `static::` or `static fn` are expressions. Callers only reach here in
            // member position.
            match text.as_str() {
                "public" | "var" => modifiers.visibility = Visibility::Public,
                "protected" => modifiers.visibility = Visibility::Protected,
                "private" => modifiers.visibility = Visibility::Private,
                "static" => modifiers.is_static = true,
                "abstract" => modifiers.is_abstract = true,
                "final" => modifiers.is_final = true,
                _ => (),
            }
            self.next_token()?;
        }
        Ok(modifiers)
    }

    fn parse_type_hint(&mut self) -> Result<Option<Span>> {
        let start = self.tok.1.clone();
        let mut found = false;
        loop {
            self.eat_symbol("?")?;
            if self.eat_symbol("(")? {
                self.parse_type_hint()?;
                self.expect(")", "in type")?;
                found = true;
            } else if self.tok.0 == TokenKind::Ident {
                self.next_token()?;
                found = true;
            } else {
                break;
            }
            let continues = self.is_symbol("|")
                || (self.is_symbol("&") && self.peek_token()?.0 == TokenKind::Ident);
            if !continues {
                break;
            }
            self.next_token()?;
        }
        Ok(found.then(|| self.span_from(&start)))
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect("(", "to start parameter list")?;
        let mut params = vec![];
        while !self.is_symbol(")") {
            let start = self.tok.1.clone();
            // Constructor promotion modifiers.
            self.parse_modifiers()?;
            let type_hint = if self.tok.0 == TokenKind::Variable {
                None
            } else {
                self.parse_type_hint()?
            };
            let by_ref = self.eat_symbol("&")?;
            let variadic = self.eat_symbol("...")?;
            if self.tok.0 != TokenKind::Variable {
                bail!(self.error("expecting parameter name"));
            }
            let name = var_name_span(&self.tok.1);
            self.next_token()?;
            let default = if self.eat_symbol("=")? {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let span = self.span_from(&start);
            params.push(Param {
                span,
                name,
                type_hint,
                default,
                by_ref,
                variadic,
            });
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect(")", "to end parameter list")?;
        Ok(params)
    }

    fn parse_return_hint(&mut self) -> Result<Option<Span>> {
        if self.eat_symbol(":")? {
            self.parse_type_hint()
        } else {
            Ok(None)
        }
    }

    /// Named function or method. `tok` is `function`.
    fn parse_function(
        &mut self,
        doc: Option<Span>,
        modifiers: Modifiers,
        in_class: bool,
    ) -> Result<Ref<FunctionDecl>> {
        let start = self.tok.1.clone();
        self.next_token()?;
        self.eat_symbol("&")?;
        if self.tok.0 != TokenKind::Ident {
            bail!(self.error("expecting function name"));
        }
        let name = Some(self.tok.1.clone());
        self.next_token()?;
        let params = self.parse_params()?;
        let return_hint = self.parse_return_hint()?;
        let body = if in_class && self.is_symbol(";") {
            self.next_token()?;
            FunctionBody::None
        } else {
            FunctionBody::Block(self.parse_block()?)
        };
        let span = self.span_from(&start);
        let fidx = self.fidx();
        Ok(Ref::new(FunctionDecl {
            span,
            name,
            params,
            uses: vec![],
            return_hint,
            body,
            doc,
            modifiers,
            fidx,
        }))
    }

    /// `function (...) use (...) {}` or `fn (...) => expr`, optionally `static`.
    fn parse_closure(&mut self) -> Result<Ref<Expr>> {
        let start = self.tok.1.clone();
        let doc = self.doc.clone();
        let mut modifiers = Modifiers::default();
        if self.is_kw("static") {
            modifiers.is_static = true;
            self.next_token()?;
        }
        let is_arrow = self.is_kw("fn");
        self.next_token()?;
        self.eat_symbol("&")?;
        let params = self.parse_params()?;

        let mut uses = vec![];
        if !is_arrow && self.is_kw("use") {
            self.next_token()?;
            self.expect("(", "after use")?;
            while !self.is_symbol(")") {
                self.eat_symbol("&")?;
                if self.tok.0 != TokenKind::Variable {
                    bail!(self.error("expecting variable in closure use list"));
                }
                uses.push(var_name_span(&self.tok.1));
                self.next_token()?;
                if !self.eat_symbol(",")? {
                    break;
                }
            }
            self.expect(")", "to end closure use list")?;
        }

        let return_hint = self.parse_return_hint()?;
        let body = if is_arrow {
            self.expect("=>", "in arrow function")?;
            FunctionBody::Arrow(self.parse_expr()?)
        } else {
            FunctionBody::Block(self.parse_block()?)
        };
        let span = self.span_from(&start);
        let fidx = self.fidx();
        let func = Ref::new(FunctionDecl {
            span: span.clone(),
            name: None,
            params,
            uses,
            return_hint,
            body,
            doc,
            modifiers,
            fidx,
        });
        Ok(Ref::new(Expr::Closure {
            span,
            func,
            eidx: self.eidx(),
        }))
    }

    fn parse_class(&mut self, doc: Option<Span>) -> Result<Ref<ClassDecl>> {
        let start = self.tok.1.clone();
        let mut is_abstract = false;
        while self.is_kw("abstract") || self.is_kw("final") || self.is_kw("readonly") {
            is_abstract |= self.is_kw("abstract");
            self.next_token()?;
        }
        let is_interface = self.is_kw("interface");
        let is_enum = self.is_kw("enum");
        if !(self.is_kw("class") || is_interface || self.is_kw("trait") || is_enum) {
            bail!(self.error("expecting `class`"));
        }
        self.next_token()?;
        if self.tok.0 != TokenKind::Ident {
            bail!(self.error("expecting class name"));
        }
        let name = self.tok.1.clone();
        self.next_token()?;

        if is_enum && self.eat_symbol(":")? {
            self.parse_type_hint()?;
        }

        let mut parent = None;
        let mut interfaces = vec![];
        if self.is_kw("extends") {
            self.next_token()?;
            let mut names = vec![];
            loop {
                if self.tok.0 != TokenKind::Ident {
                    bail!(self.error("expecting class name after extends"));
                }
                names.push(self.tok.1.clone());
                self.next_token()?;
                if !self.eat_symbol(",")? {
                    break;
                }
            }
            if is_interface {
                interfaces = names;
            } else {
                parent = names.into_iter().next();
            }
        }
        if self.is_kw("implements") {
            self.next_token()?;
            loop {
                if self.tok.0 != TokenKind::Ident {
                    bail!(self.error("expecting interface name"));
                }
                interfaces.push(self.tok.1.clone());
                self.next_token()?;
                if !self.eat_symbol(",")? {
                    break;
                }
            }
        }

        let (fields, consts, methods) = self.parse_class_body()?;
        let span = self.span_from(&start);
        Ok(Ref::new(ClassDecl {
            span,
            name,
            parent,
            interfaces,
            is_abstract: is_abstract || is_interface,
            is_interface,
            fields,
            consts,
            methods,
            doc,
        }))
    }

    #[allow(clippy::type_complexity)]
    fn parse_class_body(
        &mut self,
    ) -> Result<(
        Vec<Ref<FieldDecl>>,
        Vec<Ref<ConstDecl>>,
        Vec<Ref<FunctionDecl>>,
    )> {
        let mut fields = vec![];
        let mut consts = vec![];
        let mut methods = vec![];

        self.expect("{", "to start class body")?;
        while !self.is_symbol("}") {
            if self.tok.0 == TokenKind::Eof {
                bail!(self.error("unexpected end of file in class body"));
            }
            let doc = self.doc.clone();
            let start = self.tok.1.clone();

            if self.is_kw("use") || self.is_kw("case") {
                self.skip_member()?;
                continue;
            }

            let modifiers = self.parse_modifiers()?;

            if self.is_kw("const") {
                self.next_token()?;
                // Optional typed constant.
                if self.tok.0 == TokenKind::Ident && self.peek_token()?.0 == TokenKind::Ident {
                    self.parse_type_hint()?;
                }
                loop {
                    let name = self.tok.1.clone();
                    self.next_token()?;
                    self.expect("=", "in constant declaration")?;
                    let value = self.parse_expr()?;
                    let span = self.span_from(&start);
                    consts.push(Ref::new(ConstDecl { span, name, value }));
                    if !self.eat_symbol(",")? {
                        break;
                    }
                }
                self.expect(";", "after constant declaration")?;
            } else if self.is_kw("function") {
                methods.push(self.parse_function(doc, modifiers, true)?);
            } else {
                if self.tok.0 != TokenKind::Variable {
                    self.parse_type_hint()?;
                }
                loop {
                    if self.tok.0 != TokenKind::Variable {
                        bail!(self.error("expecting property name"));
                    }
                    let name = var_name_span(&self.tok.1);
                    self.next_token()?;
                    let default = if self.eat_symbol("=")? {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let span = self.span_from(&start);
                    fields.push(Ref::new(FieldDecl {
                        span,
                        name,
                        default,
                        modifiers,
                        doc: doc.clone(),
                    }));
                    if !self.eat_symbol(",")? {
                        break;
                    }
                }
                self.expect(";", "after property declaration")?;
            }
        }
        self.next_token()?;
        Ok((fields, consts, methods))
    }

    fn skip_member(&mut self) -> Result<()> {
        loop {
            if self.tok.0 == TokenKind::Eof {
                return Ok(());
            }
            if self.is_symbol("{") {
                let _ = self.parse_block_tokens()?;
                return Ok(());
            }
            if self.is_symbol(";") {
                return self.next_token();
            }
            self.next_token()?;
        }
    }

    // Skips a balanced `{ ... }` group without interpreting it.
    fn parse_block_tokens(&mut self) -> Result<u32> {
        let mut depth = 0u32;
        let mut count = 0u32;
        loop {
            if self.tok.0 == TokenKind::Eof {
                bail!(self.error("unbalanced braces"));
            }
            if self.is_symbol("{") {
                depth += 1;
            } else if self.is_symbol("}") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    self.next_token()?;
                    return Ok(count);
                }
            }
            count += 1;
            self.next_token()?;
        }
    }

    pub fn parse_expr(&mut self) -> Result<Ref<Expr>> {
        self.parse_low_or()
    }

    fn parse_low_or(&mut self) -> Result<Ref<Expr>> {
        let mut lhs = self.parse_low_and()?;
        while self.is_kw("or") || self.is_kw("xor") {
            self.next_token()?;
            let rhs = self.parse_low_and()?;
            lhs = self.make_bool(BoolOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_low_and(&mut self) -> Result<Ref<Expr>> {
        let mut lhs = self.parse_assign()?;
        while self.is_kw("and") {
            self.next_token()?;
            let rhs = self.parse_assign()?;
            lhs = self.make_bool(BoolOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn make_bool(&mut self, op: BoolOp, lhs: Ref<Expr>, rhs: Ref<Expr>) -> Ref<Expr> {
        let span = self.span_from(lhs.span());
        Ref::new(Expr::BoolExpr {
            span,
            op,
            lhs,
            rhs,
            eidx: self.eidx(),
        })
    }

    fn assign_op(&self) -> Option<AssignOp> {
        if self.tok.0 != TokenKind::Symbol {
            return None;
        }
        Some(match self.tok.1.text() {
            "=" => AssignOp::Eq,
            "??=" => AssignOp::Coalesce,
            ".=" => AssignOp::Arith(ArithOp::Concat),
            "+=" => AssignOp::Arith(ArithOp::Add),
            "-=" => AssignOp::Arith(ArithOp::Sub),
            "*=" => AssignOp::Arith(ArithOp::Mul),
            "/=" => AssignOp::Arith(ArithOp::Div),
            "%=" => AssignOp::Arith(ArithOp::Mod),
            "**=" => AssignOp::Arith(ArithOp::Pow),
            "|=" => AssignOp::Arith(ArithOp::BitOr),
            "&=" => AssignOp::Arith(ArithOp::BitAnd),
            _ => return None,
        })
    }

    fn parse_assign(&mut self) -> Result<Ref<Expr>> {
        let lhs = self.parse_ternary()?;
        let Some(op) = self.assign_op() else {
            return Ok(lhs);
        };
        let assignable = matches!(
            lhs.as_ref(),
            Expr::Var { .. }
                | Expr::Index { .. }
                | Expr::Property { .. }
                | Expr::StaticProperty { .. }
                | Expr::Array { .. }
        );
        if !assignable {
            bail!(self.error("invalid assignment target"));
        }
        self.next_token()?;
        if op == AssignOp::Eq {
            self.eat_symbol("&")?;
        }
        let rhs = self.parse_assign()?;
        let span = self.span_from(lhs.span());
        Ok(Ref::new(Expr::Assign {
            span,
            op,
            lhs,
            rhs,
            eidx: self.eidx(),
        }))
    }

    fn parse_ternary(&mut self) -> Result<Ref<Expr>> {
        let mut cond = self.parse_coalesce()?;
        while self.is_symbol("?") {
            self.next_token()?;
            let then = if self.eat_symbol(":")? {
                None
            } else {
                let then = self.parse_assign()?;
                self.expect(":", "in ternary expression")?;
                Some(then)
            };
            let otherwise = self.parse_assign()?;
            let span = self.span_from(cond.span());
            cond = Ref::new(Expr::Ternary {
                span,
                cond,
                then,
                otherwise,
                eidx: self.eidx(),
            });
        }
        Ok(cond)
    }

    fn parse_coalesce(&mut self) -> Result<Ref<Expr>> {
        let lhs = self.parse_binary(1)?;
        if !self.is_symbol("??") {
            return Ok(lhs);
        }
        self.next_token()?;
        let rhs = self.parse_coalesce()?;
        let span = self.span_from(lhs.span());
        Ok(Ref::new(Expr::Coalesce {
            span,
            lhs,
            rhs,
            eidx: self.eidx(),
        }))
    }

    fn binary_op(&self) -> Option<(u8, BinKind)> {
        if self.is_kw("instanceof") {
            return Some((11, BinKind::InstanceOf));
        }
        if self.tok.0 != TokenKind::Symbol {
            return None;
        }
        Some(match self.tok.1.text() {
            "||" => (1, BinKind::Bool(BoolOp::Or)),
            "&&" => (2, BinKind::Bool(BoolOp::And)),
            "|" => (3, BinKind::Arith(ArithOp::BitOr)),
            "^" => (4, BinKind::Arith(ArithOp::BitXor)),
            "&" => (5, BinKind::Arith(ArithOp::BitAnd)),
            "==" => (6, BinKind::Bool(BoolOp::Eq)),
            "===" => (6, BinKind::Bool(BoolOp::Identical)),
            "!=" | "<>" => (6, BinKind::Bool(BoolOp::Ne)),
            "!==" => (6, BinKind::Bool(BoolOp::NotIdentical)),
            "<=>" => (6, BinKind::Bool(BoolOp::Spaceship)),
            "<" => (7, BinKind::Bool(BoolOp::Lt)),
            "<=" => (7, BinKind::Bool(BoolOp::Le)),
            ">" => (7, BinKind::Bool(BoolOp::Gt)),
            ">=" => (7, BinKind::Bool(BoolOp::Ge)),
            "." => (8, BinKind::Arith(ArithOp::Concat)),
            "+" => (9, BinKind::Arith(ArithOp::Add)),
            "-" => (9, BinKind::Arith(ArithOp::Sub)),
            "*" => (10, BinKind::Arith(ArithOp::Mul)),
            "/" => (10, BinKind::Arith(ArithOp::Div)),
            "%" => (10, BinKind::Arith(ArithOp::Mod)),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Ref<Expr>> {
        let mut lhs = self.parse_unary()?;
        while let Some((prec, kind)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.next_token()?;
            lhs = match kind {
                BinKind::InstanceOf => {
                    let class = self.parse_class_ref()?;
                    let span = self.span_from(lhs.span());
                    Ref::new(Expr::InstanceOf {
                        span,
                        expr: lhs,
                        class,
                        eidx: self.eidx(),
                    })
                }
                BinKind::Arith(op) => {
                    let rhs = self.parse_binary(prec + 1)?;
                    let span = self.span_from(lhs.span());
                    Ref::new(Expr::ArithExpr {
                        span,
                        op,
                        lhs,
                        rhs,
                        eidx: self.eidx(),
                    })
                }
                BinKind::Bool(op) => {
                    let rhs = self.parse_binary(prec + 1)?;
                    self.make_bool(op, lhs, rhs)
                }
            };
        }
        Ok(lhs)
    }

    fn cast_kind(&self) -> Result<Option<CastKind>> {
        if !self.is_symbol("(") {
            return Ok(None);
        }
        let [ident, close] = self.peek_tokens::<2>()?;
        if ident.0 != TokenKind::Ident || close.1.text() != ")" {
            return Ok(None);
        }
        let text = ident.1.text().to_ascii_lowercase();
        Ok(CAST_KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == text)
            .map(|(_, kind)| *kind))
    }

    fn parse_unary(&mut self) -> Result<Ref<Expr>> {
        let start = self.tok.1.clone();
        if let Some(kind) = self.cast_kind()? {
            self.next_token()?;
            self.next_token()?;
            self.next_token()?;
            let expr = self.parse_unary()?;
            let span = self.span_from(&start);
            return Ok(Ref::new(Expr::Cast {
                span,
                kind,
                expr,
                eidx: self.eidx(),
            }));
        }

        let op = if self.tok.0 == TokenKind::Symbol {
            match self.tok.1.text() {
                "!" => Some(UnaryOp::Not),
                "-" => Some(UnaryOp::Neg),
                "+" => Some(UnaryOp::Plus),
                "~" => Some(UnaryOp::BitNot),
                "@" => Some(UnaryOp::Silence),
                "++" => Some(UnaryOp::PreInc),
                "--" => Some(UnaryOp::PreDec),
                "&" => {
                    // By-reference marker in argument or array item position.
                    self.next_token()?;
                    return self.parse_unary();
                }
                _ => None,
            }
        } else if self.is_kw("clone") || self.is_kw("print") || self.is_kw("throw") {
            self.next_token()?;
            return self.parse_unary();
        } else {
            None
        };

        if let Some(op) = op {
            self.next_token()?;
            let expr = self.parse_unary()?;
            let span = self.span_from(&start);
            return Ok(Ref::new(Expr::Unary {
                span,
                op,
                expr,
                eidx: self.eidx(),
            }));
        }

        let base = self.parse_postfix()?;
        if self.is_symbol("**") {
            self.next_token()?;
            let rhs = self.parse_unary()?;
            let span = self.span_from(&start);
            return Ok(Ref::new(Expr::ArithExpr {
                span,
                op: ArithOp::Pow,
                lhs: base,
                rhs,
                eidx: self.eidx(),
            }));
        }
        Ok(base)
    }

    fn parse_args(&mut self) -> Result<Vec<Ref<Expr>>> {
        self.expect("(", "to start argument list")?;
        let mut args = vec![];
        // First class callable syntax `f(...)`.
        if self.is_symbol("...") && self.peek_token()?.1.text() == ")" {
            self.next_token()?;
            self.next_token()?;
            return Ok(args);
        }
        while !self.is_symbol(")") {
            self.eat_symbol("...")?;
            // Named argument.
            if self.tok.0 == TokenKind::Ident && self.peek_token()?.1.text() == ":" {
                self.next_token()?;
                self.next_token()?;
            }
            args.push(self.parse_expr()?);
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect(")", "to end argument list")?;
        Ok(args)
    }

    fn parse_array_items(&mut self, close: &str) -> Result<Vec<ArrayItem>> {
        let mut items = vec![];
        while !self.is_symbol(close) {
            if self.is_symbol(",") {
                // Skipped slot in list destructuring.
                self.next_token()?;
                continue;
            }
            let spread = self.eat_symbol("...")?;
            let first = self.parse_expr()?;
            let item = if self.eat_symbol("=>")? {
                ArrayItem {
                    key: Some(first),
                    value: self.parse_expr()?,
                    spread,
                }
            } else {
                ArrayItem {
                    key: None,
                    value: first,
                    spread,
                }
            };
            items.push(item);
            if !self.eat_symbol(",")? {
                break;
            }
        }
        self.expect(close, "to end array literal")?;
        Ok(items)
    }

    fn parse_class_ref(&mut self) -> Result<ClassRef> {
        match self.tok.0 {
            TokenKind::Ident => {
                let span = self.tok.1.clone();
                self.next_token()?;
                Ok(ClassRef::Name(span))
            }
            TokenKind::Variable => {
                let span = self.tok.1.clone();
                self.next_token()?;
                Ok(ClassRef::Expr(Ref::new(Expr::Var {
                    name: var_name_span(&span),
                    span,
                    eidx: self.eidx(),
                })))
            }
            _ if self.is_symbol("(") => Ok(ClassRef::Expr(self.parse_paren_expr("in class reference")?)),
            _ => Err(self.error("expecting class name")),
        }
    }

    fn parse_new(&mut self) -> Result<Ref<Expr>> {
        let start = self.tok.1.clone();
        self.next_token()?;
        if self.is_kw("class") {
            // Anonymous class.
            let class_span = self.tok.1.clone();
            self.next_token()?;
            let args = if self.is_symbol("(") {
                self.parse_args()?
            } else {
                vec![]
            };
            while self.is_kw("extends") || self.is_kw("implements") || self.tok.0 == TokenKind::Ident {
                self.next_token()?;
                self.eat_symbol(",")?;
            }
            self.parse_class_body()?;
            let span = self.span_from(&start);
            return Ok(Ref::new(Expr::New {
                span,
                class: ClassRef::Name(class_span),
                args,
                eidx: self.eidx(),
            }));
        }
        let class = self.parse_class_ref()?;
        let args = if self.is_symbol("(") {
            self.parse_args()?
        } else {
            vec![]
        };
        let span = self.span_from(&start);
        Ok(Ref::new(Expr::New {
            span,
            class,
            args,
            eidx: self.eidx(),
        }))
    }

    fn parse_primary(&mut self) -> Result<Ref<Expr>> {
        let start = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Variable => {
                self.next_token()?;
                Ok(Ref::new(Expr::Var {
                    name: var_name_span(&start),
                    span: start,
                    eidx: self.eidx(),
                }))
            }
            TokenKind::String => {
                let value = Value::String(unquote(start.text()).into());
                self.next_token()?;
                Ok(Ref::new(Expr::String {
                    span: start,
                    value,
                    eidx: self.eidx(),
                }))
            }
            TokenKind::Number => {
                let value = match Value::from_numeric_literal(start.text()) {
                    Ok(v) => v,
                    Err(e) => bail!(start.error(&e.to_string())),
                };
                self.next_token()?;
                Ok(Ref::new(Expr::Number {
                    span: start,
                    value,
                    eidx: self.eidx(),
                }))
            }
            TokenKind::Ident => {
                let text = start.text().to_ascii_lowercase();
                match text.as_str() {
                    "true" | "false" => {
                        self.next_token()?;
                        Ok(Ref::new(Expr::Bool {
                            span: start,
                            value: Value::Bool(text == "true"),
                            eidx: self.eidx(),
                        }))
                    }
                    "null" => {
                        self.next_token()?;
                        Ok(Ref::new(Expr::Null {
                            span: start,
                            eidx: self.eidx(),
                        }))
                    }
                    "array" | "list" if self.peek_token()?.1.text() == "(" => {
                        self.next_token()?;
                        self.next_token()?;
                        let items = self.parse_array_items(")")?;
                        let span = self.span_from(&start);
                        Ok(Ref::new(Expr::Array {
                            span,
                            items,
                            eidx: self.eidx(),
                        }))
                    }
                    "function" | "fn" => self.parse_closure(),
                    "static"
                        if {
                            let next = self.peek_token()?;
                            next.0 == TokenKind::Ident
                                && matches!(next.1.text(), "function" | "fn")
                        } =>
                    {
                        self.parse_closure()
                    }
                    "new" => self.parse_new(),
                    _ => {
                        self.next_token()?;
                        Ok(Ref::new(Expr::Name {
                            span: start,
                            eidx: self.eidx(),
                        }))
                    }
                }
            }
            TokenKind::Symbol if self.is_symbol("[") => {
                self.next_token()?;
                let items = self.parse_array_items("]")?;
                let span = self.span_from(&start);
                Ok(Ref::new(Expr::Array {
                    span,
                    items,
                    eidx: self.eidx(),
                }))
            }
            TokenKind::Symbol if self.is_symbol("(") => self.parse_paren_expr("in expression"),
            _ => Err(self.error("expecting expression")),
        }
    }

    fn parse_postfix(&mut self) -> Result<Ref<Expr>> {
        let mut expr = self.parse_primary()?;
        loop {
            let start = expr.span().clone();
            if self.tok.0 != TokenKind::Symbol {
                break;
            }
            match self.tok.1.text() {
                "[" => {
                    self.next_token()?;
                    let index = if self.is_symbol("]") {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect("]", "to end index")?;
                    let span = self.span_from(&start);
                    expr = Ref::new(Expr::Index {
                        span,
                        refr: expr,
                        index,
                        eidx: self.eidx(),
                    });
                }
                "->" | "?->" => {
                    self.next_token()?;
                    let name = match self.tok.0 {
                        TokenKind::Ident | TokenKind::Variable => self.tok.1.clone(),
                        _ if self.is_symbol("{") => {
                            let span = self.tok.1.clone();
                            self.next_token()?;
                            self.parse_expr()?;
                            self.expect("}", "to end dynamic member name")?;
                            span
                        }
                        _ => bail!(self.error("expecting member name")),
                    };
                    if name.text() != "{" {
                        self.next_token()?;
                    }
                    if self.is_symbol("(") {
                        let args = self.parse_args()?;
                        let span = self.span_from(&start);
                        expr = Ref::new(Expr::MethodCall {
                            span,
                            refr: expr,
                            name,
                            args,
                            eidx: self.eidx(),
                        });
                    } else {
                        let span = self.span_from(&start);
                        expr = Ref::new(Expr::Property {
                            span,
                            refr: expr,
                            name,
                            eidx: self.eidx(),
                        });
                    }
                }
                "::" => {
                    self.next_token()?;
                    let class = match expr.as_ref() {
                        Expr::Name { span, .. } => ClassRef::Name(span.clone()),
                        _ => ClassRef::Expr(expr.clone()),
                    };
                    match self.tok.0 {
                        TokenKind::Variable => {
                            let name = var_name_span(&self.tok.1);
                            self.next_token()?;
                            let span = self.span_from(&start);
                            expr = Ref::new(Expr::StaticProperty {
                                span,
                                class,
                                name,
                                eidx: self.eidx(),
                            });
                        }
                        TokenKind::Ident => {
                            let name = self.tok.1.clone();
                            self.next_token()?;
                            if self.is_symbol("(") {
                                let args = self.parse_args()?;
                                let span = self.span_from(&start);
                                expr = Ref::new(Expr::StaticCall {
                                    span,
                                    class,
                                    name,
                                    args,
                                    eidx: self.eidx(),
                                });
                            } else {
                                let span = self.span_from(&start);
                                expr = Ref::new(Expr::ClassConst {
                                    span,
                                    class,
                                    name,
                                    eidx: self.eidx(),
                                });
                            }
                        }
                        _ => bail!(self.error("expecting member name after `::`")),
                    }
                }
                "(" => {
                    let args = self.parse_args()?;
                    let span = self.span_from(&start);
                    expr = Ref::new(Expr::Call {
                        span,
                        fcn: expr,
                        args,
                        eidx: self.eidx(),
                    });
                }
                "++" | "--" => {
                    let op = if self.tok.1.text() == "++" {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    self.next_token()?;
                    let span = self.span_from(&start);
                    expr = Ref::new(Expr::Unary {
                        span,
                        op,
                        expr,
                        eidx: self.eidx(),
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }
}

/// Span of a `$name` token without the sigil.
fn var_name_span(span: &Span) -> Span {
    let mut name = span.clone();
    name.start = (span.start + 1).min(span.end);
    name.col += 1;
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Module> {
        let source = Source::from_contents("test.php".to_string(), src.to_string())?;
        let mut parser = Parser::new(&source)?;
        parser.parse()
    }

    #[test]
    fn parses_assignment_of_array_literal() -> Result<()> {
        let module = parse("<?php $x = ['id' => 1, 'name' => 'Bob'];")?;
        assert_eq!(module.stmts.len(), 1);
        let Stmt::Expr { expr, .. } = module.stmts[0].as_ref() else {
            bail!("expected expression statement");
        };
        let Expr::Assign { lhs, rhs, .. } = expr.as_ref() else {
            bail!("expected assignment");
        };
        assert_eq!(lhs.var_name(), Some("x"));
        let Expr::Array { items, .. } = rhs.as_ref() else {
            bail!("expected array literal");
        };
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.key.is_some()));
        Ok(())
    }

    #[test]
    fn parses_class_with_members() -> Result<()> {
        let module = parse(
            r#"<?php
            abstract class Repo extends Base implements A, B {
                const TABLE = 'users';
                /** @var array */
                protected static $fields = ['id', 'name'];
                abstract public function find($id);
                public function all(): array { return []; }
            }"#,
        )?;
        let Stmt::Class(class) = module.stmts[0].as_ref() else {
            bail!("expected class");
        };
        assert_eq!(class.name.text(), "Repo");
        assert_eq!(class.parent.as_ref().map(|p| p.text()), Some("Base"));
        assert_eq!(class.interfaces.len(), 2);
        assert!(class.is_abstract);
        assert_eq!(class.consts.len(), 1);
        assert_eq!(class.fields.len(), 1);
        assert!(class.fields[0].doc.is_some());
        assert!(class.fields[0].modifiers.is_static);
        assert_eq!(class.methods.len(), 2);
        assert!(matches!(class.methods[0].body, FunctionBody::None));
        Ok(())
    }

    #[test]
    fn parses_closures_and_arrow_functions() -> Result<()> {
        let module = parse("<?php $f = function ($a) use ($b) { return $a; }; $g = fn($x) => $x['k'];")?;
        assert_eq!(module.stmts.len(), 2);
        assert_eq!(module.num_functions, 2);
        Ok(())
    }

    #[test]
    fn precedence_of_concat_and_ternary() -> Result<()> {
        let module = parse("<?php $x = $a . 'b' ?: $c ?? 'd';")?;
        let Stmt::Expr { expr, .. } = module.stmts[0].as_ref() else {
            bail!("expected expression statement");
        };
        let Expr::Assign { rhs, .. } = expr.as_ref() else {
            bail!("expected assignment");
        };
        assert!(matches!(rhs.as_ref(), Expr::Ternary { then: None, .. }));
        Ok(())
    }

    #[test]
    fn parses_foreach_with_key() -> Result<()> {
        let module = parse("<?php foreach ($rows as $i => $row) { echo $row['id']; }")?;
        let Stmt::Foreach { key, value, .. } = module.stmts[0].as_ref() else {
            bail!("expected foreach");
        };
        assert_eq!(key.as_ref().and_then(|k| k.var_name()), Some("i"));
        assert_eq!(value.var_name(), Some("row"));
        Ok(())
    }

    #[test]
    fn attaches_doc_comment_to_statement() -> Result<()> {
        let module = parse("<?php\n/** @var array $x */\n$x = foo();")?;
        let Stmt::Expr { doc, .. } = module.stmts[0].as_ref() else {
            bail!("expected expression statement");
        };
        assert!(doc.as_ref().is_some_and(|d| d.text().contains("@var")));
        Ok(())
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(parse("<?php 1 = 2;").is_err());
    }
}
