// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::*;
use crate::value::Value;

use alloc::rc::Rc;
use core::{cmp, fmt, ops::Deref};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoolOp {
    Lt,
    Le,
    Eq,
    Identical,
    Ge,
    Gt,
    Ne,
    NotIdentical,
    And,
    Or,
    Spaceship,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AssignOp {
    Eq,
    Arith(ArithOp),
    Coalesce,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    Silence,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CastKind {
    Array,
    Int,
    Float,
    String,
    Bool,
    Object,
}

pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> cmp::Ord for NodeRef<T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Rc::as_ptr(&self.r).cmp(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::PartialOrd for NodeRef<T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

/// Class position of a static access, `new` or `instanceof`.
#[derive(Debug, Clone)]
pub enum ClassRef {
    /// Class name, or one of `self`, `static`, `parent`.
    Name(Span),
    /// `$obj::method()`, `new $cls`.
    Expr(Ref<Expr>),
}

#[derive(Debug)]
pub struct ArrayItem {
    pub key: Option<Ref<Expr>>,
    pub value: Ref<Expr>,
    pub spread: bool,
}

#[derive(Debug)]
pub enum Expr {
    String {
        span: Span,
        value: Value,
        eidx: u32,
    },

    Number {
        span: Span,
        value: Value,
        eidx: u32,
    },

    Bool {
        span: Span,
        value: Value,
        eidx: u32,
    },

    Null {
        span: Span,
        eidx: u32,
    },

    /// `$name`. `name` excludes the sigil.
    Var {
        span: Span,
        name: Span,
        eidx: u32,
    },

    /// A bare identifier: function name in call position, or a global constant.
    Name {
        span: Span,
        eidx: u32,
    },

    Array {
        span: Span,
        items: Vec<ArrayItem>,
        eidx: u32,
    },

    /// `refr[index]`, or the push target `refr[]` when `index` is None.
    Index {
        span: Span,
        refr: Ref<Expr>,
        index: Option<Ref<Expr>>,
        eidx: u32,
    },

    Property {
        span: Span,
        refr: Ref<Expr>,
        name: Span,
        eidx: u32,
    },

    StaticProperty {
        span: Span,
        class: ClassRef,
        name: Span,
        eidx: u32,
    },

    /// `C::CONST` and `C::class`.
    ClassConst {
        span: Span,
        class: ClassRef,
        name: Span,
        eidx: u32,
    },

    MethodCall {
        span: Span,
        refr: Ref<Expr>,
        name: Span,
        args: Vec<Ref<Expr>>,
        eidx: u32,
    },

    StaticCall {
        span: Span,
        class: ClassRef,
        name: Span,
        args: Vec<Ref<Expr>>,
        eidx: u32,
    },

    Call {
        span: Span,
        fcn: Ref<Expr>,
        args: Vec<Ref<Expr>>,
        eidx: u32,
    },

    New {
        span: Span,
        class: ClassRef,
        args: Vec<Ref<Expr>>,
        eidx: u32,
    },

    /// Closures and arrow functions.
    Closure {
        span: Span,
        func: Ref<FunctionDecl>,
        eidx: u32,
    },

    Assign {
        span: Span,
        op: AssignOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
        eidx: u32,
    },

    ArithExpr {
        span: Span,
        op: ArithOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
        eidx: u32,
    },

    BoolExpr {
        span: Span,
        op: BoolOp,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
        eidx: u32,
    },

    Coalesce {
        span: Span,
        lhs: Ref<Expr>,
        rhs: Ref<Expr>,
        eidx: u32,
    },

    /// `cond ? then : otherwise`, or `cond ?: otherwise` when `then` is None.
    Ternary {
        span: Span,
        cond: Ref<Expr>,
        then: Option<Ref<Expr>>,
        otherwise: Ref<Expr>,
        eidx: u32,
    },

    Unary {
        span: Span,
        op: UnaryOp,
        expr: Ref<Expr>,
        eidx: u32,
    },

    Cast {
        span: Span,
        kind: CastKind,
        expr: Ref<Expr>,
        eidx: u32,
    },

    InstanceOf {
        span: Span,
        expr: Ref<Expr>,
        class: ClassRef,
        eidx: u32,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Self::String { span, .. }
            | Self::Number { span, .. }
            | Self::Bool { span, .. }
            | Self::Null { span, .. }
            | Self::Var { span, .. }
            | Self::Name { span, .. }
            | Self::Array { span, .. }
            | Self::Index { span, .. }
            | Self::Property { span, .. }
            | Self::StaticProperty { span, .. }
            | Self::ClassConst { span, .. }
            | Self::MethodCall { span, .. }
            | Self::StaticCall { span, .. }
            | Self::Call { span, .. }
            | Self::New { span, .. }
            | Self::Closure { span, .. }
            | Self::Assign { span, .. }
            | Self::ArithExpr { span, .. }
            | Self::BoolExpr { span, .. }
            | Self::Coalesce { span, .. }
            | Self::Ternary { span, .. }
            | Self::Unary { span, .. }
            | Self::Cast { span, .. }
            | Self::InstanceOf { span, .. } => span,
        }
    }

    pub fn eidx(&self) -> u32 {
        match self {
            Self::String { eidx, .. }
            | Self::Number { eidx, .. }
            | Self::Bool { eidx, .. }
            | Self::Null { eidx, .. }
            | Self::Var { eidx, .. }
            | Self::Name { eidx, .. }
            | Self::Array { eidx, .. }
            | Self::Index { eidx, .. }
            | Self::Property { eidx, .. }
            | Self::StaticProperty { eidx, .. }
            | Self::ClassConst { eidx, .. }
            | Self::MethodCall { eidx, .. }
            | Self::StaticCall { eidx, .. }
            | Self::Call { eidx, .. }
            | Self::New { eidx, .. }
            | Self::Closure { eidx, .. }
            | Self::Assign { eidx, .. }
            | Self::ArithExpr { eidx, .. }
            | Self::BoolExpr { eidx, .. }
            | Self::Coalesce { eidx, .. }
            | Self::Ternary { eidx, .. }
            | Self::Unary { eidx, .. }
            | Self::Cast { eidx, .. }
            | Self::InstanceOf { eidx, .. } => *eidx,
        }
    }

    /// Name of a plain variable, without the sigil.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Self::Var { name, .. } => Some(name.text()),
            _ => None,
        }
    }

    /// Literal scalar carried by the node, if any.
    pub fn literal(&self) -> Option<&Value> {
        match self {
            Self::String { value, .. } | Self::Number { value, .. } | Self::Bool { value, .. } => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn call_args(&self) -> Option<&[Ref<Expr>]> {
        match self {
            Self::MethodCall { args, .. }
            | Self::StaticCall { args, .. }
            | Self::Call { args, .. }
            | Self::New { args, .. } => Some(args),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

#[derive(Debug)]
pub struct Param {
    pub span: Span,
    /// Without the sigil.
    pub name: Span,
    pub type_hint: Option<Span>,
    pub default: Option<Ref<Expr>>,
    pub by_ref: bool,
    pub variadic: bool,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Ref<Stmt>>),
    Arrow(Ref<Expr>),
    /// Abstract and interface methods.
    None,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub span: Span,
    pub name: Option<Span>,
    pub params: Vec<Param>,
    /// Variables imported by `use (...)` on closures, without the sigil.
    pub uses: Vec<Span>,
    pub return_hint: Option<Span>,
    pub body: FunctionBody,
    pub doc: Option<Span>,
    pub modifiers: Modifiers,
    /// Index of the declaration within its module. Identifies its variable scope.
    pub fidx: u32,
}

impl FunctionDecl {
    pub fn name(&self) -> &str {
        self.name.as_ref().map(|n| n.text()).unwrap_or("")
    }

    pub fn is_arrow(&self) -> bool {
        matches!(self.body, FunctionBody::Arrow(_))
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name.text() == name)
    }
}

#[derive(Debug)]
pub struct FieldDecl {
    pub span: Span,
    /// Without the sigil.
    pub name: Span,
    pub default: Option<Ref<Expr>>,
    pub modifiers: Modifiers,
    pub doc: Option<Span>,
}

#[derive(Debug)]
pub struct ConstDecl {
    pub span: Span,
    pub name: Span,
    pub value: Ref<Expr>,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub span: Span,
    pub name: Span,
    pub parent: Option<Span>,
    pub interfaces: Vec<Span>,
    pub is_abstract: bool,
    pub is_interface: bool,
    pub fields: Vec<Ref<FieldDecl>>,
    pub consts: Vec<Ref<ConstDecl>>,
    pub methods: Vec<Ref<FunctionDecl>>,
    pub doc: Option<Span>,
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&Ref<FunctionDecl>> {
        self.methods
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&Ref<FieldDecl>> {
        self.fields.iter().find(|f| f.name.text() == name)
    }
}

#[derive(Debug)]
pub enum Stmt {
    Expr {
        span: Span,
        expr: Ref<Expr>,
        doc: Option<Span>,
    },
    Echo {
        span: Span,
        exprs: Vec<Ref<Expr>>,
    },
    Return {
        span: Span,
        value: Option<Ref<Expr>>,
    },
    Block {
        span: Span,
        stmts: Vec<Ref<Stmt>>,
    },
    If {
        span: Span,
        cond: Ref<Expr>,
        then: Vec<Ref<Stmt>>,
        otherwise: Vec<Ref<Stmt>>,
    },
    While {
        span: Span,
        cond: Ref<Expr>,
        body: Vec<Ref<Stmt>>,
    },
    Foreach {
        span: Span,
        collection: Ref<Expr>,
        key: Option<Ref<Expr>>,
        value: Ref<Expr>,
        body: Vec<Ref<Stmt>>,
    },
    Function(Ref<FunctionDecl>),
    Class(Ref<ClassDecl>),
    Nop {
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Self::Expr { span, .. }
            | Self::Echo { span, .. }
            | Self::Return { span, .. }
            | Self::Block { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::Foreach { span, .. }
            | Self::Nop { span } => span,
            Self::Function(f) => &f.span,
            Self::Class(c) => &c.span,
        }
    }
}

#[derive(Debug)]
pub struct Module {
    pub source: Source,
    pub stmts: Vec<Ref<Stmt>>,
    pub num_expressions: u32,
    pub num_functions: u32,
}

pub type ExprRef = Ref<Expr>;
