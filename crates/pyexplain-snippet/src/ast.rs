//! Syntax tree for the snippet language.

use std::collections::BTreeSet;
use std::rc::Rc;

use num_bigint::BigInt;

pub type Block = Vec<Stmt>;

/// A statement and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`: every target receives the same value.
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        body: Block,
        orelse: Block,
    },
    While {
        test: Expr,
        body: Block,
        orelse: Block,
    },
    For {
        target: Target,
        iter: Expr,
        body: Block,
        orelse: Block,
    },
    Break,
    Continue,
    Pass,
    Del(Vec<Target>),
    Import(Vec<Alias>),
    ImportFrom {
        module: String,
        names: Vec<Alias>,
    },
    Raise(Option<Expr>),
    Try {
        body: Block,
        handlers: Vec<Handler>,
        orelse: Block,
        finalbody: Block,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    /// The name bound in the importing scope.
    pub fn bound_name(&self) -> &str {
        self.asname.as_deref().unwrap_or(&self.name)
    }
}

/// One `except` clause. `kinds` is `None` for a bare `except:`.
#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub kinds: Option<Expr>,
    pub name: Option<String>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub line: u32,
    /// Names assigned anywhere in the body (parameters included). Reading one
    /// before assignment is an `UnboundLocalError`, not a global lookup.
    pub locals: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Subscript { value: Box<Expr>, index: Box<Expr> },
    Attribute { value: Box<Expr>, attr: String },
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`: each link is evaluated left to right and short-circuits.
    Compare {
        left: Box<Expr>,
        links: Vec<(CmpOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

impl Expr {
    /// Noun used in "cannot assign to ..." messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Expr::None | Expr::Bool(_) => "literal",
            Expr::Int(_) | Expr::BigInt(_) | Expr::Float(_) | Expr::Str(_) => "literal",
            Expr::FString(_) => "f-string expression",
            Expr::Call { .. } => "function call",
            Expr::Compare { .. } => "comparison",
            Expr::And(..) | Expr::Or(..) => "expression",
            Expr::IfExp { .. } => "conditional expression",
            Expr::Dict(_) => "dict literal",
            _ => "expression",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        expr: Expr,
        conversion: Option<char>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "** or pow()",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

/// Collect every name bound by `body`, without descending into nested
/// function bodies.
pub fn collect_locals(body: &[Stmt], into: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    target_names(target, into);
                }
            }
            StmtKind::AugAssign { target, .. } => target_names(target, into),
            StmtKind::FunctionDef(def) => {
                into.insert(def.name.clone());
            }
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                target_names(target, into);
                collect_locals(body, into);
                collect_locals(orelse, into);
            }
            StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                collect_locals(body, into);
                collect_locals(orelse, into);
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    target_names(target, into);
                }
            }
            StmtKind::Import(aliases) | StmtKind::ImportFrom { names: aliases, .. } => {
                for alias in aliases {
                    let bound = alias.bound_name();
                    // `import a.b` binds `a`
                    let head = bound.split('.').next().unwrap_or(bound);
                    into.insert(head.to_string());
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_locals(body, into);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        into.insert(name.clone());
                    }
                    collect_locals(&handler.body, into);
                }
                collect_locals(orelse, into);
                collect_locals(finalbody, into);
            }
            StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Raise(_)
            | StmtKind::Assert { .. } => {}
        }
    }
}

fn target_names(target: &Target, into: &mut BTreeSet<String>) {
    match target {
        Target::Name(name) => {
            into.insert(name.clone());
        }
        Target::Tuple(items) => {
            for item in items {
                target_names(item, into);
            }
        }
        Target::Subscript { .. } | Target::Attribute { .. } => {}
    }
}
