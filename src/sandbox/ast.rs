//! Abstract syntax for the scriptlet grammar.
//!
//! The grammar is a closed enumeration: anything not representable here
//! cannot be compiled, which is the sandbox's first isolation boundary.

/// A parsed program: statements in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A bare expression, evaluated for effect.
    Expr(Expr),
    /// `name = expr` or `name op= expr`.
    Assign {
        name: String,
        op: Option<BinOp>,
        value: Expr,
    },
    /// `name[index] = expr`.
    IndexAssign {
        name: String,
        index: Expr,
        value: Expr,
    },
    /// `import dotted.name`, resolved through the import gate at run time.
    Import { module: String },
    /// `if` / `elif` chain with an optional `else` block.
    If {
        arms: Vec<(Expr, Vec<Stmt>)>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    List(Vec<Expr>),
    /// Map literal; keys are expressions that must evaluate to strings.
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Short-circuiting `and` / `or`.
    Logic {
        op: LogicOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Guarded attribute access / method dispatch.
    Attr {
        obj: Box<Expr>,
        name: String,
    },
    /// Guarded item access.
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
}
