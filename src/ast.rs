//! Árbol sintáctico.
//!
//! El AST es inmutable una vez construido por [`crate::parse`]. Las
//! fases posteriores no escriben sobre los nodos; en cambio, asocian
//! información a cada nodo por medio de su [`NodeId`] en tablas
//! laterales (ver [`crate::semantic::Annotations`]).

use crate::{
    lex::Identifier,
    source::{Located, Location},
};

use std::fmt::{self, Display};

/// Identificador único de un nodo dentro de un mismo [`Ast`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Programa completo.
#[derive(Debug)]
pub struct Ast {
    pub name: Option<Located<Identifier>>,
    pub declarations: Vec<Declaration>,
    pub instructions: Vec<Statement>,
}

#[derive(Debug)]
pub enum Declaration {
    /// `CONST name = value;`
    Const {
        name: Located<Identifier>,
        value: Expr,
    },

    /// `TYPE name = of;`
    Type {
        name: Located<Identifier>,
        of: TypeExpr,
    },

    /// `VAR a, b, c: of;`
    Var {
        names: Vec<Located<Identifier>>,
        of: TypeExpr,
    },
}

#[derive(Debug)]
pub struct TypeExpr {
    pub id: NodeId,
    pub location: Location,
    pub kind: TypeExprKind,
}

#[derive(Debug)]
pub enum TypeExprKind {
    Named(Identifier),
    Array { length: Box<Expr>, element: Box<TypeExpr> },
    Record(Vec<Declaration>),
}

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub location: Location,
    pub kind: ExprKind,
}

#[derive(Debug)]
pub enum ExprKind {
    Int(i64),
    Var(Identifier),
    Element { array: Box<Expr>, index: Box<Expr> },
    Field { record: Box<Expr>, field: Located<Identifier> },
    Binary { op: ArithOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl ExprKind {
    /// Nombre del constructo, para mensajes de error.
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::Int(_) => "integer literal",
            ExprKind::Var(_) => "variable reference",
            ExprKind::Element { .. } => "array element reference",
            ExprKind::Field { .. } => "record field reference",
            ExprKind::Binary { .. } => "arithmetic expression",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Display for ArithOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        };

        fmt.write_str(symbol)
    }
}

/// Comparación que controla una construcción de flujo.
#[derive(Debug)]
pub struct Condition {
    pub id: NodeId,
    pub location: Location,
    pub op: RelOp,
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl RelOp {
    /// Negación lógica del operador.
    pub fn negate(self) -> RelOp {
        use RelOp::*;

        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            Less => GreaterOrEqual,
            LessOrEqual => Greater,
            Greater => LessOrEqual,
            GreaterOrEqual => Less,
        }
    }
}

#[derive(Debug)]
pub enum Statement {
    Assign {
        target: Expr,
        value: Expr,
    },

    If {
        condition: Condition,
        then: Vec<Statement>,
    },

    IfElse {
        condition: Condition,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },

    While {
        condition: Condition,
        body: Vec<Statement>,
    },

    Repeat {
        body: Vec<Statement>,
        condition: Condition,
    },

    Read(Expr),

    Write(Expr),
}
