//! Análisis semántico.
//!
//! Un único recorrido en orden sobre el AST que construye la tabla de
//! símbolos, resuelve tipos, pliega expresiones constantes y liga cada
//! referencia a su símbolo. El resultado no modifica el AST: queda en
//! tablas laterales indexadas por [`NodeId`].

use std::{
    collections::{hash_map::Entry, HashMap},
    rc::Rc,
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::{ArithOp, Ast, Condition, Declaration, Expr, ExprKind, NodeId, Statement, TypeExpr, TypeExprKind},
    error::InternalError,
    lex::Identifier,
    source::{Located, Location},
};

pub mod symtab;
pub mod types;

use symtab::{Kind, Scope, Symbol, SymbolTable};
use types::{Primitive, Type, MAX_STORAGE};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Symbol `{0}` is already defined in this scope")]
    Redefinition(Identifier),

    #[error("Symbol `{0}` is undefined")]
    Undefined(Identifier),

    #[error("Expression is not a compile-time constant")]
    NonConstantExpression,

    #[error("`{0}` does not name a type")]
    UnknownType(Identifier),

    #[error("Division by zero in constant expression")]
    DivisionByZero,

    #[error("Invalid array length {0}, must be positive")]
    InvalidArrayLength(i64),

    #[error("Declared storage exceeds {} bytes", MAX_STORAGE)]
    StorageOverflow,

    #[error("Type `{0}` cannot be used as a value")]
    NotAValue(Identifier),

    #[error("Constant `{0}` cannot be assigned to")]
    NotAssignable(Identifier),

    #[error("Type mismatch: expected an array, found `{0}`")]
    NotAnArray(Rc<Type>),

    #[error("Type mismatch: expected a record, found `{0}`")]
    NotARecord(Rc<Type>),

    #[error("Type mismatch: expected `INTEGER` or `CHAR`, found `{0}`")]
    ExpectedScalar(Rc<Type>),

    #[error("Record has no field named `{0}`")]
    UnknownField(Identifier),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Información asociada a nodos del AST por el análisis semántico.
///
/// Cada anotación se escribe a lo sumo una vez por nodo.
#[derive(Debug, Default)]
pub struct Annotations {
    types: HashMap<NodeId, Rc<Type>>,
    constants: HashMap<NodeId, i64>,
    symbols: HashMap<NodeId, Rc<Symbol>>,
}

impl Annotations {
    /// Tipo resuelto de una expresión o expresión de tipo.
    pub fn type_of(&self, node: NodeId) -> Result<&Rc<Type>, InternalError> {
        self.types
            .get(&node)
            .ok_or(InternalError::MissingAnnotation("type"))
    }

    /// Valor plegado, si el nodo es constante.
    pub fn constant(&self, node: NodeId) -> Option<i64> {
        self.constants.get(&node).copied()
    }

    /// Símbolo al que hace referencia una variable o campo.
    pub fn symbol(&self, node: NodeId) -> Result<&Rc<Symbol>, InternalError> {
        self.symbols
            .get(&node)
            .ok_or(InternalError::MissingAnnotation("symbol"))
    }
}

fn annotate<V>(
    map: &mut HashMap<NodeId, V>,
    node: NodeId,
    value: V,
    what: &'static str,
) -> Result<(), InternalError> {
    match map.entry(node) {
        Entry::Occupied(_) => Err(InternalError::Reannotated(what)),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

/// Resultado del análisis semántico.
pub struct Resolved {
    pub globals: Scope,
    pub annotations: Annotations,
}

impl Ast {
    pub fn resolve(&self) -> Semantic<Resolved> {
        let mut globals = SymbolTable::global();
        let mut annotations = Annotations::default();

        let mut builder = Builder {
            scope: &mut globals,
            annotations: &mut annotations,
            integer: Rc::new(Type::Primitive(Primitive::Integer)),
            char: Rc::new(Type::Primitive(Primitive::Char)),
        };

        for declaration in &self.declarations {
            builder.declaration(declaration)?;
        }

        builder.statements(&self.instructions)?;

        Ok(Resolved {
            globals: globals.into_scope(),
            annotations,
        })
    }
}

struct Builder<'b, 'a> {
    scope: &'b mut SymbolTable<'a>,
    annotations: &'b mut Annotations,
    integer: Rc<Type>,
    char: Rc<Type>,
}

impl Builder<'_, '_> {
    fn declaration(&mut self, declaration: &Declaration) -> Semantic<()> {
        match declaration {
            Declaration::Const { name, value } => {
                self.expr(value)?;
                let folded = self.constant(value)?;

                let integer = Rc::clone(&self.integer);
                self.scope.insert(name, Kind::Constant, integer, Some(folded))?;
            }

            Declaration::Type { name, of } => {
                let typ = self.typ(of)?;
                self.scope.insert(name, Kind::Type, typ, None)?;
            }

            Declaration::Var { names, of } => {
                let typ = self.typ(of)?;
                for name in names {
                    self.scope.insert(name, Kind::Variable, Rc::clone(&typ), None)?;
                }
            }
        }

        Ok(())
    }

    fn typ(&mut self, of: &TypeExpr) -> Semantic<Rc<Type>> {
        let typ = match &of.kind {
            TypeExprKind::Named(name) => match Primitive::by_name(name.as_ref()) {
                Some(Primitive::Integer) => Rc::clone(&self.integer),
                Some(Primitive::Char) => Rc::clone(&self.char),

                None => match self.scope.lookup(name) {
                    Some(symbol) if symbol.kind() == Kind::Type => Rc::clone(symbol.typ()),
                    _ => return fail(SemanticError::UnknownType(name.clone()), &of.location),
                },
            },

            TypeExprKind::Array { length, element } => {
                self.expr(length)?;
                let length_value = self.constant(length)?;
                let element = self.typ(element)?;

                if length_value <= 0 {
                    return fail(SemanticError::InvalidArrayLength(length_value), &length.location);
                }

                match Type::array(length_value as u64, element) {
                    Some(array) => Rc::new(array),
                    None => return fail(SemanticError::StorageOverflow, &of.location),
                }
            }

            TypeExprKind::Record(fields) => {
                let mut nested = self.scope.nested();
                let mut builder = Builder {
                    scope: &mut nested,
                    annotations: &mut *self.annotations,
                    integer: Rc::clone(&self.integer),
                    char: Rc::clone(&self.char),
                };

                for field in fields {
                    builder.declaration(field)?;
                }

                Rc::new(Type::Record(Rc::new(nested.into_scope())))
            }
        };

        self.annotate_type(of.id, &of.location, Rc::clone(&typ))?;
        Ok(typ)
    }

    fn statements(&mut self, statements: &[Statement]) -> Semantic<()> {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement))
    }

    fn statement(&mut self, statement: &Statement) -> Semantic<()> {
        match statement {
            Statement::Assign { target, value } => {
                self.assignable(target)?;
                self.scalar(value)?;
            }

            Statement::If { condition, then } => {
                self.condition(condition)?;
                self.statements(then)?;
            }

            Statement::IfElse {
                condition,
                then,
                otherwise,
            } => {
                self.condition(condition)?;
                self.statements(then)?;
                self.statements(otherwise)?;
            }

            Statement::While { condition, body } => {
                self.condition(condition)?;
                self.statements(body)?;
            }

            Statement::Repeat { body, condition } => {
                self.statements(body)?;
                self.condition(condition)?;
            }

            Statement::Read(target) => self.assignable(target)?,

            Statement::Write(value) => self.scalar(value)?,
        }

        Ok(())
    }

    fn condition(&mut self, condition: &Condition) -> Semantic<()> {
        self.scalar(&condition.lhs)?;
        self.scalar(&condition.rhs)
    }

    /// Un destino de asignación o de `READ`.
    fn assignable(&mut self, target: &Expr) -> Semantic<()> {
        self.scalar(target)?;

        let mut root = target;
        loop {
            root = match &root.kind {
                ExprKind::Element { array, .. } => array,
                ExprKind::Field { record, .. } => record,
                _ => break,
            };
        }

        if let ExprKind::Var(name) = &root.kind {
            let symbol = self.annotations.symbol(root.id).map_err(|error| {
                Located::at(SemanticError::from(error), root.location.clone())
            })?;

            if symbol.kind() == Kind::Constant {
                return fail(SemanticError::NotAssignable(name.clone()), &target.location);
            }
        }

        Ok(())
    }

    /// Una expresión que debe producir un valor primitivo.
    fn scalar(&mut self, expr: &Expr) -> Semantic<()> {
        let typ = self.expr(expr)?;
        if typ.is_primitive() {
            Ok(())
        } else {
            fail(SemanticError::ExpectedScalar(typ), &expr.location)
        }
    }

    fn expr(&mut self, expr: &Expr) -> Semantic<Rc<Type>> {
        let (typ, value) = match &expr.kind {
            ExprKind::Int(value) => (Rc::clone(&self.integer), Some(*value)),

            ExprKind::Var(name) => {
                let symbol = match self.scope.lookup(name) {
                    Some(symbol) => Rc::clone(symbol),
                    None => return fail(SemanticError::Undefined(name.clone()), &expr.location),
                };

                if symbol.kind() == Kind::Type {
                    return fail(SemanticError::NotAValue(name.clone()), &expr.location);
                }

                let typ = Rc::clone(symbol.typ());
                let value = symbol.value();

                self.annotate_symbol(expr, symbol)?;
                (typ, value)
            }

            ExprKind::Element { array, index } => {
                let array_type = self.expr(array)?;
                self.scalar(index)?;

                match &*array_type {
                    Type::Array { element, .. } => (Rc::clone(element), None),
                    _ => return fail(SemanticError::NotAnArray(array_type), &array.location),
                }
            }

            ExprKind::Field { record, field } => {
                let record_type = self.expr(record)?;
                let fields = match &*record_type {
                    Type::Record(fields) => fields,
                    _ => return fail(SemanticError::NotARecord(record_type), &record.location),
                };

                let symbol = match fields.get(field.as_ref()) {
                    Some(symbol) => Rc::clone(symbol),
                    None => {
                        let error = SemanticError::UnknownField(field.as_ref().clone());
                        return fail(error, field.location());
                    }
                };

                let typ = Rc::clone(symbol.typ());
                self.annotate_symbol(expr, symbol)?;
                (typ, None)
            }

            ExprKind::Binary { op, lhs, rhs } => {
                self.scalar(lhs)?;
                self.scalar(rhs)?;

                let lhs = self.annotations.constant(lhs.id);
                let rhs = self.annotations.constant(rhs.id);

                let value = match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => match fold(*op, lhs, rhs) {
                        Some(value) => {
                            trace!("folded {} {} {} = {}", lhs, op, rhs, value);
                            Some(value)
                        }

                        None => return fail(SemanticError::DivisionByZero, &expr.location),
                    },

                    _ => None,
                };

                (Rc::clone(&self.integer), value)
            }
        };

        if let Some(value) = value {
            annotate(&mut self.annotations.constants, expr.id, value, "constant value")
                .map_err(|error| Located::at(error.into(), expr.location.clone()))?;
        }

        self.annotate_type(expr.id, &expr.location, Rc::clone(&typ))?;
        Ok(typ)
    }

    /// Exige que una expresión ya recorrida sea constante.
    fn constant(&self, expr: &Expr) -> Semantic<i64> {
        match self.annotations.constant(expr.id) {
            Some(value) => Ok(value),
            None => fail(SemanticError::NonConstantExpression, &expr.location),
        }
    }

    fn annotate_type(&mut self, node: NodeId, location: &Location, typ: Rc<Type>) -> Semantic<()> {
        annotate(&mut self.annotations.types, node, typ, "type")
            .map_err(|error| Located::at(error.into(), location.clone()))
    }

    fn annotate_symbol(&mut self, expr: &Expr, symbol: Rc<Symbol>) -> Semantic<()> {
        debug!("{} at {} resolves to `{}`", expr.kind.describe(), expr.location, symbol.name());

        annotate(&mut self.annotations.symbols, expr.id, symbol, "symbol")
            .map_err(|error| Located::at(error.into(), expr.location.clone()))
    }
}

/// Aritmética de 64 bits en complemento a dos con división truncada.
/// Retorna `None` ante una división entre cero.
pub fn fold(op: ArithOp, lhs: i64, rhs: i64) -> Option<i64> {
    match op {
        ArithOp::Add => Some(lhs.wrapping_add(rhs)),
        ArithOp::Sub => Some(lhs.wrapping_sub(rhs)),
        ArithOp::Mul => Some(lhs.wrapping_mul(rhs)),
        ArithOp::Div if rhs != 0 => Some(lhs.wrapping_div(rhs)),
        ArithOp::Mod if rhs != 0 => Some(lhs.wrapping_rem(rhs)),
        ArithOp::Div | ArithOp::Mod => None,
    }
}

fn fail<T>(error: SemanticError, location: &Location) -> Semantic<T> {
    Err(Located::at(error, location.clone()))
}
