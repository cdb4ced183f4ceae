//! Tablas de símbolos.
//!
//! Cada [`SymbolTable`] envuelve un [`Scope`] propio y una referencia
//! opcional al ámbito que lo contiene. La búsqueda recorre la cadena
//! hacia afuera, de modo que un nombre local oculta a uno externo.

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Display},
    rc::Rc,
};

use log::debug;

use super::{
    types::{Type, MAX_STORAGE},
    Semantic, SemanticError,
};
use crate::{lex::Identifier, source::Located};

/// Clase de declaración que introdujo un símbolo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    Variable,
    Constant,
    Type,
}

impl Display for Kind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Variable => fmt.write_str("VAR"),
            Kind::Constant => fmt.write_str("CONST"),
            Kind::Type => fmt.write_str("TYPE"),
        }
    }
}

#[derive(Debug)]
pub struct Symbol {
    name: Identifier,
    kind: Kind,
    typ: Rc<Type>,
    offset: u64,
    value: Option<i64>,
}

impl Symbol {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn typ(&self) -> &Rc<Type> {
        &self.typ
    }

    /// Desplazamiento en bytes desde la base del almacenamiento del ámbito.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Valor precalculado, solo para constantes.
    pub fn value(&self) -> Option<i64> {
        self.value
    }
}

/// Símbolos de un único ámbito, en orden de declaración.
#[derive(Debug)]
pub struct Scope {
    symbols: Vec<Rc<Symbol>>,
    index: HashMap<Identifier, usize>,
    size: u64,
    depth: u32,
}

impl Scope {
    fn new(depth: u32) -> Self {
        Scope {
            symbols: Vec::new(),
            index: HashMap::new(),
            size: 0,
            depth,
        }
    }

    pub fn symbols(&self) -> &[Rc<Symbol>] {
        &self.symbols
    }

    pub fn get(&self, name: &Identifier) -> Option<&Rc<Symbol>> {
        self.index.get(name).map(|&index| &self.symbols[index])
    }

    /// Total de bytes asignados, que también es el siguiente desplazamiento libre.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Profundidad de anidamiento; el ámbito global es 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    fn dump(&self, fmt: &mut fmt::Formatter<'_>, shown: &mut HashSet<*const Scope>) -> fmt::Result {
        for symbol in &self.symbols {
            // Los campos de un registro preceden a su primer uso
            dump_fields(symbol.typ(), fmt, shown)?;

            writeln!(
                fmt,
                "{},{},{},{}",
                self.depth, symbol.kind, symbol.name, symbol.typ
            )?;
        }

        Ok(())
    }
}

fn dump_fields(
    typ: &Type,
    fmt: &mut fmt::Formatter<'_>,
    shown: &mut HashSet<*const Scope>,
) -> fmt::Result {
    match typ {
        Type::Primitive(_) => Ok(()),
        Type::Array { element, .. } => dump_fields(element, fmt, shown),

        Type::Record(fields) => {
            if shown.insert(Rc::as_ptr(fields)) {
                fields.dump(fmt, shown)
            } else {
                Ok(())
            }
        }
    }
}

impl Display for Scope {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(fmt, &mut HashSet::new())
    }
}

pub struct SymbolTable<'a> {
    scope: Scope,
    outer: Option<&'a SymbolTable<'a>>,
}

impl SymbolTable<'static> {
    pub fn global() -> Self {
        SymbolTable {
            scope: Scope::new(0),
            outer: None,
        }
    }
}

impl<'a> SymbolTable<'a> {
    /// Abre un ámbito anidado cuyo padre es `self`.
    pub fn nested<'b>(&'b self) -> SymbolTable<'b> {
        SymbolTable {
            scope: Scope::new(self.scope.depth + 1),
            outer: Some(self),
        }
    }

    /// Declara un símbolo en el ámbito actual y le asigna el siguiente
    /// desplazamiento disponible.
    pub fn insert(
        &mut self,
        name: &Located<Identifier>,
        kind: Kind,
        typ: Rc<Type>,
        value: Option<i64>,
    ) -> Semantic<Rc<Symbol>> {
        let id = name.as_ref();
        if self.scope.index.contains_key(id) {
            let error = SemanticError::Redefinition(id.clone());
            return Err(Located::at(error, name.location().clone()));
        }

        let offset = self.scope.size;
        self.scope.size = offset
            .checked_add(typ.size())
            .filter(|&size| size <= MAX_STORAGE)
            .ok_or_else(|| Located::at(SemanticError::StorageOverflow, name.location().clone()))?;

        debug!(
            "{} `{}` at depth {}, offset {}, type {}",
            kind, id, self.scope.depth, offset, typ
        );

        let symbol = Rc::new(Symbol {
            name: id.clone(),
            kind,
            typ,
            offset,
            value,
        });

        self.scope.index.insert(id.clone(), self.scope.symbols.len());
        self.scope.symbols.push(Rc::clone(&symbol));

        Ok(symbol)
    }

    /// Busca primero en el ámbito actual y luego en los externos.
    pub fn lookup(&self, name: &Identifier) -> Option<&Rc<Symbol>> {
        self.scope
            .get(name)
            .or_else(|| self.outer.and_then(|outer| outer.lookup(name)))
    }

    pub fn lookup_local(&self, name: &Identifier) -> Option<&Rc<Symbol>> {
        self.scope.get(name)
    }

    pub fn into_scope(self) -> Scope {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{semantic::types::Primitive, source::Source};

    fn located(name: &str) -> Located<Identifier> {
        let source = Source::from_text(name, "t.pas");
        Located::at(Identifier::new(name), source.start())
    }

    fn integer() -> Rc<Type> {
        Rc::new(Type::Primitive(Primitive::Integer))
    }

    #[test]
    fn offsets_follow_sizes() {
        let mut table = SymbolTable::global();
        let char = Rc::new(Type::Primitive(Primitive::Char));

        let a = table.insert(&located("a"), Kind::Variable, char, None).unwrap();
        let b = table.insert(&located("b"), Kind::Variable, integer(), None).unwrap();
        let c = table.insert(&located("c"), Kind::Variable, integer(), None).unwrap();

        assert_eq!((a.offset(), b.offset(), c.offset()), (0, 1, 9));
        assert_eq!(table.into_scope().size(), 17);
    }

    #[test]
    fn redefinition_in_same_scope() {
        let mut table = SymbolTable::global();
        table.insert(&located("x"), Kind::Variable, integer(), None).unwrap();

        let error = table
            .insert(&located("X"), Kind::Constant, integer(), Some(1))
            .unwrap_err();

        assert!(matches!(error.val(), SemanticError::Redefinition(_)));
    }

    #[test]
    fn storage_is_bounded() {
        let mut table = SymbolTable::global();
        let char = Rc::new(Type::Primitive(Primitive::Char));
        let half = Rc::new(Type::array(1 << 30, char).unwrap());

        table.insert(&located("a"), Kind::Variable, Rc::clone(&half), None).unwrap();
        let error = table
            .insert(&located("b"), Kind::Variable, Rc::clone(&half), None)
            .unwrap_err();

        assert!(matches!(error.val(), SemanticError::StorageOverflow));

        // El símbolo rechazado no ocupa espacio
        let c = table.insert(&located("c"), Kind::Variable, integer(), None).unwrap();
        assert_eq!(c.offset(), 1 << 30);
        assert!(table.lookup_local(&Identifier::new("b")).is_none());
    }

    #[test]
    fn nested_scope_shadows_and_falls_back() {
        let mut outer = SymbolTable::global();
        outer.insert(&located("x"), Kind::Variable, integer(), None).unwrap();
        outer.insert(&located("y"), Kind::Constant, integer(), Some(3)).unwrap();

        let mut inner = outer.nested();
        inner.insert(&located("x"), Kind::Variable, integer(), None).unwrap();

        let x = Identifier::new("x");
        let y = Identifier::new("y");

        assert_eq!(inner.lookup(&x).unwrap().offset(), 0);
        assert!(inner.lookup_local(&y).is_none());
        assert_eq!(inner.lookup(&y).unwrap().value(), Some(3));
        assert!(inner.lookup(&Identifier::new("z")).is_none());
    }

    #[test]
    fn dump_prints_record_fields_first() {
        let mut outer = SymbolTable::global();

        let mut fields = outer.nested();
        fields.insert(&located("f"), Kind::Variable, integer(), None).unwrap();
        fields
            .insert(&located("g"), Kind::Variable, Rc::new(Type::Primitive(Primitive::Char)), None)
            .unwrap();

        let record = Rc::new(Type::Record(Rc::new(fields.into_scope())));
        outer.insert(&located("r"), Kind::Variable, Rc::clone(&record), None).unwrap();
        outer.insert(&located("s"), Kind::Variable, record, None).unwrap();

        let scope = outer.into_scope();
        assert_eq!(scope.size(), 18);
        assert_eq!(
            scope.to_string(),
            "1,VAR,f,INTEGER\n\
             1,VAR,g,CHAR\n\
             0,VAR,r,RECORD (INTEGER x CHAR)\n\
             0,VAR,s,RECORD (INTEGER x CHAR)\n"
        );
    }
}
