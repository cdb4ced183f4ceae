//! Sistema de tipos.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use super::symtab::Scope;

/// Mayor tamaño de almacenamiento que admiten los desplazamientos de
/// 32 bits del código generado.
pub const MAX_STORAGE: u64 = i32::MAX as u64;

/// Tipos primitivos del lenguaje.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Integer,
    Char,
}

impl Primitive {
    pub fn size(self) -> u64 {
        match self {
            Primitive::Integer => 8,
            Primitive::Char => 1,
        }
    }

    /// Resuelve los nombres reservados `INTEGER` y `CHAR`.
    pub fn by_name(name: &str) -> Option<Primitive> {
        if unicase::eq_ascii(name, "INTEGER") {
            Some(Primitive::Integer)
        } else if unicase::eq_ascii(name, "CHAR") {
            Some(Primitive::Char)
        } else {
            None
        }
    }
}

/// Un tipo resuelto.
///
/// Los tipos se construyen una única vez durante el análisis semántico
/// y a partir de entonces se comparten de forma inmutable.
#[derive(Debug)]
pub enum Type {
    Primitive(Primitive),

    Array { length: u64, element: Rc<Type> },

    /// Un registro es dueño del ámbito que contiene sus campos.
    Record(Rc<Scope>),
}

impl Type {
    /// Construye un arreglo, o `None` si su tamaño excede [`MAX_STORAGE`].
    pub fn array(length: u64, element: Rc<Type>) -> Option<Type> {
        length
            .checked_mul(element.size())
            .filter(|&size| size <= MAX_STORAGE)
            .map(|_| Type::Array { length, element })
    }

    /// Tamaño de almacenamiento en bytes, sin relleno.
    ///
    /// No desborda para tipos construidos mediante [`Type::array`].
    pub fn size(&self) -> u64 {
        match self {
            Type::Primitive(primitive) => primitive.size(),
            Type::Array { length, element } => length * element.size(),
            Type::Record(fields) => fields.size(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(Primitive::Integer) => fmt.write_str("INTEGER"),
            Type::Primitive(Primitive::Char) => fmt.write_str("CHAR"),
            Type::Array { length, element } => write!(fmt, "ARRAY {} OF {}", length, element),

            Type::Record(fields) => {
                fmt.write_str("RECORD (")?;
                for (i, field) in fields.symbols().iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(" x ")?;
                    }

                    write!(fmt, "{}", field.typ())?;
                }

                fmt.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let integer = Rc::new(Type::Primitive(Primitive::Integer));
        let char = Rc::new(Type::Primitive(Primitive::Char));

        assert_eq!(integer.size(), 8);
        assert_eq!(char.size(), 1);

        let matrix = Type::Array {
            length: 3,
            element: Rc::new(Type::Array {
                length: 4,
                element: integer,
            }),
        };

        assert_eq!(matrix.size(), 96);
        assert_eq!(matrix.to_string(), "ARRAY 3 OF ARRAY 4 OF INTEGER");
    }

    #[test]
    fn primitive_names_ignore_case() {
        assert_eq!(Primitive::by_name("integer"), Some(Primitive::Integer));
        assert_eq!(Primitive::by_name("Char"), Some(Primitive::Char));
        assert_eq!(Primitive::by_name("BOOLEAN"), None);
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let integer = Rc::new(Type::Primitive(Primitive::Integer));
        let char = Rc::new(Type::Primitive(Primitive::Char));

        assert!(Type::array(1 << 61, Rc::clone(&integer)).is_none());
        assert!(Type::array(u64::MAX, Rc::clone(&char)).is_none());
        assert!(Type::array(MAX_STORAGE + 1, Rc::clone(&char)).is_none());

        let largest = Type::array(MAX_STORAGE, char).unwrap();
        assert_eq!(largest.size(), MAX_STORAGE);
        assert_eq!(Type::array(4, integer).unwrap().size(), 32);
    }
}
