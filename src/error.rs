//! Reporte de errores.
//!
//! Toda condición de error detectada por el compilador es fatal: se
//! reporta exactamente un error y la compilación se detiene. Los errores
//! que conocen su posición original se muestran con un extracto del
//! código fuente.

use crate::{
    ir::Label,
    source::{Located, Location},
};

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

mod sealed {
    pub trait Sealed {}
}

/// Un error con ubicación conocida en el código fuente.
pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Violación de contrato entre fases del compilador.
///
/// Estos errores no son culpa del programa de entrada, sino de una
/// fase que le entregó a otra una estructura que esta no sabe manejar.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("Internal error: {0} is not supported by code generation")]
    Unsupported(&'static str),

    #[error("Internal error: node is missing its {0} annotation")]
    MissingAnnotation(&'static str),

    #[error("Internal error: node was annotated twice with its {0}")]
    Reannotated(&'static str),

    #[error("Internal error: {0} is not an lvalue")]
    NotAnLvalue(&'static str),

    #[error("Internal error: operand `{0}` has no machine location")]
    BadOperand(String),

    #[error("Internal error: label `{0}` is undefined")]
    UndefinedLabel(Label),
}

/// Mensaje de diagnóstico para un único error fatal.
pub struct Diagnostics {
    kind: &'static str,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.kind, self.error.source())
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            kind: "Error",
            error: Box::new(error),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, error } = self;

        let location = error.location();
        writeln!(fmt, "{}: {}: {}", location, kind, error.source())?;

        let line_number = location.start().line();
        let line = match location.source().line(line_number) {
            Some(line) => line,
            None => return writeln!(fmt, "Build failed"),
        };

        let digits = line_number.to_string().chars().count();
        writeln!(fmt, "{:digits$} |", "", digits = digits)?;
        writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)?;

        let from = location.start().column();
        let to = if location.end().line() == line_number {
            location.end().column().max(from + 1)
        } else {
            from + 1
        };

        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = (from - 1) as usize,
            highlight = (to - from) as usize
        )?;

        writeln!(fmt)?;
        writeln!(fmt, "Build failed")
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    #[test]
    fn renders_location_message_and_excerpt() {
        let source = Source::from_text("VAR a: FOO;", "bad.pas");
        let error = Located::at(InternalError::Unsupported("this"), source.start());

        let rendered = Diagnostics::from(error).kind("Semantic error").to_string();
        let mut lines = rendered.lines();

        assert_eq!(
            lines.next(),
            Some("bad.pas:1:1: Semantic error: Internal error: this is not supported by code generation")
        );
        assert_eq!(lines.next(), Some("  |"));
        assert_eq!(lines.next(), Some("1 | VAR a: FOO;"));
        assert_eq!(lines.next(), Some("  | ^"));
        assert!(rendered.ends_with("Build failed\n"));
    }
}
