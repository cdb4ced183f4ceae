//! Rastreo de ubicaciones originales en código fuente.
//!
//! Todo lo que el compilador reporta como error debe poder señalar
//! un archivo, una línea y una columna. Los tokens, los nodos del AST
//! y los errores de cada fase llevan consigo una [`Location`].

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    rc::Rc,
};

/// Columnas por tabulador.
const TAB_STOP: u32 = 4;

/// Valor acompañado del lugar del código fuente de donde proviene.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Texto fuente completo junto con su nombre de origen.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Lee por completo un flujo de entrada.
    pub fn load<R: BufRead, S: Into<String>>(reader: R, name: S) -> io::Result<Rc<Source>> {
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        Ok(Rc::new(Source {
            name: name.into(),
            lines,
        }))
    }

    /// Construye a partir de texto en memoria.
    pub fn from_text<S: Into<String>>(text: &str, name: S) -> Rc<Source> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Nombre del origen, típicamente la ruta del archivo.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtiene una línea por número (base 1).
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        self.lines.get(index).map(String::as_str)
    }

    /// Ubicación de la primera columna del archivo.
    pub fn start(self: &Rc<Self>) -> Location {
        Location::at(self, Position::default())
    }

    /// Ubicación inmediatamente posterior al último carácter.
    pub fn eof(self: &Rc<Self>) -> Location {
        let line = self.lines.len().max(1) as u32;
        let column = self.line(line).map(|text| text.chars().count()).unwrap_or(0) as u32;

        Location::at(
            self,
            Position {
                line,
                column: column + 1,
            },
        )
    }

    /// Itera carácter por carácter, incluyendo un `'\n'` al final
    /// de cada línea. Cada carácter va acompañado de su propia ubicación.
    pub fn chars(self: &Rc<Self>) -> impl Iterator<Item = (char, Location)> + '_ {
        self.lines.iter().enumerate().flat_map(move |(index, line)| {
            let mut here = Position {
                line: index as u32 + 1,
                column: 1,
            };

            line.chars().chain(std::iter::once('\n')).map(move |c| {
                let location = Location::at(self, here);
                here = here.after(c);

                (c, location)
            })
        })
    }
}

/// Rango `[start, end)` dentro de un mismo archivo fuente.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    start: Position,
    end: Position,
}

impl Location {
    fn at(source: &Rc<Source>, start: Position) -> Self {
        let end = Position {
            column: start.column + 1,
            ..start
        };

        Location {
            from: Rc::clone(source),
            start,
            end,
        }
    }

    /// Rango desde el inicio de `from` hasta el final de `to`.
    pub fn span(from: Location, to: &Location) -> Self {
        Location { end: to.end, ..from }
    }

    pub fn start(&self) -> Position {
        self.start
    }

    /// Primera posición fuera del rango.
    pub fn end(&self) -> Position {
        self.end
    }

    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let Position { line, column } = self.start;
        write!(formatter, "{}:{}:{}", self.from.name, line, column)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}..{}", self, self.end.column)
    }
}

/// Línea y columna, ambas con base 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    /// Posición que sigue a un carácter distinto de fin de línea.
    ///
    /// Un tabulador salta a la siguiente columna múltiplo de
    /// [`TAB_STOP`] (más uno).
    fn after(self, c: char) -> Position {
        let column = match c {
            '\t' => (self.column - 1) / TAB_STOP * TAB_STOP + TAB_STOP + 1,
            _ => self.column + 1,
        };

        Position { column, ..self }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}
