//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`Source`]
//! en unidades léxicas denominadas tokens. Los espacios en blanco y los
//! comentarios se descartan durante esta operación. Cada token emitido
//! está asociado a una ubicación en el código fuente original.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje es case-insensitive: tanto `while` como `WHILE` y
//!   `While` resultan en [`Keyword::While`], y `count` y `COUNT` son el
//!   mismo identificador.
//! - Los comentarios son `(* ... *)` o `{ ... }` y no se anidan.
//! - Las constantes enteras son no negativas y caben en 64 bits.
//!
//! # Errores
//! El primer error léxico detiene el análisis.

use crate::source::{Located, Location, Source};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
};

use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", i64::MAX)]
    IntOverflow,

    /// Comentario sin cerrar al final del archivo.
    #[error("Unterminated comment")]
    UnterminatedComment,
}

pub type Lex<T> = Result<T, Located<LexerError>>;

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<NoCase<String>>);

impl Identifier {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Identifier(Rc::new(NoCase::new(name.into())))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_ref())
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i64),

    /// `:=`
    Assign,

    /// `:`
    Colon,

    /// `;`
    Semicolon,

    /// `,`
    Comma,

    /// `.`
    Period,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `%`
    Percent,

    /// `=`
    Equal,

    /// `#` o `<>`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Assign => fmt.write_str("`:=`"),
            Colon => fmt.write_str("`:`"),
            Semicolon => fmt.write_str("`;`"),
            Comma => fmt.write_str("`,`"),
            Period => fmt.write_str("`.`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            Percent => fmt.write_str("`%`"),
            Equal => fmt.write_str("`=`"),
            NotEqual => fmt.write_str("`#`"),
            Less => fmt.write_str("`<`"),
            LessOrEqual => fmt.write_str("`<=`"),
            Greater => fmt.write_str("`>`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Program,
    Const,
    Type,
    Var,
    Array,
    Of,
    Record,
    Begin,
    End,
    If,
    Then,
    Else,
    While,
    Do,
    Repeat,
    Until,
    Read,
    Write,
    Div,
    Mod,
}

impl Keyword {
    const ALL: [Keyword; 20] = [
        Keyword::Program,
        Keyword::Const,
        Keyword::Type,
        Keyword::Var,
        Keyword::Array,
        Keyword::Of,
        Keyword::Record,
        Keyword::Begin,
        Keyword::End,
        Keyword::If,
        Keyword::Then,
        Keyword::Else,
        Keyword::While,
        Keyword::Do,
        Keyword::Repeat,
        Keyword::Until,
        Keyword::Read,
        Keyword::Write,
        Keyword::Div,
        Keyword::Mod,
    ];

    fn lookup(word: &str) -> Option<Keyword> {
        Keyword::ALL
            .iter()
            .copied()
            .find(|keyword| unicase::eq_ascii(keyword.as_str(), word))
    }

    fn as_str(self) -> &'static str {
        use Keyword::*;

        match self {
            Program => "PROGRAM",
            Const   => "CONST",
            Type    => "TYPE",
            Var     => "VAR",
            Array   => "ARRAY",
            Of      => "OF",
            Record  => "RECORD",
            Begin   => "BEGIN",
            End     => "END",
            If      => "IF",
            Then    => "THEN",
            Else    => "ELSE",
            While   => "WHILE",
            Do      => "DO",
            Repeat  => "REPEAT",
            Until   => "UNTIL",
            Read    => "READ",
            Write   => "WRITE",
            Div     => "DIV",
            Mod     => "MOD",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Escáner de tokens.
pub struct Lexer<I: Iterator<Item = (char, Location)>> {
    input: Peekable<I>,
    last: Option<Location>,
}

impl<I: Iterator<Item = (char, Location)>> Lexer<I> {
    pub fn new(input: I) -> Self {
        Lexer {
            input: input.peekable(),
            last: None,
        }
    }

    /// Consume toda la entrada, deteniéndose en el primer error.
    pub fn try_exhaustive(self) -> Lex<Vec<Located<Token>>> {
        self.collect()
    }

    fn token(&mut self) -> Option<Lex<Located<Token>>> {
        loop {
            let (c, start) = self.input.next()?;
            self.last = Some(start.clone());

            let token = match c {
                c if c.is_whitespace() => continue,

                '{' => match self.skip_until(|c| c == '}') {
                    Ok(()) => continue,
                    Err(()) => return Some(self.fail(LexerError::UnterminatedComment, start)),
                },

                '(' if self.next_is('*') => {
                    let mut star = false;
                    let closed = self.skip_until(|c| {
                        let close = star && c == ')';
                        star = c == '*';
                        close
                    });

                    match closed {
                        Ok(()) => continue,
                        Err(()) => return Some(self.fail(LexerError::UnterminatedComment, start)),
                    }
                }

                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut word = String::from(c);
                    while let Some(c) = self.next_if(|c| c.is_ascii_alphanumeric() || c == '_') {
                        word.push(c);
                    }

                    match Keyword::lookup(&word) {
                        Some(keyword) => Token::Keyword(keyword),
                        None => Token::Id(Identifier::new(word)),
                    }
                }

                c if c.is_ascii_digit() => {
                    let mut value = Some(c.to_digit(10).unwrap_or(0) as i64);
                    while let Some(digit) = self.next_if(|c| c.is_ascii_digit()) {
                        let digit = digit.to_digit(10).unwrap_or(0) as i64;
                        value = value
                            .and_then(|value| value.checked_mul(10))
                            .and_then(|value| value.checked_add(digit));
                    }

                    match value {
                        Some(value) => Token::IntLiteral(value),
                        None => return Some(self.fail(LexerError::IntOverflow, start)),
                    }
                }

                ':' if self.next_is('=') => Token::Assign,
                ':' => Token::Colon,
                ';' => Token::Semicolon,
                ',' => Token::Comma,
                '.' => Token::Period,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Times,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '=' => Token::Equal,
                '#' => Token::NotEqual,
                '<' if self.next_is('=') => Token::LessOrEqual,
                '<' if self.next_is('>') => Token::NotEqual,
                '<' => Token::Less,
                '>' if self.next_is('=') => Token::GreaterOrEqual,
                '>' => Token::Greater,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                '[' => Token::OpenSquare,
                ']' => Token::CloseSquare,

                c => return Some(self.fail(LexerError::BadChar(c), start)),
            };

            let location = match &self.last {
                Some(last) => Location::span(start, last),
                None => start,
            };

            return Some(Ok(Located::at(token, location)));
        }
    }

    fn next_is(&mut self, expected: char) -> bool {
        self.next_if(|c| c == expected).is_some()
    }

    fn next_if<F: FnOnce(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        let (c, location) = self.input.next_if(|(c, _)| predicate(*c))?;
        self.last = Some(location);

        Some(c)
    }

    fn skip_until<F>(&mut self, mut end: F) -> Result<(), ()>
    where
        F: FnMut(char) -> bool,
    {
        for (c, _) in &mut self.input {
            if end(c) {
                return Ok(());
            }
        }

        Err(())
    }

    fn fail<T>(&mut self, error: LexerError, location: Location) -> Lex<T> {
        // Tras un error no se emiten más tokens
        self.input.by_ref().for_each(drop);
        Err(Located::at(error, location))
    }
}

impl<I: Iterator<Item = (char, Location)>> Iterator for Lexer<I> {
    type Item = Lex<Located<Token>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token()
    }
}

/// Conveniencia: tokeniza un [`Source`] completo.
pub fn tokenize(source: &Rc<Source>) -> Lex<Vec<Located<Token>>> {
    Lexer::new(source.chars()).try_exhaustive()
}
