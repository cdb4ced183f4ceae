//! Análisis sintáctico.
//!
//! Parser de descenso recursivo con un token de lookahead. Cada nodo
//! de expresión, condición o tipo recibe un [`NodeId`] único en orden
//! de construcción.

use std::iter::Peekable;
use thiserror::Error;

use crate::{
    ast::*,
    lex::{Identifier, Keyword, Token},
    source::{Located, Location},
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected any of assignment, `IF`, `WHILE`, `REPEAT`, `READ` or `WRITE`")]
    ExpectedStatement,

    #[error("Expected a type name, `ARRAY` or `RECORD`")]
    ExpectedType,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Expected a relational operator")]
    ExpectedRelOp,

    #[error("Expected `CONST`, `TYPE`, `VAR`, `BEGIN` or `END`")]
    ExpectedDeclaration,

    #[error("Abrupt end of program")]
    UnexpectedEof,

    #[error("Trailing tokens after end of program")]
    TrailingTokens,
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Construye el AST de un programa completo.
///
/// `start` se utiliza para reportar errores cuando no hay ningún token.
pub fn parse<'a, I>(tokens: I, start: Location) -> Parse<Ast>
where
    I: Iterator<Item = &'a Located<Token>>,
{
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        next_id: 0,
    };

    parser.program()
}

struct Parser<'a, I: Iterator<Item = &'a Located<Token>>> {
    tokens: Peekable<I>,
    last_known: Location,
    next_id: u32,
}

impl<'a, I: Iterator<Item = &'a Located<Token>>> Parser<'a, I> {
    fn program(&mut self) -> Parse<Ast> {
        let name = if self.accept_keyword(Keyword::Program) {
            let name = self.id()?;
            self.expect(Token::Semicolon)?;
            Some(name)
        } else {
            None
        };

        let declarations = self.declarations()?;

        let instructions = if self.accept_keyword(Keyword::Begin) {
            self.instructions()?
        } else {
            Vec::new()
        };

        self.keyword(Keyword::End)?;
        self.accept(Token::Period);

        match self.tokens.next() {
            None => Ok(Ast {
                name,
                declarations,
                instructions,
            }),

            Some(token) => {
                self.last_known = token.location().clone();
                self.fail(ParserError::TrailingTokens)
            }
        }
    }

    fn declarations(&mut self) -> Parse<Vec<Declaration>> {
        let mut declarations = Vec::new();

        loop {
            match self.peek() {
                Some(Token::Keyword(Keyword::Const)) => {
                    self.next()?;
                    while self.peek_is_id() {
                        let name = self.id()?;
                        self.expect(Token::Equal)?;
                        let value = self.expr()?;
                        self.expect(Token::Semicolon)?;

                        declarations.push(Declaration::Const { name, value });
                    }
                }

                Some(Token::Keyword(Keyword::Type)) => {
                    self.next()?;
                    while self.peek_is_id() {
                        let name = self.id()?;
                        self.expect(Token::Equal)?;
                        let of = self.typ()?;
                        self.expect(Token::Semicolon)?;

                        declarations.push(Declaration::Type { name, of });
                    }
                }

                Some(Token::Keyword(Keyword::Var)) => {
                    self.next()?;
                    while self.peek_is_id() {
                        declarations.push(self.var_declaration()?);
                    }
                }

                Some(Token::Keyword(Keyword::Begin)) | Some(Token::Keyword(Keyword::End)) => {
                    break Ok(declarations)
                }

                Some(_) => {
                    self.next()?;
                    break self.fail(ParserError::ExpectedDeclaration);
                }

                None => break self.fail(ParserError::UnexpectedEof),
            }
        }
    }

    fn var_declaration(&mut self) -> Parse<Declaration> {
        let names = self.comma_separated(Self::id)?;
        self.expect(Token::Colon)?;
        let of = self.typ()?;
        self.expect(Token::Semicolon)?;

        Ok(Declaration::Var { names, of })
    }

    fn typ(&mut self) -> Parse<TypeExpr> {
        let (location, token) = self.next()?.split();
        let kind = match token {
            Token::Id(name) => TypeExprKind::Named(name),

            Token::Keyword(Keyword::Array) => {
                let length = self.expr()?;
                self.keyword(Keyword::Of)?;
                let element = self.typ()?;

                TypeExprKind::Array {
                    length: Box::new(length),
                    element: Box::new(element),
                }
            }

            Token::Keyword(Keyword::Record) => {
                let mut fields = Vec::new();
                while self.peek_is_id() {
                    fields.push(self.var_declaration()?);
                }

                self.keyword(Keyword::End)?;
                TypeExprKind::Record(fields)
            }

            _ => return self.fail(ParserError::ExpectedType),
        };

        let location = Location::span(location, &self.last_known);
        Ok(TypeExpr {
            id: self.node_id(),
            location,
            kind,
        })
    }

    fn instructions(&mut self) -> Parse<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            if let Some(statement) = self.statement()? {
                statements.push(statement);
            }

            if !self.accept(Token::Semicolon) {
                break Ok(statements);
            }
        }
    }

    fn statement(&mut self) -> Parse<Option<Statement>> {
        let statement = match self.peek() {
            Some(Token::Keyword(Keyword::If)) => self.if_statement()?,
            Some(Token::Keyword(Keyword::While)) => self.while_statement()?,
            Some(Token::Keyword(Keyword::Repeat)) => self.repeat_statement()?,

            Some(Token::Keyword(Keyword::Read)) => {
                self.next()?;
                Statement::Read(self.designator()?)
            }

            Some(Token::Keyword(Keyword::Write)) => {
                self.next()?;
                Statement::Write(self.expr()?)
            }

            Some(Token::Id(_)) => {
                let target = self.designator()?;
                self.expect(Token::Assign)?;
                let value = self.expr()?;

                Statement::Assign { target, value }
            }

            // Instrucción vacía
            Some(Token::Semicolon)
            | Some(Token::Keyword(Keyword::End))
            | Some(Token::Keyword(Keyword::Else))
            | Some(Token::Keyword(Keyword::Until)) => return Ok(None),

            _ => {
                self.next()?;
                return self.fail(ParserError::ExpectedStatement);
            }
        };

        Ok(Some(statement))
    }

    fn if_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::If)?;
        let condition = self.condition()?;
        self.keyword(Keyword::Then)?;
        let then = self.instructions()?;

        let statement = if self.accept_keyword(Keyword::Else) {
            let otherwise = self.instructions()?;
            Statement::IfElse {
                condition,
                then,
                otherwise,
            }
        } else {
            Statement::If { condition, then }
        };

        self.keyword(Keyword::End)?;
        Ok(statement)
    }

    fn while_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::While)?;
        let condition = self.condition()?;
        self.keyword(Keyword::Do)?;
        let body = self.instructions()?;
        self.keyword(Keyword::End)?;

        Ok(Statement::While { condition, body })
    }

    fn repeat_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Repeat)?;
        let body = self.instructions()?;
        self.keyword(Keyword::Until)?;
        let condition = self.condition()?;

        Ok(Statement::Repeat { body, condition })
    }

    fn condition(&mut self) -> Parse<Condition> {
        let lhs = self.expr()?;

        let op = match self.next()?.into_inner() {
            Token::Equal => RelOp::Equal,
            Token::NotEqual => RelOp::NotEqual,
            Token::Less => RelOp::Less,
            Token::LessOrEqual => RelOp::LessOrEqual,
            Token::Greater => RelOp::Greater,
            Token::GreaterOrEqual => RelOp::GreaterOrEqual,
            _ => return self.fail(ParserError::ExpectedRelOp),
        };

        let rhs = self.expr()?;
        let location = Location::span(lhs.location.clone(), &rhs.location);

        Ok(Condition {
            id: self.node_id(),
            location,
            op,
            lhs,
            rhs,
        })
    }

    fn expr(&mut self) -> Parse<Expr> {
        let mut expr = match self.peek() {
            Some(Token::Plus) => {
                self.next()?;
                self.term()?
            }

            Some(Token::Minus) => {
                let minus = self.next()?.location().clone();
                let zero = Expr {
                    id: self.node_id(),
                    location: minus,
                    kind: ExprKind::Int(0),
                };

                let term = self.term()?;
                self.binary(ArithOp::Sub, zero, term)
            }

            _ => self.term()?,
        };

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => break Ok(expr),
            };

            self.next()?;
            let rhs = self.term()?;
            expr = self.binary(op, expr, rhs);
        }
    }

    fn term(&mut self) -> Parse<Expr> {
        let mut term = self.factor()?;

        loop {
            let op = match self.peek() {
                Some(Token::Times) => ArithOp::Mul,
                Some(Token::Slash) | Some(Token::Keyword(Keyword::Div)) => ArithOp::Div,
                Some(Token::Percent) | Some(Token::Keyword(Keyword::Mod)) => ArithOp::Mod,
                _ => break Ok(term),
            };

            self.next()?;
            let rhs = self.factor()?;
            term = self.binary(op, term, rhs);
        }
    }

    fn factor(&mut self) -> Parse<Expr> {
        match self.peek() {
            Some(Token::Id(_)) => return self.designator(),

            Some(Token::OpenParen) => {
                self.next()?;
                let expr = self.expr()?;
                self.expect(Token::CloseParen)?;
                return Ok(expr);
            }

            _ => (),
        }

        let (location, token) = self.next()?.split();
        match token {
            Token::IntLiteral(value) => Ok(Expr {
                id: self.node_id(),
                location,
                kind: ExprKind::Int(value),
            }),

            _ => self.fail(ParserError::ExpectedExpr),
        }
    }

    fn designator(&mut self) -> Parse<Expr> {
        let (start, name) = self.id()?.split();
        let mut designator = Expr {
            id: self.node_id(),
            location: start.clone(),
            kind: ExprKind::Var(name),
        };

        loop {
            let kind = match self.peek() {
                Some(Token::OpenSquare) => {
                    self.next()?;
                    let index = self.expr()?;
                    self.expect(Token::CloseSquare)?;

                    ExprKind::Element {
                        array: Box::new(designator),
                        index: Box::new(index),
                    }
                }

                // `END.` nunca sigue inmediatamente a un designador
                Some(Token::Period) => {
                    self.next()?;
                    let field = self.id()?;

                    ExprKind::Field {
                        record: Box::new(designator),
                        field,
                    }
                }

                _ => break Ok(designator),
            };

            designator = Expr {
                id: self.node_id(),
                location: Location::span(start.clone(), &self.last_known),
                kind,
            };
        }
    }

    fn binary(&mut self, op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
        let location = Location::span(lhs.location.clone(), &rhs.location);
        Expr {
            id: self.node_id(),
            location,
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    fn comma_separated<T, F>(&mut self, mut rule: F) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        let mut items = vec![rule(self)?];
        while self.accept(Token::Comma) {
            items.push(rule(self)?);
        }

        Ok(items)
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        id
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|token| token.as_ref())
    }

    fn peek_is_id(&mut self) -> bool {
        matches!(self.peek(), Some(Token::Id(_)))
    }

    fn accept(&mut self, token: Token) -> bool {
        if self.peek() == Some(&token) {
            // No puede fallar, ya se verificó que hay un token
            let _ = self.next();
            true
        } else {
            false
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        self.accept(Token::Keyword(keyword))
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next()?.split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        match self.next().map(Located::into_inner) {
            Ok(found) if found == token => Ok(()),
            Ok(found) => self.fail(ParserError::UnexpectedToken(token, found)),
            Err(_) => self.fail(ParserError::MissingToken(token)),
        }
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token.clone())
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()))
    }
}
