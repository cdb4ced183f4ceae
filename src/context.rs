//! Orquestación de fases.
//!
//! Una [`Pipeline`] ejecuta en orden todas las fases sobre un único
//! archivo fuente y escribe, según sus [`Options`], la tabla de
//! símbolos, la IR y el ensamblador final.

use std::{
    io::{self, Write},
    rc::Rc,
};

use bitflags::bitflags;
use log::{debug, info};
use thiserror::Error;

use crate::{
    ast::Ast,
    codegen,
    error::{Diagnostics, InternalError},
    ir::{
        cfg::ControlFlowGraph,
        transform::{ConstantPropagation, NaiveRegisterAllocation},
    },
    lex,
    lower::Lowered,
    parse,
    semantic::Resolved,
    source::Source,
};

bitflags! {
    /// Opciones de una compilación.
    pub struct Options: u8 {
        const PRINT_SYMTAB = 0x01;
        const PRINT_IR     = 0x02;
        const OPTIMIZE     = 0x04;
        const COMPILE      = 0x08;
    }
}

/// Causa de que una compilación se detenga.
#[derive(Error, Debug)]
pub enum Failure {
    /// Error reportable con ubicación en el código fuente.
    #[error("{0}")]
    Diagnosed(Diagnostics),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct Pipeline {
    options: Options,
}

impl Pipeline {
    pub fn new(options: Options) -> Self {
        Pipeline { options }
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Compila un programa completo y escribe los resultados pedidos.
    pub fn run<W: Write>(&self, source: &Rc<Source>, output: &mut W) -> Result<(), Failure> {
        let (ast, resolved) = self.front_end(source)?;
        if self.options.contains(Options::PRINT_SYMTAB) {
            write!(output, "{}", resolved.globals)?;
        }

        let lowered = self.back_end(&ast, &resolved)?;
        if self.options.contains(Options::PRINT_IR) {
            write!(output, "{}", lowered.code)?;
        }

        if self.options.contains(Options::COMPILE) {
            let assembly = codegen::emit(&lowered)?;
            write!(output, "{}", assembly)?;
        }

        output.flush()?;
        Ok(())
    }

    /// Ejecuta las fases hasta la IR final, optimizada o no.
    pub fn lower(&self, source: &Rc<Source>) -> Result<Lowered, Failure> {
        let (ast, resolved) = self.front_end(source)?;
        self.back_end(&ast, &resolved)
    }

    /// Análisis léxico, sintáctico y semántico.
    pub fn front_end(&self, source: &Rc<Source>) -> Result<(Ast, Resolved), Failure> {
        let tokens = lex::tokenize(source)
            .map_err(|error| Failure::Diagnosed(Diagnostics::from(error).kind("Lexical error")))?;

        debug!("{} tokens in {}", tokens.len(), source.name());

        let ast = parse::parse(tokens.iter(), source.start())
            .map_err(|error| Failure::Diagnosed(Diagnostics::from(error).kind("Syntax error")))?;

        let resolved = ast
            .resolve()
            .map_err(|error| Failure::Diagnosed(Diagnostics::from(error).kind("Semantic error")))?;

        Ok((ast, resolved))
    }

    fn back_end(&self, ast: &Ast, resolved: &Resolved) -> Result<Lowered, Failure> {
        let mut lowered = ast
            .lower(resolved)
            .map_err(|error| Failure::Diagnosed(Diagnostics::from(error).kind("Internal error")))?;

        if self.options.contains(Options::OPTIMIZE) {
            let cfg = ControlFlowGraph::build(&lowered.code)?;
            info!("optimizing {} basic blocks", cfg.blocks().len());

            lowered.code = cfg
                .transform(&mut NaiveRegisterAllocation)
                .transform(&mut ConstantPropagation)
                .flatten();
        }

        Ok(lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, options: Options) -> Result<String, Failure> {
        let source = Source::from_text(text, "test.pas");
        let mut output = Vec::new();

        Pipeline::new(options).run(&source, &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn nothing_requested_prints_nothing() {
        let output = run("VAR a: INTEGER; BEGIN a := 1 END.", Options::empty()).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn symtab_then_ir() {
        let output = run(
            "CONST x = 2 + 3; VAR a: INTEGER; BEGIN a := x END.",
            Options::PRINT_SYMTAB | Options::PRINT_IR,
        )
        .unwrap();

        assert_eq!(
            output,
            "0,CONST,x,INTEGER\n\
             0,VAR,a,INTEGER\n\
             \tldci vr1, $5\n\
             \tmov vr0, vr1\n"
        );
    }

    #[test]
    fn optimized_ir_propagates_into_moves() {
        let output = run(
            "VAR a: INTEGER; BEGIN a := 10; WRITE a END.",
            Options::PRINT_IR | Options::OPTIMIZE,
        )
        .unwrap();

        assert_eq!(output, "\tldci vr1, $10\n\tmov vr0, $10\n\twritei vr0\n");
    }

    #[test]
    fn failures_are_classified() {
        let error = run("VAR a: INTEGER; BEGIN b := 1 END.", Options::COMPILE).unwrap_err();
        match error {
            Failure::Diagnosed(diagnostics) => {
                let text = diagnostics.to_string();
                assert!(text.starts_with("test.pas:1:23: Semantic error: "), "{}", text);
            }

            other => panic!("unexpected failure: {}", other),
        }

        let error = run("VAR a INTEGER; END.", Options::empty()).unwrap_err();
        assert!(error.to_string().contains("Syntax error"));
    }
}
