//! Compilador para un subconjunto de Pascal.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST ([`ast`]) por medio de análisis sintáctico en
//! [`parse`]. El árbol sintáctico es procesado por análisis semántico
//! en [`semantic`], que construye la tabla de símbolos, pliega
//! constantes y anota cada nodo con su tipo.
//!
//! # Middle end
//! El AST anotado se traduce en [`lower`] a una representación
//! intermedia de tres direcciones descrita en [`ir`]. Opcionalmente,
//! la IR se divide en bloques básicos ([`ir::cfg`]) sobre los cuales
//! operan transformaciones locales ([`ir::transform`]).
//!
//! # Back end
//! En [`codegen`] el compilador deja de ser agnóstico al sistema
//! objetivo: la IR se traduce instrucción por instrucción a
//! ensamblador x86-64 en sintaxis de GNU `as`. Ensamblado y enlazado
//! se delegan a la toolchain del sistema.
//!
//! [`context`] encadena todas las fases anteriores.

#[macro_use]
mod macros;

pub mod ast;
pub mod codegen;
pub mod context;
pub mod error;
pub mod ir;
pub mod lex;
pub mod lower;
pub mod parse;
pub mod semantic;
pub mod source;
