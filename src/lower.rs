//! Generación de IR de alto nivel.
//!
//! Segundo recorrido sobre el AST ya anotado. Las variables globales de
//! tipo primitivo ("escalares") se ligan de por vida a los registros
//! virtuales `vr0..vrN`; el resto de variables vive en memoria y se
//! accede a través de `localaddr`. La numeración de registros
//! temporales vuelve a su base al terminar cada instrucción del
//! programa, ya que ningún valor temporal sobrevive entre ellas.

use std::collections::HashMap;

use log::debug;

use crate::{
    ast::{ArithOp, Ast, Condition, Expr, ExprKind, RelOp, Statement},
    error::InternalError,
    ir::{Instruction, InstructionSequence, Label, Opcode, Operand, VReg},
    lex::Identifier,
    semantic::{symtab::Kind, Annotations, Resolved},
    source::Located,
};

pub type Lower<T> = Result<T, Located<InternalError>>;

/// Resultado de la generación de IR.
pub struct Lowered {
    pub code: InstructionSequence,

    /// Bytes de almacenamiento declarado en el ámbito global.
    pub storage_size: u64,

    /// Uno más que el mayor número de registro virtual utilizado.
    pub vreg_count: u32,
}

/// Resultado de evaluar una expresión.
#[derive(Copy, Clone)]
enum Value {
    /// El valor mismo.
    Direct(Operand),

    /// Dirección de memoria donde se encuentra el valor, junto con el
    /// tamaño en bytes de este.
    Address { address: VReg, size: u64 },
}

/// Destino de una comparación.
#[derive(Copy, Clone)]
struct Branch {
    target: Label,
    inverted: bool,
}

impl Ast {
    pub fn lower(&self, resolved: &Resolved) -> Lower<Lowered> {
        let mut codegen = HighLevelCodeGen::new(resolved);

        codegen.statements(&self.instructions)?;
        Ok(codegen.finish(resolved.globals.size()))
    }
}

struct HighLevelCodeGen<'r> {
    annotations: &'r Annotations,
    code: InstructionSequence,
    scalars: HashMap<Identifier, VReg>,
    baseline: u32,
    next_vreg: u32,
    vreg_count: u32,
    next_label: u32,
}

impl<'r> HighLevelCodeGen<'r> {
    fn new(resolved: &'r Resolved) -> Self {
        let mut scalars = HashMap::new();

        let primitive_vars = resolved
            .globals
            .symbols()
            .iter()
            .filter(|symbol| symbol.kind() == Kind::Variable && symbol.typ().is_primitive());

        for (number, symbol) in (0..).zip(primitive_vars) {
            let vreg = VReg::scalar(number);
            debug!("scalar `{}` bound to {}", symbol.name(), vreg);

            scalars.insert(symbol.name().clone(), vreg);
        }

        let baseline = scalars.len() as u32;
        HighLevelCodeGen {
            annotations: &resolved.annotations,
            code: InstructionSequence::new(),
            scalars,
            baseline,
            next_vreg: baseline,
            vreg_count: baseline,
            next_label: 0,
        }
    }

    fn finish(self, storage_size: u64) -> Lowered {
        debug!(
            "lowered {} instructions, {} virtual registers, {} labels",
            self.code.len(),
            self.vreg_count,
            self.next_label
        );

        Lowered {
            code: self.code,
            storage_size,
            vreg_count: self.vreg_count,
        }
    }

    fn statements(&mut self, statements: &[Statement]) -> Lower<()> {
        for statement in statements {
            self.statement(statement)?;
            self.next_vreg = self.baseline;
        }

        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Lower<()> {
        match statement {
            Statement::Assign { target, value } => {
                let target = self.lvalue(target)?;
                let value = self.operand(value)?;
                self.store(target, value);
            }

            Statement::Read(target) => {
                let target = self.lvalue(target)?;
                let input = self.vreg();

                self.emit(Opcode::ReadInt, [Operand::Register(input)]);
                self.store(target, Operand::Register(input));
            }

            Statement::Write(value) => {
                let value = self.operand(value)?;
                self.emit(Opcode::WriteInt, [value]);
            }

            Statement::If { condition, then } => {
                let out = self.label();

                self.condition(condition, Branch { target: out, inverted: true })?;
                self.statements(then)?;
                self.code.define_label(out);
            }

            Statement::IfElse {
                condition,
                then,
                otherwise,
            } => {
                let otherwise_label = self.label();
                let out = self.label();

                let branch = Branch {
                    target: otherwise_label,
                    inverted: true,
                };

                self.condition(condition, branch)?;
                self.statements(then)?;
                self.emit(Opcode::Jump, [Operand::Label(out)]);

                self.code.define_label(otherwise_label);
                self.statements(otherwise)?;

                self.code.define_label(out);
                self.code.push(Instruction::nop());
            }

            Statement::While { condition, body } => {
                let body_label = self.label();
                let check = self.label();

                self.emit(Opcode::Jump, [Operand::Label(check)]);
                self.code.define_label(body_label);
                self.statements(body)?;

                self.code.define_label(check);
                self.condition(condition, Branch { target: body_label, inverted: false })?;
            }

            Statement::Repeat { body, condition } => {
                let body_label = self.label();
                let check = self.label();

                self.code.define_label(body_label);
                self.statements(body)?;

                self.code.define_label(check);
                self.condition(condition, Branch { target: body_label, inverted: true })?;
            }
        }

        Ok(())
    }

    fn condition(&mut self, condition: &Condition, branch: Branch) -> Lower<()> {
        let lhs = self.operand(&condition.lhs)?;
        let rhs = self.operand(&condition.rhs)?;
        self.emit(Opcode::Compare, [lhs, rhs]);

        let op = if branch.inverted {
            condition.op.negate()
        } else {
            condition.op
        };

        self.emit(branch_opcode(op), [Operand::Label(branch.target)]);
        Ok(())
    }

    /// Escribe un valor en un destino ya evaluado.
    fn store(&mut self, target: Value, value: Operand) {
        match target {
            Value::Direct(scalar) => self.emit(Opcode::Move, [scalar, value]),
            Value::Address { address, size } => {
                self.emit(store_opcode(size), [Operand::Memory(address), value])
            }
        }
    }

    fn lvalue(&mut self, target: &Expr) -> Lower<Value> {
        let value = self.expr(target)?;
        match value {
            Value::Direct(Operand::Register(vreg)) if vreg.is_scalar() => Ok(value),
            Value::Address { .. } => Ok(value),
            Value::Direct(_) => fail(InternalError::NotAnLvalue(target.kind.describe()), target),
        }
    }

    /// Evalúa una expresión y desreferencia si es necesario.
    fn operand(&mut self, expr: &Expr) -> Lower<Operand> {
        match self.expr(expr)? {
            Value::Direct(operand) => Ok(operand),

            Value::Address { address, size } => {
                let loaded = self.vreg();
                self.emit(
                    load_opcode(size),
                    [Operand::Register(loaded), Operand::Memory(address)],
                );

                Ok(Operand::Register(loaded))
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Lower<Value> {
        // Constantes plegadas durante el análisis semántico
        if let Some(value) = self.annotations.constant(expr.id) {
            return Ok(Value::Direct(self.load_int(value)));
        }

        match &expr.kind {
            ExprKind::Int(value) => Ok(Value::Direct(self.load_int(*value))),

            ExprKind::Var(name) => {
                if let Some(&scalar) = self.scalars.get(name) {
                    return Ok(Value::Direct(Operand::Register(scalar)));
                }

                let (offset, size) = self
                    .annotations
                    .symbol(expr.id)
                    .map(|symbol| (symbol.offset(), symbol.typ().size()))
                    .or_else(|error| fail(error, expr))?;

                // Los desplazamientos están acotados por `MAX_STORAGE`
                let address = self.vreg();
                self.code.push(
                    Instruction::new(
                        Opcode::LocalAddr,
                        [Operand::Register(address), Operand::Int(offset as i64)],
                    )
                    .with_comment(name.to_string()),
                );

                Ok(Value::Address { address, size })
            }

            ExprKind::Element { array, index } => {
                let base = match self.expr(array)? {
                    Value::Address { address, .. } => address,
                    Value::Direct(_) => return fail(InternalError::NotAnLvalue(array.kind.describe()), array),
                };

                let index = self.operand(index)?;
                let element_size = self
                    .annotations
                    .type_of(expr.id)
                    .map(|element| element.size())
                    .or_else(|error| fail(error, expr))?;

                let offset = self.vreg();
                self.emit(
                    Opcode::Mul,
                    [
                        Operand::Register(offset),
                        index,
                        Operand::Int(element_size as i64),
                    ],
                );

                let address = self.vreg();
                self.emit(
                    Opcode::Add,
                    [
                        Operand::Register(address),
                        Operand::Register(base),
                        Operand::Register(offset),
                    ],
                );

                Ok(Value::Address {
                    address,
                    size: element_size,
                })
            }

            ExprKind::Field { .. } => fail(InternalError::Unsupported(expr.kind.describe()), expr),

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.operand(lhs)?;
                let rhs = self.operand(rhs)?;

                let result = self.vreg();
                self.emit(arith_opcode(*op), [Operand::Register(result), lhs, rhs]);

                Ok(Value::Direct(Operand::Register(result)))
            }
        }
    }

    fn load_int(&mut self, value: i64) -> Operand {
        let vreg = self.vreg();
        self.emit(Opcode::LoadInt, [Operand::Register(vreg), Operand::Int(value)]);

        Operand::Register(vreg)
    }

    fn emit<const N: usize>(&mut self, opcode: Opcode, operands: [Operand; N]) {
        self.code.push(Instruction::new(opcode, operands));
    }

    fn vreg(&mut self) -> VReg {
        let vreg = VReg::new(self.next_vreg);
        self.next_vreg += 1;
        self.vreg_count = self.vreg_count.max(self.next_vreg);

        vreg
    }

    fn label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;

        label
    }
}

fn arith_opcode(op: ArithOp) -> Opcode {
    match op {
        ArithOp::Add => Opcode::Add,
        ArithOp::Sub => Opcode::Sub,
        ArithOp::Mul => Opcode::Mul,
        ArithOp::Div => Opcode::Div,
        ArithOp::Mod => Opcode::Mod,
    }
}

// Un CHAR ocupa un byte; todo lo demás se accede como palabra completa
fn load_opcode(size: u64) -> Opcode {
    if size == 1 {
        Opcode::LoadByte
    } else {
        Opcode::Load
    }
}

fn store_opcode(size: u64) -> Opcode {
    if size == 1 {
        Opcode::StoreByte
    } else {
        Opcode::Store
    }
}

/// Salto condicional que se toma cuando la relación es verdadera.
fn branch_opcode(op: RelOp) -> Opcode {
    match op {
        RelOp::Equal => Opcode::JumpEqual,
        RelOp::NotEqual => Opcode::JumpNotEqual,
        RelOp::Less => Opcode::JumpLess,
        RelOp::LessOrEqual => Opcode::JumpLessOrEqual,
        RelOp::Greater => Opcode::JumpGreater,
        RelOp::GreaterOrEqual => Opcode::JumpGreaterOrEqual,
    }
}

fn fail<T>(error: InternalError, at: &Expr) -> Lower<T> {
    Err(Located::at(error, at.location.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex, parse, source::Source};

    fn lower(text: &str) -> Lower<Lowered> {
        let source = Source::from_text(text, "test.pas");
        let tokens = lex::tokenize(&source).expect("lexer error");
        let ast = parse::parse(tokens.iter(), source.start()).expect("parser error");
        let resolved = ast.resolve().expect("semantic error");

        ast.lower(&resolved)
    }

    fn dump(text: &str) -> String {
        lower(text).unwrap().code.to_string()
    }

    #[test]
    fn constant_reference_loads_immediate() {
        let code = dump("CONST x = 2 + 3; VAR a: INTEGER; BEGIN a := x END.");
        assert_eq!(code, "\tldci vr1, $5\n\tmov vr0, vr1\n");
    }

    #[test]
    fn folded_expression_is_one_load() {
        let code = dump("VAR a: INTEGER; BEGIN a := 2 * 3 + 1 END.");
        assert_eq!(code, "\tldci vr1, $7\n\tmov vr0, vr1\n");
    }

    #[test]
    fn if_layout() {
        let code = dump("VAR a, b: INTEGER; BEGIN IF a < b THEN WRITE a END END.");
        assert_eq!(
            code,
            "\tcmpi vr0, vr1\n\
             \tjgte .L0\n\
             \twritei vr0\n\
             .L0:\n"
        );
    }

    #[test]
    fn if_else_layout() {
        let code = dump("VAR a: INTEGER; BEGIN IF a = 0 THEN a := 1 ELSE a := 2 END END.");
        assert_eq!(
            code,
            "\tldci vr1, $0\n\
             \tcmpi vr0, vr1\n\
             \tjne .L0\n\
             \tldci vr1, $1\n\
             \tmov vr0, vr1\n\
             \tjmp .L1\n\
             .L0:\n\
             \tldci vr1, $2\n\
             \tmov vr0, vr1\n\
             .L1:\n\
             \tnop\n"
        );
    }

    #[test]
    fn while_layout() {
        let code = dump("VAR i: INTEGER; BEGIN WHILE i < 3 DO i := i + 1 END END.");
        assert_eq!(
            code,
            "\tjmp .L1\n\
             .L0:\n\
             \tldci vr1, $1\n\
             \taddi vr2, vr0, vr1\n\
             \tmov vr0, vr2\n\
             .L1:\n\
             \tldci vr1, $3\n\
             \tcmpi vr0, vr1\n\
             \tjlt .L0\n"
        );
    }

    #[test]
    fn repeat_layout() {
        let code = dump("VAR a: INTEGER; BEGIN REPEAT a := a - 1 UNTIL a <= 0 END.");
        assert_eq!(
            code,
            ".L0:\n\
             \tldci vr1, $1\n\
             \tsubi vr2, vr0, vr1\n\
             \tmov vr0, vr2\n\
             .L1:\n\
             \tldci vr1, $0\n\
             \tcmpi vr0, vr1\n\
             \tjgt .L0\n"
        );
    }

    #[test]
    fn nested_ifs_do_not_share_a_position() {
        let lowered = lower("VAR a: INTEGER; BEGIN IF a > 0 THEN IF a > 1 THEN a := 0 END END END.").unwrap();
        let code = lowered.code;

        assert_eq!(code.position_of(Label(1)), Some(code.len() - 1));
        assert_eq!(code.position_of(Label(0)), Some(code.len()));
        assert_eq!(code.instructions()[code.len() - 1].opcode(), Opcode::Nop);
    }

    #[test]
    fn array_element_address() {
        let lowered = lower("VAR v: ARRAY 4 OF INTEGER; i: INTEGER; BEGIN v[i] := 7 END.").unwrap();
        assert_eq!(
            lowered.code.to_string(),
            "\tlocaladdr vr1, $0\t/* v */\n\
             \tmuli vr2, vr0, $8\n\
             \taddi vr3, vr1, vr2\n\
             \tldci vr4, $7\n\
             \tsti (vr3), vr4\n"
        );

        assert_eq!(lowered.storage_size, 40);
        assert_eq!(lowered.vreg_count, 5);
    }

    #[test]
    fn memory_index_is_loaded_first() {
        let code = dump(
            "VAR v: ARRAY 4 OF CHAR; w: ARRAY 1 OF INTEGER; \
             BEGIN WRITE v[w[0]] END.",
        );

        assert_eq!(
            code,
            "\tlocaladdr vr0, $0\t/* v */\n\
             \tlocaladdr vr1, $4\t/* w */\n\
             \tldci vr2, $0\n\
             \tmuli vr3, vr2, $8\n\
             \taddi vr4, vr1, vr3\n\
             \tldi vr5, (vr4)\n\
             \tmuli vr6, vr5, $1\n\
             \taddi vr7, vr0, vr6\n\
             \tldb vr8, (vr7)\n\
             \twritei vr8\n"
        );
    }

    #[test]
    fn char_elements_use_byte_accesses() {
        let code = dump("VAR v: ARRAY 2 OF CHAR; BEGIN v[1] := 2; WRITE v[0] END.");
        assert_eq!(
            code,
            "\tlocaladdr vr0, $0\t/* v */\n\
             \tldci vr1, $1\n\
             \tmuli vr2, vr1, $1\n\
             \taddi vr3, vr0, vr2\n\
             \tldci vr4, $2\n\
             \tstb (vr3), vr4\n\
             \tlocaladdr vr0, $0\t/* v */\n\
             \tldci vr1, $0\n\
             \tmuli vr2, vr1, $1\n\
             \taddi vr3, vr0, vr2\n\
             \tldb vr4, (vr3)\n\
             \twritei vr4\n"
        );
    }

    #[test]
    fn read_into_scalar_and_memory() {
        let code = dump("VAR a: INTEGER; v: ARRAY 2 OF INTEGER; BEGIN READ a; READ v[1] END.");
        assert_eq!(
            code,
            "\treadi vr1\n\
             \tmov vr0, vr1\n\
             \tlocaladdr vr1, $8\t/* v */\n\
             \tldci vr2, $1\n\
             \tmuli vr3, vr2, $8\n\
             \taddi vr4, vr1, vr3\n\
             \treadi vr5\n\
             \tsti (vr4), vr5\n"
        );
    }

    #[test]
    fn every_primitive_global_is_a_scalar() {
        let lowered = lower("VAR a, b, c, d, e, f: INTEGER; g: CHAR; BEGIN WRITE g END.").unwrap();

        assert_eq!(lowered.code.to_string(), "\twritei vr6\n");
        assert_eq!(lowered.vreg_count, 7);
    }

    #[test]
    fn record_fields_are_not_lowered() {
        let error = lower("VAR r: RECORD f: INTEGER END; BEGIN r.f := 1 END.")
            .err()
            .expect("record field lowered");

        assert!(matches!(error.val(), InternalError::Unsupported(_)));
    }

    #[test]
    fn branch_table_negates() {
        use RelOp::*;

        let table = [
            (Equal, Opcode::JumpEqual, Opcode::JumpNotEqual),
            (NotEqual, Opcode::JumpNotEqual, Opcode::JumpEqual),
            (Less, Opcode::JumpLess, Opcode::JumpGreaterOrEqual),
            (LessOrEqual, Opcode::JumpLessOrEqual, Opcode::JumpGreater),
            (Greater, Opcode::JumpGreater, Opcode::JumpLessOrEqual),
            (GreaterOrEqual, Opcode::JumpGreaterOrEqual, Opcode::JumpLess),
        ];

        for (op, normal, inverted) in table {
            assert_eq!(branch_opcode(op), normal);
            assert_eq!(branch_opcode(op.negate()), inverted);
        }
    }
}
