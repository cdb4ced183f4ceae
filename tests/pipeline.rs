mod common;

use common::{compile, execute, lower};
use pascalc::{
    context::{Failure, Options, Pipeline},
    ir::{cfg::ControlFlowGraph, Opcode},
    source::Source,
};

#[test]
fn write_of_incremented_scalar() {
    let program = "VAR a, b: INTEGER; BEGIN a := 10; b := a + 1; WRITE b END.";

    for options in [Options::empty(), Options::OPTIMIZE] {
        let lowered = lower(program, options);

        let writes = lowered
            .code
            .iter()
            .filter(|instruction| instruction.opcode() == Opcode::WriteInt)
            .count();

        assert_eq!(writes, 1);
        assert_eq!(execute(&lowered.code, &[]), [11]);
    }
}

#[test]
fn if_survives_cfg_round_trip() {
    let program = "VAR a, b: INTEGER; \
                   BEGIN READ a; IF a > 5 THEN b := 1 ELSE b := 2 END; WRITE b END.";

    let lowered = lower(program, Options::empty());
    let cfg = ControlFlowGraph::build(&lowered.code).unwrap();
    let flattened = cfg.flatten();

    assert_eq!(flattened.to_string(), lowered.code.to_string());
    for (input, expected) in [(7, 1), (3, 2), (5, 2)] {
        assert_eq!(execute(&lowered.code, &[input]), [expected]);
        assert_eq!(execute(&flattened, &[input]), [expected]);
    }
}

#[test]
fn optimization_preserves_loops_and_memory() {
    let program = "VAR i, sum: INTEGER; v: ARRAY 5 OF INTEGER; \
                   BEGIN \
                     i := 0; \
                     WHILE i < 5 DO v[i] := i * i; i := i + 1 END; \
                     i := 0; sum := 0; \
                     REPEAT sum := sum + v[i]; i := i + 1 UNTIL i = 5; \
                     WRITE sum; WRITE v[4] MOD 7 \
                   END.";

    let plain = lower(program, Options::empty());
    let optimized = lower(program, Options::OPTIMIZE);

    assert_eq!(execute(&plain.code, &[]), [30, 2]);
    assert_eq!(execute(&optimized.code, &[]), [30, 2]);
}

#[test]
fn adjacent_chars_keep_their_neighbours() {
    let program = "VAR v: ARRAY 2 OF CHAR; BEGIN v[0] := 1; v[1] := 2; WRITE v[0]; WRITE v[1] END.";

    for options in [Options::empty(), Options::OPTIMIZE] {
        assert_eq!(execute(&lower(program, options).code, &[]), [1, 2]);
    }
}

#[test]
fn mixed_char_and_integer_layout() {
    // n empieza en el desplazamiento 3, justo después de c; i ocupa 19..27
    let program = "VAR c: ARRAY 3 OF CHAR; n: ARRAY 2 OF INTEGER; i: INTEGER; \
                   BEGIN \
                     n[0] := 1000; n[1] := -1; \
                     i := 0; WHILE i < 3 DO c[i] := 100 * i + 1; i := i + 1 END; \
                     c[2] := 300; c[0] := 255; \
                     WRITE c[0]; WRITE c[1]; WRITE c[2]; WRITE n[0]; WRITE n[1] \
                   END.";

    for options in [Options::empty(), Options::OPTIMIZE] {
        let lowered = lower(program, options);

        assert_eq!(lowered.storage_size, 27);
        assert_eq!(execute(&lowered.code, &[]), [255, 101, 44, 1000, -1]);
    }
}

#[test]
fn constant_reference_is_an_immediate() {
    let output = compile(
        "CONST x = 2 + 3; VAR a: INTEGER; BEGIN a := x; WRITE a END.",
        Options::PRINT_SYMTAB | Options::PRINT_IR,
    );

    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("0,CONST,x,INTEGER"));
    assert_eq!(lines.next(), Some("0,VAR,a,INTEGER"));

    let ir: Vec<_> = lines.collect();
    assert!(ir.contains(&"\tldci vr1, $5"));
    assert!(ir.iter().all(|line| !line.contains("localaddr") && !line.contains("ldi ")));
}

#[test]
fn symbol_table_dump() {
    let output = compile(
        "TYPE pair = RECORD a, b: INTEGER END; \
         VAR p: pair; grid: ARRAY 2 OF ARRAY 3 OF CHAR; n: INTEGER; \
         BEGIN END.",
        Options::PRINT_SYMTAB,
    );

    assert_eq!(
        output,
        "1,VAR,a,INTEGER\n\
         1,VAR,b,INTEGER\n\
         0,TYPE,pair,RECORD (INTEGER x INTEGER)\n\
         0,VAR,p,RECORD (INTEGER x INTEGER)\n\
         0,VAR,grid,ARRAY 2 OF ARRAY 3 OF CHAR\n\
         0,VAR,n,INTEGER\n"
    );
}

#[test]
fn scalar_register_ceiling() {
    let five = compile(
        "VAR a, b, c, d, e: INTEGER; \
         BEGIN READ a; b := a; c := b; d := c; e := d; WRITE e END.",
        Options::OPTIMIZE | Options::COMPILE,
    );

    // Cada copia pasa de un registro preservado al siguiente
    let chain = ["%rbx", "%r12", "%r13", "%r14", "%r15"];
    for pair in chain.windows(2) {
        let copy = format!("\tmovq    {}, %r10\n\tmovq    %r10, {}\n", pair[0], pair[1]);
        assert!(five.contains(&copy), "missing `{}`:\n{}", copy, five);
    }

    assert!(five.contains("\tmovq    %r15, %rsi\n"));

    let six = compile(
        "VAR a, b, c, d, e, f: INTEGER; \
         BEGIN READ a; b := a; c := b; d := c; e := d; f := e; WRITE f END.",
        Options::OPTIMIZE | Options::COMPILE,
    );

    // f no recibe registro, pero e sigue en %r15
    assert!(six.contains("\tmovq    %r15, %r10\n\tmovq    %r10, 40(%rsp)\n"), "{}", six);
    assert!(six.contains("\tmovq    40(%rsp), %rsi\n"), "{}", six);
}

#[test]
fn assembly_layout() {
    let output = compile("VAR a: INTEGER; BEGIN WRITE 3 END.", Options::COMPILE);

    assert_eq!(
        output,
        "\t.section .rodata\n\
         s_readint_fmt: .string \"%ld\"\n\
         s_writeint_fmt: .string \"%ld\\n\"\n\
         \t.section .text\n\
         \t.globl main\n\
         main:\n\
         \tpushq   %rbx\n\
         \tpushq   %r12\n\
         \tpushq   %r13\n\
         \tpushq   %r14\n\
         \tpushq   %r15\n\
         \tsubq    $16, %rsp\n\
         \t# ldci vr1, $3\n\
         \tmovq    $3, %r10\n\
         \tmovq    %r10, 8(%rsp)\n\
         \t# writei vr1\n\
         \tleaq    s_writeint_fmt(%rip), %rdi\n\
         \tmovq    8(%rsp), %rsi\n\
         \tmovl    $0, %eax\n\
         \tcall    printf\n\
         \taddq    $16, %rsp\n\
         \tpopq    %r15\n\
         \tpopq    %r14\n\
         \tpopq    %r13\n\
         \tpopq    %r12\n\
         \tpopq    %rbx\n\
         \tmovl    $0, %eax\n\
         \tret\n"
    );
}

#[test]
fn errors_stop_the_pipeline() {
    let cases = [
        ("VAR a: INTEGER; a: CHAR; BEGIN END.", "Semantic error"),
        ("CONST k = 1 DIV 0; BEGIN END.", "Semantic error"),
        ("VAR a: INTEGER; BEGIN a := 1 + END.", "Syntax error"),
        ("VAR a: INTEGER; BEGIN a := 1 ! END.", "Lexical error"),
        ("VAR r: RECORD f: INTEGER END; BEGIN r.f := 1 END.", "Internal error"),
        (
            "VAR v: ARRAY 2305843009213693952 OF INTEGER; BEGIN v[0] := 1 END.",
            "Semantic error",
        ),
    ];

    for (text, kind) in cases {
        let source = Source::from_text(text, "bad.pas");
        let mut output = Vec::new();

        match Pipeline::new(Options::COMPILE).run(&source, &mut output) {
            Err(Failure::Diagnosed(diagnostics)) => {
                let rendered = diagnostics.to_string();
                assert!(rendered.starts_with("bad.pas:1:"), "{}", rendered);
                assert!(rendered.contains(kind), "{}", rendered);
                assert!(rendered.ends_with("Build failed\n"));
            }

            Err(other) => panic!("unexpected failure for `{}`: {}", text, other),
            Ok(()) => panic!("`{}` compiled", text),
        }

        assert!(output.is_empty());
    }
}
