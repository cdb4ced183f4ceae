//! Punto de entrada ("driver").
//!
//! Este módulo expone una CLI sobre [`pascalc::context::Pipeline`],
//! la cual orquesta las diferentes fases del proceso de compilación.

use anyhow::{self, Context};
use clap::{self, crate_version, Arg, ArgAction, Command};
use pascalc::{
    context::{Failure, Options, Pipeline},
    source::Source,
};

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("Pascal subset compiler")
        .version(crate_version!())
        .arg(
            Arg::new("symtab")
                .short('s')
                .long("symtab")
                .action(ArgAction::SetTrue)
                .help("Print the global symbol table"),
        )
        .arg(
            Arg::new("ir")
                .short('i')
                .long("ir")
                .action(ArgAction::SetTrue)
                .help("Print the intermediate representation"),
        )
        .arg(
            Arg::new("optimize")
                .short('O')
                .long("optimize")
                .action(ArgAction::SetTrue)
                .help("Run optimization passes over the IR"),
        )
        .arg(
            Arg::new("compile")
                .short('S')
                .long("compile")
                .action(ArgAction::SetTrue)
                .help("Generate x86-64 assembly"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("Source file ('-' for stdin)"),
        )
        .get_matches();

    // Se extraen argumentos necesarios
    let flags = [
        ("symtab", Options::PRINT_SYMTAB),
        ("ir", Options::PRINT_IR),
        ("optimize", Options::OPTIMIZE),
        ("compile", Options::COMPILE),
    ];

    let mut options = Options::empty();
    for (name, option) in flags {
        if args.get_flag(name) {
            options |= option;
        }
    }

    let input = args
        .get_one::<String>("input")
        .context("Missing input file")?;

    let output = args
        .get_one::<String>("output")
        .context("Missing output file")?;

    let source = match input.as_str() {
        "-" => Source::load(io::stdin().lock(), "<stdin>"),
        path => File::open(path)
            .and_then(|file| Source::load(BufReader::new(file), path)),
    }
    .with_context(|| format!("Failed to read source: {}", input))?;

    let mut sink: Box<dyn Write> = match output.as_str() {
        "-" => Box::new(io::stdout().lock()),
        path => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            Box::new(BufWriter::new(file))
        }
    };

    match Pipeline::new(options).run(&source, &mut sink) {
        Ok(()) => Ok(()),

        Err(Failure::Diagnosed(diagnostics)) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }

        Err(Failure::Internal(error)) => {
            Err(error).with_context(|| format!("Failed to compile: {}", input))
        }

        Err(Failure::Io(error)) => Err(error).context("Failed to write output"),
    }
}
