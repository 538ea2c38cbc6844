use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use zion::compiler::Compiler;
use zion::render::render_module;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the internal test corpus, optionally filtered by name.
    Test { filter: Option<String> },
    /// Parse and validate an IR file.
    ReadIr { file: PathBuf },
    /// Print the resolved filename for a module.
    Find { module: String },
    /// Type-check a module without emitting anything.
    Compile { module: String },
    /// Type-check a module and execute it in-process.
    Run {
        module: String,
        args: Vec<String>,
    },
    /// Emit one IR file per module.
    Obj { module: String },
    /// Emit IR files and link them into an executable.
    Bc { module: String },
    /// Pretty-print the parsed AST to stdout.
    Fmt { module: String },
}

fn log_level() -> log::Level {
    let verbosity: u32 = std::env::var("DEBUG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    match verbosity {
        0 => log::Level::Warn,
        1..=2 => log::Level::Info,
        3..=6 => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

fn main() -> ExitCode {
    simple_logger::init_with_level(log_level()).unwrap();
    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Test { filter } => zion::testing::run_tests(filter.as_deref()),
        Command::ReadIr { file } => read_ir(&file),
        Command::Find { module } => {
            let compiler = Compiler::new();
            match compiler.resolve_module_filename(&module) {
                Ok(path) => {
                    println!("{}", path.display());
                    true
                }
                Err(message) => {
                    error!("{message}");
                    false
                }
            }
        }
        Command::Compile { module } => {
            let mut compiler = Compiler::new();
            let ok = compiler.compile(&module);
            compiler.status.report();
            ok
        }
        Command::Run { module, args } => {
            let _ = args;
            let mut compiler = Compiler::new();
            match compiler.run(&module) {
                Ok(code) => {
                    compiler.status.report();
                    return ExitCode::from((code & 0xff) as u8);
                }
                Err(message) => {
                    compiler.status.report();
                    error!("{message}");
                    false
                }
            }
        }
        Command::Obj { module } => {
            let mut compiler = Compiler::new();
            let ok = compiler.compile(&module);
            compiler.status.report();
            if ok {
                match compiler.emit_ir(std::path::Path::new(".")) {
                    Ok(written) => {
                        for path in written {
                            println!("{}", path.display());
                        }
                        true
                    }
                    Err(io_error) => {
                        error!("could not write IR: {io_error}");
                        false
                    }
                }
            } else {
                false
            }
        }
        Command::Bc { module } => {
            let mut compiler = Compiler::new();
            let ok = compiler.compile(&module);
            compiler.status.report();
            if ok {
                match compiler.emit_ir(std::path::Path::new(".")) {
                    Ok(written) => match compiler.link_executable(&written, &module) {
                        Ok(()) => true,
                        Err(message) => {
                            error!("{message}");
                            false
                        }
                    },
                    Err(io_error) => {
                        error!("could not write IR: {io_error}");
                        false
                    }
                }
            } else {
                false
            }
        }
        Command::Fmt { module } => {
            let mut compiler = Compiler::new();
            if compiler.build_parse_modules(&module) {
                for parsed in &compiler.program.modules {
                    print!("{}", render_module(parsed));
                }
                true
            } else {
                compiler.status.report();
                false
            }
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_ir(file: &PathBuf) -> bool {
    let source = match std::fs::read_to_string(file) {
        Ok(source) => source,
        Err(io_error) => {
            error!("could not read '{}': {io_error}", file.display());
            return false;
        }
    };
    match zion::ir::reader::read_module(&source) {
        Ok(module) => {
            println!(
                "{}: {} functions, {} globals, {} externs",
                module.name,
                module.functions.len(),
                module.globals.len(),
                module.externs.len()
            );
            true
        }
        Err(read_error) => {
            error!("{}: {read_error}", file.display());
            false
        }
    }
}
