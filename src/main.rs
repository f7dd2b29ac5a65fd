//! RPN Language Compiler CLI
//!
//! The `rpnc` command is the main entry point for the compiler.

use clap::{ArgAction, Parser, Subcommand};
use rpnlang::ir::{self, Interpreter, OptLevel, OutputKind};
use rpnlang::link::Linker;
use rpnlang::{dump, lexer, parser, CompileError, InputKind, FILE_EXTENSION};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};

/// Executable written when `-o` is not given
const DEFAULT_OUTPUT: &str = "a.out";

#[derive(Parser)]
#[command(name = "rpnc")]
#[command(version = rpnlang::VERSION)]
#[command(about = "Compiler for the four-letter RPN language", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file, or link an object file
    Build {
        /// Input file (.li source or .o object)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Stop after writing an object file
        #[arg(short = 'c', conflicts_with = "assembly")]
        object: bool,

        /// Stop after writing an assembly file
        #[arg(short = 'S')]
        assembly: bool,

        /// Optimization level (0-3)
        #[arg(short = 'O', long, default_value = "2", value_parser = clap::value_parser!(u8).range(0..=3))]
        opt_level: u8,

        /// Emit tokens (for debugging)
        #[arg(long)]
        emit_tokens: bool,

        /// Emit AST (for debugging)
        #[arg(long)]
        emit_ast: bool,

        /// Emit IR (for debugging)
        #[arg(long)]
        emit_ir: bool,

        /// Emit LLVM IR (for debugging)
        #[arg(long)]
        emit_llvm: bool,
    },

    /// Check a file for errors without compiling
    Check {
        /// Input file to check
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Tokenize a file and print tokens
    Tokenize {
        /// Input file to tokenize
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Parse a file and print AST
    Parse {
        /// Input file to parse
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Compile a file and run it in the IR interpreter
    Run {
        /// Input file to run
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

/// Everything `build` needs to know
struct BuildOptions {
    input: PathBuf,
    output: Option<PathBuf>,
    kind: Option<OutputKind>,
    opt: OptLevel,
    emit_tokens: bool,
    emit_ast: bool,
    emit_ir: bool,
    emit_llvm: bool,
}

impl BuildOptions {
    /// Where the final artifact goes
    fn output_path(&self) -> PathBuf {
        match (&self.output, self.kind) {
            (Some(path), _) => path.clone(),
            (None, Some(kind)) => self.input.with_extension(kind.extension()),
            (None, None) => PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            input,
            output,
            object,
            assembly,
            opt_level,
            emit_tokens,
            emit_ast,
            emit_ir,
            emit_llvm,
        } => {
            let kind = match (object, assembly) {
                (true, _) => Some(OutputKind::Object),
                (_, true) => Some(OutputKind::Assembly),
                _ => None,
            };
            let options = BuildOptions {
                input,
                output,
                kind,
                opt: OptLevel::from_level(opt_level).unwrap_or_default(),
                emit_tokens,
                emit_ast,
                emit_ir,
                emit_llvm,
            };
            build(&options)
        }

        Commands::Check { input } => {
            let source = read_source(&input)?;
            let module = rpnlang::compile(&source, &program_name(&input)).map_err(|e| report(e, &source))?;
            println!("No errors found! ({} functions)", module.functions.len());
            Ok(())
        }

        Commands::Tokenize { input } => {
            let source = read_source(&input)?;
            let tokens = lexer::lex(&source).map_err(|e| report(e, &source))?;

            for token in &tokens {
                println!(
                    "{:>4}..{:<4} {:<8} {}",
                    token.span.start,
                    token.span.end,
                    token.location.to_string(),
                    token
                );
            }
            Ok(())
        }

        Commands::Parse { input } => {
            let source = read_source(&input)?;
            let program = parser::parse(&source, &program_name(&input)).map_err(|e| report(e, &source))?;
            print!("{}", dump::dump_ast(&program));
            Ok(())
        }

        Commands::Run { input } => {
            let source = read_source(&input)?;
            let module = rpnlang::compile(&source, &program_name(&input)).map_err(|e| report(e, &source))?;

            let mut stdout = std::io::stdout().lock();
            let status = Interpreter::new(&module)
                .run_main(&mut stdout)
                .map_err(|e| report(e, &source))?;
            debug!(status, "program finished");
            Ok(())
        }
    }
}

fn build(options: &BuildOptions) -> miette::Result<()> {
    let output = options.output_path();

    match InputKind::of(&options.input) {
        // Objects only need linking
        Some(InputKind::Object) => {
            info!(input = %options.input.display(), "linking existing object");
            return Linker::from_env()
                .link(&options.input, &output)
                .map_err(|e| report(e, ""));
        }
        Some(InputKind::Source) => {}
        None => warn!(input = %options.input.display(), "no .{} extension, compiling as source", FILE_EXTENSION),
    }

    let source = read_source(&options.input)?;
    let name = program_name(&options.input);
    info!(input = %options.input.display(), program = %name, "compiling");

    if options.emit_tokens {
        println!("=== Tokens ===");
        let tokens = lexer::lex(&source).map_err(|e| report(e, &source))?;
        for token in &tokens {
            println!("{} @ {}", token, token.location);
        }
    }

    let program = parser::parse(&source, &name).map_err(|e| report(e, &source))?;
    if options.emit_ast {
        println!("=== AST ===");
        print!("{}", dump::dump_ast(&program));
    }

    let module = ir::lower(&program).map_err(|e| report(e, &source))?;
    if options.emit_ir {
        println!("=== IR ===");
        print!("{}", ir::print_module(&module));
    }

    if options.emit_llvm {
        println!("=== LLVM IR ===");
        let text = ir::llvm_ir(&module).map_err(|e| report(e, &source))?;
        print!("{}", text);
    }

    match options.kind {
        Some(kind) => {
            let path = ir::emit(&module, options.opt, kind, Some(&output)).map_err(|e| report(e, &source))?;
            info!(path = %path.display(), %kind, "wrote output");
        }
        None => {
            let object = ir::emit(&module, options.opt, OutputKind::Object, None).map_err(|e| report(e, &source))?;
            let linked = Linker::from_env().link(&object, &output);
            if let Err(e) = fs::remove_file(&object) {
                debug!(object = %object.display(), error = %e, "could not remove temporary object");
            }
            linked.map_err(|e| report(e, &source))?;
            info!(path = %output.display(), "wrote executable");
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> miette::Result<String> {
    fs::read_to_string(path).map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))
}

/// Program name is the file stem
fn program_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

fn report(err: impl Into<CompileError>, source: &str) -> miette::Report {
    miette::miette!("{}", err.into().render(source))
}
