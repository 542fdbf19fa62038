//! Credence CLI
//!
//! Command-line interface for the B language compiler. The front end
//! is reached through the AST loader: either the external python
//! parser module, or a pre-serialized AST + symbol-map JSON document.
//!
//! Example usage:
//!
//!   $ credence --target x86_64 --output program program.b
//!   $ credence --ast-loader json --target ir program.json

use clap::{Parser as ClapParser, ValueEnum};
use credence::ast::{self, LoadedProgram};
use credence_core::error::{CompileError, ErrorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AstLoader {
    Python,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Ir,
    Ast,
    Syntax,
    #[value(name = "x86_64")]
    X8664,
    Arm64,
    Z80,
}

#[derive(ClapParser)]
#[command(name = "credence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Credence :: B Language Compiler", long_about = None)]
struct Cli {
    /// B source file (or AST document with --ast-loader json)
    source_code: PathBuf,

    /// AST loader
    #[arg(short = 'a', long = "ast-loader", value_enum, default_value_t = AstLoader::Python)]
    ast_loader: AstLoader,

    /// Emission target
    #[arg(short = 't', long, value_enum, default_value_t = Target::Ir)]
    target: Target,

    /// Dump the symbol table
    #[arg(short = 'd', long)]
    debug: bool,

    /// Output file, or `stdout`
    #[arg(short = 'o', long, default_value = "stdout")]
    output: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => {}
        Err(error) => {
            eprintln!(
                "\nCredence Error :: \x1b[31m{}\x1b[0m",
                credence::util::capitalize(&error.to_string())
            );
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    if cli.target == Target::Z80 {
        return Err(CompileError::new(
            ErrorKind::InvalidPath,
            "invalid target option",
            "z80",
        ));
    }

    // `syntax` only needs the front end's pretty parse tree
    if cli.target == Target::Syntax {
        let tree = ast::load_syntax_tree(&cli.source_code)?;
        return write_output(&cli.output, &tree, "bast");
    }

    let program = load_program(cli)?;

    if cli.debug && cli.target != Target::Ast {
        println!("> Symbol Table:");
        println!(
            "{}",
            serde_json::to_string_pretty(program.symbols.raw()).unwrap_or_default()
        );
    }

    match cli.target {
        Target::Ir => {
            let ir = credence::compile_to_ir(&program)?;
            write_output(&cli.output, &ir, "bo")
        }
        Target::X8664 => {
            let assembly = credence::compile_to_x86_64(&program)?;
            write_output(&cli.output, &assembly, "bs")
        }
        Target::Arm64 => {
            let assembly = credence::compile_to_arm64(&program)?;
            write_output(&cli.output, &assembly, "bs")
        }
        Target::Ast => {
            let document = if cli.debug {
                serde_json::json!([program.symbols.raw(), &program.ast])
            } else {
                program.ast.clone()
            };
            let text = serde_json::to_string_pretty(&document).unwrap_or_default();
            write_output(&cli.output, &text, "bast")
        }
        Target::Syntax | Target::Z80 => unreachable!("handled above"),
    }
}

fn load_program(cli: &Cli) -> Result<LoadedProgram, CompileError> {
    match cli.ast_loader {
        AstLoader::Python => ast::load_via_python(&cli.source_code),
        AstLoader::Json => {
            let source = read_source(&cli.source_code)?;
            ast::load_from_json(&source)
        }
    }
}

fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|_| {
        CompileError::new(
            ErrorKind::InvalidPath,
            format!("invalid file path: {}", path.display()),
            path.display().to_string(),
        )
    })
}

fn write_output(output: &str, content: &str, extension: &str) -> Result<(), CompileError> {
    if output == "stdout" {
        print!("{}", content);
        if !content.ends_with('\n') {
            println!();
        }
        return Ok(());
    }
    let path = format!("{}.{}", output, extension);
    fs::write(&path, content).map_err(|_| {
        CompileError::new(
            ErrorKind::InvalidPath,
            format!("invalid file path: {}", path),
            path.clone(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample_document() -> String {
        json!({
            "symbols": {"main": {"type": "function_definition", "line": 1}},
            "ast": {
                "node": "function_definition",
                "root": "main",
                "left": [null],
                "right": {"node": "statement", "root": "block", "left": [
                    {"node": "statement", "root": "auto",
                     "left": [{"node": "lvalue", "root": "x"}]},
                    {"node": "statement", "root": "rvalue",
                     "left": [[{
                         "node": "assignment_expression",
                         "root": ["=", null],
                         "left": {"node": "lvalue", "root": "x"},
                         "right": {"node": "number_literal", "root": 42}
                     }]]}
                ]}
            }
        })
        .to_string()
    }

    #[test]
    fn test_json_loader_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_document().as_bytes()).unwrap();

        let cli = Cli {
            source_code: file.path().to_path_buf(),
            ast_loader: AstLoader::Json,
            target: Target::Ir,
            debug: false,
            output: "stdout".to_string(),
        };
        let program = load_program(&cli).unwrap();
        let ir = credence::compile_to_ir(&program).unwrap();
        assert!(ir.contains("x = (42:int:4);"));
    }

    #[test]
    fn test_missing_file_is_invalid_path() {
        let cli = Cli {
            source_code: PathBuf::from("/no/such/file.json"),
            ast_loader: AstLoader::Json,
            target: Target::Ir,
            debug: false,
            output: "stdout".to_string(),
        };
        let err = load_program(&cli).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
    }

    #[test]
    fn test_z80_target_rejected() {
        let cli = Cli {
            source_code: PathBuf::from("program.b"),
            ast_loader: AstLoader::Json,
            target: Target::Z80,
            debug: false,
            output: "stdout".to_string(),
        };
        let err = run(&cli).unwrap_err();
        assert!(err.message.contains("invalid target option"));
    }

    #[test]
    fn test_output_file_extension() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        write_output(base.to_str().unwrap(), "RET;\n", "bo").unwrap();
        let written = fs::read_to_string(dir.path().join("out.bo")).unwrap();
        assert_eq!(written, "RET;\n");
    }
}
