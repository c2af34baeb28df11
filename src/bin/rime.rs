use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use rime::{disassemble, Compiler, Lexer, Parser as RimeParser, Value, VirtualMachine};

#[derive(Parser)]
#[command(name = "rime")]
#[command(about = "The Rime programming language")]
struct Cli {
    file: String,
    /// Print the compiled bytecode instead of executing it.
    #[arg(short, long)]
    disassemble: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read file: {}", cli.file))?;

    let mut lexer = Lexer::new(&source);
    let tokens = lexer.tokenize().context("Lexer error")?;

    let mut parser = RimeParser::new(&tokens);
    let program = parser.parse().context("Parser error")?;

    let mut compiler = Compiler::new();
    compiler.compile(&program).context("Compiler error")?;
    let bytecode = compiler.bytecode();

    if cli.disassemble {
        for (index, constant) in bytecode.constants.iter().enumerate() {
            println!("CONSTANT {}: {}", index, constant);
            if let Value::Function(function) = constant {
                print!("{}", disassemble(&function.instructions));
            }
        }
        print!("{}", disassemble(&bytecode.instructions));
        return Ok(());
    }

    let mut vm = VirtualMachine::new(bytecode);
    vm.run().context("Runtime error")?;

    let result = vm.last_popped();
    if result != Value::Null {
        println!("{}", result);
    }

    Ok(())
}
