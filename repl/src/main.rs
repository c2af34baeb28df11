use anyhow::Result;
use rime::{Compiler, Lexer, Parser, SymbolTable, Value, VirtualMachine, BUILTINS, GLOBALS_SIZE};
use rustyline::{error::ReadlineError, Editor};

fn main() -> Result<()> {
    println!(
        r"
Welcome to the Rime programming language REPL!
You may type Rime code below for evaluation.
Enter 'exit' or press 'CTRL+C' to exit the REPL.
    "
    );

    let mut rl = Editor::<()>::new();
    if rl.load_history("history.txt").is_err() {
        println!("No previous history.");
    }

    let mut constants: Vec<Value> = Vec::new();
    let mut globals: Vec<Value> = vec![Value::Null; GLOBALS_SIZE];
    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }

    loop {
        let readline = rl.readline(">> ");
        match readline {
            Ok(line) => match line.as_ref() {
                "exit" => break,
                line => {
                    rl.add_history_entry(line);

                    let mut lexer = Lexer::new(line);
                    let tokens = match lexer.tokenize() {
                        Ok(tokens) => tokens,
                        Err(error) => {
                            eprintln!("Error lexing: {}", error);
                            continue;
                        }
                    };

                    let mut parser = Parser::new(&tokens);
                    let program = match parser.parse() {
                        Ok(program) => program,
                        Err(error) => {
                            eprintln!("Error parsing: {}", error);
                            continue;
                        }
                    };

                    // Bindings survive across submissions: the symbol table,
                    // constant pool, and globals thread through every
                    // compile-and-run round trip.
                    let mut compiler =
                        Compiler::new_with_state(symbol_table.clone(), constants.clone());
                    if let Err(error) = compiler.compile(&program) {
                        eprintln!("Error compiling: {}", error);
                        continue;
                    }
                    let bytecode = compiler.bytecode();
                    symbol_table = compiler.symbol_table;
                    constants = bytecode.constants.clone();

                    let mut vm = VirtualMachine::new_with_globals_store(
                        bytecode,
                        std::mem::take(&mut globals),
                    );
                    let run_result = vm.run();
                    globals = std::mem::take(&mut vm.globals);
                    if let Err(error) = run_result {
                        eprintln!("Error running: {}", error);
                        continue;
                    }

                    let result = vm.last_popped();
                    if result != Value::Null {
                        println!("{}", result);
                    }
                }
            },
            Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("history.txt")?;
    Ok(())
}
