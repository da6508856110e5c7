use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemelet::ast::Value;
use schemelet::evaluator::{self, Environment};
use schemelet::io;
use schemelet::scheme::read;
use std::panic;
use std::process;

fn main() {
    env_logger::init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("schemelet - a small Scheme");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut env = evaluator::create_global_env();

    // A file named on the command line is loaded into the session first
    if let Some(path) = std::env::args().nth(1) {
        load_file(&path, &mut env);
    }

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };

    loop {
        match rl.readline("scheme> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // Add the line to history
                let _ = rl.add_history_entry(line);

                // Handle special commands
                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match read(line).and_then(|expr| evaluator::eval(&expr, &mut env)) {
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("{e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn load_file(path: &str, env: &mut Environment) {
    let program = match io::load(path) {
        Ok(program) => program,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    for expr in &program {
        if let Err(e) = evaluator::eval(expr, env) {
            println!("{e}");
            return;
        }
    }
    println!("Loaded {path} ({} expressions)", program.len());
}

fn print_help() {
    println!("schemelet commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  quote, if, set!, define, lambda, load, begin, cond, case");
    println!();
    println!("Primitives:");
    println!("  Arithmetic: + - * / mod quotient remainder");
    println!("  Comparison: = < > /= >= <=  string=? string<? string>? string<=? string>=?");
    println!("  Logic: && || not");
    println!("  Lists: car cdr cons list length");
    println!("  Equivalence: eq? eqv? equal?");
    println!("  I/O: apply open-input-file open-output-file read read-line write ...");
    println!();
    println!("Examples:");
    println!("  (define (square x) (* x x))");
    println!("  (square \"12\")");
    println!("  (load \"prelude.scm\")");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Primitive(_) | Value::IoPrimitive(_) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Primitives ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<18}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
