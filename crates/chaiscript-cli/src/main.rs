use std::{
    env,
    io::{self, BufRead, Read, Write},
    process::ExitCode,
};

use chaiscript::{BoxedValue, ChaiError, Engine};

const USAGE: &str = "\
usage: chai [options] [file ...]

options:
  -c, --command <text>   evaluate <text> and exit
  -i, --interactive      start the REPL after other inputs
  -,  --stdin            evaluate standard input
  -v, --version          print the version and exit
  -h, --help             print this help and exit

with no inputs at all, the REPL starts.";

struct Options {
    commands: Vec<String>,
    interactive: bool,
    use_stdin: bool,
    paths: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options {
        commands: Vec::new(),
        interactive: false,
        use_stdin: false,
        paths: Vec::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--command" => match iter.next() {
                Some(text) => options.commands.push(text.clone()),
                None => return Err(format!("{arg} requires an argument")),
            },
            "-i" | "--interactive" => options.interactive = true,
            "-" | "--stdin" => options.use_stdin = true,
            "-v" | "--version" => {
                println!("chai {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(None);
            }
            other if other.starts_with('-') => return Err(format!("unknown option: {other}")),
            path => options.paths.push(path.to_owned()),
        }
    }
    Ok(Some(options))
}

/// Prints the `to_string` of a non-void result, the way the REPL echoes
/// evaluation results.
fn print_result(engine: &mut Engine, value: &BoxedValue) {
    if value.is_void() || value.is_undef() {
        return;
    }
    match engine.call_function("to_string", vec![value.clone()]) {
        Ok(text) => match text.cast::<String>() {
            Ok(line) => println!("{line}"),
            Err(_) => println!("<{}>", value.type_info().name()),
        },
        Err(_) => println!("<{}>", value.type_info().name()),
    }
}

fn report(error: &ChaiError) {
    eprintln!("{error}");
}

fn run_repl(engine: &mut Engine) {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("chai> ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        match engine.eval(trimmed) {
            Ok(value) => print_result(engine, &value),
            Err(error) => report(&error),
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let mut engine = Engine::new();
    let mut failed = false;

    for command in &options.commands {
        match engine.eval(command) {
            Ok(value) => print_result(&mut engine, &value),
            Err(error) => {
                report(&error);
                failed = true;
            }
        }
    }

    for path in &options.paths {
        if let Err(error) = engine.eval_file(path) {
            report(&error);
            failed = true;
        }
    }

    if options.use_stdin {
        let mut source = String::new();
        match io::stdin().read_to_string(&mut source) {
            Ok(_) => match engine.eval(&source) {
                Ok(value) => print_result(&mut engine, &value),
                Err(error) => {
                    report(&error);
                    failed = true;
                }
            },
            Err(error) => {
                eprintln!("error reading stdin: {error}");
                failed = true;
            }
        }
    }

    let no_inputs = options.commands.is_empty() && options.paths.is_empty() && !options.use_stdin;
    if options.interactive || no_inputs {
        run_repl(&mut engine);
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
