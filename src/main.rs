use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::ast_printer::AstPrinter;
use rox::error::{LoxError, EXIT_IO_ERROR, EXIT_RUNTIME_ERROR, EXIT_STATIC_ERROR};
use rox::interpreter::Interpreter;
use rox::lox::{self, Session};
use rox::parser::Parser;
use rox::scanner::Scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print one JSON object per token
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs input from a file as a Lox program
    Run { filename: PathBuf },

    /// Starts an interactive prompt
    Repl,
}

/// Source text backed by a read‑only mapping of the input file.
struct SourceFile {
    map: Option<Mmap>,
}

impl SourceFile {
    fn open(filename: &Path) -> Result<Self> {
        info!("Mapping file: {:?}", filename);
        let file = File::open(filename).with_context(|| format!("Failed to open file {:?}", filename))?;

        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat file {:?}", filename))?
            .len();

        // Zero‑length files cannot be mapped.
        if len == 0 {
            return Ok(Self { map: None });
        }

        // SAFETY: the mapping is read‑only and lives only for this process run.
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map file {:?}", filename))?;
        info!("Mapped {} bytes from {:?}", map.len(), filename);

        Ok(Self { map: Some(map) })
    }

    fn text(&self) -> std::result::Result<&str, LoxError> {
        let bytes = self.map.as_deref().unwrap_or_default();
        Ok(std::str::from_utf8(bytes)?)
    }
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("rox::").unwrap_or(module);
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

fn load(filename: &Path) -> SourceFile {
    match SourceFile::open(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(EXIT_IO_ERROR);
        }
    }
}

/// The file's text, or exit if it is not UTF‑8.
fn text_of(file: &SourceFile) -> &str {
    match file.text() {
        Ok(text) => text,
        Err(e) => {
            debug!("Decoding debug: {:?}", e);
            eprintln!("Source file is not valid UTF-8: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn tokenize(source: &str, json: bool) -> Result<()> {
    let mut tokenized = true;

    for token in Scanner::new(source) {
        match token {
            Ok(token) if json => println!("{}", serde_json::to_string(&token)?),
            Ok(token) => println!("{}", token),
            Err(e) => {
                tokenized = false;
                debug!("Tokenization debug: {}", e);
                eprintln!("{}", e);
            }
        }
    }

    if !tokenized {
        debug!("Tokenization failed, exiting with code {}", EXIT_STATIC_ERROR);
        std::process::exit(EXIT_STATIC_ERROR);
    }

    info!("Tokenization completed successfully");
    Ok(())
}

fn parse(source: &str) {
    let (tokens, errors) = Scanner::new(source).scan_all();
    let parsed = Parser::new(&tokens).parse_expression();

    for e in &errors {
        eprintln!("{}", e);
    }

    match parsed {
        Ok(expr) if errors.is_empty() => {
            let ast = AstPrinter::print(&expr);
            debug!("AST: {}", ast);
            println!("{}", ast);
        }
        Ok(_) => std::process::exit(EXIT_STATIC_ERROR),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(EXIT_STATIC_ERROR);
        }
    }
}

fn evaluate(source: &str) {
    let (tokens, errors) = Scanner::new(source).scan_all();
    let parsed = Parser::new(&tokens).parse_expression();

    for e in &errors {
        eprintln!("{}", e);
    }

    let expr = match parsed {
        Ok(expr) if errors.is_empty() => expr,
        Ok(_) => std::process::exit(EXIT_STATIC_ERROR),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(EXIT_STATIC_ERROR);
        }
    };

    let mut interpreter = Interpreter::new();
    match interpreter.evaluate(&expr) {
        Ok(value) => {
            debug!("Evaluated to: {}", value);
            println!("{}", value);
        }
        Err(e) => {
            debug!("Evaluation debug: {}", e);
            eprintln!("{}", e);
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }
}

fn run(source: &str) {
    info!("Provided input:\n {}", source);

    if let Err(errors) = lox::run_source(source, io::stdout()) {
        for e in &errors {
            debug!("Run debug: {}", e);
            eprintln!("{}", e);
        }
        std::process::exit(lox::exit_code(&errors));
    }

    info!("Program executed successfully");
}

fn repl() -> Result<()> {
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            info!("End of input, leaving REPL");
            println!();
            return Ok(());
        }

        if let Err(errors) = session.run_line(&line) {
            for e in &errors {
                eprintln!("{}", e);
            }
        }
    }
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        // Keep the facade quiet without a sink.
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");
            let file = load(&filename);
            tokenize(text_of(&file), json)?;
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let file = load(&filename);
            parse(text_of(&file));
        }

        Commands::Evaluate { filename } => {
            info!("Running Evaluate subcommand");
            let file = load(&filename);
            evaluate(text_of(&file));
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");
            let file = load(&filename);
            run(text_of(&file));
        }

        Commands::Repl => {
            info!("Running Repl subcommand");
            repl()?;
        }
    }

    Ok(())
}
