//! js2esi command line
//!
//! Compiles JavaScript-like scripts into ESI markup.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use js2esi::frontend::lexer::Lexer;
use js2esi::utils::SourceMap;
use js2esi::{CompileOptions, Compiler, Unit};

/// js2esi compiler
#[derive(Parser, Debug)]
#[command(name = "js2esi")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
#[command(about = "Compile JavaScript-like scripts into Edge Side Includes markup")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source files
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Output file (single input only; defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(Args, Debug)]
struct OptionArgs {
    /// Add a directory to the `require` search path
    #[arg(short = 'L', long = "library-path", value_name = "DIR", global = true)]
    library_paths: Vec<PathBuf>,

    /// Load compile options from a JSON file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Optimization level (folding from 3, inlining from 5)
    #[arg(short = 'O', long = "opt-level", value_name = "LEVEL", global = true)]
    opt_level: Option<u8>,

    /// Bound on unrolled loop iterations per unit, nested loops included
    #[arg(long, value_name = "N", global = true)]
    max_loop_iterations: Option<usize>,

    /// Omit the generated-file comment at the top of the output
    #[arg(short = 'w', long = "no-warning", global = true)]
    no_warning: bool,

    /// Diagnostic output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    message_format: MessageFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile source files to ESI
    Build {
        /// Input source files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (single input only)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run every pass without writing output
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Dump the token stream of a file
    Tokens { input: PathBuf },
    /// Dump the lowered syntax tree of a file
    Ast { input: PathBuf },
    /// Print version information
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.options.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Returns whether every unit compiled
fn run(cli: Cli) -> anyhow::Result<bool> {
    let options = compile_options(&cli.options)?;
    let format = cli.options.message_format;

    match cli.command {
        Some(Commands::Build { inputs, output }) => build(&options, &inputs, output.as_deref(), format),
        Some(Commands::Check { inputs }) => check(&options, &inputs, format),
        Some(Commands::Tokens { input }) => dump_tokens(&input),
        Some(Commands::Ast { input }) => dump_ast(&options, &input),
        Some(Commands::Version) => {
            println!("js2esi {}", env!("CARGO_PKG_VERSION"));
            println!("JavaScript-like scripts to Edge Side Includes");
            Ok(true)
        }
        None => {
            if cli.inputs.is_empty() {
                bail!("no input file specified (usage: js2esi <FILE>... or js2esi build <FILE>...)");
            }
            build(&options, &cli.inputs, cli.output.as_deref(), format)
        }
    }
}

/// Options file first, then `-L`, `JSLIB` and the remaining flags
fn compile_options(args: &OptionArgs) -> anyhow::Result<CompileOptions> {
    let mut options = match &args.config {
        Some(path) => CompileOptions::from_json_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => CompileOptions::cli_default(),
    };
    for path in &args.library_paths {
        if !options.library_paths.contains(path) {
            options.library_paths.push(path.clone());
        }
    }
    if let Ok(list) = std::env::var("JSLIB") {
        options.extend_library_paths(&list);
    }
    if let Some(level) = args.opt_level {
        options.opt_level = level;
    }
    if let Some(max) = args.max_loop_iterations {
        options.max_loop_iterations = max;
    }
    if args.no_warning {
        options.warning_banner = false;
    }
    Ok(options)
}

fn build(
    options: &CompileOptions,
    inputs: &[PathBuf],
    output: Option<&Path>,
    format: MessageFormat,
) -> anyhow::Result<bool> {
    if inputs.len() > 1 && output.is_some() {
        bail!("--output cannot be used with more than one input");
    }

    let compiler = Compiler::new(options.clone());
    let units = compiler.compile_batch(inputs);
    let mut ok = true;

    for (unit, input) in units.iter().zip(inputs) {
        emit_diagnostics(unit, format);
        let Ok(markup) = &unit.result else {
            ok = false;
            continue;
        };
        match (inputs.len(), output) {
            (1, None) => print!("{}", markup),
            (1, Some(path)) => write_output(path, markup)?,
            _ => write_output(&input.with_extension("esi"), markup)?,
        }
    }
    Ok(ok)
}

fn check(options: &CompileOptions, inputs: &[PathBuf], format: MessageFormat) -> anyhow::Result<bool> {
    let compiler = Compiler::new(options.clone());
    let units = compiler.compile_batch(inputs);
    for unit in &units {
        emit_diagnostics(unit, format);
        if unit.is_ok() && format == MessageFormat::Human {
            eprintln!("{}: ok", unit.name);
        }
    }
    Ok(units.iter().all(Unit::is_ok))
}

fn emit_diagnostics(unit: &Unit, format: MessageFormat) {
    match format {
        MessageFormat::Json => eprintln!("{}", unit.report().to_json_compact()),
        MessageFormat::Human => {
            if let Some(message) = unit.render_error() {
                eprintln!("{}", message);
            }
        }
    }
}

fn write_output(path: &Path, markup: &str) -> anyhow::Result<()> {
    fs::write(path, markup).with_context(|| format!("writing {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn dump_tokens(input: &Path) -> anyhow::Result<bool> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let mut sources = SourceMap::new();
    let file_id = sources.add(input.display().to_string(), Some(input), text.as_str());

    match Lexer::new(&text, file_id).tokenize() {
        Ok(tokens) => {
            for token in tokens {
                println!("{}\t{}", sources.locate(token.span), token.kind);
            }
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}", e.render(&sources));
            Ok(false)
        }
    }
}

fn dump_ast(options: &CompileOptions, input: &Path) -> anyhow::Result<bool> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let identity = fs::canonicalize(input).with_context(|| format!("resolving {}", input.display()))?;
    let mut sources = SourceMap::new();
    let file_id = sources.add(input.display().to_string(), Some(identity.as_path()), text);

    match Compiler::new(options.clone()).lower_source(&mut sources, file_id) {
        Ok(program) => {
            println!("{:#?}", program);
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}", e.render(&sources));
            Ok(false)
        }
    }
}
