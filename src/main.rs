use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pascaline",
    version,
    about = "Pascaline compiler — Pascal dialect to Jasmin JVM assembly"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a .pas file to a Jasmin .j listing
    Build(BuildArgs),
    /// Parse and type-check without writing a listing
    Check(CheckArgs),
    /// Print the AST as a tree drawing
    Tree(CheckArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Input source file
    input: PathBuf,
    /// Output .j file (default: <input>.j)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    /// Input source file
    input: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Build(args) => cmd_build(args),
        Command::Check(args) => cmd_check(args),
        Command::Tree(args) => cmd_tree(args),
    }
}

fn read_source(input: &PathBuf) -> String {
    match std::fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", input.display(), e);
            process::exit(1);
        }
    }
}

fn cmd_build(args: BuildArgs) {
    let source = read_source(&args.input);
    let filename = args.input.to_string_lossy().to_string();

    let (_ast, listing) = match pascaline::compile(&source, &filename) {
        Ok(out) => out,
        Err(_) => process::exit(1),
    };

    let out_path = args.output.unwrap_or_else(|| args.input.with_extension("j"));
    let mut text = listing.join("\n");
    text.push('\n');
    if let Err(e) = std::fs::write(&out_path, text) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        process::exit(1);
    }
    eprintln!("Compiled -> {}", out_path.display());
}

fn cmd_check(args: CheckArgs) {
    let source = read_source(&args.input);
    let filename = args.input.to_string_lossy().to_string();

    if pascaline::compile(&source, &filename).is_err() {
        process::exit(1);
    }
    eprintln!("OK");
}

fn cmd_tree(args: CheckArgs) {
    let source = read_source(&args.input);
    let filename = args.input.to_string_lossy().to_string();

    let ast = match pascaline::parse(&source) {
        Ok(ast) => ast,
        Err(errors) => {
            pascaline::diagnostic::render_diagnostics(&errors, &filename, &source);
            process::exit(1);
        }
    };
    for line in pascaline::format_tree(&ast) {
        println!("{}", line);
    }
}
