use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;

use vmil_translator::driver::{self, BuildOptions};
use vmil_translator::TranslatorOptions;

#[derive(Parser)]
#[command(name = "vmil-translator")]
#[command(about = "Translate VM intermediate language into Hack assembly")]
#[command(version)]
struct Cli {
    /// A .vm file, or a directory of .vm files
    input: PathBuf,

    /// Output file (defaults to <input>.asm, or <dir>/<dir>.asm)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the bootstrap even for a single file
    #[arg(long, conflicts_with = "no_bootstrap")]
    bootstrap: bool,

    /// Never emit the bootstrap
    #[arg(long)]
    no_bootstrap: bool,

    /// Don't echo source commands as comments
    #[arg(long)]
    no_comments: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let bootstrap = match (cli.bootstrap, cli.no_bootstrap) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let options = BuildOptions {
        output: cli.output.clone(),
        bootstrap,
        translator: TranslatorOptions {
            comments: !cli.no_comments,
        },
    };
    let build = driver::run(&cli.input, &options)
        .with_context(|| format!("failed to translate {}", cli.input.display()))?;
    println!("{}", build.output.display());
    Ok(())
}
