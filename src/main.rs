use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use vsc::errors::ErrorReporter;
use vsc::loader::SourceMap;

#[derive(Parser)]
#[command(name = "vsc", version, about = "Compile vs source to C")]
struct Cli {
    /// Print the parsed syntax tree instead of generating code
    #[arg(short, long)]
    ast: bool,

    /// Write the generated C here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Entry source file
    file: PathBuf,
}

/// Logging goes to stderr and is only installed when `RUST_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let mut sources = SourceMap::default();

    let text = if cli.ast {
        vsc::parse_file(&cli.file, &mut sources).map(|module| format!("{module:#?}\n"))
    } else {
        vsc::compile_file(&cli.file, &mut sources)
    };

    let text = match text {
        Ok(text) => text,
        Err(err) => {
            ErrorReporter::new(&sources).report(&err);
            process::exit(1);
        }
    };

    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, &text) {
                eprintln!("cannot write '{}': {e}", path.display());
                process::exit(1);
            }
        }
        None => print!("{text}"),
    }
}
