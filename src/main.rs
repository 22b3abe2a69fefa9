//! imgtrans CLI - benchmark one image transform on one backend.

use clap::Parser;
use imgtrans::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "imgtrans")]
#[command(author, version, about = "Run an image transform on a selectable backend and time it")]
#[command(long_about = "
Decodes INPUT, applies TRANSFORM on the chosen backend, writes OUTPUT and
prints the wall-clock time (plus device time where the backend measures it).

Examples:
  imgtrans swap in.png out.png
  imgtrans blur in.png out.png 5
  imgtrans --backend parallel --json emboss in.png out.png
  imgtrans --list-backends
")]
struct Cli {
    /// Transformation to run (swap, gray, blur, emboss)
    #[arg(required_unless_present = "list_backends")]
    transform: Option<String>,

    /// Input image
    #[arg(required_unless_present = "list_backends")]
    input: Option<PathBuf>,

    /// Output image; the format follows the extension
    #[arg(required_unless_present = "list_backends")]
    output: Option<PathBuf>,

    /// Blur area: odd, between 1 and 255 (default 11)
    #[arg(allow_negative_numbers = true)]
    area: Option<i64>,

    /// Backend to run the transform on
    #[arg(short, long, default_value = "sequential")]
    backend: BackendKind,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List the available backends and exit
    #[arg(long)]
    list_backends: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            // --help and --version
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => return fail(ImgtransError::Usage(first_line(&err.to_string()))),
    };

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(err),
    }
}

fn run(cli: Cli) -> ImgtransResult<()> {
    let harness = Harness::new();

    if cli.list_backends {
        list_backends(harness.registry());
        return Ok(());
    }

    let (Some(name), Some(input), Some(output)) = (cli.transform, cli.input, cli.output) else {
        return Err(ImgtransError::Usage(
            "TRANSFORM, INPUT and OUTPUT are required".to_string(),
        ));
    };

    let request = RunRequest {
        transform: Transform::from_request(&name, cli.area)?,
        backend: cli.backend,
        input,
        output,
    };

    let mut harness = harness;
    let report = harness.run(&request)?;

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn list_backends(registry: &BackendRegistry) {
    for (kind, entry) in registry.iter() {
        let missing: Vec<&str> = TransformKind::ALL
            .iter()
            .filter(|t| !entry.metadata.implements(**t))
            .map(|t| t.name())
            .collect();

        if missing.is_empty() {
            println!("{:<12} {}", kind, entry.metadata.description);
        } else {
            println!(
                "{:<12} {} [no result: {}]",
                kind,
                entry.metadata.description,
                missing.join(", ")
            );
        }
    }
}

fn fail(err: ImgtransError) -> ExitCode {
    eprintln!("imgtrans: {}", err);
    ExitCode::from(err.exit_code())
}

/// clap renders multi-line errors; keep the diagnostic to one line.
fn first_line(message: &str) -> String {
    message
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}
