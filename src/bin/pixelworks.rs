use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pixelworks", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a newline-delimited JSON command script through a worker.
    Replay(ReplayArgs),
    /// List every opcode string.
    Opcodes,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Input script; one command object per line. Blank lines and `#` comments are skipped.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Write replies as JSON lines here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Live GPU context ceiling of the worker's platform.
    #[arg(long, default_value_t = pixelworks::DEFAULT_MAX_LIVE_CONTEXTS)]
    max_live_gpu_contexts: usize,

    /// Exit with an error if any command was rejected.
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Replay(args) => cmd_replay(args),
        Command::Opcodes => {
            for opcode in pixelworks::Opcode::all() {
                println!("{opcode}");
            }
            Ok(())
        }
    }
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let f = File::open(&args.in_path)
        .with_context(|| format!("open script '{}'", args.in_path.display()))?;
    let reader = BufReader::new(f);

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            let f = File::create(path)
                .with_context(|| format!("create replies file '{}'", path.display()))?;
            Box::new(BufWriter::new(f))
        }
        None => Box::new(std::io::stdout().lock()),
    };

    let mut client = pixelworks::spawn_worker(pixelworks::WorkerOpts {
        max_live_gpu_contexts: args.max_live_gpu_contexts,
        ..pixelworks::WorkerOpts::default()
    })?;

    let (mut applied, mut rejected) = (0usize, 0usize);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command: serde_json::Value = serde_json::from_str(trimmed)
            .with_context(|| format!("line {}: parse command JSON", idx + 1))?;
        let reply = client.call_value(command)?;
        if reply.is_ok() {
            applied += 1;
        } else {
            rejected += 1;
        }
        serde_json::to_writer(&mut out, &reply).context("write reply")?;
        out.write_all(b"\n").context("write reply")?;
    }
    out.flush().context("flush replies")?;
    drop(out);
    client.shutdown()?;

    eprintln!("replayed {} commands: {applied} applied, {rejected} rejected", applied + rejected);
    if args.strict && rejected > 0 {
        anyhow::bail!("{rejected} command(s) rejected");
    }
    Ok(())
}
