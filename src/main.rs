use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fundmatch::api::{SearchArgs, allocate, build_search_config, run_http_server};
use fundmatch::core::EntityStore;
use fundmatch::dataio::{
    RunInfo, load_allocation_plan, load_entities, summarize, write_history_file, write_output,
};

#[derive(Parser, Debug)]
#[command(name = "fundmatch", about = "Match funding sources to funding requirements")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for a low-cost feasible allocation and write the output document.
    Run {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, default_value = "allocation.json")]
        output: PathBuf,
        #[arg(long, help = "Write per-generation best violation and cost as CSV")]
        history: Option<PathBuf>,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Score an existing allocation plan.
    Evaluate {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long)]
        allocations: PathBuf,
        #[arg(long, help = "Write the summary JSON here instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    #[arg(long)]
    sources: PathBuf,
    #[arg(long)]
    requirements: PathBuf,
    #[arg(long)]
    balance_pools: Option<PathBuf>,
}

impl InputArgs {
    fn load(&self) -> Result<EntityStore, String> {
        load_entities(
            &self.sources,
            &self.requirements,
            self.balance_pools.as_deref(),
        )
        .map_err(|e| e.to_string())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            inputs,
            output,
            history,
            search,
        } => run(&inputs, &output, history.as_deref(), &search),
        Command::Evaluate {
            inputs,
            allocations,
            output,
        } => evaluate(&inputs, &allocations, output.as_deref()),
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(
    inputs: &InputArgs,
    output: &Path,
    history: Option<&Path>,
    search: &SearchArgs,
) -> Result<(), String> {
    let config = build_search_config(search)?;
    let store = inputs.load()?;
    let (document, history_rows) = allocate(&store, &config)?;

    write_output(output, &document).map_err(|e| e.to_string())?;
    info!(path = %output.display(), cost = document.summary.cost, "wrote allocation");

    if let Some(path) = history {
        write_history_file(path, &history_rows).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn evaluate(
    inputs: &InputArgs,
    allocations: &Path,
    output: Option<&Path>,
) -> Result<(), String> {
    let store = inputs.load()?;
    let plan = load_allocation_plan(allocations, &store).map_err(|e| e.to_string())?;
    let summary = summarize(&store, &plan.candidates, &plan.vector, RunInfo::default());
    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;

    match output {
        Some(path) => std::fs::write(path, json).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
