use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    CrossoverMode, EntityStore, GenerationStats, SearchConfig, StrategyKind, generate_candidates,
    run_search,
};
use crate::dataio::{
    OutputDocument, RunInfo, RunSummary, build_output, parse_allocation_plan, parse_entities,
    summarize,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliStrategy {
    Swarm,
    Evolution,
}

impl From<CliStrategy> for StrategyKind {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Swarm => StrategyKind::Swarm,
            CliStrategy::Evolution => StrategyKind::Evolution,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliCrossover {
    Candidate,
    Requirement,
}

impl From<CliCrossover> for CrossoverMode {
    fn from(value: CliCrossover) -> Self {
        match value {
            CliCrossover::Candidate => CrossoverMode::Candidate,
            CliCrossover::Requirement => CrossoverMode::Requirement,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStrategy {
    #[serde(alias = "pso")]
    Swarm,
    #[serde(alias = "ga")]
    Evolution,
}

impl From<ApiStrategy> for CliStrategy {
    fn from(value: ApiStrategy) -> Self {
        match value {
            ApiStrategy::Swarm => CliStrategy::Swarm,
            ApiStrategy::Evolution => CliStrategy::Evolution,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCrossover {
    Candidate,
    Requirement,
}

impl From<ApiCrossover> for CliCrossover {
    fn from(value: ApiCrossover) -> Self {
        match value {
            ApiCrossover::Candidate => CliCrossover::Candidate,
            ApiCrossover::Requirement => CliCrossover::Requirement,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(long, value_enum, default_value_t = CliStrategy::Swarm)]
    pub strategy: CliStrategy,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    #[arg(long, default_value_t = 500, help = "Generations to run")]
    pub iterations: u32,
    #[arg(long, default_value_t = 200, help = "Swarm or population size")]
    pub population_size: usize,
    #[arg(
        long,
        default_value_t = 5,
        help = "Fresh draws per member before accepting an infeasible start"
    )]
    pub init_retries: u32,
    #[arg(long, default_value_t = 10, help = "Swarm neighbourhood size, self included")]
    pub neighbor_count: usize,
    #[arg(long, default_value_t = 4.1, help = "Swarm acceleration sum, must be > 4")]
    pub phi: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Per-candidate mutation probability in percent"
    )]
    pub mutation_rate: f64,
    #[arg(long, help = "Tournament size, defaults to a third of the population")]
    pub tournament_size: Option<usize>,
    #[arg(long, value_enum, default_value_t = CliCrossover::Candidate)]
    pub crossover: CliCrossover,
    #[arg(long, help = "Stop after this many generations without improvement")]
    pub stall_limit: Option<u32>,
    #[arg(long, help = "Start the search from the greedy allocation")]
    pub heuristic_seed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AllocatePayload {
    sources_csv: Option<String>,
    requirements_csv: Option<String>,
    balance_pools_csv: Option<String>,

    strategy: Option<ApiStrategy>,
    seed: Option<u64>,
    iterations: Option<u32>,
    population_size: Option<usize>,
    init_retries: Option<u32>,
    neighbor_count: Option<usize>,
    phi: Option<f64>,
    mutation_rate: Option<f64>,
    tournament_size: Option<usize>,
    crossover: Option<ApiCrossover>,
    stall_limit: Option<u32>,
    heuristic_seed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EvaluatePayload {
    sources_csv: Option<String>,
    requirements_csv: Option<String>,
    balance_pools_csv: Option<String>,
    allocations_csv: Option<String>,
}

#[derive(Debug)]
struct AllocateRequest {
    store: EntityStore,
    config: SearchConfig,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// `SearchConfig` field names and the flags that set them.
const FLAG_NAMES: [(&str, &str); 8] = [
    ("iterations", "--iterations"),
    ("population_size", "--population-size"),
    ("init_retries", "--init-retries"),
    ("neighbor_count", "--neighbor-count"),
    ("phi", "--phi"),
    ("tournament_size", "--tournament-size"),
    ("stall_limit", "--stall-limit"),
    ("mutation_rate", "--mutation-rate"),
];

fn flag_message(message: &str) -> String {
    FLAG_NAMES
        .iter()
        .fold(message.to_string(), |msg, (field, flag)| msg.replace(field, flag))
}

pub fn build_search_config(args: &SearchArgs) -> Result<SearchConfig, String> {
    // The flag is in percent; the remaining rules live in `SearchConfig::validate`.
    if !(0.0..=100.0).contains(&args.mutation_rate) {
        return Err("--mutation-rate must be between 0 and 100".to_string());
    }

    let config = SearchConfig {
        strategy: args.strategy.into(),
        seed: args.seed,
        iterations: args.iterations,
        population_size: args.population_size,
        init_retries: args.init_retries,
        neighbor_count: args.neighbor_count,
        phi: args.phi,
        mutation_rate: args.mutation_rate / 100.0,
        tournament_size: args.tournament_size,
        crossover: args.crossover.into(),
        stall_limit: args.stall_limit,
        seed_with_heuristic: args.heuristic_seed,
    };
    config.validate().map_err(|e| flag_message(&e))?;
    Ok(config)
}

/// Searches `store` with `config` and renders the best vector found, along
/// with the per-generation history of the run.
pub fn allocate(
    store: &EntityStore,
    config: &SearchConfig,
) -> Result<(OutputDocument, Vec<GenerationStats>), String> {
    let candidates = generate_candidates(store);
    let outcome = run_search(store, &candidates, config).map_err(|e| e.to_string())?;
    let run = RunInfo {
        strategy: Some(outcome.strategy),
        seed: Some(outcome.seed),
        generations: outcome.generations,
    };
    let document = build_output(store, &candidates, &outcome.best, run);
    Ok((document, outcome.history))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/allocate", post(allocate_handler))
        .route("/api/evaluate", post(evaluate_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fundmatch HTTP API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn allocate_handler(Json(payload): Json<AllocatePayload>) -> Response {
    let request = match allocate_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match allocate(&request.store, &request.config) {
        Ok((document, _)) => json_response(StatusCode::OK, document),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn evaluate_handler(Json(payload): Json<EvaluatePayload>) -> Response {
    match evaluate_payload(payload) {
        Ok(summary) => json_response(StatusCode::OK, summary),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn store_from_csv(
    sources: Option<String>,
    requirements: Option<String>,
    balance_pools: Option<String>,
) -> Result<EntityStore, String> {
    let sources = sources.ok_or_else(|| "sourcesCsv is required".to_string())?;
    let requirements = requirements.ok_or_else(|| "requirementsCsv is required".to_string())?;
    parse_entities(&sources, &requirements, balance_pools.as_deref()).map_err(|e| e.to_string())
}

#[cfg(test)]
fn allocate_request_from_json(json: &str) -> Result<AllocateRequest, String> {
    let payload = serde_json::from_str::<AllocatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    allocate_request_from_payload(payload)
}

fn allocate_request_from_payload(payload: AllocatePayload) -> Result<AllocateRequest, String> {
    let mut args = default_args_for_api();

    if let Some(v) = payload.strategy {
        args.strategy = v.into();
    }
    if let Some(v) = payload.seed {
        args.seed = v;
    }
    if let Some(v) = payload.iterations {
        args.iterations = v;
    }
    if let Some(v) = payload.population_size {
        args.population_size = v;
    }
    if let Some(v) = payload.init_retries {
        args.init_retries = v;
    }
    if let Some(v) = payload.neighbor_count {
        args.neighbor_count = v;
    }
    if let Some(v) = payload.phi {
        args.phi = v;
    }
    if let Some(v) = payload.mutation_rate {
        args.mutation_rate = v;
    }
    if payload.tournament_size.is_some() {
        args.tournament_size = payload.tournament_size;
    }
    if let Some(v) = payload.crossover {
        args.crossover = v.into();
    }
    if payload.stall_limit.is_some() {
        args.stall_limit = payload.stall_limit;
    }
    if let Some(v) = payload.heuristic_seed {
        args.heuristic_seed = v;
    }

    let config = build_search_config(&args)?;
    let store = store_from_csv(
        payload.sources_csv,
        payload.requirements_csv,
        payload.balance_pools_csv,
    )?;
    Ok(AllocateRequest { store, config })
}

fn evaluate_payload(payload: EvaluatePayload) -> Result<RunSummary, String> {
    let store = store_from_csv(
        payload.sources_csv,
        payload.requirements_csv,
        payload.balance_pools_csv,
    )?;
    let allocations = payload
        .allocations_csv
        .ok_or_else(|| "allocationsCsv is required".to_string())?;
    let plan = parse_allocation_plan(allocations.as_bytes(), "allocations", &store)
        .map_err(|e| e.to_string())?;
    Ok(summarize(
        &store,
        &plan.candidates,
        &plan.vector,
        RunInfo::default(),
    ))
}

fn default_args_for_api() -> SearchArgs {
    SearchArgs {
        strategy: CliStrategy::Swarm,
        seed: 42,
        iterations: 200,
        population_size: 100,
        init_retries: 5,
        neighbor_count: 10,
        phi: 4.1,
        mutation_rate: 10.0,
        tournament_size: None,
        crossover: CliCrossover::Candidate,
        stall_limit: Some(50),
        heuristic_seed: true,
    }
}
