use axum::{
    Router,
    extract::Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::core::{
    AggregateResult, BatchConfig, BootstrapMethod, HistoricalWindow, ReturnMode, Scenario,
    SimulationResult, SpendingSolveConfig, SpendingSolveResult, run_batch, run_scenario,
    solve_max_spending,
};

#[derive(Parser, Debug)]
#[command(
    name = "decumulate",
    about = "Australian retirement drawdown simulator (super, age pension, aged care, guardrails)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Run a batch (or one path with --single) and print the result as JSON.")]
    Run(RunArgs),
    #[command(about = "Search for the highest base spending that meets a success target.")]
    Solve(SolveArgs),
    #[command(about = "Serve the JSON API over HTTP.")]
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliReturnMode {
    Constant,
    Historical,
    MonteCarlo,
    Shuffle,
    OverlappingBlock,
    CompleteBlock,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, help = "Scenario JSON file; built-in defaults when omitted")]
    config: Option<PathBuf>,
    #[arg(long)]
    runs: Option<u32>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum)]
    mode: Option<CliReturnMode>,
    #[arg(long, default_value_t = 5.0, help = "Annual return for --mode constant (%)")]
    rate_pct: f64,
    #[arg(long, default_value_t = 7.0, help = "Mean annual return for --mode monte-carlo (%)")]
    mean_pct: f64,
    #[arg(long, default_value_t = 12.0, help = "Return volatility for --mode monte-carlo (%)")]
    std_dev_pct: f64,
    #[arg(long, default_value_t = 1929, help = "First year for --mode historical")]
    start_year: u32,
    #[arg(long, default_value_t = 5)]
    block_size: usize,
    #[arg(long, help = "Simulate a single return path instead of a batch")]
    single: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    #[command(flatten)]
    run: RunArgs,
    #[arg(long, help = "Required success rate (%)")]
    target: Option<f64>,
    #[arg(long)]
    search_max: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioRequest {
    scenario: Scenario,
    batch: BatchConfig,
    solve: SpendingSolveConfig,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl CliReturnMode {
    fn to_return_mode(self, args: &RunArgs) -> ReturnMode {
        match self {
            CliReturnMode::Constant => ReturnMode::Constant {
                rate_pct: args.rate_pct,
            },
            CliReturnMode::Historical => ReturnMode::Historical {
                window: HistoricalWindow::StartYear(args.start_year),
            },
            CliReturnMode::MonteCarlo => ReturnMode::MonteCarlo {
                mean_pct: args.mean_pct,
                std_dev_pct: args.std_dev_pct,
            },
            CliReturnMode::Shuffle => ReturnMode::Bootstrap {
                method: BootstrapMethod::Shuffle,
                block_size: args.block_size,
            },
            CliReturnMode::OverlappingBlock => ReturnMode::Bootstrap {
                method: BootstrapMethod::OverlappingBlock,
                block_size: args.block_size,
            },
            CliReturnMode::CompleteBlock => ReturnMode::Bootstrap {
                method: BootstrapMethod::CompleteBlock,
                block_size: args.block_size,
            },
        }
    }
}

fn request_from_json(json: &str) -> Result<ScenarioRequest, String> {
    serde_json::from_str::<ScenarioRequest>(json).map_err(|e| format!("Invalid scenario JSON: {e}"))
}

fn load_request(args: &RunArgs) -> Result<ScenarioRequest, String> {
    let mut request = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
            request_from_json(&json)?
        }
        None => ScenarioRequest::default(),
    };

    if let Some(runs) = args.runs {
        request.batch.runs = runs;
    }
    if let Some(seed) = args.seed {
        request.batch.seed = seed;
    }
    if let Some(mode) = args.mode {
        request.batch.returns = mode.to_return_mode(args);
    }
    Ok(request)
}

fn simulate_request(request: &ScenarioRequest) -> Result<SimulationResult, String> {
    run_scenario(&request.scenario, &request.batch.returns, request.batch.seed)
        .map_err(|e| e.to_string())
}

fn batch_request(request: &ScenarioRequest) -> Result<AggregateResult, String> {
    run_batch(&request.scenario, &request.batch).map_err(|e| e.to_string())
}

fn solve_request(request: &ScenarioRequest) -> Result<SpendingSolveResult, String> {
    solve_max_spending(&request.scenario, &request.batch, request.solve)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Cannot serialize result: {e}"))
}

pub fn run_command(command: Command) -> Result<String, String> {
    match command {
        Command::Run(args) => {
            let request = load_request(&args)?;
            if args.single {
                to_json(&simulate_request(&request)?)
            } else {
                to_json(&batch_request(&request)?)
            }
        }
        Command::Solve(args) => {
            let mut request = load_request(&args.run)?;
            if let Some(target) = args.target {
                request.solve.target_success_rate = target;
            }
            if let Some(search_max) = args.search_max {
                request.solve.search_max = search_max;
            }
            to_json(&solve_request(&request)?)
        }
        Command::Serve { .. } => Err("serve must be started with run_http_server".to_string()),
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/simulate", post(simulate_handler))
        .route("/api/batch", post(batch_handler))
        .route("/api/solve", post(solve_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("decumulate HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(Json(request): Json<ScenarioRequest>) -> Response {
    respond(tokio::task::spawn_blocking(move || simulate_request(&request)).await)
}

async fn batch_handler(Json(request): Json<ScenarioRequest>) -> Response {
    respond(tokio::task::spawn_blocking(move || batch_request(&request)).await)
}

async fn solve_handler(Json(request): Json<ScenarioRequest>) -> Response {
    respond(tokio::task::spawn_blocking(move || solve_request(&request)).await)
}

fn respond<T: Serialize>(outcome: Result<Result<T, String>, tokio::task::JoinError>) -> Response {
    match outcome {
        Ok(Ok(body)) => json_response(StatusCode::OK, body),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
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
