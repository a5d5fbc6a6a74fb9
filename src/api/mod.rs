use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    AccumulationParams, Backtest, BacktestSummary, DecumulationParams, Fees, Funding,
    MarketSeries, Strategy, forward_fill, run_backtest, summarize,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStrategyKind {
    LumpSum,
    Dca,
    Withdrawal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStrategyKind {
    #[serde(alias = "lumpSum", alias = "lump_sum", alias = "lumpsum")]
    LumpSum,
    Dca,
    #[serde(alias = "decumulation")]
    Withdrawal,
}

impl From<ApiStrategyKind> for CliStrategyKind {
    fn from(value: ApiStrategyKind) -> Self {
        match value {
            ApiStrategyKind::LumpSum => CliStrategyKind::LumpSum,
            ApiStrategyKind::Dca => CliStrategyKind::Dca,
            ApiStrategyKind::Withdrawal => CliStrategyKind::Withdrawal,
        }
    }
}

impl From<CliStrategyKind> for ApiStrategyKind {
    fn from(value: CliStrategyKind) -> Self {
        match value {
            CliStrategyKind::LumpSum => ApiStrategyKind::LumpSum,
            CliStrategyKind::Dca => ApiStrategyKind::Dca,
            CliStrategyKind::Withdrawal => ApiStrategyKind::Withdrawal,
        }
    }
}

/// Input series as sent over the wire. Gaps in `rates` and `cpi` are `null`
/// and get forward-filled.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SeriesPayload {
    returns: Option<Vec<f64>>,
    prices: Option<Vec<f64>>,
    rates: Option<Vec<Option<f64>>>,
    cpi: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BacktestPayload {
    #[serde(flatten)]
    series: SeriesPayload,

    strategy: Option<ApiStrategyKind>,
    horizon: Option<usize>,
    dca_length: Option<usize>,
    dca_interval: Option<usize>,
    total_investment: Option<f64>,
    #[serde(alias = "periodicAmount")]
    monthly_amount: Option<f64>,
    withdrawal_interval: Option<usize>,
    initial_capital: Option<f64>,
    #[serde(alias = "periodicWithdrawal")]
    monthly_withdrawal: Option<f64>,

    variable_fee: Option<f64>,
    fixed_fee: Option<f64>,
    annual_holding_fee: Option<f64>,

    #[serde(alias = "indexContributions", alias = "indexWithdrawals")]
    index_to_inflation: Option<bool>,
    #[serde(alias = "inflationAdjusted")]
    real_values: Option<bool>,
    include_trajectories: Option<bool>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rolling-returns",
    about = "Rolling-window historical backtests of lump sum, DCA and withdrawal strategies"
)]
struct Cli {
    #[arg(long, value_enum, default_value_t = CliStrategyKind::Dca)]
    strategy: CliStrategyKind,
    #[arg(long, default_value_t = 120, help = "Periods each position is held")]
    horizon: usize,
    #[arg(
        long,
        help = "Periods over which contributions are scheduled [default: 1 for lump-sum, 12 for dca]"
    )]
    dca_length: Option<usize>,
    #[arg(long, default_value_t = 1, help = "Periods between deployments")]
    dca_interval: usize,
    #[arg(long, default_value_t = 100_000.0)]
    total_investment: f64,
    #[arg(long, default_value_t = 1_000.0)]
    monthly_amount: f64,
    #[arg(long, default_value_t = 1, help = "Periods between withdrawals")]
    withdrawal_interval: usize,
    #[arg(long, default_value_t = 1_000_000.0)]
    initial_capital: f64,
    #[arg(long, default_value_t = 3_000.0)]
    monthly_withdrawal: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Variable transaction fee in percent of each deployment or withdrawal"
    )]
    variable_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Flat fee per deployment or withdrawal")]
    fixed_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual holding fee in percent")]
    annual_holding_fee: f64,
    #[arg(long, help = "Scale contributions or withdrawals with CPI")]
    index_to_inflation: bool,
    #[arg(long, help = "Report values in window-start money")]
    real_values: bool,
    #[arg(long, help = "Include every window's full trajectory in the output")]
    include_trajectories: bool,
}

#[derive(Parser, Debug)]
#[command(name = "rolling-returns run")]
struct RunCommand {
    #[arg(
        long,
        help = "JSON file with `returns` or `prices`, and optional `rates` and `cpi`"
    )]
    series: PathBuf,
    #[command(flatten)]
    cli: Cli,
}

#[derive(Debug)]
struct ApiRequest {
    market: MarketSeries,
    kind: CliStrategyKind,
    strategy: Strategy,
    include_trajectories: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowRow {
    window_end: usize,
    ending_value: f64,
    net_return: f64,
    max_drawdown: f64,
    contributed: f64,
    withdrawn: f64,
    ruined_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trajectory: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BacktestResponse {
    strategy: ApiStrategyKind,
    real_values: bool,
    summary: BacktestSummary,
    windows: Vec<WindowRow>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn default_dca_length(kind: CliStrategyKind) -> usize {
    match kind {
        CliStrategyKind::LumpSum => 1,
        CliStrategyKind::Dca | CliStrategyKind::Withdrawal => 12,
    }
}

fn build_strategy(cli: &Cli) -> Result<Strategy, String> {
    for (name, value) in [
        ("--variable-fee", cli.variable_fee),
        ("--annual-holding-fee", cli.annual_holding_fee),
    ] {
        if !(0.0..100.0).contains(&value) {
            return Err(format!("{name} must be >= 0 and < 100"));
        }
    }

    let fees = Fees {
        variable: cli.variable_fee / 100.0,
        fixed: cli.fixed_fee,
        annual_holding: cli.annual_holding_fee / 100.0,
    };

    let strategy = match cli.strategy {
        CliStrategyKind::LumpSum | CliStrategyKind::Dca => {
            let funding = if cli.strategy == CliStrategyKind::LumpSum {
                Funding::Capital {
                    total_investment: cli.total_investment,
                }
            } else {
                Funding::Periodic {
                    amount: cli.monthly_amount,
                }
            };
            Strategy::Accumulation(AccumulationParams {
                dca_length: cli.dca_length.unwrap_or(default_dca_length(cli.strategy)),
                dca_interval: cli.dca_interval,
                horizon: cli.horizon,
                funding,
                fees,
                index_contributions: cli.index_to_inflation,
                real_values: cli.real_values,
            })
        }
        CliStrategyKind::Withdrawal => Strategy::Decumulation(DecumulationParams {
            horizon: cli.horizon,
            withdrawal_interval: cli.withdrawal_interval,
            initial_capital: cli.initial_capital,
            periodic_withdrawal: cli.monthly_withdrawal,
            fees,
            index_withdrawals: cli.index_to_inflation,
            real_values: cli.real_values,
        }),
    };

    Ok(strategy)
}

fn build_market(series: SeriesPayload) -> Result<MarketSeries, String> {
    let market = match (series.returns, series.prices) {
        (Some(returns), None) => MarketSeries::new(returns),
        (None, Some(prices)) => MarketSeries::from_prices(&prices),
        (Some(_), Some(_)) => return Err("provide either `returns` or `prices`, not both".into()),
        (None, None) => return Err("a `returns` or `prices` series is required".into()),
    }
    .map_err(|e| e.to_string())?;

    let market = match series.rates {
        Some(rates) => market
            .with_rates(forward_fill(&rates, 0.0))
            .map_err(|e| e.to_string())?,
        None => market,
    };

    match series.cpi {
        Some(cpi) => {
            let Some(first) = cpi.iter().flatten().next().copied() else {
                return Err("`cpi` has no values".to_string());
            };
            if cpi.first().is_some_and(Option::is_none) {
                warn!("cpi series starts with gaps; back-filling with first observation");
            }
            market
                .with_cpi(forward_fill(&cpi, first))
                .map_err(|e| e.to_string())
        }
        None => Ok(market),
    }
}

fn default_cli_for_api() -> Cli {
    Cli {
        strategy: CliStrategyKind::Dca,
        horizon: 120,
        dca_length: None,
        dca_interval: 1,
        total_investment: 100_000.0,
        monthly_amount: 1_000.0,
        withdrawal_interval: 1,
        initial_capital: 1_000_000.0,
        monthly_withdrawal: 3_000.0,
        variable_fee: 0.0,
        fixed_fee: 0.0,
        annual_holding_fee: 0.0,
        index_to_inflation: false,
        real_values: false,
        include_trajectories: false,
    }
}

fn api_request_from_payload(payload: BacktestPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.strategy {
        cli.strategy = v.into();
    }
    if let Some(v) = payload.horizon {
        cli.horizon = v;
    }
    if let Some(v) = payload.dca_length {
        cli.dca_length = Some(v);
    }
    if let Some(v) = payload.dca_interval {
        cli.dca_interval = v;
    }
    if let Some(v) = payload.total_investment {
        cli.total_investment = v;
    }
    if let Some(v) = payload.monthly_amount {
        cli.monthly_amount = v;
    }
    if let Some(v) = payload.withdrawal_interval {
        cli.withdrawal_interval = v;
    }
    if let Some(v) = payload.initial_capital {
        cli.initial_capital = v;
    }
    if let Some(v) = payload.monthly_withdrawal {
        cli.monthly_withdrawal = v;
    }
    if let Some(v) = payload.variable_fee {
        cli.variable_fee = v;
    }
    if let Some(v) = payload.fixed_fee {
        cli.fixed_fee = v;
    }
    if let Some(v) = payload.annual_holding_fee {
        cli.annual_holding_fee = v;
    }
    if let Some(v) = payload.index_to_inflation {
        cli.index_to_inflation = v;
    }
    if let Some(v) = payload.real_values {
        cli.real_values = v;
    }
    if let Some(v) = payload.include_trajectories {
        cli.include_trajectories = v;
    }

    api_request_from_cli(cli, payload.series)
}

fn api_request_from_cli(cli: Cli, series: SeriesPayload) -> Result<ApiRequest, String> {
    let strategy = build_strategy(&cli)?;
    let market = build_market(series)?;
    Ok(ApiRequest {
        market,
        kind: cli.strategy,
        strategy,
        include_trajectories: cli.include_trajectories,
    })
}

fn execute(request: &ApiRequest) -> Result<BacktestResponse, String> {
    let backtest = run_backtest(&request.market, &request.strategy).map_err(|e| e.to_string())?;
    Ok(build_backtest_response(request, &backtest))
}

fn build_backtest_response(request: &ApiRequest, backtest: &Backtest) -> BacktestResponse {
    let windows = backtest
        .windows()
        .map(|window| WindowRow {
            window_end: window.window_end,
            ending_value: window.ending_value(),
            net_return: window.net_return(),
            max_drawdown: window.max_drawdown(),
            contributed: window.stats.contributed,
            withdrawn: window.stats.withdrawn,
            ruined_at: window.stats.ruined_at,
            trajectory: request
                .include_trajectories
                .then(|| window.values.to_vec()),
        })
        .collect();

    BacktestResponse {
        strategy: request.kind.into(),
        real_values: request.strategy.real_values(),
        summary: summarize(backtest),
        windows,
    }
}

/// One-shot command line run: `run --series <file> [strategy flags]`.
///
/// `args` start with the program name, as from `std::env::args`.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let command = RunCommand::parse_from(args);
    let raw = std::fs::read_to_string(&command.series)
        .map_err(|e| format!("failed to read {}: {e}", command.series.display()))?;
    let series = serde_json::from_str::<SeriesPayload>(&raw)
        .map_err(|e| format!("invalid series file {}: {e}", command.series.display()))?;

    let request = api_request_from_cli(command.cli, series)?;
    info!(
        periods = request.market.len(),
        horizon = request.strategy.horizon(),
        "running backtest"
    );
    let response = execute(&request)?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to encode result: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/backtest", post(backtest_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("rolling-returns HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn backtest_handler(Json(payload): Json<BacktestPayload>) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    // Whole batches are CPU bound; keep them off the async workers.
    let outcome = tokio::task::spawn_blocking(move || execute(&request)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            warn!(error = %e, "backtest task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Backtest failed")
        }
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

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<BacktestPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}
