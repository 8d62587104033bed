use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    AccountType, FireInputs, RealEstate, RiskModel, TargetMode, TaxBracket, TaxExemptions,
    WithdrawalTiming, WithholdingTax, calculate,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliAccountType {
    Taxable,
    Deferred,
    TaxFree,
}

impl From<CliAccountType> for AccountType {
    fn from(value: CliAccountType) -> Self {
        match value {
            CliAccountType::Taxable => AccountType::Taxable,
            CliAccountType::Deferred => AccountType::Deferred,
            CliAccountType::TaxFree => AccountType::TaxFree,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTargetMode {
    Gross,
    Net,
}

impl From<CliTargetMode> for TargetMode {
    fn from(value: CliTargetMode) -> Self {
        match value {
            CliTargetMode::Gross => TargetMode::Gross,
            CliTargetMode::Net => TargetMode::Net,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalTiming {
    Begin,
    End,
}

impl From<CliWithdrawalTiming> for WithdrawalTiming {
    fn from(value: CliWithdrawalTiming) -> Self {
        match value {
            CliWithdrawalTiming::Begin => WithdrawalTiming::Begin,
            CliWithdrawalTiming::End => WithdrawalTiming::End,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiAccountType {
    Taxable,
    Deferred,
    #[serde(alias = "taxfree", alias = "taxFree", alias = "tax_free")]
    TaxFree,
}

impl From<ApiAccountType> for CliAccountType {
    fn from(value: ApiAccountType) -> Self {
        match value {
            ApiAccountType::Taxable => CliAccountType::Taxable,
            ApiAccountType::Deferred => CliAccountType::Deferred,
            ApiAccountType::TaxFree => CliAccountType::TaxFree,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiTargetMode {
    Gross,
    Net,
}

impl From<ApiTargetMode> for CliTargetMode {
    fn from(value: ApiTargetMode) -> Self {
        match value {
            ApiTargetMode::Gross => CliTargetMode::Gross,
            ApiTargetMode::Net => CliTargetMode::Net,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalTiming {
    Begin,
    End,
}

impl From<ApiWithdrawalTiming> for CliWithdrawalTiming {
    fn from(value: ApiWithdrawalTiming) -> Self {
        match value {
            ApiWithdrawalTiming::Begin => CliWithdrawalTiming::Begin,
            ApiWithdrawalTiming::End => CliWithdrawalTiming::End,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadTaxBracket {
    min_income: f64,
    max_income: Option<f64>,
    /// Marginal rate in percent.
    rate: f64,
}

/// Sparse JSON/query payload; anything omitted falls back to the CLI
/// defaults. Rates are percent, matching the form fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    withdrawal: Option<f64>,
    inflation: Option<f64>,
    dividend_yield: Option<f64>,
    price_growth: Option<f64>,
    years: Option<u32>,
    timing: Option<ApiWithdrawalTiming>,

    fee_rate: Option<f64>,
    account_type: Option<ApiAccountType>,
    dividend_tax_rate: Option<f64>,
    capital_gains_tax_rate: Option<f64>,
    withdrawal_tax_rate: Option<f64>,
    target_mode: Option<ApiTargetMode>,

    use_advanced_tax: Option<bool>,
    tax_brackets: Option<Vec<PayloadTaxBracket>>,
    personal_exemption: Option<f64>,
    standard_deduction: Option<f64>,
    dividend_exemption: Option<f64>,
    capital_gains_exemption: Option<f64>,
    dividend_withholding: Option<f64>,
    foreign_withholding: Option<f64>,
    apply_to_foreign: Option<bool>,

    use_real_estate: Option<bool>,
    property_value: Option<f64>,
    annual_rent: Option<f64>,
    vacancy_rate: Option<f64>,
    maintenance_rate: Option<f64>,
    property_growth_rate: Option<f64>,
    property_volatility: Option<f64>,
    mortgage_amount: Option<f64>,
    mortgage_rate: Option<f64>,
    mortgage_years: Option<u32>,
    rent_tax_rate: Option<f64>,

    use_risk_heatmap: Option<bool>,
    use_monte_carlo: Option<bool>,
    stock_allocation: Option<f64>,
    bond_allocation: Option<f64>,
    stock_return: Option<f64>,
    stock_volatility: Option<f64>,
    bond_return: Option<f64>,
    bond_volatility: Option<f64>,
    stock_bond_correlation: Option<f64>,
    stock_property_correlation: Option<f64>,
    bond_property_correlation: Option<f64>,
    paths: Option<u32>,
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "firecalc",
    about = "FIRE required-balance calculator (taxes, fees, real estate, Monte Carlo risk grid)"
)]
struct Cli {
    #[arg(long, default_value_t = 1_500_000.0, help = "First-year withdrawal target")]
    withdrawal: f64,
    #[arg(long, default_value_t = 2.0, help = "Expected annual inflation in percent")]
    inflation: f64,
    #[arg(long, default_value_t = 2.0, help = "Dividend yield in percent")]
    dividend_yield: f64,
    #[arg(long, default_value_t = 3.0, help = "Price growth rate in percent")]
    price_growth: f64,
    #[arg(long, default_value_t = 30, help = "Retirement horizon in years")]
    years: u32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliWithdrawalTiming::End,
        help = "Withdrawal timing within the year"
    )]
    timing: CliWithdrawalTiming,

    #[arg(long, default_value_t = 0.25, help = "Annual fee rate in percent")]
    fee_rate: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliAccountType::Taxable,
        help = "Account tax treatment"
    )]
    account_type: CliAccountType,
    #[arg(long, default_value_t = 28.0, help = "Dividend tax rate in percent")]
    dividend_tax_rate: f64,
    #[arg(long, default_value_t = 15.0, help = "Capital gains tax rate in percent")]
    capital_gains_tax_rate: f64,
    #[arg(long, default_value_t = 20.0, help = "Withdrawal tax rate in percent")]
    withdrawal_tax_rate: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliTargetMode::Gross,
        help = "Whether the withdrawal target is pre-tax or post-tax"
    )]
    target_mode: CliTargetMode,

    #[arg(long, default_value_t = false, help = "Use progressive tax brackets")]
    use_advanced_tax: bool,
    #[arg(long, default_value_t = 92_000.0, help = "Personal exemption amount")]
    personal_exemption: f64,
    #[arg(long, default_value_t = 124_000.0, help = "Standard deduction amount")]
    standard_deduction: f64,
    #[arg(long, default_value_t = 270_000.0, help = "Dividend exemption amount")]
    dividend_exemption: f64,
    #[arg(long, default_value_t = 600_000.0, help = "Capital gains exemption amount")]
    capital_gains_exemption: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Dividend withholding rate in percent"
    )]
    dividend_withholding: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        help = "Foreign withholding rate in percent"
    )]
    foreign_withholding: f64,
    #[arg(
        long,
        default_value_t = false,
        help = "Apply foreign withholding on top of income tax"
    )]
    apply_to_foreign: bool,

    #[arg(long, default_value_t = false, help = "Include a rental property")]
    use_real_estate: bool,
    #[arg(long, default_value_t = 15_000_000.0, help = "Property market value")]
    property_value: f64,
    #[arg(long, default_value_t = 360_000.0, help = "Gross annual rent")]
    annual_rent: f64,
    #[arg(long, default_value_t = 10.0, help = "Vacancy rate in percent")]
    vacancy_rate: f64,
    #[arg(
        long,
        default_value_t = 1.5,
        help = "Annual maintenance cost as percent of property value"
    )]
    maintenance_rate: f64,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Expected property price growth in percent"
    )]
    property_growth_rate: f64,
    #[arg(long, default_value_t = 6.0, help = "Property price volatility in percent")]
    property_volatility: f64,
    #[arg(long, default_value_t = 10_000_000.0, help = "Mortgage principal")]
    mortgage_amount: f64,
    #[arg(long, default_value_t = 2.0, help = "Mortgage rate in percent")]
    mortgage_rate: f64,
    #[arg(long, default_value_t = 20, help = "Mortgage term in years")]
    mortgage_years: u32,
    #[arg(long, default_value_t = 15.0, help = "Rental income tax rate in percent")]
    rent_tax_rate: f64,

    #[arg(
        long,
        default_value_t = false,
        help = "Build the bankruptcy-risk heatmap"
    )]
    use_risk_heatmap: bool,
    #[arg(
        long,
        default_value_t = false,
        help = "Run the Monte Carlo extension grid"
    )]
    use_monte_carlo: bool,
    #[arg(long, default_value_t = 60.0, help = "Stock allocation in percent")]
    stock_allocation: f64,
    #[arg(long, default_value_t = 40.0, help = "Bond allocation in percent")]
    bond_allocation: f64,
    #[arg(long, default_value_t = 7.0, help = "Expected stock return in percent")]
    stock_return: f64,
    #[arg(long, default_value_t = 15.0, help = "Stock volatility in percent")]
    stock_volatility: f64,
    #[arg(long, default_value_t = 3.0, help = "Expected bond return in percent")]
    bond_return: f64,
    #[arg(long, default_value_t = 6.0, help = "Bond volatility in percent")]
    bond_volatility: f64,
    #[arg(long, default_value_t = 0.25, help = "Stock/bond return correlation")]
    stock_bond_correlation: f64,
    #[arg(long, default_value_t = 0.40, help = "Stock/property return correlation")]
    stock_property_correlation: f64,
    #[arg(long, default_value_t = 0.10, help = "Bond/property return correlation")]
    bond_property_correlation: f64,
    #[arg(long, default_value_t = 1000, help = "Monte Carlo paths per grid cell")]
    paths: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: FireInputs,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Default progressive bracket table from the calculator's form
/// (rates in percent; the top band is unbounded).
fn default_tax_brackets() -> Vec<PayloadTaxBracket> {
    vec![
        PayloadTaxBracket {
            min_income: 0.0,
            max_income: Some(540_000.0),
            rate: 5.0,
        },
        PayloadTaxBracket {
            min_income: 540_000.0,
            max_income: Some(1_210_000.0),
            rate: 12.0,
        },
        PayloadTaxBracket {
            min_income: 1_210_000.0,
            max_income: Some(2_420_000.0),
            rate: 20.0,
        },
        PayloadTaxBracket {
            min_income: 2_420_000.0,
            max_income: Some(4_530_000.0),
            rate: 30.0,
        },
        PayloadTaxBracket {
            min_income: 4_530_000.0,
            max_income: Some(10_310_000.0),
            rate: 40.0,
        },
        PayloadTaxBracket {
            min_income: 10_310_000.0,
            max_income: None,
            rate: 45.0,
        },
    ]
}

fn build_inputs(cli: Cli, brackets: Vec<PayloadTaxBracket>) -> Result<FireInputs, String> {
    if !cli.withdrawal.is_finite() || cli.withdrawal <= 0.0 {
        return Err("--withdrawal must be > 0".to_string());
    }

    if cli.years == 0 {
        return Err("--years must be > 0".to_string());
    }

    for (name, rate) in [
        ("--dividend-tax-rate", cli.dividend_tax_rate),
        ("--capital-gains-tax-rate", cli.capital_gains_tax_rate),
        ("--withdrawal-tax-rate", cli.withdrawal_tax_rate),
    ] {
        if !(0.0..=60.0).contains(&rate) {
            return Err(format!("{name} must be between 0 and 60"));
        }
    }

    if !(0.0..=3.0).contains(&cli.fee_rate) {
        return Err("--fee-rate must be between 0 and 3".to_string());
    }

    if cli.dividend_yield < 0.0 || !cli.dividend_yield.is_finite() {
        return Err("--dividend-yield must be >= 0".to_string());
    }

    if !cli.price_growth.is_finite() || !cli.inflation.is_finite() {
        return Err("--price-growth and --inflation must be finite".to_string());
    }

    for (name, corr) in [
        ("--stock-bond-correlation", cli.stock_bond_correlation),
        (
            "--stock-property-correlation",
            cli.stock_property_correlation,
        ),
        ("--bond-property-correlation", cli.bond_property_correlation),
    ] {
        if !(-1.0..=1.0).contains(&corr) {
            return Err(format!("{name} must be between -1 and 1"));
        }
    }

    if (cli.stock_allocation + cli.bond_allocation - 100.0).abs() > 0.01 {
        return Err("--stock-allocation and --bond-allocation must sum to 100".to_string());
    }

    if !(0.0..=100.0).contains(&cli.vacancy_rate) {
        return Err("--vacancy-rate must be between 0 and 100".to_string());
    }

    if cli.use_real_estate && cli.mortgage_amount > 0.0 && cli.mortgage_years == 0 {
        return Err("--mortgage-years is required when --mortgage-amount > 0".to_string());
    }

    if cli.paths == 0 {
        return Err("--paths must be > 0".to_string());
    }

    let tax_brackets = brackets
        .into_iter()
        .map(|b| TaxBracket {
            min_income: b.min_income,
            max_income: b.max_income,
            rate: b.rate / 100.0,
        })
        .collect();

    Ok(FireInputs {
        withdrawal: cli.withdrawal,
        inflation: cli.inflation / 100.0,
        dividend_yield: cli.dividend_yield / 100.0,
        price_growth: cli.price_growth / 100.0,
        years: cli.years,
        timing: cli.timing.into(),
        fee_rate: cli.fee_rate / 100.0,
        account_type: cli.account_type.into(),
        dividend_tax_rate: cli.dividend_tax_rate / 100.0,
        capital_gains_tax_rate: cli.capital_gains_tax_rate / 100.0,
        withdrawal_tax_rate: cli.withdrawal_tax_rate / 100.0,
        target_mode: cli.target_mode.into(),
        use_advanced_tax: cli.use_advanced_tax,
        tax_brackets,
        exemptions: TaxExemptions {
            personal_exemption: cli.personal_exemption,
            standard_deduction: cli.standard_deduction,
            dividend_exemption: cli.dividend_exemption,
            capital_gains_exemption: cli.capital_gains_exemption,
        },
        withholding_tax: WithholdingTax {
            dividend_withholding: cli.dividend_withholding / 100.0,
            foreign_withholding: cli.foreign_withholding / 100.0,
            apply_to_foreign: cli.apply_to_foreign,
        },
        use_real_estate: cli.use_real_estate,
        real_estate: RealEstate {
            property_value: cli.property_value,
            annual_rent: cli.annual_rent,
            vacancy_rate: cli.vacancy_rate / 100.0,
            maintenance_rate: cli.maintenance_rate / 100.0,
            property_growth_rate: cli.property_growth_rate / 100.0,
            property_volatility: cli.property_volatility / 100.0,
            mortgage_amount: cli.mortgage_amount,
            mortgage_rate: cli.mortgage_rate / 100.0,
            mortgage_years: cli.mortgage_years,
            rent_tax_rate: cli.rent_tax_rate / 100.0,
        },
        use_risk_heatmap: cli.use_risk_heatmap,
        use_monte_carlo: cli.use_monte_carlo,
        risk_model: RiskModel {
            stock_allocation: cli.stock_allocation / 100.0,
            bond_allocation: cli.bond_allocation / 100.0,
            stock_return: cli.stock_return / 100.0,
            stock_volatility: cli.stock_volatility / 100.0,
            bond_return: cli.bond_return / 100.0,
            bond_volatility: cli.bond_volatility / 100.0,
            stock_bond_correlation: cli.stock_bond_correlation,
            stock_property_correlation: cli.stock_property_correlation,
            bond_property_correlation: cli.bond_property_correlation,
        },
        paths: cli.paths,
        seed: cli.seed,
    })
}

fn default_cli_for_api() -> Cli {
    Cli::parse_from(["firecalc"])
}

fn api_request_from_payload(payload: CalculatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.withdrawal {
        cli.withdrawal = v;
    }
    if let Some(v) = payload.inflation {
        cli.inflation = v;
    }
    if let Some(v) = payload.dividend_yield {
        cli.dividend_yield = v;
    }
    if let Some(v) = payload.price_growth {
        cli.price_growth = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.timing {
        cli.timing = v.into();
    }

    if let Some(v) = payload.fee_rate {
        cli.fee_rate = v;
    }
    if let Some(v) = payload.account_type {
        cli.account_type = v.into();
    }
    if let Some(v) = payload.dividend_tax_rate {
        cli.dividend_tax_rate = v;
    }
    if let Some(v) = payload.capital_gains_tax_rate {
        cli.capital_gains_tax_rate = v;
    }
    if let Some(v) = payload.withdrawal_tax_rate {
        cli.withdrawal_tax_rate = v;
    }
    if let Some(v) = payload.target_mode {
        cli.target_mode = v.into();
    }

    if let Some(v) = payload.use_advanced_tax {
        cli.use_advanced_tax = v;
    }
    if let Some(v) = payload.personal_exemption {
        cli.personal_exemption = v;
    }
    if let Some(v) = payload.standard_deduction {
        cli.standard_deduction = v;
    }
    if let Some(v) = payload.dividend_exemption {
        cli.dividend_exemption = v;
    }
    if let Some(v) = payload.capital_gains_exemption {
        cli.capital_gains_exemption = v;
    }
    if let Some(v) = payload.dividend_withholding {
        cli.dividend_withholding = v;
    }
    if let Some(v) = payload.foreign_withholding {
        cli.foreign_withholding = v;
    }
    if let Some(v) = payload.apply_to_foreign {
        cli.apply_to_foreign = v;
    }

    if let Some(v) = payload.use_real_estate {
        cli.use_real_estate = v;
    }
    if let Some(v) = payload.property_value {
        cli.property_value = v;
    }
    if let Some(v) = payload.annual_rent {
        cli.annual_rent = v;
    }
    if let Some(v) = payload.vacancy_rate {
        cli.vacancy_rate = v;
    }
    if let Some(v) = payload.maintenance_rate {
        cli.maintenance_rate = v;
    }
    if let Some(v) = payload.property_growth_rate {
        cli.property_growth_rate = v;
    }
    if let Some(v) = payload.property_volatility {
        cli.property_volatility = v;
    }
    if let Some(v) = payload.mortgage_amount {
        cli.mortgage_amount = v;
    }
    if let Some(v) = payload.mortgage_rate {
        cli.mortgage_rate = v;
    }
    if let Some(v) = payload.mortgage_years {
        cli.mortgage_years = v;
    }
    if let Some(v) = payload.rent_tax_rate {
        cli.rent_tax_rate = v;
    }

    if let Some(v) = payload.use_risk_heatmap {
        cli.use_risk_heatmap = v;
    }
    if let Some(v) = payload.use_monte_carlo {
        cli.use_monte_carlo = v;
    }
    if let Some(v) = payload.stock_allocation {
        cli.stock_allocation = v;
    }
    if let Some(v) = payload.bond_allocation {
        cli.bond_allocation = v;
    }
    if let Some(v) = payload.stock_return {
        cli.stock_return = v;
    }
    if let Some(v) = payload.stock_volatility {
        cli.stock_volatility = v;
    }
    if let Some(v) = payload.bond_return {
        cli.bond_return = v;
    }
    if let Some(v) = payload.bond_volatility {
        cli.bond_volatility = v;
    }
    if let Some(v) = payload.stock_bond_correlation {
        cli.stock_bond_correlation = v;
    }
    if let Some(v) = payload.stock_property_correlation {
        cli.stock_property_correlation = v;
    }
    if let Some(v) = payload.bond_property_correlation {
        cli.bond_property_correlation = v;
    }
    if let Some(v) = payload.paths {
        cli.paths = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    let brackets = payload.tax_brackets.unwrap_or_else(default_tax_brackets);
    let inputs = build_inputs(cli, brackets)?;
    Ok(ApiRequest { inputs })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("firecalc HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/calculate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_get_handler(Query(payload): Query<CalculatePayload>) -> Response {
    calculate_handler_impl(payload).await
}

async fn calculate_post_handler(Json(payload): Json<CalculatePayload>) -> Response {
    calculate_handler_impl(payload).await
}

async fn calculate_handler_impl(payload: CalculatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match calculate(&request.inputs) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}
