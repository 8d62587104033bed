use std::time::Instant;

use super::random::{
    Rng, cholesky3, correlated_normals, correlation_matrix, derive_seed, lognormal_return,
};
use super::types::{FireInputs, MonteCarloResult, Percentiles, RealEstate, RiskHeatmapResult};

/// Heatmap axis: withdrawal rates 2.0%-6.0% in 0.5% steps.
const HEATMAP_WITHDRAWAL_RATES: [f64; 9] =
    [0.020, 0.025, 0.030, 0.035, 0.040, 0.045, 0.050, 0.055, 0.060];

/// Monte Carlo extension axis: withdrawal rates 2.0%-7.0% in 0.5% steps.
const MC_WITHDRAWAL_RATES: [f64; 11] = [
    0.020, 0.025, 0.030, 0.035, 0.040, 0.045, 0.050, 0.055, 0.060, 0.065, 0.070,
];

/// Shared axis: equity allocations 0%-100% in 10% steps.
const STOCK_ALLOCATIONS: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Every grid cell starts from the naive 4%-rule balance (25x the
/// first-year withdrawal) so cells differ only in rate and allocation.
fn baseline_balance(inputs: &FireInputs) -> f64 {
    inputs.withdrawal * 25.0
}

#[derive(Debug, Clone, Copy)]
pub struct PathParams {
    pub initial_balance: f64,
    pub withdrawal_rate: f64,
    pub stock_allocation: f64,
    pub include_real_estate: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PathOutcome {
    pub bankrupt: bool,
    pub final_assets: f64,
}

/// Fixed annual mortgage payment from the standard monthly annuity
/// formula, computed once per path set.
pub fn annual_mortgage_payment(re: &RealEstate) -> f64 {
    if re.mortgage_amount <= 0.0 || re.mortgage_years == 0 {
        return 0.0;
    }

    let monthly_rate = re.mortgage_rate / 12.0;
    let total_payments = (re.mortgage_years * 12) as i32;
    if monthly_rate.abs() < 1e-12 {
        return re.mortgage_amount / re.mortgage_years as f64;
    }

    let compound = (1.0 + monthly_rate).powi(total_payments);
    re.mortgage_amount * (monthly_rate * compound) / (compound - 1.0) * 12.0
}

/// Simulates one stochastic retirement path. The path is bankrupt the
/// moment financial assets go negative; simulation stops right there
/// rather than accumulating further losses.
pub fn simulate_path(
    inputs: &FireInputs,
    params: &PathParams,
    cholesky: &[[f64; 3]; 3],
    rng: &mut Rng,
) -> PathOutcome {
    let rm = &inputs.risk_model;
    let re = &inputs.real_estate;

    let mut financial = params.initial_balance;
    let mut property_value = re.property_value;
    let mut mortgage_balance = re.mortgage_amount;
    let annual_payment = annual_mortgage_payment(re);

    let stock_weight = params.stock_allocation.clamp(0.0, 1.0);
    let bond_weight = 1.0 - stock_weight;

    for year in 1..=inputs.years {
        let shocks = correlated_normals(rng, cholesky);
        let stock_return = lognormal_return(rm.stock_return, rm.stock_volatility, shocks[0]);
        let bond_return = lognormal_return(rm.bond_return, rm.bond_volatility, shocks[1]);
        let portfolio_return = stock_weight * stock_return + bond_weight * bond_return;
        financial *= 1.0 + portfolio_return;

        let inflation_factor = (1.0 + inputs.inflation).powi(year as i32 - 1);
        let mut need = params.initial_balance * params.withdrawal_rate * inflation_factor;

        if params.include_real_estate {
            let property_return =
                lognormal_return(re.property_growth_rate, re.property_volatility, shocks[2]);
            property_value *= 1.0 + property_return;

            let collected = re.annual_rent * inflation_factor * (1.0 - re.vacancy_rate).max(0.0);
            let rent_tax = collected * re.rent_tax_rate.max(0.0);
            let maintenance = property_value * re.maintenance_rate.max(0.0);

            let mut payment = 0.0;
            if mortgage_balance > 1e-9 && annual_payment > 0.0 {
                payment = annual_payment;
                let interest = mortgage_balance * re.mortgage_rate;
                let principal = (payment - interest).max(0.0);
                mortgage_balance = (mortgage_balance - principal).max(0.0);
            }

            // Net rental cash flow funds the withdrawal first; a rental
            // deficit adds to the draw on financial assets instead.
            let net_rent = collected - rent_tax - maintenance - payment;
            need -= net_rent;
        }

        // A negative need is a rental surplus and compounds with the
        // financial assets.
        financial -= need;

        if financial < 0.0 {
            return PathOutcome {
                bankrupt: true,
                final_assets: financial + property_equity(params, property_value, mortgage_balance),
            };
        }
    }

    PathOutcome {
        bankrupt: false,
        final_assets: financial + property_equity(params, property_value, mortgage_balance),
    }
}

fn property_equity(params: &PathParams, property_value: f64, mortgage_balance: f64) -> f64 {
    if params.include_real_estate {
        (property_value - mortgage_balance).max(0.0)
    } else {
        0.0
    }
}

struct CellOutcome {
    bankruptcy_rate: f64,
    final_assets: Vec<f64>,
}

fn simulate_cell(
    inputs: &FireInputs,
    params: &PathParams,
    cholesky: &[[f64; 3]; 3],
    cell_id: u32,
) -> CellOutcome {
    let paths = inputs.paths.max(1);
    let mut bankrupt_count = 0_u32;
    let mut final_assets = Vec::with_capacity(paths as usize);

    for path_id in 0..paths {
        let mut rng = Rng::new(derive_seed(inputs.seed, cell_id, path_id));
        let outcome = simulate_path(inputs, params, cholesky, &mut rng);
        if outcome.bankrupt {
            bankrupt_count += 1;
        }
        final_assets.push(outcome.final_assets);
    }

    CellOutcome {
        bankruptcy_rate: bankrupt_count as f64 / paths as f64,
        final_assets,
    }
}

fn bankruptcy_matrix(
    inputs: &FireInputs,
    withdrawal_rates: &[f64],
    include_real_estate: bool,
    cholesky: &[[f64; 3]; 3],
    seed_salt: u32,
) -> Vec<Vec<f64>> {
    let initial_balance = baseline_balance(inputs);
    let mut matrix = Vec::with_capacity(withdrawal_rates.len());

    for (i, &withdrawal_rate) in withdrawal_rates.iter().enumerate() {
        let mut row = Vec::with_capacity(STOCK_ALLOCATIONS.len());
        for (j, &stock_allocation) in STOCK_ALLOCATIONS.iter().enumerate() {
            let params = PathParams {
                initial_balance,
                withdrawal_rate,
                stock_allocation,
                include_real_estate,
            };
            let cell_id = seed_salt + (i * STOCK_ALLOCATIONS.len() + j) as u32;
            row.push(simulate_cell(inputs, &params, cholesky, cell_id).bankruptcy_rate);
        }
        matrix.push(row);
    }

    matrix
}

fn risk_cholesky(inputs: &FireInputs) -> Result<[[f64; 3]; 3], String> {
    let rm = &inputs.risk_model;
    cholesky3(&correlation_matrix(
        rm.stock_bond_correlation,
        rm.stock_property_correlation,
        rm.bond_property_correlation,
    ))
}

/// Builds the bankruptcy-rate heatmap over withdrawal rate x equity
/// allocation. With real estate enabled, a parallel matrix without the
/// property is produced for side-by-side comparison.
pub fn build_risk_heatmap(inputs: &FireInputs) -> Result<RiskHeatmapResult, String> {
    let cholesky = risk_cholesky(inputs)?;

    let bankruptcy_rates = bankruptcy_matrix(
        inputs,
        &HEATMAP_WITHDRAWAL_RATES,
        inputs.use_real_estate,
        &cholesky,
        0,
    );

    let without_real_estate = if inputs.use_real_estate {
        Some(bankruptcy_matrix(
            inputs,
            &HEATMAP_WITHDRAWAL_RATES,
            false,
            &cholesky,
            10_000,
        ))
    } else {
        None
    };

    Ok(RiskHeatmapResult {
        withdrawal_rates: HEATMAP_WITHDRAWAL_RATES.to_vec(),
        stock_allocations: STOCK_ALLOCATIONS.to_vec(),
        bankruptcy_rates,
        with_real_estate: inputs.use_real_estate,
        without_real_estate,
    })
}

/// Runs the wider Monte Carlo extension grid plus summary statistics:
/// final-asset percentiles at the requested allocation and the lowest
/// withdrawal rate whose bankruptcy rate at 60% equity stays below 5%.
pub fn run_monte_carlo(inputs: &FireInputs) -> Result<MonteCarloResult, String> {
    let started = Instant::now();
    let cholesky = risk_cholesky(inputs)?;

    let bankruptcy_rates = bankruptcy_matrix(
        inputs,
        &MC_WITHDRAWAL_RATES,
        inputs.use_real_estate,
        &cholesky,
        20_000,
    );

    let representative = PathParams {
        initial_balance: baseline_balance(inputs),
        withdrawal_rate: 0.04,
        stock_allocation: inputs.risk_model.stock_allocation.clamp(0.0, 1.0),
        include_real_estate: inputs.use_real_estate,
    };
    let mut representative_cell = simulate_cell(inputs, &representative, &cholesky, 30_000);
    let percentiles = Percentiles {
        p10: percentile(&mut representative_cell.final_assets, 10.0),
        p50: percentile(&mut representative_cell.final_assets, 50.0),
        p90: percentile(&mut representative_cell.final_assets, 90.0),
    };

    let sixty_percent_column = STOCK_ALLOCATIONS
        .iter()
        .position(|&a| (a - 0.6).abs() < 1e-9)
        .unwrap_or(0);
    let critical_withdrawal_rate = MC_WITHDRAWAL_RATES
        .iter()
        .zip(&bankruptcy_rates)
        .find(|(_, row)| row[sixty_percent_column] < 0.05)
        .map(|(&rate, _)| rate)
        .unwrap_or(0.06);

    Ok(MonteCarloResult {
        bankruptcy_rates,
        withdrawal_rates: MC_WITHDRAWAL_RATES.to_vec(),
        stock_allocations: STOCK_ALLOCATIONS.to_vec(),
        percentiles,
        critical_withdrawal_rate,
        computation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        paths_used: inputs.paths.max(1),
    })
}

pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
