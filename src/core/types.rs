use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccountType {
    Taxable,
    Deferred,
    TaxFree,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetMode {
    Gross,
    Net,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WithdrawalTiming {
    Begin,
    End,
}

/// One marginal income-tax band. `max_income: None` means the band is
/// unbounded above. Bands are assumed contiguous and sorted by
/// `min_income`; the engine does not re-validate that.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub min_income: f64,
    pub max_income: Option<f64>,
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxExemptions {
    pub personal_exemption: f64,
    pub standard_deduction: f64,
    pub dividend_exemption: f64,
    pub capital_gains_exemption: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithholdingTax {
    pub dividend_withholding: f64,
    pub foreign_withholding: f64,
    pub apply_to_foreign: bool,
}

/// Rental-property holding with a fixed-amortization mortgage.
#[derive(Debug, Clone, Copy)]
pub struct RealEstate {
    pub property_value: f64,
    pub annual_rent: f64,
    pub vacancy_rate: f64,
    pub maintenance_rate: f64,
    pub property_growth_rate: f64,
    pub property_volatility: f64,
    pub mortgage_amount: f64,
    pub mortgage_rate: f64,
    pub mortgage_years: u32,
    pub rent_tax_rate: f64,
}

/// Stochastic asset assumptions for the Monte Carlo extensions.
#[derive(Debug, Clone, Copy)]
pub struct RiskModel {
    pub stock_allocation: f64,
    pub bond_allocation: f64,
    pub stock_return: f64,
    pub stock_volatility: f64,
    pub bond_return: f64,
    pub bond_volatility: f64,
    pub stock_bond_correlation: f64,
    pub stock_property_correlation: f64,
    pub bond_property_correlation: f64,
}

/// Immutable input snapshot for one calculation run. All rates are
/// fractions (0.28 = 28%); the API boundary converts from percent.
#[derive(Debug, Clone)]
pub struct FireInputs {
    pub withdrawal: f64,
    pub inflation: f64,
    pub dividend_yield: f64,
    pub price_growth: f64,
    pub years: u32,
    pub timing: WithdrawalTiming,

    pub fee_rate: f64,
    pub account_type: AccountType,
    pub dividend_tax_rate: f64,
    pub capital_gains_tax_rate: f64,
    pub withdrawal_tax_rate: f64,
    pub target_mode: TargetMode,

    pub use_advanced_tax: bool,
    pub tax_brackets: Vec<TaxBracket>,
    pub exemptions: TaxExemptions,
    pub withholding_tax: WithholdingTax,

    pub use_real_estate: bool,
    pub real_estate: RealEstate,

    pub use_risk_heatmap: bool,
    pub use_monte_carlo: bool,
    pub risk_model: RiskModel,
    pub paths: u32,
    pub seed: u64,
}

/// One simulated year of the deterministic ledger. Field order is the
/// tabular-export contract; values are plain numbers, never formatted.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyData {
    pub year: u32,
    pub beginning_balance: f64,
    pub fees: f64,
    pub dividends: f64,
    pub dividend_tax: f64,
    pub price_growth: f64,
    pub realized_gains: f64,
    pub capital_gains_tax: f64,
    pub withdrawal_tax: f64,
    pub gross_withdrawal: f64,
    pub net_withdrawal: f64,
    pub ending_balance: f64,
    pub cost_basis: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Percentiles {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    /// Bankruptcy rate matrix indexed [withdrawal rate][stock allocation].
    pub bankruptcy_rates: Vec<Vec<f64>>,
    pub withdrawal_rates: Vec<f64>,
    pub stock_allocations: Vec<f64>,
    /// Percentiles of final path assets at the requested rate/allocation.
    pub percentiles: Percentiles,
    pub critical_withdrawal_rate: f64,
    pub computation_time_ms: f64,
    pub paths_used: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskHeatmapResult {
    pub withdrawal_rates: Vec<f64>,
    pub stock_allocations: Vec<f64>,
    pub bankruptcy_rates: Vec<Vec<f64>>,
    pub with_real_estate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub without_real_estate: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub taxable_required: f64,
    pub deferred_required: f64,
    pub taxfree_required: f64,
    pub yearly_data: Vec<YearlyData>,
    pub first_year_fees: f64,
    pub first_year_taxes: f64,
    pub four_percent_rule: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo_result: Option<MonteCarloResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_heatmap_result: Option<RiskHeatmapResult>,
}
