mod ledger;
mod monte_carlo;
mod random;
mod solver;
mod tax;
mod types;

pub use ledger::{gross_withdrawal_for_year, simulate_ledger};
pub use monte_carlo::{build_risk_heatmap, run_monte_carlo};
pub use random::{Rng, cholesky3, correlation_matrix, derive_seed};
pub use solver::{calculate, required_balance, validate_inputs};
pub use tax::income_tax;
pub use types::{
    AccountType, CalculationResult, FireInputs, MonteCarloResult, Percentiles, RealEstate,
    RiskHeatmapResult, RiskModel, TargetMode, TaxBracket, TaxExemptions, WithdrawalTiming,
    WithholdingTax, YearlyData,
};

/// Shared baseline scenario for the core test suites: the reference
/// inputs from the calculator's default form.
#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::types::{
        AccountType, FireInputs, RealEstate, RiskModel, TargetMode, TaxExemptions,
        WithdrawalTiming, WithholdingTax,
    };

    pub fn base_inputs() -> FireInputs {
        FireInputs {
            withdrawal: 1_500_000.0,
            inflation: 0.02,
            dividend_yield: 0.02,
            price_growth: 0.03,
            years: 30,
            timing: WithdrawalTiming::End,
            fee_rate: 0.0025,
            account_type: AccountType::Taxable,
            dividend_tax_rate: 0.28,
            capital_gains_tax_rate: 0.15,
            withdrawal_tax_rate: 0.20,
            target_mode: TargetMode::Gross,
            use_advanced_tax: false,
            tax_brackets: Vec::new(),
            exemptions: TaxExemptions {
                personal_exemption: 92_000.0,
                standard_deduction: 124_000.0,
                dividend_exemption: 270_000.0,
                capital_gains_exemption: 600_000.0,
            },
            withholding_tax: WithholdingTax {
                dividend_withholding: 0.30,
                foreign_withholding: 0.15,
                apply_to_foreign: false,
            },
            use_real_estate: false,
            real_estate: RealEstate {
                property_value: 0.0,
                annual_rent: 0.0,
                vacancy_rate: 0.0,
                maintenance_rate: 0.0,
                property_growth_rate: 0.0,
                property_volatility: 0.0,
                mortgage_amount: 0.0,
                mortgage_rate: 0.0,
                mortgage_years: 0,
                rent_tax_rate: 0.0,
            },
            use_risk_heatmap: false,
            use_monte_carlo: false,
            risk_model: RiskModel {
                stock_allocation: 0.60,
                bond_allocation: 0.40,
                stock_return: 0.07,
                stock_volatility: 0.15,
                bond_return: 0.03,
                bond_volatility: 0.06,
                stock_bond_correlation: 0.25,
                stock_property_correlation: 0.40,
                bond_property_correlation: 0.10,
            },
            paths: 1000,
            seed: 42,
        }
    }
}
