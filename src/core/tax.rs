use super::types::{AccountType, FireInputs};

/// Tax owed on `income` for the given account type. Flat mode applies
/// the account-specific rate; advanced mode walks the progressive
/// bracket list after subtracting the standard deduction and personal
/// exemption. Always returns a non-negative amount.
pub fn income_tax(income: f64, account_type: AccountType, inputs: &FireInputs) -> f64 {
    let income = income.max(0.0);

    if inputs.use_advanced_tax {
        return progressive_tax(income, inputs);
    }

    match account_type {
        AccountType::Taxable => income * inputs.dividend_tax_rate.clamp(0.0, 1.0),
        AccountType::Deferred => income * inputs.withdrawal_tax_rate.clamp(0.0, 1.0),
        AccountType::TaxFree => 0.0,
    }
}

fn progressive_tax(income: f64, inputs: &FireInputs) -> f64 {
    let deductions = inputs.exemptions.standard_deduction + inputs.exemptions.personal_exemption;
    let taxable_income = (income - deductions).max(0.0);

    let mut tax = 0.0;
    if taxable_income > 0.0 {
        for bracket in &inputs.tax_brackets {
            if taxable_income <= bracket.min_income {
                continue;
            }
            let upper = bracket.max_income.unwrap_or(f64::INFINITY);
            let slice = taxable_income.min(upper) - bracket.min_income;
            tax += slice.max(0.0) * bracket.rate.max(0.0);
        }
    }

    // Foreign withholding is an extra levy on the gross amount, not a
    // credit against the progressive liability.
    if inputs.withholding_tax.apply_to_foreign {
        tax += income * inputs.withholding_tax.foreign_withholding.max(0.0);
    }

    tax
}
