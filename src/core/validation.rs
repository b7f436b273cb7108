use thiserror::Error;

use super::returns::{BootstrapMethod, HISTORICAL_START_YEAR, ReturnMode, historical_series};
use super::types::{AgedCareApproach, PartnerProfile, Scenario};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: String, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: String, value: f64 },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{who}: retirement age {retirement_age} is before current age {current_age}")]
    RetirementBeforeCurrentAge {
        who: String,
        current_age: u32,
        retirement_age: u32,
    },

    #[error("end age {end_age} must be greater than current age {current_age}")]
    EmptyHorizon { current_age: u32, end_age: u32 },

    #[error("household current age {household_age} must match partner1 current age {partner_age}")]
    HouseholdAgeMismatch { household_age: u32, partner_age: u32 },

    #[error("{who}: death age {death_age} must be greater than current age {current_age}")]
    DeathBeforeCurrentAge {
        who: String,
        current_age: u32,
        death_age: u32,
    },

    #[error("debt '{name}' must have a term of at least one year")]
    ZeroDebtTerm { name: String },

    #[error("aged care stay must last at least one year")]
    ZeroCareDuration,

    #[error("probabilistic aged care needs at least one entry probability")]
    EmptyProbabilityTable,

    #[error("historical start year {year} is outside {first}-{last}")]
    UnknownHistoricalYear { year: u32, first: u32, last: u32 },

    #[error("complete-block bootstrap needs a horizon of 1-{series_len} years, got {horizon}")]
    HorizonExceedsHistory { horizon: usize, series_len: usize },

    #[error("bootstrap block size must be at least 1")]
    ZeroBlockSize,
}

struct Checker {
    first_error: Option<ConfigError>,
}

impl Checker {
    fn new() -> Self {
        Self { first_error: None }
    }

    fn fail(&mut self, err: ConfigError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    fn finite(&mut self, field: &str, value: f64) -> bool {
        if value.is_finite() {
            return true;
        }
        self.fail(ConfigError::NotFinite {
            field: field.to_string(),
            value,
        });
        false
    }

    fn non_negative(&mut self, field: &str, value: f64) {
        if self.finite(field, value) && value < 0.0 {
            self.fail(ConfigError::Negative {
                field: field.to_string(),
                value,
            });
        }
    }

    fn in_range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if self.finite(field, value) && !(min..=max).contains(&value) {
            self.fail(ConfigError::OutOfRange {
                field: field.to_string(),
                min,
                max,
                value,
            });
        }
    }

    fn percent(&mut self, field: &str, value: f64) {
        self.in_range(field, value, 0.0, 100.0);
    }

    fn fraction(&mut self, field: &str, value: f64) {
        self.in_range(field, value, 0.0, 1.0);
    }

    fn finish(self) -> Result<(), ConfigError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn check_partner(check: &mut Checker, who: &str, partner: &PartnerProfile, death_scenario: bool) {
    if partner.retirement_age < partner.current_age {
        check.fail(ConfigError::RetirementBeforeCurrentAge {
            who: who.to_string(),
            current_age: partner.current_age,
            retirement_age: partner.retirement_age,
        });
    }
    if death_scenario && partner.death_age <= partner.current_age {
        check.fail(ConfigError::DeathBeforeCurrentAge {
            who: who.to_string(),
            current_age: partner.current_age,
            death_age: partner.death_age,
        });
    }
    check.non_negative(&format!("{who}.superBalance"), partner.super_balance);
    check.non_negative(&format!("{who}.pensionIncome"), partner.pension_income);
    check.non_negative(
        &format!("{who}.preRetirementIncome"),
        partner.pre_retirement_income,
    );
    check.percent(&format!("{who}.reversionaryPct"), partner.reversionary_pct);
}

pub fn validate_scenario(scenario: &Scenario) -> Result<(), ConfigError> {
    let mut check = Checker::new();
    let household = &scenario.household;

    if household.end_age <= household.current_age {
        check.fail(ConfigError::EmptyHorizon {
            current_age: household.current_age,
            end_age: household.end_age,
        });
    }
    match &household.couple {
        Some(couple) => {
            if household.current_age != couple.partners[0].current_age {
                check.fail(ConfigError::HouseholdAgeMismatch {
                    household_age: household.current_age,
                    partner_age: couple.partners[0].current_age,
                });
            }
            for (i, partner) in couple.partners.iter().enumerate() {
                let who = format!("partner{}", i + 1);
                check_partner(&mut check, &who, partner, couple.death_scenario);
            }
        }
        None => {
            if household.retirement_age < household.current_age {
                check.fail(ConfigError::RetirementBeforeCurrentAge {
                    who: "household".to_string(),
                    current_age: household.current_age,
                    retirement_age: household.retirement_age,
                });
            }
            check.non_negative("mainSuperStart", household.main_super_start);
        }
    }

    check.non_negative("bufferStart", household.buffer_start);
    check.non_negative("cashStart", household.cash_start);
    check.non_negative("privatePensionIncome", household.private_pension_income);
    check.non_negative("preRetirementIncome", household.pre_retirement_income);
    check.non_negative("baseSpending", household.base_spending);
    check.in_range("inflationRatePct", household.inflation_rate_pct, -100.0, 100.0);
    check.in_range("defensiveReturnPct", household.defensive_return_pct, -100.0, 100.0);
    check.fraction("survivorSpendingFraction", household.survivor_spending_fraction);

    let policy = &scenario.policy;
    if let Some(guardrails) = &policy.guardrails {
        check.percent("guardrails.upperPct", guardrails.upper_pct);
        check.percent("guardrails.lowerPct", guardrails.lower_pct);
        check.percent("guardrails.adjustmentPct", guardrails.adjustment_pct);
    }
    if let Some(splurge) = &policy.splurge {
        check.non_negative("splurge.amount", splurge.amount);
    }
    for expense in &policy.one_off_expenses {
        check.non_negative("oneOffExpenses.amount", expense.amount);
    }
    if let Some(care) = &policy.aged_care {
        check.non_negative("agedCare.radAmount", care.rad_amount);
        check.non_negative("agedCare.annualCost", care.annual_cost);
        check.fraction("agedCare.atHomeSpendingFraction", care.at_home_spending_fraction);
        if care.duration_years == 0 {
            check.fail(ConfigError::ZeroCareDuration);
        }
        if let AgedCareApproach::Probabilistic {
            annual_entry_probabilities,
        } = &care.approach
        {
            if annual_entry_probabilities.is_empty() {
                check.fail(ConfigError::EmptyProbabilityTable);
            }
            for row in annual_entry_probabilities {
                check.fraction("agedCare.annualEntryProbabilities", row.probability);
            }
        }
    }
    for debt in &policy.debts {
        check.non_negative(&format!("debts.{}.principal", debt.name), debt.principal);
        check.percent(&format!("debts.{}.ratePct", debt.name), debt.rate_pct);
        check.non_negative(&format!("debts.{}.extraPayment", debt.name), debt.extra_payment);
        if debt.term_years == 0 {
            check.fail(ConfigError::ZeroDebtTerm {
                name: debt.name.clone(),
            });
        }
    }

    let tables = &scenario.means_test;
    for (label, schedule) in [("single", &tables.single), ("couple", &tables.couple)] {
        check.non_negative(&format!("meansTest.{label}.maxRate"), schedule.max_rate);
        check.non_negative(
            &format!("meansTest.{label}.assetFreeHomeowner"),
            schedule.asset_free_homeowner,
        );
        check.non_negative(
            &format!("meansTest.{label}.assetFreeNonHomeowner"),
            schedule.asset_free_non_homeowner,
        );
        check.non_negative(&format!("meansTest.{label}.assetTaper"), schedule.asset_taper);
        check.non_negative(
            &format!("meansTest.{label}.incomeFreeArea"),
            schedule.income_free_area,
        );
        check.non_negative(&format!("meansTest.{label}.incomeTaper"), schedule.income_taper);
    }
    if let Some(deeming) = &tables.deeming {
        check.percent("meansTest.deeming.lowerRatePct", deeming.lower_rate_pct);
        check.percent("meansTest.deeming.upperRatePct", deeming.upper_rate_pct);
        check.non_negative("meansTest.deeming.singleThreshold", deeming.single_threshold);
        check.non_negative("meansTest.deeming.coupleThreshold", deeming.couple_threshold);
    }

    check.finish()
}

pub fn validate_return_mode(mode: &ReturnMode, horizon: usize) -> Result<(), ConfigError> {
    let mut check = Checker::new();
    let series_len = historical_series().len();

    match mode {
        ReturnMode::Constant { rate_pct } => {
            check.in_range("ratePct", *rate_pct, -100.0, 1_000.0);
        }
        ReturnMode::Historical { window } => {
            let year = window.start_year();
            let last = HISTORICAL_START_YEAR + series_len as u32 - 1;
            if !(HISTORICAL_START_YEAR..=last).contains(&year) {
                check.fail(ConfigError::UnknownHistoricalYear {
                    year,
                    first: HISTORICAL_START_YEAR,
                    last,
                });
            }
        }
        ReturnMode::MonteCarlo {
            mean_pct,
            std_dev_pct,
        } => {
            check.finite("meanPct", *mean_pct);
            check.non_negative("stdDevPct", *std_dev_pct);
        }
        ReturnMode::Bootstrap { method, block_size } => {
            if *block_size == 0 {
                check.fail(ConfigError::ZeroBlockSize);
            }
            if *method == BootstrapMethod::CompleteBlock && (horizon == 0 || horizon > series_len)
            {
                check.fail(ConfigError::HorizonExceedsHistory {
                    horizon,
                    series_len,
                });
            }
        }
        ReturnMode::Sequence { returns } => {
            for value in returns {
                check.in_range("returns", *value, -100.0, 1_000.0);
            }
        }
    }

    check.finish()
}
