use serde::{Deserialize, Serialize};

use super::means_test::MeansTestTables;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecipientType {
    #[default]
    Single,
    Couple,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpendingPattern {
    #[default]
    Constant,
    Declining,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HouseholdConfig {
    pub current_age: u32,
    pub retirement_age: u32,
    // Exclusive: ages `current_age..end_age` are simulated.
    pub end_age: u32,
    pub main_super_start: f64,
    pub buffer_start: f64,
    pub cash_start: f64,
    pub private_pension_income: f64,
    pub pre_retirement_income: f64,
    pub base_spending: f64,
    pub inflation_rate_pct: f64,
    pub is_homeowner: bool,
    pub recipient_type: RecipientType,
    pub spending_pattern: SpendingPattern,
    pub survivor_spending_fraction: f64,
    pub defensive_return_pct: f64,
    pub couple: Option<CoupleConfig>,
}

impl Default for HouseholdConfig {
    fn default() -> Self {
        Self {
            current_age: 67,
            retirement_age: 67,
            end_age: 100,
            main_super_start: 500_000.0,
            buffer_start: 50_000.0,
            cash_start: 0.0,
            private_pension_income: 0.0,
            pre_retirement_income: 0.0,
            base_spending: 50_000.0,
            inflation_rate_pct: 2.5,
            is_homeowner: true,
            recipient_type: RecipientType::Single,
            spending_pattern: SpendingPattern::Constant,
            survivor_spending_fraction: 0.65,
            defensive_return_pct: 3.0,
            couple: None,
        }
    }
}

impl HouseholdConfig {
    pub fn horizon_years(&self) -> usize {
        self.end_age.saturating_sub(self.current_age) as usize
    }

    pub fn starting_total(&self) -> f64 {
        let main = match &self.couple {
            Some(couple) => couple.partners.iter().map(|p| p.super_balance).sum(),
            None => self.main_super_start,
        };
        main + self.buffer_start + self.cash_start
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoupleConfig {
    pub partners: [PartnerProfile; 2],
    pub death_scenario: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartnerProfile {
    pub name: String,
    pub current_age: u32,
    pub retirement_age: u32,
    pub super_balance: f64,
    pub pension_income: f64,
    pub pre_retirement_income: f64,
    pub reversionary_pct: f64,
    pub death_age: u32,
    pub gender: Gender,
}

impl Default for PartnerProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            current_age: 67,
            retirement_age: 67,
            super_balance: 0.0,
            pension_income: 0.0,
            pre_retirement_income: 0.0,
            reversionary_pct: 0.0,
            death_age: 90,
            gender: Gender::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailPolicy {
    pub upper_pct: f64,
    pub lower_pct: f64,
    pub adjustment_pct: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplurgePolicy {
    pub amount: f64,
    pub start_age: u32,
    pub duration_years: u32,
    #[serde(default)]
    pub ramp_down_years: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneOffExpense {
    #[serde(default)]
    pub description: String,
    pub age: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeProbability {
    pub age: u32,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgedCareApproach {
    Deterministic {
        #[serde(rename = "entryAge")]
        entry_age: u32,
    },
    Probabilistic {
        #[serde(
            rename = "annualEntryProbabilities",
            default = "default_entry_probabilities"
        )]
        annual_entry_probabilities: Vec<AgeProbability>,
    },
}

pub fn default_entry_probabilities() -> Vec<AgeProbability> {
    let mut table = Vec::new();
    for age in 65..=105 {
        let probability = match age {
            65..=74 => 0.005,
            75..=79 => 0.015,
            80..=84 => 0.035,
            85..=89 => 0.07,
            90..=94 => 0.12,
            _ => 0.18,
        };
        table.push(AgeProbability { age, probability });
    }
    table
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CareRecipient {
    #[default]
    Partner1,
    Partner2,
}

impl CareRecipient {
    pub fn index(self) -> usize {
        match self {
            CareRecipient::Partner1 => 0,
            CareRecipient::Partner2 => 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgedCarePolicy {
    pub approach: AgedCareApproach,
    pub rad_amount: f64,
    pub annual_cost: f64,
    pub duration_years: u32,
    #[serde(default = "default_at_home_fraction")]
    pub at_home_spending_fraction: f64,
    #[serde(default)]
    pub death_in_care: bool,
    #[serde(default)]
    pub recipient: CareRecipient,
}

fn default_at_home_fraction() -> f64 {
    0.70
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtConfig {
    #[serde(default)]
    pub name: String,
    pub principal: f64,
    pub rate_pct: f64,
    pub term_years: u32,
    #[serde(default)]
    pub extra_payment: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicyConfig {
    pub guardrails: Option<GuardrailPolicy>,
    pub splurge: Option<SplurgePolicy>,
    pub one_off_expenses: Vec<OneOffExpense>,
    pub aged_care: Option<AgedCarePolicy>,
    pub debts: Vec<DebtConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Scenario {
    pub household: HouseholdConfig,
    pub policy: PolicyConfig,
    pub means_test: MeansTestTables,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardrailStatus {
    #[default]
    Inactive,
    Hold,
    Raised,
    Cut,
    Floored,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Horizon,
    Depleted,
    AllDeceased,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year_index: u32,
    pub age: u32,
    pub partner_ages: Vec<u32>,
    pub main_super: f64,
    pub partner1_super: Option<f64>,
    pub partner2_super: Option<f64>,
    pub buffer: f64,
    pub cash: f64,
    pub total_balance: f64,
    pub age_pension: f64,
    pub partner_age_pensions: Vec<f64>,
    pub private_pension_income: f64,
    pub work_income: f64,
    pub total_income: f64,
    pub core_spending: f64,
    pub one_off_spending: f64,
    pub aged_care_cost: f64,
    pub debt_payment: f64,
    pub total_spending: f64,
    pub minimum_drawdown: f64,
    pub withdrawn_cash: f64,
    pub withdrawn_buffer: f64,
    pub withdrawn_super: f64,
    pub surplus_to_cash: f64,
    pub shortfall: f64,
    pub insufficient_funds: bool,
    pub rad_paid: f64,
    pub rad_shortfall: f64,
    pub rad_refunded: f64,
    pub debt_outstanding: f64,
    pub return_pct: f64,
    pub in_aged_care: bool,
    pub guardrail_status: GuardrailStatus,
    pub partner_alive: Vec<bool>,
    pub deceased_year: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub years: Vec<YearRecord>,
    pub end_reason: EndReason,
}

impl SimulationResult {
    pub fn final_balance(&self) -> f64 {
        self.years.last().map(|y| y.total_balance).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PercentileBand {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearBand {
    pub year_index: u32,
    pub age: u32,
    pub samples: usize,
    pub balance: PercentileBand,
    pub income: PercentileBand,
    pub spending: PercentileBand,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    EarlySequenceRisk,
    PoorEarlyReturns,
    ExtendedBearMarket,
    GradualDepletion,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureCauseShare {
    pub cause: FailureCause,
    pub count: u32,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub runs: u32,
    pub successes: u32,
    pub success_rate: f64,
    pub years: Vec<YearBand>,
    pub final_balance: PercentileBand,
    pub median_run: Option<SimulationResult>,
    pub failure_causes: Vec<FailureCauseShare>,
    pub cancelled: bool,
}
