mod aggregate;
mod engine;
mod returns;
mod rng;
mod solver;
mod spending;
mod types;
mod validation;

pub use aggregate::{BatchConfig, classify_failure, run_batch, run_batch_cancellable};
pub use engine::{
    amortised_payment, inflation_factor, minimum_drawdown_rate, run_scenario, simulate,
};
pub use means_test::{
    Claimants, DeemingRules, MeansTestInput, MeansTestTables, PensionAssessment, RateSchedule,
    evaluate_pension,
};
pub use returns::{
    BootstrapMethod, HISTORICAL_START_YEAR, HistoricalWindow, ReturnMode, ReturnPlan,
    complete_block_starts, generate_returns, historical_series, unique_window_count,
};
pub use rng::{SimRng, Stream, derive_seed};
pub use solver::{
    SpendingSolveConfig, SpendingSolveIteration, SpendingSolveResult, solve_max_spending,
};
pub use spending::{
    SpendingContext, SpendingOutcome, SpendingState, decline_multiplier, one_off_total,
    plan_spending, splurge_amount,
};
pub use types::{
    AgeProbability, AgedCareApproach, AgedCarePolicy, AggregateResult, CareRecipient,
    CoupleConfig, DebtConfig, EndReason, FailureCause, FailureCauseShare, Gender,
    GuardrailPolicy, GuardrailStatus, HouseholdConfig, OneOffExpense, PartnerProfile,
    PercentileBand, PolicyConfig, RecipientType, Scenario, SimulationResult, SpendingPattern,
    SplurgePolicy, YearBand, YearRecord, default_entry_probabilities,
};
pub use validation::{ConfigError, validate_return_mode, validate_scenario};
