use super::types::{GuardrailPolicy, GuardrailStatus, OneOffExpense, SpendingPattern, SplurgePolicy};

const DECLINE_RATES: [f64; 3] = [0.005, 0.02, 0.01];

// Guardrail state carried from one year to the next. The adjusted base is in
// start-year dollars.
#[derive(Debug, Clone, Copy)]
pub struct SpendingState {
    pub adjusted_base: f64,
    initial_withdrawal_rate: Option<f64>,
}

impl SpendingState {
    pub fn new(base_spending: f64, starting_portfolio: f64) -> Self {
        let initial_withdrawal_rate = if starting_portfolio > 0.0 && base_spending > 0.0 {
            Some(base_spending / starting_portfolio)
        } else {
            None
        };
        Self {
            adjusted_base: base_spending.max(0.0),
            initial_withdrawal_rate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpendingContext<'a> {
    pub age: u32,
    pub years_retired: u32,
    pub first_year: bool,
    pub real_portfolio: f64,
    pub inflation_factor: f64,
    pub pension_floor: f64,
    pub household_multiplier: f64,
    pub pattern: SpendingPattern,
    pub guardrails: Option<&'a GuardrailPolicy>,
    pub splurge: Option<&'a SplurgePolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendingOutcome {
    pub nominal: f64,
    pub guardrail_status: GuardrailStatus,
}

pub fn decline_multiplier(pattern: SpendingPattern, years_retired: u32) -> f64 {
    match pattern {
        SpendingPattern::Constant => 1.0,
        SpendingPattern::Declining => {
            let first = years_retired.min(10);
            let second = years_retired.saturating_sub(10).min(10);
            let third = years_retired.saturating_sub(20);
            (1.0 - DECLINE_RATES[0]).powi(first as i32)
                * (1.0 - DECLINE_RATES[1]).powi(second as i32)
                * (1.0 - DECLINE_RATES[2]).powi(third as i32)
        }
    }
}

pub fn splurge_amount(splurge: Option<&SplurgePolicy>, age: u32) -> f64 {
    let Some(splurge) = splurge else {
        return 0.0;
    };
    let window_end = splurge.start_age.saturating_add(splurge.duration_years);
    if age < splurge.start_age {
        return 0.0;
    }
    if age < window_end {
        return splurge.amount.max(0.0);
    }

    let years_after = age - window_end;
    if years_after >= splurge.ramp_down_years {
        return 0.0;
    }
    let ramp = splurge.ramp_down_years as f64;
    splurge.amount.max(0.0) * (1.0 - (years_after as f64 + 1.0) / (ramp + 1.0))
}

pub fn one_off_total(expenses: &[OneOffExpense], age: u32) -> f64 {
    expenses
        .iter()
        .filter(|e| e.age == age)
        .map(|e| e.amount.max(0.0))
        .sum()
}

fn apply_guardrails(
    state: &mut SpendingState,
    policy: &GuardrailPolicy,
    real_portfolio: f64,
    pension_floor: f64,
) -> GuardrailStatus {
    let Some(initial_rate) = state.initial_withdrawal_rate else {
        return GuardrailStatus::Inactive;
    };

    let current_rate = state.adjusted_base / real_portfolio.max(1e-9);
    let ratio = current_rate / initial_rate.max(1e-12) * 100.0;
    let adjustment = policy.adjustment_pct / 100.0;

    if ratio <= 100.0 - policy.upper_pct {
        state.adjusted_base *= 1.0 + adjustment;
        GuardrailStatus::Raised
    } else if ratio >= 100.0 + policy.lower_pct {
        let cut = state.adjusted_base * (1.0 - adjustment);
        let floor = pension_floor.max(0.0).min(state.adjusted_base);
        if cut < floor {
            state.adjusted_base = floor;
            GuardrailStatus::Floored
        } else {
            state.adjusted_base = cut;
            GuardrailStatus::Cut
        }
    } else {
        GuardrailStatus::Hold
    }
}

pub fn plan_spending(state: &mut SpendingState, ctx: &SpendingContext<'_>) -> SpendingOutcome {
    let decline = decline_multiplier(ctx.pattern, ctx.years_retired);

    let guardrail_status = match ctx.guardrails {
        Some(_) if ctx.first_year => GuardrailStatus::Hold,
        Some(policy) => apply_guardrails(state, policy, ctx.real_portfolio, ctx.pension_floor),
        None => GuardrailStatus::Inactive,
    };

    let mut base = state.adjusted_base * decline * ctx.household_multiplier.max(0.0);
    if ctx.guardrails.is_some() {
        base = base.max(ctx.pension_floor.max(0.0).min(state.adjusted_base));
    }
    let splurge = splurge_amount(ctx.splurge, ctx.age);

    SpendingOutcome {
        nominal: (base + splurge) * ctx.inflation_factor.max(0.0),
        guardrail_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn guardrails() -> GuardrailPolicy {
        GuardrailPolicy {
            upper_pct: 20.0,
            lower_pct: 20.0,
            adjustment_pct: 10.0,
        }
    }

    fn context(real_portfolio: f64, policy: Option<&GuardrailPolicy>) -> SpendingContext<'_> {
        SpendingContext {
            age: 70,
            years_retired: 3,
            first_year: false,
            real_portfolio,
            inflation_factor: 1.0,
            pension_floor: 0.0,
            household_multiplier: 1.0,
            pattern: SpendingPattern::Constant,
            guardrails: policy,
            splurge: None,
        }
    }

    #[test]
    fn constant_pattern_never_declines() {
        for years in [0, 5, 15, 40] {
            assert_approx(decline_multiplier(SpendingPattern::Constant, years), 1.0);
        }
    }

    #[test]
    fn declining_pattern_cuts_roughly_a_third_over_35_years() {
        let m = decline_multiplier(SpendingPattern::Declining, 35);
        assert!((0.62..=0.68).contains(&m), "multiplier {m}");
        assert!(
            decline_multiplier(SpendingPattern::Declining, 11)
                < decline_multiplier(SpendingPattern::Declining, 10)
        );
        assert_approx(decline_multiplier(SpendingPattern::Declining, 0), 1.0);
    }

    #[test]
    fn declining_pattern_has_three_distinct_decay_rates() {
        let decay = |year: u32| {
            1.0 - decline_multiplier(SpendingPattern::Declining, year + 1)
                / decline_multiplier(SpendingPattern::Declining, year)
        };
        let (early, middle, late) = (decay(5), decay(15), decay(25));
        assert_approx(early, 0.005);
        assert_approx(middle, 0.02);
        assert_approx(late, 0.01);
        assert!(early != middle && middle != late && early != late);
    }

    #[test]
    fn guardrails_raise_when_portfolio_grows() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        // Withdrawal rate 40k/1.5M is 66.7% of the initial rate.
        let outcome = plan_spending(&mut state, &context(1_500_000.0, Some(&policy)));
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Raised);
        assert_approx(state.adjusted_base, 44_000.0);
        assert_approx(outcome.nominal, 44_000.0);
    }

    #[test]
    fn guardrails_cut_when_portfolio_falls_and_compound() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        plan_spending(&mut state, &context(700_000.0, Some(&policy)));
        assert_approx(state.adjusted_base, 36_000.0);
        // 36k / 600k = 6% vs 4% initial => 150%, cut again from the new base.
        let outcome = plan_spending(&mut state, &context(600_000.0, Some(&policy)));
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Cut);
        assert_approx(state.adjusted_base, 32_400.0);
    }

    #[test]
    fn guardrails_hold_inside_band_and_in_first_year() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        let outcome = plan_spending(&mut state, &context(1_050_000.0, Some(&policy)));
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Hold);
        assert_approx(state.adjusted_base, 40_000.0);

        let mut ctx = context(100_000.0, Some(&policy));
        ctx.first_year = true;
        let outcome = plan_spending(&mut state, &ctx);
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Hold);
        assert_approx(state.adjusted_base, 40_000.0);
    }

    #[test]
    fn guardrail_cut_respects_pension_floor() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        let mut ctx = context(100_000.0, Some(&policy));
        ctx.pension_floor = 38_000.0;
        let outcome = plan_spending(&mut state, &ctx);
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Floored);
        assert_approx(state.adjusted_base, 38_000.0);
    }

    #[test]
    fn pension_floor_holds_after_decline_and_household_multipliers() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        let mut ctx = context(1_000_000.0, Some(&policy));
        ctx.pension_floor = 30_000.0;
        ctx.pattern = SpendingPattern::Declining;
        ctx.years_retired = 30;
        ctx.household_multiplier = 0.65;
        ctx.inflation_factor = 2.0;
        let outcome = plan_spending(&mut state, &ctx);
        assert_approx(outcome.nominal, 60_000.0);

        ctx.guardrails = None;
        let outcome = plan_spending(&mut state, &ctx);
        assert!(outcome.nominal < 60_000.0);
    }

    #[test]
    fn zero_starting_portfolio_disables_guardrails() {
        let policy = guardrails();
        let mut state = SpendingState::new(40_000.0, 0.0);
        let outcome = plan_spending(&mut state, &context(0.0, Some(&policy)));
        assert_eq!(outcome.guardrail_status, GuardrailStatus::Inactive);
        assert_approx(outcome.nominal, 40_000.0);
    }

    #[test]
    fn splurge_applies_in_window_then_ramps_down() {
        let splurge = SplurgePolicy {
            amount: 9_000.0,
            start_age: 67,
            duration_years: 3,
            ramp_down_years: 2,
        };
        assert_approx(splurge_amount(Some(&splurge), 66), 0.0);
        assert_approx(splurge_amount(Some(&splurge), 67), 9_000.0);
        assert_approx(splurge_amount(Some(&splurge), 69), 9_000.0);
        assert_approx(splurge_amount(Some(&splurge), 70), 6_000.0);
        assert_approx(splurge_amount(Some(&splurge), 71), 3_000.0);
        assert_approx(splurge_amount(Some(&splurge), 72), 0.0);
        assert_approx(splurge_amount(None, 68), 0.0);
    }

    #[test]
    fn splurge_is_inflated_but_not_guardrailed() {
        let splurge = SplurgePolicy {
            amount: 10_000.0,
            start_age: 65,
            duration_years: 10,
            ramp_down_years: 0,
        };
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        let mut ctx = context(1_000_000.0, None);
        ctx.splurge = Some(&splurge);
        ctx.inflation_factor = 1.5;
        let outcome = plan_spending(&mut state, &ctx);
        assert_approx(outcome.nominal, 75_000.0);
    }

    #[test]
    fn household_multiplier_scales_base_only() {
        let mut state = SpendingState::new(40_000.0, 1_000_000.0);
        let mut ctx = context(1_000_000.0, None);
        ctx.household_multiplier = 0.65;
        let outcome = plan_spending(&mut state, &ctx);
        assert_approx(outcome.nominal, 26_000.0);
        assert_approx(state.adjusted_base, 40_000.0);
    }

    #[test]
    fn one_offs_sum_only_for_exact_age() {
        let expenses = vec![
            OneOffExpense {
                description: "car".to_string(),
                age: 70,
                amount: 30_000.0,
            },
            OneOffExpense {
                description: "roof".to_string(),
                age: 70,
                amount: 12_000.0,
            },
            OneOffExpense {
                description: "trip".to_string(),
                age: 71,
                amount: 8_000.0,
            },
        ];
        assert_approx(one_off_total(&expenses, 70), 42_000.0);
        assert_approx(one_off_total(&expenses, 71), 8_000.0);
        assert_approx(one_off_total(&expenses, 72), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_guardrail_base_never_falls_below_pension_floor(
            base in 20_000u32..120_000,
            floor in 0u32..20_000,
            start in 100_000u32..2_000_000,
            adjustment in 1u32..50,
            path in proptest::collection::vec(10_000u32..3_000_000, 1..40)
        ) {
            let policy = GuardrailPolicy {
                upper_pct: 20.0,
                lower_pct: 20.0,
                adjustment_pct: adjustment as f64,
            };
            let mut state = SpendingState::new(base as f64, start as f64);
            for portfolio in path {
                let mut ctx = context(portfolio as f64, Some(&policy));
                ctx.pension_floor = floor as f64;
                let outcome = plan_spending(&mut state, &ctx);
                prop_assert!(state.adjusted_base + 1e-9 >= floor as f64);
                prop_assert!(outcome.nominal + 1e-9 >= floor as f64);
                prop_assert!(outcome.nominal.is_finite());
            }
        }
    }
}
