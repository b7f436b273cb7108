use log::debug;

use super::means_test::{Claimants, MeansTestInput, evaluate_pension};
use super::returns::{ReturnMode, generate_returns};
use super::rng::{SimRng, Stream};
use super::spending::{SpendingContext, SpendingState, one_off_total, plan_spending};
use super::types::{
    AgedCareApproach, AgedCarePolicy, DebtConfig, EndReason, RecipientType, Scenario,
    SimulationResult, YearRecord,
};
use super::validation::{ConfigError, validate_return_mode, validate_scenario};

const SHORTFALL_EPS: f64 = 1e-6;

pub fn inflation_factor(rate_pct: f64, years: u32) -> f64 {
    (1.0 + rate_pct / 100.0).powi(years as i32)
}

pub fn minimum_drawdown_rate(age: u32) -> f64 {
    match age {
        0..=64 => 0.04,
        65..=74 => 0.05,
        75..=79 => 0.06,
        80..=84 => 0.07,
        85..=89 => 0.09,
        90..=94 => 0.11,
        _ => 0.14,
    }
}

pub fn amortised_payment(principal: f64, rate_pct: f64, term_years: u32) -> f64 {
    if principal <= 0.0 {
        return 0.0;
    }
    if term_years == 0 {
        return principal;
    }
    let r = rate_pct / 100.0;
    let n = term_years as i32;
    if r.abs() < 1e-12 {
        return principal / n as f64;
    }
    principal * r / (1.0 - (1.0 + r).powi(-n))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum LifeStage {
    PreRetirement,
    Retired,
    InCare,
    Deceased,
}

#[derive(Debug, Clone)]
struct Person {
    start_age: u32,
    retirement_age: u32,
    death_age: Option<u32>,
    pension_income: f64,
    reversionary_pct: f64,
    inherited_income: f64,
    work_income: f64,
    stage: LifeStage,
}

impl Person {
    fn age(&self, year: u32) -> u32 {
        self.start_age + year
    }

    fn is_alive(&self) -> bool {
        self.stage != LifeStage::Deceased
    }

    fn super_accessible(&self) -> bool {
        matches!(self.stage, LifeStage::Retired | LifeStage::InCare)
    }

    fn private_income(&self) -> f64 {
        if !self.is_alive() {
            return 0.0;
        }
        let own = if self.super_accessible() {
            self.pension_income
        } else {
            0.0
        };
        own + self.inherited_income
    }

    fn earned_income(&self) -> f64 {
        if self.stage == LifeStage::PreRetirement {
            self.work_income
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
struct PortfolioState {
    supers: Vec<f64>,
    buffer: f64,
    cash: f64,
}

impl PortfolioState {
    fn main_super(&self) -> f64 {
        self.supers.iter().sum()
    }

    fn total(&self) -> f64 {
        self.main_super() + self.buffer + self.cash
    }
}

#[derive(Debug, Clone)]
struct Debt {
    balance: f64,
    rate: f64,
    scheduled_payment: f64,
    extra_payment: f64,
}

impl Debt {
    fn new(config: &DebtConfig) -> Self {
        Self {
            balance: config.principal.max(0.0),
            rate: config.rate_pct / 100.0,
            scheduled_payment: amortised_payment(
                config.principal,
                config.rate_pct,
                config.term_years,
            ),
            extra_payment: config.extra_payment.max(0.0),
        }
    }

    fn service(&mut self) -> f64 {
        if self.balance <= 0.0 {
            return 0.0;
        }
        let due = self.balance * (1.0 + self.rate);
        let payment = (self.scheduled_payment + self.extra_payment).min(due);
        self.balance = (due - payment).max(0.0);
        if self.balance < SHORTFALL_EPS {
            self.balance = 0.0;
        }
        payment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CarePhase {
    Waiting,
    InCare { entered_year: u32 },
    Finished,
}

#[derive(Debug, Clone)]
struct CareTrack<'a> {
    policy: &'a AgedCarePolicy,
    person: usize,
    entry_age: Option<u32>,
    phase: CarePhase,
    rad_due: bool,
    rad_held: f64,
}

fn resolve_entry_age(
    approach: &AgedCareApproach,
    start_age: u32,
    rng: &mut SimRng,
) -> Option<u32> {
    match approach {
        AgedCareApproach::Deterministic { entry_age } => Some(*entry_age),
        AgedCareApproach::Probabilistic {
            annual_entry_probabilities,
        } => {
            let mut table = annual_entry_probabilities.clone();
            table.sort_by_key(|row| row.age);

            let draw = rng.next_f64();
            let mut stay_home = 1.0;
            for row in table.into_iter().filter(|row| row.age >= start_age) {
                stay_home *= 1.0 - row.probability.clamp(0.0, 1.0);
                if 1.0 - stay_home > draw {
                    return Some(row.age);
                }
            }
            None
        }
    }
}

fn take(balance: &mut f64, amount: f64) -> f64 {
    let taken = balance.max(0.0).min(amount.max(0.0));
    *balance -= taken;
    taken
}

fn draw_proportional(balances: &mut [f64], selected: &[usize], amount: f64) -> f64 {
    let available: f64 = selected.iter().map(|&i| balances[i].max(0.0)).sum();
    if amount <= 0.0 || available <= 0.0 {
        return 0.0;
    }
    if amount >= available {
        for &i in selected {
            balances[i] = 0.0;
        }
        return available;
    }
    for &i in selected {
        let share = balances[i].max(0.0) / available;
        balances[i] = (balances[i] - amount * share).max(0.0);
    }
    amount
}

fn credit_proportional(balances: &mut [f64], selected: &[usize], amount: f64) {
    if selected.is_empty() || amount <= 0.0 {
        return;
    }
    let total: f64 = selected.iter().map(|&i| balances[i].max(0.0)).sum();
    if total <= 0.0 {
        let each = amount / selected.len() as f64;
        for &i in selected {
            balances[i] += each;
        }
        return;
    }
    for &i in selected {
        balances[i] += amount * balances[i].max(0.0) / total;
    }
}

// The one lifecycle transition. Death hands super and any reversionary
// pension to a surviving partner.
fn move_to_stage(
    persons: &mut [Person],
    supers: &mut [f64],
    idx: usize,
    stage: LifeStage,
    year: u32,
) {
    let from = persons[idx].stage;
    if from == stage || from == LifeStage::Deceased {
        return;
    }
    persons[idx].stage = stage;
    debug!(
        "year {year}: person {} {from:?} -> {stage:?} at age {}",
        idx + 1,
        persons[idx].age(year)
    );
    if stage != LifeStage::Deceased {
        return;
    }

    let Some(survivor) = (0..persons.len()).find(|&other| other != idx && persons[other].is_alive())
    else {
        return;
    };
    let estate = std::mem::take(&mut supers[idx]);
    supers[survivor] += estate;
    let reversion = persons[idx].pension_income * persons[idx].reversionary_pct / 100.0;
    persons[survivor].inherited_income += reversion;
    debug!(
        "year {year}: {estate:.0} super and {reversion:.0}/yr reversionary pension pass to person {}",
        survivor + 1
    );
}

#[derive(Debug, Clone, Copy, Default)]
struct Withdrawal {
    cash: f64,
    buffer: f64,
    super_funds: f64,
    shortfall: f64,
}

struct Household<'a> {
    scenario: &'a Scenario,
    couple: bool,
    persons: Vec<Person>,
    portfolio: PortfolioState,
    spending: SpendingState,
    care: Option<CareTrack<'a>>,
    debts: Vec<Debt>,
}

impl<'a> Household<'a> {
    fn new(scenario: &'a Scenario, rng: &mut SimRng) -> Self {
        let household = &scenario.household;
        let (persons, supers): (Vec<Person>, Vec<f64>) = match &household.couple {
            Some(couple) => couple
                .partners
                .iter()
                .map(|partner| {
                    let person = Person {
                        start_age: partner.current_age,
                        retirement_age: partner.retirement_age,
                        death_age: couple.death_scenario.then_some(partner.death_age),
                        pension_income: partner.pension_income.max(0.0),
                        reversionary_pct: partner.reversionary_pct,
                        inherited_income: 0.0,
                        work_income: partner.pre_retirement_income.max(0.0),
                        stage: LifeStage::PreRetirement,
                    };
                    (person, partner.super_balance.max(0.0))
                })
                .unzip(),
            None => (
                vec![Person {
                    start_age: household.current_age,
                    retirement_age: household.retirement_age,
                    death_age: None,
                    pension_income: household.private_pension_income.max(0.0),
                    reversionary_pct: 0.0,
                    inherited_income: 0.0,
                    work_income: household.pre_retirement_income.max(0.0),
                    stage: LifeStage::PreRetirement,
                }],
                vec![household.main_super_start.max(0.0)],
            ),
        };
        let couple = persons.len() == 2;

        let care = scenario.policy.aged_care.as_ref().map(|policy| {
            let person = if couple { policy.recipient.index() } else { 0 };
            CareTrack {
                policy,
                person,
                entry_age: resolve_entry_age(&policy.approach, persons[person].start_age, rng),
                phase: CarePhase::Waiting,
                rad_due: false,
                rad_held: 0.0,
            }
        });
        if let Some(track) = &care {
            debug!("aged care entry age resolved to {:?}", track.entry_age);
        }

        Self {
            scenario,
            couple,
            persons,
            portfolio: PortfolioState {
                supers,
                buffer: household.buffer_start.max(0.0),
                cash: household.cash_start.max(0.0),
            },
            spending: SpendingState::new(household.base_spending, household.starting_total()),
            care,
            debts: scenario.policy.debts.iter().map(Debt::new).collect(),
        }
    }

    fn alive_count(&self) -> usize {
        self.persons.iter().filter(|p| p.is_alive()).count()
    }

    fn in_care(&self) -> bool {
        self.persons.iter().any(|p| p.stage == LifeStage::InCare)
    }

    fn rad_held(&self) -> f64 {
        self.care.as_ref().map(|c| c.rad_held).unwrap_or(0.0)
    }

    fn update_lifecycle(&mut self, year: u32) {
        for idx in 0..self.persons.len() {
            let person = &self.persons[idx];
            if !person.is_alive() {
                continue;
            }
            let age = person.age(year);
            let dies = person.death_age.is_some_and(|death| age >= death);
            let retires = person.stage == LifeStage::PreRetirement && age >= person.retirement_age;

            if dies {
                move_to_stage(
                    &mut self.persons,
                    &mut self.portfolio.supers,
                    idx,
                    LifeStage::Deceased,
                    year,
                );
            } else if retires {
                move_to_stage(
                    &mut self.persons,
                    &mut self.portfolio.supers,
                    idx,
                    LifeStage::Retired,
                    year,
                );
            }
        }
    }

    fn update_aged_care(&mut self, year: u32) -> f64 {
        let Some(care) = self.care.as_mut() else {
            return 0.0;
        };
        let idx = care.person;
        let alive = self.persons[idx].is_alive();
        let age = self.persons[idx].age(year);

        match care.phase {
            CarePhase::Waiting => {
                if alive && care.entry_age.is_some_and(|entry| age >= entry) {
                    move_to_stage(
                        &mut self.persons,
                        &mut self.portfolio.supers,
                        idx,
                        LifeStage::InCare,
                        year,
                    );
                    care.phase = CarePhase::InCare { entered_year: year };
                    care.rad_due = true;
                }
                0.0
            }
            CarePhase::InCare { entered_year } => {
                let stay_over = year < entered_year.saturating_add(care.policy.duration_years);
                if alive && stay_over {
                    return 0.0;
                }
                if alive {
                    let next = if care.policy.death_in_care {
                        LifeStage::Deceased
                    } else {
                        LifeStage::Retired
                    };
                    move_to_stage(
                        &mut self.persons,
                        &mut self.portfolio.supers,
                        idx,
                        next,
                        year,
                    );
                }
                care.phase = CarePhase::Finished;
                care.rad_due = false;

                let refund = std::mem::take(&mut care.rad_held);
                let mut targets: Vec<usize> = (0..self.persons.len())
                    .filter(|&i| self.persons[i].is_alive())
                    .collect();
                if targets.is_empty() {
                    targets.push(idx);
                }
                credit_proportional(&mut self.portfolio.supers, &targets, refund);
                if refund > 0.0 {
                    debug!("year {year}: RAD of {refund:.0} refunded");
                }
                refund
            }
            CarePhase::Finished => 0.0,
        }
    }

    fn household_multiplier(&self) -> f64 {
        if !self.couple {
            return 1.0;
        }
        let alive = self.alive_count();
        let in_care = self
            .persons
            .iter()
            .filter(|p| p.stage == LifeStage::InCare)
            .count();

        if in_care > 0 && alive > in_care {
            self.care
                .as_ref()
                .map(|c| c.policy.at_home_spending_fraction)
                .unwrap_or(1.0)
        } else if alive == 1 {
            self.scenario.household.survivor_spending_fraction
        } else {
            1.0
        }
    }

    fn assessed_recipient(&self) -> RecipientType {
        if !self.couple {
            return self.scenario.household.recipient_type;
        }
        if self.alive_count() == 2 {
            RecipientType::Couple
        } else {
            RecipientType::Single
        }
    }

    fn age_pension(
        &self,
        year: u32,
        financial_assets: f64,
        other_income: f64,
        inflation: f64,
    ) -> (f64, [f64; 2]) {
        let tables = &self.scenario.means_test;
        let eligible = |p: &Person| p.is_alive() && p.age(year) >= tables.eligibility_age;

        let claimants = if self.couple {
            Claimants::Partners {
                eligible: [eligible(&self.persons[0]), eligible(&self.persons[1])],
            }
        } else {
            Claimants::Household {
                recipient: self.scenario.household.recipient_type,
                eligible: eligible(&self.persons[0]),
            }
        };

        let deemed = tables
            .deeming
            .map(|rules| rules.deemed_income(financial_assets, self.assessed_recipient(), inflation))
            .unwrap_or(0.0);

        let assessment = evaluate_pension(
            tables,
            &MeansTestInput {
                assets: financial_assets + self.rad_held(),
                income: other_income + deemed,
                is_homeowner: self.scenario.household.is_homeowner,
                claimants,
                inflation_factor: inflation,
            },
        );
        (assessment.total, assessment.per_partner)
    }

    fn accessible_super(&self) -> Vec<usize> {
        (0..self.persons.len())
            .filter(|&i| self.persons[i].is_alive() && self.persons[i].super_accessible())
            .collect()
    }

    fn minimum_drawdown(&mut self, year: u32) -> f64 {
        let mut drawn = 0.0;
        for (idx, person) in self.persons.iter().enumerate() {
            if !(person.is_alive() && person.super_accessible()) {
                continue;
            }
            let amount = self.portfolio.supers[idx].max(0.0) * minimum_drawdown_rate(person.age(year));
            self.portfolio.supers[idx] -= amount;
            drawn += amount;
        }
        self.portfolio.cash += drawn;
        drawn
    }

    fn withdraw(&mut self, need: f64) -> Withdrawal {
        let mut remaining = need.max(0.0);
        let cash = take(&mut self.portfolio.cash, remaining);
        remaining -= cash;
        let buffer = take(&mut self.portfolio.buffer, remaining);
        remaining -= buffer;
        let accessible = self.accessible_super();
        let super_funds = draw_proportional(&mut self.portfolio.supers, &accessible, remaining);
        remaining -= super_funds;

        Withdrawal {
            cash,
            buffer,
            super_funds,
            shortfall: if remaining > SHORTFALL_EPS {
                remaining
            } else {
                0.0
            },
        }
    }

    fn pay_rad(&mut self, amount: f64) -> (f64, f64) {
        let everyone: Vec<usize> = (0..self.portfolio.supers.len()).collect();
        let mut remaining = amount.max(0.0);
        remaining -= draw_proportional(&mut self.portfolio.supers, &everyone, remaining);
        remaining -= take(&mut self.portfolio.buffer, remaining);
        remaining -= take(&mut self.portfolio.cash, remaining);
        let unpaid = if remaining > SHORTFALL_EPS {
            remaining
        } else {
            0.0
        };
        (amount.max(0.0) - unpaid, unpaid)
    }

    fn apply_returns(&mut self, return_pct: f64) {
        let growth = 1.0 + return_pct / 100.0;
        for (idx, person) in self.persons.iter().enumerate() {
            if person.is_alive() && person.super_accessible() {
                self.portfolio.supers[idx] = (self.portfolio.supers[idx] * growth).max(0.0);
            }
        }
        let defensive = 1.0 + self.scenario.household.defensive_return_pct / 100.0;
        self.portfolio.buffer = (self.portfolio.buffer * defensive).max(0.0);
        self.portfolio.cash = (self.portfolio.cash * defensive).max(0.0);
    }

    fn start_record(&self, year: u32) -> YearRecord {
        YearRecord {
            year_index: year,
            age: self.persons[0].age(year),
            partner_ages: if self.couple {
                self.persons.iter().map(|p| p.age(year)).collect()
            } else {
                Vec::new()
            },
            ..YearRecord::default()
        }
    }

    fn finish_record(&self, record: &mut YearRecord) {
        record.main_super = self.portfolio.main_super();
        if self.couple {
            record.partner1_super = Some(self.portfolio.supers[0]);
            record.partner2_super = Some(self.portfolio.supers[1]);
        }
        record.buffer = self.portfolio.buffer;
        record.cash = self.portfolio.cash;
        record.total_balance = self.portfolio.total();
        record.debt_outstanding = self.debts.iter().map(|d| d.balance).sum();
        record.in_aged_care = self.in_care();
        record.partner_alive = self.persons.iter().map(Person::is_alive).collect();
    }

    fn advance(&mut self, year: u32, return_pct: f64) -> (YearRecord, Option<EndReason>) {
        let scenario = self.scenario;
        let household = &scenario.household;
        let policy = &scenario.policy;
        let inflation = inflation_factor(household.inflation_rate_pct, year);
        let opening_assets = self.portfolio.total();

        self.update_lifecycle(year);
        let mut record = self.start_record(year);
        record.rad_refunded = self.update_aged_care(year);

        if self.alive_count() == 0 {
            record.deceased_year = true;
            self.finish_record(&mut record);
            debug!("year {year}: household fully deceased");
            return (record, Some(EndReason::AllDeceased));
        }

        // Spending.
        let age = self.persons[0].age(year);
        let pension_floor: f64 = self.persons.iter().map(Person::private_income).sum();
        let multiplier = self.household_multiplier();
        let core = plan_spending(
            &mut self.spending,
            &SpendingContext {
                age,
                years_retired: age.saturating_sub(self.persons[0].retirement_age),
                first_year: year == 0,
                real_portfolio: opening_assets / inflation.max(1e-9),
                inflation_factor: inflation,
                pension_floor,
                household_multiplier: multiplier,
                pattern: household.spending_pattern,
                guardrails: policy.guardrails.as_ref(),
                splurge: policy.splurge.as_ref(),
            },
        );
        let one_off = one_off_total(&policy.one_off_expenses, age);
        let care_cost = match &self.care {
            Some(care) if self.in_care() => care.policy.annual_cost.max(0.0),
            _ => 0.0,
        };
        let debt_payment: f64 = self.debts.iter_mut().map(Debt::service).sum();
        let total_spending = core.nominal + one_off + care_cost + debt_payment;

        // Income.
        let private_income = pension_floor * inflation;
        let work_income: f64 =
            self.persons.iter().map(Person::earned_income).sum::<f64>() * inflation;
        let (age_pension, per_partner) =
            self.age_pension(year, opening_assets, private_income + work_income, inflation);
        let total_income = age_pension + private_income + work_income;

        let surplus = (total_income - total_spending).max(0.0);
        let need = (total_spending - total_income).max(0.0);
        self.portfolio.cash += surplus;

        let drawdown = self.minimum_drawdown(year);
        let withdrawal = self.withdraw(need);
        if withdrawal.shortfall > 0.0 {
            debug!(
                "year {year}: shortfall of {:.0} against spending {total_spending:.0}",
                withdrawal.shortfall
            );
        }

        let due_rad = match self.care.as_mut() {
            Some(care) if care.rad_due => {
                care.rad_due = false;
                Some(care.policy.rad_amount)
            }
            _ => None,
        };
        if let Some(amount) = due_rad {
            let (paid, unpaid) = self.pay_rad(amount);
            if let Some(care) = self.care.as_mut() {
                care.rad_held = paid;
            }
            record.rad_paid = paid;
            record.rad_shortfall = unpaid;
        }

        self.apply_returns(return_pct);

        record.age_pension = age_pension;
        if self.couple {
            record.partner_age_pensions = per_partner.to_vec();
        }
        record.private_pension_income = private_income;
        record.work_income = work_income;
        record.total_income = total_income;
        record.core_spending = core.nominal;
        record.one_off_spending = one_off;
        record.aged_care_cost = care_cost;
        record.debt_payment = debt_payment;
        record.total_spending = total_spending;
        record.minimum_drawdown = drawdown;
        record.withdrawn_cash = withdrawal.cash;
        record.withdrawn_buffer = withdrawal.buffer;
        record.withdrawn_super = withdrawal.super_funds;
        record.surplus_to_cash = surplus;
        record.shortfall = withdrawal.shortfall;
        record.insufficient_funds = withdrawal.shortfall > 0.0;
        record.return_pct = return_pct;
        record.guardrail_status = core.guardrail_status;
        self.finish_record(&mut record);

        let ended = (record.total_balance <= 0.0).then_some(EndReason::Depleted);
        (record, ended)
    }
}

pub fn simulate(scenario: &Scenario, returns: &[f64], rng: &mut SimRng) -> SimulationResult {
    let horizon = scenario.household.horizon_years();
    let mut household = Household::new(scenario, rng);
    let mut years = Vec::with_capacity(horizon);
    let mut end_reason = EndReason::Horizon;

    for year in 0..horizon {
        let return_pct = returns.get(year).copied().unwrap_or(0.0);
        let (record, ended) = household.advance(year as u32, return_pct);
        years.push(record);
        if let Some(reason) = ended {
            end_reason = reason;
            break;
        }
    }

    SimulationResult { years, end_reason }
}

pub fn run_scenario(
    scenario: &Scenario,
    mode: &ReturnMode,
    seed: u64,
) -> Result<SimulationResult, ConfigError> {
    validate_scenario(scenario)?;
    let horizon = scenario.household.horizon_years();
    validate_return_mode(mode, horizon)?;

    let mut returns_rng = SimRng::for_run(seed, 0, Stream::Returns);
    let returns = generate_returns(mode, horizon, &mut returns_rng);
    let mut care_rng = SimRng::for_run(seed, 0, Stream::AgedCare);
    Ok(simulate(scenario, &returns, &mut care_rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        AgeProbability, AgedCareApproach, AgedCarePolicy, CareRecipient, CoupleConfig,
        EndReason, PartnerProfile, default_entry_probabilities,
    };
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn solo_scenario() -> Scenario {
        let mut scenario = Scenario::default();
        let household = &mut scenario.household;
        household.current_age = 67;
        household.retirement_age = 67;
        household.end_age = 72;
        household.main_super_start = 500_000.0;
        household.buffer_start = 50_000.0;
        household.cash_start = 0.0;
        household.base_spending = 50_000.0;
        household.inflation_rate_pct = 0.0;
        household.defensive_return_pct = 0.0;
        scenario.means_test.deeming = None;
        scenario
    }

    fn partner(age: u32, super_balance: f64) -> PartnerProfile {
        PartnerProfile {
            current_age: age,
            retirement_age: age,
            super_balance,
            ..PartnerProfile::default()
        }
    }

    fn couple_scenario(partners: [PartnerProfile; 2]) -> Scenario {
        let mut scenario = solo_scenario();
        scenario.household.current_age = partners[0].current_age;
        scenario.household.retirement_age = partners[0].retirement_age;
        scenario.household.end_age = partners[0].current_age + 10;
        scenario.household.buffer_start = 0.0;
        scenario.household.recipient_type = RecipientType::Couple;
        scenario.household.couple = Some(CoupleConfig {
            partners,
            death_scenario: false,
        });
        scenario
    }

    fn run(scenario: &Scenario, return_pct: f64) -> SimulationResult {
        let returns = vec![return_pct; scenario.household.horizon_years()];
        simulate(scenario, &returns, &mut SimRng::new(1))
    }

    #[test]
    fn minimum_drawdown_feeds_cash_before_buffer_is_touched() {
        let result = run(&solo_scenario(), 0.0);
        let first = &result.years[0];

        // Asset test: 29,754 - (550,000 - 314,000) * 0.078.
        assert_approx(first.age_pension, 11_346.0);
        assert_approx(first.minimum_drawdown, 25_000.0);
        assert_approx(first.withdrawn_cash, 25_000.0);
        assert_approx(first.withdrawn_buffer, 13_654.0);
        assert_approx(first.withdrawn_super, 0.0);
        assert_approx(first.main_super, 475_000.0);
        assert_approx(first.total_balance, 511_346.0);
        assert!(!first.insufficient_funds);
    }

    #[test]
    fn pre_retirement_super_is_frozen_and_work_income_is_banked() {
        let mut scenario = solo_scenario();
        scenario.household.current_age = 60;
        scenario.household.retirement_age = 63;
        scenario.household.end_age = 65;
        scenario.household.pre_retirement_income = 80_000.0;
        let result = run(&scenario, 10.0);

        let first = &result.years[0];
        assert_approx(first.main_super, 500_000.0);
        assert_approx(first.work_income, 80_000.0);
        assert_approx(first.age_pension, 0.0);
        assert_approx(first.minimum_drawdown, 0.0);
        assert_approx(first.surplus_to_cash, 30_000.0);

        let retired = &result.years[3];
        assert_approx(retired.work_income, 0.0);
        assert!(retired.minimum_drawdown > 0.0);
    }

    #[test]
    fn shortfall_is_recorded_and_run_ends_depleted() {
        let mut scenario = solo_scenario();
        scenario.household.main_super_start = 20_000.0;
        scenario.household.buffer_start = 0.0;
        scenario.household.base_spending = 120_000.0;
        let result = run(&scenario, 0.0);

        assert_eq!(result.end_reason, EndReason::Depleted);
        let last = result.years.last().expect("one year");
        assert!(last.insufficient_funds);
        assert!(last.shortfall > 0.0);
        assert_approx(last.total_balance, 0.0);
    }

    #[test]
    fn reversionary_pension_and_survivor_spending_apply_after_death() {
        let mut first = partner(67, 400_000.0);
        first.pension_income = 101_000.0;
        first.reversionary_pct = 67.0;
        first.death_age = 68;
        let mut second = partner(67, 400_000.0);
        second.death_age = 95;

        let mut scenario = couple_scenario([first, second]);
        scenario.household.base_spending = 60_000.0;
        if let Some(couple) = scenario.household.couple.as_mut() {
            couple.death_scenario = true;
        }
        let result = run(&scenario, 0.0);

        let before = &result.years[0];
        assert_approx(before.private_pension_income, 101_000.0);
        assert_approx(before.core_spending, 60_000.0);

        let after = &result.years[1];
        assert_eq!(after.partner_alive, vec![false, true]);
        assert_approx(after.private_pension_income, 67_670.0);
        assert_approx(after.core_spending, 0.65 * 60_000.0);
        assert_approx(after.partner1_super.unwrap_or(f64::NAN), 0.0);
        assert_approx(after.partner_age_pensions[0], 0.0);
    }

    #[test]
    fn rad_comes_from_the_partner_holding_super_and_is_refunded() {
        let mut scenario = couple_scenario([partner(80, 0.0), partner(80, 1_500_000.0)]);
        scenario.household.base_spending = 0.0;
        scenario.policy.aged_care = Some(AgedCarePolicy {
            approach: AgedCareApproach::Deterministic { entry_age: 80 },
            rad_amount: 400_000.0,
            annual_cost: 0.0,
            duration_years: 2,
            at_home_spending_fraction: 0.70,
            death_in_care: false,
            recipient: CareRecipient::Partner1,
        });
        let result = run(&scenario, 0.0);

        let entry = &result.years[0];
        assert!(entry.in_aged_care);
        assert_approx(entry.rad_paid, 400_000.0);
        assert_approx(entry.rad_shortfall, 0.0);
        assert_approx(entry.partner1_super.unwrap_or(f64::NAN), 0.0);
        assert_approx(entry.partner2_super.unwrap_or(f64::NAN), 995_000.0);

        let exit = &result.years[2];
        assert!(!exit.in_aged_care);
        assert_approx(exit.rad_refunded, 400_000.0);
        assert_approx(exit.partner1_super.unwrap_or(f64::NAN), 0.0);
        // (995,000 * 0.93 + 400,000) * 0.93
        assert_approx(exit.partner2_super.unwrap_or(f64::NAN), 1_232_575.5);
    }

    #[test]
    fn at_home_partner_spends_reduced_fraction_while_other_is_in_care() {
        let mut scenario = couple_scenario([partner(80, 600_000.0), partner(80, 600_000.0)]);
        scenario.household.base_spending = 50_000.0;
        scenario.policy.aged_care = Some(AgedCarePolicy {
            approach: AgedCareApproach::Deterministic { entry_age: 81 },
            rad_amount: 0.0,
            annual_cost: 30_000.0,
            duration_years: 1,
            at_home_spending_fraction: 0.70,
            death_in_care: false,
            recipient: CareRecipient::Partner2,
        });
        let result = run(&scenario, 0.0);

        assert_approx(result.years[0].core_spending, 50_000.0);
        assert_approx(result.years[1].core_spending, 35_000.0);
        assert_approx(result.years[1].aged_care_cost, 30_000.0);
        assert_approx(result.years[1].total_spending, 65_000.0);
        assert_approx(result.years[2].core_spending, 50_000.0);
        assert_approx(result.years[2].aged_care_cost, 0.0);
    }

    #[test]
    fn death_in_care_ends_a_single_household_with_refunded_estate() {
        let mut scenario = solo_scenario();
        scenario.household.current_age = 80;
        scenario.household.retirement_age = 80;
        scenario.household.end_age = 95;
        scenario.policy.aged_care = Some(AgedCarePolicy {
            approach: AgedCareApproach::Deterministic { entry_age: 80 },
            rad_amount: 100_000.0,
            annual_cost: 20_000.0,
            duration_years: 2,
            at_home_spending_fraction: 0.70,
            death_in_care: true,
            recipient: CareRecipient::Partner1,
        });
        let result = run(&scenario, 0.0);

        assert_eq!(result.end_reason, EndReason::AllDeceased);
        assert_eq!(result.years.len(), 3);
        let last = result.years.last().expect("final record");
        assert!(last.deceased_year);
        assert_approx(last.rad_refunded, 100_000.0);
        assert_approx(last.total_spending, 0.0);
        assert!(last.total_balance >= 100_000.0);
        assert_eq!(last.partner_alive, vec![false]);
    }

    #[test]
    fn both_partners_dying_ends_the_run() {
        let mut first = partner(70, 300_000.0);
        first.death_age = 72;
        let mut second = partner(70, 300_000.0);
        second.death_age = 72;
        let mut scenario = couple_scenario([first, second]);
        if let Some(couple) = scenario.household.couple.as_mut() {
            couple.death_scenario = true;
        }
        let result = run(&scenario, 0.0);

        assert_eq!(result.end_reason, EndReason::AllDeceased);
        assert_eq!(result.years.len(), 3);
        assert!(result.final_balance() > 0.0);
    }

    #[test]
    fn probabilistic_entry_uses_cumulative_probability() {
        let certain = AgedCareApproach::Probabilistic {
            annual_entry_probabilities: vec![
                AgeProbability {
                    age: 85,
                    probability: 1.0,
                },
                AgeProbability {
                    age: 80,
                    probability: 0.0,
                },
            ],
        };
        let never = AgedCareApproach::Probabilistic {
            annual_entry_probabilities: vec![AgeProbability {
                age: 80,
                probability: 0.0,
            }],
        };
        let mut rng = SimRng::new(5);
        for _ in 0..20 {
            assert_eq!(resolve_entry_age(&certain, 67, &mut rng), Some(85));
            assert_eq!(resolve_entry_age(&never, 67, &mut rng), None);
        }
    }

    #[test]
    fn probabilistic_entry_ignores_ages_already_passed() {
        let table = AgedCareApproach::Probabilistic {
            annual_entry_probabilities: vec![
                AgeProbability {
                    age: 65,
                    probability: 1.0,
                },
                AgeProbability {
                    age: 85,
                    probability: 1.0,
                },
            ],
        };
        let mut rng = SimRng::new(9);
        assert_eq!(resolve_entry_age(&table, 64, &mut rng), Some(65));
        assert_eq!(resolve_entry_age(&table, 80, &mut rng), Some(85));
        assert_eq!(resolve_entry_age(&table, 90, &mut rng), None);
    }

    #[test]
    fn person_starting_at_80_enters_in_first_year_at_table_rate() {
        let approach = AgedCareApproach::Probabilistic {
            annual_entry_probabilities: default_entry_probabilities(),
        };
        let draws = 20_000;
        let first_year = (0..draws)
            .filter(|&seed| {
                let mut rng = SimRng::new(seed);
                resolve_entry_age(&approach, 80, &mut rng) == Some(80)
            })
            .count();
        let share = first_year as f64 / draws as f64;
        assert!((share - 0.035).abs() < 0.01, "first-year entry share {share}");
    }

    #[test]
    fn debt_amortises_to_zero_over_its_term() {
        let payment = amortised_payment(100_000.0, 5.0, 10);
        assert!((payment - 12_950.46).abs() < 0.01, "payment {payment}");

        let mut debt = Debt::new(&DebtConfig {
            name: "car".to_string(),
            principal: 100_000.0,
            rate_pct: 5.0,
            term_years: 10,
            extra_payment: 0.0,
        });
        for _ in 0..10 {
            debt.service();
        }
        assert_approx(debt.balance, 0.0);
        assert_approx(debt.service(), 0.0);
    }

    #[test]
    fn extra_debt_payment_is_capped_at_balance_plus_interest() {
        let mut debt = Debt::new(&DebtConfig {
            name: String::new(),
            principal: 10_000.0,
            rate_pct: 10.0,
            term_years: 5,
            extra_payment: 50_000.0,
        });
        assert_approx(debt.service(), 11_000.0);
        assert_approx(debt.balance, 0.0);
    }

    #[test]
    fn proportional_draw_splits_by_balance_and_skips_empty_accounts() {
        let mut balances = vec![0.0, 1_500_000.0];
        let taken = draw_proportional(&mut balances, &[0, 1], 400_000.0);
        assert_approx(taken, 400_000.0);
        assert_approx(balances[0], 0.0);
        assert_approx(balances[1], 1_100_000.0);

        let mut even = vec![100.0, 300.0];
        draw_proportional(&mut even, &[0, 1], 200.0);
        assert_approx(even[0], 50.0);
        assert_approx(even[1], 150.0);
    }

    #[test]
    fn credit_with_empty_balances_splits_evenly() {
        let mut balances = vec![0.0, 0.0];
        credit_proportional(&mut balances, &[0, 1], 100.0);
        assert_approx(balances[0], 50.0);
        assert_approx(balances[1], 50.0);
    }

    #[test]
    fn minimum_drawdown_schedule_steps_with_age() {
        assert_approx(minimum_drawdown_rate(60), 0.04);
        assert_approx(minimum_drawdown_rate(67), 0.05);
        assert_approx(minimum_drawdown_rate(77), 0.06);
        assert_approx(minimum_drawdown_rate(82), 0.07);
        assert_approx(minimum_drawdown_rate(88), 0.09);
        assert_approx(minimum_drawdown_rate(93), 0.11);
        assert_approx(minimum_drawdown_rate(99), 0.14);
    }

    #[test]
    fn run_scenario_rejects_invalid_config() {
        let mut scenario = solo_scenario();
        scenario.household.end_age = scenario.household.current_age;
        let err = run_scenario(&scenario, &ReturnMode::Constant { rate_pct: 5.0 }, 1);
        assert!(err.is_err());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn balances_reconcile_each_year(
            super_start in 0.0f64..2_000_000.0,
            buffer_start in 0.0f64..200_000.0,
            cash_start in 0.0f64..50_000.0,
            spending in 0.0f64..150_000.0,
            inflation in 0.0f64..5.0,
        ) {
            let mut scenario = solo_scenario();
            scenario.household.main_super_start = super_start;
            scenario.household.buffer_start = buffer_start;
            scenario.household.cash_start = cash_start;
            scenario.household.base_spending = spending;
            scenario.household.inflation_rate_pct = inflation;
            let result = run(&scenario, 0.0);

            let mut opening = scenario.household.starting_total();
            for year in &result.years {
                let expected = opening + year.total_income - year.total_spending + year.shortfall;
                prop_assert!(
                    (year.total_balance - expected).abs() <= 1e-6 * opening.max(1.0),
                    "year {}: expected {expected}, got {}", year.year_index, year.total_balance
                );
                prop_assert!(year.total_balance >= 0.0);
                opening = year.total_balance;
            }
        }

        #[test]
        fn couple_super_is_only_drawn_from_retired_partners(
            super1 in 0.0f64..800_000.0,
            super2 in 0.0f64..800_000.0,
            spending in 0.0f64..200_000.0,
            return_pct in -30.0f64..30.0,
        ) {
            let mut younger = partner(60, super2);
            younger.retirement_age = 66;
            younger.pre_retirement_income = 0.0;
            let mut scenario = couple_scenario([partner(67, super1), younger]);
            scenario.household.base_spending = spending;
            let result = run(&scenario, return_pct);

            for year in &result.years {
                let p1 = year.partner1_super.unwrap_or_default();
                let p2 = year.partner2_super.unwrap_or_default();
                prop_assert!(
                    (year.main_super - (p1 + p2)).abs() <= 1e-6 * year.main_super.max(1.0),
                    "year {}: main {} vs partners {p1} + {p2}", year.year_index, year.main_super
                );
                if year.partner_ages[1] < 66 {
                    prop_assert!(
                        (p2 - super2).abs() <= 1e-9,
                        "year {}: working partner super moved to {p2}", year.year_index
                    );
                }
            }
        }

        #[test]
        fn withdrawals_follow_cash_buffer_super_order(
            super_start in 0.0f64..1_000_000.0,
            buffer_start in 0.0f64..100_000.0,
            spending in 0.0f64..200_000.0,
        ) {
            let mut scenario = solo_scenario();
            scenario.household.main_super_start = super_start;
            scenario.household.buffer_start = buffer_start;
            scenario.household.base_spending = spending;
            let result = run(&scenario, 0.0);

            for year in &result.years {
                if year.withdrawn_buffer > 0.0 {
                    prop_assert!(year.cash.abs() <= 1e-6);
                }
                if year.withdrawn_super > 0.0 {
                    prop_assert!(year.cash.abs() <= 1e-6);
                    prop_assert!(year.buffer.abs() <= 1e-6);
                }
            }
        }
    }
}
