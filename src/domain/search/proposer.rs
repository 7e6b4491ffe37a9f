//! Candidate formula generation and mutation.
//!
//! Proposers are the pluggable heuristic behind the search controller: given
//! the retained population, produce the next generation of candidates. All
//! randomness flows through the caller-supplied seeded generator, so a run is
//! reproducible from its seed.

use crate::domain::formula::{Comparator, Condition, Formula};
use crate::domain::search::ScoredFormula;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// Windows a proposer may assign, in periods.
pub const LEGAL_WINDOWS: [u32; 4] = [1, 3, 5, 10];

/// One ratio the proposers may build filters on, with the plausible
/// threshold range to sample from.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioSpec {
    pub name: String,
    pub min_threshold: f64,
    pub max_threshold: f64,
}

impl RatioSpec {
    pub fn new(name: &str, min_threshold: f64, max_threshold: f64) -> Self {
        RatioSpec {
            name: name.to_string(),
            min_threshold,
            max_threshold,
        }
    }
}

/// Fundamental ratios with threshold ranges matched to how each is quoted
/// (percentages for returns on capital, multiples for valuation ratios).
pub fn default_catalogue() -> Vec<RatioSpec> {
    vec![
        RatioSpec::new("ROE", 5.0, 30.0),
        RatioSpec::new("ROCE", 5.0, 30.0),
        RatioSpec::new("PE_ratio", 5.0, 40.0),
        RatioSpec::new("PB_ratio", 5.0, 40.0),
        RatioSpec::new("DebtToEquity", 0.0, 10.0),
        RatioSpec::new("DividendYield", 0.5, 8.0),
        RatioSpec::new("RevenueGrowth", 1.0, 100.0),
    ]
}

pub trait Proposer {
    /// Produce up to `count` new candidates from the retained population.
    fn propose(
        &mut self,
        retained: &[ScoredFormula],
        count: usize,
        rng: &mut StdRng,
    ) -> Vec<Formula>;
}

/// Generates formulas from scratch by sampling the catalogue.
#[derive(Debug, Clone)]
pub struct RandomProposer {
    pub catalogue: Vec<RatioSpec>,
    pub max_filters: usize,
}

impl RandomProposer {
    pub fn new(catalogue: Vec<RatioSpec>, max_filters: usize) -> Self {
        RandomProposer {
            catalogue,
            max_filters: max_filters.max(1),
        }
    }

    pub fn random_formula(&self, rng: &mut StdRng) -> Formula {
        let limit = self.max_filters.min(self.catalogue.len()).max(1);
        let count = rng.gen_range(1..=limit);
        let chosen: Vec<&RatioSpec> = self
            .catalogue
            .choose_multiple(rng, count)
            .collect();

        let mut filters = BTreeMap::new();
        for spec in chosen {
            filters.insert(spec.name.clone(), random_condition(spec, rng));
        }

        // Fields sampled from legal ranges, so the invariants hold by
        // construction.
        Formula {
            name: format!("random-{:04}", rng.gen_range(1000..10000)),
            filters,
            market_cap_gate: None,
        }
    }
}

impl Proposer for RandomProposer {
    fn propose(
        &mut self,
        _retained: &[ScoredFormula],
        count: usize,
        rng: &mut StdRng,
    ) -> Vec<Formula> {
        (0..count).map(|_| self.random_formula(rng)).collect()
    }
}

/// Evolves retained formulas by small perturbations, topping the generation
/// up with freshly generated candidates.
#[derive(Debug, Clone)]
pub struct MutationProposer {
    random: RandomProposer,
    pub max_tweaks: usize,
    /// Portion of each generation drawn fresh rather than mutated.
    pub fresh_fraction: f64,
}

impl MutationProposer {
    pub fn new(catalogue: Vec<RatioSpec>, max_filters: usize) -> Self {
        MutationProposer {
            random: RandomProposer::new(catalogue, max_filters),
            max_tweaks: 2,
            fresh_fraction: 0.5,
        }
    }

    pub fn mutate(&self, parent: &Formula, rng: &mut StdRng) -> Formula {
        let mut filters = parent.filters.clone();
        let tweaks = rng.gen_range(1..=self.max_tweaks.max(1));
        for _ in 0..tweaks {
            self.tweak_once(&mut filters, rng);
        }

        // Strip any previous mutation suffix so names stay bounded over
        // many generations.
        let base = parent.name.split(" #").next().unwrap_or(&parent.name);
        Formula {
            name: format!("{base} #{:04}", rng.gen_range(1000..10000)),
            filters,
            market_cap_gate: parent.market_cap_gate.clone(),
        }
    }

    fn tweak_once(&self, filters: &mut BTreeMap<String, Condition>, rng: &mut StdRng) {
        match rng.gen_range(0..6) {
            0 => self.tweak_threshold(filters, rng),
            1 => {
                let flipped = Comparator::ALL.choose(rng).copied();
                if let (Some(condition), Some(comparator)) = (pick_filter(filters, rng), flipped)
                {
                    condition.comparator = comparator;
                }
            }
            2 => {
                if let Some(condition) = pick_filter(filters, rng) {
                    let window = *LEGAL_WINDOWS.choose(rng).unwrap_or(&1);
                    condition.window_length = window;
                    condition.hold_count = condition.hold_count.min(window);
                }
            }
            3 => {
                if let Some(condition) = pick_filter(filters, rng) {
                    condition.hold_count = rng.gen_range(1..=condition.window_length);
                }
            }
            4 => self.add_filter(filters, rng),
            _ => self.remove_filter(filters, rng),
        }
    }

    fn tweak_threshold(&self, filters: &mut BTreeMap<String, Condition>, rng: &mut StdRng) {
        if let Some(condition) = pick_filter(filters, rng) {
            condition.threshold = round2(condition.threshold * rng.gen_range(0.8..=1.2));
        }
    }

    fn add_filter(&self, filters: &mut BTreeMap<String, Condition>, rng: &mut StdRng) {
        if filters.len() >= self.random.max_filters {
            return self.tweak_threshold(filters, rng);
        }
        let available: Vec<&RatioSpec> = self
            .random
            .catalogue
            .iter()
            .filter(|spec| !filters.contains_key(&spec.name))
            .collect();
        match available.choose(rng) {
            Some(spec) => {
                filters.insert(spec.name.clone(), random_condition(spec, rng));
            }
            None => self.tweak_threshold(filters, rng),
        }
    }

    fn remove_filter(&self, filters: &mut BTreeMap<String, Condition>, rng: &mut StdRng) {
        if filters.len() <= 1 {
            return self.tweak_threshold(filters, rng);
        }
        let keys: Vec<String> = filters.keys().cloned().collect();
        if let Some(key) = keys.choose(rng) {
            filters.remove(key);
        }
    }
}

impl Proposer for MutationProposer {
    fn propose(
        &mut self,
        retained: &[ScoredFormula],
        count: usize,
        rng: &mut StdRng,
    ) -> Vec<Formula> {
        if retained.is_empty() {
            return (0..count).map(|_| self.random.random_formula(rng)).collect();
        }

        let fresh = ((count as f64 * self.fresh_fraction).round() as usize).min(count);
        let mut candidates = Vec::with_capacity(count);
        for _ in 0..count - fresh {
            // retained is non-empty here, so choose cannot fail
            if let Some(parent) = retained.choose(rng) {
                candidates.push(self.mutate(&parent.formula, rng));
            }
        }
        for _ in 0..fresh {
            candidates.push(self.random.random_formula(rng));
        }
        candidates
    }
}

fn random_condition(spec: &RatioSpec, rng: &mut StdRng) -> Condition {
    let comparator = *Comparator::ALL.choose(rng).unwrap_or(&Comparator::Gt);
    let window = *LEGAL_WINDOWS.choose(rng).unwrap_or(&1);
    Condition {
        comparator,
        threshold: round2(rng.gen_range(spec.min_threshold..=spec.max_threshold)),
        hold_count: rng.gen_range(1..=window),
        window_length: window,
    }
}

fn pick_filter<'a>(
    filters: &'a mut BTreeMap<String, Condition>,
    rng: &mut StdRng,
) -> Option<&'a mut Condition> {
    let keys: Vec<String> = filters.keys().cloned().collect();
    let key = keys.choose(rng)?;
    filters.get_mut(key)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
