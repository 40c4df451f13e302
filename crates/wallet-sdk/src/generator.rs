//! Change generation: fund a transaction from the change pool and return the
//! surplus as new change outputs, so that the fee lands exactly on the
//! configured sat/kb rate.
//!
//! A run works on a [`ChangeState`] accumulator holding the change inputs
//! claimed so far and the change outputs proposed so far. Every balance
//! (`funding`, `change`, `fee_excess`, …) is derived from those lists on
//! demand; nothing is cached between steps.
//!
//! # Phases
//!
//! 1. Seed speculative change outputs (for a target net count, or to absorb
//!    an already positive excess).
//! 2. Fund: claim change inputs one at a time until the excess is
//!    non-negative or the pool runs dry, adding a change output when a new
//!    input overshoots.
//! 3. Starvation: while still short, release every claimed input, drop the
//!    last change output and fund again.
//! 4. Fail with `InsufficientFunds` if still short, or if there is surplus
//!    but no output to hold it.
//! 5. Distribute the surplus over the change outputs.
//! 6. Validate the accounting and return.

use serde::{Deserialize, Serialize};

use crate::allocation::{ChangeAllocator, ChangeInput};
use crate::error::{Error, Result};
use crate::fee::{fee_target, transaction_size};
use crate::params::{ChangeOutput, GenerateChangeParams};
use crate::random::RandomSource;
use crate::validate::validate_generation_result;

/// Upper bound on allocation rounds in one run, across all starvation passes.
pub const MAX_FUNDING_ROUNDS: usize = 100_000;

/// A funded, fee-balanced change plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub allocated_change_inputs: Vec<ChangeInput>,
    pub change_outputs: Vec<ChangeOutput>,
    pub size: u64,
    pub fee: u64,
    pub sats_per_kb: u64,
}

impl GenerationResult {
    pub fn change_satoshis(&self) -> u64 {
        self.change_outputs.iter().map(|o| o.satoshis).sum()
    }

    pub fn allocated_satoshis(&self) -> u64 {
        self.allocated_change_inputs.iter().map(|i| i.satoshis).sum()
    }
}

/// What to ask the allocator for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FundingRequest {
    target_satoshis: u64,
    exact_satoshis: Option<u64>,
    /// The new input should be paired with a new change output.
    balancing_output: bool,
}

/// Per-run accumulator.
#[derive(Debug)]
pub(crate) struct ChangeState<'p> {
    params: &'p GenerateChangeParams,
    allocated: Vec<ChangeInput>,
    outputs: Vec<ChangeOutput>,
}

impl<'p> ChangeState<'p> {
    pub(crate) fn new(params: &'p GenerateChangeParams) -> Self {
        Self {
            params,
            allocated: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn funding(&self) -> i128 {
        let fixed: i128 = self
            .params
            .fixed_inputs
            .iter()
            .map(|i| i128::from(i.satoshis))
            .sum();
        let claimed: i128 = self.allocated.iter().map(|i| i128::from(i.satoshis)).sum();
        fixed + claimed
    }

    fn spending(&self) -> i128 {
        self.params
            .fixed_outputs
            .iter()
            .map(|o| i128::from(o.satoshis))
            .sum()
    }

    fn change(&self) -> i128 {
        self.outputs.iter().map(|o| i128::from(o.satoshis)).sum()
    }

    fn fee(&self) -> i128 {
        self.funding() - self.spending() - self.change()
    }

    /// Transaction size with `extra_inputs` more change inputs and
    /// `extra_outputs` more change outputs than currently held.
    fn size(&self, extra_inputs: usize, extra_outputs: usize) -> u64 {
        let p = self.params;
        let inputs = p
            .fixed_inputs
            .iter()
            .map(|i| i.unlocking_script_length)
            .chain(std::iter::repeat_n(
                p.change_unlocking_script_length,
                self.allocated.len() + extra_inputs,
            ));
        let outputs = p
            .fixed_outputs
            .iter()
            .map(|o| o.locking_script_length)
            .chain(std::iter::repeat_n(
                p.change_locking_script_length,
                self.outputs.len() + extra_outputs,
            ));
        transaction_size(inputs, outputs)
    }

    fn fee_target(&self, extra_inputs: usize, extra_outputs: usize) -> u64 {
        fee_target(
            self.size(extra_inputs, extra_outputs),
            self.params.fee_model.value,
        )
    }

    fn fee_excess_with(&self, extra_inputs: usize, extra_outputs: usize) -> i128 {
        self.fee() - i128::from(self.fee_target(extra_inputs, extra_outputs))
    }

    /// Zero when balanced, negative when under-funded.
    fn fee_excess(&self) -> i128 {
        self.fee_excess_with(0, 0)
    }

    fn net_change_count(&self) -> i64 {
        self.outputs.len() as i64 - self.allocated.len() as i64
    }

    fn needs_balancing_output(&self) -> bool {
        self.params
            .target_net_count
            .is_some_and(|target| self.net_change_count() - 1 < target)
    }

    fn next_change_satoshis(&self) -> u64 {
        if self.outputs.is_empty() {
            self.params.change_first_satoshis
        } else {
            self.params.change_initial_satoshis
        }
    }

    fn push_change_output(&mut self, satoshis: u64) {
        self.outputs.push(ChangeOutput {
            satoshis,
            locking_script_length: self.params.change_locking_script_length,
        });
    }

    fn seed_change_outputs(&mut self) {
        while self
            .params
            .target_net_count
            .is_some_and(|target| target > self.net_change_count())
            || (self.outputs.is_empty() && self.fee_excess() > 0)
        {
            self.push_change_output(self.next_change_satoshis());
        }
    }

    fn funding_request(&self) -> FundingRequest {
        let exact_satoshis = (self.params.target_net_count.is_none() && self.outputs.is_empty())
            .then(|| deficit(self.fee_excess_with(1, 0)));
        let balancing_output = self.needs_balancing_output();
        let headroom = if balancing_output {
            self.params.change_initial_satoshis.saturating_mul(2)
        } else {
            0
        };
        let target_satoshis =
            deficit(self.fee_excess_with(1, usize::from(balancing_output))).saturating_add(headroom);

        FundingRequest {
            target_satoshis,
            exact_satoshis,
            balancing_output,
        }
    }

    /// Spread the positive excess over the change outputs until none is left.
    fn distribute_excess(&mut self, random: &mut RandomSource) {
        let initial = self.params.change_initial_satoshis;
        loop {
            let excess = self.fee_excess();
            if excess <= 0 || self.outputs.is_empty() {
                return;
            }
            let excess = excess as u64;

            if self.outputs.len() == 1 {
                self.outputs[0].satoshis += excess;
            } else if self.outputs[0].satoshis < initial {
                let top_up = excess.min(initial - self.outputs[0].satoshis);
                self.outputs[0].satoshis += top_up;
            } else {
                // 25% to 50% of what is left, at least one satoshi
                let percent = random.int_between(2500, 5000);
                let share = ((u128::from(percent) * u128::from(excess)) / 10_000) as u64;
                let share = share.max(1);
                let index = random.int_between(0, self.outputs.len() as u64 - 1) as usize;
                self.outputs[index].satoshis += share;
            }
        }
    }

    fn insufficient_funds(&self, shortfall: u64) -> Error {
        let required = self.spending() + i128::from(self.fee_target(0, 0));
        Error::InsufficientFunds {
            required: clamp_u64(required),
            shortfall,
        }
    }

    fn into_result(self) -> Result<GenerationResult> {
        let size = self.size(0, 0);
        let fee = u64::try_from(self.fee()).map_err(|_| {
            Error::InternalConsistency(format!("negative final fee {}", self.fee()))
        })?;
        Ok(GenerationResult {
            allocated_change_inputs: self.allocated,
            change_outputs: self.outputs,
            size,
            fee,
            sats_per_kb: self.params.fee_model.value,
        })
    }
}

/// Satoshis needed to lift a negative excess to zero.
fn deficit(excess: i128) -> u64 {
    if excess >= 0 { 0 } else { clamp_u64(-excess) }
}

fn clamp_u64(v: i128) -> u64 {
    u64::try_from(v.max(0)).unwrap_or(u64::MAX)
}

/// Drives one [`ChangeAllocator`] through change generation runs.
pub struct ChangeGenerator<A> {
    allocator: A,
    max_funding_rounds: usize,
}

impl<A: ChangeAllocator> ChangeGenerator<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            max_funding_rounds: MAX_FUNDING_ROUNDS,
        }
    }

    /// Override the allocation round cap (default [`MAX_FUNDING_ROUNDS`]).
    pub fn with_max_funding_rounds(mut self, rounds: usize) -> Self {
        self.max_funding_rounds = rounds;
        self
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    pub fn into_allocator(self) -> A {
        self.allocator
    }

    /// Fund `params` from the change pool and balance the fee exactly.
    ///
    /// On `InsufficientFunds` every input claimed during the run has already
    /// been released. On any other error the allocator may still hold claims;
    /// rolling those back is up to the caller.
    pub async fn generate(&mut self, params: &GenerateChangeParams) -> Result<GenerationResult> {
        params.validate()?;
        if !params.no_logging {
            log::debug!(
                "generate_change: {} fixed inputs ({} sat), {} fixed outputs ({} sat), {} sat/kb, target net count {:?}",
                params.fixed_inputs.len(),
                params.fixed_input_satoshis(),
                params.fixed_outputs.len(),
                params.fixed_output_satoshis(),
                params.fee_model.value,
                params.target_net_count,
            );
        }

        let mut random = RandomSource::from_values(params.random_values.as_deref());
        let mut state = ChangeState::new(params);

        state.seed_change_outputs();
        self.fund(&mut state).await?;

        let excess = state.fee_excess();
        if excess < 0 {
            let err = state.insufficient_funds(deficit(excess));
            self.release_all(&mut state).await?;
            return Err(err);
        }
        if state.outputs.is_empty() && excess > 0 {
            // nowhere to put the surplus without overpaying the fee
            let err = state.insufficient_funds(params.change_first_satoshis);
            self.release_all(&mut state).await?;
            return Err(err);
        }

        state.distribute_excess(&mut random);

        let result = state.into_result()?;
        validate_generation_result(params, &result)?;

        if !params.no_logging && !result.allocated_change_inputs.is_empty() {
            log::info!(
                "generate_change: {} change inputs ({} sat), {} change outputs ({} sat), size {} fee {} at {} sat/kb",
                result.allocated_change_inputs.len(),
                result.allocated_satoshis(),
                result.change_outputs.len(),
                result.change_satoshis(),
                result.size,
                result.fee,
                result.sats_per_kb,
            );
            if !random.drawn().is_empty() {
                log::debug!("generate_change: random values used {:?}", random.drawn());
            }
        }

        Ok(result)
    }

    /// Funding loop plus starvation backtracking.
    async fn fund(&mut self, state: &mut ChangeState<'_>) -> Result<()> {
        let mut backtracking = false;
        let mut rounds = 0usize;

        loop {
            while state.fee_excess() < 0 {
                rounds += 1;
                if rounds > self.max_funding_rounds {
                    return Err(Error::InternalConsistency(format!(
                        "funding did not converge within {} allocation rounds",
                        self.max_funding_rounds
                    )));
                }

                let request = state.funding_request();
                let claimed = self
                    .allocator
                    .allocate(request.target_satoshis, request.exact_satoshis)
                    .await
                    .map_err(Error::allocation)?;
                let Some(input) = claimed else {
                    break;
                };
                state.allocated.push(input);

                let excess = state.fee_excess();
                if !backtracking
                    && excess > 0
                    && (request.balancing_output || state.outputs.is_empty())
                {
                    let satoshis = clamp_u64(excess).min(state.next_change_satoshis());
                    state.push_change_output(satoshis);
                }
            }

            if state.fee_excess() >= 0 || state.outputs.is_empty() {
                return Ok(());
            }

            // starved: retry with one change output fewer
            self.release_all(state).await?;
            state.outputs.pop();
            backtracking = true;
            if !state.params.no_logging {
                log::debug!(
                    "generate_change: starved, retrying with {} change outputs",
                    state.outputs.len()
                );
            }
        }
    }

    /// Release claimed inputs, most recent first.
    async fn release_all(&mut self, state: &mut ChangeState<'_>) -> Result<()> {
        while let Some(input) = state.allocated.pop() {
            self.allocator
                .release(input.output_id)
                .await
                .map_err(Error::allocation)?;
        }
        Ok(())
    }
}
