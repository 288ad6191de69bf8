//! Oracle usage pricing and the per-application cost ledger.

use serde_json::{json, Map, Value};

use super::result::CostMeta;
use super::round6;

/// Per-token USD rates for the oracle models in use.
#[derive(Debug, Clone, Copy)]
struct ModelRates {
    input: f64,
    output: f64,
}

/// USD pricing table, keyed by model name. Rates are per single token.
pub struct CostTable {
    rates: Vec<(&'static str, ModelRates)>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            rates: vec![
                (
                    "gpt-4o",
                    ModelRates {
                        input: 2.5 / 1_000_000.0,
                        output: 10.0 / 1_000_000.0,
                    },
                ),
                (
                    "gpt-4o-mini",
                    ModelRates {
                        input: 0.15 / 1_000_000.0,
                        output: 0.6 / 1_000_000.0,
                    },
                ),
            ],
        }
    }
}

impl CostTable {
    /// USD cost of one oracle call, rounded to 6 decimals. An unknown model
    /// prices at zero so a pricing gap never blocks scoring.
    pub fn calculate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let Some(rates) = self
            .rates
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, rates)| *rates)
        else {
            tracing::warn!(model, "unknown model in cost table, pricing call at 0");
            return 0.0;
        };

        round6(input_tokens as f64 * rates.input + output_tokens as f64 * rates.output)
    }
}

fn ledger_f64(ledger: Option<&Map<String, Value>>, key: &str) -> f64 {
    ledger
        .and_then(|l| l.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Folds one oracle call's cost meta into an application's stored cost
/// ledger. Totals accumulate across calls; the per-step breakdown keeps
/// only the latest entry for each step. A missing or malformed ledger
/// starts from zero rather than failing the write.
pub fn merge_cost_ledger(current: Option<&Value>, meta: &CostMeta) -> Value {
    let ledger = current.and_then(Value::as_object);

    let total_tokens = ledger_f64(ledger, "total_tokens") + meta.tokens.total as f64;
    let total_cost_usd = round6(ledger_f64(ledger, "total_cost_usd") + meta.cost);

    let mut breakdown = ledger
        .and_then(|l| l.get("breakdown"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    breakdown.insert(
        meta.step.as_str().to_string(),
        json!({
            "prompt": meta.tokens.prompt,
            "completion": meta.tokens.completion,
            "model": meta.model,
        }),
    );

    json!({
        "total_tokens": total_tokens,
        "total_cost_usd": total_cost_usd,
        "breakdown": breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::result::{CostStep, TokenUsage};

    fn meta(step: CostStep, model: &str, prompt: u64, completion: u64, cost: f64) -> CostMeta {
        CostMeta {
            step,
            model: model.to_string(),
            tokens: TokenUsage {
                prompt,
                completion,
                total: prompt + completion,
            },
            cost,
        }
    }

    #[test]
    fn test_gpt_4o_pricing() {
        let table = CostTable::default();
        // 1000 * 2.5/1M + 500 * 10/1M = 0.0025 + 0.005
        assert_eq!(table.calculate("gpt-4o", 1000, 500), 0.0075);
    }

    #[test]
    fn test_gpt_4o_mini_pricing() {
        let table = CostTable::default();
        assert_eq!(table.calculate("gpt-4o-mini", 1_000_000, 1_000_000), 0.75);
    }

    #[test]
    fn test_unknown_model_prices_at_zero() {
        let table = CostTable::default();
        assert_eq!(table.calculate("claude-haiku", 5000, 5000), 0.0);
    }

    #[test]
    fn test_cost_is_rounded_to_six_decimals() {
        let table = CostTable::default();
        // 3 * 2.5/1M = 0.0000075 -> 0.000008
        assert_eq!(table.calculate("gpt-4o", 3, 0), 0.000008);
    }

    #[test]
    fn test_merge_into_empty_ledger() {
        let ledger = merge_cost_ledger(None, &meta(CostStep::Scoring, "gpt-4o", 900, 100, 0.00325));

        assert_eq!(ledger["total_tokens"], 1000.0);
        assert_eq!(ledger["total_cost_usd"], 0.00325);
        assert_eq!(ledger["breakdown"]["scoring"]["prompt"], 900);
        assert_eq!(ledger["breakdown"]["scoring"]["model"], "gpt-4o");
    }

    #[test]
    fn test_merge_accumulates_totals_and_keeps_other_steps() {
        let first = merge_cost_ledger(None, &meta(CostStep::Scoring, "gpt-4o", 900, 100, 0.003));
        let second = merge_cost_ledger(
            Some(&first),
            &meta(CostStep::Feedback, "gpt-4o-mini", 200, 300, 0.0002),
        );

        assert_eq!(second["total_tokens"], 1500.0);
        assert_eq!(second["total_cost_usd"], 0.0032);
        assert_eq!(second["breakdown"]["scoring"]["model"], "gpt-4o");
        assert_eq!(second["breakdown"]["feedback"]["completion"], 300);
    }

    #[test]
    fn test_merge_replaces_breakdown_for_same_step() {
        let first = merge_cost_ledger(None, &meta(CostStep::Scoring, "gpt-4o", 900, 100, 0.003));
        let second = merge_cost_ledger(
            Some(&first),
            &meta(CostStep::Scoring, "gpt-4o-mini", 10, 20, 0.0001),
        );

        assert_eq!(second["total_tokens"], 1030.0);
        assert_eq!(second["breakdown"]["scoring"]["prompt"], 10);
        assert_eq!(second["breakdown"]["scoring"]["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_merge_treats_malformed_ledger_as_empty() {
        let garbage = serde_json::json!("not a ledger");
        let ledger = merge_cost_ledger(
            Some(&garbage),
            &meta(CostStep::Scoring, "gpt-4o", 10, 10, 0.001),
        );

        assert_eq!(ledger["total_tokens"], 20.0);
        assert_eq!(ledger["total_cost_usd"], 0.001);
    }
}
