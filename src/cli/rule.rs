//! Rule administration commands: add, list, enable, disable.

use clap::{Subcommand, ValueEnum};
use jiff::Timestamp;
use serde_json::json;
use uuid::Uuid;

use crate::{
    model::{Priority, RuleKind, SafetyAlertRule},
    storage::Storage,
};

use super::{format::format_rule, resolve_id};

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    /// Add a rule. Prints the rule ID.
    ///
    /// When several enabled rules share a kind, the most severe one is used.
    Add {
        kind: RuleKindArg,

        #[arg(long, value_enum, default_value_t = PriorityArg::High)]
        priority: PriorityArg,

        /// Maximum ascent rate in m/min (ascent-rate only, default 10).
        #[arg(long)]
        max_rate: Option<f64>,

        /// Create the rule disabled.
        #[arg(long)]
        disabled: bool,
    },

    /// List all rules.
    List,

    /// Enable a rule.
    Enable {
        /// Rule ID: full UUID or unambiguous prefix.
        rule: String,
    },

    /// Disable a rule.
    Disable {
        /// Rule ID: full UUID or unambiguous prefix.
        rule: String,
    },
}

/// CLI-facing rule kind, mapped to the domain `RuleKind`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RuleKindArg {
    /// Depth beyond the planned maximum.
    DepthLimit,
    /// Ascent faster than the configured rate.
    AscentRate,
    /// Longer in the water than planned.
    BottomTime,
}

impl RuleKindArg {
    fn to_domain(self) -> RuleKind {
        match self {
            Self::DepthLimit => RuleKind::DepthLimit,
            Self::AscentRate => RuleKind::AscentRate,
            Self::BottomTime => RuleKind::BottomTime,
        }
    }
}

/// CLI-facing priority, mapped to the domain `Priority`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityArg {
    fn to_domain(self) -> Priority {
        match self {
            Self::Low => Priority::Low,
            Self::Medium => Priority::Medium,
            Self::High => Priority::High,
            Self::Critical => Priority::Critical,
        }
    }
}

pub(super) fn run(command: RuleCommand, storage: &Storage) -> Result<(), String> {
    match command {
        RuleCommand::Add {
            kind,
            priority,
            max_rate,
            disabled,
        } => cmd_add(storage, kind.to_domain(), priority.to_domain(), max_rate, !disabled),
        RuleCommand::List => cmd_list(storage),
        RuleCommand::Enable { rule } => cmd_set_enabled(storage, &rule, true),
        RuleCommand::Disable { rule } => cmd_set_enabled(storage, &rule, false),
    }
}

fn cmd_add(
    storage: &Storage,
    kind: RuleKind,
    priority: Priority,
    max_rate: Option<f64>,
    enabled: bool,
) -> Result<(), String> {
    let config = match (kind, max_rate) {
        (RuleKind::AscentRate, Some(rate)) if rate.is_finite() && rate > 0.0 => {
            json!({ "max_ascent_rate_m_per_min": rate })
        }
        (RuleKind::AscentRate, Some(rate)) => {
            return Err(format!("--max-rate must be a positive number, got {rate}"));
        }
        (_, Some(_)) => return Err("--max-rate only applies to ascent-rate rules".to_string()),
        (_, None) => json!({}),
    };

    let rule = SafetyAlertRule {
        id: Uuid::new_v4(),
        kind,
        config,
        priority,
        enabled,
        created_at: Timestamp::now(),
    };
    storage
        .create_rule(&rule)
        .map_err(|e| format!("failed to create rule: {e}"))?;

    println!("{}", rule.id);
    Ok(())
}

fn cmd_list(storage: &Storage) -> Result<(), String> {
    let rules = storage
        .list_rules()
        .map_err(|e| format!("failed to list rules: {e}"))?;

    if rules.is_empty() {
        println!("No rules");
        return Ok(());
    }
    for rule in &rules {
        println!("{}", format_rule(rule));
    }
    Ok(())
}

fn cmd_set_enabled(storage: &Storage, reference: &str, enabled: bool) -> Result<(), String> {
    let rules = storage
        .list_rules()
        .map_err(|e| format!("failed to list rules: {e}"))?;
    let id = resolve_id(reference, rules.iter().map(|r| r.id), "rule")?;

    let rule = storage
        .set_rule_enabled(id, enabled)
        .map_err(|e| format!("failed to update rule: {e}"))?;
    println!("{}", format_rule(&rule));
    Ok(())
}
