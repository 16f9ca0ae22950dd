//! Convergence plans.
//!
//! A plan drops every trigger any prior artifact ever created, then recreates
//! every currently declared trigger. Applied once or many times it leaves
//! exactly the declared set live.

use tracing::debug;
use trigger_migrate_core::{
    CompiledTrigger, STATEMENT_BREAKPOINT, Sql, TriggerSpec, compile, drop_trigger_statement, join,
    serialize_query, validate_trigger_set,
};

use crate::error::Result;

/// One step of a convergence plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Bare drop of a historical trigger.
    Drop { name: String, statement: Sql },
    /// Drop-then-create of a current trigger.
    Recreate(CompiledTrigger),
}

impl PlanStep {
    pub fn name(&self) -> &str {
        match self {
            Self::Drop { name, .. } => name,
            Self::Recreate(compiled) => compiled.name(),
        }
    }

    pub fn statement(&self) -> Sql {
        match self {
            Self::Drop { statement, .. } => statement.clone(),
            Self::Recreate(compiled) => compiled.statement(),
        }
    }

    /// Top-level SQL statements this step contributes.
    pub fn statement_count(&self) -> usize {
        match self {
            Self::Drop { .. } => 1,
            Self::Recreate(_) => 2,
        }
    }
}

/// Ordered drops and recreates converging live triggers to the declared set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergencePlan {
    steps: Vec<PlanStep>,
}

impl ConvergencePlan {
    /// Builds the plan for `historical` names and `current` specs.
    ///
    /// All current specs compile before anything is returned, so a failing
    /// trigger yields no plan at all.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid or duplicated current spec,
    /// or the compile error of the first trigger that fails to compile.
    pub fn compute(historical: &[String], current: &[TriggerSpec]) -> Result<Self> {
        if let Some(err) = validate_trigger_set(current).into_iter().next() {
            return Err(err.into());
        }

        let mut steps = Vec::with_capacity(historical.len() + current.len());
        steps.extend(historical.iter().map(|name| PlanStep::Drop {
            name: name.clone(),
            statement: drop_trigger_statement(name),
        }));
        for spec in current {
            steps.push(PlanStep::Recreate(compile(spec)?));
        }

        debug!(
            drops = historical.len(),
            recreates = current.len(),
            "computed convergence plan"
        );
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn statement_count(&self) -> usize {
        self.steps.iter().map(PlanStep::statement_count).sum()
    }

    /// Every step's statement joined by the statement breakpoint.
    pub fn statement(&self) -> Sql {
        join(
            self.steps.iter().map(|step| Some(step.statement())),
            STATEMENT_BREAKPOINT,
        )
    }

    /// The plan as literal SQL ready for a migration file.
    pub fn render(&self) -> Result<String> {
        Ok(serialize_query(&self.statement().to_query())?)
    }
}
