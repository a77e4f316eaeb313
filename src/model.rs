//! A solver-independent mixed-integer linear program.
//!
//! The builder writes into this representation and each backend translates it
//! into its own engine's API, so nothing outside `backend` names an engine.

use std::fmt;

/// Index of a variable within its [`MilpModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarKind {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Eq => "==",
            Sense::Ge => ">=",
        })
    }
}

/// `sum(coefficient * variable) <sense> rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coefficient)| coefficient * values.get(var.index()).copied().unwrap_or(0.0))
            .sum()
    }

    pub fn is_satisfied_by(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
        }
    }
}

/// A minimisation problem over bounded binary and continuous variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilpModel {
    pub variables: Vec<VarDef>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: Vec<(VarId, f64)>,
}

pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;

impl MilpModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name.into(), VarKind::Binary, 0.0, 1.0)
    }

    /// A binary variable whose value is decided up front.
    pub fn add_fixed_binary(&mut self, name: impl Into<String>, value: bool) -> VarId {
        let value = if value { 1.0 } else { 0.0 };
        self.add_variable(name.into(), VarKind::Binary, value, value)
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64) -> VarId {
        self.add_variable(name.into(), VarKind::Continuous, lower, f64::INFINITY)
    }

    fn add_variable(&mut self, name: String, kind: VarKind, lower: f64, upper: f64) -> VarId {
        self.variables.push(VarDef {
            name,
            kind,
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        terms: Vec<(VarId, f64)>,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            terms,
            sense,
            rhs,
        });
    }

    pub fn add_objective_term(&mut self, var: VarId, coefficient: f64) {
        if coefficient != 0.0 {
            self.objective.push((var, coefficient));
        }
    }

    pub fn var(&self, id: VarId) -> &VarDef {
        &self.variables[id.index()]
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .map(|(var, coefficient)| coefficient * values.get(var.index()).copied().unwrap_or(0.0))
            .sum()
    }

    /// Names of the bounds, integrality requirements and constraints `values` breaks.
    pub fn violations(&self, values: &[f64]) -> Vec<String> {
        let value = |index: usize| values.get(index).copied().unwrap_or(0.0);
        let bounds = self.variables.iter().enumerate().filter_map(|(index, def)| {
            let v = value(index);
            let out_of_bounds =
                v < def.lower - INTEGRALITY_TOLERANCE || v > def.upper + INTEGRALITY_TOLERANCE;
            let fractional =
                def.kind == VarKind::Binary && (v - v.round()).abs() > INTEGRALITY_TOLERANCE;
            (out_of_bounds || fractional).then(|| format!("{} = {v}", def.name))
        });
        let rows = self
            .constraints
            .iter()
            .filter(|c| !c.is_satisfied_by(values, INTEGRALITY_TOLERANCE))
            .map(|c| format!("{}: {} {} {}", c.name, c.lhs(values), c.sense, c.rhs));
        bounds.chain(rows).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_count_as_zero() {
        let mut model = MilpModel::new();
        let a = model.add_binary("a");
        let b = model.add_binary("b");
        model.add_constraint("at_most_one", vec![(a, 1.0), (b, 1.0)], Sense::Le, 1.0);
        model.add_constraint("exactly_one", vec![(a, 1.0), (b, 1.0)], Sense::Eq, 1.0);

        assert!(model.violations(&[1.0]).is_empty());
        assert_eq!(model.violations(&[]), vec!["exactly_one: 0 == 1".to_string()]);
    }

    #[test]
    fn reports_broken_bounds_and_fractional_binaries() {
        let mut model = MilpModel::new();
        model.add_fixed_binary("fixed", true);
        model.add_binary("free");
        let excess = model.add_continuous("excess", 0.0);
        model.add_objective_term(excess, 2.0);

        let violations = model.violations(&[0.0, 0.5, 3.0]);
        assert_eq!(violations, vec!["fixed = 0".to_string(), "free = 0.5".to_string()]);
        assert_eq!(model.objective_value(&[0.0, 0.5, 3.0]), 6.0);
    }
}
