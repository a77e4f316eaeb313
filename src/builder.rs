use crate::candidates::{Candidates, LessonCandidates};
use crate::config::{SolveConfig, hour_of_day};
use crate::data::{Resource, SlotId};
use crate::model::{MilpModel, Sense, VarId};
use chrono::NaiveTime;
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Key of a decision variable: (index of the lesson in the candidates, slot).
pub type VarKey = (usize, SlotId);
/// Key of a double period variable: (lesson index, first slot, second slot).
pub type PairKey = (usize, SlotId, SlotId);

/// The MILP for one school, together with the mapping back to lessons and slots.
#[derive(Debug, Clone)]
pub struct TimetableModel<'a> {
    pub milp: MilpModel,
    pub candidates: Candidates<'a>,
    // x_ls = 1 if lesson l is taught at slot s
    pub decision_variables: BTreeMap<VarKey, VarId>,
    // p_lab = 1 if lesson l is taught at both back-to-back slots a and b
    pub double_period_variables: BTreeMap<PairKey, VarId>,
}

/// Builds the decision variables, hard constraints and objective.
pub fn build_model<'a>(candidates: Candidates<'a>, config: &SolveConfig) -> TimetableModel<'a> {
    info!(
        "Setting up timetable model with {} lessons and {} slots...",
        candidates.lessons.len(),
        candidates.slots.len()
    );
    let mut builder = ModelBuilder {
        milp: MilpModel::new(),
        decision_variables: BTreeMap::new(),
        double_period_variables: BTreeMap::new(),
        config,
    };

    builder.add_decision_variables(&candidates);
    builder.add_fulfillment_constraints(&candidates);
    builder.add_exclusivity_constraints(&candidates);
    builder.add_double_period_constraints(&candidates);
    if !config.allow_split_lessons_within_each_day {
        builder.add_no_split_lessons_constraints(&candidates);
    }
    if !config.allow_triple_periods_and_above {
        builder.add_no_two_doubles_in_a_day_constraints(&candidates);
    }
    builder.add_objective(&candidates);

    debug!(
        "Model has {} variables and {} constraints",
        builder.milp.variables.len(),
        builder.milp.constraints.len()
    );

    TimetableModel {
        milp: builder.milp,
        candidates,
        decision_variables: builder.decision_variables,
        double_period_variables: builder.double_period_variables,
    }
}

struct ModelBuilder<'c> {
    milp: MilpModel,
    decision_variables: BTreeMap<VarKey, VarId>,
    double_period_variables: BTreeMap<PairKey, VarId>,
    config: &'c SolveConfig,
}

impl ModelBuilder<'_> {
    fn add_decision_variables(&mut self, candidates: &Candidates<'_>) {
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            for slot in &lesson.slots {
                let name = format!("{}_occurs_at_slot_{}", lesson.lesson.id, slot.id);
                // user-defined slots are decided already
                let var = if lesson.is_fixed(slot.id) {
                    self.milp.add_fixed_binary(name, true)
                } else {
                    self.milp.add_binary(name)
                };
                self.decision_variables.insert((index, slot.id), var);
            }
        }
        trace!(
            "Generated {} decision variables",
            self.decision_variables.len()
        );
    }

    fn lesson_vars(&self, index: usize) -> impl Iterator<Item = (SlotId, VarId)> + '_ {
        self.decision_variables
            .range((index, SlotId::MIN)..=(index, SlotId::MAX))
            .map(|((_, slot_id), var)| (*slot_id, *var))
    }

    fn pair_vars(&self, index: usize) -> impl Iterator<Item = (SlotId, SlotId, VarId)> + '_ {
        self.double_period_variables
            .range((index, SlotId::MIN, SlotId::MIN)..=(index, SlotId::MAX, SlotId::MAX))
            .map(|((_, first, second), var)| (*first, *second, *var))
    }

    fn add_fulfillment_constraints(&mut self, candidates: &Candidates<'_>) {
        info!("Adding 'slot count' constraints...");
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            let terms = self.lesson_vars(index).map(|(_, var)| (var, 1.0)).collect();
            self.milp.add_constraint(
                format!(
                    "{}_taught_for_{}_slots",
                    lesson.lesson.id, lesson.lesson.total_required_slots
                ),
                terms,
                Sense::Eq,
                lesson.lesson.total_required_slots as f64,
            );
        }
    }

    /// At every instant a slot starts, each resource is in at most one lesson.
    ///
    /// Slots of different year groups need not align, so a constraint covers every
    /// slot running at that instant rather than a single slot id.
    fn add_exclusivity_constraints(&mut self, candidates: &Candidates<'_>) {
        info!("Adding 'no clash' constraints for teachers, pupils and classrooms...");
        let mut lessons_by_resource: BTreeMap<Resource, Vec<usize>> = BTreeMap::new();
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            for resource in lesson.lesson.resources() {
                lessons_by_resource.entry(resource).or_default().push(index);
            }
        }

        let decision_variables = &self.decision_variables;
        let mut seen: BTreeSet<Vec<VarId>> = BTreeSet::new();
        for (resource, lesson_indices) in &lessons_by_resource {
            let label = resource.to_string().replace(' ', "_");
            let instants: BTreeSet<(u8, NaiveTime)> = lesson_indices
                .iter()
                .flat_map(|i| candidates.lessons[*i].slots.iter())
                .map(|s| (s.time.day_of_week, s.time.starts_at))
                .collect();

            for (day, at) in instants {
                let vars: Vec<VarId> = lesson_indices
                    .iter()
                    .flat_map(|i| {
                        candidates.lessons[*i]
                            .slots
                            .iter()
                            .filter(move |s| s.time.contains_instant(day, at))
                            .filter_map(move |s| decision_variables.get(&(*i, s.id)).copied())
                    })
                    .sorted()
                    .collect();
                if vars.len() < 2 || !seen.insert(vars.clone()) {
                    continue;
                }
                self.milp.add_constraint(
                    format!("{label}_busy_at_day_{day}_{}", at.format("%H%M")),
                    vars.into_iter().map(|v| (v, 1.0)).collect(),
                    Sense::Le,
                    1.0,
                );
            }
        }
        trace!("{} distinct clash groups constrained", seen.len());
    }

    fn add_double_period_constraints(&mut self, candidates: &Candidates<'_>) {
        info!("Adding 'double period' constraints...");
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            let required = lesson.lesson.total_required_double_periods;
            let fixed_pairs = lesson
                .double_period_pairs
                .iter()
                .filter(|(a, b)| lesson.is_fixed(*a) && lesson.is_fixed(*b))
                .count();
            if fixed_pairs > required as usize {
                warn!(
                    "Lesson {} has {fixed_pairs} double periods among its fixed slots \
                     but requires {required}",
                    lesson.lesson.id
                );
            }

            for (first, second) in &lesson.double_period_pairs {
                let x1 = self.decision_variables[&(index, *first)];
                let x2 = self.decision_variables[&(index, *second)];
                let prefix = format!("{}_double_at_{first}_{second}", lesson.lesson.id);

                if required == 0 {
                    // no pair variable needed: the two slots simply cannot both be taken
                    self.milp.add_constraint(
                        format!("{prefix}_forbidden"),
                        vec![(x1, 1.0), (x2, 1.0)],
                        Sense::Le,
                        1.0,
                    );
                    continue;
                }

                let pair = self.milp.add_binary(prefix.clone());
                self.double_period_variables
                    .insert((index, *first, *second), pair);
                self.milp.add_constraint(
                    format!("{prefix}_needs_first"),
                    vec![(pair, 1.0), (x1, -1.0)],
                    Sense::Le,
                    0.0,
                );
                self.milp.add_constraint(
                    format!("{prefix}_needs_second"),
                    vec![(pair, 1.0), (x2, -1.0)],
                    Sense::Le,
                    0.0,
                );
                self.milp.add_constraint(
                    format!("{prefix}_if_both"),
                    vec![(pair, 1.0), (x1, -1.0), (x2, -1.0)],
                    Sense::Ge,
                    -1.0,
                );
            }

            if required > 0 {
                let terms = self.pair_vars(index).map(|(_, _, var)| (var, 1.0)).collect();
                self.milp.add_constraint(
                    format!("{}_has_{required}_double_periods", lesson.lesson.id),
                    terms,
                    Sense::Eq,
                    required as f64,
                );
            }
        }
    }

    /// `(slots taught) - (double periods)` on `day`: the number of separate blocks.
    fn blocks_on_day(
        &self,
        index: usize,
        lesson: &LessonCandidates<'_>,
        day: u8,
    ) -> Vec<(VarId, f64)> {
        let on_day = |slot_id: SlotId| {
            lesson
                .slots
                .iter()
                .any(|s| s.id == slot_id && s.time.day_of_week == day)
        };
        let singles = self
            .lesson_vars(index)
            .filter(|(slot_id, _)| on_day(*slot_id))
            .map(|(_, var)| (var, 1.0));
        let doubles = self
            .pair_vars(index)
            .filter(|(first, _, _)| on_day(*first))
            .map(|(_, _, var)| (var, -1.0));
        singles.chain(doubles).collect()
    }

    fn add_no_split_lessons_constraints(&mut self, candidates: &Candidates<'_>) {
        info!("Adding 'no split lessons within a day' constraints...");
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            for day in lesson.days() {
                let terms = self.blocks_on_day(index, lesson, day);
                self.milp.add_constraint(
                    format!("no_split_{}_on_day_{day}", lesson.lesson.id),
                    terms,
                    Sense::Le,
                    1.0,
                );
            }
        }
    }

    fn add_no_two_doubles_in_a_day_constraints(&mut self, candidates: &Candidates<'_>) {
        info!("Adding 'at most one double period a day' constraints...");
        for (index, lesson) in candidates.lessons.iter().enumerate() {
            for day in lesson.days() {
                let terms: Vec<(VarId, f64)> = self
                    .pair_vars(index)
                    .filter(|(first, _, _)| {
                        candidates.slots[first].time.day_of_week == day
                    })
                    .map(|(_, _, var)| (var, 1.0))
                    .collect();
                if terms.len() < 2 {
                    continue;
                }
                self.milp.add_constraint(
                    format!("max_one_{}_double_on_day_{day}", lesson.lesson.id),
                    terms,
                    Sense::Le,
                    1.0,
                );
            }
        }
    }

    /// Soft preferences: spread each lesson across the week, and optionally keep
    /// lessons away from the preferred free period time.
    fn add_objective(&mut self, candidates: &Candidates<'_>) {
        let spread_weight = self.config.spread_weight;
        // with split lessons forbidden the spread penalty is always zero
        if spread_weight > 0.0 && self.config.allow_split_lessons_within_each_day {
            for (index, lesson) in candidates.lessons.iter().enumerate() {
                if lesson.lesson.total_required_slots < 2 {
                    continue;
                }
                for day in lesson.days() {
                    let slots_on_day = lesson
                        .slots
                        .iter()
                        .filter(|s| s.time.day_of_week == day)
                        .count();
                    if slots_on_day < 2 {
                        continue;
                    }
                    // excess >= blocks - 1
                    let excess = self.milp.add_continuous(
                        format!("{}_extra_blocks_on_day_{day}", lesson.lesson.id),
                        0.0,
                    );
                    let mut terms = vec![(excess, 1.0)];
                    terms.extend(
                        self.blocks_on_day(index, lesson, day)
                            .into_iter()
                            .map(|(var, coefficient)| (var, -coefficient)),
                    );
                    self.milp.add_constraint(
                        format!("{}_spread_on_day_{day}", lesson.lesson.id),
                        terms,
                        Sense::Ge,
                        -1.0,
                    );
                    self.milp.add_objective_term(excess, spread_weight);
                }
            }
        }

        if let Some(preference) = self.config.optimal_free_period_time {
            let weight = self.config.free_period_weight;
            let times = candidates.slots.values().map(|slot| &slot.time);
            let day_start = times
                .clone()
                .map(|time| hour_of_day(time.starts_at))
                .fold(f64::INFINITY, f64::min);
            let day_end = times
                .map(|time| hour_of_day(time.ends_at))
                .fold(f64::NEG_INFINITY, f64::max);
            let free_hour = preference.repulsive_hour(day_start, day_end);
            debug!("Pushing lessons away from hour {free_hour:.2} ({preference:?})");

            let repulsion: Vec<(VarId, f64)> = self
                .decision_variables
                .iter()
                .filter(|((index, slot_id), _)| !candidates.lessons[*index].is_fixed(*slot_id))
                .map(|((_, slot_id), var)| {
                    let starts_at = hour_of_day(candidates.slots[slot_id].time.starts_at);
                    (*var, -weight * (starts_at - free_hour).abs())
                })
                .collect();
            for (var, coefficient) in repulsion {
                self.milp.add_objective_term(var, coefficient);
            }
        }
        info!(
            "Objective defined with {} terms (spread weight {spread_weight})",
            self.milp.objective.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::generate_candidates;
    use crate::config::FreePeriodPreference;
    use crate::data::{Pupil, SchoolSnapshot, YearGroup};
    use crate::model::VarKind;
    use crate::structure::uniform_week;
    use crate::test_support::{at, lesson, school};

    fn values_for(model: &TimetableModel<'_>, taught: &[(usize, SlotId)]) -> Vec<f64> {
        let mut values = vec![0.0; model.milp.variables.len()];
        for key in taught {
            values[model.decision_variables[key].index()] = 1.0;
        }
        for ((index, first, second), var) in &model.double_period_variables {
            if taught.contains(&(*index, *first)) && taught.contains(&(*index, *second)) {
                values[var.index()] = 1.0;
            }
        }
        // set the spread slack to its smallest feasible value
        for (i, def) in model.milp.variables.iter().enumerate() {
            if def.kind == VarKind::Continuous {
                values[i] = 0.0;
                let constraint = model
                    .milp
                    .constraints
                    .iter()
                    .find(|c| c.terms.iter().any(|(v, _)| v.index() == i))
                    .unwrap();
                let rest = constraint.lhs(&values);
                values[i] = (constraint.rhs - rest).max(0.0);
            }
        }
        values
    }

    #[test]
    fn fixed_slots_are_fixed_variables() {
        let mut snapshot = school(5, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1, 2, 3], 5, 1, &[6, 24]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        assert_eq!(model.decision_variables.len(), 35);
        assert_eq!(model.double_period_variables.len(), 30);
        let fixed = model.milp.var(model.decision_variables[&(0, 6)]);
        assert_eq!((fixed.lower, fixed.upper), (1.0, 1.0));
        let free = model.milp.var(model.decision_variables[&(0, 7)]);
        assert_eq!((free.lower, free.upper), (0.0, 1.0));
    }

    #[test]
    fn valid_timetable_satisfies_the_model() {
        let mut snapshot = school(5, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1, 2, 3], 5, 1, &[6, 24]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        // one double on Monday (6, 7), singles on Tuesday and Thursday
        let values = values_for(&model, &[(0, 6), (0, 7), (0, 10), (0, 24), (0, 31)]);
        assert!(model.milp.violations(&values).is_empty());
        assert_eq!(model.milp.objective_value(&values), 0.0);
    }

    #[test]
    fn extra_double_period_breaks_the_model() {
        let mut snapshot = school(5, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1, 2, 3], 5, 1, &[6, 24]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        let values = values_for(&model, &[(0, 6), (0, 7), (0, 24), (0, 25), (0, 31)]);
        let violations = model.milp.violations(&values);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("maths_has_1_double_periods"));
    }

    #[test]
    fn split_lesson_is_penalised() {
        let mut snapshot = school(5, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 2, 0, &[]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        let split = values_for(&model, &[(0, 1), (0, 3)]);
        assert!(model.milp.violations(&split).is_empty());
        assert_eq!(model.milp.objective_value(&split), 1.0);

        let spread = values_for(&model, &[(0, 1), (0, 8)]);
        assert_eq!(model.milp.objective_value(&spread), 0.0);
    }

    #[test]
    fn no_doubles_required_forbids_back_to_back() {
        let mut snapshot = school(1, 3);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 2, 0, &[]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        assert!(model.double_period_variables.is_empty());
        assert!(!model.milp.violations(&values_for(&model, &[(0, 1), (0, 2)])).is_empty());
        assert!(model.milp.violations(&values_for(&model, &[(0, 1), (0, 3)])).is_empty());
    }

    #[test]
    fn shared_teacher_cannot_teach_twice_at_once() {
        let mut snapshot = school(1, 2);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 1, 0, &[]));
        snapshot.lessons.push(lesson("physics", 1, 11, &[2], 1, 0, &[]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        assert!(!model.milp.violations(&values_for(&model, &[(0, 1), (1, 1)])).is_empty());
        assert!(model.milp.violations(&values_for(&model, &[(0, 1), (1, 2)])).is_empty());
    }

    #[test]
    fn structural_options_add_hard_constraints() {
        let mut snapshot = school(1, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 4, 2, &[]));
        let config = SolveConfig {
            allow_split_lessons_within_each_day: false,
            allow_triple_periods_and_above: false,
            ..SolveConfig::default()
        };
        let model = build_model(generate_candidates(&snapshot).unwrap(), &config);

        // two separate doubles on one day: split
        let two_blocks = values_for(&model, &[(0, 1), (0, 2), (0, 4), (0, 5)]);
        assert!(!model.milp.violations(&two_blocks).is_empty());
        // a quadruple: three doubles, more than required anyway
        let quadruple = values_for(&model, &[(0, 1), (0, 2), (0, 3), (0, 4)]);
        assert!(!model.milp.violations(&quadruple).is_empty());
        assert!(model.milp.objective.is_empty());
    }

    #[test]
    fn teacher_clash_is_caught_across_offset_year_groups() {
        let mut snapshot = school(1, 2);
        snapshot.year_groups.push(YearGroup {
            id: "2".to_string(),
        });
        snapshot.pupils.push(Pupil {
            id: 20,
            year_group: "2".to_string(),
        });
        // year group 2 runs half an hour behind: 101 is 09:30-10:30, 102 is 10:30-11:30
        let mut offset = uniform_week(&["2".to_string()], 1, 2, at(9, 30), 60);
        for slot in &mut offset {
            slot.id += 100;
        }
        snapshot.timetable_slots.extend(offset);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 1, 0, &[]));
        snapshot.lessons.push(lesson("art", 1, 11, &[20], 1, 0, &[]));
        let model = build_model(generate_candidates(&snapshot).unwrap(), &SolveConfig::default());

        assert!(!model.milp.violations(&values_for(&model, &[(0, 1), (1, 101)])).is_empty());
        assert!(model.milp.violations(&values_for(&model, &[(0, 1), (1, 102)])).is_empty());
    }

    fn free_period_model(
        snapshot: &SchoolSnapshot,
        preference: FreePeriodPreference,
    ) -> TimetableModel<'_> {
        let config = SolveConfig {
            optimal_free_period_time: Some(preference),
            free_period_weight: 1.0,
            ..SolveConfig::default()
        };
        build_model(generate_candidates(snapshot).unwrap(), &config)
    }

    #[test]
    fn free_period_preference_pushes_lessons_away() {
        let mut snapshot = school(1, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 1, 0, &[]));
        let model = free_period_model(&snapshot, FreePeriodPreference::At(at(9, 0)));

        let early = values_for(&model, &[(0, 1)]);
        let late = values_for(&model, &[(0, 7)]);
        assert!(model.milp.objective_value(&late) < model.milp.objective_value(&early));
    }

    #[test]
    fn morning_and_afternoon_follow_the_school_day() {
        // slots run 09:00 to 16:00, so morning is 10:30 and afternoon is 14:00
        let mut snapshot = school(1, 7);
        snapshot.lessons.push(lesson("maths", 1, 10, &[1], 1, 0, &[]));

        let model = free_period_model(&snapshot, FreePeriodPreference::Morning);
        let first = model.milp.objective_value(&values_for(&model, &[(0, 1)]));
        let second = model.milp.objective_value(&values_for(&model, &[(0, 2)]));
        let last = model.milp.objective_value(&values_for(&model, &[(0, 7)]));
        assert_eq!(first, -1.5);
        assert!(last < first && first < second);

        let model = free_period_model(&snapshot, FreePeriodPreference::Afternoon);
        let first = model.milp.objective_value(&values_for(&model, &[(0, 1)]));
        let sixth = model.milp.objective_value(&values_for(&model, &[(0, 6)]));
        assert_eq!(first, -5.0);
        assert!(first < sixth);
    }
}
