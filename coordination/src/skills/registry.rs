//! Skill definitions, registration, and the selection algorithm.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Injection priority. Ordering matches `spec.md` §4.2 step 5:
/// critical > high > medium > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl SkillPriority {
    fn weight(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }
}

/// A reusable instruction block injected into an agent's prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub category: String,
    pub tags: Vec<String>,
    pub priority: SkillPriority,
    pub token_budget: u32,
    pub instructions: String,
    pub examples: Vec<String>,
    pub requires: Vec<String>,
    pub conflicts: Vec<String>,
    pub applicable_agents: Vec<String>,
    /// Languages/frameworks/project types this skill is conditioned on; an
    /// empty vec means "no constraint" for that axis.
    pub conditions: SkillConditions,
}

/// Context constraints a skill can be scoped to (spec §4.2 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillConditions {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub project_types: Vec<String>,
}

/// Per-skill registration errors (hard failures, spec §4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkillRegistryError {
    #[error("registry is sealed: cannot register `{0}`")]
    Sealed(String),

    #[error("duplicate skill id `{0}`")]
    DuplicateId(String),

    #[error("skill `{0}` requires itself")]
    SelfDependency(String),

    #[error("skill `{id}` lists `{other}` in both requires and conflicts")]
    RequiresConflictsOverlap { id: String, other: String },
}

/// Criteria driving [`SkillRegistry::select`].
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub agent_type: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub project_type: Option<String>,
    pub required_ids: Vec<String>,
    pub exclude_ids: Vec<String>,
    pub max_tokens: Option<u32>,
}

/// Result of running selection: the skills chosen, plus why others weren't.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub selected: Vec<Skill>,
    pub exclusions: Vec<(String, String)>,
}

/// Skill registry. Sealed after initial load (I7): registration calls made
/// after [`SkillRegistry::seal`] fail with [`SkillRegistryError::Sealed`].
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Skill>,
    by_category: HashMap<String, Vec<String>>,
    by_agent: HashMap<String, Vec<String>>,
    by_tag: HashMap<String, Vec<String>>,
    sealed: bool,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill. Validates duplicate ids, self-dependency, and
    /// requires/conflicts overlap as hard errors; logs warnings for large
    /// budgets (>10k) and complex skills (>2 requires) without examples.
    pub fn register(&mut self, skill: Skill) -> Result<(), SkillRegistryError> {
        if self.sealed {
            return Err(SkillRegistryError::Sealed(skill.id));
        }
        if self.skills.contains_key(&skill.id) {
            return Err(SkillRegistryError::DuplicateId(skill.id));
        }
        if skill.requires.contains(&skill.id) {
            return Err(SkillRegistryError::SelfDependency(skill.id));
        }
        for req in &skill.requires {
            if skill.conflicts.contains(req) {
                return Err(SkillRegistryError::RequiresConflictsOverlap {
                    id: skill.id.clone(),
                    other: req.clone(),
                });
            }
        }

        if skill.token_budget > 10_000 {
            warn!(skill_id = %skill.id, budget = skill.token_budget, "skill has a large token budget");
        }
        if skill.requires.len() > 2 && skill.examples.is_empty() {
            warn!(skill_id = %skill.id, "complex skill (>2 dependencies) has no examples");
        }

        {
            let category = skill.category.clone();
            self.by_category.entry(category).or_default().push(skill.id.clone());
        }
        for agent in &skill.applicable_agents {
            self.by_agent.entry(agent.clone()).or_default().push(skill.id.clone());
        }
        for tag in &skill.tags {
            self.by_tag.entry(tag.clone()).or_default().push(skill.id.clone());
        }
        self.skills.insert(skill.id.clone(), skill);
        Ok(())
    }

    /// Seal the registry (I7): further `register` calls are rejected.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.skills.get(id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Run the full selection algorithm (spec §4.2 steps 1-6).
    pub fn select(&self, criteria: &SelectionCriteria) -> SelectionResult {
        let mut exclusions = Vec::new();

        // Step 1: applicable to agentType.
        let mut candidate_ids: Vec<String> = self
            .by_agent
            .get(&criteria.agent_type)
            .cloned()
            .unwrap_or_default();

        // Step 3 (moved up so required ids are always candidates even if the
        // agent index didn't carry them): add explicit requiredIds present
        // in the registry.
        for id in &criteria.required_ids {
            if self.skills.contains_key(id) && !candidate_ids.contains(id) {
                candidate_ids.push(id.clone());
            }
        }

        // Step 2: exclude, filter by category, tag, conditions.
        let mut filtered = Vec::new();
        for id in candidate_ids {
            if criteria.exclude_ids.contains(&id) {
                exclusions.push((id, "excluded by caller".to_string()));
                continue;
            }
            let skill = match self.skills.get(&id) {
                Some(s) => s,
                None => continue,
            };
            if let Some(cat) = &criteria.category {
                if &skill.category != cat {
                    exclusions.push((id, format!("category mismatch (wanted {cat})")));
                    continue;
                }
            }
            if !criteria.tags.is_empty() && !skill.tags.iter().any(|t| criteria.tags.contains(t)) {
                exclusions.push((id, "no matching tag".to_string()));
                continue;
            }
            if let Some(reason) = self.condition_mismatch(skill, criteria) {
                exclusions.push((id, reason));
                continue;
            }
            filtered.push(id);
        }

        // Step 4: dependency closure (depth-first, requires before requirer).
        let mut closure: Vec<String> = Vec::new();
        let mut in_closure: HashSet<String> = HashSet::new();
        for id in &filtered {
            self.add_with_dependencies(id, &mut closure, &mut in_closure, &mut exclusions);
        }

        // Step 5: conflict resolution, priority order, greedy include.
        let mut ordered: Vec<&Skill> = closure
            .iter()
            .filter_map(|id| self.skills.get(id))
            .collect();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.priority.weight()));

        let mut included: Vec<&Skill> = Vec::new();
        let mut included_ids: HashSet<String> = HashSet::new();
        for skill in ordered {
            let conflicts_with_included = skill.conflicts.iter().any(|c| included_ids.contains(c))
                || included.iter().any(|inc| inc.conflicts.contains(&skill.id));
            if conflicts_with_included {
                exclusions.push((skill.id.clone(), "conflicts with an already-included skill".to_string()));
                continue;
            }
            included.push(skill);
            included_ids.insert(skill.id.clone());
        }

        // Step 6: budget application. Critical skills are unconditional (I8).
        let selected = if let Some(max_tokens) = criteria.max_tokens {
            apply_budget(included, max_tokens, &mut exclusions)
        } else {
            included.into_iter().cloned().collect()
        };

        SelectionResult {
            selected,
            exclusions,
        }
    }

    fn condition_mismatch(&self, skill: &Skill, criteria: &SelectionCriteria) -> Option<String> {
        if !skill.conditions.languages.is_empty() {
            match &criteria.language {
                Some(lang) if skill.conditions.languages.contains(lang) => {}
                _ => return Some("language condition not met".to_string()),
            }
        }
        if !skill.conditions.frameworks.is_empty() {
            match &criteria.framework {
                Some(fw) if skill.conditions.frameworks.contains(fw) => {}
                _ => return Some("framework condition not met".to_string()),
            }
        }
        if !skill.conditions.project_types.is_empty() {
            match &criteria.project_type {
                Some(pt) if skill.conditions.project_types.contains(pt) => {}
                _ => return Some("project type condition not met".to_string()),
            }
        }
        None
    }

    /// Depth-first include of `requires[]` before the requiring skill.
    /// Cycles through self-reference are rejected at registration; larger
    /// cycles are broken here by the `visiting` guard (index-based, not a
    /// pointer graph, per `SPEC_FULL.md`/DESIGN_NOTES).
    fn add_with_dependencies(
        &self,
        id: &str,
        closure: &mut Vec<String>,
        in_closure: &mut HashSet<String>,
        exclusions: &mut Vec<(String, String)>,
    ) {
        self.add_with_dependencies_visiting(id, closure, in_closure, &mut HashSet::new(), exclusions)
    }

    fn add_with_dependencies_visiting(
        &self,
        id: &str,
        closure: &mut Vec<String>,
        in_closure: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        exclusions: &mut Vec<(String, String)>,
    ) {
        if in_closure.contains(id) {
            return;
        }
        if !visiting.insert(id.to_string()) {
            exclusions.push((id.to_string(), "dependency cycle detected".to_string()));
            return;
        }
        let Some(skill) = self.skills.get(id) else {
            visiting.remove(id);
            return;
        };
        for dep in &skill.requires {
            self.add_with_dependencies_visiting(dep, closure, in_closure, visiting, exclusions);
        }
        visiting.remove(id);
        if in_closure.insert(id.to_string()) {
            closure.push(id.to_string());
        }
    }
}

/// Accumulate `tokenBudget` in priority order, stopping when exceeded.
/// Critical skills are included unconditionally regardless of where the cut
/// falls (I8).
fn apply_budget(
    ordered: Vec<&Skill>,
    max_tokens: u32,
    exclusions: &mut Vec<(String, String)>,
) -> Vec<Skill> {
    let mut used: u32 = 0;
    let mut selected = Vec::new();
    for skill in ordered {
        if skill.priority == SkillPriority::Critical {
            selected.push(skill.clone());
            used = used.saturating_add(skill.token_budget);
            continue;
        }
        if used.saturating_add(skill.token_budget) > max_tokens {
            exclusions.push((skill.id.clone(), "token budget exceeded".to_string()));
            continue;
        }
        used += skill.token_budget;
        selected.push(skill.clone());
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: &str, priority: SkillPriority, budget: u32) -> Skill {
        Skill {
            id: id.to_string(),
            category: "coding".to_string(),
            tags: vec![],
            priority,
            token_budget: budget,
            instructions: format!("do {id}"),
            examples: vec![],
            requires: vec![],
            conflicts: vec![],
            applicable_agents: vec!["architect".to_string()],
            conditions: SkillConditions::default(),
        }
    }

    #[test]
    fn rejects_duplicate_and_self_dependency() {
        let mut reg = SkillRegistry::new();
        reg.register(skill("a", SkillPriority::Low, 10)).unwrap();
        assert_eq!(
            reg.register(skill("a", SkillPriority::Low, 10)),
            Err(SkillRegistryError::DuplicateId("a".to_string()))
        );

        let mut cyclic = skill("b", SkillPriority::Low, 10);
        cyclic.requires.push("b".to_string());
        assert_eq!(
            reg.register(cyclic),
            Err(SkillRegistryError::SelfDependency("b".to_string()))
        );
    }

    #[test]
    fn rejects_requires_conflicts_overlap() {
        let mut reg = SkillRegistry::new();
        let mut s = skill("a", SkillPriority::Low, 10);
        s.requires.push("x".to_string());
        s.conflicts.push("x".to_string());
        assert_eq!(
            reg.register(s),
            Err(SkillRegistryError::RequiresConflictsOverlap {
                id: "a".to_string(),
                other: "x".to_string()
            })
        );
    }

    #[test]
    fn sealing_rejects_further_registration() {
        let mut reg = SkillRegistry::new();
        reg.seal();
        assert_eq!(
            reg.register(skill("a", SkillPriority::Low, 10)),
            Err(SkillRegistryError::Sealed("a".to_string()))
        );
    }

    #[test]
    fn dependency_closure_includes_requires_before_requirer() {
        let mut reg = SkillRegistry::new();
        reg.register(skill("base", SkillPriority::Low, 10)).unwrap();
        let mut dependent = skill("dependent", SkillPriority::Low, 10);
        dependent.requires.push("base".to_string());
        reg.register(dependent).unwrap();
        reg.seal();

        let result = reg.select(&SelectionCriteria {
            agent_type: "architect".to_string(),
            required_ids: vec!["dependent".to_string()],
            ..Default::default()
        });
        let ids: Vec<&str> = result.selected.iter().map(|s| s.id.as_str()).collect();
        let base_pos = ids.iter().position(|&i| i == "base").unwrap();
        let dependent_pos = ids.iter().position(|&i| i == "dependent").unwrap();
        assert!(base_pos < dependent_pos);
    }

    #[test]
    fn conflicting_skill_is_dropped() {
        let mut reg = SkillRegistry::new();
        let mut a = skill("a", SkillPriority::High, 10);
        a.conflicts.push("b".to_string());
        reg.register(a).unwrap();
        reg.register(skill("b", SkillPriority::Low, 10)).unwrap();
        reg.seal();

        let result = reg.select(&SelectionCriteria {
            agent_type: "architect".to_string(),
            required_ids: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        });
        let ids: Vec<&str> = result.selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(result.exclusions.iter().any(|(id, _)| id == "b"));
    }

    #[test]
    fn budget_stops_non_critical_but_keeps_critical() {
        let mut reg = SkillRegistry::new();
        reg.register(skill("critical", SkillPriority::Critical, 9_000)).unwrap();
        reg.register(skill("high", SkillPriority::High, 2_000)).unwrap();
        reg.register(skill("low", SkillPriority::Low, 2_000)).unwrap();
        reg.seal();

        let result = reg.select(&SelectionCriteria {
            agent_type: "architect".to_string(),
            required_ids: vec!["critical".to_string(), "high".to_string(), "low".to_string()],
            max_tokens: Some(10_000),
            ..Default::default()
        });
        let ids: Vec<&str> = result.selected.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&"critical"));
        // high (2000) fits after critical's 9000 only if <=1000 remained; it doesn't, so it's dropped.
        assert!(!ids.contains(&"high"));
        assert!(!ids.contains(&"low"));
    }

    #[test]
    fn unmatched_tag_is_excluded_with_reason() {
        let mut reg = SkillRegistry::new();
        reg.register(skill("a", SkillPriority::Low, 10)).unwrap();
        reg.seal();
        let result = reg.select(&SelectionCriteria {
            agent_type: "architect".to_string(),
            tags: vec!["security".to_string()],
            ..Default::default()
        });
        assert!(result.selected.is_empty());
    }
}
