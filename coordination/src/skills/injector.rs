//! Formats a selected skill set into a prompt fragment (spec §4.2).

use super::registry::Skill;

/// Output format for the injected fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionFormat {
    Markdown,
    Xml,
    Plain,
}

/// How selected skills are grouped within the fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingMode {
    ByCategory,
    ByPriority,
    Flat,
}

/// Fixed category display order; categories outside this list sort after it,
/// in first-seen order.
const CATEGORY_ORDER: &[&str] = &[
    "security",
    "coding",
    "testing",
    "compliance",
    "api",
    "database",
    "devops",
    "documentation",
    "analysis",
    "ui",
];

/// Approximate token count for a string: `ceil(chars / 4)`, matching the
/// teacher's `CharCountEstimator`.
fn estimate_tokens(s: &str) -> u32 {
    let chars = s.chars().count();
    chars.div_ceil(4) as u32
}

pub struct Injector {
    pub format: InjectionFormat,
    pub grouping: GroupingMode,
}

impl Default for Injector {
    fn default() -> Self {
        Self {
            format: InjectionFormat::Markdown,
            grouping: GroupingMode::ByCategory,
        }
    }
}

impl Injector {
    pub fn new(format: InjectionFormat, grouping: GroupingMode) -> Self {
        Self { format, grouping }
    }

    /// Format `skills` into a single prompt fragment, dropping non-critical
    /// skills once `max_tokens` is exceeded while always keeping critical
    /// ones (I8). Skills are expected to have already passed through
    /// [`super::registry::SkillRegistry::select`]'s own budgeting; this is a
    /// second, format-time guard against the rendered text itself.
    pub fn inject(&self, skills: &[Skill], max_tokens: Option<u32>) -> String {
        let ordered = self.order(skills);

        let mut used = 0u32;
        let mut rendered = Vec::new();
        for skill in ordered {
            let block = self.render_skill(skill);
            let cost = estimate_tokens(&block);
            let is_critical = skill.priority == super::registry::SkillPriority::Critical;
            if !is_critical {
                if let Some(max) = max_tokens {
                    if used.saturating_add(cost) > max {
                        continue;
                    }
                }
            }
            used = used.saturating_add(cost);
            rendered.push((skill, block));
        }

        match self.grouping {
            GroupingMode::Flat | GroupingMode::ByPriority => rendered
                .into_iter()
                .map(|(_, block)| block)
                .collect::<Vec<_>>()
                .join("\n\n"),
            GroupingMode::ByCategory => self.group_by_category(rendered),
        }
    }

    fn order<'a>(&self, skills: &'a [Skill]) -> Vec<&'a Skill> {
        let mut ordered: Vec<&Skill> = skills.iter().collect();
        match self.grouping {
            GroupingMode::ByPriority => {
                ordered.sort_by_key(|s| std::cmp::Reverse(priority_weight(s)));
            }
            GroupingMode::ByCategory => {
                ordered.sort_by_key(|s| category_rank(&s.category));
            }
            GroupingMode::Flat => {}
        }
        ordered
    }

    fn group_by_category(&self, rendered: Vec<(&Skill, String)>) -> String {
        let mut sections: Vec<(String, Vec<String>)> = Vec::new();
        for (skill, block) in rendered {
            match sections.iter_mut().find(|(cat, _)| cat == &skill.category) {
                Some((_, blocks)) => blocks.push(block),
                None => sections.push((skill.category.clone(), vec![block])),
            }
        }
        sections
            .into_iter()
            .map(|(category, blocks)| {
                let header = match self.format {
                    InjectionFormat::Markdown => format!("## {category}"),
                    InjectionFormat::Xml => format!("<category name=\"{category}\">"),
                    InjectionFormat::Plain => category.to_uppercase(),
                };
                let body = blocks.join("\n\n");
                match self.format {
                    InjectionFormat::Xml => format!("{header}\n{body}\n</category>"),
                    _ => format!("{header}\n\n{body}"),
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn render_skill(&self, skill: &Skill) -> String {
        match self.format {
            InjectionFormat::Markdown => {
                let mut out = format!("### {}\n{}", skill.id, skill.instructions);
                if !skill.examples.is_empty() {
                    out.push_str("\n\nExamples:\n");
                    for ex in &skill.examples {
                        out.push_str(&format!("- {ex}\n"));
                    }
                }
                out
            }
            InjectionFormat::Xml => {
                let examples: String = skill
                    .examples
                    .iter()
                    .map(|e| format!("<example>{e}</example>"))
                    .collect::<Vec<_>>()
                    .join("");
                format!(
                    "<skill id=\"{}\"><instructions>{}</instructions>{}</skill>",
                    skill.id, skill.instructions, examples
                )
            }
            InjectionFormat::Plain => {
                let mut out = format!("{}: {}", skill.id, skill.instructions);
                for ex in &skill.examples {
                    out.push_str(&format!("\n  e.g. {ex}"));
                }
                out
            }
        }
    }
}

fn priority_weight(skill: &Skill) -> u8 {
    use super::registry::SkillPriority::*;
    match skill.priority {
        Critical => 3,
        High => 2,
        Medium => 1,
        Low => 0,
    }
}

fn category_rank(category: &str) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|c| *c == category)
        .unwrap_or(CATEGORY_ORDER.len())
}

#[cfg(test)]
mod tests {
    use super::super::registry::{SkillConditions, SkillPriority};
    use super::*;

    fn skill(id: &str, category: &str, priority: SkillPriority, instructions: &str) -> Skill {
        Skill {
            id: id.to_string(),
            category: category.to_string(),
            tags: vec![],
            priority,
            token_budget: 100,
            instructions: instructions.to_string(),
            examples: vec![],
            requires: vec![],
            conflicts: vec![],
            applicable_agents: vec![],
            conditions: SkillConditions::default(),
        }
    }

    #[test]
    fn markdown_output_includes_heading_per_skill() {
        let skills = vec![skill("a", "coding", SkillPriority::High, "do the thing")];
        let injector = Injector::new(InjectionFormat::Markdown, GroupingMode::Flat);
        let out = injector.inject(&skills, None);
        assert!(out.contains("### a"));
        assert!(out.contains("do the thing"));
    }

    #[test]
    fn category_grouping_orders_security_before_coding() {
        let skills = vec![
            skill("coder", "coding", SkillPriority::Medium, "code stuff"),
            skill("sec", "security", SkillPriority::Medium, "secure stuff"),
        ];
        let injector = Injector::new(InjectionFormat::Plain, GroupingMode::ByCategory);
        let out = injector.inject(&skills, None);
        assert!(out.find("SECURITY").unwrap() < out.find("CODING").unwrap());
    }

    #[test]
    fn budget_drops_non_critical_but_keeps_critical() {
        let skills = vec![
            skill("critical", "coding", SkillPriority::Critical, &"x".repeat(400)),
            skill("extra", "coding", SkillPriority::Low, &"y".repeat(400)),
        ];
        let injector = Injector::new(InjectionFormat::Plain, GroupingMode::Flat);
        let out = injector.inject(&skills, Some(10));
        assert!(out.contains("critical"));
        assert!(!out.contains("extra"));
    }
}
