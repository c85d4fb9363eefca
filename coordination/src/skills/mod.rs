//! Skill Registry & Injector (spec §4.2).
//!
//! Loads skill packs, indexes them by agent/category/tag, resolves
//! dependency closures, detects conflicts, enforces token budgets, and
//! formats the selected set into a prompt fragment. Grounded in the
//! teacher's `registry::ProviderRegistry` (seal-at-construction pattern,
//! `HashMap`-keyed entries with inverted lookup) generalised to the
//! dependency-closure and budget rules spec.md actually calls for.

pub mod injector;
pub mod registry;

pub use injector::{GroupingMode, InjectionFormat, Injector};
pub use registry::{
    SelectionCriteria, SelectionResult, Skill, SkillPriority, SkillRegistry, SkillRegistryError,
};
