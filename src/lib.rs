//! Ad and tracker blocking rule engine.
//!
//! The pipeline has three stages: [`parser`] turns filter-list text into
//! structured rules, [`index::builder`] compiles every source of a rule
//! group into one compact index, and [`index::matcher`] answers
//! per-request and per-frame queries against it. [`engine`] owns the
//! index lifecycle (load, rebuild, atomic swap) and [`injection`] adapts
//! matcher results into per-frame payloads.

pub mod data_format;
pub mod engine;
pub mod filters;
pub mod index;
pub mod injection;
pub mod parser;
pub mod request;
pub mod sources;
#[doc(hidden)]
pub mod utils;

pub use engine::{CorruptIndexPolicy, LoadOutcome, RulesIndexManager};
pub use filters::cosmetic::CosmeticRule;
pub use filters::network::{
    ActivationTypes, AnchorTypes, FilterRule, PartyTypes, PatternType, ResourceTypes,
};
pub use index::builder::{build_and_save_index, build_index};
pub use index::matcher::{ActivationsFound, InjectionData, RulesIndex, ScriptletInjection};
pub use index::{RuleId, RulesIndexData, SourceRules};
pub use parser::{parse_filter_list, ParseOutcome, ParseResult, RuleParser};
pub use request::{Request, ResourceType};
pub use sources::{FetchResult, ListMetadata, RuleGroup, RuleSource, RuleSourceBase, RulesInfo};
