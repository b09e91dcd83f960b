use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::advice::AdviceHandles;
use crate::compose::{MixinType, ShimType};
use crate::pointcut::PointcutSpec;

/// Rule source contents: advice definitions plus mixins and shims.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RuleSet {
    pub advice: Vec<AdviceRule>,
    pub mixins: Vec<MixinType>,
    pub shims: Vec<ShimType>,
}

/// One pointcut with its bound stage handles.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRule {
    pub id: String,
    pub pointcut: PointcutSpec,
    #[serde(flatten)]
    pub handles: AdviceHandles,
}

pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_rules(&text).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_rules(text: &str) -> Result<RuleSet> {
    Ok(serde_json::from_str(text)?)
}
