//! Embedded prompts
//!
//! Compiled into the binary from the .pmt files under `prompts/`.

use tracing::debug;

pub const GENERATE_SYSTEM: &str = include_str!("../../prompts/generate-system.pmt");
pub const GENERATE: &str = include_str!("../../prompts/generate.pmt");
pub const PLAN_SYSTEM: &str = include_str!("../../prompts/plan-system.pmt");
pub const PLAN_VOLUMES: &str = include_str!("../../prompts/plan-volumes.pmt");
pub const PLAN_CHAPTERS: &str = include_str!("../../prompts/plan-chapters.pmt");
pub const AUDIT_SYSTEM: &str = include_str!("../../prompts/audit-system.pmt");
pub const AUDIT: &str = include_str!("../../prompts/audit.pmt");
pub const REPAIR_SETTING_SYSTEM: &str = include_str!("../../prompts/repair-setting-system.pmt");
pub const REPAIR_SETTING: &str = include_str!("../../prompts/repair-setting.pmt");
pub const REPAIR_TYPO_SYSTEM: &str = include_str!("../../prompts/repair-typo-system.pmt");
pub const REPAIR_TYPO: &str = include_str!("../../prompts/repair-typo.pmt");

/// Names of every embedded template
pub const NAMES: &[&str] = &[
    "generate-system",
    "generate",
    "plan-system",
    "plan-volumes",
    "plan-chapters",
    "audit-system",
    "audit",
    "repair-setting-system",
    "repair-setting",
    "repair-typo-system",
    "repair-typo",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "generate-system" => GENERATE_SYSTEM,
        "generate" => GENERATE,
        "plan-system" => PLAN_SYSTEM,
        "plan-volumes" => PLAN_VOLUMES,
        "plan-chapters" => PLAN_CHAPTERS,
        "audit-system" => AUDIT_SYSTEM,
        "audit" => AUDIT,
        "repair-setting-system" => REPAIR_SETTING_SYSTEM,
        "repair-setting" => REPAIR_SETTING,
        "repair-typo-system" => REPAIR_TYPO_SYSTEM,
        "repair-typo" => REPAIR_TYPO,
        _ => {
            debug!("get_embedded: no match found");
            return None;
        }
    };
    Some(found)
}
