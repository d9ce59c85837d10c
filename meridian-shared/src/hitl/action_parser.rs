//! Parses `[PROPOSED_ACTION]` blocks out of a department worker's free-form
//! text output. Parse failures are per-block: one malformed block is
//! skipped and logged without discarding the others.

use serde_json::Value;
use tracing::warn;

const BLOCK_START: &str = "[PROPOSED_ACTION]";
const BLOCK_END: &str = "[/PROPOSED_ACTION]";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub action_type: String,
    pub description: String,
    pub parameters: Value,
}

/// Scans `text` for every `[PROPOSED_ACTION]`…`[/PROPOSED_ACTION]` block,
/// parses `key: value` lines within each, and returns the proposals that
/// parsed cleanly. `action_type`, `description`, and `parameters` (a JSON
/// object string) are required; missing or malformed fields drop that
/// block only.
pub fn parse_proposed_actions(text: &str) -> Vec<ParsedAction> {
    let mut actions = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(BLOCK_START) {
        let after_start = &rest[start + BLOCK_START.len()..];
        let Some(end) = after_start.find(BLOCK_END) else {
            break;
        };
        let block = &after_start[..end];
        rest = &after_start[end + BLOCK_END.len()..];

        match parse_block(block) {
            Ok(action) => actions.push(action),
            Err(reason) => warn!(reason, block, "skipping malformed proposed-action block"),
        }
    }

    actions
}

fn parse_block(block: &str) -> Result<ParsedAction, String> {
    let mut action_type = None;
    let mut description = None;
    let mut parameters_raw = None;

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "action_type" => action_type = Some(value.trim().to_string()),
            "description" => description = Some(value.trim().to_string()),
            "parameters" => parameters_raw = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let action_type = action_type.ok_or("missing action_type")?;
    let description = description.ok_or("missing description")?;
    let parameters_raw = parameters_raw.ok_or("missing parameters")?;
    let parameters: Value =
        serde_json::from_str(&parameters_raw).map_err(|e| format!("invalid parameters JSON: {e}"))?;
    if !parameters.is_object() {
        return Err("parameters must be a JSON object".to_string());
    }

    Ok(ParsedAction { action_type, description, parameters })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_well_formed_block() {
        let text = r#"
Here is my recommendation.

[PROPOSED_ACTION]
action_type: update_product_price
description: Lower the price of variant 123 by 10%
parameters: {"product_variant_id": "123", "new_price": "17.99"}
[/PROPOSED_ACTION]

Thanks!
"#;
        let actions = parse_proposed_actions(text);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "update_product_price");
        assert_eq!(actions[0].parameters["new_price"], "17.99");
    }

    #[test]
    fn skips_malformed_block_but_keeps_others() {
        let text = r#"
[PROPOSED_ACTION]
action_type: create_discount_code
description: missing parameters on purpose
[/PROPOSED_ACTION]

[PROPOSED_ACTION]
action_type: adjust_inventory
description: Restock item 42 at warehouse 1
parameters: {"inventory_item_id": "42", "location_id": "1", "delta": 50}
[/PROPOSED_ACTION]
"#;
        let actions = parse_proposed_actions(text);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "adjust_inventory");
    }

    #[test]
    fn rejects_non_object_parameters() {
        let text = r#"
[PROPOSED_ACTION]
action_type: update_product_price
description: bad params
parameters: [1, 2, 3]
[/PROPOSED_ACTION]
"#;
        assert!(parse_proposed_actions(text).is_empty());
    }

    #[test]
    fn no_blocks_yields_empty() {
        assert!(parse_proposed_actions("just a plain summary, no actions here").is_empty());
    }
}
