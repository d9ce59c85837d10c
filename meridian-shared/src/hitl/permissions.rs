//! Static `action_type -> required scopes` mapping consulted by the Action
//! Executor before it dispatches against a commerce backend.

/// Known action types and the scopes a LinkedAccount must hold to execute
/// them. Unknown action types have no entry and are rejected by the
/// executor as "not implemented" before scopes are even checked.
pub fn required_scopes(action_type: &str) -> Option<&'static [&'static str]> {
    match action_type {
        "update_product_price" => Some(&["read_products", "write_products"]),
        "create_discount_code" => Some(&["write_discounts"]),
        "adjust_inventory" => Some(&["write_inventory"]),
        _ => None,
    }
}

pub fn has_required_scopes(action_type: &str, granted: &[&str]) -> bool {
    match required_scopes(action_type) {
        Some(required) => required.iter().all(|scope| granted.contains(scope)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_action_requires_matching_scope() {
        assert!(has_required_scopes("update_product_price", &["read_products", "write_products", "read_orders"]));
        assert!(!has_required_scopes("update_product_price", &["read_products"]));
    }

    #[test]
    fn unknown_action_type_is_never_permitted() {
        assert!(!has_required_scopes("delete_everything", &["write_products", "write_discounts", "write_inventory"]));
    }
}
