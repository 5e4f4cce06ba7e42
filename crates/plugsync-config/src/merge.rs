//! Deep merging of TOML layers.

use std::collections::BTreeSet;

/// Dotted paths of every leaf value set by a config file layer.
pub type SetFields = BTreeSet<String>;

/// Recursively merge `overlay` into `base`, recording each leaf path the
/// overlay sets in `set`.
///
/// Tables merge per key. Scalars and arrays from the overlay replace the
/// base value.
pub fn deep_merge(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    set: &mut SetFields,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join_path(prefix, key);
                match base_table.get_mut(key) {
                    Some(base_val) if overlay_val.is_table() => {
                        deep_merge(base_val, overlay_val, &path, set);
                    },
                    Some(base_val) => {
                        *base_val = overlay_val.clone();
                        set.insert(path);
                    },
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, set);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            set.insert(prefix.to_owned());
        },
    }
}

fn record_leaves(val: &toml::Value, prefix: &str, set: &mut SetFields) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join_path(prefix, key), set);
        }
    } else {
        set.insert(prefix.to_owned());
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn overlay_replaces_scalars_and_keeps_siblings() {
        let mut base = parse(
            r#"
            [node]
            name = "a"
            namespace = "default"
        "#,
        );
        let overlay = parse(
            r#"
            [node]
            name = "b"
        "#,
        );
        let mut set = SetFields::new();
        deep_merge(&mut base, &overlay, "", &mut set);

        assert_eq!(base["node"]["name"].as_str(), Some("b"));
        assert_eq!(base["node"]["namespace"].as_str(), Some("default"));
        assert!(set.contains("node.name"));
        assert!(!set.contains("node.namespace"));
    }

    #[test]
    fn arrays_are_replaced_not_appended() {
        let mut base = parse(r#"order = ["local", "core"]"#);
        let overlay = parse(r#"order = ["catalog"]"#);
        let mut set = SetFields::new();
        deep_merge(&mut base, &overlay, "", &mut set);
        assert_eq!(base["order"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn new_tables_record_every_leaf() {
        let mut base = parse("");
        let overlay = parse(
            r#"
            [providers.cloud]
            api_base = "https://cloud.example.com"
            ttl_secs = 60
        "#,
        );
        let mut set = SetFields::new();
        deep_merge(&mut base, &overlay, "", &mut set);
        assert!(set.contains("providers.cloud.api_base"));
        assert!(set.contains("providers.cloud.ttl_secs"));
    }
}
