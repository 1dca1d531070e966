//! Helpers working on raw `serde_yaml::Value` trees.
//!
//! Keys are stored lowercase so that `Player.MPD.Port` in a user file and
//! `PEPPY_CONFIG__PLAYER__MPD__PORT` in the environment land on the same node.

use anyhow::{Result, bail};
use serde_yaml::{Mapping, Value};

fn key(name: &str) -> Value {
    Value::String(name.to_lowercase())
}

/// Overlays `top` on `base`.
///
/// Nested mappings are combined; any other node in `top` wins.
pub(crate) fn overlay(base: &mut Value, top: &Value) {
    match (base, top) {
        (Value::Mapping(target), Value::Mapping(source)) => {
            for (k, v) in source {
                if let Some(existing) = target.get_mut(k) {
                    overlay(existing, v);
                } else {
                    target.insert(k.clone(), v.clone());
                }
            }
        }
        (base, other) => *base = other.clone(),
    }
}

/// Rebuilds the tree with every string key lowercased.
pub(crate) fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(entries) => Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect::<Mapping>(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Follows `path` from `root`.
pub(crate) fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut node = root;
    for (depth, name) in path.iter().enumerate() {
        let Value::Mapping(entries) = node else {
            bail!("{} is not a section", path[..depth].join("."));
        };
        match entries.get(&key(name)) {
            Some(child) => node = child,
            None => bail!("{} is not set", path[..=depth].join(".")),
        }
    }
    Ok(node)
}

/// Stores `value` at `path`, creating the intermediate sections.
pub(crate) fn insert(root: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };
    let mut node = root;
    for (depth, name) in parents.iter().enumerate() {
        let Value::Mapping(entries) = node else {
            bail!("{} is not a section", path[..depth].join("."));
        };
        node = entries
            .entry(key(name))
            .or_insert(Value::Mapping(Mapping::new()));
    }
    match node {
        Value::Mapping(entries) => {
            entries.insert(key(last), value);
            Ok(())
        }
        _ => bail!("{} is not a section", parents.join(".")),
    }
}

/// Reads a value given on the command line or in the environment.
///
/// `9` becomes a number and `true` a boolean; anything YAML cannot read
/// stays a plain string.
pub(crate) fn parse_scalar(raw: &str) -> Value {
    serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `(path, value)` pairs for every variable named `<prefix>SECTION__KEY`.
pub(crate) fn env_overrides(
    prefix: &str,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Vec<(Vec<String>, Value)> {
    vars.into_iter()
        .filter_map(|(name, raw)| {
            let rest = name.strip_prefix(prefix)?;
            let path = rest.split("__").map(str::to_string).collect();
            Some((path, parse_scalar(&raw)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Number;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_overlay_keeps_untouched_defaults() {
        let mut base = yaml("a: 1\nb:\n  c: 2\n  d: 3\n");
        overlay(&mut base, &yaml("b:\n  c: 20\ne: x\n"));
        assert_eq!(base, yaml("a: 1\nb:\n  c: 20\n  d: 3\ne: x\n"));
    }

    #[test]
    fn test_lowercase_keys() {
        let lowered = lowercase_keys(yaml("Player:\n  MPD:\n    Port: 6600\n"));
        assert_eq!(lowered, yaml("player:\n  mpd:\n    port: 6600\n"));
    }

    #[test]
    fn test_lookup_and_insert() {
        let mut root = yaml("player:\n  type: mpd\n");
        insert(&mut root, &["Player", "MPD", "Port"], Value::Number(Number::from(6601))).unwrap();
        assert_eq!(
            lookup(&root, &["player", "mpd", "port"]).unwrap(),
            &Value::Number(Number::from(6601))
        );
        assert!(lookup(&root, &["player", "nope"]).is_err());
        assert!(lookup(&root, &["player", "type", "deeper"]).is_err());
        assert!(insert(&mut root, &["player", "type", "deeper"], Value::Null).is_err());
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar("42"), Value::Number(Number::from(42)));
        assert_eq!(parse_scalar("true"), Value::Bool(true));
        assert_eq!(parse_scalar("mplayer"), Value::String("mplayer".to_string()));
    }

    #[test]
    fn test_env_overrides_only_take_prefixed_vars() {
        let vars = vec![
            ("PEPPY_CONFIG__PLAYER__TYPE".to_string(), "mpc".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let overrides = env_overrides("PEPPY_CONFIG__", vars);
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].0, vec!["PLAYER", "TYPE"]);
        assert_eq!(overrides[0].1, Value::String("mpc".to_string()));
    }
}
