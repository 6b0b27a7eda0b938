// Copyright 2026 The pathkit authors.

//! Scheme aliasing: rewriting a user-chosen scheme name to a canonical
//! `protocol://prefix` before dispatch, per spec.md §3 ("Alias") and §4.1.

use std::collections::HashMap;
use std::fs;
use std::path::Path as FsPath;

use serde::Deserialize;

use crate::error::{ErrorKind, PathError, Result};
use crate::path::Path;

/// One alias target: `{name -> {protocol, prefix}}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Alias {
    pub protocol: String,
    pub prefix: String,
}

/// The full set of aliases loaded at startup.
///
/// Built from two sources, per spec.md §4.1: a legacy INI file
/// (`aliases.conf`) and a structured TOML loader; the structured loader's
/// entries win on conflict.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    aliases: HashMap<String, Alias>,
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, alias: Alias) {
        self.aliases.insert(name.into(), alias);
    }

    pub fn get(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    /// Load the legacy INI file, then the structured TOML file, applying
    /// each on top of what came before (TOML wins on conflicting names).
    pub fn load(config_dir: &FsPath) -> Result<AliasTable> {
        let mut table = AliasTable::new();
        let ini_path = config_dir.join("aliases.conf");
        if ini_path.exists() {
            let text = fs::read_to_string(&ini_path)
                .map_err(|e| PathError::from_io(e, ini_path.display().to_string()))?;
            table.merge(parse_ini_aliases(&text)?);
        }
        let toml_path = config_dir.join("aliases.toml");
        if toml_path.exists() {
            let text = fs::read_to_string(&toml_path)
                .map_err(|e| PathError::from_io(e, toml_path.display().to_string()))?;
            table.merge(parse_toml_aliases(&text)?);
        }
        Ok(table)
    }

    fn merge(&mut self, other: AliasTable) {
        for (name, alias) in other.aliases {
            self.aliases.insert(name, alias);
        }
    }

    /// Rewrite `path` if its scheme names an alias: `scheme` becomes
    /// `alias.protocol`, `alias.prefix` is prepended to the remainder.
    /// Returns `path` unchanged if its scheme isn't an alias.
    pub fn resolve(&self, path: &Path) -> Path {
        match self.aliases.get(path.scheme()) {
            Some(alias) => {
                let mut rest = alias.prefix.trim_end_matches('/').to_owned();
                let remainder = path.without_protocol();
                if !remainder.is_empty() {
                    if !rest.is_empty() {
                        rest.push('/');
                    }
                    rest.push_str(remainder);
                }
                Path::new(alias.protocol.clone(), rest)
            }
            None => path.clone(),
        }
    }

    /// Rewrite a resolved path back to its alias form for display to the
    /// caller, inverse of [`AliasTable::resolve`]. If more than one alias
    /// could match, the first one found (in arbitrary map order) wins; this
    /// is only used for cosmetic purposes.
    pub fn unresolve(&self, path: &Path) -> Path {
        for (name, alias) in &self.aliases {
            if alias.protocol != *path.scheme() {
                continue;
            }
            let prefix = alias.prefix.trim_end_matches('/');
            let remainder = path.without_protocol();
            if let Some(stripped) = remainder.strip_prefix(prefix) {
                let stripped = stripped.trim_start_matches('/');
                return Path::new(name.clone(), stripped);
            }
        }
        path.clone()
    }
}

#[derive(Deserialize)]
struct TomlAliasFile {
    #[serde(flatten)]
    aliases: HashMap<String, String>,
}

/// Parse the structured loader's format: `{alias_name: "<protocol>://<prefix>"}`.
fn parse_toml_aliases(text: &str) -> Result<AliasTable> {
    let file: TomlAliasFile = toml::from_str(text)
        .map_err(|e| PathError::with_source(ErrorKind::Config, "aliases.toml", e))?;
    let mut table = AliasTable::new();
    for (name, target) in file.aliases {
        let (protocol, prefix) = target.split_once("://").ok_or_else(|| {
            PathError::new(
                ErrorKind::Config,
                format!("alias {name:?} target {target:?} missing '://'"),
            )
        })?;
        table.insert(name, Alias {
            protocol: protocol.to_owned(),
            prefix: prefix.to_owned(),
        });
    }
    Ok(table)
}

/// Parse the legacy INI format: sections named `<alias>`, keys `protocol`
/// and `prefix`.
fn parse_ini_aliases(text: &str) -> Result<AliasTable> {
    let mut table = AliasTable::new();
    let mut current: Option<String> = None;
    let mut protocol: Option<String> = None;
    let mut prefix: Option<String> = None;

    let flush = |table: &mut AliasTable,
                 current: &Option<String>,
                 protocol: &Option<String>,
                 prefix: &Option<String>| {
        if let Some(name) = current {
            table.insert(
                name.clone(),
                Alias {
                    protocol: protocol.clone().unwrap_or_default(),
                    prefix: prefix.clone().unwrap_or_default(),
                },
            );
        }
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            flush(&mut table, &current, &protocol, &prefix);
            current = Some(section.trim().to_owned());
            protocol = None;
            prefix = None;
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_owned();
            match key.as_str() {
                "protocol" => protocol = Some(value),
                "prefix" => prefix = Some(value),
                _ => {}
            }
        }
    }
    flush(&mut table, &current, &protocol, &prefix);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_aliased_scheme() {
        let mut table = AliasTable::new();
        table.insert("mys3", Alias {
            protocol: "s3".to_owned(),
            prefix: "prefix".to_owned(),
        });
        let resolved = table.resolve(&Path::parse("mys3://key"));
        assert_eq!(resolved.with_protocol(), "s3://prefix/key");
    }

    #[test]
    fn unrelated_scheme_is_untouched() {
        let table = AliasTable::new();
        let p = Path::parse("s3://bucket/key");
        assert_eq!(table.resolve(&p), p);
    }

    #[test]
    fn parses_legacy_ini() {
        let ini = "[mys3]\nprotocol = s3\nprefix = bucket/base\n";
        let table = parse_ini_aliases(ini).unwrap();
        let alias = table.get("mys3").unwrap();
        assert_eq!(alias.protocol, "s3");
        assert_eq!(alias.prefix, "bucket/base");
    }

    #[test]
    fn parses_structured_toml() {
        let toml = "mys3 = \"s3://bucket/base\"\n";
        let table = parse_toml_aliases(toml).unwrap();
        let alias = table.get("mys3").unwrap();
        assert_eq!(alias.protocol, "s3");
        assert_eq!(alias.prefix, "bucket/base");
    }

    #[test]
    fn toml_wins_on_conflict() {
        let mut table = parse_ini_aliases("[a]\nprotocol = s3\nprefix = one\n").unwrap();
        table.merge(parse_toml_aliases("a = \"s3://two\"\n").unwrap());
        assert_eq!(table.get("a").unwrap().prefix, "two");
    }
}
