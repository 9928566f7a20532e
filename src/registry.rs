//! # Ticker Registry
//!
//! The tracked universe: one `TrackedIssuer` per symbol with its zero-padded
//! EDGAR CIK. Loaded from the enriched listing file (JSON array of rows) or a
//! TOML `[[issuers]]` table.
//!
//! Row tolerance:
//! - symbol may be spelled `ticket`, `ticker` or `symbol`;
//! - CIK may be `CIK` or `cik`, as a string or a number;
//! - rows missing either are skipped, duplicate symbols keep the first row.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedIssuer {
    pub symbol: String,
    /// Ten-digit, zero-padded CIK.
    pub regulator_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    issuers: Vec<TrackedIssuer>,
}

/// SEC endpoints want the CIK as exactly ten digits.
pub fn normalize_cik(cik: &str) -> String {
    let digits: String = cik.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{digits:0>10}")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CikValue {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
struct IssuerRow {
    #[serde(alias = "ticket", alias = "ticker", default)]
    symbol: Option<String>,
    #[serde(alias = "CIK", default)]
    cik: Option<CikValue>,
    #[serde(default)]
    name: Option<String>,
}

impl IssuerRow {
    fn into_issuer(self) -> Option<TrackedIssuer> {
        let symbol = self.symbol?.trim().to_ascii_uppercase();
        let cik = match self.cik? {
            CikValue::Text(s) => s,
            CikValue::Number(n) => n.to_string(),
        };
        if symbol.is_empty() || !cik.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let regulator_id = normalize_cik(&cik);
        let display_name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| symbol.clone());
        Some(TrackedIssuer {
            symbol,
            regulator_id,
            display_name,
        })
    }
}

impl Registry {
    pub fn new(issuers: Vec<TrackedIssuer>) -> Self {
        let mut seen = HashSet::new();
        let issuers = issuers
            .into_iter()
            .filter(|i| seen.insert(i.symbol.clone()))
            .collect();
        Self { issuers }
    }

    /// Load from JSON (array of rows) or TOML (`[[issuers]]`).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading tracked issuers from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, &ext)
            .with_context(|| format!("parsing tracked issuers in {}", path.display()))
    }

    pub fn parse(content: &str, hint_ext: &str) -> Result<Self> {
        let rows = if hint_ext == "toml" {
            parse_toml(content)?
        } else {
            match serde_json::from_str::<Vec<IssuerRow>>(content) {
                Ok(rows) => rows,
                Err(json_err) => {
                    parse_toml(content).map_err(|_| anyhow!("unsupported issuer format: {json_err}"))?
                }
            }
        };
        Ok(Self::new(
            rows.into_iter().filter_map(IssuerRow::into_issuer).collect(),
        ))
    }

    pub fn issuers(&self) -> &[TrackedIssuer] {
        &self.issuers
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.issuers.iter().map(|i| i.symbol.clone()).collect()
    }

    pub fn by_cik(&self, cik: &str) -> Option<&TrackedIssuer> {
        let cik = normalize_cik(cik);
        self.issuers.iter().find(|i| i.regulator_id == cik)
    }
}

fn parse_toml(content: &str) -> Result<Vec<IssuerRow>> {
    #[derive(Deserialize)]
    struct TomlIssuers {
        issuers: Vec<IssuerRow>,
    }
    let v: TomlIssuers = toml::from_str(content)?;
    Ok(v.issuers)
}

/// Where a tick reads the tracked universe from.
pub trait IssuerSource: Send + Sync {
    fn load(&self) -> Result<Registry>;
}

/// Re-reads the listing file on every call, so edits apply on the next tick.
#[derive(Debug, Clone)]
pub struct RegistryFile {
    pub path: PathBuf,
}

impl RegistryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IssuerSource for RegistryFile {
    fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            return Err(ConfigError::MissingFile(self.path.clone()).into());
        }
        Registry::load_from(&self.path)
    }
}

impl IssuerSource for Registry {
    fn load(&self) -> Result<Registry> {
        Ok(self.clone())
    }
}
