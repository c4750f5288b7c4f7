use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::schema::{self, FieldType};
use crate::config::types::{parse_bool, split_list};
use crate::error::{DrError, Result};

/// A scalar or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryValue {
    Scalar(String),
    Seq(Vec<String>),
}

impl InventoryValue {
    pub fn render(&self) -> String {
        match self {
            InventoryValue::Scalar(s) => s.clone(),
            InventoryValue::Seq(items) => items.join(","),
        }
    }

    pub fn items(&self) -> Vec<String> {
        match self {
            InventoryValue::Scalar(s) if s.is_empty() => Vec::new(),
            InventoryValue::Scalar(s) => vec![s.clone()],
            InventoryValue::Seq(items) => items.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub ty: FieldType,
    pub value: InventoryValue,
}

/// One CSV row: `key,type,value`.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    key: String,
    #[serde(rename = "type")]
    ty: String,
    value: String,
}

/// Dotted-path keyed inventory, unique by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<String, Entry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            DrError::config(format!("cannot open inventory {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let mut inv = Inventory::new();
        for row in rdr.deserialize::<Row>() {
            let row = row?;
            if row.key.is_empty() {
                continue;
            }
            let ty = FieldType::parse(&row.ty)?;
            let multiple = schema::lookup(&row.key).map(|f| f.multiple).unwrap_or(false);
            let value = if multiple {
                InventoryValue::Seq(split_list(&row.value))
            } else {
                InventoryValue::Scalar(row.value)
            };
            if inv.entries.contains_key(&row.key) {
                return Err(DrError::config(format!("inventory key '{}' appears twice", row.key)));
            }
            inv.entries.insert(row.key, Entry { ty, value });
        }
        Ok(inv)
    }

    /// Rows sorted by key; sequences joined with `,` in one cell.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut wtr = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Necessary)
            .from_path(path)?;
        for (key, entry) in &self.entries {
            wtr.serialize(Row {
                key: key.clone(),
                ty: entry.ty.to_string(),
                value: entry.value.render(),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: &str, ty: FieldType, value: impl Into<String>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                ty,
                value: InventoryValue::Scalar(value.into()),
            },
        );
    }

    pub fn set_seq(&mut self, key: &str, ty: FieldType, values: Vec<String>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                ty,
                value: InventoryValue::Seq(values),
            },
        );
    }

    /// A non-empty scalar value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .map(|e| e.value.render())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| DrError::config(format!("inventory key '{}' is missing", key)))
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.entries
            .get(key)
            .map(|e| e.value.items())
            .unwrap_or_default()
    }

    pub fn int(&self, key: &str) -> Result<u64> {
        let v = self.require(key)?;
        v.parse()
            .map_err(|_| DrError::config(format!("inventory key '{}' is not an integer: {}", key, v)))
    }

    pub fn int_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            Some(_) => self.int(key),
            None => Ok(default),
        }
    }

    pub fn port(&self, key: &str) -> Result<Option<u16>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| DrError::config(format!("inventory key '{}' is not a port: {}", key, v))),
        }
    }

    pub fn ports(&self, key: &str) -> Result<Vec<u16>> {
        self.list(key)
            .iter()
            .map(|v| {
                v.parse()
                    .map_err(|_| DrError::config(format!("inventory key '{}' has a bad port: {}", key, v)))
            })
            .collect()
    }

    pub fn yes(&self, key: &str) -> Result<bool> {
        let v = self.require(key)?;
        parse_bool(&v).ok_or_else(|| DrError::config(format!("inventory key '{}' must be yes/no: {}", key, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Fill schema defaults, then check every value against its type and
    /// every required key for presence. All problems are reported together.
    pub fn validate(&mut self) -> Result<()> {
        for spec in schema::SCHEMA {
            if let Some(default) = spec.default {
                if self.get(spec.key).is_none() {
                    self.set(spec.key, spec.ty, default);
                }
            }
        }

        let ohs_used = self.int_or("oci.ohs.nodes_count", 0).unwrap_or(0) > 0;
        let mut problems = Vec::new();
        for spec in schema::SCHEMA {
            let ohs_key = spec.key.starts_with("oci.ohs.") && spec.key != "oci.ohs.nodes_count";
            let lbr_key = spec.key == "oci.lbr.cert_file"
                || spec.key == "oci.lbr.key_file"
                || spec.key == "oci.lbr.ohs_backend_port"
                || spec.key == "oci.lbr.virtual_hostnames";
            let required = spec.required || (ohs_used && (ohs_key || lbr_key));
            if required && self.list(spec.key).is_empty() {
                problems.push(format!("{} is required", spec.key));
            }
        }
        for (key, entry) in &self.entries {
            if entry.ty == FieldType::Opt {
                continue;
            }
            for item in entry.value.items() {
                if !entry.ty.accepts(&item) {
                    problems.push(format!("{} = '{}' is not a valid {}", key, item, entry.ty));
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(DrError::config(format!("invalid inventory: {}", problems.join("; "))))
        }
    }
}
