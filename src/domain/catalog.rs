//! Service catalog: the fixed taxonomy tickets are classified into.
//!
//! The catalog is built once per run and is immutable afterwards. It is
//! shared read-only (behind an `Arc`) across all concurrent classifications.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// Time unit for an SLA duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlaUnit {
    Hours,
    Days,
}

impl SlaUnit {
    /// Lenient parse: catalog sources are inconsistent about singular vs
    /// plural ("hour", "Hours", "day"), so anything containing the stem is
    /// accepted.
    pub fn parse_lenient(raw: &str) -> Option<SlaUnit> {
        let normalized = raw.trim().to_lowercase();
        if normalized.contains("hour") {
            Some(SlaUnit::Hours)
        } else if normalized.contains("day") {
            Some(SlaUnit::Days)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlaUnit::Hours => "hours",
            SlaUnit::Days => "days",
        }
    }
}

impl std::fmt::Display for SlaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service level agreement for one request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    pub value: u32,
    pub unit: SlaUnit,
}

impl Sla {
    /// Documented fallback applied when a (category, request type) pair has
    /// no SLA in the catalog (e.g. the fallback category itself).
    pub const DEFAULT: Sla = Sla {
        value: 24,
        unit: SlaUnit::Hours,
    };
}

impl std::fmt::Display for Sla {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// One row of the service catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub category: String,
    pub request_type: String,
    pub sla: Sla,
}

/// Immutable service catalog with derived lookup indexes.
///
/// Invariant: the (category, request type) pair is unique, category names are
/// non-empty, and the category set is closed once loaded.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    /// Category names in catalog order.
    categories: Vec<String>,
    /// Request type names per category, in catalog order.
    types_by_category: HashMap<String, Vec<String>>,
    sla_index: HashMap<(String, String), Sla>,
}

impl Catalog {
    /// Build a catalog from raw entries, validating the uniqueness invariant.
    ///
    /// # Errors
    /// - [`TriageError::EmptyCatalog`] if no entries survive.
    /// - [`TriageError::CatalogEntry`] on an empty category/request type name
    ///   or a duplicated (category, request type) pair.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Catalog> {
        if entries.is_empty() {
            return Err(TriageError::EmptyCatalog);
        }

        let mut categories: Vec<String> = Vec::new();
        let mut types_by_category: HashMap<String, Vec<String>> = HashMap::new();
        let mut sla_index = HashMap::new();

        for entry in &entries {
            if entry.category.trim().is_empty() {
                return Err(TriageError::CatalogEntry(format!(
                    "entry for request type '{}' has an empty category",
                    entry.request_type
                )));
            }
            if entry.request_type.trim().is_empty() {
                return Err(TriageError::CatalogEntry(format!(
                    "category '{}' has a request type with an empty name",
                    entry.category
                )));
            }

            let key = (entry.category.clone(), entry.request_type.clone());
            if sla_index.insert(key, entry.sla).is_some() {
                return Err(TriageError::CatalogEntry(format!(
                    "duplicate entry '{}' / '{}'",
                    entry.category, entry.request_type
                )));
            }

            let types = types_by_category
                .entry(entry.category.clone())
                .or_insert_with(|| {
                    categories.push(entry.category.clone());
                    Vec::new()
                });
            types.push(entry.request_type.clone());
        }

        tracing::info!(
            categories = categories.len(),
            request_types = entries.len(),
            "Catalog built"
        );

        Ok(Catalog {
            entries,
            categories,
            types_by_category,
            sla_index,
        })
    }

    /// Parse a YAML catalog document and build the catalog.
    ///
    /// The categories list may live under several roots depending on the
    /// catalog source version; each known path is tried in order:
    /// `service_catalog.catalog.categories`, `catalog.categories`,
    /// `categories`, or the document itself as a bare list.
    pub fn load_yaml(content: &str) -> Result<Catalog> {
        let doc: serde_yaml::Value = serde_yaml::from_str(content)?;

        let categories = find_categories(&doc).ok_or(TriageError::EmptyCatalog)?;

        let mut entries = Vec::new();
        for raw in categories {
            let name = raw
                .get("name")
                .and_then(serde_yaml::Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    TriageError::CatalogEntry("category without a name".to_string())
                })?;

            let requests = raw
                .get("requests")
                .and_then(serde_yaml::Value::as_sequence)
                .cloned()
                .unwrap_or_default();

            for req in &requests {
                entries.push(parse_request_entry(name, req)?);
            }
        }

        Catalog::from_entries(entries)
    }

    /// Category names, in catalog order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Request type names for a category, in catalog order. Unknown
    /// categories yield an empty slice.
    pub fn request_types_of(&self, category: &str) -> &[String] {
        self.types_by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// SLA for a (category, request type) pair, falling back to
    /// [`Sla::DEFAULT`] (24 hours) when the pair is not in the catalog.
    pub fn sla_of(&self, category: &str, request_type: &str) -> Sla {
        match self
            .sla_index
            .get(&(category.to_string(), request_type.to_string()))
        {
            Some(sla) => *sla,
            None => {
                tracing::debug!(
                    category,
                    request_type,
                    "No SLA in catalog, applying 24h default"
                );
                Sla::DEFAULT
            }
        }
    }

    /// All catalog rows, in load order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Textual rendering of the full taxonomy, embedded in the model prompt.
    pub fn prompt_context(&self) -> String {
        let mut lines = vec!["IT SERVICE CATALOG:".to_string()];
        for category in &self.categories {
            lines.push(format!("\n## Category: {category}"));
            for request_type in self.request_types_of(category) {
                let sla = self.sla_of(category, request_type);
                lines.push(format!("  - {request_type} (SLA: {sla})"));
            }
        }
        lines.join("\n")
    }
}

/// Locate the categories sequence in a catalog document, trying each known
/// nesting in order.
fn find_categories(doc: &serde_yaml::Value) -> Option<Vec<serde_yaml::Value>> {
    let paths: [&[&str]; 3] = [
        &["service_catalog", "catalog", "categories"],
        &["catalog", "categories"],
        &["categories"],
    ];

    for path in paths {
        let mut node = doc;
        let mut found = true;
        for key in path {
            match node.get(*key) {
                Some(next) => node = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(seq) = node.as_sequence() {
                if !seq.is_empty() {
                    return Some(seq.clone());
                }
            }
        }
    }

    // Bare list document.
    doc.as_sequence().filter(|seq| !seq.is_empty()).cloned()
}

fn parse_request_entry(category: &str, req: &serde_yaml::Value) -> Result<CatalogEntry> {
    let name = req
        .get("name")
        .and_then(serde_yaml::Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            TriageError::CatalogEntry(format!(
                "category '{category}' has a request entry without a name"
            ))
        })?;

    let sla_node = req.get("sla").ok_or_else(|| {
        TriageError::CatalogEntry(format!("'{category}' / '{name}' is missing its SLA"))
    })?;

    let unit = sla_node
        .get("unit")
        .and_then(serde_yaml::Value::as_str)
        .and_then(SlaUnit::parse_lenient)
        .ok_or_else(|| {
            TriageError::CatalogEntry(format!(
                "'{category}' / '{name}' has an unrecognized SLA unit"
            ))
        })?;

    let value = sla_node
        .get("value")
        .and_then(serde_yaml::Value::as_u64)
        .ok_or_else(|| {
            TriageError::CatalogEntry(format!(
                "'{category}' / '{name}' has a non-numeric SLA value"
            ))
        })?;

    Ok(CatalogEntry {
        category: category.to_string(),
        request_type: name.to_string(),
        sla: Sla {
            value: value as u32,
            unit,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(category: &str, request_type: &str, hours: u32) -> CatalogEntry {
        CatalogEntry {
            category: category.to_string(),
            request_type: request_type.to_string(),
            sla: Sla {
                value: hours,
                unit: SlaUnit::Hours,
            },
        }
    }

    #[test]
    fn builds_indexes_in_catalog_order() {
        let catalog = Catalog::from_entries(vec![
            entry("Hardware Support", "Laptop Repair/Replacement", 48),
            entry("Hardware Support", "Mobile Device Issue", 24),
            entry("Security", "Report Lost/Stolen Device", 2),
        ])
        .unwrap();

        assert_eq!(catalog.categories(), ["Hardware Support", "Security"]);
        assert_eq!(
            catalog.request_types_of("Hardware Support"),
            ["Laptop Repair/Replacement", "Mobile Device Issue"]
        );
        assert_eq!(
            catalog.sla_of("Security", "Report Lost/Stolen Device"),
            Sla {
                value: 2,
                unit: SlaUnit::Hours
            }
        );
    }

    #[test]
    fn empty_catalog_is_fatal() {
        let err = Catalog::from_entries(vec![]).unwrap_err();
        assert!(matches!(err, TriageError::EmptyCatalog));
    }

    #[test]
    fn duplicate_pair_is_rejected() {
        let err = Catalog::from_entries(vec![
            entry("Security", "Phishing Report", 4),
            entry("Security", "Phishing Report", 8),
        ])
        .unwrap_err();
        assert!(matches!(err, TriageError::CatalogEntry(_)));
    }

    #[test]
    fn unknown_pair_gets_default_sla() {
        let catalog = Catalog::from_entries(vec![entry("Security", "Phishing Report", 4)]).unwrap();
        assert_eq!(catalog.sla_of("Other/Uncategorized", "Unspecified"), Sla::DEFAULT);
        assert_eq!(Sla::DEFAULT.value, 24);
        assert_eq!(Sla::DEFAULT.unit, SlaUnit::Hours);
    }

    #[test]
    fn request_types_are_scoped_per_category() {
        let catalog = Catalog::from_entries(vec![
            entry("Security", "Phishing Report", 4),
            entry("Hardware Support", "Laptop Repair/Replacement", 48),
        ])
        .unwrap();
        assert_eq!(catalog.request_types_of("Security"), ["Phishing Report"]);
        assert!(catalog.request_types_of("No Such Category").is_empty());
    }

    #[test]
    fn loads_nested_yaml_document() {
        let yaml = r#"
service_catalog:
  catalog:
    categories:
      - name: Access Management
        requests:
          - name: Reset forgotten password
            sla: { unit: hours, value: 4 }
          - name: MFA device change
            sla: { unit: Hour, value: 8 }
      - name: Hardware Support
        requests:
          - name: Laptop Repair/Replacement
            sla: { unit: days, value: 3 }
"#;
        let catalog = Catalog::load_yaml(yaml).unwrap();
        assert_eq!(catalog.categories(), ["Access Management", "Hardware Support"]);
        // Lenient unit parse: "Hour" normalizes to hours.
        assert_eq!(
            catalog.sla_of("Access Management", "MFA device change").unit,
            SlaUnit::Hours
        );
        assert_eq!(
            catalog.sla_of("Hardware Support", "Laptop Repair/Replacement"),
            Sla {
                value: 3,
                unit: SlaUnit::Days
            }
        );
    }

    #[test]
    fn loads_flat_yaml_document() {
        let yaml = r#"
categories:
  - name: Security
    requests:
      - name: Phishing Report
        sla: { unit: hours, value: 4 }
"#;
        let catalog = Catalog::load_yaml(yaml).unwrap();
        assert_eq!(catalog.categories(), ["Security"]);
    }

    #[test]
    fn missing_sla_is_malformed() {
        let yaml = r#"
categories:
  - name: Security
    requests:
      - name: Phishing Report
"#;
        let err = Catalog::load_yaml(yaml).unwrap_err();
        assert!(matches!(err, TriageError::CatalogEntry(_)));
    }

    #[test]
    fn empty_yaml_document_is_fatal() {
        let err = Catalog::load_yaml("{}").unwrap_err();
        assert!(matches!(err, TriageError::EmptyCatalog));
    }

    #[test]
    fn prompt_context_lists_every_entry() {
        let catalog = Catalog::from_entries(vec![
            entry("Security", "Phishing Report", 4),
            entry("Hardware Support", "Laptop Repair/Replacement", 48),
        ])
        .unwrap();

        let context = catalog.prompt_context();
        assert!(context.contains("## Category: Security"));
        assert!(context.contains("- Phishing Report (SLA: 4 hours)"));
        assert!(context.contains("- Laptop Repair/Replacement (SLA: 48 hours)"));
    }
}
