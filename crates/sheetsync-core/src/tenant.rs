//! Tenant configuration
//!
//! A `TenantSchema` tells the engine where a tenant's sheet lives and how its
//! raw columns map onto canonical fields. Schemas are read-only input: the
//! engine loads one per sync call and never mutates it.
//!
//! Schemas come from `tenants.toml`:
//!
//! ```toml
//! [[tenant]]
//! id = 7
//! name = "KMG Insurance Agency"
//! identifiers = ["kmg", "kmginsurance"]
//! kind = "insurance_customer"
//! spreadsheet_url = "https://docs.google.com/spreadsheets/d/1abc/edit"
//! tab_name = "updating_input"
//! layout = "kmg_insurance"
//! deletion = { policy = "retain", status = "archived" }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncOutcome};
use crate::layouts;
use crate::models::{CanonicalField, RecordKind, TenantId};
use crate::sheets::spreadsheet_id_from_url;

/// One raw column mapped onto a canonical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub header: String,
    pub field: CanonicalField,
}

impl ColumnMapping {
    pub fn new(header: impl Into<String>, field: CanonicalField) -> Self {
        Self {
            header: header.into(),
            field,
        }
    }
}

/// What happens to a stored record whose sheet row disappeared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Remove the record
    #[default]
    HardDelete,
    /// Keep the record and set its status to a terminal value
    Retain { status: String },
}

/// Per-tenant sheet location and column mapping
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantSchema {
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: RecordKind,
    /// Default spreadsheet; callers may pass another one explicitly
    pub spreadsheet_id: Option<String>,
    /// Default tab; callers may pass another one explicitly
    pub tab_name: Option<String>,
    /// Owned columns in declared order
    pub columns: Vec<ColumnMapping>,
    pub deletion: DeletionPolicy,
    /// Status given to new records when the sheet leaves it blank
    pub default_status: Option<String>,
    /// Substrings of a login email that select this tenant
    pub identifiers: Vec<String>,
    /// Include in periodic syncs
    pub auto_sync: bool,
}

impl TenantSchema {
    /// Create a schema with hard deletion and no defaults
    pub fn new(tenant_id: TenantId, kind: RecordKind, columns: Vec<ColumnMapping>) -> Self {
        Self {
            tenant_id,
            name: format!("tenant {}", tenant_id),
            kind,
            spreadsheet_id: None,
            tab_name: None,
            columns,
            deletion: DeletionPolicy::HardDelete,
            default_status: None,
            identifiers: Vec::new(),
            auto_sync: false,
        }
    }

    /// Check the column mapping against the record kind
    pub fn validate(&self) -> SyncOutcome<()> {
        let invalid = |msg: String| SyncError::InvalidSchema(format!("tenant {}: {}", self.tenant_id, msg));

        if self.columns.is_empty() {
            return Err(invalid("no columns mapped".to_string()));
        }

        let mut headers = HashSet::new();
        let mut fields = HashSet::new();
        for column in &self.columns {
            if !self.kind.supports(column.field) {
                return Err(invalid(format!(
                    "field '{}' does not belong to {} records",
                    column.field, self.kind
                )));
            }
            let header = normalize_header(&column.header);
            if header.is_empty() {
                return Err(invalid(format!("empty header for field '{}'", column.field)));
            }
            if !headers.insert(header) {
                return Err(invalid(format!("header '{}' mapped twice", column.header)));
            }
            if !fields.insert(column.field) {
                return Err(invalid(format!("field '{}' mapped twice", column.field)));
            }
        }

        let has_email = fields.contains(&CanonicalField::Email);
        let has_composite = fields.contains(&CanonicalField::Mobile) && fields.contains(&CanonicalField::Name);
        if !has_email && !has_composite {
            return Err(invalid("map an email column, or both mobile and name".to_string()));
        }

        if let DeletionPolicy::Retain { status } = &self.deletion {
            if status.trim().is_empty() {
                return Err(invalid("retain policy needs a status".to_string()));
            }
        }

        Ok(())
    }

    /// Whether the schema owns a column for `field`
    pub fn maps(&self, field: CanonicalField) -> bool {
        self.columns.iter().any(|c| c.field == field)
    }

    /// Declared header for a field
    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.header.as_str())
    }

    /// Terminal status used by the retain policy
    pub fn retired_status(&self) -> Option<String> {
        match &self.deletion {
            DeletionPolicy::HardDelete => None,
            DeletionPolicy::Retain { status } => Some(status.trim().to_lowercase()),
        }
    }

    /// Default status for new records, lower-cased like sheet statuses
    pub fn default_status(&self) -> Option<String> {
        self.default_status
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }

    /// Configured spreadsheet id and tab, if both are set
    pub fn target(&self) -> SyncOutcome<(&str, &str)> {
        match (self.spreadsheet_id.as_deref(), self.tab_name.as_deref()) {
            (Some(id), Some(tab)) => Ok((id, tab)),
            _ => Err(SyncError::InvalidSchema(format!(
                "tenant {} has no spreadsheet_id/tab_name configured",
                self.tenant_id
            ))),
        }
    }
}

/// Header comparison key: case-insensitive, whitespace and underscores collapsed
pub fn normalize_header(header: &str) -> String {
    header
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Source of tenant schemas for the engine
pub trait SchemaSource: Send + Sync {
    fn schema_for(&self, tenant_id: TenantId) -> SyncOutcome<TenantSchema>;
}

#[derive(Debug, Deserialize)]
struct TenantFile {
    #[serde(default, rename = "tenant")]
    tenants: Vec<TenantEntry>,
}

#[derive(Debug, Deserialize)]
struct TenantEntry {
    id: i64,
    name: Option<String>,
    #[serde(default)]
    identifiers: Vec<String>,
    kind: RecordKind,
    spreadsheet_id: Option<String>,
    spreadsheet_url: Option<String>,
    tab_name: Option<String>,
    layout: Option<String>,
    columns: Option<Vec<ColumnMapping>>,
    default_status: Option<String>,
    #[serde(default)]
    deletion: DeletionPolicy,
    #[serde(default)]
    auto_sync: bool,
}

impl TenantEntry {
    fn into_schema(self) -> SyncOutcome<TenantSchema> {
        let tenant_id = TenantId(self.id);

        let columns = match (self.layout, self.columns) {
            (Some(_), Some(_)) => {
                return Err(SyncError::InvalidSchema(format!(
                    "tenant {}: set either layout or columns, not both",
                    tenant_id
                )))
            }
            (Some(name), None) => {
                let layout = layouts::by_name(&name).ok_or_else(|| {
                    SyncError::InvalidSchema(format!(
                        "tenant {}: unknown layout '{}' (known: {})",
                        tenant_id,
                        name,
                        layouts::names().join(", ")
                    ))
                })?;
                if layout.kind != self.kind {
                    return Err(SyncError::InvalidSchema(format!(
                        "tenant {}: layout '{}' is for {} records",
                        tenant_id, layout.name, layout.kind
                    )));
                }
                layout.mappings()
            }
            (None, Some(columns)) => columns,
            (None, None) => {
                return Err(SyncError::InvalidSchema(format!(
                    "tenant {}: no layout or columns configured",
                    tenant_id
                )))
            }
        };

        let spreadsheet_id = self
            .spreadsheet_id
            .or(self.spreadsheet_url)
            .map(|s| spreadsheet_id_from_url(&s))
            .filter(|s| !s.is_empty());

        let schema = TenantSchema {
            tenant_id,
            name: self.name.unwrap_or_else(|| format!("tenant {}", tenant_id)),
            kind: self.kind,
            spreadsheet_id,
            tab_name: self.tab_name.filter(|t| !t.trim().is_empty()),
            columns,
            deletion: self.deletion,
            default_status: self.default_status,
            identifiers: self.identifiers.iter().map(|i| i.trim().to_lowercase()).collect(),
            auto_sync: self.auto_sync,
        };
        schema.validate()?;
        Ok(schema)
    }
}

/// Tenant schemas keyed by tenant id
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    tenants: BTreeMap<TenantId, TenantSchema>,
}

impl TenantRegistry {
    /// Load the registry from a `tenants.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tenant file: {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid tenant file: {:?}", path))
    }

    /// Parse a registry from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TenantFile = toml::from_str(content).context("Failed to parse tenant TOML")?;

        let mut registry = Self::default();
        for entry in file.tenants {
            let schema = entry.into_schema()?;
            registry.insert(schema)?;
        }
        Ok(registry)
    }

    /// Add a validated schema; tenant ids must be unique
    pub fn insert(&mut self, schema: TenantSchema) -> SyncOutcome<()> {
        schema.validate()?;
        if self.tenants.contains_key(&schema.tenant_id) {
            return Err(SyncError::InvalidSchema(format!(
                "tenant {} configured twice",
                schema.tenant_id
            )));
        }
        self.tenants.insert(schema.tenant_id, schema);
        Ok(())
    }

    pub fn get(&self, tenant_id: TenantId) -> Option<&TenantSchema> {
        self.tenants.get(&tenant_id)
    }

    /// All tenants, ordered by id
    pub fn tenants(&self) -> impl Iterator<Item = &TenantSchema> {
        self.tenants.values()
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// Find the tenant whose identifier occurs in a login email
    ///
    /// Returns `None` rather than guessing when nothing matches.
    pub fn resolve_identifier(&self, email: &str) -> Option<&TenantSchema> {
        let needle = email.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.tenants
            .values()
            .find(|t| t.identifiers.iter().any(|id| !id.is_empty() && needle.contains(id.as_str())))
    }
}

impl SchemaSource for TenantRegistry {
    fn schema_for(&self, tenant_id: TenantId) -> SyncOutcome<TenantSchema> {
        self.get(tenant_id)
            .cloned()
            .ok_or(SyncError::UnknownTenant(tenant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TENANTS: &str = r#"
        [[tenant]]
        id = 7
        name = "KMG Insurance Agency"
        identifiers = ["kmg", "KMGInsurance"]
        kind = "insurance_customer"
        spreadsheet_url = "https://docs.google.com/spreadsheets/d/1kmgSheet/edit#gid=0"
        tab_name = "updating_input"
        layout = "kmg_insurance"
        deletion = { policy = "retain", status = "Archived" }
        auto_sync = true

        [[tenant]]
        id = 9
        kind = "candidate"
        spreadsheet_id = "1cand"
        tab_name = "output"
        default_status = "Pending"
        columns = [
            { header = "Name", field = "name" },
            { header = "Email", field = "email" },
            { header = "Status", field = "status" },
        ]
    "#;

    #[test]
    fn test_load_registry() {
        let registry = TenantRegistry::from_toml_str(TENANTS).unwrap();
        assert_eq!(registry.len(), 2);

        let kmg = registry.schema_for(TenantId(7)).unwrap();
        assert_eq!(kmg.spreadsheet_id.as_deref(), Some("1kmgSheet"));
        assert_eq!(kmg.columns.len(), 21);
        assert_eq!(kmg.retired_status().as_deref(), Some("archived"));
        assert!(kmg.auto_sync);

        let cand = registry.schema_for(TenantId(9)).unwrap();
        assert_eq!(cand.deletion, DeletionPolicy::HardDelete);
        assert_eq!(cand.default_status().as_deref(), Some("pending"));
        assert_eq!(cand.target().unwrap(), ("1cand", "output"));
        assert_eq!(cand.name, "tenant 9");
    }

    #[test]
    fn test_unknown_tenant() {
        let registry = TenantRegistry::from_toml_str(TENANTS).unwrap();
        let err = registry.schema_for(TenantId(1)).unwrap_err();
        assert!(matches!(err, SyncError::UnknownTenant(TenantId(1))));
    }

    #[test]
    fn test_resolve_identifier() {
        let registry = TenantRegistry::from_toml_str(TENANTS).unwrap();
        assert_eq!(
            registry.resolve_identifier("Owner@KMGinsurance.in").map(|t| t.tenant_id),
            Some(TenantId(7))
        );
        // No default tenant is guessed
        assert!(registry.resolve_identifier("someone@else.com").is_none());
        assert!(registry.resolve_identifier("").is_none());
    }

    #[test]
    fn test_rejects_field_of_other_kind() {
        let toml = r#"
            [[tenant]]
            id = 1
            kind = "candidate"
            columns = [{ header = "Email", field = "email" }, { header = "Premium", field = "premium" }]
        "#;
        assert!(TenantRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_requires_identity_columns() {
        let schema = TenantSchema::new(
            TenantId(1),
            RecordKind::Candidate,
            vec![ColumnMapping::new("Name", CanonicalField::Name)],
        );
        assert!(matches!(schema.validate(), Err(SyncError::InvalidSchema(_))));

        let schema = TenantSchema::new(
            TenantId(1),
            RecordKind::Candidate,
            vec![
                ColumnMapping::new("Name", CanonicalField::Name),
                ColumnMapping::new("Phone", CanonicalField::Mobile),
            ],
        );
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_headers() {
        let schema = TenantSchema::new(
            TenantId(1),
            RecordKind::Candidate,
            vec![
                ColumnMapping::new("Email", CanonicalField::Email),
                ColumnMapping::new(" email ", CanonicalField::Notes),
            ],
        );
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_rejects_layout_of_other_kind() {
        let toml = r#"
            [[tenant]]
            id = 1
            kind = "candidate"
            layout = "joban_insurance"
        "#;
        assert!(TenantRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_duplicate_tenant_ids() {
        let toml = r#"
            [[tenant]]
            id = 1
            kind = "candidate"
            layout = "candidate_output"

            [[tenant]]
            id = 1
            kind = "candidate"
            layout = "candidate_output"
        "#;
        assert!(TenantRegistry::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_missing_target() {
        let toml = r#"
            [[tenant]]
            id = 3
            kind = "candidate"
            layout = "candidate_output"
        "#;
        let registry = TenantRegistry::from_toml_str(toml).unwrap();
        let schema = registry.schema_for(TenantId(3)).unwrap();
        assert!(schema.target().is_err());
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Date_of   Expiry "), "date of expiry");
        assert_eq!(normalize_header("REGN no"), "regn no");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TENANTS.as_bytes()).unwrap();

        let registry = TenantRegistry::load(file.path()).unwrap();
        assert_eq!(registry.tenants().count(), 2);
        assert!(TenantRegistry::load(Path::new("/nonexistent/tenants.toml")).is_err());
    }
}
