//! Data models for sheetsync
//!
//! Defines the records that flow through a sync pass:
//!
//! - `SourceRow`: raw cells read from the sheet (ephemeral)
//! - `CanonicalRecord`: a row after the tenant schema has been applied (ephemeral)
//! - `PersistedRecord`: a tenant-scoped row in the relational store
//! - `SyncResult`: counters and row-level errors reported to the caller

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RowError, RowIssue};

/// Identity of a tenant (the owning client account)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TenantId)
    }
}

/// The kind of record a tenant keeps in its sheet
///
/// Each kind is mirrored into its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Job candidates (recruitment tenants)
    Candidate,
    /// Insurance customers and their policies
    InsuranceCustomer,
}

impl RecordKind {
    /// Table holding records of this kind
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Candidate => "candidates",
            RecordKind::InsuranceCustomer => "insurance_customers",
        }
    }

    /// Canonical fields a record of this kind can carry
    pub fn fields(&self) -> &'static [CanonicalField] {
        use CanonicalField::*;
        match self {
            RecordKind::Candidate => &[
                Name,
                Email,
                Mobile,
                Status,
                Notes,
                Summary,
                MatchScore,
                ResumeText,
                InterviewDate,
                Transcript,
                JobDescription,
                MatchingSkills,
                MissingSkills,
            ],
            RecordKind::InsuranceCustomer => &[
                Name,
                Email,
                Mobile,
                Status,
                Notes,
                Product,
                Vertical,
                PolicyNo,
                Company,
                RegistrationNo,
                Premium,
                LastYearPremium,
                PremiumMode,
                RenewalDate,
                OdExpiryDate,
                TpExpiryDate,
                ActivatedDate,
                ThankYouSent,
                ChequeHold,
                PaymentDate,
                ChequeNo,
                ChequeBounce,
                NewPolicyNo,
                NewCompany,
                PolicyDocLink,
                OwnerAlertSent,
                Reason,
            ],
        }
    }

    /// Check whether a field belongs to this kind
    pub fn supports(&self, field: CanonicalField) -> bool {
        self.fields().contains(&field)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Candidate => write!(f, "candidate"),
            RecordKind::InsuranceCustomer => write!(f, "insurance_customer"),
        }
    }
}

/// Schema-independent field key that raw columns are mapped into
///
/// The serialized name doubles as the column name in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Name,
    Email,
    Mobile,
    Status,
    Notes,
    // Candidate fields
    Summary,
    MatchScore,
    ResumeText,
    InterviewDate,
    Transcript,
    JobDescription,
    MatchingSkills,
    MissingSkills,
    // Insurance fields
    Product,
    Vertical,
    PolicyNo,
    Company,
    RegistrationNo,
    Premium,
    LastYearPremium,
    PremiumMode,
    RenewalDate,
    OdExpiryDate,
    TpExpiryDate,
    ActivatedDate,
    ThankYouSent,
    ChequeHold,
    PaymentDate,
    ChequeNo,
    ChequeBounce,
    NewPolicyNo,
    NewCompany,
    PolicyDocLink,
    OwnerAlertSent,
    Reason,
}

/// How a canonical field's raw cell is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Date,
    /// Business status, stored lower-cased
    Status,
    /// Insurance line of business, classified into a fixed set of verticals
    Vertical,
}

impl CanonicalField {
    /// Stable key, also used as the store column name
    pub fn key(&self) -> &'static str {
        use CanonicalField::*;
        match self {
            Name => "name",
            Email => "email",
            Mobile => "mobile",
            Status => "status",
            Notes => "notes",
            Summary => "summary",
            MatchScore => "match_score",
            ResumeText => "resume_text",
            InterviewDate => "interview_date",
            Transcript => "transcript",
            JobDescription => "job_description",
            MatchingSkills => "matching_skills",
            MissingSkills => "missing_skills",
            Product => "product",
            Vertical => "vertical",
            PolicyNo => "policy_no",
            Company => "company",
            RegistrationNo => "registration_no",
            Premium => "premium",
            LastYearPremium => "last_year_premium",
            PremiumMode => "premium_mode",
            RenewalDate => "renewal_date",
            OdExpiryDate => "od_expiry_date",
            TpExpiryDate => "tp_expiry_date",
            ActivatedDate => "activated_date",
            ThankYouSent => "thank_you_sent",
            ChequeHold => "cheque_hold",
            PaymentDate => "payment_date",
            ChequeNo => "cheque_no",
            ChequeBounce => "cheque_bounce",
            NewPolicyNo => "new_policy_no",
            NewCompany => "new_company",
            PolicyDocLink => "policy_doc_link",
            OwnerAlertSent => "owner_alert_sent",
            Reason => "reason",
        }
    }

    /// Value type used when parsing and rendering cells
    pub fn field_type(&self) -> FieldType {
        use CanonicalField::*;
        match self {
            Status => FieldType::Status,
            Vertical => FieldType::Vertical,
            MatchScore | Premium | LastYearPremium => FieldType::Number,
            RenewalDate | OdExpiryDate | TpExpiryDate | ActivatedDate | PaymentDate => {
                FieldType::Date
            }
            _ => FieldType::Text,
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Date formats accepted from human-edited cells, tried in order
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%d-%b-%Y", "%d %b %Y"];

/// Date format written back to the sheet
const SHEET_DATE_FORMAT: &str = "%d/%m/%Y";

/// Typed value of a canonical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue {
    /// Parse a raw cell for the given field
    ///
    /// Returns `Ok(None)` for empty cells. Unparsable numbers are rejected
    /// with `RowIssue::InvalidValue`; unparsable dates are kept as text so
    /// nothing the sheet holds is lost.
    pub fn parse(field: CanonicalField, raw: &str) -> Result<Option<FieldValue>, RowIssue> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let value = match field.field_type() {
            FieldType::Text => FieldValue::Text(trimmed.to_string()),
            FieldType::Status => FieldValue::Text(trimmed.to_lowercase()),
            FieldType::Vertical => FieldValue::Text(classify_vertical(trimmed).to_string()),
            FieldType::Number => match parse_number(trimmed) {
                Some(n) => FieldValue::Number(n),
                None => {
                    return Err(RowIssue::InvalidValue {
                        field,
                        raw: trimmed.to_string(),
                    })
                }
            },
            FieldType::Date => match parse_date(trimmed) {
                Some(d) => FieldValue::Date(d),
                None => FieldValue::Text(trimmed.to_string()),
            },
        };

        Ok(Some(value))
    }

    /// Render the value as a sheet cell
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            FieldValue::Date(d) => d.format(SHEET_DATE_FORMAT).to_string(),
        }
    }

    /// Render the value as a sheet cell for a specific field
    ///
    /// Verticals are stored lower-cased and written back capitalized.
    pub fn render_for(&self, field: CanonicalField) -> String {
        match (field.field_type(), self) {
            (FieldType::Vertical, FieldValue::Text(s)) => capitalize(s),
            _ => self.render(),
        }
    }

    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim_start_matches(['₹', '$', '€', '£'])
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Map free-text verticals onto `motor`, `life`, `health` or `non-motor`
///
/// Unrecognized text falls back to `motor`.
pub fn classify_vertical(raw: &str) -> &'static str {
    let lower = raw.trim().to_lowercase();
    if lower.contains("life") {
        "life"
    } else if lower.contains("health") {
        "health"
    } else if lower.contains("non") && lower.contains("motor") {
        "non-motor"
    } else {
        "motor"
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Canonical field values of one record
pub type FieldMap = BTreeMap<CanonicalField, FieldValue>;

/// One data row as read from the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based index among data rows (the header is not counted)
    pub index: usize,
    /// Raw cell strings, possibly shorter than the header row
    pub cells: Vec<String>,
}

impl SourceRow {
    pub fn new(index: usize, cells: Vec<String>) -> Self {
        Self { index, cells }
    }

    /// Physical sheet row number (the header occupies row 1)
    pub fn sheet_row(&self) -> usize {
        self.index + 1
    }

    /// Synthetic positional id, e.g. `row_7`
    pub fn row_id(&self) -> String {
        row_id_for(self.sheet_row())
    }

    /// Cell at a column position; missing trailing cells read as empty
    pub fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Build the synthetic row id for a physical sheet row
pub fn row_id_for(sheet_row: usize) -> String {
    format!("row_{}", sheet_row)
}

/// Parse a synthetic row id back into its physical sheet row
pub fn parse_row_id(row_id: &str) -> Option<usize> {
    row_id
        .strip_prefix("row_")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 2)
}

/// Normalized identity attributes used by the row matcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityBundle {
    pub row_id: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub name: Option<String>,
}

impl IdentityBundle {
    /// Build a bundle from canonical field values
    pub fn from_fields(row_id: impl Into<String>, fields: &FieldMap) -> Self {
        let text = |field: CanonicalField| fields.get(&field).map(FieldValue::render);
        Self {
            row_id: row_id.into(),
            email: text(CanonicalField::Email).and_then(|v| normalize_email(&v)),
            mobile: text(CanonicalField::Mobile).and_then(|v| normalize_mobile(&v)),
            name: text(CanonicalField::Name).and_then(|v| normalize_name(&v)),
        }
    }

    /// An email, or both mobile and name, is enough to identify a row
    pub fn is_usable(&self) -> bool {
        self.email.is_some() || self.composite_key().is_some()
    }

    /// Mobile + name pair, when both are present
    pub fn composite_key(&self) -> Option<(String, String)> {
        match (&self.mobile, &self.name) {
            (Some(m), Some(n)) => Some((m.clone(), n.clone())),
            _ => None,
        }
    }

    /// Whether two bundles positively describe different people
    ///
    /// Compares the strongest attribute both sides carry: email, then
    /// mobile, then name. Missing attributes never conflict.
    pub fn conflicts_with(&self, other: &IdentityBundle) -> bool {
        if let (Some(a), Some(b)) = (&self.email, &other.email) {
            return a != b;
        }
        if let (Some(a), Some(b)) = (&self.mobile, &other.mobile) {
            return a != b;
        }
        if let (Some(a), Some(b)) = (&self.name, &other.name) {
            return a != b;
        }
        false
    }
}

/// Lower-case and trim an email
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (!email.is_empty()).then_some(email)
}

/// Keep only the digits of a phone number
pub fn normalize_mobile(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Trim, collapse internal whitespace and case-fold a name for comparison
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    (!name.is_empty()).then_some(name)
}

/// A sheet row after the tenant schema has been applied
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// Synthetic positional id (`row_<sheet row>`)
    pub row_id: String,
    /// Physical sheet row number
    pub sheet_row: usize,
    /// Mapped values, display casing preserved
    pub fields: FieldMap,
    /// Cells under headers the tenant schema does not map, keyed by raw header
    pub extras: BTreeMap<String, String>,
    /// Normalized identity used for matching
    pub identity: IdentityBundle,
    /// Fields whose cell could not be parsed; left untouched in the store
    pub rejected: BTreeSet<CanonicalField>,
}

impl CanonicalRecord {
    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }
}

/// A tenant-scoped record in the relational store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRecord {
    pub id: i64,
    pub tenant_id: TenantId,
    pub kind: RecordKind,
    pub fields: FieldMap,
    /// Last sheet row identity this record was matched from
    pub sheet_row_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Business status, independent of sync unless the schema maps it
    pub fn status(&self) -> Option<&str> {
        self.get(CanonicalField::Status).and_then(FieldValue::as_text)
    }

    /// Normalized identity of this record
    pub fn identity(&self) -> IdentityBundle {
        IdentityBundle::from_fields(self.sheet_row_id.clone().unwrap_or_default(), &self.fields)
    }
}

/// Outcome of one sync call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    pub imported: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Rows written back to the sheet (push direction only)
    pub exported: usize,
    pub errors: Vec<RowError>,
    /// Non-fatal schema problems that are not tied to a row
    pub warnings: Vec<String>,
}

impl SyncResult {
    /// Whether the run changed anything in the store
    pub fn has_changes(&self) -> bool {
        self.imported + self.updated + self.deleted > 0
    }

    /// Record a row-level problem
    pub fn push_error(&mut self, row_id: impl Into<String>, issue: RowIssue) {
        self.errors.push(RowError::new(row_id, issue));
    }
}

/// Outcome of a reverse push
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushResult {
    pub exported: usize,
    /// Sheet rows whose owned cells were blanked
    pub cleared_rows: usize,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_round_trip() {
        let row = SourceRow::new(6, vec![]);
        assert_eq!(row.sheet_row(), 7);
        assert_eq!(row.row_id(), "row_7");
        assert_eq!(parse_row_id("row_7"), Some(7));
        assert_eq!(parse_row_id("row_1"), None);
        assert_eq!(parse_row_id("row_x"), None);
        assert_eq!(parse_row_id("7"), None);
    }

    #[test]
    fn test_missing_trailing_cells_read_empty() {
        let row = SourceRow::new(1, vec!["Asha".to_string()]);
        assert_eq!(row.cell(0), "Asha");
        assert_eq!(row.cell(5), "");
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_email("  Asha@X.com "), Some("asha@x.com".to_string()));
        assert_eq!(normalize_email("   "), None);
        assert_eq!(normalize_mobile("+91 98765-43210"), Some("919876543210".to_string()));
        assert_eq!(normalize_mobile("n/a"), None);
        assert_eq!(normalize_name("  Asha   RAO "), Some("asha rao".to_string()));
    }

    #[test]
    fn test_parse_number_variants() {
        let parse = |raw| FieldValue::parse(CanonicalField::Premium, raw).unwrap();
        assert_eq!(parse("12500"), Some(FieldValue::Number(12500.0)));
        assert_eq!(parse("₹12,500"), Some(FieldValue::Number(12500.0)));
        assert_eq!(parse("85%"), Some(FieldValue::Number(85.0)));
        assert_eq!(parse(""), None);
        assert!(FieldValue::parse(CanonicalField::Premium, "twelve").is_err());
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5).map(FieldValue::Date);
        for raw in ["05/03/2025", "2025-03-05", "05-03-2025", "05.03.2025", "05-Mar-2025"] {
            assert_eq!(
                FieldValue::parse(CanonicalField::RenewalDate, raw).unwrap(),
                expected,
                "{}",
                raw
            );
        }

        // Unparsable dates are kept verbatim
        assert_eq!(
            FieldValue::parse(CanonicalField::RenewalDate, "next month").unwrap(),
            Some(FieldValue::Text("next month".to_string()))
        );
    }

    #[test]
    fn test_status_is_lowercased() {
        assert_eq!(
            FieldValue::parse(CanonicalField::Status, " Pending ").unwrap(),
            Some(FieldValue::Text("pending".to_string()))
        );
    }

    #[test]
    fn test_vertical_classification() {
        for (raw, expected) in [
            ("Motor", "motor"),
            ("PVT CAR motor", "motor"),
            ("Term Life", "life"),
            ("health insurance", "health"),
            ("Non Motor", "non-motor"),
            ("non-motor", "non-motor"),
            ("Two Wheeler", "motor"),
        ] {
            assert_eq!(
                FieldValue::parse(CanonicalField::Vertical, raw).unwrap(),
                Some(FieldValue::Text(expected.to_string())),
                "{}",
                raw
            );
        }
        assert_eq!(FieldValue::parse(CanonicalField::Vertical, "  ").unwrap(), None);
    }

    #[test]
    fn test_vertical_renders_capitalized_and_reparses() {
        for (stored, cell) in [("motor", "Motor"), ("life", "Life"), ("health", "Health"), ("non-motor", "Non-motor")] {
            let value = FieldValue::Text(stored.to_string());
            let rendered = value.render_for(CanonicalField::Vertical);
            assert_eq!(rendered, cell);
            assert_eq!(FieldValue::parse(CanonicalField::Vertical, &rendered).unwrap(), Some(value));
        }

        // Other text fields render verbatim
        let name = FieldValue::Text("asha".to_string());
        assert_eq!(name.render_for(CanonicalField::Name), "asha");
    }

    #[test]
    fn test_render_is_reparseable() {
        let values = [
            (CanonicalField::Premium, FieldValue::Number(12500.0)),
            (CanonicalField::Premium, FieldValue::Number(99.5)),
            (
                CanonicalField::TpExpiryDate,
                FieldValue::Date(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()),
            ),
            (CanonicalField::Name, FieldValue::Text("Asha Rao".to_string())),
        ];

        for (field, value) in values {
            let rendered = value.render();
            assert_eq!(FieldValue::parse(field, &rendered).unwrap(), Some(value));
        }
        assert_eq!(FieldValue::Number(12500.0).render(), "12500");
    }

    #[test]
    fn test_identity_usable() {
        let mut fields = FieldMap::new();
        fields.insert(CanonicalField::Name, FieldValue::Text("Asha".to_string()));
        assert!(!IdentityBundle::from_fields("row_2", &fields).is_usable());

        fields.insert(CanonicalField::Mobile, FieldValue::Text("98765 43210".to_string()));
        assert!(IdentityBundle::from_fields("row_2", &fields).is_usable());

        let mut email_only = FieldMap::new();
        email_only.insert(CanonicalField::Email, FieldValue::Text("a@x.com".to_string()));
        assert!(IdentityBundle::from_fields("row_2", &email_only).is_usable());
    }

    #[test]
    fn test_identity_conflicts() {
        let bundle = |email: Option<&str>, mobile: Option<&str>, name: Option<&str>| IdentityBundle {
            row_id: "row_2".to_string(),
            email: email.map(str::to_string),
            mobile: mobile.map(str::to_string),
            name: name.map(str::to_string),
        };

        let asha = bundle(Some("asha@x.com"), Some("1"), Some("asha"));
        assert!(!asha.conflicts_with(&bundle(Some("asha@x.com"), Some("2"), None)));
        assert!(asha.conflicts_with(&bundle(Some("bob@x.com"), Some("1"), Some("asha"))));
        // Email missing on one side falls back to mobile
        assert!(asha.conflicts_with(&bundle(None, Some("2"), Some("asha"))));
        assert!(!asha.conflicts_with(&bundle(None, None, None)));
    }

    #[test]
    fn test_kind_fields() {
        assert!(RecordKind::Candidate.supports(CanonicalField::MatchScore));
        assert!(!RecordKind::Candidate.supports(CanonicalField::Premium));
        assert!(RecordKind::InsuranceCustomer.supports(CanonicalField::Premium));
        for kind in [RecordKind::Candidate, RecordKind::InsuranceCustomer] {
            assert!(kind.supports(CanonicalField::Status));
            assert!(kind.supports(CanonicalField::Name));
        }
    }
}
