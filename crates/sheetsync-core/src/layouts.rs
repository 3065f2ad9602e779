//! Built-in column layouts
//!
//! Tenants whose sheet follows one of the known layouts can reference it by
//! name in `tenants.toml` instead of listing every column.

use crate::models::{CanonicalField, RecordKind};
use crate::tenant::ColumnMapping;

use CanonicalField::*;

/// A named, ordered column layout
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub name: &'static str,
    pub kind: RecordKind,
    pub columns: &'static [(&'static str, CanonicalField)],
}

impl Layout {
    /// Column mappings in sheet order
    pub fn mappings(&self) -> Vec<ColumnMapping> {
        self.columns
            .iter()
            .map(|(header, field)| ColumnMapping::new(*header, *field))
            .collect()
    }
}

/// Candidate screening output tab
pub const CANDIDATE_OUTPUT: Layout = Layout {
    name: "candidate_output",
    kind: RecordKind::Candidate,
    columns: &[
        ("Name", Name),
        ("Email", Email),
        ("Summary", Summary),
        ("Match Score", MatchScore),
        ("Resume", ResumeText),
        ("Mobile", Mobile),
        ("Interview Date", InterviewDate),
        ("Status", Status),
        ("Transcript", Transcript),
        ("Job Description", JobDescription),
        ("Matching Skills", MatchingSkills),
    ],
};

/// KMG renewal tracker
pub const KMG_INSURANCE: Layout = Layout {
    name: "kmg_insurance",
    kind: RecordKind::InsuranceCustomer,
    columns: &[
        ("Name", Name),
        ("Mobile", Mobile),
        ("Activated Date", ActivatedDate),
        ("Renewal Date", RenewalDate),
        ("OD Expiry", OdExpiryDate),
        ("TP Expiry", TpExpiryDate),
        ("Premium Mode", PremiumMode),
        ("Premium", Premium),
        ("Vertical", Vertical),
        ("Product", Product),
        ("REGN no", RegistrationNo),
        ("Policy No", PolicyNo),
        ("Company", Company),
        ("Status", Status),
        ("New Policy No", NewPolicyNo),
        ("New Company", NewCompany),
        ("Policy doc link", PolicyDocLink),
        ("ThankYouSent", ThankYouSent),
        ("Reason", Reason),
        ("Email", Email),
        ("Notes", Notes),
    ],
};

/// Joban Putra renewal tracker
pub const JOBAN_INSURANCE: Layout = Layout {
    name: "joban_insurance",
    kind: RecordKind::InsuranceCustomer,
    columns: &[
        ("Name", Name),
        ("Mobile", Mobile),
        ("Email", Email),
        ("Product", Product),
        ("Vertical", Vertical),
        ("Policy No", PolicyNo),
        ("Company", Company),
        ("REGN no", RegistrationNo),
        ("Last Year Premium", LastYearPremium),
        ("Premium Amount", Premium),
        ("Premium Mode", PremiumMode),
        ("Date of Expiry", RenewalDate),
        ("TP Expiry", TpExpiryDate),
        ("Activated Date", ActivatedDate),
        ("Status", Status),
        ("ThankYouSent", ThankYouSent),
        ("Cheque Hold", ChequeHold),
        ("Payment Date", PaymentDate),
        ("Cheque No", ChequeNo),
        ("Cheque Bounce", ChequeBounce),
        ("New Policy No", NewPolicyNo),
        ("New Policy Company", NewCompany),
        ("Policy doc link", PolicyDocLink),
        ("Owner Alert Sent", OwnerAlertSent),
        ("Notes", Notes),
    ],
};

const ALL: &[Layout] = &[CANDIDATE_OUTPUT, KMG_INSURANCE, JOBAN_INSURANCE];

/// Look up a built-in layout by name
pub fn by_name(name: &str) -> Option<&'static Layout> {
    ALL.iter().find(|l| l.name.eq_ignore_ascii_case(name.trim()))
}

/// Names of all built-in layouts
pub fn names() -> Vec<&'static str> {
    ALL.iter().map(|l| l.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(CANDIDATE_OUTPUT.columns.len(), 11);
        assert_eq!(KMG_INSURANCE.columns.len(), 21);
        assert_eq!(JOBAN_INSURANCE.columns.len(), 25);
    }

    #[test]
    fn test_layouts_are_consistent() {
        for layout in ALL {
            let fields: HashSet<_> = layout.columns.iter().map(|(_, f)| *f).collect();
            assert_eq!(fields.len(), layout.columns.len(), "{} maps a field twice", layout.name);
            for (header, field) in layout.columns {
                assert!(layout.kind.supports(*field), "{}: {} not a {} field", layout.name, header, layout.kind);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("KMG_Insurance").map(|l| l.name), Some("kmg_insurance"));
        assert!(by_name("unknown").is_none());
        assert_eq!(names().len(), 3);
    }

    #[test]
    fn test_joban_renames() {
        let mappings = JOBAN_INSURANCE.mappings();
        let header_for = |field| {
            mappings
                .iter()
                .find(|m| m.field == field)
                .map(|m| m.header.as_str())
        };
        assert_eq!(header_for(RenewalDate), Some("Date of Expiry"));
        assert_eq!(header_for(Premium), Some("Premium Amount"));
    }
}
