//! Mapping detected group names to canonical table names, and the default
//! field sets used when the concordance declares none for a table.

use regex::Regex;
use tally_core::value::DataType;

use crate::error::Result;

/// Longest generated table name.
pub const MAX_TABLE_NAME: usize = 50;

/// Element name meaning "the row's own text".
pub const ROW_TEXT: &str = ".";

const EXACT: &[(&str, &str)] = &[
  ("Form990PartVIISectionAGrp", "compensation_officers"),
  ("OfficerDirectorTrusteeKeyEmpl", "compensation_officers"),
  ("OtherExpensesGrp", "expenses_other"),
  ("GrantsToOrgOutsideUSGrp", "foreign_org_grants"),
  ("SupplementalInformationDetail", "supplemental_info"),
  ("ProgramServiceRevenueGrp", "program_service_revenue"),
  ("RelatedOrgInformationGrp", "related_organizations"),
  ("UnrelatedOrgTxblPartnershipGrp", "unrelated_partnerships"),
  ("ReceivablesFromOfficersGrp", "receivables_from_officers"),
  ("CompOfHighestPaidEmplGrp", "highest_compensated_employees"),
  ("IndependentContractorCompGrp", "independent_contractors"),
];

const SUBSTRING: &[(&str, &str)] = &[
  ("OfficerDirectorTrustee", "compensation_officers"),
  ("CompensationHighest", "compensation_highest"),
  ("GrantsToDomesticOrg", "grants_domestic"),
  ("GrantsToForeignOrg", "foreign_org_grants"),
  ("ForeignActivities", "foreign_activities"),
  ("ExpenseOther", "expenses_other"),
  ("ProgSrvcAccomplishment", "program_service_accomplishment"),
  ("RelatedOrgInfo", "related_org_info"),
  ("UnrelatedBusiness", "unrelated_business"),
  ("SupplementalInfo", "supplemental_info"),
  ("DisregardedEntityGrp", "disregarded_entities"),
  ("LandBuildingEquipmentGrp", "land_buildings_equipment"),
  ("InvestmentIncomeGrp", "investment_income"),
  ("OtherRevenueGrp", "revenue_misc"),
  ("FunctionalExpenseGrp", "functional_expenses"),
];

const KEYWORDS: &[(&[&str], &str)] = &[
  (&["PartVII", "Compensation", "Officer"], "compensation_officers"),
  (&["Expense"], "expenses_other"),
  (&["Grant", "Foreign"], "foreign_org_grants"),
  (&["Supplemental", "Information"], "supplemental_info"),
];

// ─── Table mapping ───────────────────────────────────────────────────────────

pub struct TableMapper {
  prefix:    Regex,
  suffix:    Regex,
  non_alnum: Regex,
}

impl TableMapper {
  pub fn new() -> Result<Self> {
    Ok(Self {
      prefix:    Regex::new(r"^(Frm|Form|Irs|IRS|ReturnHeader|ReturnData|Return)")?,
      suffix:    Regex::new(r"(Ind|Amt|Txt|Num|Desc|Grp|Group)$")?,
      non_alnum: Regex::new(r"[^a-z0-9_]")?,
    })
  }

  /// Canonical table for a group element name: exact lookup, then substring
  /// lookup, then keyword heuristics, then `repeating_<normalized>`.
  pub fn table_for(&self, element_name: &str) -> String {
    if let Some((_, table)) = EXACT.iter().find(|(name, _)| *name == element_name) {
      return (*table).to_owned();
    }
    if let Some((_, table)) = SUBSTRING
      .iter()
      .find(|(needle, _)| element_name.contains(needle))
    {
      return (*table).to_owned();
    }
    if let Some((_, table)) = KEYWORDS
      .iter()
      .find(|(words, _)| words.iter().any(|w| element_name.contains(w)))
    {
      return (*table).to_owned();
    }

    let mut table = format!("repeating_{}", self.normalize(element_name));
    table.truncate(MAX_TABLE_NAME);
    table
  }

  /// `Form990ScheduleJGrp` → `990_schedule_j`.
  pub fn normalize(&self, element_name: &str) -> String {
    let trimmed = self.prefix.replace(element_name, "");
    let trimmed = self.suffix.replace(&trimmed, "");

    let mut snake = String::with_capacity(trimmed.len() + 8);
    for (i, c) in trimmed.chars().enumerate() {
      if i > 0 && c.is_uppercase() {
        snake.push('_');
      }
      snake.extend(c.to_lowercase());
    }
    self.non_alnum.replace_all(&snake, "").into_owned()
  }
}

// ─── Field templates ─────────────────────────────────────────────────────────

/// A field expected in every row of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTemplate {
  /// Name under which the field is stored.
  pub name:      String,
  /// Local name of the element holding the value, or [`ROW_TEXT`].
  pub element:   String,
  /// `None` means the type is guessed from each value.
  pub data_type: Option<DataType>,
}

type Known = (&'static str, &'static [(&'static str, DataType)]);

const KNOWN_TABLES: &[Known] = &[
  ("compensation_officers", &[
    ("PersonNm", DataType::Text),
    ("TitleTxt", DataType::Text),
    ("OfficerInd", DataType::Boolean),
    ("ReportableCompFromOrgAmt", DataType::Numeric),
    ("ReportableCompFromRltdOrgAmt", DataType::Numeric),
  ]),
  ("expenses_other", &[
    ("Desc", DataType::Text),
    ("TotalAmt", DataType::Numeric),
    ("ProgramServicesAmt", DataType::Numeric),
    ("MgmtAndGeneralAmt", DataType::Numeric),
    ("FundraisingAmt", DataType::Numeric),
  ]),
  ("foreign_org_grants", &[
    ("RegionTxt", DataType::Text),
    ("PurposeOfGrantTxt", DataType::Text),
    ("CashGrantAmt", DataType::Numeric),
    ("NonCashAssistanceAmt", DataType::Numeric),
    ("MannerOfCashDisbursementTxt", DataType::Text),
  ]),
  ("supplemental_info", &[
    ("FormAndLineReferenceDesc", DataType::Text),
    ("ExplanationTxt", DataType::Text),
  ]),
];

/// (stored suffix, element) pairs for tables nobody described.
const GENERIC: &[(&str, &str)] = &[
  ("Value", ROW_TEXT),
  ("Amount", "Amt"),
  ("Description", "Desc"),
  ("Name", "Nm"),
  ("Text", "Txt"),
];

/// Default fields for `table`. Stored names are prefixed with the table so
/// that templates of different tables never share a field definition.
pub fn default_fields(table: &str) -> Vec<FieldTemplate> {
  if let Some((_, fields)) = KNOWN_TABLES.iter().find(|(name, _)| *name == table) {
    return fields
      .iter()
      .map(|(element, data_type)| FieldTemplate {
        name:      format!("{table}_{element}"),
        element:   (*element).to_owned(),
        data_type: Some(*data_type),
      })
      .collect();
  }
  GENERIC
    .iter()
    .map(|(suffix, element)| FieldTemplate {
      name:      format!("{table}_{suffix}"),
      element:   (*element).to_owned(),
      data_type: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn mapper() -> TableMapper { TableMapper::new().unwrap() }

  #[test]
  fn exact_names_win() {
    let m = mapper();
    assert_eq!(m.table_for("Form990PartVIISectionAGrp"), "compensation_officers");
    assert_eq!(
      m.table_for("CompOfHighestPaidEmplGrp"),
      "highest_compensated_employees"
    );
  }

  #[test]
  fn substring_then_keywords() {
    let m = mapper();
    assert_eq!(m.table_for("GrantsToDomesticOrgIndivGrp"), "grants_domestic");
    assert_eq!(m.table_for("ScheduleRDisregardedEntityGrp"), "disregarded_entities");
    assert_eq!(m.table_for("Officers"), "compensation_officers");
    assert_eq!(m.table_for("TravelExpenseDetail"), "expenses_other");
    assert_eq!(m.table_for("SupplementalInformationDetail"), "supplemental_info");
  }

  #[test]
  fn generic_fallback_is_normalized_and_bounded() {
    let m = mapper();
    assert_eq!(m.table_for("Form990ScheduleJGrp"), "repeating_990_schedule_j");
    assert_eq!(m.table_for("ContractorList"), "repeating_contractor_list");
    let long = m.table_for(&"VeryLongName".repeat(10));
    assert_eq!(long.len(), MAX_TABLE_NAME);
    assert!(long.starts_with("repeating_very_long_name"));
  }

  #[test]
  fn known_templates_are_typed_and_prefixed() {
    let fields = default_fields("compensation_officers");
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[0].name, "compensation_officers_PersonNm");
    assert_eq!(fields[0].element, "PersonNm");
    assert_eq!(fields[2].data_type, Some(DataType::Boolean));
  }

  #[test]
  fn generic_template_guesses_types() {
    let fields = default_fields("repeating_misc");
    assert_eq!(fields[0].element, ROW_TEXT);
    assert_eq!(fields[0].name, "repeating_misc_Value");
    assert!(fields.iter().all(|f| f.data_type.is_none()));
  }
}
