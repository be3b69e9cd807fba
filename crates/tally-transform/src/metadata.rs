//! Filing metadata and filer details from the return header.
//!
//! Every field has an ordered list of location expressions; the first one
//! that yields text wins. `locate` already tolerates namespace drift, so the
//! alternatives here cover schema drift (renamed or moved elements).

use tally_core::filing::{self, FilingMetadata, Organization};
use tally_xml::{Document, locate};

use crate::error::{Error, Result};

struct HeaderField {
  name:      &'static str,
  locations: &'static [&'static str],
}

impl HeaderField {
  fn find(&self, doc: &Document) -> Option<String> {
    self.locations.iter().find_map(|loc| locate(doc, loc))
  }

  fn require(&self, doc: &Document) -> Result<String> {
    self
      .find(doc)
      .ok_or(Error::Metadata { field: self.name })
  }
}

const EIN: HeaderField = HeaderField {
  name:      "EIN",
  locations: &[
    "/irs:Return/irs:ReturnHeader/irs:Filer/irs:EIN",
    "//irs:Filer/irs:EIN",
    "//*[local-name()='EIN']",
  ],
};

const TAX_PERIOD: HeaderField = HeaderField {
  name:      "TaxPeriodEndDt",
  locations: &[
    "/irs:Return/irs:ReturnHeader/irs:TaxPeriodEndDt",
    "//irs:TaxPeriodEndDt",
    "//*[local-name()='TaxPeriodEndDate']",
  ],
};

const FORM_TYPE: HeaderField = HeaderField {
  name:      "ReturnTypeCd",
  locations: &[
    "/irs:Return/irs:ReturnHeader/irs:ReturnTypeCd",
    "//irs:ReturnTypeCd",
    "//*[local-name()='ReturnType']",
  ],
};

const SUBMITTED: HeaderField = HeaderField {
  name:      "ReturnTs",
  locations: &[
    "/irs:Return/irs:ReturnHeader/irs:ReturnTs",
    "//*[local-name()='Timestamp']",
  ],
};

const BUSINESS_NAME: HeaderField = HeaderField {
  name:      "BusinessNameLine1Txt",
  locations: &[
    "//irs:Filer/irs:BusinessName/irs:BusinessNameLine1Txt",
    "//irs:Filer/irs:BusinessName/irs:BusinessNameLine1",
    "//irs:Filer/irs:Name/irs:BusinessNameLine1",
  ],
};

const WEBSITE: HeaderField = HeaderField {
  name:      "WebsiteAddressTxt",
  locations: &["//irs:WebsiteAddressTxt", "//irs:WebSite"],
};

/// Extract the filing's metadata. Fails when the employer id, tax period or
/// return type is missing.
pub fn extract_metadata(doc: &Document, object_id: Option<&str>) -> Result<FilingMetadata> {
  let ein = EIN.require(doc)?;
  let tax_period = TAX_PERIOD.require(doc)?;
  let form_type = FORM_TYPE.require(doc)?;

  let tax_year = tax_period
    .get(..4)
    .and_then(|year| year.parse::<i32>().ok());

  Ok(FilingMetadata {
    filing_id: filing::filing_id(&ein, &tax_period, &form_type),
    form_version: doc.root_attribute("returnVersion").map(str::to_owned),
    submission_date: SUBMITTED.find(doc),
    object_id: object_id.map(str::to_owned),
    xml_hash: Some(doc.source_hash().to_owned()),
    tax_year,
    ein,
    tax_period,
    form_type,
  })
}

/// Filer details. Address parts come from the US address when present and
/// from the foreign address otherwise.
pub fn extract_organization(doc: &Document, ein: &str) -> Organization {
  Organization {
    ein:           ein.to_owned(),
    name:          BUSINESS_NAME.find(doc),
    address_line1: address_part(doc, &["AddressLine1Txt", "AddressLine1"], &[
      "AddressLine1Txt",
      "AddressLine1",
    ]),
    address_line2: address_part(doc, &["AddressLine2Txt", "AddressLine2"], &[
      "AddressLine2Txt",
      "AddressLine2",
    ]),
    city:          address_part(doc, &["CityNm", "City"], &["CityNm", "City"]),
    state:         address_part(doc, &["StateAbbreviationCd", "State"], &[
      "ProvinceOrStateNm",
      "ProvinceOrState",
    ]),
    zip:           address_part(doc, &["ZIPCd", "ZIPCode"], &[
      "ForeignPostalCd",
      "PostalCode",
    ]),
    country:       Some(
      address_in(doc, "ForeignAddress", &["CountryCd", "Country"])
        .unwrap_or_else(|| "US".to_owned()),
    ),
    website:       WEBSITE.find(doc),
  }
}

fn address_part(doc: &Document, us: &[&str], foreign: &[&str]) -> Option<String> {
  address_in(doc, "USAddress", us).or_else(|| address_in(doc, "ForeignAddress", foreign))
}

fn address_in(doc: &Document, container: &str, names: &[&str]) -> Option<String> {
  names
    .iter()
    .find_map(|name| locate(doc, &format!("//irs:Filer/irs:{container}/irs:{name}")))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixtures;

  fn doc(xml: &str) -> Document { xml.parse().unwrap() }

  #[test]
  fn metadata_from_default_namespace_header() {
    let doc = doc(fixtures::FORM_990);
    let meta = extract_metadata(&doc, Some("201900001_public.xml")).unwrap();

    assert_eq!(meta.filing_id, "123456789_2020-12-31_990");
    assert_eq!(meta.ein, "123456789");
    assert_eq!(meta.tax_period, "2020-12-31");
    assert_eq!(meta.form_type, "990");
    assert_eq!(meta.form_version.as_deref(), Some("2020v4.1"));
    assert_eq!(meta.tax_year, Some(2020));
    assert_eq!(
      meta.submission_date.as_deref(),
      Some("2021-05-10T12:00:00-05:00")
    );
    assert_eq!(meta.object_id.as_deref(), Some("201900001_public.xml"));
    assert_eq!(meta.xml_hash.as_deref().map(str::len), Some(64));
  }

  #[test]
  fn metadata_ignores_prefix_binding() {
    let plain = extract_metadata(&doc(fixtures::FORM_990), None).unwrap();
    let prefixed = extract_metadata(&doc(fixtures::FORM_990_PREFIXED), None).unwrap();
    assert_eq!(plain.filing_id, prefixed.filing_id);
    assert_eq!(plain.submission_date, prefixed.submission_date);
    assert_eq!(plain.form_version, prefixed.form_version);
  }

  #[test]
  fn metadata_without_namespace() {
    let meta = extract_metadata(&doc(fixtures::NOT_GROUPS), None).unwrap();
    assert_eq!(meta.filing_id, "555555555_2021-12-31_990EZ");
    assert_eq!(meta.form_version, None);
    assert_eq!(meta.submission_date, None);
  }

  #[test]
  fn missing_required_field_is_a_metadata_error() {
    let err = extract_metadata(&doc(fixtures::MISSING_FORM_TYPE), None).unwrap_err();
    assert!(matches!(err, Error::Metadata { field: "ReturnTypeCd" }));
  }

  #[test]
  fn organization_from_us_address() {
    let org = extract_organization(&doc(fixtures::FORM_990), "123456789");
    assert_eq!(org.ein, "123456789");
    assert_eq!(org.name.as_deref(), Some("Helping Hands Foundation"));
    assert_eq!(org.address_line1.as_deref(), Some("100 Main St"));
    assert_eq!(org.address_line2, None);
    assert_eq!(org.city.as_deref(), Some("Springfield"));
    assert_eq!(org.state.as_deref(), Some("IL"));
    assert_eq!(org.zip.as_deref(), Some("62701"));
    assert_eq!(org.country.as_deref(), Some("US"));
    assert_eq!(org.website.as_deref(), Some("www.helpinghands.org"));
  }

  #[test]
  fn organization_from_foreign_address() {
    let doc = doc(
      r#"<Return xmlns="http://www.irs.gov/efile"><ReturnHeader><Filer>
           <EIN>111111111</EIN>
           <ForeignAddress>
             <AddressLine1Txt>1 Rue Example</AddressLine1Txt>
             <CityNm>Paris</CityNm>
             <ForeignPostalCd>75001</ForeignPostalCd>
             <CountryCd>FR</CountryCd>
           </ForeignAddress>
         </Filer></ReturnHeader></Return>"#,
    );
    let org = extract_organization(&doc, "111111111");
    assert_eq!(org.name, None);
    assert_eq!(org.city.as_deref(), Some("Paris"));
    assert_eq!(org.zip.as_deref(), Some("75001"));
    assert_eq!(org.country.as_deref(), Some("FR"));
  }
}
