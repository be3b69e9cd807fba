//! XML and concordance fixtures shared by the crate's tests.

/// A small Form 990: filer header, one scalar revenue amount and an
/// `Officers` list with two rows.
pub(crate) const FORM_990: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Return xmlns="http://www.irs.gov/efile" returnVersion="2020v4.1">
  <ReturnHeader>
    <ReturnTs>2021-05-10T12:00:00-05:00</ReturnTs>
    <TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>
    <ReturnTypeCd>990</ReturnTypeCd>
    <Filer>
      <EIN>123456789</EIN>
      <BusinessName>
        <BusinessNameLine1Txt>Helping Hands Foundation</BusinessNameLine1Txt>
      </BusinessName>
      <USAddress>
        <AddressLine1Txt>100 Main St</AddressLine1Txt>
        <CityNm>Springfield</CityNm>
        <StateAbbreviationCd>IL</StateAbbreviationCd>
        <ZIPCd>62701</ZIPCd>
      </USAddress>
    </Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990>
      <WebsiteAddressTxt>www.helpinghands.org</WebsiteAddressTxt>
      <TotalRevenueAmt>1000000</TotalRevenueAmt>
      <Officers>
        <Officer>
          <PersonNm>Jane Doe</PersonNm>
          <TitleTxt>President</TitleTxt>
        </Officer>
        <Officer>
          <PersonNm>John Roe</PersonNm>
          <TitleTxt>Treasurer</TitleTxt>
        </Officer>
      </Officers>
    </IRS990>
  </ReturnData>
</Return>
"#;

/// The same filing written with an explicit, differently named prefix.
pub(crate) const FORM_990_PREFIXED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<efile:Return xmlns:efile="http://www.irs.gov/efile" returnVersion="2020v4.1">
  <efile:ReturnHeader>
    <efile:ReturnTs>2021-05-10T12:00:00-05:00</efile:ReturnTs>
    <efile:TaxPeriodEndDt>2020-12-31</efile:TaxPeriodEndDt>
    <efile:ReturnTypeCd>990</efile:ReturnTypeCd>
    <efile:Filer>
      <efile:EIN>123456789</efile:EIN>
      <efile:BusinessName>
        <efile:BusinessNameLine1Txt>Helping Hands Foundation</efile:BusinessNameLine1Txt>
      </efile:BusinessName>
      <efile:USAddress>
        <efile:AddressLine1Txt>100 Main St</efile:AddressLine1Txt>
        <efile:CityNm>Springfield</efile:CityNm>
        <efile:StateAbbreviationCd>IL</efile:StateAbbreviationCd>
        <efile:ZIPCd>62701</efile:ZIPCd>
      </efile:USAddress>
    </efile:Filer>
  </efile:ReturnHeader>
  <efile:ReturnData>
    <efile:IRS990>
      <efile:WebsiteAddressTxt>www.helpinghands.org</efile:WebsiteAddressTxt>
      <efile:TotalRevenueAmt>1000000</efile:TotalRevenueAmt>
      <efile:Officers>
        <efile:Officer>
          <efile:PersonNm>Jane Doe</efile:PersonNm>
          <efile:TitleTxt>President</efile:TitleTxt>
        </efile:Officer>
        <efile:Officer>
          <efile:PersonNm>John Roe</efile:PersonNm>
          <efile:TitleTxt>Treasurer</efile:TitleTxt>
        </efile:Officer>
      </efile:Officers>
    </efile:IRS990>
  </efile:ReturnData>
</efile:Return>
"#;

/// Grants with a nested disbursement list in the first grant only.
pub(crate) const NESTED_GRANTS: &str = r#"<Return xmlns="http://www.irs.gov/efile">
  <ReturnHeader>
    <TaxPeriodEndDt>2021-06-30</TaxPeriodEndDt>
    <ReturnTypeCd>990</ReturnTypeCd>
    <Filer><EIN>987654321</EIN></Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990ScheduleI>
      <GrantsGrp>
        <Grant>
          <RecipientNm>Alpha Clinic</RecipientNm>
          <CashGrantAmt>1,000</CashGrantAmt>
          <DisbursementGrp>
            <Disbursement><PaidDt>2021-01-15</PaidDt><PaidAmt>600</PaidAmt></Disbursement>
            <Disbursement><PaidDt>2021-03-15</PaidDt><PaidAmt>400</PaidAmt></Disbursement>
          </DisbursementGrp>
        </Grant>
        <Grant>
          <RecipientNm>Beta School</RecipientNm>
          <CashGrantAmt>250</CashGrantAmt>
          <DisbursementGrp>
            <Disbursement><PaidDt>2021-02-01</PaidDt><PaidAmt>250</PaidAmt></Disbursement>
          </DisbursementGrp>
        </Grant>
      </GrantsGrp>
    </IRS990ScheduleI>
  </ReturnData>
</Return>
"#;

/// Containers that look like groups but are not.
pub(crate) const NOT_GROUPS: &str = r#"<Return>
  <ReturnHeader>
    <TaxPeriodEndDt>2021-12-31</TaxPeriodEndDt>
    <ReturnTypeCd>990EZ</ReturnTypeCd>
    <Filer><EIN>555555555</EIN></Filer>
  </ReturnHeader>
  <ReturnData>
    <IRS990EZ>
      <SingleGrp><Row><AAmt>1</AAmt><BTxt>x</BTxt></Row></SingleGrp>
      <MixedGrp>
        <Row><AAmt>1</AAmt></Row>
        <Row><BTxt>2</BTxt></Row>
      </MixedGrp>
      <TotalExpensesAmt>42</TotalExpensesAmt>
    </IRS990EZ>
  </ReturnData>
</Return>
"#;

/// Header without a return type.
pub(crate) const MISSING_FORM_TYPE: &str = r#"<Return xmlns="http://www.irs.gov/efile">
  <ReturnHeader>
    <TaxPeriodEndDt>2020-12-31</TaxPeriodEndDt>
    <Filer><EIN>123456789</EIN></Filer>
  </ReturnHeader>
  <ReturnData/>
</Return>
"#;

pub(crate) const CONCORDANCE: &str = "\
variable_name,xpath,description,data_type_simple,rdb_table,rdb_relationship
F9_01_REV_TOT,/Return/ReturnData/IRS990/TotalRevenueAmt,Total revenue,numeric,filing_values,ONE
F9_01_GROSS_RCPT,/Return/ReturnData/IRS990/GrossReceiptsAmt,Gross receipts,numeric,filing_values,ONE
";
