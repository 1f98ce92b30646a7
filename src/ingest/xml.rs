//! Streaming reader for ABR bulk-extract XML.
//!
//! The reader is event-driven and never builds a document tree: memory use
//! is bounded by the largest single `<ABR>` record, not by the document,
//! which matters for the ~580 MB extract files. Callers pull one raw record
//! at a time; the pull loop is what gives the pipeline its backpressure.

use std::io::BufRead;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One `<ABR>` record as it appears in the source, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub abn: Option<String>,
    pub abn_status: Option<String>,
    pub abn_status_from: Option<String>,
    pub entity_type_code: Option<String>,
    pub entity_type_text: Option<String>,
    pub main_name: Option<String>,
    pub given_names: Vec<String>,
    pub family_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub gst_status: Option<String>,
    pub gst_from: Option<String>,
    pub acn: Option<String>,
    pub record_last_updated: Option<String>,
    pub other_names: Vec<RawOtherName>,
}

/// An alternate-name element (`OtherEntity` or `DGR` scope) with its
/// `type` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOtherName {
    pub name_type: String,
    pub name_text: String,
}

/// Pull-based record reader over any buffered byte source.
pub struct RecordReader<R: BufRead> {
    reader: Reader<R>,
    /// Open-element names, innermost last. Parent and grandparent lookups
    /// drive tag disambiguation.
    stack: Vec<String>,
    text: String,
    current: Option<RawRecord>,
    current_other_name_type: Option<String>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            stack: Vec::new(),
            text: String::new(),
            current: None,
            current_other_name_type: None,
        }
    }

    /// Advance to the next complete record, or `None` at end of input.
    ///
    /// Records without an ABN are malformed source entries and are skipped
    /// silently.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self
                .reader
                .read_event_into(&mut buf)
                .context("XML parse error")?
            {
                Event::Start(start) => self.handle_open(&start),
                Event::Empty(start) => {
                    // Self-closing element: open then immediately close.
                    self.handle_open(&start);
                    if let Some(record) = self.handle_close() {
                        return Ok(Some(record));
                    }
                }
                Event::Text(text) => {
                    let unescaped = text.unescape().context("XML text decode error")?;
                    self.text.push_str(&unescaped);
                }
                Event::CData(data) => {
                    self.text.push_str(&String::from_utf8_lossy(&data));
                }
                Event::End(_) => {
                    if let Some(record) = self.handle_close() {
                        return Ok(Some(record));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    fn handle_open(&mut self, start: &BytesStart) {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        self.text.clear();

        match name.as_str() {
            "ABR" => {
                self.current = Some(RawRecord {
                    record_last_updated: attr(start, "recordLastUpdatedDate"),
                    ..RawRecord::default()
                });
            }
            "ABN" => {
                if let Some(record) = self.current.as_mut() {
                    record.abn_status = attr(start, "status");
                    record.abn_status_from = attr(start, "ABNStatusFromDate");
                }
            }
            "GST" => {
                if let Some(record) = self.current.as_mut() {
                    record.gst_status = attr(start, "status");
                    record.gst_from = attr(start, "GSTStatusFromDate");
                }
            }
            "NonIndividualName" => {
                // The parent is still on top of the stack at this point.
                if matches!(self.parent(), Some("OtherEntity") | Some("DGR")) {
                    self.current_other_name_type = attr(start, "type");
                }
            }
            _ => {}
        }

        self.stack.push(name);
    }

    /// Process a closing tag; returns a completed record on `</ABR>`.
    fn handle_close(&mut self) -> Option<RawRecord> {
        let value = self.text.trim().to_string();
        let closing = self.stack.last().cloned().unwrap_or_default();
        let mut completed = None;

        match closing.as_str() {
            "ABR" => {
                let record = self.current.take();
                // Malformed entries carry no ABN; drop them silently.
                completed = record.filter(|r| r.abn.is_some());
            }
            "ABN" => self.assign(|r| r.abn = non_empty(value)),
            "EntityTypeInd" => self.assign(|r| r.entity_type_code = non_empty(value)),
            "EntityTypeText" => self.assign(|r| r.entity_type_text = non_empty(value)),
            "NonIndividualNameText" => self.assign_name_text(value),
            "GivenName" => {
                if self.parent_is("LegalEntity") && !value.is_empty() {
                    self.assign(|r| r.given_names.push(value));
                }
            }
            "FamilyName" => {
                if self.parent_is("LegalEntity") {
                    self.assign(|r| r.family_name = non_empty(value));
                }
            }
            "State" => self.assign(|r| r.state = non_empty(value)),
            "Postcode" => self.assign(|r| r.postcode = non_empty(value)),
            "ASICNumber" => self.assign(|r| r.acn = non_empty(value)),
            _ => {}
        }

        self.text.clear();
        self.stack.pop();
        completed
    }

    /// `NonIndividualNameText` means different things depending on its
    /// grandparent: under `MainEntity` it is the record's primary name,
    /// under `OtherEntity` or `DGR` it is an alternate name carrying the
    /// `type` attribute captured at open time.
    fn assign_name_text(&mut self, value: String) {
        if value.is_empty() || !self.parent_is("NonIndividualName") {
            return;
        }
        match self.grandparent() {
            Some("MainEntity") => {
                if let Some(record) = self.current.as_mut() {
                    record.main_name = Some(value);
                }
            }
            Some("OtherEntity") | Some("DGR") => {
                let name_type = self.current_other_name_type.take().unwrap_or_default();
                if let Some(record) = self.current.as_mut() {
                    record.other_names.push(RawOtherName {
                        name_type,
                        name_text: value,
                    });
                }
            }
            _ => {}
        }
    }

    fn assign(&mut self, apply: impl FnOnce(&mut RawRecord)) {
        if let Some(record) = self.current.as_mut() {
            apply(record);
        }
    }

    /// Parent of the element currently on top of the stack.
    fn parent(&self) -> Option<&str> {
        self.nth_ancestor(1)
    }

    fn grandparent(&self) -> Option<&str> {
        self.nth_ancestor(2)
    }

    fn nth_ancestor(&self, n: usize) -> Option<&str> {
        self.stack
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.stack.get(i))
            .map(String::as_str)
    }

    fn parent_is(&self, name: &str) -> bool {
        self.parent() == Some(name)
    }
}

fn attr(start: &BytesStart, key: &str) -> Option<String> {
    start
        .try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(xml: &str) -> Vec<RawRecord> {
        let mut reader = RecordReader::new(xml.as_bytes());
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    const COMPANY_RECORD: &str = r#"
        <Transfer>
          <ABR recordLastUpdatedDate="20240101">
            <ABN status="ACT" ABNStatusFromDate="20000301">53004085616</ABN>
            <EntityType>
              <EntityTypeInd>PRV</EntityTypeInd>
              <EntityTypeText>Australian Private Company</EntityTypeText>
            </EntityType>
            <MainEntity>
              <NonIndividualName type="MN">
                <NonIndividualNameText>VANTAGE SEARCH PTY LTD</NonIndividualNameText>
              </NonIndividualName>
              <BusinessAddress>
                <AddressDetails>
                  <State>NSW</State>
                  <Postcode>2000</Postcode>
                </AddressDetails>
              </BusinessAddress>
            </MainEntity>
            <ASICNumber>004085616</ASICNumber>
            <GST status="ACT" GSTStatusFromDate="20000701"/>
            <OtherEntity>
              <NonIndividualName type="TRD">
                <NonIndividualNameText>VANTAGE DIRECTORY</NonIndividualNameText>
              </NonIndividualName>
            </OtherEntity>
            <DGR>
              <NonIndividualName type="DGR">
                <NonIndividualNameText>VANTAGE FUND</NonIndividualNameText>
              </NonIndividualName>
            </DGR>
          </ABR>
        </Transfer>"#;

    #[test]
    fn test_company_record_fields() {
        let records = read_all(COMPANY_RECORD);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.abn.as_deref(), Some("53004085616"));
        assert_eq!(r.abn_status.as_deref(), Some("ACT"));
        assert_eq!(r.abn_status_from.as_deref(), Some("20000301"));
        assert_eq!(r.entity_type_code.as_deref(), Some("PRV"));
        assert_eq!(
            r.entity_type_text.as_deref(),
            Some("Australian Private Company")
        );
        assert_eq!(r.main_name.as_deref(), Some("VANTAGE SEARCH PTY LTD"));
        assert_eq!(r.state.as_deref(), Some("NSW"));
        assert_eq!(r.postcode.as_deref(), Some("2000"));
        assert_eq!(r.acn.as_deref(), Some("004085616"));
        assert_eq!(r.gst_status.as_deref(), Some("ACT"));
        assert_eq!(r.gst_from.as_deref(), Some("20000701"));
        assert_eq!(r.record_last_updated.as_deref(), Some("20240101"));
    }

    #[test]
    fn test_grandparent_disambiguation_of_name_text() {
        let records = read_all(COMPANY_RECORD);
        let r = &records[0];
        // Main name did not leak into other_names, and both alternates kept
        // their captured type attributes.
        assert_eq!(r.main_name.as_deref(), Some("VANTAGE SEARCH PTY LTD"));
        assert_eq!(
            r.other_names,
            vec![
                RawOtherName {
                    name_type: "TRD".to_string(),
                    name_text: "VANTAGE DIRECTORY".to_string(),
                },
                RawOtherName {
                    name_type: "DGR".to_string(),
                    name_text: "VANTAGE FUND".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_individual_record() {
        let xml = r#"
            <Transfer>
              <ABR recordLastUpdatedDate="20240101">
                <ABN status="ACT" ABNStatusFromDate="19000101">12345678901</ABN>
                <EntityType>
                  <EntityTypeInd>IND</EntityTypeInd>
                  <EntityTypeText>Individual/Sole Trader</EntityTypeText>
                </EntityType>
                <LegalEntity>
                  <GivenName>MARY</GivenName>
                  <GivenName>JANE</GivenName>
                  <FamilyName>DOE</FamilyName>
                </LegalEntity>
              </ABR>
            </Transfer>"#;
        let records = read_all(xml);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.entity_type_code.as_deref(), Some("IND"));
        assert_eq!(r.given_names, vec!["MARY".to_string(), "JANE".to_string()]);
        assert_eq!(r.family_name.as_deref(), Some("DOE"));
    }

    #[test]
    fn test_record_without_abn_is_discarded() {
        let xml = r#"
            <Transfer>
              <ABR recordLastUpdatedDate="20240101">
                <EntityType><EntityTypeInd>PRV</EntityTypeInd></EntityType>
              </ABR>
              <ABR recordLastUpdatedDate="20240101">
                <ABN status="ACT" ABNStatusFromDate="20000301">11111111111</ABN>
              </ABR>
            </Transfer>"#;
        let records = read_all(xml);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].abn.as_deref(), Some("11111111111"));
    }

    #[test]
    fn test_cdata_and_entities_in_names() {
        let xml = r#"
            <ABR recordLastUpdatedDate="20240101">
              <ABN status="ACT" ABNStatusFromDate="20000301">22222222222</ABN>
              <MainEntity>
                <NonIndividualName type="MN">
                  <NonIndividualNameText><![CDATA[SMITH & CO]]></NonIndividualNameText>
                </NonIndividualName>
              </MainEntity>
              <OtherEntity>
                <NonIndividualName type="TRD">
                  <NonIndividualNameText>JONES &amp; SONS</NonIndividualNameText>
                </NonIndividualName>
              </OtherEntity>
            </ABR>"#;
        let records = read_all(xml);
        let r = &records[0];
        assert_eq!(r.main_name.as_deref(), Some("SMITH & CO"));
        assert_eq!(r.other_names[0].name_text, "JONES & SONS");
    }

    #[test]
    fn test_whitespace_trimmed_from_text() {
        let xml = r#"
            <ABR recordLastUpdatedDate="20240101">
              <ABN status="ACT" ABNStatusFromDate="20000301">
                33333333333
              </ABN>
            </ABR>"#;
        let records = read_all(xml);
        assert_eq!(records[0].abn.as_deref(), Some("33333333333"));
    }

    #[test]
    fn test_multiple_records_stream() {
        let mut xml = String::from("<Transfer>");
        for i in 0..25 {
            xml.push_str(&format!(
                r#"<ABR recordLastUpdatedDate="20240101">
                     <ABN status="ACT" ABNStatusFromDate="20000301">{:011}</ABN>
                   </ABR>"#,
                i
            ));
        }
        xml.push_str("</Transfer>");
        let records = read_all(&xml);
        assert_eq!(records.len(), 25);
        assert_eq!(records[24].abn.as_deref(), Some("00000000024"));
    }
}
