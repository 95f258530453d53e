//! Bulletin parser — raw registry XML into structured facts.
//!
//! The registry serves one XML document per bulletin:
//!
//! ```xml
//! <MessageData>
//!   <Id>8250141</Id>
//!   <PublishDate>2024-05-17T10:30:00</PublishDate>
//!   <Bankrupt xsi:type="Bankrupt.Company">…</Bankrupt>
//!   <MessageInfo MessageType="ArbitralDecree">…</MessageInfo>
//! </MessageData>
//! ```
//!
//! The `xsi:type` discriminator on the subject section selects the company or
//! person schema. Missing optional fields become `None`, never an error; only
//! a document with no parseable root is a `ParseError` (terminal for the
//! bulletin). A well-formed document without a root element parses to
//! `Ok(None)` — "no payload".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::ParseError;
use crate::model::{
    CompanyDescription, ParsedBulletin, PersonDescription, PersonName, SubjectDescription,
};

/// Minimal in-memory element tree, enough for the field reads below.
#[derive(Debug, Default)]
pub(crate) struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First direct child with the given element name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attribute value by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First descendant (depth-first) with the given element name, matching
    /// either the plain or any namespace-prefixed form.
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            let local = child.name.rsplit(':').next().unwrap_or(&child.name);
            if local == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of this element and all descendants.
    pub fn inner_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.inner_text());
        }
        out
    }

    /// Trimmed inner text of a direct child, `None` when absent or blank.
    fn child_text(&self, name: &str) -> Option<String> {
        let text = self.child(name)?.inner_text();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Parse an XML document into an element tree.
///
/// Returns `Ok(None)` for a document with no root element.
pub(crate) fn parse_tree(content: &str) -> Result<Option<XmlNode>, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(node_from_start(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let node = node_from_start(&start)?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let chunk = text.unescape().map_err(|e| ParseError(e.to_string()))?;
                    top.text.push_str(&chunk);
                }
            }
            Ok(Event::CData(cdata)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&cdata));
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| ParseError("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, processing instructions
            Err(e) => return Err(ParseError(e.to_string())),
        }
    }

    if !stack.is_empty() {
        return Err(ParseError("unclosed element at end of document".to_string()));
    }
    Ok(root)
}

fn node_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, ParseError> {
    let mut node = XmlNode {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..XmlNode::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError(e.to_string()))?
            .into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Parse one bulletin document.
///
/// `Ok(None)` means the document carries no root element ("no payload") —
/// the bulletin stays in the inbox untouched. `Err` is terminal.
pub fn parse_bulletin(content: &str) -> Result<Option<ParsedBulletin>, ParseError> {
    let Some(root) = parse_tree(content)? else {
        return Ok(None);
    };

    let external_id = root
        .child_text("Id")
        .ok_or_else(|| ParseError("document has no <Id> element".to_string()))?;
    let published_at = root
        .child_text("PublishDate")
        .and_then(|s| parse_registry_datetime(&s));

    let mut parsed = ParsedBulletin {
        external_id,
        published_at,
        message_type: None,
        text: None,
        subject: SubjectDescription::Empty,
    };

    // The message section is only meaningful when a subject section exists;
    // a bulletin without one resolves to no party and is discarded upstream.
    if let Some(subject_node) = root.child("Bankrupt") {
        parsed.subject = parse_subject(subject_node);

        if let Some(info) = root.child("MessageInfo") {
            parsed.message_type = info.attr("MessageType").map(str::to_string);
            let text = info.inner_text();
            let text = text.trim();
            parsed.text = (!text.is_empty()).then(|| text.to_string());
        }
    }

    Ok(Some(parsed))
}

/// Populate the subject description from the discriminated section.
fn parse_subject(node: &XmlNode) -> SubjectDescription {
    let Some(discriminator) = node.attr("xsi:type") else {
        return SubjectDescription::Empty;
    };

    if discriminator.starts_with("Bankrupt.Company") {
        SubjectDescription::Company(CompanyDescription {
            name: node.child_text("Name"),
            address: node.child_text("Address"),
            tax_id: node.child_text("Inn"),
            reg_id: node.child_text("Ogrn"),
        })
    } else if discriminator.starts_with("Bankrupt.Person") {
        SubjectDescription::Person(PersonDescription {
            name: node.child("Fio").map(parse_person_name),
            name_history: node
                .child("FioHistory")
                .map(|history| history.children.iter().map(parse_person_name).collect())
                .unwrap_or_default(),
            address: node.child_text("Address"),
            // Birth-date parse failures yield no date rather than an error.
            birth_date: node.child_text("Birthdate").and_then(|s| parse_date(&s)),
            birth_place: node.child_text("Birthplace"),
            tax_id: node.child_text("Inn"),
            reg_id: node.child_text("Ogrnip"),
            insurance_id: node.child_text("Snils"),
        })
    } else {
        SubjectDescription::Empty
    }
}

fn parse_person_name(node: &XmlNode) -> PersonName {
    PersonName {
        first: node.child_text("FirstName"),
        last: node.child_text("LastName"),
        middle: node.child_text("MiddleName"),
    }
}

/// Registry timestamps come without a zone; treat them as UTC.
fn parse_registry_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    None
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    parse_registry_datetime(s)
        .map(|dt| dt.date_naive())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANY_BULLETIN: &str = r#"<?xml version="1.0" encoding="utf-8"?>
        <MessageData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
            <Id>8250141</Id>
            <PublishDate>2024-05-17T10:30:00</PublishDate>
            <Bankrupt xsi:type="Bankrupt.Company">
                <Name>ООО «Ромашка»</Name>
                <Address>г. Москва, ул. Ленина, д. 1</Address>
                <Inn>1234567890</Inn>
                <Ogrn>1027700000000</Ogrn>
            </Bankrupt>
            <MessageInfo MessageType="ArbitralDecree">Определение суда о введении наблюдения</MessageInfo>
        </MessageData>"#;

    #[test]
    fn parses_company_bulletin() {
        let parsed = parse_bulletin(COMPANY_BULLETIN).unwrap().unwrap();
        assert_eq!(parsed.external_id, "8250141");
        assert_eq!(parsed.message_type.as_deref(), Some("ArbitralDecree"));
        assert_eq!(
            parsed.text.as_deref(),
            Some("Определение суда о введении наблюдения")
        );

        let SubjectDescription::Company(company) = &parsed.subject else {
            panic!("expected company subject, got {:?}", parsed.subject);
        };
        assert_eq!(company.name.as_deref(), Some("ООО «Ромашка»"));
        assert_eq!(company.tax_id.as_deref(), Some("1234567890"));
        assert_eq!(company.reg_id.as_deref(), Some("1027700000000"));
    }

    #[test]
    fn parses_person_bulletin_with_name_history() {
        let xml = r#"
            <MessageData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                <Id>900100</Id>
                <PublishDate>2024-06-01T09:00:00</PublishDate>
                <Bankrupt xsi:type="Bankrupt.Person">
                    <Fio>
                        <FirstName>Иван</FirstName>
                        <LastName>Иванов</LastName>
                        <MiddleName>Иванович</MiddleName>
                    </Fio>
                    <FioHistory>
                        <Fio><FirstName>Иван</FirstName><LastName>Петров</LastName></Fio>
                    </FioHistory>
                    <Birthdate>1980-03-12T00:00:00</Birthdate>
                    <Birthplace>г. Тверь</Birthplace>
                    <Inn>500100732259</Inn>
                    <Snils>11223344595</Snils>
                </Bankrupt>
                <MessageInfo MessageType="PropertyInventoryResult">Итоги инвентаризации</MessageInfo>
            </MessageData>"#;

        let parsed = parse_bulletin(xml).unwrap().unwrap();
        let SubjectDescription::Person(person) = &parsed.subject else {
            panic!("expected person subject");
        };
        assert_eq!(
            person.name.as_ref().map(|n| n.canonical()).as_deref(),
            Some("Иванов Иван Иванович")
        );
        assert_eq!(person.name_history.len(), 1);
        assert_eq!(person.name_history[0].last.as_deref(), Some("Петров"));
        assert_eq!(
            person.birth_date,
            NaiveDate::from_ymd_opt(1980, 3, 12)
        );
        assert_eq!(person.tax_id.as_deref(), Some("500100732259"));
        assert_eq!(person.insurance_id.as_deref(), Some("11223344595"));
    }

    #[test]
    fn bad_birth_date_yields_none_not_error() {
        let xml = r#"
            <MessageData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                <Id>1</Id>
                <PublishDate>2024-06-01T09:00:00</PublishDate>
                <Bankrupt xsi:type="Bankrupt.Person">
                    <Fio><LastName>Иванов</LastName></Fio>
                    <Birthdate>двенадцатое марта</Birthdate>
                </Bankrupt>
            </MessageData>"#;

        let parsed = parse_bulletin(xml).unwrap().unwrap();
        let SubjectDescription::Person(person) = &parsed.subject else {
            panic!("expected person subject");
        };
        assert!(person.birth_date.is_none());
    }

    #[test]
    fn unknown_discriminator_yields_empty_subject_with_message_type() {
        let xml = r#"
            <MessageData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                <Id>2</Id>
                <PublishDate>2024-06-01T09:00:00</PublishDate>
                <Bankrupt xsi:type="Bankrupt.Farm"><Name>КФХ</Name></Bankrupt>
                <MessageInfo MessageType="UnknownType">текст</MessageInfo>
            </MessageData>"#;

        let parsed = parse_bulletin(xml).unwrap().unwrap();
        assert_eq!(parsed.subject, SubjectDescription::Empty);
        assert_eq!(parsed.message_type.as_deref(), Some("UnknownType"));
    }

    #[test]
    fn missing_subject_section_skips_message_info() {
        let xml = r#"
            <MessageData>
                <Id>3</Id>
                <PublishDate>2024-06-01T09:00:00</PublishDate>
                <MessageInfo MessageType="ArbitralDecree">текст</MessageInfo>
            </MessageData>"#;

        let parsed = parse_bulletin(xml).unwrap().unwrap();
        assert_eq!(parsed.subject, SubjectDescription::Empty);
        assert!(parsed.message_type.is_none());
        assert!(parsed.text.is_none());
    }

    #[test]
    fn missing_optional_company_fields_are_none() {
        let xml = r#"
            <MessageData xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                <Id>4</Id>
                <PublishDate>2024-06-01T09:00:00</PublishDate>
                <Bankrupt xsi:type="Bankrupt.Company"><Name>ООО Тест</Name></Bankrupt>
            </MessageData>"#;

        let parsed = parse_bulletin(xml).unwrap().unwrap();
        let SubjectDescription::Company(company) = &parsed.subject else {
            panic!("expected company subject");
        };
        assert!(company.tax_id.is_none());
        assert!(company.reg_id.is_none());
        assert!(company.address.is_none());
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = parse_bulletin("<MessageData><Id>5</Id>").unwrap_err();
        assert!(!err.0.is_empty());

        assert!(parse_bulletin("not xml at all <<<").is_err());
    }

    #[test]
    fn empty_document_is_no_payload() {
        assert!(parse_bulletin("").unwrap().is_none());
        assert!(parse_bulletin("<?xml version=\"1.0\"?>").unwrap().is_none());
    }

    #[test]
    fn document_without_id_is_a_parse_error() {
        let xml = "<MessageData><PublishDate>2024-01-01T00:00:00</PublishDate></MessageData>";
        assert!(parse_bulletin(xml).is_err());
    }
}
