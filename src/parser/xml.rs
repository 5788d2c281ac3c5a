use crate::error::{LoadError, Result};
use crate::models::XmlElement;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::{Map, Value as JsonValue};
use std::io::{BufRead, BufReader, Read};

/// Reads a whole XML stream into a generic element tree.
pub fn parse_xml<R: Read>(reader: R, key: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(BufReader::new(reader));
    reader.expand_empty_elements(true);
    build_tree(&mut reader).map_err(|source| LoadError::Xml {
        key: key.to_string(),
        source,
    })
}

fn build_tree<B: BufRead>(reader: &mut Reader<B>) -> Result<XmlElement, quick_xml::Error> {
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(XmlElement {
                name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                ..XmlElement::default()
            }),
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    // Only the first top-level element is kept.
                    None => {}
                }
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(quick_xml::Error::UnexpectedEof(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].name
        )));
    }
    root.ok_or_else(|| quick_xml::Error::UnexpectedEof("no root element".to_string()))
}

/// Flattens the tree into the records found directly under the root element.
///
/// All children of the root must share one tag. Leaves become their trimmed
/// text; repeated sibling tags collapse into an array while a single
/// occurrence stays a scalar or object, so consumers must accept both shapes.
pub fn flatten(root: &XmlElement) -> Result<Vec<JsonValue>> {
    let JsonValue::Object(groups) = element_to_json(root) else {
        return Ok(Vec::new());
    };
    if groups.len() != 1 {
        return Err(LoadError::AmbiguousXmlRoot {
            groups: groups.keys().cloned().collect(),
        });
    }
    let records = match groups.into_iter().next() {
        Some((_, JsonValue::Array(items))) => items,
        Some((_, single)) => vec![single],
        None => Vec::new(),
    };
    Ok(records)
}

fn element_to_json(element: &XmlElement) -> JsonValue {
    if element.children.is_empty() {
        return JsonValue::String(element.text.trim().to_string());
    }

    let mut output = Map::new();
    for child in &element.children {
        let value = element_to_json(child);
        match output.get_mut(&child.name) {
            Some(JsonValue::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = JsonValue::Array(vec![first, value]);
            }
            None => {
                output.insert(child.name.clone(), value);
            }
        }
    }
    JsonValue::Object(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use serde_json::json;

    const INVOICES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoices>
    <Invoice.xml>
        <OrderId>016f6a4a</OrderId>
        <PersonId>  933 </PersonId>
        <Orderline>
            <asin>B000</asin>
            <price>10.5</price>
        </Orderline>
        <Orderline>
            <asin>B001</asin>
            <price>3</price>
        </Orderline>
    </Invoice.xml>
    <Invoice.xml>
        <OrderId>02a3</OrderId>
        <PersonId>1</PersonId>
        <Orderline>
            <asin>B002</asin>
            <price>1</price>
        </Orderline>
        <Note/>
    </Invoice.xml>
</Invoices>"#;

    #[test]
    fn builds_generic_tree() {
        let root = parse_xml(INVOICES.as_bytes(), "invoices").unwrap();
        assert_eq!(root.name, "Invoices");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].children[0].name, "OrderId");
        assert_eq!(root.children[1].children[3].name, "Note");
        assert!(root.children[1].children[3].children.is_empty());
    }

    #[test]
    fn flattens_records_under_root() {
        let root = parse_xml(INVOICES.as_bytes(), "invoices").unwrap();
        let records = flatten(&root).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0]["PersonId"], json!("933"));
        // Repeated tags collapse into an array, single ones stay objects.
        assert!(records[0]["Orderline"].is_array());
        assert_eq!(records[0]["Orderline"][1]["asin"], json!("B001"));
        assert!(records[1]["Orderline"].is_object());
        assert_eq!(records[1]["Note"], json!(""));
    }

    #[test]
    fn single_record_is_still_a_list() {
        let root = parse_xml("<r><item><a>1</a></item></r>".as_bytes(), "x").unwrap();
        assert_eq!(flatten(&root).unwrap(), vec![json!({ "a": "1" })]);
    }

    #[test]
    fn root_with_two_groups_is_fatal() {
        let root = parse_xml("<r><a>1</a><b>2</b></r>".as_bytes(), "x").unwrap();
        let err = flatten(&root).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Schema);
        assert!(matches!(err, LoadError::AmbiguousXmlRoot { ref groups } if groups.len() == 2));
    }

    #[test]
    fn empty_root_has_no_records() {
        let root = parse_xml("<r></r>".as_bytes(), "x").unwrap();
        assert!(flatten(&root).unwrap().is_empty());
    }

    #[test]
    fn entities_are_unescaped() {
        let root = parse_xml("<r><t>a &amp; b</t></r>".as_bytes(), "x").unwrap();
        assert_eq!(root.children[0].text, "a & b");
    }

    #[test]
    fn unclosed_document_fails() {
        let err = parse_xml("<r><t>1</t>".as_bytes(), "x").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Format);
    }
}
