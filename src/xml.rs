use anyhow::{Context, Result, bail};
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

/// Namespaces registered for the award-notice schema.
#[allow(dead_code)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Ns {
    Ted,
    Nuts,
    EformsAggregate,
    EformsBasic,
    EformsExt,
    UblExt,
}

impl Ns {
    pub fn uri(self) -> &'static str {
        match self {
            Self::Ted => "http://publications.europa.eu/resource/schema/ted/R2.0.9/publication",
            Self::Nuts => "http://publications.europa.eu/resource/schema/ted/2021/nuts",
            Self::EformsAggregate => {
                "http://data.europa.eu/p27/eforms-ubl-extension-aggregate-components/1"
            }
            Self::EformsBasic => {
                "http://data.europa.eu/p27/eforms-ubl-extension-basic-components/1"
            }
            Self::EformsExt => "http://data.europa.eu/p27/eforms-ubl-extensions/1",
            Self::UblExt => {
                "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2"
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub namespace: Option<String>,
    pub local_name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn matches(&self, ns: Ns, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(ns.uri())
    }

    // First matching descendant in document order, excluding self.
    pub fn find(&self, ns: Ns, local_name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.matches(ns, local_name) {
                return Some(child);
            }
            if let Some(found) = child.find(ns, local_name) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_all<'a>(&'a self, ns: Ns, local_name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_matches(ns, local_name, &mut found);
        found
    }

    fn collect_matches<'a>(&'a self, ns: Ns, local_name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.matches(ns, local_name) {
                found.push(child);
            }
            child.collect_matches(ns, local_name, found);
        }
    }

    pub fn exists(&self, ns: Ns, local_name: &str) -> bool {
        self.find(ns, local_name).is_some()
    }

    pub fn descendants(&self) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(&mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            found.push(child);
            child.collect_descendants(found);
        }
    }
}

// Elements carry their resolved namespace URI, so lookups do not depend on
// the prefixes a document happens to bind.
pub fn parse_document(raw: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((resolve, Event::Start(start))) => {
                let element = open_element(&resolve, &start)
                    .context("failed to read element attributes")?;
                stack.push(element);
            }
            Ok((resolve, Event::Empty(start))) => {
                let element = open_element(&resolve, &start)
                    .context("failed to read element attributes")?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::Text(text))) => {
                if let Some(open) = stack.last_mut() {
                    let value = text.unescape().context("failed to unescape text node")?;
                    open.text.push_str(&value);
                }
            }
            Ok((_, Event::CData(data))) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok((_, Event::End(_))) => {
                let Some(element) = stack.pop() else {
                    bail!("unbalanced closing tag in document");
                };
                attach(&mut stack, &mut root, element)?;
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(err) => return Err(err).context("malformed xml document"),
        }
    }

    if !stack.is_empty() {
        bail!("document ended with unclosed elements");
    }

    root.context("document contains no root element")
}

fn open_element(
    resolve: &ResolveResult<'_>,
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Element> {
    let namespace = match resolve {
        ResolveResult::Bound(Namespace(uri)) => {
            Some(String::from_utf8_lossy(uri).into_owned())
        }
        _ => None,
    };
    let local_name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.context("invalid attribute")?;
        if attribute.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .context("failed to unescape attribute value")?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        local_name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        bail!("document contains more than one root element");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TED_EXPORT xmlns="http://publications.europa.eu/resource/schema/ted/R2.0.9/publication"
            xmlns:n2021="http://publications.europa.eu/resource/schema/ted/2021/nuts">
  <SECTION>
    <TITLE><P>Road maintenance</P></TITLE>
    <n2021:NUTS CODE="SE110"/>
    <VAL_TOTAL CURRENCY="EUR">123.45</VAL_TOTAL>
  </SECTION>
  <SECTION>
    <TITLE><P>Second section</P></TITLE>
  </SECTION>
</TED_EXPORT>"#;

    #[test]
    fn find_returns_first_descendant_in_document_order() {
        let root = parse_document(SAMPLE).unwrap();

        let title = root.find(Ns::Ted, "TITLE").unwrap();
        let paragraph = title.find(Ns::Ted, "P").unwrap();
        assert_eq!(paragraph.text(), "Road maintenance");
    }

    #[test]
    fn find_all_collects_every_match() {
        let root = parse_document(SAMPLE).unwrap();

        let sections = root.find_all(Ns::Ted, "SECTION");
        assert_eq!(sections.len(), 2);

        let titles = root.find_all(Ns::Ted, "TITLE");
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn lookups_are_namespace_qualified() {
        let root = parse_document(SAMPLE).unwrap();

        assert!(root.exists(Ns::Nuts, "NUTS"));
        assert!(!root.exists(Ns::Ted, "NUTS"));

        let nuts = root.find(Ns::Nuts, "NUTS").unwrap();
        assert_eq!(nuts.attribute("CODE"), Some("SE110"));
    }

    #[test]
    fn absent_lookup_is_none_not_error() {
        let root = parse_document(SAMPLE).unwrap();
        assert!(root.find(Ns::Ted, "NO_SUCH_ELEMENT").is_none());
    }

    #[test]
    fn attributes_and_text_are_exposed() {
        let root = parse_document(SAMPLE).unwrap();

        let total = root.find(Ns::Ted, "VAL_TOTAL").unwrap();
        assert_eq!(total.attribute("CURRENCY"), Some("EUR"));
        assert_eq!(total.text(), "123.45");
        assert_eq!(total.attribute("MISSING"), None);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(parse_document("<A><B></A>").is_err());
        assert!(parse_document("").is_err());
    }
}
