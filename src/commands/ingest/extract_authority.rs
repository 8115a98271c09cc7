use crate::model::OrgFields;
use crate::xml::{Element, Ns};

// Absence of the contracting-body block means the document has no usable
// authority data.
pub(crate) fn extract_authority(root: &Element) -> Option<OrgFields> {
    let contracting_body = root.find(Ns::Ted, "ADDRESS_CONTRACTING_BODY")?;
    Some(flatten_org_fields(contracting_body))
}

// COUNTRY contributes its VALUE attribute and NUTS its CODE attribute;
// every other element contributes its trimmed text. Shared by the
// contracting-body and contractor blocks.
pub(crate) fn flatten_org_fields(block: &Element) -> OrgFields {
    let mut fields = OrgFields::new();

    for element in block.descendants() {
        match element.local_name.as_str() {
            "COUNTRY" => {
                if let Some(value) = element.attribute("VALUE") {
                    fields.insert("COUNTRY".to_string(), value.trim().to_string());
                }
            }
            "NUTS" => {
                if let Some(code) = element.attribute("CODE") {
                    fields.insert("NUTS".to_string(), code.trim().to_string());
                }
            }
            name => {
                fields.insert(name.to_string(), element.text().to_string());
            }
        }
    }

    fields
}
