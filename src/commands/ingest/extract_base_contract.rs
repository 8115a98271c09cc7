use crate::model::BaseContractData;
use crate::util::parse_publish_date;
use crate::xml::{Element, Ns};

// Any required header element that is absent makes the whole extractor
// return None, which rejects the document.
pub(crate) fn extract_base_contract(root: &Element) -> Option<BaseContractData> {
    let date_published = parse_publish_date(root.find(Ns::Ted, "DATE_PUB")?.text())?;
    let short_title = english_short_title(root)?;

    let coded_data = root.find(Ns::Ted, "CODED_DATA_SECTION")?;
    let notice_data = coded_data.find(Ns::Ted, "NOTICE_DATA")?;
    let uri_list = notice_data.find(Ns::Ted, "URI_LIST")?;
    let uri_doc = uri_list.find(Ns::Ted, "URI_DOC")?;

    let original_codes = notice_data
        .find_all(Ns::Ted, "ORIGINAL_CPV")
        .into_iter()
        .filter_map(code_reference)
        .collect();

    let codif_data = coded_data.find(Ns::Ted, "CODIF_DATA")?;
    let contract_nature = codif_data
        .find(Ns::Ted, "NC_CONTRACT_NATURE")?
        .text()
        .to_string();

    Some(BaseContractData {
        date_published,
        short_title,
        uri_original: uri_doc.text().to_string(),
        uri_english: english_document_uri(uri_doc),
        original_codes,
        contract_nature,
    })
}

fn english_short_title(root: &Element) -> Option<String> {
    let variant = root
        .find_all(Ns::Ted, "ML_TI_DOC")
        .into_iter()
        .find(|title| title.attribute("LG") == Some("EN"))?;

    let text = variant.find(Ns::Ted, "TI_TEXT")?;
    let paragraph = text.find(Ns::Ted, "P")?;
    Some(paragraph.text().to_string())
}

// The stored URI embeds the publication language code.
fn english_document_uri(uri_doc: &Element) -> String {
    let text = uri_doc.text();
    match uri_doc.attribute("LG") {
        Some(lang) if lang != "EN" => text.replace(lang, "EN"),
        _ => text.to_string(),
    }
}

fn code_reference(element: &Element) -> Option<String> {
    let code = element.attribute("CODE")?;
    Some(format!("{} - {}", code, element.text()))
}
