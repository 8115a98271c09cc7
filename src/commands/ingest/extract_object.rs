use crate::model::{ObjectData, ObjectItem};
use crate::xml::{Element, Ns};

use super::extract_award::{award_records_by_lot, monetary_from_element};
use super::reconcile::{self, MatchedItem};

// Items that attract no winner are dropped here; the driver rejects the
// document if none survive.
pub(crate) fn extract_object(root: &Element) -> Option<ObjectData> {
    let object_contract = root.find(Ns::Ted, "OBJECT_CONTRACT")?;

    let main_code = object_contract
        .find(Ns::Ted, "CPV_MAIN")?
        .find(Ns::Ted, "CPV_CODE")?
        .attribute("CODE")?
        .to_string();
    let contract_type = object_contract
        .find(Ns::Ted, "TYPE_CONTRACT")
        .and_then(|el| el.attribute("CTYPE"))
        .map(ToOwned::to_owned);
    let lot_division = object_contract.exists(Ns::Ted, "LOT_DIVISION");

    let total = object_contract
        .find(Ns::Ted, "VAL_TOTAL")
        .map(monetary_from_element)
        .unwrap_or_default();

    let descriptions = object_contract.find_all(Ns::Ted, "OBJECT_DESCR");
    let items_by_lot = reconcile::object_items_by_lot(lot_division, &descriptions);
    let awards_by_lot = award_records_by_lot(root);

    let items = reconcile::join_items_with_awards(&items_by_lot, &awards_by_lot)
        .into_iter()
        .filter(|matched| !matched.winners.is_empty())
        .map(build_item)
        .collect();

    Some(ObjectData {
        title: element_title(object_contract),
        main_code,
        contract_type,
        short_descr: element_short_description(object_contract),
        lot_division,
        total,
        items,
    })
}

fn build_item(matched: MatchedItem<'_>) -> ObjectItem {
    let description = matched.description;

    // The item's own value mirrors the first award matched to its lot.
    let value = matched
        .winners
        .first()
        .map(|winner| winner.value.clone())
        .unwrap_or_default();

    ObjectItem {
        lot_no: matched.lot_no,
        title: element_title(description),
        nuts_code: description
            .find(Ns::Nuts, "NUTS")
            .and_then(|nuts| nuts.attribute("CODE"))
            .map(|code| code.trim().to_string()),
        short_descr: element_short_description(description),
        additional_codes: additional_codes(description),
        value,
        winners: matched.winners,
    }
}

fn additional_codes(description: &Element) -> Vec<String> {
    description
        .find_all(Ns::Ted, "CPV_ADDITIONAL")
        .into_iter()
        .filter_map(|cpv| cpv.find(Ns::Ted, "CPV_CODE"))
        .filter_map(|code| code.attribute("CODE"))
        .map(ToOwned::to_owned)
        .collect()
}

pub(crate) fn element_title(parent: &Element) -> Option<String> {
    let title = parent.find(Ns::Ted, "TITLE")?;
    let paragraph = title.find(Ns::Ted, "P")?;
    Some(paragraph.text().to_string())
}

pub(crate) fn element_short_description(parent: &Element) -> Option<String> {
    let block = parent.find(Ns::Ted, "SHORT_DESCR")?;
    let paragraphs = block.find_all(Ns::Ted, "P");
    Some(
        paragraphs
            .iter()
            .map(|paragraph| paragraph.text())
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
