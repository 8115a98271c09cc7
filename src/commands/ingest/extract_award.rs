use std::collections::HashMap;

use crate::model::{MonetaryValue, WinnerEntry};
use crate::money::to_reference_currency;
use crate::util::normalize_official_name;
use crate::xml::{Element, Ns};

use super::extract_authority::flatten_org_fields;

// Lot key recorded for undivided objects and for award records that carry
// no lot number.
pub(crate) const DEFAULT_LOT_KEY: &str = "0";

// Records flagged as not awarded are dropped here.
pub(crate) fn award_records_by_lot(root: &Element) -> HashMap<String, Vec<&Element>> {
    let mut by_lot: HashMap<String, Vec<&Element>> = HashMap::new();

    for award in root.find_all(Ns::Ted, "AWARD_CONTRACT") {
        if award.exists(Ns::Ted, "NO_AWARDED_CONTRACT") {
            continue;
        }
        for lot in declared_lot_keys(award) {
            by_lot.entry(lot).or_default().push(award);
        }
    }

    by_lot
}

fn declared_lot_keys(award: &Element) -> Vec<String> {
    match award.find(Ns::Ted, "LOT_NO") {
        Some(lot_no) => lot_no.text().split(',').map(ToOwned::to_owned).collect(),
        None => vec![DEFAULT_LOT_KEY.to_string()],
    }
}

// One winner entry per resolvable contractor on the record; the award value
// is resolved once and shared by every contractor.
pub(crate) fn winner_entries(award: &Element) -> Vec<WinnerEntry> {
    let Some(awarded) = award.find(Ns::Ted, "AWARDED_CONTRACT") else {
        return Vec::new();
    };
    let Some(contractors) = awarded.find(Ns::Ted, "CONTRACTORS") else {
        return Vec::new();
    };

    let value = resolve_award_value(award);
    let mut entries = Vec::new();

    for contractor in contractors.find_all(Ns::Ted, "CONTRACTOR") {
        let Some(address) = contractor.find(Ns::Ted, "ADDRESS_CONTRACTOR") else {
            continue;
        };

        let fields = flatten_org_fields(address);
        let resolvable = fields
            .get("OFFICIALNAME")
            .is_some_and(|name| !normalize_official_name(name).is_empty());
        if !resolvable {
            continue;
        }

        entries.push(WinnerEntry {
            fields,
            value: value.clone(),
        });
    }

    entries
}

// Strict priority: stated total, then estimated total, then the low bound
// of a range. No representation at all resolves to zero with an absent
// currency.
pub(crate) fn resolve_award_value(award: &Element) -> MonetaryValue {
    let Some(values) = award.find(Ns::Ted, "VALUES") else {
        return MonetaryValue::default();
    };

    if let Some(total) = values.find(Ns::Ted, "VAL_TOTAL") {
        return monetary_from_element(total);
    }
    if let Some(estimated) = values.find(Ns::Ted, "VAL_ESTIMATED_TOTAL") {
        return monetary_from_element(estimated);
    }
    if let Some(range) = values.find(Ns::Ted, "VAL_RANGE_TOTAL") {
        let amount = range
            .find(Ns::Ted, "LOW")
            .and_then(|low| low.text().parse::<f64>().ok())
            .unwrap_or(0.0);
        return monetary_value(amount, range.attribute("CURRENCY"));
    }

    MonetaryValue::default()
}

pub(crate) fn monetary_from_element(element: &Element) -> MonetaryValue {
    let amount = element.text().parse::<f64>().unwrap_or(0.0);
    monetary_value(amount, element.attribute("CURRENCY"))
}

pub(crate) fn monetary_value(amount: f64, currency: Option<&str>) -> MonetaryValue {
    let reference_amount = match currency {
        Some(code) => to_reference_currency(code, amount),
        None => amount,
    };

    MonetaryValue {
        amount,
        currency: currency.map(ToOwned::to_owned),
        reference_amount,
    }
}
