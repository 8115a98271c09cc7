use std::collections::{BTreeMap, HashMap};

use crate::model::WinnerEntry;
use crate::util::normalize_lot_code;
use crate::xml::{Element, Ns};

use super::extract_award::{DEFAULT_LOT_KEY, winner_entries};

pub(crate) struct MatchedItem<'a> {
    pub lot_no: String,
    pub description: &'a Element,
    pub winners: Vec<WinnerEntry>,
}

// An undivided object maps to the synthetic default key; a divided one keys
// each description by its normalized lot code.
pub(crate) fn object_items_by_lot<'a>(
    lot_division: bool,
    descriptions: &[&'a Element],
) -> BTreeMap<String, &'a Element> {
    let mut by_lot = BTreeMap::new();

    for description in descriptions {
        let key = if lot_division {
            description
                .find(Ns::Ted, "LOT_NO")
                .map(|lot_no| normalize_lot_code(lot_no.text()))
                .unwrap_or_else(|| DEFAULT_LOT_KEY.to_string())
        } else {
            DEFAULT_LOT_KEY.to_string()
        };
        by_lot.insert(key, *description);
    }

    by_lot
}

// Exact string equality on the lot key, no fuzzy matching. A key with no
// award on the other side yields an empty winner list; the object extractor
// drops those items.
pub(crate) fn join_items_with_awards<'a>(
    items_by_lot: &BTreeMap<String, &'a Element>,
    awards_by_lot: &HashMap<String, Vec<&'a Element>>,
) -> Vec<MatchedItem<'a>> {
    let mut matched = Vec::new();

    for (lot_no, description) in items_by_lot {
        let mut winners = Vec::new();
        if let Some(awards) = awards_by_lot.get(lot_no) {
            for award in awards {
                winners.extend(winner_entries(award));
            }
        }

        matched.push(MatchedItem {
            lot_no: lot_no.clone(),
            description,
            winners,
        });
    }

    matched
}
