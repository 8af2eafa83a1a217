use anyhow::Result;

use crate::db::Store;
use crate::model::MenuKey;

/// Whether a freshly extracted menu item needs storing and a nutrition fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    New,
    AlreadyKnown,
}

/// Pure existence check on the identity key. Stored items are never merged or updated.
pub fn check(store: &Store, key: &MenuKey) -> Result<Verdict> {
    Ok(if store.menu_item_exists(key)? {
        Verdict::AlreadyKnown
    } else {
        Verdict::New
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::model::{Facility, MenuItem};

    #[test]
    fn known_only_after_insert() {
        let store = Store::in_memory().unwrap();
        let item = MenuItem {
            facility: Facility::Hillenbrand,
            station: "Deli".into(),
            item_name: "Turkey Club".into(),
            nutrition_link: None,
            dietary_tags: vec![],
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            observed_at: Utc::now(),
        };
        assert_eq!(check(&store, &item.key()).unwrap(), Verdict::New);
        store.insert_menu_item(&item).unwrap();
        assert_eq!(check(&store, &item.key()).unwrap(), Verdict::AlreadyKnown);

        let mut other_day = item.key();
        other_day.date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(check(&store, &other_day).unwrap(), Verdict::New);
    }
}
