use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::element_text;
use crate::model::{Facility, MenuItem, UNKNOWN};

static STATION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.station").unwrap());
static STATION_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.station-name").unwrap());
static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.station-item").unwrap());
static ITEM_NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.station-item-text").unwrap());
static DIETARY_ICON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img.station-item--icon__allergen").unwrap());

/// Items read from one facility/date page.
#[derive(Debug, Default)]
pub struct MenuPage {
    pub items: Vec<MenuItem>,
    /// Item entries dropped because they carried no name.
    pub skipped: usize,
}

impl MenuPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// True once the page has rendered at least one station.
pub fn has_stations(html: &str) -> bool {
    Html::parse_document(html).select(&STATION).next().is_some()
}

pub fn extract(html: &str, facility: Facility, date: NaiveDate, base: &Url) -> MenuPage {
    extract_at(html, facility, date, base, Utc::now())
}

pub fn extract_at(
    html: &str,
    facility: Facility,
    date: NaiveDate,
    base: &Url,
    observed_at: DateTime<Utc>,
) -> MenuPage {
    let doc = Html::parse_document(html);
    let mut page = MenuPage::default();

    for station in doc.select(&STATION) {
        let station_name = station
            .select(&STATION_NAME)
            .next()
            .map(element_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        for item in station.select(&ITEM) {
            match read_item(item, &station_name, facility, date, base, observed_at) {
                Some(menu_item) => page.items.push(menu_item),
                None => page.skipped += 1,
            }
        }
    }

    if page.skipped > 0 {
        debug!(
            "{} unnamed items skipped at {} on {}",
            page.skipped, facility, date
        );
    }
    page
}

fn read_item(
    item: ElementRef,
    station: &str,
    facility: Facility,
    date: NaiveDate,
    base: &Url,
    observed_at: DateTime<Utc>,
) -> Option<MenuItem> {
    let item_name = item
        .select(&ITEM_NAME)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())?;

    let nutrition_link = item
        .value()
        .attr("href")
        .and_then(|href| base.join(href.trim()).ok())
        .map(String::from);

    let dietary_tags = item
        .select(&DIETARY_ICON)
        .filter_map(|icon| icon.value().attr("alt"))
        .map(|alt| alt.trim().to_string())
        .filter(|alt| !alt.is_empty())
        .collect();

    Some(MenuItem {
        facility,
        station: station.to_string(),
        item_name,
        nutrition_link,
        dietary_tags,
        date,
        observed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://dining.purdue.edu").unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn earhart_lunch_items() {
        let page = extract(&fixture("menu_earhart_lunch"), Facility::Earhart, date(), &base());
        assert_eq!(page.items.len(), 4);
        assert_eq!(page.skipped, 1);

        let chicken = &page.items[0];
        assert_eq!(chicken.item_name, "Grilled Chicken");
        assert_eq!(chicken.station, "Grill");
        assert_eq!(chicken.facility, Facility::Earhart);
        assert_eq!(chicken.date, date());
        assert_eq!(
            chicken.nutrition_link.as_deref(),
            Some("https://dining.purdue.edu/menus/item/grilled-chicken")
        );
        assert_eq!(chicken.dietary_tags, vec!["Soy", "Gluten"]);
    }

    #[test]
    fn items_keep_page_order_across_stations() {
        let page = extract(&fixture("menu_earhart_lunch"), Facility::Earhart, date(), &base());
        let names: Vec<&str> = page.items.iter().map(|i| i.item_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Grilled Chicken", "Cheeseburger", "Garden Salad", "Tomato Soup"]
        );
        assert_eq!(page.items[2].station, "Salad Bar");
    }

    #[test]
    fn no_icons_means_no_tags() {
        let page = extract(&fixture("menu_earhart_lunch"), Facility::Earhart, date(), &base());
        let salad = page.items.iter().find(|i| i.item_name == "Garden Salad").unwrap();
        assert!(salad.dietary_tags.is_empty());
    }

    #[test]
    fn missing_href_leaves_no_link() {
        let page = extract(&fixture("menu_earhart_lunch"), Facility::Earhart, date(), &base());
        let soup = page.items.iter().find(|i| i.item_name == "Tomato Soup").unwrap();
        assert_eq!(soup.nutrition_link, None);
        assert_eq!(soup.station, UNKNOWN);
    }

    #[test]
    fn page_without_stations_is_empty() {
        let html = "<html><head><title>Menus</title></head><body><p>Closed</p></body></html>";
        let page = extract(html, Facility::Ford, date(), &base());
        assert!(page.is_empty());
        assert_eq!(page.skipped, 0);
        assert!(!has_stations(html));
        assert!(has_stations(&fixture("menu_earhart_lunch")));
    }
}
