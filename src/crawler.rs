use std::fmt;

use chrono::{Days, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::db::{InsertOutcome, Store};
use crate::dedup::{self, Verdict};
use crate::model::{Facility, MealPeriod, MenuItem};
use crate::parser::{menu, nutrition};
use crate::source::{fetch_when_ready, FetchError, Page, PageSource, Readiness};

/// One (facility, meal period, date) page to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlUnit {
    pub facility: Facility,
    pub period: MealPeriod,
    pub date: NaiveDate,
}

impl CrawlUnit {
    pub fn url(&self, base: &Url) -> String {
        format!(
            "{}/menus/{}/{}/{}",
            base.as_str().trim_end_matches('/'),
            self.facility,
            self.date.format("%Y/%m/%d"),
            self.period.path_segment()
        )
    }
}

impl fmt::Display for CrawlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} on {}", self.facility, self.period, self.date)
    }
}

/// `days` consecutive dates from `start`, crossed with every facility and meal period.
pub fn enumerate_units(start: NaiveDate, days: u32) -> Vec<CrawlUnit> {
    (0..days)
        .filter_map(|i| start.checked_add_days(Days::new(i as u64)))
        .flat_map(|date| {
            Facility::ALL.into_iter().flat_map(move |facility| {
                MealPeriod::ALL
                    .into_iter()
                    .map(move |period| CrawlUnit { facility, period, date })
            })
        })
        .collect()
}

/// Failure of one unit or one item. Never ends the run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("detail page not found: {0}")]
    DetailNotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Default)]
pub struct CrawlReport {
    pub units: usize,
    pub not_found: Vec<CrawlUnit>,
    pub empty: Vec<CrawlUnit>,
    pub failed: Vec<(CrawlUnit, String)>,
    pub new_items: usize,
    pub existing_items: usize,
    pub unnamed_items: usize,
    pub nutrition_saved: usize,
    pub nutrition_failed: Vec<(String, String)>,
}

impl CrawlReport {
    /// Summary counts followed by one line per skipped or failed unit.
    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![
            format!(
                "Units: {} ({} not found, {} empty, {} failed)",
                self.units,
                self.not_found.len(),
                self.empty.len(),
                self.failed.len()
            ),
            format!(
                "Menu items: {} new, {} already stored, {} unnamed skipped",
                self.new_items, self.existing_items, self.unnamed_items
            ),
            format!(
                "Nutrition: {} saved, {} failed",
                self.nutrition_saved,
                self.nutrition_failed.len()
            ),
        ];
        out.extend(self.not_found.iter().map(|u| format!("  not found  {}", u)));
        out.extend(self.empty.iter().map(|u| format!("  empty      {}", u)));
        out.extend(
            self.failed
                .iter()
                .map(|(u, reason)| format!("  failed     {}: {}", u, reason)),
        );
        out.extend(
            self.nutrition_failed
                .iter()
                .map(|(item, reason)| format!("  no nutrition for {}: {}", item, reason)),
        );
        out
    }

    pub fn print(&self) {
        for line in self.lines() {
            println!("{}", line);
        }
    }
}

pub struct Crawler<'a, S: PageSource + ?Sized> {
    source: &'a S,
    store: &'a Store,
    base: Url,
    readiness: Readiness,
}

impl<'a, S: PageSource + ?Sized> Crawler<'a, S> {
    pub fn new(source: &'a S, store: &'a Store, base: Url, readiness: Readiness) -> Self {
        Crawler {
            source,
            store,
            base,
            readiness,
        }
    }

    /// Process units one at a time. A failing unit is logged and skipped.
    pub async fn run(&self, units: &[CrawlUnit]) -> CrawlReport {
        let pb = ProgressBar::new(units.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut report = CrawlReport {
            units: units.len(),
            ..Default::default()
        };

        for unit in units {
            pb.set_message(unit.to_string());
            match self.process_unit(unit, &mut report).await {
                Ok(UnitOutcome::NotFound) => {
                    info!("Skipping {} (not available)", unit);
                    report.not_found.push(*unit);
                }
                Ok(UnitOutcome::Empty) => {
                    info!("No items found for {}", unit);
                    report.empty.push(*unit);
                }
                Ok(UnitOutcome::Done { new, existing }) => {
                    info!("Collected {}: {} new, {} existing", unit, new, existing);
                }
                Err(e) => {
                    warn!("Error collecting {}: {}", unit, e);
                    report.failed.push((*unit, e.to_string()));
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        report
    }

    async fn process_unit(
        &self,
        unit: &CrawlUnit,
        report: &mut CrawlReport,
    ) -> Result<UnitOutcome, CrawlError> {
        let url = unit.url(&self.base);
        let page = fetch_when_ready(self.source, &url, menu::has_stations, self.readiness).await?;
        let Some(html) = page.html() else {
            return Ok(UnitOutcome::NotFound);
        };

        let menu_page = menu::extract(html, unit.facility, unit.date, &self.base);
        report.unnamed_items += menu_page.skipped;
        if menu_page.is_empty() {
            return Ok(UnitOutcome::Empty);
        }

        let (mut new, mut existing) = (0, 0);
        for item in &menu_page.items {
            if self.store_if_new(item)? {
                new += 1;
                report.new_items += 1;
                self.cross_reference(item, report).await;
            } else {
                existing += 1;
                report.existing_items += 1;
            }
        }
        Ok(UnitOutcome::Done { new, existing })
    }

    /// True when this call stored the item.
    fn store_if_new(&self, item: &MenuItem) -> Result<bool, CrawlError> {
        if dedup::check(self.store, &item.key())? == Verdict::AlreadyKnown {
            debug!(
                "Skipping existing item: {} at {} on {}",
                item.item_name, item.facility, item.date
            );
            return Ok(false);
        }
        match self.store.insert_menu_item(item)? {
            InsertOutcome::Inserted => {
                info!(
                    "Added new menu item: {} at {} on {}",
                    item.item_name, item.facility, item.date
                );
                Ok(true)
            }
            InsertOutcome::AlreadyExists => Ok(false),
        }
    }

    /// Fetch and store nutrition for a newly stored item. Failures stay per item.
    async fn cross_reference(&self, item: &MenuItem, report: &mut CrawlReport) {
        let Some(link) = item.nutrition_link.as_deref() else {
            return;
        };
        match self.fetch_nutrition(link, &item.item_name).await {
            Ok(()) => {
                debug!("Updated nutrition info for: {}", item.item_name);
                report.nutrition_saved += 1;
            }
            Err(e) => {
                warn!("Nutrition for {} failed: {}", item.item_name, e);
                report
                    .nutrition_failed
                    .push((item.item_name.clone(), e.to_string()));
            }
        }
    }

    async fn fetch_nutrition(&self, link: &str, item_name: &str) -> Result<(), CrawlError> {
        let page = fetch_when_ready(
            self.source,
            link,
            nutrition::has_nutrition_blocks,
            self.readiness,
        )
        .await?;
        let html = match &page {
            Page::Loaded { html, .. } => html,
            Page::NotFound => return Err(CrawlError::DetailNotFound(link.to_string())),
        };
        let fact = nutrition::extract(html, item_name);
        self.store.upsert_nutrition(&fact)?;
        Ok(())
    }
}

enum UnitOutcome {
    NotFound,
    Empty,
    Done { new: usize, existing: usize },
}

/// Run one full pass and close the page source whatever the outcome.
pub async fn run_crawl<S: PageSource>(
    source: S,
    store: &Store,
    base: Url,
    readiness: Readiness,
    units: &[CrawlUnit],
) -> CrawlReport {
    let report = Crawler::new(&source, store, base, readiness).run(units).await;
    if let Err(e) = source.close().await {
        warn!("Failed to close page source: {}", e);
    }
    report
}
