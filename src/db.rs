use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{Facility, MenuItem, MenuKey, NutritionFact, NutritionField};

/// Outcome of an insert-if-absent on the menu store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Menu and nutrition stores in one SQLite database.
pub struct Store {
    conn: Connection,
    menu_table: String,
    nutrition_table: String,
}

impl Store {
    pub fn open(path: &Path, menu_table: &str, nutrition_table: &str) -> Result<Store> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Store::with_connection(conn, menu_table, nutrition_table)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Store> {
        Store::with_connection(Connection::open_in_memory()?, "menu_items", "nutrition_facts")
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn with_connection(conn: Connection, menu_table: &str, nutrition_table: &str) -> Result<Store> {
        for name in [menu_table, nutrition_table] {
            if !is_identifier(name) {
                bail!("Invalid table name: {:?}", name);
            }
        }
        let store = Store {
            conn,
            menu_table: menu_table.to_string(),
            nutrition_table: nutrition_table.to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let nutrition_cols: String = NutritionField::ALL
            .iter()
            .map(|f| format!("{} TEXT NOT NULL,\n", f.as_str()))
            .collect();
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {menu} (
                id             INTEGER PRIMARY KEY,
                facility       TEXT NOT NULL,
                station        TEXT NOT NULL,
                item_name      TEXT NOT NULL,
                nutrition_link TEXT,
                dietary_tags   TEXT NOT NULL DEFAULT '[]',
                date           TEXT NOT NULL,
                observed_at    TEXT NOT NULL,
                UNIQUE(facility, item_name, date)
            );
            CREATE INDEX IF NOT EXISTS idx_{menu}_date ON {menu}(date);

            CREATE TABLE IF NOT EXISTS {nutrition} (
                item_name    TEXT PRIMARY KEY,
                {nutrition_cols}
                ingredients  TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            ",
            menu = self.menu_table,
            nutrition = self.nutrition_table,
        ))?;
        Ok(())
    }

    // ── Menu items ──

    pub fn menu_item_exists(&self, key: &MenuKey) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE facility = ?1 AND item_name = ?2 AND date = ?3",
                    self.menu_table
                ),
                params![key.facility.as_str(), key.item_name, key.date.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert unless the (facility, item_name, date) key is already stored.
    /// The unique constraint decides; the first writer wins.
    pub fn insert_menu_item(&self, item: &MenuItem) -> Result<InsertOutcome> {
        let changed = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {}
                 (facility, station, item_name, nutrition_link, dietary_tags, date, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                self.menu_table
            ),
            params![
                item.facility.as_str(),
                item.station,
                item.item_name,
                item.nutrition_link,
                serde_json::to_string(&item.dietary_tags)?,
                item.date.to_string(),
                item.observed_at.to_rfc3339(),
            ],
        )?;
        Ok(if changed == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        })
    }

    #[cfg(test)]
    pub fn get_menu_item(&self, key: &MenuKey) -> Result<Option<MenuItem>> {
        let sql = format!(
            "SELECT facility, station, item_name, nutrition_link, dietary_tags, date, observed_at
             FROM {} WHERE facility = ?1 AND item_name = ?2 AND date = ?3",
            self.menu_table
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![key.facility.as_str(), key.item_name, key.date.to_string()],
                read_menu_row,
            )
            .optional()?;
        row.map(MenuRow::into_item).transpose()
    }

    pub fn fetch_menu_items(&self, limit: usize) -> Result<Vec<MenuItem>> {
        let sql = format!(
            "SELECT facility, station, item_name, nutrition_link, dietary_tags, date, observed_at
             FROM {} ORDER BY id LIMIT {}",
            self.menu_table, limit
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_menu_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(MenuRow::into_item).collect()
    }

    /// Menu item counts per facility for one date, largest first.
    pub fn count_by_facility(&self, date: NaiveDate) -> Result<Vec<(String, usize)>> {
        let sql = format!(
            "SELECT facility, COUNT(*) FROM {} WHERE date = ?1
             GROUP BY facility ORDER BY COUNT(*) DESC, facility",
            self.menu_table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![date.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Nutrition facts ──

    /// Insert or fully replace the fact stored under `item_name`.
    pub fn upsert_nutrition(&self, fact: &NutritionFact) -> Result<()> {
        let cols: Vec<&str> = NutritionField::ALL.iter().map(|f| f.as_str()).collect();
        let placeholders: Vec<String> = (1..=cols.len() + 3).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (item_name, {}, ingredients, last_updated) VALUES ({})",
            self.nutrition_table,
            cols.join(", "),
            placeholders.join(", "),
        );

        let mut values: Vec<String> = Vec::with_capacity(cols.len() + 3);
        values.push(fact.item_name.clone());
        values.extend(NutritionField::ALL.iter().map(|f| fact.get(*f).to_string()));
        values.push(fact.ingredients().to_string());
        values.push(fact.last_updated.to_rfc3339());

        self.conn
            .execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }

    #[cfg(test)]
    pub fn get_nutrition(&self, item_name: &str) -> Result<Option<NutritionFact>> {
        let sql = format!("{} WHERE item_name = ?1", self.nutrition_select());
        self.conn
            .query_row(&sql, params![item_name], read_nutrition_row)
            .optional()?
            .map(NutritionRow::into_fact)
            .transpose()
    }

    pub fn fetch_nutrition(&self, limit: usize) -> Result<Vec<NutritionFact>> {
        let sql = format!("{} ORDER BY item_name LIMIT {}", self.nutrition_select(), limit);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], read_nutrition_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(NutritionRow::into_fact).collect()
    }

    fn nutrition_select(&self) -> String {
        let cols: Vec<&str> = NutritionField::ALL.iter().map(|f| f.as_str()).collect();
        format!(
            "SELECT item_name, {}, ingredients, last_updated FROM {}",
            cols.join(", "),
            self.nutrition_table
        )
    }

    // ── Stats ──

    pub fn get_stats(&self) -> Result<Stats> {
        let count = |table: &str| -> Result<usize> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        };
        let menu_items = count(&self.menu_table)?;
        let nutrition_facts = count(&self.nutrition_table)?;
        let dates: usize = self.conn.query_row(
            &format!("SELECT COUNT(DISTINCT date) FROM {}", self.menu_table),
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            menu_items,
            nutrition_facts,
            dates,
        })
    }
}

pub struct Stats {
    pub menu_items: usize,
    pub nutrition_facts: usize,
    pub dates: usize,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Row mapping ──

struct MenuRow {
    facility: String,
    station: String,
    item_name: String,
    nutrition_link: Option<String>,
    dietary_tags: String,
    date: String,
    observed_at: String,
}

fn read_menu_row(row: &rusqlite::Row) -> rusqlite::Result<MenuRow> {
    Ok(MenuRow {
        facility: row.get(0)?,
        station: row.get(1)?,
        item_name: row.get(2)?,
        nutrition_link: row.get(3)?,
        dietary_tags: row.get(4)?,
        date: row.get(5)?,
        observed_at: row.get(6)?,
    })
}

impl MenuRow {
    fn into_item(self) -> Result<MenuItem> {
        let facility = Facility::from_name(&self.facility)
            .with_context(|| format!("Unknown facility {:?}", self.facility))?;
        Ok(MenuItem {
            facility,
            station: self.station,
            item_name: self.item_name,
            nutrition_link: self.nutrition_link,
            dietary_tags: serde_json::from_str(&self.dietary_tags)?,
            date: self.date.parse()?,
            observed_at: parse_timestamp(&self.observed_at)?,
        })
    }
}

struct NutritionRow {
    item_name: String,
    values: Vec<String>,
    ingredients: String,
    last_updated: String,
}

fn read_nutrition_row(row: &rusqlite::Row) -> rusqlite::Result<NutritionRow> {
    let n = NutritionField::ALL.len();
    let values = (1..=n)
        .map(|i| row.get(i))
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(NutritionRow {
        item_name: row.get(0)?,
        values,
        ingredients: row.get(n + 1)?,
        last_updated: row.get(n + 2)?,
    })
}

impl NutritionRow {
    fn into_fact(self) -> Result<NutritionFact> {
        let mut fact = NutritionFact::new(&self.item_name, parse_timestamp(&self.last_updated)?);
        for (field, value) in NutritionField::ALL.iter().zip(self.values) {
            fact.set(*field, value);
        }
        fact.ingredients = Some(self.ingredients);
        Ok(fact)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Bad timestamp {:?}", s))?
        .with_timezone(&Utc))
}
