mod crawler;
mod db;
mod dedup;
mod model;
mod parser;
mod settings;
mod source;

use std::time::Instant;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;

use db::Store;
use settings::{Backend, Settings};
use source::{HttpPageSource, SpiderPageSource};

#[derive(Parser)]
#[command(name = "dining_scraper", about = "Dining menu and nutrition crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every facility and meal period for the coming days
    Run {
        /// Number of days starting today (default: DINING_DAYS or 7)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Menu item counts per facility for one date
    Stats {
        /// Date as YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Print a few stored menu items and nutrition facts
    Sample {
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let store = Store::open(
        &settings.db_path,
        &settings.menu_table,
        &settings.nutrition_table,
    )?;

    let result = match cli.command {
        Commands::Run { days } => {
            let base = Url::parse(&settings.base_url)
                .with_context(|| format!("Invalid base URL {:?}", settings.base_url))?;
            let days = days.unwrap_or(settings.days);
            let units = crawler::enumerate_units(Local::now().date_naive(), days);
            info!(backend = ?settings.backend, days, units = units.len(), "Starting crawl");
            println!("Crawling {} units over {} days...", units.len(), days);

            let readiness = settings.readiness();
            let report = match settings.backend {
                Backend::Spider => {
                    let source = SpiderPageSource::from_env()?;
                    crawler::run_crawl(source, &store, base, readiness, &units).await
                }
                Backend::Http => {
                    let timeout = std::time::Duration::from_secs(settings.request_timeout_secs);
                    let source = HttpPageSource::new(timeout)?;
                    crawler::run_crawl(source, &store, base, readiness, &units).await
                }
            };
            report.print();
            Ok(())
        }
        Commands::Stats { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let counts = store.count_by_facility(date)?;
            let total: usize = counts.iter().map(|(_, n)| n).sum();
            println!("Menu items for {}: {}", date, total);
            for (facility, n) in &counts {
                println!("  {:<12} {:>5}", facility, n);
            }
            let s = store.get_stats()?;
            println!("Stored menu items: {} across {} dates", s.menu_items, s.dates);
            println!("Stored nutrition facts: {}", s.nutrition_facts);
            Ok(())
        }
        Commands::Sample { limit } => {
            print_sample(&store, limit)?;
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_sample(store: &Store, limit: usize) -> anyhow::Result<()> {
    use model::{parse_nutrition_value, NutritionField};

    println!("Sample menu items:");
    for item in store.fetch_menu_items(limit)? {
        println!(
            "  {} | {} | {} | {} | {}",
            item.date,
            item.facility,
            item.station,
            item.item_name,
            item.dietary_tags.join(", ")
        );
    }

    println!("\nSample nutrition facts:");
    let facts = store.fetch_nutrition(limit)?;
    for f in &facts {
        println!(
            "  {} | {} cal | serving {} | fat {} | protein {} | {}",
            f.item_name,
            f.get(NutritionField::Calories),
            f.get(NutritionField::ServingSize),
            f.get(NutritionField::TotalFat),
            f.get(NutritionField::Protein),
            truncate(f.ingredients(), 60),
        );
    }
    let calories: f64 = facts
        .iter()
        .map(|f| parse_nutrition_value(f.get(NutritionField::Calories)))
        .sum();
    if !facts.is_empty() {
        println!("  avg calories: {:.0}", calories / facts.len() as f64);
    }
    Ok(())
}

/// Cut ingredient lists to `max` characters for one-line output.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, _) => format!("{:.1}s", d.as_secs_f64()),
        (0, m, s) => format!("{}m {:02}s", m, s),
        (h, m, s) => format!("{}h {:02}m {:02}s", h, m, s),
    }
}
