// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::env;
use std::fs;
use std::path::Path;

use fin_insight::{
    benchmark_view, dashboard_view, db, ingest_upload, init_tracing, kpi_view, metric_cards,
    resolve_context, seed, AppConfig, CompanyContext, MetricName, NewKpi, SnapshotCache,
};

fn main() -> Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("ui");

    match command {
        "import" => run_import(&config, &args[2..])?,
        "metrics" => run_metrics(&config)?,
        "benchmark" => run_benchmark(&config)?,
        "kpis" => run_kpis(&config, &args[2..])?,
        "uploads" => run_uploads(&config)?,
        "seed" => run_seed(&config)?,
        "ui" => run_ui_mode(&config)?,
        other => {
            eprintln!("❌ Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!("Usage: fin-insight [command]");
    eprintln!("  import <file.csv>                         Upload an income statement or balance sheet");
    eprintln!("  metrics                                   Latest period metrics");
    eprintln!("  benchmark                                 Compare against the sector");
    eprintln!("  kpis [add <metric> <target> <YYYY-MM-DD> [description] | remove <id>]");
    eprintln!("  uploads                                   Upload history");
    eprintln!("  seed                                      Sectors, benchmarks and a demo company");
    eprintln!("  (no command)                              Interactive dashboard");
}

fn open_database(config: &AppConfig) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    db::setup_database(&conn)?;
    Ok(conn)
}

fn require_context(config: &AppConfig, conn: &Connection) -> Result<CompanyContext> {
    let Some(client_id) = config.client_id else {
        eprintln!("❌ No client configured!");
        eprintln!("   Set FIN_INSIGHT_CLIENT (or add it to .env)");
        std::process::exit(1);
    };

    resolve_context(conn, client_id)
}

fn rule() {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

fn run_import(config: &AppConfig, args: &[String]) -> Result<()> {
    let Some(csv_arg) = args.first() else {
        print_usage();
        std::process::exit(2);
    };

    println!("📥 Statement Import - CSV → SQLite");
    rule();

    let csv_path = Path::new(csv_arg);
    let filename = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| csv_arg.clone());

    println!("\n📂 Reading {}...", csv_path.display());
    let text = fs::read_to_string(csv_path)
        .with_context(|| format!("Failed to read {}", csv_path.display()))?;

    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;
    let cache = SnapshotCache::new();

    println!("\n🔍 Classifying and storing...");
    match ingest_upload(&conn, &cache, &ctx, &filename, &text) {
        Ok(outcome) => {
            println!("✓ Detected {}", outcome.kind.name());
            println!("✓ Stored {} period(s) (upload #{})", outcome.rows, outcome.upload_id);
            rule();
            println!("✅ Import complete for {}", ctx.company_name);
            Ok(())
        }
        Err(err) => {
            rule();
            println!("❌ Upload rejected: {}", err);
            Err(err)
        }
    }
}

fn run_metrics(config: &AppConfig) -> Result<()> {
    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;
    let cache = SnapshotCache::new();

    println!("📊 Financial Metrics - {}", ctx.company_name);
    rule();

    let Some(metrics) = dashboard_view(&conn, &cache, &ctx)? else {
        println!("No income statement yet. Run: fin-insight import <file.csv>");
        return Ok(());
    };

    for card in metric_cards(&metrics) {
        println!("{:<22} {:>12}  {}", card.title, card.value, card.change);
    }

    println!();
    for name in MetricName::ALL {
        println!("{:<34} {:>12}", name.label(), name.format_value(metrics.get(name)));
    }

    Ok(())
}

fn run_benchmark(config: &AppConfig) -> Result<()> {
    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;
    let cache = SnapshotCache::new();

    println!("🏁 Benchmark Comparison - {} (sector #{})", ctx.company_name, ctx.sector_id);
    rule();

    let rows = benchmark_view(&conn, &cache, &ctx)?;
    if rows.is_empty() {
        println!("Upload both an income statement and a balance sheet to compare.");
        return Ok(());
    }

    println!("{:<24} {:>10} {:>10} {:>10}  Status", "Metric", "You", "Industry", "Diff");
    for row in rows {
        let marker = if row.status == fin_insight::Status::Above { "✅" } else { "⚠️ " };
        println!(
            "{:<24} {:>10} {:>10} {:>10}  {} {}",
            row.label,
            row.your_value,
            row.industry_average,
            row.difference,
            marker,
            row.status.as_str()
        );
    }

    Ok(())
}

fn run_kpis(config: &AppConfig, args: &[String]) -> Result<()> {
    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;

    match args.first().map(String::as_str) {
        Some("add") => {
            let new = NewKpi {
                metric_name: args.get(1).cloned().unwrap_or_default(),
                target_value: args.get(2).and_then(|v| v.parse().ok()),
                target_date: args.get(3).cloned().unwrap_or_default(),
                description: args.get(4..).map(|rest| rest.join(" ")).unwrap_or_default(),
            };
            let kpi = fin_insight::add_kpi(&conn, &ctx, &new)?;
            println!("✓ Added KPI #{} ({})", kpi.kpi_id, kpi.metric_name.label());
            return Ok(());
        }
        Some("remove") => {
            let kpi_id: i64 = args
                .get(1)
                .and_then(|v| v.parse().ok())
                .context("kpis remove needs a numeric KPI id")?;
            if fin_insight::remove_kpi(&conn, &ctx, kpi_id)? {
                println!("✓ Removed KPI #{}", kpi_id);
            } else {
                println!("❌ KPI #{} not found", kpi_id);
            }
            return Ok(());
        }
        _ => {}
    }

    let cache = SnapshotCache::new();
    let view = kpi_view(&conn, &cache, &ctx, None)?;

    println!("🎯 KPIs - {}", ctx.company_name);
    rule();

    if view.is_empty() {
        println!("No KPIs yet. Run: fin-insight kpis add profit_margin 20 2025-12-31");
        return Ok(());
    }

    for item in view {
        println!(
            "#{:<4} {:<34} {:>10} / {:<10} {:>6.1}%  by {}  {}",
            item.kpi.kpi_id,
            item.label,
            item.display_value,
            item.display_target,
            item.progress,
            item.kpi.target_date,
            item.status.as_str()
        );
        if !item.kpi.description.is_empty() {
            println!("      {}", item.kpi.description);
        }
    }

    Ok(())
}

fn run_uploads(config: &AppConfig) -> Result<()> {
    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;

    println!("🗂️  Upload History - {}", ctx.company_name);
    rule();

    let uploads = db::list_uploads(&conn, ctx.company_id)?;
    if uploads.is_empty() {
        println!("No uploads yet.");
    }

    for upload in uploads {
        println!(
            "#{:<4} {:<30} {:<11} {:<17} {:>4} rows  {}",
            upload.upload_id,
            upload.filename,
            upload.status.as_str(),
            upload.statement_kind.as_deref().unwrap_or("-"),
            upload.row_count,
            upload.uploaded_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(message) = upload.error_message {
            println!("      ❌ {}", message);
        }
    }

    Ok(())
}

fn run_seed(config: &AppConfig) -> Result<()> {
    println!("🌱 Seeding {}", config.db_path.display());
    rule();

    let conn = open_database(config)?;
    let summary = seed::seed_reference_data(&conn)?;
    println!("✓ {} sector(s), {} benchmark row(s) added", summary.sectors, summary.benchmarks);

    match config.client_id {
        Some(client_id) => {
            let ctx = seed::seed_demo_company(&conn, client_id)?;
            println!("✓ Demo company \"{}\" ready for client {}", ctx.company_name, client_id);
        }
        None => println!("ℹ️  Set FIN_INSIGHT_CLIENT to also seed a demo company"),
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig) -> Result<()> {
    println!("🖥️  Loading Fin Insight dashboard...\n");

    if !config.db_path.exists() {
        eprintln!("❌ Database not found!");
        eprintln!("   Run: fin-insight seed");
        eprintln!("   then import statements with: fin-insight import <file.csv>");
        std::process::exit(1);
    }

    let conn = open_database(config)?;
    let ctx = require_context(config, &conn)?;

    let mut app = ui::App::load(&conn, ctx)?;
    println!("Starting UI... (Press 'q' to quit)\n");
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin fin-server --features server");
    std::process::exit(1);
}
