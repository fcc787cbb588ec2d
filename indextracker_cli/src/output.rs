use anyhow::Result;
use indextracker_lib::catalog::IndexDescriptor;
use indextracker_lib::summary::{HistogramBin, MarketSummary, RegionPerformance};
use indextracker_lib::{
    HistorySeries, IndexCatalog, QuoteRecord, SymbolUnavailable, TechnicalSnapshot,
};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

impl OutputFormat {
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "md" | "markdown" => OutputFormat::Markdown,
            _ => OutputFormat::Table,
        }
    }
}

#[derive(Tabled, Serialize)]
struct QuoteRow {
    #[tabled(rename = "Symbol")]
    #[serde(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "Region")]
    #[serde(rename = "Region")]
    region: String,
    #[tabled(rename = "Currency")]
    #[serde(rename = "Currency")]
    currency: String,
    #[tabled(rename = "Price")]
    #[serde(rename = "Price")]
    price: String,
    #[tabled(rename = "Change")]
    #[serde(rename = "Change")]
    change: String,
    #[tabled(rename = "Change %")]
    #[serde(rename = "Change %")]
    change_pct: String,
    #[tabled(rename = "Volume")]
    #[serde(rename = "Volume")]
    volume: String,
}

#[derive(Tabled, Serialize)]
struct HistoryRow {
    #[tabled(rename = "Symbol")]
    #[serde(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Date")]
    #[serde(rename = "Date")]
    date: String,
    #[tabled(rename = "Close")]
    #[serde(rename = "Close")]
    close: String,
    #[tabled(rename = "From Start %")]
    #[serde(rename = "From Start %")]
    normalized_pct: String,
}

#[derive(Tabled, Serialize)]
struct IndicatorRow {
    #[tabled(rename = "Symbol")]
    #[serde(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "SMA 20")]
    #[serde(rename = "SMA 20")]
    sma_20: String,
    #[tabled(rename = "SMA 50")]
    #[serde(rename = "SMA 50")]
    sma_50: String,
    #[tabled(rename = "SMA 200")]
    #[serde(rename = "SMA 200")]
    sma_200: String,
    #[tabled(rename = "RSI")]
    #[serde(rename = "RSI")]
    rsi: String,
}

#[derive(Tabled, Serialize)]
struct IndexRow {
    #[tabled(rename = "Symbol")]
    #[serde(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "Region")]
    #[serde(rename = "Region")]
    region: String,
    #[tabled(rename = "Currency")]
    #[serde(rename = "Currency")]
    currency: String,
    #[tabled(rename = "Group")]
    #[serde(rename = "Group")]
    group: String,
}

#[derive(Tabled, Serialize)]
struct OverviewRow {
    #[tabled(rename = "Metric")]
    #[serde(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize)]
struct RegionRow {
    #[tabled(rename = "Region")]
    #[serde(rename = "Region")]
    region: String,
    #[tabled(rename = "Indices")]
    #[serde(rename = "Indices")]
    count: usize,
    #[tabled(rename = "Avg Change %")]
    #[serde(rename = "Avg Change %")]
    mean_change_pct: String,
}

#[derive(Tabled, Serialize)]
struct BinRow {
    #[tabled(rename = "Range")]
    #[serde(rename = "Range")]
    range: String,
    #[tabled(rename = "Count")]
    #[serde(rename = "Count")]
    count: usize,
}

// -- Row builders --

fn build_quote_rows(records: &[QuoteRecord]) -> Vec<QuoteRow> {
    records
        .iter()
        .map(|r| QuoteRow {
            symbol: r.symbol.clone(),
            name: r.name.clone(),
            region: r.region.clone(),
            currency: r.currency.clone(),
            price: format_price(r.price),
            change: format_signed(r.change),
            change_pct: format_pct(r.change_pct),
            volume: format_volume(r.volume),
        })
        .collect()
}

fn build_history_rows(series: &[HistorySeries]) -> Vec<HistoryRow> {
    series
        .iter()
        .flat_map(|s| {
            s.points.iter().map(move |p| HistoryRow {
                symbol: s.symbol.clone(),
                date: p.date.to_string(),
                close: format_price(p.close),
                normalized_pct: format_pct(p.normalized_pct),
            })
        })
        .collect()
}

fn build_indicator_rows(snapshots: &[TechnicalSnapshot], catalog: &IndexCatalog) -> Vec<IndicatorRow> {
    snapshots
        .iter()
        .map(|t| IndicatorRow {
            symbol: t.symbol.clone(),
            name: catalog.describe(&t.symbol).name,
            sma_20: format_optional(t.sma_20),
            sma_50: format_optional(t.sma_50),
            sma_200: format_optional(t.sma_200),
            rsi: format_optional(t.rsi_14),
        })
        .collect()
}

fn build_index_rows(indices: &[&IndexDescriptor]) -> Vec<IndexRow> {
    indices
        .iter()
        .map(|i| IndexRow {
            symbol: i.symbol.clone(),
            name: i.name.clone(),
            region: i.region.clone(),
            currency: i.currency.clone(),
            group: serde_json::to_value(i.group)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
        })
        .collect()
}

fn build_overview_rows(summary: &MarketSummary) -> Vec<OverviewRow> {
    [
        ("Total Indices", summary.total.to_string()),
        ("Advancing", summary.advancing.to_string()),
        ("Declining", summary.declining.to_string()),
        ("Unchanged", summary.unchanged.to_string()),
        ("Market Sentiment", summary.sentiment.to_string()),
    ]
    .into_iter()
    .map(|(metric, value)| OverviewRow {
        metric: metric.to_string(),
        value,
    })
    .collect()
}

fn build_region_rows(regions: &[RegionPerformance]) -> Vec<RegionRow> {
    regions
        .iter()
        .map(|r| RegionRow {
            region: r.region.clone(),
            count: r.count,
            mean_change_pct: format_pct(r.mean_change_pct),
        })
        .collect()
}

fn build_bin_rows(bins: &[HistogramBin]) -> Vec<BinRow> {
    bins.iter()
        .map(|b| BinRow {
            range: format!("{} to {}", format_pct(b.lower), format_pct(b.upper)),
            count: b.count,
        })
        .collect()
}

// -- Rendering --

fn render_rows<T: Tabled + Serialize>(rows: Vec<T>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Markdown => {
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        OutputFormat::Table | OutputFormat::Json => println!("{}", Table::new(rows)),
    }
    Ok(())
}

pub fn print_quotes(records: &[QuoteRecord], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&records);
            Ok(())
        }
        _ => render_rows(build_quote_rows(records), format),
    }
}

pub fn print_history(series: &[HistorySeries], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&series);
            Ok(())
        }
        _ => render_rows(build_history_rows(series), format),
    }
}

pub fn print_indicators(
    snapshots: &[TechnicalSnapshot],
    catalog: &IndexCatalog,
    format: &OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&snapshots);
            Ok(())
        }
        _ => render_rows(build_indicator_rows(snapshots, catalog), format),
    }
}

pub fn print_indices(indices: &[&IndexDescriptor], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&indices);
            Ok(())
        }
        _ => render_rows(build_index_rows(indices), format),
    }
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    overview: &'a MarketSummary,
    regions: &'a [RegionPerformance],
    distribution: &'a [HistogramBin],
}

/// Overview, region performance, and change distribution. Non-JSON formats
/// print three consecutive tables separated by a blank line.
pub fn print_summary(
    overview: &MarketSummary,
    regions: &[RegionPerformance],
    distribution: &[HistogramBin],
    format: &OutputFormat,
) -> Result<()> {
    if *format == OutputFormat::Json {
        print_json(&SummaryReport {
            overview,
            regions,
            distribution,
        });
        return Ok(());
    }
    render_rows(build_overview_rows(overview), format)?;
    println!();
    render_rows(build_region_rows(regions), format)?;
    println!();
    render_rows(build_bin_rows(distribution), format)
}

/// Per-symbol notices go to stderr so stdout stays machine-readable.
pub fn print_notices(notices: &[SymbolUnavailable]) {
    for notice in notices {
        eprintln!("Skipped {}", notice);
    }
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

// -- Number formatting --

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Two decimals with thousands separators, e.g. `38,451.23`.
fn format_price(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_thousands(int_part), frac_part)
}

fn format_signed(value: f64) -> String {
    format!("{:+.2}", value)
}

fn format_pct(value: f64) -> String {
    format!("{:+.2}%", value)
}

fn format_volume(volume: u64) -> String {
    if volume == 0 {
        "N/A".to_string()
    } else {
        group_thousands(&volume.to_string())
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_price).unwrap_or_else(|| "N/A".to_string())
}
