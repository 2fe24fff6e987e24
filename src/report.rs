//! Rendering of recommendation batches: text tables, summaries, JSON and
//! CSV/HTML export.

use crate::error::{Result, SizectlError};
use crate::sizing::{Method, Recommendation, RecommendationBatch};
use crate::utils::{format_price, monthly_cost};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Totals over a set of recommendations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_vms: usize,
    pub by_method: BTreeMap<String, usize>,
    /// VMs whose primary carries a price
    pub priced_vms: usize,
    pub hourly_cost: f64,
    pub monthly_cost: f64,
}

impl Summary {
    pub fn from_recommendations<'a>(recommendations: impl IntoIterator<Item = &'a Recommendation>) -> Self {
        let mut by_method = BTreeMap::new();
        let mut total_vms = 0;
        let mut priced_vms = 0;
        let mut hourly_cost = 0.0;

        for rec in recommendations {
            total_vms += 1;
            *by_method
                .entry(rec.recommendation.method.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(price) = rec.recommendation.hourly_price {
                priced_vms += 1;
                hourly_cost += price;
            }
        }

        Self {
            total_vms,
            by_method,
            priced_vms,
            hourly_cost,
            monthly_cost: monthly_cost(hourly_cost),
        }
    }

    pub fn from_batches(batches: &[RecommendationBatch]) -> Self {
        Self::from_recommendations(batches.iter().flat_map(|b| b.recommendations.iter()))
    }
}

/// Export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Html,
}

impl FromStr for ExportFormat {
    type Err = SizectlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "html" => Ok(ExportFormat::Html),
            other => Err(SizectlError::validation(
                "export",
                format!("unsupported export format '{}' (expected csv or html)", other),
            )),
        }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }
}

fn method_color(method: Method) -> Color {
    match method {
        Method::Predefined => Color::Blue,
        Method::CalculatedWithManufacturer => Color::Green,
        Method::Fallback => Color::Red,
        Method::AiEnhancedAnalysis => Color::Cyan,
        Method::AiCached => Color::DarkCyan,
    }
}

fn alternatives_text(rec: &Recommendation) -> String {
    rec.recommendation
        .alternatives
        .iter()
        .map(|alt| {
            if alt.price.is_empty() {
                alt.instance_type.clone()
            } else {
                format!("{} ({})", alt.instance_type, alt.price)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn manufacturer_text(rec: &Recommendation) -> String {
    rec.recommendation
        .manufacturer
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Recommendations as a terminal table
pub fn render_table(recommendations: &[Recommendation]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "VM",
        "Current",
        "Recommended",
        "Manufacturer",
        "Price/h",
        "Method",
        "Alternatives",
    ]);

    for rec in recommendations {
        let detail = &rec.recommendation;
        table.add_row(vec![
            Cell::new(&rec.vm_name),
            Cell::new(format!(
                "{} vCPU / {:.1} GB",
                rec.current_specs.cpu, rec.current_specs.memory_gb
            )),
            Cell::new(&detail.primary_instance),
            Cell::new(manufacturer_text(rec)),
            Cell::new(detail.price.as_deref().unwrap_or("-")),
            Cell::new(detail.method.as_str()).fg(method_color(detail.method)),
            Cell::new(alternatives_text(rec)),
        ]);
    }

    table
}

/// Summary lines for the text report
pub fn render_summary(summary: &Summary) -> String {
    let mut lines = vec![format!(
        "{} {} VMs",
        style("Total:").dim(),
        style(summary.total_vms).bold()
    )];
    for (method, count) in &summary.by_method {
        lines.push(format!("  {}: {}", method, count));
    }
    lines.push(format!(
        "{} {} ({} priced VMs)",
        style("Hourly cost:").dim(),
        style(format_price(summary.hourly_cost)).yellow(),
        summary.priced_vms
    ));
    lines.push(format!(
        "{} {}",
        style("Monthly estimate:").dim(),
        style(format_price(summary.monthly_cost)).yellow()
    ));
    lines.join("\n")
}

/// Print batches and a combined summary to stdout
pub fn print_text(batches: &[RecommendationBatch]) {
    for batch in batches {
        if let (Some(account), Some(region)) = (&batch.account_id, &batch.region) {
            println!(
                "\n{} {} / {}",
                style("Account / region:").bold(),
                style(account).cyan(),
                style(region).cyan()
            );
        }
        println!("{}", render_table(&batch.recommendations));
        if batch.cache_hits.is_some() || batch.ai_calls.is_some() {
            println!(
                "{} {} AI answers, {} cache hits",
                style("AI:").dim(),
                batch.ai_calls.unwrap_or(0),
                batch.cache_hits.unwrap_or(0)
            );
        }
        for rec in &batch.recommendations {
            if let Some(err) = &rec.recommendation.ai_error {
                println!(
                    "{} {}: AI analysis failed, used ratio engine ({})",
                    style("WARNING:").yellow().bold(),
                    rec.vm_name,
                    err
                );
            }
        }
    }
    println!("\n{}", render_summary(&Summary::from_batches(batches)));
}

/// Pretty JSON: the batch itself, or a list when grouped
pub fn to_json(batches: &[RecommendationBatch]) -> Result<String> {
    let json = match batches {
        [single] if single.group_key.is_none() => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    Ok(json)
}

const EXPORT_HEADERS: &[&str] = &[
    "VM Name",
    "CPU",
    "Memory GB",
    "Recommended Instance",
    "Manufacturer",
    "Instance vCPUs",
    "Instance Memory GB",
    "Price",
    "Method",
    "Alternatives",
    "Reasoning",
    "AI Error",
    "AccountId",
    "Region",
];

fn export_row(rec: &Recommendation) -> Vec<String> {
    let detail = &rec.recommendation;
    vec![
        rec.vm_name.clone(),
        rec.current_specs.cpu.to_string(),
        format!("{:.1}", rec.current_specs.memory_gb),
        detail.primary_instance.clone(),
        detail.manufacturer.map(|m| m.to_string()).unwrap_or_default(),
        detail.vcpus.map(|v| v.to_string()).unwrap_or_default(),
        detail.memory_gb.map(|m| format!("{:.1}", m)).unwrap_or_default(),
        detail.price.clone().unwrap_or_default(),
        detail.method.as_str().to_string(),
        alternatives_text(rec),
        detail.reasoning.clone(),
        detail.ai_error.clone().unwrap_or_default(),
        rec.account_id.clone().unwrap_or_default(),
        rec.region.clone().unwrap_or_default(),
    ]
}

pub fn write_csv<W: Write>(recommendations: &[Recommendation], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(EXPORT_HEADERS)?;
    for rec in recommendations {
        csv_writer.write_record(export_row(rec))?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_html(recommendations: &[Recommendation]) -> String {
    let summary = Summary::from_recommendations(recommendations);
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>EC2 Sizing Report</title>\n\
         <style>table{border-collapse:collapse}th,td{border:1px solid #ccc;padding:4px 8px}th{background:#eee}</style>\n\
         </head>\n<body>\n<h1>EC2 Sizing Report</h1>\n",
    );
    html.push_str(&format!(
        "<p>Generated {}</p>\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str(&format!(
        "<p>{} VMs, hourly cost {}, monthly estimate {}</p>\n",
        summary.total_vms,
        format_price(summary.hourly_cost),
        format_price(summary.monthly_cost)
    ));

    html.push_str("<table>\n<tr>");
    for header in EXPORT_HEADERS {
        html.push_str(&format!("<th>{}</th>", escape_html(header)));
    }
    html.push_str("</tr>\n");
    for rec in recommendations {
        html.push_str("<tr>");
        for value in export_row(rec) {
            html.push_str(&format!("<td>{}</td>", escape_html(&value)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

/// Write all recommendations of the batches to `path`; the parent directory must exist
pub fn export(batches: &[RecommendationBatch], format: ExportFormat, path: &Path) -> Result<()> {
    let recommendations: Vec<Recommendation> = batches
        .iter()
        .flat_map(|b| b.recommendations.iter().cloned())
        .collect();

    match format {
        ExportFormat::Csv => {
            let file = std::fs::File::create(path)?;
            write_csv(&recommendations, file)
        }
        ExportFormat::Html => {
            std::fs::write(path, render_html(&recommendations))?;
            Ok(())
        }
    }
}
