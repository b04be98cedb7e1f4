use anyhow::Result;

use crate::photometry::PhotometryRow;
use crate::source_detection::DetectedSource;

/// Column order of persisted photometry tables
pub const CSV_COLUMNS: [&str; 7] = [
    "id",
    "aperture_sum",
    "annulus_sum",
    "mean_bkg",
    "source_signal",
    "count_rate",
    "magnitude",
];

/// Output format shared by the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}. Use table, csv or json", s)),
        }
    }
}

pub fn render_photometry(rows: &[PhotometryRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(photometry_table(rows)),
        OutputFormat::Csv => Ok(photometry_csv(rows)),
        OutputFormat::Json => photometry_json(rows),
    }
}

/// CSV with the interchange columns; an undefined magnitude is left empty.
pub fn photometry_csv(rows: &[PhotometryRow]) -> String {
    let mut output = CSV_COLUMNS.join(",");
    output.push('\n');

    for row in rows {
        let magnitude = row
            .magnitude
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_default();
        output.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            row.id,
            row.aperture_sum,
            row.annulus_sum,
            row.mean_bkg,
            row.source_signal,
            row.count_rate,
            magnitude
        ));
    }

    output
}

pub fn photometry_table(rows: &[PhotometryRow]) -> String {
    let mut output = format!(
        "{:>4} {:>9} {:>9} {:>13} {:>13} {:>10} {:>13} {:>12} {:>8} {:>8} {:>5}\n",
        "id",
        "x",
        "y",
        "aperture_sum",
        "annulus_sum",
        "mean_bkg",
        "source_signal",
        "count_rate",
        "mag",
        "ann_cov",
        "nbrs"
    );
    output.push_str(&format!("{:-<114}\n", ""));

    let mut suspect = 0;
    let mut undefined = 0;
    for row in rows {
        let magnitude = match &row.magnitude {
            Ok(m) => format!("{:.3}", m),
            Err(_) => {
                undefined += 1;
                "--".to_string()
            }
        };
        let flag = if row.background_suspect() {
            suspect += 1;
            " *"
        } else {
            ""
        };
        output.push_str(&format!(
            "{:>4} {:>9.2} {:>9.2} {:>13.2} {:>13.2} {:>10.3} {:>13.2} {:>12.3} {:>8} {:>8.3} {:>5}{}\n",
            row.id,
            row.x,
            row.y,
            row.aperture_sum,
            row.annulus_sum,
            row.mean_bkg,
            row.source_signal,
            row.count_rate,
            magnitude,
            row.annulus_coverage,
            row.annulus_neighbors,
            flag
        ));
    }

    output.push_str(&format!("\nTotal: {} sources\n", rows.len()));
    if suspect > 0 {
        output.push_str(&format!(
            "* {} source(s) with a clipped or contaminated annulus; background may be biased\n",
            suspect
        ));
    }
    if undefined > 0 {
        output.push_str(&format!(
            "-- {} source(s) with non-positive count rate; magnitude undefined\n",
            undefined
        ));
    }
    output
}

pub fn photometry_json(rows: &[PhotometryRow]) -> Result<String> {
    let json_rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let (magnitude, magnitude_error) = match &row.magnitude {
                Ok(m) => (Some(*m), None),
                Err(e) => (None, Some(e.to_string())),
            };
            serde_json::json!({
                "id": row.id,
                "x": row.x,
                "y": row.y,
                "aperture_sum": row.aperture_sum,
                "annulus_sum": row.annulus_sum,
                "aperture_area": row.aperture_area,
                "annulus_area": row.annulus_area,
                "mean_bkg": row.mean_bkg,
                "source_signal": row.source_signal,
                "count_rate": row.count_rate,
                "magnitude": magnitude,
                "magnitude_error": magnitude_error,
                "annulus_coverage": row.annulus_coverage,
                "annulus_neighbors": row.annulus_neighbors,
            })
        })
        .collect();

    Ok(serde_json::to_string_pretty(&json_rows)?)
}

pub fn render_sources(sources: &[DetectedSource], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(sources)?),
        OutputFormat::Csv => {
            let mut output = String::from("id,xcentroid,ycentroid,peak,flux,npix\n");
            for s in sources {
                output.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    s.id, s.x, s.y, s.peak, s.flux, s.npix
                ));
            }
            Ok(output)
        }
        OutputFormat::Table => {
            let mut output = format!(
                "{:>4} {:>10} {:>10} {:>12} {:>14} {:>6}\n",
                "id", "xcentroid", "ycentroid", "peak", "flux", "npix"
            );
            output.push_str(&format!("{:-<61}\n", ""));
            for s in sources {
                output.push_str(&format!(
                    "{:>4} {:>10.3} {:>10.3} {:>12.2} {:>14.2} {:>6}\n",
                    s.id, s.x, s.y, s.peak, s.flux, s.npix
                ));
            }
            output.push_str(&format!("\nTotal: {} sources\n", sources.len()));
            Ok(output)
        }
    }
}
