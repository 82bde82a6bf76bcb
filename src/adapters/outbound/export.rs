use std::{fs, path::Path};

use clap::ValueEnum;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{
    domain::ResultSet,
    error::{Error as CoreError, Result as CoreResult},
};

/// Literal line placed between documents in plain-text exports.
pub const TEXT_SEPARATOR: &str = "\n\n===== Document Separator =====\n\n";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SHEET_NAME: &str = "Generated Documents";
const HEADERS: [&str; 3] = ["No.", "Generated At", "Content"];
const COLUMN_WIDTHS: [f64; 3] = [8.0, 20.0, 80.0];
const ROW_HEIGHT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Text,
    Xlsx,
    Json,
}

impl ExportFormat {
    /// Picks the format from a file extension, defaulting to plain text.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("xlsx") => ExportFormat::Xlsx,
            Some("json") => ExportFormat::Json,
            _ => ExportFormat::Text,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Json => "application/json",
        }
    }
}

/// Serializes a [`ResultSet`] into downloadable files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExporter;

impl DocumentExporter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, result: &ResultSet, format: ExportFormat) -> CoreResult<Vec<u8>> {
        match format {
            ExportFormat::Text => Ok(render_text(result).into_bytes()),
            ExportFormat::Json => serde_json::to_vec_pretty(result)
                .map_err(|err| CoreError::Export(format!("failed to encode JSON: {err}"))),
            ExportFormat::Xlsx => render_xlsx(result)
                .map_err(|err| CoreError::Export(format!("failed to build workbook: {err}"))),
        }
    }

    pub fn write(&self, result: &ResultSet, format: ExportFormat, path: &Path) -> CoreResult<()> {
        let bytes = self.render(result, format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                CoreError::FileSystem(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        fs::write(path, bytes).map_err(|err| {
            CoreError::FileSystem(format!("failed to write {}: {err}", path.display()))
        })?;
        info!(path = %path.display(), format = format.extension(), documents = result.len(), "export written");
        Ok(())
    }
}

pub fn render_text(result: &ResultSet) -> String {
    result.texts().join(TEXT_SEPARATOR)
}

fn render_xlsx(result: &ResultSet) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4F81BD))
        .set_font_color(Color::White)
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let cell_format = Format::new()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Left)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }
    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }
    worksheet.set_row_height(0, ROW_HEIGHT)?;

    for (position, doc) in result.documents.iter().enumerate() {
        let row = (position + 1) as u32;
        let timestamp = doc.generated_at.format(TIMESTAMP_FORMAT).to_string();
        worksheet.write_number_with_format(row, 0, (position + 1) as f64, &cell_format)?;
        worksheet.write_string_with_format(row, 1, &timestamp, &cell_format)?;
        worksheet.write_string_with_format(row, 2, &doc.content, &cell_format)?;
        worksheet.set_row_height(row, ROW_HEIGHT)?;
    }

    workbook.save_to_buffer()
}
