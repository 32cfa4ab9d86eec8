use crate::error::IngestError;
use crate::models::Page;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_doc_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_doc = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                ext.eq_ignore_ascii_case("md")
                    || ext.eq_ignore_ascii_case("markdown")
                    || ext.eq_ignore_ascii_case("txt")
            });

        if is_doc {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Stable page identifier derived from the file path.
pub fn page_source_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split raw markdown into prose, headings, and fenced code blocks.
///
/// Heading lines keep their document order. An unterminated fence is
/// flushed as a final code block rather than dropped.
pub fn parse_page(source_id: impl Into<String>, raw: &str) -> Page {
    let mut text_lines = Vec::new();
    let mut headings = Vec::new();
    let mut code_blocks = Vec::new();
    let mut fence_lines: Option<Vec<String>> = None;

    for line in raw.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") {
            match fence_lines.take() {
                Some(lines) => code_blocks.push(lines.join("\n")),
                None => fence_lines = Some(Vec::new()),
            }
            continue;
        }

        if let Some(lines) = fence_lines.as_mut() {
            lines.push(line.to_string());
            continue;
        }

        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                headings.push(heading.to_string());
            }
            continue;
        }

        text_lines.push(line);
    }

    if let Some(lines) = fence_lines {
        code_blocks.push(lines.join("\n"));
    }

    Page {
        source_id: source_id.into(),
        text: text_lines.join("\n").trim().to_string(),
        headings,
        code_blocks,
    }
}

pub fn load_page(path: &Path) -> Result<Page, IngestError> {
    let raw = fs::read_to_string(path)?;
    Ok(parse_page(page_source_id(path), &raw))
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct PageLoadReport {
    pub pages: Vec<Page>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Load every documentation file under `folder`, skipping unreadable
/// ones instead of aborting the batch.
pub fn load_pages_best_effort(folder: &Path) -> Result<PageLoadReport, IngestError> {
    let files = discover_doc_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no documentation files found in {}",
            folder.display()
        )));
    }

    let mut pages = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_page(&path) {
            Ok(page) => pages.push(page),
            Err(error) => skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(PageLoadReport {
        pages,
        skipped_files,
    })
}
