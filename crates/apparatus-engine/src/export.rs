//! Tabular projection of the apparatus tree.
//!
//! Export is pull-only: it walks the document on demand and never runs
//! during editing. Each apparatus entry flattens to one row holding the full
//! entry text plus, optionally, one column per reading. Reading columns are
//! discovered dynamically: the header list is the union of every
//! reading-index column seen, and rows with fewer readings simply omit the
//! higher keys, so consumers must treat missing keys as empty.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::doc::document::Document;
use crate::dom::mark::Mark;
use crate::dom::node::Node;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportData {
    /// Reading column names, in reading order, across all entries.
    pub additional_headers: Vec<String>,
    /// One sparse row per apparatus entry.
    pub data: Vec<HashMap<String, String>>,
}

/// Flatten every apparatus entry into export rows.
///
/// `title` names the column holding the concatenated entry text. When
/// `extract_reading_data` is set, reading text is additionally split into
/// columns named from `reading_column_template` with `%d%` substituted by
/// the 1-based reading index within the entry.
///
/// A reading flushes whenever the next sibling is a reading separator or the
/// content ends; two adjacent separators therefore produce an empty reading
/// column rather than silently shifting later indices.
pub fn get_export_data(
    doc: &Document,
    title: &str,
    extract_reading_data: bool,
    reading_column_template: &str,
) -> ExportData {
    let mut max_readings = 0usize;
    let mut data = Vec::new();

    for (entry, _) in doc.apparatus_entries() {
        let inlines: &[Node] = entry
            .children()
            .first()
            .map(|paragraph| paragraph.children())
            .unwrap_or(&[]);

        let mut row = HashMap::new();
        let mut entry_text = String::new();
        let mut reading_acc = String::new();
        let mut reading_index = 0usize;

        for (i, node) in inlines.iter().enumerate() {
            match node {
                Node::Text { text, .. } => {
                    entry_text.push_str(text);
                    reading_acc.push_str(text);
                }
                Node::Lemma { attrs } => {
                    entry_text.push_str(&attrs.display());
                    entry_text.push_str(&attrs.separator.content);
                }
                Node::Reading { attrs } => {
                    entry_text.push_str(&attrs.text.content);
                    reading_acc.push_str(&attrs.text.content);
                }
                Node::Siglum { attrs } => {
                    entry_text.push_str(&attrs.text());
                    reading_acc.push_str(&attrs.text());
                }
                Node::ReadingSeparator { attrs } => {
                    entry_text.push_str(&attrs.content);
                }
                _ => {}
            }

            if !extract_reading_data {
                continue;
            }
            let next_is_separator =
                matches!(inlines.get(i + 1), Some(Node::ReadingSeparator { .. }));
            let at_end = i + 1 == inlines.len();
            if next_is_separator || at_end {
                reading_index += 1;
                let column = reading_column_template.replace("%d%", &reading_index.to_string());
                row.insert(column, std::mem::take(&mut reading_acc));
            }
        }

        max_readings = max_readings.max(reading_index);
        row.insert(title.to_string(), entry_text);
        data.push(row);
    }

    let additional_headers = if extract_reading_data {
        (1..=max_readings)
            .map(|i| reading_column_template.replace("%d%", &i.to_string()))
            .collect()
    } else {
        Vec::new()
    };

    ExportData {
        additional_headers,
        data,
    }
}

/// A harvested citation, deduplicated by `(bibliography_id, citation_style)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub bibliography_id: String,
    pub citation_style: String,
}

/// Scan all text runs for citation marks, appending entries not already in
/// `existing`. Input order is preserved; new finds append in document order.
pub fn get_inserted_bibliography_entries(
    doc: &Document,
    existing: Vec<BibliographyEntry>,
) -> Vec<BibliographyEntry> {
    let mut seen: HashSet<(String, String)> = existing
        .iter()
        .map(|e| (e.bibliography_id.clone(), e.citation_style.clone()))
        .collect();
    let mut out = existing;

    doc.descendants(&mut |node, _| {
        if let Node::Text { marks, .. } = node {
            for mark in marks {
                if let Mark::Citation {
                    bibliography_id,
                    citation_style,
                } = mark
                {
                    let key = (bibliography_id.clone(), citation_style.clone());
                    if seen.insert(key) {
                        out.push(BibliographyEntry {
                            bibliography_id: bibliography_id.clone(),
                            citation_style: citation_style.clone(),
                        });
                    }
                }
            }
        }
        true
    });
    out
}
