//! EDGAR filing history and newest-periodic-report selection.

pub mod client;
pub mod current;

use serde::{Deserialize, Serialize};

pub use client::{EdgarClient, FilingSource};
pub use current::{latest_by_cik, parse_current, CurrentEntry};

const ARCHIVES_BASE: &str = "https://www.sec.gov/Archives/edgar/data";

const PERIODIC_FORMS: &[&str] = &["10-Q", "10-K"];
const AMENDED_FORMS: &[&str] = &["10-Q/A", "10-K/A"];

/// `filings.recent` of an EDGAR submissions document: parallel arrays where
/// position `i` across all of them describes one filing, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingHistory {
    /// Issuer CIK as reported by EDGAR (may or may not be zero-padded).
    #[serde(default)]
    pub cik: String,
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub accession_number: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub primary_document: Vec<String>,
    #[serde(default)]
    pub report_date: Option<Vec<String>>,
    #[serde(default)]
    pub acceptance_date_time: Option<Vec<String>>,
}

impl FilingHistory {
    /// Positions present in every required array.
    pub fn len(&self) -> usize {
        self.form
            .len()
            .min(self.accession_number.len())
            .min(self.filing_date.len())
            .min(self.primary_document.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn optional(values: &Option<Vec<String>>, i: usize) -> Option<String> {
        values
            .as_ref()
            .and_then(|v| v.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedFiling {
    pub form: String,
    pub accession_id: String,
    pub filed_date: String,
    pub report_date: Option<String>,
    pub accepted_at: Option<String>,
    pub primary_document: String,
    pub primary_document_url: String,
}

impl SelectedFiling {
    /// Period the filing covers; the filing date stands in when EDGAR gives none.
    pub fn as_of_date(&self) -> &str {
        self.report_date.as_deref().unwrap_or(&self.filed_date)
    }
}

pub fn accession_no_dashes(accession: &str) -> String {
    accession.replace('-', "")
}

/// Archives URL of a filing's primary document.
pub fn filing_url(cik: &str, accession: &str, primary_document: &str) -> String {
    let cik = cik.trim().trim_start_matches('0');
    let cik = if cik.is_empty() { "0" } else { cik };
    format!(
        "{ARCHIVES_BASE}/{cik}/{}/{primary_document}",
        accession_no_dashes(accession.trim())
    )
}

fn is_allowed(form: &str, include_amendments: bool) -> bool {
    PERIODIC_FORMS.contains(&form) || (include_amendments && AMENDED_FORMS.contains(&form))
}

/// First 10-Q/10-K (optionally amended) in source order. The history is
/// trusted to be newest-first and is never re-sorted.
pub fn select_newest(history: &FilingHistory, include_amendments: bool) -> Option<SelectedFiling> {
    let i = (0..history.len()).find(|&i| is_allowed(history.form[i].trim(), include_amendments))?;

    let accession_id = history.accession_number[i].trim().to_string();
    let primary_document = history.primary_document[i].trim().to_string();
    Some(SelectedFiling {
        form: history.form[i].trim().to_string(),
        primary_document_url: filing_url(&history.cik, &accession_id, &primary_document),
        accession_id,
        filed_date: history.filing_date[i].trim().to_string(),
        report_date: FilingHistory::optional(&history.report_date, i),
        accepted_at: FilingHistory::optional(&history.acceptance_date_time, i),
        primary_document,
    })
}
