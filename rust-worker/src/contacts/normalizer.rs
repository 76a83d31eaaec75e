//! CSV contact list normalization.
//!
//! Resolves the phone/name/email/company columns from the header row by fuzzy
//! match, drops rows without a usable phone number, and normalizes the rest.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use tracing::{debug, info};

use super::error::IngestError;
use super::phone::normalize_phone;
use super::types::Contact;

/// Maximum number of contacts a single campaign may address.
pub const MAX_CONTACTS: usize = 10_000;

const PHONE_HEADERS: &[&str] = &["phone", "mobile", "number"];
const NAME_HEADERS: &[&str] = &["name"];
const EMAIL_HEADERS: &[&str] = &["email"];
const COMPANY_HEADERS: &[&str] = &["company"];

/// Format of an uploaded contact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactFormat {
    /// Comma-separated text with a header row
    Csv,
    /// Binary spreadsheet (xls/xlsx), rejected
    Spreadsheet,
}

impl ContactFormat {
    /// Infer the format from a file name. Anything that is not an Excel
    /// workbook is treated as CSV text.
    pub fn from_file_name(name: &str) -> Self {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xls") => ContactFormat::Spreadsheet,
            _ => ContactFormat::Csv,
        }
    }
}

/// Result of a successful normalization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedContacts {
    /// Retained contacts, in file order, all pending
    pub contacts: Vec<Contact>,
    /// Data rows dropped for lacking a valid phone number
    pub skipped_rows: usize,
}

/// Column indices resolved from the header row.
#[derive(Debug, PartialEq)]
struct ColumnMap {
    phone: usize,
    name: Option<usize>,
    email: Option<usize>,
    company: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self, IngestError> {
        let headers: Vec<String> = headers
            .iter()
            .map(|h| clean_field(h).to_lowercase())
            .collect();

        let phone =
            find_column(&headers, PHONE_HEADERS, &[]).ok_or(IngestError::MissingColumn)?;
        let mut taken = vec![phone];

        let name = find_column(&headers, NAME_HEADERS, &taken);
        taken.extend(name);
        let email = find_column(&headers, EMAIL_HEADERS, &taken);
        taken.extend(email);
        let company = find_column(&headers, COMPANY_HEADERS, &taken);

        debug!(
            headers = ?headers,
            phone_column = phone,
            name_column = ?name,
            email_column = ?email,
            company_column = ?company,
            "contacts_columns_resolved"
        );

        Ok(Self {
            phone,
            name,
            email,
            company,
        })
    }
}

/// Find the first unclaimed header matching one of `needles`. Exact matches
/// win over substring matches, so "Name" beats an earlier "Company Name".
fn find_column(headers: &[String], needles: &[&str], taken: &[usize]) -> Option<usize> {
    let candidates = || {
        headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken.contains(i))
    };

    candidates()
        .find(|(_, h)| needles.iter().any(|n| h.as_str() == *n))
        .or_else(|| candidates().find(|(_, h)| needles.iter().any(|n| h.contains(n))))
        .map(|(i, _)| i)
}

/// Strip surrounding whitespace and quotes from a raw field.
fn clean_field(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

fn optional_field(record: &StringRecord, index: Option<usize>) -> Option<String> {
    let value = clean_field(record.get(index?)?);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse and validate a contact list.
///
/// Fails before any contact is produced when the input is empty, lacks a phone
/// column, yields no valid rows, or exceeds [`MAX_CONTACTS`]. Rows whose phone
/// field has fewer than 10 digits are skipped, not treated as errors.
pub fn normalize(raw: &str, format: ContactFormat) -> Result<NormalizedContacts, IngestError> {
    if format == ContactFormat::Spreadsheet {
        return Err(IngestError::UnsupportedFormat("spreadsheet".to_string()));
    }

    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    if text.lines().all(|line| line.trim().is_empty()) {
        return Err(IngestError::Empty);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns = ColumnMap::resolve(reader.headers()?)?;

    let mut contacts = Vec::new();
    let mut skipped_rows = 0;

    for record in reader.records() {
        let record = record?;

        // Whitespace-only lines trim down to empty records
        if record.iter().all(|field| clean_field(field).is_empty()) {
            continue;
        }

        let phone = match record
            .get(columns.phone)
            .map(clean_field)
            .and_then(normalize_phone)
        {
            Some(phone) => phone,
            None => {
                skipped_rows += 1;
                continue;
            }
        };

        contacts.push(Contact::new(
            phone,
            optional_field(&record, columns.name),
            optional_field(&record, columns.email),
            optional_field(&record, columns.company),
        ));
    }

    info!(
        contacts = contacts.len(),
        skipped_rows = skipped_rows,
        "contacts_normalized"
    );

    if contacts.is_empty() {
        return Err(IngestError::NoValidContacts);
    }

    if contacts.len() > MAX_CONTACTS {
        return Err(IngestError::TooManyContacts {
            count: contacts.len(),
            limit: MAX_CONTACTS,
        });
    }

    Ok(NormalizedContacts {
        contacts,
        skipped_rows,
    })
}
