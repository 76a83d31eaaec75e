//! Contact ingestion: parsing a delimited contact list into validated recipients.
//!
//! ## Processing Flow
//!
//! ```text
//! raw CSV text → normalize() → Vec<Contact> (status = pending)
//! ```

pub mod error;
pub mod normalizer;
pub mod phone;
pub mod types;

pub use error::IngestError;
pub use normalizer::{normalize, ContactFormat, NormalizedContacts, MAX_CONTACTS};
pub use phone::{normalize_phone, DEFAULT_COUNTRY_CODE, MIN_PHONE_DIGITS};
pub use types::{Contact, ContactStatus};
