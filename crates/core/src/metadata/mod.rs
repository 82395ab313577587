//! Metadata module for reading header-level fields from items.
//!
//! The [`MetadataReader`] trait is the seam to the binary format; the
//! [`DicomMetadataReader`] implementation parses DICOM headers up to, but not
//! including, the pixel data. [`MetadataExtractor`] wraps a reader with the
//! field-presence policy shared by both operating modes.

mod dicom;
mod error;
mod extractor;
mod traits;
mod types;

pub use dicom::DicomMetadataReader;
pub use error::ExtractionFailure;
pub use extractor::MetadataExtractor;
pub use traits::MetadataReader;
pub use types::MetadataRecord;
