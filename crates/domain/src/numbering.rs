//! Human-readable document numbers (`ORD-2024-001`, `INV-2024-001`).

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The kind of document a number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    Order,
    Invoice,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Order => "ORD",
            DocumentKind::Invoice => "INV",
        }
    }
}

/// A `PREFIX-YYYY-NNN` document number.
///
/// The sequence restarts every year and is padded to at least three digits;
/// it keeps growing past 999 (`ORD-2024-1000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentNumber {
    kind: DocumentKind,
    year: i32,
    sequence: u32,
}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, year: i32, sequence: u32) -> Result<Self, DomainError> {
        if !(1000..=9999).contains(&year) || sequence == 0 {
            return Err(DomainError::validation(format!(
                "Invalid document number {}-{year}-{sequence}",
                kind.prefix()
            )));
        }
        Ok(Self {
            kind,
            year,
            sequence,
        })
    }

    /// The number following the highest sequence already issued in `year`.
    pub fn next_after(
        kind: DocumentKind,
        year: i32,
        last_sequence: Option<u32>,
    ) -> Result<Self, DomainError> {
        let sequence = last_sequence
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| DomainError::validation("Document sequence exhausted"))?;
        Self::new(kind, year, sequence)
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::validation(format!("Invalid document number: {value}"));
        let mut parts = value.trim().splitn(3, '-');
        let (Some(prefix), Some(year), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let kind = match prefix {
            "ORD" => DocumentKind::Order,
            "INV" => DocumentKind::Invoice,
            _ => return Err(invalid()),
        };
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || sequence.len() < 3 || !digits(year) || !digits(sequence) {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let number = Self::new(kind, year, sequence.parse().map_err(|_| invalid())?)?;
        // Only the padded form is accepted, so `ORD-2024-0001` cannot alias `ORD-2024-001`.
        if number.to_string() != value.trim() {
            return Err(invalid());
        }
        Ok(number)
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl std::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{:03}", self.kind.prefix(), self.year, self.sequence)
    }
}

impl TryFrom<String> for DocumentNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentNumber> for String {
    fn from(number: DocumentNumber) -> Self {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_padding() {
        let number = DocumentNumber::new(DocumentKind::Order, 2024, 7).unwrap();
        assert_eq!(number.to_string(), "ORD-2024-007");
        let big = DocumentNumber::new(DocumentKind::Invoice, 2024, 1234).unwrap();
        assert_eq!(big.to_string(), "INV-2024-1234");
    }

    #[test]
    fn next_after_highest_suffix() {
        let first = DocumentNumber::next_after(DocumentKind::Invoice, 2025, None).unwrap();
        assert_eq!(first.to_string(), "INV-2025-001");
        let next = DocumentNumber::next_after(DocumentKind::Invoice, 2025, Some(41)).unwrap();
        assert_eq!(next.to_string(), "INV-2025-042");
    }

    #[test]
    fn parse_round_trips() {
        let parsed = DocumentNumber::parse("ORD-2023-015").unwrap();
        assert_eq!(parsed.kind(), DocumentKind::Order);
        assert_eq!(parsed.year(), 2023);
        assert_eq!(parsed.sequence(), 15);
        assert_eq!(parsed.to_string(), "ORD-2023-015");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["ORD-2023", "XYZ-2023-001", "ORD-23-001", "ORD-2023-01", "ORD-2023-000", "ORD-2023-abc"] {
            assert!(DocumentNumber::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn parse_accepts_only_the_canonical_form() {
        for bad in ["ORD-2024-+12", "ORD-2024-0001", "ORD-2024-01000", "ORD-+024-001"] {
            assert!(DocumentNumber::parse(bad).is_err(), "{bad}");
        }
        let long = DocumentNumber::parse("ORD-2024-1000").unwrap();
        assert_eq!(long.sequence(), 1000);
        assert_eq!(long.to_string(), "ORD-2024-1000");
    }
}
