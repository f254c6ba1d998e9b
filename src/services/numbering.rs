//! Sequential document numbers of the form `{PREFIX}-{year}-{sequence:05}`.
//!
//! Sequences restart each year and are never reissued: the allocator keeps the
//! highest number ever handed out, not the highest number still in use.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub prefix: String,
    pub year: i32,
    pub sequence: u32,
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:05}", self.prefix, self.year, self.sequence)
    }
}

impl FromStr for DocumentNumber {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ServiceError::InvalidInput(format!("malformed document number '{}'", s));

        let mut parts = s.rsplitn(3, '-');
        let sequence = parts.next().ok_or_else(invalid)?;
        let year = parts.next().ok_or_else(invalid)?;
        let prefix = parts.next().ok_or_else(invalid)?;

        if prefix.is_empty() || sequence.len() < 5 || year.len() != 4 {
            return Err(invalid());
        }
        Ok(Self {
            prefix: prefix.to_string(),
            year: year.parse().map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

/// Hands out strictly increasing sequence numbers per `(prefix, year)`.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    high_water: DashMap<(String, i32), u32>,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the allocator from numbers issued before this process started.
    pub fn seeded<'a>(existing: impl IntoIterator<Item = &'a str>) -> Result<Self, ServiceError> {
        let allocator = Self::new();
        for number in existing {
            allocator.observe(&number.parse()?);
        }
        Ok(allocator)
    }

    /// Allocates the next number. The increment happens under the shard lock.
    pub fn next(&self, prefix: &str, year: i32) -> DocumentNumber {
        let mut entry = self
            .high_water
            .entry((prefix.to_string(), year))
            .or_insert(0);
        *entry += 1;
        DocumentNumber {
            prefix: prefix.to_string(),
            year,
            sequence: *entry,
        }
    }

    /// Raises the high-water mark so `number` is never issued again.
    pub fn observe(&self, number: &DocumentNumber) {
        let mut entry = self
            .high_water
            .entry((number.prefix.clone(), number.year))
            .or_insert(0);
        if number.sequence > *entry {
            *entry = number.sequence;
        }
    }

    pub fn peek(&self, prefix: &str, year: i32) -> u32 {
        self.high_water
            .get(&(prefix.to_string(), year))
            .map(|v| *v)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn formats_with_five_digit_padding() {
        let allocator = SequenceAllocator::new();
        assert_eq!(allocator.next("WO", 2025).to_string(), "WO-2025-00001");
        assert_eq!(allocator.next("WO", 2025).to_string(), "WO-2025-00002");
        assert_eq!(allocator.next("PR", 2025).to_string(), "PR-2025-00001");
        assert_eq!(allocator.next("WO", 2026).to_string(), "WO-2026-00001");
    }

    #[test]
    fn seeding_continues_above_the_highest_number() {
        let allocator =
            SequenceAllocator::seeded(["WO-2025-00007", "WO-2025-00003", "WO-2024-00042"]).unwrap();
        assert_eq!(allocator.next("WO", 2025).sequence, 8);
        assert_eq!(allocator.next("WO", 2024).sequence, 43);
    }

    #[test]
    fn observing_lower_numbers_never_lowers_the_mark() {
        let allocator = SequenceAllocator::new();
        allocator.next("WO", 2025);
        allocator.next("WO", 2025);
        allocator.observe(&"WO-2025-00001".parse().unwrap());
        assert_eq!(allocator.peek("WO", 2025), 2);
    }

    #[test]
    fn parses_prefixes_containing_dashes() {
        let number: DocumentNumber = "FLEET-WO-2025-00012".parse().unwrap();
        assert_eq!(number.prefix, "FLEET-WO");
        assert_eq!(number.year, 2025);
        assert_eq!(number.sequence, 12);
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert_matches!("WO-25-00001".parse::<DocumentNumber>(), Err(ServiceError::InvalidInput(_)));
        assert_matches!("WO-2025-1".parse::<DocumentNumber>(), Err(ServiceError::InvalidInput(_)));
        assert_matches!("2025-00001".parse::<DocumentNumber>(), Err(ServiceError::InvalidInput(_)));
    }
}
