// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Where a large result physically lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageLocation {
    Memory,
    Disk,
    Database,
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageLocation::Memory => write!(f, "MEMORY"),
            StorageLocation::Disk => write!(f, "DISK"),
            StorageLocation::Database => write!(f, "DATABASE"),
        }
    }
}

impl FromStr for StorageLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MEMORY" => Ok(StorageLocation::Memory),
            "DISK" => Ok(StorageLocation::Disk),
            "DATABASE" => Ok(StorageLocation::Database),
            other => Err(format!("unknown storage location: {other}")),
        }
    }
}

/// Opaque handle to large tool output stored out-of-band.
///
/// Wire format: `DataRef[<id>, <LOCATION>, <size_bytes>]`.  The parser
/// tolerates extra whitespace and surplus commas; a string without the
/// `DataRef[...]` wrapper is treated as a bare id living in `MEMORY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    pub id: String,
    pub location: StorageLocation,
    pub size_bytes: u64,
}

impl DataRef {
    pub fn new(id: impl Into<String>, location: StorageLocation, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            location,
            size_bytes,
        }
    }

    /// Parse the wire format; a bare id falls back to `MEMORY` / size 0.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(
                r"^\s*DataRef\[\s*,*\s*([^,\[\]\s]+)\s*,+\s*([A-Za-z]+)\s*,+\s*(\d+)\s*,*\s*\]\s*$",
            )
            .expect("DataRef regex is valid")
        });

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput("empty reference".into()));
        }
        if let Some(caps) = re.captures(trimmed) {
            let location: StorageLocation = caps[2]
                .parse()
                .map_err(StoreError::InvalidInput)?;
            let size_bytes: u64 = caps[3]
                .parse()
                .map_err(|_| StoreError::InvalidInput(format!("bad size in reference: {s}")))?;
            return Ok(Self {
                id: caps[1].to_string(),
                location,
                size_bytes,
            });
        }
        if trimmed.starts_with("DataRef[") {
            return Err(StoreError::InvalidInput(format!(
                "malformed DataRef: {trimmed}"
            )));
        }
        // Bare id with the MEMORY default
        Ok(Self {
            id: trimmed.to_string(),
            location: StorageLocation::Memory,
            size_bytes: 0,
        })
    }
}

impl std::fmt::Display for DataRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataRef[{}, {}, {}]", self.id, self.location, self.size_bytes)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_round_trip() {
        let r = DataRef::new("ref_42", StorageLocation::Disk, 1024);
        let s = r.to_string();
        assert_eq!(s, "DataRef[ref_42, DISK, 1024]");
        assert_eq!(DataRef::parse(&s).unwrap(), r);
    }

    #[test]
    fn parse_tolerates_extra_whitespace() {
        let r = DataRef::parse("  DataRef[  ref_1 ,  MEMORY ,  5 ]  ").unwrap();
        assert_eq!(r.id, "ref_1");
        assert_eq!(r.location, StorageLocation::Memory);
        assert_eq!(r.size_bytes, 5);
    }

    #[test]
    fn parse_tolerates_surplus_commas() {
        let r = DataRef::parse("DataRef[ref_1,, DATABASE,, 9,]").unwrap();
        assert_eq!(r.location, StorageLocation::Database);
        assert_eq!(r.size_bytes, 9);
    }

    #[test]
    fn parse_location_is_case_insensitive() {
        let r = DataRef::parse("DataRef[x, disk, 1]").unwrap();
        assert_eq!(r.location, StorageLocation::Disk);
    }

    #[test]
    fn bare_id_defaults_to_memory() {
        let r = DataRef::parse("ref_7").unwrap();
        assert_eq!(r.id, "ref_7");
        assert_eq!(r.location, StorageLocation::Memory);
        assert_eq!(r.size_bytes, 0);
    }

    #[test]
    fn empty_string_is_invalid() {
        assert!(DataRef::parse("   ").is_err());
    }

    #[test]
    fn malformed_wrapper_is_invalid() {
        let err = DataRef::parse("DataRef[only_id]").unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn unknown_location_is_invalid() {
        assert!(DataRef::parse("DataRef[x, CLOUD, 1]").is_err());
    }

    #[test]
    fn location_serialises_uppercase() {
        assert_eq!(
            serde_json::to_string(&StorageLocation::Memory).unwrap(),
            "\"MEMORY\""
        );
    }
}
