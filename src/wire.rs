// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Byte-level snapshot format for slot assignments.
//!
//! Adjacent cluster components consume node snapshots as a list of
//! `(name, ids[], fractions[])` records: one record per resource, with parallel
//! arrays of slot ids and the fraction held of each. Whole slots carry fraction
//! exactly `1.0`; partial slots carry their residual in (0, 1).
//!
//! The encoding is a little-endian, length-prefixed flat layout: a `u32` record
//! count, then per record a `u32`-prefixed UTF-8 name, a `u32` element count, the
//! ids as `i64`, and the fractions as `f64`. A snapshot is taken from quiescent
//! state; serializing concurrently with mutation is a caller error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum WireError {
    #[error("snapshot truncated while reading {0}")]
    Truncated(&'static str),
    #[error("resource name is not valid UTF-8")]
    InvalidName,
    #[error("{0} bytes left over after the last record")]
    TrailingBytes(usize),
}

/// One resource's slot assignments, in wire shape.
///
/// `ids` and `fractions` are parallel and equal-length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub ids: Vec<i64>,
    pub fractions: Vec<f64>,
}

impl ResourceRecord {
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    pub fn deserialize(data: &str) -> ResourceRecord {
        serde_json::from_str(data).unwrap()
    }
}

/// Encodes records into the length-prefixed byte layout.
pub fn encode(records: &[ResourceRecord]) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for record in records {
        debug_assert_eq!(record.ids.len(), record.fractions.len());
        buffer.extend_from_slice(&(record.name.len() as u32).to_le_bytes());
        buffer.extend_from_slice(record.name.as_bytes());
        buffer.extend_from_slice(&(record.ids.len() as u32).to_le_bytes());
        for slot_id in &record.ids {
            buffer.extend_from_slice(&slot_id.to_le_bytes());
        }
        for fraction in &record.fractions {
            buffer.extend_from_slice(&fraction.to_le_bytes());
        }
    }
    buffer
}

/// Decodes a byte snapshot back into records.
pub fn decode(bytes: &[u8]) -> Result<Vec<ResourceRecord>, WireError> {
    let mut cursor = Cursor { bytes, offset: 0 };
    let record_count = cursor.read_u32("record count")?;
    let mut records = Vec::with_capacity(record_count as usize);
    for _ in 0..record_count {
        let name_len = cursor.read_u32("name length")? as usize;
        let name = String::from_utf8(cursor.read_bytes(name_len, "name")?.to_vec())
            .map_err(|_| WireError::InvalidName)?;
        let element_count = cursor.read_u32("element count")? as usize;
        let mut ids = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            let raw = cursor.read_bytes(8, "slot id")?;
            ids.push(i64::from_le_bytes(raw.try_into().expect("8 bytes")));
        }
        let mut fractions = Vec::with_capacity(element_count);
        for _ in 0..element_count {
            let raw = cursor.read_bytes(8, "fraction")?;
            fractions.push(f64::from_le_bytes(raw.try_into().expect("8 bytes")));
        }
        records.push(ResourceRecord {
            name,
            ids,
            fractions,
        });
    }
    if cursor.offset != bytes.len() {
        return Err(WireError::TrailingBytes(bytes.len() - cursor.offset));
    }
    Ok(records)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn read_bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], WireError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(WireError::Truncated(what))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, WireError> {
        let raw = self.read_bytes(4, what)?;
        Ok(u32::from_le_bytes(raw.try_into().expect("4 bytes")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<ResourceRecord> {
        vec![
            ResourceRecord {
                name: "CPU".to_string(),
                ids: vec![0, 1, 3],
                fractions: vec![1.0, 1.0, 0.5],
            },
            ResourceRecord {
                name: "GPU".to_string(),
                ids: vec![-1],
                fractions: vec![1.0],
            },
        ]
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let records = sample_records();
        let bytes = encode(&records);
        assert_eq!(decode(&bytes).unwrap(), records);
    }

    #[test]
    fn test_empty_snapshot() {
        let bytes = encode(&[]);
        assert_eq!(bytes, vec![0, 0, 0, 0]);
        assert_eq!(decode(&bytes).unwrap(), Vec::new());
    }

    #[test]
    fn test_layout_is_stable() {
        let record = ResourceRecord {
            name: "CPU".to_string(),
            ids: vec![2],
            fractions: vec![1.0],
        };
        let bytes = encode(&[record]);
        // count=1, name_len=3, "CPU", elements=1, id 2 as i64, 1.0 as f64.
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"CPU");
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&2i64.to_le_bytes());
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = encode(&sample_records());
        for cut in [1, 5, bytes.len() - 1] {
            match decode(&bytes[..cut]) {
                Err(WireError::Truncated(_)) => {}
                other => panic!("expected Truncated for cut {cut}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&sample_records());
        bytes.push(0xff);
        assert_eq!(decode(&bytes).unwrap_err(), WireError::TrailingBytes(1));
    }

    #[test]
    fn test_json_helpers_round_trip() {
        let record = sample_records().remove(0);
        let encoded = record.serialize();
        assert_eq!(ResourceRecord::deserialize(&encoded), record);
    }
}
