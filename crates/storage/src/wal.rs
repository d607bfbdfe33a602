// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! The log is newline-delimited JSON. Each entry carries a sequence number,
//! a timestamp and a CRC32 checksum of its operation. Reading stops at the
//! first line that fails to parse or verify, which is how a write torn by a
//! crash shows up.

use crate::operation::Operation;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    pub op: Operation,
    /// CRC32 of the serialized operation
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(sequence: u64, timestamp_micros: u64, op: Operation) -> Self {
        let checksum = checksum(&op);
        Self {
            sequence,
            timestamp_micros,
            op,
            checksum,
        }
    }

    /// Verify the checksum matches the operation
    pub fn verify(&self) -> bool {
        self.checksum == checksum(&self.op)
    }
}

fn checksum(op: &Operation) -> u32 {
    // Operations only hold strings, timestamps and JSON values, which always
    // serialize
    let json = serde_json::to_string(op).unwrap_or_default();
    crc32fast::hash(json.as_bytes())
}

/// Result of reading a log from disk
#[derive(Debug, Default)]
pub struct WalScan {
    /// Valid entries, in log order
    pub entries: Vec<WalEntry>,
    /// Line number of the first invalid line, if any
    pub corrupt_line: Option<u64>,
}

impl WalScan {
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|entry| entry.sequence)
    }
}

/// Read every valid entry, stopping at the first invalid line
pub fn scan(path: &Path) -> Result<WalScan, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(WalScan::default()),
        Err(e) => return Err(e.into()),
    };

    let mut scan = WalScan::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line_number = index as u64 + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "unreadable WAL line");
                scan.corrupt_line = Some(line_number);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) if entry.verify() => scan.entries.push(entry),
            Ok(entry) => {
                tracing::warn!(
                    line = line_number,
                    sequence = entry.sequence,
                    "WAL checksum mismatch"
                );
                scan.corrupt_line = Some(line_number);
                break;
            }
            Err(e) => {
                tracing::warn!(line = line_number, error = %e, "corrupt WAL entry");
                scan.corrupt_line = Some(line_number);
                break;
            }
        }
    }
    Ok(scan)
}

/// Append-only writer; every append is fsync'd before returning
pub struct WalWriter {
    path: PathBuf,
    file: File,
    next_sequence: u64,
}

impl WalWriter {
    /// Open or create a log, continuing after `last_sequence`
    pub fn open(path: &Path, last_sequence: Option<u64>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence: last_sequence.map_or(0, |s| s + 1),
        })
    }

    /// Append an operation, returning its sequence number
    pub fn append(&mut self, op: Operation, timestamp_micros: u64) -> Result<u64, StoreError> {
        let sequence = self.next_sequence;
        let entry = WalEntry::new(sequence, timestamp_micros, op);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.sync_all()?;

        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Atomically replace the log with `ops`
    ///
    /// The new log is written to a sibling temp file, synced, then renamed
    /// over the old one. Sequence numbers keep increasing across the rewrite.
    pub fn rewrite(&mut self, ops: Vec<Operation>, timestamp_micros: u64) -> Result<(), StoreError> {
        let temp_path = self.path.with_extension("wal.tmp");
        let mut sequence = self.next_sequence;
        {
            let mut temp = File::create(&temp_path)?;
            for op in ops {
                let entry = WalEntry::new(sequence, timestamp_micros, op);
                let line = serde_json::to_string(&entry)?;
                temp.write_all(line.as_bytes())?;
                temp.write_all(b"\n")?;
                sequence += 1;
            }
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.next_sequence = sequence;
        Ok(())
    }

    /// Next sequence number to be assigned
    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
