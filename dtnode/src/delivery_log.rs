// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTRD.
//
// DTRD is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTRD is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::hook::DeliveryRecord;

/// Append-only line-delimited-JSON delivery log: one fact per line,
/// aimed at a file rather than stderr since these records are meant to be
/// consumed after the fact, not watched live.
#[derive(Debug)]
pub struct DeliveryLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DeliveryLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(DeliveryLog {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, record: &DeliveryRecord) -> io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle::{BundleId, Eid};
    use std::fs;

    fn record() -> DeliveryRecord {
        DeliveryRecord {
            bundle_id: BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"x", 1.0),
            source: Eid::from("dtn://a"),
            destination: Eid::from("dtn://b"),
            payload: b"x".to_vec(),
            hop_count: 0,
            created_at: 1.0,
            delivered_at: 1.5,
            e2e_delay: 0.5,
        }
    }

    #[test]
    fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delivered.jsonl");
        let log = DeliveryLog::open(&path).unwrap();
        log.append(&record()).unwrap();
        log.append(&record()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            assert!(serde_json::from_str::<serde_json::Value>(line).is_ok());
        }
    }
}
