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

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Opaque endpoint identifier naming a DTN node.
///
/// Unlike a full Bundle Protocol endpoint (which distinguishes `dtn://` and
/// `ipn:` schemes and supports wildcards) this is a bare string: nothing
/// downstream needs to parse an EID, only compare and hash it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(String);

impl Eid {
    pub fn new(raw: impl Into<String>) -> Self {
        Eid(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Eid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Eid {
    fn from(value: &str) -> Self {
        Eid(value.to_string())
    }
}

impl From<String> for Eid {
    fn from(value: String) -> Self {
        Eid(value)
    }
}
