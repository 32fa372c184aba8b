// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Shared vocabulary for the palimpsest store: entids and their partition
//! encoding, the closed set of logical value types, typed values, and the
//! ident grammar that attribute and view names obey.

extern crate chrono;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate ordered_float;
extern crate serde_json;
extern crate uuid;

pub mod idents;
mod types;
mod values;

pub use types::{
    Attribute,
    Entid,
    PartitionId,
    Unique,
    ValueType,
    ValueTypeError,
    counter_of,
    entid_from_parts,
    partition_of,
};

pub use values::{
    TypedValue,
    ValueError,
};

/// The partition ids fixed at bootstrap.
pub const PART_DB: PartitionId = 0;
pub const PART_TX: PartitionId = 1;
pub const PART_USER: PartitionId = 2;
