// Copyright 2018 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Attribute idents are namespaced strings, `namespace/name`, where the
//! namespace may be dotted (`db.view/ident`) and the name may be hyphenated
//! (`optional-attributes`). Generated relation and column names normalise
//! the separators so they are valid host identifiers.

/// True if `ident` is a well-formed namespaced attribute ident.
pub fn is_valid_ident(ident: &str) -> bool {
    let mut parts = ident.splitn(2, '/');
    let namespace = parts.next().unwrap_or("");
    let name = match parts.next() {
        Some(n) => n,
        None => return false,
    };
    !namespace.is_empty() && !name.is_empty()
        && namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

/// True if `name` can name a generated view: a plain host identifier.
pub fn is_valid_view_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn normalise(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '.' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// The name of the child relation storing datoms of the attribute `ident`:
/// `person/name` becomes `attr_person_name`.
pub fn attr_table_name(ident: &str) -> String {
    format!("attr_{}", normalise(ident))
}

/// The projected column name for the attribute `ident` in a generated view:
/// the part after the namespace separator, normalised. `person/tag` becomes
/// `tag`; `db.view/optional-attributes` becomes `optional_attributes`.
pub fn column_name(ident: &str) -> String {
    let name = ident.splitn(2, '/').nth(1).unwrap_or(ident);
    normalise(name)
}
