//! Per-connection schema cache, learned from `describe_keyspace`.

use std::collections::HashMap;

use tracing::debug;

use crate::thrift::{CfDef, KsDef};
use crate::validator::Validator;

/// Validators for one column family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamilySchema {
    pub key: Validator,
    /// Column-name type.
    pub comparator: Validator,
    pub default_validator: Validator,
    /// Per-column overrides, keyed by the raw column name bytes.
    pub column_validators: HashMap<Vec<u8>, Validator>,
}

impl ColumnFamilySchema {
    pub fn from_cf_def(def: &CfDef) -> Self {
        let column_validators = def
            .column_metadata
            .iter()
            .map(|col| (col.name.clone(), Validator::from_class(&col.validation_class)))
            .collect();

        Self {
            key: Validator::from_class(&def.key_validation_class),
            comparator: Validator::from_class(&def.comparator_type),
            default_validator: Validator::from_class(&def.default_validation_class),
            column_validators,
        }
    }

    /// Validator for a value in the named column.
    pub fn value_validator(&self, raw_name: &[u8]) -> &Validator {
        self.column_validators
            .get(raw_name)
            .unwrap_or(&self.default_validator)
    }
}

impl Default for ColumnFamilySchema {
    fn default() -> Self {
        Self {
            key: Validator::Bytes,
            comparator: Validator::Bytes,
            default_validator: Validator::Bytes,
            column_validators: HashMap::new(),
        }
    }
}

/// Column family name to its validators.
///
/// Built once per successful handshake and never modified afterwards; a
/// reconnect replaces the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCache {
    keyspace: String,
    families: HashMap<String, ColumnFamilySchema>,
}

impl SchemaCache {
    pub fn from_ks_def(def: &KsDef) -> Self {
        let families: HashMap<_, _> = def
            .cf_defs
            .iter()
            .map(|cf| (cf.name.clone(), ColumnFamilySchema::from_cf_def(cf)))
            .collect();

        debug!(
            keyspace = %def.name,
            column_families = families.len(),
            "learned keyspace schema"
        );

        Self {
            keyspace: def.name.clone(),
            families,
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn get(&self, column_family: &str) -> Option<&ColumnFamilySchema> {
        self.families.get(column_family)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Column family names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.families.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thrift::ColumnDef;

    fn users_def() -> KsDef {
        KsDef {
            name: "app".into(),
            strategy_class: "SimpleStrategy".into(),
            cf_defs: vec![CfDef {
                keyspace: "app".into(),
                name: "users".into(),
                comparator_type: "org.apache.cassandra.db.marshal.UTF8Type".into(),
                default_validation_class: "BytesType".into(),
                key_validation_class: "LongType".into(),
                column_metadata: vec![ColumnDef {
                    name: b"age".to_vec(),
                    validation_class: "Int32Type".into(),
                }],
            }],
        }
    }

    #[test]
    fn test_from_ks_def() {
        let cache = SchemaCache::from_ks_def(&users_def());
        assert_eq!(cache.keyspace(), "app");
        assert_eq!(cache.names(), vec!["users"]);

        let users = cache.get("users").unwrap();
        assert_eq!(users.key, Validator::Long);
        assert_eq!(users.comparator, Validator::Utf8);
        assert_eq!(users.value_validator(b"age"), &Validator::Int32);
        assert_eq!(users.value_validator(b"email"), &Validator::Bytes);
        assert!(cache.get("missing").is_none());
    }
}
