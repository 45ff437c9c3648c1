//! Column encryption rule and the decrypting merge decorator.

use super::MergedResult;
use crate::error::{Error, Result};
use crate::value::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reversible cipher for a logic column.
pub trait EncryptAlgorithm: Send + Sync + fmt::Debug {
    fn kind(&self) -> &'static str;
    fn encrypt(&self, plain: &Value) -> Result<Value>;
    fn decrypt(&self, cipher: &Value) -> Result<Value>;
}

/// One-way digest stored next to the cipher so equality predicates can be matched.
pub trait AssistedQueryAlgorithm: Send + Sync + fmt::Debug {
    fn kind(&self) -> &'static str;
    fn encrypt(&self, plain: &Value) -> Result<Value>;
}

/// Hex SHA-256 of the salted value text.
#[derive(Debug, Clone, Default)]
pub struct Sha256AssistedQueryAlgorithm {
    salt: String,
}

impl Sha256AssistedQueryAlgorithm {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

impl AssistedQueryAlgorithm for Sha256AssistedQueryAlgorithm {
    fn kind(&self) -> &'static str {
        "SHA256"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        match plain {
            Value::Bytes(bytes) => hasher.update(bytes),
            other => hasher.update(other.to_string().as_bytes()),
        }
        let digest = hasher.finalize();
        Ok(Value::Text(
            digest.iter().map(|b| format!("{:02x}", b)).collect(),
        ))
    }
}

/// Physical layout of one encrypted logic column.
#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic: String,
    pub cipher: String,
    pub assisted_query: Option<String>,
    pub plain: Option<String>,
    pub algorithm: Arc<dyn EncryptAlgorithm>,
    pub assisted_query_algorithm: Option<Arc<dyn AssistedQueryAlgorithm>>,
}

impl EncryptColumn {
    pub fn new(logic: &str, cipher: &str, algorithm: Arc<dyn EncryptAlgorithm>) -> Self {
        Self {
            logic: logic.to_string(),
            cipher: cipher.to_string(),
            assisted_query: None,
            plain: None,
            algorithm,
            assisted_query_algorithm: None,
        }
    }

    pub fn with_assisted_query(
        mut self,
        column: &str,
        algorithm: Arc<dyn AssistedQueryAlgorithm>,
    ) -> Self {
        self.assisted_query = Some(column.to_string());
        self.assisted_query_algorithm = Some(algorithm);
        self
    }

    pub fn with_plain(mut self, column: &str) -> Self {
        self.plain = Some(column.to_string());
        self
    }

    fn owns_physical(&self, name: &str) -> bool {
        self.cipher.eq_ignore_ascii_case(name)
            || self
                .assisted_query
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(name))
            || self.plain.as_deref().is_some_and(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptTable {
    pub columns: Vec<EncryptColumn>,
}

/// Encrypted columns per logic table.
#[derive(Debug, Clone, Default)]
pub struct EncryptRule {
    tables: HashMap<String, EncryptTable>,
}

impl EncryptRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, table: &str, column: EncryptColumn) -> Self {
        self.tables
            .entry(table.to_lowercase())
            .or_default()
            .columns
            .push(column);
        self
    }

    pub fn find_table(&self, table: &str) -> Option<&EncryptTable> {
        self.tables.get(&table.to_lowercase())
    }

    pub fn covers_any(&self, tables: &[String]) -> bool {
        tables.iter().any(|t| self.find_table(t).is_some())
    }

    pub fn find_column(&self, table: &str, logic_column: &str) -> Option<&EncryptColumn> {
        self.find_table(table)?
            .columns
            .iter()
            .find(|c| c.logic.eq_ignore_ascii_case(logic_column))
    }

    /// Cipher value of a logic column, for the write path.
    pub fn encrypt(&self, table: &str, logic_column: &str, value: &Value) -> Result<Value> {
        let column = self.find_column(table, logic_column).ok_or_else(|| {
            Error::Encrypt(format!("No encrypt column '{}.{}'", table, logic_column))
        })?;
        column.algorithm.encrypt(value)
    }

    pub fn assisted_query(&self, table: &str, logic_column: &str, value: &Value) -> Result<Option<Value>> {
        let column = self.find_column(table, logic_column).ok_or_else(|| {
            Error::Encrypt(format!("No encrypt column '{}.{}'", table, logic_column))
        })?;
        column
            .assisted_query_algorithm
            .as_ref()
            .map(|a| a.encrypt(value))
            .transpose()
    }

    /// Logic column owning a physical cipher, assisted-query or plain column.
    pub fn logic_column_of(&self, tables: &[String], physical: &str) -> Option<&str> {
        tables
            .iter()
            .filter_map(|t| self.find_table(t))
            .flat_map(|t| t.columns.iter())
            .find(|c| c.owns_physical(physical))
            .map(|c| c.logic.as_str())
    }

    /// Algorithm decrypting a result column with this label, if any.
    pub fn decryptor_for(&self, tables: &[String], label: &str) -> Option<Arc<dyn EncryptAlgorithm>> {
        tables
            .iter()
            .filter_map(|t| self.find_table(t))
            .flat_map(|t| t.columns.iter())
            .find(|c| {
                c.cipher.eq_ignore_ascii_case(label)
                    || (c.plain.is_none() && c.logic.eq_ignore_ascii_case(label))
            })
            .map(|c| c.algorithm.clone())
    }
}

enum EncryptMode {
    /// Per result column, the algorithm that decrypts it.
    Query(Vec<Option<Arc<dyn EncryptAlgorithm>>>),
    /// Field-name cell (column 0) rewritten to the logic column name.
    Describe(HashMap<String, String>),
}

/// Decrypts cipher columns, or renames physical columns in DESCRIBE output.
/// Row count is never changed.
pub struct EncryptMergedResult {
    inner: Box<dyn MergedResult>,
    mode: EncryptMode,
    last_null: bool,
}

impl EncryptMergedResult {
    pub fn for_query(
        inner: Box<dyn MergedResult>,
        rule: &EncryptRule,
        tables: &[String],
        labels: &[String],
    ) -> Self {
        let decryptors = labels
            .iter()
            .map(|label| rule.decryptor_for(tables, label))
            .collect();
        Self {
            inner,
            mode: EncryptMode::Query(decryptors),
            last_null: false,
        }
    }

    pub fn for_describe(inner: Box<dyn MergedResult>, rule: &EncryptRule, tables: &[String]) -> Self {
        let mut renames = HashMap::new();
        for column in tables
            .iter()
            .filter_map(|t| rule.find_table(t))
            .flat_map(|t| t.columns.iter())
        {
            let physical = std::iter::once(&column.cipher)
                .chain(column.assisted_query.as_ref())
                .chain(column.plain.as_ref());
            for name in physical {
                renames.insert(name.to_lowercase(), column.logic.clone());
            }
        }
        Self {
            inner,
            mode: EncryptMode::Describe(renames),
            last_null: false,
        }
    }
}

impl MergedResult for EncryptMergedResult {
    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn value(&mut self, index: usize) -> Result<Value> {
        let raw = self.inner.value(index)?;
        let value = match &self.mode {
            EncryptMode::Query(decryptors) => match decryptors.get(index).and_then(Option::as_ref) {
                Some(algorithm) if !raw.is_null() => algorithm.decrypt(&raw)?,
                _ => raw,
            },
            EncryptMode::Describe(renames) => {
                let logic = match &raw {
                    Value::Text(name) if index == 0 => renames.get(&name.to_lowercase()).cloned(),
                    _ => None,
                };
                logic.map(Value::Text).unwrap_or(raw)
            }
        };
        self.last_null = value.is_null();
        Ok(value)
    }

    fn was_null(&self) -> bool {
        self.last_null
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
