use super::algorithm::ShardingStrategy;
use super::data_node::DataNode;
use super::keygen::KeyGenerator;
use std::fmt;
use std::sync::Arc;

/// Column whose value is generated by the middleware when the client omits it.
#[derive(Clone)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub generator: Arc<dyn KeyGenerator>,
}

impl fmt::Debug for KeyGenerateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerateStrategy")
            .field("column", &self.column)
            .field("generator", &self.generator.generator_type())
            .finish()
    }
}

/// Physical layout and sharding policy of one logic table.
#[derive(Debug, Clone)]
pub struct TableRule {
    logic_table: String,
    data_nodes: Vec<DataNode>,
    data_source_names: Vec<String>,
    database_strategy: Option<ShardingStrategy>,
    table_strategy: Option<ShardingStrategy>,
    key_generate: Option<KeyGenerateStrategy>,
}

impl TableRule {
    pub fn new(logic_table: impl Into<String>, data_nodes: Vec<DataNode>) -> Self {
        let mut data_source_names: Vec<String> = Vec::new();
        for node in &data_nodes {
            if !data_source_names.contains(&node.data_source) {
                data_source_names.push(node.data_source.clone());
            }
        }
        Self {
            logic_table: logic_table.into().to_lowercase(),
            data_nodes,
            data_source_names,
            database_strategy: None,
            table_strategy: None,
            key_generate: None,
        }
    }

    /// A table replicated as itself on every listed data source.
    pub fn broadcast(logic_table: impl Into<String>, data_sources: &[String]) -> Self {
        let logic_table = logic_table.into();
        let nodes = data_sources
            .iter()
            .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
            .collect();
        Self::new(logic_table, nodes)
    }

    pub fn with_database_strategy(mut self, strategy: Option<ShardingStrategy>) -> Self {
        self.database_strategy = strategy;
        self
    }

    pub fn with_table_strategy(mut self, strategy: Option<ShardingStrategy>) -> Self {
        self.table_strategy = strategy;
        self
    }

    pub fn with_key_generate(mut self, key_generate: Option<KeyGenerateStrategy>) -> Self {
        self.key_generate = key_generate;
        self
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn data_nodes(&self) -> &[DataNode] {
        &self.data_nodes
    }

    /// Data source names in first-appearance order.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn database_strategy(&self) -> Option<&ShardingStrategy> {
        self.database_strategy.as_ref()
    }

    pub fn table_strategy(&self) -> Option<&ShardingStrategy> {
        self.table_strategy.as_ref()
    }

    pub fn key_generate(&self) -> Option<&KeyGenerateStrategy> {
        self.key_generate.as_ref()
    }

    pub fn actual_table_names(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    pub fn contains_data_node(&self, data_source: &str, table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|node| node.data_source == data_source && node.table.eq_ignore_ascii_case(table))
    }

    pub fn has_actual_table(&self, table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|node| node.table.eq_ignore_ascii_case(table))
    }

    /// Position of `table` among the actual tables of `data_source`.
    pub fn find_actual_table_index(&self, data_source: &str, table: &str) -> Option<usize> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .position(|node| node.table.eq_ignore_ascii_case(table))
    }

    /// Layout signature used to verify binding groups: tables per data source.
    pub(crate) fn layout(&self) -> Vec<(String, usize)> {
        self.data_source_names
            .iter()
            .map(|ds| (ds.clone(), self.actual_table_names(ds).len()))
            .collect()
    }
}
