use super::hint::HintContext;
use crate::rule::ShardingRule;
use crate::statement::{DalKind, DdlKind, StatementKind, StatementShape};
use serde::{Deserialize, Serialize};

/// Routing strategy chosen for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStrategy {
    Unicast,
    Standard,
    Complex,
    Hint,
    DatabaseBroadcast,
    TableBroadcast,
    InstanceBroadcast,
}

impl RouteStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RouteStrategy::Unicast => "unicast",
            RouteStrategy::Standard => "standard",
            RouteStrategy::Complex => "complex",
            RouteStrategy::Hint => "hint",
            RouteStrategy::DatabaseBroadcast => "database_broadcast",
            RouteStrategy::TableBroadcast => "table_broadcast",
            RouteStrategy::InstanceBroadcast => "instance_broadcast",
        }
    }

    pub fn all() -> [RouteStrategy; 7] {
        [
            RouteStrategy::Unicast,
            RouteStrategy::Standard,
            RouteStrategy::Complex,
            RouteStrategy::Hint,
            RouteStrategy::DatabaseBroadcast,
            RouteStrategy::TableBroadcast,
            RouteStrategy::InstanceBroadcast,
        ]
    }
}

/// Pick the strategy for a statement. First match wins.
pub fn select_strategy(
    statement: &StatementShape,
    rule: &ShardingRule,
    hint: Option<&HintContext>,
) -> RouteStrategy {
    if hint.is_some_and(|h| !h.data_sources.is_empty()) {
        return RouteStrategy::Hint;
    }
    match statement.kind {
        StatementKind::Tcl => RouteStrategy::DatabaseBroadcast,
        StatementKind::Ddl(kind) => select_ddl_strategy(kind, statement, rule),
        StatementKind::Dcl => RouteStrategy::InstanceBroadcast,
        StatementKind::Dal(kind) => match kind {
            DalKind::Set | DalKind::ShowDatabases | DalKind::ShowTables => {
                RouteStrategy::DatabaseBroadcast
            }
            DalKind::ShowCreateTable | DalKind::Describe | DalKind::Other => {
                RouteStrategy::Unicast
            }
        },
        StatementKind::Select
        | StatementKind::Insert
        | StatementKind::Update
        | StatementKind::Delete => select_dml_strategy(statement, rule),
    }
}

fn select_ddl_strategy(kind: DdlKind, statement: &StatementShape, rule: &ShardingRule) -> RouteStrategy {
    match kind {
        DdlKind::FunctionOrProcedure => RouteStrategy::DatabaseBroadcast,
        DdlKind::Tablespace => RouteStrategy::InstanceBroadcast,
        DdlKind::Table | DdlKind::Index => {
            if rule.has_any_table_rule(&statement.tables) {
                RouteStrategy::TableBroadcast
            } else {
                RouteStrategy::Unicast
            }
        }
    }
}

fn select_dml_strategy(statement: &StatementShape, rule: &ShardingRule) -> RouteStrategy {
    if rule.is_all_broadcast_tables(&statement.tables) {
        return if statement.kind.is_write() {
            RouteStrategy::DatabaseBroadcast
        } else {
            RouteStrategy::Unicast
        };
    }
    if statement.tables.is_empty() || !rule.has_any_table_rule(&statement.tables) {
        return RouteStrategy::Unicast;
    }
    let sharding_tables = rule.sharding_logic_table_names(&statement.tables);
    if sharding_tables.len() == 1 || rule.is_all_binding_tables(&sharding_tables) {
        RouteStrategy::Standard
    } else if sharding_tables.is_empty() {
        // Broadcast tables mixed with unruled ones
        RouteStrategy::Unicast
    } else {
        RouteStrategy::Complex
    }
}
