// SPDX-License-Identifier: Apache-2.0

//! Routing Engine
//!
//! Turns a bound statement into the set of `(data source, actual tables)`
//! units it must run on.

pub mod broadcast;
pub mod cartesian;
pub mod condition;
pub mod engine;
pub mod hint;
pub mod standard;
pub mod unicast;

use std::fmt;

use compact_str::CompactString;
use serde::Serialize;

use crate::rule::DataNode;

pub use condition::{ConditionOperand, ShardingCondition, ShardingConditionValue, ShardingConditions};
pub use engine::ShardingRouter;
pub use hint::HintContext;

/// Logic table mapped to the actual table of one route unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableUnit {
    pub logic_table: CompactString,
    pub actual_table: CompactString,
}

impl TableUnit {
    pub fn new(logic_table: impl Into<CompactString>, actual_table: impl Into<CompactString>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        }
    }

    /// A table that keeps its own name on every data source.
    pub fn same(table: &str) -> Self {
        Self::new(table, table)
    }
}

/// One physical execution target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RouteUnit {
    pub data_source: CompactString,
    /// Sorted, so equal table sets compare equal
    table_units: Vec<TableUnit>,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<CompactString>, mut table_units: Vec<TableUnit>) -> Self {
        table_units.sort();
        table_units.dedup();
        Self {
            data_source: data_source.into(),
            table_units,
        }
    }

    pub fn table_units(&self) -> &[TableUnit] {
        &self.table_units
    }

    /// Actual table standing in for `logic_table`, matched case-insensitively.
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_units
            .iter()
            .find(|u| u.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|u| u.actual_table.as_str())
    }

    pub fn data_nodes(&self) -> impl Iterator<Item = DataNode> + '_ {
        self.table_units
            .iter()
            .map(|u| DataNode::new(self.data_source.clone(), u.actual_table.clone()))
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[", self.data_source)?;
        for (i, unit) in self.table_units.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}->{}", unit.logic_table, unit.actual_table)?;
        }
        f.write_str("]")
    }
}

/// Which routing path produced a route context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    Standard,
    Cartesian,
    DatabaseBroadcast,
    TableBroadcast,
    Unicast,
    DefaultDataSource,
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Standard => "standard",
            Self::Cartesian => "cartesian",
            Self::DatabaseBroadcast => "database_broadcast",
            Self::TableBroadcast => "table_broadcast",
            Self::Unicast => "unicast",
            Self::DefaultDataSource => "default_data_source",
        };
        f.write_str(name)
    }
}

/// Routing result. Equality ignores unit order.
#[derive(Debug, Clone, Serialize)]
pub struct RouteContext {
    units: Vec<RouteUnit>,
    original_data_nodes: Vec<Vec<DataNode>>,
    strategy: RouteStrategy,
}

impl RouteContext {
    pub fn new(strategy: RouteStrategy) -> Self {
        Self {
            units: Vec::new(),
            original_data_nodes: Vec::new(),
            strategy,
        }
    }

    /// Adds a unit unless an equal one is already present.
    pub fn add_unit(&mut self, unit: RouteUnit) {
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.units.len() == 1
    }

    pub fn strategy(&self) -> RouteStrategy {
        self.strategy
    }

    /// Data nodes each sharding condition routed to. INSERT statements have
    /// one entry per row.
    pub fn original_data_nodes(&self) -> &[Vec<DataNode>] {
        &self.original_data_nodes
    }

    pub(crate) fn set_original_data_nodes(&mut self, nodes: Vec<Vec<DataNode>>) {
        self.original_data_nodes = nodes;
    }

    /// Distinct data sources in unit order.
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source.as_str()) {
                names.push(unit.data_source.as_str());
            }
        }
        names
    }

    pub fn data_nodes(&self) -> Vec<DataNode> {
        let mut nodes: Vec<DataNode> = self.units.iter().flat_map(RouteUnit::data_nodes).collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    fn sorted_units(&self) -> Vec<&RouteUnit> {
        let mut units: Vec<&RouteUnit> = self.units.iter().collect();
        units.sort();
        units
    }
}

impl PartialEq for RouteContext {
    fn eq(&self, other: &Self) -> bool {
        self.sorted_units() == other.sorted_units()
    }
}

impl Eq for RouteContext {}
