//! Keyed store of instrument engines
//!
//! Owned by the session. Each entry is mutated only by events addressed to
//! its own symbol, one event at a time.

use super::engine::InstrumentEngine;
use super::martingale::MartingaleTable;
use crate::protocol::ContractId;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct InstrumentStore {
    engines: BTreeMap<String, InstrumentEngine>,
}

impl InstrumentStore {
    /// One engine per symbol, all sharing the same threshold and stake table
    pub fn new<S: AsRef<str>>(symbols: &[S], threshold: u32, table: MartingaleTable) -> Self {
        let table = Arc::new(table);
        let engines = symbols
            .iter()
            .map(|s| {
                let symbol = s.as_ref().to_string();
                let engine = InstrumentEngine::new(symbol.clone(), threshold, Arc::clone(&table));
                (symbol, engine)
            })
            .collect();
        Self { engines }
    }

    pub fn get(&self, symbol: &str) -> Option<&InstrumentEngine> {
        self.engines.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut InstrumentEngine> {
        self.engines.get_mut(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.engines.contains_key(symbol)
    }

    /// Symbol whose engine tracks `contract_id`
    pub fn owner_of(&self, contract_id: ContractId) -> Option<&str> {
        self.engines
            .values()
            .find(|e| e.owns(contract_id))
            .map(|e| e.symbol())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstrumentEngine> {
        self.engines.values()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Every unsettled contract across all instruments
    pub fn open_contracts(&self) -> Vec<(String, ContractId)> {
        self.engines
            .values()
            .flat_map(|e| {
                e.open_contracts()
                    .into_iter()
                    .map(move |id| (e.symbol().to_string(), id))
            })
            .collect()
    }
}
