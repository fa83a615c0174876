//! Server catalog - every distinct address seen during one search

use std::collections::HashMap;
use std::net::SocketAddr;

use super::server::ServerRecord;

/// Address-keyed server records, remembering first-seen order
#[derive(Debug, Default)]
pub struct ServerCatalog {
    records: Vec<ServerRecord>,
    index: HashMap<SocketAddr, usize>,
}

impl ServerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any earlier record for the same address
    /// in place. Returns true when the address is new.
    pub fn upsert(&mut self, record: ServerRecord) -> bool {
        match self.index.get(&record.address()) {
            Some(&slot) => {
                self.records[slot] = record;
                false
            }
            None => {
                self.index.insert(record.address(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    pub fn get(&self, address: &SocketAddr) -> Option<&ServerRecord> {
        self.index.get(address).map(|&slot| &self.records[slot])
    }

    pub fn get_mut(&mut self, address: &SocketAddr) -> Option<&mut ServerRecord> {
        match self.index.get(address) {
            Some(&slot) => Some(&mut self.records[slot]),
            None => None,
        }
    }

    pub fn contains(&self, address: &SocketAddr) -> bool {
        self.index.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &ServerRecord> {
        self.records.iter()
    }

    /// Records matching `predicate`, best total score first.
    /// Equal scores keep first-seen order.
    pub fn rank<F>(&self, predicate: F) -> Vec<&ServerRecord>
    where
        F: Fn(&ServerRecord) -> bool,
    {
        let mut ranked: Vec<&ServerRecord> = self.records.iter().filter(|r| predicate(r)).collect();
        ranked.sort_by(|a, b| b.total_score().total_cmp(&a.total_score()));
        ranked
    }

    pub fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ServerRecord) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).count()
    }
}
