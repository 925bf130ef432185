//! Adapters behind the domain ports: the record store and its backends,
//! plus HTTP clients for the payment gateway and the ledger.

pub mod gateway;
pub mod in_memory;
pub mod ledger;
pub mod record_store;
pub mod records;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
