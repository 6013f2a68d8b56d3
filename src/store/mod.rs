//! Persistence of match outcomes to an external PostgREST-compatible store

mod results;

pub use results::{ResultStore, StoreError};
