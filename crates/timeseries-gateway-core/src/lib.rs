//! Query federation core for a time-series gateway.
//!
//! This crate decides which time ranges a physical data source can answer and
//! processes what the backend sends back:
//!
//! - Half-open time intervals and normalized interval sets with
//!   intersection, union and gap arithmetic (`interval` module).
//! - A shared, concurrently refreshed store of per-column availability
//!   (`metadata` module).
//! - Column constraints and the [`Availability`](availability::Availability)
//!   seam that resolves them to the intervals where every requested column
//!   is present (`constraint`, `availability` and `table` modules).
//! - Table and query data sources as they are serialized into backend
//!   queries (`datasource` module).
//! - Strategies that turn a backend HTTP response into one JSON document,
//!   nesting out-of-band header metadata next to the body (`nesting`
//!   module).
//! - A chain of response processors, including the partial-data validation
//!   stage, and the per-request pipeline driving it (`response` and
//!   `pipeline` modules).
//!
//! Transport, query building and result formatting live outside this crate.
#![deny(missing_docs)]
pub mod availability;
pub mod config;
pub mod constraint;
pub mod datasource;
pub mod interval;
pub mod metadata;
pub mod nesting;
pub mod pipeline;
pub mod response;
pub mod table;
