// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Service ports: I/O-bound domain contracts implemented by infrastructure.

pub mod cache_port;
pub mod connector_adapter;
pub mod customer_matcher;
pub mod stage_executor;

pub use cache_port::{CircuitState, RemoteCache, SerializationFormat};
pub use connector_adapter::{ConnectorAdapter, FetchAndProcessResult, FetchFilters, Paging};
pub use customer_matcher::{CandidateIdentity, CustomerMatcher, MatchOutcome};
pub use stage_executor::{ResourceRequirements, StageExecutionContext, StageExecutor};
