#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in bucket storage packages.
//!
//! The fixtures here make element lifecycles observable: [`Tracked`] records every
//! construction, clone and drop in a thread-local log, while [`HeapBuffer`] owns a heap
//! allocation and counts how many buffers are alive so leak tests can assert that everything
//! handed to a container is eventually released.

mod heap_buffer;
mod tracked;
mod watchdog;

pub use heap_buffer::*;
pub use tracked::*;
pub use watchdog::*;
