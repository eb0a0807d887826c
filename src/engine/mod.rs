//! Core engine: change detection and the budgeted purchase loop, plus the
//! pipeline that runs them once per invocation.

pub mod detector;
pub mod executor;
pub mod pipeline;
