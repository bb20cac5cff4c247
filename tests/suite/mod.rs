//! Integration test suites

mod continuation;
mod history;
mod registry;
mod sanitize;
mod template;
mod turn;
