//! Cross-module tests: end-to-end scenarios, index properties and
//! concurrent access.

pub(crate) mod support;

mod properties;
