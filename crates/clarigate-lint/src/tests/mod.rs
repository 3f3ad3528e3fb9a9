//! Crate-level unit, property, and BDD tests.
