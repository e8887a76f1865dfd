//! Integration scenarios.

mod lifecycle;
