//! Reusable test harnesses shared across the integration and property test
//! binaries.

mod two_node;

pub use two_node::TwoNodeFixture;
