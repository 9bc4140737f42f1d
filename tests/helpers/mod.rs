#![allow(dead_code)]

pub mod builders;
pub mod fixture;

pub use builders::DocumentBuilder;
pub use fixture::RightsFixture;
