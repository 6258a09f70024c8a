//! Civic domain models.
//!
//! This module groups the locality hierarchy and the finance records that
//! reference it.

pub mod finance;
pub mod locality;

pub use finance::{Address, Benefactor};
pub use locality::{City, County, Locality, State, ZipCode};
