#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod log;

mod error;

pub mod config;
pub mod device;
pub mod interface;
pub mod params;
pub mod poll;
pub mod registers;
pub mod report;
pub mod self_test;
#[cfg(feature = "host")]
pub mod transport;
pub mod usage;

#[cfg(test)]
mod testing;

pub use crate::config::Config;
pub use crate::device::Axiom;
pub use crate::error::{Error, Result};
pub use crate::self_test::{SelfTestPlan, SelfTestReport};
