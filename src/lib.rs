#![allow(dead_code)]

pub mod cloud;
pub mod config;
pub mod constants;
pub mod db;
pub mod discovery;
pub mod error;
pub mod matcher;
pub mod output;
pub mod provision;
pub mod remote;
pub mod replicate;
pub mod state;
pub mod wait;
pub mod wls;
pub mod workflow;

pub use error::{DrError, Result};
